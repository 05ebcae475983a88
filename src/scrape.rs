//! Read offer cards off a loaded portal page.

use std::collections::HashSet;

use anyhow::Result;
use tracing::{debug, info};

use crate::browser::{any_exists, wait_for, OfferPage};
use crate::config::TimingConfig;
use crate::models::RawOffer;
use crate::portal::Portal;

pub struct OfferScraper<'a> {
    portal: &'a dyn Portal,
    timing: &'a TimingConfig,
}

impl<'a> OfferScraper<'a> {
    pub fn new(portal: &'a dyn Portal, timing: &'a TimingConfig) -> Self {
        Self { portal, timing }
    }

    /// One raw record per visible card that still shows an add control, in
    /// page order. An empty page is not an error.
    pub async fn scrape(&self, page: &dyn OfferPage) -> Result<Vec<RawOffer>> {
        let portal = self.portal;
        let spec = portal.card_spec();

        let mut markers = portal.ready();
        markers.extend(spec.controls.iter().cloned());
        let markers = &markers;
        let loaded = wait_for(self.timing.ready_timeout, self.timing.poll_interval, move || {
            any_exists(page, markers)
        })
        .await?;
        if !loaded {
            info!(bank = %portal.bank(), "No offer cards appeared");
        }

        for expander in portal.expanders() {
            if page.click(&expander).await? {
                debug!(css = %expander.css, "Expanded offer list");
                tokio::time::sleep(self.timing.page_load_pause).await;
            }
        }
        page.scroll_through().await?;

        let mut seen = HashSet::new();
        let mut offers = Vec::new();
        for card in page.cards(spec).await? {
            let mut raw = RawOffer::new(portal.bank(), card.text).with_enrolled(card.enrolled);
            if !seen.insert(raw.fingerprint.clone()) {
                continue;
            }
            raw.heading = card.heading.filter(|h| !h.trim().is_empty());
            raw.expiration_text = card.expiration.filter(|e| !e.trim().is_empty());
            offers.push(raw);
        }

        info!(bank = %portal.bank(), cards = offers.len(), "Scraped offer cards");
        Ok(offers)
    }
}
