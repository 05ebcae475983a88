//! Click an offer's add control and confirm the portal accepted it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use tracing::{debug, warn};

use crate::browser::{wait_for, CardState, OfferPage};
use crate::config::TimingConfig;
use crate::error::OfferError;
use crate::models::RawOffer;
use crate::portal::Portal;

/// What a confirmed click left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrollment {
    /// Terms text read from the detail view, for portals that open one.
    pub detail_text: Option<String>,
}

pub struct EnrollmentActuator<'a> {
    portal: &'a dyn Portal,
    timing: &'a TimingConfig,
    clicks: usize,
}

impl<'a> EnrollmentActuator<'a> {
    pub fn new(portal: &'a dyn Portal, timing: &'a TimingConfig) -> Self {
        Self {
            portal,
            timing,
            clicks: 0,
        }
    }

    /// The per-scope click cap has been reached.
    pub fn exhausted(&self) -> bool {
        self.clicks >= self.portal.settings().max_clicks
    }

    /// Enroll one card. Offer-level failures come back as [`OfferError`]
    /// inside the `anyhow::Error`; anything else means the page itself broke.
    pub async fn enroll(
        &mut self,
        page: &dyn OfferPage,
        raw: &RawOffer,
        merchant: &str,
    ) -> Result<Enrollment> {
        let portal = self.portal;
        let spec = portal.card_spec();

        if !page.click_in_card(spec, &raw.fingerprint).await? {
            return Err(OfferError::CardNotFound {
                fingerprint: raw.fingerprint.clone(),
            }
            .into());
        }
        self.clicks += 1;
        tokio::time::sleep(jittered(self.timing.click_pause, self.timing.jitter)).await;

        let marker = portal.detail_marker();
        let marker = &marker;
        let fingerprint = raw.fingerprint.as_str();
        let vanished_ok = portal.vanished_card_is_enrolled();
        let opened = AtomicBool::new(false);
        let opened_ref = &opened;
        let timing = self.timing;
        let confirmed = wait_for(timing.verify_timeout, timing.poll_interval, move || async move {
            if let Some(marker) = marker {
                if page.exists(marker).await? {
                    opened_ref.store(true, Ordering::Relaxed);
                    return Ok(true);
                }
            }
            let state = page.card_state(spec, fingerprint).await?;
            Ok::<_, anyhow::Error>(match state {
                CardState::Enrolled => true,
                CardState::Gone => vanished_ok,
                CardState::Pending => false,
            })
        })
        .await?;
        let in_detail = opened.load(Ordering::Relaxed);

        let rejected = match portal.error_dialog_close() {
            Some(close) => page.click(&close).await?,
            None => false,
        };
        if rejected {
            debug!(merchant, "Dismissed enrollment error dialog");
        }

        let mut enrollment = Enrollment::default();
        if in_detail {
            enrollment.detail_text = self.read_detail(page).await?;
            self.leave_detail(page).await?;
        }

        tokio::time::sleep(jittered(self.timing.between_offers, self.timing.jitter)).await;

        if !confirmed || rejected {
            return Err(OfferError::NotConfirmed {
                merchant: merchant.to_string(),
            }
            .into());
        }
        debug!(merchant, clicks = self.clicks, "Enrolled");
        Ok(enrollment)
    }

    async fn read_detail(&self, page: &dyn OfferPage) -> Result<Option<String>> {
        let mut parts = Vec::new();
        for locator in self.portal.detail_text() {
            if let Some(text) = page.text_of(&locator).await? {
                if !parts.contains(&text) {
                    parts.push(text);
                }
            }
        }
        Ok(Some(parts.join("\n")).filter(|t| !t.is_empty()))
    }

    async fn leave_detail(&self, page: &dyn OfferPage) -> Result<()> {
        let clicked = match self.portal.back_control() {
            Some(back) => page.click(&back).await?,
            None => false,
        };
        if !clicked {
            if let Err(err) = page.go_back().await {
                warn!(error = %err, "Could not leave offer detail view");
            }
        }
        tokio::time::sleep(self.timing.back_wait).await;
        Ok(())
    }
}

/// `base` plus a uniform random extra of up to `jitter`.
fn jittered(base: Duration, jitter: Duration) -> Duration {
    let max = jitter.as_millis() as u64;
    if max == 0 {
        return base;
    }
    base + Duration::from_millis(rand::thread_rng().gen_range(0..=max))
}
