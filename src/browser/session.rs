//! Bring a portal page to its authenticated offers view.

use std::time::Duration;

use anyhow::Result;
use tokio::time::Instant;
use tracing::{debug, info};

use super::{any_exists, OfferPage};
use crate::config::TimingConfig;
use crate::error::SessionError;
use crate::portal::Portal;

/// Minimum gap between redirects from a landing page to the offers page.
const RENAVIGATE_AFTER: Duration = Duration::from_millis(2500);

pub struct SessionOpener<'a> {
    portal: &'a dyn Portal,
    timing: &'a TimingConfig,
    interactive: bool,
}

impl<'a> SessionOpener<'a> {
    /// `interactive` means a person can finish login in the window, so a
    /// login page is waited on instead of failing immediately.
    pub fn new(portal: &'a dyn Portal, timing: &'a TimingConfig, interactive: bool) -> Self {
        Self {
            portal,
            timing,
            interactive,
        }
    }

    /// Navigate to the offers page and wait until it is ready.
    pub async fn open(&self, page: &dyn OfferPage) -> Result<()> {
        let portal = self.portal;
        let ready = portal.ready();

        page.goto(portal.offers_url()).await?;
        tokio::time::sleep(self.timing.page_load_pause).await;

        let start = Instant::now();
        let mut last_nav = Instant::now();
        let mut announced = false;
        let mut url = String::new();

        loop {
            if any_exists(page, &ready).await? {
                info!(bank = %portal.bank(), "Offers page ready");
                return Ok(());
            }

            url = page.current_url().await.unwrap_or(url);
            if portal.is_login_url(&url) {
                if !self.interactive {
                    return Err(SessionError::NotAuthenticated {
                        bank: portal.bank(),
                        url,
                    }
                    .into());
                }
                if !announced {
                    println!(
                        "Sign in to {} in the browser window (complete MFA if asked).",
                        portal.bank().display_name()
                    );
                    announced = true;
                }
            } else if is_landing(portal, &url) && last_nav.elapsed() >= RENAVIGATE_AFTER {
                debug!(url = %url, "On landing page, moving to offers");
                page.goto(portal.offers_url()).await?;
                last_nav = Instant::now();
            }

            if start.elapsed() >= self.timing.login_wait {
                return Err(SessionError::NotAuthenticated {
                    bank: portal.bank(),
                    url,
                }
                .into());
            }
            tokio::time::sleep(self.timing.poll_interval).await;
        }
    }
}

fn is_landing(portal: &dyn Portal, url: &str) -> bool {
    let url = url.to_ascii_lowercase();
    portal
        .landing_urls()
        .iter()
        .any(|landing| url.starts_with(&landing.to_ascii_lowercase()))
}
