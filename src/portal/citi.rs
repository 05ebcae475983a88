use std::sync::LazyLock;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info, warn};

use super::{Portal, PortalSettings, Scope};
use crate::browser::{any_exists, wait_for, CardRoot, CardSpec, Locator, OfferPage};
use crate::config::{PortalConfig, TimingConfig};
use crate::models::{Bank, CardInfo};

const LOGIN_URL: &str = "https://online.citi.com/US/login.do";
const OFFERS_URL: &str = "https://online.citi.com/US/merchantoffers";
const LOGIN_MARKERS: &[&str] = &["/login.do", "/ag/logon", "/login?"];

const DEFAULT_MAX_CLICKS: usize = 200;

// Card selector above the offers grid.
const CARD_MENU: &str = "#cds-dropdown";
const CARD_OPTIONS: &str = "#cds-dropdown-listbox li:not(.disabled)";
const CARD_VALUE: &str = "#cds-dropdown-button-value";

static ENDING_IN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([A-Za-z][A-Za-z0-9 ®&'\-]{1,40}?)\s*(?:card\s+)?(?:ending in|-)\s*(\d{4})\b")
        .expect("valid regex")
});

pub struct CitiPortal {
    settings: PortalSettings,
    cards: CardSpec,
}

impl CitiPortal {
    pub fn new(config: &PortalConfig) -> Self {
        Self {
            settings: PortalSettings::resolve(config, 0, DEFAULT_MAX_CLICKS),
            cards: CardSpec {
                controls: vec![Locator::css("button").with_text("add offer|activate")],
                root: CardRoot::ClassContains("offer".to_string()),
                heading: None,
                expiration: None,
                enrolled_text: Some("\\benrolled\\b|\\badded\\b|\\bactivated\\b".to_string()),
            },
        }
    }
}

impl CitiPortal {
    async fn selected_card(page: &dyn OfferPage) -> Result<Option<String>> {
        Ok(page
            .text_of(&Locator::css(CARD_VALUE))
            .await?
            .map(|label| label.trim().to_string()))
    }
}

/// Card labels from the selector's option text, skipping the "Credit"
/// group heading.
fn card_labels(options: &str) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for line in options.lines().map(str::trim) {
        if line.is_empty() || line.eq_ignore_ascii_case("credit") {
            continue;
        }
        if !labels.iter().any(|l| l == line) {
            labels.push(line.to_string());
        }
    }
    labels
}

#[async_trait]
impl Portal for CitiPortal {
    fn bank(&self) -> Bank {
        Bank::Citi
    }

    fn settings(&self) -> &PortalSettings {
        &self.settings
    }

    fn login_url(&self) -> &str {
        LOGIN_URL
    }

    fn offers_url(&self) -> &str {
        OFFERS_URL
    }

    fn login_markers(&self) -> &[&str] {
        LOGIN_MARKERS
    }

    fn ready(&self) -> Vec<Locator> {
        vec![
            Locator::css("button").with_text("add offer|activate"),
            Locator::css("[class*='offer']").with_text("enrolled|days"),
        ]
    }

    fn expanders(&self) -> Vec<Locator> {
        vec![Locator::css("button").with_text("view more|load more|show more")]
    }

    fn card_spec(&self) -> &CardSpec {
        &self.cards
    }

    /// One scope per card in the selector; the current card when the
    /// account has no selector.
    async fn discover_scopes(
        &self,
        page: &dyn OfferPage,
        timing: &TimingConfig,
    ) -> Result<Vec<Scope>> {
        let menu = Locator::css(CARD_MENU);
        if !page.click(&menu).await? {
            debug!("No card selector; scanning the current card");
            return Ok(self.scopes());
        }
        tokio::time::sleep(timing.click_pause).await;
        let options = page
            .text_of(&Locator::css(CARD_OPTIONS))
            .await?
            .unwrap_or_default();
        page.click(&menu).await?;

        let labels = card_labels(&options);
        if labels.is_empty() {
            warn!("Card selector listed no cards");
            return Ok(self.scopes());
        }
        info!(cards = labels.len(), "Found Citi cards");
        Ok(labels.into_iter().map(Scope::card).collect())
    }

    async fn enter_scope(
        &self,
        page: &dyn OfferPage,
        scope: &Scope,
        timing: &TimingConfig,
    ) -> Result<bool> {
        let Scope::Card(label) = scope else {
            return Ok(true);
        };

        if Self::selected_card(page).await?.as_deref() != Some(label.as_str()) {
            if !page.click(&Locator::css(CARD_MENU)).await? {
                return Ok(false);
            }
            tokio::time::sleep(timing.click_pause).await;
            let option = Locator::css(CARD_OPTIONS)
                .with_text(format!("^\\s*{}\\s*$", regex::escape(label)));
            if !page.click(&option).await? {
                warn!(card = %label, "Card missing from selector");
                return Ok(false);
            }
            let selected = wait_for(timing.ready_timeout, timing.poll_interval, move || async move {
                let current = Self::selected_card(page).await?;
                Ok::<_, anyhow::Error>(current.as_deref() == Some(label.as_str()))
            })
            .await?;
            if !selected {
                return Ok(false);
            }
            tokio::time::sleep(timing.page_load_pause).await;
        }

        let ready = self.ready();
        let ready = &ready;
        let entered = wait_for(timing.ready_timeout, timing.poll_interval, move || {
            any_exists(page, ready)
        })
        .await?;
        debug!(card = %label, entered, "Selected Citi card");
        Ok(entered)
    }

    fn scope_card_info(&self, scope: &Scope) -> Option<CardInfo> {
        match scope {
            Scope::Card(label) => self.parse_card_info(label),
            _ => None,
        }
    }

    fn parse_card_info(&self, text: &str) -> Option<CardInfo> {
        ENDING_IN.captures(text).map(|caps| {
            let name = caps[1].trim();
            let name = if name.to_lowercase().starts_with("citi") {
                name.to_string()
            } else {
                format!("Citi {name}")
            };
            CardInfo::new(name, &caps[2])
        })
    }
}
