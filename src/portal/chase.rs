use std::sync::LazyLock;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use super::{Portal, PortalSettings, Scope};
use crate::browser::{any_exists, wait_for, CardRoot, CardSpec, Locator, OfferPage};
use crate::config::{PortalConfig, TimingConfig};
use crate::models::{Bank, CardInfo};

const LOGIN_URL: &str = "https://www.chase.com/";
const OFFER_HUB_URL: &str =
    "https://secure.chase.com/web/auth/dashboard#/dashboard/merchantOffers/offer-hub";
const DASHBOARD_URL: &str = "https://secure.chase.com/web/auth/dashboard#/";
const CATEGORIES_ROUTE: &str = "/dashboard/merchantOffers/offerCategoriesPage";
const LOGIN_MARKERS: &[&str] = &["/logon", "recognizeuser", "://www.chase.com/"];
const LANDING_URLS: &[&str] = &[DASHBOARD_URL];

const DEFAULT_MAX_CLICKS: usize = 200;

const ADD_CONTROLS: &[&str] = &[
    "button[aria-label*='Add offer']",
    "[data-testid='addOfferButton']",
    "mds-icon[data-testid='commerce-tile-button']",
    "button[aria-label^='Add ']",
];

static PAY_WITH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)Pay with\s+(.*?)\s*\((?:\.\.\.|…)?(\d{4})\)").expect("valid regex")
});

static ENDING_IN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:ending in|ending\s*\*)\s*(\d{4})|\((?:\.\.\.|…)(\d{4})\)")
        .expect("valid regex")
});

pub struct ChasePortal {
    settings: PortalSettings,
    account_ids: Vec<String>,
    cards: CardSpec,
}

impl ChasePortal {
    pub fn new(config: &PortalConfig) -> Self {
        Self {
            settings: PortalSettings::resolve(config, 0, DEFAULT_MAX_CLICKS),
            account_ids: config.account_ids.clone(),
            cards: CardSpec {
                controls: ADD_CONTROLS.iter().map(|css| Locator::css(*css)).collect(),
                root: CardRoot::Closest("div".to_string()),
                heading: Some("h3, h2, [role='heading']".to_string()),
                expiration: None,
                enrolled_text: Some("added to card".to_string()),
            },
        }
    }

    fn categories_url(account_id: &str) -> String {
        format!(
            "https://secure.chase.com/web/auth/dashboard#{CATEGORIES_ROUTE}?accountId={account_id}&offerCategoryName=ALL"
        )
    }

    fn categories_shell() -> Vec<Locator> {
        vec![
            Locator::css("[data-testid='offerCategoriesPage']"),
            Locator::css("h1").with_text("offers for you"),
        ]
    }

    fn account_switcher() -> Vec<Locator> {
        vec![
            Locator::css("#select-select-credit-card-account"),
            Locator::css("#select-credit-card-account"),
            Locator::css("[data-testid='select-credit-card-account']"),
        ]
    }
}

#[async_trait]
impl Portal for ChasePortal {
    fn bank(&self) -> Bank {
        Bank::Chase
    }

    fn settings(&self) -> &PortalSettings {
        &self.settings
    }

    fn login_url(&self) -> &str {
        LOGIN_URL
    }

    fn offers_url(&self) -> &str {
        OFFER_HUB_URL
    }

    fn login_markers(&self) -> &[&str] {
        LOGIN_MARKERS
    }

    fn landing_urls(&self) -> &[&str] {
        LANDING_URLS
    }

    fn ready(&self) -> Vec<Locator> {
        let mut ready = Self::account_switcher();
        ready.push(Locator::css("h1, h2").with_text("chase offers"));
        ready
    }

    fn expanders(&self) -> Vec<Locator> {
        vec![
            Locator::css("button").with_text("show more|load more"),
            Locator::css("a").with_text("see all offers"),
        ]
    }

    fn card_spec(&self) -> &CardSpec {
        &self.cards
    }

    fn detail_marker(&self) -> Option<Locator> {
        Some(Locator::css("span").with_text("^\\s*pay with "))
    }

    fn detail_text(&self) -> Vec<Locator> {
        vec![
            Locator::css("[data-testid='offerAmount']"),
            Locator::css("[data-testid='limitations']"),
            Locator::css("[data-testid='offer-detail-text-and-disclaimer-link-container-id']"),
            Locator::css("[data-cy='offer-detail-text-and-disclaimer-link-container']"),
            Locator::css("span").with_text("^\\s*pay with "),
        ]
    }

    fn back_control(&self) -> Option<Locator> {
        Some(Locator::css("[aria-label='Back']"))
    }

    fn error_dialog_close(&self) -> Option<Locator> {
        Some(
            Locator::css("[role='dialog'] button, [class*='modal'] button")
                .with_text("close|dismiss")
                .within("unable to enroll merchant offer"),
        )
    }

    /// One scope per configured card account; the hub alone when none are
    /// configured.
    fn scopes(&self) -> Vec<Scope> {
        if self.account_ids.is_empty() {
            return vec![Scope::whole()];
        }
        self.account_ids.iter().map(Scope::account).collect()
    }

    async fn enter_scope(
        &self,
        page: &dyn OfferPage,
        scope: &Scope,
        timing: &TimingConfig,
    ) -> Result<bool> {
        let Scope::Account(account_id) = scope else {
            return Ok(true);
        };
        let account_id = account_id.as_str();

        page.goto(OFFER_HUB_URL).await?;
        let switcher = Self::account_switcher();
        let switcher = &switcher;
        if !wait_for(timing.ready_timeout, timing.poll_interval, move || {
            any_exists(page, switcher)
        })
        .await?
        {
            warn!(account_id, "Offer hub did not load");
        }

        // The hash route selects the account more reliably than the dropdown.
        page.goto(&Self::categories_url(account_id)).await?;
        tokio::time::sleep(timing.page_load_pause).await;

        let mut markers = ADD_CONTROLS
            .iter()
            .map(|css| Locator::css(*css))
            .collect::<Vec<_>>();
        markers.extend(Self::categories_shell());
        let markers = &markers;

        let entered = wait_for(timing.ready_timeout, timing.poll_interval, move || async move {
            let url = page.current_url().await?;
            if !(url.contains(CATEGORIES_ROUTE) && url.contains(account_id)) {
                return Ok(false);
            }
            any_exists(page, markers).await
        })
        .await?;

        debug!(account_id, entered, "Entered Chase account");
        Ok(entered)
    }

    /// The detail view reads "Pay with Freedom Flex (...1234)".
    fn parse_card_info(&self, text: &str) -> Option<CardInfo> {
        if let Some(caps) = PAY_WITH.captures(text) {
            let name = caps[1].trim();
            let name = if name.is_empty() {
                "Chase Card".to_string()
            } else if name.to_lowercase().ends_with("card") {
                name.to_string()
            } else {
                format!("{name} Card")
            };
            return Some(CardInfo::new(name, &caps[2]));
        }
        ENDING_IN.captures(text).and_then(|caps| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .map(|m| CardInfo::new("Chase Card", m.as_str()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn portal(ids: &[&str]) -> ChasePortal {
        ChasePortal::new(&PortalConfig {
            account_ids: ids.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        })
    }

    #[test]
    fn one_scope_per_account() {
        let scopes = portal(&["111", "222"]).scopes();
        assert_eq!(scopes, vec![Scope::account("111"), Scope::account("222")]);
        assert_eq!(portal(&[]).scopes(), vec![Scope::whole()]);
    }

    #[test]
    fn categories_route_carries_account() {
        let url = ChasePortal::categories_url("571406113");
        assert!(url.ends_with(
            "#/dashboard/merchantOffers/offerCategoriesPage?accountId=571406113&offerCategoryName=ALL"
        ));
    }

    #[test]
    fn card_info_from_pay_with_line() {
        let info = portal(&[])
            .parse_card_info("Acme\nPay with Freedom Flex (...1234)\nTerms")
            .unwrap();
        assert_eq!(info.name, "Freedom Flex Card");
        assert_eq!(info.last_four, "1234");
    }

    #[test]
    fn card_info_from_ending_in() {
        let info = portal(&[]).parse_card_info("Card ending in 9876").unwrap();
        assert_eq!(info.name, "Chase Card");
        assert_eq!(info.last_four, "9876");
        assert_eq!(portal(&[]).parse_card_info("No card here"), None);
    }

    #[test]
    fn signed_out_urls() {
        let p = portal(&[]);
        assert!(p.is_login_url("https://secure.chase.com/web/auth/#/logon/logon/chaseOnline"));
        assert!(p.is_login_url("https://www.chase.com/"));
        assert!(!p.is_login_url(OFFER_HUB_URL));
    }
}
