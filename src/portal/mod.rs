//! Per-bank knowledge: URLs, selectors and card-info parsing.
//!
//! The pipeline is written once against [`Portal`]; each bank supplies one
//! implementation.

mod amex;
mod chase;
mod citi;

pub use amex::AmexPortal;
pub use chase::ChasePortal;
pub use citi::CitiPortal;

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;

use crate::browser::{CardSpec, Locator, OfferPage};
use crate::config::{PortalConfig, TimingConfig};
use crate::models::{Bank, CardInfo};

/// One card/account view inside a portal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Scope {
    /// The portal's only view.
    #[default]
    Whole,
    /// Account id reached by URL (Chase).
    Account(String),
    /// Card picked by its label in an on-page selector (Citi).
    Card(String),
}

impl Scope {
    pub fn whole() -> Self {
        Self::Whole
    }

    pub fn account(id: impl Into<String>) -> Self {
        Self::Account(id.into())
    }

    pub fn card(label: impl Into<String>) -> Self {
        Self::Card(label.into())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Whole => f.write_str("offers"),
            Scope::Account(id) => write!(f, "account {id}"),
            Scope::Card(label) => write!(f, "card {label:?}"),
        }
    }
}

/// Settings every portal carries, resolved from [`PortalConfig`].
#[derive(Debug, Clone)]
pub struct PortalSettings {
    pub holder: String,
    pub local_keywords: Vec<String>,
    pub refresh_rounds: u32,
    pub max_clicks: usize,
}

impl PortalSettings {
    fn resolve(config: &PortalConfig, refresh_rounds: u32, max_clicks: usize) -> Self {
        Self {
            holder: config.holder.clone(),
            local_keywords: config.local_keywords.clone(),
            refresh_rounds: config.refresh_rounds.unwrap_or(refresh_rounds),
            max_clicks: config.max_clicks.unwrap_or(max_clicks),
        }
    }
}

#[async_trait]
pub trait Portal: Send + Sync {
    fn bank(&self) -> Bank;

    fn settings(&self) -> &PortalSettings;

    fn login_url(&self) -> &str;

    fn offers_url(&self) -> &str;

    /// URL fragments that only appear while signed out.
    fn login_markers(&self) -> &[&str];

    fn is_login_url(&self, url: &str) -> bool {
        let url = url.to_ascii_lowercase();
        self.login_markers().iter().any(|m| url.contains(m))
    }

    /// Signed-in pages the portal lands on that are not the offers page.
    /// The session opener navigates from these to [`Portal::offers_url`].
    fn landing_urls(&self) -> &[&str] {
        &[]
    }

    /// Elements that prove the offers page is loaded and authenticated.
    fn ready(&self) -> Vec<Locator>;

    /// "View more" style buttons clicked once before scraping.
    fn expanders(&self) -> Vec<Locator>;

    fn card_spec(&self) -> &CardSpec;

    /// Element that appears when a click opened an offer detail view.
    fn detail_marker(&self) -> Option<Locator> {
        None
    }

    /// Containers holding the terms on the detail view.
    fn detail_text(&self) -> Vec<Locator> {
        Vec::new()
    }

    /// In-page back control for leaving the detail view.
    fn back_control(&self) -> Option<Locator> {
        None
    }

    /// A clicked card that leaves the page counts as enrolled.
    fn vanished_card_is_enrolled(&self) -> bool {
        false
    }

    /// Close button of an enrollment error dialog.
    fn error_dialog_close(&self) -> Option<Locator> {
        None
    }

    /// Scopes known from configuration alone.
    fn scopes(&self) -> Vec<Scope> {
        vec![Scope::whole()]
    }

    /// Scopes to visit on the loaded offers page, in order.
    async fn discover_scopes(
        &self,
        _page: &dyn OfferPage,
        _timing: &TimingConfig,
    ) -> Result<Vec<Scope>> {
        Ok(self.scopes())
    }

    /// Navigate to `scope` and wait until its offers are showing.
    async fn enter_scope(
        &self,
        _page: &dyn OfferPage,
        _scope: &Scope,
        _timing: &TimingConfig,
    ) -> Result<bool> {
        Ok(true)
    }

    /// Card a scope stands for, when the scope itself names it.
    fn scope_card_info(&self, _scope: &Scope) -> Option<CardInfo> {
        None
    }

    /// Card name and last four digits, from page or detail text.
    fn parse_card_info(&self, text: &str) -> Option<CardInfo>;
}

/// The portal implementation for `bank`.
pub fn portal_for(bank: Bank, config: &PortalConfig) -> Box<dyn Portal> {
    match bank {
        Bank::Amex => Box::new(AmexPortal::new(config)),
        Bank::Chase => Box::new(ChasePortal::new(config)),
        Bank::Citi => Box::new(CitiPortal::new(config)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portal_for_matches_bank() {
        let config = PortalConfig::default();
        for bank in Bank::ALL {
            assert_eq!(portal_for(bank, &config).bank(), bank);
        }
    }

    #[test]
    fn config_overrides_portal_defaults() {
        let config = PortalConfig {
            holder: "Pat".into(),
            refresh_rounds: Some(1),
            max_clicks: Some(5),
            ..Default::default()
        };
        let portal = portal_for(Bank::Amex, &config);
        assert_eq!(portal.settings().holder, "Pat");
        assert_eq!(portal.settings().refresh_rounds, 1);
        assert_eq!(portal.settings().max_clicks, 5);
    }

    #[test]
    fn only_amex_trusts_vanished_cards() {
        let config = PortalConfig::default();
        for bank in Bank::ALL {
            assert_eq!(
                portal_for(bank, &config).vanished_card_is_enrolled(),
                bank == Bank::Amex
            );
        }
    }

    #[test]
    fn login_urls_are_recognized() {
        let config = PortalConfig::default();
        let amex = portal_for(Bank::Amex, &config);
        assert!(amex.is_login_url("https://www.americanexpress.com/en-us/account/login?inav=x"));
        assert!(!amex.is_login_url("https://global.americanexpress.com/offers/eligible"));

        let citi = portal_for(Bank::Citi, &config);
        assert!(citi.is_login_url("https://online.citi.com/US/login.do"));
        assert!(!citi.is_login_url("https://online.citi.com/US/merchantoffers"));
    }

    #[test]
    fn single_scope_by_default() {
        let citi = portal_for(Bank::Citi, &PortalConfig::default());
        assert_eq!(citi.scopes(), vec![Scope::whole()]);
        assert_eq!(Scope::whole().to_string(), "offers");
        assert_eq!(Scope::account("42").to_string(), "account 42");
        assert_eq!(Scope::card("Citi Custom Cash - 1234").to_string(), "card \"Citi Custom Cash - 1234\"");
    }
}
