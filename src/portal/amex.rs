use std::sync::LazyLock;

use regex::Regex;

use super::{Portal, PortalSettings};
use crate::browser::{CardRoot, CardSpec, Locator};
use crate::config::PortalConfig;
use crate::models::{Bank, CardInfo};

const LOGIN_URL: &str = "https://www.americanexpress.com/en-us/account/login";
const OFFERS_URL: &str = "https://global.americanexpress.com/offers";
const LANDING_URLS: &[&str] = &[
    "https://global.americanexpress.com/overview",
    "https://global.americanexpress.com/dashboard",
];
const LOGIN_MARKERS: &[&str] = &["/account/login", "/login?"];

/// The offers grid shows ~100 offers at a time; reloading after enrolling
/// reveals the next batch.
const DEFAULT_REFRESH_ROUNDS: u32 = 3;
const DEFAULT_MAX_CLICKS: usize = 800;

static CARD_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z0-9 &'’\-®]+?)\s*\n?\s*[•*]{3,}\s*(\d{4,5})")
        .expect("valid regex")
});

static MASKED_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[•*]+\s*(\d{4,5})").expect("valid regex"));

pub struct AmexPortal {
    settings: PortalSettings,
    cards: CardSpec,
}

impl AmexPortal {
    pub fn new(config: &PortalConfig) -> Self {
        Self {
            settings: PortalSettings::resolve(config, DEFAULT_REFRESH_ROUNDS, DEFAULT_MAX_CLICKS),
            cards: CardSpec {
                controls: vec![Locator::css(
                    "button[data-testid='merchantOfferListAddButton']",
                )],
                root: CardRoot::TextMatches("View Details|Terms apply|Expires".to_string()),
                heading: Some("h3 span, h3".to_string()),
                expiration: Some("[data-testid='expirationDate']".to_string()),
                enrolled_text: Some("added to card".to_string()),
            },
        }
    }
}

impl Portal for AmexPortal {
    fn bank(&self) -> Bank {
        Bank::Amex
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

    fn landing_urls(&self) -> &[&str] {
        LANDING_URLS
    }

    fn ready(&self) -> Vec<Locator> {
        vec![
            Locator::css("button[data-testid='merchantOfferListAddButton']"),
            Locator::css("[data-testid='expirationDate']"),
        ]
    }

    fn expanders(&self) -> Vec<Locator> {
        vec![Locator::css("button").with_text("view more|load more|show more")]
    }

    fn card_spec(&self) -> &CardSpec {
        &self.cards
    }

    /// Added offers drop out of the eligible grid.
    fn vanished_card_is_enrolled(&self) -> bool {
        true
    }

    /// The account switcher shows e.g. "Blue Cash Preferred® ••••• 41007".
    fn parse_card_info(&self, text: &str) -> Option<CardInfo> {
        if let Some(caps) = CARD_NAME.captures(text) {
            let name = caps[1].trim();
            let digits = &caps[2];
            let last_four = &digits[digits.len() - 4..];
            if !name.is_empty() {
                return Some(CardInfo::new(name, last_four));
            }
        }
        MASKED_DIGITS.captures(text).map(|caps| {
            let digits = &caps[1];
            CardInfo::new("Amex Card", &digits[digits.len() - 4..])
        })
    }
}
