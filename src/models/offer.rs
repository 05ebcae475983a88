use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Amount, Bank, RewardCategory};
use crate::normalize::text::collapse_whitespace;

/// Placeholder written when a card's last four digits cannot be read.
pub const UNKNOWN_LAST_FOUR: &str = "XXXX";

/// Text captured from one offer card, before any cleaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOffer {
    pub bank: Bank,
    /// Collapsed card text used to find the card again on the page.
    pub fingerprint: String,
    /// Full `innerText` of the card.
    pub text: String,
    /// Heading element text, usually the merchant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    /// Dedicated expiration element text, when the portal has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_text: Option<String>,
    /// The card shows no add/activate control.
    #[serde(default)]
    pub enrolled: bool,
}

impl RawOffer {
    pub fn new(bank: Bank, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            bank,
            fingerprint: fingerprint(&text),
            text,
            heading: None,
            expiration_text: None,
            enrolled: false,
        }
    }

    pub fn with_heading(mut self, heading: impl Into<String>) -> Self {
        self.heading = Some(heading.into());
        self
    }

    pub fn with_expiration_text(mut self, text: impl Into<String>) -> Self {
        self.expiration_text = Some(text.into());
        self
    }

    pub fn with_enrolled(mut self, enrolled: bool) -> Self {
        self.enrolled = enrolled;
        self
    }
}

/// First 200 characters of the whitespace-collapsed card text.
pub fn fingerprint(text: &str) -> String {
    collapse_whitespace(text).chars().take(200).collect()
}

/// The card an offer is enrolled on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardInfo {
    pub name: String,
    pub last_four: String,
}

impl CardInfo {
    pub fn new(name: impl Into<String>, last_four: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            last_four: last_four.into(),
        }
    }

    pub fn unknown(bank: Bank) -> Self {
        Self::new(format!("{} Card", bank.display_name()), UNKNOWN_LAST_FOUR)
    }
}

/// Identity of an offer in the sheet: folded merchant and description.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DedupeKey(String);

impl DedupeKey {
    pub fn new(merchant: &str, description: &str) -> Self {
        Self(format!(
            "{}\u{1f}{}",
            fold(merchant),
            fold(description)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn fold(s: &str) -> String {
    collapse_whitespace(s).to_lowercase()
}

impl fmt::Display for DedupeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.replace('\u{1f}', " | "))
    }
}

/// A normalized offer, one spreadsheet row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub source_bank: Bank,
    merchant: String,
    description: String,
    dedupe_key: DedupeKey,
    pub holder: String,
    pub card: CardInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<RewardCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_discount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_spend: Option<Decimal>,
    pub date_added: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<NaiveDate>,
    #[serde(default)]
    pub local: bool,
    #[serde(default)]
    pub enrolled: bool,
}

impl Offer {
    pub fn new(
        source_bank: Bank,
        merchant: impl Into<String>,
        description: impl Into<String>,
        date_added: NaiveDate,
    ) -> Self {
        let merchant = merchant.into();
        let description = description.into();
        Self {
            source_bank,
            dedupe_key: DedupeKey::new(&merchant, &description),
            merchant,
            description,
            holder: String::new(),
            card: CardInfo::unknown(source_bank),
            amount: None,
            category: None,
            max_discount: None,
            min_spend: None,
            date_added,
            expiration: None,
            local: false,
            enrolled: false,
        }
    }

    pub fn merchant(&self) -> &str {
        &self.merchant
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn dedupe_key(&self) -> &DedupeKey {
        &self.dedupe_key
    }

    pub fn with_holder(mut self, holder: impl Into<String>) -> Self {
        self.holder = holder.into();
        self
    }

    pub fn with_card(mut self, card: CardInfo) -> Self {
        self.card = card;
        self
    }

    pub fn with_amount(mut self, amount: Amount) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_expiration(mut self, expiration: NaiveDate) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn with_enrolled(mut self, enrolled: bool) -> Self {
        self.enrolled = enrolled;
        self
    }
}
