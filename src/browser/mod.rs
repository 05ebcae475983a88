//! Page abstraction used by the scraper and the enrollment actuator.
//!
//! [`OfferPage`] is the only surface the pipeline touches. The Chromium
//! implementation lives in [`chrome`] behind the `browser` feature; tests
//! drive a scripted fake.

#[cfg(feature = "browser")]
pub mod chrome;
pub mod session;

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An element on the page: a CSS selector, optionally narrowed by a
/// case-insensitive pattern on the element's text (or `aria-label`) and by
/// a pattern on the text of any ancestor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub css: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub within: Option<String>,
}

impl Locator {
    pub fn css(css: impl Into<String>) -> Self {
        Self {
            css: css.into(),
            text: None,
            within: None,
        }
    }

    pub fn with_text(mut self, pattern: impl Into<String>) -> Self {
        self.text = Some(pattern.into());
        self
    }

    pub fn within(mut self, pattern: impl Into<String>) -> Self {
        self.within = Some(pattern.into());
        self
    }
}

/// How a card's root element is found from its add control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CardRoot {
    /// `element.closest(selector)`
    Closest(String),
    /// Nearest ancestor whose text matches the pattern.
    TextMatches(String),
    /// Nearest ancestor whose class attribute contains the value.
    ClassContains(String),
}

/// Where offer cards live on a portal page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSpec {
    /// Add/activate controls. Each visible control marks one card.
    pub controls: Vec<Locator>,
    pub root: CardRoot,
    /// Heading selector inside the card.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    /// Expiration selector inside the card.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<String>,
    /// Card text pattern meaning the offer is already on the card.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrolled_text: Option<String>,
}

/// One card as read from the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSnapshot {
    pub text: String,
    #[serde(default)]
    pub heading: Option<String>,
    #[serde(default)]
    pub expiration: Option<String>,
    #[serde(default)]
    pub enrolled: bool,
}

/// State of a card after its control was clicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardState {
    /// The add control is still showing.
    Pending,
    /// The card shows its enrolled marker or lost its add control.
    Enrolled,
    /// No card with that fingerprint is on the page.
    Gone,
}

#[async_trait]
pub trait OfferPage: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    async fn reload(&self) -> Result<()>;

    /// History back.
    async fn go_back(&self) -> Result<()>;

    async fn exists(&self, locator: &Locator) -> Result<bool>;

    /// Click the first visible match. Returns `false` when nothing matched.
    async fn click(&self, locator: &Locator) -> Result<bool>;

    /// Text of every match, newline-joined. `None` when nothing matched.
    async fn text_of(&self, locator: &Locator) -> Result<Option<String>>;

    /// `document.body.innerText`.
    async fn page_text(&self) -> Result<String>;

    /// Scroll top to bottom and back so lazy grids render.
    async fn scroll_through(&self) -> Result<()>;

    /// Cards that still show an add control, in page order.
    async fn cards(&self, spec: &CardSpec) -> Result<Vec<CardSnapshot>>;

    /// Click the add control of the card with this fingerprint.
    async fn click_in_card(&self, spec: &CardSpec, fingerprint: &str) -> Result<bool>;

    async fn card_state(&self, spec: &CardSpec, fingerprint: &str) -> Result<CardState>;
}

/// Poll `check` every `interval` until it yields `true` or `timeout` passes.
pub async fn wait_for<F, Fut>(timeout: Duration, interval: Duration, mut check: F) -> Result<bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let start = tokio::time::Instant::now();
    loop {
        if check().await? {
            return Ok(true);
        }
        if start.elapsed() >= timeout {
            return Ok(false);
        }
        tokio::time::sleep(interval).await;
    }
}

/// True when any locator matches.
pub async fn any_exists(page: &dyn OfferPage, locators: &[Locator]) -> Result<bool> {
    for locator in locators {
        if page.exists(locator).await? {
            return Ok(true);
        }
    }
    Ok(false)
}
