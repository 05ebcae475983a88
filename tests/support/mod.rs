#![allow(dead_code)]

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use offerbook::browser::{CardSnapshot, CardSpec, CardState, Locator, OfferPage};
use offerbook::clock::FixedClock;
use offerbook::config::{PortalConfig, SheetConfig};
use offerbook::models::fingerprint;
use regex::RegexBuilder;

pub const TEST_RSA_KEY: &str = include_str!("test_rsa_key.pem");

pub const LOGIN_URL: &str = "https://www.americanexpress.com/en-us/account/login";

const DEFAULT_PAGE_TEXT: &str = "Blue Cash Preferred®\n••••• 41007\nOffers";

// Citi's card selector.
const CARD_MENU: &str = "#cds-dropdown";
const CARD_OPTIONS: &str = "#cds-dropdown-listbox";
const CARD_VALUE: &str = "#cds-dropdown-button-value";

pub fn clock() -> FixedClock {
    FixedClock::on(chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap())
}

pub fn portal_config(refresh_rounds: u32) -> PortalConfig {
    PortalConfig {
        holder: "Pat".into(),
        refresh_rounds: Some(refresh_rounds),
        ..Default::default()
    }
}

pub fn sheet_config() -> SheetConfig {
    SheetConfig {
        spreadsheet_id: Some("sheet123".into()),
        ..Default::default()
    }
}

/// One offer tile on the fake page.
#[derive(Debug, Clone)]
pub struct FakeCard {
    pub heading: String,
    pub text: String,
    pub expiration: Option<String>,
    /// The portal accepts a click on this card.
    pub accepts: bool,
    /// Already on the card before the run.
    pub pre_enrolled: bool,
    /// Leaves the page when clicked without showing an enrolled state.
    pub vanishes: bool,
    enrolled: bool,
    gone: bool,
}

impl FakeCard {
    pub fn new(merchant: &str, terms: &str) -> Self {
        Self {
            heading: merchant.to_string(),
            text: format!("{merchant}\n{terms}\nView Details"),
            expiration: None,
            accepts: true,
            pre_enrolled: false,
            vanishes: false,
            enrolled: false,
            gone: false,
        }
    }

    pub fn expiring(mut self, text: &str) -> Self {
        self.expiration = Some(text.to_string());
        self.text = format!("{}\n{text}", self.text);
        self
    }

    pub fn rejecting(mut self) -> Self {
        self.accepts = false;
        self
    }

    pub fn pre_enrolled(mut self) -> Self {
        self.pre_enrolled = true;
        self
    }

    pub fn vanishing(mut self) -> Self {
        self.vanishes = true;
        self
    }

    fn on_page(&self) -> bool {
        !self.enrolled && !self.gone
    }

    fn fingerprint(&self) -> String {
        fingerprint(&self.text)
    }
}

/// One card account; `label` is its entry in the card selector.
struct Account {
    label: Option<String>,
    cards: Vec<FakeCard>,
}

struct State {
    url: String,
    accounts: Vec<Account>,
    selected: usize,
    menu_open: bool,
    /// Indices of cards rendered since the last navigation.
    visible: Vec<usize>,
    clicks: Vec<String>,
    reloads: usize,
}

impl State {
    fn cards(&self) -> &[FakeCard] {
        &self.accounts[self.selected].cards
    }

    fn cards_mut(&mut self) -> &mut Vec<FakeCard> {
        &mut self.accounts[self.selected].cards
    }
}

/// A scripted offers page. Cards render `window` at a time; enrolled cards
/// drop out of the grid on reload, revealing the next ones.
pub struct FakePage {
    signed_in: bool,
    window: usize,
    state: Mutex<State>,
}

impl FakePage {
    pub fn new(cards: Vec<FakeCard>) -> Self {
        Self::with_accounts(vec![Account { label: None, cards }])
    }

    /// A page with a card selector listing one entry per `(label, cards)`.
    pub fn with_card_menu(cards: Vec<(&str, Vec<FakeCard>)>) -> Self {
        Self::with_accounts(
            cards
                .into_iter()
                .map(|(label, cards)| Account {
                    label: Some(label.to_string()),
                    cards,
                })
                .collect(),
        )
    }

    fn with_accounts(accounts: Vec<Account>) -> Self {
        Self {
            signed_in: true,
            window: usize::MAX,
            state: Mutex::new(State {
                url: "about:blank".to_string(),
                accounts,
                selected: 0,
                menu_open: false,
                visible: Vec::new(),
                clicks: Vec::new(),
                reloads: 0,
            }),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            signed_in: false,
            ..Self::new(Vec::new())
        }
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    /// Merchants clicked so far, in order.
    pub fn clicked(&self) -> Vec<String> {
        self.lock().clicks.clone()
    }

    pub fn reloads(&self) -> usize {
        self.lock().reloads
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn render(&self, state: &mut State) {
        state.visible = state
            .cards()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.on_page())
            .map(|(i, _)| i)
            .take(self.window)
            .collect();
    }

    fn has_card_menu(state: &State) -> bool {
        state.accounts.iter().any(|a| a.label.is_some())
    }
}

#[async_trait]
impl OfferPage for FakePage {
    async fn goto(&self, url: &str) -> Result<()> {
        let mut state = self.lock();
        state.url = if self.signed_in { url.to_string() } else { LOGIN_URL.to_string() };
        self.render(&mut state);
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.lock().url.clone())
    }

    async fn reload(&self) -> Result<()> {
        let mut state = self.lock();
        state.reloads += 1;
        self.render(&mut state);
        Ok(())
    }

    async fn go_back(&self) -> Result<()> {
        Ok(())
    }

    async fn exists(&self, locator: &Locator) -> Result<bool> {
        // Signed-in pages show every plain selector and add-offer buttons;
        // other text-filtered controls (expanders, dialogs, detail views)
        // never appear.
        let shown = locator
            .text
            .as_deref()
            .map_or(true, |pattern| pattern.contains("add offer"));
        Ok(self.signed_in && shown)
    }

    async fn click(&self, locator: &Locator) -> Result<bool> {
        let mut state = self.lock();
        if !Self::has_card_menu(&state) {
            return Ok(false);
        }
        if locator.css == CARD_MENU {
            state.menu_open = !state.menu_open;
            return Ok(true);
        }
        if locator.css.starts_with(CARD_OPTIONS) && state.menu_open {
            let Some(pattern) = locator.text.as_deref() else {
                return Ok(false);
            };
            let pattern = RegexBuilder::new(pattern).case_insensitive(true).build()?;
            let found = state
                .accounts
                .iter()
                .position(|a| a.label.as_deref().is_some_and(|l| pattern.is_match(l)));
            let Some(i) = found else {
                return Ok(false);
            };
            state.selected = i;
            state.menu_open = false;
            self.render(&mut state);
            return Ok(true);
        }
        Ok(false)
    }

    async fn text_of(&self, locator: &Locator) -> Result<Option<String>> {
        let state = self.lock();
        if locator.css.starts_with(CARD_OPTIONS) && state.menu_open {
            let labels: Vec<&str> = std::iter::once("Credit")
                .chain(state.accounts.iter().filter_map(|a| a.label.as_deref()))
                .collect();
            return Ok(Some(labels.join("\n")));
        }
        if locator.css == CARD_VALUE {
            return Ok(state.accounts[state.selected].label.clone());
        }
        Ok(None)
    }

    async fn page_text(&self) -> Result<String> {
        let state = self.lock();
        Ok(match &state.accounts[state.selected].label {
            Some(label) => format!("Merchant Offers\n{label}\nAll offers"),
            None => DEFAULT_PAGE_TEXT.to_string(),
        })
    }

    async fn scroll_through(&self) -> Result<()> {
        Ok(())
    }

    async fn cards(&self, _spec: &CardSpec) -> Result<Vec<CardSnapshot>> {
        let state = self.lock();
        Ok(state
            .visible
            .iter()
            .map(|&i| &state.cards()[i])
            .filter(|c| c.on_page())
            .map(|c| CardSnapshot {
                text: c.text.clone(),
                heading: Some(c.heading.clone()),
                expiration: c.expiration.clone(),
                enrolled: c.pre_enrolled,
            })
            .collect())
    }

    async fn click_in_card(&self, _spec: &CardSpec, fp: &str) -> Result<bool> {
        let mut state = self.lock();
        let found = state
            .visible
            .iter()
            .copied()
            .find(|&i| state.cards()[i].on_page() && state.cards()[i].fingerprint() == fp);
        let Some(i) = found else {
            return Ok(false);
        };
        let card = &mut state.cards_mut()[i];
        let heading = card.heading.clone();
        if card.vanishes {
            card.gone = true;
        } else if card.accepts {
            card.enrolled = true;
        }
        state.clicks.push(heading);
        Ok(true)
    }

    async fn card_state(&self, _spec: &CardSpec, fp: &str) -> Result<CardState> {
        let state = self.lock();
        Ok(match state.cards().iter().find(|c| c.fingerprint() == fp) {
            Some(card) if card.gone => CardState::Gone,
            Some(card) if card.enrolled => CardState::Enrolled,
            Some(_) => CardState::Pending,
            None => CardState::Gone,
        })
    }
}
