//! Error taxonomy for a portal run.
//!
//! Session and sheet errors end the run. Offer errors are logged and the
//! pipeline moves on to the next card.

use crate::models::Bank;

/// Failure to obtain an authenticated portal page. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Chrome/Chromium not found. Install Chrome or set browser.chrome_executable")]
    BrowserNotFound,

    #[error("Failed to start browser: {0}")]
    Launch(String),

    #[error(
        "{bank} session is not authenticated (last url: {url}). \
         Run `offerbook login {bank}` and sign in with this profile first"
    )]
    NotAuthenticated { bank: Bank, url: String },
}

/// Failure on a single offer card.
#[derive(Debug, thiserror::Error)]
pub enum OfferError {
    #[error("no merchant recognized in offer text {text:?}")]
    MissingMerchant { text: String },

    #[error("could not locate offer card {fingerprint:?} on the page")]
    CardNotFound { fingerprint: String },

    #[error("enrollment for {merchant} was not confirmed")]
    NotConfirmed { merchant: String },
}

/// Failure talking to the spreadsheet backend.
#[derive(Debug, thiserror::Error)]
pub enum SheetError {
    #[error("Google auth failed: {0}")]
    Auth(String),

    #[error("Sheets API request failed ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("worksheet {0:?} not found")]
    MissingWorksheet(String),
}
