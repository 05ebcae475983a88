//! Spreadsheet persistence: the offers worksheet and the run log.

pub mod auth;
mod google;
pub mod maintenance;
mod memory;
mod sync;

pub use google::GoogleSheet;
pub use memory::MemorySheet;
pub use sync::SheetSync;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::models::{format_dollars, DedupeKey, Offer};
use crate::normalize::dates::format_sheet_date;

pub const OFFER_HEADERS: [&str; 14] = [
    "Bank",
    "Card Holder",
    "Last Four",
    "Card Name",
    "Brand",
    "Description",
    "Discount",
    "Category",
    "Maximum Discount",
    "Minimum Spend",
    "Date Added",
    "Expiration",
    "Local",
    "Enrolled",
];

pub const LOG_HEADERS: [&str; 4] = ["Time", "Level", "Function", "Message"];

/// One cell write. Row and column are 1-based, row 1 being the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellUpdate {
    pub row: usize,
    pub column: usize,
    pub value: String,
}

/// A spreadsheet of named worksheets holding rows of plain strings.
#[async_trait]
pub trait OfferSheet: Send + Sync {
    /// Create the worksheet when missing and make row 1 equal `headers`.
    async fn ensure_worksheet(&self, title: &str, headers: &[&str]) -> Result<()>;

    /// Every row, header included. Short rows are not padded.
    async fn read_rows(&self, title: &str) -> Result<Vec<Vec<String>>>;

    /// Append after the last row, in order.
    async fn append_rows(&self, title: &str, rows: &[Vec<String>]) -> Result<()>;

    async fn update_cells(&self, title: &str, updates: &[CellUpdate]) -> Result<()>;

    /// Delete whole rows by 1-based row number.
    async fn delete_rows(&self, title: &str, rows: &[usize]) -> Result<()>;

    /// Replace the basic filter with one covering the first `columns`
    /// columns of every row.
    async fn reset_filter(&self, title: &str, columns: usize) -> Result<()>;
}

/// The sheet row for `offer`, in [`OFFER_HEADERS`] order.
pub fn offer_row(offer: &Offer) -> Vec<String> {
    vec![
        offer.source_bank.display_name().to_string(),
        offer.holder.clone(),
        offer.card.last_four.clone(),
        offer.card.name.clone(),
        offer.merchant().to_string(),
        offer.description().to_string(),
        offer.amount.as_ref().map(|a| a.to_string()).unwrap_or_default(),
        offer.category.map(|c| c.to_string()).unwrap_or_default(),
        offer.max_discount.map(format_dollars).unwrap_or_default(),
        offer.min_spend.map(format_dollars).unwrap_or_default(),
        format_sheet_date(offer.date_added),
        offer.expiration.map(format_sheet_date).unwrap_or_default(),
        yes_no(offer.local),
        yes_no(offer.enrolled),
    ]
}

pub fn log_row(time: NaiveDateTime, level: &str, function: &str, message: &str) -> Vec<String> {
    vec![
        time.format("%Y-%m-%d %H:%M:%S").to_string(),
        level.to_string(),
        function.to_string(),
        message.to_string(),
    ]
}

fn yes_no(flag: bool) -> String {
    if flag { "Yes" } else { "No" }.to_string()
}

/// Locates offer columns by header name so reordered sheets still map.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Columns {
    brand: usize,
    description: usize,
}

impl Columns {
    pub(crate) fn from_header(header: &[String]) -> Option<Self> {
        let position = |name: &str| header.iter().position(|h| h.trim().eq_ignore_ascii_case(name));
        Some(Self {
            brand: position("Brand")?,
            description: position("Description").or_else(|| position("Discount"))?,
        })
    }

    /// `None` for rows without a brand.
    pub(crate) fn key(&self, row: &[String]) -> Option<DedupeKey> {
        let brand = row.get(self.brand).map(|s| s.trim()).unwrap_or_default();
        if brand.is_empty() {
            return None;
        }
        let description = row.get(self.description).map(String::as_str).unwrap_or_default();
        Some(DedupeKey::new(brand, description))
    }
}
