use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use super::{log_row, offer_row, Columns, OfferSheet, LOG_HEADERS, OFFER_HEADERS};
use crate::config::SheetConfig;
use crate::models::Offer;
use crate::normalize::SeenOffers;

/// Appends offers to the offers worksheet and events to the log worksheet.
pub struct SheetSync<'a> {
    sheet: &'a dyn OfferSheet,
    worksheet: String,
    log_worksheet: String,
    chunk_size: usize,
}

impl<'a> SheetSync<'a> {
    pub fn new(sheet: &'a dyn OfferSheet, config: &SheetConfig) -> Self {
        Self {
            sheet,
            worksheet: config.worksheet.clone(),
            log_worksheet: config.log_worksheet.clone(),
            chunk_size: config.append_chunk_size.max(1),
        }
    }

    pub fn worksheet(&self) -> &str {
        &self.worksheet
    }

    /// Create both worksheets if needed and repair their header rows.
    pub async fn prepare(&self) -> Result<()> {
        self.sheet
            .ensure_worksheet(&self.worksheet, &OFFER_HEADERS)
            .await
            .with_context(|| format!("Failed to prepare worksheet {:?}", self.worksheet))?;
        self.sheet
            .ensure_worksheet(&self.log_worksheet, &LOG_HEADERS)
            .await
            .with_context(|| format!("Failed to prepare worksheet {:?}", self.log_worksheet))?;
        Ok(())
    }

    /// Dedupe keys of every offer row already in the sheet.
    pub async fn existing_keys(&self) -> Result<SeenOffers> {
        let rows = self
            .sheet
            .read_rows(&self.worksheet)
            .await
            .with_context(|| format!("Failed to read worksheet {:?}", self.worksheet))?;
        let Some((header, body)) = rows.split_first() else {
            return Ok(SeenOffers::new());
        };
        let Some(columns) = Columns::from_header(header) else {
            warn!(worksheet = %self.worksheet, "No Brand column; treating sheet as empty");
            return Ok(SeenOffers::new());
        };
        let seen: SeenOffers = body.iter().filter_map(|row| columns.key(row)).collect();
        debug!(rows = body.len(), keys = seen.len(), "Loaded existing offers");
        Ok(seen)
    }

    /// Append `offers` in order, `chunk_size` rows per request. Returns the
    /// number of rows written; no request is made for an empty slice.
    pub async fn append(&self, offers: &[Offer]) -> Result<usize> {
        if offers.is_empty() {
            return Ok(0);
        }
        let rows: Vec<Vec<String>> = offers.iter().map(offer_row).collect();
        for chunk in rows.chunks(self.chunk_size) {
            self.sheet
                .append_rows(&self.worksheet, chunk)
                .await
                .with_context(|| format!("Failed to append {} rows", chunk.len()))?;
        }
        info!(worksheet = %self.worksheet, rows = rows.len(), "Appended offers");
        self.refresh_filter().await;
        Ok(rows.len())
    }

    /// Reapply the basic filter over all offer columns. Failures are logged.
    pub async fn refresh_filter(&self) {
        if let Err(err) = self.sheet.reset_filter(&self.worksheet, OFFER_HEADERS.len()).await {
            warn!(error = %err, "Could not reset sheet filter");
        }
    }

    /// Append one line to the log worksheet. Failures are logged, never
    /// returned.
    pub async fn log(&self, time: NaiveDateTime, level: &str, function: &str, message: &str) {
        let row = log_row(time, level, function, message);
        if let Err(err) = self.sheet.append_rows(&self.log_worksheet, &[row]).await {
            warn!(error = %err, "Could not write to log worksheet");
        }
    }
}
