//! Operator commands that clean up an existing offers worksheet.

use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::info;

use super::{CellUpdate, Columns, OfferSheet};
use crate::normalize::dates::{format_sheet_date, parse_date};

const DATE_COLUMNS: [&str; 2] = ["Date Added", "Expiration"];
const EXPIRATION: &str = "Expiration";

/// Delete every row whose dedupe key appeared on an earlier row. Returns the
/// number of rows removed.
pub async fn dedupe_rows(sheet: &dyn OfferSheet, worksheet: &str) -> Result<usize> {
    let rows = sheet
        .read_rows(worksheet)
        .await
        .with_context(|| format!("Failed to read worksheet {worksheet:?}"))?;
    let Some((header, body)) = rows.split_first() else {
        return Ok(0);
    };
    let columns = Columns::from_header(header)
        .with_context(|| format!("Worksheet {worksheet:?} has no Brand column"))?;

    let mut seen = HashSet::new();
    let doomed: Vec<usize> = body
        .iter()
        .enumerate()
        .filter_map(|(i, row)| {
            let key = columns.key(row)?;
            // Data starts on sheet row 2.
            (!seen.insert(key)).then_some(i + 2)
        })
        .collect();

    if !doomed.is_empty() {
        sheet.delete_rows(worksheet, &doomed).await?;
    }
    info!(worksheet, removed = doomed.len(), "Deduplicated offers");
    Ok(doomed.len())
}

/// Rewrite recognizable dates in the date columns as `Mon DD, YYYY`.
/// Returns the number of cells changed.
pub async fn normalize_dates(sheet: &dyn OfferSheet, worksheet: &str) -> Result<usize> {
    let rows = sheet
        .read_rows(worksheet)
        .await
        .with_context(|| format!("Failed to read worksheet {worksheet:?}"))?;
    let Some((header, body)) = rows.split_first() else {
        return Ok(0);
    };
    let columns: Vec<usize> = header
        .iter()
        .enumerate()
        .filter(|(_, h)| DATE_COLUMNS.iter().any(|d| h.trim().eq_ignore_ascii_case(d)))
        .map(|(i, _)| i)
        .collect();

    let mut updates = Vec::new();
    for (i, row) in body.iter().enumerate() {
        for &column in &columns {
            let Some(cell) = row.get(column) else { continue };
            let Some(date) = parse_date(cell) else { continue };
            let canonical = format_sheet_date(date);
            if cell.trim() != canonical {
                updates.push(CellUpdate {
                    row: i + 2,
                    column: column + 1,
                    value: canonical,
                });
            }
        }
    }

    if !updates.is_empty() {
        sheet.update_cells(worksheet, &updates).await?;
    }
    info!(worksheet, cells = updates.len(), "Normalized dates");
    Ok(updates.len())
}

/// Delete rows whose Expiration is before `today`. Blank or unreadable
/// expirations are kept. Returns the number of rows removed.
pub async fn delete_expired(
    sheet: &dyn OfferSheet,
    worksheet: &str,
    today: NaiveDate,
) -> Result<usize> {
    let rows = sheet
        .read_rows(worksheet)
        .await
        .with_context(|| format!("Failed to read worksheet {worksheet:?}"))?;
    let Some((header, body)) = rows.split_first() else {
        return Ok(0);
    };
    let column = header
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(EXPIRATION))
        .with_context(|| format!("Worksheet {worksheet:?} has no Expiration column"))?;

    let expired: Vec<usize> = body
        .iter()
        .enumerate()
        .filter(|(_, row)| {
            row.get(column)
                .and_then(|cell| parse_date(cell))
                .is_some_and(|date| date < today)
        })
        .map(|(i, _)| i + 2)
        .collect();

    if !expired.is_empty() {
        sheet.delete_rows(worksheet, &expired).await?;
    }
    info!(worksheet, removed = expired.len(), %today, "Deleted expired offers");
    Ok(expired.len())
}
