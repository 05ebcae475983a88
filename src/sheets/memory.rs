//! In-memory spreadsheet for tests and dry runs.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;

use super::{CellUpdate, OfferSheet};
use crate::error::SheetError;

#[derive(Default)]
struct State {
    worksheets: HashMap<String, Vec<Vec<String>>>,
    append_calls: usize,
    filter_resets: usize,
}

/// Worksheets held as row vectors. Reads of a missing worksheet return no
/// rows; writes to one fail like the real API does.
#[derive(Default)]
pub struct MemorySheet {
    state: Mutex<State>,
}

impl MemorySheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a worksheet with rows, header first.
    pub fn with_rows(self, title: &str, rows: Vec<Vec<String>>) -> Self {
        self.lock().worksheets.insert(title.to_string(), rows);
        self
    }

    pub fn rows(&self, title: &str) -> Vec<Vec<String>> {
        self.lock().worksheets.get(title).cloned().unwrap_or_default()
    }

    /// Number of `append_rows` calls so far.
    pub fn append_calls(&self) -> usize {
        self.lock().append_calls
    }

    pub fn filter_resets(&self) -> usize {
        self.lock().filter_resets
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn worksheet<'a>(state: &'a mut State, title: &str) -> Result<&'a mut Vec<Vec<String>>> {
    state
        .worksheets
        .get_mut(title)
        .ok_or_else(|| SheetError::MissingWorksheet(title.to_string()).into())
}

#[async_trait::async_trait]
impl OfferSheet for MemorySheet {
    async fn ensure_worksheet(&self, title: &str, headers: &[&str]) -> Result<()> {
        let mut state = self.lock();
        let rows = state.worksheets.entry(title.to_string()).or_default();
        let header: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
        match rows.first_mut() {
            Some(first) => *first = header,
            None => rows.push(header),
        }
        Ok(())
    }

    async fn read_rows(&self, title: &str) -> Result<Vec<Vec<String>>> {
        Ok(self.rows(title))
    }

    async fn append_rows(&self, title: &str, rows: &[Vec<String>]) -> Result<()> {
        let mut state = self.lock();
        state.append_calls += 1;
        worksheet(&mut state, title)?.extend(rows.iter().cloned());
        Ok(())
    }

    async fn update_cells(&self, title: &str, updates: &[CellUpdate]) -> Result<()> {
        let mut state = self.lock();
        let rows = worksheet(&mut state, title)?;
        for update in updates {
            if update.row == 0 || update.column == 0 {
                continue;
            }
            if rows.len() < update.row {
                rows.resize(update.row, Vec::new());
            }
            let row = &mut rows[update.row - 1];
            if row.len() < update.column {
                row.resize(update.column, String::new());
            }
            row[update.column - 1] = update.value.clone();
        }
        Ok(())
    }

    async fn delete_rows(&self, title: &str, rows: &[usize]) -> Result<()> {
        let mut state = self.lock();
        let sheet = worksheet(&mut state, title)?;
        let mut doomed = rows.to_vec();
        doomed.sort_unstable_by(|a, b| b.cmp(a));
        doomed.dedup();
        for row in doomed {
            if row >= 1 && row <= sheet.len() {
                sheet.remove(row - 1);
            }
        }
        Ok(())
    }

    async fn reset_filter(&self, title: &str, _columns: usize) -> Result<()> {
        let mut state = self.lock();
        worksheet(&mut state, title)?;
        state.filter_resets += 1;
        Ok(())
    }
}
