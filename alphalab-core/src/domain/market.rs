//! PriceTable — date-aligned daily closes with explicit gaps.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("price table has no dates")]
    Empty,
    #[error("dates must be strictly ascending (violation at index {index})")]
    UnsortedDates { index: usize },
    #[error("column for {ticker} has {column_len} rows, expected {expected}")]
    ColumnLengthMismatch {
        ticker: String,
        column_len: usize,
        expected: usize,
    },
}

/// Daily close prices for a universe, aligned on a shared date axis.
///
/// A `None` entry is a data gap (halt, listing gap, missing vendor row).
/// Gaps are carried, not repaired: the engine skips marking and never
/// trades a ticker on a gap day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTable {
    dates: Vec<NaiveDate>,
    closes: HashMap<String, Vec<Option<f64>>>,
}

impl PriceTable {
    /// Build from a shared date axis and per-ticker close columns.
    pub fn new(
        dates: Vec<NaiveDate>,
        closes: HashMap<String, Vec<Option<f64>>>,
    ) -> Result<Self, MarketDataError> {
        if dates.is_empty() {
            return Err(MarketDataError::Empty);
        }
        for (index, pair) in dates.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(MarketDataError::UnsortedDates { index: index + 1 });
            }
        }
        for (ticker, column) in &closes {
            if column.len() != dates.len() {
                return Err(MarketDataError::ColumnLengthMismatch {
                    ticker: ticker.clone(),
                    column_len: column.len(),
                    expected: dates.len(),
                });
            }
        }
        Ok(Self { dates, closes })
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn date(&self, index: usize) -> Option<NaiveDate> {
        self.dates.get(index).copied()
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.closes.keys().map(String::as_str)
    }

    /// Close for `ticker` at `index`. `None` on gap, unknown ticker, or
    /// out-of-range index.
    pub fn close(&self, ticker: &str, index: usize) -> Option<f64> {
        self.closes.get(ticker)?.get(index).copied().flatten()
    }

    /// Non-positive closes are treated as gaps by consumers; this helper
    /// applies that rule in one place.
    pub fn tradable_close(&self, ticker: &str, index: usize) -> Option<f64> {
        self.close(ticker, index).filter(|price| *price > 0.0)
    }

    /// Copy rows `[start, end)` into a new table. Bounds are clamped.
    pub fn slice(&self, start: usize, end: usize) -> PriceTable {
        let end = end.min(self.dates.len());
        let start = start.min(end);
        let closes = self
            .closes
            .iter()
            .map(|(ticker, column)| (ticker.clone(), column[start..end].to_vec()))
            .collect();
        PriceTable {
            dates: self.dates[start..end].to_vec(),
            closes,
        }
    }

    /// Daily returns for `ticker` over the `window` rows ending at `end_index`
    /// (inclusive). Uses only rows at or before `end_index`; gap days are
    /// skipped, so fewer than `window - 1` returns may come back.
    pub fn trailing_returns(&self, ticker: &str, end_index: usize, window: usize) -> Vec<f64> {
        let column = match self.closes.get(ticker) {
            Some(column) => column,
            None => return Vec::new(),
        };
        let end = match end_index.checked_add(1) {
            Some(end) => end.min(column.len()),
            None => column.len(),
        };
        let start = end.saturating_sub(window);
        let mut returns = Vec::new();
        let mut prev: Option<f64> = None;
        for close in column[start..end].iter().copied().flatten() {
            if close <= 0.0 {
                continue;
            }
            if let Some(prev_close) = prev {
                returns.push(close / prev_close - 1.0);
            }
            prev = Some(close);
        }
        returns
    }
}

/// Ticker → sector lookup. Unknown tickers map to "Unknown" so sector caps
/// still bind for unclassified names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectorMap {
    sectors: HashMap<String, String>,
}

impl SectorMap {
    pub fn new(sectors: HashMap<String, String>) -> Self {
        Self { sectors }
    }

    pub fn sector_of(&self, ticker: &str) -> &str {
        self.sectors
            .get(ticker)
            .map(String::as_str)
            .unwrap_or("Unknown")
    }
}
