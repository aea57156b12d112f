use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;

use crate::database::models::{PricePoint, SymbolAverage};
use crate::database::repositories::{AverageRepository, PriceRepository};
use crate::database::DatabaseError;

pub const DEFAULT_WINDOW: usize = 5;

#[derive(Debug, Error)]
pub enum AverageError {
    #[error(transparent)]
    Store(#[from] DatabaseError),

    #[error("Sum of the newest {window} prices does not fit a decimal")]
    Overflow { window: usize },
}

/// Mean of the newest `window` price points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovingAverage {
    pub value: Decimal,
    /// Event time of the newest point in the window
    pub last_updated_at: DateTime<Utc>,
    pub window: usize,
}

/// Average the first `window` points of `points` (newest first)
///
/// Returns `Ok(None)` when fewer than `window` points are available.
pub fn compute_moving_average(points: &[PricePoint], window: usize) -> Result<Option<MovingAverage>, AverageError> {
    if window == 0 || points.len() < window {
        return Ok(None);
    }

    let recent = &points[..window];
    let sum = recent
        .iter()
        .try_fold(Decimal::ZERO, |sum, point| sum.checked_add(point.price))
        .ok_or(AverageError::Overflow { window })?;
    let value = sum
        .checked_div(Decimal::from(window))
        .ok_or(AverageError::Overflow { window })?;

    let Some(last_updated_at) = recent.iter().map(|point| point.timestamp).max() else {
        return Ok(None);
    };

    Ok(Some(MovingAverage {
        value: value.normalize(),
        last_updated_at,
        window,
    }))
}

#[derive(Debug, Clone, PartialEq)]
pub enum AverageOutcome {
    Updated(SymbolAverage),
    /// Not enough history yet; nothing written
    InsufficientHistory { found: usize, required: usize },
}

/// Recomputes a symbol's average from the store
///
/// Always reads the newest points back from the price store instead of
/// accumulating event state, so reprocessing an event converges to the
/// same stored value.
pub struct MovingAverageService {
    prices: Arc<dyn PriceRepository>,
    averages: Arc<dyn AverageRepository>,
    window: usize,
}

impl MovingAverageService {
    pub fn new(prices: Arc<dyn PriceRepository>, averages: Arc<dyn AverageRepository>, window: usize) -> Self {
        Self {
            prices,
            averages,
            window,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn recompute(&self, symbol: &str) -> Result<AverageOutcome, AverageError> {
        let limit = i64::try_from(self.window).unwrap_or(i64::MAX);
        let points = self.prices.recent_for_symbol(symbol, limit)?;

        let Some(average) = compute_moving_average(&points, self.window)? else {
            return Ok(AverageOutcome::InsufficientHistory {
                found: points.len(),
                required: self.window,
            });
        };

        let stored = self.averages.upsert(SymbolAverage {
            symbol: symbol.to_string(),
            moving_average: average.value,
            last_updated_at: average.last_updated_at,
        })?;

        Ok(AverageOutcome::Updated(stored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::enums::ProviderKind;
    use crate::database::models::RawResponse;
    use crate::database::repositories::{InMemoryStore, IngestionBatch};
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    /// Points for `symbol`, one second apart, oldest first
    fn seed(store: &InMemoryStore, symbol: &str, prices: &[Decimal]) {
        let mut batch = IngestionBatch::new(None);
        for (i, price) in prices.iter().enumerate() {
            let raw = RawResponse::new(ProviderKind::YFinance, symbol, serde_json::json!({}));
            let point = PricePoint::from_raw(&raw, *price, base_time() + Duration::seconds(i as i64));
            batch.stage(raw, point);
        }
        store.commit_batch(&batch).unwrap();
    }

    fn service(store: &InMemoryStore) -> MovingAverageService {
        MovingAverageService::new(Arc::new(store.clone()), Arc::new(store.clone()), DEFAULT_WINDOW)
    }

    #[test]
    fn test_average_of_five_points() {
        let store = InMemoryStore::new();
        seed(&store, "X", &[dec!(100), dec!(102), dec!(104), dec!(106), dec!(108)]);

        let outcome = service(&store).recompute("X").unwrap();

        let AverageOutcome::Updated(average) = outcome else {
            panic!("expected an update, got {:?}", outcome);
        };
        assert_eq!(average.moving_average, dec!(104.0));
        assert_eq!(average.last_updated_at, base_time() + Duration::seconds(4));
        assert_eq!(store.find("X").unwrap().unwrap(), average);
    }

    #[test]
    fn test_four_points_write_nothing() {
        let store = InMemoryStore::new();
        seed(&store, "X", &[dec!(100), dec!(102), dec!(104), dec!(106)]);

        let outcome = service(&store).recompute("X").unwrap();

        assert_eq!(outcome, AverageOutcome::InsufficientHistory { found: 4, required: 5 });
        assert!(store.find("X").unwrap().is_none());
    }

    #[test]
    fn test_only_the_newest_window_counts() {
        let store = InMemoryStore::new();
        seed(
            &store,
            "X",
            &[dec!(1), dec!(1), dec!(10), dec!(20), dec!(30), dec!(40), dec!(50)],
        );

        let AverageOutcome::Updated(average) = service(&store).recompute("X").unwrap() else {
            panic!("expected an update");
        };
        assert_eq!(average.moving_average, dec!(30));
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let store = InMemoryStore::new();
        seed(&store, "X", &[dec!(10), dec!(11), dec!(12), dec!(13), dec!(15)]);
        let service = service(&store);

        let first = service.recompute("X").unwrap();
        let second = service.recompute("X").unwrap();

        assert_eq!(first, second);
        assert_eq!(store.find("X").unwrap().unwrap().moving_average, dec!(12.2));
        assert_eq!(store.average_count(), 1);
    }

    #[test]
    fn test_compute_uses_newest_event_time_in_window() {
        let raw = RawResponse::new(ProviderKind::YFinance, "X", serde_json::json!({}));
        // Out of order event times must still report the newest
        let points: Vec<PricePoint> = [3, 5, 1]
            .iter()
            .map(|s| PricePoint::from_raw(&raw, dec!(3), base_time() + Duration::seconds(*s)))
            .collect();

        let average = compute_moving_average(&points, 3).unwrap().unwrap();
        assert_eq!(average.value, dec!(3));
        assert_eq!(average.last_updated_at, base_time() + Duration::seconds(5));
        assert!(compute_moving_average(&points, 4).unwrap().is_none());
        assert!(compute_moving_average(&points, 0).unwrap().is_none());
    }

    #[test]
    fn test_oversized_prices_overflow_without_writing() {
        let store = InMemoryStore::new();
        let huge = Decimal::from_str_exact("30000000000000000000000000000").unwrap();
        seed(&store, "BIG", &[huge; 5]);

        let result = service(&store).recompute("BIG");

        assert!(matches!(result, Err(AverageError::Overflow { window: 5 })));
        assert!(store.find("BIG").unwrap().is_none());
    }
}
