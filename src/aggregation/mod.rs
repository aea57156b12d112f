/// Rolling per-symbol moving averages
///
/// The consumer reads price events off the bus and asks the service to
/// recompute the symbol's average from the newest stored price points.

pub mod consumer;
pub mod moving_average;

pub use consumer::{ConsumerState, ConsumerStats, MovingAverageConsumer};
pub use moving_average::{
    compute_moving_average, AverageError, AverageOutcome, MovingAverage, MovingAverageService, DEFAULT_WINDOW,
};
