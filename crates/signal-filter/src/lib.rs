//! Signal Smoothing Filters
//!
//! Fixed-storage filters for smoothing sensor readings inside a single
//! consumer context.

mod moving_average;

pub use moving_average::MovingAverage;
