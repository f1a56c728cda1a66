//! Duration estimation and temperature-ramp interpolation.
//!
//! Both functions are pure and have no dependency on the scheduler or any
//! presentation layer, so they can be called from the console, the job
//! builder, and tests alike.
//!
//! # Model
//!
//! - Furnace ramps at [`RAMP_RATE`] °C/min between the first and last
//!   temperature of the ramp.
//! - One XRD scan over 100° of 2θ takes [`BASE_SCAN_TIME`] minutes at low
//!   precision; high precision takes 1.5x longer.
//!
//! # Example
//!
//! ```
//! use aish_queue::estimate::{estimate, temperature_ramp};
//! use aish_queue::job::Precision;
//!
//! let est = estimate(25.0, 225.0, 10.0, 80.0, Precision::Low, 3);
//! assert!((est.total_time - 7.5333).abs() < 1e-3);
//! assert_eq!(temperature_ramp(0.0, 100.0, 5), vec![0.0, 25.0, 50.0, 75.0, 100.0]);
//! ```

use crate::job::Precision;
use std::fmt;

/// Furnace ramp rate in °C per minute.
pub const RAMP_RATE: f64 = 60.0;

/// Minutes for one low-precision scan over a 100° 2θ range.
pub const BASE_SCAN_TIME: f64 = 2.0;

/// Multiplier applied to scan time for [`Precision::High`].
pub const HIGH_PRECISION_FACTOR: f64 = 1.5;

/// Projected wall-clock duration of a heated experiment, in minutes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationEstimate {
    /// Time for a single XRD scan.
    pub scan_time_per_scan: f64,
    /// Number of scans the estimate covers.
    pub num_scans: u32,
    /// `scan_time_per_scan * num_scans`.
    pub total_scan_time: f64,
    /// Time spent ramping from the first to the last temperature. Negative
    /// when the ramp goes downwards.
    pub ramp_time: f64,
    /// `total_scan_time + ramp_time`.
    pub total_time: f64,
}

impl DurationEstimate {
    /// Total time in hours.
    pub fn total_hours(&self) -> f64 {
        self.total_time / 60.0
    }

    /// Per-scan breakdown line, e.g. `1.40 min/scan * 3 scans = 4.20 min`.
    pub fn scan_breakdown(&self) -> String {
        format!(
            "{:.2} min/scan * {} scans = {:.2} min",
            self.scan_time_per_scan, self.num_scans, self.total_scan_time
        )
    }

    /// Ramp breakdown line, e.g. `3.33 min ramping (60°C/min)`.
    pub fn ramp_breakdown(&self) -> String {
        format!("{:.2} min ramping ({}°C/min)", self.ramp_time, RAMP_RATE)
    }
}

impl fmt::Display for DurationEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Estimated Procedure Time: {:.2} min = {:.2} hr",
            self.total_time,
            self.total_hours()
        )
    }
}

/// Estimate the duration of a heated XRD experiment.
///
/// Total over its inputs: nonsensical values (e.g. `max_temp < min_temp`)
/// produce nonsensical but finite numbers rather than errors. Callers are
/// expected to have parsed the inputs already.
#[must_use]
pub fn estimate(
    min_temp: f64,
    max_temp: f64,
    min_angle: f64,
    max_angle: f64,
    precision: Precision,
    num_scans: u32,
) -> DurationEstimate {
    let ramp_time = (max_temp - min_temp) / RAMP_RATE;

    let precision_factor = match precision {
        Precision::High => HIGH_PRECISION_FACTOR,
        Precision::Low => 1.0,
    };
    let scan_range = max_angle - min_angle;
    let scan_time_per_scan = BASE_SCAN_TIME * (scan_range / 100.0) * precision_factor;
    let total_scan_time = scan_time_per_scan * f64::from(num_scans);

    DurationEstimate {
        scan_time_per_scan,
        num_scans,
        total_scan_time,
        ramp_time,
        total_time: total_scan_time + ramp_time,
    }
}

/// Linearly interpolate `num_scans` temperatures from `min_temp` to `max_temp`.
///
/// The first element is `min_temp` and the last is exactly `max_temp`.
/// Zero scans yields an empty ramp. A single scan has no step to divide by and
/// yields `[min_temp]`.
#[must_use]
pub fn temperature_ramp(min_temp: f64, max_temp: f64, num_scans: u32) -> Vec<f64> {
    match num_scans {
        0 => Vec::new(),
        1 => {
            tracing::warn!(
                min_temp,
                max_temp,
                "single-scan ramp has no step; scanning at min_temp only"
            );
            vec![min_temp]
        }
        n => {
            let last = n - 1;
            let step = (max_temp - min_temp) / f64::from(last);
            (0..n)
                .map(|i| {
                    if i == last {
                        max_temp
                    } else {
                        min_temp + f64::from(i) * step
                    }
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_reference_estimate() {
        let est = estimate(25.0, 225.0, 10.0, 80.0, Precision::Low, 3);
        assert!(approx(est.ramp_time, 200.0 / 60.0));
        assert!(approx(est.scan_time_per_scan, 1.4));
        assert!(approx(est.total_scan_time, 4.2));
        assert!(approx(est.total_time, 4.2 + 200.0 / 60.0));
        assert_eq!(format!("{:.2}", est.total_time), "7.53");
    }

    #[test]
    fn test_high_precision_is_one_and_a_half_times_slower() {
        let low = estimate(25.0, 25.0, 10.0, 110.0, Precision::Low, 2);
        let high = estimate(25.0, 25.0, 10.0, 110.0, Precision::High, 2);
        assert!(approx(low.scan_time_per_scan, 2.0));
        assert!(approx(high.scan_time_per_scan, 3.0));
        assert!(approx(high.total_time, 6.0));
    }

    #[test]
    fn test_downward_ramp_is_not_clamped() {
        let est = estimate(300.0, 60.0, 10.0, 10.0, Precision::Low, 4);
        assert!(approx(est.ramp_time, -4.0));
        assert!(approx(est.total_time, -4.0));
    }

    #[test]
    fn test_display_matches_operator_text() {
        let est = estimate(25.0, 225.0, 10.0, 80.0, Precision::Low, 3);
        assert_eq!(
            est.to_string(),
            "Estimated Procedure Time: 7.53 min = 0.13 hr"
        );
        assert_eq!(est.scan_breakdown(), "1.40 min/scan * 3 scans = 4.20 min");
        assert_eq!(est.ramp_breakdown(), "3.33 min ramping (60°C/min)");
    }

    #[test]
    fn test_ramp_five_points() {
        assert_eq!(
            temperature_ramp(0.0, 100.0, 5),
            vec![0.0, 25.0, 50.0, 75.0, 100.0]
        );
    }

    #[test]
    fn test_ramp_endpoints_are_exact() {
        let ramp = temperature_ramp(25.0, 1000.0, 7);
        assert_eq!(ramp.len(), 7);
        assert_eq!(ramp[0], 25.0);
        assert_eq!(ramp[6], 1000.0);
    }

    #[test]
    fn test_ramp_degenerate_counts() {
        assert!(temperature_ramp(25.0, 100.0, 0).is_empty());
        assert_eq!(temperature_ramp(25.0, 100.0, 1), vec![25.0]);
    }
}
