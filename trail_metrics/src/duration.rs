//! Travel-time estimates from distance and filtered elevation totals.

use chrono::Duration;

use crate::hysteresis::{DirectionTotals, HysteresisTotals};
use crate::options::AnalysisOptions;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Average grade in percent over the qualifying distance of one direction.
/// `None` when no horizontal distance qualified.
pub fn slope_percent(totals: &DirectionTotals) -> Option<f64> {
    if totals.qualifying_distance > 0.0 {
        let km = totals.qualifying_distance / 1000.0;
        Some(totals.total_diff / (km * 1000.0) * 100.0)
    } else {
        None
    }
}

/// Length left for the flat-speed term once steep ascent/descent distance,
/// already paid for by the vertical speeds, is removed.
///
/// Ascent and descent spans can overlap on noisy tracks, so the result may be
/// negative; it is not clamped.
pub fn flat_length(length_m: f64, totals: &HysteresisTotals, options: &AnalysisOptions) -> f64 {
    let mut length = length_m;
    for direction in [&totals.ascent, &totals.descent] {
        if let Some(slope) = slope_percent(direction) {
            if slope > options.slope_limit_percent {
                length -= direction.qualifying_distance;
            }
        }
    }
    length
}

pub fn speed_hours(length_m: f64, totals: &HysteresisTotals, options: &AnalysisOptions) -> f64 {
    totals.ascent.total_diff / options.asc_speed
        + totals.descent.total_diff / options.desc_speed
        + flat_length(length_m, totals, options) / options.flat_speed
}

pub fn estimate_by_speed(
    length_m: f64,
    totals: &HysteresisTotals,
    options: &AnalysisOptions,
) -> Duration {
    hours_to_duration(speed_hours(length_m, totals, options))
}

/// Distance in km plus ascent and descent converted to km equivalents.
pub fn kilometer_effort(length_m: f64, totals: &HysteresisTotals, options: &AnalysisOptions) -> f64 {
    length_m / 1000.0
        + totals.ascent.total_diff / options.asc_effort_coefficient
        + totals.descent.total_diff / options.desc_effort_coefficient
}

pub fn estimate_by_effort(
    length_m: f64,
    totals: &HysteresisTotals,
    options: &AnalysisOptions,
) -> Duration {
    hours_to_duration(kilometer_effort(length_m, totals, options) / options.effort_per_hour)
}

/// Convert fractional hours to a duration with millisecond precision.
/// Values that cannot be represented yield a zero duration.
pub fn hours_to_duration(hours: f64) -> Duration {
    if !hours.is_finite() {
        return Duration::zero();
    }
    let millis = (hours * MILLIS_PER_HOUR).round();
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return Duration::zero();
    }
    Duration::try_milliseconds(millis as i64).unwrap_or_else(Duration::zero)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals(pos: f64, asc_dist: f64, neg: f64, desc_dist: f64) -> HysteresisTotals {
        HysteresisTotals {
            ascent: DirectionTotals {
                total_diff: pos,
                qualifying_distance: asc_dist,
            },
            descent: DirectionTotals {
                total_diff: neg,
                qualifying_distance: desc_dist,
            },
        }
    }

    #[test]
    fn flat_track_uses_flat_speed_only() {
        let opts = AnalysisOptions::default();
        let flat = HysteresisTotals::default();
        let d = estimate_by_speed(12_500.0, &flat, &opts);
        assert_eq!(d, hours_to_duration(12_500.0 / 5000.0));
        assert_eq!(d, Duration::minutes(150));
    }

    #[test]
    fn gentle_slopes_keep_full_length() {
        let opts = AnalysisOptions::default();
        // 50 m over 2 km is 2.5 %
        let t = totals(50.0, 2000.0, 0.0, 0.0);
        assert_eq!(flat_length(10_000.0, &t, &opts), 10_000.0);
        let hours = speed_hours(10_000.0, &t, &opts);
        assert!((hours - (50.0 / 350.0 + 10_000.0 / 5000.0)).abs() < 1e-12);
    }

    #[test]
    fn steep_slopes_remove_qualifying_distance() {
        let opts = AnalysisOptions::default();
        // 350 m over 2 km (17.5 %) and 550 m over 5 km (11 %)
        let t = totals(350.0, 2000.0, 550.0, 5000.0);
        assert_eq!(flat_length(10_000.0, &t, &opts), 3000.0);
        let hours = speed_hours(10_000.0, &t, &opts);
        assert!((hours - (1.0 + 1.0 + 3000.0 / 5000.0)).abs() < 1e-12);
        assert_eq!(estimate_by_speed(10_000.0, &t, &opts), Duration::minutes(156));
    }

    #[test]
    fn overlapping_steep_spans_can_go_negative() {
        let opts = AnalysisOptions::default();
        // both directions at 12.5 % over 800 m of a 1 km track
        let t = totals(100.0, 800.0, 100.0, 800.0);
        assert_eq!(flat_length(1000.0, &t, &opts), -600.0);
        let hours = speed_hours(1000.0, &t, &opts);
        let expected = 100.0 / 350.0 + 100.0 / 550.0 - 600.0 / 5000.0;
        assert!((hours - expected).abs() < 1e-12);
    }

    #[test]
    fn zero_qualifying_distance_skips_correction() {
        let t = totals(40.0, 0.0, 0.0, 0.0);
        assert_eq!(slope_percent(&t.ascent), None);
        assert_eq!(flat_length(1000.0, &t, &AnalysisOptions::default()), 1000.0);
    }

    #[test]
    fn effort_model() {
        let opts = AnalysisOptions::default();
        let t = totals(250.0, 1000.0, 400.0, 1000.0);
        let ke = kilometer_effort(10_000.0, &t, &opts);
        assert!((ke - 13.0).abs() < 1e-12);
        assert_eq!(estimate_by_effort(10_000.0, &t, &opts), Duration::minutes(195));

        let advanced = AnalysisOptions::default().with_skill(crate::SkillLevel::Advanced);
        assert_eq!(estimate_by_effort(10_000.0, &t, &advanced), Duration::minutes(130));
    }

    #[test]
    fn unrepresentable_hours_become_zero() {
        assert_eq!(hours_to_duration(f64::NAN), Duration::zero());
        assert_eq!(hours_to_duration(f64::INFINITY), Duration::zero());
        assert_eq!(hours_to_duration(1e300), Duration::zero());
        assert_eq!(hours_to_duration(0.0), Duration::zero());

        let opts = AnalysisOptions {
            asc_speed: 0.0,
            ..AnalysisOptions::default()
        };
        let t = totals(100.0, 500.0, 0.0, 0.0);
        assert_eq!(estimate_by_speed(1000.0, &t, &opts), Duration::zero());
    }
}
