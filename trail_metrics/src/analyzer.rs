use chrono::Duration;
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::duration;
use crate::hysteresis::{self, HysteresisTotals};
use crate::options::AnalysisOptions;
use crate::track::PointSequence;

/// Metrics for one analysed track. Lengths and distances are in meters.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricsReport {
    pub point_count: usize,
    pub total_length: f64,
    pub positive_height_diff: f64,
    pub negative_height_diff: f64,
    pub ascent_distance: f64,
    pub descent_distance: f64,
    pub max_elevation: Option<f64>,
    pub min_elevation: Option<f64>,
    pub kilometer_effort: f64,
    #[serde(serialize_with = "serialize_opt_secs")]
    pub real_duration: Option<Duration>,
    #[serde(serialize_with = "serialize_secs")]
    pub estimated_duration_by_speed: Duration,
    #[serde(serialize_with = "serialize_secs")]
    pub estimated_duration_by_effort: Duration,
    pub options_hash: String,
}

fn serialize_secs<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.num_milliseconds() as f64 / 1000.0)
}

fn serialize_opt_secs<S: Serializer>(
    value: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(d) => serialize_secs(d, serializer),
        None => serializer.serialize_none(),
    }
}

/// Runs the full analysis over one materialised track.
#[derive(Clone, Debug)]
pub struct TrackAnalyzer {
    points: PointSequence,
    options: AnalysisOptions,
    report: Option<MetricsReport>,
}

impl TrackAnalyzer {
    pub fn new(points: PointSequence, options: AnalysisOptions) -> Self {
        Self {
            points,
            options,
            report: None,
        }
    }

    /// Recompute distances, filter elevation and estimate durations.
    /// Filter state is rebuilt on every call, so repeated calls agree.
    pub fn analyse(&mut self) -> &MetricsReport {
        self.points.calculate_distance_from_start();
        let totals = hysteresis::run(&self.points, &self.options);
        let report = build_report(&self.points, &totals, &self.options);
        debug!(
            "Analysed {} points: {:.1} m, +{:.1} m / -{:.1} m",
            report.point_count,
            report.total_length,
            report.positive_height_diff,
            report.negative_height_diff
        );
        self.report.insert(report)
    }

    pub fn report(&self) -> Option<&MetricsReport> {
        self.report.as_ref()
    }

    pub fn points(&self) -> &PointSequence {
        &self.points
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    pub fn into_points(self) -> PointSequence {
        self.points
    }
}

/// One-shot analysis of a track.
pub fn analyse_track(points: PointSequence, options: &AnalysisOptions) -> MetricsReport {
    let mut analyzer = TrackAnalyzer::new(points, options.clone());
    analyzer.analyse().clone()
}

fn build_report(
    points: &PointSequence,
    totals: &HysteresisTotals,
    options: &AnalysisOptions,
) -> MetricsReport {
    let length = points.length();
    let real_duration = match (points.start_point(), points.end_point()) {
        (Some(start), Some(end)) => match (start.time, end.time) {
            (Some(t0), Some(t1)) => Some(t1 - t0),
            _ => None,
        },
        _ => None,
    };

    MetricsReport {
        point_count: points.len(),
        total_length: length,
        positive_height_diff: totals.ascent.total_diff,
        negative_height_diff: totals.descent.total_diff,
        ascent_distance: totals.ascent.qualifying_distance,
        descent_distance: totals.descent.qualifying_distance,
        max_elevation: points.max_elevation(),
        min_elevation: points.min_elevation(),
        kilometer_effort: duration::kilometer_effort(length, totals, options),
        real_duration,
        estimated_duration_by_speed: duration::estimate_by_speed(length, totals, options),
        estimated_duration_by_effort: duration::estimate_by_effort(length, totals, options),
        options_hash: options.params_hash_sha256().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::geo;
    use crate::track::TrackPoint;

    #[test]
    fn empty_track_reports_defaults() {
        let report = analyse_track(PointSequence::new(), &AnalysisOptions::default());
        assert_eq!(report.point_count, 0);
        assert_eq!(report.total_length, 0.0);
        assert_eq!(report.positive_height_diff, 0.0);
        assert_eq!(report.negative_height_diff, 0.0);
        assert_eq!(report.max_elevation, None);
        assert_eq!(report.min_elevation, None);
        assert_eq!(report.real_duration, None);
        assert_eq!(report.estimated_duration_by_speed, Duration::zero());
        assert_eq!(report.estimated_duration_by_effort, Duration::zero());
    }

    #[test]
    fn single_point_track() {
        let points: PointSequence = vec![TrackPoint::new(46.0, 7.0)
            .with_elevation(1500.0)
            .with_time(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap())]
        .into_iter()
        .collect();
        let report = analyse_track(points, &AnalysisOptions::default());
        assert_eq!(report.total_length, 0.0);
        assert_eq!(report.max_elevation, Some(1500.0));
        assert_eq!(report.min_elevation, Some(1500.0));
        assert_eq!(report.real_duration, Some(Duration::zero()));
        assert_eq!(report.estimated_duration_by_speed, Duration::zero());
    }

    #[test]
    fn three_point_scenario() {
        let points: PointSequence = vec![
            TrackPoint::new(0.0, 0.0).with_elevation(0.0),
            TrackPoint::new(0.0, 0.001).with_elevation(5.0),
            TrackPoint::new(0.0, 0.002).with_elevation(30.0),
        ]
        .into_iter()
        .collect();
        let expected_ascent = geo::distance(&points[1], &points[2]);
        let mut analyzer = TrackAnalyzer::new(points, AnalysisOptions::default());
        let report = analyzer.analyse().clone();
        assert_eq!(report.positive_height_diff, 25.0);
        assert_eq!(report.negative_height_diff, 0.0);
        assert!((report.ascent_distance - expected_ascent).abs() < 1e-9);
        assert_eq!(report.max_elevation, Some(30.0));
        assert_eq!(report.min_elevation, Some(0.0));
        assert!((report.total_length - 222.39).abs() < 0.1);
        assert_eq!(report.real_duration, None);
    }

    #[test]
    fn analyse_is_idempotent() {
        let points: PointSequence = (0..50)
            .map(|i| {
                let ele = 1000.0 + 40.0 * ((i as f64) / 4.0).sin() + i as f64;
                TrackPoint::new(45.0 + i as f64 * 0.0005, 6.0 + i as f64 * 0.0003)
                    .with_elevation(ele)
            })
            .collect();
        let mut analyzer = TrackAnalyzer::new(points, AnalysisOptions::default());
        let first = analyzer.analyse().clone();
        let second = analyzer.analyse().clone();
        assert_eq!(first, second);
        assert_eq!(analyzer.report(), Some(&first));
        assert!(first.positive_height_diff > 0.0);
        assert!(first.negative_height_diff > 0.0);
    }

    #[test]
    fn real_duration_from_endpoints() {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let points: PointSequence = vec![
            TrackPoint::new(46.0, 7.0).with_time(start),
            TrackPoint::new(46.01, 7.0),
            TrackPoint::new(46.02, 7.0).with_time(start + Duration::minutes(95)),
        ]
        .into_iter()
        .collect();
        let report = analyse_track(points, &AnalysisOptions::default());
        assert_eq!(report.real_duration, Some(Duration::minutes(95)));

        let untimed: PointSequence = vec![
            TrackPoint::new(46.0, 7.0).with_time(start),
            TrackPoint::new(46.02, 7.0),
        ]
        .into_iter()
        .collect();
        let report = analyse_track(untimed, &AnalysisOptions::default());
        assert_eq!(report.real_duration, None);
    }

    #[test]
    fn flat_track_speed_estimate_is_length_over_flat_speed() {
        let points: PointSequence = (0..20)
            .map(|i| TrackPoint::new(0.0, i as f64 * 0.01).with_elevation(250.0))
            .collect();
        let report = analyse_track(points, &AnalysisOptions::default());
        assert_eq!(report.positive_height_diff, 0.0);
        assert_eq!(report.negative_height_diff, 0.0);
        assert_eq!(
            report.estimated_duration_by_speed,
            duration::hours_to_duration(report.total_length / 5000.0)
        );
    }

    #[test]
    fn report_serializes_durations_as_seconds() {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let points: PointSequence = vec![
            TrackPoint::new(0.0, 0.0).with_time(start),
            TrackPoint::new(0.0, 0.045).with_time(start + Duration::hours(1)),
        ]
        .into_iter()
        .collect();
        let report = analyse_track(points, &AnalysisOptions::default());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["real_duration"].as_f64(), Some(3600.0));
        assert!(json["max_elevation"].is_null());
        assert!(json["estimated_duration_by_speed"].as_f64().unwrap() > 0.0);
        assert_eq!(json["options_hash"].as_str().map(str::len), Some(64));
    }
}
