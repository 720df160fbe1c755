//! Trail metrics for recorded GPX/FIT tracks: distance, filtered ascent and
//! descent, elevation extremes, and two travel-time estimates.

use thiserror::Error;

pub mod analyzer;
pub mod duration;
pub mod geo;
pub mod hysteresis;
pub mod options;
pub mod parse;
pub mod track;

pub use analyzer::{analyse_track, MetricsReport, TrackAnalyzer};
pub use hysteresis::{Direction, DirectionTotals, HysteresisTotals};
pub use options::{AnalysisOptions, ReversalPolicy, SkillLevel};
pub use parse::{parse_track, TrackSelection};
pub use track::{Bounds, PointSequence, TrackPoint};

#[derive(Error, Debug)]
pub enum TrackError {
    #[error("no track or route found in input")]
    MissingInput,
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to parse FIT file: {0}")]
    FitParse(String),
    #[error("failed to parse GPX file: {0}")]
    GpxParse(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Parse a track from bytes and analyse it in one go.
pub fn analyse_bytes(
    input: &[u8],
    format: &str,
    selection: TrackSelection,
    options: &AnalysisOptions,
) -> Result<MetricsReport, TrackError> {
    options.validate()?;
    let points = parse_track(input, format, selection)?;
    Ok(analyse_track(points, options))
}
