//! Elevation hysteresis: separates real climbs and descents from GPS or
//! barometric noise and measures the horizontal distance they cover.
//!
//! Each direction keeps its own reference point. A change relative to the
//! reference only counts once it reaches the threshold, at which point the
//! reference advances. A move against the direction by more than the
//! threshold is a reversal and is handled per [`ReversalPolicy`].

use serde::{Deserialize, Serialize};

use crate::options::{AnalysisOptions, ReversalPolicy};
use crate::track::{PointSequence, TrackPoint};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Ascent,
    Descent,
}

impl Direction {
    fn oriented(self, diff: f64) -> f64 {
        match self {
            Direction::Ascent => diff,
            Direction::Descent => -diff,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectionTotals {
    /// Accumulated elevation change in meters, always >= 0.
    pub total_diff: f64,
    /// Horizontal meters across the point pairs that produced `total_diff`.
    pub qualifying_distance: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HysteresisTotals {
    pub ascent: DirectionTotals,
    pub descent: DirectionTotals,
}

#[derive(Clone, Debug, Default)]
struct FilterState<'a> {
    reference: Option<&'a TrackPoint>,
    totals: DirectionTotals,
}

impl<'a> FilterState<'a> {
    fn step(
        mut self,
        point: &'a TrackPoint,
        direction: Direction,
        threshold: f64,
        policy: ReversalPolicy,
    ) -> Self {
        let Some(reference) = self.reference else {
            self.reference = Some(point);
            return self;
        };

        let diff = direction.oriented(point.elevation_diff_from(reference).unwrap_or(0.0));
        if diff > 0.0 {
            if diff >= threshold {
                self.totals.total_diff += diff;
                self.totals.qualifying_distance += point.distance_from(reference);
                self.reference = Some(point);
            }
        } else if -diff > threshold {
            self.reference = match policy {
                ReversalPolicy::Reset => None,
                ReversalPolicy::Rebase => Some(point),
            };
        }
        self
    }
}

/// Run one direction of the filter over the whole sequence.
///
/// The first point is never used as a baseline: the pass starts at index 1
/// and the first point it visits becomes the reference.
pub fn filter_direction(
    sequence: &PointSequence,
    direction: Direction,
    options: &AnalysisOptions,
) -> DirectionTotals {
    let threshold = options.elevation_diff_threshold;
    let policy = options.reversal_policy;
    sequence
        .iter()
        .skip(1)
        .fold(FilterState::default(), |state, point| {
            state.step(point, direction, threshold, policy)
        })
        .totals
}

pub fn run(sequence: &PointSequence, options: &AnalysisOptions) -> HysteresisTotals {
    HysteresisTotals {
        ascent: filter_direction(sequence, Direction::Ascent, options),
        descent: filter_direction(sequence, Direction::Descent, options),
    }
}
