//! Track points and the ordered sequence that owns their cumulative distances.

use std::ops::Index;

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::geo;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: Option<f64>,
    pub time: Option<DateTime<Utc>>,
    #[serde(skip_deserializing)]
    distance_from_start: f64,
}

impl TrackPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            elevation: None,
            time: None,
            distance_from_start: 0.0,
        }
    }

    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = Some(elevation);
        self
    }

    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    /// Cumulative distance in meters from the first point of the owning sequence.
    pub fn distance_from_start(&self) -> f64 {
        self.distance_from_start
    }

    /// Elevation of `self` minus elevation of `other`; `None` if either is unknown.
    pub fn elevation_diff_from(&self, other: &TrackPoint) -> Option<f64> {
        Some(self.elevation? - other.elevation?)
    }

    pub fn distance_from(&self, other: &TrackPoint) -> f64 {
        geo::distance(self, other)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

/// Points in recording order. Not required to be sorted by time.
///
/// Deserialized sequences always get their cumulative distances recomputed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawSequence")]
pub struct PointSequence {
    points: Vec<TrackPoint>,
}

#[derive(Deserialize)]
struct RawSequence {
    points: Vec<TrackPoint>,
}

impl From<RawSequence> for PointSequence {
    fn from(raw: RawSequence) -> Self {
        PointSequence::from_points(raw.points)
    }
}

impl PointSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_points(points: Vec<TrackPoint>) -> Self {
        let mut sequence = Self { points };
        sequence.calculate_distance_from_start();
        sequence
    }

    pub fn push(&mut self, point: TrackPoint) {
        let distance = match self.points.last() {
            Some(last) => last.distance_from_start + geo::distance(last, &point),
            None => 0.0,
        };
        self.points.push(TrackPoint {
            distance_from_start: distance,
            ..point
        });
    }

    /// Rewrite every point's cumulative distance as the running sum of
    /// great-circle distances. Point 0 always gets 0.
    pub fn calculate_distance_from_start(&mut self) {
        let mut total = 0.0;
        let mut previous: Option<(f64, f64)> = None;
        for point in self.points.iter_mut() {
            if let Some((lat, lon)) = previous {
                total += geo::haversine_distance(lat, lon, point.latitude, point.longitude);
            }
            point.distance_from_start = total;
            previous = Some((point.latitude, point.longitude));
        }
    }

    /// Total length in meters; 0 when empty.
    pub fn length(&self) -> f64 {
        self.points
            .last()
            .map(|p| p.distance_from_start)
            .unwrap_or(0.0)
    }

    pub fn max_elevation(&self) -> Option<f64> {
        self.points
            .iter()
            .filter_map(|p| p.elevation)
            .map(OrderedFloat)
            .max()
            .map(|v| v.0)
    }

    pub fn min_elevation(&self) -> Option<f64> {
        self.points
            .iter()
            .filter_map(|p| p.elevation)
            .map(OrderedFloat)
            .min()
            .map(|v| v.0)
    }

    pub fn bounds(&self) -> Option<Bounds> {
        let first = self.points.first()?;
        let init = Bounds {
            min_lat: first.latitude,
            max_lat: first.latitude,
            min_lon: first.longitude,
            max_lon: first.longitude,
        };
        Some(self.points.iter().fold(init, |b, p| Bounds {
            min_lat: b.min_lat.min(p.latitude),
            max_lat: b.max_lat.max(p.latitude),
            min_lon: b.min_lon.min(p.longitude),
            max_lon: b.max_lon.max(p.longitude),
        }))
    }

    pub fn start_point(&self) -> Option<&TrackPoint> {
        self.points.first()
    }

    pub fn end_point(&self) -> Option<&TrackPoint> {
        self.points.last()
    }

    pub fn get(&self, index: usize) -> Option<&TrackPoint> {
        self.points.get(index)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TrackPoint> {
        self.points.iter()
    }

    pub fn points(&self) -> &[TrackPoint] {
        &self.points
    }
}

impl Index<usize> for PointSequence {
    type Output = TrackPoint;

    fn index(&self, index: usize) -> &TrackPoint {
        &self.points[index]
    }
}

impl FromIterator<TrackPoint> for PointSequence {
    fn from_iter<I: IntoIterator<Item = TrackPoint>>(iter: I) -> Self {
        Self::from_points(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a PointSequence {
    type Item = &'a TrackPoint;
    type IntoIter = std::slice::Iter<'a, TrackPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}
