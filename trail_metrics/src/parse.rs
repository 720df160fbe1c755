//! GPX and FIT ingestion into a [`PointSequence`].

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::track::{PointSequence, TrackPoint};
use crate::TrackError;

const SEMICIRCLES_TO_DEGREES: f64 = 180.0 / 2_147_483_648.0;

/// Which track (or route, for GPX files without tracks) to materialise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrackSelection {
    pub index: usize,
}

/// Parse FIT or GPX points from bytes using the provided format hint (extension).
pub fn parse_track(
    input: &[u8],
    format: &str,
    selection: TrackSelection,
) -> Result<PointSequence, TrackError> {
    let format_lc = format.to_ascii_lowercase();
    if format_lc.ends_with(".fit") || format_lc == "fit" {
        parse_fit_track(input)
    } else if format_lc.ends_with(".gpx") || format_lc == "gpx" {
        parse_gpx_track(input, selection)
    } else {
        Err(TrackError::UnsupportedFormat(format.to_string()))
    }
}

fn parse_gpx_track(input: &[u8], selection: TrackSelection) -> Result<PointSequence, TrackError> {
    use std::io::Cursor;

    let gpx = gpx::read(Cursor::new(input)).map_err(|e| TrackError::GpxParse(e.to_string()))?;
    debug!(
        "GPX document: {} tracks, {} routes",
        gpx.tracks.len(),
        gpx.routes.len()
    );

    let waypoints: Vec<&gpx::Waypoint> = if !gpx.tracks.is_empty() {
        let track = gpx
            .tracks
            .get(selection.index)
            .ok_or(TrackError::MissingInput)?;
        track
            .segments
            .iter()
            .flat_map(|segment| segment.points.iter())
            .collect()
    } else {
        let route = gpx
            .routes
            .get(selection.index)
            .ok_or(TrackError::MissingInput)?;
        route.points.iter().collect()
    };

    let mut sequence = PointSequence::new();
    for waypoint in waypoints {
        let geo_point = waypoint.point();
        let mut point = TrackPoint::new(geo_point.y(), geo_point.x());
        point.elevation = waypoint.elevation.filter(|e| e.is_finite());
        if let Some(time) = &waypoint.time {
            let iso = time
                .format()
                .map_err(|e| TrackError::GpxParse(e.to_string()))?;
            let utc = DateTime::parse_from_rfc3339(&iso)
                .map_err(|e| TrackError::GpxParse(e.to_string()))?
                .with_timezone(&Utc);
            point.time = Some(utc);
        }
        sequence.push(point);
    }
    Ok(sequence)
}

fn parse_fit_track(input: &[u8]) -> Result<PointSequence, TrackError> {
    use fitparser::de::from_bytes;
    use fitparser::profile::MesgNum;

    let records = from_bytes(input).map_err(|e| TrackError::FitParse(e.to_string()))?;
    let mut sequence = PointSequence::new();
    let mut skipped = 0usize;

    for record in records.into_iter() {
        if record.kind() != MesgNum::Record {
            continue;
        }
        let mut lat: Option<f64> = None;
        let mut lon: Option<f64> = None;
        let mut elevation: Option<f64> = None;
        let mut timestamp: Option<DateTime<Utc>> = None;
        for field in record.fields() {
            match field.name() {
                "timestamp" => {
                    if let fitparser::Value::Timestamp(ts) = field.value() {
                        timestamp = Some(ts.with_timezone(&Utc));
                    }
                }
                "position_lat" => {
                    lat = fit_value_to_f64(field.value()).map(|v| v * SEMICIRCLES_TO_DEGREES);
                }
                "position_long" => {
                    lon = fit_value_to_f64(field.value()).map(|v| v * SEMICIRCLES_TO_DEGREES);
                }
                "enhanced_altitude" => {
                    if let Some(val) = fit_value_to_f64(field.value()) {
                        elevation = Some(val);
                    }
                }
                "altitude" => {
                    if elevation.is_none() {
                        elevation = fit_value_to_f64(field.value());
                    }
                }
                _ => {}
            }
        }
        match (lat, lon) {
            (Some(lat), Some(lon)) => {
                let mut point = TrackPoint::new(lat, lon);
                point.elevation = elevation.filter(|e| e.is_finite());
                point.time = timestamp;
                sequence.push(point);
            }
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!("Skipped {} FIT records without a position", skipped);
    }
    if sequence.is_empty() {
        return Err(TrackError::MissingInput);
    }
    Ok(sequence)
}

fn fit_value_to_f64(value: &fitparser::Value) -> Option<f64> {
    match value {
        fitparser::Value::Float32(v) => Some(*v as f64),
        fitparser::Value::Float64(v) => Some(*v),
        fitparser::Value::SInt16(v) => Some(*v as f64),
        fitparser::Value::UInt16(v) => Some(*v as f64),
        fitparser::Value::SInt32(v) => Some(*v as f64),
        fitparser::Value::UInt32(v) => Some(*v as f64),
        fitparser::Value::SInt64(v) => Some(*v as f64),
        fitparser::Value::UInt64(v) => Some(*v as f64),
        fitparser::Value::UInt16z(v) => Some(*v as f64),
        fitparser::Value::UInt32z(v) => Some(*v as f64),
        fitparser::Value::UInt8(v) => Some(*v as f64),
        fitparser::Value::SInt8(v) => Some(*v as f64),
        _ => None,
    }
}
