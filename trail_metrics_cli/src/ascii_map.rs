//! Plain-text plot of a track's ground path, north up.

use trail_metrics::{Bounds, PointSequence};

const TRACK_GLYPH: char = '.';
const START_GLYPH: char = 'S';
const FINISH_GLYPH: char = 'F';

/// Render the sequence into `height` lines of `width` characters.
/// Start and finish markers are drawn over the track dots.
pub fn render(points: &PointSequence, width: usize, height: usize) -> String {
    let width = width.max(1);
    let height = height.max(1);
    let mut grid = vec![vec![' '; width]; height];

    if let Some(bounds) = points.bounds() {
        let project = |lat: f64, lon: f64| cell(&bounds, lat, lon, width, height);
        for point in points {
            let (row, col) = project(point.latitude, point.longitude);
            grid[row][col] = TRACK_GLYPH;
        }
        if let Some(start) = points.start_point() {
            let (row, col) = project(start.latitude, start.longitude);
            grid[row][col] = START_GLYPH;
        }
        if let Some(end) = points.end_point() {
            let (row, col) = project(end.latitude, end.longitude);
            grid[row][col] = FINISH_GLYPH;
        }
    }

    grid.into_iter()
        .map(|row| row.into_iter().collect::<String>().trim_end().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

fn cell(bounds: &Bounds, lat: f64, lon: f64, width: usize, height: usize) -> (usize, usize) {
    let row = scale(bounds.max_lat - lat, bounds.max_lat - bounds.min_lat, height);
    let col = scale(lon - bounds.min_lon, bounds.max_lon - bounds.min_lon, width);
    (row, col)
}

/// Map `offset` in `[0, span]` onto `0..cells`; a flat span lands mid-grid.
fn scale(offset: f64, span: f64, cells: usize) -> usize {
    if span <= 0.0 || !span.is_finite() {
        return cells / 2;
    }
    let frac = (offset / span).clamp(0.0, 1.0);
    ((frac * (cells - 1) as f64).round() as usize).min(cells - 1)
}
