use std::fmt;

use super::{NORMALIZED_EXTENT, Point, Rect, Viewport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryError {
    MalformedDetection { vertices: usize },
}

impl fmt::Display for GeometryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeometryError::MalformedDetection { vertices } => write!(
                f,
                "malformed detection: quad has {} vertices (expected at least 4)",
                vertices
            ),
        }
    }
}

impl std::error::Error for GeometryError {}

/// Maps a normalized quadrilateral onto the enclosing pixel rectangle of the
/// rendered image. Corner order is not assumed.
pub fn map_to_display(quad: &[Point], viewport: Viewport) -> Result<Rect, GeometryError> {
    if quad.len() < 4 {
        return Err(GeometryError::MalformedDetection {
            vertices: quad.len(),
        });
    }

    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for point in quad {
        min_x = min_x.min(point.x);
        min_y = min_y.min(point.y);
        max_x = max_x.max(point.x);
        max_y = max_y.max(point.y);
    }

    Ok(Rect {
        x: min_x * viewport.width / NORMALIZED_EXTENT,
        y: min_y * viewport.height / NORMALIZED_EXTENT,
        width: (max_x - min_x) * viewport.width / NORMALIZED_EXTENT,
        height: (max_y - min_y) * viewport.height / NORMALIZED_EXTENT,
    })
}

/// Converts a `[ymin, xmin, ymax, xmax]` box into the canonical clockwise quad
/// starting at the top-left corner. Short boxes produce an empty quad so the
/// compositor drops them.
pub fn quad_from_box_2d(box_2d: &[f64]) -> Vec<Point> {
    let [ymin, xmin, ymax, xmax] = match box_2d {
        [ymin, xmin, ymax, xmax, ..] => [*ymin, *xmin, *ymax, *xmax],
        _ => return Vec::new(),
    };
    vec![
        Point::new(xmin, ymin),
        Point::new(xmax, ymin),
        Point::new(xmax, ymax),
        Point::new(xmin, ymax),
    ]
}
