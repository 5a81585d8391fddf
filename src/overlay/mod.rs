mod compose;
mod fit;
mod geometry;

pub use compose::{OverlaySession, compose};
pub use fit::{FitPolicy, solve};
pub use geometry::{GeometryError, map_to_display, quad_from_box_2d};

use serde::{Deserialize, Serialize};

/// Side length of the normalized coordinate grid used by the detection pipeline.
pub const NORMALIZED_EXTENT: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned box in pixels of the rendered image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Rendered size of the image element the overlays are painted on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Display size for an image of `natural` pixels. A single requested side
    /// keeps the aspect ratio; none keeps the natural size.
    pub fn for_display(natural: (u32, u32), width: Option<f64>, height: Option<f64>) -> Self {
        let (nat_w, nat_h) = (natural.0.max(1) as f64, natural.1.max(1) as f64);
        match (width, height) {
            (Some(w), Some(h)) => Self::new(w, h),
            (Some(w), None) => Self::new(w, (w * nat_h / nat_w).round()),
            (None, Some(h)) => Self::new((h * nat_w / nat_h).round(), h),
            (None, None) => Self::new(nat_w, nat_h),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Horizontal,
    Vertical,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Horizontal => "horizontal",
            Orientation::Vertical => "vertical",
        }
    }

    /// Lenient parse used for provider output; anything unrecognized is horizontal.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "vertical" | "vertical-rl" | "tb" | "tb-rl" => Orientation::Vertical,
            _ => Orientation::Horizontal,
        }
    }
}

/// One recognized text region as returned by the detection pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub original_text: String,
    pub translated_text: String,
    #[serde(default)]
    pub orientation: Orientation,
    pub quad: Vec<Point>,
}

impl Detection {
    pub fn char_count(&self) -> usize {
        self.translated_text.chars().count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub font_size_px: f64,
    pub overflow: bool,
}

/// Order in which wrapped lines/columns stack along the cross axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackDirection {
    Forward,
    Reverse,
}

impl StackDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            StackDirection::Forward => "forward",
            StackDirection::Reverse => "reverse",
        }
    }
}

impl From<Orientation> for StackDirection {
    fn from(orientation: Orientation) -> Self {
        match orientation {
            Orientation::Horizontal => StackDirection::Forward,
            // vertical columns run right to left
            Orientation::Vertical => StackDirection::Reverse,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayDescriptor {
    /// Position of the source detection in the pipeline output.
    pub index: usize,
    pub rect: Rect,
    pub font_size_px: f64,
    pub overflow: bool,
    pub writing_mode: Orientation,
    pub stack_direction: StackDirection,
    pub text: String,
    pub tooltip: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_size_defaults_to_natural() {
        assert_eq!(Viewport::for_display((640, 480), None, None), Viewport::new(640.0, 480.0));
    }

    #[test]
    fn single_side_keeps_aspect() {
        assert_eq!(
            Viewport::for_display((640, 480), Some(320.0), None),
            Viewport::new(320.0, 240.0)
        );
        assert_eq!(
            Viewport::for_display((640, 480), None, Some(120.0)),
            Viewport::new(160.0, 120.0)
        );
    }

    #[test]
    fn zero_viewport_is_invalid() {
        assert!(!Viewport::new(0.0, 10.0).is_valid());
        assert!(!Viewport::new(10.0, f64::NAN).is_valid());
        assert!(Viewport::new(1.0, 1.0).is_valid());
    }

    #[test]
    fn orientation_parse_is_lenient() {
        assert_eq!(Orientation::parse_lenient(" Vertical-RL "), Orientation::Vertical);
        assert_eq!(Orientation::parse_lenient("diagonal"), Orientation::Horizontal);
        assert_eq!(StackDirection::from(Orientation::Vertical), StackDirection::Reverse);
    }

    #[test]
    fn char_count_counts_scalars() {
        let detection = Detection {
            original_text: String::new(),
            translated_text: "縦書き".to_string(),
            orientation: Orientation::Vertical,
            quad: Vec::new(),
        };
        assert_eq!(detection.char_count(), 3);
    }
}
