use super::{FitResult, Orientation, Rect};

/// Constants of the font fitting heuristic.
///
/// Text is modelled as a grid of square cells: each glyph takes
/// `size * glyph_slack` along the writing direction and each line (or column)
/// takes `size * line_height` across it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitPolicy {
    pub min_font_size: f64,
    pub max_font_size: f64,
    /// Total padding removed from each axis before fitting.
    pub padding: f64,
    pub line_height: f64,
    pub glyph_slack: f64,
    /// Resolution of the size search.
    pub step: f64,
}

impl Default for FitPolicy {
    fn default() -> Self {
        Self {
            min_font_size: 12.0,
            max_font_size: 40.0,
            padding: 4.0,
            line_height: 1.2,
            glyph_slack: 1.05,
            step: 0.5,
        }
    }
}

/// Area actually available to glyphs once padding is removed. Never zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TargetArea {
    pub(crate) width: f64,
    pub(crate) height: f64,
}

pub(crate) struct SearchOutcome {
    pub(crate) result: FitResult,
    pub(crate) iterations: usize,
}

/// Solves with the default policy.
pub fn solve(rect: Rect, char_count: usize, orientation: Orientation) -> FitResult {
    FitPolicy::default().solve(rect, char_count, orientation)
}

impl FitPolicy {
    pub fn solve(&self, rect: Rect, char_count: usize, orientation: Orientation) -> FitResult {
        self.search(rect, char_count, orientation).result
    }

    pub(crate) fn target_area(&self, rect: Rect) -> TargetArea {
        TargetArea {
            width: (rect.width - self.padding).max(1.0),
            height: (rect.height - self.padding).max(1.0),
        }
    }

    /// Upper bound of the search: the absolute ceiling, capped by the target
    /// width for horizontal text and the target height for vertical text.
    pub(crate) fn size_ceiling(&self, area: TargetArea, orientation: Orientation) -> f64 {
        match orientation {
            Orientation::Horizontal => self.max_font_size.min(area.width),
            Orientation::Vertical => self.max_font_size.min(area.height),
        }
    }

    /// Glyphs per line (horizontal) or per column (vertical) at `size`.
    pub(crate) fn cells_per_run(
        &self,
        area: TargetArea,
        size: f64,
        orientation: Orientation,
    ) -> usize {
        let along = match orientation {
            Orientation::Horizontal => area.width,
            Orientation::Vertical => area.height,
        };
        ((along / (size * self.glyph_slack)).floor() as usize).max(1)
    }

    pub(crate) fn fits(
        &self,
        area: TargetArea,
        char_count: usize,
        size: f64,
        orientation: Orientation,
    ) -> bool {
        let per_run = self.cells_per_run(area, size, orientation);
        let runs = char_count.div_ceil(per_run) as f64;
        let across = match orientation {
            Orientation::Horizontal => area.height,
            Orientation::Vertical => area.width,
        };
        runs * size * self.line_height <= across
    }

    /// Binary search over the sizes `min_font_size + k * step` up to the
    /// ceiling. Runs on integer step indices so it always terminates.
    pub(crate) fn search(
        &self,
        rect: Rect,
        char_count: usize,
        orientation: Orientation,
    ) -> SearchOutcome {
        let area = self.target_area(rect);
        let ceiling = self.size_ceiling(area, orientation);
        let steps_to_ceiling = ((ceiling - self.min_font_size) / self.step).floor();

        let mut low: i64 = 0;
        let mut high = steps_to_ceiling as i64;
        let mut best = self.min_font_size;
        let mut iterations = 0;

        while low <= high {
            iterations += 1;
            let mid = low + (high - low) / 2;
            let size = self.min_font_size + mid as f64 * self.step;
            if self.fits(area, char_count, size, orientation) {
                best = size;
                low = mid + 1;
            } else {
                high = mid - 1;
            }
        }

        let result = if self.fits(area, char_count, best, orientation) {
            FitResult {
                font_size_px: best,
                overflow: false,
            }
        } else {
            FitResult {
                font_size_px: self.min_font_size,
                overflow: true,
            }
        };
        SearchOutcome { result, iterations }
    }
}
