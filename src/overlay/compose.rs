use tracing::debug;

use super::fit::FitPolicy;
use super::geometry::map_to_display;
use super::{Detection, OverlayDescriptor, StackDirection, Viewport};

/// Lays out every detection for the given viewport, in input order.
/// Detections whose quad has fewer than four vertices are skipped.
pub fn compose(detections: &[Detection], viewport: Viewport) -> Vec<OverlayDescriptor> {
    let policy = FitPolicy::default();
    let mut overlays = Vec::with_capacity(detections.len());
    for (index, detection) in detections.iter().enumerate() {
        let rect = match map_to_display(&detection.quad, viewport) {
            Ok(rect) => rect,
            Err(err) => {
                debug!("skipping detection {}: {}", index, err);
                continue;
            }
        };
        let fit = policy.solve(rect, detection.char_count(), detection.orientation);
        overlays.push(OverlayDescriptor {
            index,
            rect,
            font_size_px: fit.font_size_px,
            overflow: fit.overflow,
            writing_mode: detection.orientation,
            stack_direction: StackDirection::from(detection.orientation),
            text: detection.translated_text.clone(),
            tooltip: detection.original_text.clone(),
        });
    }
    debug!(
        "composed {} overlays from {} detections at {}x{}",
        overlays.len(),
        detections.len(),
        viewport.width,
        viewport.height
    );
    overlays
}

/// Last analysis result plus last viewport. Either trigger produces a freshly
/// composed list; nothing previously returned is touched.
#[derive(Debug, Clone, Default)]
pub struct OverlaySession {
    detections: Vec<Detection>,
    viewport: Option<Viewport>,
}

impl OverlaySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// New analysis result arrived.
    pub fn set_detections(&mut self, detections: Vec<Detection>) -> Vec<OverlayDescriptor> {
        self.detections = detections;
        self.overlays()
    }

    /// Displayed image changed size.
    pub fn resize(&mut self, viewport: Viewport) -> Vec<OverlayDescriptor> {
        self.viewport = Some(viewport);
        self.overlays()
    }

    /// Empty until a viewport has been measured.
    pub fn overlays(&self) -> Vec<OverlayDescriptor> {
        match self.viewport {
            Some(viewport) => compose(&self.detections, viewport),
            None => Vec::new(),
        }
    }
}
