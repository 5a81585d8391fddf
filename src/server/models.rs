use serde::{Deserialize, Serialize};

use crate::overlay::{Detection, OverlayDescriptor};
use crate::providers::ProviderUsage;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct AnalyzeRequest {
    pub(crate) image_base64: String,
    pub(crate) image_mime: Option<String>,
    pub(crate) lang: Option<String>,
    pub(crate) model: Option<String>,
    pub(crate) key: Option<String>,
    pub(crate) viewport_width: Option<f64>,
    pub(crate) viewport_height: Option<f64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnalyzeResponse {
    pub(crate) detections: Vec<Detection>,
    pub(crate) overlays: Vec<OverlayDescriptor>,
    pub(crate) image_width: u32,
    pub(crate) image_height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) usage: Option<ProviderUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LayoutRequest {
    #[serde(default)]
    pub(crate) detections: Vec<Detection>,
    pub(crate) viewport_width: f64,
    pub(crate) viewport_height: f64,
}

#[derive(Debug, Serialize)]
pub(crate) struct LayoutResponse {
    pub(crate) overlays: Vec<OverlayDescriptor>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}
