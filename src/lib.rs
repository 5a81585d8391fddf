use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use tracing::info;

pub mod data;
pub mod detections;
pub mod logging;
pub mod overlay;
pub mod pipeline;
pub mod providers;
pub mod render;
pub mod server;
pub mod settings;
mod test_util;

pub use pipeline::{AnalysisOutput, AnalyzeError, DetectionPipeline};
pub use providers::{Gemini, Provider, ProviderUsage};
pub use render::{OverlayStyle, render_svg, render_svg_bytes};
pub use server::run_server;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub data: Option<String>,
    pub data_mime: Option<String>,
    pub lang: Option<String>,
    pub model: Option<String>,
    pub key: Option<String>,
    pub detections_path: Option<String>,
    pub display_width: Option<u32>,
    pub display_height: Option<u32>,
    pub output: Option<String>,
    pub settings_path: Option<String>,
    pub with_using_model: bool,
}

/// Runs one translate action: analyze (or load) detections, lay them out for
/// the display size and either print the overlay list or write the rendered
/// image.
pub async fn run(config: Config, stdin: Option<Vec<u8>>) -> Result<String> {
    let settings = settings::load_settings(config.settings_path.as_deref().map(Path::new))?;
    let image = load_input_image(&config, stdin)?;
    let natural = image.dimensions()?;

    let mut model_used = None;
    let detections = match config.detections_path.as_deref() {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read detections: {}", path))?;
            detections::parse_detections_json(&text)?
        }
        None => {
            let key = providers::resolve_key(config.key.as_deref())
                .with_context(|| "no API key found for Gemini")?;
            let model = config.model.as_deref().unwrap_or(&settings.model);
            let lang = config.lang.as_deref().unwrap_or(&settings.target_lang);
            let pipeline = DetectionPipeline::new(providers::build_provider(key, Some(model)));
            let output = pipeline.analyze(image.clone(), lang).await?;
            model_used = output.model;
            output.detections
        }
    };

    let viewport = overlay::Viewport::for_display(
        natural,
        config.display_width.map(f64::from),
        config.display_height.map(f64::from),
    );
    if !viewport.is_valid() {
        return Err(anyhow!("display size must be positive"));
    }
    let overlays = overlay::compose(&detections, viewport);
    info!(
        "{} of {} detections laid out at {}x{}",
        overlays.len(),
        detections.len(),
        viewport.width,
        viewport.height
    );

    let mut output = match config.output.as_deref() {
        Some(path) => {
            let path = PathBuf::from(path);
            write_rendered_image(&path, &image, viewport, &overlays, &settings)?;
            format!("wrote {}", path.display())
        }
        None => serde_json::to_string_pretty(&overlays)?,
    };
    if config.with_using_model {
        output.push_str(&format!(
            "\nmodel: {}",
            model_used.as_deref().unwrap_or("unavailable")
        ));
    }
    Ok(output)
}

pub async fn serve(
    settings_path: Option<&str>,
    key: Option<String>,
    addr: Option<String>,
) -> Result<()> {
    let settings = settings::load_settings(settings_path.map(Path::new))?;
    let addr = addr.unwrap_or_else(|| settings.server_addr.clone());
    run_server(settings, key, addr).await
}

fn load_input_image(config: &Config, stdin: Option<Vec<u8>>) -> Result<data::ImageAttachment> {
    if let Some(path) = config.data.as_deref() {
        return data::load_image(Path::new(path), config.data_mime.as_deref());
    }
    match stdin {
        Some(bytes) if !bytes.is_empty() => {
            data::load_image_from_bytes(bytes, config.data_mime.as_deref(), None)
        }
        _ => Err(anyhow!("no image given (use --data or pipe an image to stdin)")),
    }
}

fn write_rendered_image(
    path: &Path,
    image: &data::ImageAttachment,
    viewport: overlay::Viewport,
    overlays: &[overlay::OverlayDescriptor],
    settings: &settings::Settings,
) -> Result<()> {
    let font_data = match settings.overlay_font_path.as_deref() {
        Some(font_path) => Some(
            std::fs::read(font_path)
                .with_context(|| format!("failed to read font: {}", font_path))?,
        ),
        None => None,
    };
    let style = OverlayStyle {
        text_color: settings.overlay_text_color.clone(),
        fill_color: settings.overlay_fill_color.clone(),
        stroke_color: settings.overlay_stroke_color.clone(),
        font_family: settings.overlay_font_family.clone(),
    };
    let svg = render_svg(image, viewport, overlays, &style);
    let bytes = render_svg_bytes(&svg, data::mime_for_output(path), font_data.as_deref())?;
    std::fs::write(path, bytes)
        .with_context(|| format!("failed to write output image: {}", path.display()))?;
    Ok(())
}
