use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use resvg::render;
use std::fmt::Write as _;
use std::io::Cursor;
use std::sync::Arc;
use tiny_skia::Pixmap;
use usvg::{Options, Tree, fontdb};

use crate::data::ImageAttachment;
use crate::overlay::{FitPolicy, Orientation, OverlayDescriptor, Rect, Viewport};

pub struct OverlayStyle {
    pub text_color: String,
    pub fill_color: String,
    pub stroke_color: String,
    pub font_family: Option<String>,
}

/// Paints the overlays over the image scaled to `viewport`.
///
/// Text that fits is centered in its box. Overflowing text starts at the
/// box's leading corner and is clipped to the box, the static stand-in for a
/// scrollable region.
pub fn render_svg(
    image: &ImageAttachment,
    viewport: Viewport,
    overlays: &[OverlayDescriptor],
    style: &OverlayStyle,
) -> String {
    let data_uri = format!("data:{};base64,{}", image.mime, BASE64.encode(&image.bytes));
    let policy = FitPolicy::default();
    let family = style.font_family.as_deref().unwrap_or("sans-serif");

    let mut svg = String::new();
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = viewport.width,
        h = viewport.height
    );
    let _ = write!(
        svg,
        r#"<image href="{uri}" xlink:href="{uri}" x="0" y="0" width="{w}" height="{h}" preserveAspectRatio="none"/>"#,
        uri = data_uri,
        w = viewport.width,
        h = viewport.height
    );

    for overlay in overlays {
        let Rect {
            x,
            y,
            width,
            height,
        } = overlay.rect;
        svg.push_str("<g>");
        let _ = write!(svg, "<title>{}</title>", escape_xml(&overlay.tooltip));
        let _ = write!(
            svg,
            r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="{fill}" stroke="{stroke}" stroke-width="1"/>"#,
            w = width,
            h = height,
            fill = escape_xml(&style.fill_color),
            stroke = escape_xml(&style.stroke_color)
        );

        let clip = if overlay.overflow {
            let clip_id = format!("clip-{}", overlay.index);
            let _ = write!(
                svg,
                r#"<clipPath id="{id}"><rect x="{x}" y="{y}" width="{w}" height="{h}"/></clipPath>"#,
                id = clip_id,
                w = width,
                h = height
            );
            format!(r#" clip-path="url(#{})""#, clip_id)
        } else {
            String::new()
        };

        let _ = write!(
            svg,
            r#"<text font-size="{size}" font-family="{family}" fill="{color}" text-anchor="middle"{clip}>"#,
            size = overlay.font_size_px,
            family = escape_xml(family),
            color = escape_xml(&style.text_color),
        );
        let glyphs = match overlay.writing_mode {
            Orientation::Horizontal => horizontal_glyphs(&policy, overlay),
            Orientation::Vertical => vertical_glyphs(&policy, overlay),
        };
        for (gx, gy, text) in glyphs {
            let _ = write!(
                svg,
                r#"<tspan x="{gx}" y="{gy}">{text}</tspan>"#,
                text = escape_xml(&text)
            );
        }
        svg.push_str("</text></g>");
    }

    svg.push_str("</svg>");
    svg
}

/// One centered tspan per wrapped line: `(center_x, baseline_y, text)`.
fn horizontal_glyphs(policy: &FitPolicy, overlay: &OverlayDescriptor) -> Vec<(f64, f64, String)> {
    let rect = overlay.rect;
    let size = overlay.font_size_px;
    let area = policy.target_area(rect);
    let per_line = policy.cells_per_run(area, size, Orientation::Horizontal);
    let lines = chunk_chars(&overlay.text, per_line);
    let line_height = size * policy.line_height;
    let block_height = lines.len() as f64 * line_height;
    let inset = policy.padding / 2.0;

    let top = if overlay.overflow {
        rect.y + inset
    } else {
        rect.y + (rect.height - block_height) / 2.0
    };
    let line_width = |line: &str| line.chars().count() as f64 * size * policy.glyph_slack;

    lines
        .into_iter()
        .enumerate()
        .map(|(row, line)| {
            let center_x = if overlay.overflow {
                rect.x + inset + line_width(&line) / 2.0
            } else {
                rect.x + rect.width / 2.0
            };
            let baseline = top + row as f64 * line_height + line_height / 2.0 + size * 0.35;
            (center_x, baseline, line)
        })
        .collect()
}

/// One tspan per glyph, columns laid out right to left.
fn vertical_glyphs(policy: &FitPolicy, overlay: &OverlayDescriptor) -> Vec<(f64, f64, String)> {
    let rect = overlay.rect;
    let size = overlay.font_size_px;
    let area = policy.target_area(rect);
    let per_column = policy.cells_per_run(area, size, Orientation::Vertical);
    let columns = chunk_chars(&overlay.text, per_column);
    let column_width = size * policy.line_height;
    let cell = size * policy.glyph_slack;
    let inset = policy.padding / 2.0;

    let right = if overlay.overflow {
        rect.x + rect.width - inset
    } else {
        rect.x + (rect.width + columns.len() as f64 * column_width) / 2.0
    };

    let mut glyphs = Vec::new();
    for (col, column) in columns.iter().enumerate() {
        let center_x = right - (col as f64 + 0.5) * column_width;
        let count = column.chars().count() as f64;
        let top = if overlay.overflow {
            rect.y + inset
        } else {
            rect.y + (rect.height - count * cell) / 2.0
        };
        for (row, ch) in column.chars().enumerate() {
            let baseline = top + row as f64 * cell + cell / 2.0 + size * 0.35;
            glyphs.push((center_x, baseline, ch.to_string()));
        }
    }
    glyphs
}

fn chunk_chars(text: &str, per_chunk: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().filter(|ch| *ch != '\n').collect();
    chars
        .chunks(per_chunk.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

pub fn render_svg_bytes(svg: &str, output_mime: &str, font_data: Option<&[u8]>) -> Result<Vec<u8>> {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    if let Some(data) = font_data {
        db.load_font_data(data.to_vec());
    }
    let options = Options {
        fontdb: Arc::new(db),
        ..Options::default()
    };
    let tree = Tree::from_str(svg, &options).with_context(|| "failed to parse SVG")?;
    let size = tree.size().to_int_size();
    let mut pixmap =
        Pixmap::new(size.width(), size.height()).ok_or_else(|| anyhow!("empty SVG size"))?;
    let mut pixmap_mut = pixmap.as_mut();
    render(&tree, tiny_skia::Transform::identity(), &mut pixmap_mut);
    let image = image::RgbaImage::from_raw(size.width(), size.height(), pixmap.data().to_vec())
        .ok_or_else(|| anyhow!("failed to build image buffer from SVG"))?;
    let format = image_format_from_mime(output_mime)
        .ok_or_else(|| anyhow!("unsupported output image mime '{}'", output_mime))?;
    let mut bytes = Vec::new();
    let mut cursor = Cursor::new(&mut bytes);
    let encoded = if format == image::ImageFormat::Jpeg {
        image::DynamicImage::ImageRgb8(image::DynamicImage::ImageRgba8(image).to_rgb8())
    } else {
        image::DynamicImage::ImageRgba8(image)
    };
    encoded
        .write_to(&mut cursor, format)
        .with_context(|| "failed to encode image from SVG")?;
    Ok(bytes)
}

fn image_format_from_mime(mime: &str) -> Option<image::ImageFormat> {
    match mime {
        "image/png" => Some(image::ImageFormat::Png),
        "image/jpeg" | "image/jpg" => Some(image::ImageFormat::Jpeg),
        "image/gif" => Some(image::ImageFormat::Gif),
        "image/webp" => Some(image::ImageFormat::WebP),
        "image/bmp" => Some(image::ImageFormat::Bmp),
        "image/tiff" => Some(image::ImageFormat::Tiff),
        _ => None,
    }
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
