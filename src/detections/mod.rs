use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Value, json};
use tera::{Context as TeraContext, Tera};

use crate::overlay::{Detection, Orientation, quad_from_box_2d};
use crate::providers::ToolSpec;

pub const TOOL_NAME: &str = "deliver_detections";

const SYSTEM_PROMPT_TEMPLATE: &str = include_str!("prompts/system_prompt.tera");

pub fn tool_spec(tool_name: &str) -> ToolSpec {
    let parameters = json!({
        "type": "object",
        "properties": {
            "detections": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "original_text": {"type": "string"},
                        "translated_text": {"type": "string"},
                        "orientation": {"type": "string", "enum": ["horizontal", "vertical"]},
                        "box_2d": {
                            "type": "array",
                            "items": {"type": "number"},
                            "description": "[ymin, xmin, ymax, xmax] normalized to 0-1000"
                        }
                    },
                    "required": ["original_text", "translated_text", "orientation", "box_2d"]
                }
            }
        },
        "required": ["detections"]
    });

    ToolSpec {
        name: tool_name.to_string(),
        description: "Return every text region found in the image with its translation."
            .to_string(),
        parameters,
    }
}

pub fn render_system_prompt(target_lang: &str, tool_name: &str) -> Result<String> {
    let mut context = TeraContext::new();
    context.insert("target_lang", target_lang.trim());
    context.insert("tool_name", tool_name);
    Tera::one_off(SYSTEM_PROMPT_TEMPLATE, &context, false)
        .with_context(|| "failed to render system prompt")
}

pub fn user_instruction(target_lang: &str) -> String {
    format!(
        "Detect the text in the attached image and translate it into {}.",
        target_lang.trim()
    )
}

#[derive(Debug, Deserialize)]
struct ToolArgs {
    #[serde(default)]
    detections: Vec<RawDetection>,
}

/// Wire shape of one region as the model reports it.
#[derive(Debug, Deserialize)]
struct RawDetection {
    #[serde(default)]
    original_text: String,
    #[serde(default)]
    translated_text: String,
    #[serde(default)]
    orientation: Option<String>,
    #[serde(default)]
    box_2d: Vec<f64>,
}

impl From<RawDetection> for Detection {
    fn from(raw: RawDetection) -> Self {
        Detection {
            original_text: raw.original_text,
            translated_text: raw.translated_text,
            orientation: raw
                .orientation
                .as_deref()
                .map(Orientation::parse_lenient)
                .unwrap_or_default(),
            quad: quad_from_box_2d(&raw.box_2d),
        }
    }
}

/// Parses tool arguments into detections, keeping the model's order.
pub fn parse_tool_args(value: Value) -> Result<Vec<Detection>> {
    let args: ToolArgs =
        serde_json::from_value(value).with_context(|| "failed to parse detection tool args")?;
    Ok(args.detections.into_iter().map(Detection::from).collect())
}

/// Parses a detections file: either the raw tool arguments
/// (`{"detections": [...box_2d...]}`) or a list of already converted detections.
pub fn parse_detections_json(text: &str) -> Result<Vec<Detection>> {
    let value: Value =
        serde_json::from_str(text).with_context(|| "failed to parse detections JSON")?;
    if value.is_array() {
        return serde_json::from_value(value).with_context(|| "failed to parse detection list");
    }
    parse_tool_args(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::Point;

    #[test]
    fn prompt_mentions_language_and_tool() {
        let prompt = render_system_prompt(" Japanese ", TOOL_NAME).unwrap();
        assert!(prompt.contains("translate it into Japanese."));
        assert!(prompt.contains("calling the deliver_detections tool"));
    }

    #[test]
    fn converts_box_2d_and_orientation() {
        let detections = parse_tool_args(json!({
            "detections": [
                {"original_text": "出口", "translated_text": "Exit", "orientation": "VERTICAL", "box_2d": [10, 20, 30, 40]},
                {"original_text": "a", "translated_text": "b", "orientation": "diagonal", "box_2d": [0, 0, 5]},
                {"original_text": "c", "translated_text": "d", "box_2d": [1, 2, 3, 4]}
            ]
        }))
        .unwrap();

        assert_eq!(detections.len(), 3);
        assert_eq!(detections[0].orientation, Orientation::Vertical);
        assert_eq!(detections[0].quad[0], Point::new(20.0, 10.0));
        assert_eq!(detections[0].quad[2], Point::new(40.0, 30.0));
        assert_eq!(detections[1].orientation, Orientation::Horizontal);
        assert!(detections[1].quad.is_empty());
        assert_eq!(detections[2].orientation, Orientation::Horizontal);
    }

    #[test]
    fn missing_list_means_no_detections() {
        assert!(parse_tool_args(json!({})).unwrap().is_empty());
    }

    #[test]
    fn detections_file_accepts_both_shapes() {
        let from_tool = parse_detections_json(
            r#"{"detections":[{"original_text":"x","translated_text":"y","orientation":"horizontal","box_2d":[0,0,10,10]}]}"#,
        )
        .unwrap();
        let from_list = parse_detections_json(
            r#"[{"original_text":"x","translated_text":"y","orientation":"horizontal","quad":[{"x":0,"y":0},{"x":10,"y":0},{"x":10,"y":10},{"x":0,"y":10}]}]"#,
        )
        .unwrap();
        assert_eq!(from_tool, from_list);
    }
}
