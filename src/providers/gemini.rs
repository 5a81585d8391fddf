use anyhow::anyhow;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{
    Message, MessagePart, MessageRole, Provider, ProviderFuture, ProviderResponse, ProviderUsage,
    ToolSpec,
};
use crate::data::ImageAttachment;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub(crate) const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone)]
pub struct Gemini {
    key: String,
    model: String,
    messages: Vec<Message>,
    tools: Vec<ToolSpec>,
}

impl Gemini {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            model: DEFAULT_MODEL.to_string(),
            messages: Vec::new(),
            tools: Vec::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }

    fn find_tool(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|tool| tool.name == name)
    }
}

impl Provider for Gemini {
    fn append_system_input(mut self, input: String) -> Self {
        self.messages.push(Message::system(input));
        self
    }

    fn append_user_input(mut self, input: String) -> Self {
        self.messages.push(Message::user(input));
        self
    }

    fn append_user_image(mut self, image: ImageAttachment) -> Self {
        self.messages.push(Message::user_image(image));
        self
    }

    fn register_tool(mut self, tool: ToolSpec) -> Self {
        self.tools.push(tool);
        self
    }

    fn call_tool(self, tool_name: &str) -> ProviderFuture {
        let tool_name = tool_name.to_string();
        Box::pin(async move {
            let tool = self
                .find_tool(&tool_name)
                .cloned()
                .ok_or_else(|| anyhow!("tool '{}' not registered", tool_name))?;
            let url = format!("{}/{}:generateContent", BASE_URL, self.model);
            let body = request_body(self.messages, &tool);

            debug!("calling Gemini model {}", self.model);
            let response = reqwest::Client::new()
                .post(&url)
                .header("x-goog-api-key", self.key.clone())
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if status.is_success() {
                return extract_tool_response(&text, &tool_name, &self.model);
            }
            Err(anyhow!(
                "Gemini API error ({}): {}",
                status,
                extract_gemini_error(&text).unwrap_or(text)
            ))
        })
    }
}

fn request_body(messages: Vec<Message>, tool: &ToolSpec) -> Value {
    let (system_inputs, user_inputs): (Vec<Message>, Vec<Message>) = messages
        .into_iter()
        .partition(|message| matches!(message.role, MessageRole::System));

    let system_instruction = system_inputs
        .into_iter()
        .flat_map(|message| message.parts)
        .filter_map(|part| match part {
            MessagePart::Text(text) => Some(text),
            MessagePart::Image(_) => None,
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let contents = user_inputs
        .into_iter()
        .map(|message| {
            let parts = message
                .parts
                .into_iter()
                .map(|part| match part {
                    MessagePart::Text(text) => json!({"text": text}),
                    MessagePart::Image(image) => json!({
                        "inline_data": {
                            "mime_type": image.mime,
                            "data": BASE64.encode(&image.bytes)
                        }
                    }),
                })
                .collect::<Vec<_>>();
            json!({
                "role": "user",
                "parts": parts
            })
        })
        .collect::<Vec<_>>();

    json!({
        "contents": contents,
        "systemInstruction": if system_instruction.trim().is_empty() { Value::Null } else { json!({"parts": [{"text": system_instruction}]}) },
        "tools": [
            {
                "function_declarations": [
                    {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters
                    }
                ]
            }
        ],
        "tool_config": {
            "function_calling_config": {
                "mode": "ANY",
                "allowed_function_names": [tool.name]
            }
        }
    })
}

fn extract_tool_response(
    text: &str,
    tool_name: &str,
    fallback_model: &str,
) -> Result<ProviderResponse, anyhow::Error> {
    let payload: GeminiResponse = serde_json::from_str(text)
        .map_err(|err| anyhow!("failed to parse Gemini response JSON: {}", err))?;
    let candidate = payload
        .candidates
        .first()
        .and_then(|candidate| candidate.content.as_ref())
        .ok_or_else(|| anyhow!("no candidate returned from Gemini"))?;

    for part in &candidate.parts {
        if let Some(function_call) = &part.function_call
            && function_call.name == tool_name
        {
            let model = payload
                .model_version
                .filter(|value| !value.trim().is_empty())
                .or_else(|| Some(fallback_model.to_string()));
            let usage = payload.usage_metadata.map(|usage| ProviderUsage {
                prompt_tokens: usage.prompt_token_count,
                completion_tokens: usage.candidates_token_count,
                total_tokens: usage.total_token_count,
            });
            return Ok(ProviderResponse {
                args: function_call.args.clone(),
                model,
                usage,
            });
        }
    }

    Err(anyhow!("no tool call returned from Gemini"))
}

fn extract_gemini_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<GeminiError>,
    }

    #[derive(Deserialize)]
    struct GeminiError {
        message: Option<String>,
        status: Option<String>,
        code: Option<i32>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    let mut parts = Vec::new();
    if let Some(message) = error.message.filter(|value| !value.trim().is_empty()) {
        parts.push(message);
    }
    if let Some(status) = error.status.filter(|value| !value.trim().is_empty()) {
        parts.push(format!("type: {}", status));
    }
    if let Some(code) = error.code {
        parts.push(format!("code: {}", code));
    }
    if parts.is_empty() {
        Some("unknown error".to_string())
    } else {
        Some(parts.join(" | "))
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<GeminiUsage>,
    #[serde(rename = "modelVersion")]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiUsage {
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: Option<u64>,
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: Option<u64>,
    #[serde(rename = "totalTokenCount")]
    total_token_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(rename = "functionCall")]
    function_call: Option<GeminiFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/fixtures/gemini_detections_response.json"
    ));

    #[test]
    fn extracts_tool_args_and_usage() {
        let response =
            extract_tool_response(FIXTURE, "deliver_detections", "gemini-2.5-flash").unwrap();
        assert_eq!(response.model.as_deref(), Some("gemini-2.5-flash-001"));
        let usage = response.usage.unwrap();
        assert_eq!(usage.total_tokens, Some(1422));
        let detections = response.args["detections"].as_array().unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[1]["orientation"], "vertical");
    }

    #[test]
    fn missing_tool_call_is_an_error() {
        let err = extract_tool_response(FIXTURE, "other_tool", "m").unwrap_err();
        assert!(err.to_string().contains("no tool call"));
    }

    #[test]
    fn formats_api_errors() {
        let body = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(
            extract_gemini_error(body).unwrap(),
            "API key not valid | type: INVALID_ARGUMENT | code: 400"
        );
        assert!(extract_gemini_error("not json").is_none());
    }

    #[test]
    fn request_inlines_image_and_forces_tool() {
        let tool = ToolSpec {
            name: "deliver_detections".to_string(),
            description: "d".to_string(),
            parameters: json!({"type": "object"}),
        };
        let image = ImageAttachment {
            bytes: vec![1, 2, 3],
            mime: "image/png".to_string(),
            name: None,
        };
        let body = request_body(
            vec![
                Message::system("sys".to_string()),
                Message::user_image(image),
                Message::user("go".to_string()),
            ],
            &tool,
        );
        insta::assert_json_snapshot!(body, @r#"
        {
          "contents": [
            {
              "parts": [
                {
                  "inline_data": {
                    "data": "AQID",
                    "mime_type": "image/png"
                  }
                }
              ],
              "role": "user"
            },
            {
              "parts": [
                {
                  "text": "go"
                }
              ],
              "role": "user"
            }
          ],
          "systemInstruction": {
            "parts": [
              {
                "text": "sys"
              }
            ]
          },
          "tool_config": {
            "function_calling_config": {
              "allowed_function_names": [
                "deliver_detections"
              ],
              "mode": "ANY"
            }
          },
          "tools": [
            {
              "function_declarations": [
                {
                  "description": "d",
                  "name": "deliver_detections",
                  "parameters": {
                    "type": "object"
                  }
                }
              ]
            }
          ]
        }
        "#);
    }
}
