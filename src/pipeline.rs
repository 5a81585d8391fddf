use std::fmt;

use tracing::info;

use crate::data::ImageAttachment;
use crate::detections::{self, TOOL_NAME};
use crate::overlay::Detection;
use crate::providers::{Provider, ProviderUsage};

#[derive(Debug)]
pub enum AnalyzeError {
    /// The provider call failed or returned something unusable.
    Provider(anyhow::Error),
    /// The provider answered but reported no text regions.
    EmptyResult,
}

impl fmt::Display for AnalyzeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalyzeError::Provider(err) => write!(f, "detection provider failed: {:#}", err),
            AnalyzeError::EmptyResult => write!(f, "no text found in image"),
        }
    }
}

impl std::error::Error for AnalyzeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AnalyzeError::Provider(err) => Some(&**err),
            AnalyzeError::EmptyResult => None,
        }
    }
}

impl From<anyhow::Error> for AnalyzeError {
    fn from(err: anyhow::Error) -> Self {
        AnalyzeError::Provider(err)
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisOutput {
    pub detections: Vec<Detection>,
    pub model: Option<String>,
    pub usage: Option<ProviderUsage>,
}

/// Sends one image to the provider per call. No retries.
#[derive(Debug, Clone)]
pub struct DetectionPipeline<P: Provider> {
    provider: P,
}

impl<P: Provider> DetectionPipeline<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub async fn analyze(
        &self,
        image: ImageAttachment,
        target_lang: &str,
    ) -> Result<AnalysisOutput, AnalyzeError> {
        let system_prompt = detections::render_system_prompt(target_lang, TOOL_NAME)?;
        let response = self
            .provider
            .clone()
            .register_tool(detections::tool_spec(TOOL_NAME))
            .append_system_input(system_prompt)
            .append_user_image(image)
            .append_user_input(detections::user_instruction(target_lang))
            .call_tool(TOOL_NAME)
            .await?;

        let detections = detections::parse_tool_args(response.args)?;
        if detections.is_empty() {
            return Err(AnalyzeError::EmptyResult);
        }
        info!(
            "provider returned {} detections (model: {})",
            detections.len(),
            response.model.as_deref().unwrap_or("unknown")
        );
        Ok(AnalysisOutput {
            detections,
            model: response.model,
            usage: response.usage,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::providers::{ProviderFuture, ProviderResponse, ToolSpec};
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};

    /// Answers every call with a fixed tool payload and records what was sent.
    #[derive(Clone)]
    pub(crate) struct FixedProvider {
        pub(crate) args: Value,
        pub(crate) fail: bool,
        pub(crate) calls: Arc<Mutex<Vec<Vec<String>>>>,
        pending: Vec<String>,
    }

    impl FixedProvider {
        pub(crate) fn new(args: Value) -> Self {
            Self {
                args,
                fail: false,
                calls: Arc::new(Mutex::new(Vec::new())),
                pending: Vec::new(),
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(Value::Null)
            }
        }
    }

    impl Provider for FixedProvider {
        fn append_system_input(mut self, input: String) -> Self {
            self.pending.push(format!("system:{}", input));
            self
        }

        fn append_user_input(mut self, input: String) -> Self {
            self.pending.push(format!("user:{}", input));
            self
        }

        fn append_user_image(mut self, image: ImageAttachment) -> Self {
            self.pending.push(format!("image:{}", image.mime));
            self
        }

        fn register_tool(mut self, tool: ToolSpec) -> Self {
            self.pending.push(format!("tool:{}", tool.name));
            self
        }

        fn call_tool(self, _tool_name: &str) -> ProviderFuture {
            self.calls.lock().unwrap().push(self.pending.clone());
            Box::pin(async move {
                if self.fail {
                    return Err(anyhow::anyhow!("Gemini API error (500): boom"));
                }
                Ok(ProviderResponse {
                    args: self.args,
                    model: Some("fixed".to_string()),
                    usage: None,
                })
            })
        }
    }

    fn image() -> ImageAttachment {
        ImageAttachment {
            bytes: vec![0],
            mime: "image/png".to_string(),
            name: None,
        }
    }

    #[tokio::test]
    async fn one_request_per_analysis() {
        let provider = FixedProvider::new(json!({
            "detections": [
                {"original_text": "a", "translated_text": "A", "orientation": "horizontal", "box_2d": [0, 0, 10, 10]},
                {"original_text": "b", "translated_text": "B", "orientation": "vertical", "box_2d": [20, 20, 30, 30]}
            ]
        }));
        let calls = provider.calls.clone();
        let pipeline = DetectionPipeline::new(provider);

        let output = pipeline.analyze(image(), "English").await.unwrap();
        assert_eq!(output.detections.len(), 2);
        assert_eq!(output.detections[1].translated_text, "B");
        assert_eq!(output.model.as_deref(), Some("fixed"));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let sent = &calls[0];
        assert_eq!(sent[0], "tool:deliver_detections");
        assert!(sent[1].starts_with("system:"));
        assert_eq!(sent[2], "image:image/png");
        assert!(sent[3].ends_with("into English."));
    }

    #[tokio::test]
    async fn empty_list_is_terminal() {
        let pipeline = DetectionPipeline::new(FixedProvider::new(json!({"detections": []})));
        let err = pipeline.analyze(image(), "English").await.unwrap_err();
        assert!(matches!(err, AnalyzeError::EmptyResult));
    }

    #[tokio::test]
    async fn provider_failure_is_not_retried() {
        let provider = FixedProvider::failing();
        let calls = provider.calls.clone();
        let pipeline = DetectionPipeline::new(provider);
        let err = pipeline.analyze(image(), "English").await.unwrap_err();
        assert!(matches!(err, AnalyzeError::Provider(_)));
        assert!(err.to_string().contains("boom"));
        assert_eq!(calls.lock().unwrap().len(), 1);
    }
}
