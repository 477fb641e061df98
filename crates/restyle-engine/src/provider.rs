use anyhow::Result;
use restyle_contracts::models::ModelChain;
use serde_json::Value;

use crate::cancel::CancelToken;
use crate::error::GenerationError;
use crate::instruction::GenerationPayload;
use crate::prepare::DataUri;
use crate::text::error_chain_text;

/// A hosted image-editing endpoint. Implementations hold no per-call state.
pub trait ImageGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// Runs one request against `model` and returns the image as a data URI.
    fn generate(&self, model: &str, payload: &GenerationPayload) -> Result<String>;
}

/// Shape of a `generateContent` response, decided before anything is
/// extracted from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseClass {
    ImageFound { mime_type: String, data: String },
    NoImage,
    Malformed(String),
}

impl ResponseClass {
    pub fn into_data_uri(self) -> Result<String, GenerationError> {
        match self {
            Self::ImageFound { mime_type, data } => Ok(DataUri::new(mime_type, data).to_uri()),
            Self::NoImage => Err(GenerationError::NoImage),
            Self::Malformed(reason) => Err(GenerationError::Malformed(reason)),
        }
    }
}

/// Finds the first inline image across the response candidates.
pub fn classify_response(response: &Value) -> ResponseClass {
    let Some(root) = response.as_object() else {
        return ResponseClass::Malformed("response is not a JSON object".to_string());
    };
    let candidates = match root.get("candidates") {
        None | Some(Value::Null) => return ResponseClass::NoImage,
        Some(Value::Array(rows)) => rows,
        Some(_) => return ResponseClass::Malformed("candidates is not an array".to_string()),
    };

    for candidate in candidates {
        let content = match candidate.get("content") {
            None | Some(Value::Null) => continue,
            Some(Value::Object(content)) => content,
            Some(_) => {
                return ResponseClass::Malformed("candidate content is not an object".to_string())
            }
        };
        let parts = match content.get("parts") {
            None | Some(Value::Null) => continue,
            Some(Value::Array(parts)) => parts,
            Some(_) => return ResponseClass::Malformed("content parts is not an array".to_string()),
        };
        for part in parts {
            let Some(inline) = part.get("inlineData").or_else(|| part.get("inline_data")) else {
                continue;
            };
            let Some(inline) = inline.as_object() else {
                return ResponseClass::Malformed("inlineData is not an object".to_string());
            };
            let data = match inline.get("data") {
                None | Some(Value::Null) => continue,
                Some(Value::String(data)) => data.trim(),
                Some(_) => {
                    return ResponseClass::Malformed("inlineData.data is not a string".to_string())
                }
            };
            if data.is_empty() {
                continue;
            }
            let mime_type = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .unwrap_or("image/png");
            return ResponseClass::ImageFound {
                mime_type: mime_type.to_string(),
                data: data.to_string(),
            };
        }
    }

    ResponseClass::NoImage
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub image: String,
    pub model: String,
    pub fell_back: bool,
}

/// Walks the model chain: primary first, then one attempt on the fallback
/// with the identical payload.
pub struct FallbackGenerator<G: ImageGenerator> {
    provider: G,
    chain: ModelChain,
}

impl<G: ImageGenerator> FallbackGenerator<G> {
    pub fn new(provider: G, chain: ModelChain) -> Self {
        Self { provider, chain }
    }

    pub fn provider(&self) -> &G {
        &self.provider
    }

    pub fn chain(&self) -> &ModelChain {
        &self.chain
    }

    pub fn generate(
        &self,
        payload: &GenerationPayload,
        cancel: &CancelToken,
    ) -> Result<Generated, GenerationError> {
        let models = self.chain.names();
        let mut last_message = String::new();

        for (attempt, model) in models.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(GenerationError::Cancelled);
            }
            log::info!("{}: generating with {model}", self.provider.name());
            match self.provider.generate(model, payload) {
                Ok(image) => {
                    return Ok(Generated {
                        image,
                        model: (*model).to_string(),
                        fell_back: attempt > 0,
                    })
                }
                Err(err) => {
                    last_message = error_chain_text(&err, 600);
                    if let Some(next) = models.get(attempt + 1) {
                        log::warn!("{model} failed, falling back to {next}: {last_message}");
                    } else {
                        log::error!("{model} failed after fallback: {last_message}");
                    }
                }
            }
        }

        if last_message.is_empty() {
            last_message = "Failed to generate image.".to_string();
        }
        Err(GenerationError::Exhausted {
            message: last_message,
        })
    }
}
