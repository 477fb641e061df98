use serde_json::{json, Value};

use crate::prepare::UploadedImage;

/// MIME type sent with every source image, whatever its real encoding.
pub const PAYLOAD_MIME_TYPE: &str = "image/png";

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

pub fn build_instruction(room_name: &str, style_prompt: &str) -> String {
    format!(
        "Redesign the interior of this {room} in the following style: {style}. \
Keep the architecture exactly as it is: walls, windows and doors stay in the same place with the same size and shape. \
Preserve the original camera position, perspective and framing. \
Only change the furniture, fixtures, materials, colors and decor. \
Output a single high-quality photorealistic image of the redesigned {room}.",
        room = room_name.trim().to_lowercase(),
        style = style_prompt.trim(),
    )
}

/// Everything one generation call sends, shared by the three calls of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationPayload {
    pub image_base64: String,
    pub mime_type: String,
    pub instruction: String,
}

impl GenerationPayload {
    pub fn new(image_base64: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            image_base64: image_base64.into(),
            mime_type: PAYLOAD_MIME_TYPE.to_string(),
            instruction: instruction.into(),
        }
    }

    pub fn for_upload(upload: &UploadedImage, room_name: &str, style_prompt: &str) -> Self {
        Self::new(
            upload.base64_payload(),
            build_instruction(room_name, style_prompt),
        )
    }

    /// `generateContent` body: image part first, then the text instruction.
    pub fn to_request_body(&self) -> Value {
        json!({
            "contents": [{
                "parts": [
                    {
                        "inlineData": {
                            "mimeType": self.mime_type,
                            "data": self.image_base64,
                        }
                    },
                    { "text": self.instruction },
                ]
            }],
            "safetySettings": safety_settings(),
        })
    }
}

pub fn safety_settings() -> Vec<Value> {
    HARM_CATEGORIES
        .into_iter()
        .map(|category| {
            json!({
                "category": category,
                "threshold": "BLOCK_NONE",
            })
        })
        .collect()
}
