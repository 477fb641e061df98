//! Generation engine for interior restyling: image preparation, the Gemini
//! image provider with model fallback, the three-variant studio orchestrator
//! and crop/export.

pub mod cancel;
pub mod error;
pub mod export;
pub mod gemini;
pub mod instruction;
pub mod prepare;
pub mod provider;
pub mod studio;
mod text;

pub use cancel::CancelToken;
pub use error::{ExportError, GenerationError, StartError};
pub use export::{
    crop, crop_rect, download, download_filename, export_item, AspectRatio, DEFAULT_FILE_PREFIX,
    EXPORT_RATIOS,
};
pub use gemini::{GeminiConfig, GeminiProvider};
pub use instruction::{build_instruction, GenerationPayload};
pub use prepare::{dimensions, load_upload, to_data_uri, DataUri, UploadedImage};
pub use provider::{
    classify_response, FallbackGenerator, Generated, ImageGenerator, ResponseClass,
};
pub use studio::{BatchReport, Studio, StudioUpdate};
pub use text::non_empty_env;
