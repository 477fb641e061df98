mod registry;
mod selectors;

pub use registry::{ModelRegistry, ModelSpec, DEFAULT_FALLBACK_MODEL, DEFAULT_PRIMARY_MODEL};
pub use selectors::{ModelChain, ModelSelector};
