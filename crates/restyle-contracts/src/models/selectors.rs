use super::registry::{ModelRegistry, ModelSpec, DEFAULT_FALLBACK_MODEL, DEFAULT_PRIMARY_MODEL};

/// Ordered pair of models a generation call walks through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelChain {
    pub primary: ModelSpec,
    pub fallback: ModelSpec,
    pub notes: Vec<String>,
}

impl ModelChain {
    pub fn names(&self) -> [&str; 2] {
        [self.primary.name.as_str(), self.fallback.name.as_str()]
    }
}

#[derive(Debug, Clone)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_else(|| ModelRegistry::new(None)),
        }
    }

    /// Resolves the primary/fallback pair for image editing.
    ///
    /// Unknown or non-editing model names are replaced by the defaults and the
    /// substitution is recorded in `notes`.
    pub fn chain(
        &self,
        primary: Option<&str>,
        fallback: Option<&str>,
    ) -> Result<ModelChain, String> {
        let mut notes = Vec::new();
        let primary = self.pick(primary, DEFAULT_PRIMARY_MODEL, 0, &mut notes)?;
        let fallback = self.pick(fallback, DEFAULT_FALLBACK_MODEL, 1, &mut notes)?;
        if primary == fallback {
            notes.push(format!(
                "Fallback model '{}' matches the primary; the fallback attempt repeats the same model.",
                fallback.name
            ));
        }
        Ok(ModelChain {
            primary,
            fallback,
            notes,
        })
    }

    fn pick(
        &self,
        requested: Option<&str>,
        default_name: &str,
        default_rank: usize,
        notes: &mut Vec<String>,
    ) -> Result<ModelSpec, String> {
        let requested = requested.map(str::trim).filter(|value| !value.is_empty());
        if let Some(requested_value) = requested {
            if let Some(model) = self.registry.ensure(requested_value, "edit") {
                return Ok(model);
            }
            notes.push(format!(
                "Requested model '{requested_value}' unavailable for capability 'edit'."
            ));
        }

        if let Some(model) = self.registry.ensure(default_name, "edit") {
            return Ok(model);
        }
        let candidates = self.registry.by_capability("edit");
        candidates
            .get(default_rank)
            .or_else(|| candidates.first())
            .cloned()
            .ok_or_else(|| "No models available for capability 'edit'.".to_string())
    }
}
