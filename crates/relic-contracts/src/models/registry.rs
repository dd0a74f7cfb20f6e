use indexmap::IndexMap;

/// Capability flag the service reports for models that accept `generateContent`.
pub const GENERATE_CONTENT: &str = "generateContent";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub display_name: Option<String>,
    pub capabilities: Vec<String>,
    pub input_token_limit: Option<u64>,
}

impl ModelSpec {
    /// A configured candidate. Candidates are only ever used for content
    /// generation, so that is the one capability they carry.
    pub fn candidate(name: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            display_name: None,
            capabilities: vec![GENERATE_CONTENT.to_string()],
            input_token_limit: None,
        }
    }

    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }

    /// Model id without the `models/` resource prefix the catalog uses.
    pub fn short_name(&self) -> &str {
        self.name
            .strip_prefix("models/")
            .unwrap_or(self.name.as_str())
    }
}

/// Catalog of models in the order the service returned them.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: impl IntoIterator<Item = ModelSpec>) -> Self {
        let mut map = IndexMap::new();
        for model in models {
            if model.name.trim().is_empty() {
                continue;
            }
            map.entry(model.name.clone()).or_insert(model);
        }
        Self { models: map }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn by_capability(&self, capability: &str) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn first_with(&self, capability: &str) -> Option<&ModelSpec> {
        self.models.values().find(|model| model.supports(capability))
    }
}
