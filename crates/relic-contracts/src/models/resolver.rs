use thiserror::Error;
use tracing::{debug, info, warn};

use super::registry::{ModelRegistry, ModelSpec, GENERATE_CONTENT};
use crate::request::ContentPart;
use crate::service::GenerativeService;

/// Candidates in priority order.
pub const DEFAULT_CANDIDATE_MODELS: &[&str] = &["gemini-1.5-flash", "gemini-1.0-pro", "gemini-pro"];

/// Input of the throwaway request used to check that a candidate answers.
pub const PROBE_TEXT: &str = "test";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleSource {
    Candidate,
    Catalog,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelHandle {
    pub model: ModelSpec,
    pub source: HandleSource,
    pub fallback_reason: Option<String>,
}

impl ModelHandle {
    pub fn name(&self) -> &str {
        self.model.name.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Ready(ModelSpec),
    Failed { model: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(
        "No compatible Gemini model found. Please check your API key and ensure the \
         Generative Language API is enabled."
    )]
    NoCompatibleModel {
        probes: Vec<ProbeOutcome>,
        catalog_error: Option<String>,
    },
}

/// Linear first-success scan over the configured candidates, then the catalog.
///
/// Probe failures never reach the user; they are kept as [`ProbeOutcome::Failed`]
/// entries and only show up inside the final [`ResolveError`] when nothing
/// resolves. The catalog fallback takes the first capable model in whatever order
/// the service lists them, which the service does not promise to keep stable.
#[derive(Debug, Clone)]
pub struct ModelResolver {
    candidates: Vec<String>,
}

impl Default for ModelResolver {
    fn default() -> Self {
        Self::new(DEFAULT_CANDIDATE_MODELS.iter().map(|name| name.to_string()))
    }
}

impl ModelResolver {
    pub fn new(candidates: impl IntoIterator<Item = String>) -> Self {
        Self {
            candidates: candidates
                .into_iter()
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect(),
        }
    }

    pub fn candidates(&self) -> &[String] {
        self.candidates.as_slice()
    }

    pub fn probe<S: GenerativeService + ?Sized>(&self, service: &S, model: &str) -> ProbeOutcome {
        let probe = [ContentPart::Text(PROBE_TEXT.to_string())];
        match service.generate_content(model, &probe) {
            Ok(_) => ProbeOutcome::Ready(ModelSpec::candidate(model)),
            Err(err) => ProbeOutcome::Failed {
                model: model.to_string(),
                reason: format!("{err:#}"),
            },
        }
    }

    pub fn resolve<S: GenerativeService + ?Sized>(
        &self,
        service: &S,
    ) -> Result<ModelHandle, ResolveError> {
        let mut probes = Vec::new();
        for candidate in &self.candidates {
            match self.probe(service, candidate) {
                ProbeOutcome::Ready(model) => {
                    info!(model = %model.name, "candidate model answered probe");
                    return Ok(ModelHandle {
                        model,
                        source: HandleSource::Candidate,
                        fallback_reason: None,
                    });
                }
                ProbeOutcome::Failed { model, reason } => {
                    debug!(model = %model, reason = %reason, "candidate model probe failed");
                    probes.push(ProbeOutcome::Failed { model, reason });
                }
            }
        }

        let catalog = match service.list_models() {
            Ok(models) => ModelRegistry::new(models),
            Err(err) => {
                let reason = format!("Failed to list models: {err:#}");
                warn!("{reason}");
                return Err(ResolveError::NoCompatibleModel {
                    probes,
                    catalog_error: Some(reason),
                });
            }
        };

        let Some(model) = catalog.first_with(GENERATE_CONTENT).cloned() else {
            debug!(listed = catalog.len(), "catalog has no content generation model");
            return Err(ResolveError::NoCompatibleModel {
                probes,
                catalog_error: None,
            });
        };

        let fallback_reason = if self.candidates.is_empty() {
            format!("No candidate models configured; using catalog model '{}'.", model.name)
        } else {
            format!(
                "Candidate models unavailable ({}); using catalog model '{}'.",
                self.candidates.join(", "),
                model.name
            )
        };
        info!(model = %model.name, "resolved model from catalog");
        Ok(ModelHandle {
            model,
            source: HandleSource::Catalog,
            fallback_reason: Some(fallback_reason),
        })
    }
}
