mod registry;
mod resolver;

pub use registry::{ModelRegistry, ModelSpec, GENERATE_CONTENT};
pub use resolver::{
    HandleSource, ModelHandle, ModelResolver, ProbeOutcome, ResolveError, DEFAULT_CANDIDATE_MODELS,
    PROBE_TEXT,
};
