use anyhow::Result;

use crate::models::ModelSpec;
use crate::request::ContentPart;

/// The hosted model endpoint, as seen by the resolver and the session.
///
/// Every call is synchronous and blocks until the service answers. Errors are
/// opaque: auth failures, quota, unknown models and transport problems all
/// arrive as an `anyhow::Error` whose text is what the user gets to see.
pub trait GenerativeService {
    fn generate_content(&self, model: &str, contents: &[ContentPart]) -> Result<String>;

    /// Full catalog in service order, all pages.
    fn list_models(&self) -> Result<Vec<ModelSpec>>;
}

impl<T: GenerativeService + ?Sized> GenerativeService for &T {
    fn generate_content(&self, model: &str, contents: &[ContentPart]) -> Result<String> {
        (**self).generate_content(model, contents)
    }

    fn list_models(&self) -> Result<Vec<ModelSpec>> {
        (**self).list_models()
    }
}
