use std::fmt;

use thiserror::Error;

pub const MIN_WORD_COUNT: u32 = 50;
pub const MAX_WORD_COUNT: u32 = 2000;
pub const DEFAULT_WORD_COUNT: u32 = 500;
pub const WORD_COUNT_STEP: u32 = 50;

pub const JPEG_MIME: &str = "image/jpeg";
pub const PNG_MIME: &str = "image/png";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("Word count must be between 50 and 2000 (got {0}).")]
    WordCountOutOfRange(i64),
    #[error("Word count must be a whole number (got '{0}').")]
    InvalidWordCount(String),
    #[error("Please enter an artifact name/period or upload an image.")]
    NothingToDescribe,
    #[error("Unsupported image type '{0}'; upload a JPEG or PNG file.")]
    UnsupportedImageType(String),
}

/// Desired description length, always inside `[MIN_WORD_COUNT, MAX_WORD_COUNT]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WordCount(u32);

impl WordCount {
    pub fn new(value: i64) -> Result<Self, InputError> {
        if value < i64::from(MIN_WORD_COUNT) || value > i64::from(MAX_WORD_COUNT) {
            return Err(InputError::WordCountOutOfRange(value));
        }
        Ok(Self(value as u32))
    }

    pub fn parse(raw: &str) -> Result<Self, InputError> {
        let trimmed = raw.trim();
        let value = trimmed
            .parse::<i64>()
            .map_err(|_| InputError::InvalidWordCount(trimmed.to_string()))?;
        Self::new(value)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for WordCount {
    fn default() -> Self {
        Self(DEFAULT_WORD_COUNT)
    }
}

impl fmt::Display for WordCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl ImagePayload {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// One block of the ordered content sequence sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Image(ImagePayload),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationResult {
    Text(String),
    Error(String),
}

pub fn instruction_text(word_count: WordCount, artifact: Option<&str>) -> String {
    let mut prompt = format!(
        "You are an expert historian. Describe the following historical artifact in detail.\n\
         Include its name, origin, approximate time period, historical significance,\n\
         materials, artistic features, and any interesting anecdotes.\n\
         The description should be approximately {word_count} words long."
    );
    if let Some(artifact) = artifact {
        prompt.push_str(&format!("\nArtifact/Period: {artifact}"));
    }
    prompt
}

/// A single generate action, validated and ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    input_text: String,
    instruction: String,
    word_count: WordCount,
    image: Option<ImagePayload>,
}

impl GenerationRequest {
    /// Whitespace-only artifact text counts as absent, but whatever was typed is
    /// still forwarded verbatim as the input text block.
    pub fn build(
        artifact: &str,
        word_count: WordCount,
        image: Option<ImagePayload>,
    ) -> Result<Self, InputError> {
        let has_artifact = !artifact.trim().is_empty();
        if !has_artifact && image.is_none() {
            return Err(InputError::NothingToDescribe);
        }
        let instruction = instruction_text(word_count, has_artifact.then_some(artifact));
        Ok(Self {
            input_text: artifact.to_string(),
            instruction,
            word_count,
            image,
        })
    }

    pub fn input_text(&self) -> &str {
        self.input_text.as_str()
    }

    pub fn instruction(&self) -> &str {
        self.instruction.as_str()
    }

    pub fn word_count(&self) -> WordCount {
        self.word_count
    }

    pub fn image(&self) -> Option<&ImagePayload> {
        self.image.as_ref()
    }

    /// Image first when present, then the raw input text, then the instruction.
    pub fn contents(&self) -> Vec<ContentPart> {
        let mut parts = Vec::with_capacity(3);
        if let Some(image) = &self.image {
            parts.push(ContentPart::Image(image.clone()));
        }
        parts.push(ContentPart::Text(self.input_text.clone()));
        parts.push(ContentPart::Text(self.instruction.clone()));
        parts
    }
}
