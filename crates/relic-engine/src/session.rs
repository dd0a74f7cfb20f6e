use std::io;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use relic_contracts::events::{EventPayload, EventWriter};
use relic_contracts::facts::random_fact;
use relic_contracts::models::{HandleSource, ModelHandle, ModelResolver, ResolveError};
use relic_contracts::request::{GenerationRequest, GenerationResult, InputError, WordCount};
use relic_contracts::service::GenerativeService;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::RelicConfig;
use crate::error_chain_text;
use crate::render::Renderer;
use crate::upload::ImageUpload;

const ERROR_TEXT_MAX_CHARS: usize = 2000;

/// Startup state: configuration, the service client and the resolved model.
/// Nothing in here changes after construction.
pub struct AppContext<S> {
    config: RelicConfig,
    service: S,
    model: ModelHandle,
}

impl<S: GenerativeService> AppContext<S> {
    pub fn new(config: RelicConfig, service: S, model: ModelHandle) -> Self {
        Self {
            config,
            service,
            model,
        }
    }

    /// Resolves the model against `service` using the configured candidates.
    pub fn start(config: RelicConfig, service: S) -> Result<Self, ResolveError> {
        let resolver = ModelResolver::new(config.candidate_models.clone());
        let model = resolver.resolve(&service)?;
        Ok(Self::new(config, service, model))
    }

    pub fn config(&self) -> &RelicConfig {
        &self.config
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }
}

/// The user's controls at the moment "generate" is triggered.
#[derive(Debug, Clone, Default)]
pub struct GenerateInput {
    pub artifact: String,
    pub image: Option<ImageUpload>,
    pub word_count: WordCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionPhase {
    Idle,
    ValidatingInput,
    Rejected,
    AwaitingResponse,
    Rendered,
    Failed,
}

impl ActionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ValidatingInput => "validating_input",
            Self::Rejected => "rejected",
            Self::AwaitingResponse => "awaiting_response",
            Self::Rendered => "rendered",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Rejected(InputError),
    Rendered(String),
    Failed(String),
}

pub struct Session<'a, S, R = StdRng> {
    ctx: &'a AppContext<S>,
    events: EventWriter,
    rng: R,
    phase: ActionPhase,
    actions: u64,
}

impl<'a, S: GenerativeService> Session<'a, S, StdRng> {
    pub fn new(ctx: &'a AppContext<S>, events: EventWriter) -> Self {
        Self::with_rng(ctx, events, StdRng::from_entropy())
    }
}

impl<'a, S: GenerativeService, R: Rng> Session<'a, S, R> {
    pub fn with_rng(ctx: &'a AppContext<S>, events: EventWriter, rng: R) -> Self {
        Self {
            ctx,
            events,
            rng,
            phase: ActionPhase::Idle,
            actions: 0,
        }
    }

    pub fn phase(&self) -> ActionPhase {
        self.phase
    }

    pub fn model(&self) -> &ModelHandle {
        self.ctx.model()
    }

    /// Shows which model is in use and records the resolution.
    pub fn announce(&mut self, renderer: &mut dyn Renderer) -> io::Result<()> {
        let model = self.ctx.model();
        let source = match model.source {
            HandleSource::Candidate => "candidate",
            HandleSource::Catalog => "catalog",
        };
        let mut payload = EventPayload::new();
        payload.insert("model".to_string(), json!(model.name()));
        payload.insert("source".to_string(), json!(source));
        payload.insert(
            "fallback_reason".to_string(),
            model
                .fallback_reason
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        );
        self.record("model_resolved", payload);

        renderer.caption(&format!("Using model: `{}`", model.model.short_name()))?;
        if let Some(reason) = &model.fallback_reason {
            renderer.caption(&format!("Model fallback: {reason}"))?;
        }
        Ok(())
    }

    /// Runs one generate action to completion and returns to `Idle`.
    ///
    /// Input problems and service failures are rendered and reported in the
    /// outcome; only a failure to write to the renderer is returned as `Err`.
    pub fn generate(
        &mut self,
        input: &GenerateInput,
        renderer: &mut dyn Renderer,
    ) -> io::Result<ActionOutcome> {
        self.actions += 1;
        let outcome = self.run_action(input, renderer);
        self.transition(ActionPhase::Idle, EventPayload::new());
        outcome
    }

    fn run_action(
        &mut self,
        input: &GenerateInput,
        renderer: &mut dyn Renderer,
    ) -> io::Result<ActionOutcome> {
        self.transition(ActionPhase::ValidatingInput, EventPayload::new());
        let image = input.image.as_ref().map(|upload| upload.payload().clone());
        let request = match GenerationRequest::build(&input.artifact, input.word_count, image) {
            Ok(request) => request,
            Err(err) => {
                let mut payload = EventPayload::new();
                payload.insert("reason".to_string(), json!(err.to_string()));
                self.transition(ActionPhase::Rejected, payload);
                renderer.warning(&err.to_string())?;
                return Ok(ActionOutcome::Rejected(err));
            }
        };

        let fact = random_fact(&mut self.rng);
        let model = self.ctx.model().name().to_string();
        let contents = request.contents();
        let mut payload = EventPayload::new();
        payload.insert("model".to_string(), json!(model));
        payload.insert("word_count".to_string(), json!(request.word_count().get()));
        payload.insert("has_image".to_string(), json!(request.image().is_some()));
        payload.insert("parts".to_string(), json!(contents.len()));
        self.transition(ActionPhase::AwaitingResponse, payload);
        renderer.transient_fact(fact)?;

        let result = match self.ctx.service().generate_content(&model, &contents) {
            Ok(text) => GenerationResult::Text(text),
            Err(err) => GenerationResult::Error(error_chain_text(&err, ERROR_TEXT_MAX_CHARS)),
        };
        renderer.clear_transient()?;

        match result {
            GenerationResult::Text(text) => {
                let mut payload = EventPayload::new();
                payload.insert("chars".to_string(), json!(text.chars().count()));
                self.transition(ActionPhase::Rendered, payload);
                renderer.result(&text)?;
                Ok(ActionOutcome::Rendered(text))
            }
            GenerationResult::Error(message) => {
                warn!(model = %model, error = %message, "generation failed");
                let mut payload = EventPayload::new();
                payload.insert("error".to_string(), json!(message));
                self.transition(ActionPhase::Failed, payload);
                renderer.error(&message)?;
                Ok(ActionOutcome::Failed(message))
            }
        }
    }

    fn transition(&mut self, phase: ActionPhase, mut payload: EventPayload) {
        info!(action = self.actions, phase = phase.as_str(), "action phase");
        self.phase = phase;
        payload.insert("action".to_string(), json!(self.actions));
        payload.insert("phase".to_string(), json!(phase.as_str()));
        self.record("action_phase", payload);
    }

    fn record(&self, event_type: &str, payload: EventPayload) {
        if let Err(err) = self.events.emit(event_type, payload) {
            warn!(error = %err, event_type, "failed to write session event");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::fs;
    use std::path::Path;

    use anyhow::{anyhow, Result};
    use image::ImageFormat;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use relic_contracts::facts::FACTS;
    use relic_contracts::models::{ModelSpec, GENERATE_CONTENT};
    use relic_contracts::request::ContentPart;

    use super::*;
    use crate::config::{ConfigOverrides, RelicConfig};
    use crate::upload::tests::encoded_image;

    struct FakeService {
        reply: Result<String, String>,
        healthy_models: Vec<String>,
        calls: RefCell<Vec<(String, Vec<ContentPart>)>>,
    }

    impl FakeService {
        fn replying(reply: Result<&str, &str>) -> Self {
            Self {
                reply: reply.map(str::to_string).map_err(str::to_string),
                healthy_models: vec!["gemini-pro".to_string()],
                calls: RefCell::new(Vec::new()),
            }
        }

        fn generation_calls(&self) -> Vec<(String, Vec<ContentPart>)> {
            self.calls
                .borrow()
                .iter()
                .filter(|(_, parts)| parts.len() > 1)
                .cloned()
                .collect()
        }
    }

    impl GenerativeService for FakeService {
        fn generate_content(&self, model: &str, contents: &[ContentPart]) -> Result<String> {
            self.calls
                .borrow_mut()
                .push((model.to_string(), contents.to_vec()));
            if !self.healthy_models.iter().any(|name| name == model) {
                return Err(anyhow!("404 model {model} not found"));
            }
            if contents.len() == 1 {
                return Ok("probe ok".to_string());
            }
            self.reply.clone().map_err(|message| anyhow!(message))
        }

        fn list_models(&self) -> Result<Vec<ModelSpec>> {
            Ok(vec![ModelSpec {
                name: "models/gemini-pro".to_string(),
                display_name: None,
                capabilities: vec![GENERATE_CONTENT.to_string()],
                input_token_limit: None,
            }])
        }
    }

    #[derive(Default)]
    struct RecordingRenderer {
        calls: Vec<String>,
    }

    impl Renderer for RecordingRenderer {
        fn preview(&mut self, upload: &ImageUpload) -> io::Result<()> {
            self.calls.push(format!("preview:{}", upload.mime_type()));
            Ok(())
        }

        fn caption(&mut self, text: &str) -> io::Result<()> {
            self.calls.push(format!("caption:{text}"));
            Ok(())
        }

        fn warning(&mut self, message: &str) -> io::Result<()> {
            self.calls.push(format!("warning:{message}"));
            Ok(())
        }

        fn transient_fact(&mut self, fact: &str) -> io::Result<()> {
            self.calls.push(format!("fact:{fact}"));
            Ok(())
        }

        fn clear_transient(&mut self) -> io::Result<()> {
            self.calls.push("clear".to_string());
            Ok(())
        }

        fn result(&mut self, text: &str) -> io::Result<()> {
            self.calls.push(format!("result:{text}"));
            Ok(())
        }

        fn error(&mut self, message: &str) -> io::Result<()> {
            self.calls.push(format!("error:{message}"));
            Ok(())
        }
    }

    fn config(models: &[&str]) -> RelicConfig {
        let env = |key: &str| (key == "GOOGLE_API_KEY").then(|| "test-key".to_string());
        RelicConfig::from_sources(
            &env,
            &[],
            ConfigOverrides {
                candidate_models: models.iter().map(|name| name.to_string()).collect(),
                api_base: None,
            },
        )
        .unwrap()
    }

    fn context(service: FakeService) -> AppContext<FakeService> {
        AppContext::start(config(&["gemini-1.5-flash", "gemini-pro"]), service).unwrap()
    }

    fn session<'a>(
        ctx: &'a AppContext<FakeService>,
        events: EventWriter,
    ) -> Session<'a, FakeService, StdRng> {
        Session::with_rng(ctx, events, StdRng::seed_from_u64(11))
    }

    #[test]
    fn start_resolves_first_answering_candidate() {
        let ctx = context(FakeService::replying(Ok("unused")));
        assert_eq!(ctx.model().name(), "gemini-pro");
        let probed: Vec<String> = ctx
            .service()
            .calls
            .borrow()
            .iter()
            .map(|(model, _)| model.clone())
            .collect();
        assert_eq!(probed, vec!["gemini-1.5-flash", "gemini-pro"]);
    }

    #[test]
    fn text_request_renders_result_and_returns_to_idle() -> io::Result<()> {
        let ctx = context(FakeService::replying(Ok("A granodiorite stele.")));
        let mut session = session(&ctx, EventWriter::disabled("s"));
        let mut renderer = RecordingRenderer::default();
        let input = GenerateInput {
            artifact: "Rosetta Stone".to_string(),
            ..GenerateInput::default()
        };

        let outcome = session.generate(&input, &mut renderer)?;
        assert_eq!(
            outcome,
            ActionOutcome::Rendered("A granodiorite stele.".to_string())
        );
        assert_eq!(session.phase(), ActionPhase::Idle);

        assert_eq!(renderer.calls.len(), 3);
        let fact = renderer.calls[0].strip_prefix("fact:").unwrap_or_default();
        assert!(FACTS.contains(&fact));
        assert_eq!(renderer.calls[1], "clear");
        assert_eq!(renderer.calls[2], "result:A granodiorite stele.");

        let calls = ctx.service().generation_calls();
        assert_eq!(calls.len(), 1);
        let (model, parts) = &calls[0];
        assert_eq!(model, "gemini-pro");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], ContentPart::Text("Rosetta Stone".to_string()));
        let ContentPart::Text(instruction) = &parts[1] else {
            panic!("expected instruction text, got {:?}", parts[1]);
        };
        assert!(instruction.contains("500 words"));
        assert!(instruction.contains("Rosetta Stone"));
        Ok(())
    }

    #[test]
    fn image_request_sends_image_block_first() -> anyhow::Result<()> {
        let ctx = context(FakeService::replying(Ok("A golden mask.")));
        let mut session = session(&ctx, EventWriter::disabled("s"));
        let mut renderer = RecordingRenderer::default();
        let upload = ImageUpload::from_bytes(
            Path::new("mask.jpg"),
            encoded_image(ImageFormat::Jpeg, 8, 8),
        )?;
        let input = GenerateInput {
            artifact: String::new(),
            image: Some(upload),
            word_count: WordCount::new(1000)?,
        };

        session.generate(&input, &mut renderer)?;
        let calls = ctx.service().generation_calls();
        let (_, parts) = &calls[0];
        assert_eq!(parts.len(), 3);
        assert!(matches!(&parts[0], ContentPart::Image(block) if block.mime_type == "image/jpeg"));
        assert_eq!(parts[1], ContentPart::Text(String::new()));
        assert!(matches!(&parts[2], ContentPart::Text(text) if text.contains("1000 words")));
        Ok(())
    }

    #[test]
    fn empty_input_is_rejected_without_remote_call() -> io::Result<()> {
        let ctx = context(FakeService::replying(Ok("unused")));
        let mut session = session(&ctx, EventWriter::disabled("s"));
        let mut renderer = RecordingRenderer::default();
        let input = GenerateInput {
            artifact: "  ".to_string(),
            ..GenerateInput::default()
        };

        let outcome = session.generate(&input, &mut renderer)?;
        assert_eq!(outcome, ActionOutcome::Rejected(InputError::NothingToDescribe));
        assert_eq!(session.phase(), ActionPhase::Idle);
        assert_eq!(
            renderer.calls,
            vec!["warning:Please enter an artifact name/period or upload an image."]
        );
        assert!(ctx.service().generation_calls().is_empty());
        Ok(())
    }

    #[test]
    fn quota_error_is_rendered_and_session_continues() -> io::Result<()> {
        let ctx = context(FakeService::replying(Err(
            "Gemini request failed (429): Resource has been exhausted (e.g. check quota).",
        )));
        let mut session = session(&ctx, EventWriter::disabled("s"));
        let mut renderer = RecordingRenderer::default();
        let input = GenerateInput {
            artifact: "Bayeux Tapestry".to_string(),
            ..GenerateInput::default()
        };

        let outcome = session.generate(&input, &mut renderer)?;
        let ActionOutcome::Failed(message) = &outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert!(message.contains("Resource has been exhausted"));
        assert_eq!(session.phase(), ActionPhase::Idle);
        assert_eq!(renderer.calls[1], "clear");
        assert!(renderer.calls[2].starts_with("error:Gemini request failed (429)"));

        let again = session.generate(&input, &mut renderer)?;
        assert!(matches!(again, ActionOutcome::Failed(_)));
        assert_eq!(ctx.service().generation_calls().len(), 2);
        Ok(())
    }

    #[test]
    fn transport_failure_keeps_api_key_off_screen_and_out_of_log() -> anyhow::Result<()> {
        let env = |key: &str| (key == "GOOGLE_API_KEY").then(|| "SECRET-KEY-123".to_string());
        let config = RelicConfig::from_sources(
            &env,
            &[],
            ConfigOverrides {
                candidate_models: Vec::new(),
                api_base: Some("http://127.0.0.1:9/v1beta".to_string()),
            },
        )?;
        let client = crate::gemini::GeminiClient::new(&config)?;
        let handle = ModelHandle {
            model: ModelSpec::candidate("gemini-pro"),
            source: HandleSource::Candidate,
            fallback_reason: None,
        };
        let ctx = AppContext::new(config, client, handle);

        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let mut session =
            Session::with_rng(&ctx, EventWriter::new(&events_path, "s"), StdRng::seed_from_u64(3));
        let mut renderer = RecordingRenderer::default();
        let input = GenerateInput {
            artifact: "Terracotta Army".to_string(),
            ..GenerateInput::default()
        };

        let outcome = session.generate(&input, &mut renderer)?;
        let ActionOutcome::Failed(message) = outcome else {
            panic!("expected a failed outcome, got {outcome:?}");
        };
        assert!(message.starts_with("Gemini request failed"));
        assert!(!message.contains("SECRET-KEY-123"));
        assert!(renderer.calls.iter().all(|call| !call.contains("SECRET-KEY-123")));
        assert!(!fs::read_to_string(&events_path)?.contains("SECRET-KEY-123"));
        Ok(())
    }

    #[test]
    fn phases_are_logged_in_order() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let ctx = context(FakeService::replying(Ok("text")));
        let mut session = session(&ctx, EventWriter::new(&events_path, "s"));
        let mut renderer = RecordingRenderer::default();

        session.announce(&mut renderer)?;
        session.generate(&GenerateInput::default(), &mut renderer)?;
        let input = GenerateInput {
            artifact: "Renaissance".to_string(),
            ..GenerateInput::default()
        };
        session.generate(&input, &mut renderer)?;

        let raw = fs::read_to_string(&events_path)?;
        let rows: Vec<Value> = raw
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .collect();
        assert_eq!(rows[0]["type"], json!("model_resolved"));
        assert_eq!(rows[0]["model"], json!("gemini-pro"));
        let phases: Vec<(u64, String)> = rows
            .iter()
            .filter(|row| row["type"] == json!("action_phase"))
            .map(|row| {
                (
                    row["action"].as_u64().unwrap_or(0),
                    row["phase"].as_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        assert_eq!(
            phases,
            vec![
                (1, "validating_input".to_string()),
                (1, "rejected".to_string()),
                (1, "idle".to_string()),
                (2, "validating_input".to_string()),
                (2, "awaiting_response".to_string()),
                (2, "rendered".to_string()),
                (2, "idle".to_string()),
            ]
        );
        assert_eq!(renderer.calls[0], "caption:Using model: `gemini-pro`");
        Ok(())
    }
}
