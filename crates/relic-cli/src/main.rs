use std::io::{self, ErrorKind, IsTerminal, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use relic_contracts::chat::{parse_intent, CHAT_HELP_COMMANDS};
use relic_contracts::events::EventWriter;
use relic_contracts::models::{ModelRegistry, GENERATE_CONTENT};
use relic_contracts::request::{
    InputError, WordCount, MAX_WORD_COUNT, MIN_WORD_COUNT, WORD_COUNT_STEP,
};
use relic_contracts::service::GenerativeService;
use relic_engine::{
    ActionOutcome, AppContext, ConfigOverrides, GeminiClient, GenerateInput, ImageUpload,
    RelicConfig, Renderer, Session, TerminalRenderer,
};
use tracing::info;

const EXIT_OK: i32 = 0;
const EXIT_FAILED: i32 = 1;
const EXIT_REJECTED: i32 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "relic",
    version,
    about = "Describe historical artifacts by name, period or image with Google Gemini"
)]
struct Cli {
    /// Log filter used when RELIC_LOG is unset.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive session.
    Chat(ChatArgs),
    /// Describe one artifact and exit.
    Describe(DescribeArgs),
    /// List catalog models that support content generation.
    Models(ModelsArgs),
}

#[derive(Debug, Args)]
struct SessionArgs {
    /// Candidate model, highest priority first. Repeatable.
    #[arg(long = "model")]
    models: Vec<String>,
    /// Append session events as JSON lines to this file.
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long, default_value = "500", value_parser = parse_word_count)]
    words: WordCount,
    #[arg(long)]
    image: Option<PathBuf>,
    #[command(flatten)]
    session: SessionArgs,
}

#[derive(Debug, Parser)]
struct DescribeArgs {
    /// Artifact name or historical period.
    #[arg(long)]
    artifact: Option<String>,
    /// JPEG or PNG image of the artifact.
    #[arg(long)]
    image: Option<PathBuf>,
    #[arg(long, default_value = "500", value_parser = parse_word_count)]
    words: WordCount,
    #[command(flatten)]
    session: SessionArgs,
}

#[derive(Debug, Parser)]
struct ModelsArgs {
    /// Include models without content generation support.
    #[arg(long)]
    all: bool,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("relic error: {err:#}");
            std::process::exit(EXIT_FAILED);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    match cli.command {
        Command::Chat(args) => run_chat(args),
        Command::Describe(args) => run_describe(args),
        Command::Models(args) => run_models(args),
    }
}

fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_env("RELIC_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn parse_word_count(raw: &str) -> Result<WordCount, String> {
    WordCount::parse(raw).map_err(|err| err.to_string())
}

fn start_context(models: Vec<String>) -> Result<AppContext<GeminiClient>> {
    let config = RelicConfig::load(ConfigOverrides {
        candidate_models: models,
        api_base: None,
    })?;
    let client = GeminiClient::new(&config)?;
    let ctx = AppContext::start(config, client)?;
    info!(model = ctx.model().name(), "startup complete");
    Ok(ctx)
}

fn event_writer(path: Option<PathBuf>) -> EventWriter {
    let session_id = uuid::Uuid::new_v4().to_string();
    match path {
        Some(path) => EventWriter::new(path, session_id),
        None => EventWriter::disabled(session_id),
    }
}

fn stdout_renderer() -> TerminalRenderer<io::Stdout> {
    let stdout = io::stdout();
    let ansi = stdout.is_terminal();
    TerminalRenderer::new(stdout, ansi)
}

fn run_chat(args: ChatArgs) -> Result<i32> {
    let ctx = start_context(args.session.models)?;
    let mut session = Session::new(&ctx, event_writer(args.session.events));
    let mut renderer = stdout_renderer();
    let mut input = GenerateInput {
        word_count: args.words,
        ..GenerateInput::default()
    };

    session.announce(&mut renderer)?;
    renderer.caption(
        "Relic chat started. Type an artifact name or period to describe it, or /help for commands.",
    )?;
    if let Some(path) = args.image.as_deref() {
        select_image(path, &mut input, &mut renderer)?;
    }

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let intent = parse_intent(line.trim_end_matches(['\n', '\r']));
        match intent.action.as_str() {
            "noop" => continue,
            "help" => {
                renderer.caption(&format!("Commands: {}", CHAT_HELP_COMMANDS.join(" ")))?;
            }
            "set_artifact" => {
                input.artifact = intent.arg_str("text").unwrap_or_default().to_string();
                if input.artifact.is_empty() {
                    renderer.caption("Artifact cleared.")?;
                } else {
                    renderer.caption(&format!("Artifact set to {}", input.artifact))?;
                }
            }
            "set_image" => match intent.arg_str("path").filter(|path| !path.is_empty()) {
                Some(path) => select_image(Path::new(path), &mut input, &mut renderer)?,
                None => renderer.caption("/image requires a path")?,
            },
            "clear_image" => {
                input.image = None;
                renderer.caption("Image cleared.")?;
            }
            "set_word_count" => {
                match WordCount::parse(intent.arg_str("count").unwrap_or_default()) {
                    Ok(word_count) => {
                        input.word_count = word_count;
                        renderer.caption(&format!("Word count set to {word_count}"))?;
                    }
                    Err(err) => renderer.warning(&err.to_string())?,
                }
            }
            "generate" => {
                if let Some(artifact) = intent.artifact {
                    input.artifact = artifact;
                }
                session.generate(&input, &mut renderer)?;
            }
            "status" => show_status(&input, &mut renderer)?,
            "show_model" => {
                let model = &session.model().model;
                let mut text = format!("Using model: `{}`", model.short_name());
                if let Some(display_name) = &model.display_name {
                    text.push_str(&format!(" ({display_name})"));
                }
                renderer.caption(&text)?;
                if let Some(reason) = &session.model().fallback_reason {
                    renderer.caption(&format!("Model fallback: {reason}"))?;
                }
            }
            "quit" => break,
            "unknown" => {
                let command = intent.arg_str("command").unwrap_or_default();
                renderer.caption(&format!(
                    "Unknown command /{command}. Type /help for commands."
                ))?;
            }
            _ => {}
        }
    }

    Ok(EXIT_OK)
}

fn select_image(
    path: &Path,
    input: &mut GenerateInput,
    renderer: &mut dyn Renderer,
) -> io::Result<()> {
    match ImageUpload::open(path) {
        Ok(upload) => {
            renderer.preview(&upload)?;
            input.image = Some(upload);
        }
        Err(err) => renderer.warning(&format!("Image not loaded: {err:#}"))?,
    }
    Ok(())
}

fn show_status(input: &GenerateInput, renderer: &mut dyn Renderer) -> io::Result<()> {
    let artifact = if input.artifact.trim().is_empty() {
        "(none)".to_string()
    } else {
        input.artifact.clone()
    };
    let image = input
        .image
        .as_ref()
        .map(|upload| upload.path().display().to_string())
        .unwrap_or_else(|| "(none)".to_string());
    renderer.caption(&format!("Artifact/Period: {artifact}"))?;
    renderer.caption(&format!("Image: {image}"))?;
    renderer.caption(&format!(
        "Word count: {} (range {MIN_WORD_COUNT}-{MAX_WORD_COUNT}, step {WORD_COUNT_STEP})",
        input.word_count
    ))
}

fn run_describe(args: DescribeArgs) -> Result<i32> {
    let mut renderer = stdout_renderer();
    let image = match args.image.as_deref() {
        Some(path) => match open_describe_image(path)? {
            Ok(upload) => Some(upload),
            Err(err) => {
                renderer.warning(&err.to_string())?;
                return Ok(EXIT_REJECTED);
            }
        },
        None => None,
    };

    let ctx = start_context(args.session.models)?;
    let mut session = Session::new(&ctx, event_writer(args.session.events));
    session.announce(&mut renderer)?;
    if let Some(upload) = image.as_ref() {
        renderer.preview(upload)?;
    }

    let input = GenerateInput {
        artifact: args.artifact.unwrap_or_default(),
        image,
        word_count: args.words,
    };
    let outcome = session.generate(&input, &mut renderer)?;
    Ok(exit_code(&outcome))
}

/// Splits input rejections from I/O and decode failures.
fn open_describe_image(path: &Path) -> Result<Result<ImageUpload, InputError>> {
    match ImageUpload::open(path) {
        Ok(upload) => Ok(Ok(upload)),
        Err(err) => match err.downcast::<InputError>() {
            Ok(rejected) => Ok(Err(rejected)),
            Err(err) => Err(err),
        },
    }
}

fn exit_code(outcome: &ActionOutcome) -> i32 {
    match outcome {
        ActionOutcome::Rendered(_) => EXIT_OK,
        ActionOutcome::Failed(_) => EXIT_FAILED,
        ActionOutcome::Rejected(_) => EXIT_REJECTED,
    }
}

fn run_models(args: ModelsArgs) -> Result<i32> {
    let config = RelicConfig::load(ConfigOverrides::default())?;
    let client = GeminiClient::new(&config)?;
    let registry = ModelRegistry::new(client.list_models()?);
    let mut stdout = io::stdout().lock();
    for model in registry.list() {
        let capable = model.supports(GENERATE_CONTENT);
        if !capable && !args.all {
            continue;
        }
        let mut row = model.short_name().to_string();
        if let Some(display_name) = &model.display_name {
            row.push_str(&format!("\t{display_name}"));
        }
        if args.all {
            row.push_str(&format!("\t[{}]", model.capabilities.join(", ")));
        }
        writeln!(stdout, "{row}")?;
    }
    Ok(EXIT_OK)
}
