mod ui;

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use rag::{Answer, Config as RagConfig, GENERIC_ERROR_MESSAGE, Mode, Provider};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "legis-chat", version, about = "Ask questions about a legislative document")]
struct Cli {
    /// Document to chat about (.pdf, .docx, .txt)
    #[arg(short, long)]
    document: Option<PathBuf>,

    /// full: send the whole document; rag: send retrieved chunks
    #[arg(short, long)]
    mode: Option<Mode>,

    /// ollama or gemini
    #[arg(short, long)]
    provider: Option<Provider>,

    /// Chat model override
    #[arg(long)]
    model: Option<String>,

    /// Ask one question, print the answer and exit
    #[arg(short, long, value_name = "QUESTION")]
    ask: Option<String>,

    /// With --ask, also print the context sent to the model
    #[arg(long, requires = "ask")]
    show_context: bool,

    /// Log file used while the terminal UI is running
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Do not read or write the embedding cache
    #[arg(long)]
    no_cache: bool,
}

impl Cli {
    fn apply(&self, cfg: &mut RagConfig) {
        if let Some(provider) = self.provider {
            cfg.set_provider(provider);
        }
        if let Some(path) = &self.document {
            cfg.set_document(path.clone());
        }
        if let Some(mode) = self.mode {
            cfg.mode = mode;
        }
        if let Some(model) = &self.model {
            cfg.chat_model = model.clone();
        }
        if let Some(path) = &self.log_file {
            cfg.log_file = path.clone();
        }
        if self.no_cache {
            cfg.cache_dir = None;
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "fatal");
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut cfg = RagConfig::from_env().context("failed to load configuration")?;
    cli.apply(&mut cfg);

    match cli.ask.as_deref() {
        Some(question) => {
            init_logging(None)?;
            Ok(ask_once(cfg, question, cli.show_context))
        }
        None => {
            init_logging(Some(&cfg.log_file))?;
            let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
            runtime.block_on(ui::run(cfg))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Logs to stderr, or to `file` when the terminal belongs to the UI.
fn init_logging(file: Option<&PathBuf>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    match file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(io::stderr).init(),
    }
    Ok(())
}

fn ask_once(cfg: RagConfig, question: &str, show_context: bool) -> ExitCode {
    info!(document = %cfg.document_path.display(), mode = %cfg.mode, "answering one question");
    let result = rag::answer_query(cfg, question);
    match print_answer(&result, show_context, &mut io::stdout(), &mut io::stderr()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!(error = %err, "failed to write answer");
            ExitCode::FAILURE
        }
    }
}

/// Prints the answer to `out`, or only the generic message to `err_out` on failure.
/// Returns whether the question was answered.
fn print_answer(
    result: &rag::Result<Answer>,
    show_context: bool,
    out: &mut impl Write,
    err_out: &mut impl Write,
) -> io::Result<bool> {
    match result {
        Ok(answer) => {
            if show_context {
                writeln!(out, "--- context ---\n{}\n--- answer ---", answer.context)?;
            }
            writeln!(out, "{}", answer.text)?;
            Ok(true)
        }
        Err(err) => {
            error!(error = %err, "question failed");
            writeln!(err_out, "{GENERIC_ERROR_MESSAGE}")?;
            Ok(false)
        }
    }
}
