//! CLI binary for edgequake-transcript.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ParserConfig` and prints the record as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_transcript::pipeline::input::{mime_from_path, MIME_TEXT};
use edgequake_transcript::{
    parse_bytes, ErrorKind, FallbackPolicy, ParseObserver, ParseResult, ParserConfig,
    PipelineStage, Provenance, RejectReason,
};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── Stage log on stderr ──────────────────────────────────────────────────────

/// Prints one line per pipeline transition.
struct CliObserver;

impl ParseObserver for CliObserver {
    fn on_stage(&self, stage: PipelineStage) {
        eprintln!("{} {}", cyan("◆"), stage);
    }

    fn on_deterministic_rejected(&self, score: f64, reasons: &[RejectReason]) {
        eprintln!("  {} deterministic confidence {:.2}", red("✗"), score);
        for r in reasons {
            eprintln!("    {}", dim(&r.to_string()));
        }
    }

    fn on_ai_request(&self, prompt_chars: usize) {
        eprintln!("  {}", dim(&format!("prompt {prompt_chars} chars")));
    }

    fn on_complete(&self, provenance: Provenance, score: f64) {
        eprintln!("{} {} record, confidence {:.2}", green("✔"), provenance, score);
    }

    fn on_failed(&self, kind: ErrorKind) {
        eprintln!("{} failed: {:?}", red("✘"), kind);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Parse a registrar export (stdout)
  transcript2json transcript.txt

  # Parse a text-based PDF and write to a file
  transcript2json transcript.pdf -o record.json

  # Read pasted text from stdin
  pbpaste | transcript2json -

  # Never call a model; keep weak deterministic records with a warning
  transcript2json --no-ai --accept-low-confidence transcript.txt

  # Count only CS and MA courses toward the major GPA
  transcript2json --major CS --major MA transcript.txt

EXIT STATUS:
  0  record produced (deterministic or AI-assisted)
  1  no record; the error kind is printed on stderr

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          Key that enables the AI-assisted fallback
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to an existing libpdfium for PDF uploads
"#;

/// Parse academic transcripts into structured JSON.
#[derive(Parser, Debug)]
#[command(
    name = "transcript2json",
    version,
    about = "Parse academic transcripts into structured JSON",
    long_about = "Parse an academic transcript (pasted text or a text-based PDF) into a \
validated JSON record of student details, courses by period, and GPA figures. Registrar \
exports are parsed with deterministic grammars; unfamiliar layouts fall back to an LLM \
when an API key is supplied.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Transcript file, or `-` for stdin.
    input: String,

    /// MIME type of the input. Guessed from the extension when omitted.
    #[arg(long, env = "TRANSCRIPT_MIME")]
    mime: Option<String>,

    /// Write JSON to this file instead of stdout.
    #[arg(short, long, env = "TRANSCRIPT_OUTPUT")]
    output: Option<PathBuf>,

    /// API key that enables the AI-assisted fallback.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID (e.g. gpt-4.1-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM call timeout in seconds (1–300).
    #[arg(long, env = "TRANSCRIPT_API_TIMEOUT", default_value_t = 30,
          value_parser = clap::value_parser!(u64).range(1..=300))]
    timeout: u64,

    /// Minimum confidence score for acceptance (0.0–1.0).
    #[arg(long, env = "TRANSCRIPT_MIN_SCORE", default_value_t = 0.5)]
    min_score: f64,

    /// Return weak deterministic records with a warning instead of escalating.
    #[arg(long, env = "TRANSCRIPT_ACCEPT_LOW_CONFIDENCE")]
    accept_low_confidence: bool,

    /// Never call a model, even when a key is available.
    #[arg(long, env = "TRANSCRIPT_NO_AI")]
    no_ai: bool,

    /// Subject code counted toward the major GPA (repeatable).
    #[arg(long = "major", value_name = "SUBJECT")]
    major: Vec<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "TRANSCRIPT_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Single-line JSON instead of pretty-printed.
    #[arg(long)]
    compact: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "TRANSCRIPT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "TRANSCRIPT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Read input ───────────────────────────────────────────────────────
    let bytes = if cli.input == "-" {
        let mut buf = Vec::new();
        io::stdin()
            .read_to_end(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        tokio::fs::read(&cli.input)
            .await
            .with_context(|| format!("Failed to read {}", cli.input))?
    };
    let mime = match cli.mime.as_deref() {
        Some(m) => m.to_string(),
        None => mime_from_path(&cli.input).unwrap_or(MIME_TEXT).to_string(),
    };

    let config = build_config(&cli).await?;
    let api_key = if cli.no_ai {
        None
    } else {
        cli.api_key.as_deref()
    };

    // ── Parse ────────────────────────────────────────────────────────────
    let output = match parse_bytes(&bytes, &mime, api_key, &config).await {
        ParseResult::Deterministic(o) | ParseResult::AiAssisted(o) => o,
        ParseResult::Failed(e) => {
            eprintln!("{} {}", red("error:"), e);
            std::process::exit(1);
        }
    };

    if !cli.quiet {
        for w in &output.warnings {
            eprintln!("{} {}", cyan("⚠"), w);
        }
    }

    let json = if cli.compact {
        serde_json::to_string(&output)
    } else {
        serde_json::to_string_pretty(&output)
    }
    .context("Failed to serialise output")?;

    if let Some(ref path) = cli.output {
        tokio::fs::write(path, format!("{json}\n"))
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        if !cli.quiet {
            eprintln!(
                "{}  {} courses  {}ms  →  {}",
                green("✔"),
                output.record.course_count(),
                output.processing_time_ms,
                path.display()
            );
        }
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{json}").context("Failed to write to stdout")?;
    }

    Ok(())
}

/// Map CLI args to `ParserConfig`.
async fn build_config(cli: &Cli) -> Result<ParserConfig> {
    let mut builder = ParserConfig::builder()
        .api_timeout_secs(cli.timeout)
        .min_score(cli.min_score)
        .major_subjects(cli.major.iter().cloned())
        .fallback(if cli.accept_low_confidence {
            FallbackPolicy::AcceptLowConfidence
        } else {
            FallbackPolicy::AiFallback
        });

    if let Some(ref m) = cli.model {
        builder = builder.model(m.clone());
    }
    if let Some(ref p) = cli.provider {
        builder = builder.provider_name(p.clone());
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if !cli.quiet {
        builder = builder.observer(Arc::new(CliObserver));
    }

    builder.build().context("Invalid configuration")
}
