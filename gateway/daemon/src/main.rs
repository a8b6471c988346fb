//! Gemini Gateway - Command-Line Entry Point
//!
//! Loads the layered configuration, builds a [`Gateway`] and either answers a
//! single prompt or runs an interactive prompt loop. Model output goes to
//! stdout; logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # One-shot prompt with the default model
//! gemini-gateway "Summarize RFC 9110 in three sentences"
//!
//! # Pick a model and backend explicitly
//! gemini-gateway --model gemini-2.5-pro --vertex --project my-proj "Explain monads"
//!
//! # Keyed preview model with search grounding
//! gemini-gateway -m gemini-robotics-er-1.5-preview --grounding "Where is the cup?"
//!
//! # Interactive mode (no prompt arguments)
//! gemini-gateway
//!
//! # Verbose logging
//! RUST_LOG=debug gemini-gateway "hello"
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use gateway_core::config::ENV_VARS;
use gateway_core::{
    load_config_from_path, BackendMode, ConfigOverrides, DispatchRequest, Gateway,
    GenerationConfig, ThinkingLevel, ToolResult,
};

/// Gemini Gateway - one tool call, any Gemini backend
#[derive(Parser, Debug)]
#[command(name = "gemini-gateway")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "GATEWAY_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Model identifier (defaults to the configured default model)
    #[arg(short = 'm', long, value_name = "MODEL")]
    model: Option<String>,

    /// Backend mode: managed, keyed or auto
    #[arg(short = 'b', long, value_name = "MODE", conflicts_with = "vertex")]
    backend: Option<String>,

    /// Shorthand for --backend managed
    #[arg(long)]
    vertex: bool,

    /// Cloud project for the managed backend
    #[arg(long, value_name = "PROJECT")]
    project: Option<String>,

    /// Region for the managed backend
    #[arg(long, value_name = "REGION")]
    region: Option<String>,

    /// Let the model consult Google Search
    #[arg(short = 'g', long)]
    grounding: bool,

    /// Thinking level: none, low, medium or high
    #[arg(short = 't', long, value_name = "LEVEL")]
    thinking: Option<String>,

    /// Context text placed before the prompt
    #[arg(long, value_name = "TEXT")]
    context: Option<String>,

    /// Request timeout in seconds, replacing the per-model default
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Prompt text; omit for interactive mode
    #[arg(trailing_var_arg = true)]
    prompt: Vec<String>,
}

impl Args {
    fn overrides(&self) -> Result<ConfigOverrides> {
        let mut overrides = ConfigOverrides::new();
        if self.vertex {
            overrides = overrides.with_mode(BackendMode::Managed);
        }
        if let Some(ref mode) = self.backend {
            overrides = overrides.with_mode(mode.parse()?);
        }
        if let Some(ref model) = self.model {
            overrides = overrides.with_default_model(model.clone());
        }
        if let Some(ref project) = self.project {
            overrides = overrides.with_project(project.clone());
        }
        if let Some(ref region) = self.region {
            overrides = overrides.with_region(region.clone());
        }
        if let Some(secs) = self.timeout {
            overrides = overrides.with_request_timeout_secs(secs);
        }
        Ok(overrides)
    }

    fn generation_config(&self) -> Result<GenerationConfig> {
        let thinking = self
            .thinking
            .as_deref()
            .map(str::parse::<ThinkingLevel>)
            .transpose()
            .map_err(anyhow::Error::msg)?;
        Ok(GenerationConfig {
            grounding: self.grounding,
            thinking,
        })
    }

    fn request(&self, prompt: String, config: GenerationConfig) -> DispatchRequest {
        let mut request = DispatchRequest::new(prompt).with_config(config);
        if let Some(ref model) = self.model {
            request = request.with_model(model.clone());
        }
        if let Some(ref context) = self.context {
            request = request.with_context(context.clone());
        }
        request
    }
}

/// Initialize logging to stderr
fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("gemini_gateway=info,gateway_core=info")
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn is_quit(line: &str) -> bool {
    matches!(line, "q" | "quit" | "exit")
}

/// Read prompts from stdin until EOF or a quit command
async fn interactive(gateway: &Gateway, args: &Args, config: GenerationConfig) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!(
        "Interactive mode ({}). Type 'quit' to leave.",
        args.model.as_deref().unwrap_or(gateway.default_model())
    );

    loop {
        print!("prompt > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_quit(line) {
            break;
        }

        let result = gateway.ask(&args.request(line.to_string(), config)).await;
        println!("{}\n", result.text);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging();

    info!(version = env!("CARGO_PKG_VERSION"), "Gemini gateway starting");
    let present: Vec<&str> = ENV_VARS
        .iter()
        .copied()
        .filter(|name| std::env::var_os(name).is_some())
        .collect();
    debug!(vars = ?present, "Gateway environment variables set");

    let mut config = load_config_from_path(args.config.clone())
        .context("Failed to load gateway configuration")?;
    args.overrides()?.apply(&mut config);
    config.validate().context("Invalid gateway configuration")?;
    info!(source = %config.source(), mode = %config.mode, "Configuration loaded");

    let generation = args.generation_config()?;
    let gateway = Gateway::from_config(&config);

    if args.prompt.is_empty() {
        interactive(&gateway, &args, generation).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let prompt = args.prompt.join(" ");
    let ToolResult { text, is_error } = gateway.ask(&args.request(prompt, generation)).await;
    println!("{text}");

    Ok(if is_error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
