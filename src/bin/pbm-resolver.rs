//! CLI binary for pbm-protocol-resolver.
//!
//! A thin shim over the library crate: maps flags to `ResolverConfig`, then
//! either serves the HTTP API or resolves a single brain map and prints the
//! same JSON body the API would return.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pbm_protocol::pipeline::input::load_document;
use pbm_protocol::{
    assemble, server, ProtocolService, ProtocolTables, RawSubmission, ResolverConfig,
    UploadedFile, BASELINE_HELMET, CONDITIONS,
};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve the API on port 8080
  pbm-resolver serve --bind 0.0.0.0:8080

  # Require a bearer token on /api/*
  pbm-resolver serve --access-token s3cret

  # Resolve one brain map (prints the response JSON)
  pbm-resolver resolve --consent jane-qeeg.pdf

  # Clinician-selected condition, alternate helmet
  pbm-resolver resolve --consent --condition depression \
      --helmet-type neuroradiant1070 jane-qeeg.pdf

  # List the condition vocabulary
  pbm-resolver conditions

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Directory holding libpdfium; system library otherwise
  PBM_TABLES_DIR          Directory with router.json / protocols.json / neuroradiant.json
  PBM_ACCESS_TOKEN        Bearer token required on /api/*
"#;

/// Resolve PBM dosing protocols from qEEG brain-map PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "pbm-resolver",
    version,
    about = "Resolve PBM dosing protocols from qEEG brain-map PDFs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// LLM model ID (e.g. gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Directory overriding the packaged lookup tables.
    #[arg(long, global = true, env = "PBM_TABLES_DIR")]
    tables_dir: Option<PathBuf>,

    /// Directory for staged uploads (system temp dir by default).
    #[arg(long, global = true, env = "PBM_UPLOAD_DIR")]
    upload_dir: Option<PathBuf>,

    /// Give up on the model after this many seconds.
    #[arg(long, global = true, env = "PBM_MODEL_TIMEOUT")]
    model_timeout: Option<u64>,

    /// Max LLM output tokens.
    #[arg(long, global = true, env = "PBM_MAX_TOKENS", default_value_t = 256)]
    max_tokens: usize,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PBM_VERBOSE")]
    verbose: bool,

    /// Suppress all logs except errors.
    #[arg(short, long, global = true, env = "PBM_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API.
    Serve {
        /// Listen address.
        #[arg(long, env = "PBM_BIND", default_value = "127.0.0.1:8080")]
        bind: SocketAddr,

        /// Bearer token required on /api/* routes.
        #[arg(long, env = "PBM_ACCESS_TOKEN", hide_env_values = true)]
        access_token: Option<String>,

        /// Upload size limit in MiB.
        #[arg(long, env = "PBM_MAX_UPLOAD_MB", default_value_t = 25)]
        max_upload_mb: usize,
    },

    /// Resolve one brain map and print the response JSON.
    Resolve {
        /// Local PDF path or HTTP/HTTPS URL.
        input: String,

        /// Confirm the patient consented to processing.
        #[arg(long)]
        consent: bool,

        /// Clinician-selected condition; overrides the model's reading.
        #[arg(long)]
        condition: Option<String>,

        /// Helmet type: light or neuroradiant1070.
        #[arg(long, default_value = BASELINE_HELMET)]
        helmet_type: String,

        /// HTTP download timeout in seconds.
        #[arg(long, env = "PBM_DOWNLOAD_TIMEOUT", default_value_t = 60)]
        download_timeout: u64,
    },

    /// Print the condition vocabulary and the routes configured for it.
    Conditions,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Serve {
            bind,
            access_token,
            max_upload_mb,
        } => {
            let mut builder = base_config(&cli).max_upload_bytes(max_upload_mb * 1024 * 1024);
            if let Some(token) = access_token {
                builder = builder.access_token(token.clone());
            }
            let config = builder.build().context("Invalid configuration")?;
            let service =
                ProtocolService::from_config(config).context("Failed to start resolver")?;
            server::serve(Arc::new(service), *bind)
                .await
                .context("Server failed")?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Resolve {
            input,
            consent,
            condition,
            helmet_type,
            download_timeout,
        } => {
            let config = base_config(&cli).build().context("Invalid configuration")?;
            let service =
                ProtocolService::from_config(config).context("Failed to start resolver")?;
            let doc = load_document(input, *download_timeout)
                .await
                .with_context(|| format!("Failed to load {input}"))?;

            let raw = RawSubmission {
                consent: consent.then(|| "true".to_string()),
                condition: condition.clone(),
                helmet_type: Some(helmet_type.clone()),
                file: Some(UploadedFile {
                    filename: doc.filename,
                    bytes: doc.bytes,
                }),
            };

            let (status, body) = assemble(service.handle(raw).await);
            println!(
                "{}",
                serde_json::to_string_pretty(&body).context("Failed to serialise response")?
            );
            Ok(if status == 200 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Command::Conditions => {
            let tables = ProtocolTables::load(cli.tables_dir.as_deref())
                .context("Failed to load protocol tables")?;
            for condition in CONDITIONS {
                let routes = tables
                    .router()
                    .get(condition)
                    .map(|m| m.len())
                    .unwrap_or(0);
                println!("{condition:<18} {routes:>2} routes");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Flags shared by every subcommand.
fn base_config(cli: &Cli) -> pbm_protocol::ResolverConfigBuilder {
    let mut builder = ResolverConfig::builder().max_tokens(cli.max_tokens);
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref dir) = cli.tables_dir {
        builder = builder.tables_dir(dir.clone());
    }
    if let Some(ref dir) = cli.upload_dir {
        builder = builder.upload_dir(dir.clone());
    }
    if let Some(secs) = cli.model_timeout {
        builder = builder.model_timeout_secs(secs);
    }
    builder
}
