//! MedSQL HTTP server.
//!
//! Answers natural-language questions about the hospital database over a
//! JSON API.
//!
//! # Security Guarantees
//! - Read requests never execute a mutating statement
//! - Credentials come from the environment or `.env`, never from source
//! - Connection URLs are redacted in every log line

use anyhow::Context;
use clap::{Args, Parser};
use medsql_core::{
    PipelineSettings, Provider,
    error::redact_database_url,
    logging::{LogFormat, init_logging},
};
use medsql_server::{AppState, serve};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "medsql-server")]
#[command(about = "Natural-language SQL API for the hospital database")]
#[command(version)]
#[command(long_about = "
MedSQL Server - Ask the hospital database questions in plain language

Each question is turned into SQL by a text-generation service, checked by a
safety gate and executed in its own transaction.

SAFETY MODES:
- read (default): only a single SELECT may run
- readwrite: SELECT, INSERT, UPDATE and DELETE; UPDATE and DELETE need WHERE

EXAMPLES:
  medsql-server --database-url postgres://clinic@localhost/hospital
  medsql-server --database-url 'postgres://clinic@db/hospital?pool_max_conns=20&statement_timeout=5000'
  GOOGLE_API_KEY=... medsql-server --bind 0.0.0.0:5000
  medsql-server --provider openai --model gpt-4o-mini
")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    /// Database connection URL
    #[arg(
        long,
        env = "DATABASE_URL",
        help = "Database connection string (credentials will be sanitized in logs)"
    )]
    database_url: String,

    /// Listen address
    #[arg(long, env = "MEDSQL_BIND", default_value = "127.0.0.1:5000")]
    bind: SocketAddr,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Args)]
struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    verbose: u8,

    /// Suppress output
    #[arg(short, long, help = "Suppress all output except errors")]
    quiet: bool,

    /// Log line format
    #[arg(long, env = "MEDSQL_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[derive(Args)]
struct PipelineArgs {
    /// Text-generation provider
    #[arg(long, env = "MEDSQL_PROVIDER", default_value = "gemini")]
    provider: Provider,

    /// Model name (defaults to the provider's default model)
    #[arg(long, env = "MEDSQL_MODEL")]
    model: Option<String>,

    /// Override the provider endpoint
    #[arg(long, env = "MEDSQL_GENERATOR_URL")]
    generator_url: Option<String>,

    /// Generation call timeout in seconds
    #[arg(long, default_value = "30")]
    generator_timeout: u64,

    /// Schema namespace to introspect
    #[arg(long, env = "MEDSQL_SCHEMA", default_value = "public")]
    schema: String,

    /// Maximum rows the prompt asks generated SELECTs to return
    #[arg(long, default_value = "100")]
    row_cap: u32,

    /// File with table usage hints replacing the built-in hospital hints
    #[arg(long)]
    domain_context: Option<PathBuf>,

    /// Allow UPDATE and DELETE without WHERE in readwrite mode
    #[arg(long)]
    allow_unfiltered_mutations: bool,
}

impl From<&PipelineArgs> for PipelineSettings {
    fn from(args: &PipelineArgs) -> Self {
        Self {
            provider: args.provider,
            model: args.model.clone(),
            generator_url: args.generator_url.clone(),
            generator_timeout: Duration::from_secs(args.generator_timeout),
            schema: args.schema.clone(),
            row_cap: args.row_cap,
            domain_context: args.domain_context.clone(),
            allow_unfiltered_mutations: args.allow_unfiltered_mutations,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is not an error
    let _ = dotenv::dotenv();
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet, cli.global.log_format)?;

    info!("Target: {}", redact_database_url(&cli.database_url));

    let pipeline = PipelineSettings::from(&cli.pipeline)
        .build(&cli.database_url)
        .await?;

    let (snapshot, schema_error) = pipeline.schema_cache().get().await;
    match schema_error {
        None => info!("Loaded schema with {} tables", snapshot.table_count()),
        Some(e) => tracing::warn!("Starting without a schema: {}", e),
    }

    let state = Arc::new(AppState::new(pipeline));
    serve(state, cli.bind, shutdown_signal())
        .await
        .with_context(|| format!("Server on {} failed", cli.bind))?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
}
