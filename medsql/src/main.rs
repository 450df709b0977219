//! MedSQL command-line shell.
//!
//! Asks the hospital database questions in plain language from a terminal,
//! one at a time or interactively, and runs the predefined reports.
//!
//! # Security Guarantees
//! - Read mode is the default; writes need `--mode readwrite`
//! - Passwords can be typed at a hidden prompt instead of living in the URL
//! - Connection URLs are redacted in every log line

mod output;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use medsql_core::{
    GenerationErrorKind, PipelineError, PipelineSettings, Provider, QueryExecutor, QueryMode,
    QueryPipeline, QueryRequest, ReportKind, ReportParams, ResultSerializer, create_adapter,
    error::redact_database_url,
    logging::{LogFormat, init_logging},
    security::Credentials,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "medsql")]
#[command(about = "Ask the hospital database questions in plain language")]
#[command(version)]
#[command(long_about = "
MedSQL - Natural-language queries over the hospital database

Each question is turned into SQL by a text-generation service, checked by a
safety gate and executed in its own transaction.

SAFETY MODES:
- read (default): only a single SELECT may run
- readwrite: SELECT, INSERT, UPDATE and DELETE; UPDATE and DELETE need WHERE

EXAMPLES:
  medsql ask \"how many patients registered this month\"
  medsql --password-prompt --database-url postgres://clinic@db/hospital shell
  medsql report procedures-by-month --param month=2024-03
  medsql report daily-appointments --param doctor=rao --param date=2024-03-14
")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,

    /// Database connection URL
    #[arg(
        long,
        env = "DATABASE_URL",
        help = "Database connection string (credentials will be sanitized in logs)"
    )]
    database_url: Option<String>,

    /// Prompt for the database password
    #[arg(long, help = "Read the database password from a hidden prompt")]
    password_prompt: bool,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Subcommand)]
enum Command {
    /// Ask one question
    Ask(AskArgs),
    /// Ask questions interactively until `exit`
    Shell(ShellArgs),
    /// Print the introspected schema
    Schema,
    /// Run a predefined report
    Report(ReportArgs),
    /// Test database connection
    Test,
}

#[derive(Args)]
struct AskArgs {
    /// The question, in plain language
    #[arg(required = true)]
    question: Vec<String>,

    /// Safety mode
    #[arg(long, default_value = "read")]
    mode: QueryMode,

    /// Print the full response as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ShellArgs {
    /// Safety mode for the session (switch with `:mode read|readwrite`)
    #[arg(long, default_value = "read")]
    mode: QueryMode,
}

#[derive(Args)]
struct ReportArgs {
    /// Report name; omit to list the reports
    name: Option<String>,

    /// Report parameter
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = ReportParams::parse_pair)]
    params: Vec<(String, String)>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all output except errors")]
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

    // Listing reports needs neither the database nor the generator
    if let Command::Report(ReportArgs { name: None, .. }) = &cli.command {
        list_reports();
        return Ok(());
    }

    let database_url = cli.database_url()?;
    let database_url = if cli.password_prompt {
        with_prompted_password(database_url)?
    } else {
        database_url.to_string()
    };
    info!("Target: {}", redact_database_url(&database_url));

    let settings = PipelineSettings::from(&cli.pipeline);
    match &cli.command {
        Command::Test => test_connection(&database_url).await,
        Command::Report(args) => run_report(&database_url, args).await,
        Command::Schema => {
            let pipeline = settings.build(&database_url).await?;
            print_schema(&pipeline).await
        }
        Command::Ask(args) => {
            let pipeline = settings.build(&database_url).await?;
            let request = QueryRequest::new(args.question.join(" "), args.mode);
            ask(&pipeline, &request, args.json).await
        }
        Command::Shell(args) => {
            let pipeline = settings.build(&database_url).await?;
            shell(&pipeline, args.mode).await
        }
    }
}

impl Cli {
    fn database_url(&self) -> anyhow::Result<&str> {
        match self.database_url.as_deref() {
            Some(url) if !url.trim().is_empty() => Ok(url),
            _ => anyhow::bail!("Database URL is required (--database-url or DATABASE_URL)"),
        }
    }
}

/// Reads the password from a hidden prompt and injects it into the URL.
fn with_prompted_password(database_url: &str) -> anyhow::Result<String> {
    print!("Database password: ");
    std::io::stdout()
        .flush()
        .context("Failed to flush stdout before reading password")?;
    let password = rpassword::read_password().context("Failed to read password")?;
    if password.is_empty() {
        anyhow::bail!("Password cannot be empty");
    }

    let credentials = Credentials::new(String::new(), Some(password));
    let url = credentials.apply_to_url(database_url)?;
    Ok(url.as_str().to_string())
}

/// Tests database connection without generating anything
async fn test_connection(database_url: &str) -> anyhow::Result<()> {
    info!("Testing database connection...");

    let adapter = create_adapter(database_url).await.map_err(|e| {
        error!("Failed to create database adapter: {}", e);
        e
    })?;

    adapter.test_connection().await.map_err(|e| {
        error!("Connection test failed: {}", e);
        e
    })?;

    println!("Connection to {} database successful", adapter.engine_name());
    Ok(())
}

async fn print_schema(pipeline: &QueryPipeline) -> anyhow::Result<()> {
    let snapshot = pipeline.schema_cache().refresh().await?;
    let schema = serde_json::to_value(snapshot.as_ref())?;
    println!("{}", output::render_schema(&schema));
    println!(
        "{} tables, {} columns",
        snapshot.table_count(),
        snapshot.column_count()
    );
    Ok(())
}

async fn ask(pipeline: &QueryPipeline, request: &QueryRequest, json: bool) -> anyhow::Result<()> {
    let report = match pipeline.run(request).await {
        Ok(report) => report,
        Err(e) => return Err(describe_pipeline_error(&e)),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report.to_response())?);
        return Ok(());
    }

    if let Some(warning) = &report.schema_warning {
        eprintln!("Warning: {}", warning);
    }
    println!("SQL: {}", report.executed_sql());
    if let Some(reason) = report.verdict.denial_reason() {
        eprintln!("Denied: {}", reason);
    }
    println!("{}", output::render_result(&report.result()));
    Ok(())
}

fn describe_pipeline_error(error: &PipelineError) -> anyhow::Error {
    match error.generation_kind() {
        Some(GenerationErrorKind::QuotaExceeded) => {
            anyhow::anyhow!("{} (try again later)", error)
        }
        _ => anyhow::anyhow!("{}", error),
    }
}

/// Reads questions line by line until `exit`, `quit` or end of input.
async fn shell(pipeline: &QueryPipeline, initial_mode: QueryMode) -> anyhow::Result<()> {
    let mut mode = initial_mode;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("MedSQL shell ({} mode). Type `exit` to leave.", mode);
    loop {
        print!("medsql[{}]> ", mode);
        std::io::stdout().flush().context("Failed to flush stdout")?;

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            println!();
            break;
        };
        let line = line.trim();

        match line {
            "" => continue,
            "exit" | "quit" => break,
            _ => {}
        }

        if let Some(requested) = line.strip_prefix(":mode") {
            match requested.parse::<QueryMode>() {
                Ok(next) => {
                    mode = next;
                    println!("Mode set to {}", mode);
                }
                Err(e) => eprintln!("{}", e),
            }
            continue;
        }

        // A failed question never ends the session
        if let Err(e) = ask(pipeline, &QueryRequest::new(line, mode), false).await {
            eprintln!("Error: {}", e);
        }
    }
    Ok(())
}

fn list_reports() {
    println!("Available reports:");
    for kind in ReportKind::all() {
        let params = kind.parameters();
        if params.is_empty() {
            println!("  {:<24} {}", kind.name(), kind.description());
        } else {
            println!(
                "  {:<24} {} [params: {}]",
                kind.name(),
                kind.description(),
                params.join(", ")
            );
        }
    }
}

async fn run_report(database_url: &str, args: &ReportArgs) -> anyhow::Result<()> {
    let Some(name) = &args.name else {
        list_reports();
        return Ok(());
    };
    let kind: ReportKind = name.parse()?;
    let params: ReportParams = args.params.iter().cloned().collect();

    let adapter = create_adapter(database_url).await?;
    let executor = QueryExecutor::new(Arc::from(adapter));
    let today = chrono::Local::now().date_naive();

    let outcome = kind.run(&executor, &params, today).await?;
    let result = ResultSerializer::serialize(&outcome);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", output::render_result(&result));
    }

    if outcome.is_failure() {
        anyhow::bail!("Report {} failed", kind);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        temp_env::with_var_unset("DATABASE_URL", || {
            Cli::try_parse_from(args).unwrap()
        })
    }

    #[test]
    fn test_report_listing_parses_without_database_url() {
        let cli = parse(&["medsql", "report"]);
        assert!(cli.database_url.is_none());
        assert!(matches!(
            cli.command,
            Command::Report(ReportArgs { name: None, .. })
        ));
    }

    #[test]
    fn test_database_url_required_for_queries() {
        let cli = parse(&["medsql", "ask", "how many patients"]);
        let error = cli.database_url().unwrap_err();
        assert!(error.to_string().contains("DATABASE_URL"));

        let cli = parse(&[
            "medsql",
            "--database-url",
            "postgres://clinic@localhost/hospital",
            "report",
            "patient-count",
        ]);
        assert_eq!(
            cli.database_url().unwrap(),
            "postgres://clinic@localhost/hospital"
        );
    }

    #[test]
    fn test_pipeline_args_convert_to_settings() {
        let cli = parse(&[
            "medsql",
            "--provider",
            "openai",
            "--row-cap",
            "25",
            "--allow-unfiltered-mutations",
            "schema",
        ]);
        let settings = PipelineSettings::from(&cli.pipeline);
        assert_eq!(settings.provider, Provider::OpenAi);
        assert_eq!(settings.row_cap, 25);
        assert_eq!(settings.generator_timeout, Duration::from_secs(30));
        assert!(settings.allow_unfiltered_mutations);
    }
}
