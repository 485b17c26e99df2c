//! refsnap CLI - snapshot all repositories, branches and tags of a
//! GitHub user or organization.

mod config;
mod output;
mod shutdown;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use console::Term;
use tracing_subscriber::EnvFilter;

use refsnap::{
    fetch::{DEFAULT_BATCH_SIZE, DEFAULT_MAX_IN_FLIGHT, DEFAULT_PAGE_SIZE},
    graphql::DEFAULT_REQUEST_TIMEOUT,
    Account, AccountKind, FetchError, FetchOptions, FetchReport, Fetcher, HttpTransport,
    RetryConfig, TransportError,
};

#[derive(Parser)]
#[command(name = "refsnap")]
#[command(version)]
#[command(about = "Snapshot all repositories, branches and tags of a GitHub account")]
#[command(after_long_help = r#"EXAMPLES
    List branches of every repository of a user:
        $ refsnap carl-m-healy

    Snapshot an organization as JSON:
        $ refsnap rust-lang --org --json > rust-lang.json

    Persist branch lists and per-tag JSON files:
        $ refsnap carl-m-healy --save-dir branches --save-tag-json-dir tags

CONFIGURATION
    refsnap reads configuration from:
      1. ~/.config/refsnap/config.toml (or $XDG_CONFIG_HOME/refsnap/config.toml)
      2. ./refsnap.toml
      3. Environment variables (REFSNAP_* prefix)
      4. .env file in the current directory

ENVIRONMENT VARIABLES
    REFSNAP_TOKEN        GitHub personal access token (GITHUB_TOKEN also honored)
    REFSNAP_PAGE_SIZE    Connection page size (default: 100)
    REFSNAP_BATCH_SIZE   Repositories per batched query (default: 10)
    REFSNAP_CONCURRENCY  Maximum in-flight requests (default: 4)
    REFSNAP_TIMEOUT_SECS Per-request timeout (default: 30)
    REFSNAP_RETRIES      Retry attempts for transient failures (default: 5)
"#)]
struct Cli {
    /// GitHub login to query.
    login: String,

    /// Treat the login as an organization instead of a user.
    #[arg(long)]
    org: bool,

    /// GitHub personal access token (or REFSNAP_TOKEN / GITHUB_TOKEN).
    #[arg(long)]
    token: Option<String>,

    /// Print the snapshot as JSON instead of a tree.
    #[arg(long)]
    json: bool,

    /// Directory for per-repo branch list files (one branch per line).
    #[arg(long, value_name = "DIR")]
    save_dir: Option<PathBuf>,

    /// Directory for per-repo full JSON snapshots.
    #[arg(long, value_name = "DIR")]
    save_json_dir: Option<PathBuf>,

    /// Directory for individual per-branch JSON files.
    #[arg(long, value_name = "DIR")]
    save_branch_json_dir: Option<PathBuf>,

    /// Directory for individual per-tag JSON files.
    #[arg(long, value_name = "DIR")]
    save_tag_json_dir: Option<PathBuf>,

    /// Connection page size.
    #[arg(long)]
    page_size: Option<u32>,

    /// Repositories per batched continuation query.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Maximum concurrently in-flight requests.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-request timeout in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Retry attempts for transient transport failures.
    #[arg(long)]
    retries: Option<usize>,
}

fn print_tree(account: &Account) {
    for repo in &account.repositories {
        println!("{}", repo.name);
        for branch in &repo.branches {
            println!("  └─ {}", branch.name);
        }
    }
}

fn print_summary(account: &Account, report: &FetchReport) {
    eprintln!(
        "{}: {} repositories ({} complete, {} incomplete), {} branches, {} tags \
         in {} requests over {} rounds",
        account.login,
        account.repositories.len(),
        report.complete_repositories,
        report.incomplete_repositories,
        report.branches,
        report.tags,
        report.requests,
        report.rounds,
    );
    if report.tags_skipped > 0 {
        eprintln!(
            "warning: {} tag(s) skipped (annotated-tag chain did not reach a commit)",
            report.tags_skipped
        );
    }
    if report.cancelled {
        eprintln!("warning: fetch was cancelled; the snapshot is partial");
    }
}

fn persist(cli: &Cli, account: &Account) -> std::io::Result<()> {
    if let Some(dir) = &cli.save_dir {
        output::persist_branch_lists(account, dir)?;
    }
    if let Some(dir) = &cli.save_json_dir {
        output::persist_repo_json(account, dir)?;
    }
    if let Some(dir) = &cli.save_branch_json_dir {
        output::persist_branch_json(account, dir)?;
    }
    if let Some(dir) = &cli.save_tag_json_dir {
        output::persist_tag_json(account, dir)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    shutdown::setup_shutdown_handler();

    // Structured logging for non-TTY mode only; interactive runs get
    // plain console output.
    if !Term::stdout().is_term() {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("refsnap=info,refsnap_cli=info"));
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let file_config = config::Config::load();
    let cli = Cli::parse();

    let Some(token) = cli.token.clone().or_else(|| file_config.github_token()) else {
        eprintln!(
            "error: the GraphQL API requires a token; pass --token or set REFSNAP_TOKEN / GITHUB_TOKEN"
        );
        std::process::exit(2);
    };

    let options = FetchOptions {
        page_size: cli
            .page_size
            .or(file_config.page_size)
            .unwrap_or(DEFAULT_PAGE_SIZE),
        batch_size: cli
            .batch_size
            .or(file_config.batch_size)
            .unwrap_or(DEFAULT_BATCH_SIZE),
        max_in_flight: cli
            .concurrency
            .or(file_config.concurrency)
            .unwrap_or(DEFAULT_MAX_IN_FLIGHT),
        ..Default::default()
    };
    let timeout = cli
        .timeout_secs
        .or(file_config.timeout_secs)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

    let mut retry = RetryConfig::default();
    if let Some(retries) = cli.retries.or(file_config.retries) {
        retry.max_retries = retries;
    }

    let kind = if cli.org {
        AccountKind::Organization
    } else {
        AccountKind::User
    };

    let transport = Arc::new(HttpTransport::new(token, timeout)?);
    let fetcher = Fetcher::new(transport, options)?
        .with_retry_config(retry)
        .with_cancel_flag(shutdown::cancel_flag());

    // An aborted fetch still carries everything merged so far; the
    // partial snapshot is printed and persisted before exiting non-zero.
    let (account, report, abort_cause): (Account, FetchReport, Option<TransportError>) =
        match fetcher.fetch(&cli.login, kind).await {
            Ok(outcome) => (outcome.account, outcome.report, None),
            Err(FetchError::Aborted {
                cause,
                partial,
                report,
                ..
            }) => (*partial, report, Some(cause)),
            Err(err) => return Err(err.into()),
        };

    if cli.json {
        serde_json::to_writer_pretty(std::io::stdout().lock(), &account)?;
        println!();
    } else {
        print_tree(&account);
    }

    persist(&cli, &account)?;
    print_summary(&account, &report);

    if let Some(cause) = abort_cause {
        eprintln!("error: fetch aborted ({cause}); the snapshot above is partial");
        std::process::exit(1);
    }

    Ok(())
}
