use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use rhizome::actions::{
    Action, FeatureEnable, FindingsDownload, LabelSync, SecurityStatusCheck, TopicApply,
};
use rhizome::config::AppConfig;
use rhizome::engine::limiter::RateLimiter;
use rhizome::engine::task::RepoFilter;
use rhizome::engine::{BatchConfig, Orchestrator};
use rhizome::platform::github::{auth, GitHubPlatform};
use rhizome::platform::types::{Feature, FindingKind};
use rhizome::platform::Platform;
use rhizome::report::{self, Reporter};
use rhizome::repos::RepoList;
use rhizome::shutdown::cancel_on_shutdown;

#[derive(Parser)]
#[command(
    name = "rhizome",
    version,
    about = "Bulk label, topic, GHAS and findings operations across GitHub repositories"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Repository list (JSON)
    #[arg(short = 'f', long, default_value = "repos.json", global = true)]
    file: PathBuf,

    /// Number of concurrent workers
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    /// Describe what would change without calling the API
    #[arg(short = 'n', long, global = true)]
    dry_run: bool,

    /// Increase log verbosity and print per-repository detail
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only process repositories matching `owner/name` or `owner/*`
    #[arg(long, global = true)]
    include: Vec<String>,

    /// Skip repositories matching `owner/name` or `owner/*`
    #[arg(long, global = true)]
    exclude: Vec<String>,

    /// Stop dispatching new repositories after the first failure
    #[arg(long, global = true)]
    fail_fast: bool,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long, global = true)]
    yes: bool,

    /// Write the run summary as JSON to this path
    #[arg(long, global = true)]
    report: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create or update the labels listed in the input file
    Labels {
        /// Delete labels not listed in the input file
        #[arg(long)]
        prune: bool,
    },
    /// Add the topics listed in the input file
    Topics,
    /// Enable GitHub Advanced Security features
    Ghas {
        /// Features to enable (default: all)
        #[arg(long, value_delimiter = ',')]
        features: Vec<Feature>,
        /// Only report which features are enabled
        #[arg(long)]
        check: bool,
    },
    /// Download SBOM, Dependabot and code scanning findings
    Findings {
        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Finding types to download (default: all)
        #[arg(short, long, value_delimiter = ',')]
        types: Vec<FindingKind>,
    },
}

/// What the chosen subcommand runs and how the operator confirms it.
struct Plan {
    action: Arc<dyn Action>,
    details: Vec<String>,
    /// Word the operator must type, or `None` for read-only runs.
    confirm_word: Option<&'static str>,
}

fn init_tracing(verbose: u8, json: bool) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let fmt = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry().with(filter).with(fmt).init();
}

fn join<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn build_plan(
    command: &Command,
    list: &RepoList,
    config: &mut AppConfig,
    platform: Arc<dyn Platform>,
) -> anyhow::Result<Plan> {
    let plan = match command {
        Command::Labels { prune } => {
            let labels = list.labels()?;
            let mut details = vec![format!(
                "labels: {}",
                join(&labels.iter().map(|l| &l.name).collect::<Vec<_>>())
            )];
            if *prune {
                details.push("unlisted labels will be DELETED".to_string());
            }
            Plan {
                action: Arc::new(LabelSync::new(platform, labels, *prune)?),
                details,
                confirm_word: Some("y"),
            }
        }
        Command::Topics => {
            let action = TopicApply::new(platform, list.topics()?)?;
            Plan {
                details: vec![format!("topics: {}", join(action.topics()))],
                action: Arc::new(action),
                confirm_word: Some("y"),
            }
        }
        Command::Ghas { check: true, .. } => Plan {
            action: Arc::new(SecurityStatusCheck::new(platform)),
            details: vec!["read-only status check".to_string()],
            confirm_word: None,
        },
        Command::Ghas { features, .. } => {
            let selected = if features.is_empty() {
                Feature::ORDER.to_vec()
            } else {
                features.clone()
            };
            let action = FeatureEnable::new(platform, &selected)?;
            let details = action
                .features()
                .iter()
                .map(|f| format!("{f}: {}", f.description()))
                .chain(std::iter::once(
                    "advanced security consumes a license seat per active committer".to_string(),
                ))
                .collect();
            Plan {
                action: Arc::new(action),
                details,
                confirm_word: Some("enable"),
            }
        }
        Command::Findings { output, types } => {
            if let Some(dir) = output {
                config.output.findings_dir = dir.clone();
            }
            let kinds = if types.is_empty() {
                FindingKind::ALL.to_vec()
            } else {
                types.clone()
            };
            Plan {
                action: Arc::new(FindingsDownload::new(
                    platform,
                    &kinds,
                    config.output.findings_dir.clone(),
                )?),
                details: vec![
                    format!("types: {}", join(&kinds)),
                    format!("output: {}", config.output.findings_dir.display()),
                ],
                confirm_word: None,
            }
        }
    };
    Ok(plan)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(workers) = cli.workers {
        config.engine.workers = workers;
    }
    let retry = config.engine.retry_policy()?;

    let list = RepoList::load(&cli.file)?;

    // Dry runs only call `describe`, so no token is needed.
    let token = if cli.dry_run {
        config.github.token.clone().unwrap_or_default()
    } else {
        let token = config.github_token()?.to_string();
        auth::verify_token(&config.github, &token).await?;
        token
    };

    let cancel = CancellationToken::new();
    let limiter = Arc::new(RateLimiter::new(
        config.engine.limiter_settings(),
        cancel.clone(),
    ));
    let platform: Arc<dyn Platform> = Arc::new(GitHubPlatform::new(
        &config.github,
        &token,
        Arc::clone(&limiter),
    )?);

    let plan = build_plan(&cli.command, &list, &mut config, platform)?;
    let check_mode = matches!(cli.command, Command::Ghas { check: true, .. });
    let findings_dir = match cli.command {
        Command::Findings { .. } => Some(config.output.findings_dir.clone()),
        _ => None,
    };

    let filter = RepoFilter {
        include: cli.include.clone(),
        exclude: cli.exclude.clone(),
    };
    let selected = list.repos.iter().filter(|r| filter.allows(r)).count();

    print!(
        "{}",
        report::plan_header(
            plan.action.name(),
            selected,
            config.engine.workers,
            cli.dry_run,
            &plan.details,
        )
    );

    if let Some(word) = plan.confirm_word {
        if !cli.dry_run && !cli.yes {
            let prompt = if word == "y" {
                "Proceed? [y/N]".to_string()
            } else {
                format!("Type '{word}' to proceed:")
            };
            let confirmed = report::confirm(
                &mut std::io::stdin().lock(),
                &mut std::io::stdout(),
                &prompt,
                word,
            )?;
            if !confirmed {
                println!("Aborted.");
                return Ok(ExitCode::SUCCESS);
            }
        }
    }

    let batch = BatchConfig {
        workers: config.engine.workers,
        dry_run: cli.dry_run,
        fail_fast: cli.fail_fast,
        filter,
        retry,
    };

    let watcher = cancel_on_shutdown(cancel.clone());
    let reporter = Reporter::new(selected, cli.verbose > 0);
    let orchestrator = Orchestrator::new(limiter, cancel.clone());

    let summary = orchestrator
        .run_batch(&list.repos, plan.action, &batch, |outcome| {
            reporter.on_outcome(outcome)
        })
        .await;
    reporter.finish();
    watcher.abort();
    let summary = summary?;

    if check_mode && !cli.dry_run {
        print!("{}", report::status_table(&summary));
    }
    print!("{}", report::render_summary(&summary, findings_dir.as_deref()));

    if let Some(path) = &cli.report {
        report::write_json(&summary, path)?;
    }

    Ok(ExitCode::from(summary.exit_code()))
}
