//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use giftrefresh_core::pipeline::{self, ProgressReporter, RunReport, write_report};
use giftrefresh_core::prompt::PromptTemplates;
use giftrefresh_core::publisher::{CardStatus, MonthlyAction, RefreshOutcome};
use giftrefresh_core::selector::{self, MonthlyDecision};
use giftrefresh_generation::GenerationClient;
use giftrefresh_shared::{
    AppConfig, Credentials, RunContext, init_config, load_config, load_config_from,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// giftrefresh: monthly content refresh for a static gift-ideas site.
#[derive(Parser)]
#[command(
    name = "giftrefresh",
    version,
    about = "Refresh existing gift-guide posts and publish this month's roundup.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Refresh a batch of posts, then create or re-publish the monthly post.
    Run {
        #[command(flatten)]
        site: SiteArgs,

        /// Validate everything but write nothing.
        #[arg(long)]
        dry_run: bool,

        /// Write a JSON run report to this path.
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Show which posts would be refreshed and what the monthly phase would do.
    Plan {
        #[command(flatten)]
        site: SiteArgs,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Write a default giftrefresh.toml into the site root.
    Init {
        /// Root directory of the static site.
        #[arg(long, default_value = ".")]
        site_root: PathBuf,
    },
    /// Show resolved configuration.
    Show {
        #[command(flatten)]
        site: SiteArgs,
    },
}

/// Flags shared by every command that resolves a run context.
#[derive(Args, Clone, Debug)]
pub(crate) struct SiteArgs {
    /// Root directory of the static site.
    #[arg(long, env = "GIFTREFRESH_SITE_ROOT", default_value = ".")]
    pub site_root: PathBuf,

    /// Config file (defaults to <site-root>/giftrefresh.toml).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Run as if today were this date (YYYY-MM-DD, UTC).
    #[arg(long, value_parser = parse_date)]
    pub date: Option<NaiveDate>,

    /// Maximum number of existing posts to refresh.
    #[arg(long)]
    pub max_files: Option<usize>,
}

fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "giftrefresh=info",
        1 => "giftrefresh=debug",
        _ => "giftrefresh=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            site,
            dry_run,
            report,
        } => cmd_run(&site, dry_run, report.as_deref()).await,
        Command::Plan { site } => cmd_plan(&site),
        Command::Config { action } => match action {
            ConfigAction::Init { site_root } => cmd_config_init(&site_root),
            ConfigAction::Show { site } => cmd_config_show(&site),
        },
    }
}

/// Resolve config (file, then flag overrides) and fix the run's date.
fn build_context(site: &SiteArgs, dry_run: bool) -> Result<RunContext> {
    let mut config: AppConfig = match &site.config {
        Some(path) => load_config_from(path)?,
        None => load_config(&site.site_root)?,
    };
    if let Some(max_files) = site.max_files {
        config.refresh.max_files = max_files;
    }

    if !site.site_root.is_dir() {
        return Err(eyre!(
            "site root '{}' is not a directory",
            site.site_root.display()
        ));
    }

    Ok(RunContext {
        today: site
            .date
            .unwrap_or_else(|| chrono::Utc::now().date_naive()),
        site_root: site.site_root.clone(),
        config,
        dry_run,
    })
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(site: &SiteArgs, dry_run: bool, report_path: Option<&Path>) -> Result<()> {
    let ctx = build_context(site, dry_run)?;

    // Credentials before any site I/O.
    let credentials = Credentials::from_env(&ctx.config.generation)?;
    let templates = PromptTemplates::load(&ctx)?;
    let client = GenerationClient::new(&ctx.config.generation, &credentials)?;

    info!(
        site_root = %ctx.site_root.display(),
        date = %ctx.today,
        max_files = ctx.config.refresh.max_files,
        model = %ctx.config.generation.model,
        dry_run,
        "starting content refresh"
    );

    let reporter = CliProgress::new();
    let report = pipeline::run(&ctx, &templates, &client, &reporter)
        .await
        .inspect_err(|_| reporter.spinner.finish_and_clear())?;

    print_summary(&report);

    if let Some(path) = report_path {
        write_report(path, &report)?;
        println!("  Report written to {}", path.display());
        println!();
    }

    Ok(())
}

fn cmd_plan(site: &SiteArgs) -> Result<()> {
    let ctx = build_context(site, true)?;
    let selection = selector::select(&ctx)?;

    println!();
    println!("  Date:    {} (period {})", ctx.today, ctx.period());
    println!("  Posts:   {} hand-authored", selection.content_posts.len());
    println!(
        "  Refresh: {} of max {}",
        selection.candidates.len(),
        ctx.config.refresh.max_files
    );
    for file in &selection.candidates {
        println!("    - {file}");
    }
    match &selection.monthly {
        MonthlyDecision::Create { filename } => println!("  Monthly: create {filename}"),
        MonthlyDecision::Republish { filename } => {
            println!("  Monthly: {filename} exists; re-point redirect and card")
        }
    }
    println!();

    Ok(())
}

fn cmd_config_init(site_root: &Path) -> Result<()> {
    let path = init_config(site_root)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(site: &SiteArgs) -> Result<()> {
    let ctx = build_context(site, false)?;
    let toml_str = toml::to_string_pretty(&ctx.config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

fn print_summary(report: &RunReport) {
    let mode = if report.dry_run { " (dry run)" } else { "" };
    let width = report
        .candidates
        .iter()
        .map(|c| c.file.len())
        .max()
        .unwrap_or(0);

    println!();
    println!("  Content refresh finished{mode}");
    println!("  Run:      {}", report.run_id);
    println!("  Period:   {}", report.period);
    println!(
        "  Refresh:  {} refreshed, {} skipped, {} total",
        report.refreshed(),
        report.skipped(),
        report.candidates.len()
    );
    for candidate in &report.candidates {
        println!("    {:<width$}  {}", candidate.file, candidate.outcome);
    }

    let monthly = &report.monthly;
    println!(
        "  Monthly:  {} {}",
        action_label(monthly.action),
        monthly.archive
    );
    println!("  Redirect: -> {}", monthly.redirect_target);
    println!("  Card:     {}", card_label(monthly.card));
    println!("  Time:     {:.1}s", report.elapsed_ms as f64 / 1000.0);
    println!();
}

fn action_label(action: MonthlyAction) -> &'static str {
    match action {
        MonthlyAction::Created => "created",
        MonthlyAction::AlreadyExists => "already exists",
        MonthlyAction::WouldCreate => "would create",
    }
}

fn card_label(card: CardStatus) -> &'static str {
    match card {
        CardStatus::Updated => "updated",
        CardStatus::AlreadyCurrent => "already current",
        CardStatus::WouldUpdate => "would update",
        CardStatus::CardMissing => "no data-monthly card found",
        CardStatus::IndexMissing => "catalog index not found",
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn candidate_done(&self, file: &str, outcome: &RefreshOutcome, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Refreshed [{current}/{total}] {file}: {outcome}"));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from([
            "giftrefresh",
            "-vv",
            "run",
            "--site-root",
            "/srv/site",
            "--date",
            "2025-06-14",
            "--max-files",
            "3",
            "--dry-run",
            "--report",
            "out.json",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        let Command::Run {
            site,
            dry_run,
            report,
        } = cli.command
        else {
            panic!("expected run command");
        };
        assert_eq!(site.site_root, PathBuf::from("/srv/site"));
        assert_eq!(site.date, NaiveDate::from_ymd_opt(2025, 6, 14));
        assert_eq!(site.max_files, Some(3));
        assert!(dry_run);
        assert_eq!(report, Some(PathBuf::from("out.json")));
    }

    #[test]
    fn bad_date_is_rejected() {
        let err = Cli::try_parse_from(["giftrefresh", "plan", "--date", "June 14"]);
        assert!(err.is_err());
    }

    #[test]
    fn flags_override_config() {
        let root = std::env::temp_dir().join(format!("gr-cli-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(
            root.join("giftrefresh.toml"),
            "[refresh]\nmax_files = 5\n\n[affiliate]\ntag = \"other-21\"\n",
        )
        .unwrap();

        let site = SiteArgs {
            site_root: root.clone(),
            config: None,
            date: NaiveDate::from_ymd_opt(2025, 1, 31),
            max_files: Some(1),
        };
        let ctx = build_context(&site, true).unwrap();
        assert_eq!(ctx.config.refresh.max_files, 1);
        assert_eq!(ctx.config.affiliate.tag, "other-21");
        assert_eq!(ctx.period().to_string(), "2025-01");
        assert!(ctx.dry_run);

        std::fs::remove_dir_all(&root).ok();
    }
}
