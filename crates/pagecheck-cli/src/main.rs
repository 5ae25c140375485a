//! PageCheck CLI - page verification runs against a live site
//!
//! Usage:
//!   pagecheck run                      Run the plan in pagecheck.toml
//!   pagecheck run --preset booking     Run a built-in plan
//!   pagecheck init [PATH]              Write a default pagecheck.toml
//!
//! Exit codes: 0 when the run completes (whatever the assertion results),
//! 1 when a navigation or capture failure aborts it, 2 when the browser
//! cannot be launched.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use pagecheck_browser::{BrowserConfig, ChromeBackend, Preset, RunOrchestrator, RunPlan, RunReport};
use pagecheck_core::config::DEFAULT_CONFIG_FILE;
use pagecheck_core::RunConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "pagecheck")]
#[command(author, version, about = "Headless-browser page verification")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one verification pass against the target site
    Run(RunArgs),

    /// Write a default configuration file
    Init {
        /// Config file to create
        #[arg(default_value = DEFAULT_CONFIG_FILE)]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Configuration file (defaults to ./pagecheck.toml when present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Built-in plan, used when the config defines none
    #[arg(short, long)]
    preset: Option<CliPreset>,

    /// Base URL of the target site
    #[arg(long)]
    url: Option<String>,

    /// Artifact output directory
    #[arg(short, long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// Run label; artifacts land in <out>/<label>/
    #[arg(short, long)]
    label: Option<String>,

    /// Show the browser window
    #[arg(long)]
    headful: bool,

    /// Print the report as JSON instead of the summary
    #[arg(long)]
    json: bool,
}

/// CLI-friendly preset enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliPreset {
    Landing,
    Booking,
}

impl From<CliPreset> for Preset {
    fn from(p: CliPreset) -> Self {
        match p {
            CliPreset::Landing => Preset::Landing,
            CliPreset::Booking => Preset::Booking,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging; stdout is reserved for the report
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run(args) => cmd_run(args).await,
        Commands::Init { path, force } => cmd_init(path, force).map(|_| ExitCode::SUCCESS),
    }
}

fn load_config(args: &RunArgs) -> Result<RunConfig> {
    let mut config = match &args.config {
        Some(path) => RunConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RunConfig::load_or_default(&PathBuf::from(DEFAULT_CONFIG_FILE))
            .context("Failed to load pagecheck.toml")?,
    };

    apply_overrides(&mut config, args);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Command-line flags take precedence over the file
fn apply_overrides(config: &mut RunConfig, args: &RunArgs) {
    if let Some(url) = &args.url {
        config.target_url = url.clone();
    }
    if let Some(out) = &args.out {
        config.output.artifact_dir = out.clone();
    }
    if let Some(label) = &args.label {
        config.output.run_label = label.clone();
    }
    if args.headful {
        config.browser.headless = false;
    }
}

fn select_plan(config: &RunConfig, preset: Option<CliPreset>) -> RunPlan {
    match preset.map(Preset::from) {
        Some(preset) if config.has_plan() => {
            warn!("Config defines its own plan; ignoring --preset {}", preset);
            RunPlan::from_config(config)
        }
        Some(preset) => preset.plan(config),
        None => RunPlan::from_config(config),
    }
}

async fn cmd_run(args: RunArgs) -> Result<ExitCode> {
    let config = load_config(&args)?;
    let plan = select_plan(&config, args.preset);
    info!("Verifying {} (run '{}')", plan.target_url, plan.run_label);

    let backend = match ChromeBackend::launch_with_config(BrowserConfig::for_run(&config)).await
    {
        Ok(backend) => backend,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            return Ok(ExitCode::from(2));
        }
    };

    let report = RunOrchestrator::new().run(Box::new(backend), &plan).await;

    if config.output.write_report {
        let report_path = plan.run_dir().join("report.json");
        match report.write_json(&report_path).await {
            Ok(()) => info!("Report written to {}", report_path.display()),
            Err(e) => warn!("Failed to write report {}: {}", report_path.display(), e),
        }
    }

    print_report(&report, args.json)?;

    if report.is_complete() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1))
    }
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", report.to_json()?);
    } else {
        for line in report.summary_lines() {
            println!("{}", line);
        }
    }
    Ok(())
}

fn cmd_init(path: PathBuf, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    RunConfig::write_default(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Created {}", path.display());
    println!("Edit target_url and add [[assertions]], [[steps]] and [[captures]] to define a plan,");
    println!("or run a built-in plan with: pagecheck run --preset landing");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagecheck_core::{AssertionSpec, CaptureRequest, Selector};

    fn run_args(argv: &[&str]) -> RunArgs {
        match Cli::parse_from(argv).command {
            Commands::Run(args) => args,
            Commands::Init { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn test_flags_override_config() {
        let args = run_args(&[
            "pagecheck", "run", "--url", "http://127.0.0.1:4000", "--out", "/tmp/shots",
            "--label", "ci", "--headful",
        ]);
        let mut config = RunConfig::default();
        apply_overrides(&mut config, &args);

        assert_eq!(config.target_url, "http://127.0.0.1:4000");
        assert_eq!(config.output.artifact_dir, PathBuf::from("/tmp/shots"));
        assert_eq!(config.output.run_label, "ci");
        assert!(!config.browser.headless);
    }

    #[test]
    fn test_label_override_must_stay_in_artifact_dir() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("pagecheck.toml");
        RunConfig::write_default(&path).unwrap();
        let path = path.to_str().unwrap();

        let args = run_args(&["pagecheck", "run", "--config", path, "--label", "../shared"]);
        assert!(load_config(&args).is_err());

        let args = run_args(&["pagecheck", "run", "--config", path, "--label", "nightly"]);
        assert_eq!(load_config(&args).unwrap().output.run_label, "nightly");
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let args = run_args(&["pagecheck", "run", "--config", "/nonexistent/pagecheck.toml"]);
        assert!(load_config(&args).is_err());
    }

    #[test]
    fn test_config_plan_wins_over_preset() {
        let mut config = RunConfig::default();
        assert_eq!(
            select_plan(&config, Some(CliPreset::Booking)).target_url,
            "http://localhost:3000/book"
        );

        config.assertions = vec![AssertionSpec::present(Selector::css("main"))];
        config.captures = vec![CaptureRequest::full_page("home")];
        let plan = select_plan(&config, Some(CliPreset::Booking));
        assert_eq!(plan.target_url, "http://localhost:3000");
        assert_eq!(plan.assertions.len(), 1);
    }

    #[test]
    fn test_init_refuses_overwrite() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("pagecheck.toml");

        cmd_init(path.clone(), false).unwrap();
        assert!(cmd_init(path.clone(), false).is_err());
        cmd_init(path.clone(), true).unwrap();
        assert!(RunConfig::load(&path).is_ok());
    }
}
