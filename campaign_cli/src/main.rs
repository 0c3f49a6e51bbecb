use campaign_core::config::{CampaignConfig, SessionBackend};
use campaign_core::{
    Campaign, CampaignError, CampaignReport, Catalog, InstrumentationMode, ProcessSessions,
    ScreenSessions, SessionManager, SystemRunner, ThreadSleeper,
};

use clap::{Parser, ValueEnum};
use env_logger::{Builder, Env, fmt};
use log::{Level, error, info};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Builds and fuzzes every target of a catalog, one time slot each", long_about = None)]
struct Cli {
    /// `Scoverage` for source-based coverage, `Gcoverage` for profiling-based
    /// coverage. Anything else builds without instrumentation.
    #[clap(allow_hyphen_values = true)]
    mode: Option<String>,
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,
    /// Only fuzz these targets (repeatable). Catalog order is kept.
    #[clap(short, long = "target")]
    targets: Vec<String>,
    #[clap(long)]
    budget_secs: Option<u64>,
    #[clap(long)]
    settle_secs: Option<u64>,
    #[clap(long)]
    session_backend: Option<BackendArg>,
    /// Refuse to reuse a session that is already running.
    #[clap(long)]
    strict_sessions: bool,
    #[clap(short, long)]
    verbose: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Screen,
    Process,
}

fn init_logger(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    Builder::from_env(Env::default().filter_or("RUST_LOG", default_filter))
        .format(|buf, record| {
            let mut style = buf.style();
            match record.level() {
                Level::Error => {
                    style.set_color(fmt::Color::Red).set_bold(true);
                }
                Level::Warn => {
                    style.set_color(fmt::Color::Yellow).set_bold(true);
                }
                Level::Info => {
                    style.set_color(fmt::Color::Blue).set_bold(true);
                }
                Level::Debug => {}
                Level::Trace => {}
            };

            let timestamp = buf.timestamp();

            writeln!(buf, "{} {}", timestamp, style.value(record.args()))
        })
        .init();
}

fn load_config(cli: &Cli) -> Result<CampaignConfig, anyhow::Error> {
    let mut config = match &cli.config_file {
        Some(config_path) => {
            info!("Loading configuration from {}", config_path.display());
            CampaignConfig::load_from_file(config_path)?
        }
        None => {
            let default_config_path = PathBuf::from("campaign.toml");
            if default_config_path.exists() {
                info!(
                    "No config file specified, loading default {}",
                    default_config_path.display()
                );
                CampaignConfig::load_from_file(&default_config_path)?
            } else {
                info!("No config file specified and campaign.toml not found, using built-in defaults");
                CampaignConfig::default()
            }
        }
    };

    if let Some(budget) = cli.budget_secs {
        config.schedule.per_target_budget_secs = budget;
    }
    if let Some(settle) = cli.settle_secs {
        config.schedule.settle_delay_secs = settle;
    }
    if let Some(backend) = cli.session_backend {
        config.session.backend = match backend {
            BackendArg::Screen => SessionBackend::Screen,
            BackendArg::Process => SessionBackend::Process,
        };
    }
    if cli.strict_sessions {
        config.session.strict = true;
    }
    Ok(config)
}

fn run_with<S: SessionManager>(
    config: CampaignConfig,
    catalog: Catalog,
    mode: InstrumentationMode,
    sessions: S,
) -> Result<CampaignReport, CampaignError> {
    Campaign::new(config, catalog, mode, sessions, SystemRunner, ThreadSleeper).run()
}

fn run(cli: Cli) -> Result<CampaignReport, anyhow::Error> {
    let config = load_config(&cli)?;
    let mut catalog = config.catalog()?;
    if !cli.targets.is_empty() {
        catalog = catalog.restrict(&cli.targets)?;
    }
    if catalog.is_empty() {
        return Err(anyhow::anyhow!("the target catalog is empty, nothing to fuzz"));
    }
    let mode = InstrumentationMode::from_arg(cli.mode.as_deref());

    let strict = config.session.strict;
    let report = match config.session.backend {
        SessionBackend::Screen => {
            run_with(config, catalog, mode, ScreenSessions::new(SystemRunner, strict))?
        }
        SessionBackend::Process => {
            let sessions = ProcessSessions::new(config.session.shell.clone(), strict);
            run_with(config, catalog, mode, sessions)?
        }
    };
    Ok(report)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    match run(cli) {
        Ok(report) => {
            info!(
                "Campaign finished: {} targets fuzzed for {:?} in total ({} instrumentation)",
                report.targets.len(),
                report.scheduled,
                report.mode
            );
            if let Some(dir) = report.coverage_report {
                info!("Coverage report: {}", dir.display());
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
