use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Errors raised while preparing or running a fuzz campaign.
///
/// Only the setup phase produces fatal errors. Once targets are being
/// scheduled the orchestrator does not inspect individual fuzz runs, so a
/// target whose binary dies immediately is indistinguishable from one that
/// used its whole budget.
#[derive(Error, Debug)]
pub enum CampaignError {
    /// A previous campaign left crash findings that nobody has triaged yet.
    /// Raised before any output directory is touched.
    #[error("crashes found in {}, review them before starting a new campaign", .path.display())]
    GateBlocked { path: PathBuf },

    /// The build tool exited unsuccessfully. Builds are never retried.
    #[error("`{tool}` failed with {status}")]
    BuildFailure { tool: String, status: ExitStatus },

    /// The coverage aggregation tool exited unsuccessfully.
    #[error("coverage aggregation with `{tool}` failed with {status}")]
    AggregationFailure { tool: String, status: ExitStatus },

    /// An external tool could not be started at all.
    #[error("failed to launch `{tool}`: {source}")]
    ToolLaunch {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// A session with this name was already alive while strict sessions were requested.
    #[error("session `{name}` is already running")]
    SessionAlreadyRunning { name: String },

    /// The session backend refused an operation.
    #[error("session `{name}`: {reason}")]
    Session { name: String, reason: String },

    #[error("campaign I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid campaign configuration: {0}")]
    Config(String),
}

impl From<toml::de::Error> for CampaignError {
    fn from(err: toml::de::Error) -> Self {
        CampaignError::Config(format!("TOML parse error: {err}"))
    }
}
