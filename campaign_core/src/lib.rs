pub mod builder;
pub mod campaign;
pub mod config;
pub mod coverage;
pub mod error;
pub mod gate;
pub mod mode;
pub mod scheduler;
pub mod session;
pub mod target;
pub mod tool;

#[cfg(test)]
mod testing;

pub use builder::BuildOrchestrator;
pub use campaign::{Campaign, CampaignReport};
pub use config::{CampaignConfig, SessionBackend};
pub use coverage::CoverageAggregator;
pub use error::CampaignError;
pub use gate::{check_no_crashes, reset_outputs};
pub use mode::{InstrumentationEnv, InstrumentationMode};
pub use scheduler::{CampaignScheduler, ScheduleReport, Sleeper, ThreadSleeper};
pub use session::{ProcessSessions, ScreenSessions, SessionManager};
pub use target::{Catalog, FuzzTarget};
pub use tool::{SystemRunner, ToolInvocation, ToolRunner};
