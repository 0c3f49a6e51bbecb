use crate::config::CampaignConfig;
use crate::error::CampaignError;
use crate::mode::InstrumentationEnv;
use crate::session::SessionManager;
use crate::target::{Catalog, FuzzTarget};
use log::{info, warn};
use std::path::PathBuf;
use std::time::Duration;

/// Blocks the orchestrator for a fixed time. The only timing primitive the
/// scheduler uses; it never looks at what a fuzz run is doing.
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// What a finished schedule did, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleReport {
    pub targets: Vec<String>,
    pub scheduled: Duration,
}

/// Fixed-duration round robin over a catalog.
///
/// Every target gets exactly one slot: session up, fuzz command in, wait the
/// whole budget, session down, settle. Nothing is skipped, retried or
/// reordered, and a run that dies early still holds its slot.
#[derive(Debug, Clone)]
pub struct CampaignScheduler {
    catalog_root: PathBuf,
    build_root: PathBuf,
    engine: Vec<String>,
    runtime_env: Vec<(String, String)>,
    per_target_budget: Duration,
    settle_delay: Duration,
}

impl CampaignScheduler {
    pub fn new(
        catalog_root: PathBuf,
        build_root: PathBuf,
        engine: Vec<String>,
        per_target_budget: Duration,
        settle_delay: Duration,
    ) -> Self {
        Self {
            catalog_root,
            build_root,
            engine,
            runtime_env: Vec::new(),
            per_target_budget,
            settle_delay,
        }
    }

    pub fn from_config(config: &CampaignConfig) -> Self {
        Self::new(
            config.catalog_root.clone(),
            config.build_root.clone(),
            config.fuzz.engine.clone(),
            config.schedule.per_target_budget(),
            config.schedule.settle_delay(),
        )
    }

    /// Passes the instrumentation variables the fuzz runs read to every
    /// fuzz command.
    pub fn with_runtime_env(mut self, env: &InstrumentationEnv) -> Self {
        self.runtime_env = env
            .runtime_vars()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self
    }

    /// Total time the scheduler will block for `targets` slots.
    pub fn planned_duration(&self, targets: usize) -> Result<Duration, CampaignError> {
        self.per_target_budget
            .checked_add(self.settle_delay)
            .zip(u32::try_from(targets).ok())
            .and_then(|(slot, n)| slot.checked_mul(n))
            .ok_or_else(|| {
                CampaignError::Config(format!(
                    "{targets} slots of {:?} plus {:?} settle delay exceed the schedulable time",
                    self.per_target_budget, self.settle_delay
                ))
            })
    }

    /// The line typed into the target's session.
    pub fn fuzz_command(&self, target: &FuzzTarget) -> String {
        let input = target.input_dir(&self.catalog_root);
        let output = target.output_dir(&self.catalog_root);
        let binary = target.binary(&self.build_root);
        let mut words: Vec<String> = self
            .runtime_env
            .iter()
            .map(|(k, v)| format!("{k}={}", shell_word(v)))
            .collect();
        words.extend(self.engine.iter().map(|w| shell_word(w)));
        words.push("-i".to_string());
        words.push(shell_word(&input.to_string_lossy()));
        words.push("-o".to_string());
        words.push(shell_word(&output.to_string_lossy()));
        words.push(shell_word(&binary.to_string_lossy()));
        words.join(" ")
    }

    pub fn run<S, Z>(
        &self,
        catalog: &Catalog,
        sessions: &mut S,
        sleeper: &mut Z,
    ) -> Result<ScheduleReport, CampaignError>
    where
        S: SessionManager + ?Sized,
        Z: Sleeper + ?Sized,
    {
        self.planned_duration(catalog.len())?;
        let slot_length = self.per_target_budget + self.settle_delay;
        let mut report = ScheduleReport {
            targets: Vec::with_capacity(catalog.len()),
            scheduled: Duration::ZERO,
        };

        for (slot, target) in catalog.iter().enumerate() {
            let name = target.name();
            let seeds = target.input_dir(&self.catalog_root);
            if !seeds.exists() {
                warn!(
                    "no seed corpus at {}, the engine may refuse to start",
                    seeds.display()
                );
            }

            let session = sessions.ensure_session(name)?;
            let command = self.fuzz_command(target);
            if let Err(e) = sessions.send_command(&session, &command) {
                if let Err(cleanup) = sessions.terminate(session) {
                    warn!("could not terminate session for {name}: {cleanup}");
                }
                return Err(e);
            }
            info!(
                "[{}/{}] fuzzing {name} for {:?}",
                slot + 1,
                catalog.len(),
                self.per_target_budget
            );

            sleeper.sleep(self.per_target_budget);

            if let Err(e) = sessions.terminate(session) {
                warn!("could not terminate session for {name}: {e}");
            }
            sleeper.sleep(self.settle_delay);

            report.targets.push(name.to_string());
            report.scheduled += slot_length;
        }
        Ok(report)
    }
}

fn shell_word(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=%+,@".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
