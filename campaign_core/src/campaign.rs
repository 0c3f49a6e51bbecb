use crate::builder::BuildOrchestrator;
use crate::config::CampaignConfig;
use crate::coverage::CoverageAggregator;
use crate::error::CampaignError;
use crate::gate::{check_no_crashes, reset_outputs};
use crate::mode::InstrumentationMode;
use crate::scheduler::{CampaignScheduler, Sleeper};
use crate::session::SessionManager;
use crate::target::Catalog;
use crate::tool::ToolRunner;
use log::info;
use std::path::PathBuf;
use std::time::Duration;

/// Outcome of a completed campaign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignReport {
    pub mode: InstrumentationMode,
    pub targets: Vec<String>,
    pub scheduled: Duration,
    pub coverage_report: Option<PathBuf>,
}

/// One full pass over a catalog.
///
/// Phases run strictly in order: crash gate, output reset, batch build,
/// per-target slots, coverage aggregation. A gate or build failure ends the
/// campaign before anything after it happens.
pub struct Campaign<S, R, Z> {
    config: CampaignConfig,
    catalog: Catalog,
    mode: InstrumentationMode,
    sessions: S,
    runner: R,
    sleeper: Z,
}

impl<S, R, Z> Campaign<S, R, Z>
where
    S: SessionManager,
    R: ToolRunner,
    Z: Sleeper,
{
    pub fn new(
        config: CampaignConfig,
        catalog: Catalog,
        mode: InstrumentationMode,
        sessions: S,
        runner: R,
        sleeper: Z,
    ) -> Self {
        Self {
            config,
            catalog,
            mode,
            sessions,
            runner,
            sleeper,
        }
    }

    pub fn run(&mut self) -> Result<CampaignReport, CampaignError> {
        let scheduler =
            CampaignScheduler::from_config(&self.config).with_runtime_env(&self.mode.env());
        let planned = scheduler.planned_duration(self.catalog.len())?;
        info!(
            "campaign over {} targets, {} instrumentation, about {:?} of fuzzing",
            self.catalog.len(),
            self.mode,
            planned
        );

        check_no_crashes(&self.config.output_root())?;
        reset_outputs(&self.config.catalog_root, &self.catalog)?;

        BuildOrchestrator::new(self.config.build.clone(), self.mode.env())
            .build(&mut self.runner, &self.catalog)?;

        let schedule = scheduler.run(&self.catalog, &mut self.sessions, &mut self.sleeper)?;

        let coverage_report =
            CoverageAggregator::new(self.config.coverage.clone(), self.config.build_root.clone())
                .aggregate(&mut self.runner, self.mode)?;

        Ok(CampaignReport {
            mode: self.mode,
            targets: schedule.targets,
            scheduled: schedule.scheduled,
            coverage_report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingRunner, RecordingSessions, RecordingSleeper, SessionEvent};
    use std::fs::{self, File};
    use std::path::Path;
    use tempfile::tempdir;

    type TestCampaign = Campaign<RecordingSessions, RecordingRunner, RecordingSleeper>;

    fn campaign(root: &Path, mode: InstrumentationMode, runner: RecordingRunner) -> TestCampaign {
        let config = CampaignConfig {
            catalog_root: root.to_path_buf(),
            targets: vec!["rspversion".to_string(), "reqversion".to_string()],
            ..Default::default()
        };
        let catalog = config.catalog().unwrap();
        Campaign::new(
            config,
            catalog,
            mode,
            RecordingSessions::default(),
            runner,
            RecordingSleeper::default(),
        )
    }

    #[test]
    fn two_target_campaign_without_instrumentation() {
        let dir = tempdir().unwrap();
        let mut campaign = campaign(
            dir.path(),
            InstrumentationMode::None,
            RecordingRunner::succeeding(),
        );

        let report = campaign.run().unwrap();

        let calls = &campaign.runner.calls;
        assert_eq!(calls.len(), 1, "one build, no aggregation");
        assert!(calls[0].args.contains(&"rspversion".to_string()));
        assert!(calls[0].args.contains(&"reqversion".to_string()));

        let lifecycle: Vec<&SessionEvent> = campaign
            .sessions
            .events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Ensure(_) | SessionEvent::Terminate(_)))
            .collect();
        assert_eq!(
            lifecycle,
            vec![
                &SessionEvent::Ensure("rspversion".to_string()),
                &SessionEvent::Terminate("rspversion".to_string()),
                &SessionEvent::Ensure("reqversion".to_string()),
                &SessionEvent::Terminate("reqversion".to_string()),
            ]
        );
        assert_eq!(campaign.sleeper.total(), Duration::from_secs(3610));
        assert_eq!(report.scheduled, Duration::from_secs(3610));
        assert_eq!(report.coverage_report, None);
        assert!(dir.path().join("out/rspversion").is_dir());
        assert!(dir.path().join("out/reqversion").is_dir());
    }

    #[test]
    fn crash_evidence_aborts_before_any_mutation() {
        let dir = tempdir().unwrap();
        let crashes = dir.path().join("out/rspversion/default/crashes");
        fs::create_dir_all(&crashes).unwrap();
        File::create(crashes.join("id:000000,sig:11")).unwrap();
        let queue = dir.path().join("out/reqversion/default/queue");
        fs::create_dir_all(&queue).unwrap();
        File::create(queue.join("id:000042")).unwrap();

        let mut campaign = campaign(
            dir.path(),
            InstrumentationMode::SourceCoverage,
            RecordingRunner::succeeding(),
        );
        match campaign.run() {
            Err(CampaignError::GateBlocked { path }) => assert_eq!(path, crashes),
            other => panic!("Expected GateBlocked, got {other:?}"),
        }

        assert!(crashes.join("id:000000,sig:11").exists());
        assert!(queue.join("id:000042").exists(), "reqversion must not be touched");
        assert!(campaign.runner.calls.is_empty(), "no build may run");
        assert!(campaign.sessions.events.is_empty());
        assert!(campaign.sleeper.naps.is_empty());
    }

    #[test]
    fn build_failure_stops_before_scheduling() {
        let dir = tempdir().unwrap();
        let mut campaign = campaign(
            dir.path(),
            InstrumentationMode::ProfileCoverage,
            RecordingRunner::failing_on("cargo", 101),
        );
        assert!(matches!(
            campaign.run(),
            Err(CampaignError::BuildFailure { .. })
        ));
        assert_eq!(campaign.runner.calls.len(), 1);
        assert!(campaign.sessions.events.is_empty());
        assert!(campaign.sleeper.naps.is_empty());
    }

    #[test]
    fn coverage_campaign_aggregates_once_at_the_end() {
        let dir = tempdir().unwrap();
        let mut campaign = campaign(
            dir.path(),
            InstrumentationMode::SourceCoverage,
            RecordingRunner::succeeding(),
        );
        let report = campaign.run().unwrap();

        let programs: Vec<&str> = campaign
            .runner
            .calls
            .iter()
            .map(|c| c.program.as_str())
            .collect();
        assert_eq!(programs, vec!["cargo", "grcov"]);
        assert_eq!(
            campaign.runner.calls[0].env_value("RUSTFLAGS"),
            Some("-C instrument-coverage")
        );
        let fuzz_lines = campaign
            .sessions
            .events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Send(_, line) if line.contains("afl fuzz")))
            .count();
        let patterned = campaign
            .sessions
            .events
            .iter()
            .filter(|e| {
                matches!(e, SessionEvent::Send(_, line)
                    if line.starts_with("LLVM_PROFILE_FILE=fuzz_run%m.profraw "))
            })
            .count();
        assert_eq!(fuzz_lines, 2);
        assert_eq!(patterned, 2);
        assert_eq!(report.mode, InstrumentationMode::SourceCoverage);
        assert_eq!(
            report.coverage_report,
            Some(PathBuf::from("target/debug/fuzz_coverage"))
        );
    }
}
