use crate::config::CoverageSettings;
use crate::error::CampaignError;
use crate::mode::InstrumentationMode;
use crate::tool::{ToolInvocation, ToolRunner};
use log::{debug, info};
use std::path::{Path, PathBuf};

/// Merges the profiling output of a whole campaign into one HTML report.
#[derive(Debug, Clone)]
pub struct CoverageAggregator {
    settings: CoverageSettings,
    build_root: PathBuf,
}

impl CoverageAggregator {
    pub fn new(settings: CoverageSettings, build_root: PathBuf) -> Self {
        Self {
            settings,
            build_root,
        }
    }

    pub fn report_dir(&self) -> &Path {
        &self.settings.report_dir
    }

    pub fn invocation(&self) -> ToolInvocation {
        let mut binary_path = self.build_root.to_string_lossy().into_owned();
        if !binary_path.ends_with('/') {
            binary_path.push('/');
        }
        ToolInvocation::new(self.settings.program.clone())
            .arg(".")
            .args(["--binary-path", binary_path.as_str()])
            .args(["-s", ".", "-t", "html", "--branch", "--ignore-not-existing"])
            .arg("-o")
            .arg(self.settings.report_dir.to_string_lossy())
    }

    /// Produces the report for coverage modes; returns where it was written.
    /// Does nothing without instrumentation.
    pub fn aggregate<R: ToolRunner + ?Sized>(
        &self,
        runner: &mut R,
        mode: InstrumentationMode,
    ) -> Result<Option<PathBuf>, CampaignError> {
        if !mode.is_coverage() {
            debug!("no instrumentation, skipping coverage aggregation");
            return Ok(None);
        }
        let invocation = self.invocation();
        let status = runner.status(&invocation)?;
        if !status.success() {
            return Err(CampaignError::AggregationFailure {
                tool: invocation.program,
                status,
            });
        }
        info!(
            "{mode} report written to {}",
            self.settings.report_dir.display()
        );
        Ok(Some(self.settings.report_dir.clone()))
    }
}
