use crate::config::BuildSettings;
use crate::error::CampaignError;
use crate::mode::InstrumentationEnv;
use crate::target::Catalog;
use crate::tool::{ToolInvocation, ToolRunner};
use log::{error, info};

/// Compiles every fuzz target of a catalog in a single build tool call.
#[derive(Debug, Clone)]
pub struct BuildOrchestrator {
    settings: BuildSettings,
    env: InstrumentationEnv,
}

impl BuildOrchestrator {
    pub fn new(settings: BuildSettings, env: InstrumentationEnv) -> Self {
        Self { settings, env }
    }

    /// One package flag per target, the fuzz features enabled for all of
    /// them, and the instrumentation environment of the selected mode.
    pub fn invocation(&self, catalog: &Catalog) -> ToolInvocation {
        let mut invocation =
            ToolInvocation::new(self.settings.program.clone()).args(self.settings.args_prefix.iter().cloned());
        if !self.settings.features.is_empty() {
            invocation = invocation
                .arg("--features")
                .arg(self.settings.features.join(","));
        }
        for target in catalog {
            invocation = invocation.arg("-p").arg(target.name());
        }
        self.env.apply(invocation)
    }

    /// Runs the build. A non-zero exit is returned as
    /// [`CampaignError::BuildFailure`] and never retried.
    pub fn build<R: ToolRunner + ?Sized>(
        &self,
        runner: &mut R,
        catalog: &Catalog,
    ) -> Result<(), CampaignError> {
        let invocation = self.invocation(catalog);
        info!(
            "building {} fuzz targets ({} instrumentation)",
            catalog.len(),
            self.env.mode()
        );
        let status = runner.status(&invocation)?;
        if !status.success() {
            error!("build failed: {invocation}");
            return Err(CampaignError::BuildFailure {
                tool: invocation.program,
                status,
            });
        }
        Ok(())
    }
}
