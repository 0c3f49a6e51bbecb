use crate::error::CampaignError;
use crate::target::{Catalog, SPDM_CATALOG};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SessionBackend {
    #[default]
    Screen,
    Process,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct SessionSettings {
    #[serde(default)]
    pub backend: SessionBackend,
    /// Fail instead of reusing a session that is already alive.
    #[serde(default)]
    pub strict: bool,
    #[serde(default = "default_shell")]
    pub shell: String,
}

fn default_shell() -> String {
    "sh".to_string()
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            backend: SessionBackend::default(),
            strict: false,
            shell: default_shell(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ScheduleSettings {
    #[serde(default = "default_budget_secs")]
    pub per_target_budget_secs: u64,
    #[serde(default = "default_settle_secs")]
    pub settle_delay_secs: u64,
}

pub fn default_budget_secs() -> u64 {
    1800
}

pub fn default_settle_secs() -> u64 {
    5
}

impl ScheduleSettings {
    pub fn per_target_budget(&self) -> Duration {
        Duration::from_secs(self.per_target_budget_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            per_target_budget_secs: default_budget_secs(),
            settle_delay_secs: default_settle_secs(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct BuildSettings {
    #[serde(default = "default_build_program")]
    pub program: String,
    #[serde(default = "default_build_args_prefix")]
    pub args_prefix: Vec<String>,
    #[serde(default = "default_features")]
    pub features: Vec<String>,
}

fn default_build_program() -> String {
    "cargo".to_string()
}

fn default_build_args_prefix() -> Vec<String> {
    vec!["afl".to_string(), "build".to_string()]
}

fn default_features() -> Vec<String> {
    vec!["fuzz".to_string()]
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            program: default_build_program(),
            args_prefix: default_build_args_prefix(),
            features: default_features(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct FuzzSettings {
    /// Engine command line; `-i`, `-o` and the binary are appended.
    #[serde(default = "default_engine")]
    pub engine: Vec<String>,
}

fn default_engine() -> Vec<String> {
    vec!["cargo".to_string(), "afl".to_string(), "fuzz".to_string()]
}

impl Default for FuzzSettings {
    fn default() -> Self {
        Self {
            engine: default_engine(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct CoverageSettings {
    #[serde(default = "default_coverage_program")]
    pub program: String,
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
}

fn default_coverage_program() -> String {
    "grcov".to_string()
}

pub fn default_report_dir() -> PathBuf {
    PathBuf::from("target/debug/fuzz_coverage")
}

impl Default for CoverageSettings {
    fn default() -> Self {
        Self {
            program: default_coverage_program(),
            report_dir: default_report_dir(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct CampaignConfig {
    #[serde(default = "default_catalog_root")]
    pub catalog_root: PathBuf,
    #[serde(default = "default_build_root")]
    pub build_root: PathBuf,
    #[serde(default = "default_targets")]
    pub targets: Vec<String>,
    #[serde(default)]
    pub schedule: ScheduleSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub build: BuildSettings,
    #[serde(default)]
    pub fuzz: FuzzSettings,
    #[serde(default)]
    pub coverage: CoverageSettings,
}

pub fn default_catalog_root() -> PathBuf {
    PathBuf::from("fuzz-target")
}

pub fn default_build_root() -> PathBuf {
    PathBuf::from("target/debug")
}

fn default_targets() -> Vec<String> {
    SPDM_CATALOG.iter().map(|n| n.to_string()).collect()
}

impl CampaignConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, CampaignError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CampaignError::Config(format!(
                "failed to read config file at {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, CampaignError> {
        let config: CampaignConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Validated target catalog, in configured order.
    pub fn catalog(&self) -> Result<Catalog, CampaignError> {
        Catalog::new(self.targets.iter().cloned())
    }

    pub fn output_root(&self) -> PathBuf {
        self.catalog_root.join("out")
    }
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            catalog_root: default_catalog_root(),
            build_root: default_build_root(),
            targets: default_targets(),
            schedule: ScheduleSettings::default(),
            session: SessionSettings::default(),
            build: BuildSettings::default(),
            fuzz: FuzzSettings::default(),
            coverage: CoverageSettings::default(),
        }
    }
}
