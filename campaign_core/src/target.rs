use crate::error::CampaignError;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// SPDM message handlers fuzzed by default, responder side first.
pub const SPDM_CATALOG: &[&str] = &[
    "rspversion",
    "rspcapability",
    "rspalgorithm",
    "rspdigest",
    "rspcertificate",
    "rspchallenge",
    "rspmeasurement",
    "rspkeyexchange",
    "rsppskexchange",
    "rspfinish",
    "rsppskfinish",
    "rspheartbeat",
    "rspkeyupdate",
    "rspendsession",
    "rspvendor",
    "reqversion",
    "reqcapability",
    "reqalgorithm",
    "reqdigest",
    "reqcertificate",
    "reqchallenge",
    "reqmeasurement",
    "reqkeyexchange",
    "reqpskexchange",
    "reqfinish",
    "reqpskfinish",
    "reqheartbeat",
    "reqkeyupdate",
    "reqendsession",
    "reqvendor",
];

/// A single fuzz target, identified by name.
///
/// Every location a target touches is derived from its name:
/// the seed corpus lives in `<catalog-root>/in/<name>`, findings go to
/// `<catalog-root>/out/<name>` and the instrumented binary is
/// `<build-root>/<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuzzTarget {
    name: String,
}

impl FuzzTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_dir(&self, catalog_root: &Path) -> PathBuf {
        catalog_root.join("in").join(&self.name)
    }

    pub fn output_dir(&self, catalog_root: &Path) -> PathBuf {
        catalog_root.join("out").join(&self.name)
    }

    /// Where the fuzzing engine drops inputs that made the target fault.
    pub fn crashes_dir(&self, catalog_root: &Path) -> PathBuf {
        self.output_dir(catalog_root).join("default").join("crashes")
    }

    pub fn binary(&self, build_root: &Path) -> PathBuf {
        build_root.join(&self.name)
    }
}

/// Ordered set of fuzz targets. The order is the execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    targets: Vec<FuzzTarget>,
}

impl Catalog {
    /// Builds a catalog, rejecting empty or duplicated names.
    pub fn new<I, S>(names: I) -> Result<Self, CampaignError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        for name in names {
            let name = name.into();
            if name.trim().is_empty() {
                return Err(CampaignError::Config(
                    "fuzz target names must not be empty".to_string(),
                ));
            }
            if !seen.insert(name.clone()) {
                return Err(CampaignError::Config(format!(
                    "fuzz target `{name}` is listed more than once"
                )));
            }
            targets.push(FuzzTarget::new(name));
        }
        Ok(Self { targets })
    }

    pub fn spdm() -> Self {
        Self {
            targets: SPDM_CATALOG.iter().map(|n| FuzzTarget::new(*n)).collect(),
        }
    }

    /// Keeps only the named targets, preserving catalog order.
    pub fn restrict(&self, names: &[String]) -> Result<Self, CampaignError> {
        if let Some(unknown) = names
            .iter()
            .find(|n| !self.targets.iter().any(|t| t.name() == n.as_str()))
        {
            return Err(CampaignError::Config(format!(
                "fuzz target `{unknown}` is not part of the catalog"
            )));
        }
        let targets = self
            .targets
            .iter()
            .filter(|t| names.iter().any(|n| n == t.name()))
            .cloned()
            .collect();
        Ok(Self { targets })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FuzzTarget> {
        self.targets.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.targets.iter().map(FuzzTarget::name).collect()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a FuzzTarget;
    type IntoIter = std::slice::Iter<'a, FuzzTarget>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
