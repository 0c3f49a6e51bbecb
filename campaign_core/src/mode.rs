use crate::tool::ToolInvocation;
use log::debug;
use std::fmt;

/// Command line token selecting source-based coverage.
pub const SOURCE_COVERAGE_TOKEN: &str = "Scoverage";
/// Command line token selecting profiling-based (gcov style) coverage.
pub const PROFILE_COVERAGE_TOKEN: &str = "Gcoverage";

/// Every variable any instrumentation mode may set. All of them are cleared
/// for the build before the selected mode's values are applied.
pub const INSTRUMENTATION_VARS: [&str; 4] = [
    "RUSTFLAGS",
    "RUSTDOCFLAGS",
    "CARGO_INCREMENTAL",
    "LLVM_PROFILE_FILE",
];

/// Variables the instrumented binaries read while fuzzing, as opposed to
/// compiler flags that only matter for the build.
pub const RUNTIME_VARS: [&str; 1] = ["LLVM_PROFILE_FILE"];

const SOURCE_COVERAGE_RUSTFLAGS: &str = "-C instrument-coverage";
const PROFILE_PATTERN: &str = "fuzz_run%m.profraw";
const PROFILE_COVERAGE_RUSTFLAGS: &str = "-Zprofile -Ccodegen-units=1 -Copt-level=0 -Clink-dead-code -Coverflow-checks=off -Zpanic_abort_tests -Cpanic=abort";
const PROFILE_COVERAGE_RUSTDOCFLAGS: &str = "-Cpanic=abort";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstrumentationMode {
    #[default]
    None,
    SourceCoverage,
    ProfileCoverage,
}

impl InstrumentationMode {
    /// Maps the optional positional argument to a mode.
    ///
    /// Anything that is not one of the two coverage tokens selects `None`;
    /// unknown values are not rejected.
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            Some(SOURCE_COVERAGE_TOKEN) => InstrumentationMode::SourceCoverage,
            Some(PROFILE_COVERAGE_TOKEN) => InstrumentationMode::ProfileCoverage,
            Some(other) => {
                debug!("unrecognised instrumentation mode `{other}`, building without coverage");
                InstrumentationMode::None
            }
            None => InstrumentationMode::None,
        }
    }

    pub fn is_coverage(self) -> bool {
        self != InstrumentationMode::None
    }

    pub fn env(self) -> InstrumentationEnv {
        let vars = match self {
            InstrumentationMode::None => vec![],
            InstrumentationMode::SourceCoverage => vec![
                ("RUSTFLAGS", SOURCE_COVERAGE_RUSTFLAGS.to_string()),
                ("LLVM_PROFILE_FILE", PROFILE_PATTERN.to_string()),
            ],
            InstrumentationMode::ProfileCoverage => vec![
                ("CARGO_INCREMENTAL", "0".to_string()),
                ("RUSTFLAGS", PROFILE_COVERAGE_RUSTFLAGS.to_string()),
                ("RUSTDOCFLAGS", PROFILE_COVERAGE_RUSTDOCFLAGS.to_string()),
            ],
        };
        InstrumentationEnv { mode: self, vars }
    }
}

impl fmt::Display for InstrumentationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstrumentationMode::None => "none",
            InstrumentationMode::SourceCoverage => "source-coverage",
            InstrumentationMode::ProfileCoverage => "profile-coverage",
        };
        f.write_str(name)
    }
}

/// The build environment derived from one [`InstrumentationMode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentationEnv {
    mode: InstrumentationMode,
    vars: Vec<(&'static str, String)>,
}

impl InstrumentationEnv {
    pub fn mode(&self) -> InstrumentationMode {
        self.mode
    }

    pub fn vars(&self) -> &[(&'static str, String)] {
        &self.vars
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The subset of this mode's values the fuzz runs need in their own
    /// environment.
    pub fn runtime_vars(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.vars
            .iter()
            .filter(|(k, _)| RUNTIME_VARS.contains(k))
            .map(|(k, v)| (*k, v.as_str()))
    }

    /// Clears every instrumentation variable on the invocation, then sets this
    /// mode's values. Switching modes is therefore never additive.
    pub fn apply(&self, mut invocation: ToolInvocation) -> ToolInvocation {
        for key in INSTRUMENTATION_VARS {
            invocation = invocation.env_remove(key);
        }
        for (key, value) in &self.vars {
            invocation = invocation.env(*key, value.clone());
        }
        invocation
    }
}
