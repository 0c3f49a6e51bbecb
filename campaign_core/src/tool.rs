use crate::error::CampaignError;
use log::debug;
use std::fmt;
use std::process::{Command, ExitStatus};

/// A fully described external tool call.
///
/// The environment is recorded as explicit removals followed by explicit
/// assignments, applied only to the child. The orchestrator's own process
/// environment is never modified.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub env_remove: Vec<String>,
    pub env_set: Vec<(String, String)>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The last operation on a key wins.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.env_remove.retain(|k| *k != key);
        self.env_set.retain(|(k, _)| *k != key);
        self.env_set.push((key, value.into()));
        self
    }

    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.env_set.retain(|(k, _)| *k != key);
        if !self.env_remove.contains(&key) {
            self.env_remove.push(key);
        }
        self
    }

    /// Value the child will see for `key`, or `None` if unset.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env_set
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for key in &self.env_remove {
            cmd.env_remove(key);
        }
        for (key, value) in &self.env_set {
            cmd.env(key, value);
        }
        cmd
    }
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env_set {
            write!(f, "{key}=\"{value}\" ")?;
        }
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Runs external tools to completion.
pub trait ToolRunner {
    fn status(&mut self, invocation: &ToolInvocation) -> Result<ExitStatus, CampaignError>;
}

/// Spawns the tool as a child process and waits for it.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn status(&mut self, invocation: &ToolInvocation) -> Result<ExitStatus, CampaignError> {
        debug!("running: {invocation}");
        invocation
            .to_command()
            .status()
            .map_err(|source| CampaignError::ToolLaunch {
                tool: invocation.program.clone(),
                source,
            })
    }
}
