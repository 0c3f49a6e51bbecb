//! Recording doubles for the tool, session and clock seams.

use crate::error::CampaignError;
use crate::scheduler::Sleeper;
use crate::session::SessionManager;
use crate::tool::{ToolInvocation, ToolRunner};
use std::collections::HashSet;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::Duration;

/// Records every invocation. Calls whose program or any argument equals the
/// configured token exit with the configured code; everything else succeeds.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    pub calls: Vec<ToolInvocation>,
    failing: Option<(String, i32)>,
}

impl RecordingRunner {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn failing_on(token: &str, code: i32) -> Self {
        Self {
            calls: Vec::new(),
            failing: Some((token.to_string(), code)),
        }
    }
}

impl ToolRunner for RecordingRunner {
    fn status(&mut self, invocation: &ToolInvocation) -> Result<ExitStatus, CampaignError> {
        self.calls.push(invocation.clone());
        let code = match &self.failing {
            Some((token, code))
                if invocation.program == *token || invocation.args.iter().any(|a| a == token) =>
            {
                *code
            }
            _ => 0,
        };
        // wait(2) encoding: exit code in the second byte
        Ok(ExitStatus::from_raw(code << 8))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Ensure(String),
    Reused(String),
    Send(String, String),
    Terminate(String),
}

/// In-memory session manager logging every operation.
#[derive(Debug, Default)]
pub struct RecordingSessions {
    pub events: Vec<SessionEvent>,
    pub alive: HashSet<String>,
    pub strict: bool,
    /// Every `send_text` fails once set.
    pub refuse_input: bool,
}

impl RecordingSessions {
    pub fn with_alive(names: &[&str]) -> Self {
        Self {
            alive: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }
}

impl SessionManager for RecordingSessions {
    type Handle = String;

    fn ensure_session(&mut self, name: &str) -> Result<String, CampaignError> {
        if self.alive.contains(name) {
            if self.strict {
                return Err(CampaignError::SessionAlreadyRunning {
                    name: name.to_string(),
                });
            }
            self.events.push(SessionEvent::Reused(name.to_string()));
        } else {
            self.alive.insert(name.to_string());
            self.events.push(SessionEvent::Ensure(name.to_string()));
        }
        Ok(name.to_string())
    }

    fn send_text(&mut self, handle: &String, text: &str) -> Result<(), CampaignError> {
        if self.refuse_input {
            return Err(CampaignError::Session {
                name: handle.clone(),
                reason: "input refused".to_string(),
            });
        }
        self.events
            .push(SessionEvent::Send(handle.clone(), text.to_string()));
        Ok(())
    }

    fn terminate(&mut self, handle: String) -> Result<(), CampaignError> {
        self.alive.remove(&handle);
        self.events.push(SessionEvent::Terminate(handle));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingSleeper {
    pub naps: Vec<Duration>,
}

impl RecordingSleeper {
    pub fn total(&self) -> Duration {
        self.naps.iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&mut self, duration: Duration) {
        self.naps.push(duration);
    }
}
