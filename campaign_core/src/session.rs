use crate::error::CampaignError;
use crate::tool::{ToolInvocation, ToolRunner};
use log::{debug, info, warn};
use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::io::Write;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};

/// Submitted as its own delivery after every command line.
pub const LINE_TERMINATOR: &str = "\n";

/// Named, persistent execution contexts that keep running independently of
/// the orchestrator's own control flow.
///
/// Nothing is read back from a session. Fuzz runs report through the
/// filesystem only.
pub trait SessionManager {
    type Handle;

    /// Returns the live session called `name`, creating a detached one if
    /// there is none. An existing session is reused as is; its workload is
    /// not inspected.
    fn ensure_session(&mut self, name: &str) -> Result<Self::Handle, CampaignError>;

    /// Delivers raw text into the session's input, as if typed.
    fn send_text(&mut self, handle: &Self::Handle, text: &str) -> Result<(), CampaignError>;

    /// Delivers `command_line` and then submits it with a separate terminator
    /// delivery.
    fn send_command(
        &mut self,
        handle: &Self::Handle,
        command_line: &str,
    ) -> Result<(), CampaignError> {
        self.send_text(handle, command_line)?;
        self.send_text(handle, LINE_TERMINATOR)
    }

    /// Asks the session to end without waiting for its processes to exit.
    fn terminate(&mut self, handle: Self::Handle) -> Result<(), CampaignError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenSession {
    name: String,
}

impl ScreenSession {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Sessions backed by GNU screen.
#[derive(Debug)]
pub struct ScreenSessions<R: ToolRunner> {
    runner: R,
    program: String,
    strict: bool,
}

impl<R: ToolRunner> ScreenSessions<R> {
    pub fn new(runner: R, strict: bool) -> Self {
        Self {
            runner,
            program: "screen".to_string(),
            strict,
        }
    }

    fn screen(&self, name: &str) -> ToolInvocation {
        ToolInvocation::new(self.program.clone()).args(["-S", name])
    }

    fn is_alive(&mut self, name: &str) -> Result<bool, CampaignError> {
        let query = self.screen(name).args(["-Q", "select", "."]);
        Ok(self.runner.status(&query)?.success())
    }
}

impl<R: ToolRunner> SessionManager for ScreenSessions<R> {
    type Handle = ScreenSession;

    fn ensure_session(&mut self, name: &str) -> Result<ScreenSession, CampaignError> {
        if self.is_alive(name)? {
            if self.strict {
                return Err(CampaignError::SessionAlreadyRunning {
                    name: name.to_string(),
                });
            }
            debug!("reusing running screen session `{name}`");
        } else {
            let create = ToolInvocation::new(self.program.clone()).args(["-dmS", name]);
            let status = self.runner.status(&create)?;
            if !status.success() {
                return Err(CampaignError::Session {
                    name: name.to_string(),
                    reason: format!("`{create}` failed with {status}"),
                });
            }
        }
        Ok(ScreenSession {
            name: name.to_string(),
        })
    }

    fn send_text(&mut self, handle: &ScreenSession, text: &str) -> Result<(), CampaignError> {
        let stuff = self
            .screen(&handle.name)
            .args(["-p", "0", "-X", "stuff", text]);
        let status = self.runner.status(&stuff)?;
        if !status.success() {
            return Err(CampaignError::Session {
                name: handle.name.clone(),
                reason: format!("could not deliver input ({status})"),
            });
        }
        Ok(())
    }

    fn terminate(&mut self, handle: ScreenSession) -> Result<(), CampaignError> {
        let quit = self.screen(&handle.name).args(["-X", "quit"]);
        let status = self.runner.status(&quit)?;
        if !status.success() {
            warn!("screen session `{}` did not acknowledge quit ({status})", handle.name);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessSession {
    pgid: i32,
}

impl ProcessSession {
    pub fn pgid(&self) -> i32 {
        self.pgid
    }
}

/// Sessions backed by a shell leading its own process group.
///
/// The shell reads command lines from a pipe. Termination signals the whole
/// group, so the fuzzing engine started from the shell goes down with it.
#[derive(Debug)]
pub struct ProcessSessions {
    shell: String,
    strict: bool,
    live: HashMap<String, Child>,
    retired: Vec<Child>,
}

impl ProcessSessions {
    pub fn new(shell: impl Into<String>, strict: bool) -> Self {
        Self {
            shell: shell.into(),
            strict,
            live: HashMap::new(),
            retired: Vec::new(),
        }
    }

    fn reap_retired(&mut self) {
        self.retired
            .retain_mut(|child| matches!(child.try_wait(), Ok(None)));
    }

    fn session_mut(&mut self, handle: &ProcessSession) -> Option<(&String, &mut Child)> {
        self.live
            .iter_mut()
            .find(|(_, child)| child.id() as i32 == handle.pgid)
    }
}

impl SessionManager for ProcessSessions {
    type Handle = ProcessSession;

    fn ensure_session(&mut self, name: &str) -> Result<ProcessSession, CampaignError> {
        self.reap_retired();
        if let Some(child) = self.live.get_mut(name) {
            if child.try_wait()?.is_none() {
                if self.strict {
                    return Err(CampaignError::SessionAlreadyRunning {
                        name: name.to_string(),
                    });
                }
                debug!("reusing running session `{name}`");
                return Ok(ProcessSession {
                    pgid: child.id() as i32,
                });
            }
            self.live.remove(name);
        }

        let child = Command::new(&self.shell)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()
            .map_err(|source| CampaignError::ToolLaunch {
                tool: self.shell.clone(),
                source,
            })?;
        let pgid = child.id() as i32;
        info!("started session `{name}` (process group {pgid})");
        self.live.insert(name.to_string(), child);
        Ok(ProcessSession { pgid })
    }

    fn send_text(&mut self, handle: &ProcessSession, text: &str) -> Result<(), CampaignError> {
        let (name, child) = self
            .session_mut(handle)
            .ok_or_else(|| CampaignError::Session {
                name: handle.pgid.to_string(),
                reason: "no such session".to_string(),
            })?;
        let name = name.clone();
        let stdin = child.stdin.as_mut().ok_or_else(|| CampaignError::Session {
            name: name.clone(),
            reason: "session input is closed".to_string(),
        })?;
        stdin
            .write_all(text.as_bytes())
            .and_then(|_| stdin.flush())
            .map_err(|e| CampaignError::Session {
                name,
                reason: format!("could not deliver input: {e}"),
            })
    }

    fn terminate(&mut self, handle: ProcessSession) -> Result<(), CampaignError> {
        let name = self.session_mut(&handle).map(|(name, _)| name.clone());
        match killpg(Pid::from_raw(handle.pgid), Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => warn!("failed to signal process group {}: {e}", handle.pgid),
        }
        if let Some(mut child) = name.and_then(|name| self.live.remove(&name)) {
            drop(child.stdin.take());
            self.retired.push(child);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingRunner;
    use std::path::Path;
    use std::time::{Duration, Instant};

    fn wait_for(path: &Path) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if path.exists() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn screen_creates_session_when_none_is_running() {
        let mut sessions = ScreenSessions::new(RecordingRunner::failing_on("select", 1), false);
        sessions.ensure_session("rspversion").unwrap();
        let calls = &sessions.runner.calls;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].program, "screen");
        assert_eq!(calls[1].args, vec!["-dmS", "rspversion"]);
    }

    #[test]
    fn screen_reports_failed_creation() {
        let mut sessions = ScreenSessions::new(RecordingRunner::failing_on("screen", 1), false);
        assert!(matches!(
            sessions.ensure_session("rspversion"),
            Err(CampaignError::Session { .. })
        ));
    }

    #[test]
    fn screen_command_layout() {
        let mut sessions = ScreenSessions::new(RecordingRunner::succeeding(), false);
        let handle = sessions.ensure_session("rspversion").unwrap();
        sessions.send_command(&handle, "cargo afl fuzz").unwrap();
        sessions.terminate(handle).unwrap();

        let calls: Vec<Vec<String>> = sessions
            .runner
            .calls
            .iter()
            .map(|c| c.args.clone())
            .collect();
        // the liveness query succeeded, so the running session was reused
        assert_eq!(
            calls,
            vec![
                vec!["-S", "rspversion", "-Q", "select", "."],
                vec!["-S", "rspversion", "-p", "0", "-X", "stuff", "cargo afl fuzz"],
                vec!["-S", "rspversion", "-p", "0", "-X", "stuff", "\n"],
                vec!["-S", "rspversion", "-X", "quit"],
            ]
        );
    }

    #[test]
    fn screen_strict_mode_refuses_running_session() {
        let mut sessions = ScreenSessions::new(RecordingRunner::succeeding(), true);
        match sessions.ensure_session("rspversion") {
            Err(CampaignError::SessionAlreadyRunning { name }) => assert_eq!(name, "rspversion"),
            other => panic!("Expected SessionAlreadyRunning, got {other:?}"),
        }
    }

    #[test]
    fn process_session_runs_delivered_commands() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let mut sessions = ProcessSessions::new("sh", false);

        let handle = sessions.ensure_session("rspversion").unwrap();
        sessions
            .send_command(&handle, &format!("touch '{}'", marker.display()))
            .unwrap();
        assert!(wait_for(&marker), "command was not executed by the session");
        sessions.terminate(handle).unwrap();
    }

    #[test]
    fn process_session_is_reused_while_alive() {
        let mut sessions = ProcessSessions::new("sh", false);
        let first = sessions.ensure_session("reqversion").unwrap();
        let second = sessions.ensure_session("reqversion").unwrap();
        assert_eq!(first, second);
        sessions.terminate(first).unwrap();

        let third = sessions.ensure_session("reqversion").unwrap();
        assert_ne!(third, first);
        sessions.terminate(third).unwrap();
    }

    #[test]
    fn process_strict_mode_refuses_running_session() {
        let mut sessions = ProcessSessions::new("sh", true);
        let handle = sessions.ensure_session("rspdigest").unwrap();
        assert!(matches!(
            sessions.ensure_session("rspdigest"),
            Err(CampaignError::SessionAlreadyRunning { .. })
        ));
        sessions.terminate(handle).unwrap();
    }

    #[test]
    fn terminate_stops_long_running_commands() {
        let mut sessions = ProcessSessions::new("sh", false);
        let handle = sessions.ensure_session("rspchallenge").unwrap();
        sessions.send_command(&handle, "sleep 30").unwrap();
        let started = Instant::now();
        sessions.terminate(handle).unwrap();
        assert!(started.elapsed() < Duration::from_secs(1), "terminate must not block");

        let deadline = Instant::now() + Duration::from_secs(5);
        while !sessions.retired.is_empty() && Instant::now() < deadline {
            sessions.reap_retired();
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(sessions.retired.is_empty(), "session shell survived SIGTERM");
    }
}
