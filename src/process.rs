//! External process management.
//!
//! Wraps `std::process::Child` with incremental output capture and an
//! interrupt-then-kill stop escalation. Every daemon this crate spawns
//! (hostapd, dnsmasq, wpa_supplicant, aireplay-ng) goes through here.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::cleanup::Teardown;
use crate::error::{AttackError, Result};

/// A spawned external process with captured output.
pub struct ChildProcess {
    name: String,
    child: Child,
    output: Arc<Mutex<String>>,
    readers: Vec<thread::JoinHandle<()>>,
}

impl ChildProcess {
    /// Spawn a command with stdout and stderr piped into a shared buffer.
    pub fn spawn(name: &str, program: &str, args: &[&str]) -> Result<Self> {
        tracing::debug!(name, program, ?args, "spawning external process");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AttackError::external(format!("spawn {program}: {e}")))?;

        let output = Arc::new(Mutex::new(String::new()));
        let mut readers = Vec::new();

        if let Some(stdout) = child.stdout.take() {
            readers.push(Self::reader_thread(stdout, Arc::clone(&output)));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(Self::reader_thread(stderr, Arc::clone(&output)));
        }

        Ok(Self {
            name: name.to_string(),
            child,
            output,
            readers,
        })
    }

    /// Spawn a command with stdout and stderr appended to a log file. Used
    /// for daemons whose output is consumed by tailing the file, not from
    /// memory.
    pub fn spawn_to_log(
        name: &str,
        program: &str,
        args: &[&str],
        log_path: &std::path::Path,
    ) -> Result<Self> {
        tracing::debug!(name, program, log = %log_path.display(), "spawning external process");

        let log = std::fs::File::create(log_path)?;
        let log_err = log.try_clone()?;
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn()
            .map_err(|e| AttackError::external(format!("spawn {program}: {e}")))?;

        Ok(Self {
            name: name.to_string(),
            child,
            output: Arc::new(Mutex::new(String::new())),
            readers: Vec::new(),
        })
    }

    fn reader_thread<R: Read + Send + 'static>(
        mut source: R,
        sink: Arc<Mutex<String>>,
    ) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match source.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                        if let Ok(mut sink) = sink.lock() {
                            sink.push_str(&chunk);
                        }
                    }
                }
            }
        })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Non-blocking exit check; `None` while the process is still running.
    pub fn poll(&mut self) -> Option<ExitStatus> {
        self.child.try_wait().ok().flatten()
    }

    /// Everything the process has written to stdout/stderr so far.
    pub fn output_snapshot(&self) -> String {
        self.output.lock().map(|o| o.clone()).unwrap_or_default()
    }

    /// Send SIGINT to the process.
    pub fn interrupt(&mut self) -> Result<()> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(self.child.id() as i32);
            kill(pid, Signal::SIGINT)
                .map_err(|e| AttackError::external(format!("SIGINT {}: {e}", self.name)))?;
        }
        #[cfg(not(unix))]
        {
            self.child
                .kill()
                .map_err(|e| AttackError::external(format!("kill {}: {e}", self.name)))?;
        }
        Ok(())
    }

    /// Force-kill the process.
    pub fn kill(&mut self) -> Result<()> {
        self.child
            .kill()
            .map_err(|e| AttackError::external(format!("kill {}: {e}", self.name)))?;
        Ok(())
    }

    /// Stop the process: SIGINT, wait up to `grace`, then SIGKILL.
    pub fn stop_with_grace(&mut self, grace: Duration) -> Result<()> {
        if self.poll().is_some() {
            self.join_readers();
            return Ok(());
        }

        self.interrupt().ok();

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if self.poll().is_some() {
                self.join_readers();
                return Ok(());
            }
            thread::sleep(Duration::from_millis(50));
        }

        tracing::warn!(name = %self.name, "process ignored SIGINT, killing");
        self.kill()?;
        let _ = self.child.wait();
        self.join_readers();
        Ok(())
    }

    fn join_readers(&mut self) {
        for handle in self.readers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Teardown for ChildProcess {
    fn stop(&mut self) -> Result<()> {
        self.stop_with_grace(Duration::from_secs(1))
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        if self.poll().is_none() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
        self.join_readers();
    }
}

/// Run a command to completion, failing on a non-zero exit status.
pub fn run_cmd(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| AttackError::external(format!("failed to run {program} {args:?}: {e}")))?;
    if !output.status.success() {
        return Err(AttackError::external(format!(
            "{program} {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Check whether a tool is resolvable on PATH.
pub fn tool_available(tool: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {tool} >/dev/null 2>&1"))
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// PIDs of processes whose command line matches `pattern`.
pub fn pgrep_pattern(pattern: &str) -> Vec<i32> {
    let output = match Command::new("pgrep").arg("-f").arg(pattern).output() {
        Ok(output) if output.status.success() => output,
        _ => return Vec::new(),
    };
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect()
}

/// PIDs of processes whose executable name is exactly `name`.
pub fn pgrep_exact(name: &str) -> Vec<i32> {
    let output = match Command::new("pgrep").arg("-x").arg(name).output() {
        Ok(output) if output.status.success() => output,
        _ => return Vec::new(),
    };
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect()
}

/// Force-kill a PID found via pgrep.
pub fn kill_pid(pid: i32) -> Result<()> {
    run_cmd("kill", &["-9", &pid.to_string()]).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_and_capture_output() {
        let mut proc = ChildProcess::spawn("echo", "sh", &["-c", "echo captured-line"]).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while proc.poll().is_none() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        // Joining the readers guarantees the pipe is fully drained.
        proc.stop_with_grace(Duration::from_millis(100)).unwrap();
        assert!(proc.output_snapshot().contains("captured-line"));
    }

    #[test]
    fn test_stop_escalation_kills_stubborn_process() {
        let mut proc =
            ChildProcess::spawn("sleeper", "sh", &["-c", "trap '' INT; sleep 30"]).unwrap();
        proc.stop_with_grace(Duration::from_millis(200)).unwrap();
        assert!(proc.poll().is_some());
    }

    #[test]
    fn test_tool_available() {
        assert!(tool_available("sh"));
        assert!(!tool_available("definitely-not-a-real-tool-xyz"));
    }
}
