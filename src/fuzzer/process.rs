// src/fuzzer/process.rs
//
// Blocking subprocess execution with a hard deadline.

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;
use wait_timeout::ChildExt;

#[derive(Debug)]
pub struct ProcessOutput {
    /// `None` when the deadline fired and the child was killed.
    pub status: Option<ExitStatus>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn timed_out(&self) -> bool {
        self.status.is_none()
    }

    pub fn success(&self) -> bool {
        self.status.map(|s| s.success()).unwrap_or(false)
    }
}

/// Runs `cmd` to completion or until `timeout` elapses.
///
/// Output pipes are drained on their own threads so a chatty child cannot
/// block on a full pipe while we wait on it.
pub fn run_with_timeout(mut cmd: Command, timeout: Duration) -> io::Result<ProcessOutput> {
    debug!(command = ?cmd, timeout_secs = timeout.as_secs(), "spawning");

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let out_reader = drain(child.stdout.take());
    let err_reader = drain(child.stderr.take());

    let status = match child.wait_timeout(timeout)? {
        Some(status) => Some(status),
        None => {
            kill_and_reap(&mut child);
            None
        }
    };

    Ok(ProcessOutput {
        status,
        stdout: join(out_reader),
        stderr: join(err_reader),
    })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut p| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = p.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

fn kill_and_reap(child: &mut Child) {
    // Already-exited races are fine; either way wait() reaps it.
    let _ = child.kill();
    let _ = child.wait();
}
