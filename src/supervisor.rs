//! Runs a production cycle as a child process and streams its output.
//!
//! The caller owns the [`ProductionHandle`]; there is no process-wide "current
//! job". Cancelling kills the child, so a cancelled cycle leaves the scheduler
//! record at its last committed values.

use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

pub type LogSink = Arc<dyn Fn(&str) + Send + Sync + 'static>;

/// Exit code reported for a child ended by a signal (including `cancel`).
pub const SIGNALLED_EXIT: i32 = 130;

const LOG_MAX_LINES: usize = 500;

/// Bounded tail of the child's output.
#[derive(Clone, Default)]
pub struct LogBuffer {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl LogBuffer {
    pub fn push(&self, line: &str) {
        let mut guard = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        if guard.len() >= LOG_MAX_LINES {
            guard.pop_front();
        }
        guard.push_back(line.to_string());
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

pub struct ProductionHandle {
    child: Child,
    pumps: Vec<JoinHandle<()>>,
}

fn pump<R>(reader: R, sink: LogSink) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            sink(&line);
        }
    })
}

/// Spawns `program args..` with stdout and stderr forwarded line by line to
/// `sink`.
pub fn start_production(program: &str, args: &[String], sink: LogSink) -> Result<ProductionHandle> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to start {}", program))?;

    let mut pumps = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        pumps.push(pump(stdout, Arc::clone(&sink)));
    }
    if let Some(stderr) = child.stderr.take() {
        pumps.push(pump(stderr, sink));
    }
    Ok(ProductionHandle { child, pumps })
}

impl ProductionHandle {
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Kills the child. Safe to call after it has already exited.
    pub async fn cancel(&mut self) -> Result<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        self.child.kill().await.context("failed to kill production process")
    }

    /// Waits for exit and for all output to be delivered.
    pub async fn wait(&mut self) -> Result<i32> {
        let status = self.child.wait().await.context("waiting for production process")?;
        for pump in self.pumps.drain(..) {
            let _ = pump.await;
        }
        Ok(status.code().unwrap_or(SIGNALLED_EXIT))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn collecting_sink() -> (LogBuffer, LogSink) {
        let buffer = LogBuffer::default();
        let clone = buffer.clone();
        (buffer, Arc::new(move |line: &str| clone.push(line)))
    }

    #[tokio::test]
    async fn streams_both_pipes_and_reports_exit_code() {
        let (buffer, sink) = collecting_sink();
        let args = vec!["-c".to_string(), "echo out-line; echo err-line 1>&2; exit 3".to_string()];
        let mut handle = start_production("sh", &args, sink).unwrap();

        assert_eq!(handle.wait().await.unwrap(), 3);
        let mut lines = buffer.snapshot();
        lines.sort();
        assert_eq!(lines, vec!["err-line".to_string(), "out-line".to_string()]);
    }

    #[tokio::test]
    async fn cancel_kills_a_running_child() {
        let (_buffer, sink) = collecting_sink();
        let args = vec!["-c".to_string(), "exec sleep 30".to_string()];
        let mut handle = start_production("sh", &args, sink).unwrap();
        assert!(handle.id().is_some());

        handle.cancel().await.unwrap();
        assert_eq!(handle.wait().await.unwrap(), SIGNALLED_EXIT);
        handle.cancel().await.unwrap();
    }

    #[test]
    fn buffer_keeps_only_the_tail() {
        let buffer = LogBuffer::default();
        for i in 0..(LOG_MAX_LINES + 5) {
            buffer.push(&i.to_string());
        }
        let lines = buffer.snapshot();
        assert_eq!(lines.len(), LOG_MAX_LINES);
        assert_eq!(lines[0], "5");
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let (_buffer, sink) = collecting_sink();
        assert!(start_production("/definitely/not/here", &[], sink).is_err());
    }
}
