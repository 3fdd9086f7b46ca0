//! Discovery source backed by an external scraper program.
//!
//! Each search spawns `<program> <args..> --topic <topic> --keyword <keyword>`
//! and reads channel identifiers from stdout, one per line. A line may be a
//! bare name or link (`@name`, `t.me/name`), a JSON string, or a JSON object
//! with a `username`, `channel` or `url` field.

use std::{collections::VecDeque, path::PathBuf, process::Stdio, sync::Arc, time::Duration};

use async_trait::async_trait;
use mlk_core::{
    domain::ChannelId,
    errors::{ProviderError, ProviderResult},
    ports::DiscoverySource,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
    sync::Mutex,
};
use tracing::{debug, info, warn};

const STDERR_TAIL_MAX_BYTES: usize = 16 * 1024;
const STDERR_TAIL_MAX_LINES: usize = 200;

#[derive(Clone, Debug)]
pub struct ScraperCliSource {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

#[derive(Clone, Debug, Default)]
struct StderrTail {
    lines: VecDeque<String>,
    bytes: usize,
}

impl StderrTail {
    fn push_line(&mut self, line: String) {
        // +1 for the '\n' we join with later.
        self.bytes = self.bytes.saturating_add(line.len() + 1);
        self.lines.push_back(line);

        while self.lines.len() > STDERR_TAIL_MAX_LINES || self.bytes > STDERR_TAIL_MAX_BYTES {
            if let Some(front) = self.lines.pop_front() {
                self.bytes = self.bytes.saturating_sub(front.len() + 1);
            } else {
                break;
            }
        }
    }

    fn snapshot(&self) -> String {
        self.lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

impl ScraperCliSource {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    async fn run_once(&self, topic: &str, keyword: &str) -> ProviderResult<Vec<ChannelId>> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("--topic")
            .arg(topic)
            .arg("--keyword")
            .arg(keyword)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            ProviderError::Transport(format!(
                "failed to start scraper {}: {e}",
                self.program.display()
            ))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProviderError::transport("scraper stdout was not captured"))?;

        // Drain stderr in background to avoid blocking on a full pipe.
        let stderr_tail = Arc::new(Mutex::new(StderrTail::default()));
        let stderr_task = child.stderr.take().map(|stderr| {
            let tail = stderr_tail.clone();
            tokio::spawn(async move {
                let mut r = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = r.next_line().await {
                    tail.lock().await.push_line(line);
                }
            })
        });

        let collect = async {
            let mut found = Vec::new();
            let mut reader = BufReader::new(stdout).lines();
            while let Some(line) = reader
                .next_line()
                .await
                .map_err(|e| ProviderError::Transport(format!("scraper stdout read failed: {e}")))?
            {
                match parse_line(&line) {
                    Some(id) => found.push(id),
                    None if !line.trim().is_empty() => {
                        debug!(line = %truncate_text(&line, 200), "unrecognized scraper output")
                    }
                    None => {}
                }
            }
            let status = child
                .wait()
                .await
                .map_err(|e| ProviderError::Transport(format!("scraper wait failed: {e}")))?;
            Ok::<_, ProviderError>((found, status))
        };

        let (found, status) = match tokio::time::timeout(self.timeout, collect).await {
            Ok(res) => res?,
            Err(_) => {
                // `child` is killed on drop (kill_on_drop).
                return Err(ProviderError::Transport(format!(
                    "scraper timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        if !status.success() {
            if let Some(task) = stderr_task {
                let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
            }
            let stderr = stderr_tail.lock().await.snapshot();
            if found.is_empty() {
                // The scraper ran but this search failed; not a backend outage.
                return Err(ProviderError::NotFound(format!(
                    "scraper exited with status {status}: {}",
                    truncate_text(&stderr, 500)
                )));
            }
            warn!(%status, "scraper exited with an error, keeping partial results");
        }

        Ok(dedupe(found))
    }
}

#[async_trait]
impl DiscoverySource for ScraperCliSource {
    async fn search(&self, topic: &str, keyword: &str) -> ProviderResult<Vec<ChannelId>> {
        let found = self.run_once(topic, keyword).await?;
        info!(topic, keyword, count = found.len(), "scraper search finished");
        Ok(found)
    }
}

/// Parse one line of scraper output into a channel identifier.
pub fn parse_line(line: &str) -> Option<ChannelId> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if line.starts_with('{') || line.starts_with('"') {
        let value: serde_json::Value = serde_json::from_str(line).ok()?;
        return match value {
            serde_json::Value::String(s) => ChannelId::parse(&s),
            serde_json::Value::Object(map) => ["username", "channel", "url"]
                .iter()
                .filter_map(|k| map.get(*k).and_then(|v| v.as_str()))
                .find_map(ChannelId::parse),
            _ => None,
        };
    }
    ChannelId::parse(line)
}

/// Keep first occurrences, preserving order.
fn dedupe(ids: Vec<ChannelId>) -> Vec<ChannelId> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

fn truncate_text(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut out = s.chars().take(max_len).collect::<String>();
    out.push_str("...");
    out
}
