//! Engagement settings and pacing constants.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{errors::Error, Result};

/// Inclusive `(min, max)` range, in whatever unit the field documents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range(pub u64, pub u64);

impl Range {
    pub fn new(a: u64, b: u64) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0 && self.1 == 0
    }

    pub fn min(&self) -> u64 {
        self.0.min(self.1)
    }

    pub fn max(&self) -> u64 {
        self.0.max(self.1)
    }
}

/// Operator-owned settings. The core reads them, never mutates them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// `None` disables the per-run channel cap.
    pub max_channels: Option<u32>,
    /// How many recent posts to engage per channel.
    pub posts_range: Range,
    /// Seconds between actions; `(0, 0)` disables the delay.
    pub delay_range: Range,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_channels: Some(150),
            posts_range: Range(1, 5),
            delay_range: Range(20, 1000),
            topics: Vec::new(),
            keywords: Vec::new(),
        }
    }
}

impl Settings {
    pub fn cap_reached(&self, processed: usize) -> bool {
        match self.max_channels {
            Some(max) => processed >= max as usize,
            None => false,
        }
    }

    /// Apply an operator settings block:
    ///
    /// ```text
    /// max channels: 150      (or ∞ / inf)
    /// posts: 1-5             (or a single number)
    /// delay: 20-1000         (or a single number, or _ for none)
    /// ```
    ///
    /// Unknown lines are ignored. Returns an error if no line was recognized or a
    /// recognized line has a malformed value.
    pub fn apply_text(&mut self, text: &str) -> Result<()> {
        let mut next = self.clone();
        let mut touched = false;

        for raw in text.lines() {
            let line = raw.trim().to_lowercase();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim().trim_end_matches("seconds").trim();

            if key.contains("max") && key.contains("channel") {
                next.max_channels = if value == "∞" || value == "inf" {
                    None
                } else {
                    Some(parse_num(value)? as u32)
                };
                touched = true;
            } else if key.contains("post") {
                next.posts_range = parse_range(value)?;
                if next.posts_range.max() == 0 {
                    return Err(Error::Config("posts must be at least 1".to_string()));
                }
                touched = true;
            } else if key.contains("delay") {
                next.delay_range = if value == "_" {
                    Range(0, 0)
                } else {
                    parse_range(value)?
                };
                touched = true;
            }
        }

        if !touched {
            return Err(Error::Config(
                "expected lines like `max channels: 150`, `posts: 1-5`, `delay: 20-1000`"
                    .to_string(),
            ));
        }

        *self = next;
        Ok(())
    }
}

fn parse_num(s: &str) -> Result<u64> {
    s.trim()
        .parse::<u64>()
        .map_err(|_| Error::Config(format!("invalid number: {s}")))
}

fn parse_range(s: &str) -> Result<Range> {
    match s.split_once('-') {
        Some((a, b)) => Ok(Range::new(parse_num(a)?, parse_num(b)?)),
        None => {
            let v = parse_num(s)?;
            Ok(Range(v, v))
        }
    }
}

/// Split an operator list (`a, b, c`) into trimmed non-empty entries.
pub fn parse_list(text: &str) -> Vec<String> {
    text.split([',', '\n'])
        .map(|s| s.trim().trim_matches('"').trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Pacing constants for the coordinator and worker.
#[derive(Clone, Copy, Debug)]
pub struct Timings {
    /// A persisted cursor older than this starts a fresh cycle.
    pub cursor_staleness: Duration,
    /// Randomized pause between two search combinations (seconds).
    pub search_delay: Range,
    /// Pause after a failed combination before moving on.
    pub search_error_backoff: Duration,
    /// Pause when the discovery backend is unreachable (same combination retried).
    pub transport_backoff: Duration,
    /// Pause after a full pass over the search space.
    pub cycle_cooldown: Duration,
    /// Pause when topics or keywords are empty.
    pub empty_space_wait: Duration,
    /// Randomized pause between validating two identifiers of one batch (seconds).
    pub validate_delay: Range,
    pub dequeue_timeout: Duration,
    /// Pause when the channel cap is reached.
    pub cap_wait: Duration,
    /// Backoff after an unexpected error in either main loop.
    pub loop_error_backoff: Duration,
    /// Randomized pause after joining a channel (seconds).
    pub join_delay: Range,
    pub discussion_join_delay: Duration,
    /// Randomized pause between a comment and its reaction (seconds).
    pub reaction_delay: Range,
    /// Randomized backoff between attempts on generic failures (seconds).
    pub retry_backoff: Range,
    pub max_attempts: u32,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            cursor_staleness: Duration::from_secs(2 * 60 * 60),
            search_delay: Range(10, 20),
            search_error_backoff: Duration::from_secs(30),
            transport_backoff: Duration::from_secs(60),
            cycle_cooldown: Duration::from_secs(1800),
            empty_space_wait: Duration::from_secs(300),
            validate_delay: Range(1, 3),
            dequeue_timeout: Duration::from_secs(10),
            cap_wait: Duration::from_secs(60),
            loop_error_backoff: Duration::from_secs(30),
            join_delay: Range(2, 5),
            discussion_join_delay: Duration::from_secs(2),
            reaction_delay: Range(2, 8),
            retry_backoff: Range(5, 10),
            max_attempts: 3,
        }
    }
}
