//! Resumable position in the topic × keyword search space.

use std::{collections::BTreeMap, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ChannelId;

/// Persisted under `search_state`, together with the channels discovered this cycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCursor {
    pub topic_index: usize,
    pub keyword_index: usize,
    pub topics: Vec<String>,
    pub keywords: Vec<String>,
    pub session_id: String,
    pub cycle_start_time: DateTime<Utc>,
    #[serde(default)]
    pub last_search_time: Option<DateTime<Utc>>,
    /// Set between two cycles; no search runs before this instant.
    #[serde(default)]
    pub cooldown_until: Option<DateTime<Utc>>,
    /// Identifier → when it was validated and queued.
    #[serde(default)]
    pub discovered_channels: BTreeMap<ChannelId, DateTime<Utc>>,
}

impl SearchCursor {
    /// Fresh cycle at (0, 0) with nothing discovered yet.
    pub fn fresh(topics: Vec<String>, keywords: Vec<String>, now: DateTime<Utc>) -> Self {
        Self {
            topic_index: 0,
            keyword_index: 0,
            topics,
            keywords,
            session_id: format!("search_{}", now.timestamp()),
            cycle_start_time: now,
            last_search_time: None,
            cooldown_until: None,
            discovered_channels: BTreeMap::new(),
        }
    }

    /// The cycle that follows a full pass: fresh, but held back for `cooldown`.
    ///
    /// Keeps the last search time so a restart inside the window still resumes
    /// into the remaining cool-down.
    pub fn next_cycle(
        &self,
        topics: Vec<String>,
        keywords: Vec<String>,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Self {
        let mut next = Self::fresh(topics, keywords, now);
        next.last_search_time = self.last_search_time.or(Some(now));
        next.cooldown_until = Some(
            now + chrono::Duration::from_std(cooldown).unwrap_or_else(|_| chrono::Duration::zero()),
        );
        next
    }

    /// Time left before the next search may run.
    pub fn cooldown_remaining(&self, now: DateTime<Utc>) -> Duration {
        self.cooldown_until
            .and_then(|until| until.signed_duration_since(now).to_std().ok())
            .unwrap_or_default()
    }

    pub fn is_discovered(&self, channel: &ChannelId) -> bool {
        self.discovered_channels.contains_key(channel)
    }

    /// A persisted cursor is resumable when it searched within `staleness` of `now`.
    pub fn is_resumable(&self, now: DateTime<Utc>, staleness: Duration) -> bool {
        let Some(last) = self.last_search_time else {
            return false;
        };
        let Ok(staleness) = chrono::Duration::from_std(staleness) else {
            return false;
        };
        now.signed_duration_since(last) < staleness
    }

    pub fn is_empty_space(&self) -> bool {
        self.topics.is_empty() || self.keywords.is_empty()
    }

    /// Current `(topic, keyword)` pair, or `None` when exhausted.
    pub fn current(&self) -> Option<(&str, &str)> {
        let topic = self.topics.get(self.topic_index)?;
        let keyword = self.keywords.get(self.keyword_index)?;
        Some((topic.as_str(), keyword.as_str()))
    }

    /// Move to the next combination; keyword overflow advances the topic.
    pub fn advance(&mut self, now: DateTime<Utc>) {
        self.keyword_index += 1;
        if self.keyword_index >= self.keywords.len() {
            self.keyword_index = 0;
            self.topic_index += 1;
        }
        self.last_search_time = Some(now);
    }

    pub fn progress(&self, search_active: bool) -> Progress {
        let total = self.topics.len() * self.keywords.len();
        let current = self.topic_index * self.keywords.len() + self.keyword_index;
        let percent = if total > 0 {
            current as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        Progress {
            search_active,
            session_id: Some(self.session_id.clone()),
            current_topic: self.topics.get(self.topic_index).cloned(),
            current_keyword: self.keywords.get(self.keyword_index).cloned(),
            current_combination: current,
            total_combinations: total,
            progress_percent: percent,
            found_channels: self.discovered_channels.len(),
            cycle_start_time: Some(self.cycle_start_time),
            last_search_time: self.last_search_time,
            cooldown_until: self.cooldown_until,
        }
    }
}

/// Read-only discovery progress for the control layer.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Progress {
    pub search_active: bool,
    pub session_id: Option<String>,
    pub current_topic: Option<String>,
    pub current_keyword: Option<String>,
    pub current_combination: usize,
    pub total_combinations: usize,
    pub progress_percent: f64,
    pub found_channels: usize,
    pub cycle_start_time: Option<DateTime<Utc>>,
    pub last_search_time: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn wraps_keywords_into_topics_and_exhausts() {
        let mut c = SearchCursor::fresh(strings(&["A", "B"]), strings(&["x", "y", "z"]), t0());
        let mut seen = Vec::new();
        while let Some((t, k)) = c.current() {
            seen.push(format!("{t}{k}"));
            c.advance(t0());
        }
        assert_eq!(seen, vec!["Ax", "Ay", "Az", "Bx", "By", "Bz"]);
        assert!(c.current().is_none());
        assert_eq!((c.topic_index, c.keyword_index), (2, 0));
    }

    #[test]
    fn resumable_only_within_staleness() {
        let two_hours = Duration::from_secs(7200);
        let mut c = SearchCursor::fresh(strings(&["A"]), strings(&["x"]), t0());
        assert!(!c.is_resumable(t0(), two_hours), "never searched");

        c.last_search_time = Some(t0());
        assert!(c.is_resumable(t0() + chrono::Duration::minutes(119), two_hours));
        assert!(!c.is_resumable(t0() + chrono::Duration::minutes(121), two_hours));
    }

    #[test]
    fn progress_reports_position() {
        let mut c = SearchCursor::fresh(strings(&["A", "B"]), strings(&["x", "y"]), t0());
        c.advance(t0());
        c.advance(t0());
        c.advance(t0());
        let p = c.progress(true);
        assert_eq!(p.current_combination, 3);
        assert_eq!(p.total_combinations, 4);
        assert_eq!(p.progress_percent, 75.0);
        assert_eq!(p.current_topic.as_deref(), Some("B"));
        assert_eq!(p.current_keyword.as_deref(), Some("y"));
        assert_eq!(c.session_id, format!("search_{}", t0().timestamp()));
    }

    #[test]
    fn persisted_shape_survives_serde() {
        let mut c = SearchCursor::fresh(strings(&["A"]), strings(&["x"]), t0());
        c.discovered_channels
            .insert(ChannelId::parse("chan").unwrap(), t0());
        let txt = serde_json::to_string(&c).unwrap();
        assert!(txt.contains("\"@chan\""));
        let back: SearchCursor = serde_json::from_str(&txt).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn next_cycle_starts_empty_and_waits_out_the_cooldown() {
        let mut done = SearchCursor::fresh(strings(&["A"]), strings(&["x"]), t0());
        done.discovered_channels
            .insert(ChannelId::parse("seen").unwrap(), t0());
        done.advance(t0());
        assert!(done.current().is_none());

        let later = t0() + chrono::Duration::seconds(20);
        let next = done.next_cycle(strings(&["A"]), strings(&["x"]), later, Duration::from_secs(1800));
        assert_eq!((next.topic_index, next.keyword_index), (0, 0));
        assert!(next.discovered_channels.is_empty());
        assert_eq!(next.last_search_time, Some(t0()));
        assert_eq!(next.cooldown_remaining(later), Duration::from_secs(1800));
        assert_eq!(
            next.cooldown_remaining(later + chrono::Duration::seconds(1700)),
            Duration::from_secs(100)
        );
        assert_eq!(next.cooldown_remaining(later + chrono::Duration::hours(1)), Duration::ZERO);
        assert!(next.progress(true).cooldown_until.is_some());
    }
}
