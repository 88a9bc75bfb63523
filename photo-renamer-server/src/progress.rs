use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rand::{Rng, rng};
use regex::Regex;
use serde::Serialize;

static TOKEN_SHAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Starting,
    Processing,
    CreatingArchive,
    Complete,
    Failed,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub current: usize,
    pub total: usize,
    pub status: ProgressStatus,
    pub message: String,
}

impl ProgressSnapshot {
    pub fn not_found() -> Self {
        Self {
            current: 0,
            total: 0,
            status: ProgressStatus::NotFound,
            message: "Session not found".to_string(),
        }
    }
}

#[derive(Debug)]
struct Entry {
    snapshot: ProgressSnapshot,
    touched: Instant,
}

/// Per-session progress side channel. Entries expire `ttl` after their last update.
#[derive(Debug)]
pub struct ProgressTracker {
    entries: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
}

pub type SharedProgress = Arc<ProgressTracker>;

impl ProgressTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Accept a client-chosen token if well-formed, else mint a fresh one.
    pub fn token_from(client: Option<&str>) -> String {
        match client.map(str::trim) {
            Some(t) if TOKEN_SHAPE.is_match(t) => t.to_string(),
            _ => Self::new_token(),
        }
    }

    pub fn new_token() -> String {
        let suffix: u32 = rng().random();
        format!(
            "{}_{:08x}",
            chrono::Local::now().format("%Y%m%d_%H%M%S_%6f"),
            suffix
        )
    }

    pub fn start(&self, token: &str, total: usize) {
        self.sweep();
        let mut guard = self.entries.write();
        guard.insert(
            token.to_string(),
            Entry {
                snapshot: ProgressSnapshot {
                    current: 0,
                    total,
                    status: ProgressStatus::Starting,
                    message: "Initializing...".to_string(),
                },
                touched: Instant::now(),
            },
        );
    }

    /// Move the counter forward; `current` never decreases within a phase.
    /// A session still in `starting` moves to `processing`.
    pub fn advance(&self, token: &str, current: usize, message: impl Into<String>) {
        let mut guard = self.entries.write();
        if let Some(e) = guard.get_mut(token) {
            e.snapshot.current = e.snapshot.current.max(current);
            if e.snapshot.status == ProgressStatus::Starting {
                e.snapshot.status = ProgressStatus::Processing;
            }
            e.snapshot.message = message.into();
            e.touched = Instant::now();
        }
    }

    /// Start a new counted phase: `current` restarts at 0 out of `total`.
    pub fn enter_phase(
        &self,
        token: &str,
        status: ProgressStatus,
        total: usize,
        message: impl Into<String>,
    ) {
        let mut guard = self.entries.write();
        if let Some(e) = guard.get_mut(token) {
            e.snapshot = ProgressSnapshot {
                current: 0,
                total,
                status,
                message: message.into(),
            };
            e.touched = Instant::now();
        }
    }

    pub fn set_status(&self, token: &str, status: ProgressStatus, message: impl Into<String>) {
        let mut guard = self.entries.write();
        if let Some(e) = guard.get_mut(token) {
            e.snapshot.status = status;
            e.snapshot.message = message.into();
            e.touched = Instant::now();
        }
    }

    pub fn snapshot(&self, token: &str) -> Option<ProgressSnapshot> {
        let guard = self.entries.read();
        guard
            .get(token)
            .filter(|e| e.touched.elapsed() <= self.ttl)
            .map(|e| e.snapshot.clone())
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let mut guard = self.entries.write();
        let before = guard.len();
        let ttl = self.ttl;
        guard.retain(|_, e| e.touched.elapsed() <= ttl);
        before - guard.len()
    }

    pub fn active_sessions(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_and_monotonic_counter() {
        let t = ProgressTracker::new(Duration::from_secs(60));
        t.start("abc", 3);
        assert_eq!(t.snapshot("abc").unwrap().status, ProgressStatus::Starting);
        t.advance("abc", 2, "Processing b.jpg...");
        t.advance("abc", 1, "late update");
        let snap = t.snapshot("abc").unwrap();
        assert_eq!((snap.current, snap.total), (2, 3));
        assert_eq!(snap.status, ProgressStatus::Processing);
        t.set_status("abc", ProgressStatus::Complete, "Download ready!");
        assert_eq!(t.snapshot("abc").unwrap().status, ProgressStatus::Complete);
    }

    #[test]
    fn archive_phase_restarts_the_counter() {
        let t = ProgressTracker::new(Duration::from_secs(60));
        t.start("abc", 2);
        t.advance("abc", 2, "Processing b.jpg...");
        t.enter_phase("abc", ProgressStatus::CreatingArchive, 2, "Creating ZIP file...");
        let snap = t.snapshot("abc").unwrap();
        assert_eq!((snap.current, snap.total), (0, 2));
        t.advance("abc", 1, "Adding to ZIP: a.jpg (1/2)");
        let snap = t.snapshot("abc").unwrap();
        assert_eq!(snap.current, 1);
        assert_eq!(snap.status, ProgressStatus::CreatingArchive);
    }

    #[test]
    fn unknown_tokens_are_ignored() {
        let t = ProgressTracker::new(Duration::from_secs(60));
        t.advance("nope", 5, "x");
        assert!(t.snapshot("nope").is_none());
        assert_eq!(t.active_sessions(), 0);
    }

    #[test]
    fn sessions_do_not_interfere() {
        let t = ProgressTracker::new(Duration::from_secs(60));
        t.start("one", 10);
        t.start("two", 4);
        t.advance("one", 7, "x");
        assert_eq!(t.snapshot("two").unwrap().current, 0);
        assert_eq!(t.snapshot("one").unwrap().current, 7);
    }

    #[test]
    fn expired_entries_disappear() {
        let t = ProgressTracker::new(Duration::ZERO);
        t.start("old", 1);
        std::thread::sleep(Duration::from_millis(5));
        assert!(t.snapshot("old").is_none());
        assert_eq!(t.sweep(), 1);
        assert_eq!(t.active_sessions(), 0);
    }

    #[test]
    fn client_tokens_are_validated() {
        assert_eq!(ProgressTracker::token_from(Some("batch_42-x")), "batch_42-x");
        let minted = ProgressTracker::token_from(Some("../../etc"));
        assert!(TOKEN_SHAPE.is_match(&minted));
        assert_ne!(minted, "../../etc");
        assert_ne!(ProgressTracker::new_token(), ProgressTracker::new_token());
    }

    #[test]
    fn status_serializes_snake_case() {
        let v = serde_json::to_value(ProgressSnapshot::not_found()).unwrap();
        assert_eq!(v["status"], "not_found");
        assert_eq!(
            serde_json::to_value(ProgressStatus::CreatingArchive).unwrap(),
            "creating_archive"
        );
    }
}
