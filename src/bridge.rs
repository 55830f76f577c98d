//! State bridge: turns the directive file written by host hooks into
//! `PetState` changes.
//!
//! The hook side simply overwrites a small text file with a state token.
//! The bridge checks it on a fixed cadence, keeps the last valid state on
//! garbage, and falls back to idle once the host has gone quiet.

use crate::state::{Directive, PetState};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeTuning {
    /// Minimum spacing between file checks, in milliseconds.
    pub poll_interval_ms: u64,
    /// Silence after which the pet is sent back to idle, in seconds.
    pub idle_timeout_secs: u64,
}

impl Default for BridgeTuning {
    fn default() -> Self {
        Self {
            poll_interval_ms: 300,
            idle_timeout_secs: 60,
        }
    }
}

impl BridgeTuning {
    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Observation {
    modified: Option<SystemTime>,
    raw: String,
}

pub struct StateBridge {
    path: PathBuf,
    tuning: BridgeTuning,
    current: PetState,
    last_seen: Option<Observation>,
    last_poll: Option<SystemTime>,
    last_change: SystemTime,
    dirty: bool,
}

impl StateBridge {
    /// Starts from whatever the file holds now, without reporting it as a
    /// change.
    pub fn new(path: impl Into<PathBuf>, tuning: BridgeTuning, now: SystemTime) -> Self {
        let path = path.into();
        let last_seen = observe(&path);
        let current = last_seen
            .as_ref()
            .and_then(|obs| obs.raw.parse::<PetState>().ok())
            .unwrap_or(PetState::Idle);
        Self {
            path,
            tuning,
            current,
            last_seen,
            last_poll: None,
            last_change: now,
            dirty: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last valid state seen on the channel.
    pub fn state(&self) -> PetState {
        self.current
    }

    /// Makes the next `poll` read the file even inside the poll interval.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Returns a directive when the file was touched or the idle timeout
    /// fired, `None` otherwise.
    pub fn poll(&mut self, now: SystemTime) -> Option<Directive> {
        let due = match self.last_poll {
            Some(last) => elapsed(last, now) >= self.tuning.poll_interval(),
            None => true,
        };
        if !due && !self.dirty {
            return None;
        }
        self.last_poll = Some(now);
        self.dirty = false;

        let seen = observe(&self.path);
        if seen.is_some() && seen != self.last_seen {
            self.last_seen = seen;
            self.last_change = now;
            let raw = self.last_seen.as_ref().map(|obs| obs.raw.as_str()).unwrap_or("");
            return match raw.parse::<Directive>() {
                Ok(Directive::Terminate) => {
                    debug!("directive channel asked for shutdown");
                    Some(Directive::Terminate)
                }
                Ok(Directive::State(state)) => {
                    trace!("directive {} -> {}", self.current, state);
                    self.current = state;
                    Some(Directive::State(state))
                }
                Err(err) => {
                    debug!("{}; keeping {}", err, self.current);
                    None
                }
            };
        }

        if self.current != PetState::Idle && elapsed(self.last_change, now) >= self.tuning.idle_timeout() {
            debug!("no directive for {:?}, returning to idle", self.tuning.idle_timeout());
            self.current = PetState::Idle;
            self.last_change = now;
            return Some(Directive::State(PetState::Idle));
        }
        None
    }
}

fn elapsed(since: SystemTime, now: SystemTime) -> Duration {
    now.duration_since(since).unwrap_or(Duration::ZERO)
}

/// Reads the directive file. Missing, empty or unreadable files yield
/// `None` so the previous observation stands.
fn observe(path: &Path) -> Option<Observation> {
    let modified = fs::metadata(path).and_then(|meta| meta.modified()).ok();
    let raw = fs::read_to_string(path).ok()?;
    let raw = raw.trim().to_ascii_lowercase();
    if raw.is_empty() {
        return None;
    }
    Some(Observation { modified, raw })
}

/// Writes a directive token the way hooks do. Used by tests and tooling.
pub fn write_directive(path: &Path, token: &str) -> std::io::Result<()> {
    fs::write(path, format!("{}\n", token.trim()))
}
