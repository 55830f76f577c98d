//! Shared position channel.
//!
//! Every instance owns one small JSON file in a shared directory and
//! rewrites it on a fixed cadence. Writes go to a unique temp file first
//! and are renamed into place, so readers either see the previous record
//! or the new one, never a torn write. There is no locking; stale records
//! are simply ignored.

use crate::error::ChannelError;
use crate::identity::InstanceId;
use crate::state::{Facing, MovementState, PetState};
use log::{trace, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub const FILE_PREFIX: &str = "deskmate-";
const POS_SUFFIX: &str = "-pos";
const STATE_SUFFIX: &str = "-state";
const CONTROL_SUFFIX: &str = "-control";
const TMP_MARKER: &str = ".tmp-";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub facing: Facing,
    pub state: PetState,
    pub movement: Option<MovementState>,
    pub monitor: usize,
    pub fight_target: Option<InstanceId>,
    /// Milliseconds since the UNIX epoch.
    pub timestamp: u64,
}

impl PositionRecord {
    pub fn center_x(&self) -> f64 {
        self.x + self.width / 2.0
    }

    /// Age relative to `now`. Records from the future count as fresh.
    pub fn age(&self, now: SystemTime) -> Duration {
        Duration::from_millis(epoch_millis(now).saturating_sub(self.timestamp))
    }
}

/// A peer's record together with the identity taken from its file name.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerRecord {
    pub id: InstanceId,
    pub record: PositionRecord,
}

pub fn epoch_millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub fn state_file_name(id: &InstanceId) -> String {
    format!("{}{}{}", FILE_PREFIX, id, STATE_SUFFIX)
}

pub fn position_file_name(id: &InstanceId) -> String {
    format!("{}{}{}", FILE_PREFIX, id, POS_SUFFIX)
}

pub fn control_file_name(id: &InstanceId) -> String {
    format!("{}{}{}", FILE_PREFIX, id, CONTROL_SUFFIX)
}

/// Identity of a published record file, `None` for anything else
/// (including in-flight temp files).
fn id_from_file_name(name: &str) -> Option<InstanceId> {
    if name.contains(TMP_MARKER) {
        return None;
    }
    let id = name.strip_prefix(FILE_PREFIX)?.strip_suffix(POS_SUFFIX)?;
    InstanceId::parse(id)
}

#[derive(Debug, Clone)]
pub struct RecordChannel {
    dir: PathBuf,
}

impl RecordChannel {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, id: &InstanceId) -> PathBuf {
        self.dir.join(position_file_name(id))
    }

    pub fn publish(&self, id: &InstanceId, record: &PositionRecord) -> Result<(), ChannelError> {
        let target = self.record_path(id);
        let tmp = self
            .dir
            .join(format!("{}{}{}", position_file_name(id), TMP_MARKER, Uuid::new_v4()));
        let body = serde_json::to_vec(record)?;

        if let Err(source) = fs::write(&tmp, &body) {
            return Err(ChannelError::Write { path: tmp, source });
        }
        if let Err(source) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            return Err(ChannelError::Write { path: target, source });
        }
        trace!("published {} at {}", id, record.timestamp);
        Ok(())
    }

    /// Reads our own record back, if it is there and parses.
    pub fn read(&self, id: &InstanceId) -> Option<PositionRecord> {
        let raw = fs::read(self.record_path(id)).ok()?;
        serde_json::from_slice(&raw).ok()
    }

    /// Live records of every other instance. Unreadable, unparseable and
    /// stale records are skipped; a record aged exactly `stale_after` is
    /// still live.
    pub fn read_peers(&self, own: &InstanceId, now: SystemTime, stale_after: Duration) -> Vec<PeerRecord> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("cannot list {}: {}", self.dir.display(), err);
                return Vec::new();
            }
        };

        let mut peers = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(id) = name.to_str().and_then(id_from_file_name) else {
                continue;
            };
            if &id == own {
                continue;
            }
            let record: PositionRecord = match fs::read(entry.path())
                .ok()
                .and_then(|raw| serde_json::from_slice(&raw).ok())
            {
                Some(record) => record,
                None => {
                    trace!("skipping unreadable record for {}", id);
                    continue;
                }
            };
            if record.age(now) > stale_after {
                trace!("skipping stale record for {} ({:?} old)", id, record.age(now));
                continue;
            }
            peers.push(PeerRecord { id, record });
        }
        peers.sort_by(|a, b| a.id.cmp(&b.id));
        peers
    }

    /// Removes our record. A record that is already gone is fine.
    pub fn remove(&self, id: &InstanceId) -> Result<(), ChannelError> {
        let path = self.record_path(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ChannelError::Remove { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn at(ms: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(1_700_000_000_000 + ms)
    }

    fn record(x: f64, ts: SystemTime) -> PositionRecord {
        PositionRecord {
            x,
            y: 900.0,
            width: 128.0,
            height: 128.0,
            facing: Facing::Left,
            state: PetState::Idle,
            movement: Some(MovementState::Walk),
            monitor: 0,
            fight_target: None,
            timestamp: epoch_millis(ts),
        }
    }

    #[test]
    fn wire_format_uses_plain_fields() {
        let mut rec = record(10.0, at(0));
        rec.fight_target = InstanceId::parse("abcdef012345");
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["facing"], -1);
        assert_eq!(json["state"], "idle");
        assert_eq!(json["movement"], "walk");
        assert_eq!(json["fight_target"], "abcdef012345");
        assert_eq!(json["timestamp"], 1_700_000_000_000u64);
    }

    #[test]
    fn publish_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let chan = RecordChannel::new(dir.path());
        let me = InstanceId::derive("me");
        chan.publish(&me, &record(1.0, at(0))).unwrap();
        chan.publish(&me, &record(2.0, at(100))).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![position_file_name(&me)]);
        assert_eq!(chan.read(&me).unwrap().x, 2.0);
    }

    #[test]
    fn peers_exclude_self_and_junk() {
        let dir = TempDir::new().unwrap();
        let chan = RecordChannel::new(dir.path());
        let me = InstanceId::derive("me");
        let other = InstanceId::derive("other");
        chan.publish(&me, &record(1.0, at(0))).unwrap();
        chan.publish(&other, &record(2.0, at(0))).unwrap();
        fs::write(dir.path().join("deskmate-0123456789ab-pos"), "{not json").unwrap();
        fs::write(dir.path().join(format!("{}.tmp-x", position_file_name(&other))), "{}").unwrap();
        fs::write(dir.path().join("unrelated.txt"), "hi").unwrap();

        let peers = chan.read_peers(&me, at(500), Duration::from_secs(3));
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].id, other);
    }

    #[test]
    fn staleness_boundary_is_inclusive() {
        let dir = TempDir::new().unwrap();
        let chan = RecordChannel::new(dir.path());
        let me = InstanceId::derive("me");
        let other = InstanceId::derive("other");
        chan.publish(&other, &record(2.0, at(0))).unwrap();

        let window = Duration::from_millis(3000);
        assert_eq!(chan.read_peers(&me, at(3000), window).len(), 1);
        assert!(chan.read_peers(&me, at(3001), window).is_empty());
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let chan = RecordChannel::new(dir.path());
        let me = InstanceId::derive("me");
        chan.publish(&me, &record(1.0, at(0))).unwrap();
        chan.remove(&me).unwrap();
        chan.remove(&me).unwrap();
        assert!(!chan.record_path(&me).exists());
    }
}
