//! Human control surface.
//!
//! Anything that can append lines to the per-instance control file (a tray
//! menu, a shell alias, a test) can steer the pet. One command per line:
//!
//! ```text
//! state celebrating
//! auto
//! wander off
//! drag 400 300
//! release 6.5 -2
//! ```

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::state::PetState;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "command")]
pub enum ControlCommand {
    /// Force a state and take manual control.
    State { state: PetState },
    /// Hand control back to the directive channel.
    Auto,
    Wander { enabled: bool },
    Kick,
    Jump,
    /// Start the clone choreography.
    Clone,
    Drag { x: f64, y: f64 },
    Release { vx: f64, vy: f64 },
    Quit,
}

fn number(word: Option<&str>, what: &str) -> Result<f64, String> {
    let word = word.ok_or_else(|| format!("missing {}", what))?;
    word.parse::<f64>()
        .map_err(|_| format!("{} must be a number, got `{}`", what, word))
}

impl FromStr for ControlCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().ok_or("empty command")?.to_ascii_lowercase();
        let cmd = match verb.as_str() {
            "state" => {
                let name = words.next().ok_or("missing state name")?;
                let state = name.parse::<PetState>().map_err(|e| e.to_string())?;
                ControlCommand::State { state }
            }
            "auto" => ControlCommand::Auto,
            "wander" => match words.next().map(str::to_ascii_lowercase).as_deref() {
                Some("on") => ControlCommand::Wander { enabled: true },
                Some("off") => ControlCommand::Wander { enabled: false },
                _ => return Err("wander takes `on` or `off`".to_string()),
            },
            "kick" => ControlCommand::Kick,
            "jump" => ControlCommand::Jump,
            "clone" => ControlCommand::Clone,
            "drag" => ControlCommand::Drag {
                x: number(words.next(), "x")?,
                y: number(words.next(), "y")?,
            },
            "release" => ControlCommand::Release {
                vx: number(words.next(), "vx")?,
                vy: number(words.next(), "vy")?,
            },
            "quit" => ControlCommand::Quit,
            other => return Err(format!("unknown command `{}`", other)),
        };
        if let Some(extra) = words.next() {
            return Err(format!("unexpected `{}` after {}", extra, verb));
        }
        Ok(cmd)
    }
}

/// File inbox for control commands. Each drain consumes the file.
#[derive(Debug, Clone)]
pub struct ControlInbox {
    path: PathBuf,
}

impl ControlInbox {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and removes the inbox. Bad lines are logged and skipped.
    pub fn drain(&self) -> Vec<ControlCommand> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                warn!("cannot read control inbox {}: {}", self.path.display(), err);
                return Vec::new();
            }
        };
        if let Err(err) = fs::remove_file(&self.path) {
            warn!("cannot clear control inbox {}: {}", self.path.display(), err);
        }

        raw.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| match line.parse::<ControlCommand>() {
                Ok(cmd) => {
                    debug!("control: {:?}", cmd);
                    Some(cmd)
                }
                Err(err) => {
                    warn!("ignoring control `{}`: {}", line, err);
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            "state Celebrating".parse::<ControlCommand>(),
            Ok(ControlCommand::State { state: PetState::Celebrating })
        );
        assert_eq!("AUTO".parse::<ControlCommand>(), Ok(ControlCommand::Auto));
        assert_eq!("wander off".parse::<ControlCommand>(), Ok(ControlCommand::Wander { enabled: false }));
        assert_eq!("drag 10 -4.5".parse::<ControlCommand>(), Ok(ControlCommand::Drag { x: 10.0, y: -4.5 }));
        assert_eq!("release 3 -2".parse::<ControlCommand>(), Ok(ControlCommand::Release { vx: 3.0, vy: -2.0 }));
    }

    #[test]
    fn test_rejects_bad_commands() {
        assert!("state sleeping".parse::<ControlCommand>().is_err());
        assert!("wander maybe".parse::<ControlCommand>().is_err());
        assert!("drag 10".parse::<ControlCommand>().is_err());
        assert!("kick now".parse::<ControlCommand>().is_err());
        assert!("dance".parse::<ControlCommand>().is_err());
    }

    #[test]
    fn test_drain_consumes_inbox() {
        let dir = TempDir::new().unwrap();
        let inbox = ControlInbox::new(dir.path().join("deskmate-x-control"));
        assert!(inbox.drain().is_empty());

        fs::write(inbox.path(), "kick\n\n# comment\nbogus\njump\n").unwrap();
        assert_eq!(inbox.drain(), vec![ControlCommand::Kick, ControlCommand::Jump]);
        assert!(!inbox.path().exists());
        assert!(inbox.drain().is_empty());
    }
}
