//! Animation table: which sprites play for each state and movement clip,
//! how fast, and what happens when a finite animation runs out.
//!
//! Two namespaces live side by side and never collide: `PetState` keys the
//! state-override animations, `MoveClip` keys the motion animations. Both
//! are closed enums, so a validated table is total by construction.

use crate::error::ConfigError;
use crate::state::PetState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Motion animation keys. Richer than `MovementState` because landings
/// have their own poses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveClip {
    Walk,
    Sit,
    Climb,
    Ceiling,
    Kick,
    Jump,
    Fall,
    Drag,
    BadLand,
    GoodLand,
    HardLand,
}

impl MoveClip {
    pub const ALL: [MoveClip; 11] = [
        MoveClip::Walk,
        MoveClip::Sit,
        MoveClip::Climb,
        MoveClip::Ceiling,
        MoveClip::Kick,
        MoveClip::Jump,
        MoveClip::Fall,
        MoveClip::Drag,
        MoveClip::BadLand,
        MoveClip::GoodLand,
        MoveClip::HardLand,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MoveClip::Walk => "walk",
            MoveClip::Sit => "sit",
            MoveClip::Climb => "climb",
            MoveClip::Ceiling => "ceiling",
            MoveClip::Kick => "kick",
            MoveClip::Jump => "jump",
            MoveClip::Fall => "fall",
            MoveClip::Drag => "drag",
            MoveClip::BadLand => "bad_land",
            MoveClip::GoodLand => "good_land",
            MoveClip::HardLand => "hard_land",
        }
    }
}

impl fmt::Display for MoveClip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MoveClip {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MoveClip::ALL
            .into_iter()
            .find(|clip| clip.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownName(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode<K> {
    Infinite,
    /// Play the sequence `loops` times, then hand over to `next`.
    Finite { loops: u32, next: K },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimationConfig<K> {
    pub sprites: Vec<u32>,
    pub delay: Duration,
    pub mode: LoopMode<K>,
}

impl<K: Copy> AnimationConfig<K> {
    pub fn looping(sprites: &[u32], delay_ms: u64) -> Self {
        Self {
            sprites: sprites.to_vec(),
            delay: Duration::from_millis(delay_ms),
            mode: LoopMode::Infinite,
        }
    }

    pub fn once_then(sprites: &[u32], delay_ms: u64, loops: u32, next: K) -> Self {
        Self {
            sprites: sprites.to_vec(),
            delay: Duration::from_millis(delay_ms),
            mode: LoopMode::Finite { loops, next },
        }
    }

    pub fn is_finite(&self) -> bool {
        matches!(self.mode, LoopMode::Finite { .. })
    }

    /// Wall time for one pass over the sequence.
    pub fn cycle(&self) -> Duration {
        self.delay * self.sprites.len() as u32
    }
}

#[derive(Debug, Clone)]
pub struct AnimationTable {
    states: BTreeMap<PetState, AnimationConfig<PetState>>,
    moves: BTreeMap<MoveClip, AnimationConfig<MoveClip>>,
}

impl AnimationTable {
    /// Builds and validates a table. Validation is the only place
    /// configuration-integrity faults are reported.
    pub fn new(
        states: BTreeMap<PetState, AnimationConfig<PetState>>,
        moves: BTreeMap<MoveClip, AnimationConfig<MoveClip>>,
    ) -> Result<Self, ConfigError> {
        let table = Self { states, moves };
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for state in PetState::ALL {
            let cfg = self
                .states
                .get(&state)
                .ok_or_else(|| ConfigError::MissingConfig(state.to_string()))?;
            check_config(state.as_str(), cfg, |next| self.states.contains_key(&next))?;
        }
        for clip in MoveClip::ALL {
            let cfg = self
                .moves
                .get(&clip)
                .ok_or_else(|| ConfigError::MissingConfig(clip.to_string()))?;
            check_config(clip.as_str(), cfg, |next| self.moves.contains_key(&next))?;
        }
        Ok(())
    }

    pub fn state(&self, state: PetState) -> &AnimationConfig<PetState> {
        // Validated as total in `new`.
        &self.states[&state]
    }

    pub fn clip(&self, clip: MoveClip) -> &AnimationConfig<MoveClip> {
        &self.moves[&clip]
    }

    /// Parses a mascot override file. Entries replace the built-in ones by
    /// name; anything left out keeps the built-in animation.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let file: TableFile = serde_yaml::from_str(yaml)?;
        let mut table = builtin_table();

        for (name, entry) in file.states {
            let state: PetState = name
                .parse()
                .map_err(|_| ConfigError::UnknownName(name.clone()))?;
            let mode = entry.loop_mode(&name, |s| {
                s.parse::<PetState>().map_err(|_| ConfigError::UnknownSuccessor {
                    name: name.clone(),
                    successor: s.to_string(),
                })
            })?;
            table.states.insert(state, entry.into_config(mode));
        }
        for (name, entry) in file.moves {
            let clip: MoveClip = name.parse()?;
            let mode = entry.loop_mode(&name, |s| {
                s.parse::<MoveClip>().map_err(|_| ConfigError::UnknownSuccessor {
                    name: name.clone(),
                    successor: s.to_string(),
                })
            })?;
            table.moves.insert(clip, entry.into_config(mode));
        }

        table.validate()?;
        Ok(table)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }
}

fn check_config<K: Copy + fmt::Display>(
    name: &str,
    cfg: &AnimationConfig<K>,
    resolves: impl Fn(K) -> bool,
) -> Result<(), ConfigError> {
    if cfg.sprites.is_empty() {
        return Err(ConfigError::EmptySequence { name: name.to_string() });
    }
    if cfg.delay.is_zero() {
        return Err(ConfigError::ZeroDelay { name: name.to_string() });
    }
    if let LoopMode::Finite { loops, next } = cfg.mode {
        if loops == 0 {
            return Err(ConfigError::ZeroLoops { name: name.to_string() });
        }
        if !resolves(next) {
            return Err(ConfigError::UnknownSuccessor {
                name: name.to_string(),
                successor: next.to_string(),
            });
        }
    }
    Ok(())
}

/// On-disk shape of a mascot animation file.
#[derive(Debug, Default, Deserialize)]
struct TableFile {
    #[serde(default)]
    states: BTreeMap<String, EntryFile>,
    #[serde(default)]
    moves: BTreeMap<String, EntryFile>,
}

#[derive(Debug, Deserialize)]
struct EntryFile {
    sprites: Vec<u32>,
    delay: u64,
    #[serde(default = "default_loop")]
    r#loop: bool,
    #[serde(default = "default_loops")]
    loops: u32,
    next: Option<String>,
}

fn default_loop() -> bool {
    true
}

fn default_loops() -> u32 {
    2
}

impl EntryFile {
    fn loop_mode<K>(
        &self,
        name: &str,
        resolve: impl Fn(&str) -> Result<K, ConfigError>,
    ) -> Result<LoopMode<K>, ConfigError> {
        if self.r#loop {
            return Ok(LoopMode::Infinite);
        }
        let next = self
            .next
            .as_deref()
            .ok_or_else(|| ConfigError::MissingSuccessor(name.to_string()))?;
        Ok(LoopMode::Finite {
            loops: self.loops,
            next: resolve(next)?,
        })
    }

    fn into_config<K>(self, mode: LoopMode<K>) -> AnimationConfig<K> {
        AnimationConfig {
            sprites: self.sprites,
            delay: Duration::from_millis(self.delay),
            mode,
        }
    }
}

/// Built-in Shimeji-layout table (sprite indices refer to `shimeN.png`).
pub fn builtin_table() -> AnimationTable {
    use PetState::*;

    let states = BTreeMap::from([
        (Idle, AnimationConfig::looping(&[1], 500)),
        (Thinking, AnimationConfig::looping(&[42, 43], 350)),
        (Working, AnimationConfig::looping(&[47, 48, 48, 48, 47], 600)),
        (Attention, AnimationConfig::looping(&[11, 15], 300)),
        (Celebrating, AnimationConfig::once_then(&[49, 50], 300, 2, Idle)),
        (
            Error,
            AnimationConfig::once_then(&[43, 43, 38, 39, 40, 41, 41, 11, 11, 11, 42], 250, 1, Idle),
        ),
        (Doubling, AnimationConfig::once_then(&[44, 45, 46], 400, 1, CloneFrozen)),
        (CloneFrozen, AnimationConfig::looping(&[43], 500)),
        (Attack, AnimationConfig::once_then(&[27, 28, 29], 300, 1, Celebrating)),
        (Stumble, AnimationConfig::once_then(&[19, 18, 20], 300, 1, Idle)),
    ]);

    let moves = BTreeMap::from([
        (MoveClip::Walk, AnimationConfig::looping(&[1, 2, 1, 3], 120)),
        (MoveClip::Sit, AnimationConfig::looping(&[11], 500)),
        (MoveClip::Climb, AnimationConfig::looping(&[14, 12, 13], 200)),
        (MoveClip::Ceiling, AnimationConfig::looping(&[25, 23, 24], 200)),
        (MoveClip::Kick, AnimationConfig::looping(&[37], 150)),
        (MoveClip::Jump, AnimationConfig::looping(&[22], 150)),
        (MoveClip::Fall, AnimationConfig::looping(&[4], 200)),
        (MoveClip::Drag, AnimationConfig::looping(&[5], 200)),
        (MoveClip::BadLand, AnimationConfig::looping(&[18, 19], 250)),
        (MoveClip::GoodLand, AnimationConfig::looping(&[1], 500)),
        (MoveClip::HardLand, AnimationConfig::looping(&[18, 20, 21, 21, 19], 200)),
    ]);

    AnimationTable { states, moves }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_is_total_and_valid() {
        let table = builtin_table();
        table.validate().unwrap();
        for state in PetState::ALL {
            assert!(!table.state(state).sprites.is_empty());
        }
        for clip in MoveClip::ALL {
            assert!(!table.clip(clip).sprites.is_empty());
        }
    }

    #[test]
    fn finite_states_have_expected_successors() {
        let table = builtin_table();
        assert_eq!(
            table.state(PetState::Attack).mode,
            LoopMode::Finite { loops: 1, next: PetState::Celebrating }
        );
        assert_eq!(
            table.state(PetState::Doubling).mode,
            LoopMode::Finite { loops: 1, next: PetState::CloneFrozen }
        );
        assert_eq!(table.state(PetState::Doubling).sprites.len(), 3);
        assert!(!table.state(PetState::Working).is_finite());
    }

    #[test]
    fn yaml_override_replaces_named_entries_only() {
        let yaml = r#"
states:
  thinking:
    sprites: [7, 8, 9]
    delay: 100
moves:
  walk:
    sprites: [2]
    delay: 90
"#;
        let table = AnimationTable::from_yaml_str(yaml).unwrap();
        assert_eq!(table.state(PetState::Thinking).sprites, vec![7, 8, 9]);
        assert_eq!(table.clip(MoveClip::Walk).delay, Duration::from_millis(90));
        assert_eq!(table.state(PetState::Working).sprites, vec![47, 48, 48, 48, 47]);
    }

    #[test]
    fn unresolved_successor_is_rejected_at_load() {
        let yaml = r#"
states:
  error:
    sprites: [1]
    delay: 100
    loop: false
    loops: 1
    next: nap
"#;
        match AnimationTable::from_yaml_str(yaml) {
            Err(ConfigError::UnknownSuccessor { successor, .. }) => assert_eq!(successor, "nap"),
            other => panic!("expected UnknownSuccessor, got {:?}", other),
        }
    }

    #[test]
    fn finite_entry_without_successor_is_rejected() {
        let yaml = "states:\n  error:\n    sprites: [1]\n    delay: 100\n    loop: false\n";
        assert!(matches!(
            AnimationTable::from_yaml_str(yaml),
            Err(ConfigError::MissingSuccessor(_))
        ));
    }

    #[test]
    fn degenerate_sequences_are_rejected() {
        let empty = "moves:\n  sit:\n    sprites: []\n    delay: 100\n";
        assert!(matches!(
            AnimationTable::from_yaml_str(empty),
            Err(ConfigError::EmptySequence { .. })
        ));
        let zero = "moves:\n  sit:\n    sprites: [1]\n    delay: 0\n";
        assert!(matches!(
            AnimationTable::from_yaml_str(zero),
            Err(ConfigError::ZeroDelay { .. })
        ));
    }

    #[test]
    fn missing_entry_is_reported() {
        let mut states = builtin_table().states;
        states.remove(&PetState::Stumble);
        let moves = builtin_table().moves;
        assert!(matches!(
            AnimationTable::new(states, moves),
            Err(ConfigError::MissingConfig(name)) if name == "stumble"
        ));
    }
}
