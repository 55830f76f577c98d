//! State vocabulary shared by every engine.
//!
//! `PetState` is the top-level animation mode (driven by hooks, the wander
//! engine, fights or the user). `MovementState` is the autonomous motion
//! sub-mode that only matters while the pet is idle.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PetState {
    Idle,
    Thinking,
    Working,
    Attention,
    Celebrating,
    Doubling,
    CloneFrozen,
    Attack,
    Stumble,
    Error,
}

impl PetState {
    pub const ALL: [PetState; 10] = [
        PetState::Idle,
        PetState::Thinking,
        PetState::Working,
        PetState::Attention,
        PetState::Celebrating,
        PetState::Doubling,
        PetState::CloneFrozen,
        PetState::Attack,
        PetState::Stumble,
        PetState::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PetState::Idle => "idle",
            PetState::Thinking => "thinking",
            PetState::Working => "working",
            PetState::Attention => "attention",
            PetState::Celebrating => "celebrating",
            PetState::Doubling => "doubling",
            PetState::CloneFrozen => "clone_frozen",
            PetState::Attack => "attack",
            PetState::Stumble => "stumble",
            PetState::Error => "error",
        }
    }

    /// Any non-idle state holds the body in place while it plays.
    pub fn freezes_motion(self) -> bool {
        self != PetState::Idle
    }
}

impl fmt::Display for PetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown state name `{0}`")]
pub struct UnknownState(pub String);

impl FromStr for PetState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        PetState::ALL
            .into_iter()
            .find(|state| state.as_str() == name)
            .ok_or(UnknownState(name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementState {
    Walk,
    Sit,
    Climb,
    Kick,
    Jump,
    Fall,
    Drag,
    Ceiling,
}

impl MovementState {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementState::Walk => "walk",
            MovementState::Sit => "sit",
            MovementState::Climb => "climb",
            MovementState::Kick => "kick",
            MovementState::Jump => "jump",
            MovementState::Fall => "fall",
            MovementState::Drag => "drag",
            MovementState::Ceiling => "ceiling",
        }
    }
}

impl fmt::Display for MovementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Horizontal facing. Sprites face left by default. Serialized as -1 / 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum Facing {
    Left,
    Right,
}

impl Facing {
    pub fn sign(self) -> f64 {
        match self {
            Facing::Left => -1.0,
            Facing::Right => 1.0,
        }
    }

    pub fn flipped(self) -> Facing {
        match self {
            Facing::Left => Facing::Right,
            Facing::Right => Facing::Left,
        }
    }

    /// Facing that points from `from_x` toward `to_x`. Ties face left.
    pub fn toward(from_x: f64, to_x: f64) -> Facing {
        if to_x > from_x {
            Facing::Right
        } else {
            Facing::Left
        }
    }

    pub fn of_velocity(vx: f64) -> Facing {
        if vx > 0.0 {
            Facing::Right
        } else {
            Facing::Left
        }
    }
}

impl From<Facing> for i8 {
    fn from(facing: Facing) -> i8 {
        match facing {
            Facing::Left => -1,
            Facing::Right => 1,
        }
    }
}

impl TryFrom<i8> for Facing {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Facing::Left),
            1 => Ok(Facing::Right),
            other => Err(format!("facing must be -1 or 1, got {}", other)),
        }
    }
}

/// A token read from the incoming directive channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    State(PetState),
    Terminate,
}

pub const TERMINATE_TOKEN: &str = "quit";

impl FromStr for Directive {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case(TERMINATE_TOKEN) {
            return Ok(Directive::Terminate);
        }
        s.parse().map(Directive::State)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_state_name_round_trips() {
        for state in PetState::ALL {
            assert_eq!(state.as_str().parse::<PetState>(), Ok(state));
        }
    }

    #[test]
    fn parsing_is_case_and_whitespace_insensitive() {
        assert_eq!(" Working\n".parse::<PetState>(), Ok(PetState::Working));
        assert_eq!("CLONE_FROZEN".parse::<PetState>(), Ok(PetState::CloneFrozen));
        assert!("dancing".parse::<PetState>().is_err());
    }

    #[test]
    fn terminate_token_is_not_a_state() {
        assert_eq!("quit\n".parse::<Directive>(), Ok(Directive::Terminate));
        assert_eq!("idle".parse::<Directive>(), Ok(Directive::State(PetState::Idle)));
        assert!("quit".parse::<PetState>().is_err());
    }

    #[test]
    fn facing_serializes_as_sign() {
        assert_eq!(serde_json::to_string(&Facing::Left).unwrap(), "-1");
        assert_eq!(serde_json::from_str::<Facing>("1").unwrap(), Facing::Right);
        assert!(serde_json::from_str::<Facing>("0").is_err());
    }

    #[test]
    fn only_idle_leaves_motion_free() {
        let frozen: Vec<_> = PetState::ALL.into_iter().filter(|s| s.freezes_motion()).collect();
        assert_eq!(frozen.len(), PetState::ALL.len() - 1);
        assert!(!PetState::Idle.freezes_motion());
    }
}
