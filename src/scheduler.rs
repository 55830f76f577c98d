//! Behavior scheduler: decides which animation is active each frame and
//! advances it.
//!
//! Priority, highest first: a non-idle `PetState` plays its state
//! animation; otherwise the current movement clip; otherwise the idle pose.
//! Finite animations hand over to their successor once they have played
//! their configured number of passes.

use crate::animations::{AnimationConfig, AnimationTable, LoopMode, MoveClip};
use crate::state::{Facing, PetState};
use log::debug;
use serde::Serialize;
use std::time::Duration;

/// One frame at 60 Hz.
pub const FRAME_TICK: Duration = Duration::from_millis(1000 / 60);

/// Full cycles a manually forced looping state plays before reverting.
pub const OVERRIDE_CYCLES: u32 = 3;

/// How long the primary lies stumbled before trading places with its clone.
pub const STUMBLE_HOLD: Duration = Duration::from_millis(900);

/// Frame cursor over one animation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Player {
    frame: usize,
    elapsed: Duration,
    loops_done: u32,
    cycles: u32,
}

impl Player {
    pub fn reset(&mut self) {
        *self = Player::default();
    }

    pub fn frame(&self) -> usize {
        self.frame
    }

    /// Completed passes over the sequence since the last reset.
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    pub fn sprite<K>(&self, cfg: &AnimationConfig<K>) -> u32 {
        cfg.sprites[self.frame % cfg.sprites.len()]
    }

    /// Advances by `dt`. Returns the successor once a finite animation has
    /// played out; the player is reset at that point.
    pub fn advance<K: Copy>(&mut self, cfg: &AnimationConfig<K>, dt: Duration) -> Option<K> {
        self.elapsed += dt;
        while self.elapsed >= cfg.delay {
            self.elapsed -= cfg.delay;
            self.frame += 1;
            if self.frame < cfg.sprites.len() {
                continue;
            }
            self.cycles += 1;
            match cfg.mode {
                LoopMode::Infinite => self.frame = 0,
                LoopMode::Finite { loops, next } => {
                    self.loops_done += 1;
                    if self.loops_done < loops {
                        self.frame = 0;
                    } else {
                        self.reset();
                        return Some(next);
                    }
                }
            }
        }
        None
    }

    /// Parks on the final frame of the final pass.
    fn hold_last<K>(&mut self, cfg: &AnimationConfig<K>) {
        self.frame = cfg.sprites.len() - 1;
        self.elapsed = Duration::ZERO;
        if let LoopMode::Finite { loops, .. } = cfg.mode {
            self.loops_done = loops.saturating_sub(1);
        }
    }
}

/// Where the primary body is, for placing the clone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub x: f64,
    pub y: f64,
    pub facing: Facing,
    pub width: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    StateChanged { from: PetState, to: PetState },
    CloneSpawned { x: f64, y: f64, facing: Facing },
    /// The primary must take over the clone's position.
    CloneSwap { x: f64, y: f64 },
    OverrideCleared,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CloneFrame {
    pub x: f64,
    pub y: f64,
    pub facing: Facing,
    pub sprite: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerFrame {
    pub state: PetState,
    pub clip: Option<MoveClip>,
    pub sprite: u32,
    pub clone: Option<CloneFrame>,
    pub events: Vec<SchedulerEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClonePhase {
    Doubling,
    Attack,
    Stumble,
}

#[derive(Debug, Clone)]
struct CloneEntity {
    x: f64,
    y: f64,
    facing: Facing,
    player: Player,
}

#[derive(Debug, Clone)]
struct CloneSequence {
    phase: ClonePhase,
    entity: Option<CloneEntity>,
    hold_left: Duration,
}

enum Active {
    State(PetState),
    Clip(MoveClip),
}

pub struct Scheduler {
    table: AnimationTable,
    state: PetState,
    requested_clip: Option<MoveClip>,
    active_clip: Option<MoveClip>,
    player: Player,
    manual_override: bool,
    forced_cycles: Option<u32>,
    clone: Option<CloneSequence>,
}

impl Scheduler {
    pub fn new(table: AnimationTable) -> Self {
        Self {
            table,
            state: PetState::Idle,
            requested_clip: None,
            active_clip: None,
            player: Player::default(),
            manual_override: false,
            forced_cycles: None,
            clone: None,
        }
    }

    pub fn table(&self) -> &AnimationTable {
        &self.table
    }

    pub fn state(&self) -> PetState {
        self.state
    }

    pub fn clip(&self) -> Option<MoveClip> {
        self.active_clip
    }

    pub fn frame(&self) -> usize {
        self.player.frame()
    }

    pub fn manual_override(&self) -> bool {
        self.manual_override
    }

    pub fn clone_phase(&self) -> Option<ClonePhase> {
        self.clone.as_ref().map(|seq| seq.phase)
    }

    /// True while the active animation is finite and still playing.
    pub fn is_busy(&self) -> bool {
        match self.active() {
            Active::State(state) => self.table.state(state).is_finite(),
            Active::Clip(clip) => self.table.clip(clip).is_finite(),
        }
    }

    fn active(&self) -> Active {
        if self.state != PetState::Idle {
            return Active::State(self.state);
        }
        match self.active_clip {
            Some(clip) => Active::Clip(clip),
            None => Active::State(PetState::Idle),
        }
    }

    fn enter(&mut self, state: PetState) {
        self.state = state;
        self.player.reset();
    }

    /// Switches state unless already in it. The player restarts on change.
    pub fn set_state(&mut self, state: PetState) {
        if state != self.state {
            self.enter(state);
        }
    }

    /// State pushed by the bridge. Ignored while the user holds the pet or
    /// the clone choreography is running. Repeating a finite state replays it.
    pub fn apply_external(&mut self, state: PetState) -> bool {
        if self.manual_override || self.clone.is_some() {
            return false;
        }
        if state == PetState::Doubling {
            return self.start_clone();
        }
        if state == self.state && self.table.state(state).is_finite() {
            self.enter(state);
        } else {
            self.set_state(state);
        }
        true
    }

    /// Human control surface: force a state and hold the override.
    pub fn force(&mut self, state: PetState) -> bool {
        if self.clone.is_some() {
            return false;
        }
        if state == PetState::Doubling {
            return self.start_clone();
        }
        self.manual_override = true;
        self.enter(state);
        self.forced_cycles = if self.table.state(state).is_finite() {
            None
        } else {
            Some(OVERRIDE_CYCLES)
        };
        debug!("manual override: {}", state);
        true
    }

    /// "Auto" on the control surface. Refused mid-choreography.
    pub fn release_override(&mut self) -> bool {
        if self.clone.is_some() {
            return false;
        }
        self.manual_override = false;
        self.forced_cycles = None;
        true
    }

    /// Fight delivery for the attacking side.
    pub fn begin_attack(&mut self) -> bool {
        if self.state != PetState::Idle || self.clone.is_some() {
            return false;
        }
        self.manual_override = true;
        self.forced_cycles = None;
        self.enter(PetState::Attack);
        true
    }

    /// Starts the clone-kill choreography. No-op if one is already running.
    pub fn start_clone(&mut self) -> bool {
        if self.clone.is_some() {
            return false;
        }
        self.manual_override = true;
        self.forced_cycles = None;
        self.clone = Some(CloneSequence {
            phase: ClonePhase::Doubling,
            entity: None,
            hold_left: STUMBLE_HOLD,
        });
        self.enter(PetState::Doubling);
        debug!("clone sequence started");
        true
    }

    /// Drops any running choreography. Used at teardown.
    pub fn abandon(&mut self) {
        if self.clone.take().is_some() {
            debug!("clone sequence abandoned");
        }
    }

    /// Motion clip requested by the wander engine for this frame.
    pub fn set_movement(&mut self, clip: Option<MoveClip>) {
        if clip == self.requested_clip {
            return;
        }
        self.requested_clip = clip;
        self.active_clip = clip;
        if self.state == PetState::Idle {
            self.player.reset();
        }
    }

    pub fn tick(&mut self, dt: Duration, anchor: Anchor) -> SchedulerFrame {
        let prev = self.state;
        let mut events = Vec::new();

        match self.active() {
            Active::State(state) => {
                let cfg = self.table.state(state);
                let finished = self.player.advance(cfg, dt);
                let holding = state == PetState::Stumble
                    && matches!(self.clone, Some(ref seq) if seq.phase == ClonePhase::Stumble);
                match finished {
                    Some(_) if holding => {
                        let cfg = self.table.state(state);
                        self.player.hold_last(cfg);
                    }
                    Some(next) => self.enter(next),
                    None => {
                        if let Some(limit) = self.forced_cycles {
                            if self.player.cycles() >= limit {
                                self.forced_cycles = None;
                                self.manual_override = false;
                                self.enter(PetState::Idle);
                                events.push(SchedulerEvent::OverrideCleared);
                            }
                        }
                    }
                }
            }
            Active::Clip(clip) => {
                let cfg = self.table.clip(clip);
                if let Some(next) = self.player.advance(cfg, dt) {
                    self.active_clip = Some(next);
                    self.player.reset();
                }
            }
        }

        if self.state != prev {
            events.push(SchedulerEvent::StateChanged { from: prev, to: self.state });
            if self.manual_override && self.clone.is_none() && !self.is_busy() {
                self.manual_override = false;
                self.forced_cycles = None;
                events.push(SchedulerEvent::OverrideCleared);
                debug!("manual override cleared after {} -> {}", prev, self.state);
            }
        }

        self.step_clone(dt, anchor, &mut events);

        let sprite = match self.active() {
            Active::State(state) => self.player.sprite(self.table.state(state)),
            Active::Clip(clip) => self.player.sprite(self.table.clip(clip)),
        };
        let clone = self.clone.as_ref().and_then(|seq| seq.entity.as_ref()).map(|entity| CloneFrame {
            x: entity.x,
            y: entity.y,
            facing: entity.facing,
            sprite: entity.player.sprite(self.table.state(PetState::Attack)),
        });

        SchedulerFrame {
            state: self.state,
            clip: if self.state == PetState::Idle { self.active_clip } else { None },
            sprite,
            clone,
            events,
        }
    }

    fn step_clone(&mut self, dt: Duration, anchor: Anchor, events: &mut Vec<SchedulerEvent>) {
        let Some(mut seq) = self.clone.take() else {
            return;
        };

        match seq.phase {
            ClonePhase::Doubling => {
                if self.state == PetState::CloneFrozen {
                    // Clone appears behind the primary, facing the same way.
                    let x = anchor.x - anchor.facing.sign() * (anchor.width / 2.0).floor();
                    seq.entity = Some(CloneEntity {
                        x,
                        y: anchor.y,
                        facing: anchor.facing,
                        player: Player::default(),
                    });
                    seq.phase = ClonePhase::Attack;
                    events.push(SchedulerEvent::CloneSpawned { x, y: anchor.y, facing: anchor.facing });
                    debug!("clone spawned at ({:.0}, {:.0})", x, anchor.y);
                } else if self.state != PetState::Doubling {
                    // Doubling was displaced; nothing to choreograph.
                    self.manual_override = false;
                    return;
                }
            }
            ClonePhase::Attack => {
                let attack = self.table.state(PetState::Attack);
                let done = match seq.entity.as_mut() {
                    Some(entity) => entity.player.advance(attack, dt).is_some(),
                    None => true,
                };
                if done {
                    if let Some(entity) = seq.entity.as_mut() {
                        entity.player.hold_last(attack);
                    }
                    seq.phase = ClonePhase::Stumble;
                    seq.hold_left = STUMBLE_HOLD;
                    let prev = self.state;
                    self.enter(PetState::Stumble);
                    events.push(SchedulerEvent::StateChanged { from: prev, to: PetState::Stumble });
                }
            }
            ClonePhase::Stumble => {
                seq.hold_left = seq.hold_left.saturating_sub(dt);
                if seq.hold_left.is_zero() {
                    if let Some(entity) = seq.entity.take() {
                        events.push(SchedulerEvent::CloneSwap { x: entity.x, y: entity.y });
                    }
                    let prev = self.state;
                    self.enter(PetState::Idle);
                    self.manual_override = false;
                    self.forced_cycles = None;
                    events.push(SchedulerEvent::StateChanged { from: prev, to: PetState::Idle });
                    events.push(SchedulerEvent::OverrideCleared);
                    debug!("clone sequence complete");
                    return;
                }
            }
        }

        self.clone = Some(seq);
    }
}
