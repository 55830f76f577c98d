//! Autonomous wandering, Shimeji style: sit a lot, walk a bit, climb the
//! screen edges, hop about, fall with gravity.
//!
//! The engine is confined to one monitor at a time. It only moves the body
//! while the scheduler allows it; every other tick is a no-op that reports
//! the unchanged position.

use crate::animations::MoveClip;
use crate::state::{Facing, MovementState};
use log::debug;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const WALK_SPEED_MIN: f64 = 0.6;
pub const WALK_SPEED_MAX: f64 = 1.4;
pub const CLIMB_SPEED: f64 = 0.8;
pub const FALL_SPEED_INIT: f64 = 1.5;
pub const FALL_ACCEL: f64 = 0.35;
pub const FALL_SPEED_MAX: f64 = 8.0;
pub const THROW_GRAVITY: f64 = 0.30;
pub const THROW_FRICTION: f64 = 0.994;
pub const JUMP_GRAVITY: f64 = 0.12;
const JUMP_VY_SMALL: (f64, f64) = (-5.0, -3.5);
const JUMP_VY_BIG: (f64, f64) = (-11.0, -8.0);
const JUMP_VX_SMALL: f64 = 1.5;
const JUMP_VX_BIG: f64 = 7.0;

/// Per-tick stumble odds while walking on the ground.
pub const STUMBLE_CHANCE: f64 = 0.0003;
/// Same, with another pet closer than half a body width.
pub const STUMBLE_CHANCE_CLOSE: f64 = 0.003;

const FALL_CHANCE_TOP: f64 = 0.0008;
const FALL_CHANCE_CLIMB: f64 = 0.0006;
const CLIMB_EDGE_REACH: f64 = 20.0;
const HARD_LAND_FRACTION: f64 = 0.4;
const HARD_LAND_TICKS: u32 = 66;
const BAD_LAND_TICKS: u32 = 30;
const GOOD_LAND_TICKS: u32 = 40;
const FLOOR_SNAP: f64 = 5.0;
const THROW_MIN_SPEED: f64 = 0.3;
const THROW_STALL_VX: f64 = 0.06;

/// Monitor rectangle in desktop coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn contains(&self, px: f64, py: f64) -> bool {
        self.x <= px && px < self.x + self.width && self.y <= py && py < self.y + self.height
    }
}

impl Default for Rect {
    fn default() -> Self {
        Rect::new(0.0, 0.0, 1920.0, 1080.0)
    }
}

impl FromStr for Rect {
    type Err = String;

    /// `x,y,width,height`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|e| format!("bad monitor `{}`: {}", s, e))?;
        match parts.as_slice() {
            [x, y, w, h] if *w > 0.0 && *h > 0.0 => Ok(Rect::new(*x, *y, *w, *h)),
            _ => Err(format!("monitor must be x,y,width,height with a positive size, got `{}`", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WanderMode {
    Calm,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weights {
    pub sit: u32,
    pub walk: u32,
    pub climb: u32,
    pub kick: u32,
    pub jump: u32,
    pub clone_kill: u32,
    pub error: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WanderPreset {
    pub weights: Weights,
    /// Sit duration range in ticks.
    pub sit_ticks: (u32, u32),
    /// Walk duration range in ticks.
    pub walk_ticks: (u32, u32),
}

impl WanderPreset {
    /// Mostly idle, occasional short walks.
    pub fn calm() -> Self {
        Self {
            weights: Weights { sit: 200, walk: 50, climb: 10, kick: 6, jump: 2, clone_kill: 2, error: 2 },
            sit_ticks: (600, 2400),
            walk_ticks: (120, 360),
        }
    }

    /// Moves a lot; handy while debugging.
    pub fn active() -> Self {
        Self {
            weights: Weights { sit: 50, walk: 150, climb: 40, kick: 18, jump: 7, clone_kill: 5, error: 5 },
            sit_ticks: (180, 480),
            walk_ticks: (240, 900),
        }
    }

    pub fn for_mode(mode: WanderMode) -> Self {
        match mode {
            WanderMode::Calm => Self::calm(),
            WanderMode::Active => Self::active(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behavior {
    Sit,
    Walk,
    Climb,
    Kick,
    Jump,
    CloneKill,
    Error,
}

/// One-shot picks the scheduler adopts as a full state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingPick {
    CloneKill,
    Error,
    Stumble,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    WalkGround,
    WalkTop,
    ClimbLeft,
    ClimbRight,
    Kick,
    Jump,
    Fall,
    Throw,
    BadLand,
    GoodLand,
    HardLand,
    Sit,
    Drag,
}

impl Motion {
    pub fn movement(self) -> MovementState {
        match self {
            Motion::WalkGround => MovementState::Walk,
            Motion::WalkTop => MovementState::Ceiling,
            Motion::ClimbLeft | Motion::ClimbRight => MovementState::Climb,
            Motion::Kick => MovementState::Kick,
            Motion::Jump => MovementState::Jump,
            Motion::Fall | Motion::Throw => MovementState::Fall,
            Motion::BadLand | Motion::GoodLand | Motion::HardLand => MovementState::Fall,
            Motion::Sit => MovementState::Sit,
            Motion::Drag => MovementState::Drag,
        }
    }

    pub fn clip(self) -> MoveClip {
        match self {
            Motion::WalkGround => MoveClip::Walk,
            Motion::WalkTop => MoveClip::Ceiling,
            Motion::ClimbLeft | Motion::ClimbRight => MoveClip::Climb,
            Motion::Kick => MoveClip::Kick,
            Motion::Jump => MoveClip::Jump,
            Motion::Fall | Motion::Throw => MoveClip::Fall,
            Motion::BadLand => MoveClip::BadLand,
            Motion::GoodLand => MoveClip::GoodLand,
            Motion::HardLand => MoveClip::HardLand,
            Motion::Sit => MoveClip::Sit,
            Motion::Drag => MoveClip::Drag,
        }
    }
}

impl fmt::Display for Motion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Social hints for this tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProximityInfo {
    pub block_sit: bool,
    pub peer_nearby: bool,
    /// A fight is being negotiated: no stumbles and no one-shot picks.
    pub hold_picks: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WanderStep {
    pub motion: Motion,
    pub movement: MovementState,
    pub clip: MoveClip,
    pub facing: Facing,
    pub x: f64,
    pub y: f64,
    pub dx: f64,
    pub dy: f64,
    pub pending: Option<PendingPick>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Bounds {
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
}

pub struct WanderEngine {
    monitors: Vec<Rect>,
    active_idx: usize,
    body: Body,
    margin: f64,
    preset: WanderPreset,
    rng: StdRng,
    bounds: Bounds,

    x: f64,
    y: f64,
    direction: Facing,
    motion: Motion,
    sit_timer: u32,
    walk_timer: u32,
    walk_speed: f64,
    fall_speed: f64,
    land_timer: u32,
    throw_vx: f64,
    throw_vy: f64,
    fall_start_y: f64,
    jump_vx: f64,
    jump_vy: f64,
    jump_peak_y: f64,
    pending: Option<PendingPick>,
}

impl WanderEngine {
    /// Starts sitting on the floor of the first monitor at a random spot.
    pub fn new(monitors: Vec<Rect>, body: Body, preset: WanderPreset, mut rng: StdRng) -> Self {
        let monitors = if monitors.is_empty() { vec![Rect::default()] } else { monitors };
        let margin = 2.0;
        let bounds = bounds_for(&monitors[0], body, margin);
        let x = if bounds.x_max > bounds.x_min {
            rng.gen_range(bounds.x_min..=bounds.x_max)
        } else {
            bounds.x_min
        };
        let sit_timer = rng.gen_range(300..=900);
        let walk_speed = rng.gen_range(WALK_SPEED_MIN..=WALK_SPEED_MAX);
        Self {
            monitors,
            active_idx: 0,
            body,
            margin,
            preset,
            rng,
            bounds,
            x,
            y: bounds.y_max,
            direction: Facing::Left,
            motion: Motion::Sit,
            sit_timer,
            walk_timer: 0,
            walk_speed,
            fall_speed: 0.0,
            land_timer: 0,
            throw_vx: 0.0,
            throw_vy: 0.0,
            fall_start_y: 0.0,
            jump_vx: 0.0,
            jump_vy: 0.0,
            jump_peak_y: 0.0,
            pending: None,
        }
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn motion(&self) -> Motion {
        self.motion
    }

    pub fn direction(&self) -> Facing {
        self.direction
    }

    pub fn body(&self) -> Body {
        self.body
    }

    pub fn monitor_index(&self) -> usize {
        self.active_idx
    }

    pub fn floor(&self) -> f64 {
        self.bounds.y_max
    }

    /// Facing to draw with. Climb sprites face the wall.
    pub fn facing(&self) -> Facing {
        match self.motion {
            Motion::ClimbLeft => Facing::Left,
            Motion::ClimbRight => Facing::Right,
            _ => self.direction,
        }
    }

    pub fn face(&mut self, facing: Facing) {
        self.direction = facing;
    }

    /// Moves the body without any motion change, clamped to the monitor.
    pub fn teleport(&mut self, x: f64, y: f64) {
        self.x = x;
        self.y = y;
        self.set_active_monitor_at(x, y);
        self.clamp();
    }

    /// Switches the active monitor to the one containing the body centre.
    pub fn set_active_monitor_at(&mut self, x: f64, y: f64) {
        let cx = x + self.body.width / 2.0;
        let cy = y + self.body.width / 2.0;
        if let Some(idx) = self.monitors.iter().position(|m| m.contains(cx, cy)) {
            if idx != self.active_idx {
                self.active_idx = idx;
                self.bounds = bounds_for(&self.monitors[idx], self.body, self.margin);
                debug!("switched to monitor {}: {:?}", idx, self.monitors[idx]);
            }
        }
    }

    fn step(&mut self, dx: f64, dy: f64, pending: Option<PendingPick>) -> WanderStep {
        WanderStep {
            motion: self.motion,
            movement: self.motion.movement(),
            clip: self.motion.clip(),
            facing: self.facing(),
            x: self.x,
            y: self.y,
            dx,
            dy,
            pending,
        }
    }

    /// Advances one frame. With `allowed == false` nothing moves.
    pub fn tick(&mut self, allowed: bool, proximity: ProximityInfo) -> WanderStep {
        let pending = self.pending.take();
        if !allowed || self.motion == Motion::Drag {
            return self.step(0.0, 0.0, pending);
        }

        let (x0, y0) = (self.x, self.y);
        match self.motion {
            Motion::WalkGround => self.do_walk_ground(proximity),
            Motion::WalkTop => self.do_walk_top(),
            Motion::ClimbLeft => self.do_climb(Facing::Right),
            Motion::ClimbRight => self.do_climb(Facing::Left),
            Motion::Kick | Motion::Jump => self.do_jump(),
            Motion::Fall => self.do_fall(),
            Motion::Throw => self.do_throw(),
            Motion::BadLand | Motion::GoodLand | Motion::HardLand => self.do_land(),
            Motion::Sit => self.do_sit(proximity),
            Motion::Drag => {}
        }
        self.clamp();

        let pending = pending.or(self.pending.take());
        self.step(self.x - x0, self.y - y0, pending)
    }

    fn clamp(&mut self) {
        let b = self.bounds;
        self.x = self.x.max(b.x_min).min(b.x_max.max(b.x_min));
        self.y = self.y.max(b.y_min).min(b.y_max.max(b.y_min));
    }

    // --- behavior selection ---

    fn pick_behavior(&mut self, proximity: ProximityInfo) -> Behavior {
        let w = self.preset.weights;
        let mut table = vec![
            (Behavior::Sit, w.sit),
            (Behavior::Walk, w.walk),
            (Behavior::Climb, w.climb),
            (Behavior::Kick, w.kick),
            (Behavior::Jump, w.jump),
            (Behavior::CloneKill, w.clone_kill),
            (Behavior::Error, w.error),
        ];
        if proximity.block_sit {
            table.retain(|(behavior, _)| *behavior != Behavior::Sit);
        }
        if proximity.hold_picks {
            table.retain(|(behavior, _)| !matches!(behavior, Behavior::CloneKill | Behavior::Error));
        }
        match WeightedIndex::new(table.iter().map(|(_, weight)| *weight)) {
            Ok(dist) => table[dist.sample(&mut self.rng)].0,
            Err(_) if proximity.block_sit => Behavior::Walk,
            Err(_) => Behavior::Sit,
        }
    }

    fn transition(&mut self, proximity: ProximityInfo) {
        match self.pick_behavior(proximity) {
            Behavior::Sit => self.start_sit(),
            Behavior::Walk => self.start_walk(),
            Behavior::Climb => {
                if self.x <= self.bounds.x_min + CLIMB_EDGE_REACH {
                    self.motion = Motion::ClimbLeft;
                } else if self.x >= self.bounds.x_max - CLIMB_EDGE_REACH {
                    self.motion = Motion::ClimbRight;
                } else {
                    self.start_walk();
                }
            }
            Behavior::Kick => self.start_kick(),
            Behavior::Jump => self.start_jump(),
            Behavior::CloneKill => {
                self.pending = Some(PendingPick::CloneKill);
                self.start_sit();
            }
            Behavior::Error => {
                self.pending = Some(PendingPick::Error);
                self.start_sit();
            }
        }
    }

    fn walk_timer(&mut self) -> u32 {
        let (lo, hi) = self.preset.walk_ticks;
        self.rng.gen_range(lo..=hi.max(lo))
    }

    pub fn start_sit(&mut self) {
        let (lo, hi) = self.preset.sit_ticks;
        self.motion = Motion::Sit;
        self.sit_timer = self.rng.gen_range(lo..=hi.max(lo));
    }

    pub fn start_walk(&mut self) {
        self.motion = Motion::WalkGround;
        self.direction = if self.rng.gen_bool(0.5) { Facing::Left } else { Facing::Right };
        self.walk_speed = self.rng.gen_range(WALK_SPEED_MIN..=WALK_SPEED_MAX);
        self.walk_timer = self.walk_timer();
    }

    /// Small hop forward.
    pub fn start_kick(&mut self) {
        let vy = self.rng.gen_range(JUMP_VY_SMALL.0..=JUMP_VY_SMALL.1);
        self.launch(Motion::Kick, JUMP_VX_SMALL, vy);
    }

    /// Big leap forward.
    pub fn start_jump(&mut self) {
        let vy = self.rng.gen_range(JUMP_VY_BIG.0..=JUMP_VY_BIG.1);
        self.launch(Motion::Jump, JUMP_VX_BIG, vy);
    }

    fn launch(&mut self, motion: Motion, vx: f64, vy: f64) {
        self.motion = motion;
        self.jump_vx = vx * self.direction.sign();
        self.jump_vy = vy;
        self.jump_peak_y = self.y;
        self.fall_start_y = self.y;
    }

    pub fn start_fall(&mut self) {
        self.motion = Motion::Fall;
        self.fall_speed = FALL_SPEED_INIT;
        self.fall_start_y = self.y;
    }

    /// Ballistic flight with the given initial velocity. Facing follows
    /// the horizontal direction.
    pub fn start_throw(&mut self, vx: f64, vy: f64) {
        self.motion = Motion::Throw;
        self.throw_vx = vx;
        self.throw_vy = vy;
        self.direction = Facing::of_velocity(vx);
        self.fall_start_y = self.y;
    }

    // --- drag and drop ---

    pub fn begin_drag(&mut self) {
        self.motion = Motion::Drag;
    }

    pub fn drag_to(&mut self, x: f64, y: f64) {
        if self.motion != Motion::Drag {
            self.begin_drag();
        }
        self.x = x;
        self.y = y;
    }

    /// Hands the body back to physics after a drag.
    pub fn release(&mut self, vx: f64, vy: f64) {
        self.set_active_monitor_at(self.x, self.y);
        self.clamp();
        if self.y >= self.bounds.y_max - FLOOR_SNAP {
            self.y = self.bounds.y_max;
            self.start_sit();
        } else if (vx * vx + vy * vy).sqrt() > THROW_MIN_SPEED {
            self.start_throw(vx, vy);
        } else {
            self.start_fall();
        }
    }

    // --- motion states ---

    fn do_walk_ground(&mut self, proximity: ProximityInfo) {
        self.y = self.bounds.y_max;
        self.x += self.walk_speed * self.direction.sign();

        let chance = if proximity.peer_nearby { STUMBLE_CHANCE_CLOSE } else { STUMBLE_CHANCE };
        if !proximity.hold_picks && self.rng.gen::<f64>() < chance {
            self.pending = Some(PendingPick::Stumble);
            self.start_sit();
            return;
        }

        if self.x <= self.bounds.x_min {
            self.x = self.bounds.x_min;
            self.direction = Facing::Right;
            self.transition(proximity);
        } else if self.x >= self.bounds.x_max {
            self.x = self.bounds.x_max;
            self.direction = Facing::Left;
            self.transition(proximity);
        } else {
            self.walk_timer = self.walk_timer.saturating_sub(1);
            if self.walk_timer == 0 {
                self.transition(proximity);
            }
        }
    }

    fn do_walk_top(&mut self) {
        self.y = self.bounds.y_min;
        self.x += self.walk_speed * self.direction.sign();

        if self.x <= self.bounds.x_min {
            self.x = self.bounds.x_min;
            self.direction = Facing::Right;
        } else if self.x >= self.bounds.x_max {
            self.x = self.bounds.x_max;
            self.direction = Facing::Left;
        }

        if self.rng.gen::<f64>() < FALL_CHANCE_TOP {
            self.start_fall();
            return;
        }
        self.walk_timer = self.walk_timer.saturating_sub(1);
        if self.walk_timer == 0 {
            self.start_fall();
        }
    }

    /// Climbs the current wall; `then` is the walking direction once the
    /// ceiling is reached.
    fn do_climb(&mut self, then: Facing) {
        self.x = if self.motion == Motion::ClimbLeft { self.bounds.x_min } else { self.bounds.x_max };
        self.y -= CLIMB_SPEED;
        if self.y <= self.bounds.y_min {
            self.y = self.bounds.y_min;
            self.direction = then;
            self.motion = Motion::WalkTop;
            self.walk_timer = self.walk_timer();
        }
        if self.rng.gen::<f64>() < FALL_CHANCE_CLIMB {
            self.start_fall();
        }
    }

    fn do_jump(&mut self) {
        self.jump_vy += JUMP_GRAVITY;
        self.x += self.jump_vx;
        self.y += self.jump_vy;
        self.jump_peak_y = self.jump_peak_y.min(self.y);

        if self.y >= self.bounds.y_max {
            self.y = self.bounds.y_max;
            if self.rng.gen_bool(0.5) {
                self.motion = Motion::GoodLand;
                self.land_timer = GOOD_LAND_TICKS;
            } else {
                self.fall_start_y = self.jump_peak_y;
                self.land_from_fall();
            }
            return;
        }
        if self.x <= self.bounds.x_min {
            self.x = self.bounds.x_min;
            self.motion = Motion::ClimbLeft;
            return;
        }
        if self.x >= self.bounds.x_max {
            self.x = self.bounds.x_max;
            self.motion = Motion::ClimbRight;
            return;
        }
        if self.y <= self.bounds.y_min {
            self.y = self.bounds.y_min;
            self.direction = Facing::of_velocity(self.jump_vx);
            self.motion = Motion::WalkTop;
            self.walk_timer = self.walk_timer();
        }
    }

    fn do_fall(&mut self) {
        self.fall_speed = (self.fall_speed + FALL_ACCEL).min(FALL_SPEED_MAX);
        self.y += self.fall_speed;
        if self.y >= self.bounds.y_max {
            self.y = self.bounds.y_max;
            self.fall_speed = 0.0;
            self.land_from_fall();
        }
    }

    fn do_throw(&mut self) {
        self.throw_vy += THROW_GRAVITY;
        self.throw_vx *= THROW_FRICTION;
        self.x += self.throw_vx;
        self.y += self.throw_vy;

        if self.y >= self.bounds.y_max {
            self.y = self.bounds.y_max;
            self.land_from_fall();
            return;
        }
        if self.y <= self.bounds.y_min {
            self.y = self.bounds.y_min;
            self.direction = Facing::of_velocity(self.throw_vx);
            self.motion = Motion::WalkTop;
            self.walk_timer = self.walk_timer();
            return;
        }
        if self.x <= self.bounds.x_min {
            self.x = self.bounds.x_min;
            self.motion = Motion::ClimbLeft;
            return;
        }
        if self.x >= self.bounds.x_max {
            self.x = self.bounds.x_max;
            self.motion = Motion::ClimbRight;
            return;
        }
        if self.throw_vx.abs() < THROW_STALL_VX {
            self.fall_speed = self.throw_vy.max(FALL_SPEED_INIT);
            self.motion = Motion::Fall;
        }
    }

    fn land_from_fall(&mut self) {
        let fall_dist = self.bounds.y_max - self.fall_start_y;
        let screen_height = self.bounds.y_max - self.bounds.y_min;
        if fall_dist > screen_height * HARD_LAND_FRACTION {
            self.motion = Motion::HardLand;
            self.land_timer = HARD_LAND_TICKS;
        } else {
            self.motion = Motion::BadLand;
            self.land_timer = BAD_LAND_TICKS;
        }
    }

    fn do_land(&mut self) {
        self.land_timer = self.land_timer.saturating_sub(1);
        if self.land_timer == 0 {
            self.motion = Motion::Sit;
            self.sit_timer = self.rng.gen_range(60..=120);
        }
    }

    fn do_sit(&mut self, proximity: ProximityInfo) {
        self.sit_timer = self.sit_timer.saturating_sub(1);
        if self.sit_timer == 0 {
            self.transition(proximity);
        }
    }
}

fn bounds_for(monitor: &Rect, body: Body, margin: f64) -> Bounds {
    Bounds {
        x_min: monitor.x + margin,
        x_max: monitor.x + monitor.width - body.width - margin,
        y_min: monitor.y + margin,
        y_max: monitor.y + monitor.height - body.height - margin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn engine(seed: u64) -> WanderEngine {
        WanderEngine::new(
            vec![Rect::new(0.0, 0.0, 1920.0, 1080.0), Rect::new(1920.0, 0.0, 1280.0, 1024.0)],
            Body { width: 128.0, height: 128.0 },
            WanderPreset::active(),
            StdRng::seed_from_u64(seed),
        )
    }

    #[test]
    fn starts_sitting_on_the_floor() {
        let w = engine(1);
        assert_eq!(w.motion(), Motion::Sit);
        assert_eq!(w.y(), 1080.0 - 128.0 - 2.0);
        assert!(w.x() >= 2.0 && w.x() <= 1920.0 - 128.0 - 2.0);
    }

    #[test]
    fn frozen_ticks_do_not_move() {
        let mut w = engine(2);
        w.start_walk();
        w.tick(true, ProximityInfo::default());
        let first = w.tick(false, ProximityInfo::default());
        for _ in 0..500 {
            let next = w.tick(false, ProximityInfo::default());
            assert_eq!(next.x.to_bits(), first.x.to_bits());
            assert_eq!(next.y.to_bits(), first.y.to_bits());
            assert_eq!((next.dx, next.dy), (0.0, 0.0));
        }
    }

    #[test]
    fn position_stays_inside_the_monitor() {
        let mut w = engine(3);
        for i in 0..20_000 {
            if i % 997 == 0 {
                w.start_jump();
            }
            let step = w.tick(true, ProximityInfo::default());
            assert!(step.x >= 2.0 && step.x <= 1920.0 - 130.0, "x out of range: {}", step.x);
            assert!(step.y >= 2.0 && step.y <= 1080.0 - 130.0, "y out of range: {}", step.y);
        }
    }

    #[test]
    fn block_sit_removes_sit_from_the_draw() {
        let mut w = engine(4);
        let blocked = ProximityInfo { block_sit: true, ..ProximityInfo::default() };
        for _ in 0..2_000 {
            assert_ne!(w.pick_behavior(blocked), Behavior::Sit);
        }
        let sits = (0..2_000)
            .filter(|_| w.pick_behavior(ProximityInfo::default()) == Behavior::Sit)
            .count();
        assert!(sits > 0);
    }

    #[test]
    fn held_picks_skip_one_shots_and_stumbles() {
        let mut w = engine(10);
        w.preset.weights = Weights { sit: 0, walk: 1, climb: 0, kick: 0, jump: 0, clone_kill: 5, error: 5 };
        let held = ProximityInfo { peer_nearby: true, hold_picks: true, ..ProximityInfo::default() };
        for _ in 0..2_000 {
            assert_eq!(w.pick_behavior(held), Behavior::Walk);
        }

        for _ in 0..50_000 {
            if w.motion() != Motion::WalkGround {
                w.start_walk();
                w.walk_timer = u32::MAX;
            }
            assert_eq!(w.tick(true, held).pending, None);
        }
    }

    #[test]
    fn climb_only_near_edges() {
        let mut w = engine(5);
        w.teleport(900.0, w.floor());
        w.preset.weights = Weights { sit: 0, walk: 0, climb: 1, kick: 0, jump: 0, clone_kill: 0, error: 0 };
        w.transition(ProximityInfo::default());
        assert_eq!(w.motion(), Motion::WalkGround);

        w.teleport(3.0, w.floor());
        w.transition(ProximityInfo::default());
        assert_eq!(w.motion(), Motion::ClimbLeft);
        assert_eq!(w.facing(), Facing::Left);
    }

    #[test]
    fn climbing_reaches_the_ceiling() {
        let mut w = engine(6);
        w.teleport(3.0, w.floor());
        w.motion = Motion::ClimbRight;
        let mut reached = false;
        for _ in 0..2_000 {
            let step = w.tick(true, ProximityInfo::default());
            if step.motion == Motion::WalkTop {
                assert_eq!(step.movement, MovementState::Ceiling);
                reached = true;
                break;
            }
            if step.motion == Motion::Fall {
                break;
            }
        }
        assert!(reached || w.motion() == Motion::Fall);
    }

    #[test]
    fn long_fall_lands_hard() {
        let mut w = engine(7);
        w.teleport(500.0, 10.0);
        w.start_fall();
        for _ in 0..1_000 {
            if w.tick(true, ProximityInfo::default()).motion != Motion::Fall {
                break;
            }
        }
        assert_eq!(w.motion(), Motion::HardLand);
        assert_eq!(w.y(), w.floor());
    }

    #[test]
    fn stumble_interrupts_a_walk() {
        let mut w = engine(8);
        let mut stumbled = false;
        for _ in 0..50_000 {
            if w.motion() != Motion::WalkGround {
                w.start_walk();
                w.walk_timer = u32::MAX;
            }
            let step = w.tick(true, ProximityInfo { peer_nearby: true, ..ProximityInfo::default() });
            if step.pending == Some(PendingPick::Stumble) {
                assert_eq!(step.motion, Motion::Sit);
                stumbled = true;
                break;
            }
        }
        assert!(stumbled);
    }

    #[test]
    fn release_near_floor_sits_and_fast_release_throws() {
        let mut w = engine(9);
        w.drag_to(400.0, w.floor() - 2.0);
        assert_eq!(w.tick(true, ProximityInfo::default()).movement, MovementState::Drag);
        w.release(5.0, -3.0);
        assert_eq!(w.motion(), Motion::Sit);

        w.drag_to(400.0, 300.0);
        w.release(5.0, -3.0);
        assert_eq!(w.motion(), Motion::Throw);
        assert_eq!(w.direction(), Facing::Right);

        w.drag_to(400.0, 300.0);
        w.release(0.1, 0.0);
        assert_eq!(w.motion(), Motion::Fall);
    }

    #[test]
    fn release_switches_monitor() {
        let mut w = engine(10);
        w.drag_to(2500.0, 400.0);
        w.release(0.0, 0.0);
        assert_eq!(w.monitor_index(), 1);
        assert_eq!(w.floor(), 1024.0 - 128.0 - 2.0);
    }

    #[test]
    fn monitor_rect_parses() {
        assert_eq!("0, 0, 2560, 1440".parse::<Rect>(), Ok(Rect::new(0.0, 0.0, 2560.0, 1440.0)));
        assert!("0,0,0,10".parse::<Rect>().is_err());
        assert!("1,2,3".parse::<Rect>().is_err());
    }
}
