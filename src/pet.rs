//! One pet instance: wires the bridge, scheduler, wander engine and social
//! coordinator together and runs them once per frame.

use crate::animations::{AnimationTable, MoveClip};
use crate::bridge::StateBridge;
use crate::channel::{epoch_millis, RecordChannel};
use crate::config::Settings;
use crate::controls::{ControlCommand, ControlInbox};
use crate::identity::InstanceId;
use crate::scheduler::{Anchor, CloneFrame, Scheduler, SchedulerEvent, FRAME_TICK};
use crate::social::{FightCommand, FightRole, SelfView, SocialCoordinator, SocialDirective};
use crate::state::{Directive, Facing, MovementState, PetState};
use crate::wander::{Motion, PendingPick, ProximityInfo, WanderEngine};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::time::{Duration, SystemTime};

/// How often the control inbox is checked.
const CONTROL_POLL: Duration = Duration::from_millis(100);

/// A peer closer than this many body widths makes stumbling likelier.
const STUMBLE_PROXIMITY: f64 = 0.5;

/// Resolved output of one tick, for a renderer or `--emit-frames`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub timestamp: u64,
    pub state: PetState,
    pub movement: Option<MovementState>,
    pub clip: Option<MoveClip>,
    pub sprite: u32,
    pub x: f64,
    pub y: f64,
    pub facing: Facing,
    pub monitor: usize,
    pub clone: Option<CloneFrame>,
    pub manual_override: bool,
    pub fight_target: Option<InstanceId>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Impulse {
    due: SystemTime,
    vx: f64,
    vy: f64,
}

pub struct Pet {
    id: InstanceId,
    scheduler: Scheduler,
    bridge: StateBridge,
    wander: WanderEngine,
    wander_enabled: bool,
    social: Option<SocialCoordinator>,
    inbox: ControlInbox,
    proximity: ProximityInfo,
    impulse: Option<Impulse>,
    last_control_poll: Option<SystemTime>,
    terminated: bool,
}

impl Pet {
    pub fn new(settings: &Settings, table: AnimationTable, now: SystemTime, seed: u64) -> Self {
        let wander = WanderEngine::new(
            settings.monitors.clone(),
            settings.body,
            settings.preset,
            StdRng::seed_from_u64(seed),
        );
        let social = settings.social.map(|tuning| {
            SocialCoordinator::new(
                settings.id.clone(),
                RecordChannel::new(&settings.runtime_dir),
                tuning,
                StdRng::seed_from_u64(seed.wrapping_add(1)),
            )
        });
        info!(
            "pet {} ({}) for session {} (state file {})",
            settings.id,
            settings.label.as_deref().unwrap_or("unlabelled"),
            settings.session,
            settings.state_file.display()
        );
        let bridge = StateBridge::new(&settings.state_file, settings.bridge, now);
        let mut scheduler = Scheduler::new(table);
        // Start from whatever the hooks last said.
        scheduler.apply_external(bridge.state());
        Self {
            id: settings.id.clone(),
            scheduler,
            bridge,
            wander,
            wander_enabled: settings.wander,
            social,
            inbox: ControlInbox::new(&settings.control_file),
            proximity: ProximityInfo::default(),
            impulse: None,
            last_control_poll: None,
            terminated: false,
        }
    }

    pub fn id(&self) -> &InstanceId {
        &self.id
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn wander(&self) -> &WanderEngine {
        &self.wander
    }

    pub fn social(&self) -> Option<&SocialCoordinator> {
        self.social.as_ref()
    }

    pub fn bridge_mut(&mut self) -> &mut StateBridge {
        &mut self.bridge
    }

    /// Set once a termination token or `quit` has been seen.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn control(&mut self, cmd: ControlCommand, now: SystemTime) {
        match cmd {
            ControlCommand::State { state } => {
                if !self.scheduler.force(state) {
                    debug!("cannot force {} right now", state);
                }
            }
            ControlCommand::Auto => {
                if self.scheduler.release_override() {
                    self.scheduler.apply_external(self.bridge.state());
                }
            }
            ControlCommand::Wander { enabled } => self.wander_enabled = enabled,
            ControlCommand::Kick if self.scheduler.state() == PetState::Idle => self.wander.start_kick(),
            ControlCommand::Jump if self.scheduler.state() == PetState::Idle => self.wander.start_jump(),
            ControlCommand::Kick | ControlCommand::Jump => debug!("busy, ignoring {:?}", cmd),
            ControlCommand::Clone => {
                self.scheduler.start_clone();
            }
            ControlCommand::Drag { x, y } => self.wander.drag_to(x, y),
            ControlCommand::Release { vx, vy } => self.wander.release(vx, vy),
            ControlCommand::Quit => {
                info!("quit requested at {}", epoch_millis(now));
                self.terminated = true;
            }
        }
        self.settle_fight(now);
    }

    /// An attack ends however the scheduler leaves `Attack`: finishing into
    /// the celebration, a forced state, "auto" or a clone.
    fn settle_fight(&mut self, now: SystemTime) {
        let state = self.scheduler.state();
        if let Some(social) = self.social.as_mut() {
            if matches!(social.engaged(), Some((_, FightRole::Attacker))) && state != PetState::Attack {
                debug!("attack over in {}", state);
                social.clear_fight(now);
            }
        }
    }

    fn negotiating(&self) -> bool {
        self.social.as_ref().map_or(false, |s| s.fight_target().is_some())
    }

    pub fn tick(&mut self, now: SystemTime) -> Frame {
        self.poll_inputs(now);
        self.fire_impulse(now);

        let allowed = self.wander_enabled && !self.scheduler.state().freezes_motion();
        let step = self.wander.tick(allowed, self.proximity);
        if let Some(pick) = step.pending {
            let free = self.scheduler.state() == PetState::Idle && !self.scheduler.manual_override();
            if !free || self.negotiating() {
                debug!("dropping wander pick {:?}", pick);
            } else {
                debug!("wander pick {:?}", pick);
                match pick {
                    PendingPick::CloneKill => {
                        self.scheduler.start_clone();
                    }
                    PendingPick::Error => {
                        self.scheduler.apply_external(PetState::Error);
                    }
                    PendingPick::Stumble => {
                        self.scheduler.apply_external(PetState::Stumble);
                    }
                }
            }
        }
        self.scheduler.set_movement(self.wander_enabled.then_some(step.clip));

        let anchor = Anchor {
            x: self.wander.x(),
            y: self.wander.y(),
            facing: self.wander.facing(),
            width: self.wander.body().width,
        };
        let sched = self.scheduler.tick(FRAME_TICK, anchor);
        for event in &sched.events {
            if let SchedulerEvent::CloneSwap { x, y } = *event {
                self.wander.teleport(x, y);
                self.wander.start_sit();
            }
        }
        self.settle_fight(now);

        let movement = self.movement();
        let directive = self.social_tick(now, movement);
        self.apply_directive(&directive, now, movement);

        Frame {
            timestamp: epoch_millis(now),
            state: sched.state,
            movement,
            clip: sched.clip,
            sprite: sched.sprite,
            x: self.wander.x(),
            y: self.wander.y(),
            facing: self.wander.facing(),
            monitor: self.wander.monitor_index(),
            clone: sched.clone,
            manual_override: self.scheduler.manual_override(),
            fight_target: self.social.as_ref().and_then(|s| s.fight_target().cloned()),
        }
    }

    fn movement(&self) -> Option<MovementState> {
        let idle = self.scheduler.state() == PetState::Idle;
        (idle && (self.wander_enabled || self.wander.motion() == Motion::Drag))
            .then(|| self.wander.motion().movement())
    }

    fn poll_inputs(&mut self, now: SystemTime) {
        let control_due = self
            .last_control_poll
            .map_or(true, |last| now.duration_since(last).unwrap_or(Duration::ZERO) >= CONTROL_POLL);
        if control_due {
            self.last_control_poll = Some(now);
            for cmd in self.inbox.drain() {
                self.control(cmd, now);
            }
        }

        match self.bridge.poll(now) {
            Some(Directive::Terminate) => {
                info!("termination token received");
                self.terminated = true;
            }
            Some(Directive::State(state)) => {
                if !self.scheduler.apply_external(state) {
                    debug!("directive {} held back", state);
                }
            }
            None => {}
        }
    }

    fn fire_impulse(&mut self, now: SystemTime) {
        let Some(impulse) = self.impulse else {
            return;
        };
        if now < impulse.due {
            return;
        }
        self.impulse = None;
        if self.scheduler.state() == PetState::Idle {
            self.wander.start_throw(impulse.vx, impulse.vy);
        }
    }

    fn social_tick(&mut self, now: SystemTime, movement: Option<MovementState>) -> SocialDirective {
        let Some(social) = self.social.as_mut() else {
            return SocialDirective::default();
        };
        let body = self.wander.body();
        let me = SelfView {
            x: self.wander.x(),
            y: self.wander.y(),
            width: body.width,
            height: body.height,
            facing: self.wander.facing(),
            state: self.scheduler.state(),
            movement,
            monitor: self.wander.monitor_index(),
        };
        social.tick(now, &me)
    }

    fn apply_directive(&mut self, directive: &SocialDirective, now: SystemTime, movement: Option<MovementState>) {
        let width = self.wander.body().width;
        self.proximity = ProximityInfo {
            block_sit: directive.block_sit,
            peer_nearby: directive
                .nearest_peer_distance
                .map_or(false, |d| d <= STUMBLE_PROXIMITY * width),
            hold_picks: self.negotiating(),
        };

        if let (Some(facing), Some(MovementState::Sit)) = (directive.forced_facing, movement) {
            self.wander.face(facing);
        }

        if let Some(cmd) = &directive.fight_command {
            self.start_fight(cmd, now);
        }
    }

    fn start_fight(&mut self, cmd: &FightCommand, now: SystemTime) {
        let center = self.wander.x() + self.wander.body().width / 2.0;
        let toward = Facing::toward(center, cmd.peer_x);
        info!("fight with {} as {:?}", cmd.peer, cmd.role);
        match cmd.role {
            FightRole::Attacker => {
                self.wander.face(toward);
                if !self.scheduler.begin_attack() {
                    debug!("attack refused in {}", self.scheduler.state());
                    if let Some(social) = self.social.as_mut() {
                        social.clear_fight(now);
                    }
                }
            }
            FightRole::Defender => {
                self.wander.face(toward);
                let (vx, vy) = match self.social.as_ref() {
                    Some(social) => social.tuning().defender_impulse(self.wander.body().width, toward.flipped()),
                    None => return,
                };
                self.impulse = Some(Impulse {
                    due: now + self.social.as_ref().map_or(Duration::ZERO, |s| s.tuning().defender_impulse_delay()),
                    vx,
                    vy,
                });
            }
        }
    }

    /// Teardown at any tick boundary: drop the choreography and our record.
    pub fn shutdown(&mut self) {
        self.scheduler.abandon();
        self.impulse = None;
        if let Some(social) = self.social.as_mut() {
            if let Err(err) = social.cleanup() {
                warn!("{}", err);
            }
        }
        info!("pet {} shut down", self.id);
    }
}
