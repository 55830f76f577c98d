//! Social coordination between independent pet processes.
//!
//! Each instance heartbeats a [`PositionRecord`] through the shared
//! [`RecordChannel`] and reads everyone else's. From those snapshots it
//! derives per-tick hints (don't sit here, look at your neighbour) and
//! negotiates fights.
//!
//! A fight needs both sides to agree. The proposal rides inside the
//! regular heartbeat as `fight_target`:
//!
//! 1. A, eligible and lucky, points its `fight_target` at B.
//! 2. B sees the proposal, re-checks eligibility and points back at A.
//! 3. Each side delivers its fight command once it sees mutual targeting.
//!
//! Unanswered proposals expire, delivery happens once per engagement, and
//! a finished pair cools down before it can fight again. Lost or late
//! heartbeats only delay things.

use crate::channel::{PeerRecord, PositionRecord, RecordChannel};
use crate::error::ChannelError;
use crate::identity::InstanceId;
use crate::state::{Facing, MovementState, PetState};
use crate::wander::THROW_GRAVITY;
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialTuning {
    /// Publish our record every this many ticks.
    pub publish_every_ticks: u32,
    pub refresh_interval_ms: u64,
    /// Records older than this are dead.
    pub stale_after_ms: u64,
    /// Chance per second of proposing a fight to an eligible neighbour.
    pub fight_chance_per_sec: f64,
    pub fight_cooldown_secs: u64,
    pub proposal_ttl_ms: u64,
    /// Distances below, in body widths.
    pub block_sit_distance: f64,
    pub face_distance: f64,
    pub fight_distance: f64,
    pub defender_release_ms: u64,
    /// Upper bound on an attack; covers the attack and celebration clips.
    pub attacker_release_ms: u64,
    pub defender_impulse_delay_ms: u64,
    pub defender_impulse_vy: f64,
}

impl Default for SocialTuning {
    fn default() -> Self {
        Self {
            publish_every_ticks: 10,
            refresh_interval_ms: 300,
            stale_after_ms: 3000,
            fight_chance_per_sec: 0.01,
            fight_cooldown_secs: 10,
            proposal_ttl_ms: 3000,
            block_sit_distance: 1.5,
            face_distance: 3.0,
            fight_distance: 0.6,
            defender_release_ms: 2000,
            attacker_release_ms: 3000,
            defender_impulse_delay_ms: 250,
            defender_impulse_vy: -2.5,
        }
    }
}

impl SocialTuning {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.fight_cooldown_secs)
    }

    pub fn proposal_ttl(&self) -> Duration {
        Duration::from_millis(self.proposal_ttl_ms)
    }

    pub fn defender_release(&self) -> Duration {
        Duration::from_millis(self.defender_release_ms)
    }

    pub fn attacker_release(&self) -> Duration {
        Duration::from_millis(self.attacker_release_ms)
    }

    /// How long an engagement in `role` lasts at most.
    pub fn release_after(&self, role: FightRole) -> Duration {
        match role {
            FightRole::Attacker => self.attacker_release(),
            FightRole::Defender => self.defender_release(),
        }
    }

    pub fn defender_impulse_delay(&self) -> Duration {
        Duration::from_millis(self.defender_impulse_delay_ms)
    }

    /// Proposal odds for one refresh.
    fn proposal_chance(&self) -> f64 {
        (self.fight_chance_per_sec * self.refresh_interval().as_secs_f64()).clamp(0.0, 1.0)
    }

    /// Knock-back for a defender of the given width, pushed in `away`.
    /// Horizontal speed is chosen so the arc clears 1.3x the fight distance.
    pub fn defender_impulse(&self, width: f64, away: Facing) -> (f64, f64) {
        let vy = self.defender_impulse_vy;
        let airtime = (2.0 * vy.abs() / THROW_GRAVITY).max(1.0);
        let vx = 1.3 * self.fight_distance * width / airtime;
        (vx * away.sign(), vy)
    }
}

/// What this instance looks like right now.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelfView {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub facing: Facing,
    pub state: PetState,
    pub movement: Option<MovementState>,
    pub monitor: usize,
}

impl SelfView {
    pub fn center_x(&self) -> f64 {
        self.x + self.width / 2.0
    }

    fn record(&self, fight_target: Option<InstanceId>, now: SystemTime) -> PositionRecord {
        PositionRecord {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            facing: self.facing,
            state: self.state,
            movement: self.movement,
            monitor: self.monitor,
            fight_target,
            timestamp: crate::channel::epoch_millis(now),
        }
    }

    fn can_fight(&self) -> bool {
        self.state == PetState::Idle && self.movement == Some(MovementState::Walk)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FightRole {
    Attacker,
    Defender,
}

impl FightRole {
    /// The smaller identity attacks. Both sides compute the same answer.
    pub fn assign(me: &InstanceId, peer: &InstanceId) -> FightRole {
        if me < peer {
            FightRole::Attacker
        } else {
            FightRole::Defender
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FightCommand {
    pub role: FightRole,
    pub peer: InstanceId,
    /// Peer's horizontal centre when the fight was confirmed.
    pub peer_x: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SocialDirective {
    pub block_sit: bool,
    pub forced_facing: Option<Facing>,
    pub fight_command: Option<FightCommand>,
    /// Horizontal distance to the nearest live peer on our monitor.
    pub nearest_peer_distance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
enum Fight {
    None,
    Proposed { target: InstanceId, since: SystemTime },
    Engaged { target: InstanceId, role: FightRole, since: SystemTime },
}

pub struct SocialCoordinator {
    id: InstanceId,
    channel: RecordChannel,
    tuning: SocialTuning,
    rng: StdRng,
    peers: Vec<PeerRecord>,
    fight: Fight,
    cooldowns: HashMap<InstanceId, SystemTime>,
    pending: Option<FightCommand>,
    ticks: u64,
    publish_due: bool,
    last_refresh: Option<SystemTime>,
}

impl SocialCoordinator {
    pub fn new(id: InstanceId, channel: RecordChannel, tuning: SocialTuning, rng: StdRng) -> Self {
        Self {
            id,
            channel,
            tuning,
            rng,
            peers: Vec::new(),
            fight: Fight::None,
            cooldowns: HashMap::new(),
            pending: None,
            ticks: 0,
            publish_due: true,
            last_refresh: None,
        }
    }

    pub fn id(&self) -> &InstanceId {
        &self.id
    }

    pub fn tuning(&self) -> &SocialTuning {
        &self.tuning
    }

    pub fn peers(&self) -> &[PeerRecord] {
        &self.peers
    }

    /// Identity we currently point our heartbeat at, if any.
    pub fn fight_target(&self) -> Option<&InstanceId> {
        match &self.fight {
            Fight::None => None,
            Fight::Proposed { target, .. } | Fight::Engaged { target, .. } => Some(target),
        }
    }

    pub fn engaged(&self) -> Option<(&InstanceId, FightRole)> {
        match &self.fight {
            Fight::Engaged { target, role, .. } => Some((target, *role)),
            _ => None,
        }
    }

    /// One frame of social work: heartbeat, refresh on cadence, derive.
    pub fn tick(&mut self, now: SystemTime, me: &SelfView) -> SocialDirective {
        self.ticks += 1;

        if let Fight::Engaged { role, since, .. } = self.fight {
            if elapsed(since, now) >= self.tuning.release_after(role) {
                self.clear_fight(now);
            }
        }

        let refresh_due = self
            .last_refresh
            .map_or(true, |last| elapsed(last, now) >= self.tuning.refresh_interval());
        if refresh_due {
            self.refresh_peers(now, me);
        }

        let every = u64::from(self.tuning.publish_every_ticks.max(1));
        if self.publish_due || self.ticks % every == 0 {
            if let Err(err) = self.publish(now, me) {
                warn!("{}", err);
            }
        }

        self.derive_directive(now, me)
    }

    pub fn publish(&mut self, now: SystemTime, me: &SelfView) -> Result<(), ChannelError> {
        let record = me.record(self.fight_target().cloned(), now);
        self.channel.publish(&self.id, &record)?;
        self.publish_due = false;
        Ok(())
    }

    /// Re-reads the shared medium and advances the fight handshake.
    pub fn refresh_peers(&mut self, now: SystemTime, me: &SelfView) {
        self.last_refresh = Some(now);
        self.peers = self.channel.read_peers(&self.id, now, self.tuning.stale_after());
        let cooldown = self.tuning.cooldown();
        self.cooldowns.retain(|_, at| elapsed(*at, now) < cooldown);
        self.advance_handshake(now, me);
    }

    fn peer(&self, id: &InstanceId) -> Option<&PeerRecord> {
        self.peers.iter().find(|p| &p.id == id)
    }

    fn in_range(&self, me: &SelfView, peer: &PeerRecord) -> bool {
        let rec = &peer.record;
        rec.monitor == me.monitor && (rec.center_x() - me.center_x()).abs() <= self.tuning.fight_distance * me.width
    }

    fn eligible(&self, me: &SelfView, peer: &PeerRecord) -> bool {
        let rec = &peer.record;
        me.can_fight()
            && rec.state == PetState::Idle
            && rec.movement == Some(MovementState::Walk)
            && self.in_range(me, peer)
            && !self.cooldowns.contains_key(&peer.id)
    }

    /// Checked on our side when the answer arrives. The peer may already be
    /// attacking, so only our own readiness and the distance count.
    fn confirmable(&self, me: &SelfView, peer: &PeerRecord) -> bool {
        me.can_fight() && self.in_range(me, peer)
    }

    fn advance_handshake(&mut self, now: SystemTime, me: &SelfView) {
        match self.fight.clone() {
            Fight::Engaged { target, .. } => match self.peer(&target) {
                None => {
                    debug!("fight peer {} vanished", target);
                    self.clear_fight(now);
                }
                Some(p) if p.record.fight_target.as_ref() != Some(&self.id) => {
                    debug!("fight peer {} let go", target);
                    self.clear_fight(now);
                }
                Some(_) => {}
            },
            Fight::Proposed { target, since } => {
                let answer = self.peer(&target).map(|p| {
                    let mutual = p.record.fight_target.as_ref() == Some(&self.id);
                    (mutual, self.confirmable(me, p), p.record.center_x())
                });
                match answer {
                    Some((true, true, peer_x)) => {
                        let role = FightRole::assign(&self.id, &target);
                        debug!("fight with {} confirmed, we are {:?}", target, role);
                        self.pending = Some(FightCommand { role, peer: target.clone(), peer_x });
                        self.fight = Fight::Engaged { target, role, since: now };
                    }
                    Some((false, _, _)) if elapsed(since, now) < self.tuning.proposal_ttl() => {}
                    Some((true, false, _)) => {
                        debug!("dropping fight with {}, no longer ready", target);
                        self.fight = Fight::None;
                        self.publish_due = true;
                    }
                    _ => {
                        debug!("proposal to {} expired", target);
                        self.fight = Fight::None;
                        self.publish_due = true;
                    }
                }
            }
            Fight::None => {
                let incoming = self
                    .peers
                    .iter()
                    .find(|p| p.record.fight_target.as_ref() == Some(&self.id))
                    .filter(|p| self.eligible(me, p))
                    .map(|p| p.id.clone());
                if let Some(target) = incoming {
                    debug!("countering proposal from {}", target);
                    self.fight = Fight::Proposed { target, since: now };
                    self.publish_due = true;
                    return;
                }

                let nearest = self
                    .peers
                    .iter()
                    .filter(|p| self.eligible(me, p))
                    .min_by(|a, b| {
                        let da = (a.record.center_x() - me.center_x()).abs();
                        let db = (b.record.center_x() - me.center_x()).abs();
                        da.total_cmp(&db)
                    })
                    .map(|p| p.id.clone());
                if let Some(target) = nearest {
                    if self.rng.gen::<f64>() < self.tuning.proposal_chance() {
                        debug!("proposing fight to {}", target);
                        self.fight = Fight::Proposed { target, since: now };
                        self.publish_due = true;
                    }
                }
            }
        }
    }

    /// Hints for this tick. A fight command is handed out at most once.
    pub fn derive_directive(&mut self, now: SystemTime, me: &SelfView) -> SocialDirective {
        let stale_after = self.tuning.stale_after();
        let nearest = self
            .peers
            .iter()
            .filter(|p| p.record.monitor == me.monitor && p.record.age(now) <= stale_after)
            .map(|p| (p.record.center_x(), (p.record.center_x() - me.center_x()).abs()))
            .min_by(|a, b| a.1.total_cmp(&b.1));

        let mut directive = SocialDirective {
            nearest_peer_distance: nearest.map(|(_, d)| d),
            fight_command: self.pending.take(),
            ..SocialDirective::default()
        };
        if let Some((peer_x, distance)) = nearest {
            match me.movement {
                Some(MovementState::Walk) if distance <= self.tuning.block_sit_distance * me.width => {
                    directive.block_sit = true;
                }
                Some(MovementState::Sit) if distance <= self.tuning.face_distance * me.width => {
                    directive.forced_facing = Some(Facing::toward(me.center_x(), peer_x));
                }
                _ => {}
            }
        }
        directive
    }

    /// Ends the current engagement or proposal and starts the pair cooldown.
    pub fn clear_fight(&mut self, now: SystemTime) {
        if let Fight::Engaged { target, .. } = &self.fight {
            debug!("fight with {} over", target);
            self.cooldowns.insert(target.clone(), now);
        }
        self.fight = Fight::None;
        self.pending = None;
        self.publish_due = true;
    }

    /// Removes our record from the shared medium.
    pub fn cleanup(&mut self) -> Result<(), ChannelError> {
        self.fight = Fight::None;
        self.pending = None;
        self.channel.remove(&self.id)
    }
}

fn elapsed(since: SystemTime, now: SystemTime) -> Duration {
    now.duration_since(since).unwrap_or(Duration::ZERO)
}
