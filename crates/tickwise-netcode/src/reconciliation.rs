//! Authoritative reconciliation
//!
//! The engine owns every predicted entity in an arena keyed by `EntityId`.
//! Depending on its role an entity is driven differently each tick:
//!
//! - **Owner**: simulates its own command at once, remembers the result and
//!   sends the newest commands to the authority. When a snapshot disagrees
//!   with the prediction for its tick, the body is reset to the snapshot and
//!   every later command is simulated again.
//! - **Authority**: applies the owner's commands in tick order and sends a
//!   snapshot of the result to the owner and observers.
//! - **Observer**: adopts every fresh snapshot as is.

use crate::replicate::{CommandReceiver, ReceiveReport};
use crate::snapshot::{Snapshot, SnapshotGate};
use crate::transport::{Channel, Transport};
use crate::wire::{self, CommandPacket, PacketKind};
use crate::{Command, Error, Predictor, Result};
use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Serialize};
use tickwise_core::{ConnectionId, EntityId, NetConfig, Tick};

/// Why a tick is being simulated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPass {
    /// First time this tick is simulated
    FirstPass,
    /// Re-simulation after a correction
    Replay,
}

/// An entity whose state is predicted and reconciled
///
/// `simulate_tick` must be pure: the same prior state and command always
/// produce the same next state, whichever pass it runs in.
pub trait PredictedBody {
    type State: Clone;
    type Input: Clone;

    fn get_state(&self) -> Self::State;

    fn set_state(&mut self, state: Self::State);

    /// Advance `prior` by one tick using `command`
    fn simulate_tick(
        &self,
        prior: &Self::State,
        command: &Command<Self::Input>,
        pass: TickPass,
    ) -> Self::State;

    /// How far apart two states are; compared against `reconcile_epsilon`
    fn divergence(&self, predicted: &Self::State, authoritative: &Self::State) -> f32;

    /// Called after every accepted snapshot, once the body state is settled
    fn reconcile(&mut self, _snapshot: &Snapshot<Self::State>) {}
}

/// Who simulates an entity and who hears about it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Local peer produces the input; `authority` confirms it
    Owner { authority: ConnectionId },
    /// Local peer decides the state and reports it
    Authority {
        owner: ConnectionId,
        observers: Vec<ConnectionId>,
    },
    /// Local peer only displays the entity
    Observer,
}

impl Role {
    pub fn is_owner(&self) -> bool {
        matches!(self, Role::Owner { .. })
    }

    pub fn is_authority(&self) -> bool {
        matches!(self, Role::Authority { .. })
    }

    pub fn is_observer(&self) -> bool {
        matches!(self, Role::Observer)
    }
}

/// Where an entity is in its per-tick cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Gather,
    Simulate,
    Send,
    AwaitSnapshot,
    Reconcile,
    Continue,
}

/// Result of handing a snapshot to the engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconcileOutcome {
    /// Not newer than the last snapshot; discarded
    Stale,
    /// Prediction was close enough; nothing replayed
    Matched { divergence: f32 },
    /// State reset to the snapshot and `ticks` commands simulated again
    Replayed {
        from: Tick,
        ticks: usize,
        /// `None` when no prediction was remembered for the snapshot's tick
        divergence: Option<f32>,
    },
    /// Observer adopted the snapshot
    Snapped,
    /// The entity is simulated locally; snapshots do not apply
    Ignored,
}

/// Result of `ReconciliationEngine::handle_packet`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PacketOutcome {
    Commands(ReceiveReport),
    Snapshot(ReconcileOutcome),
}

/// Per-entity counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngineStats {
    /// Snapshots accepted
    pub snapshots_applied: u64,
    /// Snapshots discarded as stale
    pub stale_snapshots: u64,
    /// Snapshots sent by an authority
    pub snapshots_sent: u64,
    /// Corrections that triggered a replay
    pub replays: u64,
    /// Ticks simulated again across all replays
    pub replayed_ticks: u64,
    /// Verification replays that did not reproduce the live state
    pub nondeterministic: u64,
    /// Divergence that triggered the latest replay
    pub last_correction: Option<f32>,
}

enum Lane<I, S> {
    Owner(Predictor<I, S>),
    Authority {
        receiver: CommandReceiver<I>,
        next_sequence: u32,
    },
    Observer,
}

struct Slot<B: PredictedBody> {
    body: B,
    role: Role,
    phase: Phase,
    lane: Lane<B::Input, B::State>,
    gate: SnapshotGate,
    stats: EngineStats,
}

/// Registry and driver of predicted entities
pub struct ReconciliationEngine<B: PredictedBody> {
    slots: IndexMap<EntityId, Slot<B>>,
    config: NetConfig,
}

impl<B: PredictedBody> ReconciliationEngine<B> {
    pub fn new(config: NetConfig) -> Self {
        Self {
            slots: IndexMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    /// Add an entity under `id`
    pub fn register(&mut self, id: EntityId, body: B, role: Role) -> Result<()> {
        if self.slots.contains_key(&id) {
            return Err(Error::AlreadyRegistered(id));
        }
        let lane = match &role {
            Role::Owner { .. } => Lane::Owner(Predictor::new(&self.config)),
            Role::Authority { .. } => Lane::Authority {
                receiver: CommandReceiver::from_config(&self.config),
                next_sequence: 0,
            },
            Role::Observer => Lane::Observer,
        };
        log::debug!("registered {} as {:?}", id, role);
        self.slots.insert(
            id,
            Slot {
                body,
                role,
                phase: Phase::default(),
                lane,
                gate: SnapshotGate::new(),
                stats: EngineStats::default(),
            },
        );
        Ok(())
    }

    /// Remove an entity and hand its body back
    pub fn unregister(&mut self, id: EntityId) -> Result<B> {
        self.slots
            .shift_remove(&id)
            .map(|slot| slot.body)
            .ok_or(Error::EntityNotFound(id))
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.slots.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Registered ids in registration order
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.slots.keys().copied()
    }

    /// Ids whose role satisfies `filter`
    pub fn entities_with(&self, filter: impl Fn(&Role) -> bool) -> Vec<EntityId> {
        self.slots
            .iter()
            .filter(|(_, slot)| filter(&slot.role))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn body(&self, id: EntityId) -> Option<&B> {
        self.slots.get(&id).map(|slot| &slot.body)
    }

    pub fn body_mut(&mut self, id: EntityId) -> Option<&mut B> {
        self.slots.get_mut(&id).map(|slot| &mut slot.body)
    }

    pub fn role(&self, id: EntityId) -> Option<&Role> {
        self.slots.get(&id).map(|slot| &slot.role)
    }

    pub fn phase(&self, id: EntityId) -> Option<Phase> {
        self.slots.get(&id).map(|slot| slot.phase)
    }

    pub fn stats(&self, id: EntityId) -> Option<&EngineStats> {
        self.slots.get(&id).map(|slot| &slot.stats)
    }

    /// Prediction bookkeeping of an owned entity
    pub fn predictor(&self, id: EntityId) -> Option<&Predictor<B::Input, B::State>> {
        match &self.slots.get(&id)?.lane {
            Lane::Owner(predictor) => Some(predictor),
            _ => None,
        }
    }

    /// Command reassembly of an entity this peer is authoritative for
    pub fn receiver(&self, id: EntityId) -> Option<&CommandReceiver<B::Input>> {
        match &self.slots.get(&id)?.lane {
            Lane::Authority { receiver, .. } => Some(receiver),
            _ => None,
        }
    }

    /// Run one owner tick: simulate `input`, remember the prediction and
    /// send the newest commands to the authority
    ///
    /// Returns the predicted state. A failed send is reported after the
    /// prediction has been applied and recorded.
    pub fn predict<T>(
        &mut self,
        id: EntityId,
        tick: Tick,
        input: Option<B::Input>,
        transport: &mut T,
    ) -> Result<B::State>
    where
        T: Transport,
        B::Input: Serialize,
    {
        let slot = self.slot_mut(id)?;
        let Role::Owner { authority } = slot.role else {
            return Err(role_mismatch(id, "an owner"));
        };
        let Lane::Owner(predictor) = &mut slot.lane else {
            return Err(role_mismatch(id, "an owner"));
        };
        if slot.phase == Phase::Reconcile {
            return Err(Error::ReconcileInProgress(id));
        }

        slot.phase = Phase::Gather;
        let command = Command::new(tick, input);

        slot.phase = Phase::Simulate;
        let prior = slot.body.get_state();
        let next = slot.body.simulate_tick(&prior, &command, TickPass::FirstPass);
        slot.body.set_state(next.clone());
        predictor.record(command, next.clone());
        predictor.note_missed_snapshot(id);

        slot.phase = Phase::Send;
        let sent = wire::encode_command(&predictor.redundant_packet(id)).and_then(|bytes| {
            transport
                .send(&bytes, Channel::Unreliable, authority)
                .map_err(Error::transport)
        });

        slot.phase = Phase::AwaitSnapshot;
        sent.map(|()| next)
    }

    /// Run one authority tick: apply the next command and send the
    /// resulting snapshot to the owner and every observer
    ///
    /// Returns `None` without sending anything when no command is buffered.
    pub fn serve<T>(&mut self, id: EntityId, transport: &mut T) -> Result<Option<Snapshot<B::State>>>
    where
        T: Transport,
        B::State: Serialize,
    {
        let slot = self.slot_mut(id)?;
        let Role::Authority { owner, observers } = &slot.role else {
            return Err(role_mismatch(id, "an authority"));
        };
        let Lane::Authority {
            receiver,
            next_sequence,
        } = &mut slot.lane
        else {
            return Err(role_mismatch(id, "an authority"));
        };

        slot.phase = Phase::Gather;
        let Some(command) = receiver.next_command() else {
            log::trace!("{}: no command buffered, idling", id);
            return Ok(None);
        };

        slot.phase = Phase::Simulate;
        let prior = slot.body.get_state();
        let next = slot.body.simulate_tick(&prior, &command, TickPass::FirstPass);
        slot.body.set_state(next.clone());

        slot.phase = Phase::Send;
        let snapshot = Snapshot {
            entity: id,
            tick: command.tick,
            sequence: *next_sequence,
            state: next,
        };
        *next_sequence = next_sequence.saturating_add(1);

        let bytes = wire::encode_snapshot(&snapshot);
        slot.phase = Phase::Continue;
        let bytes = bytes?;

        let mut first_error = None;
        for connection in std::iter::once(owner).chain(observers.iter()) {
            if let Err(err) = transport.send(&bytes, Channel::Unreliable, *connection) {
                log::warn!("{}: snapshot to {} not sent: {}", id, connection, err);
                if first_error.is_none() {
                    first_error = Some(Error::transport(err));
                }
            }
        }
        slot.stats.snapshots_sent += 1;

        match first_error {
            Some(err) => Err(err),
            None => Ok(Some(snapshot)),
        }
    }

    /// Buffer commands received for an entity this peer is authoritative for
    pub fn receive_commands(&mut self, packet: CommandPacket<B::Input>) -> Result<ReceiveReport> {
        let id = packet.entity;
        match &mut self.slot_mut(id)?.lane {
            Lane::Authority { receiver, .. } => Ok(receiver.receive_packet(packet)),
            _ => Err(role_mismatch(id, "an authority")),
        }
    }

    /// Apply an authoritative snapshot
    ///
    /// Owners replay their unconfirmed commands when the prediction for the
    /// snapshot's tick is missing or diverges by more than
    /// `reconcile_epsilon`. Observers adopt the snapshot. Authorities ignore
    /// it.
    pub fn receive_snapshot(&mut self, snapshot: Snapshot<B::State>) -> Result<ReconcileOutcome> {
        let id = snapshot.entity;
        let epsilon = self.config.reconcile_epsilon;
        let verify = self.config.verify_determinism;
        let slot = self.slot_mut(id)?;

        debug_assert_ne!(slot.phase, Phase::Reconcile, "nested reconciliation for {}", id);
        if slot.phase == Phase::Reconcile {
            return Err(Error::ReconcileInProgress(id));
        }
        if matches!(slot.lane, Lane::Authority { .. }) {
            log::debug!("{}: authority ignores snapshot for tick {}", id, snapshot.tick);
            return Ok(ReconcileOutcome::Ignored);
        }

        if !slot.gate.admit(&snapshot.header()) {
            slot.stats.stale_snapshots += 1;
            log::trace!(
                "{}: stale snapshot for tick {} (seq {}) discarded",
                id,
                snapshot.tick,
                snapshot.sequence
            );
            return Ok(ReconcileOutcome::Stale);
        }
        slot.stats.snapshots_applied += 1;

        let outcome = match &mut slot.lane {
            Lane::Owner(predictor) => {
                slot.phase = Phase::Reconcile;
                let settings = ReplaySettings { epsilon, verify };
                reconcile_owner(id, &mut slot.body, predictor, &mut slot.stats, &snapshot, settings)
            }
            _ => {
                slot.body.set_state(snapshot.state.clone());
                ReconcileOutcome::Snapped
            }
        };

        slot.body.reconcile(&snapshot);
        slot.phase = Phase::Continue;
        Ok(outcome)
    }

    /// Decode an inbound packet from `from` and dispatch it
    ///
    /// Stale snapshots are rejected from their header alone; their state is
    /// never decoded.
    pub fn handle_packet(&mut self, bytes: &[u8], from: ConnectionId) -> Result<PacketOutcome>
    where
        B::Input: DeserializeOwned,
        B::State: DeserializeOwned,
    {
        match wire::peek_kind(bytes)? {
            PacketKind::Command => {
                let packet: CommandPacket<B::Input> = wire::decode_command(bytes)?;
                self.check_sender(packet.entity, from)?;
                Ok(PacketOutcome::Commands(self.receive_commands(packet)?))
            }
            PacketKind::Snapshot => {
                let header = wire::peek_snapshot_header(bytes)?;
                self.check_sender(header.entity, from)?;

                let slot = self.slot_mut(header.entity)?;
                if slot.gate.is_stale(&header) {
                    slot.stats.stale_snapshots += 1;
                    log::trace!("{}: stale snapshot header for tick {}", header.entity, header.tick);
                    return Ok(PacketOutcome::Snapshot(ReconcileOutcome::Stale));
                }

                let snapshot = wire::decode_snapshot(bytes)?;
                Ok(PacketOutcome::Snapshot(self.receive_snapshot(snapshot)?))
            }
        }
    }

    fn check_sender(&self, id: EntityId, from: ConnectionId) -> Result<()> {
        let slot = self.slots.get(&id).ok_or(Error::EntityNotFound(id))?;
        let allowed = match &slot.role {
            Role::Owner { authority } => *authority == from,
            Role::Authority { owner, .. } => *owner == from,
            Role::Observer => true,
        };
        if allowed {
            Ok(())
        } else {
            Err(Error::UnexpectedSender {
                entity: id,
                connection: from,
            })
        }
    }

    fn slot_mut(&mut self, id: EntityId) -> Result<&mut Slot<B>> {
        self.slots.get_mut(&id).ok_or(Error::EntityNotFound(id))
    }
}

#[derive(Clone, Copy)]
struct ReplaySettings {
    epsilon: f32,
    verify: bool,
}

fn reconcile_owner<B: PredictedBody>(
    id: EntityId,
    body: &mut B,
    predictor: &mut Predictor<B::Input, B::State>,
    stats: &mut EngineStats,
    snapshot: &Snapshot<B::State>,
    settings: ReplaySettings,
) -> ReconcileOutcome {
    let tick = snapshot.tick;
    predictor.note_snapshot();
    predictor.acknowledge(tick);

    let divergence = predictor
        .predicted_state(tick)
        .map(|predicted| body.divergence(predicted, &snapshot.state));
    let diverged = divergence.map_or(true, |d| exceeds(d, settings.epsilon));
    if !diverged && !settings.verify {
        return ReconcileOutcome::Matched {
            divergence: divergence.unwrap_or_default(),
        };
    }

    let commands = predictor.replay_after(tick);
    let mut state = snapshot.state.clone();
    let mut corrected = Vec::with_capacity(commands.len());
    for command in &commands {
        state = body.simulate_tick(&state, command, TickPass::Replay);
        corrected.push((command.tick, state.clone()));
    }

    if diverged {
        predictor.correct(tick, snapshot.state.clone());
        for (replayed_tick, replayed) in corrected {
            predictor.correct(replayed_tick, replayed);
        }
        body.set_state(state);

        stats.replays += 1;
        stats.replayed_ticks += commands.len() as u64;
        stats.last_correction = divergence;
        log::debug!(
            "{}: correction at tick {} (divergence {:?}), replayed {} ticks",
            id,
            tick,
            divergence,
            commands.len()
        );
        return ReconcileOutcome::Replayed {
            from: tick,
            ticks: commands.len(),
            divergence,
        };
    }

    let drift = body.divergence(&body.get_state(), &state);
    if exceeds(drift, settings.epsilon) {
        stats.nondeterministic += 1;
        log::warn!(
            "{}: non-deterministic divergence {} replaying {} ticks from {}",
            id,
            drift,
            commands.len(),
            tick
        );
    }
    ReconcileOutcome::Matched {
        divergence: divergence.unwrap_or_default(),
    }
}

fn exceeds(divergence: f32, epsilon: f32) -> bool {
    divergence.is_nan() || divergence > epsilon
}

fn role_mismatch(entity: EntityId, expected: &'static str) -> Error {
    Error::RoleMismatch { entity, expected }
}
