//! Per-simulation context
//!
//! `NetContext` bundles what the prediction core needs from its host: the
//! tick clock, the transport, the configuration and an inbox of received
//! packets. Several contexts can live in one process.

use crate::reconciliation::{PacketOutcome, PredictedBody, ReconciliationEngine};
use crate::transport::{Channel, Delivery, Transport};
use crate::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::VecDeque;
use tickwise_core::{AdvanceReport, ConnectionId, EntityId, NetConfig, Tick, TickClock, TickEvent};

/// Host callbacks invoked while ticks run
pub trait TickHooks<B: PredictedBody> {
    /// Input of an owned entity for `tick`; `None` when there is none
    fn input(&mut self, entity: EntityId, tick: Tick) -> Option<B::Input>;

    /// Called after every entity was stepped for `tick`
    fn post_tick(&mut self, _tick: Tick, _engine: &ReconciliationEngine<B>) {}
}

/// What happened during one `NetContext::run_frame`
#[derive(Debug, Default)]
pub struct FrameReport {
    pub advance: AdvanceReport,
    /// Packets handled, with their outcome
    pub packets: Vec<(ConnectionId, PacketOutcome)>,
    /// Errors raised while ticking; none of them stopped the frame
    pub errors: Vec<(Tick, Error)>,
}

/// Clock, transport, configuration and inbox of one simulation
pub struct NetContext<T: Transport> {
    clock: TickClock,
    transport: T,
    config: NetConfig,
    inbox: VecDeque<Delivery>,
}

impl<T: Transport> NetContext<T> {
    /// Create a context; the configuration is validated first
    pub fn new(config: NetConfig, transport: T) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            clock: TickClock::from_config(&config)?,
            transport,
            config,
            inbox: VecDeque::new(),
        })
    }

    pub fn clock(&self) -> &TickClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut TickClock {
        &mut self.clock
    }

    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Last tick run
    pub fn tick(&self) -> Tick {
        self.clock.tick()
    }

    /// Queue bytes received from `connection`; handled at the next `PreTick`
    pub fn deliver(&mut self, bytes: Vec<u8>, channel: Channel, connection: ConnectionId) {
        self.inbox.push_back(Delivery {
            connection,
            channel,
            bytes,
        });
    }

    /// Deliveries waiting for the next tick
    pub fn pending_deliveries(&self) -> usize {
        self.inbox.len()
    }

    /// Advance the clock by `delta_seconds` and run every tick it covers
    ///
    /// Per tick: `PreTick` hands the inbox to the engine, `Tick` predicts
    /// owned entities and serves authoritative ones, `PostTick` calls
    /// `hooks.post_tick`. Errors are collected in the report and never
    /// stop the remaining ticks.
    pub fn run_frame<B, H>(
        &mut self,
        delta_seconds: f64,
        engine: &mut ReconciliationEngine<B>,
        hooks: &mut H,
    ) -> FrameReport
    where
        B: PredictedBody,
        B::Input: Serialize + DeserializeOwned,
        B::State: Serialize + DeserializeOwned,
        H: TickHooks<B>,
    {
        let mut events = Vec::new();
        let mut report = FrameReport {
            advance: self.clock.advance(delta_seconds, |event| events.push(event)),
            ..FrameReport::default()
        };

        for event in events {
            match event {
                TickEvent::PreTick(tick) => self.drain_inbox(tick, engine, &mut report),
                TickEvent::Tick(tick) => self.step(tick, engine, hooks, &mut report),
                TickEvent::PostTick(tick) => hooks.post_tick(tick, engine),
            }
        }

        report
    }

    fn drain_inbox<B>(&mut self, tick: Tick, engine: &mut ReconciliationEngine<B>, report: &mut FrameReport)
    where
        B: PredictedBody,
        B::Input: DeserializeOwned,
        B::State: DeserializeOwned,
    {
        while let Some(delivery) = self.inbox.pop_front() {
            match engine.handle_packet(&delivery.bytes, delivery.connection) {
                Ok(outcome) => report.packets.push((delivery.connection, outcome)),
                Err(err) => {
                    log::warn!("tick {}: dropping packet from {}: {}", tick, delivery.connection, err);
                    report.errors.push((tick, err));
                }
            }
        }
    }

    fn step<B, H>(
        &mut self,
        tick: Tick,
        engine: &mut ReconciliationEngine<B>,
        hooks: &mut H,
        report: &mut FrameReport,
    ) where
        B: PredictedBody,
        B::Input: Serialize,
        B::State: Serialize,
        H: TickHooks<B>,
    {
        for id in engine.entities_with(|role| role.is_owner()) {
            let input = hooks.input(id, tick);
            if let Err(err) = engine.predict(id, tick, input, &mut self.transport) {
                log::warn!("tick {}: prediction for {} failed: {}", tick, id, err);
                report.errors.push((tick, err));
            }
        }
        for id in engine.entities_with(|role| role.is_authority()) {
            if let Err(err) = engine.serve(id, &mut self.transport) {
                log::warn!("tick {}: serving {} failed: {}", tick, id, err);
                report.errors.push((tick, err));
            }
        }
    }
}
