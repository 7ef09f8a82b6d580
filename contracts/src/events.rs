//! # Escrow Events
//!
//! Every successful state change emits exactly one [`EscrowEvent`]; a
//! rejected operation emits nothing. Events go to an [`EventSink`] after
//! the state change is committed, so a sink failure is logged and never
//! undoes the change.
//!
//! Sinks compose: the node wires a [`FanoutEventSink`] that feeds both the
//! [`TracingEventSink`] (structured logs) and a [`BroadcastEventSink`]
//! (WebSocket subscribers).

use parking_lot::Mutex;
use pointlock_protocol::{ContractId, CurvePoint, Identity, Scalar, Timestamp};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::record::{AuxPoints, EscrowRecord};

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A committed escrow state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EscrowEvent {
    /// A new escrow was accepted.
    Opened {
        contract_id: ContractId,
        sender: Identity,
        receiver: Identity,
        amount: u64,
        commitment: CurvePoint,
        aux: AuxPoints,
        timelock: Timestamp,
    },
    /// The escrow was claimed with the committed scalar.
    ///
    /// The scalar is published here on purpose: in a chained exchange the
    /// next party learns it from this event and uses it to claim their own
    /// escrow.
    Withdrawn {
        contract_id: ContractId,
        claimant: Identity,
        receiver: Identity,
        secret: Scalar,
        receiver_share: u64,
        claimant_share: u64,
        /// Odd unit left in the escrow account by the floor split.
        remainder: u64,
    },
    /// The escrow was returned to its sender.
    Refunded {
        contract_id: ContractId,
        sender: Identity,
        amount: u64,
    },
}

impl EscrowEvent {
    /// Build an `Opened` event from a freshly inserted record.
    pub fn opened(contract_id: ContractId, record: &EscrowRecord) -> Self {
        let p = &record.params;
        EscrowEvent::Opened {
            contract_id,
            sender: p.sender.clone(),
            receiver: p.receiver.clone(),
            amount: p.amount,
            commitment: p.commitment,
            aux: p.aux,
            timelock: p.timelock,
        }
    }

    /// The escrow this event is about.
    pub fn contract_id(&self) -> &ContractId {
        match self {
            EscrowEvent::Opened { contract_id, .. }
            | EscrowEvent::Withdrawn { contract_id, .. }
            | EscrowEvent::Refunded { contract_id, .. } => contract_id,
        }
    }

    /// Short name, used as a log field and metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            EscrowEvent::Opened { .. } => "opened",
            EscrowEvent::Withdrawn { .. } => "withdrawn",
            EscrowEvent::Refunded { .. } => "refunded",
        }
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Why a sink could not deliver an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("event sink closed")]
    Closed,

    #[error("event delivery failed: {0}")]
    Delivery(String),
}

/// Destination for committed escrow events.
pub trait EventSink: Send + Sync {
    /// Deliver one event.
    fn emit(&self, event: &EscrowEvent) -> Result<(), SinkError>;
}

/// Writes every event as a structured `info` log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &EscrowEvent) -> Result<(), SinkError> {
        match event {
            EscrowEvent::Opened {
                contract_id,
                sender,
                receiver,
                amount,
                timelock,
                ..
            } => tracing::info!(
                contract = %contract_id,
                %sender,
                %receiver,
                amount,
                timelock,
                "escrow opened"
            ),
            EscrowEvent::Withdrawn {
                contract_id,
                claimant,
                receiver,
                receiver_share,
                claimant_share,
                remainder,
                ..
            } => tracing::info!(
                contract = %contract_id,
                %claimant,
                %receiver,
                receiver_share,
                claimant_share,
                remainder,
                "escrow withdrawn"
            ),
            EscrowEvent::Refunded {
                contract_id,
                sender,
                amount,
            } => tracing::info!(
                contract = %contract_id,
                %sender,
                amount,
                "escrow refunded"
            ),
        }
        Ok(())
    }
}

/// Publishes events on a tokio broadcast channel.
///
/// Having no subscribers is normal (nobody has a WebSocket open) and is
/// not an error.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    tx: broadcast::Sender<EscrowEvent>,
}

impl BroadcastEventSink {
    /// Create a sink with its own channel of the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Wrap an existing sender.
    pub fn from_sender(tx: broadcast::Sender<EscrowEvent>) -> Self {
        Self { tx }
    }

    /// Open a new subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<EscrowEvent> {
        self.tx.subscribe()
    }

    /// The underlying sender.
    pub fn sender(&self) -> broadcast::Sender<EscrowEvent> {
        self.tx.clone()
    }
}

impl EventSink for BroadcastEventSink {
    fn emit(&self, event: &EscrowEvent) -> Result<(), SinkError> {
        if self.tx.send(event.clone()).is_err() {
            tracing::debug!(event = event.kind(), "no event subscribers");
        }
        Ok(())
    }
}

/// Keeps every event in memory. Used to assert on emitted events.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<EscrowEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn events(&self) -> Vec<EscrowEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: &EscrowEvent) -> Result<(), SinkError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Delivers to several sinks. Every sink is tried even if an earlier one
/// fails; the first failure is returned.
#[derive(Default, Clone)]
pub struct FanoutEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink.
    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutEventSink {
    fn emit(&self, event: &EscrowEvent) -> Result<(), SinkError> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.emit(event) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
