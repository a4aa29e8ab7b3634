//! The ordering and delivery engine: a node's pending queue, acknowledgment
//! bookkeeping, and the head-of-line drain that releases messages in the
//! group-wide total order.
//!
//! [`Engine`] is plain synchronous state. It is owned by exactly one ordering
//! worker, which feeds it arrivals one at a time and carries out the
//! [effects][Effect] it returns.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::{
    clock::LamportClock,
    error::ProtocolError,
    message::{Kind, Message, MessageId},
};

#[derive(Debug)]
pub struct Engine {
    clock: LamportClock,
    group: usize,
    pending: BTreeMap<MessageId, Pending>,
    /// Distinct members (by originator index) that acknowledged each multicast.
    acks: HashMap<MessageId, HashSet<u32>>,
    /// Multicasts this member has already acknowledged.
    acked: HashSet<MessageId>,
    delivered: u64,
}

/// A received message awaiting delivery. Acknowledgments are never queued.
#[derive(Debug)]
enum Pending {
    Direct(Message),
    Multicast(Message),
}

impl Pending {
    fn into_message(self) -> Message {
        match self {
            Pending::Direct(message) | Pending::Multicast(message) => message,
        }
    }
}

/// Something the worker must do on the [engine's][Engine] behalf.
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum Effect {
    /// Hand the message's payload to the application, in this order.
    Deliver(Message),
    /// Send this acknowledgment to every member of the group, this one
    /// included.
    Broadcast(Message),
}

/// The multicast currently blocking the head of the pending queue.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct Head {
    pub id: MessageId,
    pub acks: usize,
    pub group: usize,
}

/// A point-in-time view of an [`Engine`].
#[derive(PartialEq, Eq, Copy, Clone, Default, Debug)]
pub struct Summary {
    /// The Lamport clock value.
    pub clock: u64,
    /// Messages handed to the application so far.
    pub delivered: u64,
    /// Received messages not yet delivered.
    pub pending: usize,
    /// Multicasts with acknowledgments recorded but not yet delivered.
    pub awaiting_acks: usize,
}

impl Engine {
    /// Create the engine for member `origin` of a group of `group` members.
    pub fn new(origin: u32, group: usize) -> Self {
        Self {
            clock: LamportClock::new(origin),
            group,
            pending: BTreeMap::new(),
            acks: HashMap::new(),
            acked: HashSet::new(),
            delivered: 0,
        }
    }

    #[inline]
    pub fn clock(&self) -> &LamportClock {
        &self.clock
    }

    /// Create a new message from this member with a fresh ID.
    pub fn stamp(&mut self, kind: Kind, payload: impl Into<String>) -> Message {
        Message::new(self.clock.next_id(), kind, payload)
    }

    /// Process one arrived message and drain whatever became deliverable.
    ///
    /// A malformed message is rejected before any state changes.
    pub fn receive(&mut self, message: Message) -> Result<Vec<Effect>, ProtocolError> {
        let id = message.id;
        self.check_origin(id)?;

        match message.kind {
            Kind::Ack => {
                let target = message.ack_target()?;
                self.check_origin(target)?;

                self.clock.observe(id.clock);
                self.acks.entry(target).or_default().insert(id.origin);
            }
            Kind::P2p => self.enqueue(Pending::Direct(message)),
            Kind::Multicast => self.enqueue(Pending::Multicast(message)),
        }

        let mut effects = Vec::new();
        self.drain(&mut effects);

        Ok(effects)
    }

    /// The multicast at the head of the pending queue, if one is waiting on
    /// acknowledgments.
    pub fn head(&self) -> Option<Head> {
        match self.pending.first_key_value()? {
            (id, Pending::Multicast(_)) => Some(Head {
                id: *id,
                acks: self.ack_count(id),
                group: self.group,
            }),
            (_, Pending::Direct(_)) => None,
        }
    }

    pub fn summary(&self) -> Summary {
        Summary {
            clock: self.clock.value(),
            delivered: self.delivered,
            pending: self.pending.len(),
            awaiting_acks: self.acks.len(),
        }
    }

    fn enqueue(&mut self, pending: Pending) {
        let id = match &pending {
            Pending::Direct(message) | Pending::Multicast(message) => message.id,
        };

        self.clock.observe(id.clock);
        self.pending.insert(id, pending);
    }

    fn drain(&mut self, effects: &mut Vec<Effect>) {
        while let Some(entry) = self.pending.first_entry() {
            let id = *entry.key();

            if matches!(entry.get(), Pending::Multicast(_)) {
                if self.acked.insert(id) {
                    let ack = Message::ack(self.clock.next_id(), id);
                    effects.push(Effect::Broadcast(ack));
                }

                let acks = self.acks.get(&id).map(HashSet::len).unwrap_or_default();
                if acks < self.group {
                    // everything behind an unacknowledged head waits
                    break;
                }

                self.acks.remove(&id);
                self.acked.remove(&id);
            }

            let message = entry.remove().into_message();
            self.deliver(message, effects);
        }
    }

    fn deliver(&mut self, message: Message, effects: &mut Vec<Effect>) {
        self.delivered += 1;
        effects.push(Effect::Deliver(message));
    }

    fn ack_count(&self, id: &MessageId) -> usize {
        self.acks.get(id).map(HashSet::len).unwrap_or_default()
    }

    fn check_origin(&self, id: MessageId) -> Result<(), ProtocolError> {
        if (id.origin as usize) < self.group {
            Ok(())
        } else {
            Err(ProtocolError::Origin {
                origin: id.origin,
                group: self.group,
            })
        }
    }
}
