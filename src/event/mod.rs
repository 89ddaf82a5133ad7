//! Events published for every intercepted packet.
//!
//! Each classified packet produces a `PacketEvent`, either inbound (received
//! from the client) or outbound (being sent to the client). Observers may
//! inspect or modify the packet, and may cancel the event to stop the packet
//! from travelling any further through the pipeline.

mod bus;

pub use self::bus::{EventBus, ObserverResult, Priority, SubscriptionId};
pub(crate) use self::bus::panic_message;

use crate::host::{Identity, User};
use crate::packet::Packet;
use crate::pipeline::HandlerContext;
use std::fmt;

/// Something which may be cancelled by an observer
pub trait Cancellable {
    /// Whether this has been cancelled
    fn is_cancelled(&self) -> bool;

    /// Cancel this, or undo a previous cancellation
    fn set_cancelled(&mut self, cancelled: bool);
}

/// The kind of traffic an event was raised for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A packet was received
    Inbound,

    /// A packet is being sent
    Outbound,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            EventKind::Inbound => "INBOUND",
            EventKind::Outbound => "OUTBOUND",
        })
    }
}

/// An intercepted packet
pub struct PacketEvent<'a> {
    kind: EventKind,
    ctx: &'a HandlerContext,
    identity: Option<Identity>,
    user: Option<User>,
    packet: Packet<'a>,
    cancelled: bool,
}

impl<'a> PacketEvent<'a> {
    /// Create a new, uncancelled event
    pub fn new(
        kind: EventKind,
        ctx: &'a HandlerContext,
        identity: Option<Identity>,
        user: Option<User>,
        packet: Packet<'a>,
    ) -> Self {
        Self {
            kind,
            ctx,
            identity,
            user,
            packet,
            cancelled: false,
        }
    }

    /// Create a new event for a received packet
    pub fn inbound(
        ctx: &'a HandlerContext,
        identity: Option<Identity>,
        user: Option<User>,
        packet: Packet<'a>,
    ) -> Self {
        Self::new(EventKind::Inbound, ctx, identity, user, packet)
    }

    /// Create a new event for a packet being sent
    pub fn outbound(
        ctx: &'a HandlerContext,
        identity: Option<Identity>,
        user: Option<User>,
        packet: Packet<'a>,
    ) -> Self {
        Self::new(EventKind::Outbound, ctx, identity, user, packet)
    }

    /// Whether the packet is being received or sent
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// The pipeline context of the intercepting handler
    pub fn context(&self) -> &HandlerContext {
        self.ctx
    }

    /// The identity exchanged during login, if seen yet
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// The online user behind the connection, if resolved yet
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// The intercepted packet
    pub fn packet(&self) -> &Packet<'a> {
        &self.packet
    }

    /// The intercepted packet, for modification
    pub fn packet_mut(&mut self) -> &mut Packet<'a> {
        &mut self.packet
    }
}

impl<'a> Cancellable for PacketEvent<'a> {
    fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }
}

impl<'a> fmt::Debug for PacketEvent<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PacketEvent")
            .field("kind", &self.kind)
            .field("ctx", &self.ctx)
            .field("identity", &self.identity)
            .field("user", &self.user)
            .field("packet", &self.packet)
            .field("cancelled", &self.cancelled)
            .finish()
    }
}
