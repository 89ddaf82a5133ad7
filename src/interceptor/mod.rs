//! The per-connection handler which turns packets into events.
//!
//! A `PacketInterceptor` sits immediately before the host's own packet
//! handler. Every message passing it in either direction is classified; if it
//! is a packet, the connection's `Session` is updated and an event is published
//! on the listener's bus. A cancelled event stops the packet where it is.

mod session;

pub use self::session::{Session, SessionState};

use crate::event::{Cancellable, EventKind, PacketEvent};
use crate::host::{Identity, User};
use crate::listener::ListenerContext;
use crate::packet::Packet;
use crate::pipeline::{Handler, HandlerContext, HandlerResult, Message, Promise};
use log::debug;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Publishes an event for every packet of one connection
pub struct PacketInterceptor {
    ctx: Arc<ListenerContext>,
    session: Mutex<Session>,
}

impl PacketInterceptor {
    /// Create an interceptor for a new connection
    pub fn new(ctx: Arc<ListenerContext>) -> Self {
        Self {
            ctx,
            session: Mutex::new(Session::new()),
        }
    }

    /// The session of the intercepted connection
    pub fn session(&self) -> MutexGuard<Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Classify and publish a message, returning whether it was cancelled
    fn intercept(&self, kind: EventKind, hctx: &HandlerContext, msg: &mut Message) -> bool {
        let namespace = &self.ctx.config().protocol_namespace;
        let packet = match Packet::classify(&mut **msg, namespace) {
            Some(packet) => packet,
            None => return false,
        };

        // the session is not held while observers run, so they may write
        // to this connection themselves
        let (identity, user): (Option<Identity>, Option<User>) = {
            let mut session = self.session();
            session.track(&packet, self.ctx.host());
            (session.identity().cloned(), session.user().cloned())
        };

        let mut event = PacketEvent::new(kind, hctx, identity, user, packet);
        self.ctx.events().publish(&mut event);

        if event.is_cancelled() {
            debug!("[{}] Cancelled {} {}", self.ctx.name(), kind, event.packet());
            true
        } else {
            false
        }
    }
}

impl Handler for PacketInterceptor {
    fn channel_read(&self, ctx: &HandlerContext, mut msg: Message) -> HandlerResult {
        if !self.intercept(EventKind::Inbound, ctx, &mut msg) {
            ctx.fire_channel_read(msg);
        }
        Ok(())
    }

    fn write(&self, ctx: &HandlerContext, mut msg: Message, promise: Promise) -> HandlerResult {
        if self.intercept(EventKind::Outbound, ctx, &mut msg) {
            // dropping the promise discards the message without completing it
            drop(promise);
        } else {
            ctx.write(msg, promise);
        }
        Ok(())
    }

    fn exception_caught(&self, ctx: &HandlerContext, cause: failure::Error) -> HandlerResult {
        ctx.fire_exception_caught(cause);
        Ok(())
    }
}
