use crate::event::panic_message;
use crate::host::{Host, Identity, User};
use crate::packet::{Direction, Packet, Stage};
use log::{trace, warn};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// How far identity resolution has progressed for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No login packet carrying an identity has been seen yet
    NoIdentity,

    /// An identity was seen, but the user is not online yet
    IdentityPending,

    /// The online user behind the connection is known
    Resolved,
}

/// The identity of the user behind one connection, resolved on a best-effort
/// basis from the login packets passing through it
#[derive(Debug, Default)]
pub struct Session {
    identity: Option<Identity>,
    user: Option<User>,
}

impl Session {
    /// Create a session with nothing known yet
    pub fn new() -> Self {
        Self::default()
    }

    /// The current state of the session
    pub fn state(&self) -> SessionState {
        match (&self.identity, &self.user) {
            (_, Some(_)) => SessionState::Resolved,
            (Some(_), None) => SessionState::IdentityPending,
            (None, None) => SessionState::NoIdentity,
        }
    }

    /// The identity exchanged during login, if seen yet
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// The resolved online user. Once set it never changes.
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Update the session from a classified packet. Failures are discarded,
    /// as tracking must never interfere with the traffic itself. This includes
    /// a panicking host.
    pub fn track(&mut self, packet: &Packet, host: &dyn Host) {
        match catch_unwind(AssertUnwindSafe(|| self.try_track(packet, host))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => trace!("Ignoring session tracking failure on {}: {}", packet, e),
            Err(panic) => warn!(
                "Ignoring panic while tracking the session on {}: {}",
                packet,
                panic_message(&panic)
            ),
        }
    }

    fn try_track(&mut self, packet: &Packet, host: &dyn Host) -> Result<(), failure::Error> {
        if carries_identity(packet) {
            if let Some(identity) = packet.field_of_type_at::<Identity>(0)? {
                trace!("Identity {} ({}) seen in {}", identity.name(), identity.id(), packet);
                self.identity = Some(identity);
            }
        }

        if self.user.is_none() {
            if let Some(identity) = &self.identity {
                self.user = host.lookup_online_user(identity.id())?;
            }
        }

        Ok(())
    }
}

/// Whether the packet is one of the login packets carrying the identity
fn carries_identity(packet: &Packet) -> bool {
    if packet.stage() != Stage::Login {
        return false;
    }

    match packet.direction() {
        Direction::Clientbound => packet.name().eq_ignore_ascii_case("success"),
        Direction::Serverbound => packet.name().eq_ignore_ascii_case("start"),
    }
}
