//! The collaborators provided by the host application: the core server object,
//! the identity records carried by login packets, and the directory of online
//! users.

use crate::introspect::Object;
use std::fmt::Debug;
use std::sync::Arc;
use uuid::Uuid;

/// The identity record carried by login packets
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    id: Uuid,
    name: String,
}

impl Identity {
    /// Create a new identity record
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// The unique id of this identity
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The name of this identity
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A user currently connected to the host
pub trait OnlineUser: Debug + Send + Sync {
    /// The unique id of this user
    fn unique_id(&self) -> Uuid;

    /// The display name of this user
    fn name(&self) -> &str;
}

/// A shared reference to an online user
pub type User = Arc<dyn OnlineUser>;

/// The host application the listener is attached to
pub trait Host: Send + Sync {
    /// The name of the component owning the listener, used to tag log output
    fn name(&self) -> &str;

    /// Get the host's core server object, if it exists yet
    fn core_server(&self) -> Option<Object>;

    /// Look up an online user by unique id
    fn lookup_online_user(&self, id: Uuid) -> Result<Option<User>, failure::Error>;
}
