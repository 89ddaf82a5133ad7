use super::Pipeline;
use crate::introspect::{Reflect, TypeDescriptor};
use std::any::Any;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// A connection and its pipeline. Accepted connections are delivered to the
/// acceptor's pipeline as `Channel` messages.
#[derive(Clone)]
pub struct Channel {
    id: u64,
    pipeline: Pipeline,
}

impl Channel {
    /// Create a new channel
    pub fn new(id: u64, pipeline: Pipeline) -> Self {
        Self { id, pipeline }
    }

    /// The id of this channel
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The pipeline of this channel
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}

impl Reflect for Channel {
    fn describe(&self) -> TypeDescriptor {
        TypeDescriptor::builder::<Self>("io.netty.channel", "Channel")
            .public_field::<u64>("id", |c| &c.id, |c| &mut c.id)
            .build()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

/// A live, shared list of the channels accepting new connections. Clones
/// refer to the same list.
#[derive(Debug, Clone, Default)]
pub struct AcceptorList {
    channels: Arc<RwLock<Vec<Channel>>>,
}

impl AcceptorList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new acceptor channel
    pub fn push(&self, channel: Channel) {
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(channel);
    }

    /// Copy the currently registered channels
    pub fn snapshot(&self) -> Vec<Channel> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The number of registered channels
    pub fn len(&self) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no channels are registered yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Wraps a list shared with the host. Channels the host adds later show up
/// in the wrapper.
impl From<Arc<RwLock<Vec<Channel>>>> for AcceptorList {
    fn from(channels: Arc<RwLock<Vec<Channel>>>) -> Self {
        AcceptorList { channels }
    }
}
