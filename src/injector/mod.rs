//! Getting interceptors into the host's connections.
//!
//! The host accepts connections on one or more acceptor channels owned by its
//! connection manager. The `Watcher` waits for that manager to come up, then
//! puts an `AcceptorHook` at the front of each acceptor's pipeline. Every
//! accepted connection is given a `PipelineHook`, which installs a
//! `PacketInterceptor` once the connection becomes active and the host's own
//! handlers are in place.

mod hook;
mod watcher;

pub use self::hook::{hook_channel, AcceptorHook, PipelineHook};
pub use self::watcher::{WatchError, Watcher, WatcherHandle};
