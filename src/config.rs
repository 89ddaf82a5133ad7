//! Listener configuration: the well-known names used to find and extend the
//! host's pipelines, and the timing of the connection watcher.

#![allow(missing_docs)]

use derive_builder::Builder;
use serde::Deserialize;
use std::time::Duration;

/// Settings for a `PacketListener`. Missing values take their defaults, both
/// when deserializing and when using the builder.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Builder)]
#[serde(default)]
#[builder(pattern = "owned", default, setter(into))]
pub struct ListenerConfig {
    /// Namespace prefix of the host's protocol types. Objects outside of it
    /// are never classified as packets.
    pub protocol_namespace: String,

    /// Name of the host's own packet handler, before which the interceptor
    /// is inserted
    pub terminal_handler: String,

    /// Pipeline name of the interceptor
    pub interceptor_name: String,

    /// Pipeline name of the per-connection hook
    pub hook_name: String,

    /// Pipeline name of the handler added to acceptor channels
    pub acceptor_hook_name: String,

    /// Simple type name of the host's connection manager
    pub connection_manager_type: String,

    /// Name of the watcher thread
    pub watcher_thread: String,

    /// First delay between polls while waiting for the host, in milliseconds
    pub poll_initial_ms: u64,

    /// Upper bound of the delay between polls, in milliseconds
    pub poll_max_ms: u64,

    /// Give up waiting for the host after this many milliseconds. `None`
    /// waits forever.
    pub abandon_after_ms: Option<u64>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            protocol_namespace: "net.minecraft".to_string(),
            terminal_handler: "packet_handler".to_string(),
            interceptor_name: "packetlistener_interceptor".to_string(),
            hook_name: "packetlistener_hook".to_string(),
            acceptor_hook_name: "packetlistener_acceptor".to_string(),
            connection_manager_type: "ServerConnection".to_string(),
            watcher_thread: "PacketListener-ServerSocketChannelWatcher".to_string(),
            poll_initial_ms: 10,
            poll_max_ms: 1000,
            abandon_after_ms: Some(600_000),
        }
    }
}

impl ListenerConfig {
    /// Create a new config builder
    pub fn builder() -> ListenerConfigBuilder {
        ListenerConfigBuilder::default()
    }

    /// Parse a config from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// The first delay between polls
    pub fn poll_initial(&self) -> Duration {
        Duration::from_millis(self.poll_initial_ms.max(1))
    }

    /// The upper bound of the delay between polls
    pub fn poll_max(&self) -> Duration {
        Duration::from_millis(self.poll_max_ms).max(self.poll_initial())
    }

    /// How long to wait for the host before giving up, if at all
    pub fn abandon_after(&self) -> Option<Duration> {
        self.abandon_after_ms.map(Duration::from_millis)
    }
}
