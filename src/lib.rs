//! Pipetap - a packet listener for hosts built around pipelines of named
//! handlers. Every connection the host accepts gets an interceptor which
//! classifies the packets passing through it and publishes them as
//! cancellable events.
//!
//! ```no_run
//! # use pipetap::{Cancellable, ListenerConfig, PacketEvent, PacketListener};
//! # fn host() -> std::sync::Arc<dyn pipetap::host::Host> { unimplemented!() }
//! let listener = PacketListener::new(host(), ListenerConfig::default());
//! listener.events().on_inbound(|event: &mut PacketEvent| {
//!     if event.packet().name() == "Chat" {
//!         event.set_cancelled(true);
//!     }
//!     Ok(())
//! });
//! listener.init();
//! ```

#![deny(bare_trait_objects)]
#![deny(missing_docs)]

pub mod config;
pub mod event;
pub mod host;
pub mod injector;
pub mod interceptor;
pub mod introspect;
pub mod listener;
pub mod packet;
pub mod pipeline;

pub use crate::config::ListenerConfig;
pub use crate::event::{Cancellable, EventBus, EventKind, PacketEvent, Priority};
pub use crate::listener::{ListenerContext, PacketListener};
pub use crate::packet::{Direction, Packet, Stage};
