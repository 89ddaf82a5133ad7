use super::hook::AcceptorHook;
use crate::introspect::{self, descriptor_of, FieldDescriptor, Reflect, Selector, TypeKey};
use crate::listener::ListenerContext;
use crate::pipeline::{AcceptorList, Channel, PipelineError};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use failure_derive::Fail;
use log::{debug, error, info, trace, warn};
use std::io;
use std::ptr;
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// The reasons the watcher may give up. Each of them leaves packet
/// interception disabled.
#[derive(Debug, Fail)]
pub enum WatchError {
    /// The host has no core server object
    #[fail(display = "the host has no core server")]
    ServerUnavailable,

    /// The core server has no field of the connection manager type
    #[fail(display = "could not find a field of type {} in {}", _0, _1)]
    ConnectionManagerNotFound(String, String),

    /// The acceptor registry of the connection manager could not be found
    #[fail(display = "could not find the channels field in {}: {}", _0, _1)]
    RegistryNotFound(String, String),

    /// The host did not become ready in time
    #[fail(display = "gave up waiting for {} after {:?}", _0, _1)]
    TimedOut(&'static str, Duration),

    /// The watcher was stopped before it finished
    #[fail(display = "the watcher was stopped")]
    Stopped,

    /// The watcher thread panicked
    #[fail(display = "the watcher thread panicked")]
    Panicked,

    /// A field of the host could not be read
    #[fail(display = "field access failed: {}", _0)]
    Introspect(#[cause] introspect::Error),

    /// An acceptor channel could not be hooked
    #[fail(display = "could not hook acceptor {}: {}", _0, _1)]
    Pipeline(u64, #[cause] PipelineError),
}

impl From<introspect::Error> for WatchError {
    fn from(e: introspect::Error) -> Self {
        WatchError::Introspect(e)
    }
}

/// A running watcher. Dropping the handle stops the watcher at its next poll.
#[derive(Debug)]
pub struct WatcherHandle {
    stop: Sender<()>,
    thread: JoinHandle<Result<usize, WatchError>>,
}

impl WatcherHandle {
    /// Ask the watcher to stop. A watcher which already hooked the acceptors
    /// is unaffected.
    pub fn stop(&self) {
        // a full channel means a stop is already pending
        let _ = self.stop.try_send(());
    }

    /// Wait for the watcher to finish, returning the number of acceptor
    /// channels it hooked
    pub fn join(self) -> Result<usize, WatchError> {
        let WatcherHandle { stop, thread } = self;
        let result = thread.join().unwrap_or(Err(WatchError::Panicked));
        drop(stop);
        result
    }
}

/// Waits in the background for the host's network subsystem to come up,
/// then hooks the acceptor channels so every new connection gets an
/// interceptor
pub struct Watcher {
    ctx: Arc<ListenerContext>,
    stop: Receiver<()>,
}

impl Watcher {
    /// Start watching on a new thread
    pub fn spawn(ctx: Arc<ListenerContext>) -> io::Result<WatcherHandle> {
        let (stop_tx, stop_rx) = bounded(1);
        let watcher = Watcher {
            ctx: Arc::clone(&ctx),
            stop: stop_rx,
        };

        let thread = thread::Builder::new()
            .name(ctx.config().watcher_thread.clone())
            .spawn(move || {
                let result = watcher.run();
                let name = watcher.ctx.name();
                match &result {
                    Ok(count) => info!("[{}] Listening on {} acceptor channel(s)", name, count),
                    Err(WatchError::Stopped) => debug!("[{}] Watcher stopped", name),
                    Err(e) => error!("[{}] Packet interception is disabled: {}", name, e),
                }
                result
            })?;

        Ok(WatcherHandle {
            stop: stop_tx,
            thread,
        })
    }

    fn run(&self) -> Result<usize, WatchError> {
        let config = self.ctx.config();
        let server = self
            .ctx
            .host()
            .core_server()
            .ok_or(WatchError::ServerUnavailable)?;
        let server_type = descriptor_of(&*server);

        let manager_field = server_type
            .find_field(Selector::SimpleName(&config.connection_manager_type))
            .ok_or_else(|| {
                WatchError::ConnectionManagerNotFound(
                    config.connection_manager_type.clone(),
                    server_type.name().to_string(),
                )
            })?;

        let manager = self.wait_for("the connection manager", || {
            Ok(manager_field.get_object(&*server)?)
        })?;
        let acceptors = find_acceptors(&*manager)?;
        debug!("[{}] Found the acceptor registry", self.ctx.name());

        let channels = self.wait_for("an acceptor channel", || {
            let channels = acceptors.snapshot();
            Ok(if channels.is_empty() {
                None
            } else {
                Some(channels)
            })
        })?;

        // normally there is exactly one
        for channel in &channels {
            self.hook_acceptor(channel)?;
        }

        Ok(channels.len())
    }

    fn hook_acceptor(&self, channel: &Channel) -> Result<(), WatchError> {
        channel
            .pipeline()
            .add_first(
                &self.ctx.config().acceptor_hook_name,
                AcceptorHook::new(Arc::clone(&self.ctx)),
            )
            .map_err(|e| WatchError::Pipeline(channel.id(), e))?;
        debug!("[{}] Hooked acceptor {}", self.ctx.name(), channel.id());
        Ok(())
    }

    /// Poll until a value is available, backing off exponentially between
    /// attempts. A stop request wakes the watcher immediately.
    fn wait_for<T>(
        &self,
        what: &'static str,
        mut poll: impl FnMut() -> Result<Option<T>, WatchError>,
    ) -> Result<T, WatchError> {
        let config = self.ctx.config();
        let started = Instant::now();
        let mut delay = config.poll_initial();

        loop {
            if let Some(value) = poll()? {
                return Ok(value);
            }

            if let Some(limit) = config.abandon_after() {
                if started.elapsed() >= limit {
                    return Err(WatchError::TimedOut(what, limit));
                }
            }

            trace!("[{}] Waiting {:?} for {}", self.ctx.name(), delay, what);
            // delays past the end of time wait for a stop request only
            let woken = match Instant::now().checked_add(delay) {
                Some(_) => self.stop.recv_timeout(delay),
                None => self
                    .stop
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };
            match woken {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return Err(WatchError::Stopped),
            }

            delay = next_delay(delay, config.poll_max());
        }
    }
}

/// Double the delay, saturating at `max`
fn next_delay(delay: Duration, max: Duration) -> Duration {
    delay.checked_mul(2).map_or(max, |doubled| doubled.min(max))
}

/// Find the live acceptor registry of a connection manager. Fields declared
/// exactly as `AcceptorList` are preferred. Without any, the second to last
/// declared field is assumed to be the registry, which only holds for some
/// host versions.
fn find_acceptors(manager: &dyn Reflect) -> Result<AcceptorList, WatchError> {
    let descriptor = descriptor_of(manager);
    let declared = descriptor.declared_fields();
    let not_found =
        |reason: String| WatchError::RegistryNotFound(descriptor.name().to_string(), reason);

    let second_to_last = declared
        .len()
        .checked_sub(2)
        .map(|index| &declared[index]);
    let typed = declared
        .iter()
        .filter(|f| !f.is_static() && f.declared_type() == TypeKey::of::<AcceptorList>())
        .collect::<Vec<&FieldDescriptor>>();

    let field = match typed.len() {
        1 => typed[0],
        0 => {
            warn!(
                "No field of {} is declared as an acceptor list, assuming the second to last one \
                 is. This may break with other host versions.",
                descriptor.name()
            );
            second_to_last
                .ok_or_else(|| not_found(format!("only {} fields declared", declared.len())))?
        }
        n => typed
            .into_iter()
            .find(|f| second_to_last.map_or(false, |s| ptr::eq(*f, s)))
            .ok_or_else(|| not_found(format!("{} ambiguous acceptor lists", n)))?,
    };

    field.mark_accessible();
    let value = field
        .get(manager)?
        .ok_or_else(|| not_found(format!("field {} is unset", field.name())))?;

    // registries found by position may hold the bare shared list
    let value = match value.downcast::<AcceptorList>() {
        Ok(list) => return Ok(*list),
        Err(value) => value,
    };
    value
        .downcast::<Arc<RwLock<Vec<Channel>>>>()
        .map(|shared| AcceptorList::from(*shared))
        .map_err(|_| {
            not_found(format!(
                "field {} of type {} is not an acceptor list",
                field.name(),
                field.declared_type().path()
            ))
        })
}
