//! An ordered chain of named handlers through which the traffic of one
//! connection passes.
//!
//! Inbound events (activation, received messages, faults) travel from the
//! first handler towards the last. Outbound writes travel from the last handler
//! towards the first, then on to the pipeline's `Transport`. Handlers may be
//! added and removed at any time, including from within a handler callback.

mod channel;
mod context;
mod error;
mod handler;
mod promise;

pub use self::channel::{AcceptorList, Channel};
pub use self::context::HandlerContext;
pub use self::error::PipelineError;
pub use self::handler::{Handler, HandlerResult};
pub use self::promise::{Completion, Outcome, Promise};

use crate::introspect::Reflect;
use log::{debug, trace, warn};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A message passing through a pipeline
pub type Message = Box<dyn Reflect>;

/// The end of a pipeline which actually sends outbound messages
pub trait Transport: Send + Sync {
    /// Send a message, completing the promise once done
    fn send(&self, msg: Message, promise: Promise);
}

impl<F> Transport for F
where
    F: Fn(Message, Promise) + Send + Sync,
{
    fn send(&self, msg: Message, promise: Promise) {
        self(msg, promise)
    }
}

struct Entry {
    name: String,
    handler: Arc<dyn Handler>,
}

struct Inner {
    handlers: RwLock<Vec<Entry>>,
    transport: Box<dyn Transport>,
}

/// The next stop of an event travelling through the pipeline
enum Hop {
    Handler(HandlerContext, Arc<dyn Handler>),
    End,
    Detached,
}

/// A pipeline of handlers. Clones refer to the same pipeline.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

impl Pipeline {
    /// Create an empty pipeline ending at the given transport
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                handlers: RwLock::new(vec![]),
                transport: Box::new(transport),
            }),
        }
    }

    fn handlers(&self) -> RwLockReadGuard<Vec<Entry>> {
        self.inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn handlers_mut(&self) -> RwLockWriteGuard<Vec<Entry>> {
        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(
        &self,
        name: &str,
        handler: Arc<dyn Handler>,
        position: impl FnOnce(&[Entry]) -> Result<usize, PipelineError>,
    ) -> Result<(), PipelineError> {
        let mut handlers = self.handlers_mut();
        if handlers.iter().any(|e| e.name == name) {
            return Err(PipelineError::DuplicateName(name.to_string()));
        }

        let index = position(&handlers[..])?;
        handlers.insert(
            index,
            Entry {
                name: name.to_string(),
                handler,
            },
        );
        debug!("Added handler {} at position {}", name, index);
        Ok(())
    }

    /// Add a handler at the start of the pipeline
    pub fn add_first(
        &self,
        name: &str,
        handler: impl Handler + 'static,
    ) -> Result<(), PipelineError> {
        self.insert(name, Arc::new(handler), |_| Ok(0))
    }

    /// Add a handler at the end of the pipeline
    pub fn add_last(
        &self,
        name: &str,
        handler: impl Handler + 'static,
    ) -> Result<(), PipelineError> {
        self.insert(name, Arc::new(handler), |handlers| Ok(handlers.len()))
    }

    /// Add a handler immediately before the handler named `base`
    pub fn add_before(
        &self,
        base: &str,
        name: &str,
        handler: impl Handler + 'static,
    ) -> Result<(), PipelineError> {
        self.insert(name, Arc::new(handler), |handlers| {
            handlers
                .iter()
                .position(|e| e.name == base)
                .ok_or_else(|| PipelineError::NoSuchHandler(base.to_string()))
        })
    }

    /// Remove the named handler
    pub fn remove(&self, name: &str) -> Result<Arc<dyn Handler>, PipelineError> {
        let mut handlers = self.handlers_mut();
        let index = handlers
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| PipelineError::NoSuchHandler(name.to_string()))?;

        debug!("Removed handler {} from position {}", name, index);
        Ok(handlers.remove(index).handler)
    }

    /// The names of all handlers, in order
    pub fn names(&self) -> Vec<String> {
        self.handlers().iter().map(|e| e.name.clone()).collect()
    }

    /// Whether a handler with the given name is present
    pub fn contains(&self, name: &str) -> bool {
        self.handlers().iter().any(|e| e.name == name)
    }

    /// Get the context of the named handler
    pub fn context(&self, name: &str) -> Option<HandlerContext> {
        if self.contains(name) {
            Some(HandlerContext::new(self.clone(), name.to_string()))
        } else {
            None
        }
    }

    /// Get the named handler
    pub fn get(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.handlers()
            .iter()
            .find(|e| e.name == name)
            .map(|e| Arc::clone(&e.handler))
    }

    fn hop(&self, entry: &Entry) -> Hop {
        Hop::Handler(
            HandlerContext::new(self.clone(), entry.name.clone()),
            Arc::clone(&entry.handler),
        )
    }

    /// Find the handler following `from`, or the first handler
    fn inbound_after(&self, from: Option<&str>) -> Hop {
        let handlers = self.handlers();
        let index = match from {
            None => 0,
            Some(name) => match handlers.iter().position(|e| e.name == name) {
                Some(index) => index + 1,
                None => return Hop::Detached,
            },
        };

        handlers.get(index).map_or(Hop::End, |e| self.hop(e))
    }

    /// Find the handler preceding `from`, or the last handler
    fn outbound_before(&self, from: Option<&str>) -> Hop {
        let handlers = self.handlers();
        let index = match from {
            None => handlers.len(),
            Some(name) => match handlers.iter().position(|e| e.name == name) {
                Some(index) => index,
                None => return Hop::Detached,
            },
        };

        match index.checked_sub(1) {
            Some(index) => self.hop(&handlers[index]),
            None => Hop::End,
        }
    }

    pub(crate) fn active_from(&self, from: Option<&str>) {
        match self.inbound_after(from) {
            Hop::Handler(ctx, handler) => {
                if let Err(e) = handler.channel_active(&ctx) {
                    ctx.fire_exception_caught(e);
                }
            }
            Hop::End => trace!("Activation reached the end of the pipeline"),
            Hop::Detached => warn!("Activation fired from removed handler {:?}", from),
        }
    }

    pub(crate) fn read_from(&self, from: Option<&str>, msg: Message) {
        match self.inbound_after(from) {
            Hop::Handler(ctx, handler) => {
                if let Err(e) = handler.channel_read(&ctx, msg) {
                    ctx.fire_exception_caught(e);
                }
            }
            Hop::End => trace!("Discarding unhandled inbound message"),
            Hop::Detached => warn!("Message fired from removed handler {:?} was dropped", from),
        }
    }

    pub(crate) fn exception_from(&self, from: Option<&str>, cause: failure::Error) {
        match self.inbound_after(from) {
            Hop::Handler(ctx, handler) => {
                if let Err(e) = handler.exception_caught(&ctx, cause) {
                    warn!("Handler {} failed while handling an exception: {}", ctx.name(), e);
                }
            }
            Hop::End => warn!("Unhandled exception reached the end of the pipeline: {}", cause),
            Hop::Detached => warn!("Exception fired from removed handler {:?}: {}", from, cause),
        }
    }

    pub(crate) fn write_from(&self, from: Option<&str>, msg: Message, promise: Promise) {
        match self.outbound_before(from) {
            Hop::Handler(ctx, handler) => {
                if let Err(e) = handler.write(&ctx, msg, promise.clone()) {
                    debug!("Write failed in handler {}: {}", ctx.name(), e);
                    promise.fail(&e);
                }
            }
            Hop::End => self.inner.transport.send(msg, promise),
            Hop::Detached => {
                let cause = failure::err_msg(format!("write from removed handler {:?}", from));
                warn!("{}", cause);
                promise.fail(&cause);
            }
        }
    }

    /// Signal that the connection became active
    pub fn fire_channel_active(&self) {
        self.active_from(None);
    }

    /// Feed a received message into the pipeline
    pub fn fire_channel_read(&self, msg: Message) {
        self.read_from(None, msg);
    }

    /// Feed a transport-level fault into the pipeline
    pub fn fire_exception_caught(&self, cause: failure::Error) {
        self.exception_from(None, cause);
    }

    /// Write a message, starting from the last handler
    pub fn write(&self, msg: Message, promise: Promise) {
        self.write_from(None, msg, promise);
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspect::TypeDescriptor;
    use assert_matches::assert_matches;
    use failure::err_msg;
    use std::any::Any;
    use std::sync::Mutex;
    use std::time::Duration;

    crate::host_type! {
        #[derive(Debug)]
        struct Frame("io.netty.buffer") {
            tag: String,
        }
    }

    fn frame(tag: &str) -> Message {
        Box::new(Frame {
            tag: tag.to_string(),
        })
    }

    fn tag_of(msg: &Message) -> String {
        msg.as_any()
            .downcast_ref::<Frame>()
            .map(|f| f.tag.clone())
            .unwrap_or_default()
    }

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        label: &'static str,
        log: Log,
    }

    impl Handler for Recorder {
        fn channel_active(&self, ctx: &HandlerContext) -> HandlerResult {
            self.log.lock().unwrap().push(format!("{}:active", self.label));
            ctx.fire_channel_active();
            Ok(())
        }

        fn channel_read(&self, ctx: &HandlerContext, msg: Message) -> HandlerResult {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:read:{}", self.label, tag_of(&msg)));
            ctx.fire_channel_read(msg);
            Ok(())
        }

        fn write(&self, ctx: &HandlerContext, msg: Message, promise: Promise) -> HandlerResult {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:write:{}", self.label, tag_of(&msg)));
            ctx.write(msg, promise);
            Ok(())
        }

        fn exception_caught(&self, ctx: &HandlerContext, cause: failure::Error) -> HandlerResult {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:fault:{}", self.label, cause));
            ctx.fire_exception_caught(cause);
            Ok(())
        }
    }

    struct Failing;

    impl Handler for Failing {
        fn channel_read(&self, _ctx: &HandlerContext, _msg: Message) -> HandlerResult {
            Err(err_msg("bad frame"))
        }

        fn write(&self, _ctx: &HandlerContext, _msg: Message, _promise: Promise) -> HandlerResult {
            Err(err_msg("encoder failed"))
        }
    }

    fn recording_pipeline() -> (Pipeline, Log) {
        let log: Log = Arc::default();
        let sent = Arc::clone(&log);
        let pipeline = Pipeline::new(move |msg: Message, promise: Promise| {
            sent.lock()
                .unwrap()
                .push(format!("transport:{}", tag_of(&msg)));
            promise.succeed();
        });

        for &label in &["a", "b", "c"] {
            pipeline
                .add_last(
                    label,
                    Recorder {
                        label,
                        log: Arc::clone(&log),
                    },
                )
                .unwrap();
        }

        (pipeline, log)
    }

    #[test]
    fn inbound_travels_forward_and_outbound_backward() {
        let (pipeline, log) = recording_pipeline();

        pipeline.fire_channel_active();
        pipeline.fire_channel_read(frame("in"));
        let (promise, mut completion) = Promise::new();
        pipeline.write(frame("out"), promise);

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "a:active", "b:active", "c:active", "a:read:in", "b:read:in", "c:read:in",
                "c:write:out", "b:write:out", "a:write:out", "transport:out",
            ]
        );
        assert_eq!(completion.poll(), Outcome::Succeeded);
    }

    #[test]
    fn handlers_are_positioned_by_name() {
        let (pipeline, log) = recording_pipeline();
        let recorder = |label| Recorder {
            label,
            log: Arc::clone(&log),
        };

        pipeline.add_first("first", recorder("first")).unwrap();
        pipeline.add_before("c", "before_c", recorder("before_c")).unwrap();

        assert_eq!(pipeline.names(), vec!["first", "a", "b", "before_c", "c"]);
        assert_matches!(
            pipeline.add_before("missing", "x", recorder("x")),
            Err(PipelineError::NoSuchHandler(ref name)) if name == "missing"
        );
        assert_matches!(
            pipeline.add_last("a", recorder("a")),
            Err(PipelineError::DuplicateName(_))
        );

        pipeline.remove("b").unwrap();
        assert_eq!(pipeline.names(), vec!["first", "a", "before_c", "c"]);
        assert_matches!(
            pipeline.remove("b").err(),
            Some(PipelineError::NoSuchHandler(ref name)) if name == "b"
        );
    }

    #[test]
    fn inbound_errors_become_exceptions_for_the_next_handler() {
        let (pipeline, log) = recording_pipeline();
        pipeline.add_before("b", "failing", Failing).unwrap();

        pipeline.fire_channel_read(frame("in"));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:read:in", "b:fault:bad frame", "c:fault:bad frame"]
        );
    }

    #[test]
    fn write_errors_fail_the_promise() {
        let (pipeline, log) = recording_pipeline();
        pipeline.add_before("b", "failing", Failing).unwrap();

        let (promise, mut completion) = Promise::new();
        pipeline.write(frame("out"), promise);

        assert_eq!(*log.lock().unwrap(), vec!["c:write:out", "b:write:out"]);
        assert_eq!(
            completion.wait(Duration::from_millis(10)),
            Outcome::Failed("encoder failed".to_string())
        );
    }

    #[test]
    fn contexts_exist_only_for_present_handlers() {
        let (pipeline, _log) = recording_pipeline();

        assert_eq!(pipeline.context("b").map(|c| c.name().to_string()), Some("b".to_string()));
        assert!(pipeline.context("z").is_none());
        assert!(pipeline.get("c").is_some());
    }

    #[test]
    fn frames_are_plain_host_objects() {
        let msg = frame("x");
        let descriptor: TypeDescriptor = msg.describe();
        let any: &dyn Any = msg.as_any();

        assert_eq!(descriptor.namespace(), "io.netty.buffer");
        assert!(any.is::<Frame>());
    }
}
