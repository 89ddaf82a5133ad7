use crate::interceptor::PacketInterceptor;
use crate::listener::ListenerContext;
use crate::pipeline::{Channel, Handler, HandlerContext, HandlerResult, Message, PipelineError};
use failure::err_msg;
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A one-shot handler which installs a `PacketInterceptor` into its
/// connection's pipeline once the connection becomes active, then removes
/// itself
pub struct PipelineHook {
    ctx: Arc<ListenerContext>,
    fired: AtomicBool,
}

impl PipelineHook {
    /// Create an armed hook
    pub fn new(ctx: Arc<ListenerContext>) -> Self {
        Self {
            ctx,
            fired: AtomicBool::new(false),
        }
    }

    /// Whether the hook has already fired
    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

impl Handler for PipelineHook {
    fn channel_active(&self, hctx: &HandlerContext) -> HandlerResult {
        if self.fired.swap(true, Ordering::AcqRel) {
            return Err(err_msg("connection hook activated more than once"));
        }

        let config = self.ctx.config();
        let pipeline = hctx.pipeline();
        let installed = pipeline.add_before(
            &config.terminal_handler,
            &config.interceptor_name,
            PacketInterceptor::new(Arc::clone(&self.ctx)),
        );

        // activation is passed on whether or not the interceptor went in
        hctx.fire_channel_active();

        match installed {
            Ok(()) => {
                debug!("[{}] Interceptor installed: {:?}", self.ctx.name(), pipeline);
                pipeline.remove(hctx.name())?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Attach a `PipelineHook` to a newly accepted connection
pub fn hook_channel(ctx: &Arc<ListenerContext>, channel: &Channel) -> Result<(), PipelineError> {
    channel
        .pipeline()
        .add_last(&ctx.config().hook_name, PipelineHook::new(Arc::clone(ctx)))?;
    debug!("[{}] Hooked connection {}", ctx.name(), channel.id());
    Ok(())
}

/// A handler for acceptor channels, hooking every connection they accept
pub struct AcceptorHook {
    ctx: Arc<ListenerContext>,
}

impl AcceptorHook {
    /// Create a new acceptor hook
    pub fn new(ctx: Arc<ListenerContext>) -> Self {
        Self { ctx }
    }
}

impl Handler for AcceptorHook {
    fn channel_read(&self, hctx: &HandlerContext, msg: Message) -> HandlerResult {
        if let Some(channel) = msg.as_any().downcast_ref::<Channel>() {
            if let Err(e) = hook_channel(&self.ctx, channel) {
                warn!(
                    "[{}] Could not hook connection {}: {}",
                    self.ctx.name(),
                    channel.id(),
                    e
                );
            }
        }

        hctx.fire_channel_read(msg);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ListenerConfig;
    use crate::event::EventBus;
    use crate::host::{Host, User};
    use crate::introspect::Object;
    use crate::pipeline::{Pipeline, Promise};
    use std::sync::Mutex;
    use uuid::Uuid;

    struct TestHost;

    impl Host for TestHost {
        fn name(&self) -> &str {
            "test"
        }

        fn core_server(&self) -> Option<Object> {
            None
        }

        fn lookup_online_user(&self, _id: Uuid) -> Result<Option<User>, failure::Error> {
            Ok(None)
        }
    }

    fn context() -> Arc<ListenerContext> {
        Arc::new(ListenerContext::new(
            ListenerConfig::default(),
            Arc::new(TestHost),
            Arc::new(EventBus::new()),
        ))
    }

    type Log = Arc<Mutex<Vec<String>>>;

    /// Stands in for the host's handlers, recording what reaches it
    struct Terminal(Log);

    impl Handler for Terminal {
        fn channel_active(&self, ctx: &HandlerContext) -> HandlerResult {
            self.0.lock().unwrap().push("active".to_string());
            ctx.fire_channel_active();
            Ok(())
        }

        fn exception_caught(&self, _ctx: &HandlerContext, cause: failure::Error) -> HandlerResult {
            self.0.lock().unwrap().push(format!("fault:{}", cause));
            Ok(())
        }
    }

    fn connection(terminal: &str) -> (Channel, Log) {
        let log: Log = Arc::default();
        let pipeline = Pipeline::new(|_msg: Message, promise: Promise| promise.succeed());
        pipeline
            .add_last(terminal, Terminal(Arc::clone(&log)))
            .unwrap();
        (Channel::new(1, pipeline), log)
    }

    #[test]
    fn activation_installs_the_interceptor_once() {
        let ctx = context();
        let (channel, log) = connection("packet_handler");
        hook_channel(&ctx, &channel).unwrap();
        let pipeline = channel.pipeline();
        assert_eq!(pipeline.names(), vec!["packet_handler", "packetlistener_hook"]);

        let hook = pipeline.get("packetlistener_hook").unwrap();
        pipeline.fire_channel_active();

        assert_eq!(
            pipeline.names(),
            vec!["packetlistener_interceptor", "packet_handler"]
        );
        assert_eq!(*log.lock().unwrap(), vec!["active"]);

        // a second activation of the same hook is a logic error
        let hctx = HandlerContext::new(pipeline.clone(), "packetlistener_hook".to_string());
        assert!(hook.channel_active(&hctx).is_err());
    }

    #[test]
    fn missing_terminal_handler_leaves_the_pipeline_alone() {
        let ctx = context();
        let (channel, log) = connection("decoder");
        hook_channel(&ctx, &channel).unwrap();
        let pipeline = channel.pipeline();

        let hook = pipeline.get("packetlistener_hook").unwrap();
        let hctx = pipeline.context("packetlistener_hook").unwrap();
        assert!(hook.channel_active(&hctx).is_err());

        assert_eq!(pipeline.names(), vec!["decoder", "packetlistener_hook"]);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn duplicate_hooks_are_rejected() {
        let ctx = context();
        let (channel, _log) = connection("packet_handler");
        hook_channel(&ctx, &channel).unwrap();

        assert_eq!(
            hook_channel(&ctx, &channel),
            Err(PipelineError::DuplicateName("packetlistener_hook".to_string()))
        );
    }

    #[test]
    fn acceptor_hooks_accepted_connections() {
        let ctx = context();
        let acceptor = Pipeline::new(|_msg: Message, promise: Promise| promise.succeed());
        acceptor
            .add_first("packetlistener_acceptor", AcceptorHook::new(Arc::clone(&ctx)))
            .unwrap();

        let (channel, _log) = connection("packet_handler");
        acceptor.fire_channel_read(Box::new(channel.clone()));

        assert!(channel.pipeline().contains("packetlistener_hook"));
    }
}
