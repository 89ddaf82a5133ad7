use super::{HandlerContext, Message, Promise};

/// The result of a handler callback. An error returned from an inbound
/// callback is passed on as an exception to the following handlers, and an
/// error returned from `write` fails the write's promise.
pub type HandlerResult = Result<(), failure::Error>;

/// A stage of a pipeline, seeing inbound and outbound traffic. Every callback
/// forwards to the next handler by default.
#[allow(unused_variables)]
pub trait Handler: Send + Sync {
    /// The channel became active
    fn channel_active(&self, ctx: &HandlerContext) -> HandlerResult {
        ctx.fire_channel_active();
        Ok(())
    }

    /// A message was received
    fn channel_read(&self, ctx: &HandlerContext, msg: Message) -> HandlerResult {
        ctx.fire_channel_read(msg);
        Ok(())
    }

    /// A message is being written. Dropping the promise without completing it
    /// discards the message.
    fn write(&self, ctx: &HandlerContext, msg: Message, promise: Promise) -> HandlerResult {
        ctx.write(msg, promise);
        Ok(())
    }

    /// A transport-level fault occurred
    fn exception_caught(&self, ctx: &HandlerContext, cause: failure::Error) -> HandlerResult {
        ctx.fire_exception_caught(cause);
        Ok(())
    }
}
