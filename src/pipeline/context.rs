use super::{Message, Pipeline, Promise};
use std::fmt;

/// The position of a handler within a pipeline, used to pass events on to
/// the neighbouring handlers
#[derive(Clone)]
pub struct HandlerContext {
    pipeline: Pipeline,
    name: String,
}

impl HandlerContext {
    pub(crate) fn new(pipeline: Pipeline, name: String) -> Self {
        Self { pipeline, name }
    }

    /// The name of the handler this context belongs to
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The pipeline this context belongs to
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Pass the activation signal on to the next handler
    pub fn fire_channel_active(&self) {
        self.pipeline.active_from(Some(&self.name));
    }

    /// Pass a received message on to the next handler
    pub fn fire_channel_read(&self, msg: Message) {
        self.pipeline.read_from(Some(&self.name), msg);
    }

    /// Pass a fault on to the next handler
    pub fn fire_exception_caught(&self, cause: failure::Error) {
        self.pipeline.exception_from(Some(&self.name), cause);
    }

    /// Pass a message being written on to the previous handler, or to the
    /// transport once the head is reached
    pub fn write(&self, msg: Message, promise: Promise) {
        self.pipeline.write_from(Some(&self.name), msg, promise);
    }
}

impl fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("HandlerContext")
            .field("name", &self.name)
            .finish()
    }
}
