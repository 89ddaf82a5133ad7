use failure_derive::Fail;

/// An error modifying a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Fail)]
pub enum PipelineError {
    /// A handler with the given name is already present
    #[fail(display = "duplicate handler name: {}", _0)]
    DuplicateName(String),

    /// No handler with the given name is present
    #[fail(display = "no such handler: {}", _0)]
    NoSuchHandler(String),
}
