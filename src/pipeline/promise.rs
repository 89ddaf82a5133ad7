use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

/// The outcome of an outbound write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The write has not completed yet
    Pending,

    /// The message was handed to the transport
    Succeeded,

    /// The write failed with the given reason
    Failed(String),

    /// Every copy of the promise was dropped without completing it, meaning
    /// the message was discarded
    Abandoned,
}

/// The completion signal accompanying an outbound message. The first
/// completion wins; later ones are ignored.
#[derive(Debug, Clone)]
pub struct Promise {
    tx: Sender<Result<(), String>>,
}

/// The receiving side of a `Promise`
#[derive(Debug)]
pub struct Completion {
    rx: Receiver<Result<(), String>>,
    outcome: Option<Outcome>,
}

impl Promise {
    /// Create a new promise along with the completion it signals
    pub fn new() -> (Promise, Completion) {
        let (tx, rx) = bounded(1);
        (Promise { tx }, Completion { rx, outcome: None })
    }

    /// Create a promise nobody is waiting on
    pub fn void() -> Promise {
        Promise::new().0
    }

    /// Mark the write as successful
    pub fn succeed(self) {
        // the receiver may be gone or a result may already be recorded
        let _ = self.tx.try_send(Ok(()));
    }

    /// Mark the write as failed
    pub fn fail(self, cause: &failure::Error) {
        let _ = self.tx.try_send(Err(cause.to_string()));
    }
}

impl Completion {
    fn record(&mut self, result: Result<(), String>) -> Outcome {
        let outcome = match result {
            Ok(()) => Outcome::Succeeded,
            Err(reason) => Outcome::Failed(reason),
        };
        self.outcome = Some(outcome.clone());
        outcome
    }

    /// Check the outcome without blocking
    pub fn poll(&mut self) -> Outcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }

        match self.rx.try_recv() {
            Ok(result) => self.record(result),
            Err(TryRecvError::Empty) => Outcome::Pending,
            Err(TryRecvError::Disconnected) => Outcome::Abandoned,
        }
    }

    /// Wait up to `timeout` for the write to complete
    pub fn wait(&mut self, timeout: Duration) -> Outcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }

        match self.rx.recv_timeout(timeout) {
            Ok(result) => self.record(result),
            Err(RecvTimeoutError::Timeout) => Outcome::Pending,
            Err(RecvTimeoutError::Disconnected) => Outcome::Abandoned,
        }
    }
}
