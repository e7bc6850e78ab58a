//! Bounded-concurrency execution of many call descriptors.
//!
//! Two delivery modes: [`map`] runs fixed successive windows and preserves
//! submission order in its output; [`imap`]/[`imap_enum`] keep a sliding
//! window of calls in flight through a fixed worker pool and a bounded
//! completion channel, yielding outcomes as they complete. In both modes a
//! captured failure never aborts sibling calls already in flight, and each
//! descriptor's owned session is destroyed before its slot admits new work.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use http::Method;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::request::CallDescriptor;
use crate::response::Response;

/// Default sliding-window size for streaming mode.
pub const DEFAULT_STREAM_WINDOW: usize = 2;

/// Terminal outcome of one scheduled call.
///
/// Failure is a first-class variant rather than a sentinel value, so it
/// cannot be mistaken for a response at a call site.
#[derive(Debug)]
pub enum Outcome {
    Success(Response),
    Failure(FailedCall),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Success(response) => Some(response),
            Self::Failure(_) => None,
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            Self::Success(response) => Some(response),
            Self::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failed) => Some(&failed.error),
        }
    }
}

/// A captured per-call failure with enough context to retry.
#[derive(Debug)]
pub struct FailedCall {
    pub method: Method,
    pub url: String,
    pub error: Error,
}

/// Caller-supplied recovery: `Some(response)` substitutes a success,
/// `None` drops the slot from the output entirely.
pub type FailureHandler = Arc<dyn Fn(&FailedCall) -> Option<Response> + Send + Sync>;

/// Run descriptors in successive windows of `window` (default: all at once),
/// returning outcomes in submission order.
///
/// Every descriptor within a window runs concurrently; the whole window is
/// awaited before the next starts. A descriptor that raises (its
/// raise-on-error flag set, or a configuration error) propagates out of
/// `map` after its window drains, and no further window starts.
pub async fn map(
    descriptors: Vec<CallDescriptor>,
    window: Option<usize>,
    handler: Option<FailureHandler>,
) -> Result<Vec<Outcome>> {
    let total = descriptors.len();
    let window = window.unwrap_or(total).max(1);
    let mut outcomes = Vec::with_capacity(total);
    let mut raised: Option<Error> = None;
    let mut iter = descriptors.into_iter();

    loop {
        let batch: Vec<CallDescriptor> = iter.by_ref().take(window).collect();
        if batch.is_empty() {
            break;
        }
        tracing::debug!(size = batch.len(), "starting scheduler window");

        let handles: Vec<_> = batch
            .into_iter()
            .map(|mut descriptor| {
                tokio::spawn(async move {
                    let raised = descriptor.send().await.err();
                    (descriptor, raised)
                })
            })
            .collect();

        // Join in spawn order so output order matches input order.
        for handle in handles {
            let (descriptor, error) = handle.await.expect("scheduler task panicked");
            match error {
                Some(e) => {
                    // Siblings in this window were already admitted and are
                    // allowed to finish; remember the first raise.
                    if raised.is_none() {
                        raised = Some(e);
                    }
                }
                None => {
                    if let Some(outcome) = settle(descriptor, &handler) {
                        outcomes.push(outcome);
                    }
                }
            }
        }

        if let Some(e) = raised {
            return Err(e);
        }
    }
    Ok(outcomes)
}

/// Streaming mode: yields outcomes in completion order.
///
/// Keeps up to `window` descriptors (default 2) in flight; as soon as one
/// completes and its outcome is consumed, the freed slot admits the next
/// descriptor. This mode never raises: every failure, including
/// configuration errors, is captured as an [`Outcome::Failure`].
pub fn imap(
    descriptors: Vec<CallDescriptor>,
    window: Option<usize>,
    handler: Option<FailureHandler>,
) -> Completions {
    Completions {
        inner: imap_enum(descriptors, window, handler),
    }
}

/// Streaming mode yielding `(original_index, outcome)` pairs so callers can
/// recover submission order without serializing execution.
pub fn imap_enum(
    descriptors: Vec<CallDescriptor>,
    window: Option<usize>,
    handler: Option<FailureHandler>,
) -> IndexedCompletions {
    let window = window.unwrap_or(DEFAULT_STREAM_WINDOW).max(1);
    let (tx, rx) = mpsc::channel(window);
    let queue: Arc<Mutex<VecDeque<(usize, CallDescriptor)>>> =
        Arc::new(Mutex::new(descriptors.into_iter().enumerate().collect()));

    for worker in 0..window {
        let queue = Arc::clone(&queue);
        let tx = tx.clone();
        let handler = handler.clone();
        tokio::spawn(async move {
            loop {
                let next = {
                    let mut queue = queue.lock().expect("scheduler queue mutex poisoned");
                    queue.pop_front()
                };
                let Some((index, mut descriptor)) = next else {
                    break;
                };
                tracing::debug!(worker, index, "admitted into scheduler window");

                // Streaming mode captures raises instead of propagating.
                if let Err(e) = descriptor.send().await {
                    let failed = FailedCall {
                        method: descriptor.method().clone(),
                        url: descriptor.url().to_string(),
                        error: e,
                    };
                    if forward(&tx, index, failed, &handler).await.is_err() {
                        break;
                    }
                    continue;
                }

                match settle(descriptor, &handler) {
                    Some(outcome) => {
                        if tx.send((index, outcome)).await.is_err() {
                            // Consumer dropped the stream; stop admitting.
                            break;
                        }
                    }
                    None => {
                        tracing::debug!(index, "failure handler dropped outcome slot");
                    }
                }
            }
        });
    }
    IndexedCompletions { rx }
}

async fn forward(
    tx: &mpsc::Sender<(usize, Outcome)>,
    index: usize,
    failed: FailedCall,
    handler: &Option<FailureHandler>,
) -> std::result::Result<(), ()> {
    let outcome = match handler {
        Some(h) => match h(&failed) {
            Some(response) => Outcome::Success(response),
            None => {
                tracing::debug!(index, "failure handler dropped outcome slot");
                return Ok(());
            }
        },
        None => Outcome::Failure(failed),
    };
    tx.send((index, outcome)).await.map_err(|_| ())
}

/// Convert a settled descriptor into its outcome, applying the failure
/// handler. `None` means the handler dropped the slot.
fn settle(mut descriptor: CallDescriptor, handler: &Option<FailureHandler>) -> Option<Outcome> {
    if let Some(response) = descriptor.take_response() {
        return Some(Outcome::Success(response));
    }
    let error = descriptor
        .take_error()
        .unwrap_or_else(|| Error::transport("call settled without an outcome"));
    let failed = FailedCall {
        method: descriptor.method().clone(),
        url: descriptor.url().to_string(),
        error,
    };
    match handler {
        Some(h) => h(&failed).map(Outcome::Success),
        None => Some(Outcome::Failure(failed)),
    }
}

/// Finite stream of outcomes in completion order.
pub struct Completions {
    inner: IndexedCompletions,
}

impl Completions {
    pub async fn next(&mut self) -> Option<Outcome> {
        self.inner.next().await.map(|(_, outcome)| outcome)
    }

    /// Drain the remaining outcomes into a vector.
    pub async fn collect(mut self) -> Vec<Outcome> {
        let mut out = Vec::new();
        while let Some(outcome) = self.next().await {
            out.push(outcome);
        }
        out
    }
}

/// Finite stream of `(original_index, outcome)` pairs in completion order.
pub struct IndexedCompletions {
    rx: mpsc::Receiver<(usize, Outcome)>,
}

impl IndexedCompletions {
    pub async fn next(&mut self) -> Option<(usize, Outcome)> {
        self.rx.recv().await
    }

    pub async fn collect(mut self) -> Vec<(usize, Outcome)> {
        let mut out = Vec::new();
        while let Some(pair) = self.next().await {
            out.push(pair);
        }
        out
    }
}
