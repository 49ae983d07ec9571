//! Request lifecycle controller.
//!
//! A [`RequestController`] drives one logical fetch at a time through
//! `Idle -> Loading -> {Succeeded | Failed | Canceled}`. Requests run on
//! spawned tokio tasks and report back over a channel tagged with the
//! generation they were issued under; the owner applies those results on its
//! own schedule (`poll_settlements`, `next_settlement`, `wait_settled`), so
//! state only ever changes on the owner's side.
//!
//! Only the completion for the current generation, and only while it is
//! still awaited, may commit. Everything else is a stale completion and is
//! dropped without touching state.

use std::fmt;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::error::RequestError;
use crate::request::{CancelableRequest, Outcome};

// ============================================================================
// Constants
// ============================================================================

/// Buffer size for the completion channel.
/// Completions are tiny and drained every event-loop step.
const CHANNEL_BUFFER_SIZE: usize = 16;

// ============================================================================
// State
// ============================================================================

/// Lifecycle status of the current fetch cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Idle,
    Loading,
    Succeeded,
    Failed,
    Canceled,
}

impl Status {
    /// Whether a cycle in this status has settled
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Succeeded | Status::Failed | Status::Canceled)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Status::Idle => "idle",
            Status::Loading => "loading",
            Status::Succeeded => "succeeded",
            Status::Failed => "failed",
            Status::Canceled => "canceled",
        };
        f.write_str(label)
    }
}

/// Controller state. Data and error live inside the variant that owns them,
/// so they can never be populated together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchState<T> {
    Idle,
    Loading,
    Succeeded(T),
    Failed(String),
    Canceled,
}

impl<T> FetchState<T> {
    pub fn status(&self) -> Status {
        match self {
            FetchState::Idle => Status::Idle,
            FetchState::Loading => Status::Loading,
            FetchState::Succeeded(_) => Status::Succeeded,
            FetchState::Failed(_) => Status::Failed,
            FetchState::Canceled => Status::Canceled,
        }
    }
}

impl<T> Default for FetchState<T> {
    fn default() -> Self {
        FetchState::Idle
    }
}

/// Read-only view of a controller, borrowed for rendering.
#[derive(Debug, PartialEq)]
pub struct Snapshot<'a, T> {
    pub status: Status,
    pub data: Option<&'a T>,
    pub error: Option<&'a str>,
}

/// What happened to a completion handed to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The completion belonged to the current cycle and updated state
    Committed,
    /// The completion was superseded or its consumer went away
    Stale,
}

struct Completion<T> {
    generation: u64,
    outcome: Outcome<T>,
}

struct InFlight {
    generation: u64,
    signal: CancellationToken,
}

// ============================================================================
// Controller
// ============================================================================

pub struct RequestController<T> {
    state: FetchState<T>,
    generation: u64,
    in_flight: Option<InFlight>,
    // Spawned requests whose completion has not been received yet
    outstanding: usize,
    completion_tx: mpsc::Sender<Completion<T>>,
    completion_rx: mpsc::Receiver<Completion<T>>,
}

impl<T: Send + 'static> RequestController<T> {
    pub fn new() -> Self {
        let (completion_tx, completion_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        Self {
            state: FetchState::Idle,
            generation: 0,
            in_flight: None,
            outstanding: 0,
            completion_tx,
            completion_rx,
        }
    }

    /// Start a new fetch cycle and return its generation.
    ///
    /// Any cycle still in flight is canceled and its eventual completion is
    /// ignored. Must be called from within a tokio runtime.
    pub fn activate<F, R>(&mut self, factory: F) -> u64
    where
        F: FnOnce() -> R,
        R: CancelableRequest<Output = T>,
    {
        self.generation += 1;
        let generation = self.generation;

        if let Some(prior) = self.in_flight.take() {
            debug!(superseded = prior.generation, generation, "Superseding in-flight request");
            prior.signal.cancel();
        }
        self.state = FetchState::Loading;

        let request = factory();
        let signal = CancellationToken::new();
        self.in_flight = Some(InFlight {
            generation,
            signal: signal.clone(),
        });

        let tx = self.completion_tx.clone();
        self.outstanding += 1;
        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(request.start(signal))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    error!(generation, "Request panicked");
                    Outcome::Err(RequestError::Transport("request panicked".to_string()))
                });
            // Closed only when the controller itself is gone
            let _ = tx.send(Completion { generation, outcome }).await;
        });

        debug!(generation, "Request activated");
        generation
    }

    /// Cancel the current cycle and let it settle as `Canceled`.
    pub fn cancel(&mut self) {
        if let Some(ref in_flight) = self.in_flight {
            debug!(generation = in_flight.generation, "Canceling request");
            in_flight.signal.cancel();
        }
    }

    /// Stop caring about the current cycle.
    ///
    /// The in-flight request is canceled and its completion will be dropped;
    /// state is left exactly as it is now.
    pub fn deactivate(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            debug!(generation = in_flight.generation, "Deactivating in-flight request");
            in_flight.signal.cancel();
        }
    }

    /// Apply every completion that has already arrived, without waiting.
    /// Returns how many of them committed.
    pub fn poll_settlements(&mut self) -> usize {
        let mut committed = 0;
        while let Ok(completion) = self.completion_rx.try_recv() {
            if self.apply(completion) == Settlement::Committed {
                committed += 1;
            }
        }
        committed
    }

    /// Wait for the next completion of any generation and apply it.
    ///
    /// Returns `None` when no spawned request is outstanding. Cancel-safe:
    /// dropping the future loses no completion.
    pub async fn next_settlement(&mut self) -> Option<Settlement> {
        if self.outstanding == 0 {
            return None;
        }
        let completion = self.completion_rx.recv().await?;
        Some(self.apply(completion))
    }

    /// Apply completions until the current cycle is no longer pending.
    pub async fn wait_settled(&mut self) {
        while self.in_flight.is_some() {
            if self.next_settlement().await.is_none() {
                break;
            }
        }
    }

    fn apply(&mut self, completion: Completion<T>) -> Settlement {
        self.outstanding = self.outstanding.saturating_sub(1);

        let signal_fired = match self.in_flight {
            Some(ref in_flight)
                if in_flight.generation == completion.generation
                    && completion.generation == self.generation =>
            {
                in_flight.signal.is_cancelled()
            }
            _ => {
                trace!(
                    generation = completion.generation,
                    current = self.generation,
                    "Dropping stale completion"
                );
                return Settlement::Stale;
            }
        };
        self.in_flight = None;

        let generation = completion.generation;
        self.state = match completion.outcome {
            // Whatever a canceled request reports, it settles as canceled
            _ if signal_fired => FetchState::Canceled,
            Outcome::Ok(data) => FetchState::Succeeded(data),
            Outcome::Canceled => FetchState::Canceled,
            Outcome::Err(err) => {
                warn!(generation, error = %err, "Request failed");
                FetchState::Failed(err.to_string())
            }
        };
        debug!(generation, status = %self.state.status(), "Request settled");
        Settlement::Committed
    }
}

impl<T> RequestController<T> {
    pub fn snapshot(&self) -> Snapshot<'_, T> {
        let (data, error) = match self.state {
            FetchState::Succeeded(ref data) => (Some(data), None),
            FetchState::Failed(ref error) => (None, Some(error.as_str())),
            _ => (None, None),
        };
        Snapshot {
            status: self.state.status(),
            data,
            error,
        }
    }

    pub fn state(&self) -> &FetchState<T> {
        &self.state
    }

    pub fn status(&self) -> Status {
        self.state.status()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the current cycle is still awaiting its completion
    pub fn is_pending(&self) -> bool {
        self.in_flight.is_some()
    }
}

impl<T: Send + 'static> Default for RequestController<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for RequestController<T> {
    fn drop(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.signal.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::future::{BoxFuture, FutureExt};
    use serde_json::{json, Value};
    use tokio::sync::oneshot;

    use super::*;
    use crate::error::RequestError;
    use crate::request::from_fn;

    type Reply<T> = oneshot::Sender<Result<T, RequestError>>;

    /// A request that settles when the test says so and honors cancellation
    fn controlled<T: Send + 'static>() -> (Reply<T>, impl CancelableRequest<Output = T>) {
        let (tx, rx) = oneshot::channel();
        let request = from_fn(move |_| async move {
            rx.await
                .unwrap_or_else(|_| Err(RequestError::Transport("reply dropped".into())))
        });
        (tx, request)
    }

    /// A request that reports whatever it is told, even after cancellation
    struct Deaf<T>(oneshot::Receiver<Result<T, RequestError>>);

    impl<T: Send + 'static> CancelableRequest for Deaf<T> {
        type Output = T;

        fn start(self, _signal: CancellationToken) -> BoxFuture<'static, Outcome<T>> {
            async move {
                match self.0.await {
                    Ok(result) => result.into(),
                    Err(_) => Outcome::Err(RequestError::Transport("reply dropped".into())),
                }
            }
            .boxed()
        }
    }

    fn deaf<T: Send + 'static>() -> (Reply<T>, Deaf<T>) {
        let (tx, rx) = oneshot::channel();
        (tx, Deaf(rx))
    }

    async fn drain<T: Send + 'static>(controller: &mut RequestController<T>) {
        while controller.next_settlement().await.is_some() {}
    }

    #[test]
    fn test_starts_idle() {
        let controller = RequestController::<u32>::new();
        assert_eq!(
            controller.snapshot(),
            Snapshot {
                status: Status::Idle,
                data: None,
                error: None
            }
        );
        assert_eq!(controller.generation(), 0);
        assert!(!controller.is_pending());
    }

    #[tokio::test]
    async fn test_success_commits_data() {
        let mut controller = RequestController::new();
        let (reply, request) = controlled();

        let generation = controller.activate(|| request);
        assert_eq!(generation, 1);
        assert_eq!(controller.status(), Status::Loading);

        reply.send(Ok("users".to_string())).unwrap();
        controller.wait_settled().await;

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.status, Status::Succeeded);
        assert!(snapshot.status.is_terminal());
        assert_eq!(snapshot.data.map(String::as_str), Some("users"));
        assert_eq!(snapshot.error, None);
    }

    #[tokio::test]
    async fn test_superseded_request_never_observed() {
        let mut controller = RequestController::new();
        let (reply_a, request_a) = deaf();
        let (reply_b, request_b) = deaf();

        controller.activate(|| request_a);
        controller.activate(|| request_b);

        reply_a.send(Ok("A")).unwrap();
        assert_eq!(controller.next_settlement().await, Some(Settlement::Stale));
        assert_eq!(controller.status(), Status::Loading);

        reply_b.send(Ok("B")).unwrap();
        controller.wait_settled().await;
        drain(&mut controller).await;

        assert_eq!(controller.state(), &FetchState::Succeeded("B"));
        assert_eq!(controller.generation(), 2);
    }

    #[tokio::test]
    async fn test_supersession_fires_prior_signal() {
        let mut controller = RequestController::<u32>::new();
        let (signal_tx, signal_rx) = oneshot::channel();
        controller.activate(|| {
            from_fn(move |signal| {
                let _ = signal_tx.send(signal);
                futures::future::pending::<Result<u32, RequestError>>()
            })
        });
        let first_signal = signal_rx.await.unwrap();

        let (_reply, request) = controlled();
        controller.activate(|| request);

        assert!(first_signal.is_cancelled());
        assert_eq!(controller.next_settlement().await, Some(Settlement::Stale));
        assert!(controller.is_pending());
    }

    #[tokio::test]
    async fn test_deactivate_freezes_state() {
        let mut controller = RequestController::<Value>::new();
        let (reply, request) = deaf();

        controller.activate(|| request);
        let before = controller.state().clone();
        controller.deactivate();

        reply.send(Ok(json!({ "id": 1 }))).unwrap();
        assert_eq!(controller.next_settlement().await, Some(Settlement::Stale));

        assert_eq!(controller.state(), &before);
        assert_ne!(controller.status(), Status::Succeeded);
        assert!(!controller.is_pending());
    }

    #[tokio::test]
    async fn test_deactivate_after_settlement_keeps_result() {
        let mut controller = RequestController::new();
        let (reply, request) = controlled();
        controller.activate(|| request);
        reply.send(Ok(5u8)).unwrap();
        controller.wait_settled().await;

        controller.deactivate();
        assert_eq!(controller.state(), &FetchState::Succeeded(5));
    }

    #[tokio::test]
    async fn test_failure_then_reactivate_clears_error() {
        let mut controller = RequestController::<u32>::new();
        let (reply, request) = controlled();
        controller.activate(|| request);
        reply
            .send(Err(RequestError::Transport("network down".into())))
            .unwrap();
        controller.wait_settled().await;

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.status, Status::Failed);
        assert_eq!(snapshot.error, Some("network down"));
        assert_eq!(snapshot.data, None);

        let (_reply, request) = controlled();
        controller.activate(|| request);
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.status, Status::Loading);
        assert_eq!(snapshot.error, None);
    }

    #[tokio::test]
    async fn test_cancel_settles_as_canceled() {
        let mut controller = RequestController::<u32>::new();
        let (_reply, request) = controlled();
        controller.activate(|| request);

        controller.cancel();
        controller.wait_settled().await;

        assert_eq!(controller.status(), Status::Canceled);
        assert_eq!(controller.snapshot().error, None);
    }

    #[tokio::test]
    async fn test_data_racing_cancel_is_not_success() {
        let mut controller = RequestController::new();
        let (reply, request) = deaf();
        controller.activate(|| request);

        controller.cancel();
        reply.send(Ok(1u32)).unwrap();
        controller.wait_settled().await;

        assert_eq!(controller.state(), &FetchState::Canceled);
    }

    #[tokio::test]
    async fn test_abort_reported_as_error_is_canceled() {
        let mut controller = RequestController::<u32>::new();
        controller.activate(|| {
            from_fn(|signal: CancellationToken| async move {
                signal.cancelled().await;
                Err::<u32, _>(RequestError::Transport("aborted".into()))
            })
        });

        controller.cancel();
        controller.wait_settled().await;

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.status, Status::Canceled);
        assert_eq!(snapshot.error, None);
    }

    #[tokio::test]
    async fn test_error_racing_cancel_is_canceled() {
        let mut controller = RequestController::<u32>::new();
        let (reply, request) = deaf();
        controller.activate(|| request);

        controller.cancel();
        reply
            .send(Err(RequestError::Transport("aborted".into())))
            .unwrap();
        controller.wait_settled().await;

        assert_eq!(controller.state(), &FetchState::Canceled);
    }

    struct Panicking;

    impl CancelableRequest for Panicking {
        type Output = u32;

        fn start(self, _signal: CancellationToken) -> BoxFuture<'static, Outcome<u32>> {
            futures::future::lazy(|_| -> Outcome<u32> { panic!("decoder blew up") }).boxed()
        }
    }

    #[tokio::test]
    async fn test_panicking_request_settles_as_failed() {
        let mut controller = RequestController::<u32>::new();
        controller.activate(|| Panicking);

        tokio::time::timeout(std::time::Duration::from_secs(2), controller.wait_settled())
            .await
            .expect("controller stuck in Loading");

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.status, Status::Failed);
        assert_eq!(snapshot.error, Some("request panicked"));
        assert_eq!(controller.next_settlement().await, None);
    }

    #[tokio::test]
    async fn test_stale_failure_is_suppressed() {
        let mut controller = RequestController::<u32>::new();
        let (reply_a, request_a) = deaf();
        let (reply_b, request_b) = deaf();

        controller.activate(|| request_a);
        controller.activate(|| request_b);

        reply_a
            .send(Err(RequestError::Transport("late failure".into())))
            .unwrap();
        assert_eq!(controller.next_settlement().await, Some(Settlement::Stale));
        assert_eq!(controller.snapshot().error, None);

        reply_b.send(Ok(2)).unwrap();
        controller.wait_settled().await;
        assert_eq!(controller.state(), &FetchState::Succeeded(2));
    }

    #[tokio::test]
    async fn test_reactivate_after_deactivate() {
        let mut controller = RequestController::new();
        let (_reply, request) = controlled::<u32>();
        controller.activate(|| request);
        controller.deactivate();

        let (reply, request) = controlled();
        controller.activate(|| request);
        reply.send(Ok(9)).unwrap();
        controller.wait_settled().await;
        drain(&mut controller).await;

        assert_eq!(controller.state(), &FetchState::Succeeded(9));
        assert_eq!(controller.generation(), 2);
    }

    #[tokio::test]
    async fn test_poll_settlements_applies_arrived_completions() {
        let mut controller = RequestController::new();
        let (reply, request) = controlled();
        controller.activate(|| request);
        assert_eq!(controller.poll_settlements(), 0);

        reply.send(Ok(3u16)).unwrap();
        while controller.is_pending() {
            tokio::task::yield_now().await;
            controller.poll_settlements();
        }
        assert_eq!(controller.state(), &FetchState::Succeeded(3));
    }

    #[tokio::test]
    async fn test_drop_cancels_in_flight() {
        let mut controller = RequestController::<u32>::new();
        let (signal_tx, signal_rx) = oneshot::channel();
        controller.activate(|| {
            from_fn(move |signal| {
                let _ = signal_tx.send(signal);
                futures::future::pending::<Result<u32, RequestError>>()
            })
        });
        let signal = signal_rx.await.unwrap();
        assert!(!signal.is_cancelled());

        drop(controller);
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn test_next_settlement_without_requests() {
        let mut controller = RequestController::<u32>::new();
        assert_eq!(controller.next_settlement().await, None);
        controller.wait_settled().await;
        assert_eq!(controller.status(), Status::Idle);
    }
}
