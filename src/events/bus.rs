use std::{collections::HashMap, fmt, panic::AssertUnwindSafe, sync::Arc};

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::{events::metrics::EventMetrics, model::apperror::ApplicationError};

/**
 * Name of a category of domain events.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKind(&'static str);

impl EventKind {
    pub const fn new(name: &'static str) -> Self {
        EventKind(name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/**
 * A temperature reading was stored.
 */
pub const TEMPERATURE_CREATED: EventKind = EventKind::new("temperature_created");

/**
 * Handler invoked when an event it is registered for is published.
 *
 * Every invocation gets its own copy of the payload and its own cancellation token.
 */
#[async_trait]
pub trait EventListener<P: Send + 'static>: Send + Sync {
    /**
     * Name used in logs.
     */
    fn name(&self) -> &'static str;

    async fn on_event(&self, payload: P, scope: CancellationToken) -> Result<(), ApplicationError>;
}

/**
 * In-process publish/subscribe registry.
 *
 * Listeners are registered while the bus is still owned during startup. Once shared behind an `Arc`
 * the topology can no longer change, so publishing never races registration.
 */
pub struct EventBus<P: Send + 'static> {
    listeners: HashMap<EventKind, Vec<Arc<dyn EventListener<P>>>>,
    /**
     * Caps the number of listener invocations running at once. `None` is unbounded.
     */
    limiter: Option<Arc<Semaphore>>,
    root_scope: CancellationToken,
    metrics: EventMetrics,
}

impl<P: Clone + Send + 'static> EventBus<P> {
    /**
     * Creates a bus without listeners.
     *
     * # Arguments
     * `max_concurrent_listeners`: Optional cap on concurrently running invocations.
     * `metrics`: Metrics updated for every invocation.
     */
    pub fn new(max_concurrent_listeners: Option<usize>, metrics: EventMetrics) -> Self {
        let limiter = max_concurrent_listeners.map(|permits| {
            if permits == 0 {
                warn!("A limit of 0 concurrent listeners would stall every event, using 1");
            }
            Arc::new(Semaphore::new(permits.max(1)))
        });
        EventBus { listeners: HashMap::new(), limiter, root_scope: CancellationToken::new(), metrics }
    }

    /**
     * Appends a listener for the event kind. Registering the same listener twice invokes it twice.
     */
    pub fn register(&mut self, kind: EventKind, listener: Arc<dyn EventListener<P>>) {
        info!("Registering listener {} for event {}", listener.name(), kind);
        self.listeners.entry(kind).or_default().push(listener);
    }

    /**
     * Spawns one task per listener registered for the kind and returns without waiting for them.
     * Must be called from within a tokio runtime.
     */
    pub fn publish(&self, kind: EventKind, payload: &P) {
        let Some(listeners) = self.listeners.get(&kind) else {
            debug!("No listeners registered for event {}", kind);
            return;
        };
        for listener in listeners {
            let span = info_span!("event_listener", event = %kind, listener = listener.name());
            let invocation = Invocation { listener: Arc::clone(listener), scope: self.root_scope.child_token(), limiter: self.limiter.clone(), metrics: self.metrics.clone() };
            tokio::spawn(invocation.run(payload.clone()).instrument(span));
        }
    }

    /**
     * Cancels every running and waiting listener invocation. Later publishes start already cancelled.
     */
    pub fn shutdown(&self) {
        info!("Cancelling event listeners");
        self.root_scope.cancel();
    }
}

/**
 * A single scheduled listener call.
 */
struct Invocation<P: Send + 'static> {
    listener: Arc<dyn EventListener<P>>,
    scope: CancellationToken,
    limiter: Option<Arc<Semaphore>>,
    metrics: EventMetrics,
}

impl<P: Send + 'static> Invocation<P> {
    async fn run(self, payload: P) {
        let _permit = match &self.limiter {
            Some(limiter) => {
                let acquired = tokio::select! {
                    () = self.scope.cancelled() => None,
                    permit = Arc::clone(limiter).acquire_owned() => permit.ok(),
                };
                let Some(permit) = acquired else {
                    warn!("Listener cancelled before it started");
                    self.metrics.listener_failures.inc();
                    return;
                };
                Some(permit)
            }
            None => None,
        };
        self.metrics.listeners_in_flight.inc();
        let call = AssertUnwindSafe(self.listener.on_event(payload, self.scope.clone())).catch_unwind();
        let outcome = tokio::select! {
            () = self.scope.cancelled() => Err("cancelled".to_string()),
            result = call => match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(err.to_string()),
                Err(panic) => Err(format!("panicked: {}", panic_message(panic.as_ref()))),
            },
        };
        self.metrics.listeners_in_flight.dec();
        match outcome {
            Ok(()) => info!("Listener finished"),
            Err(message) => {
                self.metrics.listener_failures.inc();
                error!("Listener failed: {message}");
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use tokio::sync::{Notify, mpsc};

    use super::*;
    use crate::model::apperror::ErrorType;

    const OTHER_EVENT: EventKind = EventKind::new("other_event");

    struct RecordingListener {
        name: &'static str,
        sender: mpsc::UnboundedSender<(&'static str, u32)>,
    }

    #[async_trait]
    impl EventListener<u32> for RecordingListener {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn on_event(&self, payload: u32, _scope: CancellationToken) -> Result<(), ApplicationError> {
            self.sender.send((self.name, payload)).map_err(|err| ApplicationError::new(ErrorType::Application, err.to_string()))
        }
    }

    struct FailingListener {
        calls: Arc<AtomicUsize>,
        panic: bool,
    }

    #[async_trait]
    impl EventListener<u32> for FailingListener {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn on_event(&self, _payload: u32, _scope: CancellationToken) -> Result<(), ApplicationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.panic {
                panic!("listener exploded");
            }
            Err(ApplicationError::new(ErrorType::DeliveryFailure, "listener failed".to_string()))
        }
    }

    struct BlockingListener {
        release: Arc<Notify>,
        started: Arc<AtomicUsize>,
        finished: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventListener<u32> for BlockingListener {
        fn name(&self) -> &'static str {
            "blocking"
        }

        async fn on_event(&self, _payload: u32, _scope: CancellationToken) -> Result<(), ApplicationError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn bus(max_concurrent_listeners: Option<usize>) -> EventBus<u32> {
        EventBus::new(max_concurrent_listeners, EventMetrics::new().unwrap())
    }

    async fn receive_all(receiver: &mut mpsc::UnboundedReceiver<(&'static str, u32)>, count: usize) -> Vec<(&'static str, u32)> {
        let mut received = Vec::new();
        for _ in 0..count {
            let message = tokio::time::timeout(Duration::from_secs(5), receiver.recv()).await.unwrap().unwrap();
            received.push(message);
        }
        received.sort_unstable();
        received
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_every_listener_invoked_once() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let mut bus = bus(None);
        for name in ["first", "second", "third"] {
            bus.register(TEMPERATURE_CREATED, Arc::new(RecordingListener { name, sender: sender.clone() }));
        }
        bus.publish(TEMPERATURE_CREATED, &7);
        let received = receive_all(&mut receiver, 3).await;
        assert_eq!(received, vec![("first", 7), ("second", 7), ("third", 7)]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_duplicate_registration_invokes_twice() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let mut bus = bus(None);
        let listener: Arc<dyn EventListener<u32>> = Arc::new(RecordingListener { name: "twice", sender });
        bus.register(TEMPERATURE_CREATED, Arc::clone(&listener));
        bus.register(TEMPERATURE_CREATED, listener);
        bus.publish(TEMPERATURE_CREATED, &1);
        assert_eq!(receive_all(&mut receiver, 2).await, vec![("twice", 1), ("twice", 1)]);
    }

    #[tokio::test]
    async fn test_failing_listeners_do_not_stop_others() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut bus = bus(None);
        bus.register(TEMPERATURE_CREATED, Arc::new(FailingListener { calls: Arc::clone(&calls), panic: false }));
        bus.register(TEMPERATURE_CREATED, Arc::new(FailingListener { calls: Arc::clone(&calls), panic: true }));
        bus.register(TEMPERATURE_CREATED, Arc::new(RecordingListener { name: "healthy", sender }));
        bus.publish(TEMPERATURE_CREATED, &3);
        assert_eq!(receive_all(&mut receiver, 1).await, vec![("healthy", 3)]);
        wait_until(|| calls.load(Ordering::SeqCst) == 2).await;
        let failures = bus.metrics.listener_failures.clone();
        wait_until(|| failures.get() == 2).await;
    }

    #[tokio::test]
    async fn test_unknown_event_kind_is_noop() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let mut bus = bus(None);
        bus.register(TEMPERATURE_CREATED, Arc::new(RecordingListener { name: "only", sender }));
        bus.publish(OTHER_EVENT, &1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_does_not_wait_for_listeners() {
        let release = Arc::new(Notify::new());
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let mut bus = bus(None);
        bus.register(TEMPERATURE_CREATED, Arc::new(BlockingListener { release: Arc::clone(&release), started: Arc::clone(&started), finished: Arc::clone(&finished) }));
        bus.publish(TEMPERATURE_CREATED, &1);
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        wait_until(|| started.load(Ordering::SeqCst) == 1).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        release.notify_one();
        wait_until(|| finished.load(Ordering::SeqCst) == 1).await;
    }

    #[tokio::test]
    async fn test_limiter_bounds_running_invocations() {
        let release = Arc::new(Notify::new());
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let mut bus = bus(Some(1));
        bus.register(TEMPERATURE_CREATED, Arc::new(BlockingListener { release: Arc::clone(&release), started: Arc::clone(&started), finished: Arc::clone(&finished) }));
        bus.publish(TEMPERATURE_CREATED, &1);
        bus.publish(TEMPERATURE_CREATED, &2);
        wait_until(|| started.load(Ordering::SeqCst) == 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        release.notify_one();
        wait_until(|| started.load(Ordering::SeqCst) == 2).await;
        release.notify_one();
        wait_until(|| finished.load(Ordering::SeqCst) == 2).await;
    }

    #[tokio::test]
    async fn test_zero_limit_still_runs_listeners() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let mut bus = bus(Some(0));
        bus.register(TEMPERATURE_CREATED, Arc::new(RecordingListener { name: "limited", sender }));
        bus.publish(TEMPERATURE_CREATED, &5);
        assert_eq!(receive_all(&mut receiver, 1).await, vec![("limited", 5)]);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_running_listeners() {
        let release = Arc::new(Notify::new());
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let mut bus = bus(None);
        bus.register(TEMPERATURE_CREATED, Arc::new(BlockingListener { release, started: Arc::clone(&started), finished: Arc::clone(&finished) }));
        bus.publish(TEMPERATURE_CREATED, &1);
        wait_until(|| started.load(Ordering::SeqCst) == 1).await;
        bus.shutdown();
        let failures = bus.metrics.listener_failures.clone();
        wait_until(|| failures.get() == 1).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        assert_eq!(bus.metrics.listeners_in_flight.get(), 0);
    }
}
