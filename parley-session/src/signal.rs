//! Small stream operators the session loops are built from.
//!
//! A [`Promise`] holds the latest value of an input the owning process sets
//! (mastership intent, presence, push token). Its [`values`](Promise::values)
//! stream is combined with the operators below and finally driven by
//! [`switch_latest`], which runs one future per value and drops the previous
//! one as soon as a new value arrives.
//!
//! Dropping a pipeline's future cancels it, including the inner future
//! started by `switch_latest`. [`TaskSet`] owns the spawned pipelines and the
//! [`BlockingCalls`] they hand storage work to.

use futures::future::{self, Either};
use futures::{Stream, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{RwLock, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

/// A settable value with no initial value.
///
/// Subscribers only see values set after the promise was created; a stream
/// obtained later starts with the current value.
#[derive(Debug)]
pub struct Promise<T> {
    tx: watch::Sender<Option<T>>,
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }
}

impl<T: Clone + Send + Sync + 'static> Promise<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current value and notifies subscribers.
    pub fn set(&self, value: T) {
        self.tx.send_replace(Some(value));
    }

    /// The current value, if one was set.
    pub fn get(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    /// Stream of values: the current one (if set), then every later one.
    ///
    /// Values set faster than the consumer polls are coalesced to the latest.
    pub fn values(&self) -> impl Stream<Item = T> + Send + 'static {
        watch_values(self.tx.subscribe()).filter_map(future::ready)
    }
}

/// Stream of a watch channel's values, starting with the current one.
///
/// Ends when the sender is dropped.
pub fn watch_values<T>(mut rx: watch::Receiver<T>) -> impl Stream<Item = T> + Send + 'static
where
    T: Clone + Send + Sync + 'static,
{
    rx.mark_changed();
    futures::stream::unfold(rx, |mut rx| async move {
        rx.changed().await.ok()?;
        let value = rx.borrow_and_update().clone();
        Some((value, rx))
    })
}

/// Suppresses values equal to the previous one.
pub fn distinct_until_changed<S>(stream: S) -> impl Stream<Item = S::Item>
where
    S: Stream,
    S::Item: PartialEq + Clone,
{
    stream
        .scan(None, |last: &mut Option<S::Item>, value| {
            let changed = last.as_ref() != Some(&value);
            if changed {
                *last = Some(value.clone());
            }
            future::ready(Some(changed.then_some(value)))
        })
        .filter_map(future::ready)
}

/// Pairs of the latest value of each input, emitted on every change of
/// either once both have produced a value.
pub fn combine_latest<A, B>(a: A, b: B) -> impl Stream<Item = (A::Item, B::Item)>
where
    A: Stream,
    B: Stream,
    A::Item: Clone,
    B::Item: Clone,
{
    futures::stream::select(a.map(Either::Left), b.map(Either::Right))
        .scan(
            (None, None),
            |latest: &mut (Option<A::Item>, Option<B::Item>), item| {
                match item {
                    Either::Left(a) => latest.0 = Some(a),
                    Either::Right(b) => latest.1 = Some(b),
                }
                let pair = match latest {
                    (Some(a), Some(b)) => Some((a.clone(), b.clone())),
                    _ => None,
                };
                future::ready(Some(pair))
            },
        )
        .filter_map(future::ready)
}

enum SwitchEvent<T> {
    Next(Option<T>),
    InnerDone,
}

/// Runs `f(value)` for each value of `stream`, dropping the previous
/// future whenever a new value arrives.
///
/// Completes once the stream has ended and the last inner future finished.
pub async fn switch_latest<S, F, Fut>(stream: S, mut f: F)
where
    S: Stream,
    F: FnMut(S::Item) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut stream = std::pin::pin!(stream);
    let mut current: Option<Pin<Box<Fut>>> = None;
    loop {
        let event = match current.as_mut() {
            Some(inner) => tokio::select! {
                biased;
                next = stream.next() => SwitchEvent::Next(next),
                () = inner.as_mut() => SwitchEvent::InnerDone,
            },
            None => SwitchEvent::Next(stream.next().await),
        };
        match event {
            SwitchEvent::Next(Some(value)) => current = Some(Box::pin(f(value))),
            SwitchEvent::Next(None) => break,
            SwitchEvent::InnerDone => current = None,
        }
    }
    if let Some(inner) = current {
        inner.await;
    }
}

/// Runs synchronous calls (SQLite, process spawns) on the blocking pool.
///
/// A call cannot be interrupted once started. Each one holds a read guard
/// until it returns, so [`drain`](Self::drain) waits for every call already
/// in flight.
#[derive(Debug, Clone, Default)]
pub struct BlockingCalls {
    in_flight: Arc<RwLock<()>>,
}

impl BlockingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` on the blocking pool and waits for its result.
    ///
    /// Dropping the returned future abandons the result, not the call.
    pub async fn run<F, R>(&self, f: F) -> Result<R, JoinError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let guard = self.in_flight.clone().read_owned().await;
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            f()
        })
        .await
    }

    /// Waits until no call is running.
    pub async fn drain(&self) {
        drop(self.in_flight.write().await);
    }
}

/// Spawned tasks owned by one session.
///
/// Dropping the set aborts every task without waiting.
#[derive(Debug, Default)]
pub struct TaskSet {
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
    blocking: BlockingCalls,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `task` on the current runtime and takes ownership of it.
    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        debug!("Starting {}", name);
        let handle = tokio::spawn(task);
        self.lock().push((name, handle));
    }

    /// Blocking-call runner whose calls [`shutdown`](Self::shutdown) waits for.
    pub fn blocking(&self) -> BlockingCalls {
        self.blocking.clone()
    }

    /// Number of tasks still owned.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Aborts every task, waits until each one has been dropped, then waits
    /// for blocking calls they started.
    pub async fn shutdown(&self) {
        let tasks = std::mem::take(&mut *self.lock());
        for (_, handle) in &tasks {
            handle.abort();
        }
        for (name, handle) in tasks {
            match handle.await {
                Err(e) if e.is_panic() => warn!("{} panicked: {}", name, e),
                _ => debug!("Stopped {}", name),
            }
        }
        self.blocking.drain().await;
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(&'static str, JoinHandle<()>)>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TaskSet {
    fn drop(&mut self) {
        for (_, handle) in self.lock().iter() {
            handle.abort();
        }
    }
}
