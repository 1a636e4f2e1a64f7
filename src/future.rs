//! One-shot asynchronous result handle.
//!
//! Workers run as `tokio` tasks rather than raw OS threads (per the "Workers
//! run as OS threads today; they should migrate to a task pool with explicit
//! cancellation tokens" redesign note in §9). Each [`Future`] is a cheaply
//! cloneable observer handle; [`FutureJoin`] additionally owns the worker's
//! `JoinHandle` and implements the "interrupt, then join" destruction order
//! from §4.5.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::error::ControllerError;

/// Lifecycle states of a [`Future`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureState {
    Init,
    Loading,
    Ready,
    Error,
    Cancelled,
}

/// A point-in-time view of a future's progress, published over a `watch`
/// channel so observers never miss the latest state.
#[derive(Debug, Clone, PartialEq)]
pub struct FutureSnapshot {
    pub state: FutureState,
    /// 0..=100, monotonically non-decreasing until completion.
    pub progress: u8,
}

impl Default for FutureSnapshot {
    fn default() -> Self {
        Self {
            state: FutureState::Init,
            progress: 0,
        }
    }
}

/// Outcome of [`Future::wait`].
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome<T> {
    Ready(T),
    Timeout,
    Cancelled,
    Error(ControllerError),
}

/// A small typed scratch map a worker may use to stash intermediate state
/// that stays visible to the caller post-completion.
#[derive(Debug, Clone, PartialEq)]
pub enum ScratchValue {
    SampleValue(f64),
    EventId(u64),
    AsyncQuery(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScratchKey {
    SampleValue,
    EventId,
    AsyncQuery,
}

/// Anything that can be told to cancel; used for sub-future adoption so a
/// parent's cancellation recurses without knowing its children's payload type.
pub trait Cancellable: Send + Sync {
    fn cancel(&self);
    fn memory_usage(&self) -> u64;
}

enum Terminal<T> {
    Ready(T),
    Error(ControllerError),
    Cancelled,
}

struct Inner<T> {
    tx: watch::Sender<FutureSnapshot>,
    interrupt: AtomicBool,
    terminal: Mutex<Option<Terminal<T>>>,
    children: Mutex<Vec<Arc<dyn Cancellable>>>,
    scratch: Mutex<HashMap<ScratchKey, ScratchValue>>,
    #[allow(clippy::type_complexity)]
    progress_cb: Mutex<Option<Arc<dyn Fn(&FutureSnapshot) + Send + Sync>>>,
}

/// A one-shot, cheaply cloneable handle to a background result.
///
/// `T` must be `Clone` because multiple observers may hold a `Future` and
/// each is entitled to read the terminal result independently.
pub struct Future<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// The worker-facing half: the only thing allowed to resolve a [`Future`].
pub struct Promise<T> {
    inner: Arc<Inner<T>>,
}

impl<T: Clone + Send + Sync + 'static> Future<T> {
    /// Creates a linked (`Future`, `Promise`) pair in the `Init` state.
    pub fn new_pair() -> (Self, Promise<T>) {
        let (tx, _rx) = watch::channel(FutureSnapshot::default());
        let inner = Arc::new(Inner {
            tx,
            interrupt: AtomicBool::new(false),
            terminal: Mutex::new(None),
            children: Mutex::new(Vec::new()),
            scratch: Mutex::new(HashMap::new()),
            progress_cb: Mutex::new(None),
        });
        (
            Future {
                inner: inner.clone(),
            },
            Promise { inner },
        )
    }

    pub fn state(&self) -> FutureState {
        self.inner.tx.borrow().state
    }

    pub fn progress(&self) -> u8 {
        self.inner.tx.borrow().progress
    }

    /// Registers a callback invoked whenever progress or status changes.
    pub fn set_progress_callback<F>(&self, cb: F)
    where
        F: Fn(&FutureSnapshot) + Send + Sync + 'static,
    {
        *self.inner.progress_cb.lock().expect("poisoned") = Some(Arc::new(cb));
    }

    /// Adopts a child future. `wait` on the parent does not itself block on
    /// children completing (each child is independently awaited by its own
    /// owner) but cancelling or dropping the parent cancels every child.
    pub fn adopt_child(&self, child: Arc<dyn Cancellable>) {
        self.inner.children.lock().expect("poisoned").push(child);
    }

    /// Sets the interrupt flag. The owning worker must poll it. Recurses
    /// into every adopted child.
    pub fn cancel(&self) {
        self.inner.interrupt.store(true, Ordering::SeqCst);
        for child in self.inner.children.lock().expect("poisoned").iter() {
            child.cancel();
        }
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.inner.interrupt.load(Ordering::SeqCst)
    }

    pub fn get_scratch(&self, key: ScratchKey) -> Option<ScratchValue> {
        self.inner.scratch.lock().expect("poisoned").get(&key).cloned()
    }

    /// Blocks (asynchronously) until the future settles or `timeout` elapses.
    /// `None` blocks indefinitely.
    pub async fn wait(&self, timeout: Option<std::time::Duration>) -> WaitOutcome<T> {
        let mut rx = self.inner.tx.subscribe();
        let wait_for_terminal = async {
            loop {
                {
                    let terminal = self.inner.terminal.lock().expect("poisoned");
                    if let Some(t) = terminal.as_ref() {
                        return match t {
                            Terminal::Ready(v) => WaitOutcome::Ready(v.clone()),
                            Terminal::Error(e) => WaitOutcome::Error(e.clone()),
                            Terminal::Cancelled => WaitOutcome::Cancelled,
                        };
                    }
                }
                if rx.changed().await.is_err() {
                    // sender dropped without ever setting a terminal result
                    return WaitOutcome::Error(ControllerError::Unknown(
                        "future abandoned without a terminal result".to_owned(),
                    ));
                }
            }
        };
        match timeout {
            None => wait_for_terminal.await,
            Some(d) => match tokio::time::timeout(d, wait_for_terminal).await {
                Ok(outcome) => outcome,
                Err(_) => WaitOutcome::Timeout,
            },
        }
    }

    pub fn memory_usage(&self) -> u64 {
        std::mem::size_of::<Self>() as u64
            + self
                .inner
                .children
                .lock()
                .expect("poisoned")
                .iter()
                .map(|c| c.memory_usage())
                .sum::<u64>()
    }
}

impl<T: Send + Sync> Cancellable for Future<T> {
    fn cancel(&self) {
        Future::cancel(self);
    }
    fn memory_usage(&self) -> u64 {
        std::mem::size_of::<Self>() as u64
    }
}

impl<T: Clone + Send + Sync + 'static> Promise<T> {
    pub fn is_cancel_requested(&self) -> bool {
        self.inner.interrupt.load(Ordering::SeqCst)
    }

    /// Resolves once the interrupt flag is set. Meant to be raced (via
    /// `tokio::select!`) against the database call a worker is awaiting, so
    /// cancellation can interrupt mid-flight instead of only being checked
    /// between awaits.
    pub async fn wait_for_cancel(&self) {
        while !self.is_cancel_requested() {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    }

    fn publish(&self, snapshot: FutureSnapshot) {
        if let Some(cb) = self.inner.progress_cb.lock().expect("poisoned").as_ref() {
            cb(&snapshot);
        }
        let _ = self.inner.tx.send(snapshot);
    }

    /// Advances progress (0..=100). Asserts monotonicity, matching the
    /// "monotonically non-decreasing until completion" contract.
    pub fn advance(&self, progress: u8) {
        let previous = self.inner.tx.borrow().progress;
        debug_assert!(
            progress >= previous,
            "progress must be monotonically non-decreasing"
        );
        self.publish(FutureSnapshot {
            state: FutureState::Loading,
            progress: progress.max(previous),
        });
    }

    pub fn set_scratch(&self, key: ScratchKey, value: ScratchValue) {
        self.inner.scratch.lock().expect("poisoned").insert(key, value);
    }

    /// Resolves the future successfully. Completion is exactly-once: a
    /// terminal result already set is never overwritten.
    pub fn resolve(&self, value: T) {
        let mut terminal = self.inner.terminal.lock().expect("poisoned");
        if terminal.is_some() {
            return;
        }
        *terminal = Some(Terminal::Ready(value));
        drop(terminal);
        self.publish(FutureSnapshot {
            state: FutureState::Ready,
            progress: 100,
        });
    }

    pub fn reject(&self, error: ControllerError) {
        let mut terminal = self.inner.terminal.lock().expect("poisoned");
        if terminal.is_some() {
            return;
        }
        *terminal = Some(Terminal::Error(error));
        drop(terminal);
        self.publish(FutureSnapshot {
            state: FutureState::Error,
            progress: self.inner.tx.borrow().progress,
        });
    }

    pub fn mark_cancelled(&self) {
        let mut terminal = self.inner.terminal.lock().expect("poisoned");
        if terminal.is_some() {
            return;
        }
        *terminal = Some(Terminal::Cancelled);
        drop(terminal);
        self.publish(FutureSnapshot {
            state: FutureState::Cancelled,
            progress: self.inner.tx.borrow().progress,
        });
    }
}

/// Owns the worker task and enforces "interrupt, then join" on drop.
pub struct FutureJoin<T> {
    future: Future<T>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl<T: Clone + Send + Sync + 'static> FutureJoin<T> {
    pub fn new(future: Future<T>, handle: tokio::task::JoinHandle<()>) -> Self {
        Self {
            future,
            handle: Some(handle),
        }
    }

    pub fn future(&self) -> Future<T> {
        self.future.clone()
    }
}

impl<T> Drop for FutureJoin<T> {
    fn drop(&mut self) {
        self.future.cancel();
        if let Some(handle) = self.handle.take() {
            // `abort` is the non-blocking analogue of joining a worker
            // thread from a synchronous `Drop` impl: we cannot `.await` here.
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_exactly_once() {
        let (future, promise) = Future::<u64>::new_pair();
        promise.resolve(1);
        promise.resolve(2);
        match future.wait(None).await {
            WaitOutcome::Ready(v) => assert_eq!(v, 1),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn success_is_stable_across_repeated_waits() {
        let (future, promise) = Future::<u64>::new_pair();
        promise.resolve(7);
        for _ in 0..3 {
            match future.wait(None).await {
                WaitOutcome::Ready(v) => assert_eq!(v, 7),
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn timeout_does_not_cancel() {
        let (future, _promise) = Future::<u64>::new_pair();
        let outcome = future.wait(Some(std::time::Duration::from_millis(5))).await;
        assert_eq!(outcome, WaitOutcome::Timeout);
        assert!(!future.is_cancel_requested());
    }

    #[tokio::test]
    async fn cancel_then_wait_returns_cancelled() {
        let (future, promise) = Future::<u64>::new_pair();
        future.cancel();
        assert!(promise.is_cancel_requested());
        promise.mark_cancelled();
        assert_eq!(future.wait(None).await, WaitOutcome::Cancelled);
    }

    #[tokio::test]
    async fn cancelling_parent_cancels_children() {
        let (parent, _parent_promise) = Future::<u64>::new_pair();
        let (child, _child_promise) = Future::<u64>::new_pair();
        parent.adopt_child(Arc::new(child.clone()));
        parent.cancel();
        assert!(child.is_cancel_requested());
    }
}
