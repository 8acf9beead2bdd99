use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, trace, warn};

use crate::Error;

/// Default error type carried by a [`Promise`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The resolved payload. An empty list means success.
///
/// Every reader of a promise gets a clone of the same `Arc`.
pub type Errors<E> = Arc<Vec<E>>;

type Callback<E> = Box<dyn FnOnce(Errors<E>) + Send>;

enum State<E> {
    Pending {
        // Keyed by waiter so a re-polled or dropped waiter leaves one entry at most.
        wakers: Vec<(usize, Waker)>,
        next_waiter: usize,
        callbacks: Vec<Callback<E>>,
    },
    Resolved(Errors<E>),
}

struct Inner<E> {
    state: Mutex<State<E>>,
    resolved: Condvar,
    name: String,
    stack_size: Option<usize>,
}

/// A one-shot completion cell that many threads can wait on.
///
/// A promise is resolved once with a list of errors through
/// [`Promise::complete`]. Until then, [`Promise::wait`] blocks, a [`Waiter`]
/// stays pending and callbacks given to [`Promise::and_then`] are queued.
///
/// # Examples
///
/// ```
/// use sync_promise::Promise;
/// use std::thread;
///
/// let promise = Promise::<String>::new();
/// let waiters: Vec<_> = (0..3)
///     .map(|_| {
///         let promise = promise.clone();
///         thread::spawn(move || promise.wait())
///     })
///     .collect();
///
/// promise.complete(vec!["disk full".to_string()]);
/// for waiter in waiters {
///     let errors = waiter.join().expect("The waiter thread has panicked");
///     assert_eq!(*errors, vec!["disk full".to_string()]);
/// }
/// ```
pub struct Promise<E = BoxError> {
    inner: Arc<Inner<E>>,
}

impl<E> Clone for Promise<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E> Default for Promise<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Promise<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("name", &self.inner.name)
            .field("complete", &self.is_complete())
            .finish()
    }
}

impl Promise {
    /// Returns a builder to configure a promise before creating it.
    pub fn builder() -> PromiseBuilder {
        PromiseBuilder::default()
    }
}

impl<E> Promise<E> {
    /// Creates a pending promise with the default configuration.
    pub fn new() -> Self {
        PromiseBuilder::default().build()
    }

    /// The name given through [`PromiseBuilder::name`].
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns whether the promise has been resolved. Never blocks.
    pub fn is_complete(&self) -> bool {
        matches!(*self.inner.state.lock(), State::Resolved(_))
    }

    /// Returns the payload if the promise has been resolved.
    pub fn try_get(&self) -> Option<Errors<E>> {
        match &*self.inner.state.lock() {
            State::Resolved(payload) => Some(payload.clone()),
            State::Pending { .. } => None,
        }
    }

    /// Blocks the calling thread until the promise is resolved and returns
    /// the payload. Returns immediately once resolved.
    pub fn wait(&self) -> Errors<E> {
        let mut state = self.inner.state.lock();
        loop {
            if let State::Resolved(payload) = &*state {
                return payload.clone();
            }
            trace!(promise = %self.inner.name, "blocking until resolved");
            self.inner.resolved.wait(&mut state);
        }
    }

    /// Returns a future that resolves to the payload.
    pub fn waiter(&self) -> Waiter<E> {
        Waiter {
            promise: self.clone(),
            key: None,
        }
    }
}

impl<E> Promise<E>
where
    E: Send + Sync + 'static,
{
    /// Resolves the promise with `errors`.
    ///
    /// Wakes every blocked [`wait`](Promise::wait) and [`Waiter`], then starts
    /// each queued callback on its own thread. Does not wait for callbacks to
    /// finish.
    ///
    /// A promise is meant to be completed once. Later calls keep the first
    /// payload and are logged; use [`try_complete`](Promise::try_complete) to
    /// detect them.
    pub fn complete(&self, errors: Vec<E>) {
        if let Err(err) = self.try_complete(errors) {
            warn!(promise = %self.inner.name, %err, "ignoring repeated completion");
        }
    }

    /// Like [`complete`](Promise::complete), but fails with
    /// [`Error::AlreadyComplete`] if the promise was already resolved.
    pub fn try_complete(&self, errors: Vec<E>) -> Result<(), Error> {
        let payload = Arc::new(errors);
        let (wakers, callbacks) = {
            let mut state = self.inner.state.lock();
            let pending = match &mut *state {
                State::Resolved(_) => return Err(Error::AlreadyComplete),
                State::Pending {
                    wakers, callbacks, ..
                } => {
                    (std::mem::take(wakers), std::mem::take(callbacks))
                }
            };
            *state = State::Resolved(payload.clone());
            pending
        };
        self.inner.resolved.notify_all();

        debug!(
            promise = %self.inner.name,
            errors = payload.len(),
            callbacks = callbacks.len(),
            "promise resolved"
        );
        for (_, waker) in wakers {
            waker.wake();
        }
        for callback in callbacks {
            self.dispatch(callback, payload.clone());
        }
        Ok(())
    }

    /// Runs `callback` with the payload once the promise is resolved.
    ///
    /// The callback always runs on a thread of its own, so neither this call
    /// nor [`complete`](Promise::complete) waits on it. If the promise is
    /// already resolved the callback is started right away.
    ///
    /// If the OS refuses to spawn that thread, the callback runs inline on
    /// the thread calling `and_then` or `complete`, which then blocks until
    /// it returns.
    pub fn and_then<F>(&self, callback: F)
    where
        F: FnOnce(Errors<E>) + Send + 'static,
    {
        let payload = {
            let mut state = self.inner.state.lock();
            match &mut *state {
                State::Pending { callbacks, .. } => {
                    callbacks.push(Box::new(callback));
                    trace!(promise = %self.inner.name, queued = callbacks.len(), "callback queued");
                    return;
                }
                State::Resolved(payload) => payload.clone(),
            }
        };
        self.dispatch(Box::new(callback), payload);
    }

    fn dispatch(&self, callback: Callback<E>, payload: Errors<E>) {
        // Shared so the callback can still run here if the spawn fails.
        let job = Arc::new(Mutex::new(Some((callback, payload))));
        let remote = job.clone();

        let mut builder = thread::Builder::new().name(format!("{}-then", self.inner.name));
        if let Some(size) = self.inner.stack_size {
            builder = builder.stack_size(size);
        }
        let spawned = builder.spawn(move || {
            let taken = remote.lock().take();
            if let Some((callback, payload)) = taken {
                callback(payload);
            }
        });

        match spawned {
            Ok(_) => trace!(promise = %self.inner.name, "callback dispatched"),
            Err(err) => {
                error!(
                    promise = %self.inner.name,
                    %err,
                    "failed to spawn callback thread, running inline"
                );
                let taken = job.lock().take();
                if let Some((callback, payload)) = taken {
                    callback(payload);
                }
            }
        }
    }
}

/// Future returned by [`Promise::waiter`].
///
/// Any number of waiters may be pending on the same promise; all of them are
/// woken when it resolves.
pub struct Waiter<E = BoxError> {
    promise: Promise<E>,
    key: Option<usize>,
}

impl<E> fmt::Debug for Waiter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waiter").field("promise", &self.promise).finish()
    }
}

impl<E> Future for Waiter<E> {
    type Output = Errors<E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut state = this.promise.inner.state.lock();
        match &mut *state {
            State::Resolved(payload) => Poll::Ready(payload.clone()),
            State::Pending {
                wakers,
                next_waiter,
                ..
            } => {
                let slot = this
                    .key
                    .and_then(|key| wakers.iter().position(|(k, _)| *k == key));
                match slot {
                    Some(index) => {
                        let waker = &mut wakers[index].1;
                        if !waker.will_wake(cx.waker()) {
                            *waker = cx.waker().clone();
                        }
                    }
                    None => {
                        let key = *next_waiter;
                        *next_waiter += 1;
                        wakers.push((key, cx.waker().clone()));
                        this.key = Some(key);
                    }
                }
                Poll::Pending
            }
        }
    }
}

impl<E> Drop for Waiter<E> {
    fn drop(&mut self) {
        let Some(key) = self.key else {
            return;
        };
        if let State::Pending { wakers, .. } = &mut *self.promise.inner.state.lock() {
            wakers.retain(|(k, _)| *k != key);
        }
    }
}

/// Configures a [`Promise`] before it is created.
#[derive(Debug, Clone)]
pub struct PromiseBuilder {
    name: String,
    stack_size: Option<usize>,
}

impl Default for PromiseBuilder {
    fn default() -> Self {
        Self {
            name: "promise".into(),
            stack_size: None,
        }
    }
}

impl PromiseBuilder {
    /// Sets the name used in log events. Callback threads are named
    /// `"{name}-then"`.
    pub fn name<N: Into<String>>(self, name: N) -> Self {
        Self {
            name: name.into(),
            ..self
        }
    }

    /// Sets the stack size of callback threads.
    pub fn stack_size(self, size: usize) -> Self {
        Self {
            stack_size: Some(size),
            ..self
        }
    }

    /// Creates a pending promise with this configuration.
    pub fn build<E>(self) -> Promise<E> {
        Promise {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Pending {
                    wakers: vec![],
                    next_waiter: 0,
                    callbacks: vec![],
                }),
                resolved: Condvar::new(),
                name: self.name,
                stack_size: self.stack_size,
            }),
        }
    }
}
