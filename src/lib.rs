//! One-shot coordination primitives for threads.
//!
//! - [`Promise`] is a single-assignment completion cell. One producer resolves
//!   it with a list of errors (empty means success) and any number of
//!   consumers can block on it, await it, or register a callback.
//! - [`RendezVous`] is a two-party barrier. The "A" side and the "B" side each
//!   arrive once and neither proceeds until the other has arrived.
//!
//! Both types are cheap to clone; clones share the same state.
//!
//! ```
//! use sync_promise::{Promise, RendezVous};
//! use std::thread;
//!
//! let promise = Promise::<String>::new();
//! let rendezvous = RendezVous::new();
//!
//! let (p, r) = (promise.clone(), rendezvous.clone());
//! let worker = thread::spawn(move || {
//!     r.a();
//!     p.complete(vec![]);
//! });
//!
//! rendezvous.b();
//! assert!(promise.wait().is_empty());
//! worker.join().expect("The worker thread has panicked");
//! ```
pub mod promise;
pub mod rendezvous;

pub use promise::{BoxError, Errors, Promise, PromiseBuilder, Waiter};
pub use rendezvous::{RendezVous, Role};

/// Misuse reported by the checked operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("promise was already completed")]
    AlreadyComplete,
    #[error("role {0} already arrived at the rendezvous")]
    AlreadyArrived(Role),
}
