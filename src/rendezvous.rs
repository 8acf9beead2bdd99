use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{trace, warn};

use crate::Error;

/// One of the two sides of a [`RendezVous`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    A,
    B,
}

impl Role {
    /// The side this role waits for.
    pub fn counterpart(self) -> Role {
        match self {
            Role::A => Role::B,
            Role::B => Role::A,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::A => f.write_str("A"),
            Role::B => f.write_str("B"),
        }
    }
}

#[derive(Debug, Default)]
struct Arrivals {
    a: bool,
    b: bool,
}

impl Arrivals {
    fn get(&self, role: Role) -> bool {
        match role {
            Role::A => self.a,
            Role::B => self.b,
        }
    }

    fn set(&mut self, role: Role) {
        match role {
            Role::A => self.a = true,
            Role::B => self.b = true,
        }
    }

    fn is_complete(&self) -> bool {
        self.a && self.b
    }
}

#[derive(Debug, Default)]
struct Inner {
    arrivals: Mutex<Arrivals>,
    met: Condvar,
}

/// A one-shot barrier between exactly two threads.
///
/// One thread calls [`a`](RendezVous::a), the other calls
/// [`b`](RendezVous::b). Whichever arrives first blocks until the other
/// arrives; then both return. Everything either thread did before its call
/// happens-before everything the other does after its call returns.
///
/// Each side is meant to arrive once. A rendezvous is never reset.
///
/// # Examples
///
/// ```
/// use sync_promise::RendezVous;
/// use std::thread;
///
/// let rendezvous = RendezVous::new();
/// let other = rendezvous.clone();
/// let task = thread::spawn(move || other.a());
///
/// rendezvous.b();
/// assert!(rendezvous.is_complete());
/// task.join().expect("The task thread has panicked");
/// ```
#[derive(Debug, Clone, Default)]
pub struct RendezVous {
    inner: Arc<Inner>,
}

impl RendezVous {
    /// Creates a rendezvous where neither side has arrived.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether both sides have arrived. Never blocks.
    pub fn is_complete(&self) -> bool {
        self.inner.arrivals.lock().is_complete()
    }

    /// Returns whether `role` has arrived. Never blocks.
    pub fn has_arrived(&self, role: Role) -> bool {
        self.inner.arrivals.lock().get(role)
    }

    /// Arrives as side A and blocks until side B has arrived.
    pub fn a(&self) {
        self.arrive(Role::A)
    }

    /// Arrives as side B and blocks until side A has arrived.
    pub fn b(&self) {
        self.arrive(Role::B)
    }

    /// Checked form of [`a`](RendezVous::a); see [`try_arrive`](RendezVous::try_arrive).
    pub fn try_a(&self) -> Result<(), Error> {
        self.try_arrive(Role::A)
    }

    /// Checked form of [`b`](RendezVous::b); see [`try_arrive`](RendezVous::try_arrive).
    pub fn try_b(&self) -> Result<(), Error> {
        self.try_arrive(Role::B)
    }

    /// Arrives as `role` and blocks until the counterpart has arrived.
    ///
    /// A repeated arrival by the same role is logged and otherwise behaves
    /// like a first one.
    pub fn arrive(&self, role: Role) {
        if let Err(err) = self.try_arrive(role) {
            warn!(%err, "repeated rendezvous arrival");
            let mut arrivals = self.inner.arrivals.lock();
            self.wait_for(&mut arrivals, role.counterpart());
        }
    }

    /// Like [`arrive`](RendezVous::arrive), but fails without blocking with
    /// [`Error::AlreadyArrived`] if `role` already arrived.
    pub fn try_arrive(&self, role: Role) -> Result<(), Error> {
        let mut arrivals = self.inner.arrivals.lock();
        if arrivals.get(role) {
            return Err(Error::AlreadyArrived(role));
        }
        arrivals.set(role);

        if arrivals.is_complete() {
            trace!(%role, "rendezvous complete");
            self.inner.met.notify_all();
            return Ok(());
        }
        self.wait_for(&mut arrivals, role.counterpart());
        Ok(())
    }

    fn wait_for(&self, arrivals: &mut MutexGuard<'_, Arrivals>, role: Role) {
        while !arrivals.get(role) {
            trace!(waiting_for = %role, "blocking at rendezvous");
            self.inner.met.wait(arrivals);
        }
    }
}
