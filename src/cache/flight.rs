//! Single-flight registry: at most one backend call in flight per cache key.
//!
//! The first request to miss on a key becomes the leader and gets a
//! [`Leader`] guard; requests arriving while it runs become followers holding
//! a [`Follower`] and wait for the leader's record. Each
//! [`ResponseCache`](super::ResponseCache) owns its own registry.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tokio::{sync::watch, time::Instant};
use tracing::{debug, warn};

use super::record::CacheRecord;

type Slot = Option<Arc<CacheRecord>>;

struct Flight {
    started: Instant,
    result: watch::Sender<Slot>,
}

/// Registry of in-flight backend calls, keyed by cache key.
#[derive(Default)]
pub(crate) struct FlightGroup {
    flights: Mutex<HashMap<String, Arc<Flight>>>,
}

/// Outcome of [`FlightGroup::join`].
pub(crate) enum Role<'a> {
    Leader(Leader<'a>),
    Follower(Follower),
}

/// Held by the request running the backend call for a key.
///
/// Dropping it without [`complete`](Self::complete) abandons the flight:
/// its followers are released and retry.
pub(crate) struct Leader<'a> {
    group: &'a FlightGroup,
    key: String,
    flight: Arc<Flight>,
}

/// Held by a request waiting on another request's backend call.
pub(crate) struct Follower {
    result: watch::Receiver<Slot>,
}

impl FlightGroup {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Joins the flight for `key`, or starts one if none is running.
    ///
    /// With `forget_after` set, a flight older than that bound no longer
    /// accepts followers; the caller starts a fresh flight while the old
    /// leader keeps running for the followers it already has.
    pub(crate) fn join(&self, key: &str, forget_after: Option<Duration>) -> Role<'_> {
        let mut flights = self.lock();

        if let Some(flight) = flights.get(key) {
            let forgotten = forget_after.is_some_and(|limit| flight.started.elapsed() >= limit);
            if !forgotten {
                return Role::Follower(Follower {
                    result: flight.result.subscribe(),
                });
            }
            debug!(key, "forget timeout elapsed, starting a new flight");
        }

        let (result, _) = watch::channel(None);
        let flight = Arc::new(Flight {
            started: Instant::now(),
            result,
        });
        flights.insert(key.to_owned(), Arc::clone(&flight));

        Role::Leader(Leader {
            group: self,
            key: key.to_owned(),
            flight,
        })
    }

    /// Number of keys with a flight currently registered.
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Flight>>> {
        match self.flights.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(
                    lock_kind = "mutex.lock",
                    result = "poisoned_recovered",
                    "Recovered from poisoned single-flight registry"
                );
                poisoned.into_inner()
            }
        }
    }

    // Removes `key` only while it still maps to `flight`; a forgotten flight
    // must not unregister its replacement.
    fn finish(&self, key: &str, flight: &Arc<Flight>) {
        let mut flights = self.lock();
        if flights
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, flight))
        {
            flights.remove(key);
        }
    }
}

impl Leader<'_> {
    /// Publishes `record` to every follower and unregisters the flight.
    pub(crate) fn complete(self, record: Arc<CacheRecord>) {
        self.flight.result.send_replace(Some(record));
        // Drop unregisters.
    }
}

impl Drop for Leader<'_> {
    fn drop(&mut self) {
        if self.flight.result.borrow().is_none() {
            debug!(key = %self.key, "leader abandoned its flight");
        }
        self.group.finish(&self.key, &self.flight);
    }
}

impl Follower {
    /// Waits for the leader's record.
    ///
    /// Returns `None` if the leader was dropped before finishing.
    pub(crate) async fn wait(mut self) -> Option<Arc<CacheRecord>> {
        // A closed channel may still hold a record published before we
        // subscribed, so read the slot either way.
        let _ = self.result.wait_for(Option::is_some).await;
        self.result.borrow().clone()
    }
}
