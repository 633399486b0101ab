//! Single-flight coordination for `get_or_set`.
//!
//! The first caller to miss on a key becomes the leader and registers a
//! `watch` channel; later callers for the same key subscribe to it instead of
//! computing. The marker is removed when the leader's [`Flight`] is dropped,
//! whether it completed, failed or was cancelled mid-compute.

use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;
use tokio::time::{Instant, timeout_at};

use super::error::ComputeError;

type FlightResult = Result<Bytes, ComputeError>;

/// Outcome of waiting on someone else's flight.
pub(crate) enum FlightOutcome {
    /// The leader stored a value; serialized payload attached.
    Ready(Bytes),
    /// The leader's compute failed.
    Failed(ComputeError),
    /// The leader went away without a result; the caller should retry.
    Abandoned,
    /// The wait deadline passed first.
    TimedOut,
}

pub(crate) enum Role<'a> {
    Leader(Flight<'a>),
    Waiter(watch::Receiver<Option<FlightResult>>),
}

#[derive(Default)]
pub(crate) struct SingleFlight {
    flights: DashMap<String, watch::Receiver<Option<FlightResult>>>,
}

impl SingleFlight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Become the leader for `key`, or subscribe to the flight already running.
    pub(crate) fn join(&self, key: &str) -> Role<'_> {
        match self.flights.entry(key.to_string()) {
            Entry::Occupied(existing) => Role::Waiter(existing.get().clone()),
            Entry::Vacant(slot) => {
                let (tx, rx) = watch::channel(None);
                slot.insert(rx);
                Role::Leader(Flight {
                    owner: self,
                    key: key.to_string(),
                    tx,
                })
            }
        }
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.flights.len()
    }
}

/// Wait for a leader's result until `deadline`.
///
/// Dropping this future (the caller's own request being cancelled) only
/// drops the receiver; the leader keeps computing for everyone else.
pub(crate) async fn wait(
    mut rx: watch::Receiver<Option<FlightResult>>,
    deadline: Instant,
) -> FlightOutcome {
    match timeout_at(deadline, rx.wait_for(Option::is_some)).await {
        Err(_) => FlightOutcome::TimedOut,
        Ok(Err(_closed)) => FlightOutcome::Abandoned,
        Ok(Ok(result)) => match result.as_ref() {
            Some(Ok(bytes)) => FlightOutcome::Ready(bytes.clone()),
            Some(Err(err)) => FlightOutcome::Failed(err.clone()),
            None => FlightOutcome::Abandoned,
        },
    }
}

/// Leadership over one key's computation.
pub(crate) struct Flight<'a> {
    owner: &'a SingleFlight,
    key: String,
    tx: watch::Sender<Option<FlightResult>>,
}

impl Flight<'_> {
    /// Publish the stored payload to every waiter.
    pub(crate) fn complete(self, value: Bytes) {
        self.tx.send_replace(Some(Ok(value)));
    }

    /// Publish a compute failure to every waiter.
    pub(crate) fn fail(self, err: ComputeError) {
        self.tx.send_replace(Some(Err(err)));
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        self.owner.flights.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("upstream down")]
    struct Upstream;

    fn deadline_in(secs: u64) -> Instant {
        Instant::now() + Duration::from_secs(secs)
    }

    #[tokio::test]
    async fn second_caller_becomes_waiter() {
        let flights = SingleFlight::new();
        let leader = match flights.join("k") {
            Role::Leader(flight) => flight,
            Role::Waiter(_) => panic!("first caller must lead"),
        };
        let rx = match flights.join("k") {
            Role::Waiter(rx) => rx,
            Role::Leader(_) => panic!("second caller must wait"),
        };

        leader.complete(Bytes::from_static(b"42"));
        assert_eq!(flights.in_flight(), 0);

        match wait(rx, deadline_in(1)).await {
            FlightOutcome::Ready(bytes) => assert_eq!(bytes, Bytes::from_static(b"42")),
            _ => panic!("waiter should see the published value"),
        }
    }

    #[tokio::test]
    async fn failure_reaches_waiters() {
        let flights = SingleFlight::new();
        let Role::Leader(leader) = flights.join("k") else {
            panic!("first caller must lead");
        };
        let Role::Waiter(rx) = flights.join("k") else {
            panic!("second caller must wait");
        };

        leader.fail(ComputeError::new("k", Upstream));

        match wait(rx, deadline_in(1)).await {
            FlightOutcome::Failed(err) => assert_eq!(err.key(), "k"),
            _ => panic!("waiter should see the failure"),
        }
    }

    #[tokio::test]
    async fn dropped_leader_abandons_waiters_and_frees_key() {
        let flights = SingleFlight::new();
        let Role::Leader(leader) = flights.join("k") else {
            panic!("first caller must lead");
        };
        let Role::Waiter(rx) = flights.join("k") else {
            panic!("second caller must wait");
        };

        drop(leader);

        assert!(matches!(
            wait(rx, deadline_in(1)).await,
            FlightOutcome::Abandoned
        ));
        assert!(matches!(flights.join("k"), Role::Leader(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_times_out_without_touching_the_leader() {
        let flights = SingleFlight::new();
        let Role::Leader(leader) = flights.join("k") else {
            panic!("first caller must lead");
        };
        let Role::Waiter(rx) = flights.join("k") else {
            panic!("second caller must wait");
        };

        assert!(matches!(
            wait(rx, deadline_in(2)).await,
            FlightOutcome::TimedOut
        ));
        assert_eq!(flights.in_flight(), 1);

        let Role::Waiter(late) = flights.join("k") else {
            panic!("flight should still be running");
        };
        leader.complete(Bytes::from_static(b"done"));
        assert!(matches!(
            wait(late, deadline_in(2)).await,
            FlightOutcome::Ready(_)
        ));
    }
}
