// src/orchestrator/flight.rs
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlightError {
    #[error("execution panicked: {0}")]
    Panicked(String),

    #[error("execution cancelled")]
    Cancelled,
}

type Flight<V> = Shared<BoxFuture<'static, Result<V, FlightError>>>;

/// Deduplicates concurrent executions per key.
pub struct SingleFlight<K, V> {
    flights: Arc<DashMap<K, Flight<V>>>,
}

impl<K, V> Clone for SingleFlight<K, V> {
    fn clone(&self) -> Self {
        Self {
            flights: self.flights.clone(),
        }
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            flights: Arc::new(DashMap::new()),
        }
    }
}

// removes the key when the execution ends, panics included
struct Release<K: Eq + Hash, V> {
    flights: Arc<DashMap<K, Flight<V>>>,
    key: K,
}

impl<K: Eq + Hash, V> Drop for Release<K, V> {
    fn drop(&mut self) {
        self.flights.remove(&self.key);
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    // the flag is true for the caller that started the execution
    pub async fn run<F, Fut>(&self, key: K, make: F) -> (Result<V, FlightError>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let (flight, leader) = match self.flights.entry(key.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let release = Release {
                    flights: self.flights.clone(),
                    key,
                };
                let execution = make();
                let handle = tokio::spawn(async move {
                    let _release = release;
                    execution.await
                });

                let flight = handle
                    .map(|joined| {
                        joined.map_err(|e| {
                            if e.is_panic() {
                                FlightError::Panicked(e.to_string())
                            } else {
                                FlightError::Cancelled
                            }
                        })
                    })
                    .boxed()
                    .shared();
                entry.insert(flight.clone());
                (flight, true)
            }
        };

        (flight.await, leader)
    }

    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }
}
