//! Per-event mutation locks and reconcile coalescing.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedMutexGuard, watch};
use tracing::debug;

use crate::date_range::DateRange;
use crate::error::{DayDialError, DayDialResult};
use crate::sync::ReconcileReport;

/// One async mutex per event id. Mutations of the same event run one at a
/// time; different events do not wait on each other.
#[derive(Default)]
pub struct EventLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl EventLocks {
    pub async fn lock(&self, event_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Entries nobody holds or waits on can go.
            locks.retain(|_, m| Arc::strong_count(m) > 1);
            locks.entry(event_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

type Outcome = Option<DayDialResult<ReconcileReport>>;

/// Lets concurrent reconciles of the same range share one pass.
#[derive(Default)]
pub struct ReconcileGate {
    inflight: Mutex<HashMap<DateRange, watch::Receiver<Outcome>>>,
}

struct Ticket<'a> {
    gate: &'a ReconcileGate,
    range: DateRange,
    sender: watch::Sender<Outcome>,
}

enum Turn<'a> {
    Lead(Ticket<'a>),
    Join(watch::Receiver<Outcome>),
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        self.gate
            .inflight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.range);
    }
}

impl ReconcileGate {
    /// Run `pass` for `range`, or wait for the pass already running for it
    /// and return its result.
    pub async fn coalesce<F, Fut>(&self, range: DateRange, pass: F) -> DayDialResult<ReconcileReport>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DayDialResult<ReconcileReport>>,
    {
        let turn = {
            let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
            match inflight.get(&range) {
                Some(receiver) => Turn::Join(receiver.clone()),
                None => {
                    let (sender, receiver) = watch::channel(None);
                    inflight.insert(range, receiver);
                    Turn::Lead(Ticket {
                        gate: self,
                        range,
                        sender,
                    })
                }
            }
        };

        let ticket = match turn {
            Turn::Lead(ticket) => ticket,
            Turn::Join(receiver) => {
                debug!(from = %range.from, to = %range.to, "joining reconcile in flight");
                return Self::wait(receiver).await;
            }
        };

        let result = pass().await;
        ticket.sender.send_replace(Some(result.clone()));
        drop(ticket);
        result
    }

    async fn wait(mut receiver: watch::Receiver<Outcome>) -> DayDialResult<ReconcileReport> {
        match receiver.wait_for(Option::is_some).await {
            Ok(outcome) => match outcome.as_ref() {
                Some(result) => result.clone(),
                None => Err(DayDialError::TransientIo("reconcile produced no result".to_string())),
            },
            // The leading caller was cancelled before it finished.
            Err(_) => Err(DayDialError::TransientIo("reconcile was cancelled".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date_key::DateKey;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn range() -> DateRange {
        DateRange::single(DateKey::parse("2025-03-20").unwrap())
    }

    #[tokio::test]
    async fn test_same_event_is_serialized() {
        let locks = Arc::new(EventLocks::default());
        let guard = locks.lock("a").await;

        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = other.lock("a").await;
        });
        // A different id does not wait.
        let _b = locks.lock("b").await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_reconciles_share_one_pass() {
        let gate = Arc::new(ReconcileGate::default());
        let runs = Arc::new(AtomicUsize::new(0));

        let pass = |gate: Arc<ReconcileGate>, runs: Arc<AtomicUsize>| async move {
            gate.coalesce(range(), || async {
                runs.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(ReconcileReport {
                    created: 1,
                    ..Default::default()
                })
            })
            .await
        };

        let (a, b) = tokio::join!(
            pass(gate.clone(), runs.clone()),
            pass(gate.clone(), runs.clone())
        );

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(a.unwrap().created, 1);
        assert_eq!(b.unwrap().created, 1);

        // The next call starts a fresh pass.
        pass(gate.clone(), runs.clone()).await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancelled_leader_releases_waiters() {
        let gate = Arc::new(ReconcileGate::default());

        let leader_gate = gate.clone();
        let leader = tokio::spawn(async move {
            leader_gate
                .coalesce(range(), || async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(ReconcileReport::default())
                })
                .await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let follower_gate = gate.clone();
        let follower = tokio::spawn(async move {
            follower_gate
                .coalesce(range(), || async { Ok(ReconcileReport::default()) })
                .await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        leader.abort();
        let result = follower.await.unwrap();
        assert!(matches!(result, Err(DayDialError::TransientIo(_))));
    }
}
