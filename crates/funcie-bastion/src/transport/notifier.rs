//! One-shot rendezvous between a waiting publisher and the read loop that
//! receives its response.
//!
//! `wait_for_response` and `notify` may happen in either order. Each id is
//! delivered exactly once; a second `notify` for an id that was already
//! delivered is a transport bug and panics.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use funcie_core::{FuncieError, Response, Result};

/// Default retention of delivered ids, for duplicate detection.
pub const DELIVERED_RETENTION: Duration = Duration::from_secs(600);

enum Slot {
    /// A caller is blocked on the receiver.
    Waiting(oneshot::Sender<Response>),
    /// Delivered before anyone waited.
    Ready(oneshot::Receiver<Response>, Instant),
    /// Delivered and handed out.
    Delivered(Instant),
}

struct Slots {
    by_id: HashMap<String, Slot>,
    last_prune: Instant,
}

pub struct ResponseNotifier {
    slots: Mutex<Slots>,
    retention: Duration,
}

impl Default for ResponseNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseNotifier {
    pub fn new() -> Self {
        Self::with_retention(DELIVERED_RETENTION)
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            slots: Mutex::new(Slots {
                by_id: HashMap::new(),
                last_prune: Instant::now(),
            }),
            retention,
        }
    }

    /// Block until the response for `id` arrives or `timeout` elapses.
    ///
    /// Dropping the returned future before delivery removes the pending
    /// slot, so abandoned waits do not accumulate.
    pub async fn wait_for_response(&self, id: &str, timeout: Duration) -> Result<Response> {
        let rx = {
            let mut slots = self.slots.lock();
            match slots.by_id.remove(id) {
                None => {
                    let (tx, rx) = oneshot::channel();
                    slots.by_id.insert(id.to_string(), Slot::Waiting(tx));
                    rx
                }
                Some(Slot::Ready(rx, _)) => {
                    slots.by_id.insert(id.to_string(), Slot::Delivered(Instant::now()));
                    rx
                }
                Some(other) => {
                    slots.by_id.insert(id.to_string(), other);
                    return Err(FuncieError::Internal(format!(
                        "response {id} is already awaited or delivered"
                    )));
                }
            }
        };

        let _guard = PendingGuard {
            notifier: self,
            id,
        };
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(_)) => Err(FuncieError::Cancelled),
            Err(_) => Err(FuncieError::TtlExceeded {
                id: id.to_string(),
                ttl: timeout,
            }),
        }
    }

    /// Deliver the response for `resp.id`.
    ///
    /// # Panics
    /// If a response for the same id was already delivered.
    pub fn notify(&self, resp: Response) {
        let mut slots = self.slots.lock();
        self.prune(&mut slots);

        let id = resp.id.clone();
        match slots.by_id.remove(&id) {
            None => {
                let (tx, rx) = oneshot::channel();
                let _ = tx.send(resp);
                slots.by_id.insert(id, Slot::Ready(rx, Instant::now()));
            }
            Some(Slot::Waiting(tx)) => {
                if tx.send(resp).is_err() {
                    tracing::debug!(message_id = %id, "waiter went away before delivery");
                }
                slots.by_id.insert(id, Slot::Delivered(Instant::now()));
            }
            Some(Slot::Ready(..)) | Some(Slot::Delivered(_)) => {
                drop(slots);
                panic!("response {id} delivered twice");
            }
        }
    }

    /// Ids with a waiter that has not been notified yet.
    pub fn pending(&self) -> usize {
        self.slots
            .lock()
            .by_id
            .values()
            .filter(|s| matches!(s, Slot::Waiting(_)))
            .count()
    }

    fn prune(&self, slots: &mut Slots) {
        if slots.last_prune.elapsed() < self.retention / 10 {
            return;
        }
        slots.last_prune = Instant::now();
        let retention = self.retention;
        slots.by_id.retain(|_, slot| match slot {
            Slot::Waiting(_) => true,
            Slot::Ready(_, at) | Slot::Delivered(at) => at.elapsed() < retention,
        });
    }
}

struct PendingGuard<'a> {
    notifier: &'a ResponseNotifier,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut slots = self.notifier.slots.lock();
        if matches!(slots.by_id.get(self.id), Some(Slot::Waiting(_))) {
            slots.by_id.remove(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::Arc;

    use funcie_core::RawPayload;

    use super::*;

    fn response(id: &str) -> Response {
        Response::success(id, RawPayload::encode(id).unwrap())
    }

    #[tokio::test]
    async fn concurrent_waits_receive_their_own_response() {
        let notifier = Arc::new(ResponseNotifier::new());
        let waiter = |id: &'static str| {
            let n = Arc::clone(&notifier);
            tokio::spawn(async move { n.wait_for_response(id, Duration::from_secs(5)).await })
        };
        let one = waiter("1");
        let two = waiter("2");
        while notifier.pending() < 2 {
            tokio::task::yield_now().await;
        }

        notifier.notify(response("2"));
        notifier.notify(response("1"));

        let one = one.await.unwrap().unwrap();
        let two = two.await.unwrap().unwrap();
        assert_eq!(one.id, "1");
        assert_eq!(one.data.unwrap().as_str(), r#""1""#);
        assert_eq!(two.id, "2");
        assert_eq!(two.data.unwrap().as_str(), r#""2""#);
    }

    #[tokio::test]
    async fn notify_before_wait() {
        let notifier = ResponseNotifier::new();
        notifier.notify(response("early"));
        let resp = notifier
            .wait_for_response("early", Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(resp.id, "early");
    }

    #[tokio::test]
    #[should_panic(expected = "delivered twice")]
    async fn double_notify_panics() {
        let notifier = ResponseNotifier::new();
        notifier.notify(response("x"));
        notifier.wait_for_response("x", Duration::from_millis(10)).await.unwrap();
        notifier.notify(response("x"));
    }

    #[tokio::test]
    async fn timeout_cleans_up_slot() {
        let notifier = ResponseNotifier::new();
        let err = notifier
            .wait_for_response("late", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, FuncieError::TtlExceeded { .. }));
        assert_eq!(notifier.pending(), 0);

        // A late delivery is parked rather than treated as a duplicate.
        notifier.notify(response("late"));
    }

    #[tokio::test]
    async fn dropped_wait_cleans_up_slot() {
        let notifier = Arc::new(ResponseNotifier::new());
        let n = Arc::clone(&notifier);
        let task = tokio::spawn(async move { n.wait_for_response("gone", Duration::from_secs(30)).await });
        while notifier.pending() < 1 {
            tokio::task::yield_now().await;
        }
        task.abort();
        let _ = task.await;
        assert_eq!(notifier.pending(), 0);
    }
}
