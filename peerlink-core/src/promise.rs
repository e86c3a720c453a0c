//! Promise bridge: one-shot platform operations resolved into owned completions, exactly once.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Reason codes the session itself produces. Platform reason codes are non-negative and
/// passed through untouched.
pub mod reason {
    pub const SUCCESS: i32 = 0;
    /// The session was finalized while the command was outstanding.
    pub const ABORTED: i32 = -1;
    /// A queued command could not acquire a channel when it was replayed.
    pub const CHANNEL_UNAVAILABLE: i32 = -2;
}

/// Result of a platform command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    pub reason: i32,
}

impl Outcome {
    pub fn success() -> Self {
        Self {
            success: true,
            reason: reason::SUCCESS,
        }
    }

    pub fn failure(reason: i32) -> Self {
        Self {
            success: false,
            reason,
        }
    }

    pub fn aborted() -> Self {
        Self::failure(reason::ABORTED)
    }
}

/// Opaque handle of a pending promise, handed to the platform with the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromiseId(pub u64);

impl fmt::Display for PromiseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

enum Sink {
    Callback(Box<dyn FnOnce(Outcome)>),
    Channel(oneshot::Sender<Outcome>),
    Detached,
}

/// Where the result of a command goes. Consumed on resolution.
pub struct Completion(Sink);

impl Completion {
    pub fn from_fn(f: impl FnOnce(Outcome) + 'static) -> Self {
        Completion(Sink::Callback(Box::new(f)))
    }

    /// Completion paired with an awaitable receiver.
    pub fn channel() -> (Self, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        (Completion(Sink::Channel(tx)), rx)
    }

    /// Fire-and-forget: the result is only logged.
    pub fn detached() -> Self {
        Completion(Sink::Detached)
    }

    pub(crate) fn complete(self, outcome: Outcome) {
        match self.0 {
            Sink::Callback(f) => f(outcome),
            Sink::Channel(tx) => {
                // Receiver gone means the caller stopped waiting.
                let _ = tx.send(outcome);
            }
            Sink::Detached => {}
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.0 {
            Sink::Callback(_) => "callback",
            Sink::Channel(_) => "channel",
            Sink::Detached => "detached",
        };
        f.debug_tuple("Completion").field(&kind).finish()
    }
}

/// A promise handed out by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingPromise {
    pub id: PromiseId,
    pub resolved: bool,
}

/// Completion-tracking counters. `created == resolved` once every command has come back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PromiseStats {
    pub created: u64,
    pub resolved: u64,
    /// Resolutions for unknown or already-resolved promises.
    pub ignored: u64,
}

#[derive(Default)]
pub struct PromiseBridge {
    next_id: u64,
    pending: HashMap<PromiseId, Completion>,
    stats: PromiseStats,
}

impl PromiseBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, completion: Completion) -> PendingPromise {
        let id = PromiseId(self.next_id);
        self.next_id += 1;
        self.pending.insert(id, completion);
        self.stats.created += 1;
        PendingPromise {
            id,
            resolved: false,
        }
    }

    /// Resolve a promise. First resolution wins; later ones return false and are ignored.
    pub fn resolve(&mut self, id: PromiseId, outcome: Outcome) -> bool {
        let Some(completion) = self.pending.remove(&id) else {
            self.stats.ignored += 1;
            warn!(promise = %id, ?outcome, "ignoring resolution of unknown or settled promise");
            return false;
        };
        self.stats.resolved += 1;
        debug!(
            promise = %id,
            success = outcome.success,
            reason = outcome.reason,
            "promise resolved"
        );
        completion.complete(outcome);
        true
    }

    pub fn is_resolved(&self, id: PromiseId) -> bool {
        id.0 < self.next_id && !self.pending.contains_key(&id)
    }

    pub fn is_pending(&self, id: PromiseId) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> PromiseStats {
        self.stats
    }

    /// Resolve every outstanding promise as aborted, oldest first. Returns how many there were.
    pub fn abort_all(&mut self) -> usize {
        let mut ids: Vec<PromiseId> = self.pending.keys().copied().collect();
        ids.sort();
        for id in &ids {
            self.resolve(*id, Outcome::aborted());
        }
        ids.len()
    }
}

impl fmt::Debug for PromiseBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromiseBridge")
            .field("next_id", &self.next_id)
            .field("outstanding", &self.pending.len())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recording() -> (Completion, Rc<RefCell<Vec<Outcome>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        (Completion::from_fn(move |o| sink.borrow_mut().push(o)), seen)
    }

    #[test]
    fn resolves_exactly_once() {
        let mut bridge = PromiseBridge::new();
        let (completion, seen) = recording();
        let promise = bridge.create(completion);
        assert!(!promise.resolved);
        assert!(bridge.is_pending(promise.id));

        assert!(bridge.resolve(promise.id, Outcome::failure(2)));
        assert!(!bridge.resolve(promise.id, Outcome::success()));
        assert!(!bridge.resolve(promise.id, Outcome::failure(1)));

        assert_eq!(*seen.borrow(), vec![Outcome::failure(2)]);
        assert!(bridge.is_resolved(promise.id));
        assert_eq!(
            bridge.stats(),
            PromiseStats {
                created: 1,
                resolved: 1,
                ignored: 2
            }
        );
    }

    #[test]
    fn unknown_promise_is_ignored() {
        let mut bridge = PromiseBridge::new();
        assert!(!bridge.resolve(PromiseId(42), Outcome::success()));
        assert!(!bridge.is_resolved(PromiseId(42)));
        assert_eq!(bridge.stats().ignored, 1);
    }

    #[test]
    fn reason_codes_pass_through() {
        let mut bridge = PromiseBridge::new();
        let (completion, seen) = recording();
        let id = bridge.create(completion).id;
        bridge.resolve(id, Outcome::failure(12345));
        assert_eq!(seen.borrow()[0].reason, 12345);
    }

    #[test]
    fn abort_all_settles_everything() {
        let mut bridge = PromiseBridge::new();
        let (a, seen_a) = recording();
        let (b, seen_b) = recording();
        bridge.create(a);
        let b_id = bridge.create(b).id;
        bridge.create(Completion::detached());
        bridge.resolve(b_id, Outcome::success());

        assert_eq!(bridge.abort_all(), 2);
        assert_eq!(bridge.outstanding(), 0);
        assert_eq!(*seen_a.borrow(), vec![Outcome::aborted()]);
        assert_eq!(*seen_b.borrow(), vec![Outcome::success()]);
        let stats = bridge.stats();
        assert_eq!(stats.created, stats.resolved);
    }

    #[tokio::test]
    async fn channel_completion_is_awaitable() {
        let mut bridge = PromiseBridge::new();
        let (completion, rx) = Completion::channel();
        let id = bridge.create(completion).id;
        bridge.resolve(id, Outcome::success());
        assert_eq!(rx.await.unwrap(), Outcome::success());
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_panic() {
        let mut bridge = PromiseBridge::new();
        let (completion, rx) = Completion::channel();
        drop(rx);
        let id = bridge.create(completion).id;
        assert!(bridge.resolve(id, Outcome::failure(0)));
    }
}
