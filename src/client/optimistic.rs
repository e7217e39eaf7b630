//! Apply-then-reconcile bookkeeping for local mutations.
//!
//! A mutation runs against local state immediately and hands back the exact
//! inverse of what it did. That inverse is stored under a [`Ticket`]; when the
//! authoritative result arrives the ticket is either confirmed (inverse
//! dropped) or rolled back (inverse run). Rollback never re-derives anything
//! from the current state.

use std::collections::HashMap;

use crate::error::EngineError;

type Rollback<S> = Box<dyn FnOnce(&mut S) + Send>;

/// Proof that a mutation was applied. Only [`OptimisticLedger::apply`] makes
/// one, and reconciling consumes it.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "an applied mutation must be reconciled"]
pub struct Ticket {
    id: u64,
    key: i64,
}

impl Ticket {
    /// The comment this mutation touched.
    pub fn key(&self) -> i64 {
        self.key
    }
}

struct Pending<S> {
    key: i64,
    /// Another comment the mutation changed, such as the root of a reply.
    also: Option<i64>,
    rollback: Rollback<S>,
}

pub struct OptimisticLedger<S> {
    next_id: u64,
    pending: HashMap<u64, Pending<S>>,
}

impl<S> Default for OptimisticLedger<S> {
    fn default() -> Self {
        Self {
            next_id: 0,
            pending: HashMap::new(),
        }
    }
}

impl<S> OptimisticLedger<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `mutation` on `state`. The closure returns its own undo.
    pub fn apply<M, R>(&mut self, state: &mut S, key: i64, mutation: M) -> Ticket
    where
        M: FnOnce(&mut S) -> R,
        R: FnOnce(&mut S) + Send + 'static,
    {
        self.apply_touching(state, key, None, mutation)
    }

    /// Like [`OptimisticLedger::apply`] for a mutation that also changes a
    /// second comment. `also` counts as pending until the ticket settles.
    pub fn apply_touching<M, R>(&mut self, state: &mut S, key: i64, also: Option<i64>, mutation: M) -> Ticket
    where
        M: FnOnce(&mut S) -> R,
        R: FnOnce(&mut S) + Send + 'static,
    {
        let rollback = mutation(state);
        self.next_id += 1;
        let id = self.next_id;
        self.pending.insert(
            id,
            Pending {
                key,
                also,
                rollback: Box::new(rollback),
            },
        );
        Ticket { id, key }
    }

    /// Settles a ticket against the authoritative result.
    ///
    /// On success the undo is dropped and `on_success` runs; on failure the
    /// undo runs and the error is handed back. A ticket whose mutation was
    /// abandoned (see [`OptimisticLedger::abandon_all`]) settles without
    /// touching `state`.
    pub fn reconcile<T>(
        &mut self,
        state: &mut S,
        ticket: Ticket,
        result: Result<T, EngineError>,
        on_success: impl FnOnce(&mut S, T),
    ) -> Result<(), EngineError> {
        let pending = self.pending.remove(&ticket.id);
        match (result, pending) {
            (Ok(value), Some(_)) => {
                on_success(state, value);
                Ok(())
            }
            (Ok(_), None) => Ok(()),
            (Err(error), Some(pending)) => {
                (pending.rollback)(state);
                Err(error)
            }
            (Err(error), None) => Err(error),
        }
    }

    /// True while any outstanding mutation changed `key`, directly or as
    /// its `also` comment.
    pub fn is_pending(&self, key: i64) -> bool {
        self.pending
            .values()
            .any(|p| p.key == key || p.also == Some(key))
    }

    /// Outstanding mutations keyed on `key` itself.
    pub fn pending_for(&self, key: i64) -> usize {
        self.pending.values().filter(|p| p.key == key).count()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Forgets every outstanding mutation without undoing it. Used when the
    /// state the undos were written against is thrown away.
    pub fn abandon_all(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Counter {
        likes: i64,
    }

    fn add(amount: i64) -> impl FnOnce(&mut Counter) -> Box<dyn FnOnce(&mut Counter) + Send> {
        move |c: &mut Counter| -> Box<dyn FnOnce(&mut Counter) + Send> {
            c.likes += amount;
            Box::new(move |c: &mut Counter| c.likes -= amount)
        }
    }

    #[test]
    fn rollback_reverts_only_its_own_delta() {
        let mut ledger = OptimisticLedger::new();
        let mut counter = Counter { likes: 3 };

        let first = ledger.apply(&mut counter, 1, add(1));
        let second = ledger.apply(&mut counter, 1, add(5));
        assert_eq!(counter.likes, 9);

        let err = ledger.reconcile(&mut counter, first, Err::<(), _>(EngineError::Cancelled), |_, _| {});
        assert_eq!(err, Err(EngineError::Cancelled));
        assert_eq!(counter.likes, 8);
        assert!(ledger.is_pending(1));

        ledger
            .reconcile(&mut counter, second, Ok(()), |_, ()| {})
            .unwrap();
        assert_eq!(counter.likes, 8);
        assert_eq!(ledger.pending_count(), 0);
    }

    #[test]
    fn abandoned_tickets_do_not_touch_state() {
        let mut ledger = OptimisticLedger::new();
        let mut counter = Counter::default();
        let ticket = ledger.apply(&mut counter, 7, add(2));

        ledger.abandon_all();
        let mut fresh = Counter { likes: 40 };
        let result = ledger.reconcile(&mut fresh, ticket, Err::<(), _>(EngineError::SessionExpired), |_, _| {});

        assert_eq!(result, Err(EngineError::SessionExpired));
        assert_eq!(fresh.likes, 40);
    }

    #[test]
    fn secondary_comment_stays_pending_until_settled() {
        let mut ledger = OptimisticLedger::new();
        let mut counter = Counter::default();

        let ticket = ledger.apply_touching(&mut counter, -1, Some(4), add(1));
        assert!(ledger.is_pending(4));
        assert_eq!(ledger.pending_for(4), 0);

        ledger.reconcile(&mut counter, ticket, Ok(()), |_, ()| {}).unwrap();
        assert!(!ledger.is_pending(4));
    }
}
