//! Request sequencing — at most one winning response per logical slot.
//!
//! Every supersedable async operation (a cascade level fetch, a filter-apply
//! query) is issued with a ticket captured at issue time. When the response
//! arrives, the ticket is compared against the latest issued ticket for the
//! same slot; a mismatch means the response was superseded and must be
//! discarded without touching state. Discarding is expected behavior, not a
//! failure, and is logged at debug only.
//!
//! Slots are plain strings: `"{chain_id}/{level_id}"` for cascade fetches,
//! `"apply"` for the screen's primary query. The counter per slot is
//! monotonic for the lifetime of the screen.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

/// A ticket tagging one issued request against its slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    slot: String,
    seq: u64,
}

impl Ticket {
    /// The slot this ticket was issued against.
    pub fn slot(&self) -> &str {
        &self.slot
    }

    /// The sequence number captured at issue time.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// Slot-keyed monotonic counters.
///
/// All mutation happens on the single UI thread between suspension points;
/// the mutex is only ever held for the duration of a map access.
#[derive(Debug, Default)]
pub struct RequestSequencer {
    slots: Mutex<HashMap<String, u64>>,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new ticket for `slot`, superseding every earlier ticket
    /// issued against the same slot.
    pub fn issue(&self, slot: &str) -> Ticket {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let seq = slots.entry(slot.to_string()).or_insert(0);
        *seq += 1;
        Ticket {
            slot: slot.to_string(),
            seq: *seq,
        }
    }

    /// Whether `ticket` is still the latest issued for its slot.
    ///
    /// A response carrying a non-current ticket must be dropped on arrival.
    pub fn is_current(&self, ticket: &Ticket) -> bool {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let current = slots.get(&ticket.slot).copied().unwrap_or(0) == ticket.seq;
        if !current {
            debug!(
                slot = %ticket.slot,
                seq = ticket.seq,
                "stale response discarded"
            );
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_ticket_is_current() {
        let seq = RequestSequencer::new();
        let t = seq.issue("home/city");
        assert!(seq.is_current(&t));
        assert_eq!(t.seq(), 1);
    }

    #[test]
    fn test_newer_ticket_supersedes() {
        let seq = RequestSequencer::new();
        let a = seq.issue("home/city");
        let b = seq.issue("home/city");
        assert!(!seq.is_current(&a));
        assert!(seq.is_current(&b));
    }

    #[test]
    fn test_slots_are_independent() {
        let seq = RequestSequencer::new();
        let city = seq.issue("home/city");
        let apply = seq.issue("apply");
        seq.issue("home/city");
        assert!(!seq.is_current(&city));
        assert!(seq.is_current(&apply));
    }

    #[test]
    fn test_counter_is_monotonic() {
        let seq = RequestSequencer::new();
        let mut last = 0;
        for _ in 0..5 {
            let t = seq.issue("apply");
            assert!(t.seq() > last);
            last = t.seq();
        }
    }
}
