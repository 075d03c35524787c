//! Append-only verification ledger storage.
//!
//! Records are never deleted; they form the audit trail of every issuance.
//! Lifecycle is an explicit state machine so "verified but still active" is
//! unrepresentable:
//!
//!   Issued ──redeem in window──▶ Verified
//!     └────redeem after window──▶ Expired
//!
//! The legacy boolean views (`is_expired`, `is_verified`) are derived from the
//! state for callers that phrase checks the historical way.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationState {
    Issued,
    Verified,
    Expired,
}

#[derive(Debug, Clone)]
pub struct VerificationRecord {
    pub id: i64,
    pub email: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub state: VerificationState,
}

impl VerificationRecord {
    /// A record is expired once it has left the Issued state, whether the
    /// redemption succeeded or lapsed.
    pub fn is_expired(&self) -> bool {
        self.state != VerificationState::Issued
    }

    pub fn is_verified(&self) -> bool {
        self.state == VerificationState::Verified
    }
}

#[derive(Default)]
struct LedgerState {
    next_id: i64,
    records: Vec<VerificationRecord>,
}

pub struct VerificationStore {
    inner: RwLock<LedgerState>,
}

impl VerificationStore {
    pub fn new() -> Self {
        Self { inner: RwLock::new(LedgerState { next_id: 1, records: Vec::new() }) }
    }

    pub fn append(&self, email: &str, code: &str) -> VerificationRecord {
        self.append_at(email, code, Utc::now())
    }

    /// Append with an explicit creation time. Also used to restore audit
    /// records, which is why it is part of the public surface.
    pub fn append_at(&self, email: &str, code: &str, created_at: DateTime<Utc>) -> VerificationRecord {
        let mut state = self.inner.write();
        let id = state.next_id;
        state.next_id += 1;
        let record = VerificationRecord {
            id,
            email: email.to_string(),
            code: code.to_string(),
            created_at,
            state: VerificationState::Issued,
        };
        state.records.push(record.clone());
        record
    }

    /// The most recently created still-active record for this email, selected
    /// by `created_at` descending (id breaks ties). Older active records are
    /// silently superseded: latest-wins.
    pub fn latest_active(&self, email: &str) -> Option<VerificationRecord> {
        self.inner
            .read()
            .records
            .iter()
            .filter(|r| r.email == email && r.state == VerificationState::Issued)
            .max_by_key(|r| (r.created_at, r.id))
            .cloned()
    }

    /// Atomically move a record out of Issued into a terminal state. The whole
    /// new state is written in one step under the lock; a record that already
    /// left Issued is left untouched and `false` is returned.
    pub fn complete(&self, id: i64, state: VerificationState) -> bool {
        debug_assert!(state != VerificationState::Issued);
        let mut guard = self.inner.write();
        match guard.records.iter_mut().find(|r| r.id == id) {
            Some(r) if r.state == VerificationState::Issued => {
                r.state = state;
                true
            }
            _ => false,
        }
    }

    /// Registration predicate: a completed, successfully verified redemption
    /// exists for this email (the original `is_verified AND is_expired` check).
    pub fn has_completed_verification(&self, email: &str) -> bool {
        self.inner
            .read()
            .records
            .iter()
            .any(|r| r.email == email && r.state == VerificationState::Verified)
    }

    /// Full trail for an email, oldest first. Audit/inspection only.
    pub fn history(&self, email: &str) -> Vec<VerificationRecord> {
        self.inner
            .read()
            .records
            .iter()
            .filter(|r| r.email == email)
            .cloned()
            .collect()
    }
}

impl Default for VerificationStore {
    fn default() -> Self {
        Self::new()
    }
}
