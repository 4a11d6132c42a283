use std::fmt;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

/// Aggregate status of one dispatched transaction. Derived from its
/// targets, never set directly except `Pending` at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum TxStatus {
    Pending = 0,
    Processing = 1,
    Completed = 2,
    Failed = 3,
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Per-member target status. Targets only move forward:
/// Pending -> Submitted -> {Confirmed, Failed}, or straight to Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum TargetStatus {
    Pending = 0,
    Submitted = 1,
    Confirmed = 2,
    Failed = 3,
}

impl TargetStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TargetStatus::Confirmed | TargetStatus::Failed)
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// One member wallet targeted by a dispatch, plus the key handle the
/// delegated signer uses for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRef {
    pub member_id: String,
    pub wallet_address: Address,
    pub key_handle: String,
}

/// Recomputes the aggregate status from the current target set.
///
/// Idempotent by construction: it is a pure function of the statuses, so the
/// driver and the poller can both re-run it after any target write. `Failed`
/// is only reported once every target is terminal; while any target is still
/// Pending or Submitted the aggregate stays at `Processing`, because full
/// completion is still possible.
pub fn derive_transaction_status(targets: &[TargetStatus]) -> TxStatus {
    if targets.is_empty() {
        return TxStatus::Pending;
    }
    if targets.iter().all(|t| *t == TargetStatus::Confirmed) {
        return TxStatus::Completed;
    }
    if targets.iter().all(|t| t.is_terminal()) {
        // All terminal, not all confirmed: at least one failed.
        return TxStatus::Failed;
    }
    TxStatus::Processing
}
