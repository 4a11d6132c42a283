use std::path::Path;

use fleetcast_commons::error::ExternalError;
use fleetcast_core::state::MemberRef;

use crate::config::{ConfigError, ConfigResult};

/// Reads the fleet roster: a JSON array of
/// `{memberId, walletAddress, keyHandle}` entries.
pub fn load_members(path: &Path) -> ConfigResult<Vec<MemberRef>> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadMembers {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|e| ConfigError::ParseMembers {
        path: path.to_path_buf(),
        source: ExternalError::from(e.to_string()),
    })
}

/// Picks the named members out of the roster, preserving the requested order.
/// An empty selection means the whole fleet.
pub fn select_members(roster: &[MemberRef], member_ids: &[String]) -> ConfigResult<Vec<MemberRef>> {
    if member_ids.is_empty() {
        return Ok(roster.to_vec());
    }
    member_ids
        .iter()
        .map(|id| {
            roster
                .iter()
                .find(|m| m.member_id == *id)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownMember {
                    member_id: id.clone(),
                })
        })
        .collect()
}
