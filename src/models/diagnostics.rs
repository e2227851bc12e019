use serde::{Deserialize, Serialize};

/// Response for hub statistics
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HubStatsResponse {
    pub total_connections: usize,
    pub unique_users: usize,
    pub last_seen_records: usize,
    pub typing_entries: usize,
    pub rate_limited_users: usize,
}

