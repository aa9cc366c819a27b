//! `/health` and `/api/connections` bodies.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;
use tableside_core::Role;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Live sessions.
    pub connections: usize,
    /// Rooms with at least one member.
    pub rooms: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connections: usize, rooms: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        rooms,
    }
}

/// Connected clients per role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionsResponse {
    /// All live sessions.
    pub total: usize,
    /// Count per role name; every role is listed.
    pub roles: BTreeMap<&'static str, usize>,
}

impl ConnectionsResponse {
    /// Fill in zero for roles with no session.
    pub fn from_counts(counts: &BTreeMap<Role, usize>) -> Self {
        let roles: BTreeMap<&'static str, usize> = Role::ALL
            .iter()
            .map(|role| (role.as_str(), counts.get(role).copied().unwrap_or(0)))
            .collect();
        Self {
            total: roles.values().sum(),
            roles,
        }
    }
}
