//! Clock skew across a status round.

use std::collections::BTreeMap;
use std::time::Duration;

use camfleet_core::ServerAddress;
use camfleet_net::FleetResult;
use camfleet_protocol::ServerStatus;
use chrono::{DateTime, TimeDelta, Utc};

/// Each server's reported clock relative to the earliest one in the round.
///
/// Offsets include the reply latency of each server, so the tolerance
/// should be wider than the expected network jitter.
#[derive(Debug, Clone)]
pub struct SkewReport {
    /// Earliest timestamp reported.
    pub reference: DateTime<Utc>,
    pub offsets: BTreeMap<ServerAddress, TimeDelta>,
    /// Servers whose offset exceeds the tolerance.
    pub flagged: Vec<ServerAddress>,
    /// Servers with no status in the round.
    pub unreported: Vec<ServerAddress>,
}

impl SkewReport {
    /// `None` when no server reported a status.
    pub fn from_statuses(statuses: &FleetResult<ServerStatus>, tolerance: Duration) -> Option<Self> {
        let reference = statuses.successes().map(|(_, s)| s.timestamp).min()?;
        let tolerance = TimeDelta::from_std(tolerance).unwrap_or_else(|_| TimeDelta::max_value());

        let offsets: BTreeMap<ServerAddress, TimeDelta> = statuses
            .successes()
            .map(|(addr, status)| (*addr, status.timestamp - reference))
            .collect();
        let flagged = offsets
            .iter()
            .filter(|(_, offset)| **offset > tolerance)
            .map(|(addr, _)| *addr)
            .collect();
        let unreported = statuses.failures().map(|(addr, _)| *addr).collect();

        Some(Self {
            reference,
            offsets,
            flagged,
            unreported,
        })
    }

    pub fn max_offset(&self) -> TimeDelta {
        self.offsets.values().copied().max().unwrap_or_else(TimeDelta::zero)
    }

    pub fn within_tolerance(&self) -> bool {
        self.flagged.is_empty()
    }
}
