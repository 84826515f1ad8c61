use crate::{Result, error::Error, types::MeasurementId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Delivery status of a sync job.
///
/// Jobs move forward only: pending → in_flight → delivered | pending | permanently_failed.
/// The in_flight → pending edge is a retry after backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    InFlight,
    Delivered,
    PermanentlyFailed,
}

impl SyncStatus {
    pub fn can_transition_to(&self, target: &SyncStatus) -> bool {
        matches!(
            (self, target),
            (SyncStatus::Pending, SyncStatus::InFlight)
                | (
                    SyncStatus::InFlight,
                    SyncStatus::Delivered | SyncStatus::Pending | SyncStatus::PermanentlyFailed
                )
        )
    }

    /// Still owed to the remote side.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, SyncStatus::Pending | SyncStatus::InFlight)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::InFlight => "in_flight",
            SyncStatus::Delivered => "delivered",
            SyncStatus::PermanentlyFailed => "permanently_failed",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "in_flight" => Ok(SyncStatus::InFlight),
            "delivered" => Ok(SyncStatus::Delivered),
            "permanently_failed" => Ok(SyncStatus::PermanentlyFailed),
            other => Err(Error::Config(format!("unknown sync status '{other}'"))),
        }
    }
}

/// One measurement awaiting (or done with) delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncJob {
    pub measurement_id: MeasurementId,
    pub status: SyncStatus,
    pub attempts: u32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub remote_id: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncJob {
    /// A job due immediately.
    #[must_use]
    pub fn pending(measurement_id: MeasurementId, now: DateTime<Utc>) -> Self {
        Self {
            measurement_id,
            status: SyncStatus::Pending,
            attempts: 0,
            next_attempt_at: now,
            last_error: None,
            remote_id: None,
            claimed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `target`, rejecting backward moves.
    ///
    /// # Errors
    /// Returns `Error::InvalidStateTransition` if the move is not allowed.
    pub fn transition_to(&mut self, target: SyncStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(&target) {
            return Err(Error::InvalidStateTransition {
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        self.status = target;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(SyncStatus::Pending, SyncStatus::InFlight, true)]
    #[case(SyncStatus::InFlight, SyncStatus::Delivered, true)]
    #[case(SyncStatus::InFlight, SyncStatus::Pending, true)]
    #[case(SyncStatus::InFlight, SyncStatus::PermanentlyFailed, true)]
    #[case(SyncStatus::Pending, SyncStatus::Delivered, false)]
    #[case(SyncStatus::Delivered, SyncStatus::Pending, false)]
    #[case(SyncStatus::PermanentlyFailed, SyncStatus::InFlight, false)]
    fn test_transitions(#[case] from: SyncStatus, #[case] to: SyncStatus, #[case] ok: bool) {
        assert_eq!(from.can_transition_to(&to), ok);
    }

    #[test]
    fn test_transition_rejects_backward_move() {
        let now = Utc::now();
        let mut job = SyncJob::pending(MeasurementId::new(), now);
        job.transition_to(SyncStatus::InFlight, now).unwrap();
        job.transition_to(SyncStatus::Delivered, now).unwrap();
        let err = job.transition_to(SyncStatus::InFlight, now).unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));
        assert_eq!(job.status, SyncStatus::Delivered);
    }

    #[rstest]
    #[case("pending")]
    #[case("in_flight")]
    #[case("delivered")]
    #[case("permanently_failed")]
    fn test_status_string_roundtrip(#[case] s: &str) {
        let status: SyncStatus = s.parse().unwrap();
        assert_eq!(status.as_str(), s);
    }
}
