use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RefreshError;
use crate::stage::RefreshStage;

/// Identifier of a refresh history record.
pub type RecordId = Uuid;

/// One attempt at refreshing the dormant database.
///
/// Records are created when a refresh starts, updated after every completed stage and finished
/// exactly once. They are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRecord {
    pub id: RecordId,
    /// Name of the database that was dormant when the refresh was requested.
    pub target_database: String,
    pub nomenclature_version: String,
    pub requested_at: DateTime<Utc>,
    pub last_continued_at: Option<DateTime<Utc>>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub completed_stages: BTreeSet<RefreshStage>,
    pub succeeded: Option<bool>,
}

impl RefreshRecord {
    /// Creates a new unfinished record requested now.
    pub fn new(target_database: impl Into<String>, nomenclature_version: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_database: target_database.into(),
            nomenclature_version: nomenclature_version.into(),
            requested_at: Utc::now(),
            last_continued_at: None,
            last_heartbeat_at: None,
            finished_at: None,
            completed_stages: BTreeSet::new(),
            succeeded: None,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.finished_at.is_none()
    }

    pub fn has_completed(&self, stage: RefreshStage) -> bool {
        self.completed_stages.contains(&stage)
    }

    /// Returns the last time the run working on this record was known to be alive.
    pub fn last_seen_alive_at(&self) -> DateTime<Utc> {
        self.last_heartbeat_at
            .or(self.last_continued_at)
            .unwrap_or(self.requested_at)
    }

    /// Returns `true` if nothing has been heard from the owning run for longer than `timeout`.
    pub fn is_stale(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
        now - self.last_seen_alive_at() > timeout
    }
}

impl From<&RefreshRecord> for postgres::history::DataRefreshHistoryRow {
    fn from(record: &RefreshRecord) -> Self {
        Self {
            id: record.id,
            target_database: record.target_database.clone(),
            nomenclature_version: record.nomenclature_version.clone(),
            requested_at: record.requested_at,
            last_continued_at: record.last_continued_at,
            last_heartbeat_at: record.last_heartbeat_at,
            finished_at: record.finished_at,
            completed_stages: record
                .completed_stages
                .iter()
                .map(|stage| stage.as_static_str().to_owned())
                .collect(),
            succeeded: record.succeeded,
        }
    }
}

/// Converts a persisted row back into a record.
///
/// Fails if the row contains a stage name that is not known to this build.
impl TryFrom<postgres::history::DataRefreshHistoryRow> for RefreshRecord {
    type Error = RefreshError;

    fn try_from(row: postgres::history::DataRefreshHistoryRow) -> Result<Self, Self::Error> {
        let completed_stages = row
            .completed_stages
            .iter()
            .map(|name| name.parse::<RefreshStage>())
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(Self {
            id: row.id,
            target_database: row.target_database,
            nomenclature_version: row.nomenclature_version,
            requested_at: row.requested_at,
            last_continued_at: row.last_continued_at,
            last_heartbeat_at: row.last_heartbeat_at,
            finished_at: row.finished_at,
            completed_stages,
            succeeded: row.succeeded,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn new_record_is_in_progress() {
        let record = RefreshRecord::new("db-b", "3.55.0");

        assert!(record.is_in_progress());
        assert!(record.completed_stages.is_empty());
        assert_eq!(record.succeeded, None);
    }

    #[test]
    fn liveness_prefers_heartbeat_over_continuation() {
        let mut record = RefreshRecord::new("db-b", "3.55.0");
        let requested_at = record.requested_at;
        assert_eq!(record.last_seen_alive_at(), requested_at);

        record.last_continued_at = Some(requested_at + Duration::minutes(5));
        assert_eq!(
            record.last_seen_alive_at(),
            requested_at + Duration::minutes(5)
        );

        record.last_heartbeat_at = Some(requested_at + Duration::minutes(10));
        assert_eq!(
            record.last_seen_alive_at(),
            requested_at + Duration::minutes(10)
        );
    }

    #[test]
    fn staleness_uses_timeout() {
        let record = RefreshRecord::new("db-b", "3.55.0");
        let timeout = Duration::minutes(15);

        assert!(!record.is_stale(record.requested_at + Duration::minutes(14), timeout));
        assert!(record.is_stale(record.requested_at + Duration::minutes(16), timeout));
    }

    #[test]
    fn row_conversion_keeps_stages() {
        let mut record = RefreshRecord::new("db-a", "3.56.0");
        record.completed_stages.insert(RefreshStage::ScaleUp);
        record
            .completed_stages
            .insert(RefreshStage::RebuildMetadataDictionary);

        let row = postgres::history::DataRefreshHistoryRow::from(&record);
        assert_eq!(
            row.completed_stages,
            vec!["scale_up", "rebuild_metadata_dictionary"]
        );

        let restored = RefreshRecord::try_from(row).unwrap();
        assert_eq!(restored, record);
    }

    #[test]
    fn row_with_unknown_stage_is_rejected() {
        let record = RefreshRecord::new("db-a", "3.56.0");
        let mut row = postgres::history::DataRefreshHistoryRow::from(&record);
        row.completed_stages.push("unknown".to_owned());

        let err = RefreshRecord::try_from(row).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeserializationError);
    }
}
