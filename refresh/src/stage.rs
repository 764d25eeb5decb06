//! Stages of a data refresh and the policy deciding which of them a run executes.
//!
//! Everything in this module is pure. The runner asks [`StagePlan::for_completed_stages`] what to
//! do and then performs the I/O.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, RefreshError};
use crate::refresh_error;

/// A step of the data refresh pipeline.
///
/// Variants are declared in execution order, so the derived [`Ord`] matches the order in which a
/// run executes them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStage {
    ScaleUp,
    RebuildMetadataDictionary,
    RemoveIndexes,
    DeleteDonorData,
    ImportDonors,
    ProcessDonorHla,
    RecreateIndexes,
    ScaleDown,
    ReplayQueuedDonorUpdates,
}

/// Whether a stage rebuilds data or manages the surrounding infrastructure.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StageCategory {
    /// Durable work on the dormant database that must never be redone once completed.
    Data,
    /// Sizing and replay work that brackets the data stages.
    Infrastructure,
}

impl RefreshStage {
    /// Every stage in execution order.
    pub const ALL: [RefreshStage; 9] = [
        RefreshStage::ScaleUp,
        RefreshStage::RebuildMetadataDictionary,
        RefreshStage::RemoveIndexes,
        RefreshStage::DeleteDonorData,
        RefreshStage::ImportDonors,
        RefreshStage::ProcessDonorHla,
        RefreshStage::RecreateIndexes,
        RefreshStage::ScaleDown,
        RefreshStage::ReplayQueuedDonorUpdates,
    ];

    /// The data stages in execution order.
    pub const DATA: [RefreshStage; 6] = [
        RefreshStage::RebuildMetadataDictionary,
        RefreshStage::RemoveIndexes,
        RefreshStage::DeleteDonorData,
        RefreshStage::ImportDonors,
        RefreshStage::ProcessDonorHla,
        RefreshStage::RecreateIndexes,
    ];

    pub fn category(&self) -> StageCategory {
        match self {
            Self::ScaleUp => StageCategory::Infrastructure,
            Self::RebuildMetadataDictionary => StageCategory::Data,
            Self::RemoveIndexes => StageCategory::Data,
            Self::DeleteDonorData => StageCategory::Data,
            Self::ImportDonors => StageCategory::Data,
            Self::ProcessDonorHla => StageCategory::Data,
            Self::RecreateIndexes => StageCategory::Data,
            Self::ScaleDown => StageCategory::Infrastructure,
            Self::ReplayQueuedDonorUpdates => StageCategory::Infrastructure,
        }
    }

    pub fn is_data_stage(&self) -> bool {
        self.category() == StageCategory::Data
    }

    /// Returns the stable name used for persistence and logging.
    pub fn as_static_str(&self) -> &'static str {
        match self {
            Self::ScaleUp => "scale_up",
            Self::RebuildMetadataDictionary => "rebuild_metadata_dictionary",
            Self::RemoveIndexes => "remove_indexes",
            Self::DeleteDonorData => "delete_donor_data",
            Self::ImportDonors => "import_donors",
            Self::ProcessDonorHla => "process_donor_hla",
            Self::RecreateIndexes => "recreate_indexes",
            Self::ScaleDown => "scale_down",
            Self::ReplayQueuedDonorUpdates => "replay_queued_donor_updates",
        }
    }
}

impl fmt::Display for RefreshStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_static_str())
    }
}

impl FromStr for RefreshStage {
    type Err = RefreshError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        RefreshStage::ALL
            .into_iter()
            .find(|stage| stage.as_static_str() == value)
            .ok_or_else(|| {
                refresh_error!(
                    ErrorKind::DeserializationError,
                    "Unknown refresh stage",
                    format!("The stage name '{value}' does not match any refresh stage")
                )
            })
    }
}

impl TryFrom<&str> for RefreshStage {
    type Error = RefreshError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Returns the first data stage that has not been completed yet.
///
/// Returns [`None`] when every data stage is completed.
pub fn resume_point(completed: &BTreeSet<RefreshStage>) -> Option<RefreshStage> {
    RefreshStage::DATA
        .into_iter()
        .find(|stage| !completed.contains(stage))
}

/// Returns `true` if the run must scale the target database up to the refresh tier.
///
/// A completed [`RefreshStage::ScaleUp`] on an unfinished record means the database was never
/// scaled back down, because every failure path compensates and finishes the record.
pub fn should_scale_up(completed: &BTreeSet<RefreshStage>) -> bool {
    resume_point(completed).is_some() && !completed.contains(&RefreshStage::ScaleUp)
}

/// Returns `true` if HLA processing continues on top of an earlier import.
pub fn is_hla_continuation(completed: &BTreeSet<RefreshStage>) -> bool {
    completed.contains(&RefreshStage::ImportDonors)
}

/// What a run does with a single stage.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StageAction {
    Run,
    Skip,
}

/// The ordered decisions a run makes for a record with the given completed stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    steps: Vec<(RefreshStage, StageAction)>,
    is_hla_continuation: bool,
}

impl StagePlan {
    pub fn for_completed_stages(completed: &BTreeSet<RefreshStage>) -> Self {
        let resume_point = resume_point(completed);

        let steps = RefreshStage::ALL
            .into_iter()
            .map(|stage| {
                let action = match stage {
                    RefreshStage::ScaleUp if should_scale_up(completed) => StageAction::Run,
                    RefreshStage::ScaleUp => StageAction::Skip,
                    RefreshStage::ScaleDown | RefreshStage::ReplayQueuedDonorUpdates => {
                        StageAction::Run
                    }
                    data_stage => match resume_point {
                        Some(resume_point) if data_stage >= resume_point => StageAction::Run,
                        _ => StageAction::Skip,
                    },
                };

                (stage, action)
            })
            .collect();

        Self {
            steps,
            is_hla_continuation: is_hla_continuation(completed),
        }
    }

    pub fn steps(&self) -> &[(RefreshStage, StageAction)] {
        &self.steps
    }

    /// Returns the stages that will run, in order.
    pub fn stages_to_run(&self) -> impl Iterator<Item = RefreshStage> + '_ {
        self.steps
            .iter()
            .filter(|(_, action)| *action == StageAction::Run)
            .map(|(stage, _)| *stage)
    }

    pub fn is_hla_continuation(&self) -> bool {
        self.is_hla_continuation
    }
}
