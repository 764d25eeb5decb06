use fail::fail_point;

use crate::bail;
use crate::error::{ErrorKind, RefreshResult};

/// Evaluated right before the worker of a stage is invoked.
pub const RUN_STAGE__BEFORE_WORKER: &str = "run_stage.before_worker";
/// Evaluated after a stage worker succeeded but before the stage is recorded as completed.
pub const RUN_STAGE__BEFORE_RECORD: &str = "run_stage.before_record";
/// Evaluated right before the compensating scale down of a failed run.
pub const COMPENSATE__BEFORE_RESIZE: &str = "compensate.before_resize";

pub fn refresh_fail_point(name: &str) -> RefreshResult<()> {
    fail_point!(name, |parameter| {
        let detail = match parameter {
            Some(parameter) => format!("The failpoint '{name}' returned an error ({parameter})"),
            None => format!("The failpoint '{name}' returned an error"),
        };

        bail!(
            ErrorKind::FailpointTriggered,
            "An error occurred in a fail point",
            detail
        );
    });

    Ok(())
}
