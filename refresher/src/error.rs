use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error;
use std::fmt;

use refresh::error::RefreshError;

/// Result type for refresher operations.
pub type RefresherResult<T> = Result<T, RefresherError>;

/// Captured backtrace wrapper so variants without their own backtrace can still report one.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type for the refresher service.
///
/// Wraps [`RefreshError`] for failures of the refresh pipeline itself and provides variants for
/// the infrastructure around it.
#[derive(Debug)]
pub enum RefresherError {
    /// A data refresh or cleanup failed.
    Refresh(RefreshError),
    /// Configuration could not be loaded or is invalid.
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    /// The history store could not be reached or migrated.
    Migration(sqlx::Error, CapturedBacktrace),
    /// I/O error, e.g. while starting the runtime.
    Io(std::io::Error, CapturedBacktrace),
}

impl RefresherError {
    pub fn category(&self) -> &'static str {
        match self {
            RefresherError::Refresh(_) => "refresh error",
            RefresherError::Config(_, _) => "configuration error",
            RefresherError::Migration(_, _) => "migration error",
            RefresherError::Io(_, _) => "i/o error",
        }
    }

    /// Returns the backtrace taken where the error was created, if capturing was enabled.
    pub fn captured_backtrace(&self) -> Option<&Backtrace> {
        let backtrace = match self {
            RefresherError::Refresh(err) => err.backtrace(),
            RefresherError::Config(_, backtrace) => &backtrace.0,
            RefresherError::Migration(_, backtrace) => &backtrace.0,
            RefresherError::Io(_, backtrace) => &backtrace.0,
        };

        (backtrace.status() == BacktraceStatus::Captured).then_some(backtrace)
    }

    /// Creates a configuration error from any error type.
    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        RefresherError::Config(Box::new(err), CapturedBacktrace::capture())
    }
}

impl fmt::Display for RefresherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefresherError::Refresh(err) => write!(f, "{err}"),
            RefresherError::Config(source, _) => write!(f, "configuration error: {source}"),
            RefresherError::Migration(source, _) => write!(f, "migration error: {source}"),
            RefresherError::Io(source, _) => write!(f, "i/o error: {source}"),
        }
    }
}

impl Error for RefresherError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RefresherError::Refresh(err) => err.source(),
            RefresherError::Config(source, _) => Some(source.as_ref()),
            RefresherError::Migration(source, _) => Some(source),
            RefresherError::Io(source, _) => Some(source),
        }
    }
}

impl From<sqlx::Error> for RefresherError {
    fn from(err: sqlx::Error) -> Self {
        RefresherError::Migration(err, CapturedBacktrace::capture())
    }
}

impl From<std::io::Error> for RefresherError {
    fn from(err: std::io::Error) -> Self {
        RefresherError::Io(err, CapturedBacktrace::capture())
    }
}

impl From<RefreshError> for RefresherError {
    fn from(err: RefreshError) -> Self {
        RefresherError::Refresh(err)
    }
}
