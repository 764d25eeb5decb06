//! Error types and result definitions for data refresh operations.
//!
//! Every fallible operation of the pipeline returns [`RefreshResult`]. A [`RefreshError`] carries
//! a classification, a static description, optional dynamic detail, an optional source error and
//! the callsite where it was created.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for data refresh operations.
pub type RefreshResult<T> = Result<T, RefreshError>;

/// Main error type for data refresh operations.
#[derive(Debug, Clone)]
pub struct RefreshError {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Categories of errors that can occur while refreshing data.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Collaborator Errors
    VersionProviderFailed,
    DatabaseResizeFailed,
    DormantDatabaseLookupFailed,
    StageWorkerFailed,
    NotificationFailed,
    DonorImportTriggerFailed,

    // History Errors
    HistoryStoreFailed,
    RecordNotFound,

    // State & Workflow Errors
    InvalidState,
    RefreshCancelled,

    // Configuration & Serialization Errors
    ConfigError,
    SerializationError,
    DeserializationError,

    // Unknown / Uncategorized
    Unknown,

    // Used by tests that inject failures via fault injection.
    #[cfg(feature = "failpoints")]
    FailpointTriggered,
}

impl RefreshError {
    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the static description of this error.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the detailed error information if available.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Returns the captured backtrace for this error.
    pub fn backtrace(&self) -> &Backtrace {
        self.backtrace.as_ref()
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Returns `true` if this error was produced because the run was asked to stop.
    pub fn is_cancellation(&self) -> bool {
        self.kind == ErrorKind::RefreshCancelled
    }

    /// Attaches an originating [`error::Error`] to this error and returns the modified instance.
    ///
    /// The stored source is preserved across clones and exposed via [`error::Error::source`].
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        RefreshError {
            kind,
            description,
            detail,
            source,
            location: Location::caller(),
            backtrace: Arc::new(Backtrace::capture()),
        }
    }
}

impl PartialEq for RefreshError {
    fn eq(&self, other: &RefreshError) -> bool {
        self.kind == other.kind
    }
}

impl Hash for RefreshError {
    /// Hashes only the kind and the static description so that repeated occurrences of the same
    /// failure group together regardless of location or detail.
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.description.hash(state);
    }
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "[{:?}] {} @ {}:{}:{}",
            self.kind,
            self.description,
            self.location.file(),
            self.location.line(),
            self.location.column()
        )?;

        write_block("Detail", self.detail.as_deref(), f)?;

        let rendered_backtrace = self.backtrace.to_string();
        if !rendered_backtrace.trim().is_empty() {
            write_block("Backtrace", Some(&rendered_backtrace), f)?;
        }

        Ok(())
    }
}

impl error::Error for RefreshError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| source as &(dyn error::Error + 'static))
    }
}

/// Writes a labelled, indented block of text.
fn write_block(label: &str, content: Option<&str>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let Some(content) = content else {
        return Ok(());
    };

    if content.trim().is_empty() {
        return write!(f, "\n  {label}: <empty>");
    }

    write!(f, "\n  {label}:")?;
    for line in content.lines() {
        if line.trim().is_empty() {
            write!(f, "\n    ")?;
        } else {
            write!(f, "\n    {line}")?;
        }
    }

    Ok(())
}

/// Creates a [`RefreshError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for RefreshError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> RefreshError {
        RefreshError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`RefreshError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for RefreshError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> RefreshError {
        RefreshError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Converts [`sqlx::Error`] to [`RefreshError`] with [`ErrorKind::HistoryStoreFailed`].
///
/// Unique violations are reported as [`ErrorKind::InvalidState`] since the history table only
/// carries the uniqueness constraint over unfinished records.
impl From<sqlx::Error> for RefreshError {
    #[track_caller]
    fn from(err: sqlx::Error) -> RefreshError {
        let (kind, description) = match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => (
                ErrorKind::InvalidState,
                "Another data refresh is already in progress",
            ),
            sqlx::Error::RowNotFound => (ErrorKind::RecordNotFound, "History record not found"),
            _ => (
                ErrorKind::HistoryStoreFailed,
                "History store operation failed",
            ),
        };

        let detail = err.to_string();
        RefreshError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`serde_json::Error`] to [`RefreshError`] with the appropriate error kind.
impl From<serde_json::Error> for RefreshError {
    #[track_caller]
    fn from(err: serde_json::Error) -> RefreshError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => {
                (ErrorKind::SerializationError, "JSON serialization failed")
            }
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        let detail = err.to_string();
        RefreshError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}
