//! Uniform success/error envelope returned by every use case.
//!
//! A [`UseCaseResult`] starts out pending, is moved to a terminal state by one of
//! the `set_*` mutators, and is then handed to the caller by value.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// AppStatus
// ---------------------------------------------------------------------------

/// Application-level status carried by a result.
///
/// Transport adapters translate this into a protocol code through a fixed table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppStatus {
    Success,
    Created,
    Updated,
    PartialContent,
    InvalidInput,
    Unauthorized,
    NotFound,
    Conflict,
    TooManyRequests,
    InternalError,
    NotImplemented,
    ProviderError,
}

impl AppStatus {
    /// Returns the snake-case name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Created => "created",
            Self::Updated => "updated",
            Self::PartialContent => "partial_content",
            Self::InvalidInput => "invalid_input",
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::TooManyRequests => "too_many_requests",
            Self::InternalError => "internal_error",
            Self::NotImplemented => "not_implemented",
            Self::ProviderError => "provider_error",
        }
    }

    /// Whether this status describes a failure.
    #[must_use]
    pub const fn is_error(self) -> bool {
        !matches!(
            self,
            Self::Success | Self::Created | Self::Updated | Self::PartialContent
        )
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// UseCaseError
// ---------------------------------------------------------------------------

/// Error half of a result: a status code plus a message.
///
/// The message is either a locale-independent key (guards, validation) or a
/// human-readable description from a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct UseCaseError {
    pub code: AppStatus,
    pub message: String,
}

impl UseCaseError {
    #[must_use]
    pub fn new(code: AppStatus, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(AppStatus::InvalidInput, message)
    }

    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(AppStatus::Unauthorized, message)
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(AppStatus::NotFound, message)
    }

    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(AppStatus::Conflict, message)
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(AppStatus::InternalError, message)
    }

    #[must_use]
    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(AppStatus::ProviderError, message)
    }
}

/// Unexpected collaborator failures surface as internal errors.
impl From<anyhow::Error> for UseCaseError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(format!("{err:#}"))
    }
}

// ---------------------------------------------------------------------------
// UseCaseResult
// ---------------------------------------------------------------------------

/// Outcome of one use-case execution.
///
/// A terminal result holds either `data` or `error`, never both. The mutators
/// are deliberately permissive (a later write replaces an earlier one), so a
/// use case body must stop after its first terminal write. Writing bodies as
/// `Result<T, UseCaseError>` functions and converting with
/// [`UseCaseResult::from_outcome`] makes that automatic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UseCaseResult<T> {
    status: Option<AppStatus>,
    data: Option<T>,
    error: Option<UseCaseError>,
    details: Option<String>,
    success: bool,
}

impl<T> UseCaseResult<T> {
    /// Creates an empty, non-terminal result.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            status: None,
            data: None,
            error: None,
            details: None,
            success: false,
        }
    }

    /// Creates a terminal success carrying `value`.
    #[must_use]
    pub fn success(status: AppStatus, value: T) -> Self {
        let mut result = Self::new();
        result.set_data(status, value, "");
        result
    }

    /// Creates a terminal failure.
    #[must_use]
    pub fn failure(code: AppStatus, message: impl Into<String>) -> Self {
        let mut result = Self::new();
        result.set_error(code, message);
        result
    }

    /// Converts a `?`-style body outcome into a terminal result.
    pub fn from_outcome(status: AppStatus, outcome: Result<T, UseCaseError>) -> Self {
        match outcome {
            Ok(value) => Self::success(status, value),
            Err(err) => err.into(),
        }
    }

    /// Transitions to success and stores `value`. An empty `details` is not stored.
    pub fn set_data(&mut self, status: AppStatus, value: T, details: impl Into<String>) {
        self.status = Some(status);
        self.data = Some(value);
        self.error = None;
        self.success = true;
        self.set_details(details);
    }

    /// Transitions to failure and drops any stored data.
    pub fn set_error(&mut self, code: AppStatus, message: impl Into<String>) {
        self.status = Some(code);
        self.data = None;
        self.error = Some(UseCaseError::new(code, message));
        self.success = false;
    }

    /// Records a payload-less success (or clears the flag).
    ///
    /// Marking success on a pending result makes it terminal with
    /// [`AppStatus::Success`].
    pub fn set_success(&mut self, success: bool) {
        self.success = success;
        if success && self.status.is_none() {
            self.status = Some(AppStatus::Success);
        }
    }

    /// Sets the human-readable details line. Empty strings clear it.
    pub fn set_details(&mut self, details: impl Into<String>) {
        let details = details.into();
        self.details = if details.is_empty() {
            None
        } else {
            Some(details)
        };
    }

    #[must_use]
    pub const fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Exact complement of [`Self::has_error`].
    ///
    /// A pending result therefore reports success; pair with
    /// [`Self::is_terminal`] to tell "done, no error" from "not done yet". The
    /// flag written by [`Self::set_success`] is read through
    /// [`Self::reported_success`] and does not affect this method.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !self.has_error()
    }

    /// Whether a terminal write has happened.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_some()
    }

    /// Value of the auxiliary success flag set by `set_data`/`set_success`.
    #[must_use]
    pub const fn reported_success(&self) -> bool {
        self.success
    }

    #[must_use]
    pub const fn status(&self) -> Option<AppStatus> {
        self.status
    }

    #[must_use]
    pub const fn error(&self) -> Option<&UseCaseError> {
        self.error.as_ref()
    }

    #[must_use]
    pub const fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    #[must_use]
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    #[must_use]
    pub fn into_data(self) -> Option<T> {
        self.data
    }

    /// Splits into the plain `Result` shape for callers that prefer `?`.
    ///
    /// # Errors
    ///
    /// Returns the stored error when the result failed.
    pub fn into_result(self) -> Result<Option<T>, UseCaseError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.data),
        }
    }

    /// Hands the payload to the next pipeline stage.
    ///
    /// On failure the error, status, and details are carried over unchanged into
    /// a result of the next stage's type. A success without payload, or a pending
    /// result, cannot feed a next stage and becomes an internal error.
    ///
    /// # Errors
    ///
    /// Returns the re-typed result when there is no payload to continue with.
    pub fn into_continuation<U>(self) -> Result<T, UseCaseResult<U>> {
        if self.error.is_some() {
            return Err(UseCaseResult {
                status: self.status,
                data: None,
                error: self.error,
                details: self.details,
                success: false,
            });
        }
        match self.data {
            Some(data) => Ok(data),
            None => Err(UseCaseResult::failure(
                AppStatus::InternalError,
                "upstream step produced no data",
            )),
        }
    }

    /// Maps the payload while keeping status and details.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> UseCaseResult<U> {
        UseCaseResult {
            status: self.status,
            data: self.data.map(f),
            error: self.error,
            details: self.details,
            success: self.success,
        }
    }
}

impl<T> Default for UseCaseResult<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> From<UseCaseError> for UseCaseResult<T> {
    fn from(err: UseCaseError) -> Self {
        let mut result = Self::new();
        result.set_error(err.code, err.message);
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
