use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CallerIdError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    #[error("Cannot pop: the {0} stack is empty")]
    EmptyStack(&'static str),

    #[error("Run-as look-back depth {0} is not supported (only 0 and 1)")]
    RunAsDepth(usize),

    #[error("Association mode already installed as '{installed}', cannot switch to '{requested}'")]
    ModeAlreadyInstalled { installed: String, requested: String },

    #[error("Invalid cache lifetime: {0}")]
    InvalidLifetime(i64),

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl CallerIdError {
    /// Return a typed exit code for this error category.
    pub fn exit_code(&self) -> i32 {
        match self {
            CallerIdError::AuthenticationFailed(_) => 2,
            CallerIdError::InvalidUsage(_) => 3,
            CallerIdError::EmptyStack(_) => 3,
            CallerIdError::RunAsDepth(_) => 3,
            CallerIdError::ModeAlreadyInstalled { .. } => 3,
            CallerIdError::InvalidLifetime(_) => 4,
            CallerIdError::Config(_) => 4,
            CallerIdError::Io(_) => 1,
            CallerIdError::Other(_) => 1,
        }
    }

    /// Return a string error code identifier.
    pub fn error_code(&self) -> &'static str {
        match self {
            CallerIdError::AuthenticationFailed(_) => "auth_failed",
            CallerIdError::InvalidUsage(_) => "invalid_usage",
            CallerIdError::EmptyStack(_) => "empty_stack",
            CallerIdError::RunAsDepth(_) => "run_as_depth",
            CallerIdError::ModeAlreadyInstalled { .. } => "mode_already_installed",
            CallerIdError::InvalidLifetime(_) => "invalid_lifetime",
            CallerIdError::Config(_) => "config_error",
            CallerIdError::Io(_) => "io_error",
            CallerIdError::Other(_) => "error",
        }
    }

    /// Programming errors that must fail the calling operation without touching state.
    pub fn is_invalid_usage(&self) -> bool {
        matches!(
            self,
            CallerIdError::InvalidUsage(_)
                | CallerIdError::EmptyStack(_)
                | CallerIdError::RunAsDepth(_)
                | CallerIdError::ModeAlreadyInstalled { .. }
                | CallerIdError::InvalidLifetime(_)
        )
    }
}

/// Why the most recent authentication in a unit of work was declined.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AuthFailure {
    /// Presented principal name, `None` for anonymous attempts.
    pub principal: Option<String>,
    pub reason: String,
    pub at: chrono::DateTime<chrono::Utc>,
}

impl AuthFailure {
    pub fn new(principal: Option<&str>, reason: impl Into<String>) -> Self {
        Self {
            principal: principal.map(|s| s.to_string()),
            reason: reason.into(),
            at: chrono::Utc::now(),
        }
    }
}

/// JSON error response for --json mode.
#[derive(Serialize)]
pub struct JsonError {
    pub error: JsonErrorDetail,
}

#[derive(Serialize)]
pub struct JsonErrorDetail {
    pub code: String,
    pub message: String,
    pub exit_code: i32,
}

impl JsonError {
    pub fn from_error(e: &CallerIdError) -> Self {
        Self {
            error: JsonErrorDetail {
                code: e.error_code().to_string(),
                message: e.to_string(),
                exit_code: e.exit_code(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, CallerIdError>;
