use thiserror::Error;

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

// ========== Error Facility ==========

/// Coarse grouping of error kinds
///
/// Precondition and ExternalCommand failures abort an operation before (or
/// instead of) any further cluster mutation. Protocol covers replies of an
/// unexpected shape. Per-key key-value restore failures are not errors at
/// all; they are collected in [`crate::model::KvRestoreReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Precondition,
    ExternalCommand,
    Protocol,
    Io,
    Network,
    Internal,
}

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code that can be used for programmatic
/// error handling and testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Preconditions
    MissingCommand,
    DirtySchema,
    MissingSnapshotFile,
    SchemaVersionMismatch,
    InvalidSnapshotFile,
    PortUnavailable,
    UnsupportedPlatform,
    InvalidConfig,

    // External commands
    CommandFailed,

    // Protocol
    UnexpectedSchemaRows,
    UnexpectedOutput,
    NoInstance,

    // Key-value store
    KvConnection,
    KvCommand,
    KvRestoreFailed,

    // Self-update
    Http,
    UpdateNotFound,
    UpdateApply,
    RollbackFailed,

    // Integration/IO
    Io,
    Serialization,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::MissingCommand => "ERR_MISSING_COMMAND",
            ExErrorKind::DirtySchema => "ERR_DIRTY_SCHEMA",
            ExErrorKind::MissingSnapshotFile => "ERR_MISSING_SNAPSHOT_FILE",
            ExErrorKind::SchemaVersionMismatch => "ERR_SCHEMA_VERSION_MISMATCH",
            ExErrorKind::InvalidSnapshotFile => "ERR_INVALID_SNAPSHOT_FILE",
            ExErrorKind::PortUnavailable => "ERR_PORT_UNAVAILABLE",
            ExErrorKind::UnsupportedPlatform => "ERR_UNSUPPORTED_PLATFORM",
            ExErrorKind::InvalidConfig => "ERR_INVALID_CONFIG",
            ExErrorKind::CommandFailed => "ERR_COMMAND_FAILED",
            ExErrorKind::UnexpectedSchemaRows => "ERR_UNEXPECTED_SCHEMA_ROWS",
            ExErrorKind::UnexpectedOutput => "ERR_UNEXPECTED_OUTPUT",
            ExErrorKind::NoInstance => "ERR_NO_INSTANCE",
            ExErrorKind::KvConnection => "ERR_KV_CONNECTION",
            ExErrorKind::KvCommand => "ERR_KV_COMMAND",
            ExErrorKind::KvRestoreFailed => "ERR_KV_RESTORE_FAILED",
            ExErrorKind::Http => "ERR_HTTP",
            ExErrorKind::UpdateNotFound => "ERR_UPDATE_NOT_FOUND",
            ExErrorKind::UpdateApply => "ERR_UPDATE_APPLY",
            ExErrorKind::RollbackFailed => "ERR_ROLLBACK_FAILED",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }

    /// Get the category this kind belongs to
    pub fn category(&self) -> ErrorCategory {
        match self {
            ExErrorKind::MissingCommand
            | ExErrorKind::DirtySchema
            | ExErrorKind::MissingSnapshotFile
            | ExErrorKind::SchemaVersionMismatch
            | ExErrorKind::InvalidSnapshotFile
            | ExErrorKind::PortUnavailable
            | ExErrorKind::UnsupportedPlatform
            | ExErrorKind::InvalidConfig => ErrorCategory::Precondition,
            ExErrorKind::CommandFailed => ErrorCategory::ExternalCommand,
            ExErrorKind::UnexpectedSchemaRows
            | ExErrorKind::UnexpectedOutput
            | ExErrorKind::NoInstance
            | ExErrorKind::KvCommand
            | ExErrorKind::KvRestoreFailed => ErrorCategory::Protocol,
            ExErrorKind::KvConnection
            | ExErrorKind::Http
            | ExErrorKind::UpdateNotFound => ErrorCategory::Network,
            ExErrorKind::Io
            | ExErrorKind::Serialization
            | ExErrorKind::UpdateApply
            | ExErrorKind::RollbackFailed => ErrorCategory::Io,
            ExErrorKind::Internal => ErrorCategory::Internal,
        }
    }
}

/// Canonical structured error type
///
/// Carries the classification fields used for programmatic handling plus the
/// context an administrator needs to act on a failure: the failing command
/// line and whatever it wrote to stderr.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    subject: Option<String>,
    command: Option<String>,
    stderr: Option<String>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            subject: None,
            command: None,
            stderr: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add the thing the operation was acting on (a path, a pod, a key)
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Add the command line that failed
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Add captured stderr of the failed command
    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = Some(stderr.into());
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the category of the error kind
    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the subject context, if any
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Get the failing command line, if any
    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    /// Get the captured stderr, if any
    pub fn stderr(&self) -> Option<&str> {
        self.stderr.as_deref()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(subject) = &self.subject {
            write!(f, " ({})", subject)?;
        }
        if let Some(command) = &self.command {
            write!(f, "\n  command: {}", command)?;
        }
        if let Some(stderr) = self.stderr.as_deref().filter(|s| !s.trim().is_empty()) {
            write!(f, "\n  stderr:\n{}", stderr.trim_end())?;
        }
        if let Some(source) = &self.source {
            write!(f, "\n  caused by: {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Create an IO error
pub fn io_error(op: &str, err: std::io::Error) -> ExError {
    ExError::new(ExErrorKind::Io)
        .with_op(op.to_string())
        .with_message(err.to_string())
}

/// Create a serialization error from serde_json
pub fn serde_error(op: &str, err: serde_json::Error) -> ExError {
    ExError::new(ExErrorKind::Serialization)
        .with_op(op.to_string())
        .with_message(err.to_string())
}

/// Create an external command failure carrying the command line, the exit
/// error, and captured stderr
pub fn command_failed(command: &str, error: impl std::fmt::Display, stderr: &[u8]) -> ExError {
    ExError::new(ExErrorKind::CommandFailed)
        .with_op("exec")
        .with_command(command)
        .with_message(error.to_string())
        .with_stderr(String::from_utf8_lossy(stderr).into_owned())
}

// ========== End Error Facility ==========

/// Domain failures of the snapshot and update workflows
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdminError {
    /// A required external command is not on PATH
    #[error("required command {command:?} is missing")]
    MissingCommand { command: String },

    /// The migration bookkeeping table is mid-migration
    #[error("schema_migrations table is dirty (version {version})")]
    DirtySchema { version: i64 },

    /// The migration bookkeeping table did not hold exactly one row
    #[error("expected exactly 1 row in schema_migrations, found {count}")]
    UnexpectedSchemaRows { count: usize },

    /// A snapshot file is absent or not a regular file
    #[error("{path} is not a regular file")]
    MissingSnapshotFile { path: String },

    /// The snapshot was taken against a different schema version
    #[error("snapshot schema version ({snapshot}) differs from current schema version ({current})")]
    SchemaVersionMismatch { snapshot: i64, current: i64 },

    /// A snapshot file exists but cannot be interpreted
    #[error("invalid snapshot file {path}: {reason}")]
    InvalidSnapshotFile { path: String, reason: String },

    /// The local tunnel port is taken
    #[error("could not bind to port {port} (is something else already listening on it?): {reason}")]
    PortUnavailable { port: u16, reason: String },

    /// No pod matched the selector
    #[error("no instance found for selector {selector}")]
    NoInstance { selector: String },

    /// Self-update requested on a platform without published binaries
    #[error("unsupported operating system {os} (must run on macOS or Linux)")]
    UnsupportedPlatform { os: String },

    /// The requested binary is not published
    #[error("Version {version} was not found. Status code was {status}.")]
    UpdateNotFound { version: String, status: u16 },

    /// Rolling back a failed binary swap also failed
    #[error("failed to rollback from bad update: {reason}")]
    RollbackFailed { reason: String },

    /// The final key-value confirmation command failed
    #[error("Redis restore failed: {reason}")]
    KvRestoreFailed { reason: String },

    /// A configuration value could not be parsed
    #[error("invalid value for {name}: {reason}")]
    InvalidConfig { name: String, reason: String },
}

/// Conversion from AdminError to ExError
impl From<AdminError> for ExError {
    fn from(err: AdminError) -> Self {
        let message = err.to_string();
        match err {
            AdminError::MissingCommand { command } => ExError::new(ExErrorKind::MissingCommand)
                .with_op("preflight")
                .with_subject(command)
                .with_message(message),

            AdminError::DirtySchema { .. } => ExError::new(ExErrorKind::DirtySchema)
                .with_op("schema_version")
                .with_message(message),

            AdminError::UnexpectedSchemaRows { .. } => {
                ExError::new(ExErrorKind::UnexpectedSchemaRows)
                    .with_op("schema_version")
                    .with_message(message)
            }

            AdminError::MissingSnapshotFile { path } => {
                ExError::new(ExErrorKind::MissingSnapshotFile)
                    .with_op("check_snapshot_files")
                    .with_subject(path)
                    .with_message(message)
            }

            AdminError::SchemaVersionMismatch { .. } => {
                ExError::new(ExErrorKind::SchemaVersionMismatch)
                    .with_op("restore_relational")
                    .with_message(message)
            }

            AdminError::InvalidSnapshotFile { path, .. } => {
                ExError::new(ExErrorKind::InvalidSnapshotFile)
                    .with_subject(path)
                    .with_message(message)
            }

            AdminError::PortUnavailable { port, .. } => {
                ExError::new(ExErrorKind::PortUnavailable)
                    .with_op("port_forward")
                    .with_subject(port.to_string())
                    .with_message(message)
            }

            AdminError::NoInstance { selector } => ExError::new(ExErrorKind::NoInstance)
                .with_op("locate")
                .with_subject(selector)
                .with_message(message),

            AdminError::UnsupportedPlatform { .. } => {
                ExError::new(ExErrorKind::UnsupportedPlatform)
                    .with_op("update")
                    .with_message(message)
            }

            AdminError::UpdateNotFound { .. } => ExError::new(ExErrorKind::UpdateNotFound)
                .with_op("update")
                .with_message(message),

            AdminError::RollbackFailed { .. } => ExError::new(ExErrorKind::RollbackFailed)
                .with_op("update")
                .with_message(message),

            AdminError::KvRestoreFailed { .. } => ExError::new(ExErrorKind::KvRestoreFailed)
                .with_op("restore_kv")
                .with_message(message),

            AdminError::InvalidConfig { name, .. } => ExError::new(ExErrorKind::InvalidConfig)
                .with_op("config")
                .with_subject(name)
                .with_message(message),
        }
    }
}
