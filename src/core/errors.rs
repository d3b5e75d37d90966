//! Error types for the engine.
//!
//! One `thiserror`-derived enum carries every error kind named in the
//! engine's error-handling design: Input, Storage, Analysis, Fix-pipeline,
//! Patcher, and Safety errors. Constructor helpers mirror the variant
//! names so call sites read as `VigilError::boundary_violation(...)`
//! rather than building struct literals inline.

use std::io;

use thiserror::Error;

/// Result type used throughout the engine.
pub type Result<T> = std::result::Result<T, VigilError>;

/// Every error kind the engine can surface.
#[derive(Error, Debug)]
pub enum VigilError {
    // -- Input errors ----------------------------------------------------
    /// A referenced path does not exist.
    #[error("not found: {path}")]
    NotFound {
        /// Path that could not be located.
        path: String,
    },

    /// A path resolved outside the project root, or used `..` to escape
    /// it. Raised by the Safety Envelope (C13) before any file access.
    #[error("boundary violation: {path} escapes project root {project_root}")]
    BoundaryViolation {
        /// The offending path.
        path: String,
        /// The project root it escaped.
        project_root: String,
    },

    /// Metadata attached to a Memory Store write, or a Fix Proposal, did
    /// not pass schema validation.
    #[error("invalid metadata: {message}")]
    InvalidMetadata {
        /// Description of what failed validation.
        message: String,
    },

    /// A file extension has no registered Language Analyzer.
    #[error("unsupported language for {path}")]
    UnsupportedLanguage {
        /// Path with the unrecognized extension.
        path: String,
    },

    // -- Storage errors ---------------------------------------------------
    /// Filesystem error while reading or writing a language store.
    #[error("storage error: {message}")]
    StorageError {
        /// Error description.
        message: String,
        /// Underlying I/O error, when there is one.
        #[source]
        source: Option<io::Error>,
    },

    /// A language store's on-disk schema failed validation; that store
    /// is downgraded to read-only and other languages proceed.
    #[error("corrupt store for language {language}: {message}")]
    CorruptStore {
        /// Language whose store is corrupt.
        language: String,
        /// Description of the corruption.
        message: String,
    },

    /// A Memory Store write was rejected because the store is at
    /// capacity and pruning did not free enough room.
    #[error("memory store full for language {language}")]
    MemoryFull {
        /// Language store that is full.
        language: String,
    },

    // -- Analysis errors ---------------------------------------------------
    /// A file failed to parse. Converted into a critical Issue by the
    /// orchestrator rather than aborting the run.
    #[error("parse failed in {language} file {file_path}: {message}")]
    ParseFailed {
        /// Language of the file.
        language: String,
        /// Path of the file.
        file_path: String,
        /// Parser diagnostic.
        message: String,
    },

    /// An operation exceeded its deadline.
    #[error("operation timed out after {seconds}s: {operation}")]
    Timeout {
        /// What was running.
        operation: String,
        /// Deadline in seconds that was exceeded.
        seconds: u64,
    },

    /// A configured resource limit (recursion depth, concurrent ops,
    /// wall time) was exceeded.
    #[error("limit exceeded: {limit} (value {value}, max {max})")]
    LimitExceeded {
        /// Name of the limit.
        limit: String,
        /// Observed value.
        value: u64,
        /// Configured maximum.
        max: u64,
    },

    // -- Fix pipeline errors -----------------------------------------------
    /// A Fix Proposal's replacement text matched a Defense-in-Depth
    /// dangerous-pattern signature.
    #[error("dangerous pattern detected: {pattern}")]
    DangerousPattern {
        /// Name of the matched pattern.
        pattern: String,
    },

    /// A fix-generation template itself matched the dangerous-pattern
    /// list; rejected at classification regardless of user choice.
    #[error("template rejected as dangerous: {template_id}")]
    DangerousTemplate {
        /// Identifier of the rejected template.
        template_id: String,
    },

    /// A Fix Proposal's declared fields were inconsistent with its
    /// actual content (e.g. `auto_safe` set for a non-allow-listed
    /// category).
    #[error("metadata tampering detected: {message}")]
    MetadataTampering {
        /// Description of the inconsistency.
        message: String,
    },

    /// The sandbox gate's parse check, build command, or smoke command
    /// failed or timed out.
    #[error("sandbox validation failed: {message}")]
    SandboxValidationFailed {
        /// Description of the failure.
        message: String,
    },

    /// A recursive-improvement pass increased (rather than held or
    /// decreased) the critical+high issue count.
    #[error("regression detected at depth {depth}: {before} -> {after} critical+high issues")]
    RegressionDetected {
        /// Recursion depth at which the regression was observed.
        depth: u32,
        /// Critical+high count before the pass.
        before: usize,
        /// Critical+high count after the pass.
        after: usize,
    },

    // -- Patcher errors ------------------------------------------------------
    /// The configured backup directory resolved inside the project
    /// root.
    #[error("unsafe backup location: {backup_dir} is inside project root {project_root}")]
    UnsafeBackupLocation {
        /// The rejected backup directory.
        backup_dir: String,
        /// The project root it collided with.
        project_root: String,
    },

    /// Rollback could not restore every backed-up file; the run
    /// continues and reports the files that could not be restored.
    #[error("partial rollback: {} files could not be restored", affected_paths.len())]
    PartialRollback {
        /// Paths that failed to restore.
        affected_paths: Vec<String>,
    },

    /// A patcher validation command exited non-zero or timed out.
    #[error("validation failed: {message}")]
    ValidationFailed {
        /// Description of the failure.
        message: String,
    },

    // -- Safety errors -------------------------------------------------------
    /// The emergency-stop flag was observed at a cooperative checkpoint.
    #[error("emergency stop engaged")]
    EmergencyStop,

    /// The Safety Envelope's field-shaping evaluation returned `deny`
    /// for a sensitive operation.
    #[error("field-shaping denied operation: {operation}")]
    FieldDeny {
        /// The operation that was denied.
        operation: String,
    },

    // -- Ambient errors --------------------------------------------------------
    /// Generic I/O error not otherwise classified above.
    #[error("I/O error: {message}")]
    Io {
        /// Human-readable message.
        message: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Configuration load/validation error.
    #[error("configuration error: {message}")]
    Config {
        /// Error description.
        message: String,
        /// Configuration field that caused the error, if known.
        field: Option<String>,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    Serialization {
        /// Error description.
        message: String,
    },

    /// Catch-all for errors that don't fit another variant.
    #[error("internal error: {message}")]
    Internal {
        /// Error description.
        message: String,
    },
}

impl VigilError {
    /// Build a [`VigilError::NotFound`].
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Build a [`VigilError::BoundaryViolation`].
    pub fn boundary_violation(path: impl Into<String>, project_root: impl Into<String>) -> Self {
        Self::BoundaryViolation {
            path: path.into(),
            project_root: project_root.into(),
        }
    }

    /// Build a [`VigilError::InvalidMetadata`].
    pub fn invalid_metadata(message: impl Into<String>) -> Self {
        Self::InvalidMetadata {
            message: message.into(),
        }
    }

    /// Build a [`VigilError::UnsupportedLanguage`].
    pub fn unsupported_language(path: impl Into<String>) -> Self {
        Self::UnsupportedLanguage { path: path.into() }
    }

    /// Build a [`VigilError::StorageError`] with no underlying source.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageError {
            message: message.into(),
            source: None,
        }
    }

    /// Build a [`VigilError::CorruptStore`].
    pub fn corrupt_store(language: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CorruptStore {
            language: language.into(),
            message: message.into(),
        }
    }

    /// Build a [`VigilError::ParseFailed`].
    pub fn parse(language: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseFailed {
            language: language.into(),
            file_path: String::new(),
            message: message.into(),
        }
    }

    /// Build a [`VigilError::ParseFailed`] with a file path attached.
    pub fn parse_in_file(
        language: impl Into<String>,
        file_path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ParseFailed {
            language: language.into(),
            file_path: file_path.into(),
            message: message.into(),
        }
    }

    /// Build a [`VigilError::Timeout`].
    pub fn timeout(operation: impl Into<String>, seconds: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            seconds,
        }
    }

    /// Build a [`VigilError::LimitExceeded`].
    pub fn limit_exceeded(limit: impl Into<String>, value: u64, max: u64) -> Self {
        Self::LimitExceeded {
            limit: limit.into(),
            value,
            max,
        }
    }

    /// Build a [`VigilError::Config`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            field: None,
        }
    }

    /// Build a [`VigilError::Config`] with a named field.
    pub fn config_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Build a [`VigilError::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Build a [`VigilError::DangerousPattern`].
    pub fn dangerous_pattern(pattern: impl Into<String>) -> Self {
        Self::DangerousPattern {
            pattern: pattern.into(),
        }
    }

    /// Build a [`VigilError::DangerousTemplate`].
    pub fn dangerous_template(template_id: impl Into<String>) -> Self {
        Self::DangerousTemplate {
            template_id: template_id.into(),
        }
    }

    /// Build a [`VigilError::MetadataTampering`].
    pub fn metadata_tampering(message: impl Into<String>) -> Self {
        Self::MetadataTampering {
            message: message.into(),
        }
    }

    /// Build a [`VigilError::SandboxValidationFailed`].
    pub fn sandbox_validation_failed(message: impl Into<String>) -> Self {
        Self::SandboxValidationFailed {
            message: message.into(),
        }
    }

    /// Build a [`VigilError::UnsafeBackupLocation`].
    pub fn unsafe_backup_location(backup_dir: impl Into<String>, project_root: impl Into<String>) -> Self {
        Self::UnsafeBackupLocation {
            backup_dir: backup_dir.into(),
            project_root: project_root.into(),
        }
    }

    /// Build a [`VigilError::PartialRollback`].
    pub fn partial_rollback(affected_paths: Vec<String>) -> Self {
        Self::PartialRollback { affected_paths }
    }

    /// Build a [`VigilError::ValidationFailed`].
    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }
}

impl From<io::Error> for VigilError {
    fn from(err: io::Error) -> Self {
        Self::Io {
            message: "I/O operation failed".to_string(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for VigilError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: format!("JSON error: {err}"),
        }
    }
}

impl From<serde_yaml::Error> for VigilError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: format!("YAML error: {err}"),
        }
    }
}

impl From<git2::Error> for VigilError {
    fn from(err: git2::Error) -> Self {
        Self::StorageError {
            message: format!("git error: {err}"),
            source: None,
        }
    }
}

/// Adds ad-hoc string context to a `Result`'s error, the way `anyhow`
/// contexts work, without giving up the concrete [`VigilError`] type.
pub trait ResultExt<T> {
    /// Add context computed lazily (only on the error path).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;

    /// Add static context.
    fn context(self, msg: &'static str) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<VigilError>,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let context = f();
            match e.into() {
                VigilError::Internal { message } => VigilError::Internal {
                    message: format!("{context}: {message}"),
                },
                other => VigilError::Internal {
                    message: format!("{context}: {other}"),
                },
            }
        })
    }

    fn context(self, msg: &'static str) -> Result<T> {
        self.with_context(|| msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_violation_reports_both_paths() {
        let err = VigilError::boundary_violation("../etc/passwd", "/proj");
        let msg = err.to_string();
        assert!(msg.contains("../etc/passwd"));
        assert!(msg.contains("/proj"));
    }

    #[test]
    fn context_wraps_message() {
        let result: std::result::Result<(), io::Error> =
            Err(io::Error::new(io::ErrorKind::NotFound, "missing"));
        let wrapped = result.context("loading config");
        assert!(wrapped.unwrap_err().to_string().contains("loading config"));
    }
}
