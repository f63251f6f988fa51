//! Error taxonomy for portunix
//!
//! Every variant carries the at-fault entity name and the
//! backend/runtime/protocol label, as §7 requires for user-visible
//! messages. [`Error::exit_code`] projects the taxonomy onto the CLI's
//! `{0,1,2}` exit codes; [`Error::mcp_code`] projects it onto the MCP/
//! plugin status codes used by the dispatcher and the plugin RPC contract.

use thiserror::Error;

/// Result type alias using the portunix [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Every error kind carries enough context to build a precise user-facing
/// message.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad CLI input or manifest. Exit 2, no side effects.
    #[error("{entity}: {message}")]
    Validation { entity: String, message: String },

    /// VM/plugin/tool missing. Exit 1; listings still succeed with the
    /// missing entity marked.
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    /// Operation illegal in the current state (e.g. snapshot revert on a
    /// running VM).
    #[error("{entity} is in state '{state}', which does not allow {operation}")]
    StateConflict {
        entity: String,
        state: String,
        operation: &'static str,
    },

    /// The OS refused access (privilege, driver group, …).
    #[error("permission denied for {entity} ({remediation})")]
    PermissionDenied { entity: String, remediation: String },

    /// A hypervisor/runtime is missing or broken.
    #[error("{backend} is unavailable: {diagnostic}")]
    BackendUnavailable { backend: String, diagnostic: String },

    /// A suspension point exceeded its deadline.
    #[error("{operation} on {entity} timed out after {secs}s")]
    Timeout {
        entity: String,
        operation: &'static str,
        secs: u64,
    },

    /// Filesystem or network failure. Partial writes are rolled back via
    /// temp-rename before this is returned.
    #[error("I/O error on {entity}: {source}")]
    Io {
        entity: String,
        #[source]
        source: std::io::Error,
    },

    /// Malformed MCP or plugin RPC frame.
    #[error("protocol error ({context}): {source}")]
    Protocol {
        context: String,
        #[source]
        source: portunix_protocol::ProtocolError,
    },

    /// Escape hatch for `std::io::Error` conversions where no entity
    /// context is available yet (e.g. deep inside a library call);
    /// prefer [`Error::Io`] at the call site that knows the entity name.
    #[error("I/O error: {0}")]
    Bare(#[from] std::io::Error),

    /// Serialization/deserialization of a descriptor or manifest failed.
    #[error("{entity}: {source}")]
    Serde {
        entity: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub fn validation(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            entity: entity.into(),
            message: message.into(),
        }
    }

    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn state_conflict(
        entity: impl Into<String>,
        state: impl Into<String>,
        operation: &'static str,
    ) -> Self {
        Error::StateConflict {
            entity: entity.into(),
            state: state.into(),
            operation,
        }
    }

    pub fn permission_denied(entity: impl Into<String>, remediation: impl Into<String>) -> Self {
        Error::PermissionDenied {
            entity: entity.into(),
            remediation: remediation.into(),
        }
    }

    pub fn backend_unavailable(backend: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        Error::BackendUnavailable {
            backend: backend.into(),
            diagnostic: diagnostic.into(),
        }
    }

    pub fn timeout(entity: impl Into<String>, operation: &'static str, secs: u64) -> Self {
        Error::Timeout {
            entity: entity.into(),
            operation,
            secs,
        }
    }

    pub fn io(entity: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            entity: entity.into(),
            source,
        }
    }

    /// Maps this error onto the CLI exit codes: `0` success (never
    /// constructed here), `1` operational failure, `2` usage/validation
    /// failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Validation { .. } => 2,
            _ => 1,
        }
    }

    /// Maps this error onto the plugin/MCP status codes in §4.3/§4.4.
    pub fn mcp_status(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "INVALID_ARGS",
            Error::NotFound { .. } => "NOT_FOUND",
            _ => "ERROR",
        }
    }
}
