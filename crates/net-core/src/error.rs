//! Error types for network operations

use thiserror::Error;

/// Main error type for network operations
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("Conflict: {0}")]
    Conflict(#[from] ConflictError),

    #[error("Configuration store busy: lock on {document} not acquired within {waited_ms}ms")]
    LockTimeout { document: String, waited_ms: u64 },

    #[error("Kernel operation failed: {0}")]
    Kernel(#[from] KernelError),

    #[error("HA peer {peer} is unreachable")]
    PeerUnreachable { peer: String },

    #[error("HA peer {peer} rejected the request: {message}")]
    PeerRejected { peer: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl NetworkError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        NetworkError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn invalid(field: impl Into<String>, value: impl Into<String>) -> Self {
        NetworkError::Validation(ValidationError::InvalidValue {
            field: field.into(),
            value: value.into(),
        })
    }

    /// Errors the caller caused; retrying the same request cannot succeed.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            NetworkError::Validation(_) | NetworkError::NotFound { .. } | NetworkError::Conflict(_)
        )
    }
}

/// Malformed input or a violated structural invariant
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid interface name {name}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("{name} requires at least {required} members, got {actual}")]
    TooFewMembers {
        name: String,
        required: usize,
        actual: usize,
    },

    #[error("{name} is a {actual}, expected a {expected}")]
    WrongKind {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Unsupported request type {0}")]
    UnsupportedRequest(u8),
}

/// State held by someone else prevents the change
#[derive(Debug, Error)]
pub enum ConflictError {
    #[error("Name already in use: {name}")]
    NameInUse { name: String },

    #[error("{member} is already attached to {owner}")]
    MemberOwned { member: String, owner: String },

    #[error("{name} would be left with {remaining} members, at least {required} required")]
    MinimumMembers {
        name: String,
        required: usize,
        remaining: usize,
    },

    #[error("Members both added and removed: {}", .members.join(", "))]
    AddRemoveOverlap { members: Vec<String> },

    #[error("VLAN {vlan_id} already exists on {parent} as {existing}")]
    DuplicateVlan {
        parent: String,
        vlan_id: u16,
        existing: String,
    },

    #[error("Duplicate entry: {key}")]
    DuplicateKey { key: String },

    #[error("{name} is controlled by HA while HA is enabled")]
    HaOwned { name: String },

    #[error("Address {address} is already bound to {owner}")]
    AddressInUse { address: String, owner: String },

    #[error("{name} is in state {state}")]
    InvalidState { name: String, state: String },
}

/// A kernel mutation or query did not complete
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("Command `{command}` failed with exit code {exit_code:?}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Command `{command}` timed out after {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },

    #[error("Failed to spawn `{command}`: {message}")]
    Spawn { command: String, message: String },

    #[error("Unexpected kernel output: {message}")]
    Parse { message: String },

    #[error("{operation} on {link} failed: {message}")]
    Operation {
        operation: String,
        link: String,
        message: String,
    },
}
