//! Error types for the shijing crate.

use thiserror::Error;

/// Closed set of failure kinds produced by the gateway adapter.
///
/// Raw backend codes never leave the gateway; the service layer only ever
/// matches on this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayErrorKind {
    /// The requested row does not exist.
    NotFound,
    /// The table or function is absent from the remote schema.
    RelationMissing,
    /// The key in use is not allowed to perform the operation.
    PermissionDenied,
    /// The backend could not be reached at all.
    Unreachable,
    /// Anything else.
    Unknown,
}

impl GatewayErrorKind {
    /// Map a backend error code (and the HTTP status it came with) to a kind.
    pub fn from_backend(code: Option<&str>, status: Option<u16>) -> Self {
        match code {
            Some("PGRST116") => Self::NotFound,
            // Missing table, missing table in the schema cache, missing rpc function.
            Some("42P01") | Some("PGRST205") | Some("PGRST202") => Self::RelationMissing,
            Some("42501") => Self::PermissionDenied,
            Some(_) => Self::Unknown,
            None => match status {
                Some(401) | Some(403) => Self::PermissionDenied,
                Some(404) => Self::NotFound,
                _ => Self::Unknown,
            },
        }
    }

    /// Whether read paths substitute the fallback dataset for this kind.
    pub fn is_fallback_eligible(self) -> bool {
        matches!(
            self,
            Self::NotFound | Self::RelationMissing | Self::Unreachable
        )
    }
}

/// A failed gateway call.
#[derive(Debug, Clone, Error)]
#[error("{}", self.user_message())]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    /// Backend-provided detail, kept for logs.
    pub detail: String,
}

impl GatewayError {
    pub fn new(kind: GatewayErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Human-readable message suitable for a UI error flag.
    pub fn user_message(&self) -> String {
        match self.kind {
            GatewayErrorKind::NotFound => "Requested resource not found".to_string(),
            GatewayErrorKind::RelationMissing => {
                "Database table does not exist, check migrations".to_string()
            }
            GatewayErrorKind::PermissionDenied => "Permission denied".to_string(),
            GatewayErrorKind::Unreachable => format!("Backend unreachable: {}", self.detail),
            GatewayErrorKind::Unknown => self.detail.clone(),
        }
    }
}

/// Errors returned by domain service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The gateway failed with a kind that has no fallback.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// A live row did not match the expected domain shape.
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The interpreter could not produce a result.
    #[error("Interpretation unavailable: {0}")]
    Interpretation(String),
}

/// Errors from the local persisted-state store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}
