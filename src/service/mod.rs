//! Domain services, one per entity family.
//!
//! Read operations return [`Sourced`] results: live rows when the gateway
//! answers, fallback data when it fails with a fallback-eligible kind.
//! Telemetry operations never fail.

pub mod behavior;
pub mod interpret;
pub mod poems;
pub mod poets;
pub mod search;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{GatewayError, ServiceError};
use crate::gateway::Sourced;

pub use behavior::BehaviorService;
pub use interpret::InterpretationService;
pub use poems::PoemService;
pub use poets::PoetService;
pub use search::SearchService;

/// Decode a live gateway answer into `T`, or substitute `fallback()`.
pub(crate) fn settle<T: DeserializeOwned>(
    op: &str,
    result: Result<Value, GatewayError>,
    fallback: impl FnOnce() -> T,
) -> Result<Sourced<T>, ServiceError> {
    let decoded = match result {
        Ok(value) => Ok(serde_json::from_value::<T>(value)?),
        Err(e) => Err(e),
    };

    match Sourced::settle(decoded, fallback) {
        Ok(sourced) => {
            if let Sourced::Fallback { reason, .. } = &sourced {
                info!(op, ?reason, "serving fallback data");
            }
            Ok(sourced)
        }
        Err(e) => {
            warn!(op, kind = ?e.kind, detail = %e.detail, "gateway call failed");
            Err(e.into())
        }
    }
}
