//! Shijing: classical poetry browsing, shared by the MCP server and the CLI.

pub mod config;
pub mod context;
pub mod error;
pub mod fallback;
pub mod gateway;
pub mod model;
pub mod routes;
pub mod server;
pub mod service;
pub mod state;
pub mod storage;

use std::path::PathBuf;

/// Resolve the local state file from env var or default location.
pub fn resolve_state_path() -> PathBuf {
    if let Ok(path) = std::env::var("SHIJING_STATE") {
        return PathBuf::from(path);
    }

    let data_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    data_dir.join("shijing").join("state.json")
}
