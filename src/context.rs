//! Application context: one gateway and the services built on it.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::{BackendConfig, TableNames};
use crate::error::GatewayErrorKind;
use crate::gateway::{Gateway, OfflineGateway, Query, RestGateway};
use crate::service::interpret::{CannedInterpreter, Interpreter};
use crate::service::{
    BehaviorService, InterpretationService, PoemService, PoetService, SearchService,
};

/// Result of a backend connectivity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendStatus {
    pub configured: bool,
    pub connected: bool,
    pub tables_exist: bool,
    pub error: Option<String>,
}

/// Shared handles to every domain service.
///
/// Built once by each binary and passed down; services are cheap to clone.
#[derive(Clone)]
pub struct AppContext {
    pub tables: Arc<TableNames>,
    pub gateway: Arc<dyn Gateway>,
    pub poems: PoemService,
    pub poets: PoetService,
    pub search: SearchService,
    pub behavior: BehaviorService,
    pub interpretation: InterpretationService,
    configured: bool,
}

impl AppContext {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        tables: TableNames,
        interpreter: Arc<dyn Interpreter>,
    ) -> Self {
        let tables = Arc::new(tables);
        Self {
            poems: PoemService::new(gateway.clone(), tables.clone()),
            poets: PoetService::new(gateway.clone(), tables.clone()),
            search: SearchService::new(gateway.clone(), tables.clone()),
            behavior: BehaviorService::new(gateway.clone(), tables.clone()),
            interpretation: InterpretationService::new(
                gateway.clone(),
                tables.clone(),
                interpreter,
            ),
            tables,
            gateway,
            configured: true,
        }
    }

    /// Connect to the configured backend, or run offline on placeholders.
    pub fn from_config(config: &BackendConfig) -> Self {
        if !config.is_configured() {
            warn!("backend not configured (SUPABASE_URL / SUPABASE_ANON_KEY), serving sample data");
            return Self::offline_with(config.tables.clone());
        }
        info!(url = %config.url, "using hosted backend");
        Self::new(
            Arc::new(RestGateway::new(config)),
            config.tables.clone(),
            Arc::new(CannedInterpreter),
        )
    }

    /// Context whose every read is served from the sample dataset.
    pub fn offline() -> Self {
        Self::offline_with(TableNames::default())
    }

    fn offline_with(tables: TableNames) -> Self {
        let mut ctx = Self::new(Arc::new(OfflineGateway), tables, Arc::new(CannedInterpreter));
        ctx.configured = false;
        ctx
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    /// Probe the poems table with a one-row select.
    pub async fn backend_status(&self) -> BackendStatus {
        if !self.configured {
            return BackendStatus {
                configured: false,
                connected: false,
                tables_exist: false,
                error: Some("backend not configured".to_string()),
            };
        }

        let query = Query::new().columns("id").limit(1);
        match self.gateway.select(&self.tables.poems, &query).await {
            Ok(_) => BackendStatus {
                configured: true,
                connected: true,
                tables_exist: true,
                error: None,
            },
            Err(e) => {
                let (connected, tables_exist) = match e.kind {
                    GatewayErrorKind::RelationMissing => (true, false),
                    GatewayErrorKind::Unreachable => (false, false),
                    _ => (true, true),
                };
                BackendStatus {
                    configured: true,
                    connected,
                    tables_exist,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
