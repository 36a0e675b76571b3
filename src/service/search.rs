use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::config::TableNames;
use crate::error::ServiceError;
use crate::fallback;
use crate::gateway::{Gateway, Query, Sourced};
use crate::model::{Poem, Poet};

use super::settle;

/// Substring search over poems and poets.
#[derive(Clone)]
pub struct SearchService {
    gateway: Arc<dyn Gateway>,
    tables: Arc<TableNames>,
}

impl SearchService {
    pub fn new(gateway: Arc<dyn Gateway>, tables: Arc<TableNames>) -> Self {
        Self { gateway, tables }
    }

    /// Poems whose title or body contains `query`, ignoring case.
    ///
    /// A blank query matches nothing and skips the round trip.
    pub async fn search_poems(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Sourced<Vec<Poem>>, ServiceError> {
        let needle = query.trim();
        if needle.is_empty() {
            debug!("blank poem search");
            return Ok(Sourced::Live(Vec::new()));
        }

        let columns = ["title", "content"];
        let filter = Query::new()
            .columns(self.tables.poem_columns())
            .any_contains(&columns, needle)
            .limit(limit);
        let result = self
            .gateway
            .select(&self.tables.poems, &filter)
            .await
            .map(|rows| Value::Array(narrow(rows, &columns, needle)));
        settle("search.poems", result, || {
            fallback::search_poems(needle, limit)
        })
    }

    /// Poets whose name or biography contains `query`, ignoring case.
    pub async fn search_poets(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Sourced<Vec<Poet>>, ServiceError> {
        let needle = query.trim();
        if needle.is_empty() {
            return Ok(Sourced::Live(Vec::new()));
        }

        let columns = ["name", "biography"];
        let filter = Query::new().any_contains(&columns, needle).limit(limit);
        let result = self
            .gateway
            .select(&self.tables.poets, &filter)
            .await
            .map(|rows| Value::Array(narrow(rows, &columns, needle)));
        settle("search.poets", result, || {
            fallback::search_poets(needle, limit)
        })
    }
}

/// Keep rows that literally contain `needle` when the pattern had to widen it.
fn narrow(rows: Vec<Value>, columns: &[&str], needle: &str) -> Vec<Value> {
    if !needle.contains('*') {
        return rows;
    }
    let needle = needle.to_lowercase();
    rows.into_iter()
        .filter(|row| {
            columns.iter().any(|column| {
                row[*column]
                    .as_str()
                    .is_some_and(|text| text.to_lowercase().contains(&needle))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayErrorKind;
    use crate::gateway::StubGateway;
    use serde_json::json;

    fn service(gateway: StubGateway) -> (SearchService, Arc<StubGateway>) {
        let gateway = Arc::new(gateway);
        (
            SearchService::new(gateway.clone(), Arc::new(TableNames::default())),
            gateway,
        )
    }

    #[tokio::test]
    async fn test_spring_against_fallback_set() {
        let (service, _) = service(StubGateway::failing(GatewayErrorKind::RelationMissing));
        let found = service.search_poems("春", 20).await.unwrap();
        assert!(found.is_fallback());
        let titles: Vec<&str> = found.data().iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["春晓"]);
    }

    #[tokio::test]
    async fn test_absent_substring_is_empty_fallback() {
        let (service, _) = service(StubGateway::failing(GatewayErrorKind::NotFound));
        let found = service.search_poems("蜀道", 20).await.unwrap();
        assert!(found.is_fallback());
        assert!(found.data().is_empty());
    }

    #[tokio::test]
    async fn test_fallback_matches_author() {
        let (service, _) = service(StubGateway::failing(GatewayErrorKind::Unreachable));
        let found = service.search_poems("  柳宗元 ", 20).await.unwrap();
        assert_eq!(found.data().len(), 1);
        assert_eq!(found.data()[0].title, "江雪");
    }

    #[tokio::test]
    async fn test_live_search_uses_or_filter() {
        let (service, gateway) = service(StubGateway::default().with(
            "poems",
            json!([{"id": 2, "title": "春晓", "content": "春眠不觉晓"}]),
        ));
        let found = service.search_poems("春", 5).await.unwrap();
        assert!(!found.is_fallback());
        assert_eq!(found.data().len(), 1);

        let calls = gateway.calls.lock().unwrap();
        assert!(calls[0].contains("title.ilike"));
        assert!(calls[0].contains("content.ilike"));
    }

    #[tokio::test]
    async fn test_star_matches_literally() {
        let (service, gateway) = service(StubGateway::default().with(
            "poems",
            json!([
                {"id": 1, "title": "静夜思", "content": "床前明月光"},
                {"id": 9, "title": "星*", "content": "一颗*星"}
            ]),
        ));
        let found = service.search_poems("*", 20).await.unwrap();
        let ids: Vec<i64> = found.data().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![9]);
        assert!(gateway.calls.lock().unwrap()[0].contains("*_*"));
    }

    #[tokio::test]
    async fn test_blank_query_skips_gateway() {
        let (service, gateway) = service(StubGateway::default());
        let found = service.search_poems("   ", 20).await.unwrap();
        assert!(found.data().is_empty());
        assert!(service.search_poets("", 20).await.unwrap().data().is_empty());
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn test_search_poets_fallback() {
        let (service, _) = service(StubGateway::failing(GatewayErrorKind::RelationMissing));
        let found = service.search_poets("诗仙", 20).await.unwrap();
        assert_eq!(found.data()[0].name, "李白");
    }

    #[tokio::test]
    async fn test_permission_denied_propagates() {
        let (service, _) = service(StubGateway::failing(GatewayErrorKind::PermissionDenied));
        assert!(service.search_poems("春", 20).await.is_err());
    }
}
