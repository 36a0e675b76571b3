use std::sync::Arc;

use serde_json::Value;

use crate::config::TableNames;
use crate::error::ServiceError;
use crate::fallback;
use crate::gateway::{Direction, Gateway, Query, Sourced};
use crate::model::Poet;

use super::settle;

#[derive(Clone)]
pub struct PoetService {
    gateway: Arc<dyn Gateway>,
    tables: Arc<TableNames>,
}

impl PoetService {
    pub fn new(gateway: Arc<dyn Gateway>, tables: Arc<TableNames>) -> Self {
        Self { gateway, tables }
    }

    /// Poets ordered by name.
    pub async fn list(&self, limit: usize) -> Result<Sourced<Vec<Poet>>, ServiceError> {
        let query = Query::new().order("name", Direction::Asc).limit(limit);
        let result = self
            .gateway
            .select(&self.tables.poets, &query)
            .await
            .map(Value::Array);
        settle("poets.list", result, || fallback::poets(limit))
    }

    /// One poet with their works embedded.
    pub async fn get(&self, id: i64) -> Result<Sourced<Poet>, ServiceError> {
        let result = self
            .gateway
            .select_one(&self.tables.poets, id, &self.tables.poet_detail_columns())
            .await;
        settle("poets.get", result, || fallback::poet_by_id(id))
    }

    pub async fn by_dynasty(&self, dynasty: &str) -> Result<Sourced<Vec<Poet>>, ServiceError> {
        let query = Query::new()
            .eq("dynasty", dynasty)
            .order("id", Direction::Asc);
        let result = self
            .gateway
            .select(&self.tables.poets, &query)
            .await
            .map(Value::Array);
        settle("poets.by_dynasty", result, || {
            fallback::poets_by_dynasty(dynasty)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayErrorKind;
    use crate::gateway::StubGateway;
    use serde_json::json;

    fn service(gateway: StubGateway) -> PoetService {
        PoetService::new(Arc::new(gateway), Arc::new(TableNames::default()))
    }

    #[tokio::test]
    async fn test_list_live() {
        let service = service(StubGateway::default().with(
            "poets",
            json!([{"id": 9, "name": "苏轼", "dynasty": "宋", "biography": "东坡居士"}]),
        ));
        let poets = service.list(50).await.unwrap();
        assert!(!poets.is_fallback());
        assert_eq!(poets.data()[0].name, "苏轼");
    }

    #[tokio::test]
    async fn test_get_live_embeds_poems() {
        let service = service(StubGateway::default().with(
            "poets",
            json!([{
                "id": 9,
                "name": "苏轼",
                "dynasty": "宋",
                "poems": [{"id": 40, "title": "水调歌头·明月几时有", "content": "明月几时有"}]
            }]),
        ));
        let poet = service.get(9).await.unwrap().into_data();
        assert_eq!(poet.poems.len(), 1);
        assert_eq!(poet.poems[0].id, 40);
    }

    #[tokio::test]
    async fn test_relation_missing_falls_back() {
        let service = service(StubGateway::failing(GatewayErrorKind::RelationMissing));

        let list = service.list(2).await.unwrap();
        assert!(list.is_fallback());
        assert_eq!(list.data().len(), 2);

        let poet = service.get(3).await.unwrap();
        assert!(poet.is_fallback());
        assert_eq!(poet.data().name, "孟浩然");
        assert_eq!(poet.data().poems[0].title, "春晓");

        let tang = service.by_dynasty("唐").await.unwrap();
        assert!(tang.is_fallback());
        assert_eq!(tang.data().len(), 5);
    }

    #[tokio::test]
    async fn test_unknown_error_propagates() {
        let service = service(StubGateway::failing(GatewayErrorKind::Unknown));
        assert!(service.list(10).await.is_err());
        assert!(service.by_dynasty("唐").await.is_err());
    }
}
