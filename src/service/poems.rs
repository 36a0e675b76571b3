use std::sync::Arc;

use serde_json::{Value, json};

use crate::config::TableNames;
use crate::error::ServiceError;
use crate::fallback;
use crate::gateway::{Direction, Gateway, Query, Sourced};
use crate::model::Poem;

use super::settle;

/// Poem listings, lookups and recommendations.
#[derive(Clone)]
pub struct PoemService {
    gateway: Arc<dyn Gateway>,
    tables: Arc<TableNames>,
}

impl PoemService {
    pub fn new(gateway: Arc<dyn Gateway>, tables: Arc<TableNames>) -> Self {
        Self { gateway, tables }
    }

    /// Newest poems first, `limit` rows starting at `offset`.
    pub async fn list(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Sourced<Vec<Poem>>, ServiceError> {
        let query = Query::new()
            .columns(self.tables.poem_columns())
            .order("created_at", Direction::Desc)
            .range(offset, limit);
        let result = self
            .gateway
            .select(&self.tables.poems, &query)
            .await
            .map(Value::Array);
        settle("poems.list", result, || {
            fallback::poems(offset.saturating_add(limit))
                .into_iter()
                .skip(offset)
                .collect()
        })
    }

    /// One poem with its poet, annotations, imagery and media.
    pub async fn get(&self, id: i64) -> Result<Sourced<Poem>, ServiceError> {
        let result = self
            .gateway
            .select_one(&self.tables.poems, id, &self.tables.poem_detail_columns())
            .await;
        settle("poems.get", result, || fallback::poem_by_id(id))
    }

    pub async fn by_poet(
        &self,
        poet_id: i64,
        limit: usize,
    ) -> Result<Sourced<Vec<Poem>>, ServiceError> {
        let query = Query::new()
            .columns(self.tables.poem_columns())
            .eq("poet_id", poet_id)
            .order("id", Direction::Asc)
            .limit(limit);
        let result = self
            .gateway
            .select(&self.tables.poems, &query)
            .await
            .map(Value::Array);
        settle("poems.by_poet", result, || {
            fallback::poems_by_poet(poet_id, limit)
        })
    }

    pub async fn by_dynasty(
        &self,
        dynasty: &str,
        limit: usize,
    ) -> Result<Sourced<Vec<Poem>>, ServiceError> {
        let query = Query::new()
            .columns(self.tables.poem_columns())
            .eq("dynasty", dynasty)
            .order("id", Direction::Asc)
            .limit(limit);
        let result = self
            .gateway
            .select(&self.tables.poems, &query)
            .await
            .map(Value::Array);
        settle("poems.by_dynasty", result, || {
            fallback::poems_by_dynasty(dynasty, limit)
        })
    }

    /// Server-side popularity ranking.
    pub async fn popular(&self, limit: usize) -> Result<Sourced<Vec<Poem>>, ServiceError> {
        let result = self
            .gateway
            .rpc("get_popular_poems", json!({ "limit_count": limit }))
            .await;
        settle("poems.popular", result, || fallback::popular_poems(limit))
    }

    /// Server-side recommendations for poems similar to `poem_id`.
    pub async fn related(
        &self,
        poem_id: i64,
        limit: usize,
    ) -> Result<Sourced<Vec<Poem>>, ServiceError> {
        let result = self
            .gateway
            .rpc(
                "get_related_poems",
                json!({ "poem_id": poem_id, "limit_count": limit }),
            )
            .await;
        settle("poems.related", result, || {
            fallback::related_poems(poem_id, limit)
        })
    }
}
