use rmcp::handler::server::{router::tool::ToolRouter, wrapper::Parameters};
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};
use rmcp::{ErrorData, ServerHandler, tool, tool_handler, tool_router};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::context::AppContext;
use crate::error::ServiceError;
use crate::gateway::Sourced;
use crate::service::behavior::DEFAULT_READ_SECONDS;
use crate::service::interpret::{AnalysisRequest, AnalysisType};

const DEFAULT_LIST_LIMIT: usize = 50;
const DEFAULT_SEARCH_LIMIT: usize = 20;
const DEFAULT_POPULAR_LIMIT: usize = 10;
const DEFAULT_RELATED_LIMIT: usize = 5;

// ---------------------------------------------------------------------------
// Parameter structs
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize, rmcp::schemars::JsonSchema)]
pub struct ListParams {
    #[schemars(description = "Maximum number of results (default: 50)")]
    pub limit: Option<usize>,
    #[schemars(description = "Number of results to skip (default: 0)")]
    pub offset: Option<usize>,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct IdParams {
    #[schemars(description = "Numeric id of the record")]
    pub id: i64,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct SearchParams {
    #[schemars(description = "Substring to look for, e.g. '春' or '明月'. Case-insensitive.")]
    pub query: String,
    #[schemars(description = "Maximum number of results (default: 20)")]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct RelatedParams {
    #[schemars(description = "Poem to find related works for")]
    pub poem_id: i64,
    #[schemars(description = "Maximum number of results (default: 5)")]
    pub limit: Option<usize>,
    #[schemars(description = "Return similarity-scored matches from the interpreter instead of full poems")]
    pub scored: Option<bool>,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct PoetWorksParams {
    #[schemars(description = "Poet whose works to list")]
    pub poet_id: i64,
    #[schemars(description = "Maximum number of results (default: 20)")]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct DynastyParams {
    #[schemars(description = "Dynasty name as stored, e.g. '唐' or '宋'")]
    pub dynasty: String,
    #[schemars(description = "Maximum number of results (default: 50)")]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct PoetStatsParams {
    pub poet_id: i64,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct TrackReadingParams {
    pub poem_id: i64,
    #[schemars(description = "Optional reader identifier")]
    pub user_id: Option<String>,
    #[schemars(description = "Seconds spent reading (default: 60)")]
    pub duration: Option<u32>,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct InterpretParams {
    #[schemars(description = "Poem to interpret. Enables the interpretation cache.")]
    pub poem_id: Option<i64>,
    pub title: Option<String>,
    pub content: Option<String>,
    #[schemars(
        description = "One of 'sentiment', 'artistic', 'historical', 'comprehensive' (default)"
    )]
    pub analysis_type: Option<AnalysisType>,
    #[schemars(description = "Optional question to address in the analysis")]
    pub question: Option<String>,
    #[schemars(description = "Recompute and overwrite any cached interpretation")]
    pub refresh: Option<bool>,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct AskParams {
    pub question: String,
    #[schemars(description = "Optional poem title or text the question is about")]
    pub context: Option<String>,
}

// ---------------------------------------------------------------------------
// MCP Server
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PoetryServer {
    ctx: AppContext,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl PoetryServer {
    pub fn new(ctx: AppContext) -> Self {
        Self {
            ctx,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "List poems, newest first.")]
    async fn poem_list(
        &self,
        Parameters(p): Parameters<ListParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let poems = self
            .ctx
            .poems
            .list(p.limit.unwrap_or(DEFAULT_LIST_LIMIT), p.offset.unwrap_or(0))
            .await
            .map_err(mcp_service_err)?;
        sourced_result(poems)
    }

    #[tool(
        description = "Get one poem with its poet, annotations, imagery and media. Unknown ids return the first sample poem tagged as fallback."
    )]
    async fn poem_get(
        &self,
        Parameters(p): Parameters<IdParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let poem = self.ctx.poems.get(p.id).await.map_err(mcp_service_err)?;
        sourced_result(poem)
    }

    #[tool(description = "Search poems whose title or text contains the query.")]
    async fn poem_search(
        &self,
        Parameters(p): Parameters<SearchParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let poems = self
            .ctx
            .search
            .search_poems(&p.query, p.limit.unwrap_or(DEFAULT_SEARCH_LIMIT))
            .await
            .map_err(mcp_service_err)?;
        sourced_result(poems)
    }

    #[tool(description = "Most-read poems.")]
    async fn poem_popular(
        &self,
        Parameters(p): Parameters<ListParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let poems = self
            .ctx
            .poems
            .popular(p.limit.unwrap_or(DEFAULT_POPULAR_LIMIT))
            .await
            .map_err(mcp_service_err)?;
        sourced_result(poems)
    }

    #[tool(description = "Poems similar to the given poem.")]
    async fn poem_related(
        &self,
        Parameters(p): Parameters<RelatedParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let limit = p.limit.unwrap_or(DEFAULT_RELATED_LIMIT);
        if p.scored.unwrap_or(false) {
            let related = self
                .ctx
                .interpretation
                .related(p.poem_id, limit)
                .await
                .map_err(mcp_service_err)?;
            return json_result(&json!({ "data": related }));
        }

        let poems = self
            .ctx
            .poems
            .related(p.poem_id, limit)
            .await
            .map_err(mcp_service_err)?;
        sourced_result(poems)
    }

    #[tool(description = "Works of one poet.")]
    async fn poems_by_poet(
        &self,
        Parameters(p): Parameters<PoetWorksParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let poems = self
            .ctx
            .poems
            .by_poet(p.poet_id, p.limit.unwrap_or(DEFAULT_SEARCH_LIMIT))
            .await
            .map_err(mcp_service_err)?;
        sourced_result(poems)
    }

    #[tool(description = "Poems written in one dynasty.")]
    async fn poems_by_dynasty(
        &self,
        Parameters(p): Parameters<DynastyParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let poems = self
            .ctx
            .poems
            .by_dynasty(&p.dynasty, p.limit.unwrap_or(DEFAULT_LIST_LIMIT))
            .await
            .map_err(mcp_service_err)?;
        sourced_result(poems)
    }

    #[tool(description = "List poets by name.")]
    async fn poet_list(
        &self,
        Parameters(p): Parameters<ListParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let poets = self
            .ctx
            .poets
            .list(p.limit.unwrap_or(DEFAULT_LIST_LIMIT))
            .await
            .map_err(mcp_service_err)?;
        sourced_result(poets)
    }

    #[tool(description = "Get one poet with their works.")]
    async fn poet_get(
        &self,
        Parameters(p): Parameters<IdParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let poet = self.ctx.poets.get(p.id).await.map_err(mcp_service_err)?;
        sourced_result(poet)
    }

    #[tool(description = "Poets of one dynasty.")]
    async fn poets_by_dynasty(
        &self,
        Parameters(p): Parameters<DynastyParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let poets = self
            .ctx
            .poets
            .by_dynasty(&p.dynasty)
            .await
            .map_err(mcp_service_err)?;
        sourced_result(poets.map(|mut poets| {
            if let Some(limit) = p.limit {
                poets.truncate(limit);
            }
            poets
        }))
    }

    #[tool(description = "Search poets whose name or biography contains the query.")]
    async fn poet_search(
        &self,
        Parameters(p): Parameters<SearchParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let poets = self
            .ctx
            .search
            .search_poets(&p.query, p.limit.unwrap_or(DEFAULT_SEARCH_LIMIT))
            .await
            .map_err(mcp_service_err)?;
        sourced_result(poets)
    }

    #[tool(description = "Per-dynasty poem statistics. Empty when unavailable.")]
    async fn dynasty_stats(&self) -> Result<CallToolResult, ErrorData> {
        let stats = self.ctx.behavior.dynasty_statistics().await;
        json_result(&json!({ "data": stats }))
    }

    #[tool(description = "Statistics for one poet. Null when unavailable.")]
    async fn poet_stats(
        &self,
        Parameters(p): Parameters<PoetStatsParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let stats = self.ctx.behavior.poet_statistics(p.poet_id).await;
        json_result(&json!({ "data": stats }))
    }

    #[tool(description = "Record that a poem was read. Never fails.")]
    async fn track_reading(
        &self,
        Parameters(p): Parameters<TrackReadingParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let duration = p.duration.unwrap_or(DEFAULT_READ_SECONDS);
        self.ctx
            .behavior
            .track_reading(p.poem_id, p.user_id, duration)
            .await;
        Ok(CallToolResult::success(vec![Content::text(format!(
            "Tracked reading of poem {} ({duration}s)",
            p.poem_id
        ))]))
    }

    #[tool(
        description = "Interpret a poem from a sentiment, artistic, historical or comprehensive angle. Give 'poem_id' to use the interpretation cache, or 'title'/'content' for ad-hoc text."
    )]
    async fn poem_interpret(
        &self,
        Parameters(p): Parameters<InterpretParams>,
    ) -> Result<CallToolResult, ErrorData> {
        if p.poem_id.is_none() && p.title.is_none() && p.content.is_none() {
            return Err(ErrorData::invalid_params(
                "One of 'poem_id', 'title' or 'content' must be provided.",
                None,
            ));
        }

        let request = AnalysisRequest {
            poem_id: p.poem_id,
            poem_title: p.title,
            poem_content: p.content,
            analysis_type: p.analysis_type.unwrap_or_default(),
            user_question: p.question,
        };
        let service = &self.ctx.interpretation;
        let interpretation = if p.refresh.unwrap_or(false) {
            service.refresh(&request).await
        } else {
            service.analyze(&request).await
        }
        .map_err(mcp_service_err)?;

        json_result(&json!({ "data": interpretation }))
    }

    #[tool(description = "Ask a free-form question about classical poetry.")]
    async fn poetry_ask(
        &self,
        Parameters(p): Parameters<AskParams>,
    ) -> Result<CallToolResult, ErrorData> {
        if p.question.trim().is_empty() {
            return Err(ErrorData::invalid_params("'question' must not be empty.", None));
        }
        let answer = self
            .ctx
            .interpretation
            .ask(&p.question, p.context.as_deref())
            .await
            .map_err(mcp_service_err)?;
        json_result(&json!({ "data": answer }))
    }

    #[tool(description = "Report whether the hosted backend is configured, reachable and migrated.")]
    async fn backend_status(&self) -> Result<CallToolResult, ErrorData> {
        let status = self.ctx.backend_status().await;
        json_result(&status)
    }
}

#[tool_handler]
impl ServerHandler for PoetryServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Classical Chinese poetry library. Browse with 'poem_list'/'poet_list', \
                 look up with 'poem_get'/'poet_get', search with 'poem_search'/'poet_search', \
                 and read interpretations with 'poem_interpret' or 'poetry_ask'. Results carry \
                 a 'source' of 'live' or 'fallback' (built-in sample data)."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Result helpers
// ---------------------------------------------------------------------------

/// Render a tagged read as `{"source": .., "data": ..}`.
fn sourced_result<T: Serialize>(sourced: Sourced<T>) -> Result<CallToolResult, ErrorData> {
    let mut body = json!({
        "source": sourced.source(),
        "data": sourced.data(),
    });
    if let Sourced::Fallback { reason, .. } = &sourced {
        body["reason"] = json!(reason);
    }
    json_result(&body)
}

fn json_result<T: Serialize + ?Sized>(value: &T) -> Result<CallToolResult, ErrorData> {
    let text = serde_json::to_string_pretty(value).map_err(|e| {
        ErrorData::internal_error(format!("JSON serialization error: {e}"), None)
    })?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

fn mcp_service_err(err: ServiceError) -> ErrorData {
    ErrorData::internal_error(err.to_string(), None)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::TableNames;
    use serde_json::Value;
    use crate::error::GatewayErrorKind;
    use crate::gateway::StubGateway;
    use crate::service::interpret::CannedInterpreter;

    fn setup_server(gateway: StubGateway) -> (PoetryServer, Arc<StubGateway>) {
        let gateway = Arc::new(gateway);
        let ctx = AppContext::new(
            gateway.clone(),
            TableNames::default(),
            Arc::new(CannedInterpreter),
        );
        (PoetryServer::new(ctx), gateway)
    }

    fn offline_server() -> PoetryServer {
        setup_server(StubGateway::failing(GatewayErrorKind::RelationMissing)).0
    }

    fn body(result: CallToolResult) -> Value {
        let text = &result.content[0].raw.as_text().unwrap().text;
        serde_json::from_str(text).unwrap()
    }

    #[tokio::test]
    async fn test_poem_list_tags_fallback() {
        let server = offline_server();
        let result = server
            .poem_list(Parameters(ListParams {
                limit: Some(2),
                offset: None,
            }))
            .await
            .unwrap();

        let listed = body(result);
        assert_eq!(listed["source"], "fallback");
        assert_eq!(listed["reason"], "relation_missing");
        assert_eq!(listed["data"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_poem_list_tags_live() {
        let (server, _) = setup_server(StubGateway::default().with(
            "poems",
            json!([{"id": 30, "title": "题西林壁", "content": "横看成岭侧成峰"}]),
        ));
        let listed = body(server.poem_list(Parameters(ListParams::default())).await.unwrap());
        assert_eq!(listed["source"], "live");
        assert!(listed.get("reason").is_none());
        assert_eq!(listed["data"][0]["title"], "题西林壁");
    }

    #[tokio::test]
    async fn test_poem_search_spring() {
        let server = offline_server();
        let result = server
            .poem_search(Parameters(SearchParams {
                query: "春".into(),
                limit: None,
            }))
            .await
            .unwrap();
        let found = body(result);
        assert_eq!(found["data"].as_array().unwrap().len(), 1);
        assert_eq!(found["data"][0]["title"], "春晓");
    }

    #[tokio::test]
    async fn test_poet_get_embeds_works() {
        let server = offline_server();
        let poet = body(server.poet_get(Parameters(IdParams { id: 1 })).await.unwrap());
        assert_eq!(poet["data"]["name"], "李白");
        assert_eq!(poet["data"]["poems"][0]["title"], "静夜思");
    }

    #[tokio::test]
    async fn test_permission_denied_is_tool_error() {
        let (server, _) = setup_server(StubGateway::failing(GatewayErrorKind::PermissionDenied));
        let err = server
            .poem_get(Parameters(IdParams { id: 1 }))
            .await
            .unwrap_err();
        assert!(err.message.contains("Permission denied"));
    }

    #[tokio::test]
    async fn test_stats_degrade_to_empty() {
        let server = offline_server();
        let dynasties = body(server.dynasty_stats().await.unwrap());
        assert_eq!(dynasties["data"], json!([]));

        let poet = server
            .poet_stats(Parameters(PoetStatsParams { poet_id: 1 }))
            .await
            .unwrap();
        assert!(body(poet)["data"].is_null());
    }

    #[tokio::test]
    async fn test_track_reading_defaults_duration() {
        let (server, gateway) = setup_server(StubGateway::default());
        server
            .track_reading(Parameters(TrackReadingParams {
                poem_id: 3,
                user_id: None,
                duration: None,
            }))
            .await
            .unwrap();
        let writes = gateway.writes.lock().unwrap();
        assert_eq!(writes[0].2["read_duration"], 60);
    }

    #[tokio::test]
    async fn test_poem_interpret_requires_subject() {
        let server = offline_server();
        let err = server
            .poem_interpret(Parameters(InterpretParams {
                poem_id: None,
                title: None,
                content: None,
                analysis_type: None,
                question: None,
                refresh: None,
            }))
            .await
            .unwrap_err();
        assert!(err.message.contains("poem_id"));
    }

    #[tokio::test]
    async fn test_poem_interpret_by_title() {
        let server = offline_server();
        let result = server
            .poem_interpret(Parameters(InterpretParams {
                poem_id: None,
                title: Some("江雪".into()),
                content: None,
                analysis_type: Some(AnalysisType::Artistic),
                question: None,
                refresh: None,
            }))
            .await
            .unwrap();
        let analysis = body(result)["data"]["analysis"].as_str().unwrap().to_string();
        assert!(analysis.contains("江雪"));
        assert!(analysis.contains("艺术手法"));
    }

    #[tokio::test]
    async fn test_poem_related_plain_and_scored() {
        let server = offline_server();
        let plain = body(
            server
                .poem_related(Parameters(RelatedParams {
                    poem_id: 1,
                    limit: Some(3),
                    scored: None,
                }))
                .await
                .unwrap(),
        );
        assert_eq!(plain["source"], "fallback");
        assert_eq!(plain["data"].as_array().unwrap().len(), 3);

        let scored = body(
            server
                .poem_related(Parameters(RelatedParams {
                    poem_id: 1,
                    limit: Some(3),
                    scored: Some(true),
                }))
                .await
                .unwrap(),
        );
        let matches = scored["data"].as_array().unwrap();
        assert_eq!(matches.len(), 3);
        assert!(matches.iter().all(|m| m["id"] != 1 && m["similarity"].is_f64()));
        assert!(scored.get("source").is_none());
    }

    #[tokio::test]
    async fn test_poetry_ask_rejects_blank_question() {
        let server = offline_server();
        let result = server
            .poetry_ask(Parameters(AskParams {
                question: "  ".into(),
                context: None,
            }))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_backend_status_reports_missing_tables() {
        let server = offline_server();
        let status = body(server.backend_status().await.unwrap());
        assert_eq!(status["connected"], true);
        assert_eq!(status["tables_exist"], false);
    }
}
