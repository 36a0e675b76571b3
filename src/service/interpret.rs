//! AI interpretation of poems.
//!
//! This module provides a generic [`Interpreter`] trait for producing
//! readings of a poem, along with:
//!
//! - [`CannedInterpreter`]: a local implementation returning templated
//!   analyses, used until a real analysis workflow is wired in
//! - [`InterpretationService`]: the service that fronts an interpreter with
//!   the `ai_interpretation_cache` table
//!
//! Cache failures are logged and never fail an interpretation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::TableNames;
use crate::error::ServiceError;
use crate::fallback;
use crate::gateway::{Gateway, Query};

// ============================================================================
// Types
// ============================================================================

/// Angle from which a poem is analysed.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    schemars::JsonSchema,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    Sentiment,
    Artistic,
    Historical,
    #[default]
    Comprehensive,
}

impl AnalysisType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sentiment => "sentiment",
            Self::Artistic => "artistic",
            Self::Historical => "historical",
            Self::Comprehensive => "comprehensive",
        }
    }

    /// Reader-facing label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Sentiment => "情感表达",
            Self::Artistic => "艺术手法",
            Self::Historical => "历史背景",
            Self::Comprehensive => "综合赏析",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub poem_id: Option<i64>,
    pub poem_title: Option<String>,
    pub poem_content: Option<String>,
    pub analysis_type: AnalysisType,
    pub user_question: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedPoem {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interpretation {
    pub analysis: String,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub related_poems: Vec<RelatedPoem>,
}

/// Errors raised by an [`Interpreter`].
#[derive(Debug, Error)]
pub enum InterpreterError {
    #[error("interpreter unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// Interpreter Trait
// ============================================================================

/// Produces readings of poems and answers questions about them.
#[async_trait]
pub trait Interpreter: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<Interpretation, InterpreterError>;

    /// Answer a free-form question, optionally about a given poem or text.
    async fn ask(
        &self,
        question: &str,
        context: Option<&str>,
    ) -> Result<Interpretation, InterpreterError>;

    async fn related(&self, poem_id: i64, limit: usize)
    -> Result<Vec<RelatedPoem>, InterpreterError>;
}

// ============================================================================
// Canned Implementation
// ============================================================================

/// Templated interpreter backed by the sample dataset.
#[derive(Debug, Clone, Copy, Default)]
pub struct CannedInterpreter;

impl CannedInterpreter {
    fn related_from_samples(poem_id: i64, limit: usize) -> Vec<RelatedPoem> {
        fallback::related_poems(poem_id, limit)
            .into_iter()
            .enumerate()
            .map(|(rank, poem)| RelatedPoem {
                id: poem.id,
                author: poem.author().to_string(),
                title: poem.title,
                similarity: 0.91 - 0.06 * rank as f64,
            })
            .collect()
    }
}

#[async_trait]
impl Interpreter for CannedInterpreter {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<Interpretation, InterpreterError> {
        let title = match request.poem_title.as_deref() {
            Some(title) => format!("《{title}》"),
            None => "诗词".to_string(),
        };
        let mut analysis = format!(
            "这首{title}通过{}展现了深厚的艺术造诣。",
            request.analysis_type.label()
        );
        if let Some(question) = request.user_question.as_deref() {
            analysis.push_str(&format!("关于“{question}”，可从意象与情感两方面入手。"));
        }

        Ok(Interpretation {
            analysis,
            insights: vec![
                "运用了生动的意象描写".into(),
                "情感表达真挚动人".into(),
                "语言简洁而意境深远".into(),
            ],
            recommendations: vec![
                "建议结合历史背景深入理解".into(),
                "可以对比同类型诗词进行学习".into(),
                "尝试从多个角度赏析".into(),
            ],
            related_poems: Self::related_from_samples(request.poem_id.unwrap_or_default(), 3),
        })
    }

    async fn ask(
        &self,
        question: &str,
        context: Option<&str>,
    ) -> Result<Interpretation, InterpreterError> {
        let subject = context.map(|c| format!("《{c}》")).unwrap_or_else(|| "这首诗词".into());
        Ok(Interpretation {
            analysis: format!("关于“{question}”的问题，{subject}主要表达了……"),
            insights: vec![
                "可以从意象分析入手".into(),
                "关注诗人的情感表达".into(),
                "结合创作背景理解".into(),
            ],
            recommendations: vec![
                "建议阅读相关赏析文章".into(),
                "可以对比其他诗人的类似作品".into(),
            ],
            related_poems: Vec::new(),
        })
    }

    async fn related(
        &self,
        poem_id: i64,
        limit: usize,
    ) -> Result<Vec<RelatedPoem>, InterpreterError> {
        Ok(Self::related_from_samples(poem_id, limit))
    }
}

// ============================================================================
// Service
// ============================================================================

/// Cached row in the interpretation table.
#[derive(Debug, Deserialize)]
struct CachedInterpretation {
    id: i64,
    result: Interpretation,
}

#[derive(Clone)]
pub struct InterpretationService {
    gateway: Arc<dyn Gateway>,
    tables: Arc<TableNames>,
    interpreter: Arc<dyn Interpreter>,
}

impl InterpretationService {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        tables: Arc<TableNames>,
        interpreter: Arc<dyn Interpreter>,
    ) -> Self {
        Self {
            gateway,
            tables,
            interpreter,
        }
    }

    /// Interpret a poem, serving a cached reading when one exists.
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<Interpretation, ServiceError> {
        let Some(poem_id) = request.poem_id else {
            return self.compute(request).await;
        };

        if let Some(cached) = self.cached(poem_id, request.analysis_type).await {
            debug!(poem_id, "interpretation cache hit");
            return Ok(cached.result);
        }

        let fresh = self.compute(request).await?;
        self.store(poem_id, request.analysis_type, &fresh, None).await;
        Ok(fresh)
    }

    /// Recompute an interpretation and overwrite any cached copy.
    pub async fn refresh(&self, request: &AnalysisRequest) -> Result<Interpretation, ServiceError> {
        let fresh = self.compute(request).await?;
        if let Some(poem_id) = request.poem_id {
            let existing = self.cached(poem_id, request.analysis_type).await;
            self.store(
                poem_id,
                request.analysis_type,
                &fresh,
                existing.map(|c| c.id),
            )
            .await;
        }
        Ok(fresh)
    }

    /// Drop the cached reading for a poem. Returns whether a row was removed.
    pub async fn evict(&self, poem_id: i64, analysis_type: AnalysisType) -> bool {
        let Some(cached) = self.cached(poem_id, analysis_type).await else {
            return false;
        };
        match self
            .gateway
            .delete(&self.tables.ai_interpretation, cached.id)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(poem_id, kind = ?e.kind, "failed to evict interpretation: {}", e.detail);
                false
            }
        }
    }

    pub async fn ask(
        &self,
        question: &str,
        context: Option<&str>,
    ) -> Result<Interpretation, ServiceError> {
        self.interpreter
            .ask(question, context)
            .await
            .map_err(|e| ServiceError::Interpretation(e.to_string()))
    }

    pub async fn related(&self, poem_id: i64, limit: usize) -> Result<Vec<RelatedPoem>, ServiceError> {
        self.interpreter
            .related(poem_id, limit)
            .await
            .map_err(|e| ServiceError::Interpretation(e.to_string()))
    }

    async fn compute(&self, request: &AnalysisRequest) -> Result<Interpretation, ServiceError> {
        self.interpreter
            .analyze(request)
            .await
            .map_err(|e| ServiceError::Interpretation(e.to_string()))
    }

    async fn cached(
        &self,
        poem_id: i64,
        analysis_type: AnalysisType,
    ) -> Option<CachedInterpretation> {
        let query = Query::new()
            .eq("poem_id", poem_id)
            .eq("analysis_type", analysis_type.as_str())
            .limit(1);
        match self
            .gateway
            .select(&self.tables.ai_interpretation, &query)
            .await
        {
            Ok(rows) => {
                let row = rows.into_iter().next()?;
                serde_json::from_value(row)
                    .map_err(|e| warn!(poem_id, "ignoring malformed cached interpretation: {e}"))
                    .ok()
            }
            Err(e) => {
                debug!(poem_id, kind = ?e.kind, "interpretation cache unavailable");
                None
            }
        }
    }

    async fn store(
        &self,
        poem_id: i64,
        analysis_type: AnalysisType,
        interpretation: &Interpretation,
        existing_id: Option<i64>,
    ) {
        let result = match serde_json::to_value(interpretation) {
            Ok(value) => value,
            Err(e) => {
                warn!(poem_id, "failed to encode interpretation: {e}");
                return;
            }
        };
        let table = &self.tables.ai_interpretation;
        let now = Utc::now().to_rfc3339();

        let outcome = match existing_id {
            Some(id) => {
                self.gateway
                    .update(table, id, json!({ "result": result, "updated_at": now }))
                    .await
            }
            None => {
                self.gateway
                    .insert(
                        table,
                        json!({
                            "poem_id": poem_id,
                            "analysis_type": analysis_type.as_str(),
                            "result": result,
                            "created_at": now,
                        }),
                    )
                    .await
            }
        };

        if let Err(e) = outcome {
            warn!(poem_id, kind = ?e.kind, "failed to cache interpretation: {}", e.detail);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayErrorKind;
    use crate::gateway::StubGateway;

    /// Interpreter that always fails.
    struct BrokenInterpreter;

    #[async_trait]
    impl Interpreter for BrokenInterpreter {
        async fn analyze(&self, _: &AnalysisRequest) -> Result<Interpretation, InterpreterError> {
            Err(InterpreterError::Unavailable("workflow offline".into()))
        }

        async fn ask(&self, _: &str, _: Option<&str>) -> Result<Interpretation, InterpreterError> {
            Err(InterpreterError::Unavailable("workflow offline".into()))
        }

        async fn related(&self, _: i64, _: usize) -> Result<Vec<RelatedPoem>, InterpreterError> {
            Err(InterpreterError::Unavailable("workflow offline".into()))
        }
    }

    fn service(gateway: StubGateway) -> (InterpretationService, Arc<StubGateway>) {
        let gateway = Arc::new(gateway);
        let service = InterpretationService::new(
            gateway.clone(),
            Arc::new(TableNames::default()),
            Arc::new(CannedInterpreter),
        );
        (service, gateway)
    }

    fn request(poem_id: Option<i64>) -> AnalysisRequest {
        AnalysisRequest {
            poem_id,
            poem_title: Some("静夜思".into()),
            analysis_type: AnalysisType::Sentiment,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_canned_analysis_mentions_title_and_angle() {
        let interpretation = CannedInterpreter.analyze(&request(Some(1))).await.unwrap();
        assert!(interpretation.analysis.contains("静夜思"));
        assert!(interpretation.analysis.contains("情感表达"));
        assert_eq!(interpretation.insights.len(), 3);
        assert!(interpretation.related_poems.iter().all(|p| p.id != 1));
    }

    #[tokio::test]
    async fn test_canned_related_similarity_descends() {
        let related = CannedInterpreter.related(2, 4).await.unwrap();
        assert_eq!(related.len(), 4);
        assert!(related.windows(2).all(|w| w[0].similarity > w[1].similarity));
    }

    #[tokio::test]
    async fn test_analyze_miss_computes_and_caches() {
        let (service, gateway) =
            service(StubGateway::default().with("ai_interpretation_cache", json!([])));
        let interpretation = service.analyze(&request(Some(1))).await.unwrap();
        assert!(interpretation.analysis.contains("静夜思"));

        let writes = gateway.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, "insert");
        assert_eq!(writes[0].2["analysis_type"], "sentiment");
        assert_eq!(writes[0].2["poem_id"], 1);
    }

    #[tokio::test]
    async fn test_analyze_hit_returns_cached() {
        let cached = json!([{
            "id": 77,
            "poem_id": 1,
            "analysis_type": "sentiment",
            "result": {"analysis": "缓存的赏析", "insights": ["月"]}
        }]);
        let (service, gateway) =
            service(StubGateway::default().with("ai_interpretation_cache", cached));
        let interpretation = service.analyze(&request(Some(1))).await.unwrap();
        assert_eq!(interpretation.analysis, "缓存的赏析");
        assert!(gateway.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_updates_existing_row() {
        let cached = json!([{"id": 77, "result": {"analysis": "旧"}}]);
        let (service, gateway) =
            service(StubGateway::default().with("ai_interpretation_cache", cached));
        let fresh = service.refresh(&request(Some(1))).await.unwrap();
        assert_ne!(fresh.analysis, "旧");

        let writes = gateway.writes.lock().unwrap();
        assert_eq!(writes[0].0, "update");
        assert_eq!(writes[0].2["id"], 77);
    }

    #[tokio::test]
    async fn test_evict_deletes_cached_row() {
        let cached = json!([{"id": 77, "result": {"analysis": "旧"}}]);
        let (hit, gateway) =
            service(StubGateway::default().with("ai_interpretation_cache", cached));
        assert!(hit.evict(1, AnalysisType::Sentiment).await);
        assert_eq!(gateway.writes.lock().unwrap()[0].0, "delete");

        let (miss, _) =
            service(StubGateway::default().with("ai_interpretation_cache", json!([])));
        assert!(!miss.evict(1, AnalysisType::Sentiment).await);
    }

    #[tokio::test]
    async fn test_cache_failures_never_fail_analysis() {
        let (service, _) = service(StubGateway::failing(GatewayErrorKind::PermissionDenied));
        let interpretation = service.analyze(&request(Some(1))).await.unwrap();
        assert!(!interpretation.analysis.is_empty());
    }

    #[tokio::test]
    async fn test_without_poem_id_skips_cache() {
        let (service, gateway) = service(StubGateway::default());
        service.analyze(&request(None)).await.unwrap();
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn test_interpreter_failure_surfaces() {
        let service = InterpretationService::new(
            Arc::new(StubGateway::default()),
            Arc::new(TableNames::default()),
            Arc::new(BrokenInterpreter),
        );
        let err = service.analyze(&request(None)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Interpretation(_)));
        assert!(service.ask("何为意境", None).await.is_err());
        assert!(service.related(1, 3).await.is_err());
    }

    #[tokio::test]
    async fn test_ask_uses_context() {
        let (service, _) = service(StubGateway::default());
        let answer = service.ask("表达了什么情感", Some("静夜思")).await.unwrap();
        assert!(answer.analysis.contains("《静夜思》"));
        assert!(answer.analysis.contains("表达了什么情感"));
    }
}
