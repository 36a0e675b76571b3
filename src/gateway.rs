//! Gateway abstraction over the hosted table/row store.
//!
//! [`RestGateway`] speaks the PostgREST dialect exposed by the hosted
//! database. [`OfflineGateway`] stands in when no backend is configured and
//! reports every table as missing, which routes all reads to the fallback
//! dataset.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::BackendConfig;
use crate::error::{GatewayError, GatewayErrorKind};

// ============================================================================
// Query Specification
// ============================================================================

/// Sort direction for [`Query::order`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Filter, ordering and pagination for a `select`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    columns: Option<String>,
    eq: Vec<(String, String)>,
    any_ilike: Option<(Vec<String>, String)>,
    order: Option<(String, Direction)>,
    offset: Option<usize>,
    limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Columns to return, including embedded relations like `poets(*)`.
    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = Some(columns.into());
        self
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl ToString) -> Self {
        self.eq.push((column.into(), value.to_string()));
        self
    }

    /// Case-insensitive substring match on any of `columns`.
    pub fn any_contains(mut self, columns: &[&str], needle: impl Into<String>) -> Self {
        self.any_ilike = Some((
            columns.iter().map(|c| c.to_string()).collect(),
            needle.into(),
        ));
        self
    }

    pub fn order(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order = Some((column.into(), direction));
        self
    }

    /// Rows `offset..offset + limit`.
    pub fn range(mut self, offset: usize, limit: usize) -> Self {
        self.offset = Some(offset);
        self.limit = Some(limit);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Render as PostgREST query-string pairs.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![(
            "select".to_string(),
            self.columns.clone().unwrap_or_else(|| "*".to_string()),
        )];

        for (column, value) in &self.eq {
            params.push((column.clone(), format!("eq.{value}")));
        }

        if let Some((columns, needle)) = &self.any_ilike {
            let pattern = quote_value(&format!("*{}*", escape_like(needle)));
            let alternatives: Vec<String> = columns
                .iter()
                .map(|c| format!("{c}.ilike.{pattern}"))
                .collect();
            params.push(("or".to_string(), format!("({})", alternatives.join(","))));
        }

        if let Some((column, direction)) = &self.order {
            let dir = match direction {
                Direction::Asc => "asc",
                Direction::Desc => "desc",
            };
            params.push(("order".to_string(), format!("{column}.{dir}")));
        }

        if let Some(offset) = self.offset {
            params.push(("offset".to_string(), offset.to_string()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }

        params
    }
}

/// Double-quote a filter value so reserved characters (`,` `(` `)`) survive
/// inside an `or=(...)` list.
/// Make `needle` match literally inside an `ilike` pattern.
///
/// `%`, `_` and `\` are backslash-escaped. PostgREST turns every `*` into
/// `%` with no escape, so a literal `*` is sent as the one-character wildcard
/// `_` and callers narrow the rows themselves.
pub fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for c in needle.chars() {
        match c {
            '\\' | '%' | '_' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '*' => escaped.push('_'),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn quote_value(raw: &str) -> String {
    let escaped = raw.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

// ============================================================================
// Gateway Trait
// ============================================================================

/// Remote CRUD/RPC surface used by the domain services.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, GatewayError>;

    /// Fetch exactly one row by `id`. Zero rows is [`GatewayErrorKind::NotFound`].
    async fn select_one(&self, table: &str, id: i64, columns: &str)
    -> Result<Value, GatewayError>;

    async fn insert(&self, table: &str, row: Value) -> Result<(), GatewayError>;

    async fn update(&self, table: &str, id: i64, patch: Value) -> Result<(), GatewayError>;

    async fn delete(&self, table: &str, id: i64) -> Result<(), GatewayError>;

    /// Invoke a server-side stored procedure.
    async fn rpc(&self, function: &str, args: Value) -> Result<Value, GatewayError>;
}

// ============================================================================
// Data Source Tag
// ============================================================================

/// Where a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Live,
    Fallback,
}

/// A read result tagged with its origin.
#[derive(Debug, Clone, PartialEq)]
pub enum Sourced<T> {
    Live(T),
    Fallback { data: T, reason: GatewayErrorKind },
}

impl<T> Sourced<T> {
    /// Decide between live data and a fallback from a gateway outcome.
    ///
    /// Fallback-eligible kinds yield `fallback()`; every other kind is
    /// returned unchanged as the error.
    pub fn settle(
        result: Result<T, GatewayError>,
        fallback: impl FnOnce() -> T,
    ) -> Result<Self, GatewayError> {
        match result {
            Ok(data) => Ok(Self::Live(data)),
            Err(e) if e.kind.is_fallback_eligible() => {
                debug!(kind = ?e.kind, detail = %e.detail, "substituting fallback data");
                Ok(Self::Fallback {
                    data: fallback(),
                    reason: e.kind,
                })
            }
            Err(e) => Err(e),
        }
    }

    pub fn source(&self) -> DataSource {
        match self {
            Self::Live(_) => DataSource::Live,
            Self::Fallback { .. } => DataSource::Fallback,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }

    pub fn data(&self) -> &T {
        match self {
            Self::Live(data) | Self::Fallback { data, .. } => data,
        }
    }

    pub fn into_data(self) -> T {
        match self {
            Self::Live(data) | Self::Fallback { data, .. } => data,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Sourced<U> {
        match self {
            Self::Live(data) => Sourced::Live(f(data)),
            Self::Fallback { data, reason } => Sourced::Fallback {
                data: f(data),
                reason,
            },
        }
    }
}

// ============================================================================
// PostgREST Implementation
// ============================================================================

/// Gateway backed by the hosted store's REST endpoint.
pub struct RestGateway {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

/// Error body returned by PostgREST.
#[derive(Debug, Deserialize)]
struct PostgrestError {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

impl RestGateway {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            base_url: config.url.clone(),
            api_key: config.api_key().to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    /// Send a request and return the body of a successful response.
    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<String, GatewayError> {
        let response = builder.send().await.map_err(transport_err)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_err)?;

        if status.is_success() {
            return Ok(body);
        }

        let parsed: Option<PostgrestError> = serde_json::from_str(&body).ok();
        let (code, detail) = match parsed {
            Some(err) => {
                let detail = [err.message, err.details, err.hint]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join("; ");
                (err.code, detail)
            }
            None => (None, body),
        };
        let kind = GatewayErrorKind::from_backend(code.as_deref(), Some(status.as_u16()));
        debug!(%status, ?code, ?kind, "backend request failed");
        Err(GatewayError::new(kind, format!("HTTP {status}: {detail}")))
    }

    async fn send_json(&self, builder: reqwest::RequestBuilder) -> Result<Value, GatewayError> {
        let body = self.send(builder).await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| {
            GatewayError::new(GatewayErrorKind::Unknown, format!("Invalid JSON body: {e}"))
        })
    }
}

#[async_trait]
impl Gateway for RestGateway {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, GatewayError> {
        let builder = self
            .request(reqwest::Method::GET, self.table_url(table))
            .query(&query.to_params());
        match self.send_json(builder).await? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            other => Ok(vec![other]),
        }
    }

    async fn select_one(
        &self,
        table: &str,
        id: i64,
        columns: &str,
    ) -> Result<Value, GatewayError> {
        let builder = self
            .request(reqwest::Method::GET, self.table_url(table))
            .header("Accept", "application/vnd.pgrst.object+json")
            .query(&[("select", columns.to_string()), ("id", format!("eq.{id}"))]);
        self.send_json(builder).await
    }

    async fn insert(&self, table: &str, row: Value) -> Result<(), GatewayError> {
        let builder = self
            .request(reqwest::Method::POST, self.table_url(table))
            .header("Prefer", "return=minimal")
            .json(&Value::Array(vec![row]));
        self.send(builder).await.map(|_| ())
    }

    async fn update(&self, table: &str, id: i64, patch: Value) -> Result<(), GatewayError> {
        let builder = self
            .request(reqwest::Method::PATCH, self.table_url(table))
            .header("Prefer", "return=minimal")
            .query(&[("id", format!("eq.{id}"))])
            .json(&patch);
        self.send(builder).await.map(|_| ())
    }

    async fn delete(&self, table: &str, id: i64) -> Result<(), GatewayError> {
        let builder = self
            .request(reqwest::Method::DELETE, self.table_url(table))
            .query(&[("id", format!("eq.{id}"))]);
        self.send(builder).await.map(|_| ())
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value, GatewayError> {
        let url = format!("{}/rest/v1/rpc/{function}", self.base_url);
        let builder = self.request(reqwest::Method::POST, url).json(&args);
        self.send_json(builder).await
    }
}

fn transport_err(err: reqwest::Error) -> GatewayError {
    let kind = if err.is_connect() || err.is_timeout() {
        GatewayErrorKind::Unreachable
    } else {
        GatewayErrorKind::Unknown
    };
    GatewayError::new(kind, err.to_string())
}

// ============================================================================
// Offline Implementation
// ============================================================================

/// Gateway used when no backend is configured.
pub struct OfflineGateway;

impl OfflineGateway {
    fn missing(what: &str) -> GatewayError {
        GatewayError::new(
            GatewayErrorKind::RelationMissing,
            format!("no backend configured for '{what}'"),
        )
    }
}

#[async_trait]
impl Gateway for OfflineGateway {
    async fn select(&self, table: &str, _query: &Query) -> Result<Vec<Value>, GatewayError> {
        Err(Self::missing(table))
    }

    async fn select_one(
        &self,
        table: &str,
        _id: i64,
        _columns: &str,
    ) -> Result<Value, GatewayError> {
        Err(Self::missing(table))
    }

    async fn insert(&self, table: &str, _row: Value) -> Result<(), GatewayError> {
        Err(Self::missing(table))
    }

    async fn update(&self, table: &str, _id: i64, _patch: Value) -> Result<(), GatewayError> {
        Err(Self::missing(table))
    }

    async fn delete(&self, table: &str, _id: i64) -> Result<(), GatewayError> {
        Err(Self::missing(table))
    }

    async fn rpc(&self, function: &str, _args: Value) -> Result<Value, GatewayError> {
        Err(Self::missing(function))
    }
}

// ============================================================================
// Stub Implementation (Test Only)
// ============================================================================

/// Scripted gateway for unit tests.
///
/// Reads answer from `rows` keyed by table or function name; a configured
/// `failure` makes every call fail with that kind. Writes are recorded.
#[cfg(test)]
#[derive(Default)]
pub struct StubGateway {
    pub rows: std::collections::HashMap<String, Value>,
    pub failure: Option<GatewayErrorKind>,
    pub calls: std::sync::Mutex<Vec<String>>,
    pub writes: std::sync::Mutex<Vec<(String, String, Value)>>,
}

#[cfg(test)]
impl StubGateway {
    pub fn failing(kind: GatewayErrorKind) -> Self {
        Self {
            failure: Some(kind),
            ..Default::default()
        }
    }

    pub fn with(mut self, name: &str, value: Value) -> Self {
        self.rows.insert(name.to_string(), value);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn answer(&self, call: String, name: &str) -> Result<Value, GatewayError> {
        self.calls.lock().unwrap().push(call);
        if let Some(kind) = self.failure {
            return Err(GatewayError::new(kind, "stubbed failure"));
        }
        self.rows
            .get(name)
            .cloned()
            .ok_or_else(|| GatewayError::new(GatewayErrorKind::NotFound, name.to_string()))
    }

    fn record(&self, op: &str, table: &str, value: Value) -> Result<(), GatewayError> {
        self.calls.lock().unwrap().push(format!("{op} {table}"));
        if let Some(kind) = self.failure {
            return Err(GatewayError::new(kind, "stubbed failure"));
        }
        self.writes
            .lock()
            .unwrap()
            .push((op.to_string(), table.to_string(), value));
        Ok(())
    }
}

#[cfg(test)]
#[async_trait]
impl Gateway for StubGateway {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, GatewayError> {
        let value = self.answer(format!("select {table} {:?}", query.to_params()), table)?;
        Ok(value.as_array().cloned().unwrap_or_default())
    }

    async fn select_one(
        &self,
        table: &str,
        id: i64,
        _columns: &str,
    ) -> Result<Value, GatewayError> {
        let value = self.answer(format!("select_one {table} {id}"), table)?;
        value
            .as_array()
            .and_then(|rows| rows.iter().find(|r| r["id"] == id).cloned())
            .ok_or_else(|| GatewayError::new(GatewayErrorKind::NotFound, format!("{table}/{id}")))
    }

    async fn insert(&self, table: &str, row: Value) -> Result<(), GatewayError> {
        self.record("insert", table, row)
    }

    async fn update(&self, table: &str, id: i64, patch: Value) -> Result<(), GatewayError> {
        self.record("update", table, serde_json::json!({"id": id, "patch": patch}))
    }

    async fn delete(&self, table: &str, id: i64) -> Result<(), GatewayError> {
        self.record("delete", table, serde_json::json!({"id": id}))
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value, GatewayError> {
        self.answer(format!("rpc {function} {args}"), function)
    }
}

// ============================================================================
// Tests
// ============================================================================
