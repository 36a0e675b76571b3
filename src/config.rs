//! Backend connection settings resolved from the environment.

/// Placeholder used when `SUPABASE_URL` is not set.
pub const PLACEHOLDER_URL: &str = "https://your-project.supabase.co";
/// Placeholder used when `SUPABASE_ANON_KEY` is not set.
pub const PLACEHOLDER_ANON_KEY: &str = "your-anon-key";
/// Placeholder used when `SUPABASE_SERVICE_KEY` is not set.
pub const PLACEHOLDER_SERVICE_KEY: &str = "your-service-key";

/// Remote table names, each overridable by an environment variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub poems: String,
    pub poets: String,
    pub annotations: String,
    pub imagery: String,
    pub historical_events: String,
    pub knowledge_graph: String,
    pub user_behavior: String,
    pub ai_interpretation: String,
    pub multimedia: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl TableNames {
    /// Build table names from a variable lookup, defaulting to the literal names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let table = |var: &str, default: &str| {
            lookup(var)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        Self {
            poems: table("POEMS_TABLE", "poems"),
            poets: table("POETS_TABLE", "poets"),
            annotations: table("ANNOTATIONS_TABLE", "annotations"),
            imagery: table("IMAGERY_TABLE", "imagery"),
            historical_events: table("HISTORICAL_EVENTS_TABLE", "historical_events"),
            knowledge_graph: table("KNOWLEDGE_GRAPH_TABLE", "knowledge_graph_relations"),
            user_behavior: table("USER_BEHAVIOR_TABLE", "user_reading_behavior"),
            ai_interpretation: table("AI_INTERPRETATION_TABLE", "ai_interpretation_cache"),
            multimedia: table("MULTIMEDIA_TABLE", "multimedia_assets"),
        }
    }

    /// Column list for poem listings, embedding the poet as `poet`.
    pub fn poem_columns(&self) -> String {
        format!("*,poet:{}(*)", self.poets)
    }

    /// Column list for a poem detail lookup with its embedded relations.
    ///
    /// Relations are aliased so overridden table names keep stable keys.
    pub fn poem_detail_columns(&self) -> String {
        format!(
            "*,poet:{}(*),annotations:{}(*),imagery:{}(*),multimedia_assets:{}(*)",
            self.poets, self.annotations, self.imagery, self.multimedia
        )
    }

    /// Column list for a poet detail lookup, embedding their works as `poems`.
    pub fn poet_detail_columns(&self) -> String {
        format!("*,poems:{}(*)", self.poems)
    }
}

/// Connection settings for the hosted store.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub url: String,
    pub anon_key: String,
    pub service_key: Option<String>,
    pub tables: TableNames,
}

impl BackendConfig {
    /// Read settings from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read settings through an arbitrary lookup; missing values fall back to
    /// the documented placeholders.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let url = lookup("SUPABASE_URL").unwrap_or_else(|| PLACEHOLDER_URL.to_string());
        let anon_key =
            lookup("SUPABASE_ANON_KEY").unwrap_or_else(|| PLACEHOLDER_ANON_KEY.to_string());
        let service_key = lookup("SUPABASE_SERVICE_KEY")
            .filter(|k| !k.is_empty() && k != PLACEHOLDER_SERVICE_KEY);

        Self {
            url: url.trim_end_matches('/').to_string(),
            anon_key,
            service_key,
            tables: TableNames::from_lookup(&lookup),
        }
    }

    /// False while the URL or the public key is still a placeholder.
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty()
            && self.url != PLACEHOLDER_URL
            && !self.anon_key.is_empty()
            && self.anon_key != PLACEHOLDER_ANON_KEY
    }

    /// Key sent with requests: the service-role key when present.
    pub fn api_key(&self) -> &str {
        self.service_key.as_deref().unwrap_or(&self.anon_key)
    }
}
