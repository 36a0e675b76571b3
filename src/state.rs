//! Client-side state container.
//!
//! [`PoemStore`] caches the last fetched listings, tracks favorites and the
//! reading/search histories, and persists the latter three through a
//! [`Storage`] implementation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{error, warn};

use crate::context::AppContext;
use crate::error::ServiceError;
use crate::gateway::{DataSource, Sourced};
use crate::model::{HistoryEntry, Poem, Poet};
use crate::service::behavior::DEFAULT_READ_SECONDS;
use crate::storage::{FAVORITES_KEY, HISTORY_KEY, SEARCH_HISTORY_KEY, Storage};

/// Maximum number of reading history entries kept.
pub const HISTORY_CAP: usize = 50;
/// Maximum number of search queries kept.
pub const SEARCH_HISTORY_CAP: usize = 20;

pub const DEFAULT_POEM_LIMIT: usize = 50;
pub const DEFAULT_POET_LIMIT: usize = 50;
pub const DEFAULT_SEARCH_LIMIT: usize = 20;
pub const DEFAULT_BY_POET_LIMIT: usize = 20;
pub const DEFAULT_POPULAR_LIMIT: usize = 10;

// ============================================================================
// List state
// ============================================================================

/// The last result of a listing operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListState<T> {
    pub items: Vec<T>,
    pub loading: bool,
    pub error: Option<String>,
    pub source: Option<DataSource>,
}

impl<T> Default for ListState<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            loading: false,
            error: None,
            source: None,
        }
    }
}

impl<T> ListState<T> {
    fn begin(&mut self) {
        self.loading = true;
        self.error = None;
    }

    /// Apply a service result. On error the previous items are kept.
    fn finish(&mut self, op: &str, result: Result<Sourced<Vec<T>>, ServiceError>) -> bool {
        self.loading = false;
        match result {
            Ok(sourced) => {
                self.source = Some(sourced.source());
                self.items = sourced.into_data();
                true
            }
            Err(e) => {
                error!(op, "{e}");
                self.error = Some(e.to_string());
                false
            }
        }
    }
}

// ============================================================================
// Store
// ============================================================================

pub struct PoemStore {
    ctx: AppContext,
    storage: Arc<dyn Storage>,
    pub poems: ListState<Poem>,
    pub poets: ListState<Poet>,
    pub current_poem: Option<Poem>,
    favorites: Vec<i64>,
    reading_history: Vec<HistoryEntry>,
    search_history: Vec<String>,
}

impl PoemStore {
    /// Build a store, loading favorites and histories from `storage`.
    pub fn new(ctx: AppContext, storage: Arc<dyn Storage>) -> Self {
        let favorites = load(storage.as_ref(), FAVORITES_KEY);
        let reading_history = load(storage.as_ref(), HISTORY_KEY);
        let search_history = load(storage.as_ref(), SEARCH_HISTORY_KEY);
        Self {
            ctx,
            storage,
            poems: ListState::default(),
            poets: ListState::default(),
            current_poem: None,
            favorites,
            reading_history,
            search_history,
        }
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    // ------------------------------------------------------------------------
    // Remote-backed operations
    // ------------------------------------------------------------------------

    pub async fn fetch_poems(&mut self, limit: usize, offset: usize) -> bool {
        self.poems.begin();
        let result = self.ctx.poems.list(limit, offset).await;
        self.poems.finish("fetch_poems", result)
    }

    /// Search poems, recording a non-blank query in the search history.
    pub async fn search_poems(&mut self, query: &str, limit: usize) -> bool {
        self.poems.begin();
        let result = self.ctx.search.search_poems(query, limit).await;
        let ok = self.poems.finish("search_poems", result);
        if ok {
            self.add_search_record(query);
        }
        ok
    }

    pub async fn fetch_poets(&mut self, limit: usize) -> bool {
        self.poets.begin();
        let result = self.ctx.poets.list(limit).await;
        self.poets.finish("fetch_poets", result)
    }

    pub async fn fetch_poems_by_poet(&mut self, poet_id: i64, limit: usize) -> bool {
        self.poems.begin();
        let result = self.ctx.poems.by_poet(poet_id, limit).await;
        self.poems.finish("fetch_poems_by_poet", result)
    }

    pub async fn fetch_popular_poems(&mut self, limit: usize) -> bool {
        self.poems.begin();
        let result = self.ctx.poems.popular(limit).await;
        self.poems.finish("fetch_popular_poems", result)
    }

    /// Load one poem into `current_poem`. Errors clear it and yield `None`.
    pub async fn fetch_poem_by_id(&mut self, id: i64) -> Option<&Poem> {
        self.current_poem = match self.ctx.poems.get(id).await {
            Ok(sourced) => Some(sourced.into_data()),
            Err(e) => {
                error!(id, "failed to load poem: {e}");
                None
            }
        };
        self.current_poem.as_ref()
    }

    /// Fetch the default poem and poet listings concurrently.
    pub async fn initialize(&mut self) {
        self.poems.begin();
        self.poets.begin();
        let (poems, poets) = tokio::join!(
            self.ctx.poems.list(DEFAULT_POEM_LIMIT, 0),
            self.ctx.poets.list(DEFAULT_POET_LIMIT),
        );
        self.poems.finish("initialize.poems", poems);
        self.poets.finish("initialize.poets", poets);
    }

    // ------------------------------------------------------------------------
    // Favorites
    // ------------------------------------------------------------------------

    pub fn favorites(&self) -> &[i64] {
        &self.favorites
    }

    pub fn is_favorite(&self, poem_id: i64) -> bool {
        self.favorites.contains(&poem_id)
    }

    /// Flip membership. Returns whether the poem is now a favorite.
    pub fn toggle_favorite(&mut self, poem_id: i64) -> bool {
        let now_favorite = match self.favorites.iter().position(|&id| id == poem_id) {
            Some(index) => {
                self.favorites.remove(index);
                false
            }
            None => {
                self.favorites.push(poem_id);
                true
            }
        };
        self.persist(FAVORITES_KEY, &self.favorites);
        now_favorite
    }

    pub fn add_favorite(&mut self, poem_id: i64) {
        if !self.is_favorite(poem_id) {
            self.favorites.push(poem_id);
            self.persist(FAVORITES_KEY, &self.favorites);
        }
    }

    pub fn remove_favorite(&mut self, poem_id: i64) {
        if let Some(index) = self.favorites.iter().position(|&id| id == poem_id) {
            self.favorites.remove(index);
            self.persist(FAVORITES_KEY, &self.favorites);
        }
    }

    /// Resolve every favorite id to its poem, in favorites order.
    ///
    /// Sample data only counts when it is the poem asked for; ids that are
    /// neither live nor in the sample set are skipped with a warning.
    pub async fn favorite_poems(&self) -> Vec<Poem> {
        let mut poems = Vec::with_capacity(self.favorites.len());
        for &id in &self.favorites {
            match self.ctx.poems.get(id).await {
                Ok(Sourced::Live(poem)) => poems.push(poem),
                Ok(Sourced::Fallback { data, .. }) if data.id == id => poems.push(data),
                Ok(Sourced::Fallback { .. }) => warn!(id, "favorite poem is unavailable"),
                Err(e) => warn!(id, "failed to load favorite poem: {e}"),
            }
        }
        poems
    }

    pub fn clear_favorites(&mut self) {
        self.favorites.clear();
        self.forget(FAVORITES_KEY);
    }

    // ------------------------------------------------------------------------
    // Reading history
    // ------------------------------------------------------------------------

    /// Reading history, newest first.
    pub fn history(&self) -> Vec<&HistoryEntry> {
        self.reading_history.iter().rev().collect()
    }

    /// Record a read of `poem`, then report it to the backend best-effort.
    pub async fn add_to_history(&mut self, poem: &Poem) {
        self.reading_history.retain(|entry| entry.id != poem.id);
        self.reading_history
            .push(HistoryEntry::for_poem(poem, Utc::now()));
        if self.reading_history.len() > HISTORY_CAP {
            let excess = self.reading_history.len() - HISTORY_CAP;
            self.reading_history.drain(..excess);
        }
        self.persist(HISTORY_KEY, &self.reading_history);

        self.ctx
            .behavior
            .track_reading(poem.id, None, DEFAULT_READ_SECONDS)
            .await;
    }

    /// Remove the entry recorded at `timestamp`. Returns whether one existed.
    pub fn remove_from_history(&mut self, timestamp: DateTime<Utc>) -> bool {
        let Some(index) = self
            .reading_history
            .iter()
            .position(|entry| entry.timestamp == timestamp)
        else {
            return false;
        };
        self.reading_history.remove(index);
        self.persist(HISTORY_KEY, &self.reading_history);
        true
    }

    pub fn clear_history(&mut self) {
        self.reading_history.clear();
        self.forget(HISTORY_KEY);
    }

    // ------------------------------------------------------------------------
    // Search history
    // ------------------------------------------------------------------------

    /// Search queries, newest first.
    pub fn search_records(&self) -> Vec<&str> {
        self.search_history.iter().rev().map(String::as_str).collect()
    }

    pub fn add_search_record(&mut self, query: &str) {
        if query.trim().is_empty() {
            return;
        }
        self.search_history.retain(|q| q != query);
        self.search_history.push(query.to_string());
        if self.search_history.len() > SEARCH_HISTORY_CAP {
            let excess = self.search_history.len() - SEARCH_HISTORY_CAP;
            self.search_history.drain(..excess);
        }
        self.persist(SEARCH_HISTORY_KEY, &self.search_history);
    }

    pub fn clear_search_history(&mut self) {
        self.search_history.clear();
        self.forget(SEARCH_HISTORY_KEY);
    }

    /// Clear favorites and both histories.
    pub fn clear_all(&mut self) {
        self.clear_favorites();
        self.clear_history();
        self.clear_search_history();
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    fn persist<T: Serialize>(&self, key: &str, value: &T) {
        let result = serde_json::to_string(value)
            .map_err(Into::into)
            .and_then(|json| self.storage.set(key, &json));
        if let Err(e) = result {
            warn!(key, "failed to persist local state: {e}");
        }
    }

    fn forget(&self, key: &str) {
        if let Err(e) = self.storage.remove(key) {
            warn!(key, "failed to clear local state: {e}");
        }
    }
}

/// Decode the list stored under `key`. A corrupt blob is dropped.
fn load<T: DeserializeOwned>(storage: &dyn Storage, key: &str) -> Vec<T> {
    let Some(raw) = storage.get(key) else {
        return Vec::new();
    };
    match serde_json::from_str(&raw) {
        Ok(items) => items,
        Err(e) => {
            warn!(key, "discarding corrupt local state: {e}");
            if let Err(e) = storage.remove(key) {
                warn!(key, "failed to remove corrupt local state: {e}");
            }
            Vec::new()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
