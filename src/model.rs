//! Plain records exchanged with the hosted store and the local state file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Author shown when a poem carries no poet relation.
pub const UNKNOWN_AUTHOR: &str = "未知";

/// Poet fields embedded inside a poem row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoetSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub dynasty: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poem {
    pub id: i64,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poet_id: Option<i64>,
    /// Embedded poet relation. Live rows name it after the `poets` table.
    #[serde(default, alias = "poets", skip_serializing_if = "Option::is_none")]
    pub poet: Option<PoetSummary>,
    #[serde(default)]
    pub dynasty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popularity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Related rows embedded on detail lookups, passed through untouched.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imagery: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub multimedia_assets: Vec<Value>,
}

impl Poem {
    pub fn author(&self) -> &str {
        self.poet
            .as_ref()
            .map(|p| p.name.as_str())
            .unwrap_or(UNKNOWN_AUTHOR)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poet {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub dynasty: String,
    #[serde(default, alias = "description")]
    pub biography: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub death_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub works_count: Option<u32>,
    /// Embedded works, present on detail lookups only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub poems: Vec<Poem>,
}

/// One row of `user_reading_behavior`. Written, never read back.
#[derive(Debug, Clone, Serialize)]
pub struct ReadingBehaviorRecord {
    pub user_id: Option<String>,
    pub poem_id: i64,
    pub read_duration: u32,
    pub read_at: DateTime<Utc>,
}

/// Reading history item as persisted in local state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn for_poem(poem: &Poem, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: poem.id,
            title: poem.title.clone(),
            author: poem.author().to_string(),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_live_row_with_embedded_poets() {
        let row = json!({
            "id": 7,
            "title": "望岳",
            "content": "岱宗夫如何？",
            "poet_id": 2,
            "poets": {"id": 2, "name": "杜甫", "dynasty": "唐", "biography": "诗圣"},
            "dynasty": "唐",
            "theme": "山水",
            "created_at": "2023-01-03T00:00:00Z"
        });
        let poem: Poem = serde_json::from_value(row).unwrap();
        assert_eq!(poem.poet_id, Some(2));
        assert_eq!(poem.author(), "杜甫");
        assert!(poem.tags.is_empty());
        assert!(poem.created_at.is_some());
        assert!(poem.annotations.is_empty());
    }

    #[test]
    fn test_detail_row_keeps_embedded_relations() {
        let row = json!({
            "id": 1,
            "title": "静夜思",
            "content": "床前明月光",
            "poet": {"name": "李白"},
            "annotations": [{"id": 10, "word": "床", "note": "井栏"}],
            "imagery": [],
            "multimedia_assets": []
        });
        let poem: Poem = serde_json::from_value(row).unwrap();
        assert_eq!(poem.annotations.len(), 1);
        assert_eq!(poem.annotations[0]["note"], "井栏");
    }

    #[test]
    fn test_poem_without_poet_has_unknown_author() {
        let poem: Poem =
            serde_json::from_value(json!({"id": 1, "title": "t", "content": "c"})).unwrap();
        assert_eq!(poem.author(), UNKNOWN_AUTHOR);
        assert_eq!(poem.dynasty, "");
    }

    #[test]
    fn test_poet_accepts_description_column() {
        let poet: Poet = serde_json::from_value(json!({
            "id": 4,
            "name": "苏轼",
            "dynasty": "宋",
            "description": "唐宋八大家之一",
            "birth_year": 1037,
            "death_year": 1101
        }))
        .unwrap();
        assert_eq!(poet.biography, "唐宋八大家之一");
        assert_eq!(poet.death_year, Some(1101));
        assert!(poet.poems.is_empty());
    }

    #[test]
    fn test_history_entry_from_poem() {
        let poem: Poem = serde_json::from_value(json!({
            "id": 2,
            "title": "春晓",
            "content": "春眠不觉晓",
            "poet": {"name": "孟浩然", "dynasty": "唐"}
        }))
        .unwrap();
        let now = Utc::now();
        let entry = HistoryEntry::for_poem(&poem, now);
        assert_eq!(entry.id, 2);
        assert_eq!(entry.author, "孟浩然");
        assert_eq!(entry.timestamp, now);
    }
}
