//! Static sample records served when the hosted store cannot answer.
//!
//! Every function rebuilds its result from the literal tables below; nothing
//! is cached and nothing is mutated.

use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;

use crate::model::{Poem, Poet, PoetSummary};

struct PoemSeed {
    id: i64,
    title: &'static str,
    content: &'static str,
    poet_id: i64,
    theme: &'static str,
    style: &'static str,
    tags: &'static [&'static str],
    popularity: u32,
    day: u32,
}

struct PoetSeed {
    id: i64,
    name: &'static str,
    dynasty: &'static str,
    biography: &'static str,
    birth_year: i32,
    death_year: i32,
    style: &'static str,
    works_count: u32,
}

const POEMS: &[PoemSeed] = &[
    PoemSeed {
        id: 1,
        title: "静夜思",
        content: "床前明月光，疑是地上霜。举头望明月，低头思故乡。",
        poet_id: 1,
        theme: "思乡",
        style: "五言绝句",
        tags: &["明月", "思乡"],
        popularity: 95,
        day: 1,
    },
    PoemSeed {
        id: 2,
        title: "春晓",
        content: "春眠不觉晓，处处闻啼鸟。夜来风雨声，花落知多少。",
        poet_id: 3,
        theme: "春天",
        style: "五言绝句",
        tags: &["春景", "田园"],
        popularity: 88,
        day: 2,
    },
    PoemSeed {
        id: 3,
        title: "登鹳雀楼",
        content: "白日依山尽，黄河入海流。欲穷千里目，更上一层楼。",
        poet_id: 4,
        theme: "登高",
        style: "五言绝句",
        tags: &["山水", "哲理"],
        popularity: 92,
        day: 3,
    },
    PoemSeed {
        id: 4,
        title: "江雪",
        content: "千山鸟飞绝，万径人踪灭。孤舟蓑笠翁，独钓寒江雪。",
        poet_id: 5,
        theme: "孤独",
        style: "五言绝句",
        tags: &["冬景", "隐逸"],
        popularity: 85,
        day: 4,
    },
    PoemSeed {
        id: 5,
        title: "望岳",
        content: "岱宗夫如何？齐鲁青未了。造化钟神秀，阴阳割昏晓。荡胸生曾云，决眦入归鸟。会当凌绝顶，一览众山小。",
        poet_id: 2,
        theme: "山水",
        style: "五言古诗",
        tags: &["泰山", "抱负"],
        popularity: 80,
        day: 5,
    },
];

const POETS: &[PoetSeed] = &[
    PoetSeed {
        id: 1,
        name: "李白",
        dynasty: "唐",
        biography: "唐代著名诗人，字太白，号青莲居士，有“诗仙”之称",
        birth_year: 701,
        death_year: 762,
        style: "浪漫主义",
        works_count: 1000,
    },
    PoetSeed {
        id: 2,
        name: "杜甫",
        dynasty: "唐",
        biography: "唐代著名诗人，字子美，自号少陵野老，有“诗圣”之称",
        birth_year: 712,
        death_year: 770,
        style: "现实主义",
        works_count: 1400,
    },
    PoetSeed {
        id: 3,
        name: "孟浩然",
        dynasty: "唐",
        biography: "唐代山水田园诗人代表",
        birth_year: 689,
        death_year: 740,
        style: "山水田园",
        works_count: 260,
    },
    PoetSeed {
        id: 4,
        name: "王之涣",
        dynasty: "唐",
        biography: "盛唐边塞诗人，以《登鹳雀楼》《凉州词》传世",
        birth_year: 688,
        death_year: 742,
        style: "边塞",
        works_count: 6,
    },
    PoetSeed {
        id: 5,
        name: "柳宗元",
        dynasty: "唐",
        biography: "唐代文学家，唐宋八大家之一",
        birth_year: 773,
        death_year: 819,
        style: "山水",
        works_count: 140,
    },
];

fn created_at(day: u32) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(2023, 1, day, 0, 0, 0).single()
}

fn build_poet(seed: &PoetSeed) -> Poet {
    Poet {
        id: seed.id,
        name: seed.name.to_string(),
        dynasty: seed.dynasty.to_string(),
        biography: seed.biography.to_string(),
        birth_year: Some(seed.birth_year),
        death_year: Some(seed.death_year),
        style: Some(seed.style.to_string()),
        works_count: Some(seed.works_count),
        poems: Vec::new(),
    }
}

fn build_poem(seed: &PoemSeed) -> Poem {
    let poet = POETS.iter().find(|p| p.id == seed.poet_id);
    Poem {
        id: seed.id,
        title: seed.title.to_string(),
        content: seed.content.to_string(),
        poet_id: Some(seed.poet_id),
        poet: poet.map(|p| PoetSummary {
            id: Some(p.id),
            name: p.name.to_string(),
            dynasty: p.dynasty.to_string(),
        }),
        dynasty: poet.map(|p| p.dynasty).unwrap_or_default().to_string(),
        theme: Some(seed.theme.to_string()),
        style: Some(seed.style.to_string()),
        tags: seed.tags.iter().map(|t| t.to_string()).collect(),
        popularity: Some(seed.popularity),
        created_at: created_at(seed.day),
        annotations: Vec::new(),
        imagery: Vec::new(),
        multimedia_assets: Vec::new(),
    }
}

fn all_poems() -> impl Iterator<Item = Poem> {
    POEMS.iter().map(build_poem)
}

fn all_poets() -> impl Iterator<Item = Poet> {
    POETS.iter().map(build_poet)
}

pub fn poems(limit: usize) -> Vec<Poem> {
    all_poems().take(limit).collect()
}

pub fn poets(limit: usize) -> Vec<Poet> {
    all_poets().take(limit).collect()
}

/// The poem with `id`, or the first sample poem when none matches.
pub fn poem_by_id(id: i64) -> Poem {
    POEMS
        .iter()
        .find(|p| p.id == id)
        .map(build_poem)
        .unwrap_or_else(|| build_poem(&POEMS[0]))
}

/// The poet with `id` (or the first sample poet when none matches), with
/// their sample works embedded.
pub fn poet_by_id(id: i64) -> Poet {
    let mut poet = POETS
        .iter()
        .find(|p| p.id == id)
        .map(build_poet)
        .unwrap_or_else(|| build_poet(&POETS[0]));
    poet.poems = poems_by_poet(poet.id, usize::MAX);
    poet
}

fn contains(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Poems whose title, body or author contains `query`, in dataset order.
pub fn search_poems(query: &str, limit: usize) -> Vec<Poem> {
    all_poems()
        .filter(|p| {
            contains(&p.title, query) || contains(&p.content, query) || contains(p.author(), query)
        })
        .take(limit)
        .collect()
}

/// Poets whose name or biography contains `query`, in dataset order.
pub fn search_poets(query: &str, limit: usize) -> Vec<Poet> {
    all_poets()
        .filter(|p| contains(&p.name, query) || contains(&p.biography, query))
        .take(limit)
        .collect()
}

/// Poems by one poet, ascending id.
pub fn poems_by_poet(poet_id: i64, limit: usize) -> Vec<Poem> {
    let mut found: Vec<Poem> = all_poems()
        .filter(|p| p.poet_id == Some(poet_id))
        .collect();
    found.sort_by_key(|p| p.id);
    found.truncate(limit);
    found
}

/// Poems of one dynasty, ascending id.
pub fn poems_by_dynasty(dynasty: &str, limit: usize) -> Vec<Poem> {
    let mut found: Vec<Poem> = all_poems().filter(|p| p.dynasty == dynasty).collect();
    found.sort_by_key(|p| p.id);
    found.truncate(limit);
    found
}

/// Poets of one dynasty, ascending id.
pub fn poets_by_dynasty(dynasty: &str) -> Vec<Poet> {
    let mut found: Vec<Poet> = all_poets().filter(|p| p.dynasty == dynasty).collect();
    found.sort_by_key(|p| p.id);
    found
}

/// Stand-in popularity ranking: each poem draws a random score, highest first.
pub fn popular_poems(limit: usize) -> Vec<Poem> {
    let mut rng = rand::thread_rng();
    let mut ranked: Vec<(u32, Poem)> = all_poems()
        .map(|mut p| {
            let score = rng.gen_range(0..=100);
            p.popularity = Some(score);
            (score, p)
        })
        .collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0));
    ranked.into_iter().take(limit).map(|(_, p)| p).collect()
}

/// Sample poems other than `poem_id`.
pub fn related_poems(poem_id: i64, limit: usize) -> Vec<Poem> {
    all_poems()
        .filter(|p| p.id != poem_id)
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn titles(poems: &[Poem]) -> Vec<&str> {
        poems.iter().map(|p| p.title.as_str()).collect()
    }

    #[test]
    fn test_every_poem_embeds_an_existing_poet() {
        for poem in poems(usize::MAX) {
            let poet = poem.poet.as_ref().unwrap();
            assert_eq!(poet_by_id(poem.poet_id.unwrap()).name, poet.name);
        }
    }

    #[test]
    fn test_limits_truncate() {
        assert_eq!(poems(2).len(), 2);
        assert_eq!(poets(0).len(), 0);
        assert_eq!(poems(100).len(), POEMS.len());
    }

    #[test]
    fn test_search_spring_returns_only_chunxiao() {
        let found = search_poems("春", 20);
        assert_eq!(titles(&found), vec!["春晓"]);
    }

    #[test]
    fn test_search_matches_title_content_and_author() {
        assert_eq!(titles(&search_poems("江雪", 20)), vec!["江雪"]);
        assert_eq!(titles(&search_poems("黄河", 20)), vec!["登鹳雀楼"]);
        assert_eq!(titles(&search_poems("杜甫", 20)), vec!["望岳"]);
    }

    #[test]
    fn test_search_keeps_dataset_order() {
        let found = search_poems("山", 20);
        assert_eq!(titles(&found), vec!["登鹳雀楼", "江雪", "望岳"]);
        assert_eq!(titles(&search_poems("山", 2)), vec!["登鹳雀楼", "江雪"]);
    }

    #[test]
    fn test_search_absent_substring_is_empty() {
        assert!(search_poems("长安", 20).is_empty());
        assert!(search_poets("宋代", 20).is_empty());
    }

    #[test]
    fn test_search_poets() {
        let found = search_poets("诗圣", 20);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "杜甫");
    }

    #[test]
    fn test_lookup_by_id_falls_back_to_first() {
        assert_eq!(poem_by_id(3).title, "登鹳雀楼");
        assert_eq!(poem_by_id(999).id, 1);
        assert_eq!(poet_by_id(2).name, "杜甫");
        assert_eq!(poet_by_id(-1).id, 1);
        assert_eq!(titles(&poet_by_id(1).poems), vec!["静夜思"]);
    }

    #[test]
    fn test_filters_are_ascending_by_id() {
        let by_poet = poems_by_poet(3, 10);
        assert_eq!(titles(&by_poet), vec!["春晓"]);
        assert!(poems_by_poet(42, 10).is_empty());

        let tang = poems_by_dynasty("唐", 10);
        let ids: Vec<i64> = tang.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);

        let poets = poets_by_dynasty("唐");
        assert!(poets.windows(2).all(|w| w[0].id < w[1].id));
        assert!(poets_by_dynasty("宋").is_empty());
    }

    #[test]
    fn test_popular_is_ranked_subset() {
        let popular = popular_poems(3);
        assert_eq!(popular.len(), 3);
        let scores: Vec<u32> = popular.iter().map(|p| p.popularity.unwrap()).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
        assert!(scores.iter().all(|s| *s <= 100));
    }

    #[test]
    fn test_related_excludes_source() {
        let related = related_poems(1, 10);
        assert_eq!(related.len(), POEMS.len() - 1);
        assert!(related.iter().all(|p| p.id != 1));
    }
}
