//! Page routes and their titles.

use std::fmt;

/// A navigable page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Poems,
    PoemDetail(i64),
    Poets,
    PoetDetail(i64),
    Categories,
    Favorites,
    /// Search page, with the `q` query parameter when present.
    Search(Option<String>),
}

impl Route {
    /// Resolve a path such as `/poems/12` or `/search?q=春`.
    ///
    /// Trailing slashes are ignored. Unknown paths and non-numeric ids
    /// resolve to `None`.
    pub fn resolve(path: &str) -> Option<Self> {
        let (path, query) = match path.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path, None),
        };
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        match segments.as_slice() {
            [] => Some(Self::Home),
            ["poems"] => Some(Self::Poems),
            ["poems", id] => id.parse().ok().map(Self::PoemDetail),
            ["poets"] => Some(Self::Poets),
            ["poets", id] => id.parse().ok().map(Self::PoetDetail),
            ["categories"] => Some(Self::Categories),
            ["favorites"] => Some(Self::Favorites),
            ["search"] => Some(Self::Search(query.and_then(search_term))),
            _ => None,
        }
    }

    /// Page title shown on entry.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Home => "诗境寻踪 - 首页",
            Self::Poems => "诗词赏析",
            Self::PoemDetail(_) => "诗词详情",
            Self::Poets => "诗人介绍",
            Self::PoetDetail(_) => "诗人详情",
            Self::Categories => "分类浏览",
            Self::Favorites => "我的收藏",
            Self::Search(_) => "搜索诗词",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Home => write!(f, "/"),
            Self::Poems => write!(f, "/poems"),
            Self::PoemDetail(id) => write!(f, "/poems/{id}"),
            Self::Poets => write!(f, "/poets"),
            Self::PoetDetail(id) => write!(f, "/poets/{id}"),
            Self::Categories => write!(f, "/categories"),
            Self::Favorites => write!(f, "/favorites"),
            Self::Search(None) => write!(f, "/search"),
            Self::Search(Some(q)) => write!(f, "/search?q={q}"),
        }
    }
}

/// Extract a non-blank `q` value from a query string.
fn search_term(query: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "q")
        .map(|(_, value)| value.replace('+', " ").trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_static_pages() {
        assert_eq!(Route::resolve("/"), Some(Route::Home));
        assert_eq!(Route::resolve(""), Some(Route::Home));
        assert_eq!(Route::resolve("/poems"), Some(Route::Poems));
        assert_eq!(Route::resolve("/poets/"), Some(Route::Poets));
        assert_eq!(Route::resolve("/categories"), Some(Route::Categories));
        assert_eq!(Route::resolve("/favorites"), Some(Route::Favorites));
        assert_eq!(Route::resolve("/search"), Some(Route::Search(None)));
    }

    #[test]
    fn test_resolve_detail_pages() {
        assert_eq!(Route::resolve("/poems/12"), Some(Route::PoemDetail(12)));
        assert_eq!(Route::resolve("/poets/3"), Some(Route::PoetDetail(3)));
        assert_eq!(Route::resolve("/poems/abc"), None);
        assert_eq!(Route::resolve("/poems/1/2"), None);
        assert_eq!(Route::resolve("/dynasties"), None);
    }

    #[test]
    fn test_resolve_search_query() {
        assert_eq!(
            Route::resolve("/search?q=春"),
            Some(Route::Search(Some("春".to_string())))
        );
        assert_eq!(
            Route::resolve("/search?page=2&q=明月+松"),
            Some(Route::Search(Some("明月 松".to_string())))
        );
        assert_eq!(Route::resolve("/search?q="), Some(Route::Search(None)));
    }

    #[test]
    fn test_titles() {
        assert_eq!(Route::Home.title(), "诗境寻踪 - 首页");
        assert_eq!(Route::PoemDetail(1).title(), "诗词详情");
        assert_eq!(Route::Search(None).title(), "搜索诗词");
    }

    #[test]
    fn test_display_round_trips_through_resolve() {
        for route in [Route::Home, Route::PoetDetail(5), Route::Favorites] {
            assert_eq!(Route::resolve(&route.to_string()), Some(route));
        }
    }
}
