use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Topic bucket an article is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Science,
    History,
    Nature,
    Technology,
    #[default]
    Culture,
    People,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Science,
        Category::History,
        Category::Nature,
        Category::Technology,
        Category::Culture,
        Category::People,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Science => "science",
            Category::History => "history",
            Category::Nature => "nature",
            Category::Technology => "technology",
            Category::Culture => "culture",
            Category::People => "people",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Category::Science => "🔬",
            Category::History => "📜",
            Category::Nature => "🌿",
            Category::Technology => "💻",
            Category::Culture => "🎭",
            Category::People => "👤",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| crate::Error::NotFound(format!("category '{}'", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleSource {
    pub title: String,
    pub url: String,
    pub lang: String,
}

/// A normalized summary article as produced by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    pub hook: String,
    pub category: Category,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub wiki_categories: Vec<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    pub source: ArticleSource,
    #[serde(default)]
    pub is_related: bool,
}

impl Article {
    pub fn emoji(&self) -> &'static str {
        self.category.emoji()
    }
}

/// Size-reduced copy of an [`Article`] kept in the article cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedArticle {
    pub id: String,
    pub hook: String,
    #[serde(default)]
    pub emoji: String,
    pub category: Category,
    #[serde(default)]
    pub thumbnail: Option<String>,
    pub source: ArticleSource,
    #[serde(default)]
    pub is_related: bool,
}

impl From<&Article> for CachedArticle {
    fn from(article: &Article) -> Self {
        Self {
            id: article.id.clone(),
            hook: article.hook.clone(),
            emoji: article.emoji().to_string(),
            category: article.category,
            thumbnail: article.thumbnail.clone(),
            source: article.source.clone(),
            is_related: article.is_related,
        }
    }
}

impl From<CachedArticle> for Article {
    fn from(cached: CachedArticle) -> Self {
        Self {
            id: cached.id,
            hook: cached.hook,
            category: cached.category,
            tags: Vec::new(),
            wiki_categories: Vec::new(),
            thumbnail: cached.thumbnail,
            source: cached.source,
            is_related: cached.is_related,
        }
    }
}

/// Entry of the saved list. Independent of the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedItem {
    pub id: String,
    pub hook: String,
    pub emoji: String,
    pub category: Category,
    pub source: ArticleSource,
    pub saved_at: i64,
}

impl SavedItem {
    pub fn from_article(article: &Article, saved_at: i64) -> Self {
        Self {
            id: article.id.clone(),
            hook: article.hook.clone(),
            emoji: article.emoji().to_string(),
            category: article.category,
            source: article.source.clone(),
            saved_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub language: String,
    pub theme: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            theme: "dark".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article() -> Article {
        Article {
            id: "wiki-en-42".to_string(),
            hook: "A hook long enough to be displayed on a card.".to_string(),
            category: Category::Science,
            tags: vec!["quantum".to_string()],
            wiki_categories: vec!["physicist".to_string()],
            thumbnail: None,
            source: ArticleSource {
                title: "Example".to_string(),
                url: "https://en.wikipedia.org/wiki/Example".to_string(),
                lang: "en".to_string(),
            },
            is_related: false,
        }
    }

    #[test]
    fn test_category_parses_case_insensitively() {
        assert_eq!("Science".parse::<Category>().unwrap(), Category::Science);
        assert!("astrology".parse::<Category>().is_err());
    }

    #[test]
    fn test_projection_drops_tags() {
        let cached = CachedArticle::from(&article());
        assert_eq!(cached.emoji, "🔬");

        let restored = Article::from(cached);
        assert_eq!(restored.id, "wiki-en-42");
        assert!(restored.tags.is_empty());
        assert!(restored.wiki_categories.is_empty());
    }

    #[test]
    fn test_article_serializes_camel_case() {
        let json = serde_json::to_value(article()).unwrap();
        assert_eq!(json["category"], "science");
        assert!(json.get("wikiCategories").is_some());
        assert_eq!(json["isRelated"], false);
    }
}
