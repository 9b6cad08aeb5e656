use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use url::Url;
use wf_core::{Article, ArticleSource, Category};

pub const MIN_HOOK_CHARS: usize = 50;
pub const MAX_HOOK_CHARS: usize = 280;
/// Texts longer than this skip the boring-pattern check
const LONG_TEXT_CHARS: usize = 500;
const MAX_SENTENCES: usize = 2;
const MAX_TAGS: usize = 3;
const MAX_WIKI_CATEGORIES: usize = 3;
const MIN_EVENT_CHARS: usize = 30;
pub const MAX_EVENTS: usize = 10;

lazy_static! {
    static ref SENTENCE: Regex = Regex::new(r"[^.!?]+[.!?]+").unwrap();
    static ref NON_WORD: Regex = Regex::new(r"[^\w\s]").unwrap();
    static ref LABEL_SEPARATOR: Regex = Regex::new(r"\s*(?:[,;]|\band\b|\bve\b)\s*").unwrap();

    // First match wins, in this order
    static ref CATEGORY_PATTERNS: Vec<(Category, Regex)> = vec![
        (
            Category::Science,
            Regex::new(r"fizik|kimya|biyoloji|bilim|atom|molekül|enerji|uzay|gezegen|yıldız|science|physics|chemistry|biology|planet|star|quantum").unwrap(),
        ),
        (
            Category::History,
            Regex::new(r"savaş|tarih|imparator|kral|antik|osmanlı|war|history|emperor|king|ancient|battle|dynasty|empire").unwrap(),
        ),
        (
            Category::Nature,
            Regex::new(r"hayvan|bitki|deniz|orman|kuş|balık|tür|species|animal|plant|forest|ocean|bird|fish|mammal").unwrap(),
        ),
        (
            Category::Technology,
            Regex::new(r"bilgisayar|yazılım|internet|teknoloji|mühendis|computer|software|technology|digital|engineer|algorithm").unwrap(),
        ),
        (
            Category::Culture,
            Regex::new(r"sanat|müzik|film|yazar|edebiyat|roman|şarkı|art|music|author|literature|novel|song|album").unwrap(),
        ),
        (
            Category::People,
            Regex::new(r"futbolcu|oyuncu|aktör|şarkıcı|footballer|actor|singer|scientist|politician|athlete").unwrap(),
        ),
    ];

    static ref BORING_PATTERNS: HashMap<&'static str, Vec<Regex>> = {
        let mut patterns = HashMap::new();
        patterns.insert("en", compile_all(&[
            r"(?i)is a village",
            r"(?i)is a town",
            r"(?i)is a municipality",
            r"(?i)is a commune",
            r"(?i)census-designated place",
            r"(?i)unincorporated community",
            r"(?i)administrative unit",
        ]));
        patterns.insert("tr", compile_all(&[
            r"(?i)ilçesine bağlı",
            r"(?i)bir mahalledir",
            r"(?i)bir köydür",
            r"(?i)bir belediyedir",
            r"(?i)nüfusu \d+ kişidir",
            r"(?i)\d+ yılında kurulmuştur",
            r"(?i)bir yerleşim yeridir",
            r"(?i)idari birim",
        ]));
        patterns
    };
}

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().map(|p| Regex::new(p).unwrap()).collect()
}

// =========================================================================
// REST payloads
// =========================================================================

/// `page/summary` payload, trimmed to the fields we read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageSummary {
    #[serde(default)]
    pub title: String,
    pub pageid: Option<u64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub extract: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<Thumbnail>,
    pub content_urls: Option<ContentUrls>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thumbnail {
    pub source: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentUrls {
    pub desktop: Option<PageUrls>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageUrls {
    pub page: Option<String>,
}

impl PageSummary {
    fn page_url(&self, lang: &str) -> String {
        self.content_urls
            .as_ref()
            .and_then(|urls| urls.desktop.as_ref())
            .and_then(|desktop| desktop.page.clone())
            .unwrap_or_else(|| article_url(lang, &self.title))
    }

    fn thumbnail_url(&self) -> Option<String> {
        self.thumbnail.as_ref().map(|t| t.source.clone())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OnThisDayFeed {
    #[serde(default)]
    pub events: Vec<OnThisDayEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OnThisDayEvent {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub year: i64,
    #[serde(default)]
    pub pages: Vec<PageSummary>,
}

// =========================================================================
// Normalization
// =========================================================================

/// Desktop URL of a page, used when the payload carries none.
pub fn article_url(lang: &str, title: &str) -> String {
    let base = format!("https://{}.wikipedia.org/wiki/", lang);
    let page = title.replace(' ', "_");
    match Url::parse(&base) {
        Ok(mut url) => {
            if let Ok(mut segments) = url.path_segments_mut() {
                segments.pop_if_empty().push(&page);
            }
            url.to_string()
        }
        Err(_) => format!("{}{}", base, page),
    }
}

/// First 12 hex chars of the SHA-256 of `text`
pub fn short_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..12].to_string()
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept.trim_end())
}

/// The display snippet: first two sentences, at least 50 chars, at most 280.
pub fn make_hook(extract: &str) -> Option<String> {
    let extract = extract.trim();
    if extract.is_empty() {
        return None;
    }

    let sentences: Vec<&str> = SENTENCE
        .find_iter(extract)
        .map(|m| m.as_str().trim())
        .take(MAX_SENTENCES)
        .collect();
    let hook = if sentences.is_empty() {
        extract.to_string()
    } else {
        sentences.join(" ")
    };

    if hook.chars().count() < MIN_HOOK_CHARS {
        return None;
    }
    Some(truncate(&hook, MAX_HOOK_CHARS))
}

pub fn detect_category(title: &str, description: &str) -> Category {
    let text = format!("{} {}", title, description).to_lowercase();
    CATEGORY_PATTERNS
        .iter()
        .find(|(_, pattern)| pattern.is_match(&text))
        .map(|(category, _)| *category)
        .unwrap_or_default()
}

/// Up to three words longer than four characters from title and description
pub fn extract_tags(title: &str, description: &str) -> Vec<String> {
    let text = format!("{} {}", title, description).to_lowercase();
    NON_WORD
        .replace_all(&text, "")
        .split_whitespace()
        .filter(|word| word.chars().count() > 4)
        .take(MAX_TAGS)
        .map(str::to_string)
        .collect()
}

/// Classifier labels from a short description such as
/// "English mathematician and writer".
pub fn wiki_categories(description: &str) -> Vec<String> {
    LABEL_SEPARATOR
        .split(&description.to_lowercase())
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .take(MAX_WIKI_CATEGORIES)
        .map(str::to_string)
        .collect()
}

/// Rejects stub geography articles. Languages without patterns use English.
pub fn is_interesting(text: &str, lang: &str) -> bool {
    let length = text.chars().count();
    if length < MIN_HOOK_CHARS {
        return false;
    }
    if length > LONG_TEXT_CHARS {
        return true;
    }
    let patterns = BORING_PATTERNS
        .get(lang)
        .or_else(|| BORING_PATTERNS.get("en"));
    match patterns {
        Some(patterns) => !patterns.iter().any(|p| p.is_match(text)),
        None => true,
    }
}

pub fn parse_summary(summary: &PageSummary, lang: &str) -> Option<Article> {
    if summary.kind.as_deref() == Some("disambiguation") {
        return None;
    }
    let hook = make_hook(summary.extract.as_deref()?)?;
    let description = summary.description.as_deref().unwrap_or("");

    let id = match summary.pageid {
        Some(pageid) => format!("wiki-{}-{}", lang, pageid),
        None => format!("wiki-{}-{}", lang, short_hash(&summary.title)),
    };

    Some(Article {
        id,
        hook,
        category: detect_category(&summary.title, description),
        tags: extract_tags(&summary.title, description),
        wiki_categories: wiki_categories(description),
        thumbnail: summary.thumbnail_url(),
        source: ArticleSource {
            title: summary.title.clone(),
            url: summary.page_url(lang),
            lang: lang.to_string(),
        },
        is_related: false,
    })
}

fn event_article(event: &OnThisDayEvent, lang: &str) -> Option<Article> {
    let text = event.text.trim();
    if text.chars().count() <= MIN_EVENT_CHARS {
        return None;
    }

    let (source, thumbnail) = match event.pages.first() {
        Some(page) => (
            ArticleSource {
                title: page.title.clone(),
                url: page.page_url(lang),
                lang: lang.to_string(),
            },
            page.thumbnail_url(),
        ),
        None => {
            let year = event.year.to_string();
            (
                ArticleSource {
                    url: article_url(lang, &year),
                    title: year,
                    lang: lang.to_string(),
                },
                None,
            )
        }
    };

    Some(Article {
        id: format!("otd-{}-{}-{}", lang, event.year, short_hash(text)),
        hook: truncate(&format!("{}: {}", event.year, text), MAX_HOOK_CHARS),
        category: Category::History,
        tags: vec!["history".to_string(), "today".to_string()],
        wiki_categories: vec![],
        thumbnail,
        source,
        is_related: false,
    })
}

pub fn parse_on_this_day(feed: &OnThisDayFeed, lang: &str) -> Vec<Article> {
    feed.events
        .iter()
        .filter_map(|event| event_article(event, lang))
        .take(MAX_EVENTS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const LOVELACE: &str = "Augusta Ada King, Countess of Lovelace was an English mathematician and writer. \
        She is chiefly known for her work on Charles Babbage's proposed mechanical general-purpose computer. \
        She was the first to recognise that the machine had applications beyond pure calculation.";

    fn summary(value: serde_json::Value) -> PageSummary {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_hook_keeps_two_sentences() {
        let hook = make_hook(LOVELACE).unwrap();
        assert!(hook.starts_with("Augusta Ada King"));
        assert!(hook.ends_with("general-purpose computer."));
        assert!(!hook.contains("first to recognise"));
    }

    #[test]
    fn test_hook_rejects_short_text() {
        assert_eq!(make_hook("Too short."), None);
        assert_eq!(make_hook("   "), None);
    }

    #[test]
    fn test_hook_truncates_long_sentence() {
        let long = format!("{}.", "word ".repeat(100).trim_end());
        let hook = make_hook(&long).unwrap();
        assert!(hook.chars().count() <= MAX_HOOK_CHARS);
        assert!(hook.ends_with("..."));
    }

    #[test]
    fn test_truncate_respects_multibyte_chars() {
        let text = "ş".repeat(300);
        let out = truncate(&text, MAX_HOOK_CHARS);
        assert_eq!(out.chars().count(), MAX_HOOK_CHARS);
    }

    #[test]
    fn test_detect_category() {
        assert_eq!(detect_category("Quantum tunnelling", ""), Category::Science);
        assert_eq!(detect_category("Battle of Hastings", ""), Category::History);
        assert_eq!(detect_category("Osmanlı İmparatorluğu", ""), Category::History);
        assert_eq!(detect_category("Red fox", "Species of mammal"), Category::Nature);
        assert_eq!(detect_category("Linux", "Computer operating system"), Category::Technology);
        assert_eq!(detect_category("Zidane", "French footballer"), Category::People);
        assert_eq!(detect_category("Xyz", ""), Category::Culture);
    }

    #[test]
    fn test_extract_tags() {
        let tags = extract_tags("Ada Lovelace", "English mathematician, writer");
        assert_eq!(tags, vec!["lovelace", "english", "mathematician"]);
    }

    #[test]
    fn test_wiki_categories() {
        assert_eq!(
            wiki_categories("English mathematician and writer"),
            vec!["english mathematician", "writer"]
        );
        assert!(wiki_categories("").is_empty());
    }

    #[test]
    fn test_interestingness() {
        let village = "Lower Dingley is a village in the county of Northamptonshire, England.";
        assert!(!is_interesting(village, "en"));
        assert!(is_interesting(LOVELACE, "en"));
        assert!(!is_interesting("short", "en"));

        let koy = "Yukarıkaraağaç, Amasya ilinin Merkez ilçesine bağlı bir köydür ve çok güzeldir.";
        assert!(!is_interesting(koy, "tr"));

        // unknown languages fall back to English patterns
        assert!(!is_interesting(village, "de"));

        let long_village = format!("{} {}", village, "x".repeat(500));
        assert!(is_interesting(&long_village, "en"));
    }

    #[test]
    fn test_parse_summary() {
        let page = summary(json!({
            "type": "standard",
            "title": "Ada Lovelace",
            "pageid": 974,
            "description": "English mathematician and writer",
            "extract": LOVELACE,
            "thumbnail": { "source": "https://upload.wikimedia.org/ada.jpg" },
            "content_urls": { "desktop": { "page": "https://en.wikipedia.org/wiki/Ada_Lovelace" } }
        }));

        let article = parse_summary(&page, "en").unwrap();
        assert_eq!(article.id, "wiki-en-974");
        assert_eq!(article.category, Category::Culture);
        assert_eq!(article.source.url, "https://en.wikipedia.org/wiki/Ada_Lovelace");
        assert_eq!(article.thumbnail.as_deref(), Some("https://upload.wikimedia.org/ada.jpg"));
        assert_eq!(article.wiki_categories, vec!["english mathematician", "writer"]);
        assert!(!article.is_related);
    }

    #[test]
    fn test_parse_summary_is_stable() {
        let value = json!({ "title": "Ada Lovelace", "pageid": 974, "extract": LOVELACE });
        let first = parse_summary(&summary(value.clone()), "en").unwrap();
        let second = parse_summary(&summary(value), "en").unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn test_parse_summary_skips_disambiguation_and_empty() {
        let page = summary(json!({ "type": "disambiguation", "title": "Mercury", "extract": LOVELACE }));
        assert!(parse_summary(&page, "en").is_none());

        let page = summary(json!({ "title": "Empty" }));
        assert!(parse_summary(&page, "en").is_none());
    }

    #[test]
    fn test_fallback_url_is_encoded() {
        let page = summary(json!({ "title": "Çanakkale Savaşı", "extract": LOVELACE }));
        let article = parse_summary(&page, "tr").unwrap();
        assert!(article.id.starts_with("wiki-tr-"));
        assert!(article.source.url.starts_with("https://tr.wikipedia.org/wiki/"));
        assert!(!article.source.url.contains(' '));
    }

    #[test]
    fn test_on_this_day() {
        let mut events = vec![json!({ "text": "Too short to keep.", "year": 1900 })];
        for year in 0..12 {
            events.push(json!({
                "text": format!("Something memorable happened in the year number {}.", year),
                "year": 1950 + year,
                "pages": [{ "title": "Event", "content_urls": { "desktop": { "page": "https://en.wikipedia.org/wiki/Event" } } }]
            }));
        }
        let feed: OnThisDayFeed = serde_json::from_value(json!({ "events": events })).unwrap();

        let articles = parse_on_this_day(&feed, "en");
        assert_eq!(articles.len(), MAX_EVENTS);

        let first = &articles[0];
        assert!(first.id.starts_with("otd-en-1950-"));
        assert_eq!(first.id.len(), "otd-en-1950-".len() + 12);
        assert!(first.hook.starts_with("1950: "));
        assert_eq!(first.category, Category::History);
        assert_eq!(first.tags, vec!["history", "today"]);
        assert_eq!(first.source.url, "https://en.wikipedia.org/wiki/Event");
    }

    #[test]
    fn test_on_this_day_without_pages() {
        let feed: OnThisDayFeed = serde_json::from_value(json!({
            "events": [{ "text": "A long enough event description without linked pages.", "year": 1453 }]
        }))
        .unwrap();
        let articles = parse_on_this_day(&feed, "en");
        assert_eq!(articles[0].source.url, "https://en.wikipedia.org/wiki/1453");
    }
}
