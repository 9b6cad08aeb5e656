use wf_core::{Article, Result, SavedItem};
use wf_storage::{PersistentStore, StorageKey};

/// Most-recent-first list of saved article snapshots.
#[derive(Clone)]
pub struct SavedItems {
    store: PersistentStore,
}

impl SavedItems {
    pub fn new(store: PersistentStore) -> Self {
        Self { store }
    }

    pub fn list(&self) -> Vec<SavedItem> {
        self.store.get_or_default(StorageKey::Saved)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.list().iter().any(|item| item.id == id)
    }

    /// Returns false if the article was already saved
    pub fn add(&self, article: &Article, saved_at: i64) -> Result<bool> {
        let mut items = self.list();
        if items.iter().any(|item| item.id == article.id) {
            return Ok(false);
        }
        items.insert(0, SavedItem::from_article(article, saved_at));
        self.store.set(StorageKey::Saved, &items)?;
        Ok(true)
    }

    /// Returns false if nothing was saved under `id`
    pub fn remove(&self, id: &str) -> Result<bool> {
        let mut items = self.list();
        let before = items.len();
        items.retain(|item| item.id != id);
        if items.len() == before {
            return Ok(false);
        }
        self.store.set(StorageKey::Saved, &items)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wf_core::{ArticleSource, Category};

    fn article(id: &str) -> Article {
        Article {
            id: id.to_string(),
            hook: format!("hook for {}", id),
            category: Category::Nature,
            tags: vec!["forest".to_string()],
            wiki_categories: vec![],
            thumbnail: None,
            source: ArticleSource {
                title: id.to_string(),
                url: format!("https://en.wikipedia.org/wiki/{}", id),
                lang: "en".to_string(),
            },
            is_related: false,
        }
    }

    #[test]
    fn test_most_recent_first_without_duplicates() {
        let saved = SavedItems::new(PersistentStore::in_memory());
        assert!(saved.add(&article("a"), 1).unwrap());
        assert!(saved.add(&article("b"), 2).unwrap());
        assert!(!saved.add(&article("a"), 3).unwrap());

        let ids: Vec<_> = saved.list().into_iter().map(|item| item.id).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_remove() {
        let saved = SavedItems::new(PersistentStore::in_memory());
        saved.add(&article("a"), 1).unwrap();

        assert!(saved.remove("a").unwrap());
        assert!(!saved.remove("a").unwrap());
        assert!(!saved.contains("a"));
    }
}
