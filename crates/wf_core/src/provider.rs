use async_trait::async_trait;
use crate::types::Article;
use crate::Result;

#[async_trait]
pub trait ArticleProvider: Send + Sync {
    /// Name of the remote source, for logs
    fn name(&self) -> &str;

    /// Fetch up to `count` random, already-filtered articles in `lang`
    async fn random_articles(&self, count: usize, lang: &str) -> Result<Vec<Article>>;

    /// Historical events for today's date in `lang`
    async fn on_this_day(&self, lang: &str) -> Result<Vec<Article>>;
}
