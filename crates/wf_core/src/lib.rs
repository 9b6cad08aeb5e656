pub mod clock;
pub mod config;
pub mod error;
pub mod provider;
pub mod storage;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::FeedConfig;
pub use error::{Error, Result};
pub use provider::ArticleProvider;
pub use storage::KeyValueStore;
pub use types::{Article, ArticleSource, CachedArticle, Category, Preferences, SavedItem};

pub mod prelude {
    pub use super::{Article, ArticleProvider, Category, Error, KeyValueStore, Result};
}
