pub mod cache;
pub mod ledger;
pub mod manager;
pub mod ranking;
pub mod saved;
pub mod session;

pub use cache::{ArticleCache, MergeReport};
pub use ledger::{InteractionLedger, StoredScore, ViewBand};
pub use manager::{FeedManager, FeedStats};
pub use ranking::{diversify, RankingEngine};
pub use saved::SavedItems;
pub use session::{SessionWindow, SharedSession};

pub mod prelude {
    pub use super::{ArticleCache, FeedManager, InteractionLedger, RankingEngine};
    pub use wf_core::{Article, Category, Error, Result};
}
