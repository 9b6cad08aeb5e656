use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use wf_core::config::RankingConfig;
use wf_core::{Article, Category, Clock};

use crate::ledger::InteractionLedger;
use crate::session::{self, SharedSession};

/// Inputs that stay fixed while one batch is scored.
struct ScoringContext {
    weights: HashMap<String, f64>,
    seen: HashSet<String>,
    recent: Vec<Category>,
}

impl ScoringContext {
    fn weight(&self, key: &str) -> f64 {
        self.weights.get(key).copied().unwrap_or(0.0)
    }
}

/// Orders articles for one user session.
pub struct RankingEngine {
    ledger: InteractionLedger,
    session: SharedSession,
    clock: Arc<dyn Clock>,
    config: RankingConfig,
    rng: StdRng,
}

impl RankingEngine {
    pub fn new(
        ledger: InteractionLedger,
        session: SharedSession,
        clock: Arc<dyn Clock>,
        config: RankingConfig,
    ) -> Self {
        Self {
            ledger,
            session,
            clock,
            config,
            rng: StdRng::from_entropy(),
        }
    }

    /// Make the exploration noise reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Rank then diversify. The only ordering entry point the feed uses.
    pub fn recommend(&mut self, articles: Vec<Article>) -> Vec<Article> {
        let ranked = self.rank(articles);
        diversify(ranked, self.config.max_consecutive)
    }

    /// Stable sort by descending score.
    pub fn rank(&mut self, articles: Vec<Article>) -> Vec<Article> {
        if articles.is_empty() {
            return articles;
        }
        let context = self.context();
        let mut scored: Vec<(Article, f64)> = articles
            .into_iter()
            .map(|article| {
                let score = self.score_with(&context, &article);
                (article, score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.into_iter().map(|(article, _)| article).collect()
    }

    pub fn score(&mut self, article: &Article) -> f64 {
        let context = self.context();
        self.score_with(&context, article)
    }

    fn context(&self) -> ScoringContext {
        let now = self.clock.now_millis();
        ScoringContext {
            weights: self.ledger.weights(),
            seen: self.ledger.seen_ids(),
            recent: session::lock(&self.session).recent(self.config.repeat_lookback, now),
        }
    }

    fn score_with(&mut self, context: &ScoringContext, article: &Article) -> f64 {
        let config = &self.config;
        let mut score = if config.exploration > 0.0 {
            self.rng.gen_range(0.0..config.exploration)
        } else {
            0.0
        };

        score += config.category_weight * context.weight(article.category.as_str());
        score += config.tag_weight * article.tags.iter().map(|t| context.weight(t)).sum::<f64>();
        score += config.wiki_weight
            * article
                .wiki_categories
                .iter()
                .map(|w| context.weight(w))
                .sum::<f64>();

        if article.is_related {
            score += config.related_boost;
        }

        let repeats = context.recent.iter().filter(|c| **c == article.category).count();
        score -= config.repeat_penalty * repeats as f64;

        if context.seen.contains(&article.id) {
            score -= config.seen_penalty;
        }
        score
    }
}

/// Greedy re-sequencing so no category runs longer than `max_consecutive`
/// while an alternative remains.
///
/// Each step takes the highest-ranked remaining article whose category
/// appears fewer than `max_consecutive` times among the last
/// `max_consecutive` placed. Among those, a candidate is skipped when taking
/// it would leave a remainder that cannot be laid out without a run, so a
/// lower-ranked category moves forward only to avoid a forced run later.
/// With no qualifying article, the highest-ranked remaining one is taken.
/// The output is always a permutation of the input.
pub fn diversify(ranked: Vec<Article>, max_consecutive: usize) -> Vec<Article> {
    if max_consecutive == 0 {
        return ranked;
    }
    let mut pool = ranked;
    let mut result: Vec<Article> = Vec::with_capacity(pool.len());
    let mut remaining: HashMap<Category, usize> = HashMap::new();
    for article in &pool {
        *remaining.entry(article.category).or_insert(0) += 1;
    }

    while !pool.is_empty() {
        let recent = &result[result.len().saturating_sub(max_consecutive)..];
        let qualifying: Vec<usize> = pool
            .iter()
            .enumerate()
            .filter(|(_, candidate)| {
                recent.iter().filter(|a| a.category == candidate.category).count() < max_consecutive
            })
            .map(|(i, _)| i)
            .collect();

        let pick = match qualifying.first() {
            None => 0,
            Some(&first) => qualifying
                .iter()
                .copied()
                .find(|&i| {
                    let category = pool[i].category;
                    let run = trailing_run(&result, category) + 1;
                    leaves_arrangeable(&remaining, category, run, max_consecutive)
                })
                .unwrap_or(first),
        };

        let article = pool.remove(pick);
        if let Some(count) = remaining.get_mut(&article.category) {
            *count -= 1;
        }
        result.push(article);
    }
    result
}

fn trailing_run(placed: &[Article], category: Category) -> usize {
    placed.iter().rev().take_while(|a| a.category == category).count()
}

/// Whether the pool minus one `placed` article, following a run of `run`
/// such articles, can still be laid out with runs of at most `max_run`.
/// Each category needs `count <= head + max_run * others`, where `head` is
/// what may still extend the current run (or `max_run` for the others).
fn leaves_arrangeable(
    remaining: &HashMap<Category, usize>,
    placed: Category,
    run: usize,
    max_run: usize,
) -> bool {
    let total = remaining.values().sum::<usize>().saturating_sub(1);
    remaining.iter().all(|(&category, &count)| {
        let (count, head) = if category == placed {
            (count.saturating_sub(1), max_run.saturating_sub(run))
        } else {
            (count, max_run)
        };
        count <= head + max_run * (total - count)
    })
}
