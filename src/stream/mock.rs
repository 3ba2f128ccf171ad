//! Random post generator for running the relay without a live source.

use super::{PostListener, RawPost, StreamError, StreamSource};
use crate::config::StreamConfig;
use crate::sleeper::{Sleeper, TokioSleeper};
use async_trait::async_trait;
use chrono::Utc;
use rand::seq::IndexedRandom;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const WORDS: &[&str] = &[
    "Lorem", "ipsum", "dolor", "sit", "amet", "consectetuer", "adipiscing", "elit", "Maecenas",
    "porttitor", "congue", "massa", "Fusce", "posuere", "magna", "sed", "pulvinar", "ultricies",
    "purus", "lectus", "malesuada", "libero",
];

/// Emits a random post every `interval`, each containing one of the configured keywords.
#[derive(Debug)]
pub struct MockStreamSource {
    keywords: Vec<String>,
    min_words: usize,
    max_words: usize,
    interval: Duration,
    limit: Option<usize>,
    sleeper: Arc<dyn Sleeper>,
}

impl MockStreamSource {
    pub fn new(cfg: &StreamConfig) -> Self {
        Self {
            keywords: cfg.keywords.clone(),
            min_words: cfg.mock_min_post_length,
            max_words: cfg.mock_max_post_length.max(cfg.mock_min_post_length),
            interval: cfg.mock_sleep(),
            limit: None,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Stop after `posts` posts instead of running until cancelled.
    pub fn with_limit(mut self, posts: usize) -> Self {
        self.limit = Some(posts);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    fn next_post(&self) -> RawPost {
        let mut rng = rand::rng();
        let len = rng.random_range(self.min_words..=self.max_words);
        let mut words: Vec<&str> =
            (0..len).filter_map(|_| WORDS.choose(&mut rng).copied()).collect();
        if let Some(keyword) = self.keywords.choose(&mut rng) {
            words.insert(len / 2, keyword.as_str());
        }
        RawPost {
            id: rng.random_range(0..i64::MAX),
            user_id: rng.random_range(0..i64::MAX),
            text: words.join(" "),
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
impl StreamSource for MockStreamSource {
    async fn run(
        self: Box<Self>,
        listener: Arc<dyn PostListener>,
        cancel: CancellationToken,
    ) -> Result<(), StreamError> {
        tracing::info!(keywords = ?self.keywords, "starting mock filtering post streams");
        let mut sent = 0usize;
        while !cancel.is_cancelled() && self.limit.map_or(true, |limit| sent < limit) {
            listener.on_post(self.next_post());
            sent += 1;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.sleeper.sleep(self.interval) => {}
            }
        }
        tracing::info!(posts = sent, "mock stream stopped");
        Ok(())
    }
}
