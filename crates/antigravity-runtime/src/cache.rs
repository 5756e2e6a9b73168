//! Caching layer for reasoner output.
//!
//! Holds parsed reasoner replies keyed by prompt and model, so an identical
//! prompt does not pay for a second model call. Cached replies still go
//! through the evidence checks of the run that reads them.

use moka::future::Cache;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use crate::providers::ChatMessage;
use crate::reasoner::RawReasonerOutput;

/// Cache key for a reasoner call.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    prompt_hash: u64,
    model: String,
}

impl CacheKey {
    pub fn new(messages: &[ChatMessage], model: &str) -> Self {
        Self {
            prompt_hash: hash_prompt(messages),
            model: model.to_string(),
        }
    }
}

/// Reasoner output cache using moka.
pub struct ResponseCache {
    cache: Cache<CacheKey, RawReasonerOutput>,
}

impl ResponseCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<RawReasonerOutput> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: CacheKey, output: RawReasonerOutput) {
        self.cache.insert(key, output).await;
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(1_000, Duration::from_secs(3600))
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("entries", &self.entry_count())
            .finish()
    }
}

fn hash_prompt(messages: &[ChatMessage]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for message in messages {
        message.role.hash(&mut hasher);
        message.content.hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoner::{Certainty, UnknownMarker};

    fn output() -> RawReasonerOutput {
        RawReasonerOutput {
            summary: "UNKNOWN".to_string(),
            certainty: Certainty::Unknown(UnknownMarker::Unknown),
            prior_art_matches: vec![],
            novel_aspects: vec![],
            unknowns: vec!["no prior art supplied".to_string()],
            recommendations: vec![],
        }
    }

    #[tokio::test]
    async fn test_cache_operations() {
        let cache = ResponseCache::default();
        let messages = vec![ChatMessage::system("rules"), ChatMessage::user("task")];
        let key = CacheKey::new(&messages, "gemini-1.5-flash");

        assert!(cache.get(&key).await.is_none());
        cache.insert(key.clone(), output()).await;
        assert_eq!(cache.get(&key).await, Some(output()));
    }

    #[test]
    fn test_key_depends_on_model_and_prompt() {
        let messages = vec![ChatMessage::user("task")];
        let other = vec![ChatMessage::user("other task")];
        assert_eq!(
            CacheKey::new(&messages, "m1"),
            CacheKey::new(&messages, "m1")
        );
        assert_ne!(CacheKey::new(&messages, "m1"), CacheKey::new(&messages, "m2"));
        assert_ne!(CacheKey::new(&messages, "m1"), CacheKey::new(&other, "m1"));
    }
}
