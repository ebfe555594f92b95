use std::time::Duration;

use tokio::time::timeout;

use crate::{
    database::{PostStore, StoreError},
    hashtags::{compute_trending_hashtags, search_hashtags},
    models::{Direction, HashtagCount, PostRecord},
};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("post fetch timed out after {0:?}")]
    Timeout(Duration),
}

/// How much of the post collection an aggregation reads.
#[derive(Clone, Copy, Debug)]
pub struct FetchSettings {
    pub window: Option<u32>,
    pub timeout: Duration,
}

pub async fn fetch_with_timeout(store: &PostStore, settings: FetchSettings) -> Result<Vec<PostRecord>, FetchError> {
    timeout(settings.timeout, store.fetch_posts(settings.window))
        .await
        .map_err(|_| FetchError::Timeout(settings.timeout))?
        .map_err(FetchError::from)
}

/// A failed fetch degrades to no posts at all.
async fn fetch_or_empty(store: &PostStore, settings: FetchSettings) -> Vec<PostRecord> {
    match fetch_with_timeout(store, settings).await {
        Ok(posts) => posts,
        Err(err) => {
            tracing::error!(err = ?err, "failed to fetch posts for hashtag aggregation");
            Vec::new()
        }
    }
}

#[tracing::instrument(skip(store))]
pub async fn trending(
    store: &PostStore,
    settings: FetchSettings,
    direction: Direction,
    limit: Option<usize>,
) -> Vec<HashtagCount> {
    let posts = fetch_or_empty(store, settings).await;
    tracing::debug!(posts = posts.len(), "aggregating hashtags");
    compute_trending_hashtags(&posts, direction, limit)
}

#[tracing::instrument(skip(store))]
pub async fn search(
    store: &PostStore,
    settings: FetchSettings,
    query: &str,
    limit: Option<usize>,
) -> Vec<HashtagCount> {
    let posts = fetch_or_empty(store, settings).await;
    search_hashtags(&posts, query, limit)
}
