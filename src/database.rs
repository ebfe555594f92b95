use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use bson::{Document, doc};
use futures_util::TryStreamExt;
use mongodb::{
    Client, Collection,
    options::{ClientOptions, ServerApi, ServerApiVersion},
};
use tokio::sync::RwLock;

use crate::{
    hashtags::normalize_tag,
    models::{FollowedHashtag, PostRecord},
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),
}

/// Where posts and followed hashtags live.
#[derive(Clone)]
pub enum PostStore {
    Mongo(Database),
    Memory(MemoryStore),
}

impl PostStore {
    /// All posts, newest first. `window` keeps only the most recent ones.
    pub async fn fetch_posts(&self, window: Option<u32>) -> Result<Vec<PostRecord>, StoreError> {
        match self {
            Self::Mongo(database) => database.fetch_posts(window).await,
            Self::Memory(memory) => Ok(memory.fetch_posts(window).await),
        }
    }

    pub async fn insert_post(&self, post: &PostRecord) -> Result<(), StoreError> {
        match self {
            Self::Mongo(database) => database.insert_post(post).await,
            Self::Memory(memory) => {
                memory.insert_post(post.clone()).await;
                Ok(())
            }
        }
    }

    /// Newest posts carrying `tag`, which must already be canonical.
    pub async fn posts_with_hashtag(&self, tag: &str, limit: u32) -> Result<Vec<PostRecord>, StoreError> {
        match self {
            Self::Mongo(database) => database.posts_with_hashtag(tag, limit).await,
            Self::Memory(memory) => Ok(memory.posts_with_hashtag(tag, limit).await),
        }
    }

    pub async fn follow_hashtag(&self, user_id: &str, tag: &str) -> Result<(), StoreError> {
        match self {
            Self::Mongo(database) => database.follow_hashtag(user_id, tag).await,
            Self::Memory(memory) => {
                memory.follow_hashtag(user_id, tag).await;
                Ok(())
            }
        }
    }

    pub async fn unfollow_hashtag(&self, user_id: &str, tag: &str) -> Result<(), StoreError> {
        match self {
            Self::Mongo(database) => database.unfollow_hashtag(user_id, tag).await,
            Self::Memory(memory) => {
                memory.unfollow_hashtag(user_id, tag).await;
                Ok(())
            }
        }
    }

    pub async fn followed_hashtags(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        match self {
            Self::Mongo(database) => database.followed_hashtags(user_id).await,
            Self::Memory(memory) => Ok(memory.followed_hashtags(user_id).await),
        }
    }
}

#[derive(Clone)]
pub struct Database {
    client: Client,
    name: String,
}

impl Database {
    pub async fn new(connection_string: &str, name: &str) -> Result<Self, StoreError> {
        let mut client_options = ClientOptions::parse(connection_string).await?;
        let server_api = ServerApi::builder().version(ServerApiVersion::V1).build();
        client_options.server_api = Some(server_api);

        let client = Client::with_options(client_options)?;

        Ok(Self {
            client,
            name: name.to_owned(),
        })
    }

    fn posts(&self) -> Collection<PostRecord> {
        self.client.database(&self.name).collection("posts")
    }

    /// Untyped view of the posts collection, so one odd document can't fail a
    /// whole read.
    fn raw_posts(&self) -> Collection<Document> {
        self.client.database(&self.name).collection("posts")
    }

    fn followed(&self) -> Collection<FollowedHashtag> {
        self.client.database(&self.name).collection("followed_hashtags")
    }

    pub async fn fetch_posts(&self, window: Option<u32>) -> Result<Vec<PostRecord>, StoreError> {
        let posts = self.raw_posts();
        let mut find = posts.find(doc! {}).sort(doc! { "created_at": -1 });
        if let Some(window) = window {
            find = find.limit(i64::from(window));
        }

        let cursor = find.await?;
        Ok(decode_posts(cursor.try_collect().await?))
    }

    pub async fn insert_post(&self, post: &PostRecord) -> Result<(), StoreError> {
        self.posts().insert_one(post).await?;

        Ok(())
    }

    pub async fn posts_with_hashtag(&self, tag: &str, limit: u32) -> Result<Vec<PostRecord>, StoreError> {
        let cursor = self
            .raw_posts()
            .find(hashtag_filter(tag))
            .sort(doc! { "created_at": -1 })
            .limit(i64::from(limit))
            .await?;

        Ok(decode_posts(cursor.try_collect().await?))
    }

    pub async fn follow_hashtag(&self, user_id: &str, tag: &str) -> Result<(), StoreError> {
        self.followed()
            .update_one(
                doc! { "user_id": user_id, "tag": tag },
                doc! { "$set": { "user_id": user_id, "tag": tag } },
            )
            .upsert(true)
            .await?;

        Ok(())
    }

    pub async fn unfollow_hashtag(&self, user_id: &str, tag: &str) -> Result<(), StoreError> {
        self.followed()
            .delete_one(doc! { "user_id": user_id, "tag": tag })
            .await?;

        Ok(())
    }

    pub async fn followed_hashtags(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let cursor = self
            .followed()
            .find(doc! { "user_id": user_id })
            .sort(doc! { "tag": 1 })
            .await?;
        let followed = cursor.try_collect::<Vec<_>>().await?;

        Ok(followed.into_iter().map(|entry| entry.tag).collect())
    }
}

/// Matches a canonical tag against stored tags the way `normalize_tag` would
/// read them. Older documents may carry the `#`, mixed case or padding.
fn hashtag_filter(tag: &str) -> Document {
    doc! {
        "hashtags": { "$regex": format!(r"^\s*#*\s*{tag}\s*$"), "$options": "i" }
    }
}

fn decode_posts(documents: Vec<Document>) -> Vec<PostRecord> {
    documents
        .into_iter()
        .filter_map(|document| match bson::from_document::<PostRecord>(document) {
            Ok(post) => Some(post),
            Err(err) => {
                tracing::warn!(err = %err, "skipping malformed post document");
                None
            }
        })
        .collect()
}

/// Process-local store for development and tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    posts: Arc<RwLock<Vec<PostRecord>>>,
    followed: Arc<RwLock<HashMap<String, BTreeSet<String>>>>,
}

impl MemoryStore {
    async fn fetch_posts(&self, window: Option<u32>) -> Vec<PostRecord> {
        let mut posts = self.posts.read().await.clone();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(window) = window {
            posts.truncate(window as usize);
        }
        posts
    }

    async fn insert_post(&self, post: PostRecord) {
        self.posts.write().await.push(post);
    }

    async fn posts_with_hashtag(&self, tag: &str, limit: u32) -> Vec<PostRecord> {
        self.fetch_posts(None)
            .await
            .into_iter()
            .filter(|post| {
                post.hashtags
                    .iter()
                    .any(|raw| normalize_tag(raw).as_deref() == Some(tag))
            })
            .take(limit as usize)
            .collect()
    }

    async fn follow_hashtag(&self, user_id: &str, tag: &str) {
        self.followed
            .write()
            .await
            .entry(user_id.to_owned())
            .or_default()
            .insert(tag.to_owned());
    }

    async fn unfollow_hashtag(&self, user_id: &str, tag: &str) {
        if let Some(tags) = self.followed.write().await.get_mut(user_id) {
            tags.remove(tag);
        }
    }

    async fn followed_hashtags(&self, user_id: &str) -> Vec<String> {
        self.followed
            .read()
            .await
            .get(user_id)
            .map(|tags| tags.iter().cloned().collect())
            .unwrap_or_default()
    }
}
