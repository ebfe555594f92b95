use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::hashtags::{self, display_tag, normalize_tag};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PostRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub author_id: String,
    pub content: String,
    #[serde(default, deserialize_with = "hashtags::lenient_tags")]
    pub hashtags: Vec<String>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl PostRecord {
    #[must_use]
    pub fn new(author_id: String, content: String, hashtags: Vec<String>) -> Self {
        Self {
            id: ObjectId::new(),
            author_id,
            content,
            hashtags,
            created_at: Utc::now(),
        }
    }
}

/// A tag and how many times it occurred in one aggregation run.
///
/// `tag` holds the canonical form; it is rendered with its `#` when
/// serialized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HashtagCount {
    #[serde(serialize_with = "serialize_display_tag")]
    pub tag: String,
    pub count: u64,
}

fn serialize_display_tag<S: Serializer>(tag: &str, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&display_tag(tag))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Desc,
    Asc,
}

#[derive(Debug, Deserialize)]
pub struct NewPost {
    pub content: String,
    #[serde(default)]
    pub hashtags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PostResponse {
    pub id: String,
    pub author_id: String,
    pub content: String,
    pub hashtags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<PostRecord> for PostResponse {
    fn from(post: PostRecord) -> Self {
        Self {
            id: post.id.to_hex(),
            author_id: post.author_id,
            content: post.content,
            hashtags: post
                .hashtags
                .iter()
                .filter_map(|raw| normalize_tag(raw))
                .map(|tag| display_tag(&tag))
                .collect(),
            created_at: post.created_at,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct FollowedHashtag {
    pub user_id: String,
    pub tag: String,
}
