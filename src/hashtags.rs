//! Hashtag extraction, counting and ranking over posts that are already in
//! memory. Nothing here touches the store.
//!
//! Every tag is compared in its canonical form: trimmed, lower-cased and
//! without leading `#`. The `#` is put back only when a tag is rendered.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, de::IgnoredAny};

use crate::models::{Direction, HashtagCount, PostRecord};

/// Canonical form of a raw tag, or `None` if nothing is left of it.
#[must_use]
pub fn normalize_tag(raw: &str) -> Option<String> {
    let tag = raw.trim().trim_start_matches('#').trim();
    if tag.is_empty() {
        return None;
    }
    Some(tag.to_lowercase())
}

/// Like [`normalize_tag`], but also rejects anything that isn't made of word
/// characters. Used wherever a tag enters from outside.
#[must_use]
pub fn parse_tag(raw: &str) -> Option<String> {
    normalize_tag(raw).filter(|tag| tag.chars().all(is_tag_char))
}

#[must_use]
pub fn display_tag(tag: &str) -> String {
    format!("#{}", tag.trim_start_matches('#'))
}

fn is_tag_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

/// Collects `#word` tokens from free text, canonicalized, in order of first
/// appearance.
#[must_use]
pub fn extract_from_content(content: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let tokens = content
        .split(|c: char| !(is_tag_char(c) || c == '#'))
        .filter(|token| token.starts_with('#'));

    for token in tokens {
        for tag in token.split('#').filter_map(parse_tag) {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
    }

    tags
}

/// The stored tag strings of one post. Absent fields were already turned into
/// an empty list on deserialization.
pub fn tags_of(post: &PostRecord) -> impl Iterator<Item = &str> {
    post.hashtags.iter().map(String::as_str)
}

/// Tally every tag occurrence across `posts`, duplicates within one post
/// included.
pub fn count_hashtags<'a>(posts: impl IntoIterator<Item = &'a PostRecord>) -> HashMap<String, u64> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for post in posts {
        for raw in tags_of(post) {
            let Some(tag) = normalize_tag(raw) else {
                tracing::debug!(post = %post.id, "skipping empty hashtag");
                continue;
            };
            *counts.entry(tag).or_default() += 1;
        }
    }
    counts
}

/// Orders counts by `direction`, ties broken by ascending tag, and keeps at
/// most `limit` entries.
#[must_use]
pub fn rank(counts: HashMap<String, u64>, direction: Direction, limit: Option<usize>) -> Vec<HashtagCount> {
    let mut ranked = counts
        .into_iter()
        .map(|(tag, count)| HashtagCount { tag, count })
        .collect::<Vec<_>>();

    ranked.sort_by(|a, b| {
        let by_count = match direction {
            Direction::Desc => b.count.cmp(&a.count),
            Direction::Asc => a.count.cmp(&b.count),
        };
        by_count.then_with(|| a.tag.cmp(&b.tag))
    });

    if let Some(limit) = limit {
        ranked.truncate(limit);
    }
    ranked
}

#[must_use]
pub fn compute_trending_hashtags(
    posts: &[PostRecord],
    direction: Direction,
    limit: Option<usize>,
) -> Vec<HashtagCount> {
    rank(count_hashtags(posts), direction, limit)
}

/// Tags containing `query` (normalized the same way as tags), most frequent
/// first, at most `limit` of them when given. An empty query matches
/// everything.
#[must_use]
pub fn search_hashtags(posts: &[PostRecord], query: &str, limit: Option<usize>) -> Vec<HashtagCount> {
    let needle = normalize_tag(query).unwrap_or_default();
    let mut counts = count_hashtags(posts);
    counts.retain(|tag, _| tag.contains(&needle));
    rank(counts, Direction::Desc, limit)
}

/// Deserializes a post's hashtag field without ever failing the post: a
/// missing, null or mistyped field becomes an empty list and non-string
/// entries are dropped.
pub fn lenient_tags<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Entry {
        Text(String),
        Other(IgnoredAny),
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Field {
        List(Vec<Entry>),
        Other(IgnoredAny),
    }

    let entries = match Option::<Field>::deserialize(deserializer)? {
        Some(Field::List(entries)) => entries,
        Some(Field::Other(_)) => {
            tracing::warn!("hashtags field is not a list, treating as empty");
            return Ok(Vec::new());
        }
        None => return Ok(Vec::new()),
    };

    let mut tags = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry {
            Entry::Text(tag) => tags.push(tag),
            Entry::Other(_) => tracing::warn!("skipping non-string hashtag entry"),
        }
    }
    Ok(tags)
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use chrono::Utc;

    use super::*;

    fn post(tags: &[&str]) -> PostRecord {
        PostRecord::new(
            "author".into(),
            String::new(),
            tags.iter().map(ToString::to_string).collect(),
        )
    }

    fn fixture() -> Vec<PostRecord> {
        vec![post(&["#ai", "#ai", "#news"]), post(&["#ai"]), post(&[])]
    }

    fn mixed() -> Vec<PostRecord> {
        vec![
            post(&["#Rust", "rust", "#jobs", "#hiring"]),
            post(&["#AI", "#rust", "#remote"]),
            post(&["#jobs", "#ai", "##ai", "   "]),
            post(&["#hiring", "#remote", "#hiring"]),
            post(&[]),
        ]
    }

    #[test]
    fn normalize_strips_prefix_and_case() {
        assert_eq!(normalize_tag("#AI").as_deref(), Some("ai"));
        assert_eq!(normalize_tag("  ##Rust ").as_deref(), Some("rust"));
        assert_eq!(normalize_tag("news").as_deref(), Some("news"));
        assert_eq!(normalize_tag("#"), None);
        assert_eq!(normalize_tag("  "), None);
    }

    #[test]
    fn parse_rejects_non_word_tags() {
        assert_eq!(parse_tag("#machine_learning").as_deref(), Some("machine_learning"));
        assert_eq!(parse_tag("#rust-lang").as_deref(), Some("rust-lang"));
        assert_eq!(parse_tag("#a b"), None);
        assert_eq!(parse_tag("#.*"), None);
    }

    #[test]
    fn display_adds_single_prefix() {
        assert_eq!(display_tag("ai"), "#ai");
        assert_eq!(display_tag("#ai"), "#ai");
    }

    #[test]
    fn extracts_tags_from_content() {
        let tags = extract_from_content("Hiring! #Rust #remote, also #rust and C# (#AI#ML)");
        assert_eq!(tags, vec!["rust", "remote", "ai", "ml"]);
        assert!(extract_from_content("no tags here").is_empty());
        assert!(extract_from_content("# lone hash").is_empty());
    }

    #[test]
    fn counts_every_occurrence() {
        let posts = mixed();
        let occurrences = posts
            .iter()
            .flat_map(tags_of)
            .filter(|tag| normalize_tag(tag).is_some())
            .count() as u64;

        let ranked = compute_trending_hashtags(&posts, Direction::Desc, None);
        assert_eq!(ranked.iter().map(|entry| entry.count).sum::<u64>(), occurrences);

        let mut tags = ranked.iter().map(|entry| entry.tag.as_str()).collect::<Vec<_>>();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), ranked.len());
    }

    #[test]
    fn sorted_in_requested_direction() {
        let posts = mixed();

        let desc = compute_trending_hashtags(&posts, Direction::Desc, None);
        assert!(desc.windows(2).all(|pair| pair[0].count >= pair[1].count));

        let asc = compute_trending_hashtags(&posts, Direction::Asc, None);
        assert!(asc.windows(2).all(|pair| pair[0].count <= pair[1].count));
    }

    #[test]
    fn ties_break_by_tag() {
        let ranked = compute_trending_hashtags(&mixed(), Direction::Desc, None);
        let tags = ranked.iter().map(|entry| entry.tag.as_str()).collect::<Vec<_>>();
        assert_eq!(tags, vec!["ai", "hiring", "rust", "jobs", "remote"]);

        let ranked = compute_trending_hashtags(&mixed(), Direction::Asc, None);
        let tags = ranked.iter().map(|entry| entry.tag.as_str()).collect::<Vec<_>>();
        assert_eq!(tags, vec!["jobs", "remote", "ai", "hiring", "rust"]);
    }

    #[test]
    fn same_input_same_output() {
        let posts = mixed();
        assert_eq!(
            compute_trending_hashtags(&posts, Direction::Asc, Some(3)),
            compute_trending_hashtags(&posts, Direction::Asc, Some(3)),
        );
    }

    #[test]
    fn empty_input() {
        assert!(compute_trending_hashtags(&[], Direction::Desc, Some(10)).is_empty());
        assert!(compute_trending_hashtags(&[post(&[])], Direction::Desc, Some(10)).is_empty());
    }

    #[test]
    fn truncation_keeps_the_top_entries() {
        let posts = mixed();
        let full = compute_trending_hashtags(&posts, Direction::Desc, None);
        let top = compute_trending_hashtags(&posts, Direction::Desc, Some(2));
        assert_eq!(top, full[..2]);

        let bottom = compute_trending_hashtags(&posts, Direction::Asc, Some(2));
        assert!(bottom.iter().all(|entry| entry.count == 2));
        assert_eq!(compute_trending_hashtags(&posts, Direction::Desc, Some(50)).len(), full.len());
    }

    #[test]
    fn trending_scenario() {
        let ranked = compute_trending_hashtags(&fixture(), Direction::Desc, None);
        assert_eq!(
            ranked,
            vec![
                HashtagCount { tag: "ai".into(), count: 3 },
                HashtagCount { tag: "news".into(), count: 1 },
            ]
        );
        assert_eq!(
            serde_json::to_value(&ranked).unwrap(),
            serde_json::json!([{ "tag": "#ai", "count": 3 }, { "tag": "#news", "count": 1 }])
        );
    }

    #[test]
    fn search_scenario() {
        let found = search_hashtags(&fixture(), "ai", Some(10));
        assert_eq!(found, vec![HashtagCount { tag: "ai".into(), count: 3 }]);

        assert_eq!(search_hashtags(&fixture(), "#AI", Some(10)), found);
        assert_eq!(search_hashtags(&fixture(), "", None).len(), 2);
        assert!(search_hashtags(&fixture(), "rust", Some(10)).is_empty());
    }

    #[test]
    fn search_respects_limit() {
        let posts = mixed();
        let found = search_hashtags(&posts, "r", Some(1));
        assert_eq!(found, vec![HashtagCount { tag: "hiring".into(), count: 3 }]);
    }

    #[test]
    fn malformed_tag_fields_do_not_fail_the_post() {
        let base = doc! {
            "_id": bson::oid::ObjectId::new(),
            "author_id": "u1",
            "content": "hello",
            "created_at": bson::DateTime::from_chrono(Utc::now()),
        };

        let missing = bson::from_document::<PostRecord>(base.clone()).unwrap();
        assert!(missing.hashtags.is_empty());

        let mut null = base.clone();
        null.insert("hashtags", bson::Bson::Null);
        assert!(bson::from_document::<PostRecord>(null).unwrap().hashtags.is_empty());

        let mut wrong_type = base.clone();
        wrong_type.insert("hashtags", "#ai");
        assert!(bson::from_document::<PostRecord>(wrong_type).unwrap().hashtags.is_empty());

        let mut mixed_entries = base;
        mixed_entries.insert("hashtags", bson::bson!(["#ai", 7, null, "#news"]));
        let post = bson::from_document::<PostRecord>(mixed_entries).unwrap();
        assert_eq!(post.hashtags, vec!["#ai", "#news"]);
    }
}
