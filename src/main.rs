#![deny(clippy::all, clippy::pedantic)]

mod config;
mod database;
mod error;
mod hashtags;
mod models;
mod trending;
mod view;

use axum::{
    Extension, Json, Router,
    extract::{FromRequestParts, Path, Query},
    http::{StatusCode, request::Parts},
    routing::{get, put},
};
use config::{Config, StoreBackend};
use database::{Database, MemoryStore, PostStore, StoreError};
use error::ApiError;
use models::{Direction, HashtagCount, NewPost, PostRecord, PostResponse};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use trending::FetchSettings;
use view::{RenderedView, TrendingBoard, valid_view_id};

const ACTOR_HEADER: &str = "x-actor-id";
const DEFAULT_TRENDING_LIMIT: usize = 10;
const DEFAULT_SEARCH_LIMIT: usize = 20;
const DEFAULT_FEED_LIMIT: u32 = 20;
const MAX_LIMIT: usize = 100;
const MAX_FEED_LIMIT: u32 = 100;

/// The user a request acts on behalf of, taken from the `x-actor-id` header.
pub struct Actor(pub String);

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Self(value.to_owned()))
            .ok_or(ApiError::MissingActor)
    }
}

#[derive(Deserialize)]
struct TrendingParams {
    #[serde(default)]
    direction: Direction,
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct FeedParams {
    hashtag: Option<String>,
    limit: Option<u32>,
}

#[derive(Deserialize)]
struct RefreshParams {
    #[serde(default)]
    direction: Direction,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct RefreshResponse {
    seq: u64,
    rendered: bool,
    view: Option<RenderedView>,
}

/// `0` asks for every tag.
fn ranking_limit(limit: Option<usize>, default: usize) -> Option<usize> {
    match limit.unwrap_or(default) {
        0 => None,
        limit => Some(limit.min(MAX_LIMIT)),
    }
}

async fn trending_route(
    store: Extension<PostStore>,
    settings: Extension<FetchSettings>,
    params: Query<TrendingParams>,
) -> Json<Vec<HashtagCount>> {
    let limit = ranking_limit(params.limit, DEFAULT_TRENDING_LIMIT);
    let hashtags = trending::trending(&store, *settings, params.direction, limit).await;

    Json(hashtags)
}

async fn search_route(
    store: Extension<PostStore>,
    settings: Extension<FetchSettings>,
    params: Query<SearchParams>,
) -> Json<Vec<HashtagCount>> {
    let limit = ranking_limit(params.limit, DEFAULT_SEARCH_LIMIT);
    let hashtags = trending::search(&store, *settings, &params.q, limit).await;

    Json(hashtags)
}

async fn create_post_route(
    store: Extension<PostStore>,
    Actor(author_id): Actor,
    Json(new_post): Json<NewPost>,
) -> Result<(StatusCode, Json<PostResponse>), ApiError> {
    let content = new_post.content.trim();
    if content.is_empty() {
        return Err(ApiError::EmptyPost);
    }

    let hashtags = match new_post.hashtags {
        Some(raw_tags) => {
            let mut hashtags: Vec<String> = Vec::with_capacity(raw_tags.len());
            for raw in raw_tags {
                let tag = hashtags::parse_tag(&raw).ok_or(ApiError::InvalidHashtag(raw))?;
                if !hashtags.contains(&tag) {
                    hashtags.push(tag);
                }
            }
            hashtags
        }
        None => hashtags::extract_from_content(content),
    };

    let post = PostRecord::new(author_id, content.to_owned(), hashtags);
    store.insert_post(&post).await?;
    tracing::debug!(post = %post.id, author = %post.author_id, "created post");

    Ok((StatusCode::CREATED, Json(post.into())))
}

async fn list_posts_route(
    store: Extension<PostStore>,
    params: Query<FeedParams>,
) -> Result<Json<Vec<PostResponse>>, ApiError> {
    // The store reads a limit of 0 as no limit at all.
    let limit = params.limit.unwrap_or(DEFAULT_FEED_LIMIT).clamp(1, MAX_FEED_LIMIT);
    let posts = match &params.hashtag {
        Some(raw) => {
            let tag = hashtags::parse_tag(raw).ok_or_else(|| ApiError::InvalidHashtag(raw.clone()))?;
            store.posts_with_hashtag(&tag, limit).await?
        }
        None => store.fetch_posts(Some(limit)).await?,
    };

    Ok(Json(posts.into_iter().map(PostResponse::from).collect()))
}

async fn followed_route(
    store: Extension<PostStore>,
    Actor(user_id): Actor,
) -> Result<Json<Vec<String>>, ApiError> {
    let followed = store.followed_hashtags(&user_id).await?;

    Ok(Json(followed.iter().map(|tag| hashtags::display_tag(tag)).collect()))
}

async fn follow_route(
    store: Extension<PostStore>,
    Actor(user_id): Actor,
    Path(raw): Path<String>,
) -> Result<StatusCode, ApiError> {
    let tag = hashtags::parse_tag(&raw).ok_or(ApiError::InvalidHashtag(raw))?;
    store.follow_hashtag(&user_id, &tag).await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn unfollow_route(
    store: Extension<PostStore>,
    Actor(user_id): Actor,
    Path(raw): Path<String>,
) -> Result<StatusCode, ApiError> {
    let tag = hashtags::parse_tag(&raw).ok_or(ApiError::InvalidHashtag(raw))?;
    store.unfollow_hashtag(&user_id, &tag).await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn refresh_view_route(
    store: Extension<PostStore>,
    settings: Extension<FetchSettings>,
    board: Extension<TrendingBoard>,
    Path(view): Path<String>,
    params: Query<RefreshParams>,
) -> Result<Json<RefreshResponse>, ApiError> {
    if !valid_view_id(&view) {
        return Err(ApiError::InvalidView(view));
    }

    let ticket = board.begin(&view);
    let limit = ranking_limit(params.limit, DEFAULT_TRENDING_LIMIT);
    let hashtags = trending::trending(&store, *settings, params.direction, limit).await;
    let rendered = board.complete(&ticket, params.direction, hashtags);

    Ok(Json(RefreshResponse {
        seq: ticket.seq(),
        rendered,
        view: board.rendered(&view),
    }))
}

async fn view_route(
    board: Extension<TrendingBoard>,
    Path(view): Path<String>,
) -> Result<Json<RenderedView>, ApiError> {
    if !valid_view_id(&view) {
        return Err(ApiError::InvalidView(view));
    }
    board.rendered(&view).map(Json).ok_or(ApiError::ViewNotFound)
}

pub fn app(store: PostStore, settings: FetchSettings) -> Router {
    Router::new()
        .route("/hashtags/trending", get(trending_route))
        .route("/hashtags/search", get(search_route))
        .route("/hashtags/followed", get(followed_route))
        .route("/hashtags/followed/{tag}", put(follow_route).delete(unfollow_route))
        .route("/posts", get(list_posts_route).post(create_post_route))
        .route("/views/{view}/trending", get(view_route).post(refresh_view_route))
        .layer(Extension(store))
        .layer(Extension(settings))
        .layer(Extension(TrendingBoard::default()))
        .layer(TraceLayer::new_for_http())
}

/// Connects the configured post store and builds the router.
pub async fn setup(config: &Config) -> Result<Router, StoreError> {
    let store = match &config.store {
        StoreBackend::Mongo { url, database } => PostStore::Mongo(Database::new(url, database).await?),
        StoreBackend::Memory => {
            tracing::warn!("using in-memory post store, posts will not survive a restart");
            PostStore::Memory(MemoryStore::default())
        }
    };

    Ok(app(store, config.fetch))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load()?;
    let app = setup(&config).await?;

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "listening");

    axum::serve(listener, app).await?;

    Ok(())
}
