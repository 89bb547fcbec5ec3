//! Sub-resource locator caching observed through whole requests.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use resource_runtime::config::CacheAgeSetting;
use resource_runtime::dispatch::Instance;
use resource_runtime::{RequestContext, Resource, ResourceType, RuntimeConfig, SubResource};

use common::{app, app_with, body_text, get};

static REVIEW_MODELS: AtomicUsize = AtomicUsize::new(0);

struct Reviews {
    item: String,
}

impl ResourceType for Reviews {
    fn resource() -> Resource {
        REVIEW_MODELS.fetch_add(1, Ordering::SeqCst);
        Resource::root().get(|_: &RequestContext, Instance(reviews): Instance<Reviews>| {
            format!("reviews of {}", reviews.item)
        })
    }
}

struct Ratings;

impl ResourceType for Ratings {
    fn resource() -> Resource {
        Resource::root().get(|_: &RequestContext| "5 stars")
    }
}

fn counted_model(calls: Arc<AtomicUsize>) -> Resource {
    Resource::new("tags").locator(move |_: &RequestContext| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(SubResource::model(Resource::root().get(|_: &RequestContext| "tags")))
    })
}

#[tokio::test]
async fn test_type_locator_expanded_once() {
    let app = app(vec![Resource::new("ratings").locator(|_: &RequestContext| Ok(SubResource::of::<Ratings>()))]);

    for _ in 0..5 {
        let response = app.handle(get("/ratings")).await;
        assert_eq!(body_text(&response).as_deref(), Some("5 stars"));
    }
    let stats = app.cache_stats();
    assert_eq!(stats.expansions, 1);
    assert_eq!(stats.hits, 4);
}

#[tokio::test]
async fn test_instance_locator_reuses_tree() {
    let app = app(vec![Resource::new("items").sub_resource("{id}/reviews", |ctx: &RequestContext| {
        let item = ctx.path_params().get("id").unwrap_or_default().to_string();
        Ok(SubResource::instance(Reviews { item }))
    })]);
    let before = REVIEW_MODELS.load(Ordering::SeqCst);

    let lamp = app.handle(get("/items/lamp/reviews")).await;
    let desk = app.handle(get("/items/desk/reviews")).await;
    assert_eq!(body_text(&lamp).as_deref(), Some("reviews of lamp"));
    assert_eq!(body_text(&desk).as_deref(), Some("reviews of desk"));

    assert_eq!(REVIEW_MODELS.load(Ordering::SeqCst) - before, 1);
    assert_eq!(app.cache_stats().expansions, 1);
}

#[tokio::test]
async fn test_identical_trees_for_cached_type() {
    let app = app(vec![Resource::new("ratings").locator(|_: &RequestContext| Ok(SubResource::of::<Ratings>()))]);
    let first = app.router().match_path(&mut get("/ratings")).unwrap();
    let second = app.router().match_path(&mut get("/ratings")).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_fresh_models_not_cached_by_default() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = app(vec![counted_model(calls.clone())]);

    for _ in 0..4 {
        assert_eq!(app.handle(get("/tags")).await.status(), StatusCode::OK);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(app.cache_stats().expansions, 4);
    assert_eq!(app.cache_stats().entries, 0);
}

#[tokio::test]
async fn test_fresh_models_cached_when_enabled() {
    let mut config = RuntimeConfig::default();
    config.routing.model_caching = true;
    let app = app_with(&config, vec![counted_model(Arc::new(AtomicUsize::new(0)))]);

    for _ in 0..4 {
        app.handle(get("/tags")).await;
    }
    assert_eq!(app.cache_stats().expansions, 1);
    assert_eq!(app.cache_stats().hits, 3);
}

#[tokio::test]
async fn test_type_under_fresh_model_is_cached_once() {
    let app = app(vec![
        Resource::new("ratings").locator(|_: &RequestContext| Ok(SubResource::of::<Ratings>())),
        Resource::new("tags").locator(|_: &RequestContext| {
            Ok(SubResource::model(Resource::root().sub_resource("{tag}", |_: &RequestContext| {
                Ok(SubResource::of::<Ratings>())
            })))
        }),
    ]);

    app.handle(get("/ratings")).await;
    for tag in 0..100 {
        let response = app.handle(get(&format!("/tags/t{}", tag))).await;
        assert_eq!(body_text(&response).as_deref(), Some("5 stars"));
    }
    let before = app.cache_stats();
    // One fresh model per tag request, plus one tree per locator position.
    assert_eq!(before.expansions, 102);
    assert_eq!(before.entries, 2);

    app.handle(get("/ratings")).await;
    let after = app.cache_stats();
    assert_eq!(after.expansions, before.expansions);
    assert_eq!(after.hits, before.hits + 1);
}

#[tokio::test]
async fn test_shared_model_not_cached_by_default() {
    let calls = Arc::new(AtomicUsize::new(0));
    let shared = Arc::new(Resource::root().get(|_: &RequestContext| "featured"));
    let counter = calls.clone();
    let app = app(vec![Resource::new("featured").locator(move |_: &RequestContext| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(SubResource::shared(shared.clone()))
    })]);

    for _ in 0..5 {
        let response = app.handle(get("/featured")).await;
        assert_eq!(body_text(&response).as_deref(), Some("featured"));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(app.cache_stats().expansions, 5);
    assert_eq!(app.cache_stats().entries, 0);
}

#[tokio::test]
async fn test_shared_model_cached_when_enabled() {
    let mut config = RuntimeConfig::default();
    config.routing.model_caching = true;
    let shared = Arc::new(Resource::root().get(|_: &RequestContext| "featured"));
    let app = app_with(
        &config,
        vec![Resource::new("featured").locator(move |_: &RequestContext| Ok(SubResource::shared(shared.clone())))],
    );

    for _ in 0..5 {
        app.handle(get("/featured")).await;
    }
    assert_eq!(app.cache_stats().expansions, 1);
    assert_eq!(app.cache_stats().entries, 1);
}

#[tokio::test(start_paused = true)]
async fn test_aged_models_expire() {
    let mut config = RuntimeConfig::default();
    config.routing.model_caching = true;
    config.routing.locator_cache_age = Some(CacheAgeSetting::Seconds(1));
    let app = app_with(&config, vec![counted_model(Arc::new(AtomicUsize::new(0)))]);

    for _ in 0..3 {
        app.handle(get("/tags")).await;
        tokio::time::advance(Duration::from_millis(1500)).await;
    }
    assert_eq!(app.cache_stats().expansions, 3);

    for _ in 0..3 {
        app.handle(get("/tags")).await;
        tokio::time::advance(Duration::from_millis(100)).await;
    }
    assert_eq!(app.cache_stats().expansions, 4);
}

#[tokio::test]
async fn test_non_numeric_age_disables_caching() {
    let mut config = RuntimeConfig::default();
    config.routing.locator_cache_age = Some(CacheAgeSetting::Text("eventually".to_string()));
    let app = app_with(
        &config,
        vec![Resource::new("ratings").locator(|_: &RequestContext| Ok(SubResource::of::<Ratings>()))],
    );

    app.handle(get("/ratings")).await;
    app.handle(get("/ratings")).await;
    assert_eq!(app.cache_stats().expansions, 2);
}

#[tokio::test]
async fn test_failing_locator_is_server_error() {
    let app = app(vec![Resource::new("broken").locator(|_: &RequestContext| {
        Err(resource_runtime::HandlerError::msg("store unavailable"))
    })]);
    let response = app.handle(get("/broken")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.cache_stats().entries, 0);
}
