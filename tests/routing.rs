//! Routing and method selection through the application pipeline.

mod common;

use axum::http::{Method, StatusCode};
use resource_runtime::dispatch::Path;
use resource_runtime::routing::ModelError;
use resource_runtime::{Application, Binding, RequestContext, Resource, RuntimeConfig};

use common::{allow, app, app_with, body_text, content_type, get, request};

fn catalog() -> Resource {
    Resource::new("items")
        .get(|_: &RequestContext| "all items")
        .bind(Binding::post(|_: &RequestContext, body: String| body).consumes(["text/plain"]))
        .child(Resource::new("new").get(|_: &RequestContext| "form"))
        .child(Resource::new("{id: [0-9]+}").get(|_: &RequestContext, Path(id): Path<u32>| {
            format!("item {}", id)
        }))
        .child(Resource::new("{slug}").get(|_: &RequestContext, Path(slug): Path<String>| {
            format!("slug {}", slug)
        }))
}

#[tokio::test]
async fn test_static_and_template_paths() {
    let app = app(vec![catalog()]);

    let response = app.handle(get("/items")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(&response).as_deref(), Some("all items"));

    let response = app.handle(get("/items/42")).await;
    assert_eq!(body_text(&response).as_deref(), Some("item 42"));

    let response = app.handle(get("/items/lamp")).await;
    assert_eq!(body_text(&response).as_deref(), Some("slug lamp"));
}

#[tokio::test]
async fn test_path_values_are_decoded() {
    let app = app(vec![catalog()]);
    let response = app.handle(get("/items/desk%20lamp")).await;
    assert_eq!(body_text(&response).as_deref(), Some("slug desk lamp"));

    let response = app.handle(get("/items/a%2Fb")).await;
    assert_eq!(body_text(&response).as_deref(), Some("slug a/b"));
}

#[tokio::test]
async fn test_literal_sibling_wins() {
    let app = app(vec![catalog()]);
    let response = app.handle(get("/items/new")).await;
    assert_eq!(body_text(&response).as_deref(), Some("form"));
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let app = app(vec![catalog()]);
    let response = app.handle(get("/orders")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.handle(get("/items/1/2")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_method_not_allowed_lists_methods() {
    let app = app(vec![catalog()]);
    let response = app.handle(request(Method::DELETE, "/items")).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(allow(&response).as_deref(), Some("GET, HEAD, OPTIONS, POST"));
}

#[tokio::test]
async fn test_options_reports_allowed_methods() {
    let app = app(vec![catalog()]);
    let response = app.handle(request(Method::OPTIONS, "/items")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(allow(&response).as_deref(), Some("GET, HEAD, OPTIONS, POST"));
    assert!(response.get_entity().is_none());
}

#[tokio::test]
async fn test_head_served_by_get() {
    let app = app(vec![catalog()]);
    let response = app.handle(request(Method::HEAD, "/items")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(content_type(&response).as_deref(), Some("text/plain"));
    assert!(response.get_entity().is_none());
}

#[tokio::test]
async fn test_unsupported_media_type() {
    let app = app(vec![catalog()]);
    let ctx = request(Method::POST, "/items")
        .with_header("content-type", "application/json")
        .with_body("{}");
    let response = app.handle(ctx).await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let ctx = request(Method::POST, "/items")
        .with_header("content-type", "text/plain; charset=utf-8")
        .with_body("lamp");
    let response = app.handle(ctx).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(&response).as_deref(), Some("lamp"));
}

#[tokio::test]
async fn test_not_acceptable() {
    let app = app(vec![Resource::new("doc")
        .bind(Binding::get(|_: &RequestContext| "<p/>").produces(["text/html"]))]);
    let ctx = get("/doc").with_header("accept", "application/json");
    let response = app.handle(ctx).await;
    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
}

#[tokio::test]
async fn test_accept_selects_binding() {
    let app = app(vec![Resource::new("doc")
        .bind(Binding::get(|_: &RequestContext| "<p/>").produces(["text/html"]))
        .bind(Binding::get(|_: &RequestContext| "plain").produces(["text/plain"]))]);

    let response = app.handle(get("/doc").with_header("accept", "text/plain, text/html;q=0.5")).await;
    assert_eq!(body_text(&response).as_deref(), Some("plain"));
    assert_eq!(content_type(&response).as_deref(), Some("text/plain"));

    let response = app.handle(get("/doc").with_header("accept", "text/*, text/plain;q=0")).await;
    assert_eq!(body_text(&response).as_deref(), Some("<p/>"));
}

#[tokio::test]
async fn test_malformed_accept_is_bad_request() {
    let app = app(vec![catalog()]);
    let response = app.handle(get("/items").with_header("accept", "text/html;q=2")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[test]
fn test_ambiguous_bindings_rejected() {
    let resource = Resource::new("twice")
        .get(|_: &RequestContext| "a")
        .get(|_: &RequestContext| "b");
    let err = Application::builder(&RuntimeConfig::default())
        .resource(resource)
        .build()
        .unwrap_err();
    assert!(matches!(err, ModelError::Ambiguous { ref method, .. } if *method == Method::GET));
}

#[test]
fn test_broader_binding_declared_later_is_ambiguous() {
    let resource = Resource::new("doc")
        .bind(Binding::get(|_: &RequestContext| "plain").produces(["text/plain"]))
        .bind(Binding::get(|_: &RequestContext| "any text").produces(["text/*"]));
    let err = Application::builder(&RuntimeConfig::default())
        .resource(resource)
        .build()
        .unwrap_err();
    assert!(matches!(err, ModelError::Ambiguous { .. }));
}

#[tokio::test]
async fn test_narrower_binding_declared_later_overrides() {
    let app = app(vec![Resource::new("doc")
        .bind(Binding::get(|_: &RequestContext| "any text").produces(["text/*"]))
        .bind(Binding::get(|_: &RequestContext| "plain").produces(["text/plain"]))]);

    let response = app.handle(get("/doc").with_header("accept", "text/plain")).await;
    assert_eq!(body_text(&response).as_deref(), Some("plain"));

    let response = app.handle(get("/doc").with_header("accept", "text/csv")).await;
    assert_eq!(body_text(&response).as_deref(), Some("any text"));
}

#[tokio::test]
async fn test_disabled_validation_keeps_first_binding() {
    let mut config = RuntimeConfig::default();
    config.routing.disable_validation = true;
    let app = app_with(
        &config,
        vec![Resource::new("twice")
            .get(|_: &RequestContext| "first")
            .get(|_: &RequestContext| "second")],
    );
    let response = app.handle(get("/twice")).await;
    assert_eq!(body_text(&response).as_deref(), Some("first"));
}

#[test]
fn test_invalid_template_rejected() {
    let err = Application::builder(&RuntimeConfig::default())
        .resource(Resource::new("{id").get(|_: &RequestContext| "x"))
        .build()
        .unwrap_err();
    assert!(matches!(err, ModelError::Template(_)));
}
