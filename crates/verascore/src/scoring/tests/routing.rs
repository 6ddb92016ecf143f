use std::fs;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{Method, Request, StatusCode};
use axum::response::IntoResponse;
use tower::ServiceExt;

use super::common::*;

use crate::scoring::router::{factor_handler, ScoreQuery};
use crate::scoring::{scoring_router, DefinitionSource};

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request builds")
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .expect("request builds")
}

#[tokio::test]
async fn composite_route_scores_under_the_default_persona() {
    let router = scoring_router(service_with(DefinitionSource::Builtin));

    let response = router
        .oneshot(get("/api/v1/scoring/securities/ACME/scores"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["security_id"], "ACME");
    assert_eq!(payload["persona"], "balanced");
    assert_eq!(payload["config_generation"], 1);
    assert_eq!(payload["overall_score"], 58.0);
    assert_eq!(payload["factors"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn factor_route_returns_components_and_explanation() {
    let router = scoring_router(service_with(DefinitionSource::Builtin));

    let response = router
        .oneshot(get("/api/v1/scoring/securities/ACME/scores/valuation?persona=balanced"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["score"], 50.0);
    assert_eq!(payload["metrics_available"], 2);
    let pe = &payload["components"][0];
    assert_eq!(pe["metric_id"], "pe_ratio");
    assert_eq!(pe["display_value"], "15.00x");
    assert_eq!(pe["percentile_rank"], 37.5);
    assert_eq!(pe["peer_count"], 4);
    assert!(payload["explanation"]
        .as_str()
        .is_some_and(|text| text.starts_with("Valuation: 50.0/100 - Moderate")));
}

#[tokio::test]
async fn unknown_persona_and_security_are_not_found() {
    let router = scoring_router(service_with(DefinitionSource::Builtin));

    let response = router
        .clone()
        .oneshot(get("/api/v1/scoring/securities/ACME/scores?persona=speculator"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let payload = read_json_body(response).await;
    assert!(payload["error"]
        .as_str()
        .is_some_and(|message| message.contains("speculator")));

    let response = router
        .oneshot(get("/api/v1/scoring/securities/GHOST/scores"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn factor_handler_rejects_unknown_factor() {
    let service = service_with(DefinitionSource::Builtin);

    let result = factor_handler::<MemoryMetrics, StaticPeers>(
        State(service),
        Path(("ACME".to_string(), "momentum".to_string())),
        Query(ScoreQuery::default()),
    )
    .await;

    let err = result.err().expect("momentum is not configured");
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
    assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn configs_route_lists_the_active_snapshot() {
    let router = scoring_router(service_with(DefinitionSource::Builtin));

    let response = router
        .oneshot(get("/api/v1/scoring/configs"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["generation"], 1);
    assert_eq!(payload["factors"].as_array().map(Vec::len), Some(2));
    assert_eq!(payload["personas"][0]["profile"], "balanced");
    assert_eq!(payload["personas"][0]["is_default"], true);
    assert_eq!(payload["personas"][0]["factors"][0]["weight"], 0.6);
}

#[tokio::test]
async fn invalid_reload_is_rejected_with_issues() {
    let dir = tempfile::tempdir().expect("temp dir");
    fs::write(
        dir.path().join("valuation.yaml"),
        VALUATION_YAML.replace("weight: 0.5", "weight: 0.4"),
    )
    .expect("write definition");
    let service = service_with(DefinitionSource::Directory(dir.path().to_path_buf()));
    let router = scoring_router(service.clone());

    let response = router
        .oneshot(post("/api/v1/scoring/configs/reload"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = read_json_body(response).await;
    let issues = payload["issues"].as_array().expect("issues listed");
    assert!(!issues.is_empty());
    assert_eq!(issues[0]["scope"], "factor valuation v1");
    assert_eq!(service.engine().store().generation(), 1);
}

#[tokio::test]
async fn valid_reload_installs_the_directory_definitions() {
    let dir = tempfile::tempdir().expect("temp dir");
    fs::write(dir.path().join("quality.yaml"), QUALITY_YAML).expect("write factor");
    fs::write(
        dir.path().join("solo.yaml"),
        "profile: solo\nfactors:\n  - factor: quality\n    weight: 1.0\n",
    )
    .expect("write persona");
    fs::write(dir.path().join("notes.txt"), "ignored").expect("write notes");
    let service = service_with(DefinitionSource::Directory(dir.path().to_path_buf()));
    let router = scoring_router(service.clone());

    let response = router
        .clone()
        .oneshot(post("/api/v1/scoring/configs/reload"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["generation"], 2);
    assert_eq!(payload["factors"], 1);
    assert_eq!(payload["personas"], 1);

    let response = router
        .oneshot(get("/api/v1/scoring/securities/ACME/scores"))
        .await
        .expect("route executes");
    let payload = read_json_body(response).await;
    assert_eq!(payload["persona"], "solo");
    assert_eq!(payload["overall_score"], 70.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reload_from_a_missing_directory_keeps_the_current_config() {
    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("not-there");
    let service = service_with(DefinitionSource::Directory(missing));
    let router = scoring_router(service.clone());

    let response = router
        .clone()
        .oneshot(post("/api/v1/scoring/configs/reload"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = read_json_body(response).await;
    assert!(payload["error"]
        .as_str()
        .is_some_and(|message| message.starts_with("definition error: ")));

    let response = router
        .oneshot(get("/api/v1/scoring/securities/ACME/scores"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(service.engine().store().generation(), 1);
}

#[tokio::test]
async fn unreadable_definitions_fail_the_reload() {
    let dir = tempfile::tempdir().expect("temp dir");
    fs::write(dir.path().join("broken.yaml"), "factor: [unterminated").expect("write");
    let service = service_with(DefinitionSource::Directory(dir.path().to_path_buf()));

    let response = scoring_router(service.clone())
        .oneshot(post("/api/v1/scoring/configs/reload"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(service.engine().store().generation(), 1);
}
