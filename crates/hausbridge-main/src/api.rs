// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of HausBridge.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! HTTP API exposing the plugin host entry points.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use hausbridge_core::{GatewayEvent, PluginError, PluginHost};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

/// Build the API router
pub fn router(host: Arc<PluginHost>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/plugins", get(list_plugins_handler))
        .route(
            "/api/plugins/{name}/config_description",
            get(config_description_handler),
        )
        .route(
            "/api/plugins/{name}/config",
            get(get_config_handler).put(set_config_handler),
        )
        .route("/api/events", post(event_handler))
        .layer(CorsLayer::permissive())
        .with_state(host)
}

/// Serve the API until the host shuts down
pub async fn serve(host: Arc<PluginHost>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    info!("🌐 HTTP API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router(host)).await?;
    Ok(())
}

fn error_response(err: &PluginError) -> Response {
    match err {
        PluginError::UnknownPlugin(name) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("Unknown plugin '{name}'") })),
        )
            .into_response(),
        PluginError::InvalidConfig(validation) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Invalid configuration",
                "errors": validation.errors,
                "warnings": validation.warnings,
            })),
        )
            .into_response(),
        PluginError::Json(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("Invalid configuration: {e}") })),
        )
            .into_response(),
        other => {
            error!("❌ API request failed: {}", other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": other.to_string() })),
            )
                .into_response()
        }
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn list_plugins_handler(State(host): State<Arc<PluginHost>>) -> impl IntoResponse {
    Json(host.plugin_infos())
}

async fn config_description_handler(
    State(host): State<Arc<PluginHost>>,
    Path(name): Path<String>,
) -> Response {
    match host.config_description(&name) {
        Ok(description) => Json(description).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn get_config_handler(
    State(host): State<Arc<PluginHost>>,
    Path(name): Path<String>,
) -> Response {
    match host.get_config(&name) {
        Ok(config) => Json(config).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn set_config_handler(
    State(host): State<Arc<PluginHost>>,
    Path(name): Path<String>,
    Json(config): Json<Value>,
) -> Response {
    match host.set_config(&name, config) {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(e) => {
            warn!("⚠️ Rejected config for '{}': {}", name, e);
            error_response(&e)
        }
    }
}

async fn event_handler(
    State(host): State<Arc<PluginHost>>,
    Json(event): Json<GatewayEvent>,
) -> StatusCode {
    host.dispatch(&event);
    StatusCode::ACCEPTED
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use hausbridge_core::{HostSettings, PluginConfigStore, RecordingGateway};
    use hausbridge_plugins::{PluginKind, PolysunPlugin, create_plugin};
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct Fixture {
        host: Arc<PluginHost>,
        polysun: Arc<PolysunPlugin>,
        dir: TempDir,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let polysun = Arc::new(PolysunPlugin::new());
        let mut host = PluginHost::new(Arc::new(RecordingGateway::new()), HostSettings::default())
            .with_store(PluginConfigStore::new(dir.path()));
        host.register(polysun.clone());
        host.register(create_plugin(PluginKind::Ventilation));
        Fixture {
            host: Arc::new(host),
            polysun,
            dir,
        }
    }

    async fn send(host: &Arc<PluginHost>, request: Request<Body>) -> (StatusCode, Value) {
        let response = router(host.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let fixture = fixture();
        let (status, body) = send(&fixture.host, get_request("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_list_plugins() {
        let fixture = fixture();
        let (status, body) = send(&fixture.host, get_request("/api/plugins")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["name"], "polysun");
        assert_eq!(body[1]["name"], "ventilation");
    }

    #[tokio::test]
    async fn test_config_description() {
        let fixture = fixture();
        let (status, body) = send(
            &fixture.host,
            get_request("/api/plugins/polysun/config_description"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["name"], "shutters");
        assert_eq!(body[0]["type"], "section");
        assert_eq!(body[0]["repeat"], true);
    }

    #[tokio::test]
    async fn test_unknown_plugin_is_404() {
        let fixture = fixture();
        let (status, _) = send(&fixture.host, get_request("/api/plugins/zwave/config")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_put_config_applies_and_persists() {
        let fixture = fixture();
        let config = json!({
            "shutters": [{ "shutter_id": 1, "up_output_id": 10, "down_output_id": 11 }]
        });

        let (status, _) = send(
            &fixture.host,
            json_request("PUT", "/api/plugins/polysun/config", &config),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, current) = send(&fixture.host, get_request("/api/plugins/polysun/config")).await;
        assert_eq!(current, config);
        assert!(fixture.dir.path().join("polysun.json").exists());
    }

    #[tokio::test]
    async fn test_put_invalid_config_lists_issues() {
        let fixture = fixture();
        let (status, body) = send(
            &fixture.host,
            json_request(
                "PUT",
                "/api/plugins/polysun/config",
                &json!({ "shutters": [{ "shutter_id": "one" }] }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["field"], "shutters[0].shutter_id");
        assert_eq!(body["errors"][0]["severity"], "error");
    }

    #[tokio::test]
    async fn test_put_negative_output_id_lists_path() {
        let fixture = fixture();
        let (status, body) = send(
            &fixture.host,
            json_request(
                "PUT",
                "/api/plugins/polysun/config",
                &json!({
                    "shutters": [{ "shutter_id": 1, "up_output_id": -5, "down_output_id": 6 }]
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["field"], "shutters[0].up_output_id");
        assert!(!fixture.dir.path().join("polysun.json").exists());
    }

    #[tokio::test]
    async fn test_event_is_dispatched() {
        let fixture = fixture();
        let (status, _) = send(
            &fixture.host,
            json_request(
                "POST",
                "/api/events",
                &json!({ "type": "shutter_change", "shutter_id": 2, "state": "going_up" }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(fixture.polysun.queue().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_event_rejected() {
        let fixture = fixture();
        let (status, _) = send(
            &fixture.host,
            json_request("POST", "/api/events", &json!({ "type": "explosion" })),
        )
        .await;
        assert!(status.is_client_error());
    }
}
