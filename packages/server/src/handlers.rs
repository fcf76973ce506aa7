//! HTTP handler functions for the similarity API.

use actix_web::{HttpResponse, http::header, web};
use similarity_manager::{JobStatus, ManagerStatus, Served};
use similarity_region_models::RegionKey;
use similarity_server_models::{ApiHealth, ApiProcessState};

use crate::AppState;

/// Downstream cache lifetime of the region table, in seconds.
const REGIONS_MAX_AGE: u32 = 2 * 60 * 60;

/// Downstream cache lifetime of a neighbor table, in seconds.
const REGION_MAX_AGE: u32 = 24 * 60 * 60;

/// `GET /api/v1`
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(api_health(&state.manager.status()))
}

/// `GET /api/v1/regions`
///
/// Returns the global attribute and cluster table as CSV.
pub async fn regions(state: web::Data<AppState>) -> HttpResponse {
    csv_response(state.manager.get_regions().await, REGIONS_MAX_AGE)
}

/// `GET /api/v1/regions/{key}`
///
/// Returns the neighbor table of one region as CSV.
pub async fn region(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let key = RegionKey::new(path.into_inner());
    csv_response(state.manager.get_region(&key).await, REGION_MAX_AGE)
}

fn api_state(status: JobStatus) -> Option<ApiProcessState> {
    match status {
        JobStatus::NotStarted => None,
        JobStatus::InProgress => Some(ApiProcessState::InProgress),
        JobStatus::Done => Some(ApiProcessState::Done),
        JobStatus::Failed => Some(ApiProcessState::Failed),
    }
}

fn api_health(status: &ManagerStatus) -> ApiHealth {
    ApiHealth {
        health: status.ready,
        regions: api_state(status.global),
        processes: status
            .processes
            .iter()
            .filter_map(|(key, status)| Some((key.to_string(), api_state(*status)?)))
            .collect(),
    }
}

fn csv_response(served: Served, max_age: u32) -> HttpResponse {
    match served {
        Served::Ready { body, cacheable } => {
            let cache_control = if cacheable {
                format!("public, max-age={max_age}")
            } else {
                "no-store".to_string()
            };
            HttpResponse::Ok()
                .content_type("text/csv; charset=utf-8")
                .insert_header((header::CACHE_CONTROL, cache_control))
                .body(body.to_vec())
        }
        Served::NotReady => HttpResponse::Accepted()
            .insert_header((header::CACHE_CONTROL, "no-store"))
            .finish(),
        Served::NotFound => HttpResponse::NotFound()
            .insert_header((header::CACHE_CONTROL, "no-store"))
            .finish(),
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, sync::Arc};

    use actix_web::{App, body::to_bytes, http::StatusCode, test as actix_test};
    use similarity_manager::{Collaborators, Manager, SimilarityConfig};

    use super::*;
    use crate::api_scope;

    fn cache_control(resp: &HttpResponse) -> &str {
        resp.headers()
            .get(header::CACHE_CONTROL)
            .unwrap()
            .to_str()
            .unwrap()
    }

    #[actix_web::test]
    async fn ready_tables_carry_cache_headers() {
        let body: Arc<[u8]> = Arc::from(b"key,population\n".to_vec());

        let resp = csv_response(
            Served::Ready {
                body: Arc::clone(&body),
                cacheable: true,
            },
            REGIONS_MAX_AGE,
        );
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(cache_control(&resp), "public, max-age=7200");
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/csv; charset=utf-8"
        );
        assert_eq!(
            to_bytes(resp.into_body()).await.unwrap().as_ref(),
            b"key,population\n"
        );

        let resp = csv_response(
            Served::Ready {
                body,
                cacheable: false,
            },
            REGION_MAX_AGE,
        );
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(cache_control(&resp), "no-store");
    }

    #[test]
    fn pending_and_missing_are_not_cached() {
        let resp = csv_response(Served::NotReady, REGION_MAX_AGE);
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(cache_control(&resp), "no-store");

        let resp = csv_response(Served::NotFound, REGION_MAX_AGE);
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn health_lists_started_jobs() {
        let status = ManagerStatus {
            ready: true,
            global: JobStatus::Done,
            processes: BTreeMap::from([
                (RegionKey::new("Brazil.regions.SP"), JobStatus::InProgress),
                (RegionKey::new("Sweden"), JobStatus::NotStarted),
                (RegionKey::new("Sweden.regions.Skane"), JobStatus::Done),
            ]),
        };
        let health = api_health(&status);
        assert!(health.health);
        assert_eq!(health.regions, Some(ApiProcessState::Done));
        assert_eq!(
            health.processes,
            BTreeMap::from([
                ("Brazil.regions.SP".to_string(), ApiProcessState::InProgress),
                ("Sweden.regions.Skane".to_string(), ApiProcessState::Done),
            ])
        );
    }

    #[test]
    fn health_reports_failed_table_job() {
        let status = ManagerStatus {
            ready: false,
            global: JobStatus::Failed,
            processes: BTreeMap::new(),
        };
        let health = api_health(&status);
        assert!(!health.health);
        assert_eq!(health.regions, Some(ApiProcessState::Failed));
        assert!(health.processes.is_empty());
    }

    #[actix_web::test]
    async fn empty_data_directory_is_not_ready() {
        let root =
            std::env::temp_dir().join(format!("similarity-server-{}", uuid::Uuid::new_v4()));
        let config = SimilarityConfig {
            data_dir: root.join("data"),
            output_dir: root.join("out"),
            bootstrap_wait_secs: 0,
            ..SimilarityConfig::default()
        };
        let collaborators = Collaborators::from_config(&config);
        let manager = Arc::new(Manager::new(config, collaborators));
        let state = web::Data::new(AppState {
            manager: Arc::clone(&manager),
        });
        let app =
            actix_test::init_service(App::new().app_data(state).service(api_scope())).await;

        let resp = actix_test::call_service(
            &app,
            actix_test::TestRequest::get().uri("/api/v1").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let health: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(health["health"], false);
        assert_eq!(health["regions"], serde_json::Value::Null);
        assert_eq!(health["processes"], serde_json::json!({}));

        let resp = actix_test::call_service(
            &app,
            actix_test::TestRequest::get().uri("/api/v1/regions").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let resp = actix_test::call_service(
            &app,
            actix_test::TestRequest::get()
                .uri("/api/v1/regions/Sweden.regions.Skane")
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        // Without a metadata document the table job fails.
        manager.drain().await;
        let resp = actix_test::call_service(
            &app,
            actix_test::TestRequest::get().uri("/api/v1").to_request(),
        )
        .await;
        let health: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(health["health"], false);
        assert_eq!(health["regions"], "failed");
        std::fs::remove_dir_all(root).ok();
    }
}
