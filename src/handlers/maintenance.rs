use actix_web::{web, HttpResponse};
use serde::Deserialize;
use std::time::Duration;

use crate::error::{ApiResponse, AppError, AppResult};
use crate::maintenance::age_threshold;
use crate::state::AppState;

/// Body of `POST /api/v1/maintenance/sweep`. Exactly one selector is required.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepRequest {
    /// Glob over file names, e.g. `*_speech.wav`
    pub pattern: Option<String>,
    pub older_than_secs: Option<u64>,
}

pub async fn sweep_temp_files(state: web::Data<AppState>, body: web::Json<SweepRequest>) -> AppResult<HttpResponse> {
    let store = state.pipeline.store();
    let directory = store.default_directory().to_path_buf();

    let report = match body.into_inner() {
        SweepRequest {
            pattern: Some(pattern),
            older_than_secs: None,
        } => store.remove_by_pattern(&directory, &pattern).await?,
        SweepRequest {
            pattern: None,
            older_than_secs: Some(secs),
        } => {
            store
                .remove_older_than(&directory, age_threshold(Duration::from_secs(secs)))
                .await?
        }
        _ => {
            return Err(AppError::BadRequest(
                "Provide exactly one of `pattern` or `olderThanSecs`".to_string(),
            ))
        }
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(report)))
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::{test, web, App};
    use serde_json::{json, Value};
    use tempfile::TempDir;

    use crate::handlers::configure_routes;
    use crate::handlers::test_support::{app_state, file_count};
    use crate::state::AppState;

    async fn post_sweep(state: AppState, payload: Value) -> (StatusCode, Value) {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/maintenance/sweep")
            .set_json(payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        let status = resp.status();
        let body: Value = test::read_body_json(resp).await;
        (status, body)
    }

    fn seeded_state(root: &TempDir) -> AppState {
        let tmp = root.path().join("tmp");
        std::fs::create_dir_all(&tmp).unwrap();
        for name in ["a.wav", "b.wav", "c.mp3"] {
            std::fs::write(tmp.join(name), b"x").unwrap();
        }
        app_state(root.path(), true, 1024)
    }

    #[actix_web::test]
    async fn test_sweep_by_pattern() {
        let root = TempDir::new().unwrap();

        let (status, body) = post_sweep(seeded_state(&root), json!({"pattern": "*.wav"})).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["totalFiles"], 2);
        assert_eq!(body["data"]["removed"], 2);
        assert_eq!(file_count(&root.path().join("tmp")), 1);
    }

    #[actix_web::test]
    async fn test_sweep_by_age_keeps_claimed_files() {
        let root = TempDir::new().unwrap();
        let state = seeded_state(&root);
        let claimed = root.path().join("tmp").join("c.mp3");
        state.pipeline.store().claim(&claimed);
        std::thread::sleep(std::time::Duration::from_millis(20));

        let (status, body) = post_sweep(state, json!({"olderThanSecs": 0})).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["removed"], 2);
        assert!(claimed.exists());
    }

    #[actix_web::test]
    async fn test_sweep_requires_exactly_one_selector() {
        let root = TempDir::new().unwrap();

        for payload in [json!({}), json!({"pattern": "*", "olderThanSecs": 60})] {
            let (status, body) = post_sweep(seeded_state(&root), payload).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "Provide exactly one of `pattern` or `olderThanSecs`");
        }
        assert_eq!(file_count(&root.path().join("tmp")), 3);
    }
}
