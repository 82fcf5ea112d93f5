mod common;

use axum::http::StatusCode;
use common::{build_test_app, test_config, FakeBackend, MODEL};
use sdgate_core::model::ModelType;
use sdgate_db::FunctionField;
use serde_json::{json, Value};

#[tokio::test]
async fn register_load_and_bind() {
    let app = build_test_app(test_config(), FakeBackend::default()).await;

    let (status, _, json) = app
        .post_json(
            "/api/v1/models",
            &json!({"type": "stableDiffusion", "name": MODEL}),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["data"]["status"], "registering");
    assert_eq!(json["data"]["type"], "stableDiffusion");

    let (status, _, json) = app
        .post_json(&format!("/api/v1/models/{MODEL}/load"), &Value::Null, &[])
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "loaded");

    let record = app
        .state
        .registry
        .get("sd", &FunctionField::ALL)
        .await
        .unwrap()
        .expect("bound record");
    assert_eq!(record.sd_model.as_deref(), Some(MODEL));
    assert_eq!(record.end_point.as_deref(), Some("http://10.0.0.1:7861"));
}

#[tokio::test]
async fn vae_load_binds_vae_field() {
    let app = build_test_app(test_config(), FakeBackend::default()).await;
    app.post_json(
        "/api/v1/models",
        &json!({"type": "sdVae", "name": "vae-ft-mse.pt"}),
        &[],
    )
    .await;

    let (status, _, _) = app
        .post_json("/api/v1/models/vae-ft-mse.pt/load", &Value::Null, &[])
        .await;
    assert_eq!(status, StatusCode::OK);

    let record = app
        .state
        .registry
        .get("sd", &FunctionField::ALL)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.sd_vae.as_deref(), Some("vae-ft-mse.pt"));
    assert_eq!(record.sd_model, None);
}

#[tokio::test]
async fn duplicate_and_invalid_registrations_are_rejected() {
    let app = build_test_app(test_config(), FakeBackend::default()).await;
    let body = json!({"type": "lora", "name": "detail.safetensors"});

    let (status, _, _) = app.post_json("/api/v1/models", &body, &[]).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _, json) = app.post_json("/api/v1/models", &body, &[]).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");

    let (status, _, json) = app
        .post_json(
            "/api/v1/models",
            &json!({"type": "hypernetwork", "name": "x.pt"}),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert!(json["error"]
        .as_str()
        .unwrap()
        .contains("modeltype: hypernetwork not support"));

    let (status, _, _) = app
        .post_json(
            "/api/v1/models",
            &json!({"type": "lora", "name": "../escape.pt"}),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn failed_load_reports_not_ready_and_rolls_back() {
    let app = build_test_app(test_config(), FakeBackend::default()).await;
    app.post_json(
        "/api/v1/models",
        &json!({"type": "stableDiffusion", "name": "broken.ckpt"}),
        &[],
    )
    .await;

    let (status, _, json) = app
        .post_json("/api/v1/models/broken.ckpt/load", &Value::Null, &[])
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "ENDPOINT_NOT_READY");

    let (_, _, json) = app.get("/api/v1/models/broken.ckpt").await;
    assert_eq!(json["data"]["status"], "registering");
    assert!(app
        .state
        .registry
        .get("sd", &FunctionField::ALL)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn list_filters_by_type_and_hides_deleted() {
    let app = build_test_app(test_config(), FakeBackend::default()).await;
    app.serve_model(MODEL).await;
    app.post_json(
        "/api/v1/models",
        &json!({"type": "lora", "name": "detail.safetensors"}),
        &[],
    )
    .await;

    let (_, _, json) = app.get("/api/v1/models").await;
    assert_eq!(json["data"].as_array().unwrap().len(), 2);

    let (_, _, json) = app.get("/api/v1/models?type=lora").await;
    let names: Vec<&str> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["detail.safetensors"]);

    let (status, _, _) = app.get("/api/v1/models?type=bogus").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(
        app.delete("/api/v1/models/detail.safetensors").await,
        StatusCode::NO_CONTENT
    );
    let (_, _, json) = app.get("/api/v1/models").await;
    assert_eq!(json["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unload_and_missing_models() {
    let app = build_test_app(test_config(), FakeBackend::default()).await;
    app.serve_model(MODEL).await;

    let (status, _, json) = app
        .post_json(&format!("/api/v1/models/{MODEL}/unload"), &Value::Null, &[])
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "unloaded");

    let (status, _, json) = app.get("/api/v1/models/absent.ckpt").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");

    let (status, _, _) = app
        .post_json("/api/v1/models/absent.ckpt/load", &Value::Null, &[])
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_removes_the_model_file() {
    let app = build_test_app(test_config(), FakeBackend::default()).await;
    app.serve_model(MODEL).await;
    let file = app.put_model_file(ModelType::StableDiffusion, MODEL);

    assert_eq!(
        app.delete(&format!("/api/v1/models/{MODEL}")).await,
        StatusCode::NO_CONTENT
    );
    assert!(!file.exists());

    let (_, _, json) = app.get(&format!("/api/v1/models/{MODEL}")).await;
    assert_eq!(json["data"]["status"], "deleted");
    assert_eq!(
        app.delete(&format!("/api/v1/models/{MODEL}")).await,
        StatusCode::CONFLICT
    );
}

#[tokio::test]
async fn delete_of_resident_model_without_file_is_not_found() {
    let app = build_test_app(test_config(), FakeBackend::default()).await;
    app.serve_model(MODEL).await;

    let (status, _, json) = app
        .send(
            axum::http::Request::delete(format!("/api/v1/models/{MODEL}"))
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().starts_with("model not exist"));

    let (_, _, json) = app.get(&format!("/api/v1/models/{MODEL}")).await;
    assert_eq!(json["data"]["status"], "loaded");
}

#[tokio::test]
async fn type_query_picks_between_same_named_models() {
    let app = build_test_app(test_config(), FakeBackend::default()).await;
    for model_type in ["stableDiffusion", "lora"] {
        let (status, _, _) = app
            .post_json(
                "/api/v1/models",
                &json!({"type": model_type, "name": "anime.safetensors"}),
                &[],
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, _, json) = app.get("/api/v1/models/anime.safetensors").await;
    assert_eq!(json["data"]["type"], "stableDiffusion");

    let (status, _, json) = app
        .post_json("/api/v1/models/anime.safetensors/load?type=lora", &Value::Null, &[])
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["type"], "lora");
    assert_eq!(json["data"]["status"], "loaded");

    let (_, _, json) = app.get("/api/v1/models/anime.safetensors").await;
    assert_eq!(json["data"]["status"], "registering");

    let (_, _, json) = app.get("/api/v1/models?type=lora").await;
    assert_eq!(json["data"].as_array().unwrap().len(), 1);

    let (status, _, _) = app.get("/api/v1/models/anime.safetensors?type=bogus").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn rescan_reconciles_with_models_directory() {
    let app = build_test_app(test_config(), FakeBackend::default()).await;
    let file = app.put_model_file(ModelType::Lora, "style.safetensors");

    let (status, _, json) = app
        .post_json("/api/v1/models/rescan", &Value::Null, &[])
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"], json!({"added": 1, "vanished": 0}));

    let (_, _, json) = app.get("/api/v1/models/style.safetensors").await;
    assert_eq!(json["data"]["type"], "lora");
    assert_eq!(json["data"]["status"], "loaded");

    std::fs::remove_file(file).unwrap();
    let (_, _, json) = app
        .post_json("/api/v1/models/rescan", &Value::Null, &[])
        .await;
    assert_eq!(json["data"], json!({"added": 0, "vanished": 1}));

    let (_, _, json) = app.get("/api/v1/models?type=lora").await;
    assert!(json["data"].as_array().unwrap().is_empty());
}
