//! Handlers for the `/models` resource.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use sdgate_core::model::ModelType;
use sdgate_pipeline::{Discovery, ModelRef};
use serde::Deserialize;
use serde_json::json;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Optional `?type=` narrowing a model name to one model type.
#[derive(Debug, Default, Deserialize)]
pub struct ModelTypeQuery {
    #[serde(rename = "type")]
    pub model_type: Option<String>,
}

impl ModelTypeQuery {
    fn parse(&self) -> AppResult<Option<ModelType>> {
        Ok(self
            .model_type
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(ModelType::from_name)
            .transpose()?)
    }

    fn select<'a>(&self, name: &'a str) -> AppResult<ModelRef<'a>> {
        Ok(ModelRef {
            name,
            model_type: self.parse()?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterModel {
    #[serde(rename = "type")]
    pub model_type: String,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

/// GET /api/v1/models?type=
pub async fn list_models(
    State(state): State<AppState>,
    Query(query): Query<ModelTypeQuery>,
) -> AppResult<impl IntoResponse> {
    let models = state.models.list_by_type(query.parse()?).await;
    Ok(Json(DataResponse { data: models }))
}

/// POST /api/v1/models
///
/// Register a model in `registering` status. Returns 201.
pub async fn register_model(
    State(state): State<AppState>,
    Json(input): Json<RegisterModel>,
) -> AppResult<impl IntoResponse> {
    let model_type = ModelType::from_name(&input.model_type)?;
    let model = state.models.register(model_type, &input.name).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: model })))
}

/// POST /api/v1/models/rescan
///
/// Reconcile the inventory with the files in the models directory.
pub async fn rescan_models(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let Discovery { added, vanished } = state.models.discover().await?;
    Ok(Json(DataResponse {
        data: json!({ "added": added, "vanished": vanished }),
    }))
}

/// GET /api/v1/models/{name}?type=
pub async fn get_model(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<ModelTypeQuery>,
) -> AppResult<impl IntoResponse> {
    let model = state.models.get(query.select(&name)?).await?;
    Ok(Json(DataResponse { data: model }))
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// POST /api/v1/models/{name}/load?type=
///
/// Load the model on the local backend, then bind it in this instance's
/// function record so dispatch can route to it.
pub async fn load_model(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<ModelTypeQuery>,
) -> AppResult<impl IntoResponse> {
    let model = state.models.load(query.select(&name)?).await?;
    state.dispatcher.bind(&model).await?;
    Ok(Json(DataResponse { data: model }))
}

/// POST /api/v1/models/{name}/unload?type=
pub async fn unload_model(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<ModelTypeQuery>,
) -> AppResult<impl IntoResponse> {
    let model = state.models.unload(query.select(&name)?).await?;
    Ok(Json(DataResponse { data: model }))
}

/// DELETE /api/v1/models/{name}?type=
///
/// Delete the model file and mark the model deleted.
pub async fn delete_model(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<ModelTypeQuery>,
) -> AppResult<impl IntoResponse> {
    state.models.remove(query.select(&name)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
