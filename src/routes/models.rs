//! Models endpoint
//!
//! Lists the configured models in the OpenAI model-object shape.

use std::sync::Arc;

use axum::{extract::State, Json};

use crate::{
    openai::{ModelDescriptor, ModelList, ModelPermission},
    AppState,
};

/// Creation timestamp reported for every advertised model
const MODEL_CREATED: i64 = 1_708_992_000;

/// Describe one model id
///
/// `owned_by` is the owner segment of an `owner/name` id.
pub fn describe_model(id: &str) -> ModelDescriptor {
    let owner = id.split_once('/').map(|(owner, _)| owner).unwrap_or("system");

    ModelDescriptor {
        id: id.to_string(),
        object: "model".to_string(),
        created: MODEL_CREATED,
        owned_by: owner.to_string(),
        permission: vec![ModelPermission {
            id: format!("modelperm-{}", id.replace(['/', ':', '.'], "-")),
            object: "model_permission".to_string(),
            created: MODEL_CREATED,
            allow_create_engine: false,
            allow_sampling: true,
            allow_logprobs: false,
            allow_search_indices: false,
            allow_view: true,
            allow_fine_tuning: false,
            organization: "*".to_string(),
            group: None,
            is_blocking: false,
        }],
        root: id.to_string(),
        parent: None,
    }
}

/// List advertised models
pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelList> {
    Json(ModelList {
        object: "list".to_string(),
        data: state
            .config
            .advertised_models
            .iter()
            .map(|id| describe_model(id))
            .collect(),
    })
}
