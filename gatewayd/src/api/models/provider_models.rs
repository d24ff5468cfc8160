//! Request/response shapes for `/admin/api/v1/provider-models`, the
//! association table turning a (provider, model) pair into a routable
//! endpoint once both rows are enabled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::provider_model::{ProviderModelCreateDBRequest, ProviderModelDBResponse};
use crate::types::{ModelId, ProviderId, ProviderModelId};

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProviderModelCreate {
    #[schema(value_type = String)]
    pub provider_id: ProviderId,
    #[schema(value_type = String)]
    pub model_id: ModelId,
}

impl From<ProviderModelCreate> for ProviderModelCreateDBRequest {
    fn from(c: ProviderModelCreate) -> Self {
        Self { provider_id: c.provider_id, model_id: c.model_id }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProviderModelResponse {
    #[schema(value_type = String)]
    pub id: ProviderModelId,
    #[schema(value_type = String)]
    pub provider_id: ProviderId,
    #[schema(value_type = String)]
    pub model_id: ModelId,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
}

impl From<ProviderModelDBResponse> for ProviderModelResponse {
    fn from(r: ProviderModelDBResponse) -> Self {
        Self { id: r.id, provider_id: r.provider_id, model_id: r.model_id, created_at: r.created_at }
    }
}
