use crate::core::models::AccessData;
use crate::core::types::{AccessToken, ClientId, Scope};

#[derive(Debug, Clone, Default)]
#[derive(serde::Deserialize)]
pub struct InfoQuery {
    pub access_token: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InfoRequest {
    pub access: AccessData,
}

#[derive(Debug)]
#[derive(serde::Serialize)]
pub struct InfoResponse {
    pub access_token: AccessToken,
    pub token_type: String,
    pub client_id: ClientId,
    pub expires_in: u64,
    pub scope: Scope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
}
