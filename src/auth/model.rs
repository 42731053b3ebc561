use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A freshly issued download link.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LinkResponse {
    #[schema(example = "/download/eyJ0eXAiOiJKV1Qi...")]
    pub url: String,
    /// Seconds until the link expires.
    #[schema(example = 900)]
    pub expires_in: i64,
}
