/// Erreurs possibles pendant un cycle de harvest
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error("NABLE_TOKEN is not set")]
    MissingCredential,
    #[error("authentication rejected ({status}): {body}")]
    AuthRejected { status: u16, body: String },
    #[error("API error on {endpoint} ({status}): {body}")]
    Api {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// Un échec d'auth déclenche le backoff court au lieu de la période standard.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, HarvestError::AuthRejected { .. })
    }
}
