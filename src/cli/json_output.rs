use serde::Serialize;

/// JSON response for `callerid config init --json`.
#[derive(Serialize)]
pub struct ConfigInitResponse {
    pub path: String,
}

/// JSON response for `callerid check --json`.
#[derive(Serialize)]
pub struct CheckResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
    pub valid: bool,
    pub attempts: usize,
    pub authenticator_calls: usize,
    pub cache_hits: usize,
    pub roles: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller_principal: Option<String>,
    pub cached_principals: Vec<String>,
}

/// JSON response for `callerid stampede --json`.
#[derive(Serialize)]
pub struct StampedeResponse {
    pub principal: String,
    pub locking: String,
    pub threads: usize,
    pub successes: usize,
    pub authenticator_calls: usize,
}
