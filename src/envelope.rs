use axum::http::StatusCode;
use serde::Serialize;

/// JSON body shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success",
            token: None,
            results: None,
            data: Some(data),
            message: None,
        }
    }

    pub fn with_token(mut self, token: String) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_results(mut self, results: usize) -> Self {
        self.results = Some(results);
        self
    }
}

impl Envelope<()> {
    pub fn ok() -> Self {
        Self {
            status: "success",
            token: None,
            results: None,
            data: None,
            message: None,
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::ok()
        }
    }

    /// `fail` for client errors, `error` for server errors.
    pub fn failure(status: StatusCode, message: String) -> Self {
        Self {
            status: if status.is_server_error() { "error" } else { "fail" },
            token: None,
            results: None,
            data: None,
            message: Some(message),
        }
    }
}
