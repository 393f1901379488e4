use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

/// One request against the Technitium HTTP API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiCall {
    pub method: HttpMethod,
    pub path: String, // "/api/zones/records/get"
    pub params: Vec<(String, String)>,
}

impl ApiCall {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            params: Vec::new(),
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn param_opt(self, key: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => self.param(key, v),
            None => self,
        }
    }

    pub fn params<I, K, V>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.params
            .extend(items.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn get_param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_mutating(&self) -> bool {
        self.method == HttpMethod::Post
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApiStatus {
    Ok,
    Error,
    InvalidToken,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub status: ApiStatus,
    #[serde(default)]
    pub response: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

impl ApiResponse {
    pub fn ok(response: Value) -> Self {
        Self {
            status: ApiStatus::Ok,
            response,
            error_message: None,
            stack_trace: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ApiStatus::Error,
            response: Value::Null,
            error_message: Some(message.into()),
            stack_trace: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ApiStatus::Ok
    }

    pub fn message(&self) -> &str {
        self.error_message.as_deref().unwrap_or("unknown error")
    }

    /// Raw JSON as returned by the server.
    pub fn raw(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// The `response` payload, or `AppError::Api` for any non-ok status.
    pub fn into_result(self) -> Result<Value, AppError> {
        if self.is_ok() {
            return Ok(self.response);
        }
        let raw = self.raw();
        Err(AppError::api(self.message().to_string(), raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_error_envelope() {
        let resp: ApiResponse = serde_json::from_value(json!({
            "status": "error",
            "errorMessage": "No such zone was found: example.org",
            "stackTrace": "at ..."
        }))
        .unwrap();
        assert!(!resp.is_ok());
        assert_eq!(resp.response, Value::Null);
        match resp.into_result() {
            Err(AppError::Api { message, response }) => {
                assert_eq!(message, "No such zone was found: example.org");
                assert_eq!(response["status"], "error");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unrecognised_status_is_not_ok() {
        let resp: ApiResponse =
            serde_json::from_value(json!({"status": "2fa-required"})).unwrap();
        assert_eq!(resp.status, ApiStatus::Unknown);
        assert!(resp.into_result().is_err());
    }

    #[test]
    fn invalid_token_status() {
        let resp: ApiResponse = serde_json::from_value(
            json!({"status": "invalid-token", "errorMessage": "Invalid token or session expired."}),
        )
        .unwrap();
        assert_eq!(resp.status, ApiStatus::InvalidToken);
        assert_eq!(resp.message(), "Invalid token or session expired.");
    }

    #[test]
    fn call_builder_keeps_param_order() {
        let call = ApiCall::post("/api/zones/records/add")
            .param("zone", "example.com")
            .param_opt("ttl", Some("3600"))
            .param_opt("comments", None::<String>);
        assert!(call.is_mutating());
        assert_eq!(call.get_param("zone"), Some("example.com"));
        assert_eq!(call.params.len(), 2);
    }
}
