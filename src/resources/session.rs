use async_trait::async_trait;
use serde_json::Value;

use crate::error::AppError;
use crate::reconcile::{Diff, Resource, ResourceKind, State};
use crate::resources::{list_entries, listed};
use crate::technitium::{ApiCall, DnsApi};

pub const HIDDEN_TOKEN: &str = "[NEW_TOKEN_HIDDEN]";

/// A named API token belonging to a user.
pub struct Session {
    pub username: String,
    pub token_name: String,
    pub show_token: bool,
}

impl Session {
    fn is_match(&self, session: &Value) -> bool {
        let field = |k: &str| session.get(k).and_then(Value::as_str);
        field("type") == Some("ApiToken")
            && field("username") == Some(self.username.as_str())
            && field("tokenName") == Some(self.token_name.as_str())
    }
}

#[async_trait]
impl Resource for Session {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Session
    }

    fn describe(&self) -> String {
        format!("'{}' for user {}", self.token_name, self.username)
    }

    fn validate(&self, _state: State) -> Result<(), AppError> {
        if self.username.trim().is_empty() {
            return Err(AppError::validation("username is empty"));
        }
        if self.token_name.trim().is_empty() {
            return Err(AppError::validation("token name is empty"));
        }
        Ok(())
    }

    async fn fetch(&self, api: &dyn DnsApi) -> Result<Option<Value>, AppError> {
        if !listed(api, "/api/admin/users/list", "users", "username", &self.username).await? {
            return Err(AppError::validation(format!(
                "user '{}' does not exist",
                self.username
            )));
        }
        let sessions =
            list_entries(api, &ApiCall::get("/api/admin/sessions/list"), "sessions").await?;
        Ok(sessions.into_iter().find(|s| self.is_match(s)))
    }

    fn diff(&self, _current: &Value) -> Result<Diff, AppError> {
        Ok(Diff::default())
    }

    fn create(&self) -> Result<Vec<ApiCall>, AppError> {
        Ok(vec![
            ApiCall::post("/api/admin/sessions/createToken")
                .param("user", &self.username)
                .param("tokenName", &self.token_name),
        ])
    }

    fn update(&self, _current: &Value, _diff: &Diff) -> Result<Vec<ApiCall>, AppError> {
        Ok(Vec::new())
    }

    fn delete(&self, current: &Value) -> Result<Vec<ApiCall>, AppError> {
        let partial = current
            .get("partialToken")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::decode("session entry has no partialToken"))?;
        Ok(vec![
            ApiCall::post("/api/admin/sessions/delete").param("partialToken", partial),
        ])
    }

    fn redact_response(&self, mut response: Value) -> Value {
        if self.show_token {
            return response;
        }
        if let Some(token) = response.pointer_mut("/response/token") {
            *token = Value::String(HIDDEN_TOKEN.to_string());
        }
        response
    }
}
