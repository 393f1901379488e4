use async_trait::async_trait;
use serde_json::Value;

use crate::error::AppError;
use crate::reconcile::{
    Compare, Desired, Diff, FieldSpec, Resource, ResourceKind, State, wire_params,
};
use crate::resources::listed;
use crate::technitium::{ApiCall, DnsApi};

const FIELDS: &[FieldSpec] = &[
    FieldSpec::string("password").wire("pass").write_only().secret(),
    FieldSpec::string("displayName").text(),
    FieldSpec::string("newUsername").wire("newUser").remote("username"),
    FieldSpec::bool("disabled"),
    FieldSpec::int("sessionTimeoutSeconds").range(1, i64::MAX),
    FieldSpec::string("newPassword")
        .wire("newPass")
        .compare(Compare::Always)
        .secret(),
    FieldSpec::int("iterations").range(1, i64::MAX).write_only(),
    FieldSpec::list("memberOfGroups"),
];

/// Sent through users/set once the account exists.
fn settable(f: &FieldSpec) -> bool {
    !matches!(f.name, "password" | "displayName")
}

pub struct User {
    pub username: String,
    pub desired: Desired,
}

impl User {
    pub fn new(username: &str, desired: Desired) -> Result<Self, AppError> {
        Ok(Self {
            username: username.to_string(),
            desired: desired.coerced(FIELDS, "users")?,
        })
    }
}

#[async_trait]
impl Resource for User {
    fn kind(&self) -> ResourceKind {
        ResourceKind::User
    }

    fn describe(&self) -> String {
        self.username.clone()
    }

    fn validate(&self, _state: State) -> Result<(), AppError> {
        if self.username.trim().is_empty() {
            return Err(AppError::validation("username is empty"));
        }
        Ok(())
    }

    async fn fetch(&self, api: &dyn DnsApi) -> Result<Option<Value>, AppError> {
        if !listed(api, "/api/admin/users/list", "users", "username", &self.username).await? {
            return Ok(None);
        }
        let call = ApiCall::get("/api/admin/users/get")
            .param("user", &self.username)
            .param("includeGroups", "true");
        api.call(&call).await?.into_result().map(Some)
    }

    fn check_create(&self) -> Result<(), AppError> {
        self.desired.require(&["password"], "a new user")
    }

    fn diff(&self, current: &Value) -> Result<Diff, AppError> {
        Ok(Diff::compute(FIELDS, &self.desired, current))
    }

    fn create(&self) -> Result<Vec<ApiCall>, AppError> {
        let mut calls = vec![
            ApiCall::post("/api/admin/users/create")
                .param("user", &self.username)
                .params(wire_params(FIELDS, &self.desired, |f| {
                    matches!(f.name, "password" | "displayName")
                })),
        ];
        let rest = wire_params(FIELDS, &self.desired, |f| {
            settable(f) && f.name != "newPassword"
        });
        if !rest.is_empty() {
            calls.push(
                ApiCall::post("/api/admin/users/set")
                    .param("user", &self.username)
                    .params(rest),
            );
        }
        Ok(calls)
    }

    fn update(&self, _current: &Value, diff: &Diff) -> Result<Vec<ApiCall>, AppError> {
        let params = wire_params(FIELDS, &self.desired, |f| {
            f.name != "password" && (diff.contains(f.name) || f.compare == Compare::WriteOnly)
        });
        Ok(vec![
            ApiCall::post("/api/admin/users/set")
                .param("user", &self.username)
                .params(params),
        ])
    }

    fn delete(&self, _current: &Value) -> Result<Vec<ApiCall>, AppError> {
        Ok(vec![
            ApiCall::post("/api/admin/users/delete").param("user", &self.username),
        ])
    }
}
