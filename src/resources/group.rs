use async_trait::async_trait;
use serde_json::Value;

use crate::error::AppError;
use crate::reconcile::{Desired, Diff, FieldSpec, Resource, ResourceKind, State, wire_params};
use crate::resources::listed;
use crate::technitium::{ApiCall, DnsApi};

pub const BUILTIN_GROUPS: &[&str] = &["Administrators", "DHCP Administrators", "DNS Administrators"];

const FIELDS: &[FieldSpec] = &[
    FieldSpec::string("newGroup").remote("name"),
    FieldSpec::string("description").text(),
    FieldSpec::list("members"),
];

pub struct Group {
    pub name: String,
    pub desired: Desired,
}

impl Group {
    pub fn new(name: &str, desired: Desired) -> Result<Self, AppError> {
        Ok(Self {
            name: name.to_string(),
            desired: desired.coerced(FIELDS, "groups")?,
        })
    }

    fn is_builtin(&self) -> bool {
        BUILTIN_GROUPS.contains(&self.name.as_str())
    }
}

#[async_trait]
impl Resource for Group {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Group
    }

    fn describe(&self) -> String {
        self.name.clone()
    }

    fn validate(&self, state: State) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::validation("group name is empty"));
        }
        if self.is_builtin() {
            if state == State::Absent {
                return Err(AppError::validation(format!(
                    "built-in group '{}' cannot be deleted",
                    self.name
                )));
            }
            if self
                .desired
                .get_str("newGroup")
                .is_some_and(|n| n != self.name)
            {
                return Err(AppError::validation(format!(
                    "built-in group '{}' cannot be renamed",
                    self.name
                )));
            }
        }
        Ok(())
    }

    async fn fetch(&self, api: &dyn DnsApi) -> Result<Option<Value>, AppError> {
        if !listed(api, "/api/admin/groups/list", "groups", "name", &self.name).await? {
            return Ok(None);
        }
        let call = ApiCall::get("/api/admin/groups/get")
            .param("group", &self.name)
            .param("includeUsers", "true");
        api.call(&call).await?.into_result().map(Some)
    }

    fn diff(&self, current: &Value) -> Result<Diff, AppError> {
        Ok(Diff::compute(FIELDS, &self.desired, current))
    }

    fn create(&self) -> Result<Vec<ApiCall>, AppError> {
        let mut calls = vec![
            ApiCall::post("/api/admin/groups/create")
                .param("group", &self.name)
                .param_opt("description", self.desired.get_str("description")),
        ];
        let rest = wire_params(FIELDS, &self.desired, |f| f.name != "description");
        if !rest.is_empty() {
            calls.push(
                ApiCall::post("/api/admin/groups/set")
                    .param("group", &self.name)
                    .params(rest),
            );
        }
        Ok(calls)
    }

    fn update(&self, _current: &Value, diff: &Diff) -> Result<Vec<ApiCall>, AppError> {
        Ok(vec![
            ApiCall::post("/api/admin/groups/set")
                .param("group", &self.name)
                .params(wire_params(FIELDS, &self.desired, |f| diff.contains(f.name))),
        ])
    }

    fn delete(&self, _current: &Value) -> Result<Vec<ApiCall>, AppError> {
        Ok(vec![
            ApiCall::post("/api/admin/groups/delete").param("group", &self.name),
        ])
    }
}
