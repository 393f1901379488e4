use async_trait::async_trait;
use serde_json::Value;

use crate::error::AppError;
use crate::reconcile::{Desired, Diff, FieldSpec, Resource, ResourceKind, State, wire_params};
use crate::resources::listed;
use crate::technitium::{ApiCall, DnsApi};

const FIELDS: &[FieldSpec] = &[
    FieldSpec::table(
        "userPermissions",
        &["username", "canView", "canModify", "canDelete"],
    ),
    FieldSpec::table(
        "groupPermissions",
        &["name", "canView", "canModify", "canDelete"],
    ),
];

/// Access rights on one section of the web console.
pub struct Permission {
    pub section: String,
    pub desired: Desired,
}

impl Permission {
    pub fn new(section: &str, desired: Desired) -> Result<Self, AppError> {
        Ok(Self {
            section: section.to_string(),
            desired: desired.coerced(FIELDS, "permissions")?,
        })
    }
}

#[async_trait]
impl Resource for Permission {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Permission
    }

    fn describe(&self) -> String {
        self.section.clone()
    }

    fn supports_absent(&self) -> bool {
        false
    }

    fn validate(&self, _state: State) -> Result<(), AppError> {
        if self.section.trim().is_empty() {
            return Err(AppError::validation("section is empty"));
        }
        if self.desired.is_empty() {
            return Err(AppError::validation(
                "at least one of userPermissions or groupPermissions must be provided",
            ));
        }
        Ok(())
    }

    async fn fetch(&self, api: &dyn DnsApi) -> Result<Option<Value>, AppError> {
        if !listed(
            api,
            "/api/admin/permissions/list",
            "permissions",
            "section",
            &self.section,
        )
        .await?
        {
            return Err(AppError::validation(format!(
                "permission section '{}' does not exist",
                self.section
            )));
        }
        let call = ApiCall::get("/api/admin/permissions/get")
            .param("section", &self.section)
            .param("includeUsersAndGroups", "false");
        api.call(&call).await?.into_result().map(Some)
    }

    fn diff(&self, current: &Value) -> Result<Diff, AppError> {
        Ok(Diff::compute(FIELDS, &self.desired, current))
    }

    fn create(&self) -> Result<Vec<ApiCall>, AppError> {
        Err(AppError::validation(format!(
            "permission section '{}' cannot be created",
            self.section
        )))
    }

    fn update(&self, _current: &Value, diff: &Diff) -> Result<Vec<ApiCall>, AppError> {
        Ok(vec![
            ApiCall::post("/api/admin/permissions/set")
                .param("section", &self.section)
                .params(wire_params(FIELDS, &self.desired, |f| diff.contains(f.name))),
        ])
    }

    fn delete(&self, _current: &Value) -> Result<Vec<ApiCall>, AppError> {
        Err(AppError::validation("permissions cannot be deleted"))
    }
}
