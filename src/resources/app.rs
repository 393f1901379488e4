use async_trait::async_trait;
use serde_json::Value;

use crate::error::AppError;
use crate::reconcile::{Desired, Diff, FieldSpec, Resource, ResourceKind, State, wire_params};
use crate::resources::list_entries;
use crate::technitium::{ApiCall, DnsApi};

const FIELDS: &[FieldSpec] = &[FieldSpec::string("url").write_only(), FieldSpec::json("config")];

/// An installed DNS app and, optionally, its configuration document.
pub struct App {
    pub name: String,
    pub desired: Desired,
}

impl App {
    pub fn new(name: &str, desired: Desired) -> Result<Self, AppError> {
        Ok(Self {
            name: name.to_string(),
            desired: desired.coerced(FIELDS, "apps")?,
        })
    }

    fn set_config(&self) -> Option<ApiCall> {
        let params = wire_params(FIELDS, &self.desired, |f| f.name == "config");
        if params.is_empty() {
            return None;
        }
        Some(
            ApiCall::post("/api/apps/config/set")
                .param("name", &self.name)
                .params(params),
        )
    }
}

#[async_trait]
impl Resource for App {
    fn kind(&self) -> ResourceKind {
        ResourceKind::App
    }

    fn describe(&self) -> String {
        self.name.clone()
    }

    fn validate(&self, _state: State) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::validation("app name is empty"));
        }
        if let Some(url) = self.desired.get_str("url") {
            if !url.starts_with("https://") {
                return Err(AppError::validation("url must start with 'https://'"));
            }
        }
        Ok(())
    }

    async fn fetch(&self, api: &dyn DnsApi) -> Result<Option<Value>, AppError> {
        let apps = list_entries(api, &ApiCall::get("/api/apps/list"), "apps").await?;
        let Some(mut app) = apps
            .into_iter()
            .find(|a| a.get("name").and_then(Value::as_str) == Some(self.name.as_str()))
        else {
            return Ok(None);
        };
        if self.desired.contains("config") {
            let config = api
                .call(&ApiCall::get("/api/apps/config/get").param("name", &self.name))
                .await?
                .into_result()?;
            if let Some(obj) = app.as_object_mut() {
                obj.insert(
                    "config".into(),
                    config.get("config").cloned().unwrap_or(Value::Null),
                );
            }
        }
        Ok(Some(app))
    }

    fn check_create(&self) -> Result<(), AppError> {
        self.desired.require(&["url"], "installing an app")
    }

    fn diff(&self, current: &Value) -> Result<Diff, AppError> {
        Ok(Diff::compute(FIELDS, &self.desired, current))
    }

    fn create(&self) -> Result<Vec<ApiCall>, AppError> {
        let install = ApiCall::post("/api/apps/downloadAndInstall")
            .param("name", &self.name)
            .param_opt("url", self.desired.get_str("url"));
        Ok(std::iter::once(install).chain(self.set_config()).collect())
    }

    fn update(&self, _current: &Value, _diff: &Diff) -> Result<Vec<ApiCall>, AppError> {
        Ok(self.set_config().into_iter().collect())
    }

    fn delete(&self, _current: &Value) -> Result<Vec<ApiCall>, AppError> {
        Ok(vec![
            ApiCall::post("/api/apps/uninstall").param("name", &self.name),
        ])
    }
}
