use async_trait::async_trait;
use serde_json::Value;

use crate::error::AppError;
use crate::reconcile::{Diff, Resource, ResourceKind, State};
use crate::technitium::{ApiCall, DnsApi};
use crate::validation::validate_domain_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterList {
    Allowed,
    Blocked,
}

impl FilterList {
    fn segment(self) -> &'static str {
        match self {
            FilterList::Allowed => "allowed",
            FilterList::Blocked => "blocked",
        }
    }
}

/// A domain on the server's allow or block list.
pub struct FilterZone {
    pub list: FilterList,
    pub domain: String,
}

impl FilterZone {
    fn path(&self, op: &str) -> String {
        format!("/api/{}/{op}", self.list.segment())
    }

    fn is_listed(&self, response: &Value) -> bool {
        let in_zones = response
            .get("zones")
            .and_then(Value::as_array)
            .is_some_and(|zones| {
                zones.iter().any(|z| {
                    z.as_str()
                        .or_else(|| z.get("name").and_then(Value::as_str))
                        .is_some_and(|n| n.eq_ignore_ascii_case(&self.domain))
                })
            });
        let in_records = response
            .get("records")
            .and_then(Value::as_array)
            .is_some_and(|records| {
                records.iter().any(|r| {
                    r.get("name")
                        .and_then(Value::as_str)
                        .is_some_and(|n| n.eq_ignore_ascii_case(&self.domain))
                })
            });
        in_zones || in_records
    }
}

#[async_trait]
impl Resource for FilterZone {
    fn kind(&self) -> ResourceKind {
        match self.list {
            FilterList::Allowed => ResourceKind::AllowedZone,
            FilterList::Blocked => ResourceKind::BlockedZone,
        }
    }

    fn describe(&self) -> String {
        self.domain.clone()
    }

    fn validate(&self, _state: State) -> Result<(), AppError> {
        validate_domain_name("domain", &self.domain)?;
        Ok(())
    }

    async fn fetch(&self, api: &dyn DnsApi) -> Result<Option<Value>, AppError> {
        let call = ApiCall::get(self.path("list")).param("domain", &self.domain);
        let response = api.call(&call).await?.into_result()?;
        Ok(self.is_listed(&response).then_some(response))
    }

    fn diff(&self, _current: &Value) -> Result<Diff, AppError> {
        Ok(Diff::default())
    }

    fn create(&self) -> Result<Vec<ApiCall>, AppError> {
        Ok(vec![
            ApiCall::post(self.path("add")).param("domain", &self.domain),
        ])
    }

    fn update(&self, _current: &Value, _diff: &Diff) -> Result<Vec<ApiCall>, AppError> {
        Ok(Vec::new())
    }

    fn delete(&self, _current: &Value) -> Result<Vec<ApiCall>, AppError> {
        Ok(vec![
            ApiCall::post(self.path("delete")).param("domain", &self.domain),
        ])
    }
}
