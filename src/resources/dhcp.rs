use async_trait::async_trait;
use serde_json::Value;

use crate::error::AppError;
use crate::reconcile::{Desired, Diff, FieldSpec, Resource, ResourceKind, State, wire_params};
use crate::technitium::{ApiCall, DnsApi};

const FIELDS: &[FieldSpec] = &[
    FieldSpec::string("newName").remote("name"),
    FieldSpec::string("startingAddress"),
    FieldSpec::string("endingAddress"),
    FieldSpec::string("subnetMask"),
    FieldSpec::int("leaseTimeDays"),
    FieldSpec::int("leaseTimeHours"),
    FieldSpec::int("leaseTimeMinutes"),
    FieldSpec::int("offerDelayTime"),
    FieldSpec::bool("pingCheckEnabled"),
    FieldSpec::int("pingCheckTimeout"),
    FieldSpec::int("pingCheckRetries"),
    FieldSpec::string("domainName").text(),
    FieldSpec::list("domainSearchList"),
    FieldSpec::bool("dnsUpdates"),
    FieldSpec::int("dnsTtl"),
    FieldSpec::string("serverAddress").text(),
    FieldSpec::string("serverHostName").text(),
    FieldSpec::string("bootFileName").text(),
    FieldSpec::string("routerAddress").text(),
    FieldSpec::bool("useThisDnsServer"),
    FieldSpec::list("dnsServers"),
    FieldSpec::list("winsServers"),
    FieldSpec::list("ntpServers"),
    FieldSpec::list("ntpServerDomainNames"),
    FieldSpec::table("staticRoutes", &["destination", "subnetMask", "router"]),
    FieldSpec::table("vendorInfo", &["identifier", "information"]),
    FieldSpec::list("capwapAcIpAddresses"),
    FieldSpec::list("tftpServerAddresses"),
    FieldSpec::table("genericOptions", &["code", "value"]),
    FieldSpec::table("exclusions", &["startingAddress", "endingAddress"]),
    FieldSpec::table(
        "reservedLeases",
        &["hostName", "hardwareAddress", "address", "comments"],
    ),
    FieldSpec::bool("allowOnlyReservedLeases"),
    FieldSpec::bool("blockLocallyAdministeredMacAddresses"),
    FieldSpec::bool("ignoreClientIdentifierOption"),
    FieldSpec::bool("enabled"),
];

const CREATE_REQUIRED: &[&str] = &["startingAddress", "endingAddress", "subnetMask"];

pub struct DhcpScope {
    pub name: String,
    pub desired: Desired,
}

impl DhcpScope {
    pub fn new(name: &str, desired: Desired) -> Result<Self, AppError> {
        Ok(Self {
            name: name.to_string(),
            desired: desired.coerced(FIELDS, "DHCP scopes")?,
        })
    }

    fn toggle(&self, enabled: bool) -> ApiCall {
        let path = if enabled {
            "/api/dhcp/scopes/enable"
        } else {
            "/api/dhcp/scopes/disable"
        };
        ApiCall::post(path).param("name", self.desired_name())
    }

    /// Name the scope carries after a rename, if any.
    fn desired_name(&self) -> &str {
        self.desired.get_str("newName").unwrap_or(&self.name)
    }
}

#[async_trait]
impl Resource for DhcpScope {
    fn kind(&self) -> ResourceKind {
        ResourceKind::DhcpScope
    }

    fn describe(&self) -> String {
        self.name.clone()
    }

    fn validate(&self, _state: State) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::validation("scope name is empty"));
        }
        Ok(())
    }

    async fn fetch(&self, api: &dyn DnsApi) -> Result<Option<Value>, AppError> {
        let resp = api
            .call(&ApiCall::get("/api/dhcp/scopes/get").param("name", &self.name))
            .await?;
        if !resp.is_ok() {
            return Ok(None);
        }
        let mut scope = resp.response;

        let listed = api
            .call(&ApiCall::get("/api/dhcp/scopes/list"))
            .await?
            .into_result()?;
        let enabled = listed
            .get("scopes")
            .and_then(Value::as_array)
            .and_then(|scopes| {
                scopes
                    .iter()
                    .find(|s| s.get("name").and_then(Value::as_str) == Some(self.name.as_str()))
            })
            .and_then(|s| s.get("enabled").cloned());
        if let (Some(obj), Some(enabled)) = (scope.as_object_mut(), enabled) {
            obj.insert("enabled".into(), enabled);
        }
        Ok(Some(scope))
    }

    fn check_create(&self) -> Result<(), AppError> {
        self.desired
            .require(CREATE_REQUIRED, "a new DHCP scope")
    }

    fn diff(&self, current: &Value) -> Result<Diff, AppError> {
        Ok(Diff::compute(FIELDS, &self.desired, current))
    }

    fn create(&self) -> Result<Vec<ApiCall>, AppError> {
        let params = wire_params(FIELDS, &self.desired, |f| {
            f.name != "enabled" && f.name != "newName"
        });
        let mut calls = vec![
            ApiCall::post("/api/dhcp/scopes/set")
                .param("name", &self.name)
                .params(params),
        ];
        if self.desired.get_bool("enabled") == Some(true) {
            calls.push(self.toggle(true));
        }
        Ok(calls)
    }

    fn update(&self, _current: &Value, diff: &Diff) -> Result<Vec<ApiCall>, AppError> {
        let params = wire_params(FIELDS, &self.desired, |f| {
            f.name != "enabled" && diff.contains(f.name)
        });
        let mut calls = Vec::new();
        if !params.is_empty() {
            calls.push(
                ApiCall::post("/api/dhcp/scopes/set")
                    .param("name", &self.name)
                    .params(params),
            );
        }
        if diff.contains("enabled") {
            calls.push(self.toggle(self.desired.get_bool("enabled").unwrap_or(false)));
        }
        Ok(calls)
    }

    fn delete(&self, _current: &Value) -> Result<Vec<ApiCall>, AppError> {
        Ok(vec![
            ApiCall::post("/api/dhcp/scopes/delete").param("name", &self.name),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::technitium::ApiResponse;
    use crate::reconcile::testing::FakeApi;
    use serde_json::json;

    fn scope(desired: Desired) -> DhcpScope {
        DhcpScope::new("Default", desired).unwrap()
    }

    #[test]
    fn create_requires_address_range() {
        let s = scope(Desired::new().with("startingAddress", "192.168.1.1"));
        let err = s.check_create().unwrap_err();
        assert!(err.to_string().contains("endingAddress"));
    }

    #[test]
    fn create_sets_then_enables() {
        let s = scope(
            Desired::new()
                .with("startingAddress", "192.168.1.1")
                .with("endingAddress", "192.168.1.254")
                .with("subnetMask", "255.255.255.0")
                .with("exclusions", "192.168.1.1|192.168.1.10")
                .with("enabled", true),
        );
        let calls = s.create().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0].get_param("exclusions"),
            Some("192.168.1.1|192.168.1.10")
        );
        assert!(calls[0].get_param("enabled").is_none());
        assert_eq!(calls[1].path, "/api/dhcp/scopes/enable");
    }

    #[test]
    fn rename_is_a_change_only_when_name_differs() {
        let s = scope(Desired::new().with("newName", "Default"));
        assert!(s.diff(&json!({"name": "Default"})).unwrap().is_empty());
        let s = scope(Desired::new().with("newName", "LAN"));
        let diff = s.diff(&json!({"name": "Default"})).unwrap();
        let calls = s.update(&json!({}), &diff).unwrap();
        assert_eq!(calls[0].get_param("newName"), Some("LAN"));
    }

    #[test]
    fn only_enabled_changed_issues_toggle_alone() {
        let s = scope(Desired::new().with("enabled", false).with("dnsServers", json!(["192.168.1.1"])));
        let current = json!({"name": "Default", "enabled": true, "dnsServers": ["192.168.1.1"]});
        let diff = s.diff(&current).unwrap();
        let calls = s.update(&current, &diff).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].path, "/api/dhcp/scopes/disable");
    }

    #[tokio::test]
    async fn fetch_merges_enabled_from_list() {
        let api = FakeApi::routes(vec![
            (
                "/api/dhcp/scopes/get",
                ApiResponse::ok(json!({"name": "Default", "startingAddress": "192.168.1.1"})),
            ),
            (
                "/api/dhcp/scopes/list",
                ApiResponse::ok(json!({"scopes": [{"name": "Default", "enabled": true}]})),
            ),
        ]);
        let s = scope(Desired::new());
        let current = s.fetch(&api).await.unwrap().unwrap();
        assert_eq!(current["enabled"], json!(true));
    }

    #[tokio::test]
    async fn fetch_error_means_absent() {
        let api = FakeApi::routes(vec![(
            "/api/dhcp/scopes/get",
            ApiResponse::error("DHCP scope was not found: Default"),
        )]);
        assert!(scope(Desired::new()).fetch(&api).await.unwrap().is_none());
    }
}
