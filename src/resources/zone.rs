use async_trait::async_trait;
use serde_json::Value;

use crate::error::AppError;
use crate::reconcile::{
    Desired, Diff, FieldSpec, Resource, ResourceKind, State, found_unless, wire_params,
};
use crate::resources::record_types::{FORWARDER_PROTOCOLS, FORWARDER_PROXY_TYPES};
use crate::technitium::{ApiCall, DnsApi};
use crate::validation::validate_domain_name;

pub const ZONE_TYPES: &[&str] = &[
    "Primary",
    "Secondary",
    "Stub",
    "Forwarder",
    "SecondaryForwarder",
    "Catalog",
    "SecondaryCatalog",
];

const TRANSFER_PROTOCOLS: &[&str] = &["Tcp", "Tls", "Quic"];
const ACCESS_POLICIES: &[&str] = &[
    "Deny",
    "Allow",
    "AllowOnlyZoneNameServers",
    "UseSpecifiedNetworkACL",
    "AllowZoneNameServersAndUseSpecifiedNetworkACL",
];
const QUERY_ACCESS: &[&str] = &[
    "Deny",
    "Allow",
    "AllowOnlyPrivateNetworks",
    "AllowOnlyZoneNameServers",
    "UseSpecifiedNetworkACL",
    "AllowZoneNameServersAndUseSpecifiedNetworkACL",
];
const NOTIFY: &[&str] = &[
    "None",
    "ZoneNameServers",
    "SpecifiedNameServers",
    "BothZoneAndSpecifiedNameServers",
    "SeparateNameServersForCatalogAndMemberZones",
];

/// Accepted only when the zone is created.
const CREATE_FIELDS: &[FieldSpec] = &[
    FieldSpec::choice("type", ZONE_TYPES),
    FieldSpec::bool("dnssec"),
    FieldSpec::bool("useSoaSerialDateScheme"),
    FieldSpec::bool("initializeForwarder"),
    FieldSpec::choice("protocol", FORWARDER_PROTOCOLS),
    FieldSpec::string("forwarder"),
    FieldSpec::bool("dnssecValidation"),
    FieldSpec::choice("proxyType", FORWARDER_PROXY_TYPES),
    FieldSpec::string("proxyAddress"),
    FieldSpec::int("proxyPort"),
    FieldSpec::string("proxyUsername"),
    FieldSpec::string("proxyPassword").secret(),
    FieldSpec::choice("zoneTransferProtocol", TRANSFER_PROTOCOLS),
    FieldSpec::string("tsigKeyName"),
];

/// Reconciled through options/get and options/set.
const OPTION_FIELDS: &[FieldSpec] = &[
    FieldSpec::bool("disabled"),
    FieldSpec::string("catalog").text(),
    FieldSpec::bool("overrideCatalogQueryAccess"),
    FieldSpec::bool("overrideCatalogZoneTransfer"),
    FieldSpec::bool("overrideCatalogNotify"),
    FieldSpec::list("primaryNameServerAddresses"),
    FieldSpec::choice("primaryZoneTransferProtocol", TRANSFER_PROTOCOLS),
    FieldSpec::string("primaryZoneTransferTsigKeyName").text(),
    FieldSpec::bool("validateZone"),
    FieldSpec::choice("queryAccess", QUERY_ACCESS),
    FieldSpec::list("queryAccessNetworkACL"),
    FieldSpec::choice("zoneTransfer", ACCESS_POLICIES),
    FieldSpec::list("zoneTransferNetworkACL"),
    FieldSpec::list("zoneTransferTsigKeyNames"),
    FieldSpec::choice("notify", NOTIFY),
    FieldSpec::list("notifyNameServers"),
    FieldSpec::list("notifySecondaryCatalogsNameServers"),
    FieldSpec::choice("update", ACCESS_POLICIES),
    FieldSpec::list("updateNetworkACL"),
    FieldSpec::table("updateSecurityPolicies", &["tsigKeyName", "domain", "allowedTypes"]),
];

/// Creation parameters the server accepts per zone type.
fn create_params_for(zone_type: &str) -> &'static [&'static str] {
    match zone_type {
        "Primary" => &["catalog", "useSoaSerialDateScheme"],
        "Forwarder" => &[
            "catalog",
            "useSoaSerialDateScheme",
            "initializeForwarder",
            "protocol",
            "forwarder",
            "dnssecValidation",
            "proxyType",
            "proxyAddress",
            "proxyPort",
            "proxyUsername",
            "proxyPassword",
        ],
        "Secondary" => &[
            "primaryNameServerAddresses",
            "zoneTransferProtocol",
            "tsigKeyName",
            "validateZone",
        ],
        "Stub" => &["primaryNameServerAddresses"],
        "SecondaryForwarder" | "SecondaryCatalog" => &[
            "primaryNameServerAddresses",
            "zoneTransferProtocol",
            "tsigKeyName",
        ],
        "Catalog" => &["useSoaSerialDateScheme"],
        _ => &[],
    }
}

/// Options the server lets you set per zone type.
fn options_for(zone_type: &str) -> &'static [&'static str] {
    match zone_type {
        "Primary" => &[
            "disabled",
            "catalog",
            "overrideCatalogQueryAccess",
            "overrideCatalogZoneTransfer",
            "overrideCatalogNotify",
            "queryAccess",
            "queryAccessNetworkACL",
            "zoneTransfer",
            "zoneTransferNetworkACL",
            "zoneTransferTsigKeyNames",
            "notify",
            "notifyNameServers",
            "update",
            "updateNetworkACL",
            "updateSecurityPolicies",
        ],
        "Stub" => &[
            "disabled",
            "catalog",
            "overrideCatalogQueryAccess",
            "primaryNameServerAddresses",
            "validateZone",
            "queryAccess",
            "queryAccessNetworkACL",
        ],
        "Forwarder" => &[
            "disabled",
            "catalog",
            "overrideCatalogQueryAccess",
            "overrideCatalogZoneTransfer",
            "overrideCatalogNotify",
            "zoneTransfer",
            "zoneTransferNetworkACL",
            "zoneTransferTsigKeyNames",
            "notify",
            "notifyNameServers",
            "update",
            "updateNetworkACL",
            "updateSecurityPolicies",
        ],
        "Secondary" => &[
            "disabled",
            "primaryNameServerAddresses",
            "primaryZoneTransferProtocol",
            "primaryZoneTransferTsigKeyName",
            "validateZone",
            "zoneTransfer",
            "zoneTransferNetworkACL",
            "zoneTransferTsigKeyNames",
            "notify",
            "notifyNameServers",
            "update",
            "updateNetworkACL",
            "queryAccess",
            "queryAccessNetworkACL",
        ],
        "SecondaryForwarder" => &[
            "disabled",
            "primaryNameServerAddresses",
            "primaryZoneTransferProtocol",
            "primaryZoneTransferTsigKeyName",
            "zoneTransfer",
            "zoneTransferNetworkACL",
            "zoneTransferTsigKeyNames",
            "notify",
            "notifyNameServers",
            "queryAccess",
            "queryAccessNetworkACL",
        ],
        "SecondaryCatalog" => &[
            "disabled",
            "primaryNameServerAddresses",
            "primaryZoneTransferProtocol",
            "primaryZoneTransferTsigKeyName",
            "zoneTransfer",
            "zoneTransferNetworkACL",
            "zoneTransferTsigKeyNames",
            "notify",
            "notifyNameServers",
        ],
        "Catalog" => &[
            "disabled",
            "zoneTransfer",
            "zoneTransferNetworkACL",
            "zoneTransferTsigKeyNames",
            "notify",
            "notifyNameServers",
            "notifySecondaryCatalogsNameServers",
            "queryAccess",
            "queryAccessNetworkACL",
        ],
        "SecondaryROOT" => &["disabled"],
        _ => &[],
    }
}

fn all_fields() -> Vec<FieldSpec> {
    CREATE_FIELDS.iter().chain(OPTION_FIELDS).copied().collect()
}

pub struct Zone {
    pub zone: String,
    pub node: Option<String>,
    pub desired: Desired,
}

impl Zone {
    pub fn new(zone: &str, node: Option<String>, desired: Desired) -> Result<Self, AppError> {
        let desired = desired.coerced(&all_fields(), "zones")?;
        Ok(Self {
            zone: zone.trim_end_matches('.').to_string(),
            node,
            desired,
        })
    }

    fn call(&self, call: ApiCall) -> ApiCall {
        call.param("zone", &self.zone)
            .param_opt("node", self.node.as_deref())
    }

    fn check_options(&self, zone_type: &str) -> Result<(), AppError> {
        let allowed = options_for(zone_type);
        let create = create_params_for(zone_type);
        for key in self.desired.keys() {
            let is_option = OPTION_FIELDS.iter().any(|f| f.name == key);
            if is_option && !allowed.contains(&key.as_str()) && !create.contains(&key.as_str()) {
                return Err(AppError::validation(format!(
                    "parameter '{key}' is not supported for zone type '{zone_type}'"
                )));
            }
        }
        Ok(())
    }

    /// Options in `desired` that the create call did not already carry.
    fn options_after_create(&self, zone_type: &str) -> Vec<(String, String)> {
        let create = create_params_for(zone_type);
        wire_params(OPTION_FIELDS, &self.desired, |f| !create.contains(&f.name))
    }
}

#[async_trait]
impl Resource for Zone {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Zone
    }

    fn describe(&self) -> String {
        self.zone.clone()
    }

    fn validate(&self, state: State) -> Result<(), AppError> {
        validate_domain_name("zone", &self.zone)?;
        if state == State::Present {
            self.desired.require(&["type"], "state=present")?;
        }
        Ok(())
    }

    async fn fetch(&self, api: &dyn DnsApi) -> Result<Option<Value>, AppError> {
        let resp = api
            .call(&self.call(ApiCall::get("/api/zones/options/get")))
            .await?;
        found_unless(resp, "No such zone was found")
    }

    fn check_create(&self) -> Result<(), AppError> {
        let zone_type = self.desired.get_str("type").unwrap_or_default();
        let create = create_params_for(zone_type);
        for key in self.desired.keys() {
            let is_create_only = CREATE_FIELDS.iter().any(|f| f.name == key);
            if is_create_only && key != "type" && key != "dnssec" && !create.contains(&key.as_str())
            {
                return Err(AppError::validation(format!(
                    "parameter '{key}' is not supported for zone type '{zone_type}'"
                )));
            }
        }
        if self.desired.get_bool("dnssec") == Some(true) && zone_type != "Primary" {
            return Err(AppError::validation("dnssec can only be enabled on Primary zones"));
        }
        self.check_options(zone_type)
    }

    fn diff(&self, current: &Value) -> Result<Diff, AppError> {
        let current_type = current
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if let Some(wanted) = self.desired.get_str("type") {
            if wanted != current_type {
                return Err(AppError::validation(format!(
                    "zone {} exists with type '{current_type}', not '{wanted}'; delete it first to change the type",
                    self.zone
                )));
            }
        }
        self.check_options(current_type)?;

        let allowed = options_for(current_type);
        let options: Vec<FieldSpec> = OPTION_FIELDS
            .iter()
            .filter(|f| allowed.contains(&f.name))
            .copied()
            .collect();
        Ok(Diff::compute(&options, &self.desired, current))
    }

    fn create(&self) -> Result<Vec<ApiCall>, AppError> {
        let zone_type = self.desired.get_str("type").unwrap_or_default();
        let create = create_params_for(zone_type);
        let fields = all_fields();
        let params = wire_params(&fields, &self.desired, |f| create.contains(&f.name));

        let mut calls = vec![
            self.call(ApiCall::post("/api/zones/create"))
                .param("type", zone_type)
                .params(params),
        ];

        if self.desired.get_bool("dnssec") == Some(true) {
            calls.push(
                self.call(ApiCall::post("/api/zones/dnssec/sign"))
                    .param("algorithm", "RSA")
                    .param("hashAlgorithm", "SHA256")
                    .param("kskKeySize", "2048")
                    .param("zskKeySize", "1024")
                    .param("dnsKeyTtl", "86400"),
            );
        }

        let options = self.options_after_create(zone_type);
        if !options.is_empty() {
            calls.push(
                self.call(ApiCall::post("/api/zones/options/set"))
                    .params(options),
            );
        }
        Ok(calls)
    }

    fn update(&self, _current: &Value, diff: &Diff) -> Result<Vec<ApiCall>, AppError> {
        let params = wire_params(OPTION_FIELDS, &self.desired, |f| diff.contains(f.name));
        Ok(vec![
            self.call(ApiCall::post("/api/zones/options/set"))
                .params(params),
        ])
    }

    fn delete(&self, _current: &Value) -> Result<Vec<ApiCall>, AppError> {
        Ok(vec![self.call(ApiCall::post("/api/zones/delete"))])
    }
}
