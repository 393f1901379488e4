use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::AppError;
use crate::reconcile::{Desired, Diff, FieldSpec, Resource, ResourceKind, State, wire_params};
use crate::technitium::{ApiCall, DnsApi};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ClusterRole {
    Primary,
    Secondary,
}

impl ClusterRole {
    fn node_type(self) -> &'static str {
        match self {
            ClusterRole::Primary => "Primary",
            ClusterRole::Secondary => "Secondary",
        }
    }
}

const OPTION_FIELDS: &[FieldSpec] = &[
    FieldSpec::int("heartbeatRefreshIntervalSeconds").range(10, 300),
    FieldSpec::int("heartbeatRetryIntervalSeconds").range(10, 300),
    FieldSpec::int("configRefreshIntervalSeconds").range(30, 3600),
    FieldSpec::int("configRetryIntervalSeconds").range(30, 3600),
];

/// Init parameters of a new cluster. The options in `OPTION_FIELDS` are accepted too.
const PRIMARY_FIELDS: &[FieldSpec] = &[
    FieldSpec::string("clusterDomain").case_insensitive(),
    FieldSpec::string("primaryNodeIpAddress"),
];

const SECONDARY_FIELDS: &[FieldSpec] = &[
    FieldSpec::string("secondaryNodeIpAddress"),
    FieldSpec::string("primaryNodeUrl"),
    FieldSpec::string("primaryNodeIpAddress"),
    FieldSpec::bool("ignoreCertificateErrors"),
    FieldSpec::string("primaryNodeUsername"),
    FieldSpec::string("primaryNodePassword").write_only().secret(),
    FieldSpec::string("primaryNodeTotp").write_only().secret(),
];

/// Cluster membership of the node the client talks to.
pub struct ClusterNode {
    pub role: ClusterRole,
    pub node: Option<String>,
    pub force: bool,
    pub desired: Desired,
}

fn nodes(state: &Value) -> impl Iterator<Item = &Value> {
    state
        .get("clusterNodes")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn self_node_type(state: &Value) -> Option<&str> {
    nodes(state)
        .find(|n| n.get("state").and_then(Value::as_str) == Some("Self"))
        .and_then(|n| n.get("type").and_then(Value::as_str))
}

fn primary_ip(state: &Value) -> Option<&str> {
    nodes(state)
        .find(|n| n.get("type").and_then(Value::as_str) == Some("Primary"))
        .and_then(|n| n.get("ipAddress").and_then(Value::as_str))
}

impl ClusterNode {
    pub fn new(
        role: ClusterRole,
        node: Option<String>,
        force: bool,
        desired: Desired,
    ) -> Result<Self, AppError> {
        let fields: Vec<FieldSpec> = match role {
            ClusterRole::Primary => PRIMARY_FIELDS.iter().chain(OPTION_FIELDS).copied().collect(),
            ClusterRole::Secondary => SECONDARY_FIELDS.to_vec(),
        };
        Ok(Self {
            role,
            node,
            force,
            desired: desired.coerced(&fields, "this cluster role")?,
        })
    }

    fn call(&self, path: &str) -> ApiCall {
        ApiCall::post(path).param_opt("node", self.node.as_deref())
    }

    fn set_options(&self, include: impl Fn(&FieldSpec) -> bool) -> Option<ApiCall> {
        let params = wire_params(OPTION_FIELDS, &self.desired, include);
        if params.is_empty() {
            return None;
        }
        Some(self.call("/api/admin/cluster/primary/setOptions").params(params))
    }

    fn force_flag(&self, call: ApiCall, name: &str) -> ApiCall {
        if self.force {
            call.param(name, "true")
        } else {
            call
        }
    }

    /// A primary may only be reconciled against its own domain and address.
    fn check_same_cluster(&self, current: &Value) -> Result<(), AppError> {
        let domain = current.get("clusterDomain").and_then(Value::as_str);
        if let Some(want) = self.desired.get_str("clusterDomain") {
            if !domain.is_some_and(|d| d.eq_ignore_ascii_case(want)) {
                return Err(AppError::validation(format!(
                    "cluster already initialized with domain '{}'; delete it first to change the domain",
                    domain.unwrap_or_default()
                )));
            }
        }
        if let Some(want) = self.desired.get_str("primaryNodeIpAddress") {
            let ip = primary_ip(current);
            if ip != Some(want) {
                return Err(AppError::validation(format!(
                    "cluster already initialized with primary address '{}', wanted '{want}'",
                    ip.unwrap_or("unknown")
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Resource for ClusterNode {
    fn kind(&self) -> ResourceKind {
        ResourceKind::ClusterNode
    }

    fn describe(&self) -> String {
        match &self.node {
            Some(node) => format!("{} on {node}", self.role.node_type()),
            None => self.role.node_type().to_string(),
        }
    }

    fn validate(&self, _state: State) -> Result<(), AppError> {
        Ok(())
    }

    async fn fetch(&self, api: &dyn DnsApi) -> Result<Option<Value>, AppError> {
        let call = ApiCall::get("/api/admin/cluster/state").param_opt("node", self.node.as_deref());
        let state = api.call(&call).await?.into_result()?;
        let initialized = state
            .get("clusterInitialized")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok(initialized.then_some(state))
    }

    fn check_create(&self) -> Result<(), AppError> {
        match self.role {
            ClusterRole::Primary => self
                .desired
                .require(&["clusterDomain", "primaryNodeIpAddress"], "a new cluster"),
            ClusterRole::Secondary => self.desired.require(
                &[
                    "secondaryNodeIpAddress",
                    "primaryNodeUrl",
                    "primaryNodeUsername",
                    "primaryNodePassword",
                ],
                "joining a cluster",
            ),
        }
    }

    fn diff(&self, current: &Value) -> Result<Diff, AppError> {
        let node_type = self_node_type(current);
        let mut diff = Diff::default();
        match self.role {
            ClusterRole::Secondary => {
                if node_type == Some("Primary") {
                    return Err(AppError::validation(
                        "this node is the cluster primary; delete the cluster before joining another",
                    ));
                }
            }
            ClusterRole::Primary => {
                if node_type == Some("Secondary") {
                    diff.insert("type", json!("Secondary"), json!("Primary"));
                } else {
                    self.check_same_cluster(current)?;
                }
                diff.extend(Diff::compute(OPTION_FIELDS, &self.desired, current));
            }
        }
        Ok(diff)
    }

    fn create(&self) -> Result<Vec<ApiCall>, AppError> {
        Ok(match self.role {
            ClusterRole::Primary => {
                let init = self.call("/api/admin/cluster/init").params(wire_params(
                    PRIMARY_FIELDS,
                    &self.desired,
                    |f| matches!(f.name, "clusterDomain" | "primaryNodeIpAddress"),
                ));
                std::iter::once(init)
                    .chain(self.set_options(|_| true))
                    .collect()
            }
            ClusterRole::Secondary => vec![
                self.call("/api/admin/cluster/initJoin")
                    .params(wire_params(SECONDARY_FIELDS, &self.desired, |_| true)),
            ],
        })
    }

    fn update(&self, _current: &Value, diff: &Diff) -> Result<Vec<ApiCall>, AppError> {
        let mut calls = Vec::new();
        if diff.contains("type") {
            calls.push(self.force_flag(
                self.call("/api/admin/cluster/secondary/promote"),
                "forceDeletePrimary",
            ));
        }
        calls.extend(self.set_options(|f| diff.contains(f.name)));
        Ok(calls)
    }

    fn delete(&self, current: &Value) -> Result<Vec<ApiCall>, AppError> {
        let node_type = self_node_type(current);
        if node_type != Some(self.role.node_type()) {
            return Err(AppError::validation(format!(
                "this node is the cluster {}, not a {}; refusing to remove it",
                node_type.unwrap_or("unknown member"),
                self.role.node_type()
            )));
        }
        let call = match self.role {
            ClusterRole::Secondary => self.force_flag(
                self.call("/api/admin/cluster/secondary/leave"),
                "forceLeave",
            ),
            ClusterRole::Primary => self.force_flag(
                self.call("/api/admin/cluster/primary/delete"),
                "forceDelete",
            ),
        };
        Ok(vec![call])
    }
}
