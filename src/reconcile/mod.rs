//! Generic fetch, diff, mutate-if-needed engine.

pub mod compare;
pub mod diff;
pub mod field;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::AppError;
use crate::technitium::{ApiCall, DnsApi};

pub use compare::{is_false_clear, to_wire, values_match};
pub use diff::{Diff, FieldChange, MASK};
pub use field::{Compare, Desired, FieldKind, FieldSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum State {
    Present,
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Record,
    Zone,
    DhcpScope,
    User,
    Group,
    Permission,
    Session,
    ServerSetting,
    ClusterNode,
    App,
    PrivateKey,
    AllowedZone,
    BlockedZone,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceKind::Record => "record",
            ResourceKind::Zone => "zone",
            ResourceKind::DhcpScope => "DHCP scope",
            ResourceKind::User => "user",
            ResourceKind::Group => "group",
            ResourceKind::Permission => "permission",
            ResourceKind::Session => "API token",
            ResourceKind::ServerSetting => "server settings",
            ResourceKind::ClusterNode => "cluster",
            ResourceKind::App => "app",
            ResourceKind::PrivateKey => "DNSSEC private key",
            ResourceKind::AllowedZone => "allowed zone",
            ResourceKind::BlockedZone => "blocked zone",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    None,
    Create,
    Update,
    Delete,
}

/// Parameters whose values never leave the process in output or logs.
pub const SECRET_PARAMS: &[&str] = &[
    "pass",
    "newPass",
    "proxyPassword",
    "primaryNodePassword",
    "primaryNodeTotp",
    "pemPrivateKey",
    "webServiceTlsCertificatePassword",
    "dnsTlsCertificatePassword",
    "tsigKeys",
];

/// `call` with the values of secret parameters replaced by the mask.
pub fn masked(call: &ApiCall) -> ApiCall {
    let mut call = call.clone();
    for (k, v) in call.params.iter_mut() {
        if SECRET_PARAMS.contains(&k.as_str()) {
            *v = MASK.to_string();
        }
    }
    call
}

/// One managed object on the server, described by identity plus desired fields.
#[async_trait]
pub trait Resource: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Human-readable identity, e.g. `A www.example.com in example.com`.
    fn describe(&self) -> String;

    /// Input checks that need no server state.
    fn validate(&self, state: State) -> Result<(), AppError>;

    /// Current representation, `None` when the object does not exist.
    async fn fetch(&self, api: &dyn DnsApi) -> Result<Option<Value>, AppError>;

    /// Checks that only apply when the object must be created.
    fn check_create(&self) -> Result<(), AppError> {
        Ok(())
    }

    fn diff(&self, current: &Value) -> Result<Diff, AppError>;

    fn create(&self) -> Result<Vec<ApiCall>, AppError>;

    fn update(&self, current: &Value, diff: &Diff) -> Result<Vec<ApiCall>, AppError>;

    fn delete(&self, current: &Value) -> Result<Vec<ApiCall>, AppError>;

    fn supports_absent(&self) -> bool {
        true
    }

    /// Hook to scrub sensitive data from a mutating call's response.
    fn redact_response(&self, response: Value) -> Value {
        response
    }

    /// Hook to scrub sensitive data from the fetched representation before it is reported.
    fn redact_current(&self, current: Value) -> Value {
        current
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub changed: bool,
    pub action: Action,
    pub kind: ResourceKind,
    pub resource: String,
    pub check_mode: bool,
    #[serde(skip_serializing_if = "Diff::is_empty")]
    pub diff: Diff,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub calls: Vec<ApiCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_response: Option<Value>,
    pub msg: String,
}

impl Outcome {
    fn unchanged(res: &dyn Resource, current: Option<Value>, check_mode: bool) -> Self {
        let msg = if current.is_some() {
            format!("{} {} is already in the desired state", res.kind(), res.describe())
        } else {
            format!("{} {} does not exist", res.kind(), res.describe())
        };
        Self {
            changed: false,
            action: Action::None,
            kind: res.kind(),
            resource: res.describe(),
            check_mode,
            diff: Diff::default(),
            calls: Vec::new(),
            current,
            api_response: None,
            msg,
        }
    }
}

pub struct Reconciler<'a> {
    api: &'a dyn DnsApi,
    check_mode: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new(api: &'a dyn DnsApi, check_mode: bool) -> Self {
        Self { api, check_mode }
    }

    pub async fn reconcile(&self, res: &dyn Resource, state: State) -> Result<Outcome, AppError> {
        if state == State::Absent && !res.supports_absent() {
            return Err(AppError::validation(format!(
                "{} does not support state=absent",
                res.kind()
            )));
        }
        res.validate(state)?;

        let current = res.fetch(self.api).await?;
        debug!(kind = %res.kind(), resource = %res.describe(), found = current.is_some(), "fetched");

        match (state, current) {
            (State::Present, None) => {
                res.check_create()?;
                let calls = res.create()?;
                self.apply(res, Action::Create, calls, Diff::default(), None)
                    .await
            }
            (State::Present, Some(cur)) => {
                let diff = res.diff(&cur)?;
                let shown = res.redact_current(cur.clone());
                if diff.is_empty() {
                    return Ok(Outcome::unchanged(res, Some(shown), self.check_mode));
                }
                let calls = res.update(&cur, &diff)?;
                self.apply(res, Action::Update, calls, diff, Some(shown)).await
            }
            (State::Absent, None) => Ok(Outcome::unchanged(res, None, self.check_mode)),
            (State::Absent, Some(cur)) => {
                let calls = res.delete(&cur)?;
                let shown = res.redact_current(cur);
                self.apply(res, Action::Delete, calls, Diff::default(), Some(shown))
                    .await
            }
        }
    }

    async fn apply(
        &self,
        res: &dyn Resource,
        action: Action,
        calls: Vec<ApiCall>,
        diff: Diff,
        current: Option<Value>,
    ) -> Result<Outcome, AppError> {
        let verb = match action {
            Action::Create => "created",
            Action::Update => "updated",
            Action::Delete => "deleted",
            Action::None => "unchanged",
        };
        let shown: Vec<ApiCall> = calls.iter().map(masked).collect();

        if self.check_mode {
            return Ok(Outcome {
                changed: true,
                action,
                kind: res.kind(),
                resource: res.describe(),
                check_mode: true,
                diff,
                calls: shown,
                current,
                api_response: None,
                msg: format!("{} {} would be {verb} (check mode)", res.kind(), res.describe()),
            });
        }

        let mut last = None;
        for call in &calls {
            info!(kind = %res.kind(), resource = %res.describe(), path = %call.path, "applying change");
            let resp = self.api.call(call).await?;
            let raw = resp.raw();
            resp.into_result()?;
            last = Some(res.redact_response(raw));
        }

        Ok(Outcome {
            changed: true,
            action,
            kind: res.kind(),
            resource: res.describe(),
            check_mode: false,
            diff,
            calls: shown,
            current,
            api_response: last,
            msg: format!("{} {} {verb}", res.kind(), res.describe()),
        })
    }
}

/// Wire parameters for the desired fields accepted by `include`.
pub fn wire_params(
    fields: &[FieldSpec],
    desired: &Desired,
    include: impl Fn(&FieldSpec) -> bool,
) -> Vec<(String, String)> {
    desired
        .iter()
        .filter_map(|(key, value)| {
            let spec = field::find(fields, key)?;
            include(spec).then(|| (spec.wire.to_string(), to_wire(spec, value)))
        })
        .collect()
}

/// Replace the value of every secret field present in `value` with the mask.
pub fn mask_secrets(fields: &[FieldSpec], mut value: Value) -> Value {
    if let Some(obj) = value.as_object_mut() {
        for spec in fields.iter().filter(|f| f.secret) {
            if let Some(v) = obj.get_mut(spec.remote) {
                if !v.is_null() {
                    *v = Value::String(MASK.to_string());
                }
            }
        }
    }
    value
}

/// `Some(response)` when `Ok`, `None` when the error message contains `marker`.
pub fn found_unless(
    resp: crate::technitium::ApiResponse,
    marker: &str,
) -> Result<Option<Value>, AppError> {
    if resp.is_ok() {
        return Ok(Some(resp.response));
    }
    if resp.message().contains(marker) {
        return Ok(None);
    }
    resp.into_result().map(Some)
}
