use async_trait::async_trait;
use serde_json::Value;

use crate::error::AppError;
use crate::reconcile::{Desired, Diff, FieldSpec, Resource, ResourceKind, State, wire_params};
use crate::technitium::{ApiCall, DnsApi};
use crate::validation::{validate_choice, validate_domain_name};

pub const KEY_TYPES: &[&str] = &["KeySigningKey", "ZoneSigningKey"];
const ALGORITHMS: &[&str] = &["RSA", "ECDSA", "EDDSA"];
const HASH_ALGORITHMS: &[&str] = &["MD5", "SHA1", "SHA256", "SHA512"];
const CURVES: &[&str] = &["P256", "P384", "ED25519", "ED448"];
const SIGNED: &[&str] = &["signed", "signedwithnsec", "signedwithnsec3"];

const FIELDS: &[FieldSpec] = &[
    FieldSpec::choice("algorithm", ALGORITHMS).write_only(),
    FieldSpec::choice("hashAlgorithm", HASH_ALGORITHMS).write_only(),
    FieldSpec::int("keySize").write_only(),
    FieldSpec::choice("curve", CURVES).write_only(),
    FieldSpec::int("rolloverDays").range(0, 365),
    FieldSpec::string("pemPrivateKey").write_only().secret(),
];

/// A DNSSEC signing key of a signed zone.
pub struct PrivateKey {
    pub zone: String,
    pub key_type: String,
    pub key_tag: Option<i64>,
    pub node: Option<String>,
    pub desired: Desired,
}

impl PrivateKey {
    pub fn new(
        zone: &str,
        key_type: &str,
        key_tag: Option<i64>,
        node: Option<String>,
        desired: Desired,
    ) -> Result<Self, AppError> {
        Ok(Self {
            zone: zone.to_string(),
            key_type: key_type.to_string(),
            key_tag,
            node,
            desired: desired.coerced(FIELDS, "private keys")?,
        })
    }

    fn call(&self, path: &str) -> ApiCall {
        ApiCall::post(path)
            .param("zone", &self.zone)
            .param_opt("node", self.node.as_deref())
    }

    fn is_match(&self, key: &Value) -> bool {
        if key.get("keyType").and_then(Value::as_str) != Some(self.key_type.as_str()) {
            return false;
        }
        match self.key_tag {
            Some(tag) => key.get("keyTag").and_then(Value::as_i64) == Some(tag),
            None => key.get("state").and_then(Value::as_str) == Some("Generated"),
        }
    }

    /// Each algorithm takes its own subset of the generation parameters.
    fn check_algorithm(&self) -> Result<(), AppError> {
        let Some(algorithm) = self.desired.get_str("algorithm") else {
            return Ok(());
        };
        let has = |k: &str| self.desired.contains(k);
        let curve = self.desired.get_str("curve");
        match algorithm {
            "RSA" => {
                if !has("hashAlgorithm") || !has("keySize") {
                    return Err(AppError::validation(
                        "RSA keys need hashAlgorithm and keySize",
                    ));
                }
                if curve.is_some() {
                    return Err(AppError::validation("curve is not valid for RSA keys"));
                }
            }
            _ => {
                let curves: &[&str] = if algorithm == "ECDSA" {
                    &["P256", "P384"]
                } else {
                    &["ED25519", "ED448"]
                };
                let Some(curve) = curve else {
                    return Err(AppError::validation(format!(
                        "curve is required for {algorithm} keys"
                    )));
                };
                validate_choice("curve", curve, curves)?;
                if has("hashAlgorithm") || has("keySize") {
                    return Err(AppError::validation(format!(
                        "hashAlgorithm and keySize are not valid for {algorithm} keys"
                    )));
                }
            }
        }
        Ok(())
    }

    fn key_tag_of(current: &Value) -> Result<String, AppError> {
        current
            .get("keyTag")
            .and_then(Value::as_i64)
            .map(|t| t.to_string())
            .ok_or_else(|| AppError::decode("private key entry has no keyTag"))
    }
}

#[async_trait]
impl Resource for PrivateKey {
    fn kind(&self) -> ResourceKind {
        ResourceKind::PrivateKey
    }

    fn describe(&self) -> String {
        match self.key_tag {
            Some(tag) => format!("{} {tag} in {}", self.key_type, self.zone),
            None => format!("{} in {}", self.key_type, self.zone),
        }
    }

    fn validate(&self, _state: State) -> Result<(), AppError> {
        validate_domain_name("zone", &self.zone)?;
        validate_choice("keyType", &self.key_type, KEY_TYPES)?;
        self.check_algorithm()
    }

    async fn fetch(&self, api: &dyn DnsApi) -> Result<Option<Value>, AppError> {
        let call = ApiCall::get("/api/zones/dnssec/properties/get")
            .param("zone", &self.zone)
            .param_opt("node", self.node.as_deref());
        let props = api.call(&call).await?.into_result()?;

        let status = props
            .get("dnssecStatus")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase();
        if !SIGNED.contains(&status.as_str()) {
            return Err(AppError::validation(format!(
                "zone '{}' is not signed with DNSSEC (status '{status}')",
                self.zone
            )));
        }

        Ok(props
            .get("dnssecPrivateKeys")
            .and_then(Value::as_array)
            .and_then(|keys| keys.iter().find(|k| self.is_match(k)))
            .cloned())
    }

    fn check_create(&self) -> Result<(), AppError> {
        if let Some(tag) = self.key_tag {
            return Err(AppError::validation(format!(
                "private key with tag {tag} not found in zone '{}'",
                self.zone
            )));
        }
        self.desired.require(&["algorithm"], "a new private key")
    }

    fn diff(&self, current: &Value) -> Result<Diff, AppError> {
        Ok(Diff::compute(FIELDS, &self.desired, current))
    }

    fn create(&self) -> Result<Vec<ApiCall>, AppError> {
        Ok(vec![
            self.call("/api/zones/dnssec/properties/addPrivateKey")
                .param("keyType", &self.key_type)
                .params(wire_params(FIELDS, &self.desired, |_| true)),
        ])
    }

    fn update(&self, current: &Value, diff: &Diff) -> Result<Vec<ApiCall>, AppError> {
        Ok(vec![
            self.call("/api/zones/dnssec/properties/updatePrivateKey")
                .param("keyTag", Self::key_tag_of(current)?)
                .params(wire_params(FIELDS, &self.desired, |f| diff.contains(f.name))),
        ])
    }

    fn delete(&self, current: &Value) -> Result<Vec<ApiCall>, AppError> {
        let state = current.get("state").and_then(Value::as_str).unwrap_or_default();
        if state != "Generated" {
            return Err(AppError::validation(format!(
                "private key has state '{state}'; only keys in state 'Generated' can be deleted"
            )));
        }
        Ok(vec![
            self.call("/api/zones/dnssec/properties/deletePrivateKey")
                .param("keyTag", Self::key_tag_of(current)?),
        ])
    }
}
