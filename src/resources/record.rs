use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::reconcile::{
    Compare, Desired, Diff, Resource, ResourceKind, State, to_wire, values_match,
};
use crate::resources::record_types::{self, RecordType, update_name};
use crate::technitium::{ApiCall, DnsApi};
use crate::validation::validate_domain_name;

pub struct Record {
    pub zone: String,
    pub name: String,
    pub rtype: &'static RecordType,
    pub desired: Desired,
}

impl Record {
    pub fn new(
        zone: &str,
        name: &str,
        rtype: &str,
        desired: Desired,
    ) -> Result<Self, AppError> {
        let zone = zone.trim_end_matches('.').to_string();
        let name = match name.trim_end_matches('.') {
            "@" | "" => zone.clone(),
            n => n.to_string(),
        };
        let rtype = record_types::lookup(rtype).ok_or_else(|| {
            AppError::validation(format!(
                "unsupported record type '{rtype}' (supported: {})",
                record_types::supported_names()
            ))
        })?;
        let context = format!("record type {}", rtype.name);
        let desired = desired.coerced(&rtype.all_fields(), &context)?;
        Ok(Self {
            zone,
            name,
            rtype,
            desired,
        })
    }

    fn context(&self) -> String {
        format!("record type {}", self.rtype.name)
    }

    fn base(&self, path: &str) -> ApiCall {
        ApiCall::post(path)
            .param("zone", &self.zone)
            .param("domain", &self.name)
            .param("type", self.rtype.name)
    }

    /// Flatten a server record into one map: top-level attributes plus `rData`.
    fn flatten(record: &Value) -> Value {
        let mut out = Map::new();
        if let Some(obj) = record.as_object() {
            for (k, v) in obj {
                match k.as_str() {
                    "rData" => {}
                    // 0 means no expiry
                    "expiryTtl" if v.as_i64() == Some(0) => {}
                    _ => {
                        out.insert(k.clone(), v.clone());
                    }
                }
            }
            if let Some(rdata) = obj.get("rData").and_then(Value::as_object) {
                for (k, v) in rdata {
                    out.insert(k.clone(), v.clone());
                }
            }
        }
        Value::Object(out)
    }

    fn matches(&self, current: &Value) -> bool {
        if self.rtype.singleton {
            return true;
        }
        self.rtype.identity.iter().all(|name| {
            match (self.rtype.field(name), self.desired.get(name)) {
                (Some(spec), Some(want)) => values_match(spec, current.get(spec.remote), want),
                _ => false,
            }
        })
    }

    fn current_wire(&self, current: &Value, field: &str) -> Option<String> {
        let spec = self.rtype.field(field)?;
        let v = current.get(spec.remote)?;
        if v.is_null() {
            return None;
        }
        Some(to_wire(spec, v))
    }
}

#[async_trait]
impl Resource for Record {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Record
    }

    fn describe(&self) -> String {
        format!("{} {} in {}", self.rtype.name, self.name, self.zone)
    }

    fn validate(&self, state: State) -> Result<(), AppError> {
        validate_domain_name("zone", &self.zone)?;
        validate_domain_name("name", &self.name)?;
        let context = self.context();
        match state {
            State::Present => self.desired.require(self.rtype.required, &context),
            State::Absent if self.rtype.singleton => Ok(()),
            State::Absent => self.desired.require(self.rtype.identity, &context),
        }
    }

    async fn fetch(&self, api: &dyn DnsApi) -> Result<Option<Value>, AppError> {
        let call = ApiCall::get("/api/zones/records/get")
            .param("domain", &self.name)
            .param("zone", &self.zone);
        let response = api.call(&call).await?.into_result()?;
        let records = response
            .get("records")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(records
            .iter()
            .filter(|r| {
                r.get("type").and_then(Value::as_str) == Some(self.rtype.name)
                    && r.get("name")
                        .and_then(Value::as_str)
                        .is_some_and(|n| n.trim_end_matches('.').eq_ignore_ascii_case(&self.name))
            })
            .map(Self::flatten)
            .find(|r| self.matches(r)))
    }

    fn diff(&self, current: &Value) -> Result<Diff, AppError> {
        let mut diff = Diff::default();
        for (key, want) in self.desired.iter() {
            if !self.rtype.singleton && self.rtype.is_identity(key) {
                continue;
            }
            let Some(spec) = self.rtype.field(key) else {
                continue;
            };
            let have = current.get(spec.remote);
            if !values_match(spec, have, want) {
                diff.record(spec, have.cloned().unwrap_or(Value::Null), want.clone());
            }
        }
        Ok(diff)
    }

    fn create(&self) -> Result<Vec<ApiCall>, AppError> {
        let mut call = self.base("/api/zones/records/add");
        for (key, value) in self.desired.iter() {
            if let Some(spec) = self.rtype.field(key) {
                call = call.param(spec.wire, to_wire(spec, value));
            }
        }
        Ok(vec![call])
    }

    fn update(&self, current: &Value, diff: &Diff) -> Result<Vec<ApiCall>, AppError> {
        let mut call = self.base("/api/zones/records/update");

        if !self.rtype.singleton {
            for name in self.rtype.identity {
                let value = self.current_wire(current, name).ok_or_else(|| {
                    AppError::decode(format!("record is missing identifying field {name}"))
                })?;
                call = call.param(*name, value.clone());
                if let Some(new_name) = update_name(name) {
                    call = call.param(new_name, value);
                }
            }
        }

        for (key, value) in self.desired.iter() {
            let Some(spec) = self.rtype.field(key) else {
                continue;
            };
            if !self.rtype.singleton && self.rtype.is_identity(key) {
                continue;
            }
            let changed = diff.contains(key);
            if !changed && spec.compare != Compare::WriteOnly {
                continue;
            }
            match update_name(key).filter(|_| !self.rtype.singleton) {
                Some(new_name) => {
                    if let Some(old) = self.current_wire(current, key) {
                        call = call.param(spec.wire, old);
                    }
                    call = call.param(new_name, to_wire(spec, value));
                }
                None => call = call.param(spec.wire, to_wire(spec, value)),
            }
        }
        Ok(vec![call])
    }

    fn delete(&self, current: &Value) -> Result<Vec<ApiCall>, AppError> {
        let mut call = self.base("/api/zones/records/delete");
        for name in self.rtype.required {
            if let Some(value) = self.current_wire(current, name) {
                call = call.param(*name, value);
            }
        }
        Ok(vec![call])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::testing::FakeApi;
    use crate::reconcile::{Action, Reconciler};
    use crate::technitium::ApiResponse;
    use serde_json::json;
    use std::sync::Mutex;

    fn a_record(ip: &str, ttl: i64) -> Record {
        Record::new(
            "example.com",
            "www.example.com",
            "A",
            Desired::new().with("ipAddress", ip).with("ttl", ttl),
        )
        .unwrap()
    }

    /// Minimal stateful stand-in for the records endpoints.
    fn zone_server() -> FakeApi {
        let records: Mutex<Vec<Value>> = Mutex::new(Vec::new());
        FakeApi::new(move |call| {
            let mut records = records.lock().unwrap();
            let p = |k: &str| call.get_param(k).unwrap_or_default().to_string();
            match call.path.as_str() {
                "/api/zones/records/get" => {
                    ApiResponse::ok(json!({"zone": {"name": p("zone")}, "records": *records}))
                }
                "/api/zones/records/add" => {
                    records.push(json!({
                        "name": p("domain"),
                        "type": p("type"),
                        "ttl": p("ttl").parse::<i64>().unwrap_or(3600),
                        "disabled": false,
                        "rData": {"ipAddress": p("ipAddress")},
                        "expiryTtl": 0
                    }));
                    ApiResponse::ok(json!({}))
                }
                "/api/zones/records/update" => {
                    for r in records.iter_mut() {
                        if r["rData"]["ipAddress"] == p("ipAddress") {
                            r["rData"]["ipAddress"] = json!(p("newIpAddress"));
                            if let Some(ttl) = call.get_param("ttl") {
                                r["ttl"] = json!(ttl.parse::<i64>().unwrap());
                            }
                        }
                    }
                    ApiResponse::ok(json!({}))
                }
                "/api/zones/records/delete" => {
                    records.retain(|r| r["rData"]["ipAddress"] != p("ipAddress"));
                    ApiResponse::ok(json!({}))
                }
                _ => ApiResponse::error("unexpected"),
            }
        })
    }

    #[tokio::test]
    async fn create_then_noop_then_delete_then_noop() {
        let api = zone_server();
        let rec = Reconciler::new(&api, false);
        let res = a_record("192.0.2.1", 3600);

        let o = rec.reconcile(&res, State::Present).await.unwrap();
        assert!(o.changed);
        assert_eq!(o.action, Action::Create);

        let o = rec.reconcile(&res, State::Present).await.unwrap();
        assert!(!o.changed);

        let o = rec.reconcile(&res, State::Absent).await.unwrap();
        assert!(o.changed);
        assert_eq!(o.action, Action::Delete);

        let o = rec.reconcile(&res, State::Absent).await.unwrap();
        assert!(!o.changed);
        assert_eq!(api.mutating_calls().len(), 2);
    }

    #[tokio::test]
    async fn ttl_change_updates_in_place() {
        let api = zone_server();
        let rec = Reconciler::new(&api, false);
        rec.reconcile(&a_record("192.0.2.1", 3600), State::Present)
            .await
            .unwrap();

        let o = rec
            .reconcile(&a_record("192.0.2.1", 300), State::Present)
            .await
            .unwrap();
        assert_eq!(o.action, Action::Update);
        assert_eq!(o.diff.keys().collect::<Vec<_>>(), vec!["ttl"]);

        let update = api.mutating_calls().pop().unwrap();
        assert_eq!(update.path, "/api/zones/records/update");
        assert_eq!(update.get_param("ipAddress"), Some("192.0.2.1"));
        assert_eq!(update.get_param("newIpAddress"), Some("192.0.2.1"));
        assert_eq!(update.get_param("ttl"), Some("300"));

        let o = rec
            .reconcile(&a_record("192.0.2.1", 300), State::Present)
            .await
            .unwrap();
        assert!(!o.changed);
    }

    #[test]
    fn disallowed_parameter_fails_before_network() {
        let err = Record::new(
            "example.com",
            "www.example.com",
            "A",
            Desired::new()
                .with("ipAddress", "192.0.2.1")
                .with("exchange", "mail.example.com"),
        )
        .err()
        .unwrap();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn missing_required_fails_before_network() {
        let api = zone_server();
        let res = Record::new(
            "example.com",
            "example.com",
            "MX",
            Desired::new().with("exchange", "mail.example.com"),
        )
        .unwrap();
        let err = Reconciler::new(&api, false)
            .reconcile(&res, State::Present)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid input: missing required parameter 'preference' for record type MX"
        );
        assert!(api.calls().is_empty());
    }

    #[test]
    fn every_type_rejects_foreign_parameter_and_requires_its_own() {
        for t in record_types::RECORD_TYPES {
            let err = Record::new(
                "example.com",
                "x.example.com",
                t.name,
                Desired::new().with("notAField", "1"),
            )
            .err();
            assert!(err.is_some(), "{} accepted notAField", t.name);

            let res = Record::new("example.com", "x.example.com", t.name, Desired::new()).unwrap();
            assert!(res.validate(State::Present).is_err(), "{}", t.name);
        }
    }

    #[test]
    fn identity_drives_matching_and_remote_names() {
        let res = Record::new(
            "example.com",
            "_443._tcp.www.example.com",
            "TLSA",
            Desired::new()
                .with("tlsaCertificateUsage", "DANE-EE")
                .with("tlsaSelector", "SPKI")
                .with("tlsaMatchingType", "SHA2-256")
                .with("tlsaCertificateAssociationData", "abcdef"),
        )
        .unwrap();
        let current = Record::flatten(&json!({
            "name": "_443._tcp.www.example.com",
            "type": "TLSA",
            "ttl": 3600,
            "rData": {
                "certificateUsage": "DANE-EE",
                "selector": "SPKI",
                "matchingType": "SHA2-256",
                "certificateAssociationData": "ABCDEF"
            }
        }));
        assert!(res.matches(&current));
        assert!(res.diff(&current).unwrap().is_empty());
    }

    #[test]
    fn singleton_cname_updates_target_without_prefix() {
        let res = Record::new(
            "example.com",
            "alias.example.com",
            "CNAME",
            Desired::new().with("cname", "new.example.com"),
        )
        .unwrap();
        let current = Record::flatten(&json!({
            "name": "alias.example.com",
            "type": "CNAME",
            "ttl": 3600,
            "rData": {"cname": "old.example.com"}
        }));
        assert!(res.matches(&current));
        let diff = res.diff(&current).unwrap();
        assert!(diff.contains("cname"));
        let call = res.update(&current, &diff).unwrap().remove(0);
        assert_eq!(call.get_param("cname"), Some("new.example.com"));
        assert!(call.get_param("newCname").is_none());
    }

    #[test]
    fn comments_are_sent_but_never_diffed() {
        let res = Record::new(
            "example.com",
            "www.example.com",
            "A",
            Desired::new()
                .with("ipAddress", "192.0.2.1")
                .with("ttl", 60)
                .with("comments", "web"),
        )
        .unwrap();
        let current = Record::flatten(&json!({
            "name": "www.example.com", "type": "A", "ttl": 3600,
            "rData": {"ipAddress": "192.0.2.1"}
        }));
        let diff = res.diff(&current).unwrap();
        assert!(!diff.contains("comments"));
        let call = res.update(&current, &diff).unwrap().remove(0);
        assert_eq!(call.get_param("comments"), Some("web"));
    }

    #[test]
    fn zero_expiry_ttl_means_unset() {
        let flat = Record::flatten(&json!({
            "name": "www.example.com", "type": "A", "expiryTtl": 0,
            "rData": {"ipAddress": "192.0.2.1"}
        }));
        assert!(flat.get("expiryTtl").is_none());
    }

    #[test]
    fn svcb_params_change_uses_new_prefix() {
        let res = Record::new(
            "example.com",
            "_dns.example.com",
            "SVCB",
            Desired::new()
                .with("svcPriority", 1)
                .with("svcTargetName", "dns.example.com")
                .with("svcParams", "alpn|dot|port|853"),
        )
        .unwrap();
        let current = Record::flatten(&json!({
            "name": "_dns.example.com", "type": "SVCB",
            "rData": {"svcPriority": 1, "svcTargetName": "dns.example.com",
                      "svcParams": {"alpn": "dot"}}
        }));
        assert!(res.matches(&current));
        let diff = res.diff(&current).unwrap();
        let call = res.update(&current, &diff).unwrap().remove(0);
        assert_eq!(call.get_param("svcParams"), Some("alpn|dot"));
        assert_eq!(call.get_param("newSvcParams"), Some("alpn|dot|port|853"));
        assert_eq!(call.get_param("newSvcPriority"), Some("1"));
    }
}
