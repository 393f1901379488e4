use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::reconcile::compare::values_match;
use crate::reconcile::field::{Desired, FieldSpec, find};

pub const MASK: &str = "********";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub current: Value,
    pub desired: Value,
}

/// Field name to current/desired pair. Empty means nothing to do.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Diff(BTreeMap<String, FieldChange>);

impl Diff {
    /// Compare every desired field that has a descriptor against `current`.
    pub fn compute(fields: &[FieldSpec], desired: &Desired, current: &Value) -> Diff {
        let mut diff = Diff::default();
        for (key, want) in desired.iter() {
            let Some(spec) = find(fields, key) else {
                continue;
            };
            let have = current.get(spec.remote);
            if values_match(spec, have, want) {
                continue;
            }
            diff.record(
                spec,
                have.cloned().unwrap_or(Value::Null),
                want.clone(),
            );
        }
        diff
    }

    pub fn record(&mut self, spec: &FieldSpec, current: Value, desired: Value) {
        let change = if spec.secret {
            FieldChange {
                current: Value::String(MASK.into()),
                desired: Value::String(MASK.into()),
            }
        } else {
            FieldChange { current, desired }
        };
        self.0.insert(spec.name.to_string(), change);
    }

    pub fn insert(&mut self, name: impl Into<String>, current: Value, desired: Value) {
        self.0.insert(name.into(), FieldChange { current, desired });
    }

    pub fn extend(&mut self, other: Diff) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&FieldChange> {
        self.0.get(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldChange)> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FIELDS: &[FieldSpec] = &[
        FieldSpec::int("ttl"),
        FieldSpec::list("forwarders"),
        FieldSpec::string("proxyPassword").secret(),
        FieldSpec::string("expiryTtl"),
    ];

    #[test]
    fn empty_when_everything_matches() {
        let desired = Desired::new()
            .with("ttl", 3600)
            .with("forwarders", json!(["8.8.8.8", "1.1.1.1"]));
        let current = json!({"ttl": "3600", "forwarders": ["1.1.1.1", "8.8.8.8"]});
        assert!(Diff::compute(FIELDS, &desired, &current).is_empty());
    }

    #[test]
    fn reports_only_changed_fields() {
        let desired = Desired::new().with("ttl", 300).with("forwarders", json!(["1.1.1.1"]));
        let current = json!({"ttl": 3600, "forwarders": ["1.1.1.1"]});
        let diff = Diff::compute(FIELDS, &desired, &current);
        assert_eq!(diff.len(), 1);
        assert_eq!(
            diff.get("ttl"),
            Some(&FieldChange {
                current: json!(3600),
                desired: json!(300)
            })
        );
    }

    #[test]
    fn list_order_does_not_change_diff() {
        let current = json!({"forwarders": ["a", "b", "c"]});
        let one = Desired::new().with("forwarders", json!(["c", "b", "a", "d"]));
        let two = Desired::new().with("forwarders", json!(["d", "a", "c", "b"]));
        let d1 = Diff::compute(FIELDS, &one, &current);
        let d2 = Diff::compute(FIELDS, &two, &current);
        assert_eq!(d1.keys().collect::<Vec<_>>(), d2.keys().collect::<Vec<_>>());
    }

    #[test]
    fn secrets_are_masked() {
        let desired = Desired::new().with("proxyPassword", "hunter2");
        let diff = Diff::compute(FIELDS, &desired, &json!({"proxyPassword": "old"}));
        let rendered = serde_json::to_string(&diff).unwrap();
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains(MASK));
    }
}
