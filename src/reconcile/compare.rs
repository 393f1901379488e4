//! Field normalization for comparison and wire encoding.

use serde_json::Value;

use crate::reconcile::field::{Compare, FieldKind, FieldSpec, parse_key_values};

/// `false`, `"false"`, or a one-element list holding either.
pub fn is_false_clear(value: &Value) -> bool {
    match value {
        Value::Bool(false) => true,
        Value::String(s) => s.trim().eq_ignore_ascii_case("false"),
        Value::Array(items) if items.len() == 1 => {
            matches!(&items[0], Value::Bool(false))
                || items[0]
                    .as_str()
                    .is_some_and(|s| s.trim().eq_ignore_ascii_case("false"))
        }
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Canon {
    Unset,
    Int(i64),
    Str(String),
    List(Vec<String>),
    Json(Value),
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn scalar(compare: Compare, value: &Value) -> Canon {
    let Some(s) = text_of(value) else {
        return Canon::Unset;
    };
    if compare == Compare::Hex {
        return Canon::Str(
            s.chars()
                .filter(|c| *c != ':' && !c.is_whitespace())
                .collect::<String>()
                .to_lowercase(),
        );
    }
    if let Ok(n) = s.trim().parse::<i64>() {
        return Canon::Int(n);
    }
    match compare {
        Compare::CaseInsensitive => Canon::Str(s.to_lowercase()),
        Compare::Text => {
            let t = s.trim();
            if t.is_empty() {
                Canon::Unset
            } else {
                Canon::Str(t.to_string())
            }
        }
        _ => Canon::Str(s),
    }
}

fn list_items(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        v if is_false_clear(v) => Vec::new(),
        Value::Array(items) => items.iter().filter_map(text_of).collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect(),
        other => text_of(other).into_iter().collect(),
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::Array(items) => {
            let mut parts: Vec<String> = items.iter().filter_map(text_of).collect();
            parts.sort();
            parts.join(",")
        }
        Value::String(s) if s.contains(',') => {
            let mut parts: Vec<&str> = s.split(',').map(str::trim).collect();
            parts.sort();
            parts.join(",")
        }
        Value::String(s) if s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false") => {
            s.to_ascii_lowercase()
        }
        other => text_of(other).unwrap_or_default(),
    }
}

fn table_rows(columns: &[&str], value: &Value) -> Vec<String> {
    let Value::Array(rows) = value else {
        return Vec::new();
    };
    let mut out: Vec<String> = rows
        .iter()
        .map(|row| match row {
            Value::Object(map) => columns
                .iter()
                .map(|c| map.get(*c).map(cell).unwrap_or_default())
                .collect::<Vec<_>>()
                .join("|"),
            other => text_of(other).unwrap_or_default(),
        })
        .collect();
    out.sort();
    out
}

fn canon(spec: &FieldSpec, value: Option<&Value>) -> Canon {
    let value = value.unwrap_or(&Value::Null);
    match spec.kind {
        FieldKind::Str | FieldKind::Int | FieldKind::Choice(_) => scalar(spec.compare, value),
        FieldKind::Bool => match value {
            Value::Null => Canon::Unset,
            Value::Bool(b) => Canon::Str(b.to_string()),
            other => Canon::Str(text_of(other).unwrap_or_default().to_lowercase()),
        },
        FieldKind::StrList => {
            let mut items = list_items(value);
            if spec.compare == Compare::CaseInsensitive {
                items.iter_mut().for_each(|i| *i = i.to_lowercase());
            }
            items.sort();
            Canon::List(items)
        }
        FieldKind::IntList => {
            let mut items: Vec<i64> = list_items(value)
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();
            items.sort_unstable();
            Canon::List(items.into_iter().map(|n| n.to_string()).collect())
        }
        FieldKind::Table(columns) => {
            if is_false_clear(value) {
                Canon::List(Vec::new())
            } else {
                Canon::List(table_rows(columns, value))
            }
        }
        FieldKind::Json => match value {
            Value::Null => Canon::Unset,
            Value::String(s) => {
                Canon::Json(serde_json::from_str(s).unwrap_or_else(|_| value.clone()))
            }
            other => Canon::Json(other.clone()),
        },
        FieldKind::KeyValues => {
            let map = match value {
                Value::String(s) => parse_key_values(s),
                Value::Object(map) => map.clone(),
                _ => Default::default(),
            };
            // serde_json maps iterate in key order
            Canon::List(
                map.iter()
                    .map(|(k, v)| format!("{k}={}", text_of(v).unwrap_or_default()))
                    .collect(),
            )
        }
    }
}

/// Whether `current` already satisfies `desired` under the field's rules.
pub fn values_match(spec: &FieldSpec, current: Option<&Value>, desired: &Value) -> bool {
    match spec.compare {
        Compare::WriteOnly => true,
        Compare::Always => false,
        _ => canon(spec, current) == canon(spec, Some(desired)),
    }
}

/// Encode a coerced value as a form/query parameter.
pub fn to_wire(spec: &FieldSpec, value: &Value) -> String {
    if spec.is_list() && is_false_clear(value) {
        return "false".to_string();
    }
    match (spec.kind, value) {
        (FieldKind::Table(columns), Value::Array(rows)) => rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| row.get(*c).map(wire_cell).unwrap_or_default())
                    .collect::<Vec<_>>()
                    .join("|")
            })
            .collect::<Vec<_>>()
            .join("|"),
        (FieldKind::KeyValues, Value::Object(map)) => map
            .iter()
            .map(|(k, v)| format!("{k}|{}", text_of(v).unwrap_or_default()))
            .collect::<Vec<_>>()
            .join("|"),
        (FieldKind::Json, Value::String(s)) => s.clone(),
        (FieldKind::Json, other) => other.to_string(),
        (_, Value::Array(items)) => items
            .iter()
            .filter_map(text_of)
            .collect::<Vec<_>>()
            .join(","),
        (_, other) => text_of(other).unwrap_or_default(),
    }
}

fn wire_cell(value: &Value) -> String {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(text_of)
            .collect::<Vec<_>>()
            .join(","),
        other => text_of(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_strings_equal_numbers() {
        let spec = FieldSpec::int("preference");
        assert!(values_match(&spec, Some(&json!(0)), &json!("0")));
        assert!(values_match(&spec, Some(&json!("10")), &json!(10)));
        assert!(!values_match(&spec, Some(&json!(10)), &json!(20)));
    }

    #[test]
    fn string_field_still_coerces_numbers() {
        let spec = FieldSpec::string("keyTag");
        assert!(values_match(&spec, Some(&json!(12345)), &json!("12345")));
    }

    #[test]
    fn case_insensitive_fields() {
        let spec = FieldSpec::string("digest").case_insensitive();
        assert!(values_match(&spec, Some(&json!("ABCDEF01")), &json!("abcdef01")));
        let exact = FieldSpec::string("text");
        assert!(!values_match(&exact, Some(&json!("ABC")), &json!("abc")));
    }

    #[test]
    fn hex_ignores_separators() {
        let spec = FieldSpec::string("rdata").compare(Compare::Hex);
        assert!(values_match(
            &spec,
            Some(&json!("01:02:03:04:DE:AD:BE:EF")),
            &json!("01020304deadbeef")
        ));
    }

    #[test]
    fn text_treats_blank_as_unset() {
        let spec = FieldSpec::string("comments").text();
        assert!(values_match(&spec, None, &json!("   ")));
        assert!(values_match(&spec, Some(&json!(" hi ")), &json!("hi")));
    }

    #[test]
    fn list_order_is_ignored() {
        let spec = FieldSpec::list("forwarders");
        assert!(values_match(
            &spec,
            Some(&json!(["1.1.1.1", "8.8.8.8"])),
            &json!(["8.8.8.8", "1.1.1.1"])
        ));
        assert!(values_match(
            &spec,
            Some(&json!("8.8.8.8,1.1.1.1")),
            &json!(["1.1.1.1", "8.8.8.8"])
        ));
    }

    #[test]
    fn false_clear_matches_empty_or_missing() {
        let spec = FieldSpec::list("blockListUrls").clearable();
        assert!(values_match(&spec, None, &json!(false)));
        assert!(values_match(&spec, Some(&json!([])), &json!(false)));
        assert!(values_match(&spec, Some(&Value::Null), &json!(false)));
        assert!(!values_match(
            &spec,
            Some(&json!(["https://example.com/list.txt"])),
            &json!(false)
        ));
    }

    #[test]
    fn int_lists_sort_numerically() {
        let spec = FieldSpec::int_list("socketPoolExcludedPorts");
        assert!(values_match(&spec, Some(&json!([53, 5380])), &json!(["5380", "53"])));
    }

    #[test]
    fn tables_compare_as_row_sets() {
        let spec = FieldSpec::table("exclusions", &["startingAddress", "endingAddress"]);
        let current = json!([
            {"startingAddress": "10.0.0.1", "endingAddress": "10.0.0.10"},
            {"startingAddress": "10.0.0.50", "endingAddress": "10.0.0.60"}
        ]);
        let desired = json!([
            {"startingAddress": "10.0.0.50", "endingAddress": "10.0.0.60"},
            {"startingAddress": "10.0.0.1", "endingAddress": "10.0.0.10"}
        ]);
        assert!(values_match(&spec, Some(&current), &desired));
    }

    #[test]
    fn table_cells_normalize_numbers_and_nested_lists() {
        let spec = FieldSpec::table("updateSecurityPolicies", &["tsigKeyName", "domain", "allowedTypes"]);
        let current = json!([{"tsigKeyName": "k1", "domain": "example.com", "allowedTypes": ["AAAA", "A"]}]);
        let desired = json!([{"tsigKeyName": "k1", "domain": "example.com", "allowedTypes": "A,AAAA"}]);
        assert!(values_match(&spec, Some(&current), &desired));

        let limits = FieldSpec::table("qpmPrefixLimitsIPv4", &["prefix", "udpLimit", "tcpLimit"]);
        assert!(values_match(
            &limits,
            Some(&json!([{"prefix": 24, "udpLimit": 100, "tcpLimit": 50}])),
            &json!([{"prefix": "24", "udpLimit": "100", "tcpLimit": "50"}])
        ));
    }

    #[test]
    fn key_values_compare_as_map() {
        let spec = FieldSpec::key_values("svcParams");
        assert!(values_match(
            &spec,
            Some(&json!({"port": "443", "alpn": "h2"})),
            &json!("alpn|h2|port|443")
        ));
    }

    #[test]
    fn write_only_and_always() {
        assert!(values_match(&FieldSpec::bool("ptr").write_only(), None, &json!(true)));
        assert!(!values_match(
            &FieldSpec::string("newPassword").compare(Compare::Always),
            Some(&json!("x")),
            &json!("x")
        ));
    }

    #[test]
    fn wire_encoding() {
        assert_eq!(to_wire(&FieldSpec::bool("disabled"), &json!(true)), "true");
        assert_eq!(
            to_wire(&FieldSpec::list("forwarders"), &json!(["1.1.1.1", "8.8.8.8"])),
            "1.1.1.1,8.8.8.8"
        );
        assert_eq!(
            to_wire(&FieldSpec::list("forwarders").clearable(), &json!(false)),
            "false"
        );
        let limits = FieldSpec::table("qpmPrefixLimitsIPv4", &["prefix", "udpLimit", "tcpLimit"]);
        assert_eq!(
            to_wire(
                &limits,
                &json!([
                    {"prefix": "24", "udpLimit": "100", "tcpLimit": "50"},
                    {"prefix": "16", "udpLimit": "1000", "tcpLimit": "500"}
                ])
            ),
            "24|100|50|16|1000|500"
        );
        assert_eq!(
            to_wire(&FieldSpec::json("config"), &json!({"a": 1})),
            r#"{"a":1}"#
        );
    }
}
