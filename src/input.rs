//! Desired-state input from `--set KEY=VALUE` pairs and `--from-file`.

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde_json::Value;

use crate::reconcile::Desired;

/// Split `KEY=VALUE`. JSON arrays, objects and `true`/`false` are parsed; every other
/// value, numbers included, stays text so that field coercion sees exactly what was typed.
pub fn parse_assignment(raw: &str) -> Result<(String, Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("expected KEY=VALUE, got '{raw}'");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("empty key in '{raw}'");
    }
    let value = match serde_json::from_str::<Value>(value) {
        Ok(v @ (Value::Array(_) | Value::Object(_) | Value::Bool(_))) => v,
        _ => Value::String(value.to_string()),
    };
    Ok((key.to_string(), value))
}

/// Plain `KEY=VALUE` with the value kept as text, for raw API parameters.
pub fn parse_param(raw: &str) -> Result<(String, String)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("expected KEY=VALUE, got '{raw}'");
    };
    if key.trim().is_empty() {
        bail!("empty key in '{raw}'");
    }
    Ok((key.trim().to_string(), value.to_string()))
}

/// Read a mapping from a JSON or YAML file. `.json` files are parsed as JSON,
/// anything else as YAML.
pub fn load_file(path: &Path) -> Result<Desired> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let value: Value = if is_json {
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse {} as JSON", path.display()))?
    } else {
        serde_yaml::from_str(&text)
            .with_context(|| format!("failed to parse {} as YAML", path.display()))?
    };
    match value {
        Value::Object(map) => Ok(Desired::from(map)),
        Value::Null => Ok(Desired::new()),
        _ => bail!("{} must contain a mapping of parameters", path.display()),
    }
}

/// File values first, then `--set` pairs on top.
pub fn build_desired(file: Option<&Path>, sets: &[String]) -> Result<Desired> {
    let mut desired = match file {
        Some(path) => load_file(path)?,
        None => Desired::new(),
    };
    for raw in sets {
        let (key, value) = parse_assignment(raw)?;
        desired.insert(key, value);
    }
    Ok(desired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn structured_assignment_values_are_json() {
        assert_eq!(parse_assignment("ttl=3600").unwrap(), ("ttl".into(), json!("3600")));
        assert_eq!(
            parse_assignment("disabled=false").unwrap(),
            ("disabled".into(), json!(false))
        );
        assert_eq!(
            parse_assignment("ipAddress=192.0.2.1").unwrap(),
            ("ipAddress".into(), json!("192.0.2.1"))
        );
        assert_eq!(
            parse_assignment(r#"forwarders=["1.1.1.1","8.8.8.8"]"#).unwrap().1,
            json!(["1.1.1.1", "8.8.8.8"])
        );
        assert_eq!(
            parse_assignment("text=v=spf1 -all").unwrap().1,
            json!("v=spf1 -all")
        );
    }

    #[test]
    fn scalar_text_is_kept_verbatim() {
        assert_eq!(parse_assignment("text=1e3").unwrap().1, json!("1e3"));
        assert_eq!(parse_assignment("text=null").unwrap().1, json!("null"));
        assert_eq!(parse_assignment("text=007").unwrap().1, json!("007"));

        let spec = crate::reconcile::FieldSpec::string("text");
        let (_, value) = parse_assignment("text=1e3").unwrap();
        assert_eq!(spec.coerce(&value).unwrap(), json!("1e3"));
        let ttl = crate::reconcile::FieldSpec::int("ttl");
        assert_eq!(ttl.coerce(&parse_assignment("ttl=3600").unwrap().1).unwrap(), json!(3600));
    }

    #[test]
    fn assignment_needs_key() {
        assert!(parse_assignment("novalue").is_err());
        assert!(parse_assignment("=1").is_err());
    }

    #[test]
    fn yaml_file_with_set_override() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(file, "ipAddress: 192.0.2.1\nttl: 300\nforwarders:\n  - 1.1.1.1\n  - 9.9.9.9").unwrap();

        let desired = build_desired(Some(file.path()), &["ttl=3600".to_string()]).unwrap();
        assert_eq!(desired.get("ipAddress"), Some(&json!("192.0.2.1")));
        assert_eq!(desired.get("ttl"), Some(&json!("3600")));
        assert_eq!(desired.get("forwarders"), Some(&json!(["1.1.1.1", "9.9.9.9"])));
    }

    #[test]
    fn json_file_is_parsed() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"config": {{"enabled": true}}}}"#).unwrap();
        let desired = load_file(file.path()).unwrap();
        assert_eq!(desired.get("config"), Some(&json!({"enabled": true})));
    }

    #[test]
    fn non_mapping_file_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "- a\n- b").unwrap();
        assert!(load_file(file.path()).is_err());
    }

    #[test]
    fn missing_file_names_path() {
        let err = load_file(Path::new("/nonexistent/desired.yml")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/desired.yml"));
    }
}
