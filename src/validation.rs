use regex::Regex;

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("{field} is empty")]
    Empty { field: &'static str },
    #[error("{field}: label too long (max 63 characters)")]
    LabelTooLong { field: &'static str },
    #[error("{field}: name too long (max 253 characters)")]
    NameTooLong { field: &'static str },
    #[error("{field}: '{value}' contains invalid characters")]
    InvalidCharacters { field: &'static str, value: String },
    #[error("{field}: labels must not start or end with '-'")]
    LeadingOrTrailingHyphen { field: &'static str },
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: String,
        min: i64,
        max: i64,
        value: i64,
    },
    #[error("{field} must be one of [{choices}], got '{value}'")]
    InvalidChoice {
        field: String,
        value: String,
        choices: String,
    },
}

lazy_static::lazy_static! {
    /// Letters, digits, '-', '_' and '*' (wildcard owner names)
    static ref LABEL_RE: Regex = Regex::new(r"^[A-Za-z0-9_*-]+$").unwrap();
}

/// Accepts `@`-free owner names such as `www.example.com` or `_sip._tcp.example.com`.
pub fn validate_domain_name(field: &'static str, domain: &str) -> Result<(), ValidationError> {
    let d = domain.trim_end_matches('.');
    if d.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if d.len() > 253 {
        return Err(ValidationError::NameTooLong { field });
    }
    for label in d.split('.') {
        if label.is_empty() {
            return Err(ValidationError::Empty { field });
        }
        if label.len() > 63 {
            return Err(ValidationError::LabelTooLong { field });
        }
        if !LABEL_RE.is_match(label) {
            return Err(ValidationError::InvalidCharacters {
                field,
                value: domain.to_string(),
            });
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(ValidationError::LeadingOrTrailingHyphen { field });
        }
    }
    Ok(())
}

pub fn validate_range(field: &str, value: i64, min: i64, max: i64) -> Result<(), ValidationError> {
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min,
            max,
            value,
        });
    }
    Ok(())
}

pub fn validate_choice(field: &str, value: &str, choices: &[&str]) -> Result<(), ValidationError> {
    if choices.contains(&value) {
        return Ok(());
    }
    Err(ValidationError::InvalidChoice {
        field: field.to_string(),
        value: value.to_string(),
        choices: choices.join(", "),
    })
}
