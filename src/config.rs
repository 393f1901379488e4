use std::time::Duration;

pub const DEFAULT_API_PORT: u16 = 5380;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Clone)]
pub struct ConnectionConfig {
    pub api_url: String, // e.g. "https://dns.example.net"
    pub api_port: u16,
    pub api_token: String,
    pub validate_certs: bool,
    pub timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(api_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_port: DEFAULT_API_PORT,
            api_token: api_token.into(),
            validate_certs: true,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Scheme, host and port without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("{}:{}", self.api_url.trim_end_matches('/'), self.api_port)
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("api_url", &self.api_url)
            .field("api_port", &self.api_port)
            .field("api_token", &"********")
            .field("validate_certs", &self.validate_certs)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_strips_trailing_slash() {
        let mut cfg = ConnectionConfig::new("http://localhost/", "t");
        assert_eq!(cfg.base_url(), "http://localhost:5380");
        cfg.api_port = 443;
        assert_eq!(cfg.base_url(), "http://localhost:443");
    }

    #[test]
    fn debug_hides_token() {
        let cfg = ConnectionConfig::new("http://localhost", "secret-token");
        assert!(!format!("{cfg:?}").contains("secret-token"));
    }
}
