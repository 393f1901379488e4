use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::AppError;
use crate::technitium::types::{ApiCall, ApiResponse, HttpMethod};

/// Anything that can execute an [`ApiCall`].
#[async_trait]
pub trait DnsApi: Send + Sync {
    async fn call(&self, call: &ApiCall) -> Result<ApiResponse, AppError>;
}

#[derive(Clone)]
pub struct TechnitiumClient {
    http: Client,
    base_url: String, // e.g. "http://127.0.0.1:5380"
    api_token: String,
}

impl TechnitiumClient {
    pub fn new(config: &ConnectionConfig) -> Result<Self, AppError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("technitium-ctl/", env!("CARGO_PKG_VERSION"))),
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let builder = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout);
        #[cfg(feature = "https-client")]
        let builder = builder.danger_accept_invalid_certs(!config.validate_certs);

        Ok(Self {
            http: builder.build()?,
            base_url: config.base_url(),
            api_token: config.api_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn with_token<'a>(&'a self, call: &'a ApiCall) -> Vec<(&'a str, &'a str)> {
        let mut params: Vec<(&str, &str)> = call
            .params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        params.push(("token", self.api_token.as_str()));
        params
    }
}

#[async_trait]
impl DnsApi for TechnitiumClient {
    async fn call(&self, call: &ApiCall) -> Result<ApiResponse, AppError> {
        let url = self.url(&call.path);
        let params = self.with_token(call);
        let req = match call.method {
            HttpMethod::Get => self.http.get(url).query(&params),
            HttpMethod::Post => self.http.post(url).form(&params),
        };

        let res = req.send().await?;
        let status = res.status();
        debug!(method = ?call.method, path = %call.path, status = status.as_u16(), "technitium api call");

        let body = res.text().await?;
        if status.as_u16() >= 400 {
            return Err(AppError::Http {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str::<ApiResponse>(&body)
            .map_err(|e| AppError::decode(format!("{} returned invalid JSON: {e}", call.path)))
    }
}
