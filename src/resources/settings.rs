use async_trait::async_trait;
use serde_json::Value;

use crate::error::AppError;
use crate::reconcile::{
    Compare, Desired, Diff, FieldSpec, MASK, Resource, ResourceKind, State, mask_secrets,
    wire_params,
};
use crate::resources::record_types::FORWARDER_PROTOCOLS;
use crate::technitium::{ApiCall, DnsApi};

const RECURSION: &[&str] = &[
    "Deny",
    "Allow",
    "AllowOnlyForPrivateNetworks",
    "UseSpecifiedNetworkACL",
];
const BLOCKING_TYPES: &[&str] = &["AnyAddress", "NxDomain", "CustomAddress"];
const PROXY_TYPES: &[&str] = &["None", "Http", "Socks5"];
const LOGGING_TYPES: &[&str] = &["None", "File", "Console", "FileAndConsole"];
const QPM_LIMIT_COLUMNS: &[&str] = &["prefix", "udpLimit", "tcpLimit"];

pub const FIELDS: &[FieldSpec] = &[
    // dns server
    FieldSpec::string("dnsServerDomain").case_insensitive(),
    FieldSpec::list("dnsServerLocalEndPoints"),
    FieldSpec::list("dnsServerIPv4SourceAddresses"),
    FieldSpec::list("dnsServerIPv6SourceAddresses"),
    FieldSpec::int("defaultRecordTtl"),
    FieldSpec::string("defaultResponsiblePerson").text(),
    FieldSpec::bool("useSoaSerialDateScheme"),
    FieldSpec::int("minSoaRefresh"),
    FieldSpec::int("minSoaRetry"),
    FieldSpec::list("zoneTransferAllowedNetworks"),
    FieldSpec::list("notifyAllowedNetworks"),
    FieldSpec::bool("dnsAppsEnableAutomaticUpdate"),
    FieldSpec::bool("preferIPv6"),
    FieldSpec::bool("enableUdpSocketPool"),
    FieldSpec::int_list("socketPoolExcludedPorts"),
    FieldSpec::int("udpPayloadSize"),
    FieldSpec::bool("dnssecValidation"),
    FieldSpec::bool("eDnsClientSubnet"),
    FieldSpec::int("eDnsClientSubnetIPv4PrefixLength"),
    FieldSpec::int("eDnsClientSubnetIPv6PrefixLength"),
    FieldSpec::string("eDnsClientSubnetIpv4Override").text(),
    FieldSpec::string("eDnsClientSubnetIpv6Override").text(),
    FieldSpec::table("qpmPrefixLimitsIPv4", QPM_LIMIT_COLUMNS).clearable(),
    FieldSpec::table("qpmPrefixLimitsIPv6", QPM_LIMIT_COLUMNS).clearable(),
    FieldSpec::int("qpmLimitSampleMinutes"),
    FieldSpec::int("qpmLimitUdpTruncationPercentage"),
    FieldSpec::list("qpmLimitBypassList"),
    FieldSpec::int("clientTimeout"),
    FieldSpec::int("tcpSendTimeout"),
    FieldSpec::int("tcpReceiveTimeout"),
    FieldSpec::int("quicIdleTimeout"),
    FieldSpec::int("quicMaxInboundStreams"),
    FieldSpec::int("listenBacklog"),
    FieldSpec::int("maxConcurrentResolutionsPerCore"),
    // web service
    FieldSpec::list("webServiceLocalAddresses"),
    FieldSpec::int("webServiceHttpPort"),
    FieldSpec::bool("webServiceEnableTls"),
    FieldSpec::bool("webServiceEnableHttp3"),
    FieldSpec::bool("webServiceHttpToTlsRedirect"),
    FieldSpec::int("webServiceTlsPort"),
    FieldSpec::bool("webServiceUseSelfSignedTlsCertificate"),
    FieldSpec::string("webServiceTlsCertificatePath").text(),
    FieldSpec::string("webServiceTlsCertificatePassword")
        .write_only()
        .secret(),
    FieldSpec::string("webServiceRealIpHeader").text(),
    // optional protocols
    FieldSpec::bool("enableDnsOverUdpProxy"),
    FieldSpec::bool("enableDnsOverTcpProxy"),
    FieldSpec::bool("enableDnsOverHttp"),
    FieldSpec::bool("enableDnsOverTls"),
    FieldSpec::bool("enableDnsOverHttps"),
    FieldSpec::bool("enableDnsOverHttp3"),
    FieldSpec::bool("enableDnsOverQuic"),
    FieldSpec::int("dnsOverUdpProxyPort"),
    FieldSpec::int("dnsOverTcpProxyPort"),
    FieldSpec::int("dnsOverHttpPort"),
    FieldSpec::int("dnsOverTlsPort"),
    FieldSpec::int("dnsOverHttpsPort"),
    FieldSpec::int("dnsOverQuicPort"),
    FieldSpec::list("reverseProxyNetworkACL"),
    FieldSpec::string("dnsTlsCertificatePath").text(),
    FieldSpec::string("dnsTlsCertificatePassword")
        .write_only()
        .secret(),
    FieldSpec::string("dnsOverHttpRealIpHeader").text(),
    // tsig
    FieldSpec::table("tsigKeys", &["keyName", "sharedSecret", "algorithmName"])
        .clearable()
        .secret(),
    // recursion
    FieldSpec::choice("recursion", RECURSION),
    FieldSpec::list("recursionNetworkACL").clearable(),
    FieldSpec::bool("randomizeName"),
    FieldSpec::bool("qnameMinimization"),
    FieldSpec::int("resolverRetries"),
    FieldSpec::int("resolverTimeout"),
    FieldSpec::int("resolverConcurrency"),
    FieldSpec::int("resolverMaxStackCount"),
    // cache
    FieldSpec::bool("saveCache"),
    FieldSpec::bool("serveStale"),
    FieldSpec::int("serveStaleTtl"),
    FieldSpec::int("serveStaleAnswerTtl"),
    FieldSpec::int("serveStaleResetTtl"),
    FieldSpec::int("serveStaleMaxWaitTime"),
    FieldSpec::int("cacheMaximumEntries"),
    FieldSpec::int("cacheMinimumRecordTtl"),
    FieldSpec::int("cacheMaximumRecordTtl"),
    FieldSpec::int("cacheNegativeRecordTtl"),
    FieldSpec::int("cacheFailureRecordTtl"),
    FieldSpec::int("cachePrefetchEligibility"),
    FieldSpec::int("cachePrefetchTrigger"),
    FieldSpec::int("cachePrefetchSampleIntervalInMinutes"),
    FieldSpec::int("cachePrefetchSampleEligibilityHitsPerHour"),
    // blocking
    FieldSpec::bool("enableBlocking"),
    FieldSpec::bool("allowTxtBlockingReport"),
    FieldSpec::list("blockingBypassList"),
    FieldSpec::choice("blockingType", BLOCKING_TYPES),
    FieldSpec::int("blockingAnswerTtl"),
    FieldSpec::list("customBlockingAddresses"),
    FieldSpec::list("blockListUrls").clearable().reject_empty(),
    FieldSpec::int("blockListUpdateIntervalHours"),
    // proxy
    FieldSpec::choice("proxyType", PROXY_TYPES),
    FieldSpec::string("proxyAddress").text(),
    FieldSpec::int("proxyPort"),
    FieldSpec::string("proxyUsername").text(),
    FieldSpec::string("proxyPassword").write_only().secret(),
    FieldSpec::list("proxyBypass"),
    // forwarders
    FieldSpec::list("forwarders").clearable(),
    FieldSpec::choice("forwarderProtocol", FORWARDER_PROTOCOLS),
    FieldSpec::bool("concurrentForwarding"),
    FieldSpec::int("forwarderRetries"),
    FieldSpec::int("forwarderTimeout"),
    FieldSpec::int("forwarderConcurrency"),
    // logging
    FieldSpec::choice("loggingType", LOGGING_TYPES),
    FieldSpec::bool("enableLogging"),
    FieldSpec::bool("ignoreResolverLogs"),
    FieldSpec::bool("logQueries"),
    FieldSpec::bool("useLocalTime"),
    FieldSpec::string("logFolder").text(),
    FieldSpec::int("maxLogFileDays"),
    FieldSpec::bool("enableInMemoryStats"),
    FieldSpec::int("maxStatFileDays"),
];

/// Lift the nested `proxy` object into the flat names `settings/set` accepts.
fn flatten_proxy(mut settings: Value) -> Value {
    let Some(obj) = settings.as_object_mut() else {
        return settings;
    };
    let proxy = obj.remove("proxy").unwrap_or(Value::Null);
    match proxy {
        Value::Object(proxy) => {
            for (from, to) in [
                ("type", "proxyType"),
                ("address", "proxyAddress"),
                ("port", "proxyPort"),
                ("username", "proxyUsername"),
                ("password", "proxyPassword"),
                ("bypass", "proxyBypass"),
            ] {
                obj.insert(to.into(), proxy.get(from).cloned().unwrap_or(Value::Null));
            }
        }
        _ => {
            obj.insert("proxyType".into(), Value::String("None".into()));
        }
    }
    settings
}

/// Settings as returned by the server with every secret masked, nested proxy included.
fn redact_settings(mut settings: Value) -> Value {
    if let Some(proxy) = settings.get_mut("proxy").and_then(Value::as_object_mut) {
        if proxy.get("password").is_some_and(|p| !p.is_null()) {
            proxy.insert("password".into(), Value::String(MASK.into()));
        }
    }
    mask_secrets(FIELDS, settings)
}

/// The server-wide settings singleton.
pub struct ServerSettings {
    pub desired: Desired,
}

impl ServerSettings {
    pub fn new(desired: Desired) -> Result<Self, AppError> {
        Ok(Self {
            desired: desired.coerced(FIELDS, "server settings")?,
        })
    }
}

#[async_trait]
impl Resource for ServerSettings {
    fn kind(&self) -> ResourceKind {
        ResourceKind::ServerSetting
    }

    fn describe(&self) -> String {
        "(global)".to_string()
    }

    fn supports_absent(&self) -> bool {
        false
    }

    fn validate(&self, _state: State) -> Result<(), AppError> {
        if self.desired.is_empty() {
            return Err(AppError::validation("at least one setting must be provided"));
        }
        Ok(())
    }

    async fn fetch(&self, api: &dyn DnsApi) -> Result<Option<Value>, AppError> {
        let settings = api
            .call(&ApiCall::get("/api/settings/get"))
            .await?
            .into_result()?;
        Ok(Some(flatten_proxy(settings)))
    }

    fn diff(&self, current: &Value) -> Result<Diff, AppError> {
        Ok(Diff::compute(FIELDS, &self.desired, current))
    }

    fn create(&self) -> Result<Vec<ApiCall>, AppError> {
        Err(AppError::validation("server settings cannot be created"))
    }

    fn update(&self, _current: &Value, diff: &Diff) -> Result<Vec<ApiCall>, AppError> {
        Ok(vec![
            ApiCall::post("/api/settings/set").params(wire_params(FIELDS, &self.desired, |f| {
                diff.contains(f.name) || f.compare == Compare::WriteOnly
            })),
        ])
    }

    fn delete(&self, _current: &Value) -> Result<Vec<ApiCall>, AppError> {
        Err(AppError::validation("server settings cannot be deleted"))
    }

    fn redact_current(&self, current: Value) -> Value {
        redact_settings(current)
    }

    fn redact_response(&self, mut response: Value) -> Value {
        if let Some(settings) = response.get_mut("response") {
            *settings = redact_settings(settings.take());
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::render_outcome;
    use crate::reconcile::Reconciler;
    use crate::reconcile::testing::FakeApi;
    use crate::technitium::ApiResponse;
    use serde_json::json;

    fn server(settings: Value) -> FakeApi {
        FakeApi::new(move |call| match call.path.as_str() {
            "/api/settings/get" => ApiResponse::ok(settings.clone()),
            _ => ApiResponse::ok(json!({})),
        })
    }

    fn settings(desired: Desired) -> ServerSettings {
        ServerSettings::new(desired).unwrap()
    }

    #[test]
    fn empty_blocklist_is_rejected() {
        let err = ServerSettings::new(Desired::new().with("blockListUrls", json!([])))
            .err()
            .unwrap();
        assert!(err.to_string().contains("boolean false"));
    }

    #[test]
    fn nothing_requested_is_invalid() {
        assert!(settings(Desired::new()).validate(State::Present).is_err());
    }

    #[tokio::test]
    async fn false_clear_is_noop_when_already_empty() {
        let api = server(json!({"blockListUrls": null, "forwarders": []}));
        let s = settings(
            Desired::new()
                .with("blockListUrls", false)
                .with("forwarders", "false"),
        );
        let outcome = Reconciler::new(&api, false)
            .reconcile(&s, State::Present)
            .await
            .unwrap();
        assert!(!outcome.changed);
    }

    #[tokio::test]
    async fn false_clear_sends_literal_false() {
        let api = server(json!({"blockListUrls": ["https://example.com/list.txt"]}));
        let s = settings(Desired::new().with("blockListUrls", false));
        Reconciler::new(&api, false)
            .reconcile(&s, State::Present)
            .await
            .unwrap();
        assert_eq!(
            api.mutating_calls()[0].get_param("blockListUrls"),
            Some("false")
        );
    }

    #[tokio::test]
    async fn proxy_fields_compare_against_nested_object() {
        let api = server(json!({
            "proxy": {"type": "Http", "address": "proxy.local", "port": 3128, "bypass": ["127.0.0.0/8"]}
        }));
        let s = settings(
            Desired::new()
                .with("proxyType", "Http")
                .with("proxyAddress", "proxy.local")
                .with("proxyPort", "3128")
                .with("proxyBypass", "127.0.0.0/8"),
        );
        let outcome = Reconciler::new(&api, false)
            .reconcile(&s, State::Present)
            .await
            .unwrap();
        assert!(!outcome.changed);
    }

    #[tokio::test]
    async fn tsig_keys_diff_is_masked() {
        let api = server(json!({"tsigKeys": []}));
        let s = settings(Desired::new().with(
            "tsigKeys",
            json!([{"keyName": "k1", "sharedSecret": "c2VjcmV0", "algorithmName": "hmac-sha256"}]),
        ));
        let outcome = Reconciler::new(&api, true)
            .reconcile(&s, State::Present)
            .await
            .unwrap();
        assert_eq!(outcome.diff.get("tsigKeys").unwrap().desired, json!(MASK));
        assert_eq!(outcome.calls[0].get_param("tsigKeys"), Some(MASK));
    }

    #[tokio::test]
    async fn port_lists_compare_numerically() {
        let api = server(json!({"socketPoolExcludedPorts": [53, 853]}));
        let s = settings(Desired::new().with("socketPoolExcludedPorts", "853, 53"));
        let outcome = Reconciler::new(&api, false)
            .reconcile(&s, State::Present)
            .await
            .unwrap();
        assert!(!outcome.changed);
    }

    #[tokio::test]
    async fn fetched_secrets_stay_out_of_json_output() {
        let api = server(json!({
            "enableBlocking": true,
            "tsigKeys": [{"keyName": "k1", "sharedSecret": "c2hhcmVkLXNlY3JldA==", "algorithmName": "hmac-sha256"}],
            "proxy": {"type": "Http", "address": "proxy.local", "port": 3128, "username": "u", "password": "proxy-pass"}
        }));
        let s = settings(Desired::new().with("enableBlocking", true));
        let outcome = Reconciler::new(&api, false)
            .reconcile(&s, State::Present)
            .await
            .unwrap();
        assert!(!outcome.changed);
        let text = render_outcome(&outcome, true);
        assert!(!text.contains("c2hhcmVkLXNlY3JldA=="));
        assert!(!text.contains("proxy-pass"));
        assert_eq!(outcome.current.unwrap()["tsigKeys"], json!(MASK));
    }

    #[tokio::test]
    async fn set_response_is_redacted() {
        let api = FakeApi::new(|call| match call.path.as_str() {
            "/api/settings/get" => ApiResponse::ok(json!({"enableBlocking": false})),
            _ => ApiResponse::ok(json!({
                "enableBlocking": true,
                "tsigKeys": [{"keyName": "k1", "sharedSecret": "c2hhcmVkLXNlY3JldA=="}],
                "webServiceTlsCertificatePassword": "cert-pass",
                "proxy": {"type": "Http", "password": "proxy-pass"}
            })),
        });
        let s = settings(Desired::new().with("enableBlocking", true));
        let outcome = Reconciler::new(&api, false)
            .reconcile(&s, State::Present)
            .await
            .unwrap();
        let response = outcome.api_response.unwrap();
        assert_eq!(response["response"]["tsigKeys"], json!(MASK));
        assert_eq!(response["response"]["webServiceTlsCertificatePassword"], json!(MASK));
        assert_eq!(response["response"]["proxy"]["password"], json!(MASK));
        assert_eq!(response["response"]["enableBlocking"], json!(true));
    }
}
