//! Per-record-type parameter table.

use crate::reconcile::{Compare, FieldSpec};

pub struct RecordType {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
    /// Fields that tell two records of this type at one name apart.
    pub identity: &'static [&'static str],
    /// Fields that must be supplied to add a record.
    pub required: &'static [&'static str],
    /// At most one record of this type may exist at a name.
    pub singleton: bool,
}

impl RecordType {
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields
            .iter()
            .chain(COMMON_FIELDS.iter())
            .find(|f| f.name == name)
    }

    pub fn is_identity(&self, name: &str) -> bool {
        self.identity.contains(&name)
    }

    pub fn all_fields(&self) -> Vec<FieldSpec> {
        self.fields
            .iter()
            .chain(COMMON_FIELDS.iter())
            .copied()
            .collect()
    }
}

pub const COMMON_FIELDS: &[FieldSpec] = &[
    FieldSpec::int("ttl"),
    FieldSpec::bool("disabled").wire("disable"),
    FieldSpec::string("comments").write_only(),
    FieldSpec::int("expiryTtl"),
];

const DS_ALGORITHMS: &[&str] = &[
    "RSAMD5",
    "DSA",
    "RSASHA1",
    "DSA-NSEC3-SHA1",
    "RSASHA1-NSEC3-SHA1",
    "RSASHA256",
    "RSASHA512",
    "ECC-GOST",
    "ECDSAP256SHA256",
    "ECDSAP384SHA384",
    "ED25519",
    "ED448",
];
const DS_DIGEST_TYPES: &[&str] = &["SHA1", "SHA256", "GOST-R-34-11-94", "SHA384"];
const SSHFP_ALGORITHMS: &[&str] = &["RSA", "DSA", "ECDSA", "Ed25519", "Ed448"];
const SSHFP_FINGERPRINT_TYPES: &[&str] = &["SHA1", "SHA256"];
const TLSA_USAGES: &[&str] = &["PKIX-TA", "PKIX-EE", "DANE-TA", "DANE-EE"];
const TLSA_SELECTORS: &[&str] = &["Cert", "SPKI"];
const TLSA_MATCHING_TYPES: &[&str] = &["Full", "SHA2-256", "SHA2-512"];
pub const FORWARDER_PROTOCOLS: &[&str] = &["Udp", "Tcp", "Tls", "Https", "Quic"];
pub const FORWARDER_PROXY_TYPES: &[&str] = &["NoProxy", "DefaultProxy", "Http", "Socks5"];

const ADDRESS_FIELDS: &[FieldSpec] = &[
    FieldSpec::string("ipAddress"),
    FieldSpec::bool("ptr").write_only(),
    FieldSpec::bool("createPtrZone").write_only(),
    FieldSpec::bool("updateSvcbHints").write_only(),
];

const SVCB_FIELDS: &[FieldSpec] = &[
    FieldSpec::int("svcPriority"),
    FieldSpec::string("svcTargetName"),
    FieldSpec::key_values("svcParams"),
    FieldSpec::bool("autoIpv4Hint"),
    FieldSpec::bool("autoIpv6Hint"),
];

pub static RECORD_TYPES: &[RecordType] = &[
    RecordType {
        name: "A",
        fields: ADDRESS_FIELDS,
        identity: &["ipAddress"],
        required: &["ipAddress"],
        singleton: false,
    },
    RecordType {
        name: "AAAA",
        fields: ADDRESS_FIELDS,
        identity: &["ipAddress"],
        required: &["ipAddress"],
        singleton: false,
    },
    RecordType {
        name: "NS",
        fields: &[FieldSpec::string("nameServer"), FieldSpec::string("glue")],
        identity: &["nameServer"],
        required: &["nameServer"],
        singleton: false,
    },
    RecordType {
        name: "CNAME",
        fields: &[FieldSpec::string("cname")],
        identity: &["cname"],
        required: &["cname"],
        singleton: true,
    },
    RecordType {
        name: "PTR",
        fields: &[FieldSpec::string("ptrName")],
        identity: &["ptrName"],
        required: &["ptrName"],
        singleton: false,
    },
    RecordType {
        name: "MX",
        fields: &[FieldSpec::string("exchange"), FieldSpec::int("preference")],
        identity: &["exchange", "preference"],
        required: &["exchange", "preference"],
        singleton: false,
    },
    RecordType {
        name: "TXT",
        fields: &[FieldSpec::string("text"), FieldSpec::bool("splitText")],
        identity: &["text"],
        required: &["text"],
        singleton: false,
    },
    RecordType {
        name: "SRV",
        fields: &[
            FieldSpec::int("priority"),
            FieldSpec::int("weight"),
            FieldSpec::int("port"),
            FieldSpec::string("target"),
        ],
        identity: &["priority", "weight", "port", "target"],
        required: &["priority", "weight", "port", "target"],
        singleton: false,
    },
    RecordType {
        name: "NAPTR",
        fields: &[
            FieldSpec::int("naptrOrder").remote("order"),
            FieldSpec::int("naptrPreference").remote("preference"),
            FieldSpec::string("naptrFlags").remote("flags"),
            FieldSpec::string("naptrServices").remote("services"),
            FieldSpec::string("naptrRegexp").remote("regexp"),
            FieldSpec::string("naptrReplacement").remote("replacement"),
        ],
        identity: &[
            "naptrOrder",
            "naptrPreference",
            "naptrFlags",
            "naptrServices",
            "naptrRegexp",
            "naptrReplacement",
        ],
        required: &[
            "naptrOrder",
            "naptrPreference",
            "naptrFlags",
            "naptrServices",
            "naptrRegexp",
            "naptrReplacement",
        ],
        singleton: false,
    },
    RecordType {
        name: "DNAME",
        fields: &[FieldSpec::string("dname")],
        identity: &["dname"],
        required: &["dname"],
        singleton: true,
    },
    RecordType {
        name: "DS",
        fields: &[
            FieldSpec::int("keyTag"),
            FieldSpec::choice("algorithm", DS_ALGORITHMS),
            FieldSpec::choice("digestType", DS_DIGEST_TYPES),
            FieldSpec::string("digest").case_insensitive(),
        ],
        identity: &["keyTag", "algorithm", "digestType", "digest"],
        required: &["keyTag", "algorithm", "digestType", "digest"],
        singleton: false,
    },
    RecordType {
        name: "SSHFP",
        fields: &[
            FieldSpec::choice("sshfpAlgorithm", SSHFP_ALGORITHMS).remote("algorithm"),
            FieldSpec::choice("sshfpFingerprintType", SSHFP_FINGERPRINT_TYPES)
                .remote("fingerprintType"),
            FieldSpec::string("sshfpFingerprint")
                .remote("fingerprint")
                .case_insensitive(),
        ],
        identity: &["sshfpAlgorithm", "sshfpFingerprintType", "sshfpFingerprint"],
        required: &["sshfpAlgorithm", "sshfpFingerprintType", "sshfpFingerprint"],
        singleton: false,
    },
    RecordType {
        name: "TLSA",
        fields: &[
            FieldSpec::choice("tlsaCertificateUsage", TLSA_USAGES).remote("certificateUsage"),
            FieldSpec::choice("tlsaSelector", TLSA_SELECTORS).remote("selector"),
            FieldSpec::choice("tlsaMatchingType", TLSA_MATCHING_TYPES).remote("matchingType"),
            FieldSpec::string("tlsaCertificateAssociationData")
                .remote("certificateAssociationData")
                .case_insensitive(),
        ],
        identity: &[
            "tlsaCertificateUsage",
            "tlsaSelector",
            "tlsaMatchingType",
            "tlsaCertificateAssociationData",
        ],
        required: &[
            "tlsaCertificateUsage",
            "tlsaSelector",
            "tlsaMatchingType",
            "tlsaCertificateAssociationData",
        ],
        singleton: false,
    },
    RecordType {
        name: "SVCB",
        fields: SVCB_FIELDS,
        identity: &["svcPriority", "svcTargetName"],
        required: &["svcPriority", "svcTargetName", "svcParams"],
        singleton: false,
    },
    RecordType {
        name: "HTTPS",
        fields: SVCB_FIELDS,
        identity: &["svcPriority", "svcTargetName"],
        required: &["svcPriority", "svcTargetName", "svcParams"],
        singleton: false,
    },
    RecordType {
        name: "URI",
        fields: &[
            FieldSpec::int("uriPriority").remote("priority"),
            FieldSpec::int("uriWeight").remote("weight"),
            FieldSpec::string("uri"),
        ],
        identity: &["uriPriority", "uriWeight", "uri"],
        required: &["uriPriority", "uriWeight", "uri"],
        singleton: false,
    },
    RecordType {
        name: "CAA",
        fields: &[
            FieldSpec::int("flags"),
            FieldSpec::string("tag"),
            FieldSpec::string("value"),
        ],
        identity: &["flags", "tag", "value"],
        required: &["flags", "tag", "value"],
        singleton: false,
    },
    RecordType {
        name: "ANAME",
        fields: &[FieldSpec::string("aname")],
        identity: &["aname"],
        required: &["aname"],
        singleton: false,
    },
    RecordType {
        name: "FWD",
        fields: &[
            FieldSpec::choice("protocol", FORWARDER_PROTOCOLS),
            FieldSpec::string("forwarder"),
            FieldSpec::int("forwarderPriority"),
            FieldSpec::bool("dnssecValidation"),
            FieldSpec::choice("proxyType", FORWARDER_PROXY_TYPES),
            FieldSpec::string("proxyAddress"),
            FieldSpec::int("proxyPort"),
            FieldSpec::string("proxyUsername"),
            FieldSpec::string("proxyPassword").write_only().secret(),
        ],
        identity: &["protocol", "forwarder"],
        required: &["protocol", "forwarder"],
        singleton: false,
    },
    RecordType {
        name: "APP",
        fields: &[
            FieldSpec::string("appName"),
            FieldSpec::string("classPath"),
            FieldSpec::json("recordData").remote("data"),
        ],
        identity: &["appName", "classPath"],
        required: &["appName", "classPath"],
        singleton: true,
    },
    RecordType {
        name: "UNKNOWN",
        fields: &[FieldSpec::string("rdata")
            .remote("value")
            .compare(Compare::Hex)],
        identity: &["rdata"],
        required: &["rdata"],
        singleton: false,
    },
];

pub fn lookup(name: &str) -> Option<&'static RecordType> {
    RECORD_TYPES
        .iter()
        .find(|t| t.name.eq_ignore_ascii_case(name))
}

pub fn supported_names() -> String {
    RECORD_TYPES
        .iter()
        .map(|t| t.name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parameter name the update endpoint expects for a new value of `field`.
pub fn update_name(field: &str) -> Option<&'static str> {
    Some(match field {
        "ipAddress" => "newIpAddress",
        "nameServer" => "newNameServer",
        "ptrName" => "newPtrName",
        "exchange" => "newExchange",
        "preference" => "newPreference",
        "text" => "newText",
        "splitText" => "newSplitText",
        "priority" => "newPriority",
        "weight" => "newWeight",
        "port" => "newPort",
        "target" => "newTarget",
        "naptrOrder" => "naptrNewOrder",
        "naptrPreference" => "naptrNewPreference",
        "naptrFlags" => "naptrNewFlags",
        "naptrServices" => "naptrNewServices",
        "naptrRegexp" => "naptrNewRegexp",
        "naptrReplacement" => "naptrNewReplacement",
        "keyTag" => "newKeyTag",
        "algorithm" => "newAlgorithm",
        "digestType" => "newDigestType",
        "digest" => "newDigest",
        "sshfpAlgorithm" => "newSshfpAlgorithm",
        "sshfpFingerprintType" => "newSshfpFingerprintType",
        "sshfpFingerprint" => "newSshfpFingerprint",
        "tlsaCertificateUsage" => "newTlsaCertificateUsage",
        "tlsaSelector" => "newTlsaSelector",
        "tlsaMatchingType" => "newTlsaMatchingType",
        "tlsaCertificateAssociationData" => "newTlsaCertificateAssociationData",
        "svcPriority" => "newSvcPriority",
        "svcTargetName" => "newSvcTargetName",
        "svcParams" => "newSvcParams",
        "uriPriority" => "newUriPriority",
        "uriWeight" => "newUriWeight",
        "uri" => "newUri",
        "flags" => "newFlags",
        "tag" => "newTag",
        "value" => "newValue",
        "aname" => "newAName",
        "protocol" => "newProtocol",
        "forwarder" => "newForwarder",
        "rdata" => "newRData",
        _ => return None,
    })
}
