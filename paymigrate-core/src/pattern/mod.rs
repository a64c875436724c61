//! Pattern library for SourcePay usage detection
//!
//! Holds every regular-expression family the detector runs: endpoint
//! categories, SSL field names (one exact core pattern plus ranked lenient
//! variations), per-language HTTP-client idioms, configuration and secret
//! references, and migration-intent comments.
//!
//! Every endpoint pattern requires a SourcePay marker (the `sourcepay` name,
//! an `ssl_` parameter or a SourcePay-only path), so unrelated code never
//! produces an endpoint.

use crate::models::{ConfigRefKind, EndpointType, Language};
use regex::Regex;
use std::collections::HashMap;

/// Bytes around an HTTP idiom searched for a SourcePay marker
pub const PROXIMITY_WINDOW: usize = 200;

/// A named, compiled pattern
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub name: String,
    pub regex_pattern: String,
    pub compiled_regex: Regex,
}

impl PatternRule {
    fn new(name: &str, pattern: &str) -> crate::Result<Self> {
        Ok(Self {
            name: name.to_string(),
            regex_pattern: pattern.to_string(),
            compiled_regex: Regex::new(pattern)
                .map_err(|e| crate::Error::Pattern(format!("Invalid regex for {name}: {e}")))?,
        })
    }
}

/// All patterns identifying one endpoint category
#[derive(Debug, Clone)]
pub struct EndpointRule {
    pub endpoint_type: EndpointType,
    pub patterns: Vec<PatternRule>,
}

/// A lenient field-name pattern; lower rank means more trusted
#[derive(Debug, Clone)]
pub struct FieldVariation {
    pub rank: usize,
    pub rule: PatternRule,
}

impl FieldVariation {
    /// 0.8 for the first variation, 0.1 less for each following one
    pub fn confidence(&self) -> f64 {
        (0.8 - 0.1 * self.rank as f64).max(0.1)
    }
}

/// A configuration-reference pattern; capture group 1 is the key
#[derive(Debug, Clone)]
pub struct ConfigRule {
    pub kind: ConfigRefKind,
    pub rule: PatternRule,
}

/// Immutable set of compiled detection patterns
#[derive(Debug, Clone)]
pub struct PatternLibrary {
    endpoint_rules: Vec<EndpointRule>,
    field_core: PatternRule,
    field_variations: Vec<FieldVariation>,
    http_idioms: HashMap<Language, Vec<PatternRule>>,
    config_rules: Vec<ConfigRule>,
    comment_line: Regex,
    comment_intent: Regex,
    source_domain: Regex,
    source_marker: Regex,
    tls_setting: Regex,
}

lazy_static::lazy_static! {
    static ref SHARED_LIBRARY: PatternLibrary =
        PatternLibrary::new().expect("built-in detection patterns must compile");
}

impl PatternLibrary {
    /// Compile the built-in pattern families
    pub fn new() -> crate::Result<Self> {
        Ok(Self {
            endpoint_rules: Self::load_endpoint_rules()?,
            field_core: PatternRule::new("ssl_field", r"\bssl_[a-z0-9_]*[a-z0-9]")?,
            field_variations: Self::load_field_variations()?,
            http_idioms: Self::load_http_idioms()?,
            config_rules: Self::load_config_rules()?,
            comment_line: compile(
                r"(?m)(?:^[ \t]*(?:\*|--)|(?:^|[ \t])(?://+|#+|/\*+))[ \t]*(.+?)[ \t]*(?:\*/)?$",
            )?,
            comment_intent: compile(r"(?i)\bmigrat\w*|sourcepay|\blegacy\s+payment|\bssl_\w+")?,
            source_domain: compile(r"(?i)\bsourcepay\.com\b")?,
            source_marker: compile(r"(?i)sourcepay|\bssl_[a-z0-9_]+|hosted-payments|processxml\.do")?,
            tls_setting: compile(
                r"(?i)^ssl_(?:context|version|min_version|max_version|verify\w*|cert\w*|key\w*|ca(?:_\w+|certs?|file|path|bundle)?|crl\w*|protocols?|options?|opts|ciphers?|mode|enabled?|required?|check_hostname|match_hostname|wrap_socket|socket|session\w*|handshake\w*|timeout|insecure|dir)$",
            )?,
        })
    }

    /// Process-wide instance compiled on first use
    pub fn shared() -> &'static PatternLibrary {
        &SHARED_LIBRARY
    }

    pub fn endpoint_rules(&self) -> &[EndpointRule] {
        &self.endpoint_rules
    }

    pub fn field_core(&self) -> &Regex {
        &self.field_core.compiled_regex
    }

    /// Variations in rank order
    pub fn field_variations(&self) -> &[FieldVariation] {
        &self.field_variations
    }

    /// HTTP-client idioms for a language; empty for unknown languages
    pub fn http_idioms(&self, language: Language) -> &[PatternRule] {
        self.http_idioms.get(&language).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn config_rules(&self) -> &[ConfigRule] {
        &self.config_rules
    }

    pub fn comment_line(&self) -> &Regex {
        &self.comment_line
    }

    pub fn comment_intent(&self) -> &Regex {
        &self.comment_intent
    }

    pub fn source_domain(&self) -> &Regex {
        &self.source_domain
    }

    pub fn source_marker(&self) -> &Regex {
        &self.source_marker
    }

    /// Whether an `ssl_`-prefixed name is a TLS client setting (Python's
    /// `ssl_context=`, PHP's `ssl_verify_peer`, ...) rather than a SourcePay field
    pub fn is_tls_setting(&self, name: &str) -> bool {
        self.tls_setting.is_match(name)
    }

    /// Total number of compiled patterns
    pub fn pattern_count(&self) -> usize {
        self.endpoint_rules.iter().map(|r| r.patterns.len()).sum::<usize>()
            + 1
            + self.field_variations.len()
            + self.http_idioms.values().map(Vec::len).sum::<usize>()
            + self.config_rules.len()
            + 5
    }

    fn load_endpoint_rules() -> crate::Result<Vec<EndpointRule>> {
        let table: [(EndpointType, &[(&str, &str)]); 5] = [
            (
                EndpointType::HostedPayments,
                &[
                    ("hosted_token_path", r"(?i)hosted-payments/transaction_token"),
                    ("hosted_payments_url", r"(?i)sourcepay[\w.\-]*/hosted-payments"),
                    ("hosted_payment_page", r"(?i)\bsourcepay[_.]?hpp\b"),
                ],
            ),
            (
                EndpointType::Checkout,
                &[
                    ("checkout_script", r"(?i)sourcepay[\w.\-/]*/checkout(?:\.js)?\b"),
                    ("checkout_object", r"(?i)\bsourcepay[_.]?checkout\b"),
                ],
            ),
            (
                EndpointType::ProcessTransaction,
                &[
                    ("process_xml", r"(?i)\bprocessxml\.do\b"),
                    ("process_transaction_url", r"(?i)sourcepay[\w.\-/]*/process-transaction\b"),
                    ("transaction_type_field", r"(?i)\bssl_transaction_type\b"),
                ],
            ),
            (
                EndpointType::BatchProcessing,
                &[
                    ("batch_url", r"(?i)sourcepay[\w.\-/]*/batch(?:es|-processing)?\b"),
                    ("process_batch", r"(?i)\bprocessbatch\.do\b"),
                    ("batch_field", r"(?i)\bssl_batch\w*"),
                ],
            ),
            (
                EndpointType::DeviceManagement,
                &[
                    ("device_url", r"(?i)sourcepay[\w.\-/]*/(?:devices?|terminals?)\b"),
                    ("device_field", r"(?i)\bssl_(?:device|terminal)\w*"),
                ],
            ),
        ];

        table
            .iter()
            .map(|(endpoint_type, patterns)| {
                Ok(EndpointRule {
                    endpoint_type: *endpoint_type,
                    patterns: patterns
                        .iter()
                        .map(|(name, pattern)| PatternRule::new(name, pattern))
                        .collect::<crate::Result<Vec<_>>>()?,
                })
            })
            .collect()
    }

    fn load_field_variations() -> crate::Result<Vec<FieldVariation>> {
        let variations = [
            ("upper_case", r"\b(SSL_[A-Z0-9_]*[A-Z0-9])\b"),
            ("camel_case", r"\b(ssl[A-Z][A-Za-z0-9]*)\b"),
            ("kebab_case", r"(?i)\b(ssl-[a-z0-9]+(?:-[a-z0-9]+)*)\b"),
        ];

        variations
            .iter()
            .enumerate()
            .map(|(rank, (name, pattern))| {
                Ok(FieldVariation {
                    rank,
                    rule: PatternRule::new(name, pattern)?,
                })
            })
            .collect()
    }

    fn load_http_idioms() -> crate::Result<HashMap<Language, Vec<PatternRule>>> {
        let script: &[(&str, &str)] = &[
            ("fetch", r"\bfetch\s*\("),
            ("axios", r"\baxios(?:\.(?:get|post|put|patch|request))?\s*\("),
            ("jquery_ajax", r"\$\.(?:ajax|post|get)\s*\("),
            ("xml_http_request", r"\bnew\s+XMLHttpRequest\b"),
        ];
        let typescript_only: &[(&str, &str)] = &[
            ("angular_http_client", r"\bthis\.http\.(?:get|post|put|request)\s*[<(]"),
        ];
        let table: [(Language, Vec<(&str, &str)>); 8] = [
            (Language::JavaScript, script.to_vec()),
            (Language::TypeScript, [script, typescript_only].concat()),
            (
                Language::Python,
                vec![
                    ("requests", r"\brequests\.(?:get|post|put|patch|request)\s*\("),
                    ("httpx", r"\bhttpx\.(?:get|post|put|AsyncClient|Client)\b"),
                    ("urlopen", r"\burlopen\s*\("),
                    ("aiohttp", r"\baiohttp\.ClientSession\b"),
                ],
            ),
            (
                Language::Php,
                vec![
                    ("curl", r"\bcurl_(?:init|setopt|exec)\s*\("),
                    ("file_get_contents", r"\bfile_get_contents\s*\("),
                    ("guzzle", r"->(?:post|request|get)\s*\(\s*['\x22]"),
                ],
            ),
            (
                Language::Java,
                vec![
                    ("http_url_connection", r"\bHttpURLConnection\b"),
                    ("java_http_client", r"\bHttpClient\.new(?:HttpClient|Builder)\s*\("),
                    ("rest_template", r"\.(?:postForObject|postForEntity|exchange)\s*\("),
                    ("okhttp", r"\bnew\s+OkHttpClient\b"),
                ],
            ),
            (
                Language::CSharp,
                vec![
                    ("http_client_async", r"\.(?:PostAsync|GetAsync|SendAsync|PostAsJsonAsync)\s*\("),
                    ("web_request", r"\bWebRequest\.Create\s*\("),
                    ("rest_client", r"\bnew\s+RestClient\s*\("),
                ],
            ),
            (
                Language::Ruby,
                vec![
                    ("net_http", r"\bNet::HTTP\b"),
                    ("httparty", r"\bHTTParty\.(?:get|post|put)\b"),
                    ("faraday", r"\bFaraday\.(?:new|post|get)\b"),
                ],
            ),
            (
                Language::Go,
                vec![
                    ("net_http_post", r"\bhttp\.(?:Post|PostForm|Get)\s*\("),
                    ("net_http_request", r"\bhttp\.NewRequest(?:WithContext)?\s*\("),
                ],
            ),
        ];

        table
            .into_iter()
            .map(|(language, idioms)| {
                let rules = idioms
                    .iter()
                    .map(|(name, pattern)| PatternRule::new(name, pattern))
                    .collect::<crate::Result<Vec<_>>>()?;
                Ok((language, rules))
            })
            .collect()
    }

    fn load_config_rules() -> crate::Result<Vec<ConfigRule>> {
        let rules = [
            (ConfigRefKind::EnvironmentVariable, "sourcepay_env", r"\b(SOURCEPAY_[A-Z0-9_]*[A-Z0-9])\b"),
            (
                ConfigRefKind::EnvironmentVariable,
                "ssl_env",
                r#"(?:process\.env\.|getenv\(\s*['"]|environ(?:\.get\(|\[)\s*['"]|ENV\[\s*['"]|Environment\.GetEnvironmentVariable\(\s*")(SSL_[A-Z0-9_]*[A-Z0-9])"#,
            ),
            (ConfigRefKind::ConfigKey, "sourcepay_key", r"(?i)\b(sourcepay(?:\.[a-z_][a-z0-9_]*)+)"),
            (
                ConfigRefKind::Secret,
                "ssl_secret",
                r#"\b(ssl_(?:pin|password|user_id|merchant_id|account_id))['"]?\s*(?:=>|[:=])\s*['"][^'"]+['"]"#,
            ),
        ];

        rules
            .iter()
            .map(|(kind, name, pattern)| {
                Ok(ConfigRule {
                    kind: *kind,
                    rule: PatternRule::new(name, pattern)?,
                })
            })
            .collect()
    }
}

fn compile(pattern: &str) -> crate::Result<Regex> {
    Regex::new(pattern).map_err(|e| crate::Error::Pattern(format!("Invalid regex: {e}")))
}
