//! Sensitive-pattern identifiers and the regex-backed default redactor.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::capabilities::{CapabilityError, CapabilityResult, Redactor};
use crate::error::{MemoryError, MemoryResult};

/// Upper bound on redaction passes before giving up on a fixpoint.
const MAX_REDACTION_PASSES: usize = 8;

/// Object keys whose values are masked wholesale when credential or key
/// patterns are active.
const SENSITIVE_FIELD_NAMES: &[&str] = &[
    "password",
    "passwd",
    "secret",
    "api_key",
    "apikey",
    "access_token",
    "auth_token",
    "token",
    "credentials",
    "private_key",
    "privkey",
    "mnemonic",
    "seed_phrase",
];

/// Mask written over values of sensitive object keys.
pub const SENSITIVE_FIELD_MASK: &str = "[REDACTED:sensitive_field]";

const PRIVATE_KEY_REGEX: &str = r"(?i)-----BEGIN [A-Z ]*PRIVATE KEY-----[\s\S]*?-----END [A-Z ]*PRIVATE KEY-----|\b(?:0x)?[0-9a-f]{64}\b";
const CREDENTIAL_REGEX: &str = r"(?i)\b(?:password|passwd|secret|api[_-]?key|access[_-]?token|auth[_-]?token|bearer)\b\s*[:=]?\s*[^\s,;]+";
const ADDRESS_REGEX: &str = r"\b0x[0-9a-fA-F]{40}\b";

/// A class of content that must not leave the trust boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum SensitivePattern {
    /// Hex-encoded 32-byte keys and PEM private key blocks.
    PrivateKeys,
    /// `password=…`, `api_key: …`, bearer tokens and similar.
    SecurityCredentials,
    /// 20-byte hex account or contract addresses.
    SensitiveAddresses,
    /// Caller-supplied regex.
    Custom { name: String, regex: String },
}

impl SensitivePattern {
    /// Build a custom pattern, validating the regex eagerly.
    pub fn custom(name: &str, regex: &str) -> MemoryResult<Self> {
        if name.trim().is_empty() {
            return Err(MemoryError::InvalidConfig(
                "custom pattern name must not be empty".to_string(),
            ));
        }
        Regex::new(regex).map_err(|e| {
            MemoryError::InvalidConfig(format!("custom pattern {name}: {e}"))
        })?;
        Ok(Self::Custom {
            name: name.to_string(),
            regex: regex.to_string(),
        })
    }

    /// Stable identifier, also used in the redaction mask.
    pub fn name(&self) -> &str {
        match self {
            Self::PrivateKeys => "private_keys",
            Self::SecurityCredentials => "security_credentials",
            Self::SensitiveAddresses => "sensitive_addresses",
            Self::Custom { name, .. } => name,
        }
    }

    /// The text every match is replaced with.
    pub fn mask(&self) -> String {
        format!("[REDACTED:{}]", self.name())
    }

    fn regex_source(&self) -> &str {
        match self {
            Self::PrivateKeys => PRIVATE_KEY_REGEX,
            Self::SecurityCredentials => CREDENTIAL_REGEX,
            Self::SensitiveAddresses => ADDRESS_REGEX,
            Self::Custom { regex, .. } => regex,
        }
    }

    fn masks_sensitive_fields(&self) -> bool {
        matches!(self, Self::PrivateKeys | Self::SecurityCredentials)
    }
}

impl std::fmt::Display for SensitivePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for SensitivePattern {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "private_keys" => Ok(Self::PrivateKeys),
            "security_credentials" => Ok(Self::SecurityCredentials),
            "sensitive_addresses" => Ok(Self::SensitiveAddresses),
            other => Err(MemoryError::InvalidConfig(format!(
                "unknown sensitive pattern: {other}"
            ))),
        }
    }
}

/// A compiled pattern ready to apply.
struct CompiledPattern {
    regex: Regex,
    mask: String,
    masks_fields: bool,
}

/// Default [`Redactor`]: regex masking over every string in a JSON payload,
/// plus wholesale masking of values under sensitive object keys.
///
/// Passes repeat until the payload stops changing, so applying the redactor
/// to its own output is a no-op.
#[derive(Debug, Clone, Default)]
pub struct RegexRedactor;

impl RegexRedactor {
    pub fn new() -> Self {
        Self
    }

    fn compile(patterns: &[SensitivePattern]) -> CapabilityResult<Vec<CompiledPattern>> {
        patterns
            .iter()
            .map(|p| {
                let regex = Regex::new(p.regex_source())
                    .map_err(|e| CapabilityError::failed("redactor", format!("{p}: {e}")))?;
                Ok(CompiledPattern {
                    regex,
                    mask: p.mask(),
                    masks_fields: p.masks_sensitive_fields(),
                })
            })
            .collect()
    }

    fn redact_text(text: &str, compiled: &[CompiledPattern]) -> String {
        let mut out = text.to_string();
        for pattern in compiled {
            if pattern.regex.is_match(&out) {
                out = pattern
                    .regex
                    .replace_all(&out, regex::NoExpand(&pattern.mask))
                    .into_owned();
            }
        }
        out
    }

    fn is_masked_field(key: &str, compiled: &[CompiledPattern]) -> bool {
        compiled.iter().any(|p| p.masks_fields)
            && SENSITIVE_FIELD_NAMES.contains(&key.to_ascii_lowercase().as_str())
    }

    fn redact_value(value: &serde_json::Value, compiled: &[CompiledPattern]) -> serde_json::Value {
        use serde_json::Value;
        match value {
            Value::String(s) => Value::String(Self::redact_text(s, compiled)),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| Self::redact_value(v, compiled)).collect())
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| {
                        let redacted = if Self::is_masked_field(k, compiled) {
                            Value::String(SENSITIVE_FIELD_MASK.to_string())
                        } else {
                            Self::redact_value(v, compiled)
                        };
                        (k.clone(), redacted)
                    })
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Apply patterns until the payload reaches a fixpoint.
    pub fn redact_sync(
        &self,
        payload: &serde_json::Value,
        patterns: &[SensitivePattern],
    ) -> CapabilityResult<serde_json::Value> {
        let compiled = Self::compile(patterns)?;
        let mut current = payload.clone();
        for _ in 0..MAX_REDACTION_PASSES {
            let next = Self::redact_value(&current, &compiled);
            if next == current {
                return Ok(current);
            }
            current = next;
        }
        Err(CapabilityError::failed(
            "redactor",
            format!("no fixpoint after {MAX_REDACTION_PASSES} passes"),
        ))
    }
}

#[async_trait]
impl Redactor for RegexRedactor {
    async fn redact(
        &self,
        payload: &serde_json::Value,
        patterns: &[SensitivePattern],
    ) -> CapabilityResult<serde_json::Value> {
        self.redact_sync(payload, patterns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn all() -> Vec<SensitivePattern> {
        vec![
            SensitivePattern::PrivateKeys,
            SensitivePattern::SecurityCredentials,
            SensitivePattern::SensitiveAddresses,
        ]
    }

    #[test]
    fn test_parse_builtin_identifiers() {
        assert_eq!(
            "private_keys".parse::<SensitivePattern>().unwrap(),
            SensitivePattern::PrivateKeys
        );
        assert!("ibc_bridges".parse::<SensitivePattern>().is_err());
    }

    #[test]
    fn test_custom_pattern_validates_regex() {
        assert!(SensitivePattern::custom("bad", "(unclosed").is_err());
        assert!(SensitivePattern::custom("", "x").is_err());
        assert!(SensitivePattern::custom("ticket", r"TCK-\d+").is_ok());
    }

    #[test]
    fn test_masks_address_but_not_private_key_prefix() {
        let key = format!("0x{}", "ab".repeat(32));
        let addr = format!("0x{}", "cd".repeat(20));
        let out = RegexRedactor::new()
            .redact_sync(&json!(format!("key {key} addr {addr}")), &all())
            .unwrap();
        let text = out.as_str().unwrap();
        assert_eq!(
            text,
            "key [REDACTED:private_keys] addr [REDACTED:sensitive_addresses]"
        );
    }

    #[test]
    fn test_masks_credentials_in_text() {
        let out = RegexRedactor::new()
            .redact_sync(&json!("login with password=hunter2 now"), &all())
            .unwrap();
        assert_eq!(out, json!("login with [REDACTED:security_credentials] now"));
    }

    #[test]
    fn test_masks_sensitive_fields() {
        let out = RegexRedactor::new()
            .redact_sync(
                &json!({"user": "alice", "api_key": 12345, "nested": [{"Password": "x"}]}),
                &all(),
            )
            .unwrap();
        assert_eq!(out["user"], json!("alice"));
        assert_eq!(out["api_key"], json!(SENSITIVE_FIELD_MASK));
        assert_eq!(out["nested"][0]["Password"], json!(SENSITIVE_FIELD_MASK));
    }

    #[test]
    fn test_fields_untouched_without_credential_patterns() {
        let patterns = vec![SensitivePattern::SensitiveAddresses];
        let out = RegexRedactor::new()
            .redact_sync(&json!({"password": "x"}), &patterns)
            .unwrap();
        assert_eq!(out, json!({"password": "x"}));
    }

    #[test]
    fn test_custom_name_that_matches_credentials_still_converges() {
        let patterns = vec![
            SensitivePattern::SecurityCredentials,
            SensitivePattern::custom("api_key", r"TCK-\d+").unwrap(),
        ];
        let redactor = RegexRedactor::new();
        let once = redactor.redact_sync(&json!("ref TCK-42"), &patterns).unwrap();
        let twice = redactor.redact_sync(&once, &patterns).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_non_string_scalars_pass_through() {
        let out = RegexRedactor::new()
            .redact_sync(&json!({"line": 7, "ok": true, "v": null}), &all())
            .unwrap();
        assert_eq!(out, json!({"line": 7, "ok": true, "v": null}));
    }
}
