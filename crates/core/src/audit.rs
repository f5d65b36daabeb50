//! Audit log helpers.
//!
//! Administrative task events are copied into the audit log with their
//! payload; credentials that a form happened to carry must not end up there.

/// Replacement written in place of a redacted value.
pub const REDACTED: &str = "[REDACTED]";

/// Key fragments whose values are never stored in the audit log.
pub const SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "token",
    "secret",
    "api_key",
    "private_key",
    "authorization",
    "credential",
    "session",
];

/// Whether a payload key names a sensitive value (case-insensitive substring).
pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_lowercase();
    SENSITIVE_FIELDS.iter().any(|f| key.contains(f))
}

/// Return a copy of `value` with every sensitive key redacted, at any depth.
pub fn redact(value: &serde_json::Value) -> serde_json::Value {
    let mut out = value.clone();
    redact_in_place(&mut out);
    out
}

fn redact_in_place(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if is_sensitive_key(key) {
                    *val = serde_json::Value::String(REDACTED.to_string());
                } else {
                    redact_in_place(val);
                }
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(redact_in_place),
        _ => {}
    }
}
