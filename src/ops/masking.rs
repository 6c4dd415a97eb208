//! Masking of credentials in request bodies before they are logged
//!
//! Only the logged copy is ever masked; the body sent on the wire is left
//! untouched. Masking replaces values, never adds or removes keys.

use serde_json::Value;

use crate::config::{SensitiveParams, MASKED_VALUE};

/// Field holding free-form configuration parameters in request bodies
const PARAMETERS_FIELD: &str = "parameters";

/// Credential fields carried by request bodies next to operational ones.
///
/// Embedded (flattened) into request bodies that need them.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SensitiveFields {
    pub db_password: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub parameters: std::collections::HashMap<String, String>,
}

impl SensitiveFields {
    /// Mask credentials in place; used on copies made for logging.
    pub fn mask_sensitive_info(&mut self, sensitive: &SensitiveParams) {
        self.db_password = MASKED_VALUE.to_string();
        self.aws_access_key_id = MASKED_VALUE.to_string();
        self.aws_secret_access_key = MASKED_VALUE.to_string();
        for (key, value) in self.parameters.iter_mut() {
            if sensitive.is_sensitive_parameter(key) {
                *value = MASKED_VALUE.to_string();
            }
        }
    }
}

/// Mask credential fields of a JSON value in place
pub fn mask_value(value: &mut Value, sensitive: &SensitiveParams) {
    let Value::Object(map) = value else {
        return;
    };

    for (key, field) in map.iter_mut() {
        if sensitive.is_credential_field(key) {
            *field = Value::String(MASKED_VALUE.to_string());
        } else if key == PARAMETERS_FIELD {
            if let Value::Object(params) = field {
                for (param, param_value) in params.iter_mut() {
                    if sensitive.is_sensitive_parameter(param) {
                        *param_value = Value::String(MASKED_VALUE.to_string());
                    }
                }
            }
        }
    }
}

/// Masked rendering of a request body for logs.
///
/// Bodies that are not JSON objects cannot be inspected and are replaced
/// entirely.
pub fn mask_request_body(body: &str, sensitive: &SensitiveParams) -> String {
    if body.is_empty() {
        return String::new();
    }
    match serde_json::from_str::<Value>(body) {
        Ok(mut value @ Value::Object(_)) => {
            mask_value(&mut value, sensitive);
            value.to_string()
        }
        _ => MASKED_VALUE.to_string(),
    }
}
