//! Definitions of the messages exchanged with a host.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The reply to a single operation: either a result or an error.
#[derive(Debug, Serialize, Deserialize)]
pub struct Reply<T> {
    /// The result, absent on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,

    /// The error message, absent on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> Reply<T> {
    /// A successful reply.
    pub fn ok(result: T) -> Self {
        Self {
            result: Some(result),
            error: None,
        }
    }

    /// A failed reply.
    pub fn err(error: impl fmt::Display) -> Self {
        Self {
            result: None,
            error: Some(error.to_string()),
        }
    }

    /// Whether the operation succeeded.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Convert back into a [`Result`].
    pub fn into_result(self) -> Result<T, String> {
        match (self.result, self.error) {
            (_, Some(e)) => Err(e),
            (Some(r), None) => Ok(r),
            (None, None) => Err("empty reply".to_string()),
        }
    }
}

impl<T, E: fmt::Display> From<Result<T, E>> for Reply<T> {
    fn from(r: Result<T, E>) -> Self {
        match r {
            Ok(t) => Self::ok(t),
            Err(e) => Self::err(e),
        }
    }
}

/// The reply to an operation without a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Whether the operation succeeded.
    pub success: bool,

    /// The error message, absent on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<E: fmt::Display> From<Result<(), E>> for Status {
    fn from(r: Result<(), E>) -> Self {
        match r {
            Ok(()) => Self {
                success: true,
                error: None,
            },
            Err(e) => Self {
                success: false,
                error: Some(e.to_string()),
            },
        }
    }
}

/// The operations a [`Request`] can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Encrypt a file name.
    EncryptFilename,
    /// Decrypt a file name.
    DecryptFilename,
    /// Encrypt a stream.
    EncryptStream,
    /// Decrypt a stream.
    DecryptStream,
    /// Obscure a password.
    ObscurePassword,
    /// Reveal an obscured password.
    RevealPassword,
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "encryptFilename" => Self::EncryptFilename,
            "decryptFilename" => Self::DecryptFilename,
            "encryptStream" => Self::EncryptStream,
            "decryptStream" => Self::DecryptStream,
            "obscurePassword" => Self::ObscurePassword,
            "revealPassword" => Self::RevealPassword,
            other => return Err(format!("Unknown operation: {other}")),
        })
    }
}

/// A request to a [`Worker`][crate::worker::Worker].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Correlates the response with the request.
    #[serde(default)]
    pub id: serde_json::Value,

    /// The requested operation, see [`Operation`].
    #[serde(rename = "type")]
    pub kind: String,

    /// The plaintext password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// The plaintext salt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,

    /// The file name to encrypt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// The file name to decrypt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_filename: Option<String>,

    /// The password to reveal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obscured_password: Option<String>,
}

/// The response of a [`Worker`][crate::worker::Worker].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// The id of the request.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub id: serde_json::Value,

    /// Whether the request succeeded.
    pub success: bool,

    /// The result, absent on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    /// The error message, absent on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    /// Answer request `id` with `outcome`.
    pub fn new(id: serde_json::Value, outcome: Result<String, String>) -> Self {
        match outcome {
            Ok(result) => Self {
                id,
                success: true,
                result: Some(result),
                error: None,
            },
            Err(error) => Self {
                id,
                success: false,
                result: None,
                error: Some(error),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_omits_absent_fields() {
        let ok = serde_json::to_string(&Reply::ok("x".to_string())).unwrap();
        assert_eq!(ok, r#"{"result":"x"}"#);

        let err = serde_json::to_string(&Reply::<String>::err("not initialized")).unwrap();
        assert_eq!(err, r#"{"error":"not initialized"}"#);

        let status = serde_json::to_string(&Status::from(Ok::<(), String>(()))).unwrap();
        assert_eq!(status, r#"{"success":true}"#);
    }

    #[test]
    fn test_request_field_names() {
        let request: Request = serde_json::from_str(
            r#"{"id":"7","type":"decryptFilename","password":"p","encryptedFilename":"x"}"#,
        )
        .unwrap();

        assert_eq!(request.id, serde_json::json!("7"));
        assert_eq!(request.kind.parse::<Operation>(), Ok(Operation::DecryptFilename));
        assert_eq!(request.encrypted_filename.as_deref(), Some("x"));
        assert!(request.salt.is_none());
    }

    #[test]
    fn test_unknown_operation() {
        assert_eq!(
            "shred".parse::<Operation>(),
            Err("Unknown operation: shred".to_string())
        );
    }
}
