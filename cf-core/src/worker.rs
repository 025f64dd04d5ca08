//! A request/response worker for hosts that pass credentials with every request.
//!
//! Every request names the operation and carries the plaintext password and salt. Sessions are
//! created on first use and cached per credential pair, so repeated requests skip key derivation.
//! The cache is bounded, the least recently used session is evicted first.

use crate::api::{Operation, Request, Response};
use crate::consts::DEFAULT_CACHED_SESSIONS;
use crate::error::Error;
use crate::obscure;
use crate::session::{cipher_config, Session, StreamOptions};

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use tiny_keccak::{Hasher, Sha3};

/// Identifies a credential pair without keeping it around.
type CacheKey = [u8; 32];

fn cache_key(password: &str, salt: &str) -> CacheKey {
    let mut h = Sha3::v256();

    // Length prefixed, so that ("ab", "c") and ("a", "bc") differ.
    for part in [password, salt] {
        h.update(&(part.len() as u64).to_be_bytes());
        h.update(part.as_bytes());
    }

    let mut key = [0u8; 32];
    h.finalize(&mut key);
    key
}

/// Answers [`Request`]s.
#[derive(Debug)]
pub struct Worker {
    sessions: Mutex<LruCache<CacheKey, Session>>,
    options: StreamOptions,
}

impl Default for Worker {
    fn default() -> Self {
        Self::with_options(StreamOptions::default())
    }
}

/// A required field, treating empty strings as absent.
fn required<'a>(field: &'a Option<String>, message: &str) -> Result<&'a str, String> {
    match field.as_deref() {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(message.to_string()),
    }
}

impl Worker {
    /// A worker without cached sessions.
    pub fn new() -> Self {
        Self::default()
    }

    /// A worker whose sessions open streams with `options`.
    pub fn with_options(options: StreamOptions) -> Self {
        let capacity = NonZeroUsize::new(DEFAULT_CACHED_SESSIONS).unwrap_or(NonZeroUsize::MIN);
        Self::with_cache_capacity(options, capacity)
    }

    /// A worker that caches at most `capacity` sessions.
    pub fn with_cache_capacity(options: StreamOptions, capacity: NonZeroUsize) -> Self {
        Self {
            sessions: Mutex::new(LruCache::new(capacity)),
            options,
        }
    }

    /// The session for a credential pair, created if needed.
    pub fn session(&self, password: &str, salt: &str) -> Result<Session, Error> {
        let key = cache_key(password, salt);

        if let Some(session) = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(session.clone());
        }

        // Derive outside the lock, a racing request at worst derives twice.
        let session = Session::with_config(&cipher_config(password, salt), self.options)?;
        log::debug!("caching new session");

        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if sessions.len() == sessions.cap().get() && !sessions.contains(&key) {
            log::debug!("evicting least recently used session");
        }

        Ok(sessions.get_or_insert(key, || session).clone())
    }

    /// Number of cached sessions.
    pub fn cached_sessions(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn dispatch(&self, request: &Request) -> Result<String, String> {
        let salt = request.salt.as_deref().unwrap_or_default();

        match request.kind.parse::<Operation>()? {
            Operation::EncryptFilename => {
                let filename = required(
                    &request.filename,
                    "Filename and password required for encryption",
                )?;
                let password = required(
                    &request.password,
                    "Filename and password required for encryption",
                )?;

                let session = self.session(password, salt).map_err(|e| e.to_string())?;
                Ok(session.encrypt_name(filename))
            }
            Operation::DecryptFilename => {
                let message = "Encrypted filename and password required for decryption";
                let name = required(&request.encrypted_filename, message)?;
                let password = required(&request.password, message)?;

                let session = self.session(password, salt).map_err(|e| e.to_string())?;
                session
                    .decrypt_name(name)
                    .map_err(|e| Error::from(e).to_string())
            }
            Operation::EncryptStream | Operation::DecryptStream => {
                Err("Streams cannot be carried over the line protocol".to_string())
            }
            Operation::ObscurePassword => {
                let password = required(&request.password, "Password required for obscuration")?;
                Ok(obscure::obscure(password))
            }
            Operation::RevealPassword => {
                let obscured = required(
                    &request.obscured_password,
                    "Obscured password required for revelation",
                )?;
                obscure::reveal(obscured).map_err(|e| e.to_string())
            }
        }
    }

    /// Answer a request.
    pub fn handle(&self, request: Request) -> Response {
        let outcome = self.dispatch(&request);

        if let Err(e) = &outcome {
            log::debug!("request {} ({}) failed: {e}", request.id, request.kind);
        }

        Response::new(request.id, outcome)
    }

    /// Answer a request in JSON with a response in JSON.
    pub fn handle_json(&self, line: &str) -> String {
        let response = match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle(request),
            Err(e) => {
                // Salvage the id, if the line is at least an object.
                let id = serde_json::from_str::<serde_json::Value>(line)
                    .ok()
                    .and_then(|v| v.get("id").cloned())
                    .unwrap_or_default();
                Response::new(id, Err(format!("malformed request: {e}")))
            }
        };

        serde_json::to_string(&response).unwrap_or_else(|e| {
            format!(r#"{{"success":false,"error":"failed to serialize response: {e}"}}"#)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: serde_json::Value) -> Request {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_cache_key_is_unambiguous() {
        assert_ne!(cache_key("ab", "c"), cache_key("a", "bc"));
        assert_ne!(cache_key("", "x"), cache_key("x", ""));
        assert_eq!(cache_key("a", "b"), cache_key("a", "b"));
    }

    #[test]
    fn test_filename_roundtrip_caches_session() {
        let worker = Worker::new();

        let encrypted = worker.handle(request(json!({
            "id": 1,
            "type": "encryptFilename",
            "filename": "report.txt",
            "password": "secret",
        })));
        assert!(encrypted.success);
        assert_eq!(encrypted.id, json!(1));

        let decrypted = worker.handle(request(json!({
            "id": 2,
            "type": "decryptFilename",
            "encryptedFilename": encrypted.result.unwrap(),
            "password": "secret",
        })));
        assert_eq!(decrypted.result.as_deref(), Some("report.txt"));
        assert_eq!(worker.cached_sessions(), 1);

        worker.handle(request(json!({
            "type": "encryptFilename",
            "filename": "report.txt",
            "password": "secret",
            "salt": "pepper",
        })));
        assert_eq!(worker.cached_sessions(), 2);
    }

    #[test]
    fn test_session_cache_is_bounded() {
        let capacity = NonZeroUsize::new(2).unwrap();
        let worker = Worker::with_cache_capacity(StreamOptions::default(), capacity);

        let first = worker.session("one", "").unwrap().encrypt_name("x");
        worker.session("two", "").unwrap();
        // Touch "one" so that "two" is the least recently used.
        worker.session("one", "").unwrap();
        worker.session("three", "").unwrap();
        assert_eq!(worker.cached_sessions(), 2);

        let sessions = worker.sessions.lock().unwrap();
        assert!(sessions.contains(&cache_key("one", "")));
        assert!(sessions.contains(&cache_key("three", "")));
        assert!(!sessions.contains(&cache_key("two", "")));
        drop(sessions);

        // Evicted credentials derive the same keys again.
        assert_eq!(worker.session("one", "").unwrap().encrypt_name("x"), first);
        worker.session("two", "").unwrap();
        assert_eq!(worker.cached_sessions(), 2);
    }

    #[test]
    fn test_validation_messages() {
        let worker = Worker::new();

        let cases = [
            (
                json!({"type": "encryptFilename", "password": "p"}),
                "Filename and password required for encryption",
            ),
            (
                json!({"type": "encryptFilename", "filename": "f", "password": ""}),
                "Filename and password required for encryption",
            ),
            (
                json!({"type": "decryptFilename", "password": "p"}),
                "Encrypted filename and password required for decryption",
            ),
            (json!({"type": "obscurePassword"}), "Password required for obscuration"),
            (
                json!({"type": "revealPassword"}),
                "Obscured password required for revelation",
            ),
            (
                json!({"type": "encryptStream", "password": "p"}),
                "Streams cannot be carried over the line protocol",
            ),
            (json!({"type": "format"}), "Unknown operation: format"),
        ];

        for (value, message) in cases {
            let response = worker.handle(request(value));
            assert!(!response.success);
            assert!(response.result.is_none());
            assert_eq!(response.error.as_deref(), Some(message));
        }

        assert_eq!(worker.cached_sessions(), 0);
    }

    #[test]
    fn test_json_lines() {
        let worker = Worker::new();

        let obscured: Response = serde_json::from_str(&worker.handle_json(
            r#"{"id":"a","type":"obscurePassword","password":"potato"}"#,
        ))
        .unwrap();
        assert!(obscured.success);

        let line = format!(
            r#"{{"id":"b","type":"revealPassword","obscuredPassword":"{}"}}"#,
            obscured.result.unwrap()
        );
        let revealed: Response = serde_json::from_str(&worker.handle_json(&line)).unwrap();
        assert_eq!(revealed.id, json!("b"));
        assert_eq!(revealed.result.as_deref(), Some("potato"));
    }

    #[test]
    fn test_malformed_json() {
        let worker = Worker::new();

        let response: Response =
            serde_json::from_str(&worker.handle_json(r#"{"id": 9, "password": "p"}"#)).unwrap();
        assert!(!response.success);
        assert_eq!(response.id, json!(9));
        assert!(response.error.unwrap().starts_with("malformed request"));

        let response: Response = serde_json::from_str(&worker.handle_json("{not json")).unwrap();
        assert!(!response.success);
        assert_eq!(response.id, serde_json::Value::Null);
    }

    #[test]
    fn test_bad_reveal() {
        let worker = Worker::new();
        let response = worker.handle(request(json!({
            "type": "revealPassword",
            "obscuredPassword": "not-valid-base64!!",
        })));
        assert_eq!(
            response.error.as_deref(),
            Some("base64 decode failed when revealing password - is it obscured?")
        );
    }
}
