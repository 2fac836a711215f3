//! SCRAM-SHA-256 authentication (RFC 5802 / RFC 7677), the default
//! password method on current PostgreSQL servers.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::{Digest, Sha256};

use super::error::PgError;

type HmacSha256 = Hmac<Sha256>;

/// Client side of one SCRAM-SHA-256 exchange.
///
/// Usage: `first_message` → send; `handle_server_first` → send; then
/// `verify_server_final` on the server's last message.
pub struct ScramExchange {
    username: String,
    password: String,
    client_nonce: String,
    auth_message: Option<String>,
    salted_password: Option<[u8; 32]>,
}

impl ScramExchange {
    pub fn new(username: &str, password: &str) -> Self {
        // 18 random bytes base64-encode to a 24-character nonce
        let nonce_bytes: [u8; 18] = rand::thread_rng().gen();

        Self {
            username: username.to_string(),
            password: password.to_string(),
            client_nonce: BASE64.encode(nonce_bytes),
            auth_message: None,
            salted_password: None,
        }
    }

    /// client-first-message: `n,,n=<user>,r=<client-nonce>`.
    pub fn first_message(&self) -> Vec<u8> {
        format!("n,,{}", self.first_message_bare()).into_bytes()
    }

    fn first_message_bare(&self) -> String {
        // PostgreSQL sends the username via the startup packet and accepts
        // an empty saslname here, but including it matches the RFC layout.
        format!("n={},r={}", self.username, self.client_nonce)
    }

    /// Process server-first-message (`r=<nonce>,s=<salt>,i=<iterations>`)
    /// and produce client-final-message with the proof.
    pub fn handle_server_first(&mut self, server_msg: &[u8]) -> Result<Vec<u8>, PgError> {
        let server_str = std::str::from_utf8(server_msg)
            .map_err(|_| PgError::Auth("SCRAM server message is not UTF-8".to_string()))?;

        let mut combined_nonce = None;
        let mut salt = None;
        let mut iterations = None;

        for part in server_str.split(',') {
            if let Some(value) = part.strip_prefix("r=") {
                combined_nonce = Some(value.to_string());
            } else if let Some(value) = part.strip_prefix("s=") {
                salt = Some(
                    BASE64
                        .decode(value)
                        .map_err(|_| PgError::Auth("Invalid SCRAM salt encoding".to_string()))?,
                );
            } else if let Some(value) = part.strip_prefix("i=") {
                iterations = Some(value.parse::<u32>().map_err(|_| {
                    PgError::Auth("Invalid SCRAM iteration count".to_string())
                })?);
            }
        }

        let combined_nonce = combined_nonce
            .ok_or_else(|| PgError::Auth("SCRAM server message missing nonce".to_string()))?;
        let salt =
            salt.ok_or_else(|| PgError::Auth("SCRAM server message missing salt".to_string()))?;
        let iterations = iterations
            .ok_or_else(|| PgError::Auth("SCRAM server message missing iterations".to_string()))?;

        // The combined nonce must extend ours
        if !combined_nonce.starts_with(&self.client_nonce) {
            return Err(PgError::Auth(
                "SCRAM nonce verification failed".to_string(),
            ));
        }

        let salted_password = hi(&self.password, &salt, iterations);
        let client_key = hmac_sha256(&salted_password, b"Client Key");
        let stored_key = sha256(&client_key);

        let client_final_without_proof = format!("c=biws,r={}", combined_nonce);
        let auth_message = format!(
            "{},{},{}",
            self.first_message_bare(),
            server_str,
            client_final_without_proof
        );

        let client_signature = hmac_sha256(&stored_key, auth_message.as_bytes());
        let client_proof = xor_bytes(&client_key, &client_signature);

        self.auth_message = Some(auth_message);
        self.salted_password = Some(salted_password);

        let client_final = format!(
            "{},p={}",
            client_final_without_proof,
            BASE64.encode(client_proof)
        );
        Ok(client_final.into_bytes())
    }

    /// Verify the server signature in server-final-message (`v=<verifier>`).
    pub fn verify_server_final(&self, server_msg: &[u8]) -> Result<(), PgError> {
        let server_str = std::str::from_utf8(server_msg)
            .map_err(|_| PgError::Auth("SCRAM server message is not UTF-8".to_string()))?;

        let verifier_b64 = server_str
            .strip_prefix("v=")
            .ok_or_else(|| PgError::Auth("Missing SCRAM server signature".to_string()))?;
        let server_signature = BASE64
            .decode(verifier_b64)
            .map_err(|_| PgError::Auth("Invalid SCRAM server signature".to_string()))?;

        let salted_password = self
            .salted_password
            .ok_or_else(|| PgError::Auth("SCRAM exchange out of order".to_string()))?;
        let auth_message = self
            .auth_message
            .as_ref()
            .ok_or_else(|| PgError::Auth("SCRAM exchange out of order".to_string()))?;

        let server_key = hmac_sha256(&salted_password, b"Server Key");
        let expected = hmac_sha256(&server_key, auth_message.as_bytes());

        if server_signature != expected {
            return Err(PgError::Auth(
                "SCRAM server signature verification failed".to_string(),
            ));
        }

        Ok(())
    }
}

/// Hi() - PBKDF2 with HMAC-SHA-256.
fn hi(password: &str, salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut output = [0u8; 32];
    pbkdf2::pbkdf2::<HmacSha256>(password.as_bytes(), salt, iterations, &mut output)
        .expect("valid output length");
    output
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn xor_bytes(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut result = [0u8; 32];
    for i in 0..32 {
        result[i] = a[i] ^ b[i];
    }
    result
}
