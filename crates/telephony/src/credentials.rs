//! Per-phone credential encryption
//!
//! Gateway credentials are stored encrypted at rest: AES-256-GCM with a key
//! derived from the process secret by PBKDF2-SHA256 (100k iterations). The
//! salt and nonce travel with the ciphertext: `base64(salt || nonce || ct)`.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;

use crate::TelephonyError;

const PBKDF2_ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// Decrypted gateway credentials for one phone
#[derive(Clone)]
pub struct PhoneCredentials {
    pub api_key: String,
    pub api_token: String,
    pub account_sid: String,
    pub subdomain: String,
    pub app_id: String,
}

impl std::fmt::Debug for PhoneCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Secrets never hit logs
        f.debug_struct("PhoneCredentials")
            .field("account_sid", &self.account_sid)
            .field("subdomain", &self.subdomain)
            .field("app_id", &self.app_id)
            .finish_non_exhaustive()
    }
}

/// Symmetric cipher over the process credential secret
#[derive(Clone)]
pub struct CredentialCipher {
    secret: String,
}

impl CredentialCipher {
    pub fn new(secret: impl Into<String>) -> Result<Self, TelephonyError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(TelephonyError::Credentials(
                "credential secret is empty".to_string(),
            ));
        }
        Ok(Self { secret })
    }

    fn derive_key(&self, salt: &[u8]) -> Key<Aes256Gcm> {
        let mut key = [0u8; 32];
        pbkdf2_hmac::<Sha256>(self.secret.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
        key.into()
    }

    /// Encrypt a plaintext credential field
    pub fn encrypt(&self, plaintext: &str) -> Result<String, TelephonyError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);

        let key = self.derive_key(&salt);
        let cipher = Aes256Gcm::new(&key);
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| TelephonyError::Credentials(format!("encrypt failed: {}", e)))?;

        let mut packed = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
        packed.extend_from_slice(&salt);
        packed.extend_from_slice(&nonce);
        packed.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(packed))
    }

    /// Decrypt a stored credential field
    pub fn decrypt(&self, encoded: &str) -> Result<String, TelephonyError> {
        let packed = BASE64
            .decode(encoded)
            .map_err(|e| TelephonyError::Credentials(format!("bad base64: {}", e)))?;

        if packed.len() < SALT_LEN + NONCE_LEN {
            return Err(TelephonyError::Credentials(
                "ciphertext too short".to_string(),
            ));
        }

        let (salt, rest) = packed.split_at(SALT_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

        let key = self.derive_key(salt);
        let cipher = Aes256Gcm::new(&key);

        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| TelephonyError::Credentials("decrypt failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| TelephonyError::Credentials(format!("bad utf8: {}", e)))
    }

    /// Decrypt the credential fields of a phone profile
    pub fn decrypt_phone(
        &self,
        phone: &outdial_core::PhoneProfile,
    ) -> Result<PhoneCredentials, TelephonyError> {
        Ok(PhoneCredentials {
            api_key: self.decrypt(&phone.encrypted_api_key)?,
            api_token: self.decrypt(&phone.encrypted_api_token)?,
            account_sid: phone.account_sid.clone(),
            subdomain: phone.subdomain.clone(),
            app_id: phone.app_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let cipher = CredentialCipher::new("test-process-secret").unwrap();
        let plaintext = "api-key-12345";

        let encrypted = cipher.encrypt(plaintext).unwrap();
        assert_ne!(encrypted, plaintext);

        let decrypted = cipher.decrypt(&encrypted).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_each_encryption_differs() {
        let cipher = CredentialCipher::new("secret").unwrap();
        let a = cipher.encrypt("same").unwrap();
        let b = cipher.encrypt("same").unwrap();
        // Fresh salt + nonce per encryption
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_secret_fails() {
        let cipher = CredentialCipher::new("secret-a").unwrap();
        let encrypted = cipher.encrypt("payload").unwrap();

        let other = CredentialCipher::new("secret-b").unwrap();
        assert!(other.decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(CredentialCipher::new("").is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let cipher = CredentialCipher::new("secret").unwrap();
        let encrypted = cipher.encrypt("payload").unwrap();
        let mut bytes = BASE64.decode(&encrypted).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let tampered = BASE64.encode(bytes);
        assert!(cipher.decrypt(&tampered).is_err());
    }
}
