//! Fernet key generation.
//!
//! A Fernet key is 32 random bytes: a 16-byte signing key followed by a
//! 16-byte encryption key, stored as URL-safe base64 with padding.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

pub const FERNET_KEY_BYTES: usize = 32;
pub const FERNET_KEY_TEXT_LEN: usize = 44;

const SIGNING_KEY_BYTES: usize = 16;

pub struct FernetKey {
    bytes: [u8; FERNET_KEY_BYTES],
}

impl FernetKey {
    /// Draws a fresh key from the operating system CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; FERNET_KEY_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn parse(text: &str) -> Result<Self, KeyFormatError> {
        if text.len() != FERNET_KEY_TEXT_LEN {
            return Err(KeyFormatError::new(format!(
                "Fernet key must be {FERNET_KEY_TEXT_LEN} characters, got {}",
                text.len()
            )));
        }

        let decoded = Zeroizing::new(
            URL_SAFE
                .decode(text)
                .map_err(|error| KeyFormatError::new(format!("Invalid URL-safe base64: {error}")))?,
        );
        let bytes: [u8; FERNET_KEY_BYTES] = decoded.as_slice().try_into().map_err(|_| {
            KeyFormatError::new(format!(
                "Fernet key must decode to {FERNET_KEY_BYTES} bytes, got {}",
                decoded.len()
            ))
        })?;

        Ok(Self { bytes })
    }

    pub fn to_text(&self) -> Zeroizing<String> {
        Zeroizing::new(URL_SAFE.encode(self.bytes))
    }

    pub fn signing_key(&self) -> &[u8] {
        &self.bytes[..SIGNING_KEY_BYTES]
    }

    pub fn encryption_key(&self) -> &[u8] {
        &self.bytes[SIGNING_KEY_BYTES..]
    }
}

impl Drop for FernetKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for FernetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FernetKey([redacted])")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFormatError {
    message: String,
}

impl KeyFormatError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for KeyFormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for KeyFormatError {}
