use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

/// A freshly minted password reset token. Only `hash` is persisted.
pub struct ResetToken {
    pub plain: String,
    pub hash: String,
}

impl ResetToken {
    /// 32 random bytes, hex-encoded.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        let plain = hex::encode(bytes);
        let hash = hash_token(&plain);
        Self { plain, hash }
    }
}

/// SHA-256 of the token, hex-encoded; the form stored on the user.
pub fn hash_token(plain: &str) -> String {
    hex::encode(Sha256::digest(plain.as_bytes()))
}
