use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use eskimoe_common::id::prefix;
use rand::Rng;
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Opaque token helpers
// ---------------------------------------------------------------------------

/// Generate an opaque random token with the given prefix and byte length.
pub fn generate_opaque_token(prefix: &str, bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill(&mut buf[..]);
    format!("{}_{}", prefix, URL_SAFE_NO_PAD.encode(&buf))
}

/// Generate a member bearer token (`tok_` prefix). Shown to the member once.
pub fn generate_member_token() -> String {
    generate_opaque_token(prefix::TOKEN, 32)
}

/// Generate a short invite code (`inv_` prefix).
pub fn generate_invite_code() -> String {
    generate_opaque_token(prefix::INVITE, 9)
}

/// SHA-256 of a bearer token. Only this value is persisted.
pub fn hash_token(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}
