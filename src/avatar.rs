// Hashed avatar links for emails with no local account picture.

use sha2::{Digest, Sha256};

/// `<source><sha256(lowercased email)>`, the Gravatar-compatible form.
pub fn hashed_link(source: &str, email: &str) -> String {
    let normalized = email.trim().to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    format!("{}{}", source, hex::encode(digest))
}
