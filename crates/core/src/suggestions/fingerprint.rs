use sha2::{Digest, Sha256};

use crate::domain::product::ProductId;
use crate::domain::suggestion::SuggestionType;

/// Number of message characters that take part in the fingerprint.
pub const MESSAGE_PREFIX_CHARS: usize = 50;

/// Stable fingerprint over `type:product:message-prefix`.
pub fn content_hash(
    suggestion_type: SuggestionType,
    product_id: Option<&ProductId>,
    message: &str,
) -> String {
    let product = product_id.map(|id| id.0.as_str()).unwrap_or("general");
    let prefix: String = message.chars().take(MESSAGE_PREFIX_CHARS).collect();

    let mut hasher = Sha256::new();
    hasher.update(suggestion_type.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(product.as_bytes());
    hasher.update(b":");
    hasher.update(prefix.as_bytes());
    format!("{:x}", hasher.finalize())
}
