//! The external check that confirms a candidate is the real key.

use crate::pattern::KEY_LEN;

/// Confirms that a 32-byte candidate is the database key, typically by
/// decrypting a known header with it.
///
/// Implementations are called concurrently from every scan worker and must
/// not depend on call order.
pub trait KeyValidator: Send + Sync {
    fn validate(&self, candidate: &[u8; KEY_LEN]) -> bool;
}

impl<F> KeyValidator for F
where
    F: Fn(&[u8; KEY_LEN]) -> bool + Send + Sync,
{
    fn validate(&self, candidate: &[u8; KEY_LEN]) -> bool {
        self(candidate)
    }
}
