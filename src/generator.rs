use sqlx::SqlitePool;

use crate::db;
use crate::error::{Result, ServiceError};

/// Alphabet for short codes: 62 alphanumeric symbols.
const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of every generated code.
pub const CODE_LEN: usize = 7;

/// Collision retries before giving up. With 62^7 possible codes this is
/// unreachable unless the keyspace is pathologically full; the cap turns an
/// endless loop into a visible error instead of a stuck request.
const MAX_ATTEMPTS: u32 = 1_000;

/// Generate a short code that does not exist in the store.
///
/// Rejection sampling: draw a random 7-character code, probe the store,
/// repeat on collision. Store errors during the probe propagate instead of
/// being retried — a dead store must not spin this loop forever. The probe
/// is an optimization only; the store's UNIQUE constraint on `code` remains
/// the authoritative guarantee and insert races are retried by the caller.
pub async fn generate_unique_code(pool: &SqlitePool) -> Result<String> {
    for attempt in 1..=MAX_ATTEMPTS {
        let code = random_code(CODE_LEN);
        let exists = db::code_exists(pool, &code)
            .await
            .map_err(|e| ServiceError::persistence("code existence probe", e))?;
        if !exists {
            return Ok(code);
        }
        tracing::warn!("short code collision on attempt {}: {}", attempt, code);
    }

    Err(ServiceError::CodeSpaceExhausted {
        attempts: MAX_ATTEMPTS,
    })
}

/// Generate a random alphanumeric string of the given length.
fn random_code(len: usize) -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}
