//! Generated secrets.

use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;

/// Length of generated database passwords.
pub const SECRET_LEN: usize = 32;

/// Generates an alphanumeric secret from the operating system's CSPRNG.
///
/// Alphanumeric output needs no escaping inside SQL string literals, shell
/// words or `.env` values.
pub fn generate_secret(len: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
