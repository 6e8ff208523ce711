#![warn(missing_docs)]
//! # pepper-chap
//!
//! ## Purpose
//! Computes the CHAP response the gateway expects on `logon`.
//!
//! ## Responsibilities
//! - Validate the identifier byte and hex challenge.
//! - Encode the clear-text password one byte per character.
//! - Digest `ident || password || challenge` with MD5 and return lowercase hex.
//!
//! ## Data flow
//! Session driver obtains a fresh challenge -> [`chap`] -> hex response placed
//! in the `logon` query.
//!
//! ## Ownership and lifetimes
//! Inputs are borrowed; the digest is returned as an owned `String`.
//!
//! ## Error model
//! Odd-length or non-hex input and password characters outside `U+0000..=U+00FF`
//! return [`ChapError`] rather than a digest the gateway would reject.
//!
//! ## Security and privacy notes
//! The clear-text password never leaves this function and is not logged.
//!
//! ## Example
//! ```rust
//! let response = pepper_chap::chap("00", "secret", "f3a2c156428029ae0f18da67cff02bbc").unwrap();
//! assert_eq!(response.len(), 32);
//! assert!(response.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
//! ```

use md5::{Digest, Md5};
use thiserror::Error;

/// Identifier byte used when the caller does not configure one.
pub const DEFAULT_IDENT: &str = "00";

/// Length of a CHAP response in hex characters.
pub const RESPONSE_HEX_LEN: usize = 32;

/// Computes the CHAP response for one challenge.
///
/// # Parameters
/// - `ident`: identifier byte as one hex pair (`"00"`).
/// - `password`: clear-text password; each character is one byte.
/// - `challenge`: hex challenge from the gateway `status` call.
///
/// # Errors
/// Returns [`ChapError::InvalidIdent`] when `ident` is not exactly one byte.
/// Returns [`ChapError::InvalidHex`] when `challenge` is not valid hex.
/// Returns [`ChapError::UnsupportedPasswordChar`] for characters above `U+00FF`.
pub fn chap(ident: &str, password: &str, challenge: &str) -> Result<String, ChapError> {
    let ident = parse_ident(ident)?;
    let password = password_bytes(password)?;
    let challenge = decode_hex("challenge", challenge)?;

    let mut hasher = Md5::new();
    hasher.update([ident]);
    hasher.update(&password);
    hasher.update(&challenge);

    Ok(hex::encode(hasher.finalize()))
}

/// Parses a one-byte identifier written as a hex pair.
///
/// # Errors
/// Returns [`ChapError::InvalidIdent`] when the input is not one hex byte.
pub fn parse_ident(ident: &str) -> Result<u8, ChapError> {
    match decode_hex("ident", ident) {
        Ok(bytes) if bytes.len() == 1 => Ok(bytes[0]),
        _ => Err(ChapError::InvalidIdent(ident.to_string())),
    }
}

/// Returns the lowercase hex representation of the password bytes.
///
/// # Errors
/// Returns [`ChapError::UnsupportedPasswordChar`] for characters above `U+00FF`.
pub fn password_to_hex(password: &str) -> Result<String, ChapError> {
    password_bytes(password).map(hex::encode)
}

fn password_bytes(password: &str) -> Result<Vec<u8>, ChapError> {
    password
        .chars()
        .map(|character| {
            u8::try_from(u32::from(character))
                .map_err(|_| ChapError::UnsupportedPasswordChar(character))
        })
        .collect()
}

fn decode_hex(field: &'static str, raw: &str) -> Result<Vec<u8>, ChapError> {
    let cleaned: String = raw.chars().filter(|character| *character != ' ').collect();
    hex::decode(&cleaned).map_err(|error| ChapError::InvalidHex {
        field,
        reason: error.to_string(),
    })
}

/// Errors produced while computing a CHAP response.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChapError {
    /// Identifier is not a single hex-encoded byte.
    #[error("invalid chap ident '{0}': expected one hex byte")]
    InvalidIdent(String),
    /// Hex input could not be decoded.
    #[error("invalid hex in {field}: {reason}")]
    InvalidHex {
        /// Input that failed to decode.
        field: &'static str,
        /// Decoder message.
        reason: String,
    },
    /// Password contains a character that does not fit in one byte.
    #[error("password character {0:?} does not fit in one byte")]
    UnsupportedPasswordChar(char),
}

#[cfg(test)]
mod tests {
    //! Unit tests for digest layout and input validation.

    use super::*;

    #[test]
    fn digest_covers_ident_password_and_challenge_in_order() {
        // md5("abc")
        assert_eq!(
            chap("61", "b", "63").expect("chap should compute"),
            "900150983cd24fb0d6963f7d28e17f72"
        );
        assert_eq!(
            chap("61", "bc", "").expect("chap should compute"),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn single_zero_byte_matches_reference_digest() {
        assert_eq!(
            chap(DEFAULT_IDENT, "", "").expect("chap should compute"),
            "93b885adfe0da089cdf634904fd59f71"
        );
    }

    #[test]
    fn hex_input_ignores_spaces_and_case() {
        let lower = chap("0a", "pw", "8561b644a9c14dbc").expect("chap should compute");
        let upper = chap("0A", "pw", "8561 B644 A9C1 4DBC").expect("chap should compute");
        assert_eq!(lower, upper);
    }

    #[test]
    fn rejects_malformed_inputs() {
        assert_eq!(chap("0", "pw", "ab"), Err(ChapError::InvalidIdent("0".to_string())));
        assert_eq!(chap("0000", "pw", "ab"), Err(ChapError::InvalidIdent("0000".to_string())));
        assert!(matches!(chap("00", "pw", "abc"), Err(ChapError::InvalidHex { field: "challenge", .. })));
        assert!(matches!(chap("00", "pw", "zz"), Err(ChapError::InvalidHex { .. })));
        assert_eq!(
            chap("00", "pw\u{263a}", "ab"),
            Err(ChapError::UnsupportedPasswordChar('\u{263a}'))
        );
    }

    #[test]
    fn password_hex_uses_one_pair_per_character() {
        assert_eq!(password_to_hex("secret").expect("hex should encode"), "736563726574");
        assert_eq!(password_to_hex("\u{e9}").expect("latin-1 should encode"), "e9");
    }
}
