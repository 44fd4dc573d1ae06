//! Boundary token generation and validation.
//!
//! The boundary token is chosen by the client once per session. Under
//! [`FramingMode::Boundary`](super::FramingMode::Boundary) a binary frame
//! whose bytes equal the token marks the end of the current file.
//!
//! ## Token Format
//!
//! Generated tokens draw from an alphanumeric alphabet. The server accepts
//! any non-empty string, since legacy clients pick their own.

use crate::error::{Error, Result};

/// The character set used for generated tokens.
pub const TOKEN_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of generated boundary tokens.
pub const DEFAULT_TOKEN_LENGTH: usize = 16;

/// A validated, non-empty boundary token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoundaryToken {
    token: String,
}

impl BoundaryToken {
    /// Wrap a client-chosen token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is empty.
    pub fn parse(input: &str) -> Result<Self> {
        if input.is_empty() {
            return Err(Error::MalformedMessage(
                "boundary must not be empty".to_string(),
            ));
        }
        Ok(Self {
            token: input.to_string(),
        })
    }

    /// Generate a random token of [`DEFAULT_TOKEN_LENGTH`] characters.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            token: random_token(DEFAULT_TOKEN_LENGTH),
        }
    }

    /// The token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// The token bytes compared against inbound frames.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.token.as_bytes()
    }

    /// Whether `frame` is exactly the boundary marker.
    #[must_use]
    pub fn matches(&self, frame: &[u8]) -> bool {
        frame == self.as_bytes()
    }
}

impl std::fmt::Display for BoundaryToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.token)
    }
}

/// Generate a random alphanumeric string of `length` characters.
///
/// Used for boundary tokens and for the (unvalidated) session token.
#[must_use]
pub fn random_token(length: usize) -> String {
    use rand::Rng;

    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..TOKEN_CHARSET.len());
            TOKEN_CHARSET[idx] as char
        })
        .collect()
}
