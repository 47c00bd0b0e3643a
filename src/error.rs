// src/error.rs
use thiserror::Error;

/// Everything a login/scrape run can fail with.
///
/// Only `SessionExpired` and `TransientFetch` are ever recovered locally;
/// credential and glyph failures propagate immediately, because masking them
/// risks submitting a corrupted secret.
#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Keypad key image at this position matched no known glyph fingerprint.
    #[error("keypad image {0} matches no known glyph")]
    UnrecognizedGlyph(usize),

    /// Two key images resolved to the same character; the keypad read
    /// cannot be trusted.
    #[error("keypad shows {0:?} on more than one key")]
    DuplicateGlyph(char),

    #[error("secret contains a character not on the keypad: {0:?}")]
    UnknownCharacter(char),

    #[error("session expired")]
    SessionExpired,

    #[error("transient fetch failure: {0}")]
    TransientFetch(String),

    #[error("fetch failed after {attempts} attempts: {last}")]
    UnrecoverableFetch { attempts: u32, last: String },

    #[error("route not configured: {0}")]
    UnknownRoute(String),

    #[error("page structure not recognized: {0}")]
    Parse(String),

    #[error("config: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("image decode: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, ScrapeError>;
