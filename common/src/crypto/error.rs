use thiserror::Error;

/// Errors that can occur during cryptographic operations
///
/// libsecp256k1 errors are carried as their debug rendering so the enum
/// stays `Clone + PartialEq` for assertions in tests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Invalid hexadecimal string format
    #[error("Invalid hex string: {0}")]
    InvalidHex(String),

    /// Secret key bytes are not a valid secp256k1 scalar
    #[error("Invalid secret key: {0}")]
    InvalidSecretKey(String),

    /// Signature components or recovery id are malformed
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Public key recovery from a signature failed
    #[error("Failed to recover public key: {0}")]
    RecoveryFailed(String),
}
