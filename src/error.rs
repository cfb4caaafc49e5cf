//! Error types for the Meson relayer core

use ethers::types::H256;
use thiserror::Error;

/// Main error type for swap encoding, signing and chain access
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MesonError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Malformed swap identifier: {0}")]
    MalformedIdentifier(String),

    #[error("NotImplementedError: {method} is not available without a configured signer")]
    NotImplemented { method: &'static str },

    #[error("Signer unavailable: {0}")]
    SignerUnavailable(String),

    #[error("User rejected the signing request")]
    UserRejected,

    #[error("Timeout waiting for {operation}")]
    Timeout {
        operation: String,
        /// Locally computed hash of a broadcast that did not resolve in time
        tx_hash: Option<H256>,
    },

    #[error("All {attempts} providers failed, last error: {last_error}")]
    AllProvidersFailed {
        attempts: usize,
        last_error: Box<MesonError>,
    },

    #[error("Client for network {network} has been disposed")]
    ClientDisposed { network: String },

    #[error("Client for network {network} is not initialized")]
    ClientNotInitialized { network: String },

    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),

    #[error("Call exception: {}", reason.as_deref().unwrap_or("execution reverted"))]
    CallException { reason: Option<String> },

    #[error("Server error: {message}")]
    ServerError {
        message: String,
        /// Revert reason carried over from a reclassified call exception
        reason: Option<String>,
    },

    #[error("Execution reverted: {reason}")]
    Revert { reason: String },

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("ABI error: {0}")]
    Abi(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl MesonError {
    /// Check if error is transient and the request may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MesonError::ServerError { .. } | MesonError::Timeout { .. } | MesonError::Provider(_)
        )
    }

    /// Revert reason reported by the chain, if this error carries one
    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            MesonError::Revert { reason } => Some(reason),
            MesonError::CallException { reason } | MesonError::ServerError { reason, .. } => {
                reason.as_deref()
            }
            MesonError::AllProvidersFailed { last_error, .. } => last_error.revert_reason(),
            _ => None,
        }
    }
}

impl From<ethers::abi::AbiError> for MesonError {
    fn from(e: ethers::abi::AbiError) -> Self {
        MesonError::Abi(e.to_string())
    }
}

impl From<ethers::abi::Error> for MesonError {
    fn from(e: ethers::abi::Error) -> Self {
        MesonError::Abi(e.to_string())
    }
}

impl From<ethers::abi::ParseError> for MesonError {
    fn from(e: ethers::abi::ParseError) -> Self {
        MesonError::Abi(e.to_string())
    }
}

impl From<ethers::signers::WalletError> for MesonError {
    fn from(e: ethers::signers::WalletError) -> Self {
        MesonError::Wallet(e.to_string())
    }
}

/// Result type for relayer operations
pub type MesonResult<T> = Result<T, MesonError>;
