use alloy::{primitives::Bytes, sol_types::SolInterface};
use patron_contracts::{SessionKeyRegistryError, SponsorPaymasterError, TokenPaymasterError};

/// Top-level error type for all patron contract operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatronError {
    /// Error from the session key registry
    #[error("session key registry error: {0:?}")]
    SessionKeyRegistry(SessionKeyRegistryError),

    /// Error from the base-asset sponsorship ledger
    #[error("sponsor paymaster error: {0:?}")]
    SponsorPaymaster(SponsorPaymasterError),

    /// Error from the token sponsorship ledger
    #[error("token paymaster error: {0:?}")]
    TokenPaymaster(TokenPaymasterError),

    /// Invariant violation that must abort the host transaction
    #[error("fatal error: {0}")]
    Fatal(String),
}

/// Result type alias for patron contract operations.
pub type Result<T> = std::result::Result<T, PatronError>;

impl From<SessionKeyRegistryError> for PatronError {
    fn from(err: SessionKeyRegistryError) -> Self {
        Self::SessionKeyRegistry(err)
    }
}

impl From<SponsorPaymasterError> for PatronError {
    fn from(err: SponsorPaymasterError) -> Self {
        Self::SponsorPaymaster(err)
    }
}

impl From<TokenPaymasterError> for PatronError {
    fn from(err: TokenPaymasterError) -> Self {
        Self::TokenPaymaster(err)
    }
}

impl PatronError {
    /// ABI-encoded revert data for hosts that surface errors on an EVM-style
    /// boundary. `Fatal` carries no selector and returns `None`; hosts must
    /// abort rather than revert.
    pub fn revert_data(&self) -> Option<Bytes> {
        match self {
            Self::SessionKeyRegistry(e) => Some(e.abi_encode().into()),
            Self::SponsorPaymaster(e) => Some(e.abi_encode().into()),
            Self::TokenPaymaster(e) => Some(e.abi_encode().into()),
            Self::Fatal(_) => None,
        }
    }
}
