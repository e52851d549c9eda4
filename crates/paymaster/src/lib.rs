//! Session-key authorization and gas sponsorship ledgers.
//!
//! Three contracts built over a pluggable [`storage::StorageProvider`]:
//!
//! - [`SessionKeyRegistry`]: registration, revocation, scoped validation,
//!   and signature-gated consumption of ephemeral delegated keys.
//! - [`SponsorPaymaster`]: base-asset sponsor balances and allowances with
//!   pessimistic charge-then-refund accounting.
//! - [`TokenPaymaster`]: the same lifecycle denominated in a supported
//!   token, converted through a [`oracle::PriceOracle`] with a bounded
//!   markup.
//!
//! An external dispatcher drives each sponsored operation through two
//! ordered phases: `validate_op` (decode the authorization payload, verify
//! signatures, pre-debit the cost ceiling) and `post_op` (refund the unused
//! surplus, or everything if the wrapped call reverted). The dispatcher
//! guarantees atomicity between the phases and the wrapped call; this crate
//! holds no locks and never blocks.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod calls;
pub mod eip712;
pub mod entry_point;
pub mod error;
pub mod nonces;
pub mod oracle;
pub mod session_keys;
pub mod sponsor_paymaster;
pub mod storage;
pub mod token_paymaster;

pub use error::{PatronError, Result};
pub use patron_contracts::{
    ENTRY_POINT_ADDRESS, SESSION_KEY_REGISTRY_ADDRESS, SPONSOR_PAYMASTER_ADDRESS,
    TOKEN_PAYMASTER_ADDRESS,
};
pub use session_keys::SessionKeyRegistry;
pub use sponsor_paymaster::{Allowance, ChargeKind, PendingCharge, SponsorPaymaster};
pub use token_paymaster::{PendingTokenCharge, TokenPaymaster};

use alloy::primitives::{Address, Bytes};

/// The wrapped operation as a sponsoring ledger sees it: who sent it, the
/// call it will execute, and the payload authorizing payment. The first 20
/// bytes of `paymaster_data` identify the ledger and are skipped by the
/// decoders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SponsoredOp {
    pub sender: Address,
    pub call_data: Bytes,
    pub paymaster_data: Bytes,
}
