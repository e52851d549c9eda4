//! Patron contract interfaces and bindings.
//!
//! This crate holds the `sol!` interface definitions (functions, events,
//! errors), the EIP-712 message schemas, and the well-known addresses shared
//! by the patron contracts. It contains no logic; the implementations live in
//! `patron-paymaster`.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg))]

use alloy_primitives::{address, Address};

pub mod entry_point;
pub mod schemas;
pub mod session_key_registry;
pub mod sponsor_paymaster;
pub mod token_paymaster;

pub use entry_point::{IAccountExecute, IEntryPoint};
pub use schemas::{RegisterSessionKey, SessionKeyTokenUserOp, SessionKeyUserOp, SessionOperation};
pub use session_key_registry::{
    ISessionKeyRegistry, SessionKeyRegistryError, SessionKeyRegistryEvent,
};
pub use sponsor_paymaster::{ISponsorPaymaster, SponsorPaymasterError, SponsorPaymasterEvent};
pub use token_paymaster::{ITokenPaymaster, TokenPaymasterError, TokenPaymasterEvent};

pub const SESSION_KEY_REGISTRY_ADDRESS: Address =
    address!("0x5e551c0000000000000000000000000000000000");
pub const SPONSOR_PAYMASTER_ADDRESS: Address =
    address!("0xfee5000000000000000000000000000000000000");
pub const TOKEN_PAYMASTER_ADDRESS: Address =
    address!("0xfee7000000000000000000000000000000000000");

/// Canonical v0.7 EntryPoint address. The dispatcher is external; this is only
/// the default identity the paymasters fund their gas reserve with.
pub const ENTRY_POINT_ADDRESS: Address = address!("0x0000000071727De22E5E9d8BAf0edAc6f37da032");

/// Longest window a session key grant may cover, in seconds (7 days).
pub const MAX_SESSION_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// Upper bound for the token paymaster surcharge (10%).
pub const MAX_MARKUP_BPS: u16 = 1_000;

/// Basis-point denominator for markup math.
pub const BPS_DENOMINATOR: u64 = 10_000;
