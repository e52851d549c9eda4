//! EIP-712 message schemas for every signed authorization.
//!
//! Each schema has its own typehash (derived from the struct definition, so
//! field order is part of the identity) and each authorizes a different thing
//! against a different nonce space:
//!
//! - [`RegisterSessionKey`]: owner-signed registration, registry-level
//!   registration nonce per owner.
//! - [`SessionOperation`]: session-key-signed business call, usage nonce
//!   stored inside the grant.
//! - [`SessionKeyUserOp`]: session-key-signed gas charge against the
//!   base-asset paymaster, that ledger's local nonce.
//! - [`SessionKeyTokenUserOp`]: same for the token paymaster, again with its
//!   own nonce space.

use alloy_sol_types::sol;

sol! {
    /// Authorizes a third party to submit a session key registration on the
    /// owner's behalf. `allowedSelectorsHash` is the keccak256 of the packed
    /// selector list.
    #[derive(Debug, PartialEq, Eq)]
    struct RegisterSessionKey {
        address owner;
        address sessionKey;
        uint64 validAfter;
        uint64 validUntil;
        address allowedContract;
        bytes32 allowedSelectorsHash;
        uint256 spendingLimit;
        uint64 nonce;
        uint256 deadline;
    }

    /// Authorizes one business call through the registry, consuming the
    /// grant's usage nonce and `value` of its spending limit.
    #[derive(Debug, PartialEq, Eq)]
    struct SessionOperation {
        address owner;
        address sessionKey;
        address target;
        bytes4 selector;
        bytes32 callDigest;
        uint256 value;
        uint64 nonce;
        uint256 deadline;
    }

    /// Authorizes the base-asset paymaster to charge a sponsor for one
    /// operation identified by `opHash`.
    #[derive(Debug, PartialEq, Eq)]
    struct SessionKeyUserOp {
        address owner;
        address sessionKey;
        bytes32 opHash;
        uint64 nonce;
        uint256 deadline;
    }

    /// Authorizes the token paymaster to charge a sponsor in `token` units
    /// for one operation identified by `opHash`.
    #[derive(Debug, PartialEq, Eq)]
    struct SessionKeyTokenUserOp {
        address owner;
        address sessionKey;
        address token;
        bytes32 opHash;
        uint64 nonce;
        uint256 deadline;
    }
}
