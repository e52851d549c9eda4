pub use ISessionKeyRegistry::{
    ISessionKeyRegistryErrors as SessionKeyRegistryError,
    ISessionKeyRegistryEvents as SessionKeyRegistryEvent,
};

use alloy_sol_types::sol;

sol! {
    /// Session key registry for time- and scope-limited delegated signing.
    ///
    /// An owner grants an ephemeral key the right to call one contract,
    /// restricted to a selector set, a spending limit, and a validity window
    /// of at most seven days. Grants are consumed through signed
    /// `SessionOperation` messages and can be revoked at any time by the
    /// owner.
    #[derive(Debug, PartialEq, Eq)]
    interface ISessionKeyRegistry {
        /// Stored grant for one (owner, sessionKey) pair.
        struct SessionKeyData {
            address sessionKey;
            uint64 validAfter;
            uint64 validUntil;
            address allowedContract;
            bytes4[] allowedSelectors;
            uint256 spendingLimit;
            uint256 spent;
            uint64 nonce;
        }

        /// Register a session key for the caller's account.
        function register(
            address sessionKey,
            uint64 validAfter,
            uint64 validUntil,
            address allowedContract,
            bytes4[] calldata allowedSelectors,
            uint256 spendingLimit
        ) external;

        /// Register a session key on behalf of `owner`, authorized by an
        /// owner-signed `RegisterSessionKey` message.
        function registerWithSignature(
            address owner,
            address sessionKey,
            uint64 validAfter,
            uint64 validUntil,
            address allowedContract,
            bytes4[] calldata allowedSelectors,
            uint256 spendingLimit,
            uint256 deadline,
            bytes calldata signature
        ) external;

        /// Delete the caller's grant for `sessionKey`.
        function revoke(address sessionKey) external;

        /// Read-only scope check. Returns false on any failure, never reverts.
        function validate(
            address owner,
            address sessionKey,
            address target,
            bytes4 selector,
            uint256 value
        ) external view returns (bool);

        /// Consume one use of the grant: verifies a `SessionOperation`
        /// signature from the session key over the grant's current usage
        /// nonce, then bumps the nonce and adds `value` to the spent total.
        function validateAndUse(
            address owner,
            address sessionKey,
            address target,
            bytes4 selector,
            bytes32 callDigest,
            uint256 value,
            uint256 deadline,
            bytes calldata signature
        ) external;

        /// Full grant data; zeroed if no grant exists.
        function getSessionKey(address owner, address sessionKey)
            external view returns (SessionKeyData memory);

        /// Current registration nonce for owner-signed registrations.
        function registrationNonce(address owner) external view returns (uint64);

        event SessionKeyRegistered(
            address indexed owner,
            address indexed sessionKey,
            uint64 validAfter,
            uint64 validUntil,
            address allowedContract,
            uint256 spendingLimit
        );
        event SessionKeyRevoked(address indexed owner, address indexed sessionKey);
        event SessionKeyUsed(
            address indexed owner,
            address indexed sessionKey,
            address indexed target,
            bytes4 selector,
            uint256 value,
            uint64 nonce
        );

        error ZeroAddress();
        error InvalidTimeRange();
        error SessionKeyAlreadyExists();
        error InvalidSessionKey();
        error SessionKeyNotActive();
        error SessionKeyExpired();
        error UnauthorizedContract();
        error UnauthorizedSelector();
        error SpendingLimitExceeded();
        error SignatureExpired();
        error InvalidSignature();
    }
}

