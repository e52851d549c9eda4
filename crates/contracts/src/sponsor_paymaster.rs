pub use ISponsorPaymaster::{
    ISponsorPaymasterErrors as SponsorPaymasterError,
    ISponsorPaymasterEvents as SponsorPaymasterEvent,
};

use alloy_sol_types::sol;

sol! {
    /// Base-asset sponsorship ledger.
    ///
    /// Sponsors deposit the base asset and let spenders draw it down for gas,
    /// either directly (authorization payload mode 0 names the sponsor) or
    /// through a session key (mode 1 carries a `SessionKeyUserOp` signature).
    /// Charging is pessimistic: validate debits the full cost ceiling, and
    /// settlement refunds whatever the operation did not consume.
    #[derive(Debug, PartialEq, Eq)]
    interface ISponsorPaymaster {
        /// Credit `amount` to `account`'s sponsor balance.
        function deposit(address account, uint256 amount) external;

        /// Withdraw from the caller's sponsor balance.
        function withdraw(uint256 amount) external;

        /// Withdraw the caller's entire sponsor balance.
        function withdrawAll() external;

        function balanceOf(address account) external view returns (uint256);

        /// Overwrite the allowance for `spender` with a bounded amount.
        function setAllowance(address spender, uint256 amount) external;

        /// Grant `spender` an unlimited allowance. Unlimited allowances are
        /// never decremented by charges.
        function setUnlimitedAllowance(address spender) external;

        function increaseAllowance(address spender, uint256 amount) external;

        /// Decrease clamps at zero instead of underflowing.
        function decreaseAllowance(address spender, uint256 amount) external;

        function allowance(address sponsor, address spender)
            external view returns (uint256 amount, bool unlimited);

        /// Ledger-local charge-authorization nonce for (owner, sessionKey),
        /// independent of the registry's usage nonce.
        function chargeNonce(address owner, address sessionKey)
            external view returns (uint64);

        event Deposited(address indexed sponsor, uint256 amount);
        event Withdrawn(address indexed sponsor, uint256 amount);
        event AllowanceUpdated(
            address indexed sponsor,
            address indexed spender,
            uint256 amount,
            bool unlimited
        );
        event GasPaid(
            bytes32 indexed opHash,
            address indexed sponsor,
            address indexed spender,
            uint256 actualCost
        );
        event SessionKeyGasPaid(
            bytes32 indexed opHash,
            address indexed owner,
            address indexed sessionKey,
            address sponsor,
            uint256 actualCost
        );

        error ZeroAddress();
        error ZeroAmount();
        error InsufficientBalance();
        error InsufficientAllowance();
        error InvalidPaymasterData();
        error InvalidSessionKey();
        error SignatureExpired();
        error InvalidSignature();
        error Unauthorized();
    }
}

