pub use ITokenPaymaster::{
    ITokenPaymasterErrors as TokenPaymasterError, ITokenPaymasterEvents as TokenPaymasterEvent,
};

use alloy_sol_types::sol;

sol! {
    /// Token-denominated sponsorship ledger.
    ///
    /// Same charge-then-refund lifecycle as the base-asset ledger, but
    /// balances are kept per (account, token) and the cost ceiling is
    /// converted through a price oracle plus a bounded markup. Settlement
    /// reprices the actual cost at the settlement-time rate.
    #[derive(Debug, PartialEq, Eq)]
    interface ITokenPaymaster {
        function deposit(address token, address account, uint256 amount) external;
        function withdraw(address token, uint256 amount) external;
        function balanceOf(address account, address token) external view returns (uint256);

        function setAllowance(address spender, address token, uint256 amount) external;
        function setUnlimitedAllowance(address spender, address token) external;
        function allowance(address sponsor, address spender, address token)
            external view returns (uint256 amount, bool unlimited);

        /// Ledger-local charge-authorization nonce for (owner, sessionKey),
        /// separate from both the base-asset ledger's nonce space and the
        /// registry's usage nonce.
        function chargeNonce(address owner, address sessionKey)
            external view returns (uint64);

        // Administration
        function setTokenSupport(address token, bool supported) external;
        function setOracle(address oracle) external;
        function setMarkup(uint16 markupBps) external;
        function isTokenSupported(address token) external view returns (bool);
        function markupBps() external view returns (uint16);

        event TokenDeposited(address indexed sponsor, address indexed token, uint256 amount);
        event TokenWithdrawn(address indexed sponsor, address indexed token, uint256 amount);
        event TokenAllowanceUpdated(
            address indexed sponsor,
            address indexed spender,
            address indexed token,
            uint256 amount,
            bool unlimited
        );
        event TokenGasPaid(
            bytes32 indexed opHash,
            address indexed payer,
            address indexed token,
            address spender,
            uint256 tokenAmount,
            uint256 actualCost
        );
        event SessionKeyTokenGasPaid(
            bytes32 indexed opHash,
            address indexed owner,
            address indexed sessionKey,
            address token,
            uint256 tokenAmount,
            uint256 actualCost
        );
        event TokenSupportUpdated(address indexed token, bool supported);
        event OracleUpdated(address indexed oracle);
        event MarkupUpdated(uint16 markupBps);

        error TokenNotSupported();
        error PriceOracleNotSet();
        error TokenCostTooHigh();
        error InsufficientTokenBalance();
        error InsufficientTokenAllowance();
        error InvalidPaymasterData();
        error InvalidSessionKey();
        error SignatureExpired();
        error InvalidSignature();
        error ZeroAddress();
        error ZeroAmount();
        error InvalidMarkup();
        error Unauthorized();
    }
}

