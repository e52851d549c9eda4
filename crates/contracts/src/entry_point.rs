//! Bindings for the external dispatcher boundary.
//!
//! The dispatcher itself is not implemented here; these interfaces pin down
//! the surface the paymasters consume: the dispatcher-held gas reserve
//! (deposit/stake) and the generic account `execute` wrapper the envelope
//! unwrapper understands.

use alloy_sol_types::sol;

sol! {
    /// Dispatcher-held deposit and stake accounting for a paymaster's own
    /// gas reserve. Orthogonal to the sponsor balances inside the ledgers.
    #[derive(Debug, PartialEq, Eq)]
    interface IEntryPoint {
        struct DepositInfo {
            uint256 deposit;
            uint256 stake;
            uint32 unstakeDelaySec;
            uint48 withdrawTime;
        }

        function balanceOf(address account) external view returns (uint256);
        function depositTo(address account) external payable;
        function withdrawTo(address payable withdrawAddress, uint256 withdrawAmount) external;
        function addStake(uint32 unstakeDelaySec) external payable;
        function unlockStake() external;
        function withdrawStake(address payable withdrawAddress) external;
        function getDepositInfo(address account) external view returns (DepositInfo memory info);
    }

    /// Generic single-call wrapper exposed by smart accounts. The envelope
    /// unwrapper peels exactly one level of this to find the effective
    /// target and selector for session-key scoping.
    #[derive(Debug, PartialEq, Eq)]
    interface IAccountExecute {
        function execute(address target, uint256 value, bytes calldata data) external;
    }
}
