//! Solidity types for the block-production helper contract

use alloy::sol;

sol! {
    /// Counter whose every call increments storage slot 0.
    ///
    /// The runtime ignores calldata, so `increment()` and any other call
    /// mutate state and, when mined individually, occupy a block each.
    #[sol(bytecode = "600a600c600039600a6000f360005460010160005500")]
    contract Counter {
        function increment() external;
    }
}
