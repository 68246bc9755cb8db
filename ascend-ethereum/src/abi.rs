//! Contract interfaces of the Balancer style vault, the liquidity bootstrapping pool and the
//! ERC20 tokens it holds.
use alloy::core::sol;

// ERC20 subset, see EIP-20: https://eips.ethereum.org/EIPS/eip-20
sol! {
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256 balance);
        function allowance(address owner, address spender) external view returns (uint256 remaining);
        function approve(address spender, uint256 amount) external returns (bool success);
    }
}

sol! {
    interface IVault {
        struct SingleSwap {
            bytes32 poolId;
            uint8 kind;
            address assetIn;
            address assetOut;
            uint256 amount;
            bytes userData;
        }

        struct BatchSwapStep {
            bytes32 poolId;
            uint256 assetInIndex;
            uint256 assetOutIndex;
            uint256 amount;
            bytes userData;
        }

        struct FundManagement {
            address sender;
            bool fromInternalBalance;
            address recipient;
            bool toInternalBalance;
        }

        function getPoolTokens(bytes32 poolId)
            external
            view
            returns (address[] tokens, uint256[] balances, uint256 lastChangeBlock);

        function queryBatchSwap(
            uint8 kind,
            BatchSwapStep[] swaps,
            address[] assets,
            FundManagement funds
        ) external returns (int256[] assetDeltas);

        function swap(
            SingleSwap singleSwap,
            FundManagement funds,
            uint256 limit,
            uint256 deadline
        ) external payable returns (uint256 amountCalculated);
    }
}

sol! {
    interface ILiquidityBootstrappingPool {
        function getVault() external view returns (address);
        function getPoolId() external view returns (bytes32);
        function getPausedState()
            external
            view
            returns (bool paused, uint256 pauseWindowEndTime, uint256 bufferPeriodEndTime);
        function getNormalizedWeights() external view returns (uint256[] weights);
        function getSwapFeePercentage() external view returns (uint256);
    }
}
