#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

pub mod abi;
pub mod lbp;
pub mod rpc;

pub use lbp::{LbpClientConfig, LbpPoolClient};
pub use rpc::{errors::RPCError, EthereumRpcClient};
