//! HTTP and JSON-RPC provider implementations

pub mod coinmarketcap;
pub mod ethplorer;
pub mod node_rpc;

pub use coinmarketcap::CoinMarketCapProvider;
pub use ethplorer::EthplorerProvider;
pub use node_rpc::NodeRpcProvider;
