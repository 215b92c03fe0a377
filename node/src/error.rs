use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("deposit error: {0}")]
    Deposit(#[from] tally_deposits::DepositError),

    #[error("store error: {0}")]
    Store(#[from] tally_store::StoreError),

    #[error("LMDB error: {0}")]
    Lmdb(#[from] tally_store_lmdb::LmdbError),

    #[error("chain client error: {0}")]
    Chain(#[from] tally_chain::ChainError),

    #[error("config error: {0}")]
    Config(String),

    #[error("logging error: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("API server error: {0}")]
    Rpc(#[from] tally_rpc::RpcError),

    #[error("store integrity check failed: {0}")]
    Integrity(String),
}
