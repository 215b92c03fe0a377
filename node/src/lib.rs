//! Tally node: runs the deposit engine as a service.
//!
//! The node is the coordinator that:
//! - Opens the LMDB claim store and ledger
//! - Builds the chain client and the deposit processor
//! - Reconciles verified-but-uncredited claims at startup
//! - Runs the background sweep over pending claims
//! - Serves the HTTP API and Prometheus metrics

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod shutdown;
pub mod sweeper;
pub mod tracing_spans;

pub use config::NodeConfig;
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use metrics::DepositMetrics;
pub use node::TallyNode;
pub use shutdown::ShutdownController;
pub use sweeper::spawn_sweeper;
