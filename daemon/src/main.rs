//! Tally daemon: entry point for running the deposit engine.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use rust_decimal::Decimal;
use tally_node::tracing_spans::{reconcile_span, verify_span};
use tally_node::{init_logging, LogFormat, NodeConfig, TallyNode};
use tally_types::TxHash;
use tracing::Instrument;

#[derive(Parser)]
#[command(name = "tally-daemon", about = "On-chain deposit verification and crediting")]
struct Cli {
    /// Path to a TOML configuration file. File settings are the base; CLI
    /// flags and env vars override them.
    #[arg(long, env = "TALLY_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory for the LMDB environment.
    #[arg(long, env = "TALLY_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Chain node JSON-RPC endpoint.
    #[arg(long, env = "TALLY_RPC_URL")]
    rpc_url: Option<String>,

    /// Platform deposit address (0x-prefixed).
    #[arg(long, env = "TALLY_DEPOSIT_ADDRESS")]
    deposit_address: Option<String>,

    /// Token contract address (0x-prefixed).
    #[arg(long, env = "TALLY_TOKEN_CONTRACT")]
    token_contract: Option<String>,

    /// Confirmations required before a deposit is credited.
    #[arg(long, env = "TALLY_REQUIRED_CONFIRMATIONS")]
    confirmations: Option<u64>,

    /// HTTP API port.
    #[arg(long, env = "TALLY_API_PORT")]
    api_port: Option<u16>,

    /// Disable the HTTP API.
    #[arg(long, env = "TALLY_DISABLE_API")]
    disable_api: bool,

    /// Enable Prometheus metrics at `/metrics`.
    #[arg(long, env = "TALLY_ENABLE_METRICS")]
    metrics: bool,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "TALLY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "TALLY_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run the node: sweeper and API until SIGINT/SIGTERM.
    Run,
    /// Verify one transaction against the deposit address without storing anything.
    Check {
        #[arg(long)]
        tx: TxHash,
        #[arg(long)]
        amount: Decimal,
    },
    /// Credit claims left in `Verified` and exit.
    Reconcile,
    /// Cross-check claims, indexes and ledger entries and exit.
    CheckStore,
    /// Print the effective configuration as TOML.
    Config,
}

impl Cli {
    fn node_config(&self) -> anyhow::Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let path = path.to_string_lossy();
                NodeConfig::from_toml_file(&path)
                    .with_context(|| format!("loading config from {path}"))?
            }
            None => NodeConfig::default(),
        };

        if let Some(data_dir) = &self.data_dir {
            config.data_dir = data_dir.clone();
        }
        if let Some(rpc_url) = &self.rpc_url {
            config.deposits.rpc_url = rpc_url.clone();
        }
        if let Some(address) = &self.deposit_address {
            config.deposits.deposit_address =
                address.parse().context("parsing --deposit-address")?;
        }
        if let Some(address) = &self.token_contract {
            config.deposits.token_contract =
                address.parse().context("parsing --token-contract")?;
        }
        if let Some(confirmations) = self.confirmations {
            config.deposits.required_confirmations = confirmations;
        }
        if let Some(port) = self.api_port {
            config.api_port = port;
        }
        if self.disable_api {
            config.enable_api = false;
        }
        config.enable_metrics |= self.metrics;
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.log_format = format.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.node_config()?;

    if let Command::Config = cli.command {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let format: LogFormat = config.log_format.parse()?;
    init_logging(format, &config.log_level)?;

    match cli.command {
        Command::Run => {
            tracing::info!(
                "Starting Tally node (API:{}, metrics:{})",
                if config.enable_api {
                    config.api_port.to_string()
                } else {
                    "off".into()
                },
                if config.enable_metrics { "on" } else { "off" },
            );
            let mut node = TallyNode::new(config)?;
            node.run().await?;
        }
        Command::Check { tx, amount } => {
            let node = TallyNode::new(config)?;
            let verdict = node
                .processor()
                .check_transaction(tx, amount)
                .instrument(verify_span(&tx.to_string()))
                .await;
            println!("{}", serde_json::to_string_pretty(&verdict)?);
        }
        Command::Reconcile => {
            let node = TallyNode::new(config)?;
            let report = node
                .processor()
                .reconcile()
                .instrument(reconcile_span())
                .await?;
            println!(
                "verified: {}, credited: {}, failed: {}, errors: {}",
                report.due, report.credited, report.failed, report.errors
            );
            if report.errors > 0 || report.failed > 0 {
                bail!("reconciliation left claims unresolved");
            }
        }
        Command::CheckStore => {
            let node = TallyNode::new(config)?;
            let report = node.check_integrity()?;
            println!(
                "claims: {}, ledger entries: {}, awaiting credit: {}, problems: {}",
                report.claims_checked,
                report.credits_checked,
                report.awaiting_credit.len(),
                report.errors.len()
            );
            for error in &report.errors {
                println!("  {error}");
            }
            if !report.is_healthy() {
                bail!("store integrity check failed");
            }
        }
        Command::Config => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_defaults() {
        let cli = Cli::parse_from([
            "tally-daemon",
            "--deposit-address",
            "0x000000000000000000000000000000000000dEaD",
            "--confirmations",
            "20",
            "--disable-api",
            "--metrics",
            "run",
        ]);
        let config = cli.node_config().unwrap();
        assert_eq!(config.deposits.required_confirmations, 20);
        assert!(!config.enable_api);
        assert!(config.enable_metrics);
        assert_eq!(
            config.deposits.deposit_address.to_string(),
            "0x000000000000000000000000000000000000dead"
        );
    }

    #[test]
    fn check_command_parses_hash_and_amount() {
        let hash = format!("0x{}", "ab".repeat(32));
        let cli = Cli::parse_from(["tally-daemon", "check", "--tx", &hash, "--amount", "100.5"]);
        match cli.command {
            Command::Check { tx, amount } => {
                assert_eq!(tx.to_string(), hash);
                assert_eq!(amount.to_string(), "100.5");
            }
            _ => panic!("expected check"),
        }
    }

    #[test]
    fn bad_address_is_reported() {
        let cli = Cli::parse_from(["tally-daemon", "--deposit-address", "nope", "run"]);
        assert!(cli.node_config().is_err());
    }
}
