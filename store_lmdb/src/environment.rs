//! LMDB environment setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use crate::migration::Migrator;
use crate::{LmdbClaimStore, LmdbError, LmdbLedgerStore};

/// Default memory map size: 1 GiB.
pub const DEFAULT_MAP_SIZE: usize = 1 << 30;

const MAX_DBS: u32 = 8;

/// Wraps the LMDB environment and all database handles.
pub struct LmdbEnvironment {
    path: PathBuf,
    pub(crate) env: Arc<Env>,
    pub(crate) claims_db: Database<Bytes, Bytes>,
    pub(crate) tx_index_db: Database<Bytes, Bytes>,
    pub(crate) status_index_db: Database<Bytes, Bytes>,
    pub(crate) user_claims_db: Database<Bytes, Bytes>,
    pub(crate) credits_db: Database<Bytes, Bytes>,
    pub(crate) balances_db: Database<Bytes, Bytes>,
    pub(crate) meta_db: Database<Bytes, Bytes>,
}

impl LmdbEnvironment {
    /// Open or create an LMDB environment at the given directory.
    ///
    /// Creates missing databases and brings the schema up to date.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)?;

        // SAFETY: the environment is opened once per process and the data
        // file is not modified outside of LMDB while it is mapped.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(MAX_DBS)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let claims_db = env.create_database(&mut wtxn, Some("claims"))?;
        let tx_index_db = env.create_database(&mut wtxn, Some("tx_index"))?;
        let status_index_db = env.create_database(&mut wtxn, Some("status_index"))?;
        let user_claims_db = env.create_database(&mut wtxn, Some("user_claims"))?;
        let credits_db = env.create_database(&mut wtxn, Some("credits"))?;
        let balances_db = env.create_database(&mut wtxn, Some("balances"))?;
        let meta_db = env.create_database(&mut wtxn, Some("meta"))?;
        wtxn.commit()?;

        let environment = Self {
            path: path.to_path_buf(),
            env: Arc::new(env),
            claims_db,
            tx_index_db,
            status_index_db,
            user_claims_db,
            credits_db,
            balances_db,
            meta_db,
        };
        Migrator::run(&environment)?;

        tracing::info!(path = %path.display(), "opened LMDB environment");
        Ok(environment)
    }

    /// Open with the default map size.
    pub fn open_default(path: &Path) -> Result<Self, LmdbError> {
        Self::open(path, DEFAULT_MAP_SIZE)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    /// Flush the memory map to disk.
    pub fn force_sync(&self) -> Result<(), LmdbError> {
        self.env.force_sync()?;
        Ok(())
    }

    pub fn claim_store(&self) -> LmdbClaimStore {
        LmdbClaimStore {
            env: Arc::clone(&self.env),
            claims_db: self.claims_db,
            tx_index_db: self.tx_index_db,
            status_index_db: self.status_index_db,
            user_claims_db: self.user_claims_db,
            meta_db: self.meta_db,
        }
    }

    pub fn ledger_store(&self) -> LmdbLedgerStore {
        LmdbLedgerStore {
            env: Arc::clone(&self.env),
            credits_db: self.credits_db,
            balances_db: self.balances_db,
        }
    }
}
