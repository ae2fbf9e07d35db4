//! `orc`-backed store for registers.
//!
//! Streaming commands go over one `batch-edit` process per build pass, shared
//! by every register written in that pass; `init` and `dump` run as separate
//! blocking invocations.

mod channel;
mod config;
mod process;
mod protocol;

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ExitStatus};
use std::sync::Mutex;

use register_core::{Region, Store};
use thiserror::Error;

pub use channel::CommandChannel;
pub use config::{ConfigError, OrcConfig, config_path, load_config, resolve_config};
pub use process::{dump_register, init_register};
pub use protocol::{StoreCommand, quote};

#[derive(Debug, Error)]
pub enum OrcError {
    #[error("failed to start {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` failed: {status}")]
    Failed { command: String, status: ExitStatus },
    #[error("store channel is closed")]
    Closed,
    #[error("batch process has no stdin")]
    MissingStdin,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A store reached through the `orc` command-line program.
///
/// The channel writer is normally the stdin of a `batch-edit` process; any
/// other writer can be used with [`OrcStore::with_writer`], in which case no
/// batch process is managed.
pub struct OrcStore<W: Write = BufWriter<ChildStdin>> {
    config: OrcConfig,
    channel: CommandChannel<W>,
    batch: Mutex<Option<Child>>,
}

impl OrcStore {
    /// Spawns the `batch-edit` process and opens the command channel to it.
    pub fn open(config: OrcConfig) -> Result<Self, OrcError> {
        let mut child = process::spawn_batch(&config)?;
        let stdin = child.stdin.take().ok_or(OrcError::MissingStdin)?;
        Ok(OrcStore {
            config,
            channel: CommandChannel::new(BufWriter::new(stdin)),
            batch: Mutex::new(Some(child)),
        })
    }
}

impl<W: Write> OrcStore<W> {
    pub fn with_writer(config: OrcConfig, writer: W) -> Self {
        OrcStore {
            config,
            channel: CommandChannel::new(writer),
            batch: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &OrcConfig {
        &self.config
    }

    /// Closes the channel, signalling end of stream, and waits for the batch
    /// process to exit.
    pub fn close(self) -> Result<(), OrcError> {
        drop(self.channel.close()?);
        match self.batch.into_inner().unwrap() {
            Some(child) => process::wait_batch(&self.config, child),
            None => Ok(()),
        }
    }
}

impl<W: Write> Store for OrcStore<W> {
    type Error = OrcError;

    fn init(&self, register: &str) -> Result<(), Self::Error> {
        init_register(&self.config, register)
    }

    fn ensure_entry(
        &self,
        register: &str,
        region: Region,
        key: &str,
        items: &[&str],
    ) -> Result<(), Self::Error> {
        self.channel.send(&StoreCommand::EnsureEntry {
            register,
            region,
            key,
            items,
        })
    }

    fn ensure_items(
        &self,
        register: &str,
        region: Region,
        key: &str,
        items: &[&str],
    ) -> Result<(), Self::Error> {
        self.channel.send(&StoreCommand::EnsureItems {
            register,
            region,
            key,
            items,
        })
    }

    fn delete_untouched(&self, register: &str, region: Region) -> Result<(), Self::Error> {
        self.channel.send(&StoreCommand::DeleteUntouched { register, region })
    }

    fn dump(&self, register: &str, output: &Path) -> Result<(), Self::Error> {
        dump_register(&self.config, register, output)
    }
}
