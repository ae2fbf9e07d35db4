//! One-shot, blocking invocations of the store program.

use std::fs::File;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};

use tracing::info;

use crate::OrcError;
use crate::config::OrcConfig;

fn command(config: &OrcConfig, args: &[&str]) -> Command {
    let mut command = Command::new(&config.program);
    command.arg("-S").arg(&config.store).args(args);
    command
}

fn describe(config: &OrcConfig, args: &[&str]) -> String {
    format!(
        "{} -S {} {}",
        config.program.display(),
        config.store.display(),
        args.join(" ")
    )
}

fn check(description: String, status: ExitStatus) -> Result<(), OrcError> {
    if status.success() {
        Ok(())
    } else {
        Err(OrcError::Failed {
            command: description,
            status,
        })
    }
}

fn spawn_error(config: &OrcConfig) -> impl FnOnce(std::io::Error) -> OrcError + '_ {
    move |source| OrcError::Spawn {
        program: config.program.clone(),
        source,
    }
}

/// Runs `<program> -S <store> init <register>` and waits for it to exit.
pub fn init_register(config: &OrcConfig, register: &str) -> Result<(), OrcError> {
    let args = ["init", register];
    info!(command = %describe(config, &args), "initialising register");
    let status = command(config, &args)
        .stdin(Stdio::null())
        .status()
        .map_err(spawn_error(config))?;
    check(describe(config, &args), status)
}

/// Runs `<program> -S <store> dump <register>` with stdout redirected to `output`.
pub fn dump_register(config: &OrcConfig, register: &str, output: &Path) -> Result<(), OrcError> {
    let args = ["dump", register];
    info!(command = %describe(config, &args), output = %output.display(), "dumping register");
    let file = File::create(output)?;
    let status = command(config, &args)
        .stdin(Stdio::null())
        .stdout(file)
        .status()
        .map_err(spawn_error(config))?;
    check(describe(config, &args), status)
}

/// Starts `<program> -S <store> batch-edit` with a piped stdin.
pub(crate) fn spawn_batch(config: &OrcConfig) -> Result<Child, OrcError> {
    let args = ["batch-edit"];
    info!(command = %describe(config, &args), "opening store channel");
    command(config, &args)
        .stdin(Stdio::piped())
        .spawn()
        .map_err(spawn_error(config))
}

/// Waits for the batch process and checks its exit status.
pub(crate) fn wait_batch(config: &OrcConfig, mut child: Child) -> Result<(), OrcError> {
    let status = child.wait()?;
    check(describe(config, &["batch-edit"]), status)
}
