//! CLI argument definitions using clap derive macros.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser, Subcommand, ValueHint};
use palisade_common_config::{ConfigLoader, Environment, PalisadeConfig};
use palisade_common_log::{LogConfig, LogLevel};

use crate::commands::{ConfigCommand, LocksCommand};
use crate::error::CliError;
use crate::output::OutputFormat;

/// Palisade - access control and publish authorization
///
/// Inspect the configuration and the persisted lock table of an installation.
#[derive(Debug, Parser)]
#[command(name = "palisade", author, version, about, long_about = None, propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Installation directory holding `.palisade/config.yaml`
    #[arg(
        short = 'C',
        long,
        global = true,
        env = "PALISADE_CONFIG_DIR",
        value_hint = ValueHint::DirPath
    )]
    pub config_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show or validate the configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Inspect or clear the persisted lock table
    #[command(subcommand)]
    Locks(LocksCommand),
}

/// Everything a command needs besides its own arguments.
#[derive(Debug)]
pub struct CommandContext {
    pub config: PalisadeConfig,
    pub base_dir: PathBuf,
    pub format: OutputFormat,
}

impl CommandContext {
    /// The lock store path, relative paths taken from the installation directory.
    pub fn lock_store_path(&self) -> PathBuf {
        let configured = Path::new(&self.config.locks.store_path);
        if configured.is_absolute() {
            configured.to_path_buf()
        } else {
            self.base_dir.join(configured)
        }
    }
}

impl Cli {
    pub fn base_dir(&self) -> PathBuf {
        self.config_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Loads `.env` files and the configuration, then sets up logging.
    pub fn run(self) -> Result<(), CliError> {
        Environment::init()?;
        let ctx = self.context()?;
        palisade_common_log::init(self.log_config(&ctx.config))?;
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        self.execute(&ctx, &mut out)
    }

    pub fn context(&self) -> Result<CommandContext, CliError> {
        let base_dir = self.base_dir();
        let loader = ConfigLoader::new(&base_dir);
        let mut config = loader.load()?;
        loader.apply_env_overrides(&mut config)?;
        Ok(CommandContext {
            config,
            base_dir,
            format: self.format,
        })
    }

    fn log_config(&self, config: &PalisadeConfig) -> LogConfig {
        let mut log = LogConfig::from_settings(&config.logging.level, &config.logging.format).with_env_overrides();
        log.level = match (self.quiet, self.verbose) {
            (true, _) => LogLevel::Error,
            (false, 0) => log.level,
            (false, 1) => LogLevel::Info,
            (false, 2) => LogLevel::Debug,
            (false, _) => LogLevel::Trace,
        };
        log
    }

    pub fn execute(&self, ctx: &CommandContext, out: &mut dyn Write) -> Result<(), CliError> {
        match &self.command {
            Command::Config(cmd) => cmd.execute(ctx, out),
            Command::Locks(cmd) => cmd.execute(ctx, out),
        }
    }
}
