//! Config command implementation.

use std::io::Write;

use clap::Subcommand;
use palisade_common_config::ConfigLoader;

use crate::cli::CommandContext;
use crate::error::CliError;
use crate::output::{write_structured, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration, environment overrides applied
    Show,
    /// Validate the configuration file
    Check,
    /// Print the path of the configuration file
    Path,
}

impl ConfigCommand {
    pub fn execute(&self, ctx: &CommandContext, out: &mut dyn Write) -> Result<(), CliError> {
        let loader = ConfigLoader::new(&ctx.base_dir);
        match self {
            Self::Show => {
                let format = match ctx.format {
                    OutputFormat::Text => OutputFormat::Yaml,
                    other => other,
                };
                write_structured(out, format, &ctx.config)?;
            }
            Self::Check => {
                loader.validate(&ctx.config)?;
                if ctx.config.security.permission_cache_size < 100 {
                    tracing::warn!(
                        size = ctx.config.security.permission_cache_size,
                        "Small permission cache, expect frequent evictions"
                    );
                }
                writeln!(out, "Configuration OK ({})", loader.config_path().display())?;
            }
            Self::Path => writeln!(out, "{}", loader.config_path().display())?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palisade_common_config::PalisadeConfig;

    fn ctx(format: OutputFormat) -> CommandContext {
        CommandContext {
            config: PalisadeConfig::default(),
            base_dir: std::path::PathBuf::from("/srv/palisade"),
            format,
        }
    }

    fn run(cmd: ConfigCommand, ctx: &CommandContext) -> String {
        let mut out = Vec::new();
        cmd.execute(ctx, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_show_defaults_to_yaml() {
        let text = run(ConfigCommand::Show, &ctx(OutputFormat::Text));
        let parsed: PalisadeConfig = serde_yaml::from_str(&text).unwrap();
        assert_eq!(parsed, PalisadeConfig::default());
    }

    #[test]
    fn test_show_json() {
        let text = run(ConfigCommand::Show, &ctx(OutputFormat::Json));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["security"]["permission_cache_size"], 1000);
    }

    #[test]
    fn test_check_rejects_invalid_values() {
        let mut ctx = ctx(OutputFormat::Text);
        assert!(run(ConfigCommand::Check, &ctx).starts_with("Configuration OK"));
        ctx.config.logging.level = "loud".to_string();
        let mut out = Vec::new();
        assert!(matches!(
            ConfigCommand::Check.execute(&ctx, &mut out),
            Err(CliError::Config(_))
        ));
    }

    #[test]
    fn test_path_points_into_config_dir() {
        let text = run(ConfigCommand::Path, &ctx(OutputFormat::Text));
        assert!(text.trim_end().ends_with(".palisade/config.yaml"));
    }
}
