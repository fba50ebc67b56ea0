//! Command-line interface for the `codewiki-mcp` binary

use std::path::PathBuf;

use clap::Parser;
use codewiki_core::Config;

use crate::error::McpResult;

/// CodeWiki MCP server
#[derive(Parser, Clone, Debug, Default)]
#[command(name = "codewiki-mcp")]
#[command(version)]
#[command(about = "MCP server for Google CodeWiki repository documentation", long_about = None)]
pub struct Cli {
    /// Debug-level logging. Also via `CODEWIKI_VERBOSE`.
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Path to a config.toml (overrides autodiscovery)
    #[arg(long, value_name = "FILE", env = "CODEWIKI_CONFIG")]
    pub config: Option<PathBuf>,

    /// CodeWiki base URL
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,
}

impl Cli {
    /// Resolve configuration: file, then environment, then flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file is unreadable or the result fails
    /// validation.
    pub fn resolve_config(&self) -> McpResult<Config> {
        let mut config = match &self.config {
            Some(path) => {
                let mut config = Config::load_from(path)?;
                config.apply_env(|key| std::env::var(key).ok());
                config
            },
            None => Config::load()?,
        };
        if let Some(base_url) = &self.base_url {
            config.base_url.clone_from(base_url);
        }
        config.verbose |= self.verbose;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_flags_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "base_url = \"https://from-file.example\"\n\n[retry]\nmax_attempts = 4").unwrap();

        let cli = Cli::try_parse_from([
            "codewiki-mcp",
            "--config",
            file.path().to_str().unwrap(),
            "--base-url",
            "https://from-flag.example",
            "-v",
        ])
        .unwrap();
        let config = cli.resolve_config().unwrap();

        assert_eq!(config.base_url, "https://from-flag.example");
        assert_eq!(config.retry.max_attempts, 4);
        assert!(config.verbose);
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let cli = Cli {
            config: Some(file.path().to_path_buf()),
            base_url: Some("ftp://nope".into()),
            verbose: false,
        };
        assert!(cli.resolve_config().is_err());
    }
}
