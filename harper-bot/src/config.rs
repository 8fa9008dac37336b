//! Bot configuration.
//!
//! Settings come from three layers, highest priority first: command-line
//! flags, environment variables (through clap's `env`), and an optional TOML
//! file passed with `--config`. The file is where secrets and lists usually
//! live:
//!
//! ```toml
//! server = "irc.freeq.at:6697"
//! nick = "harper"
//! channels = ["#homework"]
//! owners = ["guhbean"]
//! wolfram_id = "XXXXXX-XXXXXXXXXX"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

pub const DEFAULT_SERVER: &str = "irc.freeq.at:6667";
pub const DEFAULT_NICK: &str = "harper";
pub const DEFAULT_CHANNEL: &str = "#harper";
pub const DEFAULT_PREFIX: &str = ".";
/// Sampling step used for plots unless configured otherwise.
pub const DEFAULT_PLOT_STEP: f64 = 0.0001;

#[derive(Parser, Debug, Default)]
#[command(name = "harper", version, about = "H.A.R.P.E.R., Homework Assistant Robot Personal Experimental Resource")]
pub struct Args {
    /// TOML configuration file
    #[arg(long, env = "HARPER_CONFIG")]
    pub config: Option<PathBuf>,

    /// IRC server address (host:port)
    #[arg(long, env = "HARPER_SERVER")]
    pub server: Option<String>,

    /// Bot nick
    #[arg(long, env = "HARPER_NICK")]
    pub nick: Option<String>,

    /// Channel to join (repeatable)
    #[arg(long = "channel")]
    pub channels: Vec<String>,

    /// Nick allowed to run owner-only commands (repeatable)
    #[arg(long = "owner")]
    pub owners: Vec<String>,

    /// Use TLS
    #[arg(long)]
    pub tls: bool,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub tls_insecure: bool,

    /// SQLite database path
    #[arg(long, env = "HARPER_DB")]
    pub db: Option<PathBuf>,

    /// Directory the quadratic plot is written to
    #[arg(long)]
    pub images_dir: Option<PathBuf>,

    /// Directory downloaded homework is saved to
    #[arg(long)]
    pub homework_dir: Option<PathBuf>,

    /// Public URL under which `images_dir` is served, if any
    #[arg(long)]
    pub media_url: Option<String>,

    /// Wolfram|Alpha app id
    #[arg(long, env = "WOLFRAM_APP_ID")]
    pub wolfram_id: Option<String>,

    /// Prefix used where no custom prefix is set
    #[arg(long)]
    pub prefix: Option<String>,

    /// Sampling step for quadratic plots
    #[arg(long)]
    pub plot_step: Option<f64>,
}

/// On-disk configuration. Every field is optional.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub server: Option<String>,
    pub nick: Option<String>,
    pub channels: Option<Vec<String>>,
    pub owners: Option<Vec<String>>,
    pub tls: Option<bool>,
    pub tls_insecure: Option<bool>,
    pub db: Option<PathBuf>,
    pub images_dir: Option<PathBuf>,
    pub homework_dir: Option<PathBuf>,
    pub media_url: Option<String>,
    pub wolfram_id: Option<String>,
    pub prefix: Option<String>,
    pub plot_step: Option<f64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }
}

/// Resolved settings the bot runs with.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: String,
    pub nick: String,
    pub channels: Vec<String>,
    pub owners: Vec<String>,
    pub tls: bool,
    pub tls_insecure: bool,
    pub db: PathBuf,
    pub images_dir: PathBuf,
    pub homework_dir: PathBuf,
    pub media_url: Option<String>,
    pub wolfram_id: Option<String>,
    pub default_prefix: String,
    pub plot_step: f64,
    pub version: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            nick: DEFAULT_NICK.to_string(),
            channels: vec![DEFAULT_CHANNEL.to_string()],
            owners: Vec::new(),
            tls: false,
            tls_insecure: false,
            db: PathBuf::from("data/harper.db"),
            images_dir: PathBuf::from("data/images"),
            homework_dir: PathBuf::from("homework"),
            media_url: None,
            wolfram_id: None,
            default_prefix: DEFAULT_PREFIX.to_string(),
            plot_step: DEFAULT_PLOT_STEP,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Config {
    /// Resolve the final settings from parsed arguments, reading `--config` if given.
    pub fn from_args(args: Args) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(args, file)
    }

    /// Layer `args` over `file` over the defaults.
    pub fn merge(args: Args, file: FileConfig) -> Result<Self> {
        let defaults = Self::default();
        let non_empty = |v: Vec<String>| if v.is_empty() { None } else { Some(v) };

        let config = Self {
            server: args.server.or(file.server).unwrap_or(defaults.server),
            nick: args.nick.or(file.nick).unwrap_or(defaults.nick),
            channels: non_empty(args.channels)
                .or(file.channels)
                .unwrap_or(defaults.channels),
            owners: non_empty(args.owners)
                .or(file.owners)
                .unwrap_or(defaults.owners),
            tls: args.tls || file.tls.unwrap_or(defaults.tls),
            tls_insecure: args.tls_insecure || file.tls_insecure.unwrap_or(defaults.tls_insecure),
            db: args.db.or(file.db).unwrap_or(defaults.db),
            images_dir: args.images_dir.or(file.images_dir).unwrap_or(defaults.images_dir),
            homework_dir: args
                .homework_dir
                .or(file.homework_dir)
                .unwrap_or(defaults.homework_dir),
            media_url: args.media_url.or(file.media_url),
            wolfram_id: args.wolfram_id.or(file.wolfram_id),
            default_prefix: args.prefix.or(file.prefix).unwrap_or(defaults.default_prefix),
            plot_step: args.plot_step.or(file.plot_step).unwrap_or(defaults.plot_step),
            version: defaults.version,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.nick.is_empty() || self.nick.contains(' ') {
            anyhow::bail!("invalid nick {:?}", self.nick);
        }
        if self.default_prefix.is_empty() {
            anyhow::bail!("the default prefix must not be empty");
        }
        if !(self.plot_step.is_finite() && self.plot_step > 0.0) {
            anyhow::bail!("plot_step must be a positive number, got {}", self.plot_step);
        }
        Ok(())
    }

    pub fn is_owner(&self, nick: &str) -> bool {
        self.owners.iter().any(|o| o.eq_ignore_ascii_case(nick))
    }

    /// Name shown in the stats footer.
    pub fn owner_label(&self) -> &str {
        self.owners.first().map(String::as_str).unwrap_or("unknown owner")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_flags_or_file() {
        let config = Config::merge(Args::default(), FileConfig::default()).unwrap();
        assert_eq!(config.server, DEFAULT_SERVER);
        assert_eq!(config.channels, vec![DEFAULT_CHANNEL]);
        assert_eq!(config.default_prefix, ".");
        assert_eq!(config.plot_step, DEFAULT_PLOT_STEP);
    }

    #[test]
    fn flags_beat_file() {
        let file: FileConfig = toml::from_str(
            r##"
            server = "irc.example:6697"
            nick = "filebot"
            channels = ["#a", "#b"]
            owners = ["guhbean"]
            wolfram_id = "FILE-ID"
            "##,
        )
        .unwrap();
        let args = Args {
            nick: Some("clibot".to_string()),
            wolfram_id: Some("CLI-ID".to_string()),
            ..Default::default()
        };
        let config = Config::merge(args, file).unwrap();
        assert_eq!(config.server, "irc.example:6697");
        assert_eq!(config.nick, "clibot");
        assert_eq!(config.channels, vec!["#a", "#b"]);
        assert_eq!(config.wolfram_id.as_deref(), Some("CLI-ID"));
        assert!(config.is_owner("GuhBean"));
        assert!(!config.is_owner("mallory"));
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        assert!(toml::from_str::<FileConfig>("colour = 'red'").is_err());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let args = Args {
            plot_step: Some(0.0),
            ..Default::default()
        };
        assert!(Config::merge(args, FileConfig::default()).is_err());

        let args = Args {
            nick: Some("two words".to_string()),
            ..Default::default()
        };
        assert!(Config::merge(args, FileConfig::default()).is_err());
    }

    #[test]
    fn loads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harper.toml");
        std::fs::write(&path, "owners = ['root']\nprefix = '!'\n").unwrap();
        let args = Args {
            config: Some(path),
            ..Default::default()
        };
        let config = Config::from_args(args).unwrap();
        assert_eq!(config.owners, vec!["root"]);
        assert_eq!(config.default_prefix, "!");
    }
}
