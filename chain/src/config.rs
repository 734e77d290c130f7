use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::info;

/// Trailing heights re-walked on every cycle so shallow reorgs self-heal.
pub const REORG_WINDOW: u64 = 11;

/// Heights grouped under one top-level bucket directory.
pub const TOP_BUCKET_SPAN: u64 = 100_000;
/// Heights grouped under one sub-bucket directory.
pub const SUB_BUCKET_SPAN: u64 = 1_000;

pub const DEFAULT_ARCHIVE_DIR: &str = "blocks";
pub const DEFAULT_BLOCK_EXTENSION: &str = "bin";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_NOTIFY_TOPIC: &str = "hashblock";
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8332";
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_GIT_REMOTE: &str = "origin";
pub const DEFAULT_METRICS_PORT: u16 = 9464;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ArchiverConfig {
    pub archive_dir: PathBuf,
    pub reorg_window: u64,
    pub extension: String,
    pub rpc: RpcConfig,
    pub trigger: TriggerConfig,
    pub commit: CommitConfig,
    pub metrics: MetricsConfig,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            archive_dir: PathBuf::from(DEFAULT_ARCHIVE_DIR),
            reorg_window: REORG_WINDOW,
            extension: DEFAULT_BLOCK_EXTENSION.to_string(),
            rpc: RpcConfig::default(),
            trigger: TriggerConfig::default(),
            commit: CommitConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl ArchiverConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open config file {}", path.display()))?;
        let config: ArchiverConfig = serde_yaml::from_reader(file)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;

        info!(path = %path.display(), archive_dir = %config.archive_dir.display(), "Archiver config loaded");

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.extension.is_empty()
            || self.extension.contains(['.', '/', '\\', '_'])
        {
            bail!("invalid block file extension {:?}", self.extension);
        }
        if let TriggerConfig::Poll { interval_secs } = self.trigger {
            if interval_secs == 0 {
                bail!("poll interval must be at least one second");
            }
        }
        Ok(())
    }

    /// Directory the committer runs git in. Defaults to the archive root.
    pub fn commit_repo_dir(&self) -> &Path {
        self.commit
            .repo_dir
            .as_deref()
            .unwrap_or(self.archive_dir.as_path())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// `user:password` file written by the node, used when no explicit credentials are set.
    pub cookie_file: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_RPC_URL.to_string(),
            user: None,
            password: None,
            cookie_file: None,
            timeout_secs: DEFAULT_RPC_TIMEOUT_SECS,
        }
    }
}

impl RpcConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// How the archiver learns that the chain tip may have moved.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum TriggerConfig {
    Poll {
        #[serde(default = "default_poll_interval_secs")]
        interval_secs: u64,
    },
    Subscribe {
        endpoint: String,
        #[serde(default = "default_notify_topic")]
        topic: String,
    },
}

impl Default for TriggerConfig {
    fn default() -> Self {
        TriggerConfig::Poll {
            interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_notify_topic() -> String {
    DEFAULT_NOTIFY_TOPIC.to_string()
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CommitConfig {
    pub enabled: bool,
    pub repo_dir: Option<PathBuf>,
    pub push: bool,
    pub remote: String,
    pub branch: Option<String>,
    /// Track archived block files with git LFS.
    pub lfs: bool,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            repo_dir: None,
            push: false,
            remote: DEFAULT_GIT_REMOTE.to_string(),
            branch: None,
            lfs: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub address: IpAddr,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_METRICS_PORT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn bucket_spans_nest() {
        assert_eq!(TOP_BUCKET_SPAN % SUB_BUCKET_SPAN, 0);
        assert_eq!(TOP_BUCKET_SPAN / SUB_BUCKET_SPAN, 100);
    }

    #[test]
    fn empty_yaml_gives_defaults() {
        let config: ArchiverConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, ArchiverConfig::default());
        assert_eq!(config.reorg_window, 11);
        assert_eq!(
            config.trigger,
            TriggerConfig::Poll {
                interval_secs: 60
            }
        );
        assert_eq!(config.commit_repo_dir(), Path::new("blocks"));
    }

    #[test]
    fn subscribe_mode_defaults_topic() {
        let yaml = "trigger:\n  mode: subscribe\n  endpoint: tcp://127.0.0.1:28332\n";
        let config: ArchiverConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config.trigger,
            TriggerConfig::Subscribe {
                endpoint: "tcp://127.0.0.1:28332".to_string(),
                topic: "hashblock".to_string(),
            }
        );
    }

    #[test]
    fn load_from_file_reads_nested_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "archive_dir: /srv/archive/blocks\nreorg_window: 6\nrpc:\n  url: http://node:8332\n  cookie_file: /srv/node/.cookie\ncommit:\n  push: true\n  repo_dir: /srv/archive\ntrigger:\n  mode: poll\n  interval_secs: 15\n"
        )
        .unwrap();

        let config = ArchiverConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.reorg_window, 6);
        assert_eq!(config.rpc.url, "http://node:8332");
        assert_eq!(config.rpc.cookie_file, Some(PathBuf::from("/srv/node/.cookie")));
        assert_eq!(config.rpc.timeout_secs, DEFAULT_RPC_TIMEOUT_SECS);
        assert!(config.commit.push);
        assert!(config.commit.enabled);
        assert_eq!(config.commit.remote, "origin");
        assert_eq!(config.commit_repo_dir(), Path::new("/srv/archive"));
        assert_eq!(config.trigger, TriggerConfig::Poll { interval_secs: 15 });
    }

    #[test]
    fn load_from_missing_file_fails() {
        assert!(ArchiverConfig::load_from_file("/nonexistent/archiver.yaml").is_err());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = ArchiverConfig::default();
        config.extension = "tar.gz".to_string();
        assert!(config.validate().is_err());

        let mut config = ArchiverConfig::default();
        config.trigger = TriggerConfig::Poll { interval_secs: 0 };
        assert!(config.validate().is_err());

        assert!(ArchiverConfig::default().validate().is_ok());
    }
}
