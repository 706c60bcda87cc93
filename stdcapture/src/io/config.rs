//! Capture configuration stored as TOML (used by the `stdcapture` CLI).

use std::fs;
use std::os::fd::RawFd;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::JoinFlags;
use crate::io::drain::DEFAULT_CHUNK_SIZE;
use crate::io::runtime::{self, RuntimeStream};
use crate::session::Redirect;

/// Capture configuration (TOML).
///
/// Missing fields default to capturing all four channels into one group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CaptureConfig {
    /// Bytes read from a pipe per drain iteration.
    pub chunk_size: usize,

    pub join: JoinFlags,

    pub channels: ChannelsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChannelsConfig {
    pub native_out: NativeSetting,
    pub native_err: NativeSetting,
    pub runtime_out: RuntimeSetting,
    pub runtime_err: RuntimeSetting,
}

/// Native target: a keyword or an explicit descriptor number.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum NativeSetting {
    Fd(RawFd),
    Named(StreamName),
}

/// Runtime target: one of the process-wide runtime streams.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct RuntimeSetting(pub StreamName);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StreamName {
    Stdout,
    Stderr,
    None,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            native_out: NativeSetting::Named(StreamName::Stdout),
            native_err: NativeSetting::Named(StreamName::Stderr),
            runtime_out: RuntimeSetting(StreamName::Stdout),
            runtime_err: RuntimeSetting(StreamName::Stderr),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            join: JoinFlags::default(),
            channels: ChannelsConfig::default(),
        }
    }
}

impl NativeSetting {
    pub fn fd(self) -> Option<RawFd> {
        match self {
            NativeSetting::Fd(fd) => Some(fd),
            NativeSetting::Named(StreamName::Stdout) => Some(1),
            NativeSetting::Named(StreamName::Stderr) => Some(2),
            NativeSetting::Named(StreamName::None) => None,
        }
    }
}

impl RuntimeSetting {
    pub fn stream(self) -> Option<RuntimeStream> {
        match self.0 {
            StreamName::Stdout => Some(runtime::stdout()),
            StreamName::Stderr => Some(runtime::stderr()),
            StreamName::None => None,
        }
    }
}

impl CaptureConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(anyhow!("chunk_size must be > 0"));
        }
        for (name, setting) in [
            ("native_out", self.channels.native_out),
            ("native_err", self.channels.native_err),
        ] {
            if let NativeSetting::Fd(fd) = setting
                && fd < 0
            {
                return Err(anyhow!("channels.{name} must be a non-negative descriptor"));
            }
        }
        self.to_redirect()
            .validate()
            .context("channel targets conflict with join settings")?;
        Ok(())
    }

    pub fn to_redirect(&self) -> Redirect {
        Redirect::new()
            .native_out(self.channels.native_out.fd())
            .native_err(self.channels.native_err.fd())
            .runtime_out(self.channels.runtime_out.stream())
            .runtime_err(self.channels.runtime_err.stream())
            .join(self.join)
            .chunk_size(self.chunk_size)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `CaptureConfig::default()`.
pub fn load_config(path: &Path) -> Result<CaptureConfig> {
    if !path.exists() {
        let cfg = CaptureConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: CaptureConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::LogicalChannel;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, CaptureConfig::default());
    }

    #[test]
    fn parses_keywords_descriptors_and_partial_join() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("capture.toml");
        fs::write(
            &path,
            r#"
chunk_size = 4096

[join]
out_err = false

[channels]
native_err = 7
runtime_err = "none"
"#,
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.chunk_size, 4096);
        assert!(cfg.join.all && cfg.join.out && cfg.join.err && !cfg.join.out_err);
        assert_eq!(cfg.channels.native_out, NativeSetting::Named(StreamName::Stdout));
        assert_eq!(cfg.channels.native_err.fd(), Some(7));
        assert!(cfg.channels.runtime_err.stream().is_none());

        let redirect = cfg.to_redirect();
        assert_eq!(redirect.topology().len(), 2);
        assert!(!redirect.is_active(LogicalChannel::RuntimeErr));
        assert!(redirect.is_active(LogicalChannel::NativeErr));
    }

    #[test]
    fn rejects_zero_chunk_and_shared_target_across_groups() {
        let cfg = CaptureConfig {
            chunk_size: 0,
            ..CaptureConfig::default()
        };
        assert!(cfg.validate().is_err());

        let mut cfg = CaptureConfig {
            join: JoinFlags::separate(),
            ..CaptureConfig::default()
        };
        cfg.channels.native_err = NativeSetting::Fd(1);
        let err = cfg.validate().expect_err("fd 1 in two groups");
        assert!(format!("{err:#}").contains("share a target"));
    }
}
