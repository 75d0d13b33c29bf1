//! Stream pumping configuration (TOML).

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::encoding::Encoding;
use crate::core::framer::{DEFAULT_READ_BUFFER_BYTES, FramerOptions};
use crate::core::types::StreamKind;

/// Decoding and wait settings for redirected streams.
///
/// Missing fields default to values suitable for line-oriented tools
/// writing UTF-8.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StreamConfig {
    /// Encoding of the child's stdout.
    pub output_encoding: Encoding,

    /// Encoding of the child's stderr.
    pub error_encoding: Encoding,

    /// Consume a leading byte-order mark and let it pick the encoding.
    pub detect_bom: bool,

    /// Size of each read from the pipe.
    pub read_buffer_bytes: usize,

    /// Timed wait used by the CLI before it gives up and kills the child.
    pub wait_timeout_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            output_encoding: Encoding::Utf8,
            error_encoding: Encoding::Utf8,
            detect_bom: true,
            read_buffer_bytes: DEFAULT_READ_BUFFER_BYTES,
            wait_timeout_ms: 30_000,
        }
    }
}

impl StreamConfig {
    pub fn validate(&self) -> Result<()> {
        if self.read_buffer_bytes == 0 {
            return Err(anyhow!("read_buffer_bytes must be > 0"));
        }
        if self.wait_timeout_ms == 0 {
            return Err(anyhow!("wait_timeout_ms must be > 0"));
        }
        Ok(())
    }

    pub fn encoding(&self, kind: StreamKind) -> Encoding {
        match kind {
            StreamKind::Output => self.output_encoding,
            StreamKind::Error => self.error_encoding,
        }
    }

    pub fn framer_options(&self, kind: StreamKind) -> FramerOptions {
        FramerOptions {
            encoding: self.encoding(kind),
            detect_bom: self.detect_bom,
            read_buffer_bytes: self.read_buffer_bytes,
        }
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `StreamConfig::default()`.
pub fn load_config(path: &Path) -> Result<StreamConfig> {
    if !path.exists() {
        let cfg = StreamConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: StreamConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &StreamConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
