//! Tracing subscriber setup

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::LogConfig;
use crate::error::{Error, Result};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Where log lines go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// Standard output only
    Console,
    /// Log file only
    File,
    /// Standard output and log file
    Both,
}

impl LogMode {
    /// Parse a mode name; unknown names fall back to console
    pub fn parse(mode: &str) -> Self {
        match mode.trim().to_ascii_lowercase().as_str() {
            "file" => Self::File,
            "both" => Self::Both,
            _ => Self::Console,
        }
    }

    fn console(self) -> bool {
        matches!(self, Self::Console | Self::Both)
    }

    fn file(self) -> bool {
        matches!(self, Self::File | Self::Both)
    }
}

/// Install the global subscriber described by `config`
///
/// `RUST_LOG` takes precedence over `log.level`. The returned guard must be
/// kept alive for buffered file output to be flushed.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let json = config.format.eq_ignore_ascii_case("json");
    let mode = LogMode::parse(&config.mode);

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if mode.console() {
        layers.push(format_layer(std::io::stdout, json, true));
    }

    let mut guard = None;
    if mode.file() {
        let (dir, file_name) = split_output(&config.output);
        std::fs::create_dir_all(&dir)?;
        let appender = if config.enable_rotation {
            tracing_appender::rolling::daily(&dir, &file_name)
        } else {
            tracing_appender::rolling::never(&dir, &file_name)
        };
        let (writer, worker) = tracing_appender::non_blocking(appender);
        layers.push(format_layer(writer, json, false));
        guard = Some(worker);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| Error::internal(format!("failed to install tracing subscriber: {e}")))?;

    Ok(guard)
}

fn format_layer<W>(writer: W, json: bool, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer().with_writer(writer).with_ansi(ansi).with_target(true);
    if json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

fn split_output(output: &str) -> (PathBuf, String) {
    let path = Path::new(output);
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let file_name = path
        .file_name()
        .map_or_else(|| "gwatch.log".to_string(), |f| f.to_string_lossy().into_owned());
    (dir, file_name)
}
