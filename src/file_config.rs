//! INI configuration loading for connections.
//!
//! Reads a `[connection]` section into a [`ConnectionBuilder`], so the same
//! validation applies whether options come from code or from a file:
//!
//! ```ini
//! [connection]
//! address = ws://console.local/c/ws
//! mode = binary
//! heartbeat = true
//! heartbeat_interval_ms = 60000
//! reconnect_delay_ms = 3000
//! ```

use std::{fs, io::ErrorKind, path::Path};

use encoding_rs::Encoding;
use ini::{Ini, Properties};
use thiserror::Error;

use crate::connection::{ConnectionBuilder, DEFAULT_BACKOFF_CAP, FrameMode};

/// Section holding connection options.
pub const CONNECTION_SECTION: &str = "connection";

/// Errors raised while loading connection settings from INI files.
#[derive(Debug, Error)]
pub enum FileConfigError {
    #[error("{0} doesn't exist")]
    NotFound(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} is an empty file")]
    Empty(String),
    #[error("unknown encoding {0}")]
    UnknownEncoding(String),
    #[error("contents are not valid {0}")]
    Decode(&'static str),
    #[error("configuration is invalid: {0}")]
    Parse(String),
    #[error("missing [{CONNECTION_SECTION}] section")]
    MissingSection,
    #[error("missing required key {0}")]
    MissingKey(&'static str),
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
    #[error("unknown key {0}")]
    UnknownKey(String),
}

/// Load a connection builder from the INI file at `path`.
///
/// `encoding` is an optional WHATWG label; UTF-8 is assumed when absent.
pub fn load_connection_config(
    path: impl AsRef<Path>,
    encoding: Option<&str>,
) -> Result<ConnectionBuilder, FileConfigError> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let bytes = read_file_bytes(path, &display)?;
    if bytes.is_empty() {
        return Err(FileConfigError::Empty(display));
    }
    let text = decode_with_encoding(&bytes, encoding.unwrap_or("utf-8"))?;
    builder_from_ini_str(&text)
}

/// Parse INI text and map its `[connection]` section onto a builder.
pub fn builder_from_ini_str(text: &str) -> Result<ConnectionBuilder, FileConfigError> {
    let ini = Ini::load_from_str(text).map_err(|err| FileConfigError::Parse(err.to_string()))?;
    let section = ini
        .section(Some(CONNECTION_SECTION))
        .ok_or(FileConfigError::MissingSection)?;
    apply_section(section)
}

fn read_file_bytes(path: &Path, display: &str) -> Result<Vec<u8>, FileConfigError> {
    fs::read(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => FileConfigError::NotFound(display.to_owned()),
        _ => FileConfigError::Io {
            path: display.to_owned(),
            source: err,
        },
    })
}

fn decode_with_encoding(bytes: &[u8], label: &str) -> Result<String, FileConfigError> {
    let normalized_label = label.trim().to_ascii_lowercase();
    let encoding = Encoding::for_label(normalized_label.as_bytes())
        .ok_or_else(|| FileConfigError::UnknownEncoding(label.to_owned()))?;
    let (decoded, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(FileConfigError::Decode(encoding.name()));
    }
    Ok(decoded.into_owned())
}

fn apply_section(section: &Properties) -> Result<ConnectionBuilder, FileConfigError> {
    let address = section
        .get("address")
        .ok_or(FileConfigError::MissingKey("address"))?;
    let mut builder = ConnectionBuilder::new(address.trim());
    let mut exponential = false;
    let mut backoff_cap_ms = None;

    for (key, value) in section.iter() {
        let value = value.trim();
        builder = match key {
            "address" => builder,
            "mode" => builder.with_mode(parse_mode(key, value)?),
            "debug" => builder.with_debug(parse_bool(key, value)?),
            "heartbeat" => builder.with_heartbeat(parse_bool(key, value)?),
            "heartbeat_interval_ms" => builder.with_heartbeat_interval_ms(parse_u64(key, value)?),
            "heartbeat_message" => builder.with_heartbeat_message(value),
            "reconnect" => builder.with_reconnect(parse_bool(key, value)?),
            "reconnect_delay_ms" => builder.with_reconnect_delay_ms(parse_u64(key, value)?),
            "connect_timeout_ms" => builder.with_connect_timeout_ms(parse_u64(key, value)?),
            "backoff" => {
                exponential = match value.to_ascii_lowercase().as_str() {
                    "fixed" => false,
                    "exponential" => true,
                    _ => return Err(invalid(key, value)),
                };
                builder
            }
            "backoff_cap_ms" => {
                backoff_cap_ms = Some(parse_u64(key, value)?);
                builder
            }
            other => return Err(FileConfigError::UnknownKey(other.to_owned())),
        };
    }

    if exponential {
        let cap = backoff_cap_ms
            .unwrap_or_else(|| u64::try_from(DEFAULT_BACKOFF_CAP.as_millis()).unwrap_or(u64::MAX));
        builder = builder.with_exponential_backoff(cap);
    }
    Ok(builder)
}

fn invalid(key: &str, value: &str) -> FileConfigError {
    FileConfigError::InvalidValue {
        key: key.to_owned(),
        value: value.to_owned(),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, FileConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64, FileConfigError> {
    value.parse().map_err(|_| invalid(key, value))
}

fn parse_mode(key: &str, value: &str) -> Result<FrameMode, FileConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "text" => Ok(FrameMode::Text),
        "binary" | "arraybuffer" => Ok(FrameMode::Binary),
        _ => Err(invalid(key, value)),
    }
}
