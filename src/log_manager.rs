//! LogManager: per-file copy records, local JSON/XML sink and an optional
//! fire-and-forget remote sink (§4.7).
//!
//! Grounded in the teacher's `AuditLogger`: one mutex around a
//! `BufWriter<File>`, append-only, flushed after every record.

use crate::config::{LogFormat, LogTarget};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// One record per copy attempt, success or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Source")]
    pub source: String,
    #[serde(rename = "Target")]
    pub target: String,
    #[serde(rename = "Size")]
    pub size: u64,
    /// Copy duration in ms; -1 on failure.
    #[serde(rename = "Time")]
    pub time_ms: f64,
    /// Encryption duration in ms; 0 not applied, >0 success, -1 error.
    #[serde(rename = "EncryptionTime")]
    pub encryption_time_ms: i64,
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "MachineName", skip_serializing_if = "Option::is_none")]
    pub machine_name: Option<String>,
    #[serde(rename = "UserName", skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

impl LogRecord {
    pub fn new(name: String, source: String, target: String, size: u64, time_ms: f64, encryption_time_ms: i64) -> Self {
        Self {
            name,
            source,
            target,
            size,
            time_ms,
            encryption_time_ms,
            timestamp: Utc::now(),
            machine_name: std::env::var("COMPUTERNAME").ok().or_else(|| std::env::var("HOSTNAME").ok()),
            user_name: std::env::var("USERNAME").ok().or_else(|| std::env::var("USER").ok()),
        }
    }
}

/// Rewrites a single-root drive path (`C:\foo\bar`) into a UNC display form
/// (`\\<hostname>\C$\foo\bar`). Display convention only; the copy itself
/// always uses the original path.
pub fn to_unc_display(path: &Path, hostname: &str) -> String {
    let raw = path.to_string_lossy();
    let bytes = raw.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        let drive = bytes[0].to_ascii_uppercase() as char;
        let rest = raw[2..].trim_start_matches(['\\', '/']).replace('/', "\\");
        format!("\\\\{hostname}\\{drive}$\\{rest}")
    } else {
        raw.into_owned()
    }
}

struct LocalSink {
    directory: PathBuf,
    format: LogFormat,
    open_file: Mutex<Option<(String, BufWriter<File>)>>,
}

impl LocalSink {
    fn new(directory: PathBuf, format: LogFormat) -> Self {
        Self {
            directory,
            format,
            open_file: Mutex::new(None),
        }
    }

    fn write(&self, record: &LogRecord) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.directory)?;
        let day = record.timestamp.format("%Y-%m-%d").to_string();
        let extension = match self.format {
            LogFormat::Json => "json",
            LogFormat::Xml => "xml",
        };
        let file_name = format!("{day}.{extension}");

        let mut guard = self.open_file.lock().expect("log sink lock poisoned");
        if guard.as_ref().map(|(name, _)| name != &file_name).unwrap_or(true) {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.directory.join(&file_name))?;
            *guard = Some((file_name.clone(), BufWriter::new(file)));
        }
        let (_, writer) = guard.as_mut().expect("just populated");

        match self.format {
            LogFormat::Json => {
                let json = serde_json::to_string(record)?;
                writeln!(writer, "{json}")?;
            }
            LogFormat::Xml => {
                writeln!(
                    writer,
                    "<LogRecord><Name>{}</Name><Source>{}</Source><Target>{}</Target><Size>{}</Size><Time>{}</Time><EncryptionTime>{}</EncryptionTime><Timestamp>{}</Timestamp></LogRecord>",
                    xml_escape(&record.name),
                    xml_escape(&record.source),
                    xml_escape(&record.target),
                    record.size,
                    record.time_ms,
                    record.encryption_time_ms,
                    record.timestamp.to_rfc3339(),
                )?;
            }
        }
        writer.flush()
    }
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Central write point for copy-pipeline log records.
pub struct LogManager {
    target: Mutex<LogTarget>,
    local: Mutex<LocalSink>,
    server_url: Mutex<Option<String>>,
}

impl LogManager {
    pub fn new(target: LogTarget, format: LogFormat, directory: PathBuf, server_url: Option<String>) -> Self {
        Self {
            target: Mutex::new(target),
            local: Mutex::new(LocalSink::new(directory, format)),
            server_url: Mutex::new(server_url),
        }
    }

    pub fn set_target(&self, target: LogTarget) {
        *self.target.lock().expect("log target lock poisoned") = target;
    }

    pub fn set_format(&self, format: LogFormat) {
        let directory = self.local.lock().expect("log sink lock poisoned").directory.clone();
        *self.local.lock().expect("log sink lock poisoned") = LocalSink::new(directory, format);
    }

    pub fn set_directory(&self, directory: PathBuf) {
        let format = self.local.lock().expect("log sink lock poisoned").format;
        *self.local.lock().expect("log sink lock poisoned") = LocalSink::new(directory, format);
    }

    pub fn set_server_url(&self, url: Option<String>) {
        *self.server_url.lock().expect("server url lock poisoned") = url;
    }

    /// Writes `record` to whichever sinks are currently enabled. The remote
    /// POST, if any, runs on a spawned thread and swallows transport errors.
    pub fn write(&self, record: LogRecord) {
        let target = *self.target.lock().expect("log target lock poisoned");

        if matches!(target, LogTarget::Local | LogTarget::Both) {
            if let Err(e) = self.local.lock().expect("log sink lock poisoned").write(&record) {
                tracing::warn!(error = %e, "failed to write local log record");
            }
        }

        if matches!(target, LogTarget::Server | LogTarget::Both) {
            let url = self.server_url.lock().expect("server url lock poisoned").clone();
            if let Some(url) = url {
                std::thread::spawn(move || {
                    let client = match reqwest::blocking::Client::builder()
                        .timeout(Duration::from_secs(2))
                        .build()
                    {
                        Ok(c) => c,
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to build remote log client");
                            return;
                        }
                    };
                    if let Err(e) = client.post(&url).json(&record).send() {
                        tracing::warn!(error = %e, "failed to ship log record to remote sink");
                    }
                });
            }
        }
    }
}
