//! Materializes binary responses (CSV exports, label PDFs) as local files.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;
use shared::domain::{LabelId, PaymentStatus};
use tracing::info;

use crate::error::DashboardError;

const MAX_FILENAME_BYTES: usize = 180;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    /// Name suggested by the server through `Content-Disposition`.
    pub suggested_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Download {
    /// Writes the payload under `dir`, keeping the server's filename when it
    /// sent one. The file appears only once fully written.
    pub async fn save_into(
        &self,
        dir: &Path,
        default_name: &str,
    ) -> Result<PathBuf, DashboardError> {
        let name = self
            .suggested_name
            .as_deref()
            .and_then(sanitize_filename)
            .or_else(|| sanitize_filename(default_name))
            .unwrap_or_else(|| "download.bin".to_string());

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| io_error(dir, source))?;

        let target = dir.join(&name);
        let partial = dir.join(format!(".{name}.part"));
        if let Err(source) = tokio::fs::write(&partial, &self.bytes).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(io_error(&partial, source));
        }
        if let Err(source) = tokio::fs::rename(&partial, &target).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(io_error(&target, source));
        }

        info!(path = %target.display(), bytes = self.bytes.len(), "download saved");
        Ok(target)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> DashboardError {
    DashboardError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Extracts `filename` (or `filename*=UTF-8''...`) from a
/// `Content-Disposition` header value.
pub fn filename_from_content_disposition(header: &str) -> Option<String> {
    let mut plain = None;
    for part in header.split(';').map(str::trim) {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();
        if key == "filename*" {
            let encoded = value
                .split_once("''")
                .map(|(_, rest)| rest)
                .unwrap_or(value);
            if let Some(decoded) = percent_decode(encoded) {
                return Some(decoded);
            }
        } else if key == "filename" {
            plain = Some(value.trim_matches('"').to_string());
        }
    }
    plain.filter(|name| !name.is_empty())
}

fn percent_decode(raw: &str) -> Option<String> {
    let decoded = percent_decode_str(raw).decode_utf8_lossy();
    Some(decoded.into_owned()).filter(|name| !name.is_empty())
}

/// Strips directory components and characters that are unsafe in file
/// names. Returns `None` when nothing usable is left.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|') {
                '_'
            } else {
                c
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        return None;
    }

    let mut end = cleaned.len().min(MAX_FILENAME_BYTES);
    while !cleaned.is_char_boundary(end) {
        end -= 1;
    }
    Some(cleaned[..end].to_string())
}

pub fn default_export_name(status: Option<PaymentStatus>, now: DateTime<Utc>) -> String {
    let scope = status.map(PaymentStatus::as_str).unwrap_or("all");
    format!("orders_{scope}_{}.csv", now.format("%Y%m%d_%H%M%S"))
}

pub fn default_label_name(label_id: &LabelId) -> String {
    format!("label_{}.pdf", label_id.as_str())
}

#[cfg(test)]
#[path = "tests/download_tests.rs"]
mod tests;
