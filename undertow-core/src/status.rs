//! JSON views of sessions: file listing, summary and transfer status.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::cache::CacheEntry;
use crate::session::Session;

/// One file in a listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub path: String,
    pub size: u64,
    #[serde(rename = "size_human")]
    pub size_human: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_subtitle: bool,
}

/// Key and files of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListing {
    pub info_hash: String,
    pub files: Vec<FileInfo>,
}

impl FileListing {
    pub fn from_session(session: &Session) -> Self {
        Self {
            info_hash: session.key().to_string(),
            files: session
                .files()
                .iter()
                .map(|file| FileInfo {
                    path: file.path.clone(),
                    size: file.size,
                    size_human: human_readable_size(file.size),
                    is_subtitle: file.is_subtitle(),
                })
                .collect(),
        }
    }
}

/// Name, key and size of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSummary {
    pub name: String,
    pub info_hash: String,
    pub total_size: u64,
    #[serde(rename = "totalSize_human")]
    pub total_size_human: String,
    pub file_count: usize,
}

impl ContentSummary {
    pub fn from_session(session: &Session) -> Self {
        Self {
            name: session.display_name().to_string(),
            info_hash: session.key().to_string(),
            total_size: session.total_size(),
            total_size_human: human_readable_size(session.total_size()),
            file_count: session.files().len(),
        }
    }
}

/// Transfer progress of one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStatus {
    pub path: String,
    pub size: u64,
    pub bytes_completed: u64,
    pub percentage_completed: f64,
}

/// Transfer status of a cached session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub info_hash: String,
    pub name: String,
    pub total_bytes: u64,
    pub bytes_completed: u64,
    pub percentage_completed: f64,
    pub download_speed_bps: f64,
    pub download_speed_human: String,
    pub connected_peers: usize,
    pub files: Vec<FileStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streaming_file_size: Option<u64>,
    #[serde(
        rename = "streamingFileSize_human",
        skip_serializing_if = "Option::is_none"
    )]
    pub streaming_file_size_human: Option<String>,
}

impl StatusReport {
    /// Builds the report, sampling download speed under the entry's lock.
    pub fn build(
        entry: &CacheEntry,
        file_index: Option<usize>,
        now: Instant,
        speed_sample_interval: Duration,
    ) -> Self {
        let session = entry.session();
        let progress = session.progress();
        let speed = entry.sample_speed(progress.bytes_completed, now, speed_sample_interval);

        let files = session
            .files()
            .iter()
            .enumerate()
            .map(|(index, file)| {
                let bytes_completed = progress.files_completed.get(index).copied().unwrap_or(0);
                FileStatus {
                    path: file.path.clone(),
                    size: file.size,
                    bytes_completed,
                    percentage_completed: percentage(bytes_completed, file.size),
                }
            })
            .collect();

        let streaming_file_size = file_index
            .and_then(|index| session.select_file(Some(index)))
            .map(|(_, file)| file.size);

        Self {
            info_hash: session.key().to_string(),
            name: session.display_name().to_string(),
            total_bytes: progress.total_bytes,
            bytes_completed: progress.bytes_completed,
            percentage_completed: percentage(progress.bytes_completed, progress.total_bytes),
            download_speed_bps: speed,
            download_speed_human: human_readable_speed(speed),
            connected_peers: progress.peer_count,
            files,
            streaming_file_size,
            streaming_file_size_human: streaming_file_size.map(human_readable_size),
        }
    }
}

fn percentage(done: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        done as f64 / total as f64 * 100.0
    }
}

/// Formats a byte count with binary units, e.g. `1.50 MB` for 1.5 MiB.
pub fn human_readable_size(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    const PREFIXES: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];

    if bytes < UNIT {
        return format!("{bytes} B");
    }

    let mut divisor = UNIT;
    let mut exponent = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        divisor *= UNIT;
        exponent += 1;
        n /= UNIT;
    }

    format!(
        "{:.2} {}B",
        bytes as f64 / divisor as f64,
        PREFIXES[exponent]
    )
}

pub fn human_readable_speed(bytes_per_second: f64) -> String {
    format!("{}/s", human_readable_size(bytes_per_second.max(0.0) as u64))
}
