//! Local directory exposed as simulated content

use std::path::{Path, PathBuf};

use crate::content::SimulatedContent;

const SKIPPED_NAMES: &[&str] = &[".DS_Store", "Thumbs.db", ".Trash", ".localized"];

/// Builds one content item per top-level entry of `dir`.
///
/// A top-level file becomes single-file content. A top-level directory
/// becomes multi-file content holding every regular file below it, with
/// paths relative to `dir`. Keys derive from the entry name, so links stay
/// stable across restarts.
///
/// # Errors
/// - `std::io::Error` - Failed to read the top-level directory
pub async fn scan_library(dir: &Path) -> Result<Vec<SimulatedContent>, std::io::Error> {
    let mut library = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        if name.starts_with('.') || SKIPPED_NAMES.contains(&name.as_str()) {
            continue;
        }

        let file_type = entry.file_type().await?;
        let mut content = SimulatedContent::new(name.clone());

        if file_type.is_file() {
            let size = entry.metadata().await?.len();
            content = content.with_disk_file(name, path, size);
        } else if file_type.is_dir() {
            let mut files = Vec::new();
            if let Err(e) = collect_files(&path, &mut files).await {
                tracing::warn!("Failed to scan {}: {}", path.display(), e);
                continue;
            }
            files.sort();
            for (file_path, size) in files {
                let relative = file_path
                    .strip_prefix(dir)
                    .unwrap_or(&file_path)
                    .to_string_lossy()
                    .replace('\\', "/");
                content = content.with_disk_file(relative, file_path, size);
            }
        }

        if content.files.is_empty() {
            continue;
        }
        tracing::debug!(
            "Library entry {} ({} files, {} bytes)",
            content.name,
            content.files.len(),
            content.total_size()
        );
        library.push(content);
    }

    library.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(library)
}

fn collect_files<'a>(
    dir: &'a Path,
    files: &'a mut Vec<(PathBuf, u64)>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), std::io::Error>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                collect_files(&path, files).await?;
            } else if file_type.is_file() {
                files.push((path, entry.metadata().await?.len()));
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scan_groups_directories() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("single.mp4"), b"0123").unwrap();
        std::fs::create_dir_all(root.path().join("Show/extras")).unwrap();
        std::fs::write(root.path().join("Show/episode.mkv"), b"episode").unwrap();
        std::fs::write(root.path().join("Show/episode.srt"), b"1").unwrap();
        std::fs::write(root.path().join("Show/extras/bonus.mp4"), b"bb").unwrap();
        std::fs::write(root.path().join(".hidden"), b"x").unwrap();

        let library = scan_library(root.path()).await.unwrap();

        assert_eq!(library.len(), 2);
        let show = &library[0];
        assert_eq!(show.name, "Show");
        let paths: Vec<_> = show.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["Show/episode.mkv", "Show/episode.srt", "Show/extras/bonus.mp4"]
        );
        assert_eq!(show.total_size(), 10);

        let single = &library[1];
        assert_eq!(single.name, "single.mp4");
        assert_eq!(single.total_size(), 4);
    }

    #[tokio::test]
    async fn test_empty_directories_are_skipped() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("Empty")).unwrap();

        assert!(scan_library(root.path()).await.unwrap().is_empty());
    }
}
