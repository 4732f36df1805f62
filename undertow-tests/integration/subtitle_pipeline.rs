//! Subtitle artifacts and their lifetime relative to sessions

use undertow_core::{ErrorCategory, JobState, JobStatus};
use undertow_sim::InMemoryContentEngine;

use crate::common::{Harness, key_of};

#[tokio::test]
async fn test_repeated_conversion_reuses_artifact() {
    let harness = Harness::new();
    let magnet = harness.register_movie("Sintel");

    let first = harness
        .service
        .convert_subtitle(&magnet, "Sintel/Sintel.srt")
        .await
        .unwrap();
    let path = harness.dir.path().join(&first);
    std::fs::write(&path, "sentinel").unwrap();

    let second = harness
        .service
        .convert_subtitle(&magnet, "Sintel/Sintel.srt")
        .await
        .unwrap();

    assert_eq!(first, second);
    assert!(first.starts_with(key_of(&magnet).as_str()));
    assert!(first.ends_with(".vtt"));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "sentinel");
}

#[tokio::test]
async fn test_eviction_removes_only_own_artifacts() {
    let harness = Harness::new();
    let evicted = harness.register_movie("Evicted");
    let kept = harness.register_movie("Kept");
    let evicted_key = key_of(&evicted);
    let kept_key = key_of(&kept);

    let evicted_vtt = harness
        .service
        .convert_subtitle(&evicted, "Evicted/Evicted.srt")
        .await
        .unwrap();
    let kept_vtt = harness
        .service
        .convert_subtitle(&kept, "Kept/Kept.srt")
        .await
        .unwrap();
    for key in [&evicted_key, &kept_key] {
        std::fs::write(harness.dir.path().join(format!("{key}_0.ass")), "ass").unwrap();
        std::fs::write(harness.dir.path().join(format!("{key}_0.log")), "log").unwrap();
    }

    assert!(harness.service.cache().remove(&evicted_key));

    let mut expected = vec![
        kept_vtt.clone(),
        format!("{kept_key}_0.ass"),
        format!("{kept_key}_0.log"),
    ];
    expected.sort();
    assert_eq!(harness.derived_files(), expected);

    let error = harness.service.fetch_artifact(&evicted_vtt).await.unwrap_err();
    assert_eq!(error.category(), ErrorCategory::NotFound);
    assert!(harness.service.fetch_artifact(&kept_vtt).await.is_ok());
}

#[tokio::test]
async fn test_missing_tool_is_reported_at_call_time() {
    let harness = Harness::with(InMemoryContentEngine::new(), |config| {
        config.subtitles.tool = "undertow-no-such-extractor".to_string();
    });
    let magnet = harness.register_movie("Sintel");

    assert!(harness.service.verify_tools().is_err());
    let error = harness.service.start_extraction(&magnet, 0).await.unwrap_err();

    assert_eq!(error.category(), ErrorCategory::ToolUnavailable);
}

#[tokio::test]
async fn test_extraction_index_out_of_range() {
    let harness = Harness::new();
    let magnet = harness.register_movie("Sintel");

    let error = harness.service.start_extraction(&magnet, 7).await.unwrap_err();

    assert_eq!(error.category(), ErrorCategory::NotFound);
}

#[cfg(unix)]
mod unix {
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use super::*;

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-extractor");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_empty_output_counts_as_failure() {
        let harness = Harness::with(InMemoryContentEngine::new(), |config| {
            config.subtitles.tool = "true".to_string();
        });
        let magnet = harness.register_movie("Sintel");
        let key = key_of(&magnet);

        let paths = harness.service.start_extraction(&magnet, 0).await.unwrap();
        let mut state = harness
            .service
            .subtitles()
            .extractor()
            .subscribe(&key, 0)
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| !s.is_running()))
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(*state.borrow(), JobState::Failed { .. }));
        let status = harness
            .service
            .extraction_status(&paths.log_name)
            .await
            .unwrap();
        assert!(matches!(status, JobStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn test_eviction_kills_running_extraction() {
        let tools = tempfile::tempdir().unwrap();
        let script = write_script(tools.path(), "sleep 30");
        let harness = Harness::with(InMemoryContentEngine::new(), |config| {
            config.subtitles.tool = script.to_string_lossy().into_owned();
        });
        let magnet = harness.register_movie("Sintel");
        let key = key_of(&magnet);

        let paths = harness.service.start_extraction(&magnet, 0).await.unwrap();
        let mut state = harness
            .service
            .subtitles()
            .extractor()
            .subscribe(&key, 0)
            .unwrap();
        assert!(state.borrow().is_running());
        assert!(harness.derived_files().contains(&paths.log_name));

        harness.service.cache().remove(&key);
        tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| !s.is_running()))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            *state.borrow(),
            JobState::Failed {
                reason: "session evicted".to_string()
            }
        );
        assert!(harness.derived_files().is_empty());
        assert!(harness.service.subtitles().extractor().job_state(&key, 0).is_none());
    }

    #[tokio::test]
    async fn test_evicted_extraction_leaves_no_late_output() {
        let tools = tempfile::tempdir().unwrap();
        let script = write_script(
            tools.path(),
            "for last; do :; done\nsleep 0.3\necho '[Script Info]' > \"$last\"",
        );
        let harness = Harness::with(InMemoryContentEngine::new(), |config| {
            config.subtitles.tool = script.to_string_lossy().into_owned();
        });
        let magnet = harness.register_movie("Sintel");
        let key = key_of(&magnet);

        let paths = harness.service.start_extraction(&magnet, 0).await.unwrap();
        let mut state = harness
            .service
            .subtitles()
            .extractor()
            .subscribe(&key, 0)
            .unwrap();

        harness.service.cache().remove(&key);
        tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| !s.is_running()))
            .await
            .unwrap()
            .unwrap();
        // Outlive the point where the tool would have written its output
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert!(!harness.dir.path().join(&paths.output_name).exists());
        assert!(harness.derived_files().is_empty());
    }
}
