use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::{Duration, timeout};
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, CatalogEntry, NewCatalogEntry};
use crate::config::MergeConfig;
use crate::error::MergeError;
use crate::fetch::{GENERATED_EXTENSION, MERGE_BASE_NAME, reserve_unique_path};

/// Filter graph that overlays two audio streams for the longer of both durations
const AMIX_FILTER: &str = "[0:a][1:a]amix=inputs=2:duration=longest[a]";

/// Mixes two audio files into one
#[async_trait]
pub trait Merger: Send + Sync {
    async fn merge(
        &self,
        input_a: &Path,
        input_b: &Path,
        output: &Path,
    ) -> Result<(), MergeError>;
}

/// Merger backed by an external `ffmpeg` binary
pub struct FfmpegMerger {
    config: MergeConfig,
}

impl FfmpegMerger {
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    fn build_args(&self, input_a: &Path, input_b: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-i".to_string(),
            input_a.to_string_lossy().to_string(),
            "-i".to_string(),
            input_b.to_string_lossy().to_string(),
            "-filter_complex".to_string(),
            AMIX_FILTER.to_string(),
            "-map".to_string(),
            "[a]".to_string(),
            "-ac".to_string(),
            "2".to_string(),
            "-loglevel".to_string(),
            self.config.log_level.clone(),
            output.to_string_lossy().to_string(),
        ]
    }

    fn spawn(&self, args: &[String]) -> Result<Child, MergeError> {
        Command::new(&self.config.ffmpeg_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MergeError::ProgramNotFound {
                        path: self.config.ffmpeg_path.clone(),
                    }
                } else {
                    MergeError::Io(e)
                }
            })
    }

    async fn wait(&self, mut child: Child, output: &Path) -> Result<(), MergeError> {
        let stderr = child.stderr.take();
        let timeout_duration = Duration::from_secs(self.config.timeout_secs);

        let result = timeout(timeout_duration, async {
            let mut error_output = String::new();

            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if line.to_lowercase().contains("error") {
                        error_output.push_str(&line);
                        error_output.push('\n');
                    }
                }
            }

            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, error_output))
        })
        .await;

        match result {
            Ok(Ok((status, error_output))) => {
                if !status.success() {
                    return Err(MergeError::ProcessFailed {
                        code: status.code(),
                        stderr: (!error_output.is_empty()).then_some(error_output),
                    });
                }
            }
            Ok(Err(e)) => return Err(MergeError::Io(e)),
            Err(_) => {
                let _ = child.kill().await;
                return Err(MergeError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                });
            }
        }

        if !output.exists() {
            return Err(MergeError::MissingOutput(output.to_path_buf()));
        }

        Ok(())
    }
}

#[async_trait]
impl Merger for FfmpegMerger {
    async fn merge(
        &self,
        input_a: &Path,
        input_b: &Path,
        output: &Path,
    ) -> Result<(), MergeError> {
        for input in [input_a, input_b] {
            if !input.exists() {
                return Err(MergeError::MissingInput(input.to_path_buf()));
            }
            if same_file(input, output) {
                return Err(MergeError::OutputIsInput(output.to_path_buf()));
            }
        }

        let existed_before = output.exists();
        let args = self.build_args(input_a, input_b, output);
        debug!(program = %self.config.ffmpeg_path, ?args, "Running merge");

        let child = self.spawn(&args)?;
        let result = self.wait(child, output).await;
        // A file that was there before belongs to the caller
        if result.is_err() && !existed_before {
            remove_partial_output(output).await;
        }
        result
    }
}

/// Whether `a` and `b` name the same file, following symlinks when both exist
fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

async fn remove_partial_output(output: &Path) {
    if let Err(e) = tokio::fs::remove_file(output).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %output.display(), error = %e, "Failed to remove partial merge output");
    }
}

/// Mix `input_a` and `input_b` into the next free `merge[_N].mp3` in
/// `output_dir` and catalog the result under its file name.
pub async fn merge_and_catalog(
    merger: &dyn Merger,
    catalog: &dyn Catalog,
    output_dir: &Path,
    input_a: &Path,
    input_b: &Path,
) -> Result<CatalogEntry, MergeError> {
    tokio::fs::create_dir_all(output_dir).await?;

    // ffmpeg -y overwrites the reserved empty file
    let output = reserve_unique_path(output_dir, MERGE_BASE_NAME, GENERATED_EXTENSION)?;
    if let Err(e) = merger.merge(input_a, input_b, &output).await {
        remove_partial_output(&output).await;
        return Err(e);
    }

    match catalog.insert_or_replace(&NewCatalogEntry::for_file(&output)) {
        Ok(entry) => {
            info!(path = %output.display(), "Merged sounds");
            Ok(entry)
        }
        Err(e) => {
            remove_partial_output(&output).await;
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SqliteCatalog;
    use crate::error::ErrorKind;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn merger_with_program(program: &str) -> FfmpegMerger {
        FfmpegMerger::new(MergeConfig {
            ffmpeg_path: program.to_string(),
            ..MergeConfig::default()
        })
    }

    fn inputs(dir: &Path) -> (PathBuf, PathBuf) {
        let a = dir.join("Rain.ogg");
        let b = dir.join("Wind.wav");
        std::fs::write(&a, b"a").unwrap();
        std::fs::write(&b, b"b").unwrap();
        (a, b)
    }

    /// Writes a fixed payload to the output path
    struct CopyingMerger;

    #[async_trait]
    impl Merger for CopyingMerger {
        async fn merge(&self, _a: &Path, _b: &Path, output: &Path) -> Result<(), MergeError> {
            tokio::fs::write(output, b"mixed").await?;
            Ok(())
        }
    }

    #[test]
    fn args_mix_both_inputs_into_stereo() {
        let merger = FfmpegMerger::new(MergeConfig::default());
        let args = merger.build_args(
            Path::new("/s/a.ogg"),
            Path::new("/s/b.wav"),
            Path::new("/s/merge.mp3"),
        );

        assert_eq!(
            args,
            vec![
                "-y",
                "-i",
                "/s/a.ogg",
                "-i",
                "/s/b.wav",
                "-filter_complex",
                "[0:a][1:a]amix=inputs=2:duration=longest[a]",
                "-map",
                "[a]",
                "-ac",
                "2",
                "-loglevel",
                "error",
                "/s/merge.mp3",
            ]
        );
    }

    #[tokio::test]
    async fn missing_input_fails_before_spawning() {
        let dir = tempdir().unwrap();
        let present = dir.path().join("Rain.ogg");
        std::fs::write(&present, b"a").unwrap();
        let missing = dir.path().join("Nope.ogg");

        // A bogus program proves nothing was spawned: it would yield ProgramNotFound
        let err = merger_with_program("/nonexistent/ffmpeg")
            .merge(&present, &missing, &dir.path().join("merge.mp3"))
            .await
            .unwrap_err();

        assert!(matches!(err, MergeError::MissingInput(path) if path == missing));
    }

    #[tokio::test]
    async fn unknown_program_names_the_path() {
        let dir = tempdir().unwrap();
        let (a, b) = inputs(dir.path());

        let err = merger_with_program("/nonexistent/ffmpeg")
            .merge(&a, &b, &dir.path().join("merge.mp3"))
            .await
            .unwrap_err();

        assert!(matches!(&err, MergeError::ProgramNotFound { path } if path == "/nonexistent/ffmpeg"));
        assert_eq!(err.kind(), ErrorKind::ExternalProcess);
    }

    /// Sleeps before writing, so concurrent calls overlap
    struct SlowMerger;

    #[async_trait]
    impl Merger for SlowMerger {
        async fn merge(&self, _a: &Path, _b: &Path, output: &Path) -> Result<(), MergeError> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            tokio::fs::write(output, b"slow mix").await?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn unknown_program_keeps_existing_output() {
        let dir = tempdir().unwrap();
        let (a, b) = inputs(dir.path());
        let output = dir.path().join("keep.mp3");
        std::fs::write(&output, b"earlier mix").unwrap();

        let err = merger_with_program("/nonexistent/ffmpeg")
            .merge(&a, &b, &output)
            .await
            .unwrap_err();

        assert!(matches!(err, MergeError::ProgramNotFound { .. }));
        assert_eq!(std::fs::read(&output).unwrap(), b"earlier mix");
    }

    #[tokio::test]
    async fn output_naming_an_input_is_rejected() {
        let dir = tempdir().unwrap();
        let (a, b) = inputs(dir.path());

        let err = merger_with_program("/nonexistent/ffmpeg")
            .merge(&a, &b, &a)
            .await
            .unwrap_err();

        assert!(matches!(&err, MergeError::OutputIsInput(path) if *path == a));
        assert_eq!(err.kind(), ErrorKind::Filesystem);
        assert_eq!(std::fs::read(&a).unwrap(), b"a");

        let err = merger_with_program("/nonexistent/ffmpeg")
            .merge(&a, &b, &dir.path().join(".").join("Wind.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, MergeError::OutputIsInput(_)));
        assert_eq!(std::fs::read(&b).unwrap(), b"b");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_merge_removes_output_it_started() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let (a, b) = inputs(dir.path());
        let output = dir.path().join("merge.mp3");

        // Writes to its last argument, then fails like a crashing ffmpeg
        let script = dir.path().join("fake-ffmpeg");
        std::fs::write(
            &script,
            "#!/bin/sh\nfor last in \"$@\"; do :; done\nprintf partial > \"$last\"\nexit 3\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let err = merger_with_program(&script.to_string_lossy())
            .merge(&a, &b, &output)
            .await
            .unwrap_err();

        assert!(matches!(err, MergeError::ProcessFailed { code: Some(3), .. }));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn merge_and_catalog_picks_next_free_name() {
        let dir = tempdir().unwrap();
        let (a, b) = inputs(dir.path());
        std::fs::write(dir.path().join("merge.mp3"), b"older mix").unwrap();
        let catalog = SqliteCatalog::in_memory().unwrap();

        let entry = merge_and_catalog(&CopyingMerger, &catalog, dir.path(), &a, &b)
            .await
            .unwrap();

        assert_eq!(entry.display_name, "merge_1.mp3");
        assert_eq!(entry.local_path, dir.path().join("merge_1.mp3"));
        assert_eq!(std::fs::read(&entry.local_path).unwrap(), b"mixed");
        assert_eq!(catalog.list_all().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn merge_failure_catalogs_nothing() {
        let dir = tempdir().unwrap();
        let (a, b) = inputs(dir.path());
        let catalog = SqliteCatalog::in_memory().unwrap();

        let err = merge_and_catalog(
            &merger_with_program("/nonexistent/ffmpeg"),
            &catalog,
            dir.path(),
            &a,
            &b,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, MergeError::ProgramNotFound { .. }));
        assert!(catalog.list_all().unwrap().is_empty());
        assert!(!dir.path().join("merge.mp3").exists());
    }

    #[tokio::test]
    async fn concurrent_merges_get_distinct_files() {
        let dir = tempdir().unwrap();
        let (a, b) = inputs(dir.path());
        let catalog = SqliteCatalog::in_memory().unwrap();

        let (first, second) = tokio::join!(
            merge_and_catalog(&SlowMerger, &catalog, dir.path(), &a, &b),
            merge_and_catalog(&SlowMerger, &catalog, dir.path(), &a, &b),
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_ne!(first.local_path, second.local_path);
        assert_eq!(catalog.list_all().unwrap().len(), 2);
        assert_eq!(std::fs::read(&first.local_path).unwrap(), b"slow mix");
        assert_eq!(std::fs::read(&second.local_path).unwrap(), b"slow mix");
    }
}
