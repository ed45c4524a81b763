//! Transcoding engine abstraction.
//!
//! The engine is a process-wide resource with internal shared state and is
//! not safely reentrant, so access goes through an explicit [`EngineHandle`]
//! that serializes whole jobs behind a mutex. Staged file names are flat
//! (no path separators); callers namespace them per job.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::{parse_progress_line, FfmpegProgress};

/// External transcoding engine interface.
///
/// `load` is idempotent; the first call pays the initialization cost. All
/// file operations address the engine's private working storage by name.
#[async_trait]
pub trait TranscodeEngine: Send + Sync {
    /// Initialize the engine. Safe to call repeatedly.
    async fn load(&self) -> MediaResult<()>;

    /// Stage bytes under `name` in the engine's working storage.
    async fn write_input(&self, name: &str, bytes: &[u8]) -> MediaResult<()>;

    /// Run the engine with the given argument list. Progress snapshots are
    /// forwarded to `progress` when supplied.
    async fn exec(
        &self,
        args: &[String],
        progress: Option<mpsc::UnboundedSender<FfmpegProgress>>,
    ) -> MediaResult<()>;

    /// Read a produced artifact back out of working storage.
    async fn read_output(&self, name: &str) -> MediaResult<Vec<u8>>;

    /// Remove a staged file. Removing a name that does not exist is not an
    /// error, so cleanup paths can be retried safely.
    async fn delete_file(&self, name: &str) -> MediaResult<()>;
}

/// Reject names that could escape the working directory.
pub fn validate_name(name: &str) -> MediaResult<()> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.starts_with('-')
    {
        return Err(MediaError::InvalidInputName(name.to_string()));
    }
    Ok(())
}

/// FFmpeg CLI implementation staging files in a private temp directory.
pub struct FfmpegCliEngine {
    work_dir: tempfile::TempDir,
    timeout_secs: Option<u64>,
    loaded: AtomicBool,
}

impl FfmpegCliEngine {
    /// Create an engine with its own working directory.
    pub fn new() -> MediaResult<Self> {
        let work_dir = tempfile::Builder::new().prefix("clipforge-engine-").tempdir()?;
        Ok(Self {
            work_dir,
            timeout_secs: None,
            loaded: AtomicBool::new(false),
        })
    }

    /// Kill transcodes that run longer than `secs`.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    fn resolve(&self, name: &str) -> MediaResult<PathBuf> {
        validate_name(name)?;
        Ok(self.work_dir.path().join(name))
    }

    /// Wait for the child, honoring the configured timeout.
    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<()> {
        let wait_future = child.wait();

        let status = if let Some(timeout_secs) = self.timeout_secs {
            match tokio::time::timeout(
                std::time::Duration::from_secs(timeout_secs),
                wait_future,
            )
            .await
            {
                Ok(result) => result?,
                Err(_) => {
                    warn!(timeout_secs, "FFmpeg timed out, killing process");
                    let _ = child.kill().await;
                    return Err(MediaError::Timeout(timeout_secs));
                }
            }
        } else {
            wait_future.await?
        };

        if status.success() {
            Ok(())
        } else {
            Err(MediaError::engine_failed(
                "FFmpeg exited with non-zero status",
                None,
                status.code(),
            ))
        }
    }
}

#[async_trait]
impl TranscodeEngine for FfmpegCliEngine {
    async fn load(&self) -> MediaResult<()> {
        if self.loaded.load(Ordering::Acquire) {
            return Ok(());
        }
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;
        self.loaded.store(true, Ordering::Release);
        info!(work_dir = %self.work_dir.path().display(), "Transcoding engine ready");
        Ok(())
    }

    async fn write_input(&self, name: &str, bytes: &[u8]) -> MediaResult<()> {
        let path = self.resolve(name)?;
        tokio::fs::write(&path, bytes).await?;
        debug!(name, size = bytes.len(), "Staged engine input");
        Ok(())
    }

    async fn exec(
        &self,
        args: &[String],
        progress: Option<mpsc::UnboundedSender<FfmpegProgress>>,
    ) -> MediaResult<()> {
        self.load().await?;

        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(args)
            .current_dir(self.work_dir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stderr = child.stderr.take().ok_or_else(|| {
            MediaError::engine_failed("stderr not captured", None, None)
        })?;
        let mut reader = BufReader::new(stderr).lines();

        // Parse progress blocks off stderr while the transcode runs.
        let progress_handle = tokio::spawn(async move {
            let mut current = FfmpegProgress::default();
            let mut tail: Vec<String> = Vec::new();

            while let Ok(Some(line)) = reader.next_line().await {
                if let Some(snapshot) = parse_progress_line(&line, &mut current) {
                    if let Some(tx) = &progress {
                        let _ = tx.send(snapshot);
                    }
                } else if !line.contains('=') {
                    // Non-progress diagnostics; keep the last few for errors.
                    if tail.len() >= 20 {
                        tail.remove(0);
                    }
                    tail.push(line);
                }
            }
            tail
        });

        let result = self.wait_for_completion(&mut child).await;
        let tail = progress_handle.await.unwrap_or_default();

        match result {
            Ok(()) => Ok(()),
            Err(MediaError::EngineFailed {
                message,
                exit_code,
                ..
            }) => Err(MediaError::engine_failed(
                message,
                Some(tail.join("\n")),
                exit_code,
            )),
            Err(other) => Err(other),
        }
    }

    async fn read_output(&self, name: &str) -> MediaResult<Vec<u8>> {
        let path = self.resolve(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(MediaError::FileNotFound(path))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_file(&self, name: &str) -> MediaResult<()> {
        let path = self.resolve(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-wide engine handle.
///
/// Cloning shares the underlying engine; [`EngineHandle::lock`] grants
/// exclusive use for a whole export, which is what serializes overlapping
/// export requests against the non-reentrant engine.
#[derive(Clone)]
pub struct EngineHandle {
    inner: Arc<Mutex<Arc<dyn TranscodeEngine>>>,
}

impl EngineHandle {
    /// Wrap an engine in a handle.
    pub fn new(engine: Arc<dyn TranscodeEngine>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    /// Acquire exclusive use of the engine.
    pub async fn lock(&self) -> MutexGuard<'_, Arc<dyn TranscodeEngine>> {
        self.inner.lock().await
    }

    /// The process-wide FFmpeg-backed handle, created on first use.
    pub fn global() -> MediaResult<EngineHandle> {
        static GLOBAL: OnceLock<EngineHandle> = OnceLock::new();

        if let Some(handle) = GLOBAL.get() {
            return Ok(handle.clone());
        }
        let handle = EngineHandle::new(Arc::new(FfmpegCliEngine::new()?));
        // A racing initializer may have published first; always return the
        // published handle and let the loser drop.
        let _ = GLOBAL.set(handle);
        Ok(GLOBAL.get().expect("engine handle just initialized").clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("job-1234-input.mp4").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("../escape.mp4").is_err());
        assert!(validate_name("dir/file.mp4").is_err());
        assert!(validate_name("dir\\file.mp4").is_err());
        assert!(validate_name("-looks-like-a-flag").is_err());
    }

    #[tokio::test]
    async fn test_stage_read_delete_round_trip() {
        let engine = FfmpegCliEngine::new().unwrap();
        engine.write_input("a.bin", &[1, 2, 3]).await.unwrap();
        assert_eq!(engine.read_output("a.bin").await.unwrap(), vec![1, 2, 3]);

        engine.delete_file("a.bin").await.unwrap();
        assert!(matches!(
            engine.read_output("a.bin").await,
            Err(MediaError::FileNotFound(_))
        ));

        // Deleting again is not an error
        engine.delete_file("a.bin").await.unwrap();
    }

    #[tokio::test]
    async fn test_global_handle_is_shared() {
        let a = EngineHandle::global().unwrap();
        let b = EngineHandle::global().unwrap();
        assert!(Arc::ptr_eq(&a.inner, &b.inner));
    }
}
