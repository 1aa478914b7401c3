//! Shared external-decoder invocation and retry shim (spec.md §4.6
//! "Robustness"). The single chokepoint every analysis module funnels
//! through, generalized from `db_retry.rs`'s exponential-backoff-on-lock
//! pattern onto subprocess invocations rather than database locks, and from
//! `essentia_client.rs`'s `Command` + exit-status handling.

use crate::queue::decode_retry_backoff;
use aqlab_common::{Error, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Command;

const MAX_ATTEMPTS: u32 = 5;

const RETRYABLE_PATTERNS: &[&str] = &[
    "No such file or directory",
    "Input/output error",
    "Stale file handle",
    "Resource temporarily unavailable",
    "Connection timed out",
    "Transport endpoint is not connected",
    "Network is unreachable",
    "Permission denied",
];

#[derive(Debug, Clone)]
pub struct DecodeOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
}

/// Replaceable capability for invoking the external decoder (spec.md §9
/// "Decode wrapper as a replaceable capability"). Tests substitute a fake
/// that returns canned output and controllable exit codes.
#[async_trait]
pub trait DecodeRunner: Send + Sync {
    async fn run(&self, path: &Path, args: &[String]) -> Result<DecodeOutput>;
}

/// Shells out to the configured decoder binary directly.
pub struct ProcessDecodeRunner {
    pub decoder_path: String,
}

#[async_trait]
impl DecodeRunner for ProcessDecodeRunner {
    async fn run(&self, path: &Path, args: &[String]) -> Result<DecodeOutput> {
        let decoder = self.decoder_path.clone();
        let args = args.to_vec();
        let target = path.to_path_buf();

        let output = tokio::task::spawn_blocking(move || {
            Command::new(&decoder).arg("-i").arg(&target).args(&args).output()
        })
        .await
        .map_err(|e| Error::Internal(format!("decode task join error: {e}")))?
        .map_err(|e| Error::DecoderFailure(format!("failed to launch decoder: {e}")))?;

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() {
            return Err(Error::DecoderFailure(format!(
                "decoder exited with {:?}: {stderr}",
                output.status.code()
            )));
        }

        Ok(DecodeOutput {
            stdout: output.stdout,
            stderr,
        })
    }
}

fn is_retryable(message: &str) -> bool {
    RETRYABLE_PATTERNS.iter().any(|p| message.contains(p))
}

/// Up to 5 attempts, 1s backoff doubling to a 16s cap. Before each attempt,
/// confirm the input is stat-able; on command failure, retry only if stderr
/// matches a known transient pattern (spec.md §4.6 "Robustness").
pub async fn run_with_retry(
    runner: &dyn DecodeRunner,
    path: &Path,
    args: &[String],
) -> Result<DecodeOutput> {
    let mut last_err: Option<Error> = None;

    for attempt in 0..MAX_ATTEMPTS {
        if tokio::fs::metadata(path).await.is_err() {
            last_err = Some(Error::TransientIo(format!("{} not stat-able", path.display())));
            if attempt + 1 < MAX_ATTEMPTS {
                tokio::time::sleep(decode_retry_backoff(attempt)).await;
                continue;
            }
            break;
        }

        match runner.run(path, args).await {
            Ok(output) => return Ok(output),
            Err(e) => {
                let retryable = is_retryable(&e.to_string());
                if !retryable || attempt + 1 >= MAX_ATTEMPTS {
                    return Err(e);
                }
                last_err = Some(e);
                tokio::time::sleep(decode_retry_backoff(attempt)).await;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| Error::DecoderFailure("retries exhausted".into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeRunner {
        calls: AtomicUsize,
        responses: Mutex<Vec<Result<DecodeOutput>>>,
    }

    #[async_trait]
    impl DecodeRunner for FakeRunner {
        async fn run(&self, _path: &Path, _args: &[String]) -> Result<DecodeOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(Error::Internal("no more canned responses".into()));
            }
            responses.remove(0)
        }
    }

    fn ok_output() -> Result<DecodeOutput> {
        Ok(DecodeOutput { stdout: vec![], stderr: String::new() })
    }

    fn retryable_failure() -> Result<DecodeOutput> {
        Err(Error::DecoderFailure("decoder exited: No such file or directory".into()))
    }

    fn fatal_failure() -> Result<DecodeOutput> {
        Err(Error::DecoderFailure("decoder exited: malformed stream".into()))
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        std::fs::write(&path, b"x").unwrap();

        let runner = FakeRunner {
            calls: AtomicUsize::new(0),
            responses: Mutex::new(vec![retryable_failure(), retryable_failure(), ok_output()]),
        };

        let result = run_with_retry(&runner, &path, &[]).await;
        assert!(result.is_ok());
        assert_eq!(runner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_failure_stops_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        std::fs::write(&path, b"x").unwrap();

        let runner = FakeRunner {
            calls: AtomicUsize::new(0),
            responses: Mutex::new(vec![fatal_failure(), ok_output()]),
        };

        let result = run_with_retry(&runner, &path, &[]).await;
        assert!(result.is_err());
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_input_retries_until_it_appears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");

        let runner = FakeRunner {
            calls: AtomicUsize::new(0),
            responses: Mutex::new(vec![ok_output()]),
        };

        let path_clone = path.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            std::fs::write(&path_clone, b"x").unwrap();
        });

        let result = run_with_retry(&runner, &path, &[]).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn exhausting_retries_surfaces_last_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        std::fs::write(&path, b"x").unwrap();

        let runner = FakeRunner {
            calls: AtomicUsize::new(0),
            responses: Mutex::new(vec![
                retryable_failure(),
                retryable_failure(),
                retryable_failure(),
                retryable_failure(),
                retryable_failure(),
            ]),
        };

        let result = run_with_retry(&runner, &path, &[]).await;
        assert!(result.is_err());
        assert_eq!(runner.calls.load(Ordering::SeqCst), 5);
    }
}
