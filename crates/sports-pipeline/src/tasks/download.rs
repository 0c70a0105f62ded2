//! Raw dataset download from object storage.

use crate::config::StorageConfig;
use crate::error::{PipelineError, Result, ResultExt};
use crate::scheduler::{FileTarget, ProgressReporter, ProgressUpdate, TaskAction};
use reqwest::blocking::Client;
use std::io::{self, Read, Write};
use std::sync::Arc;
use tracing::{debug, info};

/// Size of each read from the response body.
const CHUNK_SIZE: usize = 64 * 1024;

/// Bytes between two progress updates.
const PROGRESS_INTERVAL: u64 = 4 * 1024 * 1024;

/// Copy `reader` into `writer` in chunks, calling `on_progress` with the
/// running byte count every [`PROGRESS_INTERVAL`] bytes and once at the end.
pub fn copy_with_progress<R, W, F>(
    mut reader: R,
    writer: &mut W,
    total: Option<u64>,
    mut on_progress: F,
) -> io::Result<u64>
where
    R: Read,
    W: Write + ?Sized,
    F: FnMut(u64, Option<u64>),
{
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut done: u64 = 0;
    let mut next_report = PROGRESS_INTERVAL;

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buffer[..n])?;
        done += n as u64;
        if done >= next_report {
            on_progress(done, total);
            next_report = done + PROGRESS_INTERVAL;
        }
    }

    on_progress(done, total);
    Ok(done)
}

/// Fetches one object and stores it in the raw-data target.
pub struct DownloadTask {
    name: String,
    storage: StorageConfig,
    client: Client,
    output: FileTarget,
    reporter: Option<Arc<dyn ProgressReporter>>,
}

impl DownloadTask {
    /// Create the task.
    ///
    /// The client has no request timeout: the object may be large and the
    /// pipeline is not cancellable.
    pub fn new(
        name: impl Into<String>,
        storage: StorageConfig,
        output: FileTarget,
        reporter: Option<Arc<dyn ProgressReporter>>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(None::<std::time::Duration>)
            .build()?;
        Ok(Self {
            name: name.into(),
            storage,
            client,
            output,
            reporter,
        })
    }

    /// Download the object, returning the number of bytes written.
    pub fn fetch(&self) -> Result<u64> {
        let url = self.storage.object_url();
        info!("Downloading {}", url);

        let mut request = self.client.get(&url);
        if let Some(token) = &self.storage.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().map_err(|e| PipelineError::Transport {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Transport {
                url,
                reason: format!("server answered {}", status),
            });
        }

        let total = response.content_length();
        debug!("Content-Length: {:?}", total);

        let mut writer = self.output.writer()?;
        let written = copy_with_progress(response, &mut writer, total, |done, total| {
            debug!("{}: {} bytes received", self.name, done);
            if let Some(reporter) = &self.reporter {
                reporter.report(ProgressUpdate::bytes(self.name.clone(), done, total));
            }
        })
        .map_err(|e| PipelineError::Transport {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        if let Some(expected) = total
            && expected != written
        {
            return Err(PipelineError::Transport {
                url,
                reason: format!("expected {} bytes, received {}", expected, written),
            });
        }

        writer
            .finish()
            .context(format!("Storing {}", self.output.path().display()))?;
        info!("Downloaded {} bytes to {}", written, self.output.path().display());
        Ok(written)
    }
}

impl TaskAction for DownloadTask {
    fn run(&self) -> Result<()> {
        self.fetch().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Reader that fails after yielding some bytes.
    struct Broken {
        remaining: usize,
    }

    impl Read for Broken {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
            }
            let n = buf.len().min(self.remaining);
            self.remaining -= n;
            Ok(n)
        }
    }

    #[test]
    fn test_copy_with_progress_reports_final_count() {
        let data = vec![7u8; 10_000];
        let mut out = Vec::new();
        let mut updates = Vec::new();

        let n = copy_with_progress(Cursor::new(data.clone()), &mut out, Some(10_000), |done, total| {
            updates.push((done, total));
        })
        .unwrap();

        assert_eq!(n, 10_000);
        assert_eq!(out, data);
        assert_eq!(updates.last(), Some(&(10_000, Some(10_000))));
    }

    #[test]
    fn test_copy_with_progress_reports_at_intervals() {
        let size = (PROGRESS_INTERVAL * 2 + 10) as usize;
        let mut out = io::sink();
        let mut updates = 0;

        copy_with_progress(Cursor::new(vec![0u8; size]), &mut out, None, |_, _| updates += 1).unwrap();

        assert_eq!(updates, 3);
    }

    #[test]
    fn test_copy_with_progress_propagates_read_error() {
        let mut out = Vec::new();
        let err = copy_with_progress(Broken { remaining: 100 }, &mut out, None, |_, _| {}).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(out.len(), 100);
    }

    #[test]
    fn test_unreachable_endpoint_is_transport_failure() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageConfig {
            endpoint: "http://127.0.0.1:1".to_string(),
            ..StorageConfig::default()
        };
        let task = DownloadTask::new(
            "download_data",
            storage,
            FileTarget::new(dir.path().join("data.csv")),
            None,
        )
        .unwrap();

        let err = task.fetch().unwrap_err();
        assert_eq!(err.error_code(), "TRANSPORT_FAILURE");
        assert!(!dir.path().join("data.csv").exists());
    }
}
