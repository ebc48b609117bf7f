use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::debug;

const USER_AGENT: &str = concat!("nprcli/", env!("CARGO_PKG_VERSION"));
const DOWNLOAD_CHUNK: usize = 16 * 1024;

#[derive(Debug, Clone, Copy)]
pub(crate) struct FetchPolicy {
    pub(crate) connect_timeout: Duration,
    pub(crate) read_timeout: Duration,
    pub(crate) attempts: usize,
    pub(crate) retry_delay: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(15),
            attempts: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl FetchPolicy {
    fn agent(&self) -> ureq::Agent {
        ureq::AgentBuilder::new()
            .timeout_connect(self.connect_timeout)
            .timeout_read(self.read_timeout)
            .timeout_write(self.read_timeout)
            .user_agent(USER_AGENT)
            .build()
    }
}

fn should_retry_http_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..=599).contains(&status)
}

fn call_with_retries(url: &str, policy: &FetchPolicy) -> Result<ureq::Response, String> {
    let attempts = policy.attempts.max(1);
    let agent = policy.agent();

    for attempt in 1..=attempts {
        debug!(url, attempt, "http get");
        match agent.get(url).call() {
            Ok(response) => return Ok(response),
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().ok().unwrap_or_default();
                let body = body.trim();
                let status_error = if body.is_empty() {
                    format!("HTTP status {status}")
                } else {
                    let truncated = body.chars().take(240).collect::<String>();
                    format!("HTTP status {status} ({truncated})")
                };

                if !should_retry_http_status(status) {
                    return Err(format!("request failed: {status_error}"));
                }
                if attempt == attempts {
                    return Err(format!(
                        "request failed after {attempts} attempt(s): {status_error}"
                    ));
                }
            }
            Err(ureq::Error::Transport(err)) => {
                if attempt == attempts {
                    return Err(format!(
                        "request failed after {attempts} attempt(s): transport error: {err}"
                    ));
                }
            }
        }
        thread::sleep(policy.retry_delay);
    }

    Err("request failed: exhausted attempts without a concrete error".to_string())
}

pub(crate) fn get_text_with_retries(url: &str, policy: &FetchPolicy) -> Result<String, String> {
    let response = call_with_retries(url, policy)?;
    response
        .into_string()
        .map_err(|err| format!("request failed: response decode failed: {err}"))
}

/// File name a download of `url` is stored under: the last path segment,
/// without query or fragment.
pub(crate) fn file_name_for_url(url: &str) -> Option<&str> {
    let target = url.split(['?', '#']).next().unwrap_or(url);
    let target = target.split_once("://").map_or(target, |(_, rest)| rest);
    let (_authority, path) = target.split_once('/')?;
    path.rsplit('/').next().filter(|name| !name.is_empty())
}

pub(crate) fn download_to_dir(url: &str, dir: &Path, policy: &FetchPolicy) -> Result<PathBuf> {
    let file_name =
        file_name_for_url(url).ok_or_else(|| anyhow!("cannot derive a file name from {url}"))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create download directory {}", dir.display()))?;
    let dest = dir.join(file_name);

    let response = call_with_retries(url, policy).map_err(|err| anyhow!(err))?;
    let mut reader = response.into_reader();
    let file = File::create(&dest)
        .with_context(|| format!("failed to create {}", dest.display()))?;
    let mut writer = BufWriter::new(file);

    let mut buf = vec![0_u8; DOWNLOAD_CHUNK];
    let mut total = 0_u64;
    loop {
        let read = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                return Err(err).with_context(|| format!("download of {url} interrupted"));
            }
        };
        writer
            .write_all(&buf[..read])
            .with_context(|| format!("failed writing {}", dest.display()))?;
        total += read as u64;
    }
    writer
        .flush()
        .with_context(|| format!("failed writing {}", dest.display()))?;
    debug!(url, bytes = total, path = %dest.display(), "download complete");
    Ok(dest)
}
