//! Rasterizers: turn a prepared card document into PNG bytes.
//!
//! [`HeadlessBrowser`] drives a system Chromium (`--headless=new
//! --screenshot`) the same way video tooling drives a system `ffmpeg`: it
//! is found on `PATH` (or via `CHROME_PATH`), run once per export from a
//! throwaway profile, and its stderr is kept for diagnostics.

use crate::error::ExportError;
use crate::export::ExportOptions;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Url;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info};

/// Environment variable naming the browser executable.
pub const CHROME_PATH_ENV: &str = "CHROME_PATH";

/// Executable names tried on `PATH` when `CHROME_PATH` is unset.
pub const BROWSER_CANDIDATES: [&str; 4] = [
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
];

/// One rasterization request.
#[derive(Debug, Clone)]
pub struct RasterJob {
    /// Prepared document (filtered, capture target marked).
    pub html: String,
    pub options: ExportOptions,
    /// Unique per export when cache busting is on.
    pub cache_key: String,
}

/// Converts a prepared document to image bytes.
pub trait Rasterizer: Send + Sync {
    fn name(&self) -> &str;

    fn rasterize<'a>(&'a self, job: &'a RasterJob) -> BoxFuture<'a, Result<Vec<u8>, ExportError>>;
}

/// Headless Chromium screenshot rasterizer.
#[derive(Debug, Clone)]
pub struct HeadlessBrowser {
    executable: PathBuf,
    timeout: Duration,
    virtual_time_budget_ms: u64,
    no_sandbox: bool,
}

impl HeadlessBrowser {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            timeout: Duration::from_secs(60),
            virtual_time_budget_ms: 5_000,
            no_sandbox: false,
        }
    }

    /// Use `CHROME_PATH`, else the first of [`BROWSER_CANDIDATES`] on `PATH`.
    pub fn detect() -> Result<Self, ExportError> {
        if let Some(path) = std::env::var_os(CHROME_PATH_ENV).filter(|p| !p.is_empty()) {
            return Ok(Self::new(path));
        }
        let path_var = std::env::var_os("PATH").unwrap_or_default();
        std::env::split_paths(&path_var)
            .flat_map(|dir| BROWSER_CANDIDATES.iter().map(move |name| dir.join(name)))
            .find(|candidate| candidate.is_file())
            .map(Self::new)
            .ok_or_else(|| {
                ExportError::RasterFailed(format!(
                    "no headless browser found; set {CHROME_PATH_ENV} or install chromium"
                ))
            })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// How long the page may load resources (fonts, images) before capture.
    pub fn with_virtual_time_budget(mut self, budget: Duration) -> Self {
        self.virtual_time_budget_ms = budget.as_millis() as u64;
        self
    }

    /// Pass `--no-sandbox` (needed when running as root in containers).
    pub fn no_sandbox(mut self, no_sandbox: bool) -> Self {
        self.no_sandbox = no_sandbox;
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn args(&self, options: &ExportOptions, profile: &Path, shot: &Path, page: &Url) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--headless=new".into(),
            "--disable-gpu".into(),
            "--hide-scrollbars".into(),
            "--no-first-run".into(),
            "--no-default-browser-check".into(),
            "--disable-extensions".into(),
            "--run-all-compositor-stages-before-draw".into(),
            format!("--window-size={},{}", options.width, options.height).into(),
            format!("--virtual-time-budget={}", self.virtual_time_budget_ms).into(),
        ];
        if options.skip_auto_scale {
            args.push(format!("--force-device-scale-factor={}", options.pixel_ratio).into());
        }
        if self.no_sandbox {
            args.push("--no-sandbox".into());
        }

        let mut profile_arg = OsString::from("--user-data-dir=");
        profile_arg.push(profile);
        args.push(profile_arg);

        let mut shot_arg = OsString::from("--screenshot=");
        shot_arg.push(shot);
        args.push(shot_arg);

        args.push(page.as_str().into());
        args
    }

    async fn capture(&self, job: &RasterJob) -> Result<Vec<u8>, ExportError> {
        let start = Instant::now();
        let workdir = tempfile::tempdir()
            .map_err(|e| ExportError::RasterFailed(format!("tempdir: {e}")))?;
        let page_path = workdir.path().join("card.html");
        let shot_path = workdir.path().join("card.png");
        let profile = workdir.path().join("profile");

        tokio::fs::write(&page_path, &job.html)
            .await
            .map_err(|e| ExportError::RasterFailed(format!("write page: {e}")))?;

        let mut page_url = Url::from_file_path(&page_path)
            .map_err(|_| ExportError::RasterFailed(format!("bad path {}", page_path.display())))?;
        if job.options.cache_bust {
            page_url.set_query(Some(&format!("v={}", job.cache_key)));
        }

        let mut cmd = Command::new(&self.executable);
        cmd.args(self.args(&job.options, &profile, &shot_path, &page_url))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Running {} for {}", self.executable.display(), page_url);
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                ExportError::RasterFailed(format!(
                    "browser timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                ExportError::RasterFailed(format!(
                    "failed to launch {}: {e}",
                    self.executable.display()
                ))
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("SecurityError") {
            return Err(ExportError::SecurityFault(last_line(&stderr)));
        }
        if !output.status.success() {
            return Err(ExportError::RasterFailed(format!(
                "browser exited with {}: {}",
                output.status,
                last_line(&stderr)
            )));
        }

        let bytes = tokio::fs::read(&shot_path)
            .await
            .map_err(|e| ExportError::RasterFailed(format!("no screenshot written: {e}")))?;
        info!("Captured {} bytes in {:?}", bytes.len(), start.elapsed());
        Ok(bytes)
    }
}

fn last_line(stderr: &str) -> String {
    stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("no diagnostics")
        .trim()
        .to_string()
}

impl Rasterizer for HeadlessBrowser {
    fn name(&self) -> &str {
        "headless-chromium"
    }

    fn rasterize<'a>(&'a self, job: &'a RasterJob) -> BoxFuture<'a, Result<Vec<u8>, ExportError>> {
        self.capture(job).boxed()
    }
}
