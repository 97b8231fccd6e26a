use async_trait::async_trait;
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;
use chrono::{Local, NaiveDate};
use colored::Colorize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;

use crate::error::RetrieveError;
use crate::jobs::{select_reusable_job, InventoryFormat};
use crate::report::{summarize_file, InventorySummary};
use crate::service::VaultService;

pub const DEFAULT_INTERVAL_MINUTES: u64 = 15;
pub const DEFAULT_PREFIX: &str = "aws.glacier";

/// How often to ask the vault whether a submitted job has finished, and for
/// how long at most. Without `max_wait` polling only stops on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_wait: Option<Duration>,
}

impl PollPolicy {
    /// Minutes that do not fit a `Duration` in seconds are rejected as an
    /// invalid interval.
    pub fn from_minutes(interval: u64, max_wait: Option<u64>) -> Result<Self, RetrieveError> {
        Ok(PollPolicy {
            interval: minutes(interval)?,
            max_wait: max_wait.map(minutes).transpose()?,
        })
    }

    fn validate(&self) -> Result<(), RetrieveError> {
        if self.interval.is_zero() || self.max_wait.is_some_and(|x| x.is_zero()) {
            return Err(RetrieveError::InvalidInterval);
        }
        Ok(())
    }
}

fn minutes(value: u64) -> Result<Duration, RetrieveError> {
    value
        .checked_mul(60)
        .map(Duration::from_secs)
        .ok_or(RetrieveError::InvalidInterval)
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy {
            interval: Duration::from_secs(DEFAULT_INTERVAL_MINUTES * 60),
            max_wait: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetrievalRequest {
    pub format: InventoryFormat,
    pub description: Option<String>,
    pub job_id: Option<String>,
    pub output_path: Option<PathBuf>,
    pub poll: PollPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobSource {
    Explicit,
    Reused,
    Submitted,
}

impl fmt::Display for JobSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobSource::Explicit => "requested",
            JobSource::Reused => "reused",
            JobSource::Submitted => "new",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
pub struct Retrieval {
    pub path: PathBuf,
    pub job_id: String,
    pub source: JobSource,
    pub bytes_written: u64,
    pub summary: Option<InventorySummary>,
}

pub struct InventoryRetriever<S: VaultService> {
    service: S,
    prefix: String,
}

impl<S: VaultService> InventoryRetriever<S> {
    pub fn new(service: S) -> Self {
        InventoryRetriever {
            service,
            prefix: String::from(DEFAULT_PREFIX),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Runs the whole retrieval and writes the inventory to disk. The vault
    /// client is released before returning, on success and on failure.
    pub async fn retrieve(
        mut self,
        request: &RetrievalRequest,
    ) -> Result<Retrieval, RetrieveError> {
        let result = self.run(request).await;
        self.service.close().await;
        result
    }

    async fn run(&self, request: &RetrievalRequest) -> Result<Retrieval, RetrieveError> {
        request.poll.validate()?;
        log::info!("format: {}", request.format);
        log::info!("interval: {:?}", request.poll.interval);
        log::info!("job id: {}", request.job_id.as_deref().unwrap_or("none"));

        let (job_id, source) = self.resolve_job(request).await?;

        log::info!("fetching output of job {}", job_id);
        let output = self.service.get_job_output(&job_id).await?;
        let path = match &request.output_path {
            Some(path) => path.clone(),
            None => default_output_path(
                &self.prefix,
                self.service.region(),
                self.service.vault(),
                Local::now().date_naive(),
                output.content_type.as_deref(),
                &request.format,
            ),
        };
        let json = is_json(output.content_type.as_deref(), &request.format);

        println!("{}: {}", "downloading".green(), path.display());
        let bytes_written = write_output(output.body, &path).await?;
        println!("{}: {}", "writing complete".green(), path.display());

        Ok(Retrieval {
            summary: summarize_file(&path, json).await,
            path,
            job_id,
            source,
            bytes_written,
        })
    }

    async fn resolve_job(
        &self,
        request: &RetrievalRequest,
    ) -> Result<(String, JobSource), RetrieveError> {
        if let Some(job_id) = &request.job_id {
            return Ok((job_id.clone(), JobSource::Explicit));
        }

        let jobs = self.service.list_completed_jobs(true).await?;
        if let Some(job) = select_reusable_job(&jobs, &request.format) {
            log::info!(
                "reusing inventory job {} ({}) completed {}",
                job.job_id,
                job.description.as_deref().unwrap_or("no description"),
                job.completion_date.as_deref().unwrap_or_default()
            );
            return Ok((job.job_id.clone(), JobSource::Reused));
        }

        let job_id = self
            .service
            .submit_inventory_job(&request.format, request.description.as_deref())
            .await?;
        log::info!("initiated job 'inventory-retrieval', job id: {}", job_id);

        self.wait_for_completion(&job_id, &request.poll).await?;
        Ok((job_id, JobSource::Submitted))
    }

    /// Sleeps `policy.interval` after every listing in which the job is
    /// missing or still running.
    async fn wait_for_completion(
        &self,
        job_id: &str,
        policy: &PollPolicy,
    ) -> Result<(), RetrieveError> {
        let started = Instant::now();
        loop {
            let jobs = self.service.list_completed_jobs(false).await?;
            if let Some(job) = jobs.iter().find(|x| x.job_id == job_id && x.completed) {
                if !job.succeeded() {
                    log::warn!(
                        "job {} completed with status {}",
                        job_id,
                        job.status_code.as_deref().unwrap_or("unknown")
                    );
                }
                log::info!("job {} completed", job_id);
                return Ok(());
            }

            let waited = started.elapsed();
            if let Some(max_wait) = policy.max_wait {
                if waited + policy.interval > max_wait {
                    return Err(RetrieveError::PollTimedOut {
                        job_id: job_id.to_owned(),
                        waited,
                    });
                }
            }
            log::info!(
                "job not completed, will try again in {} minutes",
                policy.interval.as_secs() / 60
            );
            tokio::time::sleep(policy.interval).await;
        }
    }
}

fn media_type(content_type: Option<&str>) -> Option<String> {
    content_type.map(|x| {
        x.split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
    })
}

fn is_json(content_type: Option<&str>, format: &InventoryFormat) -> bool {
    match media_type(content_type).as_deref() {
        Some("application/json") => true,
        Some("text/csv") => false,
        _ => format.matches("json"),
    }
}

/// `csv` or `json` as announced by the content type, otherwise the format
/// exactly as the user typed it.
pub fn output_suffix(content_type: Option<&str>, format: &InventoryFormat) -> String {
    match media_type(content_type).as_deref() {
        Some("text/csv") => String::from("csv"),
        Some("application/json") => String::from("json"),
        _ => format.as_str().to_owned(),
    }
}

pub fn default_output_path(
    prefix: &str,
    region: &str,
    vault: &str,
    date: NaiveDate,
    content_type: Option<&str>,
    format: &InventoryFormat,
) -> PathBuf {
    PathBuf::from(format!(
        "{}.{}.{}.{}.{}",
        prefix,
        region,
        vault,
        date.format("%Y%m%d"),
        output_suffix(content_type, format)
    ))
}

/// Source of the job output body, read chunk by chunk.
#[async_trait]
trait ChunkSource: Send {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, RetrieveError>;
}

#[async_trait]
impl ChunkSource for ByteStream {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, RetrieveError> {
        Ok(self.try_next().await?)
    }
}

/// Hidden sibling of `path` that receives the body while it downloads.
fn partial_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|x| x.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("inventory"));
    path.with_file_name(format!(".{}.part", name))
}

async fn copy_chunks(body: &mut impl ChunkSource, path: &Path) -> Result<u64, RetrieveError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;
    while let Some(bytes) = body.next_chunk().await? {
        file.write_all(&bytes).await?;
        written += bytes.len() as u64;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

/// Streams the body into `path`, replacing whatever was there only once the
/// whole body has been received.
async fn write_output(mut body: impl ChunkSource, path: &Path) -> Result<u64, RetrieveError> {
    if let Some(parent) = path.parent().filter(|x| !x.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let partial = partial_path(path);
    let copied = match copy_chunks(&mut body, &partial).await {
        Ok(written) => tokio::fs::rename(&partial, path)
            .await
            .map(|_| written)
            .map_err(RetrieveError::from),
        Err(reason) => Err(reason),
    };
    if copied.is_err() {
        if let Err(reason) = tokio::fs::remove_file(&partial).await {
            log::debug!("could not remove {}: {}", partial.display(), reason);
        }
    }
    copied
}
