//! In-memory vault shared by the unit tests.

use async_trait::async_trait;
use aws_smithy_types::byte_stream::ByteStream;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::{ServiceError, UploadError};
use crate::jobs::{InventoryFormat, InventoryJob, INVENTORY_RETRIEVAL, SUCCEEDED};
use crate::multipart_upload::{ArchiveTransfer, ProgressListener};
use crate::service::{JobOutput, VaultService};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Submit(String, Option<String>),
    List(bool),
    Output(String),
    Upload(String),
    Close,
}

pub fn succeeded_job(id: &str, format: &str, completed: &str) -> InventoryJob {
    InventoryJob {
        job_id: id.to_owned(),
        action: INVENTORY_RETRIEVAL.to_owned(),
        format: Some(format.to_owned()),
        description: None,
        completed: true,
        status_code: Some(SUCCEEDED.to_owned()),
        completion_date: Some(completed.to_owned()),
    }
}

pub fn pending_job(id: &str) -> InventoryJob {
    InventoryJob {
        job_id: id.to_owned(),
        action: INVENTORY_RETRIEVAL.to_owned(),
        status_code: Some(String::from("InProgress")),
        ..Default::default()
    }
}

pub struct MockVault {
    calls: Arc<Mutex<Vec<Call>>>,
    completed: Vec<InventoryJob>,
    polls: Mutex<VecDeque<Vec<InventoryJob>>>,
    submitted_id: String,
    content_type: Option<String>,
    body: Vec<u8>,
    fail_output: bool,
    fail_upload: bool,
}

impl MockVault {
    pub fn new() -> Self {
        MockVault {
            calls: Arc::new(Mutex::new(Vec::new())),
            completed: Vec::new(),
            polls: Mutex::new(VecDeque::new()),
            submitted_id: String::from("new-job"),
            content_type: None,
            body: Vec::new(),
            fail_output: false,
            fail_upload: false,
        }
    }

    /// Jobs returned when listing succeeded jobs.
    pub fn with_completed(mut self, jobs: Vec<InventoryJob>) -> Self {
        self.completed = jobs;
        self
    }

    /// Successive answers to unfiltered listings; the last one repeats.
    pub fn with_polls(self, polls: Vec<Vec<InventoryJob>>) -> Self {
        MockVault {
            polls: Mutex::new(polls.into()),
            ..self
        }
    }

    pub fn with_output(mut self, content_type: Option<&str>, body: &str) -> Self {
        self.content_type = content_type.map(str::to_owned);
        self.body = body.as_bytes().to_vec();
        self
    }

    pub fn failing_output(mut self) -> Self {
        self.fail_output = true;
        self
    }

    pub fn failing_upload(mut self) -> Self {
        self.fail_upload = true;
        self
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<Call>>> {
        Arc::clone(&self.calls)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl VaultService for MockVault {
    fn region(&self) -> &str {
        "eu-west-1"
    }

    fn vault(&self) -> &str {
        "photos"
    }

    async fn submit_inventory_job(
        &self,
        format: &InventoryFormat,
        description: Option<&str>,
    ) -> Result<String, ServiceError> {
        self.record(Call::Submit(format.canonical(), description.map(str::to_owned)));
        Ok(self.submitted_id.clone())
    }

    async fn list_completed_jobs(
        &self,
        succeeded_only: bool,
    ) -> Result<Vec<InventoryJob>, ServiceError> {
        self.record(Call::List(succeeded_only));
        if succeeded_only {
            return Ok(self.completed.clone());
        }
        let mut polls = self.polls.lock().unwrap();
        let jobs = match polls.len() {
            0 => Vec::new(),
            1 => polls[0].clone(),
            _ => polls.pop_front().unwrap_or_default(),
        };
        Ok(jobs)
    }

    async fn get_job_output(&self, job_id: &str) -> Result<JobOutput, ServiceError> {
        self.record(Call::Output(job_id.to_owned()));
        if self.fail_output {
            return Err(ServiceError::request(
                "get_job_output",
                "ResourceNotFoundException: The job ID was not found",
            ));
        }
        Ok(JobOutput {
            body: ByteStream::from(self.body.clone()),
            content_type: self.content_type.clone(),
        })
    }

    async fn close(&mut self) {
        self.record(Call::Close);
    }
}

#[async_trait]
impl ArchiveTransfer for MockVault {
    async fn upload_archive(
        &self,
        path: &Path,
        description: &str,
        progress: &mut dyn ProgressListener,
    ) -> Result<String, UploadError> {
        self.record(Call::Upload(description.to_owned()));
        if self.fail_upload {
            return Err(UploadError::Transfer(ServiceError::request(
                "initiate_multipart_upload",
                "ThrottlingException",
            )));
        }
        let size = std::fs::metadata(path)
            .map_err(|source| UploadError::Io {
                path: path.display().to_string(),
                source,
            })?
            .len();
        if size > 0 {
            progress.part_started(size);
            progress.part_completed();
        }
        Ok(String::from("archive-1"))
    }
}
