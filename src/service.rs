use async_trait::async_trait;
use aws_sdk_glacier::types::{GlacierJobDescription, JobParameters};
use aws_sdk_glacier::Client;
use aws_smithy_types::byte_stream::ByteStream;
use aws_smithy_types::error::display::DisplayErrorContext;

use crate::config::VaultConfig;
use crate::error::ServiceError;
use crate::jobs::{InventoryFormat, InventoryJob, SUCCEEDED};

/// Output of a completed job, consumed exactly once.
#[derive(Debug)]
pub struct JobOutput {
    pub body: ByteStream,
    pub content_type: Option<String>,
}

/// Everything the commands need from a single remote vault.
#[async_trait]
pub trait VaultService: Send + Sync {
    fn region(&self) -> &str;

    fn vault(&self) -> &str;

    /// Returns the id of the newly initiated inventory-retrieval job.
    async fn submit_inventory_job(
        &self,
        format: &InventoryFormat,
        description: Option<&str>,
    ) -> Result<String, ServiceError>;

    /// Lists completed jobs of the vault, optionally only those that succeeded.
    async fn list_completed_jobs(
        &self,
        succeeded_only: bool,
    ) -> Result<Vec<InventoryJob>, ServiceError>;

    async fn get_job_output(&self, job_id: &str) -> Result<JobOutput, ServiceError>;

    /// Releases the underlying client. Calls made afterwards fail with
    /// [`ServiceError::Closed`].
    async fn close(&mut self);
}

pub struct GlacierVault {
    config: VaultConfig,
    client: Option<Client>,
}

impl GlacierVault {
    pub async fn connect(config: VaultConfig) -> Self {
        let sdk_config = config.load_sdk_config().await;
        log::debug!(
            "connected to glacier in {} for vault {}",
            config.region,
            config.vault
        );
        GlacierVault {
            client: Some(Client::new(&sdk_config)),
            config,
        }
    }

    pub(crate) fn client(&self) -> Result<&Client, ServiceError> {
        self.client.as_ref().ok_or(ServiceError::Closed)
    }

    pub(crate) fn account(&self) -> &str {
        &self.config.account
    }
}

fn to_inventory_job(description: &GlacierJobDescription) -> InventoryJob {
    InventoryJob {
        job_id: description.job_id().unwrap_or_default().to_owned(),
        action: description
            .action()
            .map(|x| x.as_str().to_owned())
            .unwrap_or_default(),
        format: description
            .inventory_retrieval_parameters()
            .and_then(|x| x.format())
            .map(str::to_owned),
        description: description.job_description().map(str::to_owned),
        completed: description.completed(),
        status_code: description.status_code().map(|x| x.as_str().to_owned()),
        completion_date: description.completion_date().map(str::to_owned),
    }
}

#[async_trait]
impl VaultService for GlacierVault {
    fn region(&self) -> &str {
        &self.config.region
    }

    fn vault(&self) -> &str {
        &self.config.vault
    }

    async fn submit_inventory_job(
        &self,
        format: &InventoryFormat,
        description: Option<&str>,
    ) -> Result<String, ServiceError> {
        let output = self
            .client()?
            .initiate_job()
            .account_id(self.account())
            .vault_name(self.vault())
            .job_parameters(
                JobParameters::builder()
                    .r#type("inventory-retrieval")
                    .format(format.canonical())
                    .set_description(description.map(str::to_owned))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| ServiceError::request("initiate_job", DisplayErrorContext(e)))?;

        output
            .job_id()
            .map(str::to_owned)
            .ok_or(ServiceError::MissingField {
                operation: "initiate_job",
                field: "jobId",
            })
    }

    async fn list_completed_jobs(
        &self,
        succeeded_only: bool,
    ) -> Result<Vec<InventoryJob>, ServiceError> {
        let client = self.client()?;
        let mut jobs = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut request = client
                .list_jobs()
                .account_id(self.account())
                .vault_name(self.vault())
                .completed("true")
                .set_marker(marker.take());
            if succeeded_only {
                request = request.statuscode(SUCCEEDED);
            }

            let output = request
                .send()
                .await
                .map_err(|e| ServiceError::request("list_jobs", DisplayErrorContext(e)))?;
            jobs.extend(output.job_list().iter().map(to_inventory_job));

            match output.marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_owned()),
                _ => break,
            }
        }

        log::debug!("vault {} reported {} completed jobs", self.vault(), jobs.len());
        Ok(jobs)
    }

    async fn get_job_output(&self, job_id: &str) -> Result<JobOutput, ServiceError> {
        let output = self
            .client()?
            .get_job_output()
            .account_id(self.account())
            .vault_name(self.vault())
            .job_id(job_id)
            .send()
            .await
            .map_err(|e| ServiceError::request("get_job_output", DisplayErrorContext(e)))?;

        Ok(JobOutput {
            content_type: output.content_type().map(str::to_owned),
            body: output.body,
        })
    }

    async fn close(&mut self) {
        if self.client.take().is_some() {
            log::debug!("released glacier client for vault {}", self.config.vault);
        }
    }
}
