use async_trait::async_trait;
use aws_smithy_types::byte_stream::ByteStream;
use aws_smithy_types::error::display::DisplayErrorContext;
use bytes::Bytes;
use colored::Colorize;
use sha256::digest;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::error::{ServiceError, UploadError};
use crate::service::{GlacierVault, VaultService};

/// Leaf size of the Glacier tree hash, and the smallest allowed part size.
pub const CHUNK_SIZE: usize = 1048576;
const MAX_PARTS: u64 = 10_000;
const MAX_PART_SIZE: u64 = 4 * 1024 * 1024 * 1024;

/// Notified by a transfer as parts go over the wire.
pub trait ProgressListener: Send {
    fn part_started(&mut self, bytes: u64);
    fn part_completed(&mut self);
}

#[async_trait]
pub trait ArchiveTransfer: VaultService {
    /// Uploads the file at `path` as a single archive and returns its id.
    async fn upload_archive(
        &self,
        path: &Path,
        description: &str,
        progress: &mut dyn ProgressListener,
    ) -> Result<String, UploadError>;
}

/// Smallest power-of-two multiple of 1 MiB that fits the archive in
/// `MAX_PARTS` parts.
pub fn part_size_for(archive_size: u64) -> u64 {
    let mut size = CHUNK_SIZE as u64;
    while size * MAX_PARTS < archive_size && size < MAX_PART_SIZE {
        size *= 2;
    }
    size
}

fn leaf_hashes(buffer: &[u8]) -> Vec<String> {
    buffer.chunks(CHUNK_SIZE).map(digest).collect()
}

/// Combines 1 MiB leaf hashes pairwise, level by level, into the tree hash
/// Glacier expects. An odd node at the end of a level is promoted as is.
pub fn tree_hash(leaves: &[String]) -> Result<String, hex::FromHexError> {
    if leaves.is_empty() {
        return Ok(digest(Vec::<u8>::new()));
    }
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        let mut next = Vec::new();
        for pair in level.chunks(2) {
            match pair {
                [left, right] => {
                    let mut bytes = hex::decode(left)?;
                    bytes.extend(hex::decode(right)?);
                    next.push(digest(bytes));
                }
                _ => next.extend(pair.iter().cloned()),
            }
        }
        level = next;
    }
    Ok(level.swap_remove(0))
}

fn hash_error(reason: hex::FromHexError) -> UploadError {
    UploadError::Transfer(ServiceError::request("tree_hash", reason))
}

impl GlacierVault {
    async fn send_parts(
        &self,
        file: &mut File,
        path: &Path,
        upload_id: &str,
        archive_size: u64,
        part_size: u64,
        progress: &mut dyn ProgressListener,
    ) -> Result<String, UploadError> {
        let client = self.client()?;
        let mut leaves = Vec::new();
        let mut offset = 0u64;

        loop {
            let mut buffer = Vec::with_capacity(part_size as usize);
            let bytes_read = (&mut *file)
                .take(part_size)
                .read_to_end(&mut buffer)
                .await
                .map_err(|source| UploadError::Io {
                    path: path.display().to_string(),
                    source,
                })? as u64;
            if bytes_read == 0 {
                break;
            }

            let part_leaves = leaf_hashes(&buffer);
            let checksum = tree_hash(&part_leaves).map_err(hash_error)?;
            leaves.extend(part_leaves);

            progress.part_started(bytes_read);
            let output = client
                .upload_multipart_part()
                .account_id(self.account())
                .vault_name(self.vault())
                .upload_id(upload_id)
                .range(format!("bytes {}-{}/*", offset, offset + bytes_read - 1))
                .checksum(checksum)
                .body(ByteStream::from(Bytes::from(buffer)))
                .send()
                .await
                .map_err(|e| {
                    ServiceError::request("upload_multipart_part", DisplayErrorContext(e))
                })?;
            progress.part_completed();

            log::debug!(
                "uploaded part at offset {} ({} bytes), checksum {}",
                offset,
                bytes_read,
                output.checksum().unwrap_or_default()
            );
            offset += bytes_read;
        }

        let output = client
            .complete_multipart_upload()
            .account_id(self.account())
            .vault_name(self.vault())
            .upload_id(upload_id)
            .archive_size(archive_size.to_string())
            .checksum(tree_hash(&leaves).map_err(hash_error)?)
            .send()
            .await
            .map_err(|e| ServiceError::request("complete_multipart_upload", DisplayErrorContext(e)))?;

        log::info!(
            "completed multipart upload, location: {}, checksum: {}",
            output.location().unwrap_or_default().yellow(),
            output.checksum().unwrap_or_default().yellow()
        );
        output
            .archive_id()
            .map(str::to_owned)
            .ok_or(UploadError::Transfer(ServiceError::MissingField {
                operation: "complete_multipart_upload",
                field: "archiveId",
            }))
    }

    async fn abort_upload(&self, upload_id: &str) {
        let Ok(client) = self.client() else { return };
        let aborted = client
            .abort_multipart_upload()
            .account_id(self.account())
            .vault_name(self.vault())
            .upload_id(upload_id)
            .send()
            .await;
        if let Err(reason) = aborted {
            log::warn!(
                "failed to abort multipart upload {}: {}",
                upload_id,
                DisplayErrorContext(reason)
            );
        }
    }
}

#[async_trait]
impl ArchiveTransfer for GlacierVault {
    async fn upload_archive(
        &self,
        path: &Path,
        description: &str,
        progress: &mut dyn ProgressListener,
    ) -> Result<String, UploadError> {
        let io_error = |source| UploadError::Io {
            path: path.display().to_string(),
            source,
        };
        let mut file = File::open(path).await.map_err(io_error)?;
        let archive_size = file.metadata().await.map_err(io_error)?.len();
        let part_size = part_size_for(archive_size);

        let initiated = self
            .client()?
            .initiate_multipart_upload()
            .account_id(self.account())
            .vault_name(self.vault())
            .archive_description(description)
            .part_size(part_size.to_string())
            .send()
            .await
            .map_err(|e| ServiceError::request("initiate_multipart_upload", DisplayErrorContext(e)))?;
        let upload_id = initiated
            .upload_id()
            .ok_or(ServiceError::MissingField {
                operation: "initiate_multipart_upload",
                field: "uploadId",
            })?
            .to_owned();
        log::debug!("initiated multipart upload {} with part size {}", upload_id, part_size);

        match self
            .send_parts(&mut file, path, &upload_id, archive_size, part_size, progress)
            .await
        {
            Ok(archive_id) => Ok(archive_id),
            Err(reason) => {
                self.abort_upload(&upload_id).await;
                Err(reason)
            }
        }
    }
}
