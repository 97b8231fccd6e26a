use chrono::Local;
use colored::Colorize;
use std::path::{Path, PathBuf};

use crate::error::UploadError;
use crate::multipart_upload::{ArchiveTransfer, ProgressListener};

#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub file: String,
    pub dir: Option<String>,
    pub description: Option<String>,
}

impl UploadRequest {
    pub fn path(&self) -> PathBuf {
        match &self.dir {
            Some(dir) => Path::new(dir).join(&self.file),
            None => PathBuf::from(&self.file),
        }
    }

    pub fn description(&self) -> String {
        match &self.description {
            Some(description) => description.clone(),
            None => default_description(&self.file),
        }
    }
}

fn default_description(file: &str) -> String {
    format!("{} on {}", file, Local::now().format("%a %b %d %H:%M:%S %Y"))
}

/// Accumulates completed part sizes into a percentage of the archive size.
#[derive(Debug, Default)]
pub struct UploadProgress {
    total: u64,
    transferred: u64,
    part_size: u64,
    percentage: u64,
}

impl UploadProgress {
    pub fn new(total: u64) -> Self {
        UploadProgress {
            total,
            ..Default::default()
        }
    }

    pub fn percentage(&self) -> u64 {
        self.percentage
    }

    pub fn transferred(&self) -> u64 {
        self.transferred
    }
}

impl ProgressListener for UploadProgress {
    fn part_started(&mut self, bytes: u64) {
        self.part_size = bytes;
        log::debug!("part size: {}", bytes);
    }

    fn part_completed(&mut self) {
        self.transferred = (self.transferred + self.part_size).min(self.total);
        self.part_size = 0;
        let percentage = match self.total {
            0 => 100,
            total => self.transferred * 100 / total,
        };
        self.percentage = self.percentage.max(percentage);
        log::info!(
            "successfully transferred: {} / {} ({}%)",
            self.transferred,
            self.total,
            self.percentage
        );
    }
}

pub struct Uploader<T: ArchiveTransfer> {
    transfer: T,
}

impl<T: ArchiveTransfer> Uploader<T> {
    pub fn new(transfer: T) -> Self {
        Uploader { transfer }
    }

    /// Uploads the requested file and returns the new archive id. The
    /// transfer is released afterwards whatever the outcome.
    pub async fn upload(mut self, request: &UploadRequest) -> Result<String, UploadError> {
        let result = self.send(request).await;
        self.transfer.close().await;
        if let Err(reason) = &result {
            log::error!("upload of {} failed: {}", request.path().display(), reason);
        }
        result
    }

    async fn send(&self, request: &UploadRequest) -> Result<String, UploadError> {
        let path = request.path();
        let description = request.description();
        log::info!("file (archive): {}", path.display());
        log::info!("description: {}", description);

        let total = tokio::fs::metadata(&path)
            .await
            .map_err(|source| UploadError::Io {
                path: path.display().to_string(),
                source,
            })?
            .len();
        let mut progress = UploadProgress::new(total);

        let archive_id = self
            .transfer
            .upload_archive(&path, &description, &mut progress)
            .await?;
        if total == 0 {
            progress.part_completed();
        }
        log::info!(
            "done, transferred {} bytes ({}%)",
            progress.transferred(),
            progress.percentage()
        );
        println!("{}: {}", "archive id".green(), archive_id);
        Ok(archive_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, MockVault};
    use std::io::Write;

    #[test]
    fn test_progress_is_monotonic_and_reaches_100() {
        let mut progress = UploadProgress::new(250);
        let mut seen = Vec::new();
        for part in [100, 100, 50] {
            progress.part_started(part);
            progress.part_completed();
            seen.push(progress.percentage());
        }
        assert_eq!(seen, vec![40, 80, 100]);
        assert_eq!(progress.transferred(), 250);
    }

    #[test]
    fn test_progress_floors_percentage() {
        let mut progress = UploadProgress::new(3);
        progress.part_started(1);
        progress.part_completed();
        assert_eq!(progress.percentage(), 33);
    }

    #[test]
    fn test_progress_of_empty_archive() {
        let mut progress = UploadProgress::new(0);
        progress.part_completed();
        assert_eq!(progress.percentage(), 100);
    }

    #[test]
    fn test_request_path_and_description() {
        let request = UploadRequest {
            file: String::from("photos.tar"),
            dir: Some(String::from("/backups")),
            description: None,
        };
        assert_eq!(request.path(), PathBuf::from("/backups/photos.tar"));
        assert!(request.description().starts_with("photos.tar on "));

        let described = UploadRequest {
            description: Some(String::from("holiday")),
            ..request
        };
        assert_eq!(described.description(), "holiday");
    }

    #[tokio::test]
    async fn test_upload_returns_archive_id_and_releases_client() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[1u8; 300]).unwrap();
        let vault = MockVault::new();
        let calls = vault.calls();

        let request = UploadRequest {
            file: file.path().display().to_string(),
            dir: None,
            description: Some(String::from("backup")),
        };
        let archive_id = Uploader::new(vault).upload(&request).await.unwrap();

        assert_eq!(archive_id, "archive-1");
        let calls = calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![Call::Upload(String::from("backup")), Call::Close]
        );
    }

    #[tokio::test]
    async fn test_upload_failure_is_surfaced() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let vault = MockVault::new().failing_upload();
        let calls = vault.calls();

        let request = UploadRequest {
            file: file.path().display().to_string(),
            ..Default::default()
        };
        let result = Uploader::new(vault).upload(&request).await;

        assert!(matches!(result, Err(UploadError::Transfer(_))));
        assert_eq!(calls.lock().unwrap().last(), Some(&Call::Close));
    }

    #[tokio::test]
    async fn test_missing_file_never_reaches_the_vault() {
        let dir = tempfile::tempdir().unwrap();
        let vault = MockVault::new();
        let calls = vault.calls();

        let request = UploadRequest {
            file: String::from("missing.tar"),
            dir: Some(dir.path().display().to_string()),
            description: None,
        };
        let result = Uploader::new(vault).upload(&request).await;

        assert!(matches!(result, Err(UploadError::Io { .. })));
        assert_eq!(*calls.lock().unwrap(), vec![Call::Close]);
    }
}
