use serde::Deserialize;
use std::fmt;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct ArchiveItem {
    #[serde(rename = "CreationDate")]
    creation_date: String,
    #[serde(rename = "Size")]
    size: u64,
}

#[derive(Debug, Deserialize)]
struct VaultInventory {
    #[serde(rename = "InventoryDate")]
    inventory_date: String,
    #[serde(rename = "ArchiveList")]
    archive_list: Vec<ArchiveItem>,
}

/// Short description of a downloaded inventory document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventorySummary {
    pub archives: usize,
    pub total_size: Option<u64>,
    pub inventory_date: Option<String>,
    pub newest_archive: Option<String>,
}

impl fmt::Display for InventorySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} archives", self.archives)?;
        if let Some(size) = self.total_size {
            write!(f, ", {} bytes", size)?;
        }
        if let Some(date) = &self.inventory_date {
            write!(f, ", inventory taken {}", date)?;
        }
        if let Some(newest) = &self.newest_archive {
            write!(f, ", newest archive created {}", newest)?;
        }
        Ok(())
    }
}

pub fn summarize_json(text: &str) -> Result<InventorySummary, serde_json::Error> {
    let inventory: VaultInventory = serde_json::from_str(text)?;
    Ok(InventorySummary {
        archives: inventory.archive_list.len(),
        total_size: Some(inventory.archive_list.iter().map(|x| x.size).sum()),
        // ISO 8601 timestamps of the same shape order lexically
        newest_archive: inventory
            .archive_list
            .iter()
            .map(|x| x.creation_date.clone())
            .max(),
        inventory_date: Some(inventory.inventory_date),
    })
}

/// The CSV inventory carries a header line and one record per archive.
pub fn summarize_csv(text: &str) -> InventorySummary {
    let records = text.lines().filter(|x| !x.trim().is_empty()).count();
    InventorySummary {
        archives: records.saturating_sub(1),
        ..Default::default()
    }
}

/// Summarises the inventory written at `path`. Failures are logged and
/// yield `None`; the file itself stays as downloaded.
pub async fn summarize_file(path: &Path, json: bool) -> Option<InventorySummary> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(reason) => {
            log::warn!("could not read back {}: {}", path.display(), reason);
            return None;
        }
    };
    if !json {
        return Some(summarize_csv(&text));
    }
    match summarize_json(&text) {
        Ok(summary) => Some(summary),
        Err(reason) => {
            log::warn!("{} is not a JSON inventory: {}", path.display(), reason);
            None
        }
    }
}
