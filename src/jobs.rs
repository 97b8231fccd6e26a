use chrono::{DateTime, FixedOffset};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

pub const INVENTORY_RETRIEVAL: &str = "InventoryRetrieval";
pub const SUCCEEDED: &str = "Succeeded";

/// An inventory format as the user spelled it. Matching is case-insensitive,
/// but the original spelling is kept for file naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryFormat(String);

impl InventoryFormat {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Spelling expected by the Glacier job parameters.
    pub fn canonical(&self) -> String {
        self.0.to_ascii_uppercase()
    }

    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl Default for InventoryFormat {
    fn default() -> Self {
        InventoryFormat(String::from("CSV"))
    }
}

impl FromStr for InventoryFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("csv") || s.eq_ignore_ascii_case("json") {
            Ok(InventoryFormat(s.to_owned()))
        } else {
            Err(ConfigError::UnsupportedFormat(s.to_owned()))
        }
    }
}

impl fmt::Display for InventoryFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A job as reported by the vault's job listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryJob {
    pub job_id: String,
    pub action: String,
    pub format: Option<String>,
    pub description: Option<String>,
    pub completed: bool,
    pub status_code: Option<String>,
    pub completion_date: Option<String>,
}

impl InventoryJob {
    pub fn is_inventory_retrieval(&self) -> bool {
        self.action == INVENTORY_RETRIEVAL
    }

    pub fn succeeded(&self) -> bool {
        self.status_code.as_deref() == Some(SUCCEEDED)
    }
}

fn completed_at(job: &InventoryJob) -> Option<DateTime<FixedOffset>> {
    let raw = job.completion_date.as_deref()?;
    DateTime::parse_from_rfc3339(raw).ok()
}

/// Picks the most recently completed inventory job of the requested format.
///
/// `jobs` is expected to hold completed, succeeded jobs only. Jobs of another
/// action or format are ignored, and the description never takes part in the
/// match. If a single candidate carries an unreadable completion date the
/// whole scan is abandoned and `None` is returned, so a fresh job gets
/// submitted rather than reusing a job picked from a partial ranking.
pub fn select_reusable_job<'a>(
    jobs: &'a [InventoryJob],
    format: &InventoryFormat,
) -> Option<&'a InventoryJob> {
    let mut latest: Option<(&InventoryJob, DateTime<FixedOffset>)> = None;

    for job in jobs.iter().filter(|x| x.is_inventory_retrieval()) {
        if !job.format.as_deref().is_some_and(|x| format.matches(x)) {
            continue;
        }
        let Some(completed) = completed_at(job) else {
            log::warn!(
                "job {} has an unreadable completion date {:?}, not reusing any job",
                job.job_id,
                job.completion_date
            );
            return None;
        };
        match latest {
            Some((_, best)) if best >= completed => {}
            _ => latest = Some((job, completed)),
        }
    }

    latest.map(|(job, _)| job)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str, format: &str, completed: &str) -> InventoryJob {
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

    fn csv() -> InventoryFormat {
        "CSV".parse().unwrap()
    }

    #[test]
    fn test_format_parsing() {
        let format: InventoryFormat = "json".parse().unwrap();
        assert_eq!(format.as_str(), "json");
        assert_eq!(format.canonical(), "JSON");
        assert!(format.matches("JSON"));
        match "xml".parse::<InventoryFormat>() {
            Err(ConfigError::UnsupportedFormat(format)) => assert_eq!(format, "xml"),
            other => panic!("expected unsupported format, got {:?}", other),
        }
        assert_eq!(InventoryFormat::default().as_str(), "CSV");
    }

    #[test]
    fn test_latest_wins_regardless_of_order() {
        let older = job("older", "CSV", "2024-01-01T10:00:00.000Z");
        let newer = job("newer", "CSV", "2024-01-03T10:00:00.000Z");

        let forward = vec![older.clone(), newer.clone()];
        let backward = vec![newer, older];

        assert_eq!(select_reusable_job(&forward, &csv()).unwrap().job_id, "newer");
        assert_eq!(select_reusable_job(&backward, &csv()).unwrap().job_id, "newer");
    }

    #[test]
    fn test_format_filter_beats_recency() {
        let jobs = vec![
            job("csv-job", "CSV", "2024-01-02T10:00:00.000Z"),
            job("json-job", "JSON", "2024-01-05T10:00:00.000Z"),
        ];
        assert_eq!(select_reusable_job(&jobs, &csv()).unwrap().job_id, "csv-job");
    }

    #[test]
    fn test_format_match_is_case_insensitive() {
        let jobs = vec![job("a", "json", "2024-01-02T10:00:00.000Z")];
        let format: InventoryFormat = "JSON".parse().unwrap();
        assert_eq!(select_reusable_job(&jobs, &format).unwrap().job_id, "a");
    }

    #[test]
    fn test_unparseable_date_aborts_scan() {
        let jobs = vec![
            job("good", "CSV", "2024-01-02T10:00:00.000Z"),
            job("bad", "CSV", "yesterday"),
            job("later", "CSV", "2024-01-09T10:00:00.000Z"),
        ];
        assert!(select_reusable_job(&jobs, &csv()).is_none());

        let mut missing = job("missing", "CSV", "");
        missing.completion_date = None;
        assert!(select_reusable_job(&[missing], &csv()).is_none());
    }

    #[test]
    fn test_bad_date_on_other_format_is_ignored() {
        let jobs = vec![
            job("good", "CSV", "2024-01-02T10:00:00.000Z"),
            job("bad", "JSON", "not a date"),
        ];
        assert_eq!(select_reusable_job(&jobs, &csv()).unwrap().job_id, "good");
    }

    #[test]
    fn test_other_actions_and_empty_list() {
        let mut retrieval = job("archive", "CSV", "2024-01-02T10:00:00.000Z");
        retrieval.action = String::from("ArchiveRetrieval");
        assert!(select_reusable_job(&[retrieval], &csv()).is_none());
        assert!(select_reusable_job(&[], &csv()).is_none());
    }
}
