//! NVD JSON feed loader
//!
//! Accepts a single feed file or a directory of `*.json` feed files. Files in
//! a directory are read in name order so runs over the same directory see
//! records in the same order.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::models::{Cve, CveResponse};
use crate::error::{IngestError, Result};

/// Parse one feed document
pub fn parse_feed(content: &str) -> Result<Vec<Cve>> {
    let response: CveResponse = serde_json::from_str(content)?;
    Ok(response.vulnerabilities.into_iter().map(|item| item.cve).collect())
}

async fn feed_files(path: &Path) -> Result<Vec<PathBuf>> {
    let metadata = tokio::fs::metadata(path).await?;
    if metadata.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(path).await?;
    while let Some(entry) = entries.next_entry().await? {
        let file = entry.path();
        if file.extension().is_some_and(|ext| ext == "json") {
            files.push(file);
        }
    }
    files.sort();

    if files.is_empty() {
        return Err(IngestError::Source(format!(
            "No *.json feed files in {}",
            path.display()
        )));
    }
    Ok(files)
}

/// Load every CVE from a feed file or directory
pub async fn load_feed(path: &Path) -> Result<Vec<Cve>> {
    let files = feed_files(path).await?;
    let mut records = Vec::new();

    for file in &files {
        let content = tokio::fs::read_to_string(file).await?;
        let cves = parse_feed(&content).map_err(|e| {
            IngestError::Source(format!("Failed to parse {}: {}", file.display(), e))
        })?;
        debug!(file = %file.display(), records = cves.len(), "Loaded feed file");
        records.extend(cves);
    }

    info!(path = %path.display(), files = files.len(), records = records.len(), "Loaded NVD feed");
    Ok(records)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn feed(ids: &[&str]) -> String {
        let items: Vec<_> = ids
            .iter()
            .map(|id| serde_json::json!({"cve": {"id": id}}))
            .collect();
        serde_json::json!({"resultsPerPage": ids.len(), "vulnerabilities": items}).to_string()
    }

    #[tokio::test]
    async fn test_load_single_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("nvdcve-2.0-2021.json");
        std::fs::write(&file, feed(&["CVE-2021-0001", "CVE-2021-0002"])).unwrap();

        let records = load_feed(&file).await.unwrap();
        let ids: Vec<_> = records.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["CVE-2021-0001", "CVE-2021-0002"]);
    }

    #[tokio::test]
    async fn test_load_directory_in_name_order() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.json"), feed(&["CVE-2022-0001"])).unwrap();
        std::fs::write(dir.path().join("a.json"), feed(&["CVE-2021-0001"])).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let records = load_feed(dir.path()).await.unwrap();
        let ids: Vec<_> = records.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["CVE-2021-0001", "CVE-2022-0001"]);
    }

    #[tokio::test]
    async fn test_empty_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(load_feed(dir.path()).await, Err(IngestError::Source(_))));
    }

    #[tokio::test]
    async fn test_malformed_file_names_the_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("broken.json");
        std::fs::write(&file, "{\"vulnerabilities\": [").unwrap();

        let err = load_feed(&file).await.unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }
}
