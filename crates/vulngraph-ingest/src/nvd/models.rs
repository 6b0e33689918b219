//! NVD CVE API 2.0 / JSON feed records
//!
//! Only the fields the adapter maps are typed; metric payloads stay as JSON
//! maps so every CVSS version shares one shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One page of the CVE API, or one JSON feed file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CveResponse {
    #[serde(default)]
    pub results_per_page: usize,
    #[serde(default)]
    pub start_index: usize,
    #[serde(default)]
    pub total_results: usize,
    #[serde(default)]
    pub vulnerabilities: Vec<CveItem>,
}

/// Wrapper around a CVE record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CveItem {
    pub cve: Cve,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cve {
    pub id: String,
    #[serde(default)]
    pub source_identifier: Option<String>,
    #[serde(default)]
    pub published: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub vuln_status: Option<String>,
    #[serde(default)]
    pub descriptions: Vec<LangString>,
    #[serde(default)]
    pub metrics: Metrics,
    #[serde(default)]
    pub weaknesses: Vec<Weakness>,
    #[serde(default)]
    pub configurations: Vec<Configuration>,
    #[serde(default)]
    pub references: Vec<Reference>,
}

impl Cve {
    /// English description, falling back to the first one
    pub fn description(&self) -> Option<&str> {
        self.descriptions
            .iter()
            .find(|d| d.lang == "en")
            .or_else(|| self.descriptions.first())
            .map(|d| d.value.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LangString {
    pub lang: String,
    pub value: String,
}

/// CVSS metrics by version
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(rename = "cvssMetricV2", default)]
    pub cvss_v2: Vec<CvssMetric>,
    #[serde(rename = "cvssMetricV30", default)]
    pub cvss_v30: Vec<CvssMetric>,
    #[serde(rename = "cvssMetricV31", default)]
    pub cvss_v31: Vec<CvssMetric>,
}

impl Metrics {
    /// Metrics from the primary scorer, newest version first
    pub fn primary(&self) -> impl Iterator<Item = &CvssMetric> {
        self.cvss_v31
            .iter()
            .chain(&self.cvss_v30)
            .chain(&self.cvss_v2)
            .filter(|m| m.is_primary())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CvssMetric {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(rename = "type", default)]
    pub metric_type: Option<String>,
    pub cvss_data: Map<String, Value>,
    /// Scores and flags reported next to `cvssData`
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CvssMetric {
    pub fn is_primary(&self) -> bool {
        self.metric_type.as_deref() == Some("Primary")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Weakness {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub description: Vec<LangString>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub negate: bool,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub negate: bool,
    #[serde(default)]
    pub cpe_match: Vec<CpeMatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpeMatch {
    pub vulnerable: bool,
    pub criteria: String,
    pub match_criteria_id: String,
    #[serde(default)]
    pub version_start_including: Option<String>,
    #[serde(default)]
    pub version_start_excluding: Option<String>,
    #[serde(default)]
    pub version_end_including: Option<String>,
    #[serde(default)]
    pub version_end_excluding: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub url: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Reference {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}
