//! NVD CVE record adapter
//!
//! Maps one CVE to the vulnerability graph. Entities are emitted parents
//! first: the vulnerability, its CWE links, references, CVSS metrics, patch
//! commits, then the configuration tree down to individual CPE matches.

use serde_json::Value;
use tracing::warn;
use vulngraph_common::digest::{identify, natural_key, CanonicalFields};
use vulngraph_common::{EntityType, NormalizedEntity};

use super::commit::CommitMatcher;
use super::cpe::Cpe;
use super::models::{Configuration, CpeMatch, Cve, CvssMetric, Reference};
use crate::error::Result;
use crate::framework::adapter::{Candidates, EntityAdapter};

const PATCH_TAG: &str = "Patch";

/// Adapter for NVD CVE API 2.0 records
#[derive(Debug, Clone)]
pub struct NvdAdapter {
    commits: CommitMatcher,
}

impl NvdAdapter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            commits: CommitMatcher::new()?,
        })
    }
}

fn association(
    entity_type: EntityType,
    parent_key: &str,
    parent_id: &str,
    vulnerability_id: &str,
) -> NormalizedEntity {
    let id = identify(
        entity_type,
        &CanonicalFields::new()
            .field(parent_key, parent_id)
            .field("vulnerability_id", vulnerability_id),
    );
    NormalizedEntity::new(entity_type, id)
        .with(parent_key, parent_id)
        .with("vulnerability_id", vulnerability_id)
}

fn is_cwe(value: &str) -> bool {
    value
        .strip_prefix("CWE-")
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Collects the entities of one CVE in emission order
struct GraphBuilder<'a> {
    cve: &'a Cve,
    vulnerability_id: String,
    entities: Vec<NormalizedEntity>,
}

impl<'a> GraphBuilder<'a> {
    fn new(cve: &'a Cve) -> Self {
        Self {
            cve,
            vulnerability_id: natural_key(&cve.id),
            entities: Vec::new(),
        }
    }

    fn push(&mut self, entity: NormalizedEntity) {
        self.entities.push(entity);
    }

    fn vulnerability(&mut self) {
        let cve = self.cve;
        let entity = NormalizedEntity::new(EntityType::Vulnerability, &self.vulnerability_id)
            .with("cve_id", cve.id.as_str())
            .with("source_identifier", cve.source_identifier.clone())
            .with("published", cve.published.clone())
            .with("last_modified", cve.last_modified.clone())
            .with("vuln_status", cve.vuln_status.clone())
            .with("description", cve.description().map(str::to_string));
        self.push(entity);
    }

    fn weaknesses(&mut self) {
        let cve = self.cve;
        for weakness in &cve.weaknesses {
            for description in weakness.description.iter().filter(|d| is_cwe(&d.value)) {
                let entity = NormalizedEntity::new(
                    EntityType::VulnerabilityCwe,
                    format!("{}_{}", self.vulnerability_id, description.value),
                )
                .with("vulnerability_id", self.vulnerability_id.as_str())
                .with("cwe_id", description.value.as_str())
                .with("source", weakness.source.clone());
                self.push(entity);
            }
        }
    }

    fn reference(&mut self, reference: &Reference) {
        let id = identify(
            EntityType::Reference,
            &CanonicalFields::new().field("url", reference.url.as_str()),
        );
        let entity = NormalizedEntity::new(EntityType::Reference, &id)
            .with("url", reference.url.as_str())
            .with("source", reference.source.clone())
            .with("tags", reference.tags.clone());
        self.push(entity);

        let link = association(
            EntityType::ReferenceAssociation,
            "reference_id",
            &id,
            &self.vulnerability_id,
        );
        self.push(link);
    }

    fn metric(&mut self, metric: &CvssMetric) {
        let content: CanonicalFields = metric
            .cvss_data
            .iter()
            .chain(&metric.extra)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let id = identify(EntityType::Cvss, &content);

        // v2 reports severity next to cvssData rather than inside it
        let field = |key: &str| {
            metric
                .cvss_data
                .get(key)
                .or_else(|| metric.extra.get(key))
                .cloned()
                .unwrap_or(Value::Null)
        };
        let entity = NormalizedEntity::new(EntityType::Cvss, &id)
            .with("version", field("version"))
            .with("vector_string", field("vectorString"))
            .with("base_score", field("baseScore"))
            .with("base_severity", field("baseSeverity"))
            .with("cvss_data", Value::Object(metric.cvss_data.clone()))
            .with("scores", Value::Object(metric.extra.clone()));
        self.push(entity);

        let link = association(
            EntityType::CvssAssociation,
            "cvss_id",
            &id,
            &self.vulnerability_id,
        )
        .with("source", metric.source.clone());
        self.push(link);
    }

    fn patch_commit(&mut self, matcher: &CommitMatcher, reference: &Reference) {
        let Some(commit) = matcher.parse(&reference.url) else {
            return;
        };

        let repository_id = identify(
            EntityType::Repository,
            &CanonicalFields::new()
                .field("owner", commit.owner.as_str())
                .field("name", commit.repo.as_str()),
        );
        let repository = NormalizedEntity::new(EntityType::Repository, &repository_id)
            .with("owner", commit.owner.as_str())
            .with("name", commit.repo.as_str())
            .with("url", format!("https://github.com/{}", commit.repository()));
        self.push(repository);
        let link = association(
            EntityType::RepositoryAssociation,
            "repository_id",
            &repository_id,
            &self.vulnerability_id,
        );
        self.push(link);

        let url = commit.url();
        let commit_id = identify(EntityType::Commit, &CanonicalFields::new().field("url", url.as_str()));
        let entity = NormalizedEntity::new(EntityType::Commit, &commit_id)
            .with("repository_id", repository_id)
            .with("sha", commit.sha.as_str())
            .with("url", url);
        self.push(entity);
        let link = association(
            EntityType::CommitAssociation,
            "commit_id",
            &commit_id,
            &self.vulnerability_id,
        );
        self.push(link);
    }

    fn configuration(&mut self, index: usize, configuration: &Configuration) {
        let configuration_id = identify(
            EntityType::Configuration,
            &CanonicalFields::new()
                .field("vulnerability_id", self.vulnerability_id.as_str())
                .field("index", index),
        );
        let entity = NormalizedEntity::new(EntityType::Configuration, &configuration_id)
            .with("vulnerability_id", self.vulnerability_id.as_str())
            .with("index", index)
            .with("operator", configuration.operator.clone())
            .with("negate", configuration.negate);
        self.push(entity);

        for (node_index, node) in configuration.nodes.iter().enumerate() {
            let node_id = identify(
                EntityType::Node,
                &CanonicalFields::new()
                    .field("configuration_id", configuration_id.as_str())
                    .field("index", node_index),
            );
            let entity = NormalizedEntity::new(EntityType::Node, &node_id)
                .with("configuration_id", configuration_id.as_str())
                .with("index", node_index)
                .with("operator", node.operator.clone())
                .with("negate", node.negate);
            self.push(entity);

            for cpe_match in &node.cpe_match {
                self.cpe_match(&node_id, cpe_match);
            }
        }
    }

    fn cpe_match(&mut self, node_id: &str, cpe_match: &CpeMatch) {
        let cpe: Cpe = match cpe_match.criteria.parse() {
            Ok(cpe) => cpe,
            Err(e) => {
                warn!(cve = %self.cve.id, criteria = %cpe_match.criteria, error = %e, "Skipping malformed CPE");
                return;
            },
        };

        let vendor_id = identify(
            EntityType::Vendor,
            &CanonicalFields::new().field("name", cpe.vendor.as_str()),
        );
        self.push(NormalizedEntity::new(EntityType::Vendor, &vendor_id).with("name", cpe.vendor.as_str()));

        let product_id = identify(
            EntityType::Product,
            &CanonicalFields::new()
                .field("vendor_id", vendor_id.as_str())
                .field("name", cpe.product.as_str())
                .field("part", cpe.part.as_str()),
        );
        let product = NormalizedEntity::new(EntityType::Product, &product_id)
            .with("vendor_id", vendor_id)
            .with("name", cpe.product.as_str())
            .with("part", cpe.part.as_str());
        self.push(product);

        let cpe_id = identify(
            EntityType::Cpe,
            &CanonicalFields::new().field("criteria", cpe_match.criteria.as_str()),
        );
        let entity = NormalizedEntity::new(EntityType::Cpe, &cpe_id)
            .with("product_id", product_id)
            .with("criteria", cpe_match.criteria.as_str())
            .with("version", cpe.version)
            .with("update", cpe.update)
            .with("edition", cpe.edition)
            .with("language", cpe.language)
            .with("sw_edition", cpe.sw_edition)
            .with("target_sw", cpe.target_sw)
            .with("target_hw", cpe.target_hw)
            .with("other", cpe.other);
        self.push(entity);

        let match_id = identify(
            EntityType::CpeMatch,
            &CanonicalFields::new()
                .field("match_criteria_id", cpe_match.match_criteria_id.as_str())
                .field("node_id", node_id),
        );
        let entity = NormalizedEntity::new(EntityType::CpeMatch, match_id)
            .with("cpe_id", cpe_id)
            .with("node_id", node_id)
            .with("match_criteria_id", cpe_match.match_criteria_id.as_str())
            .with("vulnerable", cpe_match.vulnerable)
            .with("version_start_including", cpe_match.version_start_including.clone())
            .with("version_start_excluding", cpe_match.version_start_excluding.clone())
            .with("version_end_including", cpe_match.version_end_including.clone())
            .with("version_end_excluding", cpe_match.version_end_excluding.clone());
        self.push(entity);
    }
}

impl EntityAdapter for NvdAdapter {
    type Record = Cve;

    fn name(&self) -> &str {
        "nvd"
    }

    fn candidates<'a>(&'a self, cve: &'a Cve) -> Candidates<'a> {
        let mut graph = GraphBuilder::new(cve);
        graph.vulnerability();
        graph.weaknesses();
        for reference in &cve.references {
            graph.reference(reference);
        }
        for metric in cve.metrics.primary() {
            graph.metric(metric);
        }
        for reference in cve.references.iter().filter(|r| r.has_tag(PATCH_TAG)) {
            graph.patch_commit(&self.commits, reference);
        }
        for (index, configuration) in cve.configurations.iter().enumerate() {
            graph.configuration(index, configuration);
        }
        Box::new(graph.entities.into_iter())
    }
}
