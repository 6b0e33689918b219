//! Static dependency layers
//!
//! Layer `k` may only reference types from layers `< k`. Layers are supplied
//! by the caller and checked once against [`EntityType::references`].

use vulngraph_common::{EntityType, NormalizedEntity};

use crate::error::{IngestError, Result};

/// Validated, ordered partition of entity types
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyLayers {
    layers: Vec<Vec<EntityType>>,
    layer_of: [Option<usize>; EntityType::COUNT],
}

impl DependencyLayers {
    /// Validate a layer list.
    ///
    /// Rejects empty layers, types listed twice, and types whose references
    /// point at a type in the same layer, a later one, or none.
    pub fn new(layers: Vec<Vec<EntityType>>) -> Result<Self> {
        if layers.is_empty() {
            return Err(IngestError::InvalidLayers("no layers given".to_string()));
        }

        let mut layer_of = [None; EntityType::COUNT];
        for (k, layer) in layers.iter().enumerate() {
            if layer.is_empty() {
                return Err(IngestError::InvalidLayers(format!("layer {k} is empty")));
            }
            for entity_type in layer {
                if let Some(previous) = layer_of[entity_type.index()].replace(k) {
                    return Err(IngestError::InvalidLayers(format!(
                        "{entity_type} appears in layers {previous} and {k}"
                    )));
                }
            }
        }

        for (k, layer) in layers.iter().enumerate() {
            for entity_type in layer {
                for reference in entity_type.references() {
                    match layer_of[reference.target.index()] {
                        Some(j) if j < k => {},
                        Some(j) => {
                            return Err(IngestError::InvalidLayers(format!(
                                "{entity_type} (layer {k}) references {} in layer {j}",
                                reference.target
                            )))
                        },
                        None => {
                            return Err(IngestError::InvalidLayers(format!(
                                "{entity_type} (layer {k}) references {}, which is in no layer",
                                reference.target
                            )))
                        },
                    }
                }
            }
        }

        Ok(Self { layers, layer_of })
    }

    /// Layers for the full vulnerability graph:
    ///
    /// 0. roots (vulnerability, reference, cvss, repository, vendor)
    /// 1. associations and first-level children (commit, configuration, product)
    /// 2. commit associations, nodes, cpes
    /// 3. cpe matches
    pub fn standard() -> Result<Self> {
        use EntityType::*;

        Self::new(vec![
            vec![Vulnerability, Reference, Cvss, Repository, Vendor],
            vec![
                VulnerabilityCwe,
                ReferenceAssociation,
                CvssAssociation,
                RepositoryAssociation,
                Commit,
                Configuration,
                Product,
            ],
            vec![CommitAssociation, Node, Cpe],
            vec![CpeMatch],
        ])
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layer(&self, k: usize) -> Option<&[EntityType]> {
        self.layers.get(k).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = &[EntityType]> {
        self.layers.iter().map(Vec::as_slice)
    }

    /// Layer index of `entity_type`; unlayered types are a contract violation.
    pub fn layer_of(&self, entity_type: EntityType) -> Result<usize> {
        self.layer_of[entity_type.index()].ok_or(IngestError::UnlayeredType(entity_type))
    }

    /// Split entities by layer, keeping their relative order.
    pub fn partition<I>(&self, entities: I) -> Result<Vec<Vec<NormalizedEntity>>>
    where
        I: IntoIterator<Item = NormalizedEntity>,
    {
        let mut partitioned: Vec<Vec<NormalizedEntity>> = vec![Vec::new(); self.layers.len()];
        for entity in entities {
            let k = self.layer_of(entity.entity_type)?;
            partitioned[k].push(entity);
        }
        Ok(partitioned)
    }
}
