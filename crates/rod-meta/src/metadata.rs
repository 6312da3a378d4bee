use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use rod_types::Resource;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{MetaError, MetaResult};
use crate::resource::ResourceMeta;
use crate::version::Version;

/// File name of the metadata document inside a database directory.
pub const METADATA_FILE: &str = "database.json";

/// Per-database metadata document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub version: Version,
    pub id: Uuid,
    created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resources: BTreeMap<String, ResourceMeta>,
}

impl Metadata {
    /// Fresh metadata for a database created by library `version`.
    pub fn new(version: Version) -> Self {
        let now = Utc::now();
        Self {
            version,
            id: Uuid::now_v7(),
            created_at: now,
            updated_at: now,
            resources: BTreeMap::new(),
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Refresh the update timestamp after a successful store.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Whether a library at version `running` may open this database.
    pub fn valid(&self, running: &Version) -> bool {
        self.version.accepts(running)
    }

    /// Fail with [`MetaError::IncompatibleVersion`] unless [`Metadata::valid`].
    pub fn ensure_valid(&self, running: &Version) -> MetaResult<()> {
        if self.valid(running) {
            Ok(())
        } else {
            Err(MetaError::IncompatibleVersion {
                stored: self.version,
                running: *running,
            })
        }
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceMeta> {
        self.resources.get(name)
    }

    pub fn resource_mut(&mut self, name: &str) -> MetaResult<&mut ResourceMeta> {
        self.resources
            .get_mut(name)
            .ok_or_else(|| MetaError::MissingResource(name.to_string()))
    }

    /// Record a compiled resource, keeping the counters of an existing entry.
    pub fn register(&mut self, resource: &Resource) {
        let fresh = ResourceMeta::from_resource(resource);
        match self.resources.get_mut(resource.name()) {
            Some(existing) => {
                let ResourceMeta {
                    name_hash,
                    count,
                    bytes,
                    join_offsets,
                    stem,
                    container_stem,
                    ..
                } = std::mem::replace(existing, fresh);
                existing.name_hash = name_hash;
                existing.count = count;
                existing.bytes = bytes;
                existing.stem = stem;
                existing.container_stem = container_stem;
                for (name, offset) in join_offsets {
                    existing.join_offsets.entry(name).and_modify(|o| *o = offset);
                }
            }
            None => {
                self.resources.insert(resource.name().to_string(), fresh);
            }
        }
    }

    /// Compare a compiled resource against its stored descriptor.
    ///
    /// A resource the database has never seen is accepted; it will be
    /// registered on first use.
    pub fn check_resource(&self, resource: &Resource) -> MetaResult<()> {
        match self.resources.get(resource.name()) {
            Some(stored) => {
                debug!(resource = resource.name(), "checking stored descriptor");
                ResourceMeta::from_resource(resource).check_compatibility(stored)
            }
            None => Ok(()),
        }
    }

    /// Rename every resource entry so the stored schema can be loaded under
    /// an aliased namespace.
    pub fn add_prefix(&mut self, prefix: &str) {
        let resources = std::mem::take(&mut self.resources);
        self.resources = resources
            .into_values()
            .map(|mut meta| {
                meta.add_prefix(prefix);
                (meta.name.clone(), meta)
            })
            .collect();
    }

    /// Rebuild every stored resource, parents before children.
    pub fn to_resources(&self) -> MetaResult<Vec<Resource>> {
        let mut ordered: Vec<&ResourceMeta> = Vec::with_capacity(self.resources.len());
        let mut pending: Vec<&ResourceMeta> = self.resources.values().collect();
        while !pending.is_empty() {
            let before = pending.len();
            pending.retain(|meta| {
                let ready = match &meta.parent {
                    Some(parent) => {
                        !self.resources.contains_key(parent)
                            || ordered.iter().any(|m| &m.name == parent)
                    }
                    None => true,
                };
                if ready {
                    ordered.push(meta);
                }
                !ready
            });
            if pending.len() == before {
                return Err(MetaError::IncompatibleClass {
                    resource: pending[0].name.clone(),
                    reason: "cyclic parent chain".to_string(),
                });
            }
        }
        ordered.into_iter().map(ResourceMeta::to_resource).collect()
    }

    pub fn load(path: &Path) -> MetaResult<Self> {
        let text = fs::read_to_string(path)?;
        let metadata: Self = serde_json::from_str(&text)?;
        info!(
            path = %path.display(),
            version = %metadata.version,
            resources = metadata.resources.len(),
            "loaded metadata"
        );
        Ok(metadata)
    }

    pub fn store(&self, path: &Path) -> MetaResult<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        debug!(path = %path.display(), "stored metadata");
        Ok(())
    }
}
