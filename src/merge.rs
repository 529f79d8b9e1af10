use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Where a principal was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Documentation,
    PolicyGenerator,
}

/// A principal as reported by one source, before merging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcedPrincipal {
    #[serde(rename = "servicePrincipal")]
    pub service_principal: String,
    pub reference_url: String,
}

impl SourcedPrincipal {
    pub fn new(service_principal: impl Into<String>, reference_url: impl Into<String>) -> Self {
        Self {
            service_principal: service_principal.into(),
            reference_url: reference_url.into(),
        }
    }
}

/// Display name -> principal, as produced by one source.
pub type SourceMap = BTreeMap<String, SourcedPrincipal>;
/// Service key -> merged entry. A `BTreeMap` so the output keys come out sorted.
pub type MergedMap = BTreeMap<String, ServiceEntry>;

/// One merged record of the output file.
///
/// Fields are declared in lexicographic order of their JSON names so the
/// serialized objects have sorted keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    #[serde(rename = "originalNames")]
    pub original_names: Vec<String>,
    pub reference_url: String,
    #[serde(rename = "servicePrincipal")]
    pub service_principal: String,
    pub sources: Vec<Source>,
}

impl ServiceEntry {
    fn new(name: &str, principal: &SourcedPrincipal, source: Source) -> Self {
        Self {
            original_names: vec![name.to_string()],
            reference_url: principal.reference_url.clone(),
            service_principal: principal.service_principal.clone(),
            sources: vec![source],
        }
    }
}

/// Key an entry is merged under: everything before the first `.` of the principal.
pub fn service_key(service_principal: &str) -> &str {
    service_principal
        .split('.')
        .next()
        .unwrap_or(service_principal)
}

/// Merges both sources into one map keyed by `service_key`.
///
/// Documentation entries go in first and are never overwritten: a later
/// duplicate only adds its name. Every policy generator hit on an existing key
/// appends another `PolicyGenerator` marker, duplicates included.
pub fn merge_service_principals(documentation: &SourceMap, policy_generator: &SourceMap) -> MergedMap {
    let mut merged = MergedMap::new();

    for (name, principal) in documentation {
        let key = service_key(&principal.service_principal);
        match merged.get_mut(key) {
            Some(entry) => entry.original_names.push(name.clone()),
            None => {
                merged.insert(
                    key.to_string(),
                    ServiceEntry::new(name, principal, Source::Documentation),
                );
            }
        }
    }

    for (name, principal) in policy_generator {
        let key = service_key(&principal.service_principal);
        match merged.get_mut(key) {
            Some(entry) => {
                entry.sources.push(Source::PolicyGenerator);
                entry.original_names.push(name.clone());
            }
            None => {
                merged.insert(
                    key.to_string(),
                    ServiceEntry::new(name, principal, Source::PolicyGenerator),
                );
            }
        }
    }

    merged
}

/// Per-source breakdown printed at the end of a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    pub total: usize,
    pub documentation_only: usize,
    pub policy_generator_only: usize,
    /// Entries with more than one source marker.
    pub both: usize,
}

impl MergeSummary {
    pub fn from_merged(merged: &MergedMap) -> Self {
        let mut summary = MergeSummary {
            total: merged.len(),
            ..Default::default()
        };
        for entry in merged.values() {
            match entry.sources.as_slice() {
                [Source::Documentation] => summary.documentation_only += 1,
                [Source::PolicyGenerator] => summary.policy_generator_only += 1,
                _ => {}
            }
            if entry.sources.len() > 1 {
                summary.both += 1;
            }
        }
        summary
    }
}
