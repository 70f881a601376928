use super::{scan_prefix, DirectiveSource, KeyRule, OverrideProvider, ProviderError};
use crate::cancel::Cancellation;
use crate::payload::Directive;
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;

/// Provider backed by an in-memory key -> values map
///
/// Can be loaded from a YAML (or JSON) values file:
/// ```yaml
/// /nginx/nginx/worker_processes: "4"
/// /nginx/nginx/user: [www-data, www-data]
/// ```
#[derive(Debug, Clone)]
pub struct MapProvider {
    values: IndexMap<String, Vec<String>>,
    rule: KeyRule,
    new_marker: String,
    closed: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Values {
    One(String),
    Many(Vec<String>),
}

#[derive(thiserror::Error, Debug)]
pub enum MapLoadError {
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("Values file must map keys to a string or a list of strings")]
    Yaml(#[from] serde_yaml::Error),
}

impl MapProvider {
    pub fn new(rule: KeyRule) -> Self {
        Self {
            values: IndexMap::new(),
            rule,
            new_marker: super::DEFAULT_NEW_MARKER.into(),
            closed: false,
        }
    }

    pub fn with_new_marker(mut self, marker: impl Into<String>) -> Self {
        self.new_marker = marker.into();
        self
    }

    pub fn from_file(path: &Path, rule: KeyRule) -> Result<Self, MapLoadError> {
        tracing::info!(path=%path.display(), "loading values file");
        let contents = std::fs::read_to_string(path)?;
        let values: IndexMap<String, Values> = serde_yaml::from_str(&contents)?;

        let mut provider = Self::new(rule);
        for (key, values) in values {
            match values {
                Values::One(value) => provider.insert(key, vec![value]),
                Values::Many(values) => provider.insert(key, values),
            }
        }
        Ok(provider)
    }

    pub fn insert(&mut self, key: impl Into<String>, values: Vec<String>) {
        self.values.insert(key.into(), values);
    }

    pub fn rule(&self) -> &KeyRule {
        &self.rule
    }
}

impl OverrideProvider for MapProvider {
    fn override_args(
        &mut self,
        directive: &str,
        path: &Path,
        cancel: &Cancellation,
    ) -> Result<Vec<String>, ProviderError> {
        cancel.check()?;
        if self.closed {
            return Err(ProviderError::Closed);
        }

        let key = self.rule.directive_key(directive, path);
        let values = self.values.get(&key).cloned().unwrap_or_default();
        tracing::trace!(%key, ?values, "lookup");
        Ok(values)
    }

    fn close(&mut self) -> Result<(), ProviderError> {
        self.closed = true;
        Ok(())
    }
}

impl DirectiveSource for MapProvider {
    fn new_directives(
        &mut self,
        prefix: &str,
        cancel: &Cancellation,
    ) -> Result<Vec<Directive>, ProviderError> {
        cancel.check()?;
        if self.closed {
            return Err(ProviderError::Closed);
        }

        let scan = scan_prefix(prefix, &self.new_marker);
        let mut matches: Vec<_> = self
            .values
            .iter()
            .filter_map(|(key, values)| {
                let name = key.strip_prefix(scan.as_str())?;
                (!name.is_empty()).then(|| (key, Directive::new(name, 0, values.clone())))
            })
            .collect();
        matches.sort_by(|(a, _), (b, _)| a.cmp(b));

        Ok(matches.into_iter().map(|(_, directive)| directive).collect())
    }
}
