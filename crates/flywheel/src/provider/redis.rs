use super::{scan_prefix, DirectiveSource, KeyRule, OverrideProvider, ProviderError};
use crate::cancel::Cancellation;
use crate::payload::Directive;
use std::path::Path;
use std::time::Duration;

/// Connection settings for [RedisProvider]
#[derive(Debug, Clone)]
pub struct RedisSettings {
    /// Tried in order, the first reachable endpoint is used
    pub endpoints: Vec<String>,
    pub strip_prefix: String,
    /// Marker in front of keys that describe new directives
    pub new_marker: String,
    pub connect_timeout: Duration,
}

/// Provider that reads directive arguments from redis
///
/// A string key yields a single argument, a list key yields all of its elements in list order.
pub struct RedisProvider {
    connection: Option<::redis::Connection>,
    endpoint: String,
    rule: KeyRule,
    new_marker: String,
}

impl std::fmt::Debug for RedisProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisProvider")
            .field("endpoint", &self.endpoint)
            .field("connected", &self.connection.is_some())
            .field("rule", &self.rule)
            .finish()
    }
}

impl RedisProvider {
    pub fn connect(settings: &RedisSettings) -> Result<Self, ProviderError> {
        let mut last_error = None;

        for endpoint in &settings.endpoints {
            let connection = ::redis::Client::open(endpoint.as_str())
                .and_then(|client| client.get_connection_with_timeout(settings.connect_timeout));

            match connection {
                Ok(connection) => {
                    tracing::info!(%endpoint, "connected to redis");
                    return Ok(Self {
                        connection: Some(connection),
                        endpoint: endpoint.clone(),
                        rule: KeyRule::new(settings.strip_prefix.clone()),
                        new_marker: settings.new_marker.clone(),
                    });
                }
                Err(error) => {
                    tracing::warn!(%endpoint, %error, "unable to connect");
                    last_error = Some(error);
                }
            }
        }

        match last_error {
            Some(source) => Err(ProviderError::Connect {
                endpoints: settings.endpoints.clone(),
                source,
            }),
            None => Err(ProviderError::NoEndpoints),
        }
    }

    pub fn rule(&self) -> &KeyRule {
        &self.rule
    }

    /// All values stored at exactly `key`
    fn values(&mut self, key: &str) -> Result<Vec<String>, ProviderError> {
        let connection = self.connection.as_mut().ok_or(ProviderError::Closed)?;
        let backend = |source: ::redis::RedisError| ProviderError::Backend {
            key: key.to_owned(),
            source,
        };

        let kind: String = ::redis::cmd("TYPE")
            .arg(key)
            .query(&mut *connection)
            .map_err(backend)?;

        match kind.as_str() {
            "none" => Ok(vec![]),
            "string" => {
                let value: Option<String> = ::redis::cmd("GET")
                    .arg(key)
                    .query(&mut *connection)
                    .map_err(backend)?;
                Ok(value.into_iter().collect())
            }
            "list" => ::redis::cmd("LRANGE")
                .arg(key)
                .arg(0)
                .arg(-1)
                .query(&mut *connection)
                .map_err(backend),
            _ => Err(ProviderError::UnsupportedType {
                key: key.to_owned(),
                kind,
            }),
        }
    }

    /// All keys starting with `prefix`, sorted
    fn keys_with_prefix(
        &mut self,
        prefix: &str,
        cancel: &Cancellation,
    ) -> Result<Vec<String>, ProviderError> {
        let connection = self.connection.as_mut().ok_or(ProviderError::Closed)?;
        let pattern = format!("{}*", escape_pattern(prefix));

        let mut keys = vec![];
        let mut cursor: u64 = 0;
        loop {
            cancel.check()?;
            let (next, batch): (u64, Vec<String>) = ::redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query(&mut *connection)
                .map_err(|source| ProviderError::Backend {
                    key: pattern.clone(),
                    source,
                })?;

            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

impl OverrideProvider for RedisProvider {
    fn override_args(
        &mut self,
        directive: &str,
        path: &Path,
        cancel: &Cancellation,
    ) -> Result<Vec<String>, ProviderError> {
        cancel.check()?;
        let key = self.rule.directive_key(directive, path);
        let values = self.values(&key)?;
        tracing::trace!(%key, ?values, "lookup");
        Ok(values)
    }

    fn close(&mut self) -> Result<(), ProviderError> {
        if self.connection.take().is_some() {
            tracing::debug!(endpoint=%self.endpoint, "redis connection closed");
        }
        Ok(())
    }
}

impl DirectiveSource for RedisProvider {
    fn new_directives(
        &mut self,
        prefix: &str,
        cancel: &Cancellation,
    ) -> Result<Vec<Directive>, ProviderError> {
        let scan = scan_prefix(prefix, &self.new_marker);

        let mut directives = vec![];
        for key in self.keys_with_prefix(&scan, cancel)? {
            let Some(name) = key.strip_prefix(scan.as_str()).filter(|n| !n.is_empty()) else {
                continue;
            };
            cancel.check()?;
            directives.push(Directive::new(name, 0, self.values(&key)?));
        }

        Ok(directives)
    }
}

/// Escapes glob characters so `prefix` is matched literally by SCAN MATCH
fn escape_pattern(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
