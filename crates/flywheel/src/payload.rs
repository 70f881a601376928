//! parsed configuration ([Payload]: one [ConfigFile] per source file)
//!
//! The field names follow the crossplane JSON format so a payload can be dumped,
//! edited and loaded again.
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Forest of per-file directive trees
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
pub struct Payload {
    pub config: Vec<ConfigFile>,
}

/// A single source file and its directives
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, derive_new::new)]
pub struct ConfigFile {
    pub file: PathBuf,
    pub parsed: Vec<Directive>,
}

/// A named statement with arguments and an optional block of children
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub directive: String,
    #[serde(default)]
    pub line: usize,
    #[serde(default)]
    pub args: Vec<String>,
    /// Indices into [Payload::config] of files pulled in by an `include`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub includes: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<Vec<Directive>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

pub const COMMENT: &str = "#";

impl Directive {
    pub fn new(directive: impl Into<String>, line: usize, args: Vec<String>) -> Self {
        Self {
            directive: directive.into(),
            line,
            args,
            includes: None,
            block: None,
            comment: None,
        }
    }

    pub fn block(
        directive: impl Into<String>,
        line: usize,
        args: Vec<String>,
        children: Vec<Directive>,
    ) -> Self {
        Self {
            block: Some(children),
            ..Self::new(directive, line, args)
        }
    }

    pub fn comment(line: usize, text: impl Into<String>) -> Self {
        Self {
            comment: Some(text.into()),
            ..Self::new(COMMENT, line, vec![])
        }
    }

    pub fn is_comment(&self) -> bool {
        self.directive == COMMENT
    }

    pub fn is_block(&self) -> bool {
        self.block.is_some()
    }
}

impl ConfigFile {
    /// Number of non-comment directives, nested blocks included
    pub fn directive_count(&self) -> usize {
        fn count(directives: &[Directive]) -> usize {
            directives
                .iter()
                .filter(|d| !d.is_comment())
                .map(|d| 1 + d.block.as_deref().map_or(0, count))
                .sum()
        }

        count(&self.parsed)
    }
}

impl Payload {
    pub fn insert(&mut self, file: impl Into<PathBuf>, parsed: Vec<Directive>) -> usize {
        let index = self.config.len();
        self.config.push(ConfigFile::new(file.into(), parsed));
        index
    }

    pub fn get(&self, file: &Path) -> Option<&ConfigFile> {
        self.config.iter().find(|config| config.file == file)
    }

    pub fn load_json(path: &Path) -> Result<Self, LoadError> {
        tracing::info!(path=%path.display(), "loading payload");
        let reader = std::io::BufReader::new(std::fs::File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Moves every file below `from` to the same relative location below `to`
    ///
    /// Fails without moving anything if a file is not below `from`, or would leave `to` through
    /// a `..` element.
    pub fn relocate(&mut self, from: &Path, to: &Path) -> Result<(), RelocateError> {
        let mut targets = Vec::with_capacity(self.config.len());
        for config in &self.config {
            let relative = config
                .file
                .strip_prefix(from)
                .ok()
                .filter(|relative| {
                    relative
                        .components()
                        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
                })
                .ok_or_else(|| RelocateError {
                    file: config.file.clone(),
                    root: from.to_owned(),
                })?;
            targets.push(to.join(relative));
        }

        for (config, target) in self.config.iter_mut().zip(targets) {
            tracing::debug!(from=%config.file.display(), to=%target.display(), "relocate");
            config.file = target;
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("{} is outside of {}, it can not be relocated", file.display(), root.display())]
pub struct RelocateError {
    pub file: PathBuf,
    pub root: PathBuf,
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("Unable to decode payload")]
    Json(#[from] serde_json::Error),
}

/// Utility macro to create a [Payload]
///
/// Create from a single document (stored as `nginx.conf`)
/// ```
/// # use flywheel::payload;
/// let payload = payload!("worker_processes 5;");
/// assert_eq!(payload.config.len(), 1);
/// ```
///
/// Create from multiple documents
/// ```
/// # use flywheel::payload;
/// let payload = payload! {
///   "/etc/nginx/nginx.conf" => "user www;",
///   "/etc/nginx/proxy.conf" => "proxy_redirect off;"
/// };
/// assert_eq!(payload.config.len(), 2);
/// ```
///
/// # Panic
/// Panics on invalid input
///
/// ```should_panic
/// # use flywheel::payload;
/// payload!("events {");
/// ```
#[macro_export]
macro_rules! payload {
    { $expr:expr } => {
        $crate::payload! { "nginx.conf" => $expr }
    };
    { $($source:expr => $expr:expr),+ } => {{
        let mut payload = $crate::payload::Payload::default();
        $(
            payload.insert(
                $source,
                $crate::nginx::parse_str($expr, &$crate::nginx::ParseOptions::default())
                    .expect("config must parse"),
            );
        )+

        payload
    }};
}
