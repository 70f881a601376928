//! directive override engine
//!
//! Walks every directive of a [ConfigFile] in pre-order and asks an [OverrideProvider] for new
//! arguments. Comments are never looked up. An empty answer keeps the arguments, anything else
//! replaces them wholesale. The first failed lookup aborts the whole run.
use crate::cancel::Cancellation;
use crate::payload::{ConfigFile, Directive, Payload};
use crate::provider::{OverrideProvider, ProviderError};
use crate::visit::{TryVisitDirectivesMut, TryVisitMut};
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum OverrideError {
    #[error("Lookup of directive {directive:?} (line {line}) in {} failed", file.display())]
    Lookup {
        file: PathBuf,
        directive: String,
        line: usize,
        #[source]
        source: ProviderError,
    },
    #[error("Directive without a name at line {line} in {}", file.display())]
    TreeIntegrity { file: PathBuf, line: usize },
    #[error("Override of {} was cancelled", file.display())]
    Cancelled { file: PathBuf },
}

/// Counters of a finished override run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OverrideStats {
    /// Directives passed to the provider
    pub visited: usize,
    /// Directives whose arguments were replaced
    pub replaced: usize,
}

impl std::ops::AddAssign for OverrideStats {
    fn add_assign(&mut self, other: Self) {
        self.visited += other.visited;
        self.replaced += other.replaced;
    }
}

/// Overrides all files of `payload` in order, stopping at the first failing file
///
/// Files before the failing one stay modified.
pub fn override_payload(
    payload: &mut Payload,
    provider: &mut dyn OverrideProvider,
    cancel: &Cancellation,
) -> Result<OverrideStats, OverrideError> {
    let mut stats = OverrideStats::default();
    for config in &mut payload.config {
        stats += override_config(config, provider, cancel)?;
    }
    Ok(stats)
}

/// Overrides the directives of a single file
#[tracing::instrument(level = "debug", skip_all, fields(file=%config.file.display()))]
pub fn override_config(
    config: &mut ConfigFile,
    provider: &mut dyn OverrideProvider,
    cancel: &Cancellation,
) -> Result<OverrideStats, OverrideError> {
    let mut overrider = DirectiveOverrider::new(provider, cancel, &config.file);
    config.parsed.try_visit_directives_mut(&mut overrider)?;

    let stats = overrider.stats;
    tracing::info!(visited = stats.visited, replaced = stats.replaced, "file overridden");
    Ok(stats)
}

/// Runs `f` with `provider` and closes the provider afterwards, even if `f` failed
///
/// The error of `f` takes precedence over a failure to close.
pub fn with_provider<P, T, E>(
    mut provider: P,
    f: impl FnOnce(&mut P) -> Result<T, E>,
) -> Result<T, E>
where
    P: OverrideProvider,
    E: From<ProviderError>,
{
    let result = f(&mut provider);
    let closed = provider.close();

    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_error)) => Err(close_error.into()),
        (Err(error), Ok(())) => Err(error),
        (Err(error), Err(close_error)) => {
            tracing::warn!(error=%close_error, "unable to close provider");
            Err(error)
        }
    }
}

#[derive(derive_new::new)]
struct DirectiveOverrider<'a> {
    provider: &'a mut dyn OverrideProvider,
    cancel: &'a Cancellation,
    file: &'a Path,
    #[new(default)]
    stats: OverrideStats,
}

impl TryVisitMut<Directive> for DirectiveOverrider<'_> {
    type Error = OverrideError;

    fn try_visit_mut(&mut self, directive: &mut Directive) -> Result<(), OverrideError> {
        if directive.is_comment() {
            return Ok(());
        }

        if directive.directive.is_empty() {
            return Err(OverrideError::TreeIntegrity {
                file: self.file.to_owned(),
                line: directive.line,
            });
        }

        if self.cancel.is_cancelled() {
            return Err(OverrideError::Cancelled {
                file: self.file.to_owned(),
            });
        }

        self.stats.visited += 1;
        let args = self
            .provider
            .override_args(&directive.directive, self.file, self.cancel)
            .map_err(|source| match source {
                ProviderError::Cancelled(_) => OverrideError::Cancelled {
                    file: self.file.to_owned(),
                },
                source => OverrideError::Lookup {
                    file: self.file.to_owned(),
                    directive: directive.directive.clone(),
                    line: directive.line,
                    source,
                },
            })?;

        if args.is_empty() {
            return Ok(());
        }

        tracing::debug!(
            directive = %directive.directive,
            line = directive.line,
            from = ?directive.args,
            to = ?args,
            "arguments replaced"
        );
        directive.args = args;
        self.stats.replaced += 1;
        Ok(())
    }
}
