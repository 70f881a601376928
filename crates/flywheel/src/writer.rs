//! persisting a [Payload]
//!
//! Two modes:
//! - [write_in_place]: every file is rewritten at its own path. A failure can leave a file
//!   partially written.
//! - [write_staged]/[write_staged_in]: every file is rendered into a fresh scratch directory
//!   (flat, base names only). Nothing outside of it is touched until the caller commits the
//!   [Staging], which renames each file onto its original path.
//!
//! Every file is written through a buffer, flushed and synced before it counts as written.
use crate::cancel::Cancellation;
use crate::nginx::{self, BuildError, BuildOptions};
use crate::payload::{ConfigFile, Payload};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    #[error("Unable to create directory {}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to create {}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to render configuration for {}", path.display())]
    Build {
        path: PathBuf,
        #[source]
        source: BuildError,
    },
    #[error("Unable to flush {}", path.display())]
    Flush {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to sync {}", path.display())]
    Sync {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to move {} to {}", from.display(), to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to remove staging directory {}", path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Write of {} was cancelled", path.display())]
    Cancelled { path: PathBuf },
}

/// Writes every file of `payload` to its own path
///
/// Missing parent directories are created.
pub fn write_in_place(
    payload: &Payload,
    options: &BuildOptions,
    cancel: &Cancellation,
) -> Result<Vec<PathBuf>, WriteError> {
    let mut written = vec![];
    for config in &payload.config {
        if cancel.is_cancelled() {
            return Err(WriteError::Cancelled {
                path: config.file.clone(),
            });
        }

        create_parent(&config.file)?;
        write_config(&config.file, config, options)?;
        tracing::info!(path=%config.file.display(), "file written");
        written.push(config.file.clone());
    }
    Ok(written)
}

/// [write_staged_in] the system temp directory
///
/// Committing only works if the temp directory is on the same filesystem as the targets.
pub fn write_staged(
    payload: &Payload,
    options: &BuildOptions,
    cancel: &Cancellation,
) -> Result<Staging, WriteError> {
    write_staged_in(&std::env::temp_dir(), payload, options, cancel)
}

/// Renders every file of `payload` into a new scratch directory below `parent`
///
/// On error the scratch directory and everything staged so far is removed.
pub fn write_staged_in(
    parent: &Path,
    payload: &Payload,
    options: &BuildOptions,
    cancel: &Cancellation,
) -> Result<Staging, WriteError> {
    let dir = tempfile::Builder::new()
        .prefix("flywheel-")
        .tempdir_in(parent)
        .map_err(|source| WriteError::CreateDir {
            path: parent.to_owned(),
            source,
        })?;
    tracing::debug!(dir=%dir.path().display(), "staging directory created");

    let mut files: Vec<StagedFile> = vec![];
    for (index, config) in payload.config.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(WriteError::Cancelled {
                path: config.file.clone(),
            });
        }

        let Some(name) = config.file.file_name() else {
            return Err(WriteError::Create {
                path: config.file.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "path has no file name",
                ),
            });
        };

        // flat structure, equal base names must not overwrite each other
        let mut staged = dir.path().join(name);
        if files.iter().any(|file| file.staged == staged) {
            staged = dir
                .path()
                .join(format!("{index}.{}", name.to_string_lossy()));
        }

        write_config(&staged, config, options)?;
        tracing::debug!(staged=%staged.display(), original=%config.file.display(), "file staged");
        files.push(StagedFile {
            staged,
            original: config.file.clone(),
        });
    }

    Ok(Staging { dir, files })
}

/// Files rendered into a scratch directory, waiting to be committed or discarded
///
/// Dropping a [Staging] removes the scratch directory and every file not yet renamed.
#[derive(Debug)]
pub struct Staging {
    dir: tempfile::TempDir,
    files: Vec<StagedFile>,
}

/// A rendered file and the path it is meant for
#[derive(Debug, Clone, PartialEq)]
pub struct StagedFile {
    pub staged: PathBuf,
    pub original: PathBuf,
}

impl StagedFile {
    /// Moves the staged file onto its original path with a single rename
    pub fn rename(&self) -> Result<(), WriteError> {
        create_parent(&self.original)?;
        std::fs::rename(&self.staged, &self.original).map_err(|source| WriteError::Rename {
            from: self.staged.clone(),
            to: self.original.clone(),
            source,
        })?;
        tracing::info!(path=%self.original.display(), "file replaced");
        Ok(())
    }
}

impl Staging {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn files(&self) -> &[StagedFile] {
        &self.files
    }

    /// Renames every staged file onto its original path, in order
    ///
    /// Stops at the first failed rename; files renamed before it stay in place.
    pub fn commit(self) -> Result<Vec<PathBuf>, WriteError> {
        let mut committed = vec![];
        for file in &self.files {
            file.rename()?;
            committed.push(file.original.clone());
        }

        self.discard()?;
        Ok(committed)
    }

    /// Removes the scratch directory and everything left in it
    pub fn discard(self) -> Result<(), WriteError> {
        let path = self.dir.path().to_owned();
        self.dir
            .close()
            .map_err(|source| WriteError::Cleanup { path, source })
    }
}

fn create_parent(path: &Path) -> Result<(), WriteError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|source| WriteError::CreateDir {
                path: parent.to_owned(),
                source,
            }),
        _ => Ok(()),
    }
}

/// Creates (or truncates) `path` and writes `config` into it
fn write_config(
    path: &Path,
    config: &ConfigFile,
    options: &BuildOptions,
) -> Result<(), WriteError> {
    let file = std::fs::File::create(path).map_err(|source| WriteError::Create {
        path: path.to_owned(),
        source,
    })?;

    let mut writer = std::io::BufWriter::new(file);
    nginx::build_to(&mut writer, &config.parsed, options).map_err(|source| WriteError::Build {
        path: path.to_owned(),
        source,
    })?;

    writer.flush().map_err(|source| WriteError::Flush {
        path: path.to_owned(),
        source,
    })?;

    writer.get_ref().sync_all().map_err(|source| WriteError::Sync {
        path: path.to_owned(),
        source,
    })
}
