//! Whole-world save/load.
//!
//! The world is always written in one piece; there is no incremental
//! format. [`JsonFileStore`] writes through a sibling temp file and a
//! rename so a crash mid-save leaves the previous file intact.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::snapshot::SavedWorld;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Malformed saved world: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A place the autosave record lives.
pub trait Persistence {
    fn save(&mut self, world: &SavedWorld) -> Result<(), PersistError>;

    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<SavedWorld>, PersistError>;
}

/// JSON file on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "world.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_err(&self, source: io::Error) -> PersistError {
        PersistError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl Persistence for JsonFileStore {
    fn save(&mut self, world: &SavedWorld) -> Result<(), PersistError> {
        let bytes = serde_json::to_vec(world)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }

        let tmp = self.temp_path();
        let mut file = fs::File::create(&tmp).map_err(|e| self.io_err(e))?;
        file.write_all(&bytes).map_err(|e| self.io_err(e))?;
        file.sync_all().map_err(|e| self.io_err(e))?;
        drop(file);
        fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))?;

        log::debug!(
            "Saved {} nodes / {} links to {}",
            world.graph.nodes.len(),
            world.graph.links.len(),
            self.path.display()
        );
        Ok(())
    }

    fn load(&self) -> Result<Option<SavedWorld>, PersistError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(e)),
        };
        let world: SavedWorld = serde_json::from_slice(&bytes)?;
        Ok(Some(SavedWorld {
            graph: world.graph.normalized(),
            cam: world.cam.map(|c| c.sanitized()),
            opts: world.opts,
        }))
    }
}

/// In-memory store, for tests and sessions that opt out of autosave.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    saved: Option<String>,
    saves: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with raw JSON, as if a previous session had written it.
    pub fn with_raw(json: impl Into<String>) -> Self {
        Self {
            saved: Some(json.into()),
            saves: 0,
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves
    }
}

impl Persistence for MemoryStore {
    fn save(&mut self, world: &SavedWorld) -> Result<(), PersistError> {
        self.saved = Some(serde_json::to_string(world)?);
        self.saves += 1;
        Ok(())
    }

    fn load(&self) -> Result<Option<SavedWorld>, PersistError> {
        match &self.saved {
            Some(json) => {
                let world: SavedWorld = serde_json::from_str(json)?;
                Ok(Some(SavedWorld {
                    graph: world.graph.normalized(),
                    cam: world.cam.map(|c| c.sanitized()),
                    opts: world.opts,
                }))
            }
            None => Ok(None),
        }
    }
}
