//! Rendezvous directory: maps endpoint names to socket addresses.
//!
//! The host registers `nexus-<CODE>`; a guest resolves the same name to
//! find where to dial. The directory is the only shared state between
//! peers before a connection exists.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("Endpoint {0} is already registered")]
    Taken(String),
}

pub trait Directory: Send + Sync {
    /// Claim `name` for `addr`. Fails if another address already holds it.
    fn register(&self, name: &str, addr: SocketAddr) -> Result<(), DirectoryError>;

    fn resolve(&self, name: &str) -> Option<SocketAddr>;

    fn unregister(&self, name: &str);
}

/// In-process directory. Clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    entries: Arc<RwLock<HashMap<String, SocketAddr>>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory pre-seeded with fixed entries, e.g. from command-line
    /// configuration.
    pub fn with_entries(entries: impl IntoIterator<Item = (String, SocketAddr)>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(entries.into_iter().collect())),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Directory for MemoryDirectory {
    fn register(&self, name: &str, addr: SocketAddr) -> Result<(), DirectoryError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get(name) {
            Some(existing) if *existing != addr => Err(DirectoryError::Taken(name.to_string())),
            _ => {
                entries.insert(name.to_string(), addr);
                log::debug!("Registered endpoint {name} at {addr}");
                Ok(())
            }
        }
    }

    fn resolve(&self, name: &str) -> Option<SocketAddr> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
    }

    fn unregister(&self, name: &str) {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        if removed.is_some() {
            log::debug!("Unregistered endpoint {name}");
        }
    }
}
