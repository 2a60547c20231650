//! Finds the remote folder that already holds a listing's images.
//!
//! Folders were named by several generations of tooling: the raw address, an
//! underscore variant without commas, and assorted truncated or punctuated
//! forms. Lookups try each convention before giving up, so a listing never
//! gets a second folder.

use crate::address::{canonicalize, underscore_variant};
use crate::error::StoreError;
use crate::storage::{FileStore, RemoteFolder};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Which naming convention produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Underscore,
    Canonical,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderMatch {
    pub id: String,
    pub kind: MatchKind,
}

/// Name and canonical-form lookups over the folders under one parent
#[derive(Debug, Default)]
pub struct FolderIndex {
    by_name: HashMap<String, String>,
    by_canonical: HashMap<String, String>,
    matched: HashSet<String>,
}

impl FolderIndex {
    pub fn new(folders: impl IntoIterator<Item = RemoteFolder>) -> Self {
        let mut index = Self::default();
        for folder in folders {
            index.insert(folder);
        }
        index
    }

    /// Register a folder; the first folder seen for a name or canonical form wins
    pub fn insert(&mut self, folder: RemoteFolder) {
        self.by_canonical
            .entry(canonicalize(&folder.name))
            .or_insert_with(|| folder.id.clone());
        self.by_name.entry(folder.name).or_insert(folder.id);
    }

    /// Existing folder for `address`, trying exact, underscore, then canonical names
    pub fn resolve(&self, address: &str) -> Option<FolderMatch> {
        let found = |id: &String, kind| Some(FolderMatch { id: id.clone(), kind });

        if let Some(id) = self.by_name.get(address) {
            return found(id, MatchKind::Exact);
        }
        if let Some(id) = self.by_name.get(&underscore_variant(address)) {
            return found(id, MatchKind::Underscore);
        }
        self.by_canonical
            .get(&canonicalize(address))
            .and_then(|id| found(id, MatchKind::Canonical))
    }

    /// Record that `address` has been handled in this run
    pub fn mark_matched(&mut self, address: &str) {
        self.matched.insert(canonicalize(address));
    }

    fn is_matched(&self, address: &str) -> bool {
        self.matched.contains(&canonicalize(address))
    }

    /// Addresses with no folder under any convention that were not handled yet,
    /// without repeats
    pub fn missing<'a>(&self, addresses: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
        let mut seen = HashSet::new();
        addresses
            .into_iter()
            .filter(|a| !self.is_matched(a) && self.resolve(a).is_none())
            .filter(|a| seen.insert(canonicalize(a)))
            .collect()
    }
}

/// Resolves or creates listing folders under one parent, listing the parent once
pub struct FolderResolver {
    parent_id: String,
    index: Option<FolderIndex>,
}

impl FolderResolver {
    pub fn new(parent_id: impl Into<String>) -> Self {
        Self {
            parent_id: parent_id.into(),
            index: None,
        }
    }

    async fn index(&mut self, files: &dyn FileStore) -> Result<&mut FolderIndex, StoreError> {
        if self.index.is_none() {
            let folders = files.list_folders(&self.parent_id).await?;
            info!("Indexed {} existing listing folders", folders.len());
            self.index = Some(FolderIndex::new(folders));
        }
        Ok(self.index.get_or_insert_with(FolderIndex::default))
    }

    /// Folder id for `address`, creating the folder only when no naming
    /// convention finds an existing one
    pub async fn ensure_folder(
        &mut self,
        files: &dyn FileStore,
        address: &str,
    ) -> Result<String, StoreError> {
        let parent_id = self.parent_id.clone();
        let index = self.index(files).await?;

        if let Some(found) = index.resolve(address) {
            debug!("Reusing folder {} for {address} ({:?} match)", found.id, found.kind);
            index.mark_matched(address);
            return Ok(found.id);
        }

        let id = files.create_folder(&parent_id, address).await?;
        info!("Created folder: {address} (ID: {id}) inside {parent_id}");
        index.insert(RemoteFolder {
            id: id.clone(),
            name: address.to_string(),
        });
        index.mark_matched(address);
        Ok(id)
    }

    /// Create a folder for every address that has none under any naming
    /// convention, once per canonical address. Returns how many were created;
    /// a failed creation is logged and left for [`Self::ensure_folder`] to retry.
    pub async fn create_missing(
        &mut self,
        files: &dyn FileStore,
        addresses: &[&str],
    ) -> Result<usize, StoreError> {
        let parent_id = self.parent_id.clone();
        let index = self.index(files).await?;

        let missing = index.missing(addresses.iter().copied());
        if !missing.is_empty() {
            info!("{} listings have no image folder yet", missing.len());
        }

        let mut created = 0;
        for address in missing {
            match files.create_folder(&parent_id, address).await {
                Ok(id) => {
                    info!("Created folder: {address} (ID: {id}) inside {parent_id}");
                    index.insert(RemoteFolder {
                        id,
                        name: address.to_string(),
                    });
                    index.mark_matched(address);
                    created += 1;
                }
                Err(e) => warn!("Could not create folder for {address}: {e}"),
            }
        }
        Ok(created)
    }
}
