//! In-process stores that record every call. Used by the test suites and by
//! dry runs that should not touch the real spreadsheet or file store.

use super::traits::{FileStore, RemoteFolder, RowUpdate, SheetStore, UploadedFile};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// Number of calls each [`SheetStore`] operation received
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetCalls {
    pub list_partitions: usize,
    pub create_partition: usize,
    pub read_all_rows: HashMap<String, usize>,
    pub batch_update: usize,
    pub append_rows: usize,
}

impl SheetCalls {
    pub fn reads(&self, key: &str) -> usize {
        self.read_all_rows.get(key).copied().unwrap_or(0)
    }
}

#[derive(Default)]
struct SheetState {
    partitions: BTreeMap<String, Vec<Vec<String>>>,
    calls: SheetCalls,
    failing_urls: HashSet<String>,
    unreadable: HashSet<String>,
    /// Writes still to be refused with `outage_status`
    outage_writes: usize,
    outage_status: u16,
}

/// Spreadsheet held in memory
#[derive(Default)]
pub struct MemorySheetStore {
    state: Mutex<SheetState>,
}

impl MemorySheetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a partition with raw rows (header included)
    pub fn with_partition(self, key: &str, rows: Vec<Vec<String>>) -> Self {
        self.lock().partitions.insert(key.to_string(), rows);
        self
    }

    /// Any write carrying a row whose first cell is `url` fails as a whole
    pub fn fail_writes_for(&self, url: &str) {
        self.lock().failing_urls.insert(url.to_string());
    }

    /// The next `count` writes fail with `status`, whatever they carry
    pub fn fail_next_writes(&self, count: usize, status: u16) {
        let mut state = self.lock();
        state.outage_writes = count;
        state.outage_status = status;
    }

    /// Reads of `key` fail until the store is dropped
    pub fn fail_reads_of(&self, key: &str) {
        self.lock().unreadable.insert(key.to_string());
    }

    pub fn rows(&self, key: &str) -> Vec<Vec<String>> {
        self.lock().partitions.get(key).cloned().unwrap_or_default()
    }

    pub fn partition_keys(&self) -> Vec<String> {
        self.lock().partitions.keys().cloned().collect()
    }

    pub fn calls(&self) -> SheetCalls {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, SheetState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SheetState {
    fn check_outage(&mut self) -> Result<(), StoreError> {
        if self.outage_writes == 0 {
            return Ok(());
        }
        self.outage_writes -= 1;
        Err(StoreError::Api {
            status: self.outage_status,
            message: "backend unavailable".to_string(),
        })
    }

    fn check_writable<'a>(&self, mut rows: impl Iterator<Item = &'a Vec<String>>) -> Result<(), StoreError> {
        match rows.find(|row| row.first().is_some_and(|url| self.failing_urls.contains(url))) {
            Some(row) => Err(StoreError::Api {
                status: 400,
                message: format!("rejected row {}", row[0]),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SheetStore for MemorySheetStore {
    async fn list_partitions(&self) -> Result<Vec<String>, StoreError> {
        let mut state = self.lock();
        state.calls.list_partitions += 1;
        Ok(state.partitions.keys().cloned().collect())
    }

    async fn create_partition(&self, key: &str, header: &[String]) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.calls.create_partition += 1;
        state
            .partitions
            .entry(key.to_string())
            .or_insert_with(|| vec![header.to_vec()]);
        Ok(())
    }

    async fn read_all_rows(&self, key: &str) -> Result<Vec<Vec<String>>, StoreError> {
        let mut state = self.lock();
        *state.calls.read_all_rows.entry(key.to_string()).or_default() += 1;
        if state.unreadable.contains(key) {
            return Err(StoreError::Network(format!("read of {key} timed out")));
        }
        state
            .partitions
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::MissingPartition(key.to_string()))
    }

    async fn batch_update(&self, key: &str, updates: &[RowUpdate]) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.calls.batch_update += 1;
        state.check_outage()?;
        state.check_writable(updates.iter().map(|u| &u.values))?;

        let rows = state
            .partitions
            .get_mut(key)
            .ok_or_else(|| StoreError::MissingPartition(key.to_string()))?;
        for update in updates {
            let index = update.range.row.saturating_sub(1);
            if rows.len() <= index {
                rows.resize(index + 1, Vec::new());
            }
            let row = &mut rows[index];
            if row.len() < update.values.len() {
                row.resize(update.values.len(), String::new());
            }
            row[..update.values.len()].clone_from_slice(&update.values);
        }
        Ok(())
    }

    async fn append_rows(
        &self,
        key: &str,
        rows: &[Vec<String>],
    ) -> Result<Option<usize>, StoreError> {
        let mut state = self.lock();
        state.calls.append_rows += 1;
        state.check_outage()?;
        state.check_writable(rows.iter())?;

        let stored = state
            .partitions
            .get_mut(key)
            .ok_or_else(|| StoreError::MissingPartition(key.to_string()))?;
        // The table ends at the first blank row; anything below it moves down
        let end = stored
            .iter()
            .position(|row| row.iter().all(|cell| cell.trim().is_empty()))
            .unwrap_or(stored.len());
        stored.splice(end..end, rows.iter().cloned());
        Ok(Some(end + 1))
    }
}

/// A file recorded by [`MemoryFileStore`]
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub id: String,
    pub folder_id: String,
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub public: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileCalls {
    pub list_folders: usize,
    pub create_folder: usize,
    pub file_exists: usize,
    pub upload_file: usize,
    pub set_public_readable: usize,
}

#[derive(Default)]
struct FileState {
    folders: Vec<(String, RemoteFolder)>,
    files: Vec<StoredFile>,
    next_id: usize,
    calls: FileCalls,
    failing_uploads: HashSet<String>,
}

impl FileState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

/// File store held in memory
#[derive(Default)]
pub struct MemoryFileStore {
    state: Mutex<FileState>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_folder(self, parent_id: &str, id: &str, name: &str) -> Self {
        self.lock().folders.push((
            parent_id.to_string(),
            RemoteFolder { id: id.to_string(), name: name.to_string() },
        ));
        self
    }

    /// Uploads named `name` fail
    pub fn fail_uploads_of(&self, name: &str) {
        self.lock().failing_uploads.insert(name.to_string());
    }

    pub fn folders(&self, parent_id: &str) -> Vec<RemoteFolder> {
        self.lock()
            .folders
            .iter()
            .filter(|(parent, _)| parent == parent_id)
            .map(|(_, folder)| folder.clone())
            .collect()
    }

    pub fn files_in(&self, folder_id: &str) -> Vec<StoredFile> {
        self.lock()
            .files
            .iter()
            .filter(|f| f.folder_id == folder_id)
            .cloned()
            .collect()
    }

    pub fn calls(&self) -> FileCalls {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, FileState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn link_for(id: &str) -> String {
    format!("memory://files/{id}")
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn list_folders(&self, parent_id: &str) -> Result<Vec<RemoteFolder>, StoreError> {
        self.lock().calls.list_folders += 1;
        Ok(self.folders(parent_id))
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String, StoreError> {
        let mut state = self.lock();
        state.calls.create_folder += 1;
        let id = state.next_id("folder");
        state.folders.push((
            parent_id.to_string(),
            RemoteFolder { id: id.clone(), name: name.to_string() },
        ));
        Ok(id)
    }

    async fn file_exists(
        &self,
        name: &str,
        folder_id: &str,
    ) -> Result<Option<String>, StoreError> {
        let mut state = self.lock();
        state.calls.file_exists += 1;
        Ok(state
            .files
            .iter()
            .find(|f| f.folder_id == folder_id && f.name == name)
            .map(|f| link_for(&f.id)))
    }

    async fn upload_file(
        &self,
        folder_id: &str,
        name: &str,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<UploadedFile, StoreError> {
        let mut state = self.lock();
        state.calls.upload_file += 1;
        if state.failing_uploads.contains(name) {
            return Err(StoreError::Api {
                status: 500,
                message: format!("upload of {name} failed"),
            });
        }
        let id = state.next_id("file");
        state.files.push(StoredFile {
            id: id.clone(),
            folder_id: folder_id.to_string(),
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            bytes,
            public: false,
        });
        Ok(UploadedFile { link: link_for(&id), id })
    }

    async fn set_public_readable(&self, file_id: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.calls.set_public_readable += 1;
        match state.files.iter_mut().find(|f| f.id == file_id) {
            Some(file) => {
                file.public = true;
                Ok(())
            }
            None => Err(StoreError::InvalidResponse(format!("unknown file {file_id}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn append_lands_after_the_table_not_after_the_last_row() {
        let store = MemorySheetStore::new().with_partition(
            "tab",
            vec![cells(&["listing_url"]), cells(&["u1"]), vec![], cells(&["u2"])],
        );

        let first = store.append_rows("tab", &[cells(&["u3"])]).await.unwrap();

        assert_eq!(first, Some(3));
        assert_eq!(
            store.rows("tab"),
            vec![cells(&["listing_url"]), cells(&["u1"]), cells(&["u3"]), vec![], cells(&["u2"])]
        );
    }

    #[tokio::test]
    async fn outage_refuses_only_the_requested_number_of_writes() {
        let store = MemorySheetStore::new().with_partition("tab", vec![cells(&["listing_url"])]);
        store.fail_next_writes(1, 503);

        let err = store.append_rows("tab", &[cells(&["u1"])]).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.append_rows("tab", &[cells(&["u1"])]).await.unwrap(), Some(2));
        assert_eq!(store.calls().append_rows, 2);
    }
}
