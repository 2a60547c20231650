use crate::error::StoreError;
use async_trait::async_trait;

/// A single-row range in A1 notation, starting at column A
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeRef {
    /// 1-based row number; the header lives in row 1
    pub row: usize,
    pub width: usize,
}

impl RangeRef {
    pub fn row(row: usize, width: usize) -> Self {
        Self { row, width }
    }

    pub fn to_a1(&self) -> String {
        let last = column_letter(self.width.saturating_sub(1));
        format!("A{row}:{last}{row}", row = self.row)
    }
}

/// Spreadsheet column name for a 0-based index: 0 -> A, 25 -> Z, 26 -> AA
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

/// One row overwrite inside a batched update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowUpdate {
    pub range: RangeRef,
    pub values: Vec<String>,
}

/// Destination table split into named partitions (one tab per account group)
#[async_trait]
pub trait SheetStore: Send + Sync {
    async fn list_partitions(&self) -> Result<Vec<String>, StoreError>;

    /// Create `key` with `header` as its first row
    async fn create_partition(&self, key: &str, header: &[String]) -> Result<(), StoreError>;

    /// Every row of the partition including the header row
    async fn read_all_rows(&self, key: &str) -> Result<Vec<Vec<String>>, StoreError>;

    async fn batch_update(&self, key: &str, updates: &[RowUpdate]) -> Result<(), StoreError>;

    /// Append `rows` after the table that starts at the header row, inserting
    /// new rows so anything below a blank gap moves down. Returns the 1-based
    /// row number the first appended row landed on, when the backend reports it.
    async fn append_rows(&self, key: &str, rows: &[Vec<String>])
        -> Result<Option<usize>, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFolder {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub id: String,
    pub link: String,
}

/// Cloud file store holding one folder of images per listing
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn list_folders(&self, parent_id: &str) -> Result<Vec<RemoteFolder>, StoreError>;

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String, StoreError>;

    /// Shareable link of `name` inside `folder_id`, if it was uploaded before
    async fn file_exists(&self, name: &str, folder_id: &str)
        -> Result<Option<String>, StoreError>;

    async fn upload_file(
        &self,
        folder_id: &str,
        name: &str,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<UploadedFile, StoreError>;

    async fn set_public_readable(&self, file_id: &str) -> Result<(), StoreError>;
}
