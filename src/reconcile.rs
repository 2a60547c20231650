//! Upsert of scraped records into a partitioned destination table.
//!
//! Each partition is read at most once per run; the resulting
//! `listing_url -> row` index is kept for the rest of the run so later batches
//! reuse it. Writes are grouped into one batched update and one batched append
//! per partition, degrading to row-at-a-time writes when a batch is rejected.

use crate::models::{ListingRecord, RowSchema, BASE_COLUMNS, CAPTION_COLUMN};
use crate::retry::RetryPolicy;
use crate::storage::{RangeRef, RowUpdate, SheetStore};
use crate::error::StoreError;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A row that could not be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    pub listing_url: String,
    pub error: String,
}

/// Outcome of reconciling one partition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionReport {
    pub partition: String,
    pub created: bool,
    pub header_migrated: bool,
    pub updated: usize,
    pub inserted: usize,
    pub unchanged: usize,
    pub failures: Vec<RowFailure>,
}

/// Cached contents of a partition
#[derive(Debug, Clone)]
struct PartitionIndex {
    rows: Vec<Vec<String>>,
    /// 1-based row number of each listing URL
    by_url: HashMap<String, usize>,
}

impl PartitionIndex {
    fn from_rows(rows: Vec<Vec<String>>) -> Self {
        let mut by_url = HashMap::new();
        for (i, row) in rows.iter().enumerate().skip(1) {
            if let Some(url) = row.first().filter(|u| !u.trim().is_empty()) {
                by_url.entry(url.clone()).or_insert(i + 1);
            }
        }
        Self { rows, by_url }
    }

    fn row(&self, row_number: usize) -> Option<&Vec<String>> {
        self.rows.get(row_number.checked_sub(1)?)
    }

    fn store_row(&mut self, row_number: usize, values: Vec<String>) {
        let index = row_number.saturating_sub(1);
        if self.rows.len() <= index {
            self.rows.resize(index + 1, Vec::new());
        }
        self.rows[index] = values;
    }

    /// Record `values` as inserted starting at `first_row`; rows at or below it shift down
    fn insert_rows(&mut self, first_row: usize, values: Vec<Vec<String>>) {
        let at = first_row.saturating_sub(1).max(1);
        let count = values.len();
        for row_number in self.by_url.values_mut() {
            if *row_number > at {
                *row_number += count;
            }
        }
        for (offset, row) in values.iter().enumerate() {
            if let Some(url) = row.first().filter(|u| !u.trim().is_empty()) {
                self.by_url.entry(url.clone()).or_insert(at + 1 + offset);
            }
        }
        if self.rows.len() < at {
            self.rows.resize(at, Vec::new());
        }
        self.rows.splice(at..at, values);
    }

    /// Column holding the caption in the stored header, wherever it sits
    fn caption_column(&self) -> Option<usize> {
        let caption = BASE_COLUMNS[CAPTION_COLUMN];
        self.rows
            .first()?
            .iter()
            .position(|name| name.trim() == caption)
    }
}

/// Pending writes for one partition
#[derive(Default)]
struct Plan {
    header: Option<RowUpdate>,
    updates: Vec<RowUpdate>,
    inserts: Vec<Vec<String>>,
    unchanged: usize,
}

pub struct Reconciler {
    store: Arc<dyn SheetStore>,
    schema: RowSchema,
    preserve_caption: bool,
    retry: RetryPolicy,
    partitions: Option<HashSet<String>>,
    cache: HashMap<String, PartitionIndex>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn SheetStore>, schema: RowSchema) -> Self {
        Self {
            store,
            schema,
            preserve_caption: false,
            retry: RetryPolicy::default(),
            partitions: None,
            cache: HashMap::new(),
        }
    }

    /// Keep the caption already stored for existing rows instead of overwriting it
    pub fn preserve_captions(mut self, preserve: bool) -> Self {
        self.preserve_caption = preserve;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Seed the known partition names, e.g. from the startup connectivity check
    pub fn prime_partitions(&mut self, keys: impl IntoIterator<Item = String>) {
        self.partitions = Some(keys.into_iter().collect());
    }

    /// Upsert every batch into its partition.
    ///
    /// Fails only when the partition list cannot be fetched; row-level
    /// problems are reported in the returned [`PartitionReport`]s.
    pub async fn reconcile(
        &mut self,
        batches: &BTreeMap<String, Vec<ListingRecord>>,
    ) -> Result<Vec<PartitionReport>, StoreError> {
        if self.partitions.is_none() {
            let keys = self.store.list_partitions().await?;
            self.prime_partitions(keys);
        }

        let mut reports = Vec::with_capacity(batches.len());
        for (key, records) in batches {
            if records.is_empty() {
                continue;
            }
            let report = self.reconcile_partition(key, records).await;
            info!(
                "Partition '{}': {} updated, {} inserted, {} unchanged, {} failed",
                key,
                report.updated,
                report.inserted,
                report.unchanged,
                report.failures.len()
            );
            reports.push(report);
        }
        Ok(reports)
    }

    async fn reconcile_partition(&mut self, key: &str, records: &[ListingRecord]) -> PartitionReport {
        let mut report = PartitionReport {
            partition: key.to_string(),
            ..Default::default()
        };

        let exists = self
            .partitions
            .as_ref()
            .is_some_and(|known| known.contains(key));
        if !exists {
            info!("Creating partition '{key}'");
            if let Err(e) = self.store.create_partition(key, &self.schema.header()).await {
                warn!("Could not create partition '{key}': {e}");
                report.failures = records
                    .iter()
                    .map(|r| RowFailure {
                        listing_url: r.listing_url.clone(),
                        error: e.to_string(),
                    })
                    .collect();
                return report;
            }
            self.partitions
                .get_or_insert_with(HashSet::new)
                .insert(key.to_string());
            self.cache
                .insert(key.to_string(), PartitionIndex::from_rows(vec![self.schema.header()]));
            report.created = true;
        }

        let mut index = match self.cache.remove(key) {
            Some(index) => Some(index),
            None => match self.store.read_all_rows(key).await {
                Ok(rows) => {
                    debug!("Read {} existing rows from '{key}'", rows.len());
                    Some(PartitionIndex::from_rows(rows))
                }
                Err(e) => {
                    warn!("Could not read '{key}', treating every record as new: {e}");
                    None
                }
            },
        };

        let plan = self.plan(records, index.as_ref());
        report.unchanged = plan.unchanged;

        self.apply_updates(key, plan.header, plan.updates, index.as_mut(), &mut report)
            .await;
        let positions_known = self
            .apply_inserts(key, plan.inserts, index.as_mut(), &mut report)
            .await;
        if !positions_known {
            debug!("Row positions in '{key}' unknown after append, will re-read");
            index = None;
        }

        if let Some(index) = index {
            self.cache.insert(key.to_string(), index);
        }
        report
    }

    /// Split records into updates and inserts against the cached rows
    fn plan(&self, records: &[ListingRecord], index: Option<&PartitionIndex>) -> Plan {
        let width = self.schema.width();
        let mut plan = Plan::default();

        if let Some(index) = index {
            let header_ok = index
                .rows
                .first()
                .is_some_and(|header| self.schema.header_matches(header));
            if !header_ok {
                plan.header = Some(RowUpdate {
                    range: RangeRef::row(1, width),
                    values: self.schema.header(),
                });
            }
        }

        let stored_caption = index.and_then(PartitionIndex::caption_column);

        // Last occurrence of a URL wins, keeping the first occurrence's position
        let mut order: Vec<&str> = Vec::new();
        let mut latest: HashMap<&str, &ListingRecord> = HashMap::new();
        for record in records {
            if latest.insert(record.listing_url.as_str(), record).is_none() {
                order.push(record.listing_url.as_str());
            }
        }

        for url in order {
            let record = latest[url];
            let mut row = self.schema.row(record);

            let existing = index.and_then(|idx| {
                let row_number = *idx.by_url.get(url)?;
                Some((row_number, idx.row(row_number)))
            });

            match existing {
                Some((row_number, stored)) => {
                    let stored = stored.cloned().unwrap_or_default();
                    if self.preserve_caption {
                        let kept = stored_caption
                            .and_then(|column| stored.get(column))
                            .filter(|caption| !caption.trim().is_empty());
                        if let Some(caption) = kept {
                            debug!("Keeping stored caption for {url}");
                            row[CAPTION_COLUMN] = caption.clone();
                        }
                    }
                    if padded(&stored, width) == row {
                        plan.unchanged += 1;
                    } else {
                        plan.updates.push(RowUpdate {
                            range: RangeRef::row(row_number, width),
                            values: row,
                        });
                    }
                }
                None => plan.inserts.push(row),
            }
        }

        plan
    }

    async fn apply_updates(
        &self,
        key: &str,
        header: Option<RowUpdate>,
        updates: Vec<RowUpdate>,
        mut index: Option<&mut PartitionIndex>,
        report: &mut PartitionReport,
    ) {
        let has_header = header.is_some();
        let batch: Vec<RowUpdate> = header.into_iter().chain(updates).collect();
        if batch.is_empty() {
            return;
        }

        let store = &self.store;
        let result = self
            .retry
            .run("batch update", StoreError::is_transient, |_| {
                store.batch_update(key, &batch)
            })
            .await;

        match result {
            Ok(()) => {
                report.header_migrated = has_header;
                report.updated = batch.len() - usize::from(has_header);
                if let Some(index) = index.as_deref_mut() {
                    for update in batch {
                        index.store_row(update.range.row, update.values);
                    }
                }
            }
            Err(e) => {
                warn!(
                    "Batch update of {} rows in '{key}' failed, writing rows one by one: {e}",
                    batch.len()
                );
                for update in batch {
                    let is_header = update.range.row == 1;
                    match store.batch_update(key, std::slice::from_ref(&update)).await {
                        Ok(()) => {
                            if is_header {
                                report.header_migrated = true;
                            } else {
                                report.updated += 1;
                            }
                            if let Some(index) = index.as_deref_mut() {
                                index.store_row(update.range.row, update.values);
                            }
                        }
                        Err(e) => {
                            let listing_url = if is_header {
                                "<header>".to_string()
                            } else {
                                update.values.first().cloned().unwrap_or_default()
                            };
                            warn!("Update of row {} in '{key}' failed: {e}", update.range.row);
                            report.failures.push(RowFailure {
                                listing_url,
                                error: e.to_string(),
                            });
                        }
                    }
                }
            }
        }
    }

    /// Append the new rows; returns false when the stored row positions can no
    /// longer be trusted because the destination did not say where rows landed
    async fn apply_inserts(
        &self,
        key: &str,
        inserts: Vec<Vec<String>>,
        mut index: Option<&mut PartitionIndex>,
        report: &mut PartitionReport,
    ) -> bool {
        if inserts.is_empty() {
            return true;
        }

        let store = &self.store;
        let result = self
            .retry
            .run("append rows", StoreError::is_transient, |_| {
                store.append_rows(key, &inserts)
            })
            .await;

        let mut positions_known = true;
        match result {
            Ok(first_row) => {
                report.inserted = inserts.len();
                match (first_row, index.as_deref_mut()) {
                    (Some(first_row), Some(index)) => index.insert_rows(first_row, inserts),
                    (None, _) => positions_known = false,
                    _ => {}
                }
            }
            Err(e) => {
                warn!(
                    "Appending {} rows to '{key}' failed, appending one by one: {e}",
                    inserts.len()
                );
                for row in inserts {
                    match store.append_rows(key, std::slice::from_ref(&row)).await {
                        Ok(first_row) => {
                            report.inserted += 1;
                            match (first_row, index.as_deref_mut()) {
                                (Some(first_row), Some(index)) => {
                                    index.insert_rows(first_row, vec![row])
                                }
                                (None, _) => positions_known = false,
                                _ => {}
                            }
                        }
                        Err(e) => {
                            let listing_url = row.first().cloned().unwrap_or_default();
                            warn!("Append of {listing_url} to '{key}' failed: {e}");
                            report.failures.push(RowFailure {
                                listing_url,
                                error: e.to_string(),
                            });
                        }
                    }
                }
            }
        }
        positions_known
    }
}

/// `row` cut or padded with empty cells to exactly `width` columns
fn padded(row: &[String], width: usize) -> Vec<String> {
    let mut out: Vec<String> = row.iter().take(width).cloned().collect();
    out.resize(width, String::new());
    out
}

/// Group records by their account group, preserving scrape order inside each group
pub fn group_by_partition(records: Vec<ListingRecord>) -> BTreeMap<String, Vec<ListingRecord>> {
    let mut groups: BTreeMap<String, Vec<ListingRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry(record.account_group.clone())
            .or_default()
            .push(record);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn index_maps_urls_to_one_based_rows() {
        let index = PartitionIndex::from_rows(vec![
            row(&["listing_url", "price"]),
            row(&["u1", "$1"]),
            vec![],
            row(&["u2", "$2"]),
            row(&["u1", "$3"]),
        ]);
        assert_eq!(index.by_url.get("u1"), Some(&2));
        assert_eq!(index.by_url.get("u2"), Some(&4));
        assert_eq!(index.by_url.get("listing_url"), None);
        assert_eq!(index.row(4), Some(&row(&["u2", "$2"])));
    }

    #[test]
    fn appended_rows_take_the_reported_row_number() {
        let mut index = PartitionIndex::from_rows(vec![row(&["listing_url"])]);
        index.insert_rows(2, vec![row(&["u9", "$9"])]);
        assert_eq!(index.by_url.get("u9"), Some(&2));
        assert_eq!(index.row(2), Some(&row(&["u9", "$9"])));
    }

    #[test]
    fn rows_inserted_above_shift_later_rows_down() {
        let mut index = PartitionIndex::from_rows(vec![
            row(&["listing_url"]),
            row(&["u1"]),
            vec![],
            row(&["u2"]),
        ]);
        index.insert_rows(3, vec![row(&["u3"]), row(&["u4"])]);

        assert_eq!(index.by_url.get("u1"), Some(&2));
        assert_eq!(index.by_url.get("u3"), Some(&3));
        assert_eq!(index.by_url.get("u4"), Some(&4));
        assert_eq!(index.by_url.get("u2"), Some(&6));
        assert_eq!(index.row(6), Some(&row(&["u2"])));
        assert_eq!(index.row(5), Some(&vec![]));
    }

    #[test]
    fn caption_column_is_found_by_name() {
        let index = PartitionIndex::from_rows(vec![row(&[
            "listing_url",
            "video_url",
            "instagram_account",
            " instagram_caption ",
        ])]);
        assert_eq!(index.caption_column(), Some(3));

        let legacy = PartitionIndex::from_rows(vec![row(&["listing_url", "price"])]);
        assert_eq!(legacy.caption_column(), None);
    }

    #[test]
    fn padding_normalises_width() {
        assert_eq!(padded(&row(&["a"]), 3), row(&["a", "", ""]));
        assert_eq!(padded(&row(&["a", "b", "c"]), 2), row(&["a", "b"]));
    }

    #[test]
    fn grouping_keeps_scrape_order() {
        let mut a = ListingRecord::empty("a");
        a.account_group = "Montgomery County".into();
        let mut b = ListingRecord::empty("b");
        b.account_group = "Howard County".into();
        let mut c = ListingRecord::empty("c");
        c.account_group = "Montgomery County".into();

        let groups = group_by_partition(vec![a, b, c]);
        let urls: Vec<_> = groups["Montgomery County"]
            .iter()
            .map(|r| r.listing_url.as_str())
            .collect();
        assert_eq!(urls, ["a", "c"]);
        assert_eq!(groups["Howard County"].len(), 1);
    }
}
