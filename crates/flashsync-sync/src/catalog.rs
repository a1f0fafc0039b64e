//! Sorted catalog of card files
//!
//! The catalog keeps one [`FileEntry`] per remote path, ordered by directory
//! and then file name. New entries are inserted at their sorted position, so
//! incremental discovery never needs a full re-sort.
//!
//! After [`FileCatalog::merge`] and [`FileCatalog::reconcile_deletions`],
//! every entry is either still present on the card or kept as `Copied` /
//! `Recycled`.

use std::{cmp::Ordering, collections::HashSet};

use flashsync_core::domain::{FileEntry, FileStatus, TargetFilter};

/// Catalog order: directory, then file name
pub fn entry_order(a: &FileEntry, b: &FileEntry) -> Ordering {
    a.directory()
        .cmp(b.directory())
        .then_with(|| a.file_name().cmp(b.file_name()))
}

/// What a merge did to the catalog
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Paths inserted by this merge, in catalog order
    pub added: Vec<String>,
    /// Existing entries found again with the same size
    pub kept: usize,
    /// Existing entries missing from the listing
    pub vanished: usize,
}

/// What a deletion pass did to the catalog
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionOutcome {
    /// `Copied` entries gone from the card whose local files go to the
    /// recycle folder
    pub recycled: Vec<String>,
    /// Entries dropped from the catalog
    pub removed: Vec<String>,
}

/// Ordered collection of card files
#[derive(Debug, Clone, Default)]
pub struct FileCatalog {
    entries: Vec<FileEntry>,
}

impl FileCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.iter()
    }

    fn position(&self, entry: &FileEntry) -> Result<usize, usize> {
        self.entries
            .binary_search_by(|probe| entry_order(probe, entry))
    }

    fn index_of(&self, path: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.file_path() == path)
    }

    pub fn get(&self, path: &str) -> Option<&FileEntry> {
        self.index_of(path).map(|i| &self.entries[i])
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut FileEntry> {
        self.index_of(path).map(move |i| &mut self.entries[i])
    }

    /// Inserts `entry` at its sorted position, replacing an entry with the
    /// same remote path
    pub fn insert(&mut self, entry: FileEntry) {
        match self.position(&entry) {
            Ok(i) => self.entries[i] = entry,
            Err(i) => self.entries.insert(i, entry),
        }
    }

    pub fn remove(&mut self, path: &str) -> Option<FileEntry> {
        self.index_of(path).map(|i| self.entries.remove(i))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Replaces the contents with `count` placeholder entries
    pub fn load_samples(&mut self, count: usize) {
        self.clear();
        for index in 1..=count {
            self.insert(FileEntry::sample(index));
        }
    }

    /// Whether any entry is a placeholder
    pub fn holds_samples(&self) -> bool {
        self.entries.iter().any(FileEntry::is_sample)
    }

    /// Whether any listed file carries a signature already in the catalog
    pub fn shares_signature(&self, listing: &[FileEntry]) -> bool {
        let known: HashSet<&str> = self.entries.iter().map(FileEntry::signature).collect();
        listing.iter().any(|e| known.contains(e.signature()))
    }

    // ------------------------------------------------------------------------
    // Merge and reconcile
    // ------------------------------------------------------------------------

    /// Merges a fresh remote listing into the catalog.
    ///
    /// Existing entries found again with the same size stay in place and
    /// have their local state recomputed; the rest are marked gone from the
    /// card. Every remaining listed file is new and is inserted in order.
    pub fn merge<F>(&mut self, listing: Vec<FileEntry>, is_copied_local: F) -> MergeSummary
    where
        F: Fn(&FileEntry) -> bool,
    {
        let mut incoming = listing;
        let mut summary = MergeSummary::default();

        for existing in &mut self.entries {
            let path = existing.file_path();
            let found = incoming
                .iter()
                .position(|e| e.file_path() == path && e.size() == existing.size());

            match found {
                Some(i) => {
                    incoming.swap_remove(i);
                    let alive_local = is_copied_local(existing);
                    existing.is_alive_remote = true;
                    existing.refresh_local(alive_local);
                    summary.kept += 1;
                }
                None => {
                    existing.is_alive_remote = false;
                    summary.vanished += 1;
                }
            }
        }

        incoming.sort_by(entry_order);
        for mut entry in incoming {
            let alive_local = is_copied_local(&entry);
            entry.is_alive_remote = true;
            entry.refresh_local(alive_local);
            summary.added.push(entry.file_path());
            self.insert(entry);
        }

        summary
    }

    /// Drops entries that are gone from the card and collects recycle
    /// candidates.
    ///
    /// With `retain_recycled`, gone `Copied` entries stay in the catalog
    /// unchanged and are reported in [`DeletionOutcome::recycled`]. They
    /// become `Recycled` only through [`FileCatalog::mark_recycled`], once
    /// their local files are in the recycle folder. Everything else that is
    /// gone from the card is removed.
    pub fn reconcile_deletions(&mut self, retain_recycled: bool) -> DeletionOutcome {
        let mut outcome = DeletionOutcome::default();

        self.entries.retain(|entry| {
            if entry.is_alive_remote || entry.status() == FileStatus::Recycled {
                return true;
            }
            if retain_recycled && entry.status() == FileStatus::Copied {
                outcome.recycled.push(entry.file_path());
                return true;
            }
            outcome.removed.push(entry.file_path());
            false
        });

        outcome
    }

    /// Marks recycle candidates whose local files have been moved
    pub fn mark_recycled(&mut self, paths: &[String]) {
        for path in paths {
            if let Some(entry) = self.get_mut(path) {
                let result = entry.transition_to(FileStatus::Recycled);
                debug_assert!(result.is_ok(), "{path} cannot be recycled");
            }
        }
    }

    // ------------------------------------------------------------------------
    // Copy queue
    // ------------------------------------------------------------------------

    fn is_eligible(entry: &FileEntry, filter: &TargetFilter) -> bool {
        filter.matches(entry) && entry.is_alive_remote && entry.status() == FileStatus::NotCopied
    }

    /// Whether any target entry on the card has not been copied yet.
    ///
    /// With `mark`, such entries become `ToBeCopied`.
    pub fn mark_to_be_copied(&mut self, filter: &TargetFilter, mark: bool) -> bool {
        let mut found = false;
        for entry in &mut self.entries {
            if Self::is_eligible(entry, filter) {
                found = true;
                if mark {
                    let result = entry.transition_to(FileStatus::ToBeCopied);
                    debug_assert!(result.is_ok(), "eligible entries are NotCopied");
                }
            }
        }
        found
    }

    pub fn has_to_be_copied(&self, filter: &TargetFilter) -> bool {
        self.next_to_be_copied(filter).is_some()
    }

    /// First target entry waiting to be copied, in catalog order
    pub fn next_to_be_copied(&self, filter: &TargetFilter) -> Option<String> {
        self.entries
            .iter()
            .find(|e| filter.matches(e) && e.status() == FileStatus::ToBeCopied)
            .map(FileEntry::file_path)
    }

    /// Flips the manual selection of one entry.
    ///
    /// `NotCopied` entries still on the card become `ToBeCopied`; a
    /// `ToBeCopied` entry goes back to `Copied` or `NotCopied` depending on
    /// its local copy. Returns the new status when something changed.
    pub fn toggle(&mut self, path: &str) -> Option<FileStatus> {
        let entry = self.get_mut(path)?;
        let target = match entry.status() {
            FileStatus::NotCopied if entry.is_alive_remote => FileStatus::ToBeCopied,
            FileStatus::ToBeCopied if entry.is_alive_local => FileStatus::Copied,
            FileStatus::ToBeCopied => FileStatus::NotCopied,
            _ => return None,
        };
        entry.transition_to(target).ok()?;
        Some(target)
    }

    /// Whether every target entry has a thumbnail or no way to get one
    pub fn thumbnails_filled(&self, filter: &TargetFilter) -> bool {
        self.entries
            .iter()
            .filter(|e| filter.matches(e) && e.size() != 0)
            .all(|e| {
                e.has_thumbnail()
                    || (!(e.is_alive_remote && e.can_get_thumbnail_remote)
                        && !(e.is_alive_local && e.can_load_data_local))
            })
    }
}
