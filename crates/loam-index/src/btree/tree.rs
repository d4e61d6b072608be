//! Concurrent B+ tree over the pager.

use super::header_page;
use super::internal;
use super::iterator::TreeIterator;
use super::key::{KeyComparator, MAX_KEY_SIZE};
use super::leaf;
use super::node::{self, NodeKind};
use super::transaction::Transaction;
use crate::pager::Pager;
use bytes::Bytes;
use loam_buffer::{PageReadGuard, PageWriteGuard};
use loam_common::config::BTreeConfig;
use loam_common::page::PageId;
use loam_common::rid::RecordId;
use loam_common::{LoamError, Result};
use parking_lot::{Mutex, MutexGuard};
use std::cmp::Ordering;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// The operation a descent is performed for. Reads use a separate
/// hand-over-hand path and never retain ancestors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccessMode {
    Insert,
    Delete,
}

type RootGuard<'a> = MutexGuard<'a, PageId>;

/// A concurrent B+ tree index with unique keys.
///
/// Writers descend with latch crabbing: the root mutex and the page latches
/// along the path are held until a node proves "safe" (cannot split or
/// underflow from this operation), at which point every latch above it is
/// released. Readers descend purely hand-over-hand with read latches.
pub struct BPlusTree {
    /// Name under which the root is recorded on the header page.
    index_name: String,
    /// Current root page. The mutex is the root latch: it guards both the
    /// id and the empty-tree decision.
    root_page_id: Mutex<PageId>,
    /// Page access.
    pager: Arc<Pager>,
    /// Total order over key bytes.
    comparator: KeyComparator,
    /// Leaf capacity bound: a leaf splits upon reaching this many entries.
    leaf_max_size: u16,
    /// Internal capacity bound in children.
    internal_max_size: u16,
}

impl BPlusTree {
    /// Opens or creates the index named `name`.
    ///
    /// The root page id is recovered from the header-page record for
    /// `name`; a name never seen before starts as an empty tree.
    pub fn new(
        name: &str,
        pager: Arc<Pager>,
        comparator: KeyComparator,
        config: &BTreeConfig,
    ) -> Result<Self> {
        config.validate()?;
        if usize::from(config.leaf_max_size) > leaf::max_entries() {
            return Err(LoamError::InvalidConfig(format!(
                "leaf_max_size {} exceeds page capacity {}",
                config.leaf_max_size,
                leaf::max_entries()
            )));
        }
        if usize::from(config.internal_max_size) > internal::max_entries() {
            return Err(LoamError::InvalidConfig(format!(
                "internal_max_size {} exceeds page capacity {}",
                config.internal_max_size,
                internal::max_entries()
            )));
        }
        if name.is_empty() || name.len() > header_page::MAX_NAME_LEN {
            return Err(LoamError::InvalidConfig(format!(
                "index name must be 1..={} bytes",
                header_page::MAX_NAME_LEN
            )));
        }

        if pager.num_pages() == 0 {
            let (page_id, mut guard) = pager.new_page()?;
            debug_assert_eq!(page_id, PageId::HEADER);
            header_page::init(guard.data_mut());
            guard.set_dirty();
        }

        let root = {
            let guard = pager.fetch_read(PageId::HEADER)?;
            header_page::get_record(guard.data(), name).unwrap_or(PageId::INVALID)
        };

        Ok(Self {
            index_name: name.to_string(),
            root_page_id: Mutex::new(root),
            pager,
            comparator,
            leaf_max_size: config.leaf_max_size,
            internal_max_size: config.internal_max_size,
        })
    }

    /// True when the tree holds no keys.
    pub fn is_empty(&self) -> bool {
        !self.root_page_id.lock().is_valid()
    }

    /// The current root page id ([`PageId::INVALID`] when empty).
    pub fn root_page_id(&self) -> PageId {
        *self.root_page_id.lock()
    }

    /// The pager this tree reads and writes through.
    pub(crate) fn pager(&self) -> &Pager {
        &self.pager
    }

    /// Number of levels from root to leaf (0 for an empty tree).
    pub fn height(&self) -> Result<u32> {
        let Some(mut page) = self.latch_root_read()? else {
            return Ok(0);
        };
        let mut levels = 1;
        loop {
            match node::kind(page.data())? {
                NodeKind::Leaf => return Ok(levels),
                NodeKind::Internal => {
                    let child = internal::value_at(page.data(), 0);
                    let next = self.pager.fetch_read(child)?;
                    page = next;
                    levels += 1;
                }
            }
        }
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Point lookup. Returns the values stored under `key` (at most one,
    /// since keys are unique).
    pub fn get_value(&self, key: &[u8]) -> Result<Vec<RecordId>> {
        let Some(guard) = self.find_leaf_read(key)? else {
            return Ok(Vec::new());
        };
        Ok(leaf::lookup(guard.data(), key, self.comparator)
            .into_iter()
            .collect())
    }

    /// Read descent to the leaf that may contain `key`, hand-over-hand.
    fn find_leaf_read(&self, key: &[u8]) -> Result<Option<PageReadGuard<'_>>> {
        let mut page = match self.latch_root_read()? {
            Some(page) => page,
            None => return Ok(None),
        };
        loop {
            match node::kind(page.data())? {
                NodeKind::Leaf => return Ok(Some(page)),
                NodeKind::Internal => {
                    if node::size(page.data()) == 0 {
                        return Err(LoamError::TreeCorrupted(
                            "empty internal node on read path".to_string(),
                        ));
                    }
                    let child = internal::lookup(page.data(), key, self.comparator);
                    // Child latched before the parent guard is released
                    let next = self.pager.fetch_read(child)?;
                    page = next;
                }
            }
        }
    }

    /// Read descent to the leftmost leaf.
    fn find_leftmost_read(&self) -> Result<Option<PageReadGuard<'_>>> {
        let Some(mut page) = self.latch_root_read()? else {
            return Ok(None);
        };
        loop {
            match node::kind(page.data())? {
                NodeKind::Leaf => return Ok(Some(page)),
                NodeKind::Internal => {
                    if node::size(page.data()) == 0 {
                        return Err(LoamError::TreeCorrupted(
                            "empty internal node on read path".to_string(),
                        ));
                    }
                    let child = internal::value_at(page.data(), 0);
                    let next = self.pager.fetch_read(child)?;
                    page = next;
                }
            }
        }
    }

    /// Takes the root mutex just long enough to learn the root id, then
    /// read-latches the root page. The root may split between those two
    /// steps, in which case the latched page has gained a parent and the
    /// descent restarts from the new root.
    fn latch_root_read(&self) -> Result<Option<PageReadGuard<'_>>> {
        loop {
            let root_id = *self.root_page_id.lock();
            if !root_id.is_valid() {
                return Ok(None);
            }
            let guard = self.pager.fetch_read(root_id)?;
            if node::is_root(guard.data()) {
                return Ok(Some(guard));
            }
        }
    }

    // =========================================================================
    // Insertion
    // =========================================================================

    /// Inserts `key -> rid`. Returns false (leaving the tree unchanged)
    /// when the key is already present.
    pub fn insert<'t>(
        &'t self,
        key: &[u8],
        rid: RecordId,
        txn: &mut Transaction<'t>,
    ) -> Result<bool> {
        if key.len() > MAX_KEY_SIZE {
            return Err(LoamError::KeyTooLarge {
                size: key.len(),
                max: MAX_KEY_SIZE,
            });
        }

        let mut root_guard = Some(self.root_page_id.lock());
        if !root_guard.as_deref().copied().unwrap_or(PageId::INVALID).is_valid() {
            return self.start_new_tree(key, rid, root_guard.take().expect("root latch held"));
        }

        let result = self.insert_into_leaf(key, rid, txn, &mut root_guard);
        if result.is_err() {
            txn.release_page_set();
        }
        result
    }

    /// Creates a single-leaf tree holding `key` and records the new root.
    fn start_new_tree(
        &self,
        key: &[u8],
        rid: RecordId,
        mut root_guard: RootGuard<'_>,
    ) -> Result<bool> {
        let (page_id, mut guard) = self.pager.new_page()?;
        leaf::init(guard.data_mut(), page_id, PageId::INVALID, self.leaf_max_size);
        leaf::insert(guard.data_mut(), key, rid, self.comparator)?;
        guard.set_dirty();

        *root_guard = page_id;
        self.write_root_record(page_id, true)?;
        debug!(root = %page_id, index = %self.index_name, "started new tree");
        Ok(true)
    }

    fn insert_into_leaf<'t>(
        &'t self,
        key: &[u8],
        rid: RecordId,
        txn: &mut Transaction<'t>,
        root_guard: &mut Option<RootGuard<'t>>,
    ) -> Result<bool> {
        let mut leaf_guard = self.find_leaf_write(key, AccessMode::Insert, txn, root_guard)?;

        if leaf::lookup(leaf_guard.data(), key, self.comparator).is_some() {
            txn.release_page_set();
            *root_guard = None;
            return Ok(false);
        }

        let new_size = leaf::insert(leaf_guard.data_mut(), key, rid, self.comparator)?;
        leaf_guard.set_dirty();

        if new_size < self.leaf_max_size {
            txn.release_page_set();
            *root_guard = None;
            return Ok(true);
        }

        // The leaf reached its bound: split and push the middle key up
        let (new_id, mut new_leaf) = self.pager.new_page()?;
        leaf::init(
            new_leaf.data_mut(),
            new_id,
            node::parent(leaf_guard.data()),
            self.leaf_max_size,
        );
        leaf::move_half_to(leaf_guard.data_mut(), new_leaf.data_mut());
        let old_next = leaf::next_page_id(leaf_guard.data());
        leaf::set_next_page_id(new_leaf.data_mut(), old_next);
        leaf::set_next_page_id(leaf_guard.data_mut(), new_id);
        new_leaf.set_dirty();

        let up_key = leaf::key_at(new_leaf.data(), 0);
        debug!(page = %leaf_guard.page_id(), sibling = %new_id, "leaf split");

        self.insert_into_parent(leaf_guard, up_key, new_leaf, txn, root_guard)?;
        Ok(true)
    }

    /// Write descent with crabbing. The returned leaf is write-latched;
    /// ancestors that might still be affected stay latched in `txn`.
    fn find_leaf_write<'t>(
        &'t self,
        key: &[u8],
        mode: AccessMode,
        txn: &mut Transaction<'t>,
        root_guard: &mut Option<RootGuard<'t>>,
    ) -> Result<PageWriteGuard<'t>> {
        let root_id = root_guard
            .as_deref()
            .copied()
            .ok_or_else(|| LoamError::TreeCorrupted("write descent without root latch".into()))?;

        let mut page = self.pager.fetch_write(root_id)?;
        if self.is_safe(page.data(), mode)? {
            *root_guard = None;
        }

        loop {
            match node::kind(page.data())? {
                NodeKind::Leaf => return Ok(page),
                NodeKind::Internal => {
                    let child_id = internal::lookup(page.data(), key, self.comparator);
                    let child = self.pager.fetch_write(child_id)?;
                    txn.push_page(page);
                    if self.is_safe(child.data(), mode)? {
                        *root_guard = None;
                        txn.release_page_set();
                    }
                    page = child;
                }
            }
        }
    }

    /// A node is safe for `mode` when the operation cannot propagate past
    /// it: no split on insert, no underflow on delete.
    fn is_safe(&self, data: &[u8], mode: AccessMode) -> Result<bool> {
        let size = node::size(data);
        if node::is_root(data) {
            return Ok(match mode {
                AccessMode::Insert => size < node::max_items(data)?,
                AccessMode::Delete => size > 2,
            });
        }
        Ok(match mode {
            AccessMode::Insert => size < node::max_items(data)?,
            AccessMode::Delete => size > node::min_size(data)?,
        })
    }

    /// Propagates a split upward: `new` is the fresh right sibling of
    /// `old`, `up_key` the separator between them. Iterates over the
    /// retained ancestor stack instead of recursing.
    fn insert_into_parent<'t>(
        &'t self,
        old: PageWriteGuard<'t>,
        up_key: Bytes,
        new: PageWriteGuard<'t>,
        txn: &mut Transaction<'t>,
        root_guard: &mut Option<RootGuard<'t>>,
    ) -> Result<()> {
        let mut old = old;
        let mut new = new;
        let mut up_key = up_key;

        loop {
            if node::is_root(old.data()) {
                // The root itself split: grow the tree by one level
                let (root_id, mut root_page) = self.pager.new_page()?;
                internal::init(
                    root_page.data_mut(),
                    root_id,
                    PageId::INVALID,
                    self.internal_max_size,
                );
                internal::populate_new_root(
                    root_page.data_mut(),
                    old.page_id(),
                    &up_key,
                    new.page_id(),
                )?;
                node::set_parent(old.data_mut(), root_id);
                node::set_parent(new.data_mut(), root_id);
                root_page.set_dirty();
                old.set_dirty();
                new.set_dirty();

                let mut guard = root_guard.take().ok_or_else(|| {
                    LoamError::TreeCorrupted("root split without root latch".into())
                })?;
                *guard = root_id;
                self.write_root_record(root_id, false)?;
                drop(guard);
                txn.release_page_set();
                debug!(root = %root_id, "new root after split");
                return Ok(());
            }

            let mut parent = txn.pop_page().ok_or_else(|| {
                LoamError::TreeCorrupted("ancestor chain exhausted during split".into())
            })?;
            let new_size = internal::insert_node_after(
                parent.data_mut(),
                old.page_id(),
                &up_key,
                new.page_id(),
            )?;
            parent.set_dirty();

            if new_size <= self.internal_max_size {
                txn.release_page_set();
                *root_guard = None;
                return Ok(());
            }

            // Parent overflowed past its bound: split it and keep going up
            let (split_id, mut split_page) = self.pager.new_page()?;
            internal::init(
                split_page.data_mut(),
                split_id,
                node::parent(parent.data()),
                self.internal_max_size,
            );
            let moved = internal::move_half_to(parent.data_mut(), split_page.data_mut());
            split_page.set_dirty();

            for child in moved {
                // The nodes split one level below may themselves have moved;
                // their latches are still held here, so write through them
                if child == old.page_id() {
                    node::set_parent(old.data_mut(), split_id);
                    old.set_dirty();
                } else if child == new.page_id() {
                    node::set_parent(new.data_mut(), split_id);
                    new.set_dirty();
                } else {
                    self.reparent(child, split_id)?;
                }
            }

            let next_key = internal::key_at(split_page.data(), 0);
            debug!(page = %parent.page_id(), sibling = %split_id, "internal split");

            old = parent;
            new = split_page;
            up_key = next_key;
        }
    }

    /// Rewrites a child's parent pointer.
    fn reparent(&self, child: PageId, parent: PageId) -> Result<()> {
        let mut guard = self.pager.fetch_write(child)?;
        node::set_parent(guard.data_mut(), parent);
        guard.set_dirty();
        Ok(())
    }

    /// Records the current root on the header page. Callers hold the root
    /// latch, which serializes all header writes for this tree.
    fn write_root_record(&self, root: PageId, insert: bool) -> Result<()> {
        let mut guard = self.pager.fetch_write(PageId::HEADER)?;
        if insert {
            header_page::insert_record(guard.data_mut(), &self.index_name, root)?;
        } else {
            header_page::update_record(guard.data_mut(), &self.index_name, root)?;
        }
        guard.set_dirty();
        Ok(())
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Removes `key` if present; absent keys are a silent no-op.
    pub fn remove<'t>(&'t self, key: &[u8], txn: &mut Transaction<'t>) -> Result<()> {
        let mut root_guard = Some(self.root_page_id.lock());
        if !root_guard.as_deref().copied().unwrap_or(PageId::INVALID).is_valid() {
            return Ok(());
        }

        let result = self.remove_inner(key, txn, &mut root_guard);
        if result.is_err() {
            txn.release_page_set();
        }
        drop(root_guard);

        // Reclaim emptied pages only now that every latch is released
        for page_id in txn.take_deleted_pages() {
            if !self.pager.delete_page(page_id) {
                debug!(page = %page_id, "deferred page delete skipped, still pinned");
            }
        }
        result
    }

    fn remove_inner<'t>(
        &'t self,
        key: &[u8],
        txn: &mut Transaction<'t>,
        root_guard: &mut Option<RootGuard<'t>>,
    ) -> Result<()> {
        let mut leaf_guard = self.find_leaf_write(key, AccessMode::Delete, txn, root_guard)?;

        let old_size = node::size(leaf_guard.data());
        let new_size = leaf::remove(leaf_guard.data_mut(), key, self.comparator);
        if new_size == old_size {
            txn.release_page_set();
            *root_guard = None;
            return Ok(());
        }
        leaf_guard.set_dirty();

        self.coalesce_or_redistribute(leaf_guard, txn, root_guard)
    }

    /// Restores size bounds from `node_guard` upward, iterating over the
    /// retained ancestor stack.
    fn coalesce_or_redistribute<'t>(
        &'t self,
        node_guard: PageWriteGuard<'t>,
        txn: &mut Transaction<'t>,
        root_guard: &mut Option<RootGuard<'t>>,
    ) -> Result<()> {
        let mut current = node_guard;

        loop {
            if node::is_root(current.data()) {
                let delete_root = self.adjust_root(&mut current, root_guard)?;
                if delete_root {
                    txn.add_deleted_page(current.page_id());
                }
                txn.release_page_set();
                *root_guard = None;
                return Ok(());
            }

            if node::size(current.data()) >= node::min_size(current.data())? {
                txn.release_page_set();
                *root_guard = None;
                return Ok(());
            }

            let mut parent = txn.pop_page().ok_or_else(|| {
                LoamError::TreeCorrupted("ancestor chain exhausted during rebalance".into())
            })?;
            let index = internal::value_index(parent.data(), current.page_id())
                .ok_or_else(|| {
                    LoamError::TreeCorrupted("underflowed node missing from its parent".into())
                })?;

            // Right sibling for the leftmost child, left sibling otherwise
            let sibling_index = if index == 0 { 1 } else { index - 1 };
            let sibling_id = internal::value_at(parent.data(), sibling_index);
            let mut sibling = self.pager.fetch_write(sibling_id)?;

            let max_items = node::max_items(current.data())?;
            if node::size(sibling.data()) + node::size(current.data()) > max_items {
                self.redistribute(&mut sibling, &mut current, &mut parent, index)?;
                txn.release_page_set();
                *root_guard = None;
                return Ok(());
            }

            // Coalesce: always merge the right node into the left one and
            // delete the right page
            let (mut left, mut right, key_index) = if index == 0 {
                (current, sibling, 1)
            } else {
                (sibling, current, index)
            };

            match node::kind(left.data())? {
                NodeKind::Leaf => {
                    let right_next = leaf::next_page_id(right.data());
                    leaf::move_all_to(right.data_mut(), left.data_mut())?;
                    leaf::set_next_page_id(left.data_mut(), right_next);
                }
                NodeKind::Internal => {
                    let middle = internal::key_at(parent.data(), key_index);
                    let moved =
                        internal::move_all_to(right.data_mut(), left.data_mut(), &middle)?;
                    let left_id = left.page_id();
                    for child in moved {
                        self.reparent(child, left_id)?;
                    }
                }
            }
            left.set_dirty();
            right.set_dirty();

            internal::remove(parent.data_mut(), key_index)?;
            parent.set_dirty();
            txn.add_deleted_page(right.page_id());
            debug!(left = %left.page_id(), right = %right.page_id(), "coalesced siblings");

            drop(left);
            drop(right);
            current = parent;
        }
    }

    /// Moves one entry between siblings and fixes the separator in the
    /// parent. `index` is the underflowed node's slot in the parent;
    /// `sibling` is to its right when `index == 0`, to its left otherwise.
    fn redistribute(
        &self,
        sibling: &mut PageWriteGuard<'_>,
        current: &mut PageWriteGuard<'_>,
        parent: &mut PageWriteGuard<'_>,
        index: usize,
    ) -> Result<()> {
        match node::kind(current.data())? {
            NodeKind::Leaf => {
                if index == 0 {
                    leaf::move_first_to_end_of(sibling.data_mut(), current.data_mut())?;
                    let new_separator = leaf::key_at(sibling.data(), 0);
                    internal::set_key_at(parent.data_mut(), 1, &new_separator)?;
                } else {
                    leaf::move_last_to_front_of(sibling.data_mut(), current.data_mut())?;
                    let new_separator = leaf::key_at(current.data(), 0);
                    internal::set_key_at(parent.data_mut(), index, &new_separator)?;
                }
            }
            NodeKind::Internal => {
                if index == 0 {
                    let middle = internal::key_at(parent.data(), 1);
                    let moved = internal::move_first_to_end_of(
                        sibling.data_mut(),
                        current.data_mut(),
                        &middle,
                    )?;
                    self.reparent(moved, current.page_id())?;
                    let new_separator = internal::key_at(sibling.data(), 0);
                    internal::set_key_at(parent.data_mut(), 1, &new_separator)?;
                } else {
                    let middle = internal::key_at(parent.data(), index);
                    let moved = internal::move_last_to_front_of(
                        sibling.data_mut(),
                        current.data_mut(),
                        &middle,
                    )?;
                    self.reparent(moved, current.page_id())?;
                    let new_separator = internal::key_at(current.data(), 0);
                    internal::set_key_at(parent.data_mut(), index, &new_separator)?;
                }
            }
        }
        current.set_dirty();
        sibling.set_dirty();
        parent.set_dirty();
        debug!(page = %current.page_id(), sibling = %sibling.page_id(), "redistributed siblings");
        Ok(())
    }

    /// Handles underflow at the root. Returns true when the old root page
    /// should be deleted.
    fn adjust_root(
        &self,
        old_root: &mut PageWriteGuard<'_>,
        root_guard: &mut Option<RootGuard<'_>>,
    ) -> Result<bool> {
        let kind = node::kind(old_root.data())?;
        let size = node::size(old_root.data());

        if kind == NodeKind::Internal && size == 1 {
            // One surviving child: promote it to root
            let child = internal::remove_and_return_only_child(old_root.data_mut())?;
            old_root.set_dirty();

            {
                let guard = root_guard.as_mut().ok_or_else(|| {
                    LoamError::TreeCorrupted("root collapse without root latch".into())
                })?;
                **guard = child;
            }
            self.write_root_record(child, false)?;

            let mut child_guard = self.pager.fetch_write(child)?;
            node::set_parent(child_guard.data_mut(), PageId::INVALID);
            child_guard.set_dirty();
            drop(child_guard);

            *root_guard = None;
            debug!(root = %child, "root collapsed to its only child");
            return Ok(true);
        }

        if kind == NodeKind::Leaf && size == 0 {
            // Last key removed: the tree is empty again
            {
                let guard = root_guard.as_mut().ok_or_else(|| {
                    LoamError::TreeCorrupted("root collapse without root latch".into())
                })?;
                **guard = PageId::INVALID;
            }
            self.write_root_record(PageId::INVALID, false)?;
            *root_guard = None;
            debug!(index = %self.index_name, "tree emptied");
            return Ok(true);
        }

        Ok(false)
    }

    // =========================================================================
    // Iteration
    // =========================================================================

    /// Iterator positioned at the smallest key.
    pub fn iter(&self) -> Result<TreeIterator<'_>> {
        let Some(guard) = self.find_leftmost_read()? else {
            return Ok(TreeIterator::end_sentinel(self));
        };
        let page_id = guard.page_id();
        let pinned = guard.into_pinned();
        Ok(TreeIterator::new(self, Some(pinned), page_id, 0))
    }

    /// Iterator positioned at the first key >= `key`.
    pub fn iter_from(&self, key: &[u8]) -> Result<TreeIterator<'_>> {
        let Some(guard) = self.find_leaf_read(key)? else {
            return Ok(TreeIterator::end_sentinel(self));
        };
        let index = leaf::key_index(guard.data(), key, self.comparator);
        let page_id = guard.page_id();
        let pinned = guard.into_pinned();
        Ok(TreeIterator::new(self, Some(pinned), page_id, index))
    }

    /// The exhausted-iterator sentinel; an iterator that has walked off the
    /// last leaf compares equal to it.
    pub fn end(&self) -> TreeIterator<'_> {
        TreeIterator::end_sentinel(self)
    }

    // =========================================================================
    // Test helpers
    // =========================================================================

    /// Reads signed 64-bit keys line by line and inserts each one, deriving
    /// the record id from the key. Returns the number of keys inserted.
    pub fn insert_from_file<'t>(
        &'t self,
        path: &Path,
        txn: &mut Transaction<'t>,
    ) -> Result<usize> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let mut inserted = 0;
        for line in reader.lines() {
            let line = line?;
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            let key: i64 = text
                .parse()
                .map_err(|_| LoamError::ParseError(format!("invalid key '{}'", text)))?;
            let encoded = super::key::encode_i64_key(key);
            if self.insert(&encoded, RecordId::from_i64(key), txn)? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// Reads signed 64-bit keys line by line and removes each one.
    pub fn remove_from_file<'t>(&'t self, path: &Path, txn: &mut Transaction<'t>) -> Result<()> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        for line in reader.lines() {
            let line = line?;
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            let key: i64 = text
                .parse()
                .map_err(|_| LoamError::ParseError(format!("invalid key '{}'", text)))?;
            let encoded = super::key::encode_i64_key(key);
            self.remove(&encoded, txn)?;
        }
        Ok(())
    }

    // =========================================================================
    // Integrity checking
    // =========================================================================

    /// Walks the whole tree verifying its structural invariants: key order,
    /// parent pointers, separator consistency, size bounds, uniqueness, and
    /// sibling-chain completeness. Intended for tests and debugging; assumes
    /// no concurrent writers.
    pub fn verify_integrity(&self) -> Result<()> {
        let root_id = *self.root_page_id.lock();
        if !root_id.is_valid() {
            return Ok(());
        }

        let mut in_order = Vec::new();
        self.verify_node(root_id, PageId::INVALID, None, None, &mut in_order)?;

        for pair in in_order.windows(2) {
            if (self.comparator)(&pair[0], &pair[1]) != Ordering::Less {
                return Err(LoamError::TreeCorrupted(
                    "keys not strictly ascending across leaves".to_string(),
                ));
            }
        }

        // The sibling chain must enumerate exactly the same keys
        let mut chain = Vec::new();
        let mut leaf_id = {
            let mut page_id = root_id;
            loop {
                let guard = self.pager.fetch_read(page_id)?;
                match node::kind(guard.data())? {
                    NodeKind::Leaf => break page_id,
                    NodeKind::Internal => page_id = internal::value_at(guard.data(), 0),
                }
            }
        };
        while leaf_id.is_valid() {
            let guard = self.pager.fetch_read(leaf_id)?;
            for entry in leaf::entries(guard.data()) {
                chain.push(entry.key);
            }
            leaf_id = leaf::next_page_id(guard.data());
        }
        if chain != in_order {
            return Err(LoamError::TreeCorrupted(
                "sibling chain disagrees with tree order".to_string(),
            ));
        }

        Ok(())
    }

    fn verify_node(
        &self,
        page_id: PageId,
        expected_parent: PageId,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
        out: &mut Vec<Bytes>,
    ) -> Result<()> {
        let guard = self.pager.fetch_read(page_id)?;
        let data = guard.data();

        if node::page_id(data) != page_id {
            return Err(LoamError::TreeCorrupted(format!(
                "page {} stores id {}",
                page_id,
                node::page_id(data)
            )));
        }
        if node::parent(data) != expected_parent {
            return Err(LoamError::TreeCorrupted(format!(
                "page {} has parent {}, expected {}",
                page_id,
                node::parent(data),
                expected_parent
            )));
        }

        let kind = node::kind(data)?;
        let size = node::size(data);
        let is_root = !expected_parent.is_valid();

        if is_root {
            let min_root = match kind {
                NodeKind::Leaf => 1,
                NodeKind::Internal => 2,
            };
            if size < min_root {
                return Err(LoamError::TreeCorrupted(format!(
                    "root {} below minimum occupancy",
                    page_id
                )));
            }
        } else if size < node::min_size(data)? {
            return Err(LoamError::TreeCorrupted(format!(
                "page {} below minimum size",
                page_id
            )));
        }
        if size > node::max_items(data)? {
            return Err(LoamError::TreeCorrupted(format!(
                "page {} above maximum size",
                page_id
            )));
        }

        match kind {
            NodeKind::Leaf => {
                for entry in leaf::entries(data) {
                    if let Some(lower) = lower {
                        if (self.comparator)(&entry.key, lower) == Ordering::Less {
                            return Err(LoamError::TreeCorrupted(format!(
                                "leaf {} key below its subtree bound",
                                page_id
                            )));
                        }
                    }
                    if let Some(upper) = upper {
                        if (self.comparator)(&entry.key, upper) != Ordering::Less {
                            return Err(LoamError::TreeCorrupted(format!(
                                "leaf {} key above its subtree bound",
                                page_id
                            )));
                        }
                    }
                    out.push(entry.key);
                }
                Ok(())
            }
            NodeKind::Internal => {
                let entries = internal::entries(data);
                drop(guard);

                for i in 1..entries.len().saturating_sub(1) {
                    if (self.comparator)(&entries[i].key, &entries[i + 1].key) != Ordering::Less {
                        return Err(LoamError::TreeCorrupted(format!(
                            "internal {} separators out of order",
                            page_id
                        )));
                    }
                }

                for (i, entry) in entries.iter().enumerate() {
                    let child_lower = if i == 0 { lower } else { Some(&entry.key[..]) };
                    let child_upper = if i + 1 < entries.len() {
                        Some(&entries[i + 1].key[..])
                    } else {
                        upper
                    };
                    self.verify_node(entry.child, page_id, child_lower, child_upper, out)?;
                }
                Ok(())
            }
        }
    }
}
