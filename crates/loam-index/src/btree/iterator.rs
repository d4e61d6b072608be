//! Forward iteration over leaf entries in key order.

use super::leaf;
use super::node;
use super::tree::BPlusTree;
use bytes::Bytes;
use loam_buffer::PinnedPage;
use loam_common::page::PageId;
use loam_common::rid::RecordId;
use tracing::warn;

/// A forward cursor threaded through the leaf sibling chain.
///
/// The current leaf stays pinned for as long as the cursor points into it;
/// the page is only read-latched for the duration of each entry access, so
/// writers make progress between steps. Advancing past the end of a leaf
/// unpins it and pins its successor.
///
/// Two iterators are equal when they reference the same page and index. An
/// exhausted iterator converges to the sentinel returned by
/// [`BPlusTree::end`].
pub struct TreeIterator<'a> {
    tree: &'a BPlusTree,
    page: Option<PinnedPage<'a>>,
    page_id: PageId,
    index: usize,
}

impl<'a> TreeIterator<'a> {
    pub(crate) fn new(
        tree: &'a BPlusTree,
        page: Option<PinnedPage<'a>>,
        page_id: PageId,
        index: usize,
    ) -> Self {
        Self {
            tree,
            page,
            page_id,
            index,
        }
    }

    /// The "one past the last entry" sentinel.
    pub(crate) fn end_sentinel(tree: &'a BPlusTree) -> Self {
        Self {
            tree,
            page: None,
            page_id: PageId::INVALID,
            index: 0,
        }
    }

    /// True when no entries remain.
    pub fn is_end(&self) -> bool {
        self.page.is_none()
    }

    fn exhaust(&mut self) {
        self.page = None;
        self.page_id = PageId::INVALID;
        self.index = 0;
    }
}

impl Iterator for TreeIterator<'_> {
    type Item = (Bytes, RecordId);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let pinned = self.page.as_ref()?;
            let data = pinned.read();

            // Size is re-read under the latch; a concurrent remove may have
            // shrunk the leaf since the last step
            let size = node::size(&**data) as usize;
            if self.index < size {
                let entry = leaf::entry_at(&**data, self.index);
                self.index += 1;
                return Some((entry.key, entry.rid));
            }

            let next = leaf::next_page_id(&**data);
            drop(data);

            if !next.is_valid() {
                self.exhaust();
                return None;
            }

            match self.tree.pager().fetch_pin(next) {
                Ok(pinned) => {
                    self.page = Some(pinned);
                    self.page_id = next;
                    self.index = 0;
                }
                Err(e) => {
                    warn!(error = %e, page = %next, "iterator advance failed");
                    self.exhaust();
                    return None;
                }
            }
        }
    }
}

impl PartialEq for TreeIterator<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.page_id == other.page_id && self.index == other.index
    }
}

impl Eq for TreeIterator<'_> {}
