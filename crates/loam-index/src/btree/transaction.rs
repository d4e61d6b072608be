//! Per-operation context for write operations on the tree.

use loam_buffer::PageWriteGuard;
use loam_common::page::PageId;

/// Carries the state a single insert or remove threads through the tree:
/// the retained ancestor latches and the pages queued for deletion.
///
/// The ancestor chain is an owned stack of write guards. Latches are
/// released structurally: clearing the stack drops the guards, each of
/// which unlatches and unpins its page, so every exit path (including
/// errors) restores latch balance without manual unlock loops.
///
/// Pages emptied by a coalesce are only queued here; they are physically
/// reclaimed by the tree after all latches have been released.
#[derive(Default)]
pub struct Transaction<'a> {
    /// Write-latched ancestors of the node being modified, root-most first.
    page_set: Vec<PageWriteGuard<'a>>,
    /// Pages to reclaim once no latch is held.
    deleted_page_set: Vec<PageId>,
}

impl<'a> Transaction<'a> {
    /// Creates an empty transaction context.
    pub fn new() -> Self {
        Self {
            page_set: Vec::new(),
            deleted_page_set: Vec::new(),
        }
    }

    /// Retains an ancestor latch during descent.
    pub(crate) fn push_page(&mut self, guard: PageWriteGuard<'a>) {
        self.page_set.push(guard);
    }

    /// Takes back the nearest retained ancestor (the node's parent).
    pub(crate) fn pop_page(&mut self) -> Option<PageWriteGuard<'a>> {
        self.page_set.pop()
    }

    /// Releases every retained ancestor latch.
    pub(crate) fn release_page_set(&mut self) {
        self.page_set.clear();
    }

    /// Queues a page for deletion after latch release.
    pub(crate) fn add_deleted_page(&mut self, page_id: PageId) {
        self.deleted_page_set.push(page_id);
    }

    /// Drains the queued deletions.
    pub(crate) fn take_deleted_pages(&mut self) -> Vec<PageId> {
        std::mem::take(&mut self.deleted_page_set)
    }
}
