//! Disk manager for page-level file I/O.

use loam_common::page::{PageId, PAGE_SIZE};
use loam_common::{LoamError, Result};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Name of the single data file inside the data directory.
const DATA_FILE_NAME: &str = "loam.db";

/// Configuration for the disk manager.
#[derive(Debug, Clone)]
pub struct DiskManagerConfig {
    /// Base directory for the data file.
    pub data_dir: PathBuf,
    /// Enable fsync after writes.
    pub fsync_enabled: bool,
}

impl Default for DiskManagerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            fsync_enabled: true,
        }
    }
}

/// Manages reading and writing pages in the data file.
///
/// Pages freed during a run are kept on an in-memory free list and reused by
/// subsequent allocations; the list is not persisted, so pages freed right
/// before shutdown simply stay allocated.
pub struct DiskManager {
    /// Configuration.
    config: DiskManagerConfig,
    /// Open file handle and allocation state.
    state: Mutex<FileState>,
}

struct FileState {
    /// The data file handle.
    file: File,
    /// Number of pages in the file.
    num_pages: u32,
    /// Freed page numbers available for reuse.
    free_pages: Vec<u32>,
}

impl DiskManager {
    /// Creates a new disk manager, opening or creating the data file.
    pub fn new(config: DiskManagerConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let path = config.data_dir.join(DATA_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let file_size = file.metadata()?.len();
        let num_pages = (file_size / PAGE_SIZE as u64) as u32;

        Ok(Self {
            config,
            state: Mutex::new(FileState {
                file,
                num_pages,
                free_pages: Vec::new(),
            }),
        })
    }

    /// Returns the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Reads a page from disk.
    pub fn read_page(&self, page_id: PageId) -> Result<[u8; PAGE_SIZE]> {
        let mut state = self.state.lock();

        if !page_id.is_valid() || page_id.0 >= state.num_pages {
            return Err(LoamError::PageNotFound(page_id));
        }

        let offset = (page_id.0 as u64) * (PAGE_SIZE as u64);
        state.file.seek(SeekFrom::Start(offset))?;

        let mut buffer = [0u8; PAGE_SIZE];
        state.file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    /// Writes a page to disk.
    pub fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let mut state = self.state.lock();

        if !page_id.is_valid() {
            return Err(LoamError::PageNotFound(page_id));
        }

        let offset = (page_id.0 as u64) * (PAGE_SIZE as u64);
        state.file.seek(SeekFrom::Start(offset))?;
        state.file.write_all(data)?;

        if self.config.fsync_enabled {
            state.file.sync_all()?;
        }

        // Update page count if we extended the file
        if page_id.0 >= state.num_pages {
            state.num_pages = page_id.0 + 1;
        }

        Ok(())
    }

    /// Allocates a page, reusing a freed page if one is available.
    ///
    /// Returns the PageId of the allocated page.
    pub fn allocate_page(&self) -> Result<PageId> {
        let mut state = self.state.lock();

        if let Some(page_num) = state.free_pages.pop() {
            return Ok(PageId::new(page_num));
        }

        let page_num = state.num_pages;
        let page_id = PageId::new(page_num);

        // Write an empty page to extend the file
        let offset = (page_num as u64) * (PAGE_SIZE as u64);
        state.file.seek(SeekFrom::Start(offset))?;
        state.file.write_all(&[0u8; PAGE_SIZE])?;

        if self.config.fsync_enabled {
            state.file.sync_all()?;
        }

        state.num_pages = page_num + 1;

        Ok(page_id)
    }

    /// Returns a freed page to the allocator for reuse.
    pub fn free_page(&self, page_id: PageId) {
        if !page_id.is_valid() {
            return;
        }
        let mut state = self.state.lock();
        if page_id.0 < state.num_pages {
            state.free_pages.push(page_id.0);
        }
    }

    /// Returns the number of pages in the data file.
    pub fn num_pages(&self) -> u32 {
        self.state.lock().num_pages
    }

    /// Flushes all pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.state.lock().file.sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let _ = self.state.lock().file.sync_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_test_disk_manager() -> (DiskManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = DiskManagerConfig {
            data_dir: dir.path().to_path_buf(),
            fsync_enabled: false,
        };
        let dm = DiskManager::new(config).unwrap();
        (dm, dir)
    }

    #[test]
    fn test_disk_manager_new() {
        let (dm, _dir) = create_test_disk_manager();
        assert!(dm.data_dir().exists());
        assert_eq!(dm.num_pages(), 0);
    }

    #[test]
    fn test_disk_manager_allocate_page() {
        let (dm, _dir) = create_test_disk_manager();

        let page1 = dm.allocate_page().unwrap();
        assert_eq!(page1, PageId::new(0));

        let page2 = dm.allocate_page().unwrap();
        assert_eq!(page2, PageId::new(1));

        assert_eq!(dm.num_pages(), 2);
    }

    #[test]
    fn test_disk_manager_write_read() {
        let (dm, _dir) = create_test_disk_manager();

        let page_id = dm.allocate_page().unwrap();

        let mut data = [0u8; PAGE_SIZE];
        data[0] = 0xAB;
        data[100] = 0xCD;
        data[PAGE_SIZE - 1] = 0xEF;
        dm.write_page(page_id, &data).unwrap();

        let read_data = dm.read_page(page_id).unwrap();
        assert_eq!(read_data[0], 0xAB);
        assert_eq!(read_data[100], 0xCD);
        assert_eq!(read_data[PAGE_SIZE - 1], 0xEF);
    }

    #[test]
    fn test_disk_manager_read_nonexistent_page() {
        let (dm, _dir) = create_test_disk_manager();

        dm.allocate_page().unwrap();

        assert!(matches!(
            dm.read_page(PageId::new(99)),
            Err(LoamError::PageNotFound(_))
        ));
        assert!(matches!(
            dm.read_page(PageId::INVALID),
            Err(LoamError::PageNotFound(_))
        ));
    }

    #[test]
    fn test_disk_manager_overwrite_page() {
        let (dm, _dir) = create_test_disk_manager();

        let page_id = dm.allocate_page().unwrap();

        let mut data1 = [0u8; PAGE_SIZE];
        data1[0] = 0xAA;
        dm.write_page(page_id, &data1).unwrap();

        let mut data2 = [0u8; PAGE_SIZE];
        data2[0] = 0xBB;
        dm.write_page(page_id, &data2).unwrap();

        assert_eq!(dm.read_page(page_id).unwrap()[0], 0xBB);
    }

    #[test]
    fn test_disk_manager_free_page_reuse() {
        let (dm, _dir) = create_test_disk_manager();

        let a = dm.allocate_page().unwrap();
        let b = dm.allocate_page().unwrap();
        assert_ne!(a, b);

        dm.free_page(a);
        let c = dm.allocate_page().unwrap();
        assert_eq!(c, a);
        assert_eq!(dm.num_pages(), 2);
    }

    #[test]
    fn test_disk_manager_free_invalid_ignored() {
        let (dm, _dir) = create_test_disk_manager();

        dm.free_page(PageId::INVALID);
        dm.free_page(PageId::new(50));

        // Nothing reusable; the next allocation extends the file
        let page = dm.allocate_page().unwrap();
        assert_eq!(page, PageId::new(0));
    }

    #[test]
    fn test_disk_manager_persistence() {
        let dir = tempdir().unwrap();
        let page_id;

        {
            let config = DiskManagerConfig {
                data_dir: dir.path().to_path_buf(),
                fsync_enabled: true,
            };
            let dm = DiskManager::new(config).unwrap();
            page_id = dm.allocate_page().unwrap();

            let mut data = [0u8; PAGE_SIZE];
            data[0] = 0xFF;
            dm.write_page(page_id, &data).unwrap();
        }

        {
            let config = DiskManagerConfig {
                data_dir: dir.path().to_path_buf(),
                fsync_enabled: true,
            };
            let dm = DiskManager::new(config).unwrap();

            assert_eq!(dm.num_pages(), 1);
            assert_eq!(dm.read_page(page_id).unwrap()[0], 0xFF);
        }
    }

    #[test]
    fn test_disk_manager_flush() {
        let (dm, _dir) = create_test_disk_manager();

        dm.allocate_page().unwrap();
        dm.flush().unwrap();
    }
}
