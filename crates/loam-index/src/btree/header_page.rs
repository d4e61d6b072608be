//! Index directory stored on page 0.
//!
//! Layout: `count: u16`, then `count` records of
//! `name_len: u16 | name bytes | root_page_id: u32`. One record per index
//! name, mapping it to the current root page. Writes happen under the
//! owning tree's root latch.

use loam_common::page::{PageId, PAGE_SIZE};
use loam_common::{LoamError, Result};

const COUNT_OFFSET: usize = 0;
const RECORDS_START: usize = 2;

/// Longest allowed index name.
pub const MAX_NAME_LEN: usize = 64;

/// Initializes an empty directory page.
pub fn init(data: &mut [u8]) {
    data[COUNT_OFFSET..COUNT_OFFSET + 2].copy_from_slice(&0u16.to_le_bytes());
}

#[inline]
fn count(data: &[u8]) -> usize {
    u16::from_le_bytes([data[COUNT_OFFSET], data[COUNT_OFFSET + 1]]) as usize
}

#[inline]
fn set_count(data: &mut [u8], count: usize) {
    data[COUNT_OFFSET..COUNT_OFFSET + 2].copy_from_slice(&(count as u16).to_le_bytes());
}

/// Walks the records, returning (record_offset, root_field_offset) for
/// `name`, or the offset past the last record when absent.
fn locate(data: &[u8], name: &[u8]) -> std::result::Result<(usize, usize), usize> {
    let mut offset = RECORDS_START;
    for _ in 0..count(data) {
        let name_len = u16::from_le_bytes([data[offset], data[offset + 1]]) as usize;
        let stored = &data[offset + 2..offset + 2 + name_len];
        if stored == name {
            return Ok((offset, offset + 2 + name_len));
        }
        offset += 2 + name_len + 4;
    }
    Err(offset)
}

/// Returns the root page recorded for `name`, if any.
pub fn get_record(data: &[u8], name: &str) -> Option<PageId> {
    match locate(data, name.as_bytes()) {
        Ok((_, root_offset)) => Some(PageId::from_bytes([
            data[root_offset],
            data[root_offset + 1],
            data[root_offset + 2],
            data[root_offset + 3],
        ])),
        Err(_) => None,
    }
}

/// Records `name -> root`, replacing the stored root if the name exists.
pub fn insert_record(data: &mut [u8], name: &str, root: PageId) -> Result<()> {
    if name.len() > MAX_NAME_LEN {
        return Err(LoamError::InvalidConfig(format!(
            "index name longer than {} bytes",
            MAX_NAME_LEN
        )));
    }
    match locate(data, name.as_bytes()) {
        Ok((_, root_offset)) => {
            data[root_offset..root_offset + 4].copy_from_slice(&root.to_bytes());
            Ok(())
        }
        Err(end_offset) => {
            let record_len = 2 + name.len() + 4;
            if end_offset + record_len > PAGE_SIZE {
                return Err(LoamError::HeaderFull);
            }
            let mut offset = end_offset;
            data[offset..offset + 2].copy_from_slice(&(name.len() as u16).to_le_bytes());
            offset += 2;
            data[offset..offset + name.len()].copy_from_slice(name.as_bytes());
            offset += name.len();
            data[offset..offset + 4].copy_from_slice(&root.to_bytes());
            let new_count = count(data) + 1;
            set_count(data, new_count);
            Ok(())
        }
    }
}

/// Updates the root recorded for an existing `name`.
pub fn update_record(data: &mut [u8], name: &str, root: PageId) -> Result<()> {
    match locate(data, name.as_bytes()) {
        Ok((_, root_offset)) => {
            data[root_offset..root_offset + 4].copy_from_slice(&root.to_bytes());
            Ok(())
        }
        Err(_) => Err(LoamError::TreeCorrupted(format!(
            "no directory record for index '{}'",
            name
        ))),
    }
}
