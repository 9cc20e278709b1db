//! In-memory file table backed by a TAR-formatted block device.
//!
//! At boot the whole disk is read into a page-aligned image buffer and
//! parsed into a fixed table of [`FILES_MAX`] slots. Every mutation writes
//! the whole image back out, synchronously — the dataset is tiny and the
//! simplicity is worth more than the bandwidth. Files are never deleted.

pub mod tar;

use spin::Mutex;

use crate::drivers::virtio_blk::{self, SECTOR_SIZE};
use crate::error::KernelError;
use crate::mm::align_up;

/// Number of file slots.
pub const FILES_MAX: usize = 8;

/// Maximum file name length, NUL included (the TAR name field width).
pub const FILE_NAME_MAX: usize = 100;

/// Per-file data capacity.
pub const FILE_DATA_MAX: usize = 1024;

/// Size of the whole-disk image buffer: every slot at full capacity, with
/// its header, rounded to a sector.
pub const DISK_IMAGE_MAX: usize = align_up(FILES_MAX * (SECTOR_SIZE + FILE_DATA_MAX), SECTOR_SIZE);

/// One file slot.
pub struct File {
    in_use: bool,
    name: [u8; FILE_NAME_MAX],
    data: [u8; FILE_DATA_MAX],
    size: usize,
}

impl File {
    const EMPTY: File = File {
        in_use: false,
        name: [0; FILE_NAME_MAX],
        data: [0; FILE_DATA_MAX],
        size: 0,
    };

    pub fn name(&self) -> &[u8] {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(FILE_NAME_MAX);
        &self.name[..end]
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Replace the file contents. `bytes` must fit the slot capacity.
    pub fn set_content(&mut self, bytes: &[u8]) {
        debug_assert!(bytes.len() <= FILE_DATA_MAX);
        self.data[..bytes.len()].copy_from_slice(bytes);
        self.size = bytes.len();
    }
}

/// Fixed-capacity table of files.
pub struct FileTable {
    files: [File; FILES_MAX],
}

impl FileTable {
    pub const fn new() -> Self {
        Self {
            files: [File::EMPTY; FILES_MAX],
        }
    }

    /// Linear-scan lookup by exact name.
    pub fn lookup(&self, name: &[u8]) -> Option<&File> {
        self.files
            .iter()
            .find(|f| f.in_use && f.name() == name)
    }

    pub fn lookup_mut(&mut self, name: &[u8]) -> Option<&mut File> {
        self.files
            .iter_mut()
            .find(|f| f.in_use && f.name() == name)
    }

    pub fn iter_used(&self) -> impl Iterator<Item = &File> {
        self.files.iter().filter(|f| f.in_use)
    }

    /// Rebuild the table from a TAR image. Walks headers until an empty
    /// name; regular files land in slots in archive order. Returns the
    /// number of files loaded.
    pub fn load_image(&mut self, image: &[u8]) -> Result<usize, KernelError> {
        self.files = [File::EMPTY; FILES_MAX];

        let mut offset = 0;
        let mut count = 0;
        while offset + tar::BLOCK_SIZE <= image.len() {
            let header = &image[offset..offset + tar::BLOCK_SIZE];
            let name = tar::name(header);
            if name.is_empty() {
                break;
            }
            if !tar::magic_ok(header) {
                return Err(KernelError::BadArchiveMagic { offset });
            }

            let size = tar::size(header);
            if size > FILE_DATA_MAX {
                return Err(KernelError::FileTooLarge {
                    size,
                    max: FILE_DATA_MAX,
                });
            }

            let data_start = offset + tar::BLOCK_SIZE;
            if tar::is_regular(tar::typeflag(header)) && data_start + size <= image.len() {
                if count == FILES_MAX {
                    log::warn!("fs: file table full, ignoring remaining archive entries");
                    break;
                }
                let file = &mut self.files[count];
                file.in_use = true;
                file.name[..name.len()].copy_from_slice(name);
                file.data[..size].copy_from_slice(&image[data_start..data_start + size]);
                file.size = size;
                count += 1;
            }

            offset += align_up(tar::BLOCK_SIZE + size, tar::BLOCK_SIZE);
        }

        Ok(count)
    }

    /// Serialize every in-use slot back into a TAR image. The buffer is
    /// zeroed first, so the trailing blocks double as the archive
    /// terminator.
    pub fn write_image(&self, image: &mut [u8]) {
        image.fill(0);

        let mut offset = 0;
        for file in self.iter_used() {
            tar::write_header(&mut image[offset..offset + tar::BLOCK_SIZE], file.name(), file.size);
            let data_start = offset + tar::BLOCK_SIZE;
            image[data_start..data_start + file.size].copy_from_slice(&file.data[..file.size]);
            offset += align_up(tar::BLOCK_SIZE + file.size, tar::BLOCK_SIZE);
        }
    }
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Whole-disk image buffer. Page-aligned like the rest of the DMA-adjacent
/// buffers, although transfers go through the driver's request staging.
#[repr(C, align(4096))]
struct DiskImage([u8; DISK_IMAGE_MAX]);

/// The file table plus its disk image, as one lockable unit.
pub struct FileSystem {
    table: FileTable,
    disk: DiskImage,
}

pub static FILE_SYSTEM: Mutex<FileSystem> = Mutex::new(FileSystem::new());

impl FileSystem {
    pub const fn new() -> Self {
        Self {
            table: FileTable::new(),
            disk: DiskImage([0; DISK_IMAGE_MAX]),
        }
    }

    pub fn lookup(&self, name: &[u8]) -> Option<&File> {
        self.table.lookup(name)
    }

    pub fn lookup_mut(&mut self, name: &[u8]) -> Option<&mut File> {
        self.table.lookup_mut(name)
    }
}

impl Default for FileSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Read the disk image and populate the file table. Panics on a corrupt
/// archive; the kernel cannot run without its boot filesystem.
pub fn init() {
    let mut fs = FILE_SYSTEM.lock();
    let FileSystem { table, disk } = &mut *fs;

    for (sector, chunk) in disk.0.chunks_exact_mut(SECTOR_SIZE).enumerate() {
        virtio_blk::read_sector(sector as u32, chunk.try_into().expect("exact sector chunk"));
    }

    let count = table
        .load_image(&disk.0)
        .unwrap_or_else(|e| panic!("{}", e));

    for file in table.iter_used() {
        log::info!(
            "file: {}, size={}",
            core::str::from_utf8(file.name()).unwrap_or("<non-utf8>"),
            file.size()
        );
    }
    log::info!("fs: loaded {} files from disk", count);
}

/// Serialize the file table and write the whole image back to disk.
pub fn flush() {
    let mut fs = FILE_SYSTEM.lock();
    let FileSystem { table, disk } = &mut *fs;

    table.write_image(&mut disk.0);
    for (sector, chunk) in disk.0.chunks_exact(SECTOR_SIZE).enumerate() {
        virtio_blk::write_sector(sector as u32, chunk.try_into().expect("exact sector chunk"));
    }

    log::info!("fs: wrote {} bytes to disk", disk.0.len());
}

#[cfg(test)]
mod tests {
    use std::vec;
    use std::vec::Vec;

    use super::*;

    /// Build a TAR image holding the given (name, data) entries.
    fn build_archive(entries: &[(&[u8], &[u8])]) -> Vec<u8> {
        let mut image = vec![0u8; DISK_IMAGE_MAX];
        let mut offset = 0;
        for &(name, data) in entries {
            tar::write_header(&mut image[offset..offset + tar::BLOCK_SIZE], name, data.len());
            image[offset + tar::BLOCK_SIZE..offset + tar::BLOCK_SIZE + data.len()]
                .copy_from_slice(data);
            offset += align_up(tar::BLOCK_SIZE + data.len(), tar::BLOCK_SIZE);
        }
        image
    }

    #[test]
    fn test_load_image_populates_slots_in_archive_order() {
        let image = build_archive(&[(b"hello.txt", b"world"), (b"meow.txt", b"purr purr")]);

        let mut table = FileTable::new();
        assert_eq!(table.load_image(&image).unwrap(), 2);

        let hello = table.lookup(b"hello.txt").unwrap();
        assert_eq!(hello.size(), 5);
        assert_eq!(&hello.data()[..5], b"world");

        let meow = table.lookup(b"meow.txt").unwrap();
        assert_eq!(meow.size(), 9);
    }

    #[test]
    fn test_load_empty_archive() {
        let image = vec![0u8; DISK_IMAGE_MAX];
        let mut table = FileTable::new();
        assert_eq!(table.load_image(&image).unwrap(), 0);
        assert!(table.lookup(b"anything").is_none());
    }

    #[test]
    fn test_load_rejects_bad_magic() {
        let mut image = build_archive(&[(b"a.txt", b"abc")]);
        image[257..263].copy_from_slice(b"bogus\0");

        let mut table = FileTable::new();
        assert!(matches!(
            table.load_image(&image),
            Err(KernelError::BadArchiveMagic { offset: 0 })
        ));
    }

    #[test]
    fn test_load_rejects_oversized_file() {
        let mut image = build_archive(&[(b"big.bin", b"x")]);
        // Rewrite the size field to something beyond the slot capacity.
        let mut block = [0u8; tar::BLOCK_SIZE];
        block.copy_from_slice(&image[..tar::BLOCK_SIZE]);
        tar::write_header(&mut block, b"big.bin", FILE_DATA_MAX + 1);
        image[..tar::BLOCK_SIZE].copy_from_slice(&block);

        let mut table = FileTable::new();
        assert!(matches!(
            table.load_image(&image),
            Err(KernelError::FileTooLarge { .. })
        ));
    }

    #[test]
    fn test_non_regular_entries_are_skipped() {
        let mut image = build_archive(&[(b"dir", b""), (b"file.txt", b"data")]);
        // Mark the first entry as a directory.
        image[156] = b'5';

        let mut table = FileTable::new();
        assert_eq!(table.load_image(&image).unwrap(), 1);
        assert!(table.lookup(b"dir").is_none());
        assert!(table.lookup(b"file.txt").is_some());
    }

    #[test]
    fn test_flush_then_reload_round_trips() {
        let image = build_archive(&[(b"hello.txt", b"world"), (b"log.txt", b"")]);

        let mut table = FileTable::new();
        table.load_image(&image).unwrap();

        // Mutate one file the way SYS_WRITEFILE does.
        table.lookup_mut(b"hello.txt").unwrap().set_content(b"rewritten");

        let mut flushed = vec![0u8; DISK_IMAGE_MAX];
        table.write_image(&mut flushed);

        let mut reloaded = FileTable::new();
        reloaded.load_image(&flushed).unwrap();

        for (a, b) in table.iter_used().zip(reloaded.iter_used()) {
            assert_eq!(a.name(), b.name());
            assert_eq!(a.size(), b.size());
            assert_eq!(&a.data()[..a.size()], &b.data()[..b.size()]);
        }
        assert_eq!(table.iter_used().count(), reloaded.iter_used().count());
        assert_eq!(reloaded.lookup(b"hello.txt").unwrap().size(), 9);
    }

    #[test]
    fn test_write_image_is_parseable_tar() {
        let image = build_archive(&[(b"a.txt", b"payload here")]);
        let mut table = FileTable::new();
        table.load_image(&image).unwrap();

        let mut out = vec![0u8; DISK_IMAGE_MAX];
        table.write_image(&mut out);

        let header = &out[..tar::BLOCK_SIZE];
        assert!(tar::magic_ok(header));
        assert_eq!(tar::name(header), b"a.txt");
        assert_eq!(tar::size(header), 12);
        // Stored checksum must match a fresh computation.
        assert_eq!(
            tar::checksum(header),
            {
                let mut sum = 0u32;
                for (i, &b) in header.iter().enumerate() {
                    sum += if (148..156).contains(&i) { b' ' as u32 } else { b as u32 };
                }
                sum
            }
        );
    }
}
