use crate::errors::ChannelError;
use crate::layout::CONTROL_SIZE;
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

/// Read-write mapping of the shared ring region.
///
/// The file handle is kept so liveness can be checked with `fstat`: once the
/// owner unlinks the region, the link count drops to zero while existing
/// mappings stay valid.
#[derive(Debug)]
pub struct SharedRegion {
    file: File,
    mmap: MmapMut,
    path: PathBuf,
}

impl SharedRegion {
    /// Create the region file (or reuse a stale one) and size it to exactly
    /// `size` bytes.
    pub fn create(path: impl AsRef<Path>, size: usize) -> Result<Self, ChannelError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o600)
            .open(path)?;

        file.set_len(size as u64)?;

        let mmap = unsafe { MmapOptions::new().map_mut(&file)? };

        Ok(Self {
            file,
            mmap,
            path: path.to_path_buf(),
        })
    }

    /// Map an existing region as-is.
    ///
    /// The region only has to hold the control block; slots that extend past
    /// its end are read as short.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ChannelError> {
        let path = path.as_ref();
        let file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ChannelError::NotFound {
                    name: path.display().to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let actual = file.metadata()?.len() as usize;
        if actual < CONTROL_SIZE {
            return Err(ChannelError::RegionTooSmall {
                expected: CONTROL_SIZE,
                actual,
            });
        }

        let mmap = unsafe { MmapOptions::new().map_mut(&file)? };

        Ok(Self {
            file,
            mmap,
            path: path.to_path_buf(),
        })
    }

    /// Whether the region file is still linked into the filesystem.
    pub fn is_alive(&self) -> Result<bool, ChannelError> {
        Ok(self.file.metadata()?.nlink() > 0)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.mmap
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the region file; a missing file is not an error.
    pub fn unlink(path: impl AsRef<Path>) -> Result<(), ChannelError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
