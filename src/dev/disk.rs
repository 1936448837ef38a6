//! Offset-addressed cell stores (disks).
//!
//! A disk holds trytes as fixed 4-byte text records — three base-27
//! characters and a separator — so seeking to cell `n` is just byte
//! offset `4 * n`. Reads past the end of a device come back as zero
//! cells; writes extend the device as needed.

use crate::ternary::{ParseError, Tryte};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Byte width of one cell record on disk.
const RECORD: u64 = 4;

/// Device layer failures. These are fatal to the emulator: the machine
/// cannot establish a valid address space over a broken device.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no device mounted at index {0}")]
    NoSuchDevice(usize),

    #[error("device i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt cell record on device: {0}")]
    Corrupt(#[from] ParseError),
}

/// An offset-addressed store of cells.
pub trait Device {
    /// Read `count` cells starting at `offset`.
    fn read(&mut self, offset: usize, count: usize) -> Result<Vec<Tryte>, DeviceError>;

    /// Write cells starting at `offset`, extending the device if needed.
    fn write(&mut self, offset: usize, cells: &[Tryte]) -> Result<(), DeviceError>;

    /// Current length in cells.
    fn len(&mut self) -> Result<usize, DeviceError>;

    fn is_empty(&mut self) -> Result<bool, DeviceError> {
        Ok(self.len()? == 0)
    }
}

/// A disk backed by a record file on the host filesystem.
pub struct FileDisk {
    path: PathBuf,
    file: File,
}

impl FileDisk {
    /// Open (or create) a disk file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DeviceError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        Ok(Self { path, file })
    }

    /// The backing path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Device for FileDisk {
    fn read(&mut self, offset: usize, count: usize) -> Result<Vec<Tryte>, DeviceError> {
        let stored = self.len()?;
        let mut cells = Vec::with_capacity(count);

        let readable = count.min(stored.saturating_sub(offset));
        if readable > 0 {
            self.file.seek(SeekFrom::Start(offset as u64 * RECORD))?;
            let mut buf = vec![0u8; readable * RECORD as usize];
            self.file.read_exact(&mut buf)?;
            for record in buf.chunks(RECORD as usize) {
                let text = std::str::from_utf8(&record[..3])
                    .map_err(|_| ParseError::InvalidChar('\u{fffd}'))?;
                cells.push(text.parse::<Tryte>()?);
            }
        }
        // past the end of the device reads as zero cells
        cells.resize(count, Tryte::ZERO);
        Ok(cells)
    }

    fn write(&mut self, offset: usize, cells: &[Tryte]) -> Result<(), DeviceError> {
        // pad any gap between the current end and the write offset
        let stored = self.len()?;
        if offset > stored {
            self.file.seek(SeekFrom::Start(stored as u64 * RECORD))?;
            for _ in stored..offset {
                self.file.write_all(b"000 ")?;
            }
        }

        self.file.seek(SeekFrom::Start(offset as u64 * RECORD))?;
        for cell in cells {
            self.file.write_all(cell.base27_string().as_bytes())?;
            self.file.write_all(b" ")?;
        }
        self.file.flush()?;
        Ok(())
    }

    fn len(&mut self) -> Result<usize, DeviceError> {
        Ok((self.file.metadata()?.len() / RECORD) as usize)
    }
}

impl std::fmt::Debug for FileDisk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDisk").field("path", &self.path).finish()
    }
}

/// An in-memory disk, used by tests and programmatic boot images.
#[derive(Debug, Clone, Default)]
pub struct MemDisk {
    cells: Vec<Tryte>,
}

impl MemDisk {
    pub fn new() -> Self {
        Self::default()
    }

    /// A disk pre-loaded with an image.
    pub fn from_cells(cells: Vec<Tryte>) -> Self {
        Self { cells }
    }

    /// The stored image.
    pub fn cells(&self) -> &[Tryte] {
        &self.cells
    }
}

impl Device for MemDisk {
    fn read(&mut self, offset: usize, count: usize) -> Result<Vec<Tryte>, DeviceError> {
        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            out.push(self.cells.get(offset + i).copied().unwrap_or(Tryte::ZERO));
        }
        Ok(out)
    }

    fn write(&mut self, offset: usize, cells: &[Tryte]) -> Result<(), DeviceError> {
        if self.cells.len() < offset + cells.len() {
            self.cells.resize(offset + cells.len(), Tryte::ZERO);
        }
        self.cells[offset..offset + cells.len()].copy_from_slice(cells);
        Ok(())
    }

    fn len(&mut self) -> Result<usize, DeviceError> {
        Ok(self.cells.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memdisk_round_trip() {
        let mut disk = MemDisk::new();
        let cells = vec![Tryte::from_int(1), Tryte::from_int(-500), Tryte::from_int(9841)];
        disk.write(2, &cells).unwrap();
        assert_eq!(disk.len().unwrap(), 5);
        assert_eq!(disk.read(2, 3).unwrap(), cells);
        // the gap reads as zeroes, as does the far end
        assert_eq!(disk.read(0, 1).unwrap(), vec![Tryte::ZERO]);
        assert_eq!(disk.read(100, 2).unwrap(), vec![Tryte::ZERO; 2]);
    }

    #[test]
    fn filedisk_round_trip() {
        let path = std::env::temp_dir().join("tritium-filedisk-test.trd");
        let _ = std::fs::remove_file(&path);

        let mut disk = FileDisk::open(&path).unwrap();
        let cells = vec![Tryte::from_int(1000), Tryte::from_int(-1)];
        disk.write(1, &cells).unwrap();
        assert_eq!(disk.len().unwrap(), 3);
        assert_eq!(disk.read(1, 2).unwrap(), cells);
        assert_eq!(disk.read(0, 1).unwrap(), vec![Tryte::ZERO]);

        // records are plain text: "000 aja 00A "
        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw, "000 aja 00A ");

        let _ = std::fs::remove_file(&path);
    }
}
