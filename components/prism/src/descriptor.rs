use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PrismError, Result};

/// Size of an on-disk descriptor: two little-endian u64 values.
pub const DESCRIPTOR_LEN: usize = 16;

/// Half-open corpus position range `[from, to)` of one shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubcDescriptor {
    pub from: u64,
    pub to: u64,
}

impl SubcDescriptor {
    pub fn new(from: u64, to: u64) -> Result<Self> {
        if from >= to {
            return Err(PrismError::Descriptor(format!("empty range [{}, {})", from, to)));
        }
        Ok(SubcDescriptor { from, to })
    }

    pub fn size(&self) -> u64 {
        self.to - self.from
    }

    pub fn contains(&self, pos: u64) -> bool {
        pos >= self.from && pos < self.to
    }

    pub fn to_bytes(&self) -> [u8; DESCRIPTOR_LEN] {
        let mut buf = [0u8; DESCRIPTOR_LEN];
        buf[..8].copy_from_slice(&self.from.to_le_bytes());
        buf[8..].copy_from_slice(&self.to.to_le_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != DESCRIPTOR_LEN {
            return Err(PrismError::Descriptor(format!(
                "expected {} bytes, got {}",
                DESCRIPTOR_LEN,
                bytes.len()
            )));
        }
        let mut from = [0u8; 8];
        let mut to = [0u8; 8];
        from.copy_from_slice(&bytes[..8]);
        to.copy_from_slice(&bytes[8..]);
        SubcDescriptor::new(u64::from_le_bytes(from), u64::from_le_bytes(to))
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| PrismError::io(path, "read descriptor", e))?;
        SubcDescriptor::from_bytes(&bytes)
            .map_err(|e| PrismError::Descriptor(format!("{} ({})", e, path.display())))
    }

    /// Writes the descriptor to a file that must not exist yet.
    pub fn write_new(&self, path: &Path) -> io::Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        file.write_all(&self.to_bytes())?;
        file.sync_all()
    }
}
