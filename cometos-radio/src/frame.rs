//! Physical layer frame objects

use cometos_core::MAX_PHY_PACKET_SIZE;

use crate::time::Instant;

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidLength;

/// PHY service data unit
///
/// A byte vector bounded by the maximum PHY packet size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Psdu {
    length: u8,
    bytes: [u8; MAX_PHY_PACKET_SIZE],
}

impl Psdu {
    pub const MAX: usize = MAX_PHY_PACKET_SIZE;

    pub const fn new_empty() -> Self {
        Self {
            length: 0,
            bytes: [0; MAX_PHY_PACKET_SIZE],
        }
    }

    /// Creates a new PSDU from a slice of compatible length.
    pub fn new(data: &[u8]) -> Result<Self, InvalidLength> {
        let mut psdu = Self::new_empty();
        psdu.extend_from_slice(data)?;
        Ok(psdu)
    }

    pub fn len(&self) -> usize {
        usize::from(self.length)
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Appends the slice, leaving the PSDU unchanged if it would not fit.
    pub fn extend_from_slice(&mut self, data: &[u8]) -> Result<(), InvalidLength> {
        let start = self.len();
        let end = start + data.len();
        if end > Self::MAX {
            return Err(InvalidLength);
        }
        self.bytes[start..end].copy_from_slice(data);
        // Bounded by MAX_PHY_PACKET_SIZE above
        self.length = end as u8;
        Ok(())
    }

    /// Drops the content and zeroes the storage.
    pub fn clear(&mut self) {
        self.bytes = [0; MAX_PHY_PACKET_SIZE];
        self.length = 0;
    }
}

impl Default for Psdu {
    fn default() -> Self {
        Self::new_empty()
    }
}

impl core::ops::Deref for Psdu {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.bytes[..self.len()]
    }
}

impl core::ops::DerefMut for Psdu {
    fn deref_mut(&mut self) -> &mut Self::Target {
        let length = self.len();
        &mut self.bytes[..length]
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Psdu {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Psdu({=[u8]:x})", &self.bytes[..self.len()])
    }
}

/// Reception metadata reported by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxMeta {
    /// Instant the start of frame delimiter was detected
    pub timestamp: Instant,
    /// Received signal strength in dBm
    pub rssi: i8,
    /// Link quality indicator
    pub lqi: u8,
    /// Whether the frame check sequence matched
    pub crc_ok: bool,
}
