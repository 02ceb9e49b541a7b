use crate::core::{PanId, ShortAddress};
use crate::radio::CcaMode;
use crate::time::Duration;

/// Symbol period of the 2.4 GHz O-QPSK PHY
const SYMBOL: Duration = Duration::from_micros(16);

/// The number of symbols forming the basic time period used by the CSMA-CA algorithm
#[doc(alias = "aUnitBackoffPeriod")]
pub const UNIT_BACKOFF_PERIOD: Duration = Duration::from_micros(20 * 16);

/// Length of the CCA detection window
pub const CCA_DETECTION_TIME: Duration = Duration::from_micros(8 * 16);

#[doc(alias = "macSifsPeriod")]
pub const SIFS_DURATION: Duration = Duration::from_micros(12 * 16);

/// aUnitBackoffPeriod + aTurnaroundTime + phySHRDuration + 6 * phySymbolsPerOctet
#[doc(alias = "macAckWaitDuration")]
pub const ACK_WAIT_DURATION: Duration = Duration::from_micros(54 * 16);

/// MAC layer configuration
///
/// Defaults follow IEEE 802.15.4 for the 2.4 GHz band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MacConfig {
    /// Short address of this node. Must not be the broadcast address.
    pub address: ShortAddress,
    pub pan_id: PanId,
    /// Initial backoff exponent, `0..=max_be`
    #[doc(alias = "macMinBE")]
    pub min_be: u8,
    /// Upper bound of the backoff exponent, `3..=8`
    #[doc(alias = "macMaxBE")]
    pub max_be: u8,
    /// Busy CCAs tolerated before channel access fails, `0..=5`
    #[doc(alias = "macMaxCSMABackoffs")]
    pub max_csma_backoffs: u8,
    /// Retransmissions after a missing acknowledgment, `0..=7`
    #[doc(alias = "macMaxFrameRetries")]
    pub max_frame_retries: u8,
    /// Must be non-zero
    pub unit_backoff_period: Duration,
    pub cca_mode: CcaMode,
    pub cca_detection_time: Duration,
    /// Time to wait for an acknowledgment after a transmission. Must be non-zero.
    pub ack_wait_duration: Duration,
    pub sifs_duration: Duration,
    /// Keep the backoff exponent at `min_be` for retransmissions instead of raising it on
    /// every retry.
    pub reset_backoff_exponent_on_retry: bool,
}

impl Default for MacConfig {
    fn default() -> Self {
        Self {
            address: ShortAddress::new(0x0000),
            pan_id: PanId::new(0x0000),
            min_be: 3,
            max_be: 5,
            max_csma_backoffs: 4,
            max_frame_retries: 3,
            unit_backoff_period: UNIT_BACKOFF_PERIOD,
            cca_mode: CcaMode::default(),
            cca_detection_time: CCA_DETECTION_TIME,
            ack_wait_duration: ACK_WAIT_DURATION,
            sifs_duration: SIFS_DURATION,
            reset_backoff_exponent_on_retry: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    BroadcastAddress,
    BackoffExponent,
    CsmaBackoffs,
    FrameRetries,
    ZeroDuration,
}

impl MacConfig {
    pub const MAX_BE_RANGE: core::ops::RangeInclusive<u8> = 3..=8;
    pub const MAX_CSMA_BACKOFFS: u8 = 5;
    pub const MAX_FRAME_RETRIES: u8 = 7;

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.is_broadcast() {
            return Err(ConfigError::BroadcastAddress);
        }
        if !Self::MAX_BE_RANGE.contains(&self.max_be) || self.min_be > self.max_be {
            return Err(ConfigError::BackoffExponent);
        }
        if self.max_csma_backoffs > Self::MAX_CSMA_BACKOFFS {
            return Err(ConfigError::CsmaBackoffs);
        }
        if self.max_frame_retries > Self::MAX_FRAME_RETRIES {
            return Err(ConfigError::FrameRetries);
        }
        if self.unit_backoff_period == Duration::from_ticks(0)
            || self.ack_wait_duration == Duration::from_ticks(0)
        {
            return Err(ConfigError::ZeroDuration);
        }
        Ok(())
    }

    /// Length of `symbols` PHY symbols
    pub const fn symbols(symbols: u32) -> Duration {
        Duration::from_ticks(SYMBOL.as_ticks() * symbols as u64)
    }
}
