//! Transceiver control interface used by the MAC

/// Transceiver operating state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioState {
    /// Listening. The only state in which a transmission attempt may start.
    Rx,
    /// Transmitting a frame
    Tx,
    /// Turning around between Rx and Tx
    Switching,
}

/// One clear channel assessment sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelSample {
    /// Energy above the ED threshold was detected
    pub energy: bool,
    /// A signal with IEEE 802.15.4 modulation was detected
    pub carrier: bool,
}

impl ChannelSample {
    pub const IDLE: ChannelSample = ChannelSample {
        energy: false,
        carrier: false,
    };

    pub const BUSY: ChannelSample = ChannelSample {
        energy: true,
        carrier: true,
    };
}

/// Clear channel assessment mode (IEEE 802.15.4, 10.2.8)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CcaMode {
    /// Busy on energy above threshold or carrier sense
    #[default]
    EnergyOrCarrier,
    /// Busy on energy above threshold (mode 1)
    EnergyOnly,
    /// Busy on carrier sense (mode 2)
    CarrierOnly,
    /// Busy on carrier sense with energy above threshold (mode 3)
    EnergyAndCarrier,
}

impl CcaMode {
    pub const fn is_busy(self, sample: ChannelSample) -> bool {
        match self {
            CcaMode::EnergyOrCarrier => sample.energy || sample.carrier,
            CcaMode::EnergyOnly => sample.energy,
            CcaMode::CarrierOnly => sample.carrier,
            CcaMode::EnergyAndCarrier => sample.energy && sample.carrier,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxError {
    /// The transceiver is not in a state that permits transmission
    NotReady,
    /// The PSDU cannot be sent, e.g. it exceeds the transceiver FIFO
    InvalidFrame,
}

/// Transceiver driver
///
/// All methods are called from the cooperative MAC task and must return quickly.
pub trait Radio {
    fn state(&self) -> RadioState;

    /// Requests a state change. The transceiver may pass through `Switching`.
    fn set_state(&mut self, state: RadioState);

    /// Samples the channel once. The caller decides about busy/idle using the CCA mode.
    fn sample_channel(&mut self) -> ChannelSample;

    /// Starts transmission of the PSDU.
    ///
    /// On success the driver reports completion from its interrupt handler later.
    fn transmit(&mut self, psdu: &[u8]) -> Result<(), TxError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: [ChannelSample; 4] = [
        ChannelSample::IDLE,
        ChannelSample {
            energy: true,
            carrier: false,
        },
        ChannelSample {
            energy: false,
            carrier: true,
        },
        ChannelSample::BUSY,
    ];

    fn busy_pattern(mode: CcaMode) -> [bool; 4] {
        SAMPLES.map(|sample| mode.is_busy(sample))
    }

    #[test]
    fn test_cca_modes() {
        assert_eq!(
            busy_pattern(CcaMode::EnergyOrCarrier),
            [false, true, true, true]
        );
        assert_eq!(busy_pattern(CcaMode::EnergyOnly), [false, true, false, true]);
        assert_eq!(busy_pattern(CcaMode::CarrierOnly), [false, false, true, true]);
        assert_eq!(
            busy_pattern(CcaMode::EnergyAndCarrier),
            [false, false, false, true]
        );
    }
}
