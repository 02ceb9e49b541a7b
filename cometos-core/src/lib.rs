//! CometOS MAC core data types
//!
//! This crate provides the protocol data types shared by the radio interface and the MAC stack:
//! short addresses, PAN identifiers, sequence numbers, frame types and the MAC header codec.
//! MAC users should depend on the `cometos-mac` crate and use its `core` reexport instead.
//!
//! References:
//! * \[1\] IEEE Std 802.15.4-2015, Low-Rate Wireless Networks
#![no_std]

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidValue;

/// The maximum PSDU size (in octets) the PHY shall be able to receive [1; 11.3]
#[doc(alias = "aMaxPHYPacketSize")]
pub const MAX_PHY_PACKET_SIZE: usize = 127;

/// Number of octets a MAC header occupies on air
pub const HEADER_LENGTH: usize = 8;

/// The maximum number of payload octets a single frame can carry
pub const MAX_PAYLOAD_LENGTH: usize = MAX_PHY_PACKET_SIZE - HEADER_LENGTH;

/// 16-bit short address of a node
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ShortAddress(u16);

impl ShortAddress {
    /// Frames sent to this address are accepted by every node of the PAN.
    pub const BROADCAST: ShortAddress = ShortAddress(0xffff);

    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    pub const fn into_u16(self) -> u16 {
        self.0
    }

    pub const fn is_broadcast(self) -> bool {
        self.0 == Self::BROADCAST.0
    }
}

impl From<u16> for ShortAddress {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<ShortAddress> for u16 {
    fn from(value: ShortAddress) -> Self {
        value.into_u16()
    }
}

/// Personal area network identifier
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PanId(u16);

impl PanId {
    pub const BROADCAST: PanId = PanId(0xffff);

    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    pub const fn into_u16(self) -> u16 {
        self.0
    }
}

impl From<u16> for PanId {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<PanId> for u16 {
    fn from(value: PanId) -> Self {
        value.into_u16()
    }
}

/// Data sequence number
///
/// Identifies a frame towards its acknowledgment. Wraps around after 255.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SequenceNumber(u8);

impl SequenceNumber {
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    pub const fn into_u8(self) -> u8 {
        self.0
    }

    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl From<u8> for SequenceNumber {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl From<SequenceNumber> for u8 {
    fn from(value: SequenceNumber) -> Self {
        value.into_u8()
    }
}

/// MAC frame type [1; 7.2.2.2]
///
/// The encoding matches the three frame type bits of the type octet.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FrameType {
    Beacon = 0,
    Data = 1,
    Ack = 2,
    Command = 3,
}

impl FrameType {
    const MASK: u8 = 0x07;

    pub const fn try_from_u8(code: u8) -> Option<FrameType> {
        match code {
            0 => Some(FrameType::Beacon),
            1 => Some(FrameType::Data),
            2 => Some(FrameType::Ack),
            3 => Some(FrameType::Command),
            _ => None,
        }
    }

    pub const fn into_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for FrameType {
    type Error = InvalidValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_from_u8(value).ok_or(InvalidValue)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// The buffer is shorter than a MAC header
    Truncated,
    /// The frame type bits hold a reserved value
    UnknownFrameType(u8),
}

/// MAC header
///
/// Fields are serialized in push order: sequence number, source, destination, type octet,
/// PAN identifier. Multi-octet fields are little endian. The type octet carries the frame type
/// in its low three bits and the acknowledgment request flag in bit 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Header {
    pub sequence: SequenceNumber,
    pub source: ShortAddress,
    pub destination: ShortAddress,
    pub frame_type: FrameType,
    pub ack_request: bool,
    pub pan_id: PanId,
}

impl Header {
    const ACK_REQUEST_BIT: u8 = 1 << 5;

    /// Creates the acknowledgment answering a frame with the given header.
    pub const fn ack_for(received: &Header) -> Header {
        Header {
            sequence: received.sequence,
            source: received.destination,
            destination: received.source,
            frame_type: FrameType::Ack,
            ack_request: false,
            pan_id: received.pan_id,
        }
    }

    /// Whether the sender expects an acknowledgment from the addressed node.
    ///
    /// Broadcast frames are never acknowledged.
    pub const fn expects_ack(&self) -> bool {
        self.ack_request && !self.destination.is_broadcast()
    }

    pub fn encode(&self, buf: &mut [u8; HEADER_LENGTH]) {
        let mut type_octet = self.frame_type.into_u8();
        if self.ack_request {
            type_octet |= Self::ACK_REQUEST_BIT;
        }

        buf[0] = self.sequence.into_u8();
        buf[1..3].copy_from_slice(&self.source.into_u16().to_le_bytes());
        buf[3..5].copy_from_slice(&self.destination.into_u16().to_le_bytes());
        buf[5] = type_octet;
        buf[6..8].copy_from_slice(&self.pan_id.into_u16().to_le_bytes());
    }

    /// Splits a PSDU into the header and the remaining payload.
    pub fn decode(psdu: &[u8]) -> Result<(Header, &[u8]), DecodeError> {
        if psdu.len() < HEADER_LENGTH {
            return Err(DecodeError::Truncated);
        }
        let (raw, payload) = psdu.split_at(HEADER_LENGTH);

        let type_octet = raw[5];
        let frame_type = FrameType::try_from_u8(type_octet & FrameType::MASK)
            .ok_or(DecodeError::UnknownFrameType(type_octet & FrameType::MASK))?;

        let header = Header {
            sequence: SequenceNumber(raw[0]),
            source: ShortAddress(u16::from_le_bytes([raw[1], raw[2]])),
            destination: ShortAddress(u16::from_le_bytes([raw[3], raw[4]])),
            frame_type,
            ack_request: type_octet & Self::ACK_REQUEST_BIT != 0,
            pan_id: PanId(u16::from_le_bytes([raw[6], raw[7]])),
        };
        Ok((header, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_header() -> Header {
        Header {
            sequence: SequenceNumber::new(0x42),
            source: ShortAddress::new(0x1234),
            destination: ShortAddress::new(0xabcd),
            frame_type: FrameType::Data,
            ack_request: true,
            pan_id: PanId::new(0x0777),
        }
    }

    #[test]
    fn test_header_field_order() {
        let mut buf = [0; HEADER_LENGTH];
        data_header().encode(&mut buf);
        assert_eq!(buf, [0x42, 0x34, 0x12, 0xcd, 0xab, 0b0010_0001, 0x77, 0x07]);
    }

    #[test]
    fn test_header_decode_with_payload() {
        let psdu = [0x42, 0x34, 0x12, 0xcd, 0xab, 0b0010_0001, 0x77, 0x07, 9, 8, 7];
        let (header, payload) = Header::decode(&psdu).unwrap();
        assert_eq!(header, data_header());
        assert_eq!(payload, [9, 8, 7]);
    }

    #[test]
    fn test_header_decode_errors() {
        assert_eq!(Header::decode(&[0; 7]), Err(DecodeError::Truncated));
        let psdu = [0, 0, 0, 0, 0, 0x05, 0, 0];
        assert_eq!(Header::decode(&psdu), Err(DecodeError::UnknownFrameType(5)));
    }

    #[test]
    fn test_ack_header() {
        let ack = Header::ack_for(&data_header());
        assert_eq!(ack.frame_type, FrameType::Ack);
        assert_eq!(ack.sequence, SequenceNumber::new(0x42));
        assert_eq!(ack.source, ShortAddress::new(0xabcd));
        assert_eq!(ack.destination, ShortAddress::new(0x1234));
        assert!(!ack.expects_ack());
    }

    #[test]
    fn test_broadcast_never_expects_ack() {
        let mut header = data_header();
        header.destination = ShortAddress::BROADCAST;
        assert!(!header.expects_ack());
    }

    #[test]
    fn test_sequence_number_wraps() {
        assert_eq!(SequenceNumber::new(255).next(), SequenceNumber::new(0));
    }
}
