#![allow(dead_code)]

use cometos_mac::core::{FrameType, HEADER_LENGTH, Header, PanId, SequenceNumber, ShortAddress};
use cometos_mac::frame::RxMeta;
use cometos_mac::mac::{Irq, Mac, MacListener, TxReport};
use cometos_mac::radio::{ChannelSample, Radio, RadioState, TxError};
use cometos_mac::time::Instant;
use rand_core::RngCore;

pub const OWN_ADDRESS: ShortAddress = ShortAddress::new(0x0001);
pub const PEER_ADDRESS: ShortAddress = ShortAddress::new(0x0002);
pub const PAN_ID: PanId = PanId::new(0x1234);

/// Transceiver stand-in that records every PSDU it is asked to send
pub struct MockRadio {
    pub state: RadioState,
    pub channel: ChannelSample,
    pub refuse: Option<TxError>,
    pub sent: Vec<Vec<u8>>,
}

impl Default for MockRadio {
    fn default() -> Self {
        Self {
            state: RadioState::Rx,
            channel: ChannelSample::IDLE,
            refuse: None,
            sent: Vec::new(),
        }
    }
}

impl MockRadio {
    pub fn sent_headers(&self) -> Vec<Header> {
        self.sent
            .iter()
            .map(|psdu| Header::decode(psdu).unwrap().0)
            .collect()
    }
}

impl Radio for MockRadio {
    fn state(&self) -> RadioState {
        self.state
    }

    fn set_state(&mut self, state: RadioState) {
        self.state = state;
    }

    fn sample_channel(&mut self) -> ChannelSample {
        self.channel
    }

    fn transmit(&mut self, psdu: &[u8]) -> Result<(), TxError> {
        if let Some(err) = self.refuse {
            return Err(err);
        }
        self.sent.push(psdu.to_vec());
        Ok(())
    }
}

#[derive(Default)]
pub struct Recorder {
    pub reports: Vec<TxReport>,
    pub delivered: Vec<(Header, Vec<u8>)>,
}

impl MacListener for Recorder {
    fn on_complete(&mut self, report: &TxReport) {
        self.reports.push(*report);
    }

    fn deliver_up(&mut self, header: &Header, payload: &[u8], _meta: &RxMeta) {
        self.delivered.push((*header, payload.to_vec()));
    }
}

pub fn rx_meta() -> RxMeta {
    RxMeta {
        timestamp: Instant::from_ticks(0),
        rssi: -60,
        lqi: 255,
        crc_ok: true,
    }
}

pub fn data_frame(
    sequence: u8,
    source: ShortAddress,
    destination: ShortAddress,
    ack_request: bool,
    payload: &[u8],
) -> Vec<u8> {
    let header = Header {
        sequence: SequenceNumber::new(sequence),
        source,
        destination,
        frame_type: FrameType::Data,
        ack_request,
        pan_id: PAN_ID,
    };
    let mut raw = [0; HEADER_LENGTH];
    header.encode(&mut raw);
    let mut psdu = raw.to_vec();
    psdu.extend_from_slice(payload);
    psdu
}

pub fn ack_frame(data: &Header) -> Vec<u8> {
    let mut raw = [0; HEADER_LENGTH];
    Header::ack_for(data).encode(&mut raw);
    raw.to_vec()
}

/// Runs the MAC from deadline to deadline until nothing is left to do.
///
/// Every transmission completes as soon as it starts. Returns the time of the last poll.
pub fn run_until_idle<L: MacListener, G: RngCore>(
    mac: &mut Mac<'_, MockRadio, L, G>,
    irq: &Irq<'_>,
    mut now: Instant,
) -> Instant {
    for _ in 0..10_000 {
        mac.poll(now);
        if mac.radio().state == RadioState::Tx {
            irq.transmit_done();
            continue;
        }
        match mac.next_deadline() {
            Some(deadline) => now = now.max(deadline),
            None => return now,
        }
    }
    panic!("MAC does not settle");
}

/// Runs the MAC until it starts a transmission. Returns the time of the last poll.
pub fn run_until_transmit<L: MacListener, G: RngCore>(
    mac: &mut Mac<'_, MockRadio, L, G>,
    mut now: Instant,
) -> Instant {
    for _ in 0..10_000 {
        mac.poll(now);
        if mac.radio().state == RadioState::Tx {
            return now;
        }
        now = now.max(mac.next_deadline().expect("nothing scheduled"));
    }
    panic!("MAC does not transmit");
}
