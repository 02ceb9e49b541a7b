mod common;

use common::{MockRadio, OWN_ADDRESS, PAN_ID, PEER_ADDRESS, Recorder, data_frame, rx_meta};
use cometos_mac::config::MacConfig;
use cometos_mac::core::{FrameType, Header};
use cometos_mac::csma::TxResult;
use cometos_mac::frame::RxMeta;
use cometos_mac::mac::{Mac, MacListener, MacResources, TxReport};
use cometos_mac::radio::{ChannelSample, Radio, RadioState, TxError};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, MockDriver};
use futures_executor::LocalPool;
use futures_task::LocalSpawn;
use rand_core::SeedableRng;
use rand_wyrand::WyRand;
use std::boxed::Box;
use std::cell::RefCell;
use std::rc::Rc;

struct SharedRadio(Rc<RefCell<MockRadio>>);

impl Radio for SharedRadio {
    fn state(&self) -> RadioState {
        self.0.borrow().state()
    }

    fn set_state(&mut self, state: RadioState) {
        self.0.borrow_mut().set_state(state)
    }

    fn sample_channel(&mut self) -> ChannelSample {
        self.0.borrow_mut().sample_channel()
    }

    fn transmit(&mut self, psdu: &[u8]) -> Result<(), TxError> {
        self.0.borrow_mut().transmit(psdu)
    }
}

struct SharedRecorder(Rc<RefCell<Recorder>>);

impl MacListener for SharedRecorder {
    fn on_complete(&mut self, report: &TxReport) {
        self.0.borrow_mut().on_complete(report)
    }

    fn deliver_up(&mut self, header: &Header, payload: &[u8], meta: &RxMeta) {
        self.0.borrow_mut().deliver_up(header, payload, meta)
    }
}

type TestMac = Mac<'static, SharedRadio, SharedRecorder, WyRand>;

#[test]
fn test_run() {
    let mut executor = LocalPool::new();
    let spawner = executor.spawner();

    let time = MockDriver::get();

    let (submitter, irq, engine) = {
        let config = MacConfig {
            address: OWN_ADDRESS,
            pan_id: PAN_ID,
            ..Default::default()
        };
        let resources = MacResources::<CriticalSectionRawMutex, 8, 4, 6>::new(config).unwrap();
        let resources = Box::leak(Box::new(resources));
        resources.split()
    };

    let radio = Rc::new(RefCell::new(MockRadio::default()));
    let recorder = Rc::new(RefCell::new(Recorder::default()));
    let mac = Mac::new(
        engine,
        SharedRadio(radio.clone()),
        SharedRecorder(recorder.clone()),
        WyRand::seed_from_u64(1),
    );

    spawner
        .spawn_local_obj(Box::new(mac_runner(mac)).into())
        .unwrap();
    executor.run_until_stalled();

    let ticket = submitter.submit(PEER_ADDRESS, b"hello", false).unwrap();
    executor.run_until_stalled();
    assert!(radio.borrow().sent.is_empty());

    // Longer than the largest initial backoff plus CCA
    time.advance(Duration::from_millis(5));
    executor.run_until_stalled();
    assert_eq!(radio.borrow().sent.len(), 1);
    assert_eq!(radio.borrow().state, RadioState::Tx);
    assert!(recorder.borrow().reports.is_empty());

    irq.transmit_done();
    executor.run_until_stalled();
    let report = recorder.borrow().reports[0];
    assert_eq!(report.ticket, ticket);
    assert_eq!(report.result, TxResult::Success);
    assert!(report.completed_at > report.queued_at);
    assert_eq!(radio.borrow().state, RadioState::Rx);

    let frame = data_frame(3, PEER_ADDRESS, OWN_ADDRESS, true, b"ping");
    irq.frame_received(&frame, rx_meta()).unwrap();
    executor.run_until_stalled();
    let ack = radio.borrow().sent_headers()[1];
    assert_eq!(ack.frame_type, FrameType::Ack);
    assert_eq!(recorder.borrow().delivered.len(), 1);

    irq.transmit_done();
    executor.run_until_stalled();
    time.advance(Duration::from_millis(1));
    executor.run_until_stalled();
    assert_eq!(radio.borrow().state, RadioState::Rx);
    assert_eq!(radio.borrow().sent.len(), 2);
    assert_eq!(recorder.borrow().reports.len(), 1);
}

async fn mac_runner(mut mac: TestMac) {
    mac.run().await
}
