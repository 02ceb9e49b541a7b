use core::future::{pending, poll_fn};
use embassy_futures::select::{Either3, select3};
use embassy_time::Timer;
use heapless::Vec;
use rand_core::RngCore;

use super::resources::{Engine, MacEvent, Pending};
use super::{DUPLICATE_TABLE_SIZE, GTS_BITMAP_WORDS, MacListener, MacStats, TxReport, TxTicket};
use crate::config::MacConfig;
use crate::core::{FrameType, HEADER_LENGTH, Header, PanId, SequenceNumber, ShortAddress};
use crate::csma::{CsmaFsm, FsmState, Port, Signal, TxCounters, TxResult};
use crate::frame::RxMeta;
use crate::gts::GtsSlots;
use crate::neighbor::NeighborHandle;
use crate::pool::PoolSlot;
use crate::radio::{ChannelSample, Radio, RadioState, TxError};
use crate::time::{Duration, Instant};
use crate::timer::{TimerKind, Timers};

/// The cooperative MAC task
///
/// Owns the CSMA/CA state machine, its timers, the radio driver and the upper layer listener.
/// Either call [`Mac::run`] from an async task, or call [`Mac::poll`] whenever an interrupt
/// fired, a frame was submitted or [`Mac::next_deadline`] passed.
pub struct Mac<'a, R: Radio, L: MacListener, G: RngCore> {
    engine: Engine<'a>,
    config: MacConfig,
    fsm: CsmaFsm,
    timers: Timers,
    radio: R,
    listener: L,
    rng: G,
    /// Time base for timers scheduled by the signal being handled
    clock: Instant,
    current: Option<Pending>,
    cursor: Option<NeighborHandle>,
    ack_for: Option<Header>,
    duplicates: Vec<(ShortAddress, SequenceNumber), DUPLICATE_TABLE_SIZE>,
    gts: GtsSlots<GTS_BITMAP_WORDS>,
    stats: MacStats,
}

impl<'a, R: Radio, L: MacListener, G: RngCore> Mac<'a, R, L, G> {
    pub fn new(engine: Engine<'a>, mut radio: R, listener: L, rng: G) -> Self {
        let config = engine.config();
        radio.set_state(RadioState::Rx);
        info!(
            "MAC: address {}, PAN {}",
            config.address.into_u16(),
            config.pan_id.into_u16()
        );

        Self {
            engine,
            config,
            fsm: CsmaFsm::new(config),
            timers: Timers::new(),
            radio,
            listener,
            rng,
            clock: Instant::from_ticks(0),
            current: None,
            cursor: None,
            ack_for: None,
            duplicates: Vec::new(),
            gts: GtsSlots::new(0, 0),
            stats: MacStats::default(),
        }
    }

    pub fn config(&self) -> &MacConfig {
        &self.config
    }

    pub fn state(&self) -> FsmState {
        self.fsm.state()
    }

    /// Counters as of the last [`Mac::poll`]
    pub fn stats(&self) -> &MacStats {
        &self.stats
    }

    /// Pool buffers held by queued, in-flight and not yet processed received frames
    pub fn buffers_in_use(&self) -> usize {
        self.engine.buffers_in_use()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    pub fn gts(&self) -> &GtsSlots<GTS_BITMAP_WORDS> {
        &self.gts
    }

    pub fn gts_mut(&mut self) -> &mut GtsSlots<GTS_BITMAP_WORDS> {
        &mut self.gts
    }

    /// Resets the GTS slot table to a multi-superframe of the given shape.
    pub fn configure_gts(&mut self, slots_per_superframe: usize, superframes: usize) {
        self.gts = GtsSlots::new(slots_per_superframe, superframes);
    }

    /// Drops queued frames, except for the oldest frame of each neighbor if `keep_front` is set.
    ///
    /// The frame in transmission is not affected. Every dropped frame is reported to the listener
    /// as [`TxResult::Flushed`], completed at `now`.
    pub fn flush_queues(&mut self, keep_front: bool, now: Instant) {
        let listener = &mut self.listener;
        let stats = &mut self.stats;
        self.engine.flush_queues(keep_front, &mut |ticket: TxTicket, queued_at: Instant| {
            stats.tx_flushed += 1;
            listener.on_complete(&TxReport {
                ticket,
                result: TxResult::Flushed,
                retries: 0,
                backoffs: 0,
                queued_at,
                completed_at: now,
            });
        });
    }

    /// Processes everything that is due at `now`.
    ///
    /// Handles queued interrupt events in arrival order, fires expired timers one at a time at
    /// their own deadlines and hands the next queued frame to the state machine once it is free.
    pub fn poll(&mut self, now: Instant) {
        let counters = self.engine.take_counters();
        self.stats.rx_dropped += counters.rx_dropped;
        self.stats.tx_rejected += counters.tx_rejected;

        loop {
            if let Some(event) = self.engine.try_event() {
                self.handle_event(event, now);
            } else if let Some((kind, deadline)) = self.timers.expired(now) {
                self.clock = deadline;
                self.dispatch(Signal::timeout(kind));
            } else if !self.start_next(now) {
                break;
            }
        }
    }

    pub async fn run(&mut self) {
        loop {
            self.poll(Instant::now());

            let engine = self.engine;
            let deadline = self.timers.next_deadline();
            let wait = select3(
                poll_fn(|cx| engine.poll_event(cx)),
                poll_fn(|cx| engine.poll_wake(cx)),
                sleep_until(deadline),
            );
            if let Either3::First(event) = wait.await {
                self.handle_event(event, Instant::now());
            }
        }
    }

    fn handle_event(&mut self, event: MacEvent, now: Instant) {
        self.clock = now;
        match event {
            MacEvent::TxDone => {
                self.radio.set_state(RadioState::Rx);
                self.dispatch(Signal::FrameTransmitted);
            }
            MacEvent::Dropped => {
                self.stats.rx_dropped += 1;
                self.dispatch(Signal::ExpectedFrameDropped);
            }
            MacEvent::Received { slot, meta } => self.receive(slot, meta),
        }
    }

    fn receive(&mut self, slot: PoolSlot, meta: RxMeta) {
        let psdu = self.engine.read_frame(&slot);
        self.engine.release(slot);

        let decoded = if meta.crc_ok {
            Header::decode(&psdu).ok()
        } else {
            None
        };
        let Some((header, payload)) = decoded else {
            self.stats.rx_corrupted += 1;
            self.dispatch(Signal::ExpectedFrameDropped);
            return;
        };

        if header.frame_type == FrameType::Ack {
            if header.destination == self.config.address {
                self.dispatch(Signal::AckReceived(header.sequence));
            }
            return;
        }

        if !self.accepts(&header) {
            self.stats.rx_filtered += 1;
            self.dispatch(Signal::FrameReceived);
            return;
        }

        if header.expects_ack() {
            self.ack_for = Some(header);
            self.dispatch(Signal::AckedFrameReceived);
        } else {
            self.dispatch(Signal::FrameReceived);
        }

        if self.is_duplicate(&header) {
            trace!(
                "MAC: duplicate {} from {}",
                header.sequence.into_u8(),
                header.source.into_u16()
            );
            self.stats.rx_duplicates += 1;
            return;
        }
        self.stats.rx_delivered += 1;
        self.listener.deliver_up(&header, payload, &meta);
    }

    fn accepts(&self, header: &Header) -> bool {
        let pan_ok = header.pan_id == self.config.pan_id || header.pan_id == PanId::BROADCAST;
        let destination_ok =
            header.destination == self.config.address || header.destination.is_broadcast();
        pan_ok && destination_ok
    }

    /// Remembers the last sequence number per sender and reports repetitions.
    fn is_duplicate(&mut self, header: &Header) -> bool {
        if let Some((_, last)) = self
            .duplicates
            .iter_mut()
            .find(|(source, _)| *source == header.source)
        {
            let repeated = *last == header.sequence;
            *last = header.sequence;
            return repeated;
        }

        if self.duplicates.is_full() {
            self.duplicates.remove(0);
        }
        unwrap!(self.duplicates.push((header.source, header.sequence)));
        false
    }

    fn start_next(&mut self, now: Instant) -> bool {
        if !self.fsm.is_free() {
            return false;
        }
        let Some((neighbor, pending)) = self.engine.pop_next(self.cursor) else {
            return false;
        };

        self.cursor = Some(neighbor);
        let signal = Signal::SendRequest {
            sequence: pending.ticket.sequence,
            ack_request: pending.ack_request,
        };
        self.current = Some(pending);
        self.clock = now;
        self.dispatch(signal);
        true
    }

    fn dispatch(&mut self, signal: Signal) {
        let mut port = MacPort {
            engine: self.engine,
            clock: self.clock,
            timers: &mut self.timers,
            radio: &mut self.radio,
            listener: &mut self.listener,
            rng: &mut self.rng,
            current: &mut self.current,
            ack_for: self.ack_for,
            stats: &mut self.stats,
        };
        self.fsm.dispatch(signal, &mut port);
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        // Timer always yields on first poll, skip it once the deadline passed
        Some(deadline) if deadline <= Instant::now() => (),
        Some(deadline) => Timer::at(deadline).await,
        None => pending().await,
    }
}

struct MacPort<'m, 'a, R, L, G> {
    engine: Engine<'a>,
    clock: Instant,
    timers: &'m mut Timers,
    radio: &'m mut R,
    listener: &'m mut L,
    rng: &'m mut G,
    current: &'m mut Option<Pending>,
    ack_for: Option<Header>,
    stats: &'m mut MacStats,
}

impl<R: Radio, L, G> MacPort<'_, '_, R, L, G> {
    fn transmit(&mut self, psdu: &[u8]) -> Result<(), TxError> {
        self.radio.set_state(RadioState::Tx);
        let result = self.radio.transmit(psdu);
        if result.is_err() {
            self.radio.set_state(RadioState::Rx);
        }
        result
    }
}

impl<R: Radio, L: MacListener, G: RngCore> Port for MacPort<'_, '_, R, L, G> {
    fn schedule(&mut self, kind: TimerKind, delay: Duration) {
        self.timers.schedule(kind, self.clock + delay);
    }

    fn cancel(&mut self, kind: TimerKind) {
        self.timers.cancel(kind);
    }

    fn radio_idle(&mut self) -> bool {
        self.radio.state() == RadioState::Rx
    }

    fn sample_channel(&mut self) -> ChannelSample {
        self.radio.sample_channel()
    }

    fn transmit_frame(&mut self) -> Result<(), TxError> {
        let psdu = self.engine.read_frame(&unwrap!(self.current.as_ref()).slot);
        self.transmit(&psdu)
    }

    fn transmit_ack(&mut self) -> Result<(), TxError> {
        let mut ack = [0; HEADER_LENGTH];
        Header::ack_for(&unwrap!(self.ack_for)).encode(&mut ack);
        self.transmit(&ack)?;
        self.stats.acks_sent += 1;
        Ok(())
    }

    fn random(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn complete(&mut self, result: TxResult, counters: TxCounters) {
        let pending = unwrap!(self.current.take());

        let counter = match result {
            TxResult::Success => &mut self.stats.tx_success,
            TxResult::ChannelAccessFail => &mut self.stats.tx_channel_access_fail,
            TxResult::NoAck => &mut self.stats.tx_no_ack,
            TxResult::Invalid => &mut self.stats.tx_invalid,
            TxResult::Flushed => &mut self.stats.tx_flushed,
        };
        *counter += 1;

        let report = TxReport {
            ticket: pending.ticket,
            result,
            retries: counters.retries,
            backoffs: counters.backoffs,
            queued_at: pending.queued_at,
            completed_at: self.clock,
        };
        debug!(
            "MAC: frame {} to {} completed: {:?}",
            report.ticket.sequence.into_u8(),
            report.ticket.destination.into_u16(),
            result
        );
        self.listener.on_complete(&report);
        self.engine.release(pending.slot);
    }
}
