use core::cell::{Cell, RefCell};
use core::future::Future;
use core::pin::pin;
use core::task::{Context, Poll};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use embassy_sync::signal::Signal;
use heapless::Vec;

use super::{EVENT_QUEUE_DEPTH, RxDropped, SubmitError, TxTicket};
use crate::config::{ConfigError, MacConfig};
use crate::core::{
    FrameType, HEADER_LENGTH, Header, MAX_PAYLOAD_LENGTH, SequenceNumber, ShortAddress,
};
use crate::frame::{Psdu, RxMeta};
use crate::neighbor::{NeighborHandle, NeighborQueues};
use crate::pool::{PoolError, PoolExhausted, PoolSlot, SharedPool};
use crate::time::Instant;

pub(crate) enum MacEvent {
    Received { slot: PoolSlot, meta: RxMeta },
    /// A reception was lost in interrupt context
    Dropped,
    /// The radio finished the last transmission. Never queued, see `MacResources::tx_done`.
    TxDone,
}

/// A submitted frame, queued or being sent
pub(crate) struct Pending {
    pub slot: PoolSlot,
    pub ticket: TxTicket,
    pub ack_request: bool,
    pub queued_at: Instant,
}

struct TxQueues<const K: usize, const Q: usize> {
    neighbors: NeighborQueues<Pending, K, Q>,
    sequence: SequenceNumber,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Counters {
    pub rx_dropped: u32,
    pub tx_rejected: u32,
}

/// State shared by the MAC task, its interrupt handler and the upper layer
///
/// * `P`: number of frame buffers, shared by reception and transmission
/// * `K`: number of neighbors with a transmit queue
/// * `Q`: number of queued frames over all neighbors
pub struct MacResources<M: RawMutex, const P: usize, const K: usize, const Q: usize> {
    config: MacConfig,
    pool: SharedPool<M, P>,
    queues: Mutex<M, RefCell<TxQueues<K, Q>>>,
    events: Channel<M, MacEvent, EVENT_QUEUE_DEPTH>,
    // A separate flag keeps transmit completions from being lost to a full event queue.
    // At most one transmission is outstanding.
    tx_done: Signal<M, ()>,
    wake: Signal<M, ()>,
    counters: Mutex<M, Cell<Counters>>,
}

impl<M: RawMutex, const P: usize, const K: usize, const Q: usize> MacResources<M, P, K, Q> {
    pub fn new(config: MacConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            pool: SharedPool::new(),
            queues: Mutex::new(RefCell::new(TxQueues {
                neighbors: NeighborQueues::new(),
                sequence: SequenceNumber::new(0),
            })),
            events: Channel::new(),
            tx_done: Signal::new(),
            wake: Signal::new(),
            counters: Mutex::new(Cell::new(Counters::default())),
        })
    }

    fn count(&self, update: impl FnOnce(&mut Counters)) {
        self.counters.lock(|cell| {
            let mut counters = cell.get();
            update(&mut counters);
            cell.set(counters);
        });
    }
}

impl<M: RawMutex + Sync, const P: usize, const K: usize, const Q: usize> MacResources<M, P, K, Q> {
    pub fn split(&mut self) -> (Submitter<'_>, Irq<'_>, Engine<'_>) {
        let this: &Self = self;
        (Submitter(this), Irq(this), Engine(this))
    }
}

pub(crate) trait DynamicSubmit {
    fn submit(
        &self,
        destination: ShortAddress,
        payload: &[u8],
        ack_request: bool,
        now: Instant,
    ) -> Result<TxTicket, SubmitError>;

    fn packets_in_queue(&self, destination: ShortAddress) -> usize;
}

pub(crate) trait DynamicIrq {
    fn frame_received(&self, psdu: &[u8], meta: RxMeta) -> Result<(), RxDropped>;
    fn reception_failed(&self);
    fn transmit_done(&self);
}

pub(crate) trait DynamicEngine {
    fn config(&self) -> MacConfig;
    fn try_event(&self) -> Option<MacEvent>;
    fn poll_event(&self, cx: &mut Context<'_>) -> Poll<MacEvent>;
    fn poll_wake(&self, cx: &mut Context<'_>) -> Poll<()>;
    fn take_counters(&self) -> Counters;
    fn read_frame(&self, slot: &PoolSlot) -> Psdu;
    fn release(&self, slot: PoolSlot);
    fn buffers_in_use(&self) -> usize;
    fn pop_next(&self, after: Option<NeighborHandle>) -> Option<(NeighborHandle, Pending)>;
    fn flush_queues(&self, keep_front: bool, discarded: &mut dyn FnMut(TxTicket, Instant));
}

impl<M: RawMutex, const P: usize, const K: usize, const Q: usize> DynamicSubmit
    for MacResources<M, P, K, Q>
{
    fn submit(
        &self,
        destination: ShortAddress,
        payload: &[u8],
        ack_request: bool,
        now: Instant,
    ) -> Result<TxTicket, SubmitError> {
        if payload.len() > MAX_PAYLOAD_LENGTH {
            return Err(SubmitError::PayloadTooLong);
        }

        let result = self.queues.lock(|queues| {
            let mut queues = queues.borrow_mut();
            let neighbor = queues
                .neighbors
                .add_neighbor(destination)
                .map_err(|_| SubmitError::NeighborTableFull)?;

            let header = Header {
                sequence: queues.sequence,
                source: self.config.address,
                destination,
                frame_type: FrameType::Data,
                ack_request: ack_request && !destination.is_broadcast(),
                pan_id: self.config.pan_id,
            };
            let mut raw_header = [0; HEADER_LENGTH];
            header.encode(&mut raw_header);

            let slot = self
                .pool
                .lock(|pool| {
                    let slot = pool.acquire()?;
                    let psdu = pool.get_mut(&slot);
                    unwrap!(psdu.extend_from_slice(&raw_header));
                    unwrap!(psdu.extend_from_slice(payload));
                    Ok(slot)
                })
                .map_err(|_: PoolExhausted| SubmitError::PoolExhausted)?;

            let ticket = TxTicket {
                destination,
                sequence: header.sequence,
            };
            let pending = Pending {
                slot,
                ticket,
                ack_request: header.ack_request,
                queued_at: now,
            };
            if let Err(pending) = queues.neighbors.push_back(neighbor, pending) {
                self.pool.release(pending.slot);
                return Err(SubmitError::QueueFull);
            }
            queues.sequence = header.sequence.next();
            Ok(ticket)
        });

        match result {
            Ok(ticket) => {
                trace!(
                    "Submit: frame {} for {} queued",
                    ticket.sequence.into_u8(),
                    destination.into_u16()
                );
                self.wake.signal(());
            }
            Err(err) => {
                debug!("Submit: frame for {} rejected: {:?}", destination.into_u16(), err);
                self.count(|counters| counters.tx_rejected += 1);
            }
        }
        result
    }

    fn packets_in_queue(&self, destination: ShortAddress) -> usize {
        self.queues.lock(|queues| {
            let queues = queues.borrow();
            queues
                .neighbors
                .find_by_address(destination)
                .map_or(0, |neighbor| queues.neighbors.packets_in_queue(neighbor))
        })
    }
}

impl<M: RawMutex, const P: usize, const K: usize, const Q: usize> DynamicIrq
    for MacResources<M, P, K, Q>
{
    fn frame_received(&self, psdu: &[u8], meta: RxMeta) -> Result<(), RxDropped> {
        let reason = match self.pool.acquire_loaded(psdu) {
            Ok(slot) => match self.events.try_send(MacEvent::Received { slot, meta }) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(event)) => {
                    if let MacEvent::Received { slot, .. } = event {
                        self.pool.release(slot);
                    }
                    self.count(|counters| counters.rx_dropped += 1);
                    return Err(RxDropped::QueueFull);
                }
            },
            Err(PoolError::Exhausted) => RxDropped::NoBuffer,
            Err(PoolError::TooLong) => RxDropped::TooLong,
        };

        self.reception_failed();
        Err(reason)
    }

    fn reception_failed(&self) {
        if self.events.try_send(MacEvent::Dropped).is_err() {
            self.count(|counters| counters.rx_dropped += 1);
        }
    }

    fn transmit_done(&self) {
        self.tx_done.signal(());
    }
}

impl<M: RawMutex, const P: usize, const K: usize, const Q: usize> DynamicEngine
    for MacResources<M, P, K, Q>
{
    fn config(&self) -> MacConfig {
        self.config
    }

    fn try_event(&self) -> Option<MacEvent> {
        if self.tx_done.try_take().is_some() {
            return Some(MacEvent::TxDone);
        }
        self.events.try_receive().ok()
    }

    fn poll_event(&self, cx: &mut Context<'_>) -> Poll<MacEvent> {
        // Signal wait futures are stateless
        if pin!(self.tx_done.wait()).poll(cx).is_ready() {
            return Poll::Ready(MacEvent::TxDone);
        }
        self.events.poll_receive(cx)
    }

    fn poll_wake(&self, cx: &mut Context<'_>) -> Poll<()> {
        pin!(self.wake.wait()).poll(cx)
    }

    fn take_counters(&self) -> Counters {
        self.counters.lock(|cell| cell.take())
    }

    fn read_frame(&self, slot: &PoolSlot) -> Psdu {
        self.pool.read(slot)
    }

    fn release(&self, slot: PoolSlot) {
        self.pool.release(slot);
    }

    fn buffers_in_use(&self) -> usize {
        self.pool.live()
    }

    fn pop_next(&self, after: Option<NeighborHandle>) -> Option<(NeighborHandle, Pending)> {
        self.queues.lock(|queues| {
            let mut queues = queues.borrow_mut();
            let neighbor = queues.neighbors.next_ready(after)?;
            let pending = queues.neighbors.pop_front(neighbor)?;
            Some((neighbor, pending))
        })
    }

    fn flush_queues(&self, keep_front: bool, discarded: &mut dyn FnMut(TxTicket, Instant)) {
        let mut flushed = Vec::<Pending, Q>::new();
        self.queues.lock(|queues| {
            queues
                .borrow_mut()
                .neighbors
                .flush_queues(keep_front, |pending| {
                    if flushed.push(pending).is_err() {
                        panic!("flushed more frames than queue entries");
                    }
                });
        });
        for pending in flushed {
            discarded(pending.ticket, pending.queued_at);
            self.pool.release(pending.slot);
        }
    }
}

/// Upper layer handle for submitting frames
#[derive(Clone, Copy)]
pub struct Submitter<'a>(&'a (dyn DynamicSubmit + Sync));

impl<'a> Submitter<'a> {
    /// Queues a data frame for `destination`.
    ///
    /// The acknowledgment request is ignored for broadcast frames. An accepted frame is reported
    /// exactly once through [`MacListener::on_complete`](super::MacListener::on_complete); a
    /// rejected one never is.
    pub fn submit(
        &self,
        destination: ShortAddress,
        payload: &[u8],
        ack_request: bool,
    ) -> Result<TxTicket, SubmitError> {
        self.0
            .submit(destination, payload, ack_request, Instant::now())
    }

    /// Number of frames waiting for `destination`, excluding one in transmission
    pub fn packets_in_queue(&self, destination: ShortAddress) -> usize {
        self.0.packets_in_queue(destination)
    }
}

/// Radio interrupt handler access to the MAC
pub struct Irq<'a>(&'a (dyn DynamicIrq + Sync));

impl<'a> Irq<'a> {
    /// Hands a received PSDU to the MAC task.
    ///
    /// The frame is copied into a pool buffer. When no buffer or event queue space is free the
    /// frame is dropped and counted.
    pub fn frame_received(&self, psdu: &[u8], meta: RxMeta) -> Result<(), RxDropped> {
        self.0.frame_received(psdu, meta)
    }

    /// Reports a reception that started but produced no frame.
    pub fn reception_failed(&self) {
        self.0.reception_failed()
    }

    /// Reports the end of the transmission started by the last `Radio::transmit` call.
    pub fn transmit_done(&self) {
        self.0.transmit_done()
    }
}

/// MAC task access to the shared resources
#[derive(Clone, Copy)]
pub struct Engine<'a>(&'a (dyn DynamicEngine + Sync));

impl<'a> Engine<'a> {
    pub(crate) fn config(self) -> MacConfig {
        self.0.config()
    }

    pub(crate) fn try_event(self) -> Option<MacEvent> {
        self.0.try_event()
    }

    pub(crate) fn poll_event(self, cx: &mut Context<'_>) -> Poll<MacEvent> {
        self.0.poll_event(cx)
    }

    pub(crate) fn poll_wake(self, cx: &mut Context<'_>) -> Poll<()> {
        self.0.poll_wake(cx)
    }

    pub(crate) fn take_counters(self) -> Counters {
        self.0.take_counters()
    }

    pub(crate) fn read_frame(self, slot: &PoolSlot) -> Psdu {
        self.0.read_frame(slot)
    }

    pub(crate) fn release(self, slot: PoolSlot) {
        self.0.release(slot)
    }

    pub(crate) fn buffers_in_use(self) -> usize {
        self.0.buffers_in_use()
    }

    pub(crate) fn pop_next(self, after: Option<NeighborHandle>) -> Option<(NeighborHandle, Pending)> {
        self.0.pop_next(after)
    }

    pub(crate) fn flush_queues(
        self,
        keep_front: bool,
        discarded: &mut dyn FnMut(TxTicket, Instant),
    ) {
        self.0.flush_queues(keep_front, discarded)
    }
}
