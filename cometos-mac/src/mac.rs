//! MAC engine
//!
//! The MAC state is split between three execution contexts:
//! * the upper layer submits frames through [`Submitter`] handles,
//! * the radio interrupt handler reports receptions and transmit completions through [`Irq`],
//! * the cooperative [`Mac`] task runs the CSMA/CA state machine, its timers and the
//!   acknowledgment logic, and reports results to a [`MacListener`].
//!
//! [`MacResources`] holds everything the contexts share: the message pool, the neighbor queues
//! and the event queue from interrupt to task. All of it is protected by a blocking mutex, so
//! critical sections stay short (at most one frame copy).
//!
//! ## Examples
//!
//! ```
//! use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex as Mutex;
//! use cometos_mac::config::MacConfig;
//! use cometos_mac::core::ShortAddress;
//! use cometos_mac::mac::MacResources;
//!
//! let config = MacConfig {
//!     address: ShortAddress::new(0x0001),
//!     ..Default::default()
//! };
//! // 16 frame buffers, up to 8 neighbors sharing 12 queue entries
//! let mut resources = MacResources::<Mutex, 16, 8, 12>::new(config).unwrap();
//! let (submitter, irq, engine) = resources.split();
//! ```
//! The engine handle is then turned into a [`Mac`] together with the radio driver, the
//! listener and a random number generator, and driven by [`Mac::run`].

use crate::core::{Header, SequenceNumber, ShortAddress};
use crate::csma::TxResult;
use crate::frame::RxMeta;
use crate::time::Instant;

mod engine;
mod resources;

pub use engine::Mac;
pub use resources::{Engine, Irq, MacResources, Submitter};

/// Capacity of the interrupt to task event queue
pub const EVENT_QUEUE_DEPTH: usize = 8;

/// Number of senders the duplicate filter remembers
pub const DUPLICATE_TABLE_SIZE: usize = 8;

/// Storage of the GTS slot table, in 32-slot words
pub const GTS_BITMAP_WORDS: usize = 4;

/// Identifies a submitted frame in its completion report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxTicket {
    pub destination: ShortAddress,
    pub sequence: SequenceNumber,
}

/// Completion report of a submitted frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxReport {
    pub ticket: TxTicket,
    pub result: TxResult,
    /// Retransmissions after a missing acknowledgment
    pub retries: u8,
    /// Busy channel assessments
    pub backoffs: u16,
    pub queued_at: Instant,
    pub completed_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SubmitError {
    /// No free frame buffer
    PoolExhausted,
    /// The shared neighbor queue capacity is exhausted
    QueueFull,
    /// The destination is unknown and the neighbor table is full
    NeighborTableFull,
    /// The payload does not fit into a single frame
    PayloadTooLong,
}

/// Reason for discarding a reception in interrupt context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxDropped {
    NoBuffer,
    QueueFull,
    TooLong,
}

/// Upper layer of the MAC
///
/// Both methods are called from the MAC task and should return quickly.
pub trait MacListener {
    /// Called exactly once for every frame accepted by [`Submitter::submit`], flushed frames
    /// included. The frame buffer is returned to the pool after the call.
    fn on_complete(&mut self, report: &TxReport);

    /// Called for every received data frame addressed to this node or broadcast.
    fn deliver_up(&mut self, header: &Header, payload: &[u8], meta: &RxMeta);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MacStats {
    pub tx_success: u32,
    pub tx_channel_access_fail: u32,
    pub tx_no_ack: u32,
    pub tx_invalid: u32,
    /// Queued frames dropped by a flush
    pub tx_flushed: u32,
    /// Submissions rejected for lack of buffers or queue capacity
    pub tx_rejected: u32,
    pub acks_sent: u32,
    pub rx_delivered: u32,
    /// Frames for another node or PAN
    pub rx_filtered: u32,
    pub rx_duplicates: u32,
    /// Frames with a bad CRC or an undecodable header
    pub rx_corrupted: u32,
    /// Receptions lost in interrupt context: no buffer, no event queue space or a failed
    /// reception reported by the driver
    pub rx_dropped: u32,
}
