//! # CometOS MAC
//!
//! This library provides the IEEE 802.15.4 medium access control core of the CometOS stack \[1\]
//! for no_std environments: unslotted CSMA/CA with acknowledgments and retransmissions, a
//! fixed-capacity frame pool, per-neighbor transmit queues and the slot bitmaps used by the DSME
//! extension. It uses no dynamic memory allocation; all capacities are const generics.
//!
//! The library targets the Embassy async framework, but the MAC task can also be driven by a
//! plain superloop through [`mac::Mac::poll`].
//!
//! ## Architecture
//!
//! ```text
//!  ┌─────────────┐ submit          ┌───────────────────────────────┐
//!  │ Upper layer ├────────────────►│ MacResources                  │
//!  └─────────────┘  (Submitter)    │ ┌──────────────┐ ┌──────────┐ │
//!         ▲                        │ │ Neighbor     │ │ Message  │ │
//!         │ on_complete            │ │ queues       │ │ pool     │ │
//!         │ deliver_up             │ └──────────────┘ └──────────┘ │
//!  ┌──────┴──────┐  Engine         │ ┌──────────────┐              │
//!  │ Mac task    │◄───────────────►│ │ Event queue  │◄─────────────┼─┐
//!  │ ┌─────────┐ │                 │ └──────────────┘              │ │ Irq
//!  │ │CSMA FSM │ │                 └───────────────────────────────┘ │
//!  │ │ Timers  │ │  Radio trait    ┌───────────────────┐             │
//!  │ └─────────┘ ├────────────────►│ Transceiver driver├─────────────┘
//!  └─────────────┘                 └───────────────────┘
//! ```
//! Components:
//! * _MacResources_ holds the state shared between contexts: the message pool, the neighbor
//!   queues and the interrupt event queue.
//! * _Submitter_ is a shared handle the upper layer uses to queue frames.
//! * _Irq_ is the handle the transceiver interrupt handler uses to report receptions and transmit
//!   completions.
//! * _Mac_ is the cooperative task running the CSMA/CA state machine. It owns the radio driver,
//!   the upper layer listener and the timers.
//!
//! ## Concurrency model
//!
//! Interrupt handlers only copy received frames into the pool and enqueue events. Everything
//! else runs to completion in the MAC task; no operation blocks, every wait is a one-shot timer
//! that re-enters the state machine. Shared state is protected by an `embassy_sync` blocking
//! mutex:
//! * _CriticalSectionRawMutex_ allows the interrupt handler, the MAC task and submitters to run
//!   at different interrupt levels.
//! * _ThreadModeRawMutex_ requires all of them to run in thread mode.
//!
//! Critical sections are bounded by one frame copy, except for queue flushes.
//!
//! ## Limitations
//!
//! * Beacon-enabled (slotted) CSMA/CA is not implemented.
//! * GTS negotiation commands are left to the upper layer; the MAC only keeps the slot table.
//! * Only short addressing and a single PAN are supported.
//!
//! # References:
//!
//! * \[1\] IEEE Std 802.15.4-2015, Low-Rate Wireless Networks
#![no_std]

pub use cometos_core as core;
pub use cometos_radio::{frame, radio, time};

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod config;
pub mod csma;
pub mod gts;
pub mod mac;
pub mod neighbor;
pub mod pool;
pub mod slot_bitmap;
pub mod timer;
mod utils;
