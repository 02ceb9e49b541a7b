//! CometOS radio driver interface
//!
//! The crate provides the boundary between an IEEE 802.15.4 transceiver driver and the CometOS
//! MAC. Limited scope facilitates compatibility across versions.
//! Driver crates should depend on this crate. MAC users should depend on the `cometos-mac`
//! crate instead.
//!
//! The MAC talks to the transceiver through the [`Radio`](radio::Radio) trait: it switches the
//! transceiver between reception and transmission, samples the channel for clear channel
//! assessment and hands over complete PSDUs for transmission.
//!
//! The opposite direction runs in interrupt context. A driver reports received frames and
//! transmission completion through the MAC interrupt shim, which only copies the frame into a
//! pool slot and enqueues an event. The driver never calls into MAC business logic directly.
//!
//! `transmit` must not block until the frame is on air. The driver starts the transmission and
//! signals its completion later from the interrupt handler.

#![no_std]

pub mod frame;
pub mod radio;

pub mod time {
    pub use embassy_time::{Duration, Instant};
}
