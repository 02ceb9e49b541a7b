//! Unslotted CSMA/CA state machine
//!
//! The state machine serializes all transmit attempts of one radio. It is a pure transition
//! table: every side effect (timers, radio access, randomness, completion) goes through the
//! [`Port`] supplied with each signal, which keeps it testable without a radio.
//!
//! Timer ownership per state:
//!
//! | state           | pending timer | current frame |
//! |-----------------|---------------|---------------|
//! | `Idle`          | none          | no            |
//! | `Backoff`       | backoff       | yes           |
//! | `Cca`           | CCA           | yes           |
//! | `TransmitFrame` | none          | yes           |
//! | `WaitAck`       | ACK           | yes           |
//! | `WaitSifs`      | SIFS          | maybe         |
//! | `TransmitAck`   | none          | maybe         |

use crate::config::MacConfig;
use crate::core::SequenceNumber;
use crate::radio::{ChannelSample, TxError};
use crate::time::Duration;
use crate::timer::TimerKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FsmState {
    Idle,
    Backoff,
    Cca,
    TransmitFrame,
    WaitAck,
    WaitSifs,
    TransmitAck,
}

impl FsmState {
    /// The timer that runs while in this state
    pub const fn timer(self) -> Option<TimerKind> {
        match self {
            FsmState::Backoff => Some(TimerKind::Backoff),
            FsmState::Cca => Some(TimerKind::Cca),
            FsmState::WaitAck => Some(TimerKind::Ack),
            FsmState::WaitSifs => Some(TimerKind::Sifs),
            FsmState::Idle | FsmState::TransmitFrame | FsmState::TransmitAck => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Signal {
    /// A frame became current
    SendRequest {
        sequence: SequenceNumber,
        ack_request: bool,
    },
    TimeoutBackoff,
    TimeoutCca,
    TimeoutAck,
    TimeoutSifs,
    /// The radio finished sending the current frame or acknowledgment
    FrameTransmitted,
    /// A frame was received that needs no acknowledgment
    FrameReceived,
    /// A frame was received that this node has to acknowledge
    AckedFrameReceived,
    /// A reception started but the frame was lost
    ExpectedFrameDropped,
    AckReceived(SequenceNumber),
}

impl Signal {
    pub const fn timeout(kind: TimerKind) -> Signal {
        match kind {
            TimerKind::Backoff => Signal::TimeoutBackoff,
            TimerKind::Cca => Signal::TimeoutCca,
            TimerKind::Ack => Signal::TimeoutAck,
            TimerKind::Sifs => Signal::TimeoutSifs,
        }
    }
}

/// Terminal outcome of a transmit attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxResult {
    Success,
    /// The channel stayed busy for more than `max_csma_backoffs` assessments
    ChannelAccessFail,
    /// No acknowledgment after `max_frame_retries` retransmissions
    NoAck,
    /// The radio refused the frame
    Invalid,
    /// Removed from its queue by a flush before transmission started
    Flushed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxCounters {
    /// Retransmissions after a missing acknowledgment
    pub retries: u8,
    /// Busy channel assessments over the whole attempt
    pub backoffs: u16,
}

/// Side effects requested by the state machine
pub trait Port {
    /// Arms a one-shot timer relative to the instant of the signal being handled.
    fn schedule(&mut self, kind: TimerKind, delay: Duration);

    fn cancel(&mut self, kind: TimerKind);

    /// Whether the radio listens and may start a transmission
    fn radio_idle(&mut self) -> bool;

    fn sample_channel(&mut self) -> ChannelSample;

    /// Starts transmission of the current frame.
    fn transmit_frame(&mut self) -> Result<(), TxError>;

    /// Starts transmission of the acknowledgment for the last received frame.
    fn transmit_ack(&mut self) -> Result<(), TxError>;

    fn random(&mut self) -> u32;

    /// Reports the outcome of the current frame. Called exactly once per accepted request.
    fn complete(&mut self, result: TxResult, counters: TxCounters);
}

struct Attempt {
    sequence: SequenceNumber,
    ack_request: bool,
    /// NB: busy assessments since the last backoff reset
    nb: u8,
    min_be: u8,
    counters: TxCounters,
}

pub struct CsmaFsm {
    config: MacConfig,
    state: FsmState,
    current: Option<Attempt>,
}

impl CsmaFsm {
    pub fn new(config: MacConfig) -> Self {
        assert!(config.min_be <= config.max_be);
        Self {
            config,
            state: FsmState::Idle,
            current: None,
        }
    }

    pub fn state(&self) -> FsmState {
        self.state
    }

    /// Whether a new frame may be handed over with `SendRequest`
    pub fn is_free(&self) -> bool {
        self.current.is_none()
    }

    /// BE = min(minBE + NB, macMaxBE) of the current attempt
    pub fn backoff_exponent(&self) -> u8 {
        match &self.current {
            Some(attempt) => (attempt.min_be + attempt.nb).min(self.config.max_be),
            None => self.config.min_be,
        }
    }

    pub fn dispatch(&mut self, signal: Signal, port: &mut impl Port) {
        let previous = self.state;
        self.state = match (previous, signal) {
            (FsmState::Idle, Signal::SendRequest { sequence, ack_request }) => {
                self.attach(sequence, ack_request);
                if port.radio_idle() {
                    self.enter_backoff(port)
                } else {
                    self.enter_sifs(port)
                }
            }
            (
                state @ (FsmState::WaitSifs | FsmState::TransmitAck),
                Signal::SendRequest { sequence, ack_request },
            ) if self.current.is_none() => {
                self.attach(sequence, ack_request);
                state
            }
            (state, Signal::SendRequest { .. }) => {
                warn!("CSMA: send request in state {:?} ignored", state);
                state
            }

            (
                state @ (FsmState::Idle | FsmState::Backoff | FsmState::Cca | FsmState::WaitSifs),
                Signal::AckedFrameReceived,
            ) => {
                Self::cancel_timer(state, port);
                self.send_ack(port)
            }
            (
                state @ (FsmState::Idle | FsmState::Backoff | FsmState::Cca | FsmState::WaitSifs),
                Signal::FrameReceived | Signal::ExpectedFrameDropped,
            ) => {
                Self::cancel_timer(state, port);
                self.enter_sifs(port)
            }

            (FsmState::Backoff, Signal::TimeoutBackoff) => {
                port.schedule(TimerKind::Cca, self.config.cca_detection_time);
                FsmState::Cca
            }
            (FsmState::Cca, Signal::TimeoutCca) => self.assess_channel(port),
            (FsmState::TransmitFrame, Signal::FrameTransmitted) => {
                if unwrap!(self.current.as_ref()).ack_request {
                    port.schedule(TimerKind::Ack, self.config.ack_wait_duration);
                    FsmState::WaitAck
                } else {
                    self.finish(TxResult::Success, port)
                }
            }
            (FsmState::WaitAck, Signal::TimeoutAck) => self.retry(port),
            (FsmState::WaitAck, Signal::AckReceived(sequence))
                if self
                    .current
                    .as_ref()
                    .is_some_and(|attempt| attempt.sequence == sequence) =>
            {
                port.cancel(TimerKind::Ack);
                self.finish(TxResult::Success, port)
            }
            (FsmState::WaitSifs, Signal::TimeoutSifs) => {
                if self.current.is_some() {
                    self.enter_backoff(port)
                } else {
                    FsmState::Idle
                }
            }
            (FsmState::TransmitAck, Signal::FrameTransmitted) => self.enter_sifs(port),

            (state, signal) => {
                trace!("CSMA: {:?} ignored in state {:?}", signal, state);
                state
            }
        };

        if self.state != previous {
            trace!("CSMA: {:?} -> {:?}", previous, self.state);
        }
    }

    fn attach(&mut self, sequence: SequenceNumber, ack_request: bool) {
        self.current = Some(Attempt {
            sequence,
            ack_request,
            nb: 0,
            min_be: self.config.min_be,
            counters: TxCounters::default(),
        });
    }

    fn cancel_timer(state: FsmState, port: &mut impl Port) {
        if let Some(kind) = state.timer() {
            port.cancel(kind);
        }
    }

    fn enter_backoff(&mut self, port: &mut impl Port) -> FsmState {
        let exponent = self.backoff_exponent();
        let periods = port.random() & ((1u32 << exponent) - 1);
        port.schedule(TimerKind::Backoff, self.config.unit_backoff_period * periods);
        trace!("CSMA: backoff {} periods, BE {}", periods, exponent);
        FsmState::Backoff
    }

    fn enter_sifs(&mut self, port: &mut impl Port) -> FsmState {
        port.schedule(TimerKind::Sifs, self.config.sifs_duration);
        FsmState::WaitSifs
    }

    fn send_ack(&mut self, port: &mut impl Port) -> FsmState {
        match port.transmit_ack() {
            Ok(()) => FsmState::TransmitAck,
            Err(err) => {
                warn!("CSMA: acknowledgment not sent: {:?}", err);
                self.enter_sifs(port)
            }
        }
    }

    fn assess_channel(&mut self, port: &mut impl Port) -> FsmState {
        let busy = self.config.cca_mode.is_busy(port.sample_channel());
        let max_csma_backoffs = self.config.max_csma_backoffs;
        let attempt = unwrap!(self.current.as_mut());

        if !busy {
            attempt.nb = 0;
            return match port.transmit_frame() {
                Ok(()) => FsmState::TransmitFrame,
                Err(err) => {
                    warn!("CSMA: frame refused by radio: {:?}", err);
                    self.finish(TxResult::Invalid, port)
                }
            };
        }

        attempt.counters.backoffs = attempt.counters.backoffs.saturating_add(1);
        if attempt.nb < max_csma_backoffs {
            attempt.nb += 1;
            self.enter_backoff(port)
        } else {
            self.finish(TxResult::ChannelAccessFail, port)
        }
    }

    fn retry(&mut self, port: &mut impl Port) -> FsmState {
        let config = &self.config;
        let attempt = unwrap!(self.current.as_mut());
        if attempt.counters.retries >= config.max_frame_retries {
            return self.finish(TxResult::NoAck, port);
        }

        attempt.counters.retries += 1;
        attempt.nb = 0;
        if !config.reset_backoff_exponent_on_retry {
            attempt.min_be = (attempt.min_be + 1).min(config.max_be);
        }
        debug!(
            "CSMA: no acknowledgment, retry {} of {}",
            attempt.counters.retries, config.max_frame_retries
        );
        self.enter_backoff(port)
    }

    fn finish(&mut self, result: TxResult, port: &mut impl Port) -> FsmState {
        let attempt = unwrap!(self.current.take());
        port.complete(result, attempt.counters);
        FsmState::Idle
    }
}
