use crate::time::Instant;

/// One-shot timers of the CSMA/CA procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerKind {
    Backoff,
    Cca,
    Ack,
    Sifs,
}

impl TimerKind {
    pub const ALL: [TimerKind; 4] = [
        TimerKind::Backoff,
        TimerKind::Cca,
        TimerKind::Ack,
        TimerKind::Sifs,
    ];

    const fn index(self) -> usize {
        self as usize
    }
}

/// Deadline table with at most one pending deadline per timer kind
#[derive(Debug, Default)]
pub struct Timers {
    deadlines: [Option<Instant>; 4],
}

impl Timers {
    pub const fn new() -> Self {
        Self {
            deadlines: [None; 4],
        }
    }

    /// Arms a timer. Panics if the timer is already pending.
    pub fn schedule(&mut self, kind: TimerKind, deadline: Instant) {
        let slot = &mut self.deadlines[kind.index()];
        assert!(slot.is_none(), "timer is already pending");
        *slot = Some(deadline);
    }

    /// Disarms a timer. Returns whether it was pending.
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        self.deadlines[kind.index()].take().is_some()
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<Instant> {
        self.deadlines[kind.index()]
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.iter().flatten().min().copied()
    }

    /// Disarms and returns the earliest timer due at `now`.
    ///
    /// Ties resolve in [`TimerKind::ALL`] order.
    pub fn expired(&mut self, now: Instant) -> Option<(TimerKind, Instant)> {
        let (kind, deadline) = TimerKind::ALL
            .into_iter()
            .filter_map(|kind| Some((kind, self.deadline(kind)?)))
            .filter(|(_, deadline)| *deadline <= now)
            .min_by_key(|(_, deadline)| *deadline)?;
        self.cancel(kind);
        Some((kind, deadline))
    }
}
