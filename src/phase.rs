use serde::Serialize;
use std::fmt;

/// A timed stage of the run. Phases execute strictly one after another in
/// [`Phase::ALL`] order; the first and last bound the measured wall time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Warmup,
    Loading,
    Peak,
    Cooldown,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::Warmup, Phase::Loading, Phase::Peak, Phase::Cooldown];

    pub fn first() -> Phase {
        Self::ALL[0]
    }

    pub fn last() -> Phase {
        Self::ALL[Self::ALL.len() - 1]
    }

    pub fn is_first(self) -> bool {
        self == Self::first()
    }

    pub fn is_last(self) -> bool {
        self == Self::last()
    }

    /// Share of the maximum concurrency this phase runs with.
    pub fn fraction(self) -> f64 {
        match self {
            Phase::Warmup => 0.10,
            Phase::Loading => 0.50,
            Phase::Peak => 1.0,
            Phase::Cooldown => 0.25,
        }
    }

    /// [`Phase::fraction`] as a whole percentage, for display.
    pub fn percent(self) -> u32 {
        (self.fraction() * 100.0).round() as u32
    }

    /// Number of workers launched for this phase.
    ///
    /// Integer division gives the floor of `max × fraction` without float
    /// rounding surprises; Peak is the maximum itself.
    pub fn worker_count(self, max_concurrency: usize) -> usize {
        match self {
            Phase::Warmup => max_concurrency / 10,
            Phase::Loading => max_concurrency / 2,
            Phase::Peak => max_concurrency,
            Phase::Cooldown => max_concurrency / 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::Warmup => "Warmup",
            Phase::Loading => "Loading",
            Phase::Peak => "Peak",
            Phase::Cooldown => "Cooldown",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
