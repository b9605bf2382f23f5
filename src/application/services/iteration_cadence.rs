//! How many iterations reuse a base model, a character and an overlay set

use std::fmt;

/// What to reselect at the start of an iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CadencePlan {
    pub base_model: bool,
    pub character: bool,
    pub overlays: bool,
}

/// Loop limits drawn at the end of an iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CadenceLimits {
    pub base_model: u64,
    pub character: u64,
    pub overlays: u64,
}

/// Nested counters: overlays cycle fastest, base models slowest
#[derive(Debug, Clone, Default)]
pub struct IterationCadence {
    base_model: u64,
    character: u64,
    overlays: u64,
    limits: CadenceLimits,
}

impl IterationCadence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide what to reselect. A base model change forces a character
    /// change, which forces an overlay change.
    pub fn begin(&mut self) -> CadencePlan {
        let base_model = self.base_model == 0;
        if base_model {
            self.base_model += 1;
            self.character = 0;
        }

        let character = self.character == 0;
        if character {
            self.character += 1;
            self.overlays = 0;
        }

        let overlays = self.overlays == 0;
        if overlays {
            self.overlays += 1;
        }

        CadencePlan {
            base_model,
            character,
            overlays,
        }
    }

    /// Advance the counters, cascading upward past each limit
    pub fn finish(&mut self, limits: CadenceLimits) {
        self.limits = limits;

        self.overlays += 1;
        if self.overlays > limits.overlays {
            self.overlays = 0;
            self.character += 1;
        }
        if self.character > limits.character {
            self.character = 0;
            self.base_model += 1;
        }
        if self.base_model > limits.base_model {
            self.base_model = 0;
        }
    }

    /// Forget the current cycle so the next iteration reselects everything
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Display for IterationCadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}, {}/{}, {}/{}",
            self.base_model,
            self.limits.base_model,
            self.character,
            self.limits.character,
            self.overlays,
            self.limits.overlays
        )
    }
}
