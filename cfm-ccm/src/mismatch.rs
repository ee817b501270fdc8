//! Cross-connect (802.1Q 20.24) and remote MEP error (20.22) machines
//!
//! Both machines have the same shape: a defect raised as soon as an offending
//! CCM shows up, and a decay timer that clears it. The timer is armed on the
//! first non-offending CCM after the defect was raised and cancelled by a new
//! offending one, so hardware sources that only report changes behave the
//! same as software that sees every frame.

/// What the caller must do with the machine's decay timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecayTimer {
    Keep,
    Arm,
    Cancel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MismatchMachine {
    defect: bool,
    decaying: bool,
}

impl MismatchMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn defect(&self) -> bool {
        self.defect
    }

    /// Whether the decay timer should be running
    pub fn decaying(&self) -> bool {
        self.decaying
    }

    /// Feed one CCM classification
    ///
    /// Returns whether the defect changed and what to do with the timer.
    pub fn update(&mut self, received: bool) -> (bool, DecayTimer) {
        match (received, self.defect, self.decaying) {
            (true, false, _) => {
                self.defect = true;
                self.decaying = false;
                (true, DecayTimer::Cancel)
            }
            (true, true, true) => {
                self.decaying = false;
                (false, DecayTimer::Cancel)
            }
            (false, true, false) => {
                self.decaying = true;
                (false, DecayTimer::Arm)
            }
            _ => (false, DecayTimer::Keep),
        }
    }

    /// Decay timer fired. Returns whether the defect changed.
    pub fn expire(&mut self) -> bool {
        let changed = self.defect;
        self.defect = false;
        self.decaying = false;
        changed
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
