//! Fault Notification Generator (802.1Q 20.37)
//!
//! The transitional FNG_REPORT_DEFECT state is never stored: reporting a
//! defect moves straight to FNG_DEFECT_REPORTED and asks the caller to raise
//! the fault alarm in the same step.

use cfm_core::{FngState, MepDefect};

/// What to do with the FNGwhile timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FngTimer {
    Keep,
    Start(u64),
    Stop,
}

/// Change to the externally visible fault alarm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultAlarm {
    Raise(MepDefect),
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FngStep {
    pub timer: FngTimer,
    pub alarm: Option<FaultAlarm>,
}

impl FngStep {
    const NONE: FngStep = FngStep {
        timer: FngTimer::Keep,
        alarm: None,
    };
}

/// Alarm delays, fngAlarmTime and fngResetTime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FngTimes {
    pub present_ms: u64,
    pub absent_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fng {
    state: FngState,
    highest_defect: MepDefect,
}

impl Default for Fng {
    fn default() -> Self {
        Self {
            state: FngState::Reset,
            highest_defect: MepDefect::None,
        }
    }
}

impl Fng {
    pub fn state(&self) -> FngState {
        self.state
    }

    /// Defect being timed (FNG_DEFECT) or last reported
    pub fn highest_defect(&self) -> MepDefect {
        self.highest_defect
    }

    /// Run the machine after a defect recomputation
    pub fn update(
        &mut self,
        ma_defect_indication: bool,
        new_highest: MepDefect,
        times: FngTimes,
    ) -> FngStep {
        match self.state {
            FngState::Reset => {
                if !ma_defect_indication {
                    return FngStep::NONE;
                }
                self.highest_defect = new_highest;
                self.state = FngState::Defect;
                FngStep {
                    timer: FngTimer::Start(times.present_ms),
                    alarm: None,
                }
            }
            FngState::Defect => {
                if ma_defect_indication {
                    // Not reported yet, so simply track the current value
                    self.highest_defect = new_highest;
                    return FngStep::NONE;
                }
                self.state = FngState::Reset;
                self.highest_defect = MepDefect::None;
                FngStep {
                    timer: FngTimer::Stop,
                    alarm: Some(FaultAlarm::Clear),
                }
            }
            FngState::DefectReported => {
                if !ma_defect_indication {
                    self.state = FngState::DefectClearing;
                    return FngStep {
                        timer: FngTimer::Start(times.absent_ms),
                        alarm: None,
                    };
                }
                if new_highest > self.highest_defect {
                    return FngStep {
                        timer: FngTimer::Keep,
                        alarm: Some(self.report(new_highest)),
                    };
                }
                FngStep::NONE
            }
            FngState::DefectClearing => {
                if !ma_defect_indication {
                    return FngStep::NONE;
                }
                let alarm = if new_highest > self.highest_defect {
                    Some(self.report(new_highest))
                } else {
                    self.state = FngState::DefectReported;
                    None
                };
                FngStep {
                    timer: FngTimer::Stop,
                    alarm,
                }
            }
            FngState::ReportDefect => {
                tracing::error!("FNG found in transitional REPORT_DEFECT state");
                self.state = FngState::DefectReported;
                FngStep::NONE
            }
        }
    }

    /// FNGwhile expired
    pub fn timeout(&mut self) -> FngStep {
        match self.state {
            FngState::Defect => FngStep {
                timer: FngTimer::Keep,
                alarm: Some(self.report(self.highest_defect)),
            },
            FngState::DefectClearing => {
                self.state = FngState::Reset;
                self.highest_defect = MepDefect::None;
                FngStep {
                    timer: FngTimer::Keep,
                    alarm: Some(FaultAlarm::Clear),
                }
            }
            state => {
                tracing::error!(state = %state, "FNGwhile expired in unexpected state");
                FngStep::NONE
            }
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn report(&mut self, defect: MepDefect) -> FaultAlarm {
        self.highest_defect = defect;
        self.state = FngState::DefectReported;
        FaultAlarm::Raise(defect)
    }
}
