use serde::{Deserialize, Serialize};

/// Configuration for dynamic loss scaling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossScaleConfig {
    /// Initial loss scale factor.
    pub init_scale: f32,
    /// Multiply the scale by this after `growth_interval` clean updates.
    pub growth_factor: f32,
    /// Divide the scale by this on overflow.
    pub backoff_factor: f32,
    pub growth_interval: u64,
}

impl Default for LossScaleConfig {
    fn default() -> Self {
        Self {
            init_scale: 65536.,
            growth_factor: 2.,
            backoff_factor: 2.,
            growth_interval: 2000,
        }
    }
}

/// The persisted part of a `LossScaler`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalerState {
    pub scale: f32,
    pub growth_tracker: u64,
}

/// A dynamic loss scale for one loss term.
///
/// The scale backs off whenever a gradient overflowed during an accumulation window
/// and grows after `growth_interval` consecutive windows without overflow.
#[derive(Debug, Clone)]
pub struct LossScaler {
    config: LossScaleConfig,
    scale: f32,
    growth_tracker: u64,
    used: bool,
    overflowed: bool,
}

impl LossScaler {
    /// Creates a new `LossScaler` at the configured initial scale.
    pub fn new(config: LossScaleConfig) -> Self {
        Self {
            config,
            scale: config.init_scale,
            growth_tracker: 0,
            used: false,
            overflowed: false,
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Multiplies `loss` by the current scale.
    pub fn scale_loss(&mut self, loss: f32) -> f32 {
        self.used = true;
        loss * self.scale
    }

    /// Flags the current window as overflowed.
    pub fn record_overflow(&mut self) {
        self.overflowed = true;
    }

    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// Closes the current accumulation window, adjusting the scale.
    ///
    /// # Arguments
    /// * `applied` - Whether the optimizer update of this window was applied.
    pub fn end_window(&mut self, applied: bool) {
        if self.overflowed {
            self.scale = (self.scale / self.config.backoff_factor).max(1.);
            self.growth_tracker = 0;
        } else if self.used && applied {
            self.growth_tracker += 1;

            if self.growth_tracker >= self.config.growth_interval {
                self.scale *= self.config.growth_factor;
                self.growth_tracker = 0;
            }
        }

        self.reset_window();
    }

    /// Forgets the flags of the current window without touching the scale.
    pub fn reset_window(&mut self) {
        self.used = false;
        self.overflowed = false;
    }

    pub fn state(&self) -> ScalerState {
        ScalerState {
            scale: self.scale,
            growth_tracker: self.growth_tracker,
        }
    }

    pub fn load_state(&mut self, state: ScalerState) {
        self.scale = state.scale;
        self.growth_tracker = state.growth_tracker;
        self.reset_window();
    }
}
