//! Position arbitration between external CV, manual override, and free-running.
//!
//! A scanning unit (a curve player, a sequencer playhead, a wavetable
//! position) has one notion of "where am I". Three sources compete for it and
//! are tested in fixed order on every evaluation:
//!
//! 1. [`ExternalCv`](PositionAuthority::ExternalCv) when the position input is
//!    connected. Always wins.
//! 2. [`ManualOverride`](PositionAuthority::ManualOverride) while a user
//!    gesture is latched between [`ManualGesture::Begin`] and [`ManualGesture::End`].
//! 3. [`FreeRunning`](PositionAuthority::FreeRunning) otherwise.
//!
//! The free-running position keeps advancing while either of the others is
//! in control, so handing control back resumes from where autonomous motion
//! would be by now. There is no hysteresis.
//!
//! # Example
//!
//! ```rust
//! use patchwire_core::{ManualGesture, PositionAuthority, TimeAuthority};
//!
//! // One cycle per second at 100 Hz control rate.
//! let mut auth = TimeAuthority::new(100.0, 1.0);
//!
//! auth.apply(ManualGesture::Begin);
//! auth.apply(ManualGesture::Set(0.25));
//! assert_eq!(auth.advance(10, None), 0.25);
//! assert_eq!(auth.authority(), PositionAuthority::ManualOverride);
//!
//! // CV beats the held gesture.
//! assert_eq!(auth.advance(10, Some(0.8)), 0.8_f32 as f64);
//!
//! auth.apply(ManualGesture::End);
//! let p = auth.advance(10, None);
//! assert!((p - 0.3).abs() < 1e-9); // free-running kept going underneath
//! ```

use serde::{Deserialize, Serialize};

use crate::transport::{NoteDivision, Transport};

/// Which source determined the last resolved position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionAuthority {
    /// Position input connected.
    ExternalCv,
    /// User is actively setting the position.
    ManualOverride,
    /// Autonomous increment.
    #[default]
    FreeRunning,
}

/// Event from an interactive collaborator.
///
/// Sent through a [`ring`](crate::ring) channel and applied at block start.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ManualGesture {
    /// User grabbed the position control.
    Begin,
    /// New manual position.
    Set(f32),
    /// User released the control.
    #[default]
    End,
}

/// Priority-ordered position resolver.
#[derive(Debug, Clone)]
pub struct TimeAuthority {
    sample_rate: f64,
    /// Period cycles per second.
    rate: f64,
    /// `None` means positions are unbounded and never wrap.
    period: Option<f64>,
    min: f64,
    max: f64,
    free: f64,
    manual_active: bool,
    manual_value: f64,
    position: f64,
    authority: PositionAuthority,
}

impl TimeAuthority {
    /// Creates a resolver wrapping at 1.0, with `rate` periods per second.
    pub fn new(sample_rate: f32, rate: f64) -> Self {
        Self {
            sample_rate: f64::from(sample_rate.max(1.0)),
            rate,
            period: Some(1.0),
            min: 0.0,
            max: 1.0,
            free: 0.0,
            manual_active: false,
            manual_value: 0.0,
            position: 0.0,
            authority: PositionAuthority::FreeRunning,
        }
    }

    /// Sets the wrap period. `None` makes the position unbounded.
    ///
    /// The CV clamp range follows the period: `[0, period)`, or unclamped for
    /// unbounded positions, unless overridden with [`with_range`](Self::with_range).
    /// A full-scale CV lands just below the period rather than on it.
    pub fn with_period(mut self, period: Option<f64>) -> Self {
        self.period = period.filter(|p| p.is_finite() && *p > 0.0);
        match self.period {
            Some(p) => {
                self.min = 0.0;
                self.max = p;
            }
            None => {
                self.min = f64::NEG_INFINITY;
                self.max = f64::INFINITY;
            }
        }
        self
    }

    /// Sets the valid range used to clamp CV and manual positions.
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        if min <= max {
            self.min = min;
            self.max = max;
        }
        self
    }

    /// Updates the sample rate from `prepare`.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = f64::from(sample_rate.max(1.0));
    }

    /// Sets the free-running rate in periods per second.
    pub fn set_rate(&mut self, rate: f64) {
        if rate.is_finite() {
            self.rate = rate;
        }
    }

    /// Free-running rate in periods per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Position advance per sample.
    #[inline]
    pub fn increment(&self) -> f64 {
        self.rate * self.period.unwrap_or(1.0) / self.sample_rate
    }

    /// Locks the rate to one period per `division` at the transport tempo.
    pub fn sync_rate(&mut self, division: NoteDivision, transport: &Transport) {
        self.set_rate(division.to_hz(transport.tempo_bpm));
    }

    /// Moves the free-running position to the transport's phase within `division`.
    pub fn align_to(&mut self, division: NoteDivision, transport: &Transport) {
        self.free = transport.division_phase(division) * self.period.unwrap_or(1.0);
    }

    /// Sets the free-running position directly.
    pub fn set_free_position(&mut self, position: f64) {
        self.free = self.wrap(position);
    }

    /// Free-running position, whatever the active authority.
    pub fn free_position(&self) -> f64 {
        self.free
    }

    /// Last resolved position.
    #[inline]
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Source of the last resolved position.
    #[inline]
    pub fn authority(&self) -> PositionAuthority {
        self.authority
    }

    /// Whether a manual gesture is latched.
    pub fn is_manual_active(&self) -> bool {
        self.manual_active
    }

    /// Latches manual control.
    pub fn begin_manual(&mut self) {
        self.manual_active = true;
    }

    /// Updates the manual position. Has effect only while latched.
    pub fn set_manual(&mut self, position: f64) {
        if position.is_finite() {
            self.manual_value = position;
        }
    }

    /// Releases manual control.
    pub fn end_manual(&mut self) {
        self.manual_active = false;
    }

    /// Applies one gesture event.
    pub fn apply(&mut self, gesture: ManualGesture) {
        match gesture {
            ManualGesture::Begin => self.begin_manual(),
            ManualGesture::Set(value) => self.set_manual(f64::from(value)),
            ManualGesture::End => self.end_manual(),
        }
    }

    /// Returns to position zero and releases manual control.
    pub fn reset(&mut self) {
        self.free = 0.0;
        self.manual_active = false;
        self.manual_value = 0.0;
        self.position = 0.0;
        self.authority = PositionAuthority::FreeRunning;
    }

    #[inline]
    fn wrap(&self, position: f64) -> f64 {
        match self.period {
            Some(period) => {
                let wrapped = position.rem_euclid(period);
                // rem_euclid rounds tiny negatives up to exactly `period`
                if wrapped >= period { 0.0 } else { wrapped }
            }
            None => position,
        }
    }

    /// Clamps to the valid range, staying strictly below a finite period.
    #[inline]
    fn clamp(&self, position: f64) -> f64 {
        let clamped = if position.is_nan() {
            self.min.max(0.0).min(self.max)
        } else {
            position.clamp(self.min, self.max)
        };
        match self.period {
            Some(period) if clamped >= period => period * (1.0 - f64::EPSILON),
            _ => clamped,
        }
    }

    /// Selects the authority and position without moving the free-running position.
    ///
    /// `cv` is the position input's sample, or `None` when it is unconnected.
    #[inline]
    pub fn resolve(&mut self, cv: Option<f32>) -> f64 {
        let (authority, position) = match cv {
            Some(cv) => (PositionAuthority::ExternalCv, self.clamp(f64::from(cv))),
            None if self.manual_active => {
                (PositionAuthority::ManualOverride, self.clamp(self.manual_value))
            }
            None => (PositionAuthority::FreeRunning, self.free),
        };
        self.authority = authority;
        self.position = position;
        position
    }

    /// Advances the free-running position by `frames` samples, then resolves.
    ///
    /// Call once per block for block-rate handoff.
    #[inline]
    pub fn advance(&mut self, frames: usize, cv: Option<f32>) -> f64 {
        self.free = self.wrap(self.free + self.increment() * frames as f64);
        self.resolve(cv)
    }

    /// Resolves for the current sample, then advances by one.
    ///
    /// Call per sample for sample-accurate handoff.
    #[inline]
    pub fn tick(&mut self, cv: Option<f32>) -> f64 {
        let position = self.resolve(cv);
        self.free = self.wrap(self.free + self.increment());
        position
    }
}
