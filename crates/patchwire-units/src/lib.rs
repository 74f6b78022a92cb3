//! Patchwire Units - reference processing units
//!
//! Small units built only from the `patchwire-core` contract, each one
//! leaning on a different part of the runtime:
//!
//! - [`EnvelopeUnit`] - ADSR contour with routable stage times (relative
//!   multiplicative and additive modulation, live values)
//! - [`CurveScanner`] - playhead over a published [`Curve`] (position
//!   authority, manual gestures through a ring, snapshot swaps, tempo sync)
//! - [`SensorFollower`] - smoothed external reading (worker thread, ring
//!   handoff with last-good-value fallback, telemetry)
//!
//! [`UnitKind`] looks units up by their configuration name.
//!
//! # Example
//!
//! ```rust
//! use patchwire_core::{BlockRunner, PositionAuthority};
//! use patchwire_units::CurveScanner;
//!
//! let mut scanner = CurveScanner::new()?;
//! let mut editor = scanner.take_editor().unwrap();
//! let mut runner = BlockRunner::new(&mut scanner, 48000.0, 128);
//!
//! editor.begin_drag();
//! editor.drag_to(0.5);
//! runner.run(&mut scanner, 128);
//! assert_eq!(scanner.authority(), PositionAuthority::ManualOverride);
//! assert_eq!(runner.outputs().channel(0)[0], 0.5);
//! # Ok::<(), patchwire_core::Error>(())
//! ```

pub mod curve;
pub mod envelope;
pub mod follower;
pub mod registry;
pub mod scanner;

pub use curve::{Curve, CurvePoint};
pub use envelope::{EnvelopeUnit, Stage};
pub use follower::{ScriptedSensor, SensorError, SensorFollower, SensorSource, SineSensor};
pub use registry::UnitKind;
pub use scanner::{CurveScanner, ScannerEditor, parse_division};
