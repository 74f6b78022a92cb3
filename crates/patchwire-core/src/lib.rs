//! Patchwire Core - real-time runtime primitives for processing units
//!
//! Every unit in a patchwire signal graph (oscillators, envelopes, analyzers,
//! sensor trackers) shares one hard-real-time block callback. This crate is
//! the contract they share and the handful of primitives that need real
//! concurrency and real-time discipline.
//!
//! # Core Abstractions
//!
//! ## Unit Contract
//!
//! - [`ProcessingUnit`] - Trait every unit implements: prepare, process, live values, state
//! - [`UnitDescriptor`] - Fixed bus shapes, parameters, and routing of a unit
//! - [`BusSet`] / [`BusLayout`] / [`ChannelRole`] - Fixed-length channel groups with roles
//! - [`AudioBlock`] / [`ProcessContext`] - Block storage and the per-invocation view
//!
//! ## Modulation
//!
//! - [`ModulationRouter`] - Maps [`ParamTarget`]s to input channels
//! - [`modulate`] - Relative/absolute blend of base value and CV
//! - [`ParamBank`] - Per-unit parameter state with [`LiveValues`] publishing
//!
//! ## Cross-Thread
//!
//! - [`ring::channel`] - Bounded SPSC handoff with split-range two-phase access
//! - [`SnapshotSwap`] - Versioned replace-not-mutate state with deferred reclamation
//! - [`Worker`] - Cooperative background thread with bounded join
//!
//! ## Position
//!
//! - [`TimeAuthority`] - External CV > manual override > free-running arbitration
//! - [`Transport`] / [`NoteDivision`] - Tempo broadcast and sync helpers
//!
//! # Example
//!
//! ```rust
//! use patchwire_core::{
//!     BusLayout, BusSet, ChannelRole, ModulationPolicy, ParamDescriptor, ParamId,
//!     RouterBuilder, modulate,
//! };
//!
//! let inputs = BusSet::new(vec![
//!     BusLayout::new("main", [ChannelRole::Gate, ChannelRole::ControlVoltage]),
//! ])?;
//! let attack = ParamDescriptor::time_seconds("Attack", "Atk", 0.001, 5.0, 0.01)
//!     .with_id(ParamId(1), "attack");
//!
//! let mut routes = RouterBuilder::new(&inputs);
//! routes.bind_param("attack", attack.id, 0, 1)?;
//! let router = routes.build();
//! assert_eq!(router.iter().count(), 1);
//!
//! let effective = modulate(0.01, Some(0.75), ModulationPolicy::Relative, &attack);
//! assert!((effective - 0.014142).abs() < 1e-5);
//! # Ok::<(), patchwire_core::Error>(())
//! ```
//!
//! # Design Principles
//!
//! - **Real-time safe**: `process` paths never block, lock, allocate, or log
//! - **Fail at construction**: configuration errors are `Result`s before the first block
//! - **Defaults, not panics**: out-of-range access on the block path reads silence

pub mod authority;
pub mod bank;
pub mod block;
pub mod bus;
pub mod error;
pub mod host;
pub mod live;
pub mod modulation;
pub mod param_info;
pub mod property;
pub mod ring;
pub mod router;
pub mod snapshot;
pub mod transport;
pub mod unit;
pub mod worker;

// Re-export main types at crate root
pub use authority::{ManualGesture, PositionAuthority, TimeAuthority};
pub use bank::{ParamBank, StagedBases};
pub use block::{AudioBlock, ProcessContext};
pub use bus::{
    BusLayout, BusSet, ChannelAddress, ChannelRole, ChannelSpec, MAX_BUS_CHANNELS, Polarity,
    normalize_cv,
};
pub use error::{Error, Result};
pub use host::BlockRunner;
pub use live::LiveValues;
pub use modulation::{CV_CENTER, ModulatedParam, ModulationPolicy, clamp01, lerp, modulate};
pub use param_info::{
    DEFAULT_RATE_SPAN_OCTAVES, DEFAULT_TIME_SPAN_OCTAVES, ModulationKind, ParamDescriptor, ParamId,
    ParamScale, ParamUnit,
};
pub use property::{PropertyBag, PropertyValue};
pub use ring::{Consumer, Producer, ReadGrant, WriteGrant};
pub use router::{
    ConnectionSet, Connectivity, ModulationRouter, ParamTarget, ParameterBinding, RouterBuilder,
    VirtualId,
};
pub use snapshot::{Snapshot, SnapshotSwap};
pub use transport::{NoteDivision, Transport, TransportClock};
pub use unit::{ProcessingUnit, UnitDescriptor};
pub use worker::{Worker, WorkerConfig, WorkerStatus, WorkerTask};
