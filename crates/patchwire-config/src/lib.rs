//! Unit declarations and persisted state for patchwire.
//!
//! A unit declaration is a TOML file naming a unit kind, its input and output
//! buses, the CV routing of its parameters and virtual targets, and optional
//! initial values. Loading one validates every name it contains and builds
//! the core [`UnitDescriptor`](patchwire_core::UnitDescriptor), so a bad file
//! fails at construction time and never reaches the block loop.
//!
//! # Example
//!
//! ```rust
//! use patchwire_config::UnitDeclaration;
//! use patchwire_units::UnitKind;
//!
//! let decl = UnitDeclaration::from_toml(r#"
//!     name = "lead_env"
//!     kind = "envelope"
//!
//!     [[inputs]]
//!     name = "main"
//!     channels = ["gate", "cv"]
//!
//!     [[outputs]]
//!     name = "out"
//!     channels = ["cv"]
//!
//!     [[bindings]]
//!     param = "attack"
//!     bus = 0
//!     channel = 1
//!
//!     [params]
//!     sustain = 0.5
//! "#)?;
//!
//! let (kind, desc) = decl.descriptor()?;
//! assert_eq!(kind, UnitKind::Envelope);
//! assert_eq!(desc.router().len(), 1);
//!
//! let unit = decl.build()?;
//! assert_eq!(unit.save_state().get_f64("sustain"), Some(0.5));
//! # Ok::<(), patchwire_config::ConfigError>(())
//! ```

mod declaration;
mod error;
mod state;

/// Platform-specific paths for declarations and state.
pub mod paths;

/// Declaration validation.
pub mod validation;

pub use declaration::{BindingDeclaration, BusDeclaration, UnitDeclaration};
pub use error::ConfigError;
pub use paths::{
    default_state_path, ensure_user_config_dir, find_declaration, list_declarations,
    user_config_dir, user_units_dir,
};
pub use state::PatchState;
pub use validation::{ValidationError, ValidationResult, validate_declaration};
