//! Declaration and state files on disk.

use patchwire_config::{
    BindingDeclaration, BusDeclaration, ConfigError, PatchState, UnitDeclaration, ValidationError,
};
use patchwire_core::{BlockRunner, ModulationPolicy, ParamTarget, Polarity, ProcessingUnit};
use patchwire_units::UnitKind;
use std::fs;
use tempfile::TempDir;

const SCANNER: &str = r#"
name = "sweep"
kind = "scanner"
sample_rate = 1000
max_block_size = 32

[[inputs]]
name = "mod"
channels = ["cv/bipolar", "cv"]

[[outputs]]
name = "out"
channels = ["cv", "cv"]

[[bindings]]
param = "position"
bus = 0
channel = 0

[[bindings]]
param = "rate"
bus = 0
channel = 1
policy = "absolute"

[params]
rate = 2.0
"#;

#[test]
fn declaration_loads_and_builds_from_disk() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("sweep.toml");
    fs::write(&path, SCANNER).unwrap();

    let decl = UnitDeclaration::load(&path).unwrap();
    assert_eq!(decl.sample_rate, 1000);
    assert_eq!(decl.max_block_size, 32);

    let (kind, desc) = decl.descriptor().unwrap();
    assert_eq!(kind, UnitKind::Scanner);
    let position = desc.router().iter().find(|b| b.name == "position").unwrap();
    assert!(matches!(position.target, ParamTarget::Virtual(_)));
    assert_eq!(position.polarity, Polarity::Bipolar);
    let rate = desc.router().iter().find(|b| b.name == "rate").unwrap();
    assert_eq!(rate.policy, Some(ModulationPolicy::Absolute));

    let mut unit = decl.build().unwrap();
    assert_eq!(unit.save_state().get_f64("rate"), Some(2.0));
    let mut runner = BlockRunner::new(unit.as_mut(), 1000.0, decl.max_block_size);
    assert_eq!(runner.run(unit.as_mut(), 32), 32);
}

#[test]
fn save_creates_parent_directories() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("units").join("env.toml");

    let decl = UnitDeclaration::default_for(UnitKind::Envelope)
        .unwrap()
        .with_param("release", 0.8);
    decl.save(&path).unwrap();
    assert!(path.exists());

    let loaded = UnitDeclaration::load(&path).unwrap();
    assert_eq!(loaded, decl);
}

#[test]
fn every_default_declaration_builds() {
    for kind in UnitKind::ALL {
        let decl = UnitDeclaration::default_for(kind).unwrap();
        let text = decl.to_toml().unwrap();
        let unit = UnitDeclaration::from_toml(&text).unwrap().build().unwrap();
        assert_eq!(unit.descriptor().name(), kind.name());
    }
}

#[test]
fn unknown_kind_is_reported() {
    let decl = UnitDeclaration::from_toml("name = \"reverb\"").unwrap();
    assert!(matches!(
        decl.descriptor(),
        Err(ConfigError::Validation(ValidationError::UnknownKind(ref k))) if k == "reverb"
    ));
}

#[test]
fn unknown_binding_target_is_reported() {
    let decl = UnitDeclaration::new("env", UnitKind::Envelope)
        .with_input(BusDeclaration::new("main", ["gate", "cv"]))
        .with_binding(BindingDeclaration::new("position", 0, 1));
    let err = decl.build().err().unwrap();
    assert_eq!(
        err.to_string(),
        "validation failed: unknown parameter 'position' for unit kind 'envelope'"
    );
}

#[test]
fn oversized_bus_is_rejected() {
    let channels = vec!["cv"; patchwire_core::MAX_BUS_CHANNELS + 1];
    let decl = UnitDeclaration::new("env", UnitKind::Envelope)
        .with_input(BusDeclaration::new("wide", channels));
    assert!(matches!(
        decl.descriptor(),
        Err(ConfigError::Unit {
            source: patchwire_core::Error::TooManyChannels { .. },
            ..
        })
    ));
}

#[test]
fn malformed_toml_is_a_parse_error() {
    assert!(matches!(
        UnitDeclaration::from_toml("name = "),
        Err(ConfigError::TomlParse(_))
    ));
}

#[test]
fn missing_file_is_a_read_error() {
    let temp_dir = TempDir::new().unwrap();
    let err = UnitDeclaration::load(temp_dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::ReadFile { .. }));
}

#[test]
fn patch_state_round_trips_through_disk() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state").join("patch.toml");
    assert!(PatchState::load_or_default(&path).unwrap().is_empty());

    let mut scanner = UnitKind::Scanner.build_default().unwrap();
    scanner
        .load_state(&patchwire_core::PropertyBag::new().with("sync", "eighth"))
        .unwrap();
    let mut follower = UnitKind::Follower.build_default().unwrap();
    follower
        .load_state(&patchwire_core::PropertyBag::new().with("gain", 3.0_f64))
        .unwrap();

    let mut state = PatchState::new();
    state.capture("sweep", scanner.as_ref());
    state.capture("follow", follower.as_ref());
    state.save(&path).unwrap();

    let loaded = PatchState::load_or_default(&path).unwrap();
    assert_eq!(loaded, state);
    let names: Vec<_> = loaded.iter().map(|(name, _)| name).collect();
    assert_eq!(names, ["follow", "sweep"]);

    let mut fresh: Box<dyn ProcessingUnit> = UnitKind::Scanner.build_default().unwrap();
    assert!(loaded.restore("sweep", fresh.as_mut()).unwrap());
    assert_eq!(fresh.save_state(), scanner.save_state());
}
