//! Shared helpers for commands.

use anyhow::{Context, anyhow};
use patchwire_config::{UnitDeclaration, find_declaration, user_units_dir};
use patchwire_core::{ModulationPolicy, Polarity};
use patchwire_units::UnitKind;

/// Resolves a declaration argument.
///
/// A file path or a name under the user units directory wins; a bare unit
/// kind name falls back to that kind's default declaration.
pub fn resolve_declaration(unit: &str) -> anyhow::Result<UnitDeclaration> {
    if let Some(path) = find_declaration(unit) {
        tracing::debug!(path = %path.display(), "using declaration file");
        return UnitDeclaration::load(&path)
            .with_context(|| format!("failed to load '{}'", path.display()));
    }
    if let Some(kind) = UnitKind::from_name(unit) {
        tracing::debug!(%kind, "using default declaration");
        return Ok(UnitDeclaration::default_for(kind)?);
    }
    Err(anyhow!(
        "no declaration '{}' (not a file, not in {}, not a unit kind)",
        unit,
        user_units_dir().display()
    ))
}

/// Parses a constant input: `CHANNEL=VALUE`.
pub fn parse_cv(s: &str) -> Result<(usize, f32), String> {
    let (channel, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid input '{s}', expected CHANNEL=VALUE"))?;
    let channel = channel
        .trim()
        .parse()
        .map_err(|_| format!("invalid channel '{channel}'"))?;
    let value: f32 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid value '{value}'"))?;
    if !value.is_finite() {
        return Err(format!("value '{value}' is not finite"));
    }
    Ok((channel, value))
}

pub fn polarity_label(polarity: Polarity) -> &'static str {
    match polarity {
        Polarity::Unipolar => "unipolar",
        Polarity::Bipolar => "bipolar",
    }
}

pub fn policy_label(policy: ModulationPolicy) -> &'static str {
    match policy {
        ModulationPolicy::Relative => "relative",
        ModulationPolicy::Absolute => "absolute",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cv_pairs_parse() {
        assert_eq!(parse_cv("1=0.5"), Ok((1, 0.5)));
        assert_eq!(parse_cv(" 3 = -1 "), Ok((3, -1.0)));
        assert!(parse_cv("1").is_err());
        assert!(parse_cv("x=1").is_err());
        assert!(parse_cv("1=inf").is_err());
    }

    #[test]
    fn kind_name_falls_back_to_default() {
        let decl = resolve_declaration("scanner").unwrap();
        assert_eq!(decl.kind_name(), "scanner");
        assert!(resolve_declaration("no_such_unit_98765").is_err());
    }
}
