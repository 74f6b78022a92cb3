//! Unit kind listing command.

#![allow(clippy::print_literal)] // Table headers use literal strings intentionally

use super::common::policy_label;
use clap::Args;
use patchwire_units::UnitKind;

#[derive(Args)]
pub struct UnitsArgs {
    /// Show parameters of a specific unit kind
    #[arg(value_name = "KIND")]
    kind: Option<String>,
}

pub fn run(args: UnitsArgs) -> anyhow::Result<()> {
    let Some(name) = &args.kind else {
        println!("Unit Kinds");
        println!("==========");
        println!();
        for kind in UnitKind::ALL {
            println!("  {:10} - {}", kind.name(), kind.description());
        }
        println!();
        println!("Use 'patchwire units <kind>' for parameters and routable targets.");
        return Ok(());
    };

    let kind = UnitKind::from_name(name)
        .ok_or_else(|| anyhow::anyhow!("Unknown unit kind: {}", name))?;

    println!("{}", kind.name());
    println!("{}", "=".repeat(kind.name().len()));
    println!();
    println!("{}", kind.description());
    println!();
    println!("Parameters:");
    println!();
    println!(
        "  {:10}  {:>4}  {:>18}  {:>12}  {}",
        "Name", "Id", "Range", "Default", "Policy"
    );
    println!(
        "  {:10}  {:>4}  {:>18}  {:>12}  {}",
        "----", "--", "-----", "-------", "------"
    );
    for param in kind.params() {
        let range = format!("{}..{}{}", param.min, param.max, param.unit.suffix());
        println!(
            "  {:10}  {:>4}  {:>18}  {:>12}  {}",
            param.string_id,
            param.id.0,
            range,
            param.format(param.default),
            policy_label(param.policy)
        );
    }

    let virtuals = kind.virtual_targets();
    if !virtuals.is_empty() {
        println!();
        println!("Virtual targets: {}", virtuals.join(", "));
    }

    println!();
    println!("Default declaration:");
    println!();
    let decl = patchwire_config::UnitDeclaration::default_for(kind)?;
    for line in decl.to_toml()?.lines() {
        println!("  {line}");
    }
    Ok(())
}
