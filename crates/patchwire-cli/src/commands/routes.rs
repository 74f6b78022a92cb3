//! Routing table command.

#![allow(clippy::print_literal)] // Table headers use literal strings intentionally

use super::common::{policy_label, polarity_label, resolve_declaration};
use clap::Args;
use patchwire_core::ParamTarget;

#[derive(Args)]
pub struct RoutesArgs {
    /// Declaration file, name under the user units directory, or unit kind
    unit: String,
}

pub fn run(args: RoutesArgs) -> anyhow::Result<()> {
    let decl = resolve_declaration(&args.unit)?;
    let (kind, desc) = decl.descriptor()?;

    println!("{} ({kind})", desc.name());
    println!();
    println!("Inputs:");
    for (index, bus) in desc.inputs().iter().enumerate() {
        let channels: Vec<_> = bus.channels().map(|spec| spec.role.as_str()).collect();
        println!("  [{index}] {:10} {}", bus.name(), channels.join(", "));
    }
    println!();
    println!("Routes:");
    println!();
    println!(
        "  {:10}  {:8}  {:12}  {:>4}  {:10}  {}",
        "Target", "Kind", "Bus", "Abs", "Polarity", "Policy"
    );
    println!(
        "  {:10}  {:8}  {:12}  {:>4}  {:10}  {}",
        "------", "----", "---", "---", "--------", "------"
    );

    let params = desc.params();
    for binding in desc.router().iter() {
        let (target, policy) = match binding.target {
            ParamTarget::Real(id) => {
                let default = params.iter().find(|p| p.id == id).map(|p| p.policy);
                ("param", binding.policy.or(default))
            }
            ParamTarget::Virtual(_) => ("virtual", binding.policy),
        };
        let bus = desc
            .inputs()
            .bus(binding.address.bus)
            .map_or("?", |b| b.name());
        println!(
            "  {:10}  {:8}  {:12}  {:>4}  {:10}  {}",
            binding.name,
            target,
            format!("{bus}:{}", binding.address.channel),
            binding.address.absolute,
            polarity_label(binding.polarity),
            policy.map_or("-", policy_label)
        );
    }

    let unbound: Vec<_> = params
        .iter()
        .filter(|p| desc.router().binding(ParamTarget::Real(p.id)).is_none())
        .map(|p| p.string_id)
        .collect();
    if !unbound.is_empty() {
        println!();
        println!("Unrouted parameters: {}", unbound.join(", "));
    }
    Ok(())
}
