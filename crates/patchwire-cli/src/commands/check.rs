//! Declaration validation command.

use super::common::resolve_declaration;
use clap::Args;
use patchwire_config::{ConfigError, ValidationError};

#[derive(Args)]
pub struct CheckArgs {
    /// Declaration file, name under the user units directory, or unit kind
    unit: String,
}

pub fn run(args: CheckArgs) -> anyhow::Result<()> {
    let decl = resolve_declaration(&args.unit)?;

    let (kind, desc) = match decl.descriptor() {
        Ok(checked) => checked,
        Err(ConfigError::Validation(ValidationError::Multiple(errors))) => {
            for error in &errors {
                eprintln!("  - {error}");
            }
            anyhow::bail!("{} problems in '{}'", errors.len(), decl.name);
        }
        Err(e) => return Err(e.into()),
    };

    println!("{}: ok", decl.name);
    println!("  kind:        {kind}");
    println!(
        "  inputs:      {} buses, {} channels",
        desc.inputs().len(),
        desc.inputs().total_channels()
    );
    println!(
        "  outputs:     {} buses, {} channels",
        desc.outputs().len(),
        desc.outputs().total_channels()
    );
    println!("  bindings:    {}", desc.router().len());
    println!("  sample rate: {} Hz", decl.sample_rate);
    println!("  block size:  {}", decl.max_block_size);

    // builds the unit too, so bad initial values are caught here rather than at render
    decl.build()?;
    Ok(())
}
