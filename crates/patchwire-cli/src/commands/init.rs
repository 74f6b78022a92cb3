//! Default declaration writer.

use clap::Args;
use patchwire_config::{UnitDeclaration, user_units_dir};
use patchwire_units::UnitKind;
use std::path::PathBuf;

#[derive(Args)]
pub struct InitArgs {
    /// Unit kind (envelope, scanner, follower)
    kind: String,

    /// Unit name (defaults to the kind)
    #[arg(short, long)]
    name: Option<String>,

    /// Output file (defaults to <user units dir>/<name>.toml)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
}

pub fn run(args: InitArgs) -> anyhow::Result<()> {
    let kind = UnitKind::from_name(&args.kind)
        .ok_or_else(|| anyhow::anyhow!("Unknown unit kind: {}", args.kind))?;

    let mut decl = UnitDeclaration::default_for(kind)?;
    if let Some(name) = args.name {
        decl.name = name;
    }

    let path = args
        .output
        .unwrap_or_else(|| user_units_dir().join(format!("{}.toml", decl.name)));
    if path.exists() && !args.force {
        anyhow::bail!(
            "'{}' already exists. Use --force to overwrite.",
            path.display()
        );
    }

    decl.save(&path)?;
    tracing::info!(unit = %decl.name, %kind, path = %path.display(), "declaration written");
    println!("{}", path.display());
    Ok(())
}
