//! Implementation of the `kettle compose` command.

use anyhow::{Context, Result};

use kettle_lib::compose::RequirementKind;

use crate::cmd::RunArgs;
use crate::output::{OutputFormat, print_info, print_json, print_stat, symbols};

pub fn cmd_compose(args: &RunArgs, name: &str, output: OutputFormat) -> Result<()> {
  let engine = args.engine()?;
  let composition = engine
    .compose(name)
    .with_context(|| format!("Failed to compose configuration '{}'", name))?;

  if output.is_json() {
    return print_json(&composition);
  }

  print_info(&format!("Composition of {} for {}", composition.root, composition.host));
  for requirement in &composition.requirements {
    let kind = match requirement.kind {
      RequirementKind::Configuration => "configuration",
      RequirementKind::Package => "package",
    };
    println!("  {} {} ({})", symbols::ARROW, requirement.name, kind);
  }
  println!();
  print_stat("Requirements", &composition.requirements.len().to_string());
  print_stat("Packages", &composition.packages().count().to_string());

  Ok(())
}
