use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Runner { Terraform, Tofu }

pub fn pick_runner(prefer: Option<Runner>) -> Result<Runner> {
    if let Some(p) = prefer { return Ok(p); }
    if which::which("tofu").is_ok() { Ok(Runner::Tofu) }
    else if which::which("terraform").is_ok() { Ok(Runner::Terraform) }
    else { anyhow::bail!("Neither 'tofu' nor 'terraform' found in PATH") }
}

pub fn bin(r: Runner) -> &'static str { match r { Runner::Terraform => "terraform", Runner::Tofu => "tofu" } }

fn chdir(dir: &Path) -> Result<String> {
    let d = dir.to_str().with_context(|| format!("working directory is not valid UTF-8: {}", dir.display()))?;
    Ok(format!("-chdir={d}"))
}

/// Arguments for `import`, which binds an existing remote object to `address`.
pub fn import_args(dir: &Path, address: &str, import_id: &str) -> Result<Vec<String>> {
    Ok(vec![chdir(dir)?, "import".into(), "-input=false".into(), address.into(), import_id.into()])
}

pub fn run_init(r: Runner, dir: &Path) -> Result<()> {
    tracing::info!(runner = bin(r), dir = %dir.display(), "init");
    let st = Command::new(bin(r)).args([chdir(dir)?, "init".into(), "-input=false".into()]).status()
        .context("spawn init")?;
    if !st.success() { anyhow::bail!("init failed") } ; Ok(())
}

pub fn run_import(r: Runner, dir: &Path, address: &str, import_id: &str) -> Result<()> {
    tracing::info!(runner = bin(r), %address, %import_id, "import");
    let st = Command::new(bin(r)).args(import_args(dir, address, import_id)?).status()
        .with_context(|| format!("spawn import {address}"))?;
    if !st.success() { anyhow::bail!("import of {address} failed") } ; Ok(())
}
