use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use serde_json::Value as Json;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use tfimport_core::{ResourceData, ResourceDefinition, State};
use tfimport_merge::AppendSummary;
use tfimport_tfcompat as tfc;

#[derive(Parser, Debug)]
#[command(author, version, about="tfimport: turn imported resources into Terraform/OpenTofu configuration")]
struct Cli {
    /// Log as JSON lines
    #[arg(long, default_value_t=false, global = true)]
    log_json: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, ValueEnum)]
enum Runner { Auto, Terraform, Tofu }

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Render a state file as a complete configuration
    Convert {
        #[arg(long)] state: PathBuf,
        /// Output file (stdout when omitted)
        #[arg(short, long)] out: Option<PathBuf>,
    },
    /// Append definitions that are not declared yet
    Merge {
        /// Definitions file (YAML or JSON)
        #[arg(short, long)] definitions: PathBuf,
        #[arg(short, long, default_value="main.tf")] file: PathBuf,
    },
    /// Declare new definitions, import them and regenerate main.tf from state
    Import {
        #[arg(short, long)] definitions: PathBuf,
        #[arg(long, default_value=".")] dir: PathBuf,
        #[arg(long, value_enum, default_value_t=Runner::Auto)] runner: Runner,
    },
}

#[derive(Deserialize)]
struct DefinitionEntry {
    #[serde(flatten)] def: ResourceDefinition,
    #[serde(default)] data: Option<Json>,
}

fn load_definitions(path: &Path) -> Result<Vec<ResourceDefinition>> {
    let raw = fs::read(path).with_context(|| format!("read definitions {}", path.display()))?;
    let entries: Vec<DefinitionEntry> = serde_yaml::from_slice(&raw)
        .with_context(|| format!("parse definitions {}", path.display()))?;
    let mut defs = Vec::with_capacity(entries.len());
    for DefinitionEntry { mut def, data } in entries {
        if let Some(data) = data.filter(|d| !d.is_null()) {
            let data = ResourceData::from_json_at(&data, &def.address())?;
            tfimport_hcl::render_body(&mut def, &data);
        }
        defs.push(def);
    }
    Ok(defs)
}

fn load_state(path: &Path) -> Result<State> {
    let raw = fs::read(path).with_context(|| format!("read state {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("parse state {}", path.display()))
}

// Temp file in the target directory, then rename over the target.
fn write_replace(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).with_context(|| format!("create temp file in {}", dir.display()))?;
    tmp.write_all(bytes)?;
    tmp.persist(path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

fn convert(state: &Path, out: Option<&Path>) -> Result<()> {
    let resources = load_state(state)?.full_dump_resources()?;
    match out {
        Some(p) => write_replace(p, &tfimport_hcl::render_full_state(&resources))?,
        None => tfimport_hcl::write_full_state(&mut std::io::stdout().lock(), &resources)?,
    }
    tracing::info!(resources = resources.len(), "converted state");
    Ok(())
}

fn merge(definitions: &Path, file: &Path) -> Result<AppendSummary> {
    let candidates = load_definitions(definitions)?;
    let mut f = OpenOptions::new().read(true).append(true).create(true).open(file)
        .with_context(|| format!("open {}", file.display()))?;
    let summary = tfimport_merge::append_new(&mut f, candidates)
        .with_context(|| format!("merge into {}", file.display()))?;
    for p in &summary.providers { tracing::info!(provider = %p, "declared provider"); }
    for d in &summary.resources { tracing::info!(address = %d.address(), "declared resource"); }
    Ok(summary)
}

fn regenerate(dir: &Path) -> Result<()> {
    let resources = load_state(&dir.join("terraform.tfstate"))?.full_dump_resources()?;
    write_replace(&dir.join("main.tf"), &tfimport_hcl::render_full_state(&resources))
}

fn import(definitions: &Path, dir: &Path, runner: Option<tfc::Runner>) -> Result<()> {
    fs::create_dir_all(dir)?;
    let summary = merge(definitions, &dir.join("main.tf"))?;
    if summary.resources.is_empty() {
        tracing::info!("nothing new to import");
        return Ok(());
    }
    let runner = tfc::pick_runner(runner)?;
    tfc::run_init(runner, dir)?;
    for def in &summary.resources {
        match &def.import_id {
            Some(id) => tfc::run_import(runner, dir, &def.address(), id)?,
            None => tracing::warn!(address = %def.address(), "no import id, declared only"),
        }
    }
    regenerate(dir)
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json { fmt.json().init() } else { fmt.init() }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.cmd {
        Cmd::Convert { state, out } => convert(&state, out.as_deref())?,
        Cmd::Merge { definitions, file } => { merge(&definitions, &file)?; },
        Cmd::Import { definitions, dir, runner } => {
            let r = match runner {
                Runner::Terraform => Some(tfc::Runner::Terraform),
                Runner::Tofu      => Some(tfc::Runner::Tofu),
                Runner::Auto      => None
            };
            import(&definitions, &dir, r)?
        },
    }
    Ok(())
}
