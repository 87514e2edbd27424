use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cvabi_descriptor::Validation;
use cvabi_runtime::{DetectionMode, EvaluationSemantic};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod catalog;
mod inspect;
mod layout;
mod literal;

#[derive(Parser, Debug)]
#[command(name = "cvabi")]
#[command(about = "Inspect and build contract-violation descriptor tables.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a descriptor, its data blob and an optional dynamic stream.
    Inspect {
        #[arg(long)]
        descriptor: PathBuf,
        #[arg(long)]
        data: Option<PathBuf>,
        /// Dynamic TLV stream.
        #[arg(long)]
        tlv: Option<PathBuf>,
        #[arg(long, default_value_t = Validation::Hardened)]
        validation: Validation,
        /// Vendor catalog JSON (cvabi.vendor_catalog@0.1.0).
        #[arg(long)]
        vendor_catalog: Option<PathBuf>,
        /// Raw detection mode recorded in the report.
        #[arg(long, default_value_t = 1)]
        detection_mode: u8,
        /// Raw evaluation semantic recorded in the report.
        #[arg(long, default_value_t = 2)]
        semantic: u8,
        /// Emit the JSON report instead of text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Build a descriptor and data blob from a layout manifest.
    Build {
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long)]
        descriptor_out: PathBuf,
        #[arg(long)]
        data_out: PathBuf,
        /// Writes the manifest's dynamic records as a TLV stream.
        #[arg(long)]
        tlv_out: Option<PathBuf>,
    },
    /// Print a field id's range and catalog entry.
    Field {
        id: String,
        #[arg(long)]
        vendor_catalog: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    try_main().map_err(|err| {
        eprintln!("{err:#}");
        err
    })
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Inspect {
            descriptor,
            data,
            tlv,
            validation,
            vendor_catalog,
            detection_mode,
            semantic,
            json,
        } => {
            let descriptor = inspect::read_input(&descriptor, "descriptor")?;
            let data = inspect::read_data(data.as_deref())?;
            let tlv = tlv
                .as_deref()
                .map(|p| inspect::read_input(p, "dynamic stream"))
                .transpose()?;
            let vendors = catalog::load_catalog(vendor_catalog.as_deref())?;
            let report = inspect::inspect(&inspect::InspectInputs {
                descriptor: &descriptor,
                data: data.as_slice(),
                tlv: tlv.as_deref(),
                validation,
                vendors: &vendors,
                detection: DetectionMode::from_raw(detection_mode),
                semantic: EvaluationSemantic::from_raw(semantic),
            })?;
            if json {
                let out = serde_json::to_string_pretty(&report).context("serialize report")?;
                println!("{out}");
            } else {
                print!("{}", inspect::render_text(&report));
            }
            Ok(())
        }
        Command::Build {
            manifest,
            descriptor_out,
            data_out,
            tlv_out,
        } => layout::run_build(
            &manifest,
            layout::BuildOutputs {
                descriptor: &descriptor_out,
                data: &data_out,
                tlv: tlv_out.as_deref(),
            },
        ),
        Command::Field { id, vendor_catalog } => {
            let id = literal::parse_field_id(&id)?;
            let vendors = catalog::load_catalog(vendor_catalog.as_deref())?;
            let kind = match id.vendor_tag() {
                Some(vendor) => vendors.kind_of(id, vendor),
                None => vendors.kind_of(id, 0),
            };
            let v = serde_json::json!({
                "id": id.to_string(),
                "range": format!("{:?}", id.range()),
                "name": vendors.name_of(id),
                "kind": kind.map(|k| k.as_str()),
            });
            println!("{v}");
            Ok(())
        }
    }
}
