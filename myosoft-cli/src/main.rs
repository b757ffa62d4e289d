use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use common::SerdeFormat;
use log::info;
use serde::Serialize;

use myosoft::config::{
    self, CentralNucleiConfig, FiberTypingConfig, IdentifyFibersConfig, ManualRerunConfig,
};
use myosoft::naming::sanitize_title;
use myosoft::pipeline::{self, RunReport, Variant};
use myosoft::services::Services;

#[derive(Parser)]
#[command(name = "myosoft")]
#[command(about = "Muscle fiber morphometry, central nuclei counting and fiber typing")]
#[command(version)]
struct Cli {
    /// Log level spec passed to the logger, e.g. `debug` or `info,myosoft=trace`.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Count fibers with centralized nuclei.
    CentralNuclei {
        #[arg(long)]
        config: PathBuf,
    },
    /// Call fiber type positivity for up to three stainings.
    FiberTyping {
        #[arg(long)]
        config: PathBuf,
    },
    /// Re-measure a manually edited ROI archive.
    Rerun {
        #[arg(long)]
        config: PathBuf,
    },
    /// Print the default configuration of a variant.
    DefaultConfig {
        variant: Variant,
        #[arg(long, value_enum, default_value_t = FormatArg::Yaml)]
        format: FormatArg,
    },
    /// Print the file name stem used for an image title.
    SanitizeTitle { title: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Yaml,
    Json,
}

impl From<FormatArg> for SerdeFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Yaml => SerdeFormat::Yaml,
            FormatArg::Json => SerdeFormat::Json,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::CentralNuclei { config } => {
            let _logger = common::setup_logging(&cli.log_level)?;
            let config: CentralNucleiConfig = load_config(&config)?;
            report(pipeline::central_nuclei(&config, &Services::builtin())?)
        }
        Command::FiberTyping { config } => {
            let _logger = common::setup_logging(&cli.log_level)?;
            let config: FiberTypingConfig = load_config(&config)?;
            report(pipeline::fiber_typing(&config, &Services::builtin())?)
        }
        Command::Rerun { config } => {
            let _logger = common::setup_logging(&cli.log_level)?;
            let config: ManualRerunConfig = load_config(&config)?;
            report(pipeline::manual_rerun(&config, &Services::builtin())?)
        }
        Command::DefaultConfig { variant, format } => {
            let text = default_config(variant, format.into())?;
            print!("{text}");
            Ok(())
        }
        Command::SanitizeTitle { title } => {
            println!("{}", sanitize_title(&title));
            Ok(())
        }
    }
}

fn load_config<T>(path: &Path) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned + 'static,
{
    config::load(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn default_config(variant: Variant, format: SerdeFormat) -> anyhow::Result<String> {
    fn serialize<T: Serialize>(format: SerdeFormat, value: &T) -> anyhow::Result<String> {
        Ok(format.serialize(value)?)
    }

    match variant {
        Variant::IdentifyFibers => serialize(format, &IdentifyFibersConfig::default()),
        Variant::CentralNuclei => serialize(format, &CentralNucleiConfig::default()),
        Variant::FiberTyping => serialize(format, &FiberTypingConfig::default()),
        Variant::ManualRerun => serialize(format, &ManualRerunConfig::default()),
    }
}

fn report(report: RunReport) -> anyhow::Result<()> {
    info!(
        "{} finished {} ROIs of {} in {:.1} s",
        report.variant,
        report.roi_count,
        report.title,
        report.elapsed.as_secs_f64()
    );
    for file in &report.files {
        info!("wrote {}", file.display());
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
