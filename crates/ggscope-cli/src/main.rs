//! ggscope CLI - inspect, export and compare GGUF model files.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use ggscope_core::DecodeConfig;
use ggscope_gguf::{
    compare, metadata_to_json, write_metadata_json, GgufDecoder, GgufIndex,
};

#[derive(Parser)]
#[command(name = "ggscope")]
#[command(author, version, about = "Inspect GGUF model files", long_about = None)]
struct Cli {
    /// Decoder configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the tensor-data alignment used when the file does not set one
    #[arg(long, global = true)]
    alignment: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the header, metadata and (optionally) the tensor table
    Inspect {
        /// GGUF file
        file: PathBuf,

        /// Also list tensor descriptors
        #[arg(short, long)]
        tensors: bool,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export metadata as JSON
    Metadata {
        /// GGUF file
        file: PathBuf,

        /// Output path (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compare the metadata and tensor tables of two files
    Compare {
        /// Left file
        left: PathBuf,

        /// Right file
        right: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    // Logs go to stderr so JSON on stdout stays clean.
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.alignment)?;

    match cli.command {
        Commands::Inspect {
            file,
            tensors,
            json,
        } => {
            let index = read_index(&file, &config)?;
            if json {
                print_index_json(&index, tensors)?;
            } else {
                print_index(&file, &index, tensors);
            }
        }
        Commands::Metadata { file, output } => {
            let index = read_index(&file, &config)?;
            match output {
                Some(path) => {
                    let out = File::create(&path)
                        .with_context(|| format!("failed to create {}", path.display()))?;
                    let mut out = BufWriter::new(out);
                    write_metadata_json(&index.header.metadata, &mut out)?;
                    out.flush()?;
                    tracing::info!(
                        "Wrote {} metadata entries to {}",
                        index.header.metadata.len(),
                        path.display()
                    );
                }
                None => write_metadata_json(&index.header.metadata, io::stdout().lock())?,
            }
        }
        Commands::Compare { left, right, json } => {
            let left_index = read_index(&left, &config)?;
            let right_index = read_index(&right, &config)?;
            let cmp = compare(&left_index, &right_index);
            if json {
                println!("{}", serde_json::to_string_pretty(&cmp)?);
            } else {
                print!("{}", cmp);
            }
            if !cmp.is_identical() {
                return Ok(ExitCode::from(1));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn load_config(path: Option<&Path>, alignment: Option<u64>) -> anyhow::Result<DecodeConfig> {
    let mut config = match path {
        Some(path) => DecodeConfig::from_yaml_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => DecodeConfig::default(),
    };
    if let Some(alignment) = alignment {
        config = config.with_alignment(alignment);
    }
    config.validate()?;
    Ok(config)
}

fn read_index(path: &Path, config: &DecodeConfig) -> anyhow::Result<GgufIndex> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let index = GgufDecoder::with_config(BufReader::new(file), config.clone())?
        .decode_index()
        .with_context(|| format!("failed to decode {}", path.display()))?;
    tracing::debug!(
        tensors = index.num_tensors(),
        metadata = index.header.metadata.len(),
        "decoded {}",
        path.display()
    );
    Ok(index)
}

fn print_index(path: &Path, index: &GgufIndex, tensors: bool) {
    let header = &index.header;

    println!("========================================");
    println!("  {}", path.display());
    println!("========================================");
    println!("Version:      {}", header.version);
    println!("Architecture: {}", header.architecture().unwrap_or("-"));
    println!("Name:         {}", header.name().unwrap_or("-"));
    println!("Tensors:      {}", header.tensor_count);
    println!("Metadata:     {}", header.metadata_count);
    println!("Alignment:    {}", index.alignment);
    println!("Data offset:  {} (padding {})", index.data_offset, index.padding);
    println!("========================================\n");

    println!("Metadata:");
    for entry in &header.metadata {
        println!("  {} [{}] = {}", entry.key, entry.value_type(), entry.value);
    }

    if tensors {
        println!("\nTensors:");
        println!(
            "  {:<40} {:<8} {:<24} {:>14} {:>14}",
            "name", "type", "dims", "offset", "bytes"
        );
        for info in &index.tensor_infos {
            let size = info
                .byte_size_checked()
                .map_or_else(|_| "?".to_string(), |s| s.to_string());
            println!(
                "  {:<40} {:<8} {:<24} {:>14} {:>14}",
                info.name,
                info.dtype.name(),
                format!("{:?}", info.dimensions),
                index.relative_offset(info),
                size
            );
        }
    }
}

fn print_index_json(index: &GgufIndex, tensors: bool) -> anyhow::Result<()> {
    let header = &index.header;
    let mut value = serde_json::json!({
        "version": header.version,
        "tensor_count": header.tensor_count,
        "metadata_count": header.metadata_count,
        "alignment": index.alignment,
        "padding": index.padding,
        "data_offset": index.data_offset,
        "metadata": metadata_to_json(&header.metadata),
    });
    if tensors {
        value["tensors"] = serde_json::to_value(&index.tensor_infos)?;
    }
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
