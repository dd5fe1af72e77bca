//! docdelta CLI - block checksums, patches and reconstruction over files.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docdelta::async_sync::AsyncDeltaEngine;
use docdelta::{
    DocumentChecksums, EngineBuilder, PatchDocument, PatchStats, StrongHashAlgorithm,
    DEFAULT_BLOCK_SIZE,
};

/// docdelta - rsync-style deltas between document versions
#[derive(Parser)]
#[command(name = "docdelta")]
#[command(version)]
#[command(about = "rsync-style block checksums and patches for versioned content")]
#[command(long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build block checksums for a reference file
    Checksums {
        /// Reference file
        #[arg(required = true)]
        file: PathBuf,

        /// Output checksums file (default: <file>.checksums)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Block size in bytes
        #[arg(short, long, default_value_t = DEFAULT_BLOCK_SIZE)]
        block_size: usize,

        /// Strong hash algorithm (md5 or blake3)
        #[arg(short, long, default_value = "md5")]
        algorithm: String,
    },

    /// Build a patch for a candidate file against stored checksums
    Patch {
        /// Candidate file (new version)
        #[arg(required = true)]
        candidate: PathBuf,

        /// Checksums file (of the reference)
        #[arg(required = true)]
        checksums: PathBuf,

        /// Output patch file (default: <candidate>.patch)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Rebuild a candidate from the reference and a patch
    Reconstruct {
        /// Reference file (old version)
        #[arg(required = true)]
        reference: PathBuf,

        /// Checksums file (of the reference)
        #[arg(required = true)]
        checksums: PathBuf,

        /// Patch file
        #[arg(required = true)]
        patch: PathBuf,

        /// Output file (default: <reference>.new)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Bring a target file up to date with a candidate in place
    Update {
        /// Candidate file (new version)
        #[arg(required = true)]
        candidate: PathBuf,

        /// Target file, rewritten in place
        #[arg(required = true)]
        target: PathBuf,

        /// Block size in bytes
        #[arg(short, long, default_value_t = DEFAULT_BLOCK_SIZE)]
        block_size: usize,
    },

    /// Show statistics for a patch file
    Stats {
        /// Patch file
        #[arg(required = true)]
        patch: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Checksums {
            file,
            output,
            block_size,
            algorithm,
        } => run_checksums(&file, output, block_size, &algorithm).await,
        Commands::Patch {
            candidate,
            checksums,
            output,
        } => run_patch(&candidate, &checksums, output).await,
        Commands::Reconstruct {
            reference,
            checksums,
            patch,
            output,
        } => run_reconstruct(&reference, &checksums, &patch, output).await,
        Commands::Update {
            candidate,
            target,
            block_size,
        } => run_update(&candidate, &target, block_size).await,
        Commands::Stats { patch } => run_stats(&patch).await,
    }
}

fn engine_for(
    block_size: usize,
    algorithm: StrongHashAlgorithm,
) -> docdelta::Result<AsyncDeltaEngine> {
    EngineBuilder::new()
        .block_size(block_size)
        .algorithm(algorithm)
        .build()
        .map(AsyncDeltaEngine::new)
}

fn default_output(path: &Path, extension: &str) -> PathBuf {
    let mut p = path.to_path_buf();
    p.set_extension(extension);
    p
}

async fn load_checksums(path: &Path) -> Result<DocumentChecksums, Box<dyn std::error::Error>> {
    let data = tokio::fs::read(path).await?;
    Ok(bincode::deserialize(&data)?)
}

async fn load_patch(path: &Path) -> Result<PatchDocument, Box<dyn std::error::Error>> {
    let data = tokio::fs::read(path).await?;
    Ok(bincode::deserialize(&data)?)
}

async fn run_checksums(
    file: &Path,
    output: Option<PathBuf>,
    block_size: usize,
    algorithm: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let algorithm: StrongHashAlgorithm = algorithm.parse()?;
    let engine = engine_for(block_size, algorithm)?;
    let output = output.unwrap_or_else(|| default_output(file, "checksums"));

    let handle = tokio::fs::File::open(file).await?;
    let expected = handle.metadata().await?.len();
    let reader = tokio::io::BufReader::new(handle);
    let id = file.to_string_lossy();
    let checksums = engine
        .checksums_from_reader(&id, reader, Some(expected))
        .await?;

    tokio::fs::write(&output, bincode::serialize(&checksums)?).await?;

    println!(
        "Generated checksums: {} ({} blocks, {} bytes, {})",
        output.display(),
        checksums.block_count(),
        checksums.original_length(),
        checksums.algorithm()
    );
    Ok(())
}

async fn run_patch(
    candidate: &Path,
    checksums: &Path,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let checksums = load_checksums(checksums).await?;
    let engine = engine_for(checksums.block_size(), checksums.algorithm())?;
    let output = output.unwrap_or_else(|| default_output(candidate, "patch"));

    let handle = tokio::fs::File::open(candidate).await?;
    let reader = tokio::io::BufReader::new(handle);
    let patch = engine.patch_from_reader(reader, &checksums).await?;

    tokio::fs::write(&output, bincode::serialize(&patch)?).await?;

    println!(
        "Generated patch: {} ({} blocks matched, {} literal bytes, {:.1}% matched)",
        output.display(),
        patch.matched_block_count,
        patch.literal_len(),
        patch.match_ratio() * 100.0
    );
    Ok(())
}

async fn run_reconstruct(
    reference: &Path,
    checksums: &Path,
    patch: &Path,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let checksums = load_checksums(checksums).await?;
    let patch = load_patch(patch).await?;
    let engine = engine_for(checksums.block_size(), checksums.algorithm())?;
    let output = output.unwrap_or_else(|| default_output(reference, "new"));

    let reference_data = tokio::fs::read(reference).await?;
    let written = engine
        .reconstruct_to_file(&reference_data, &checksums, &patch, &output)
        .await?;

    println!("Reconstructed: {} ({written} bytes)", output.display());
    Ok(())
}

async fn run_update(
    candidate: &Path,
    target: &Path,
    block_size: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = engine_for(block_size, StrongHashAlgorithm::default())?;
    let stats = engine.update_file(candidate, target).await?;

    println!(
        "Updated {} ({} bytes matched, {} bytes literal)",
        target.display(),
        stats.matched_bytes,
        stats.literal_bytes
    );
    Ok(())
}

async fn run_stats(patch: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let patch = load_patch(patch).await?;
    let stats = PatchStats::from_patch(&patch);

    println!("Block size:     {}", patch.block_size);
    println!("Candidate size: {} bytes", patch.candidate_length);
    println!("Matched blocks: {}", stats.matched_blocks);
    println!("Matched bytes:  {}", stats.matched_bytes);
    println!("Literal runs:   {}", stats.literal_runs);
    println!("Literal bytes:  {}", stats.literal_bytes);
    println!("Match ratio:    {:.1}%", stats.match_ratio * 100.0);
    Ok(())
}
