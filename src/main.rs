use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;

use chunkpatch::patch_format::DEFAULT_BLOCK_SIZE;
use chunkpatch::{apply, create, logging};

#[derive(Parser)]
#[command(name = "chunkpatch", about = "Chunked binary patch creator and applier")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a patch directory by comparing old and new directories
    Diff {
        /// Path to the old (original) directory
        #[arg(long)]
        old: PathBuf,
        /// Path to the new (updated) directory
        #[arg(long)]
        new: PathBuf,
        /// Patch directory to write artifacts and patch.json into (created if absent)
        #[arg(long, short)]
        output: PathBuf,
        /// Block size in bytes for chunked diffing
        #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE, value_parser = clap::value_parser!(u64).range(1..))]
        block_size: u64,
    },
    /// Rebuild the new directory from the old directory and a patch directory
    Patch {
        /// Path to the old (original) directory
        #[arg(long)]
        old: PathBuf,
        /// Directory to write the rebuilt tree into (created if absent)
        #[arg(long, short)]
        output: PathBuf,
        /// Patch directory produced by `diff`
        #[arg(long, short)]
        patch: PathBuf,
    },
    /// Check that an old directory matches what a patch directory expects
    Verify {
        /// Path to the old (original) directory
        #[arg(long)]
        old: PathBuf,
        /// Patch directory produced by `diff`
        #[arg(long, short)]
        patch: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose)?;

    match cli.command {
        Commands::Diff {
            old,
            new,
            output,
            block_size,
        } => {
            println!("Creating patch...");
            println!("  Old: {}", old.display());
            println!("  New: {}", new.display());
            println!("  Output: {}", output.display());
            println!("  Block size: {}", block_size);

            let start = Instant::now();
            let summary = create::create_patch(&old, &new, &output, block_size).await?;
            let elapsed = start.elapsed();

            println!("\nPatch created successfully!");
            println!("  Files unchanged: {}", summary.files_copied);
            println!("  Files added: {}", summary.files_added);
            println!("  Files replaced: {}", summary.files_replaced);
            println!("  Files patched: {}", summary.files_patched);
            println!("  Files chunked: {}", summary.files_chunked);
            println!(
                "  Artifacts staged: {} ({} bytes)",
                summary.artifacts_staged, summary.bytes_staged
            );
            println!("  Time elapsed: {:.3}s", elapsed.as_secs_f64());
        }
        Commands::Patch { old, output, patch } => {
            println!("Applying patch...");
            println!("  Old: {}", old.display());
            println!("  Output: {}", output.display());
            println!("  Patch: {}", patch.display());

            let start = Instant::now();
            let summary = apply::apply_patch(&old, &output, &patch).await?;
            let elapsed = start.elapsed();

            println!("\nPatch applied successfully!");
            println!("  Files copied: {}", summary.files_copied);
            println!("  Files added: {}", summary.files_added);
            println!("  Files patched: {}", summary.files_patched);
            println!("  Files chunked: {}", summary.files_chunked);
            println!("  Bytes written: {}", summary.bytes_written);
            println!(
                "  Digests verified: {} old, {} new",
                summary.old_files_verified, summary.new_files_verified
            );
            println!("  Time elapsed: {:.3}s", elapsed.as_secs_f64());
        }
        Commands::Verify { old, patch } => {
            let verified = apply::verify_patch(&old, &patch)?;
            println!("Old directory matches patch: {} files verified", verified);
        }
    }

    Ok(())
}
