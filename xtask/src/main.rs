//! xtask for vsproj-watch: man page and completion generation.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, ValueEnum};
use clap_complete::Shell;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "xtask", about = "Build automation for vsproj-watch")]
enum Task {
    /// Generate the vsproj-watch(1) man page
    GenerateManPages {
        /// Output directory (default: ./man)
        #[arg(short, long, default_value = "man")]
        output: PathBuf,
    },
    /// Generate completion scripts for every supported shell
    GenerateCompletions {
        /// Output directory (default: ./completions)
        #[arg(short, long, default_value = "completions")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    match Task::parse() {
        Task::GenerateManPages { output } => generate_man_pages(&output),
        Task::GenerateCompletions { output } => generate_completions(&output),
    }
}

fn create_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))
}

fn generate_man_pages(output_dir: &Path) -> Result<()> {
    create_dir(output_dir)?;

    let cmd = vsproj_watch::cli::Cli::command();
    let man_path = output_dir.join("vsproj-watch.1");
    let man_file = fs::File::create(&man_path)
        .with_context(|| format!("Failed to create man page: {}", man_path.display()))?;
    clap_mangen::Man::new(cmd).render(&mut std::io::BufWriter::new(man_file))?;

    println!("✓ Generated: {}", man_path.display());
    println!("\nTo view it: man {}", man_path.display());
    Ok(())
}

fn generate_completions(output_dir: &Path) -> Result<()> {
    create_dir(output_dir)?;

    let mut cmd = vsproj_watch::cli::Cli::command();
    for shell in Shell::value_variants() {
        let path = clap_complete::generate_to(*shell, &mut cmd, "vsproj-watch", output_dir)
            .with_context(|| format!("Failed to generate {shell} completions"))?;
        println!("✓ Generated: {}", path.display());
    }
    Ok(())
}
