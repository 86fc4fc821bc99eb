//! `folio` binary.
//!
//! Drives the compile pipeline against the `typst` executable:
//! - `folio compile` compiles once and writes the document
//! - `folio watch` recompiles on every project change until Ctrl-C

mod engine;
mod loader;
mod project;
mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(about = "Compile typst documents through a serialized, tiered compile worker")]
struct Cli {
	#[command(subcommand)]
	command: Command,

	/// Verbose logging
	#[arg(short, long, global = true)]
	verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Compile once and write the document
	Compile(ProjectArgs),
	/// Recompile whenever a project file changes
	Watch(ProjectArgs),
}

#[derive(clap::Args, Debug)]
struct ProjectArgs {
	/// Main file
	#[arg(value_name = "MAIN")]
	main: PathBuf,

	/// Project root; defaults to the main file's directory
	#[arg(long, value_name = "DIR")]
	root: Option<PathBuf>,

	/// Output path; defaults to the main file with a `.pdf` extension
	#[arg(short, long, value_name = "PATH")]
	output: Option<PathBuf>,

	/// Configuration file
	#[arg(long, value_name = "PATH")]
	config: Option<PathBuf>,

	/// typst executable
	#[arg(long, value_name = "PATH", default_value = "typst")]
	typst: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	let subscriber = tracing_subscriber::fmt()
		.with_max_level(if cli.verbose {
			tracing::Level::DEBUG
		} else {
			tracing::Level::INFO
		})
		.with_writer(std::io::stderr)
		.finish();

	tracing::subscriber::set_global_default(subscriber)?;

	match cli.command {
		Command::Compile(args) => {
			info!(main = %args.main.display(), "compiling");
			run::compile(args).await
		}
		Command::Watch(args) => {
			info!(main = %args.main.display(), "watching");
			run::watch(args).await
		}
	}
}
