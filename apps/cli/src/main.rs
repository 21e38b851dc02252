//! Thin demo binary for the file-operations engine (SPEC_FULL.md §2.1):
//! one subcommand per `sd-file-actions` entry point, running against the
//! real local filesystem. Grounded on `apps/cli/src/main.rs`'s
//! `Cli`/`Commands` clap-derive shape, trimmed to the file domain the way
//! that file's own `domains::file` module exposes copy/move.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use sd_core::{Engine, EngineConfig};
use sd_core_dialog::{HeadlessPolicy, PolicyDialogService};
use sd_core_job_system::ParentHandle;

#[derive(Parser, Debug)]
#[command(name = "sd-cli", about = "File-operations engine demo CLI")]
struct Cli {
	/// Directory engine.toml is loaded from/written to.
	#[arg(long)]
	data_dir: Option<PathBuf>,

	/// How to answer conflict/error dialogs with no attached UI.
	#[arg(long, value_enum, default_value = "skip")]
	on_conflict: OnConflict,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OnConflict {
	Skip,
	Replace,
	Cancel,
	Proceed,
}

impl From<OnConflict> for HeadlessPolicy {
	fn from(value: OnConflict) -> Self {
		match value {
			OnConflict::Skip => Self::AlwaysSkip,
			OnConflict::Replace => Self::AlwaysReplace,
			OnConflict::Cancel => Self::AlwaysCancel,
			OnConflict::Proceed => Self::AlwaysProceed,
		}
	}
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Copy sources into a destination directory.
	Copy { sources: Vec<PathBuf>, destination: PathBuf },
	/// Move sources into a destination directory.
	Move { sources: Vec<PathBuf>, destination: PathBuf },
	/// Duplicate sources in place.
	Duplicate { sources: Vec<PathBuf> },
	/// Create a folder.
	NewFolder { parent_dir: PathBuf, name: Option<String> },
	/// Rename a single file or directory.
	Rename { location: PathBuf, new_name: String },
	/// Move sources to the platform trash.
	Trash { sources: Vec<PathBuf> },
	/// Permanently delete sources.
	Delete { sources: Vec<PathBuf> },
	/// Empty the platform trash.
	EmptyTrash,
	/// Extract archives into a destination directory.
	Extract { sources: Vec<PathBuf>, destination: PathBuf },
	/// Compress sources into an archive.
	Compress { sources: Vec<PathBuf>, output: PathBuf },
	/// Change permissions recursively under a directory.
	SetPermissions { dir: PathBuf, file_value: u32, file_mask: u32, dir_value: u32, dir_mask: u32 },
}

#[tokio::main]
async fn main() -> Result<()> {
	tracing_subscriber::fmt::init();

	let cli = Cli::parse();
	let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
	let config = EngineConfig::load(&data_dir).context("loading engine config")?;

	let dialog = Arc::new(PolicyDialogService(cli.on_conflict.into()));
	let engine = Engine::new(dialog, config);

	match cli.command {
		Commands::Copy { sources, destination } => {
			let outcome = sd_file_actions::copy_async(&engine.deps, sources, destination, ParentHandle::None).await;
			report("copy", outcome.success, &outcome.errors);
		}
		Commands::Move { sources, destination } => {
			let outcome = sd_file_actions::move_async(&engine.deps, sources, destination, ParentHandle::None).await;
			report("move", outcome.success, &outcome.errors);
		}
		Commands::Duplicate { sources } => {
			let outcome = sd_file_actions::duplicate_async(&engine.deps, sources, ParentHandle::None).await;
			report("duplicate", outcome.success, &outcome.errors);
		}
		Commands::NewFolder { parent_dir, name } => {
			let outcome = sd_file_actions::new_folder(&engine.deps, parent_dir, name, ParentHandle::None).await;
			report("new-folder", outcome.success, &outcome.errors);
			if let Some(path) = outcome.created_file {
				println!("{}", path.display());
			}
		}
		Commands::Rename { location, new_name } => {
			let outcome = sd_file_actions::rename(&engine.deps, location, new_name).await;
			println!("rename: {}", if outcome.success { "ok" } else { "failed" });
		}
		Commands::Trash { sources } => {
			let outcome = sd_file_actions::trash_or_delete_async(&engine.deps, sources, ParentHandle::None).await;
			report("trash", outcome.success, &outcome.errors);
		}
		Commands::Delete { sources } => {
			let outcome = sd_file_actions::delete_async(&engine.deps, sources, ParentHandle::None).await;
			report("delete", outcome.success, &outcome.errors);
		}
		Commands::EmptyTrash => {
			let ok = sd_file_actions::empty_trash(&engine.deps, true, ParentHandle::None).await;
			println!("empty-trash: {}", if ok { "ok" } else { "cancelled or failed" });
		}
		Commands::Extract { sources, destination } => {
			let outcome = sd_file_actions::extract_files(&engine.deps, sources, destination, ParentHandle::None).await;
			println!("extract: {}", if outcome.success { "ok" } else { "failed" });
			for path in &outcome.output_files {
				println!("{}", path.display());
			}
		}
		Commands::Compress { sources, output } => {
			let format = sd_core_archive::ArchiveFormat::detect(&output).unwrap_or(sd_core_archive::ArchiveFormat::Zip);
			let outcome = sd_file_actions::compress::compress(&engine.deps, sources, output, format, None, ParentHandle::None).await;
			println!("compress: {}", if outcome.success { "ok" } else { "failed" });
		}
		Commands::SetPermissions { dir, file_value, file_mask, dir_value, dir_mask } => {
			let change = sd_file_actions::permissions::PermissionsChange {
				file_value,
				file_mask,
				dir_value,
				dir_mask,
			};
			let outcome = sd_file_actions::set_permissions_recursive(&engine.deps, dir, change, ParentHandle::None).await;
			println!("set-permissions: {}", if outcome.success { "ok" } else { "failed" });
		}
	}

	Ok(())
}

fn report(op: &str, success: bool, errors: &[sd_core_job_errors::JobError]) {
	println!("{op}: {}", if success { "ok" } else { "failed" });
	for error in errors {
		eprintln!("  error: {error}");
	}
}

fn default_data_dir() -> PathBuf {
	dirs_data_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn dirs_data_dir() -> Option<PathBuf> {
	std::env::var_os("XDG_DATA_HOME")
		.map(PathBuf::from)
		.or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".local/share")))
		.map(|base| base.join("sd-cli"))
}
