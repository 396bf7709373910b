//! git-upstream command-line interface.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use git_upstream::import::{resolve_sequence_editor, ImportConfig, ImportError, ImportOutcome, Importer};
use git_upstream::replay::ReplayAction;
use git_upstream::storage::{GitRepository, StorageError, VcsQuery};

/// Oldest git the tool is tested against.
const MINIMUM_GIT: (u32, u32, u32) = (1, 7, 5);

#[derive(Parser)]
#[command(
    name = "git-upstream",
    about = "Import upstream changes by replaying local commits onto them",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// More logging (-v info, -vv debug, -vvv trace); GIT_UPSTREAM_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Repository working tree (defaults to GIT_WORK_TREE, then the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    work_tree: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Replay the local changes of <head> onto <upstream> and merge the result back
    Import(ImportArgs),
}

#[derive(Args)]
struct ImportArgs {
    /// Let the sequence editor edit the replay plan first
    #[arg(short, long)]
    interactive: bool,

    /// Continue a halted import
    #[arg(long = "continue", conflicts_with = "abort")]
    resume: bool,

    /// Abandon a halted import
    #[arg(long)]
    abort: bool,

    /// Use <rev> instead of the computed merge base
    #[arg(long, value_name = "REV")]
    merge_base: Option<String>,

    /// Branch receiving the replayed commits
    #[arg(long, value_name = "NAME")]
    import_branch: Option<String>,

    /// Do not merge the import branch into <head>
    #[arg(long)]
    no_merge: bool,

    /// Show what would be replayed without changing anything
    #[arg(long)]
    dry_run: bool,

    /// Command used to edit the plan in interactive mode
    #[arg(long, env = "GIT_SEQUENCE_EDITOR", value_name = "CMD")]
    sequence_editor: Option<String>,

    /// Branch or revision to import
    #[arg(required_unless_present_any = ["resume", "abort"])]
    upstream: Option<String>,

    /// Branch receiving the import (defaults to the current branch)
    head: Option<String>,
}

fn main() -> ExitCode {
    // usage errors exit 1; 2 is reserved for conflicts
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() { ExitCode::FAILURE } else { ExitCode::SUCCESS };
        }
    };
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            if e.is_resumable() {
                eprintln!("hint: resolve the problem, stage the result and run `git-upstream import --continue`");
                eprintln!("hint: or run `git-upstream import --abort` to restore the original branches");
            }
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("GIT_UPSTREAM_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn open_repository(work_tree: Option<PathBuf>) -> Result<GitRepository, StorageError> {
    let repo = match work_tree {
        Some(dir) => GitRepository::discover(dir)?,
        None => GitRepository::from_env()?,
    };

    let (major, minor, patch) = MINIMUM_GIT;
    match repo.tool_version() {
        Some(version) if !repo.check_minimum_version(major, minor, patch) => {
            warn!(%version, "git {}.{}.{} or newer is recommended", major, minor, patch);
        }
        Some(version) => debug!(%version, "found git"),
        None => debug!("no git executable on PATH"),
    }
    Ok(repo)
}

fn run(cli: Cli) -> Result<(), ImportError> {
    let repo = open_repository(cli.work_tree)?;
    match cli.command {
        Command::Import(args) => import(repo, args),
    }
}

fn import(repo: GitRepository, args: ImportArgs) -> Result<(), ImportError> {
    let editor = resolve_sequence_editor(&repo, args.sequence_editor.as_deref(), |key| std::env::var(key).ok())?;
    let mut config = ImportConfig::new()
        .interactive(args.interactive)
        .no_merge(args.no_merge)
        .dry_run(args.dry_run);
    if let Some(editor) = editor {
        config = config.sequence_editor(editor);
    }
    if let Some(rev) = args.merge_base {
        config = config.merge_base(rev);
    }
    if let Some(name) = args.import_branch {
        config = config.import_branch(name);
    }

    let importer = Importer::new(repo, config);
    if args.abort {
        importer.abort()?;
        println!("Import aborted.");
        return Ok(());
    }
    let outcome = if args.resume {
        importer.resume()?
    } else {
        let upstream = args
            .upstream
            .ok_or_else(|| ImportError::InvalidConfig("an upstream branch is required".to_string()))?;
        importer.import(&upstream, args.head.as_deref())?
    };
    report(&outcome);
    Ok(())
}

fn report(outcome: &ImportOutcome) {
    match outcome {
        ImportOutcome::UpToDate => println!("Already up to date."),
        ImportOutcome::Planned { import_branch, plan } => {
            let count = plan.applied().count();
            println!(
                "Would replay {} commit{} onto {}:",
                count,
                if count == 1 { "" } else { "s" },
                import_branch
            );
            for entry in plan.entries().iter().filter(|e| e.action != ReplayAction::Drop) {
                println!("  {} {} {}", entry.action, entry.commit.short(), entry.subject);
            }
        }
        ImportOutcome::Imported(summary) => {
            let count = summary.replayed.len();
            println!(
                "Replayed {} commit{} onto {}.",
                count,
                if count == 1 { "" } else { "s" },
                summary.import_branch
            );
            if !summary.skipped.is_empty() {
                println!("Skipped {} already present upstream.", summary.skipped.len());
            }
            if let Some(merge) = summary.merge {
                println!("Merged {} into {} as {}.", summary.import_branch, summary.head, merge.short());
            }
        }
    }
}
