//! `floop` — the reference command-line collaborator for `floop-core`.
//!
//! This binary is a thin wrapper: it parses arguments, builds a
//! `ContextSnapshot`/`FloopConfig`, opens a `BehaviorEngine` for the
//! current directory, calls exactly one core operation (§6.1 of the
//! engine's contract), and renders the result. It owns none of the graph
//! logic itself.

mod render;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use floop_core::model::{BehaviorKind, ContextSnapshot};
use floop_core::prelude::{AssemblyFormat, PackManifest};
use floop_core::{BackupCounts, BehaviorEngine, CancellationToken, FeedbackSignal, FloopConfig, RestoreMode, Scope};

#[derive(Parser)]
#[command(name = "floop")]
#[command(about = "Persistent behavior graph for AI coding agents")]
#[command(version = floop_core::VERSION)]
struct Cli {
    /// Project root to operate against (defaults to the current directory).
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Which scope to read/write: local, global, or both.
    #[arg(long, global = true, default_value = "local")]
    scope: ScopeArg,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ScopeArg {
    Local,
    Global,
    Both,
}

impl From<ScopeArg> for Scope {
    fn from(value: ScopeArg) -> Self {
        match value {
            ScopeArg::Local => Scope::Local,
            ScopeArg::Global => Scope::Global,
            ScopeArg::Both => Scope::Both,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Markdown,
    Xml,
    Plain,
}

impl From<FormatArg> for AssemblyFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Markdown => AssemblyFormat::Markdown,
            FormatArg::Xml => AssemblyFormat::Xml,
            FormatArg::Plain => AssemblyFormat::Plain,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a correction and run it through the learning pipeline.
    Learn {
        /// What the agent actually did.
        wrong: String,
        /// What it should have done instead.
        right: String,
        /// File path the correction occurred in, for when-predicate inference.
        #[arg(long)]
        file: Option<String>,
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        task: Option<String>,
        /// Extra tags to seed kind inference and tagging with.
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Resolve and assemble the active behaviors for a context.
    Active {
        #[arg(long)]
        file: Option<String>,
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        task: Option<String>,
        /// Token budget for the assembled prompt block.
        #[arg(long, default_value_t = 4000)]
        budget: usize,
        #[arg(long, value_enum, default_value = "markdown")]
        format: FormatArg,
        /// Coalesce similar same-kind behaviors into cluster summaries.
        #[arg(long)]
        coalesce: bool,
    },

    /// List behaviors in scope, optionally filtered.
    List {
        #[arg(long)]
        kind: Option<String>,
        #[arg(long)]
        tag: Option<String>,
    },

    /// Record a followed/confirmed/overridden signal against a behavior.
    Feedback {
        behavior_id: String,
        #[arg(value_enum)]
        signal: FeedbackArg,
    },

    /// Explain why a behavior would or wouldn't activate for a context.
    Show {
        behavior_id: String,
        #[arg(long)]
        file: Option<String>,
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        task: Option<String>,
    },

    /// Mark behaviors as forgotten (absorbing terminal state).
    Forget { ids: Vec<String> },

    /// Lift a behavior out of the forgotten state.
    Restore { ids: Vec<String> },

    /// Fold one behavior into another.
    Merge { source: String, target: String },

    /// Recompute similar-to/overrides edges across the scope.
    DeriveEdges {
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        clear: bool,
    },

    /// Scan the scope for integrity problems.
    Validate,

    /// Pack operations: create, install, remove, or list.
    Pack {
        #[command(subcommand)]
        action: PackCommands,
    },

    /// Seed the nine built-in core meta-behaviors into the scope.
    Seed,

    /// Snapshot the scope to a V2 backup file.
    Backup { path: PathBuf },

    /// Load a V2 backup file into the scope.
    RestoreBackup {
        path: PathBuf,
        #[arg(long, value_enum, default_value = "merge")]
        mode: RestoreModeArg,
    },
}

#[derive(Subcommand)]
enum PackCommands {
    /// Filter the scope's behaviors into a `.fpack` file.
    Create {
        path: PathBuf,
        pack_id: String,
        pack_version: String,
        #[arg(long)]
        kind: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Install a `.fpack` file into the scope.
    Install {
        path: PathBuf,
        /// Also derive similar-to/overrides edges between the pack's nodes
        /// and the scope's pre-existing behaviors.
        #[arg(long)]
        derive_edges: bool,
    },
    /// Remove every behavior installed from a pack.
    Remove { pack_id: String },
    /// List installed packs and how many live behaviors each carries.
    List,
}

#[derive(Clone, Copy, ValueEnum)]
enum FeedbackArg {
    Followed,
    Confirmed,
    Overridden,
}

impl From<FeedbackArg> for FeedbackSignal {
    fn from(value: FeedbackArg) -> Self {
        match value {
            FeedbackArg::Followed => FeedbackSignal::Followed,
            FeedbackArg::Confirmed => FeedbackSignal::Confirmed,
            FeedbackArg::Overridden => FeedbackSignal::Overridden,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum RestoreModeArg {
    Merge,
    Replace,
}

impl From<RestoreModeArg> for RestoreMode {
    fn from(value: RestoreModeArg) -> Self {
        match value {
            RestoreModeArg::Merge => RestoreMode::Merge,
            RestoreModeArg::Replace => RestoreMode::Replace,
        }
    }
}

fn context_from_flags(file: Option<String>, language: Option<String>, task: Option<String>) -> ContextSnapshot {
    let mut ctx = ContextSnapshot::new(Utc::now());
    ctx.file_path = file;
    ctx.file_language = language;
    ctx.task = task;
    ctx.infer_language();
    ctx
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let root = cli.root.clone().unwrap_or(std::env::current_dir()?);
    let scope: Scope = cli.scope.into();
    let create_local = matches!(cli.command, Commands::Learn { .. } | Commands::Seed);

    let engine = BehaviorEngine::open(&root, FloopConfig::default(), create_local)
        .with_context(|| format!("opening floop scope under {}", root.display()))?;

    match cli.command {
        Commands::Learn { wrong, right, file, language, task, tags } => {
            let ctx = context_from_flags(file, language, task);
            let result = engine.learn(wrong, right, ctx, tags, scope)?;
            render::learning_result(&result);
        }
        Commands::Active { file, language, task, budget, format, coalesce } => {
            let ctx = context_from_flags(file, language, task);
            let (assembled, selected) = engine.active(&ctx, budget, format.into(), coalesce, scope)?;
            println!("{}", assembled.prompt);
            eprintln!(
                "{}",
                format!(
                    "~{} tokens, {} behaviors{}",
                    assembled.estimated_tokens,
                    selected.len(),
                    if assembled.truncated { " (truncated)" } else { "" }
                )
                .dimmed()
            );
        }
        Commands::List { kind, tag } => {
            let kind_filter = kind.map(|k| BehaviorKind::parse_name(&k));
            let behaviors = engine.list(scope, kind_filter, tag.as_deref())?;
            render::behavior_list(&behaviors);
        }
        Commands::Feedback { behavior_id, signal } => {
            let updated = engine.feedback(&behavior_id, signal.into(), scope)?;
            println!(
                "{} confidence now {:.2}",
                updated.name.green(),
                updated.confidence
            );
        }
        Commands::Show { behavior_id, file, language, task } => {
            let ctx = context_from_flags(file, language, task);
            let explanation = engine.show(&behavior_id, &ctx, scope)?;
            render::explanation(&explanation);
        }
        Commands::Forget { ids } => {
            let touched = engine.forget(&ids, scope)?;
            println!("forgot {} behavior(s)", touched.len());
        }
        Commands::Restore { ids } => {
            let touched = engine.restore(&ids, scope)?;
            println!("restored {} behavior(s)", touched.len());
        }
        Commands::Merge { source, target } => {
            let merged = engine.merge(&source, &target, scope)?;
            println!("merged into {} (confidence {:.2})", merged.name.green(), merged.confidence);
        }
        Commands::DeriveEdges { dry_run, clear } => {
            let report = engine.derive_edges(scope, dry_run, clear, &CancellationToken::new())?;
            println!(
                "examined {} pairs, created {} edges, updated {}",
                report.pairs_examined, report.edges_created, report.edges_updated
            );
        }
        Commands::Validate => {
            let problems = engine.validate(scope, &CancellationToken::new())?;
            if problems.is_empty() {
                println!("{}", "no problems found".green());
            } else {
                for problem in &problems {
                    println!("{} {problem}", "!".red());
                }
                std::process::exit(1);
            }
        }
        Commands::Pack { action } => match action {
            PackCommands::Create { path, pack_id, pack_version, kind, tags, author, description } => {
                let mut manifest = PackManifest::new(pack_id, pack_version)?;
                manifest.pack_author = author;
                manifest.pack_description = description;
                manifest.pack_tags = tags;
                engine.pack_create(&path, &manifest, kind.as_deref(), &manifest.pack_tags.clone(), scope)?;
                println!("wrote pack to {}", path.display());
            }
            PackCommands::Install { path, derive_edges } => {
                let result = engine.pack_install(&path, scope, derive_edges, &CancellationToken::new())?;
                println!(
                    "{}@{}: added {}, updated {}, skipped {}, edges added {}",
                    result.pack_id,
                    result.pack_version,
                    result.nodes_added,
                    result.nodes_updated,
                    result.nodes_skipped,
                    result.edges_added
                );
            }
            PackCommands::Remove { pack_id } => {
                let removed = engine.pack_remove(&pack_id, scope)?;
                println!("forgot {removed} behavior(s) installed from {pack_id}");
            }
            PackCommands::List => {
                let packs = engine.pack_list(scope)?;
                if packs.is_empty() {
                    println!("no packs installed");
                } else {
                    for pack in packs {
                        println!("{}@{} ({} behaviors)", pack.pack_id, pack.pack_version, pack.node_count);
                    }
                }
            }
        },
        Commands::Seed => {
            let added = engine.seed_core(scope)?;
            println!("seeded {added} core behavior(s)");
        }
        Commands::Backup { path } => {
            let BackupCounts { nodes, edges, .. } = engine.backup(&path, scope)?;
            println!("backed up {nodes} nodes, {edges} edges to {}", path.display());
        }
        Commands::RestoreBackup { path, mode } => {
            let BackupCounts { nodes, edges, nodes_restored, nodes_skipped } =
                engine.restore_backup(&path, mode.into(), scope, &CancellationToken::new())?;
            println!(
                "restored {nodes_restored} nodes ({nodes_skipped} skipped, {nodes} total), {edges} edges"
            );
        }
    }

    Ok(())
}
