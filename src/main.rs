use std::path::PathBuf;

use clap::{Parser, Subcommand};
use notegraph::{LiveEvent, NotePath, NoteStore, NotesConfig, NotesService, Resolution};

#[derive(Debug, Parser)]
#[command(
    name = "notegraph",
    version,
    about = "Markdown knowledge-base index, link graph and live-change engine"
)]
struct Cli {
    /// Path to the notes directory.
    #[arg(long, env = "NOTES_ROOT", global = true)]
    root: Option<PathBuf>,

    /// Exclude pattern for graph/search/resolution (repeatable; `*`/`?` globs).
    #[arg(long = "exclude", env = "NOTES_EXCLUDE", value_delimiter = ',', global = true)]
    exclude: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the JSON/SSE API over HTTP.
    #[cfg(feature = "web")]
    Serve {
        /// Bind address for the server.
        #[arg(long, default_value = "127.0.0.1:5000")]
        bind: std::net::SocketAddr,
    },
    /// Print the link graph as JSON.
    Graph {
        /// Limit the graph to one note and its direct neighbors.
        #[arg(long)]
        note: Option<PathBuf>,
    },
    /// Watch the notes root and print normalized change events.
    Watch,
    /// List a note's task-list items with their ordinals.
    Tasks {
        /// Note path relative to the root.
        #[arg(long)]
        note: PathBuf,
    },
    /// Resolve a link target the way the renderer would.
    Resolve {
        /// Raw link target, e.g. a wiki reference name.
        #[arg(long)]
        target: String,

        /// Referring note path relative to the root.
        #[arg(long)]
        from: PathBuf,
    },
    /// Fuzzy-search note paths and content.
    Search {
        /// Query string.
        #[arg(long)]
        query: String,

        /// Maximum number of results.
        #[arg(long, default_value_t = 25)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let store = open_store(&cli)?;

    match cli.command {
        #[cfg(feature = "web")]
        Command::Serve { bind } => notegraph::serve(store, bind).await?,
        Command::Graph { note } => {
            let service = NotesService::new(store);
            service.build_index().await?;
            match note {
                Some(note) => {
                    let rel = NotePath::try_from(note.as_path())?;
                    let local = service
                        .local_graph(&rel)
                        .ok_or_else(|| anyhow::anyhow!("note not found: {rel}"))?;
                    println!("{}", serde_json::to_string_pretty(&local)?);
                }
                None => {
                    let snapshot = service.graph_snapshot();
                    println!("{}", serde_json::to_string_pretty(&snapshot)?);
                }
            }
        }
        Command::Watch => {
            let mut service = NotesService::new(store);
            service.build_index().await?;
            let mut rx = service.subscribe();
            service.start_watching().await?;
            println!("watching... (Ctrl-C to stop)");

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    ev = rx.recv() => {
                        match ev {
                            Some(LiveEvent::Change(ev)) => {
                                println!("{}\t/{}", ev.kind_str(), ev.path().as_noext_lossy());
                            }
                            Some(LiveEvent::Resync) => println!("resync"),
                            None => break,
                        }
                    }
                }
            }

            service.shutdown().await;
        }
        Command::Tasks { note } => {
            let service = NotesService::new(store);
            service.build_index().await?;
            let rel = NotePath::try_from(note.as_path())?;
            let tasks = service
                .tasks_for(&rel)
                .ok_or_else(|| anyhow::anyhow!("note not found: {rel}"))?;
            for (ix, task) in tasks.iter().enumerate() {
                let mark = if task.checked { 'x' } else { ' ' };
                println!("{ix}\t[{mark}]\t{}:{}\t{}", rel, task.line, task.text);
            }
        }
        Command::Resolve { target, from } => {
            let service = NotesService::new(store);
            service.build_index().await?;
            let source = NotePath::try_from(from.as_path())?;
            match service.resolve(&target, &source) {
                Resolution::Note(p) => println!("note\t{p}"),
                Resolution::Static(p) => println!("static\t{p}"),
                Resolution::Unresolved => println!("unresolved"),
            }
        }
        Command::Search { query, limit } => {
            let service = NotesService::new(store);
            service.build_index().await?;
            for hit in service.search(&query, limit).await? {
                println!("{}\t{}:{}\t{}", hit.title, hit.path, hit.line, hit.snippet);
            }
        }
    }

    Ok(())
}

fn open_store(cli: &Cli) -> anyhow::Result<NoteStore> {
    let root = cli
        .root
        .clone()
        .ok_or_else(|| anyhow::anyhow!("--root is required (or set NOTES_ROOT)"))?;
    let mut cfg = NotesConfig::default();
    cfg.exclude_patterns = cli.exclude.clone();
    Ok(NoteStore::with_config(root, cfg)?)
}
