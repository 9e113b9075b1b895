use anyhow::{Context, Result};
use bitcore::Repository;
use bitcore::artifacts::merge::file_merge::FileFavor;
use bitcore::artifacts::objects::object_type::ObjectType;
use bitcore::commands::CommandStatus;
use bitcore::commands::plumbing::cat_file::CatFileMode;
use bitcore::commands::plumbing::hash_object::hash_object;
use bitcore::commands::plumbing::init::init;
use bitcore::commands::plumbing::rev_list::RevListOptions;
use bitcore::commands::plumbing::update_index::UpdateIndexOptions;
use bitcore::config::Environment;
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "BITCORE_LOG";

#[derive(Parser)]
#[command(
    name = "bitcore",
    version = "0.1.0",
    author = "Sami Barbut-Dica",
    about = "Plumbing commands over a Git-compatible object store",
    long_about = "Low-level commands over the bitcore library: objects, the index, references, \
    history walking, tree diffs and merges. Output matches the corresponding git plumbing \
    commands byte for byte.",
    help_template = r"
{name} {version} - {about}

USAGE:
    {usage}

OPTIONS:
    {all-args}
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Favor {
    Ours,
    Theirs,
    Union,
}

impl From<Favor> for FileFavor {
    fn from(favor: Favor) -> Self {
        match favor {
            Favor::Ours => FileFavor::Ours,
            Favor::Theirs => FileFavor::Theirs,
            Favor::Union => FileFavor::Union,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    #[command(name = "init", about = "Create an empty repository")]
    Init {
        #[arg(long, help = "Create a repository without a working directory")]
        bare: bool,
        #[arg(index = 1, help = "Where to create the repository")]
        path: Option<PathBuf>,
    },
    #[command(
        name = "hash-object",
        about = "Compute an object id and optionally write the object"
    )]
    HashObject {
        #[arg(short, help = "Write the object into the object database")]
        write: bool,
        #[arg(short = 't', default_value = "blob", help = "Object type")]
        object_type: ObjectType,
        #[arg(index = 1)]
        file: PathBuf,
    },
    #[command(name = "cat-file", about = "Show the content, type or size of an object")]
    #[command(group(ArgGroup::new("mode").required(true).args(["pretty", "show_type", "size", "exists"])))]
    CatFile {
        #[arg(short = 'p', help = "Pretty-print the content")]
        pretty: bool,
        #[arg(short = 't', help = "Show the object type")]
        show_type: bool,
        #[arg(short = 's', help = "Show the object size")]
        size: bool,
        #[arg(short = 'e', help = "Exit with zero status if the object exists")]
        exists: bool,
        #[arg(index = 1)]
        revision: String,
    },
    #[command(name = "update-index", about = "Register working directory files in the index")]
    UpdateIndex {
        #[arg(long, help = "Add paths that are not in the index yet")]
        add: bool,
        #[arg(long, help = "Remove paths that are gone from the working directory")]
        remove: bool,
        #[arg(required = true)]
        paths: Vec<String>,
    },
    #[command(name = "ls-files", about = "Show the paths in the index")]
    LsFiles {
        #[arg(short = 's', long = "stage", help = "Show mode, object id and stage")]
        stage: bool,
    },
    #[command(name = "write-tree", about = "Write the index as a tree object")]
    WriteTree,
    #[command(name = "read-tree", about = "Replace the index with a tree")]
    ReadTree {
        #[arg(index = 1)]
        tree: String,
    },
    #[command(name = "commit-tree", about = "Create a commit object")]
    CommitTree {
        #[arg(index = 1)]
        tree: String,
        #[arg(short = 'p', help = "Parent commit, may be repeated")]
        parents: Vec<String>,
        #[arg(short = 'm', help = "Commit message")]
        message: String,
    },
    #[command(name = "update-ref", about = "Point a reference at a revision")]
    UpdateRef {
        #[arg(index = 1)]
        name: String,
        #[arg(index = 2)]
        revision: String,
        #[arg(index = 3, help = "Value the reference must currently have")]
        old: Option<String>,
    },
    #[command(name = "symbolic-ref", about = "Read or write a symbolic reference")]
    SymbolicRef {
        #[arg(index = 1)]
        name: String,
        #[arg(index = 2)]
        target: Option<String>,
    },
    #[command(name = "show-ref", about = "List references")]
    ShowRef,
    #[command(name = "rev-list", about = "List commits in reverse chronological order")]
    RevList {
        #[arg(long = "topo-order", help = "Show no parent before all of its children")]
        topo_order: bool,
        #[arg(long = "date-order", help = "Topological order, newest commit time first")]
        date_order: bool,
        #[arg(long, help = "Output in reverse order")]
        reverse: bool,
        #[arg(long = "first-parent", help = "Follow only the first parent of merges")]
        first_parent: bool,
        #[arg(required = true, allow_hyphen_values = true)]
        revisions: Vec<String>,
    },
    #[command(name = "merge-base", about = "Find the best common ancestor of two commits")]
    MergeBase {
        #[arg(short = 'a', long, help = "Print every best common ancestor")]
        all: bool,
        #[arg(index = 1)]
        one: String,
        #[arg(index = 2)]
        two: String,
    },
    #[command(name = "diff-tree", about = "Compare two trees recursively")]
    DiffTree {
        #[arg(long = "name-status", required = true, help = "Show status letters and paths")]
        name_status: bool,
        #[arg(short = 'r', help = "Recurse into subtrees (always on)")]
        recursive: bool,
        #[arg(index = 1)]
        old: String,
        #[arg(index = 2)]
        new: String,
        #[arg(index = 3, help = "Limit output to these path prefixes")]
        pathspec: Vec<String>,
    },
    #[command(name = "merge-tree", about = "Three-way merge of trees without touching the index")]
    MergeTree {
        #[arg(long, value_enum, help = "Resolve conflicting hunks in favor of one side")]
        favor: Option<Favor>,
        #[arg(index = 1)]
        base: String,
        #[arg(index = 2)]
        ours: String,
        #[arg(index = 3)]
        theirs: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn discover() -> Result<Repository> {
    let pwd = std::env::current_dir()?;
    Repository::discover(&pwd, &Environment::from_process()).context("not a git repository")
}

fn run(command: Commands) -> Result<CommandStatus> {
    let stdout = std::io::stdout();
    let mut writer = stdout.lock();

    match command {
        Commands::Init { bare, path } => {
            let path = match path {
                Some(path) => path,
                None => std::env::current_dir()?,
            };
            init(&path, bare, &mut writer)?;
        }
        Commands::HashObject {
            write,
            object_type,
            file,
        } => {
            let repository = if write { Some(discover()?) } else { None };
            hash_object(repository.as_ref(), &file, object_type, &mut writer)?;
        }
        Commands::CatFile {
            pretty,
            show_type,
            size,
            exists: _,
            revision,
        } => {
            let mode = if pretty {
                CatFileMode::Pretty
            } else if show_type {
                CatFileMode::Type
            } else if size {
                CatFileMode::Size
            } else {
                CatFileMode::Exists
            };
            return discover()?.cat_file(&revision, mode, &mut writer);
        }
        Commands::UpdateIndex { add, remove, paths } => {
            discover()?.update_index(&paths, &UpdateIndexOptions { add, remove })?
        }
        Commands::LsFiles { stage } => discover()?.ls_files(stage, &mut writer)?,
        Commands::WriteTree => discover()?.write_tree(&mut writer)?,
        Commands::ReadTree { tree } => discover()?.read_tree_into_index(&tree)?,
        Commands::CommitTree {
            tree,
            parents,
            message,
        } => discover()?.commit_tree(&tree, &parents, &message, &mut writer)?,
        Commands::UpdateRef {
            name,
            revision,
            old,
        } => discover()?.update_ref(&name, &revision, old.as_deref())?,
        Commands::SymbolicRef { name, target } => {
            discover()?.symbolic_ref(&name, target.as_deref(), &mut writer)?
        }
        Commands::ShowRef => return discover()?.show_ref(&mut writer),
        Commands::RevList {
            topo_order,
            date_order,
            reverse,
            first_parent,
            revisions,
        } => {
            let options = RevListOptions {
                topo_order,
                date_order,
                reverse,
                first_parent,
            };
            discover()?.rev_list(&revisions, &options, &mut writer)?
        }
        Commands::MergeBase { all, one, two } => {
            return discover()?.merge_base_command(&one, &two, all, &mut writer);
        }
        Commands::DiffTree {
            name_status: _,
            recursive: _,
            old,
            new,
            pathspec,
        } => discover()?.diff_tree(&old, &new, &pathspec, &mut writer)?,
        Commands::MergeTree {
            favor,
            base,
            ours,
            theirs,
        } => {
            let favor = favor.map(FileFavor::from).unwrap_or_default();
            return discover()?.merge_tree(&base, &ours, &theirs, favor, &mut writer);
        }
    }

    Ok(CommandStatus::Success)
}

fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    Ok(run(cli.command)?.into())
}
