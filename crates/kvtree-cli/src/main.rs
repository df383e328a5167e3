use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use kvtree_core::binary::{self, BinaryFormat};
use kvtree_core::json::JsonOpts;
use kvtree_core::symbol::{Backend, DEFAULT_FIXED_CAPACITY};
use kvtree_core::{DirFileSystem, KvTree, MergePolicy, TextReader, TextWriter};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "kvtree",
    about = "Inspect, convert and merge key-value tree files",
    version
)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
    /// Show diagnostics (honours RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,
    /// Suppress all diagnostics
    #[arg(long, short, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Symbol table backend
    #[arg(long, env = "KVTREE_SYMBOLS", default_value = "fixed", global = true)]
    symbols: Symbols,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Symbols {
    Fixed,
    Growable,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print a file as text, JSON, or through the log
    Dump(DumpArgs),
    /// Print the value at a key path
    Get(GetArgs),
    /// Convert between text, binary and JSON
    Convert(ConvertArgs),
    /// Merge one file into another
    Merge(MergeArgs),
    /// Parse every text file under a directory and report failures
    Check(CheckArgs),
    /// Zip a resource directory into a timestamped archive beside it
    Pack(PackArgs),
}

#[derive(ClapArgs, Debug)]
struct ReadOpts {
    /// Read \n \t \\ \" escapes in quoted text
    #[arg(long, default_value_t = false)]
    escapes: bool,
    /// Conditional tokens that evaluate true, e.g. --define WIN
    #[arg(long = "define", value_name = "TOKEN")]
    defines: Vec<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum DumpFormat {
    Text,
    Json,
    Log,
}

#[derive(ClapArgs, Debug)]
struct DumpArgs {
    path: PathBuf,
    #[arg(long, value_enum, default_value_t = DumpFormat::Text)]
    format: DumpFormat,
    /// Max nesting shown in JSON output
    #[arg(long, default_value_t = 64)]
    max_depth: usize,
    #[command(flatten)]
    read: ReadOpts,
}

#[derive(ClapArgs, Debug)]
struct GetArgs {
    path: PathBuf,
    /// Key path, e.g. settings/video/width
    #[arg(long)]
    key: String,
    #[command(flatten)]
    read: ReadOpts,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutFormat {
    Text,
    Binary,
    Pooled,
    Json,
}

#[derive(ClapArgs, Debug)]
struct ConvertArgs {
    input: PathBuf,
    #[arg(long, value_name = "FILE")]
    output: PathBuf,
    #[arg(long, value_enum)]
    to: OutFormat,
    /// Leave out empty blocks (binary only)
    #[arg(long, default_value_t = false)]
    filtered: bool,
    #[command(flatten)]
    read: ReadOpts,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Policy {
    All,
    Update,
    Delete,
    Borrow,
    /// Apply the patch's update/delete/borrow blocks
    Sections,
}

#[derive(ClapArgs, Debug)]
struct MergeArgs {
    dest: PathBuf,
    src: PathBuf,
    #[arg(long, value_enum, default_value_t = Policy::Update)]
    policy: Policy,
    /// Output text file; prints to stdout otherwise
    #[arg(long)]
    out: Option<PathBuf>,
    #[command(flatten)]
    read: ReadOpts,
}

#[derive(ClapArgs, Debug)]
struct CheckArgs {
    dir: PathBuf,
    /// Extension of files to parse
    #[arg(long, default_value = "txt")]
    ext: String,
    #[command(flatten)]
    read: ReadOpts,
}

#[derive(ClapArgs, Debug)]
struct PackArgs {
    dir: PathBuf,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);
    let backend = match cli.symbols {
        Symbols::Fixed => Backend::Fixed {
            capacity: DEFAULT_FIXED_CAPACITY,
        },
        Symbols::Growable => Backend::Growable,
    };
    kvtree_core::select_backend(backend).unwrap_or_else(|e| {
        eprintln!("error: {}", e);
        std::process::exit(2);
    });
    match cli.cmd {
        Cmd::Dump(a) => cmd_dump(a),
        Cmd::Get(a) => cmd_get(a),
        Cmd::Convert(a) => cmd_convert(a),
        Cmd::Merge(a) => cmd_merge(a),
        Cmd::Check(a) => cmd_check(a),
        Cmd::Pack(a) => cmd_pack(a),
    }
}

fn init_tracing(cli: &Cli) {
    // --quiet → off, --verbose → RUST_LOG or info, otherwise warnings only
    let filter = if cli.quiet {
        tracing_subscriber::EnvFilter::new("off")
    } else if cli.verbose {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
    } else {
        tracing_subscriber::EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

fn split_path(path: &Path) -> (DirFileSystem, String) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    (DirFileSystem::new(dir), name)
}

fn has_ext(path: &Path, exts: &[&str]) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|e| exts.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// Loads text, binary (by extension or pooled header) or JSON.
fn load_tree(path: &Path, read: &ReadOpts) -> kvtree_core::Result<KvTree> {
    let data = std::fs::read(path)?;
    tracing::debug!(path = %path.display(), bytes = data.len(), "loading");
    if has_ext(path, &["json"]) {
        let text = String::from_utf8_lossy(&data);
        return kvtree_core::json::from_json(&path.display().to_string(), &text);
    }
    if has_ext(path, &["bin", "kvb"]) || binary::is_pooled(&data) {
        return kvtree_core::decode(&data);
    }
    let (fs, name) = split_path(path);
    let text = String::from_utf8_lossy(&data);
    let defines = &read.defines;
    let pred = |tok: &str| defines.iter().any(|d| d.eq_ignore_ascii_case(tok));
    let mut reader = TextReader::new(&name, &text)
        .with_escapes(read.escapes)
        .with_file_system(&fs);
    if !defines.is_empty() {
        reader = reader.with_conditional(&pred);
    }
    reader.parse()
}

fn load_or_exit(path: &Path, read: &ReadOpts) -> KvTree {
    load_tree(path, read).unwrap_or_else(|e| {
        eprintln!("error: {}: {}", path.display(), e);
        std::process::exit(2);
    })
}

fn cmd_dump(args: DumpArgs) {
    let tree = load_or_exit(&args.path, &args.read);
    let res = match args.format {
        DumpFormat::Text => {
            let mut ctx = kvtree_core::TextDump::default();
            kvtree_core::dump_tree(&tree, &mut ctx).map(|_| ctx.out)
        }
        DumpFormat::Json => kvtree_core::json::to_json(
            &tree,
            JsonOpts {
                max_depth: args.max_depth,
            },
        )
        .map(|s| s + "\n"),
        DumpFormat::Log => {
            let mut ctx = kvtree_core::LogDump::default();
            kvtree_core::dump_tree(&tree, &mut ctx).map(|_| String::new())
        }
    };
    match res {
        Ok(s) => print!("{}", s),
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(3);
        }
    }
}

fn cmd_get(args: GetArgs) {
    let tree = load_or_exit(&args.path, &args.read);
    match tree.root_node().find_key(&args.key) {
        Some(n) if n.has_children() => {
            let text = TextWriter::for_tree(&tree)
                .write_node(n)
                .unwrap_or_else(|e| {
                    eprintln!("error: {}", e);
                    std::process::exit(4);
                });
            print!("{}", text);
        }
        Some(n) => println!("{}", n.string("")),
        None => {
            eprintln!("not found: {}", args.key);
            std::process::exit(3);
        }
    }
}

fn cmd_convert(args: ConvertArgs) {
    let tree = load_or_exit(&args.input, &args.read);
    let bytes = match args.to {
        OutFormat::Text => kvtree_core::to_text(&tree).map(String::into_bytes),
        OutFormat::Json => {
            kvtree_core::json::to_json(&tree, JsonOpts::default()).map(String::into_bytes)
        }
        OutFormat::Binary | OutFormat::Pooled => {
            let format = if args.to == OutFormat::Pooled {
                BinaryFormat::Pooled
            } else {
                BinaryFormat::Direct
            };
            if args.filtered {
                kvtree_core::encode_filtered(&tree, format)
            } else {
                kvtree_core::encode(&tree, format)
            }
        }
    };
    let bytes = bytes.unwrap_or_else(|e| {
        eprintln!("error: {}", e);
        std::process::exit(4);
    });
    std::fs::write(&args.output, bytes).unwrap_or_else(|e| {
        eprintln!("error writing {}: {}", args.output.display(), e);
        std::process::exit(5);
    });
}

fn cmd_merge(args: MergeArgs) {
    let mut dest = load_or_exit(&args.dest, &args.read);
    let src = load_or_exit(&args.src, &args.read);
    let root = dest.root();
    let res = match args.policy {
        Policy::Sections => kvtree_core::merge_sections(&mut dest, root, &src, src.root()),
        p => {
            let policy = match p {
                Policy::All => MergePolicy::All,
                Policy::Delete => MergePolicy::Delete,
                Policy::Borrow => MergePolicy::Borrow,
                _ => MergePolicy::Update,
            };
            kvtree_core::merge_trees(&mut dest, &src, policy)
        }
    };
    let text = res.and_then(|_| kvtree_core::to_text(&dest)).unwrap_or_else(|e| {
        eprintln!("error: {}", e);
        std::process::exit(4);
    });
    if let Some(out) = args.out {
        std::fs::write(&out, text).unwrap_or_else(|e| {
            eprintln!("error writing: {}", e);
            std::process::exit(5);
        });
    } else {
        print!("{}", text);
    }
}

fn cmd_check(args: CheckArgs) {
    let fs = DirFileSystem::new(&args.dir);
    let files = fs.list(&args.ext);
    let mut failed = 0usize;
    for name in &files {
        match load_tree(&args.dir.join(name), &args.read) {
            Ok(tree) => println!("ok\t{}\t{} nodes", name, tree.len()),
            Err(e) => {
                failed += 1;
                tracing::warn!(file = %name, error = %e, "parse failed");
                println!("FAIL\t{}\t{}", name, e);
            }
        }
    }
    eprintln!("{} files, {} failed", files.len(), failed);
    if failed > 0 {
        std::process::exit(1);
    }
}

/// `<dir>_<timestamp>.zip` beside `dir`.
fn archive_path(dir: &Path) -> PathBuf {
    let parent = dir.parent().unwrap_or(Path::new("."));
    let name = dir.file_name().and_then(|s| s.to_str()).unwrap_or("resources");
    let ts = chrono::Local::now().format("%Y%m%d-%H%M%S");
    parent.join(format!("{name}_{ts}.zip"))
}

fn cmd_pack(args: PackArgs) {
    if !args.dir.is_dir() {
        eprintln!("error: {} is not a directory", args.dir.display());
        std::process::exit(2);
    }
    let fs = DirFileSystem::new(&args.dir);
    let names = fs.list("");
    let bytes = kvtree_core::archive::pack(&fs, &names).unwrap_or_else(|e| {
        eprintln!("error: {}", e);
        std::process::exit(2);
    });
    let dest = archive_path(&args.dir);
    std::fs::write(&dest, bytes).unwrap_or_else(|e| {
        eprintln!("error writing {}: {}", dest.display(), e);
        std::process::exit(5);
    });
    tracing::info!(archive = %dest.display(), files = names.len(), "packed resource directory");
    println!("{}", dest.display());
}
