use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use asm_index::{
    config::{parse_size, ProjectConfig},
    index::Index,
    instrumentation,
    layout::AssemblyParser,
    progress::LogProgress,
    search::GlobalSearch,
    source::SourceFiles,
};

#[derive(Parser)]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    #[clap(long)]
    #[clap(help = "Enable chrome tracing")]
    #[clap(long_help = "Enable chrome tracing which on program exit will generate
a json file to be opened with a chrome tracing compatible
viewer.")]
    trace: bool,
    #[clap(short, long)]
    #[clap(help = "Log every classified line")]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[clap(about = "Compute the byte layout of a project")]
    #[clap(aliases = &["l", "lay"])]
    Layout(LayoutArgs),
    #[clap(about = "Look up definitions and references of names")]
    #[clap(aliases = &["f", "find"])]
    Lookup(LookupArgs),
    #[clap(about = "Search the text of all project files")]
    #[clap(aliases = &["s", "grep"])]
    Search(SearchArgs),
}

#[derive(Args, Debug)]
struct LayoutArgs {
    #[clap(help = "Project root directory")]
    root: PathBuf,
    #[clap(long = "offset", value_parser = parse_size)]
    #[clap(help = "PRG offset, without the header, to find the source line of")]
    offsets: Vec<usize>,
    #[command(flatten)]
    project: ProjectConfig,
}

#[derive(Args, Debug)]
struct LookupArgs {
    #[clap(help = "Project root directory")]
    root: PathBuf,
    #[clap(required = true)]
    names: Vec<String>,
    #[clap(long, default_value_t = 30)]
    #[clap(help = "References shown per name")]
    max_results: usize,
    #[command(flatten)]
    project: ProjectConfig,
}

#[derive(Args, Debug)]
struct SearchArgs {
    #[clap(help = "Project root directory")]
    root: PathBuf,
    term: String,
    #[command(flatten)]
    project: ProjectConfig,
}

fn layout(args: &LayoutArgs) -> Result<()> {
    let files = SourceFiles::on_disk(&args.root);
    let layout = AssemblyParser::new(&files, &args.project)
        .parse(&LogProgress)
        .with_context(|| format!("Unable to lay out {}", args.root.display()))?;

    println!("Header: {}", layout.header);
    for bank in layout.banks.values() {
        println!(
            "Bank {:>3} ${:04X} {:>6} bytes  {}",
            bank.index,
            bank.origin,
            bank.size,
            bank.file.display()
        );
    }
    println!("PRG size: ${:X}", layout.image_size());

    for offset in &args.offsets {
        match layout.position_for_offset(*offset) {
            Some(position) => println!("${:06X}: {}", offset, position),
            None => println!("${:06X}: past the end of the PRG data", offset),
        }
    }

    Ok(())
}

fn lookup(args: &LookupArgs) -> Result<()> {
    let files = SourceFiles::on_disk(&args.root);
    let index = Index::full_scan(&files, &args.project, &LogProgress)
        .with_context(|| format!("Unable to index {}", args.root.display()))?;

    for name in &args.names {
        match index.definition(name) {
            Some(definition) => println!(
                "{} {} = {}  ({})",
                definition.kind, definition.name, definition.value, definition.position
            ),
            None => println!("{} is not defined", name),
        }

        let references: Vec<_> = index.references(name).collect();
        for reference in references.iter().take(args.max_results) {
            println!("    {}: {}", reference.position, reference.line.trim());
        }
        if references.len() > args.max_results {
            println!("    ... and {} more", references.len() - args.max_results);
        }
    }

    Ok(())
}

fn search(args: &SearchArgs) -> Result<()> {
    let files = SourceFiles::on_disk(&args.root);
    let paths = files
        .project_files(&args.project)
        .with_context(|| "Unable to list project files")?;
    let mut search = GlobalSearch::from_files(&files, &paths)
        .with_context(|| format!("Unable to read {}", args.root.display()))?;

    for result in search.search(&args.term) {
        println!("{}", result);
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _trace_guard = instrumentation::init(cli.verbose, cli.trace);

    match &cli.command {
        Command::Layout(args) => layout(args),
        Command::Lookup(args) => lookup(args),
        Command::Search(args) => search(args),
    }
}
