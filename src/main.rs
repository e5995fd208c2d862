use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

pub mod assemble;
pub mod cli;
pub mod data_dir;
pub mod domain;
pub mod error;
pub mod features;
pub mod feedback;
pub mod forest;
pub mod ingestion;
pub mod ltr;
pub mod pipeline;
pub mod session;
pub mod shell;
pub mod stats;
pub mod table_store;
pub mod tantivy_index;

use cli::{Cli, Command};
use data_dir::DataDir;
use session::Session;
use table_store::TableStore;
use tantivy_index::SearchIndex;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("TABRANK_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;

    match cli.command {
        Command::Ingest(args) => {
            let store = TableStore::open(&data_dir.tables_db())?;
            let index = SearchIndex::open(&data_dir.tantivy_dir()?)?;

            eprintln!("Ingesting {}...", args.file.display());
            let count = ingestion::ingest_path(&store, &index, &args.file)?;
            eprintln!("Ingested {count} table(s).");
        }
        Command::Search(args) => {
            let mut session = open_session(&data_dir)?;
            session.set_num_results(args.count)?;
            session.set_query(&args.query)?;

            let bundles = session.bundles()?;
            if args.json {
                print_results_json(&args.query, &bundles);
            } else {
                print_results_human(&bundles);
            }
        }
        Command::Shell(args) => {
            let mut session = open_session(&data_dir)?;
            session.set_num_results(args.count)?;
            shell::run(&mut session)?;
        }
        Command::Status(args) => {
            let store = TableStore::open(&data_dir.tables_db())?;
            let count = store.len()?;
            if args.json {
                println!(
                    "{{\"data_dir\":\"{}\",\"tables\":{count}}}",
                    data_dir.root().display()
                );
            } else {
                println!("Data directory: {}", data_dir.root().display());
                println!("Tables: {count}");
            }
        }
        Command::Completions(args) => {
            args.generate();
        }
    }

    Ok(())
}

fn open_session(data_dir: &DataDir) -> error::Result<Session> {
    let store = TableStore::open(&data_dir.tables_db())?;
    let index = SearchIndex::open(&data_dir.tantivy_dir()?)?;
    Ok(Session::new(Arc::new(index), Arc::new(store)))
}

fn print_results_human(bundles: &[assemble::ResultBundle]) {
    if bundles.is_empty() {
        println!("No results found.");
        return;
    }

    for (i, b) in bundles.iter().enumerate() {
        println!("{:>3}. [{:.3}] #{}  {}", i + 1, b.score, b.docno, b.page_title);
        if !b.table_title.is_empty() {
            println!("     {}", b.table_title);
        }
        if !b.url.is_empty() {
            println!("     {}", b.url);
        }
    }
    println!("\n{} result(s)", bundles.len());
}

fn print_results_json(query: &str, bundles: &[assemble::ResultBundle]) {
    print!("{{\"query\":");
    print_json_string(query);
    print!(",\"result_count\":{},\"results\":[", bundles.len());

    for (i, b) in bundles.iter().enumerate() {
        if i > 0 {
            print!(",");
        }
        print!("{{\"docno\":");
        print_json_string(&b.docno);
        print!(",\"score\":{:.6},\"page_title\":", b.score);
        print_json_string(&b.page_title);
        print!(",\"table_title\":");
        print_json_string(&b.table_title);
        print!(",\"url\":");
        print_json_string(&b.url);
        print!("}}");
    }

    println!("]}}");
}

fn print_json_string(s: &str) {
    print!("\"");
    for c in s.chars() {
        match c {
            '"' => print!("\\\""),
            '\\' => print!("\\\\"),
            '\n' => print!("\\n"),
            '\r' => print!("\\r"),
            '\t' => print!("\\t"),
            c if c < '\x20' => print!("\\u{:04x}", c as u32),
            c => print!("{c}"),
        }
    }
    print!("\"");
}
