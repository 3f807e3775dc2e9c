//! Binary entry point for the rindex CLI.
#![forbid(unsafe_code)]

#[path = "cli/config.rs"]
mod config;
#[path = "cli/ui.rs"]
mod ui;

use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use rindex::{
    admin::{stats, verify, AdminOpenOptions, StatsReport, VerifyLevel, VerifyReport},
    index::{
        journal_file_name, IdentityRewriter, IndexConstructor, IndexConstructorOptions, JournalTerm,
        JournalWriter, ReverseIndexReader,
    },
    primitives::array::ArrayOptions,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::CliConfig;
use crate::ui::{format_duration, Ui};

#[derive(Parser, Debug)]
#[command(
    name = "rindex",
    version,
    about = "Build and inspect disk-resident reverse indexes",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "FILE",
        env = "RINDEX_CONFIG",
        help = "CLI config file (defaults to the user config dir)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(long, global = true, help = "Suppress progress output")]
    quiet: bool,

    #[command(flatten)]
    open: OpenArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct OpenArgs {
    #[arg(long, global = true, value_name = "FILE", help = "Words tree file")]
    words: Option<PathBuf>,

    #[arg(long, global = true, value_name = "FILE", help = "Docs file")]
    docs: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_name = "WORDS",
        help = "Largest array kept in one mapping before paging"
    )]
    max_single_words: Option<u64>,

    #[arg(long, global = true, value_name = "WORDS", help = "Page size for paged arrays")]
    page_words: Option<u64>,
}

#[derive(Args, Debug)]
struct BuildCmd {
    #[arg(value_name = "JOURNAL_DIR", help = "Directory holding index-journal-<n>.dat shards")]
    journal_dir: PathBuf,

    #[arg(long, value_name = "DIR", help = "Directory for temporary files")]
    work_dir: Option<PathBuf>,

    #[arg(long, help = "Worker threads (0 uses every CPU)")]
    threads: Option<usize>,

    #[arg(long, value_name = "WORDS", help = "Largest span sorted in memory")]
    memory_sort_limit: Option<u64>,

    #[arg(long, value_name = "WORDS", help = "Span length above which sorts run in parallel")]
    parallel_sort_threshold: Option<u64>,
}

#[derive(Args, Debug)]
struct ImportJournalCmd {
    #[arg(value_name = "CSV", help = "CSV with doc_id,term_id,metadata columns")]
    csv: PathBuf,

    #[arg(long = "out", value_name = "DIR", required = true, help = "Directory for the shard files")]
    out_dir: PathBuf,

    #[arg(long, default_value_t = 1, help = "Number of shards to spread documents over")]
    shards: u32,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Build an index from journal shards")]
    Build(BuildCmd),

    #[command(about = "Print the documents containing each word")]
    Query {
        #[arg(value_name = "WORD", required = true)]
        word_ids: Vec<u64>,
    },

    #[command(about = "Verify on-disk structures")]
    Verify {
        #[arg(
            long,
            value_enum,
            default_value_t = VerifyLevelArg::Fast,
            help = "Verification level"
        )]
        level: VerifyLevelArg,
    },

    #[command(about = "Print index statistics")]
    Stats,

    #[command(about = "Write journal shards from a CSV file")]
    ImportJournal(ImportJournalCmd),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum VerifyLevelArg {
    Fast,
    Full,
}

impl From<VerifyLevelArg> for VerifyLevel {
    fn from(level: VerifyLevelArg) -> Self {
        match level {
            VerifyLevelArg::Fast => VerifyLevel::Fast,
            VerifyLevelArg::Full => VerifyLevel::Full,
        }
    }
}

#[derive(Debug, Deserialize)]
struct JournalRow {
    doc_id: u64,
    term_id: u64,
    metadata: u8,
}

#[derive(Debug, Serialize)]
struct QueryResult {
    word_id: u64,
    documents: Option<Vec<u64>>,
}

#[derive(Debug, Serialize)]
struct BuildSummary {
    built: bool,
    words: String,
    docs: String,
    elapsed_ms: u64,
}

#[derive(Debug, Serialize)]
struct ImportSummary {
    documents: u64,
    shards: Vec<String>,
}

fn main() {
    install_tracing_subscriber();
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn install_tracing_subscriber() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.clone())?;
    debug!(path = ?config.path(), "cli.config");
    let array = build_array_options(&cli.open, &config);
    let ui = Ui::new(cli.quiet || cli.format == OutputFormat::Json);

    match cli.command {
        Command::Build(cmd) => {
            let (words, docs) = index_paths(&cli.open, &config)?;
            let options = build_constructor_options(&cmd, &config, array);
            let constructor = IndexConstructor::new(&docs, &words, IdentityRewriter, options);
            let heartbeat = ui.heartbeat();
            let built = constructor.create_reverse_index(&heartbeat, "build", &cmd.journal_dir)?;
            let elapsed = heartbeat.finish();
            let summary = BuildSummary {
                built,
                words: words.display().to_string(),
                docs: docs.display().to_string(),
                elapsed_ms: elapsed.as_millis() as u64,
            };
            emit(cli.format, &summary, || {
                if built {
                    ui.success(&format!(
                        "Built {} and {} in {}",
                        summary.words,
                        summary.docs,
                        format_duration(elapsed)
                    ))
                } else {
                    ui.notice(&format!(
                        "No journal shards in {}; nothing written",
                        cmd.journal_dir.display()
                    ))
                }
            })?;
        }
        Command::Query { word_ids } => {
            let (words, docs) = index_paths(&cli.open, &config)?;
            let reader = ReverseIndexReader::open(&docs, &words, &array)?;
            let results = word_ids
                .into_iter()
                .map(|word_id| {
                    Ok(QueryResult {
                        word_id,
                        documents: reader.documents(word_id)?,
                    })
                })
                .collect::<Result<Vec<_>, rindex::types::IndexError>>()?;
            emit(cli.format, &results, || print_query_text(&results))?;
        }
        Command::Verify { level } => {
            let (words, docs) = index_paths(&cli.open, &config)?;
            let opts = AdminOpenOptions::default().with_array_options(array);
            let report = verify(&words, &docs, &opts, level.into())?;
            emit(cli.format, &report, || print_verify_text(&ui, &report))?;
            if !report.success {
                std::process::exit(2);
            }
        }
        Command::Stats => {
            let (words, docs) = index_paths(&cli.open, &config)?;
            let opts = AdminOpenOptions::default().with_array_options(array);
            let report = stats(&words, &docs, &opts)?;
            emit(cli.format, &report, || print_stats_text(&ui, &report))?;
        }
        Command::ImportJournal(cmd) => {
            let summary = import_journal(&cmd)?;
            emit(cli.format, &summary, || {
                ui.success(&format!(
                    "Wrote {} documents into {} shards",
                    summary.documents,
                    summary.shards.len()
                ))
            })?;
        }
    }

    Ok(())
}

fn index_paths(args: &OpenArgs, config: &CliConfig) -> Result<(PathBuf, PathBuf), Box<dyn Error>> {
    let words = args
        .words
        .clone()
        .or_else(|| config.words_path().cloned())
        .ok_or("no words file: pass --words or set index.words in the config")?;
    let docs = args
        .docs
        .clone()
        .or_else(|| config.docs_path().cloned())
        .ok_or("no docs file: pass --docs or set index.docs in the config")?;
    Ok((words, docs))
}

fn build_array_options(args: &OpenArgs, config: &CliConfig) -> ArrayOptions {
    let mut opts = ArrayOptions::default();
    if let Some(words) = args.max_single_words.or(config.array().max_single_words) {
        opts = opts.with_max_single_words(words);
    }
    if let Some(words) = args.page_words.or(config.array().page_words) {
        opts = opts.with_page_words(words);
    }
    opts
}

fn build_constructor_options(cmd: &BuildCmd, config: &CliConfig, array: ArrayOptions) -> IndexConstructorOptions {
    let build = config.build();
    let work_dir = cmd
        .work_dir
        .clone()
        .or_else(|| build.work_dir.clone())
        .unwrap_or_else(std::env::temp_dir);
    let mut opts = IndexConstructorOptions::new(work_dir).with_array_options(array);
    if let Some(threads) = cmd.threads.or(build.threads) {
        opts = opts.with_threads(threads);
    }
    if let Some(words) = cmd.memory_sort_limit.or(build.memory_sort_limit) {
        opts = opts.with_memory_sort_limit(words);
    }
    if let Some(words) = cmd.parallel_sort_threshold.or(build.parallel_sort_threshold) {
        opts = opts.with_parallel_sort_threshold(words);
    }
    opts
}

/// Groups CSV rows by document and spreads the documents over shard files
/// round-robin, in ascending document order.
fn import_journal(cmd: &ImportJournalCmd) -> Result<ImportSummary, Box<dyn Error>> {
    if cmd.shards == 0 {
        return Err("--shards must be at least 1".into());
    }
    let mut documents: BTreeMap<u64, Vec<JournalTerm>> = BTreeMap::new();
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(&cmd.csv)?;
    for row in reader.deserialize() {
        let row: JournalRow = row?;
        documents
            .entry(row.doc_id)
            .or_default()
            .push(JournalTerm::new(row.term_id, row.metadata));
    }

    fs::create_dir_all(&cmd.out_dir)?;
    let paths: Vec<PathBuf> = (0..cmd.shards)
        .map(|n| cmd.out_dir.join(journal_file_name(n)))
        .collect();
    let mut writers = paths
        .iter()
        .map(JournalWriter::create)
        .collect::<Result<Vec<_>, _>>()?;
    let shards = writers.len();
    for (i, (doc_id, terms)) in documents.iter().enumerate() {
        writers[i % shards].put(*doc_id, terms)?;
    }
    let mut total = 0;
    for writer in writers {
        total += writer.finish()?;
    }
    Ok(ImportSummary {
        documents: total,
        shards: paths.iter().map(|p| p.display().to_string()).collect(),
    })
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: FnOnce(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn print_query_text(results: &[QueryResult]) {
    for result in results {
        match &result.documents {
            Some(docs) => {
                let ids: Vec<String> = docs.iter().map(u64::to_string).collect();
                println!("{}: {}", result.word_id, ids.join(" "));
            }
            None => println!("{}: not found", result.word_id),
        }
    }
}

fn print_stats_text(ui: &Ui, report: &StatsReport) {
    ui.section(
        "Words tree",
        [
            ("entries", report.words.entries.to_string()),
            ("layers", report.words.layers.to_string()),
            ("index_offset", report.words.index_offset.to_string()),
            ("data_offset", report.words.data_offset.to_string()),
        ],
    );
    let longest = match report.postings.longest_run_word {
        Some(word) => format!("{} (word {word})", report.postings.longest_run),
        None => "-".to_string(),
    };
    ui.section(
        "Postings",
        [
            ("total", report.postings.total.to_string()),
            ("longest_run", longest),
            ("mean_run", format!("{:.2}", report.postings.mean_run)),
        ],
    );
    ui.section(
        "Filesystem",
        [
            (
                "words",
                format!("{} ({} bytes)", report.filesystem.words_path, report.filesystem.words_size_bytes),
            ),
            (
                "docs",
                format!("{} ({} bytes)", report.filesystem.docs_path, report.filesystem.docs_size_bytes),
            ),
        ],
    );
}

fn print_verify_text(ui: &Ui, report: &VerifyReport) {
    println!(
        "Verify ({:?}) => success={} words={} index_entries={} runs={} postings={}",
        report.level,
        report.success,
        report.counts.words,
        report.counts.index_entries,
        report.counts.runs,
        report.counts.postings,
    );
    ui.list(
        "Findings",
        report
            .findings
            .iter()
            .map(|finding| format!("{:?}: {}", finding.severity, finding.message)),
    );
}
