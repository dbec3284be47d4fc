//! Command-line driver for attribute extraction
//!
//! Builds the on-disk dictionary index, extracts attributes from utterances and
//! evaluates a labelled batch. Without `--dictionary` or `--sqlite` the embedded
//! demo wine dictionary is used.
//!
//! Run with: cargo run -p attrex-cli -- extract "red chateau lator"

use anyhow::{bail, Context, Result};
use attrex::source::read_csv;
use attrex::{AttributeExtractor, DictionaryIndex, DictionarySource, ExtractorConfig, IndexConfig};
use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory of the on-disk index. Built on first use; RAM index when omitted.
    #[arg(short, long, global = true)]
    index: Option<PathBuf>,

    /// Dictionary CSV (text_value,attribute_code[,node_id])
    #[arg(short, long, global = true, conflicts_with = "sqlite")]
    dictionary: Option<PathBuf>,

    /// SQLite database holding the dictionary source table
    #[arg(long, global = true)]
    sqlite: Option<PathBuf>,

    /// Source table inside the SQLite database
    #[arg(long, global = true, default_value = "domain_dictionary")]
    table: String,

    /// Category treated as dominant (default: the most frequent one)
    #[arg(long, global = true)]
    dominant_category: Option<String>,

    /// JSON extractor configuration
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the on-disk index from the dictionary source
    BuildIndex {
        /// Remove an existing index first
        #[arg(long)]
        force: bool,
    },
    /// Extract attributes from each utterance
    Extract {
        #[arg(required = true)]
        utterances: Vec<String>,
    },
    /// Compare extracted attributes with labelled cases
    Evaluate {
        /// Cases CSV (sentence,expected as a JSON array); embedded cases when omitted
        #[arg(long)]
        cases: Option<PathBuf>,

        /// Print every case, not only mismatches
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "attrex=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match &args.command {
        Command::BuildIndex { force } => build_index(&args, *force),
        Command::Extract { utterances } => extract(&args, utterances),
        Command::Evaluate { cases, verbose } => evaluate(&args, cases.as_ref(), *verbose),
    }
}

fn dictionary_source(args: &Args) -> Result<DictionarySource> {
    let source = if let Some(path) = &args.dictionary {
        DictionarySource::Csv(path.clone())
    } else if let Some(path) = &args.sqlite {
        DictionarySource::Sqlite {
            path: path.clone(),
            table: args.table.clone(),
        }
    } else {
        let entries = read_csv(demo_dictionary::dictionary_reader())
            .context("Failed to read the embedded demo dictionary")?;
        DictionarySource::Entries(entries)
    };
    Ok(source)
}

fn index_config(args: &Args) -> IndexConfig {
    IndexConfig {
        dominant_category: args.dominant_category.clone(),
        ..IndexConfig::default()
    }
}

fn open_index(args: &Args) -> Result<DictionaryIndex> {
    let source = dictionary_source(args)?;
    let config = index_config(args);
    let index = match &args.index {
        Some(path) => DictionaryIndex::open_or_build(path, &source, &config)
            .with_context(|| format!("Failed to open index at {}", path.display()))?,
        None => {
            let entries = source.load().context("Failed to load dictionary")?;
            DictionaryIndex::in_memory(entries, &config)?
        }
    };
    tracing::info!(docs = index.num_docs(), "dictionary index ready");
    Ok(index)
}

fn extractor(args: &Args) -> Result<AttributeExtractor<DictionaryIndex>> {
    let config = match &args.config {
        Some(path) => ExtractorConfig::from_json_file(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => ExtractorConfig::default(),
    };
    Ok(AttributeExtractor::new(open_index(args)?, config)?)
}

fn build_index(args: &Args, force: bool) -> Result<()> {
    let Some(path) = &args.index else {
        bail!("build-index needs --index <DIR>");
    };
    if force && path.exists() {
        std::fs::remove_dir_all(path)
            .with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    let index = open_index(args)?;
    println!("{} documents indexed at {}", index.num_docs(), path.display());
    Ok(())
}

fn extract(args: &Args, utterances: &[String]) -> Result<()> {
    let extractor = extractor(args)?;
    for (utterance, result) in utterances.iter().zip(extractor.extract_batch(utterances)) {
        let attributes = result.with_context(|| format!("Extraction failed for {:?}", utterance))?;
        println!("{}\t{}", utterance, serde_json::to_string(&attributes)?);
    }
    Ok(())
}

fn evaluate(args: &Args, cases_path: Option<&PathBuf>, verbose: bool) -> Result<()> {
    let cases = match cases_path {
        Some(path) => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            demo_dictionary::parse_cases(file)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?
        }
        None => demo_dictionary::cases().to_vec(),
    };
    if cases.is_empty() {
        bail!("no cases to evaluate");
    }

    let extractor = extractor(args)?;
    let sentences: Vec<&str> = cases.iter().map(|c| c.sentence.as_str()).collect();
    let results = extractor.extract_batch(&sentences);

    let mut exact = 0usize;
    let mut failed = 0usize;
    for (case, result) in cases.iter().zip(results) {
        let expected: BTreeSet<String> = case.expected.iter().map(|s| s.to_lowercase()).collect();
        match result {
            Ok(found) if found == expected => {
                exact += 1;
                if verbose {
                    println!("ok    {:?} -> {:?}", case.sentence, found);
                }
            }
            Ok(found) => {
                println!("diff  {:?}\n      expected {:?}\n      found    {:?}", case.sentence, expected, found);
            }
            Err(e) => {
                failed += 1;
                println!("error {:?}: {}", case.sentence, e);
            }
        }
    }

    let total = cases.len();
    println!(
        "exact matches: {}/{} ({:.1}%), errors: {}",
        exact,
        total,
        exact as f64 * 100.0 / total as f64,
        failed
    );
    Ok(())
}
