use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use folio_core::tokenizer::{parse_query, Normalizer};
use folio_core::topics::{read_topics, run_topics, write_run};
use folio_core::{BuildConfig, IndexBuilder, Ranker};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "folio-indexer")]
#[command(about = "Build and query a letter-sharded inverted index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from a corpus directory or file
    Build {
        /// Corpus path (directory walked recursively, or a single file)
        #[arg(long)]
        corpus: PathBuf,
        /// Output root; the index lands in <output>/index or <output>/indexStem
        #[arg(long)]
        output: PathBuf,
        /// JSON build configuration; flags below override it
        #[arg(long)]
        config: Option<PathBuf>,
        /// Stem tokens and build the stemmed variant
        #[arg(long, default_value_t = false)]
        stem: bool,
        /// Documents per temporary segment
        #[arg(long)]
        batch_size: Option<usize>,
        /// Minimum corpus frequency for a term to be indexed
        #[arg(long)]
        min_tf: Option<u64>,
        /// Concurrent merge pairs per pass
        #[arg(long)]
        merge_workers: Option<usize>,
    },
    /// Rank documents for a free-text query
    Query {
        /// Output root the index was built into
        #[arg(long)]
        index: PathBuf,
        /// Query the stemmed variant
        #[arg(long, default_value_t = false)]
        stem: bool,
        /// Treat the query words as final terms (no normalisation or stemming)
        #[arg(long, default_value_t = false)]
        raw: bool,
        /// Topic file to run in batch (TREC <top> blocks or `ID text` lines)
        #[arg(long, conflicts_with = "raw")]
        queries: Option<PathBuf>,
        /// Where batch results go; stdout when omitted
        #[arg(long, requires = "queries")]
        out: Option<PathBuf>,
        /// Run tag written in the last column of batch results
        #[arg(long, default_value = "folio")]
        run_id: String,
        /// Query text
        #[arg(required_unless_present = "queries")]
        query: Vec<String>,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { corpus, output, config, stem, batch_size, min_tf, merge_workers } => {
            let mut cfg = match config {
                Some(path) => BuildConfig::from_json_file(&path)?,
                None => BuildConfig::default(),
            };
            cfg.stem |= stem;
            if batch_size.is_some() {
                cfg.batch_size = batch_size;
            }
            if let Some(min_tf) = min_tf {
                cfg.min_total_tf = min_tf;
            }
            if let Some(workers) = merge_workers {
                cfg.merge_workers = workers;
            }
            build_index(&corpus, &output, cfg)
        }
        Commands::Query { index, stem, raw, queries, out, run_id, query } => match queries {
            Some(topics) => run_batch(&index, stem, &topics, out.as_deref(), &run_id),
            None => run_query(&index, stem, raw, &query),
        },
    }
}

fn build_index(corpus: &Path, output: &Path, cfg: BuildConfig) -> Result<()> {
    let started = std::time::Instant::now();
    let summary = IndexBuilder::new(cfg)
        .build(corpus, output)
        .with_context(|| format!("building index from {}", corpus.display()))?;
    tracing::info!(
        dir = %summary.index_dir.display(),
        num_docs = summary.num_docs,
        terms = summary.split.kept_terms,
        dropped = summary.split.dropped_terms,
        segments = summary.segments_written,
        took_s = started.elapsed().as_secs_f64(),
        "index build complete"
    );
    Ok(())
}

fn run_query(index: &Path, stem: bool, raw: bool, query: &[String]) -> Result<()> {
    let terms = if raw {
        query.to_vec()
    } else {
        parse_query(&Normalizer::default(), &query.join(" "), stem)
    };
    let ranker = Ranker::open(index, stem).with_context(|| format!("opening index under {}", index.display()))?;
    let hits = ranker.rank(&terms)?;
    for (rank, hit) in hits.iter().enumerate() {
        println!("{}\t{}\t{:.6}\t{}", rank + 1, hit.doc_id, hit.score, hit.entities.join(", "));
    }
    tracing::info!(terms = terms.len(), hits = hits.len(), "query complete");
    Ok(())
}

fn run_batch(index: &Path, stem: bool, topics_file: &Path, out: Option<&Path>, run_id: &str) -> Result<()> {
    let topics = read_topics(topics_file).with_context(|| format!("reading topics from {}", topics_file.display()))?;
    let ranker = Ranker::open(index, stem).with_context(|| format!("opening index under {}", index.display()))?;
    let results = run_topics(&ranker, &Normalizer::default(), &topics, stem)?;

    let mut writer: Box<dyn Write> = match out {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    };
    for (topic, hits) in &results {
        write_run(&mut writer, topic, hits, run_id)?;
    }
    writer.flush()?;
    tracing::info!(topics = results.len(), "batch query complete");
    Ok(())
}
