use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use hoi_dataset::GroundTruth;
use hoi_dataset::tables::{self, TermColumn};
use hoi_freq::client::{DEFAULT_BASE_URL, DEFAULT_CORPUS, DEFAULT_TIMEOUT};
use hoi_freq::{
    BatchRunner, ClientConfig, CombinePolicy, DatasetMerger, ExecutionMode, FreqOptions,
    FreqOutputs, FreqPipeline, FrequencyAggregator, MergeMode, NgramClient, SideTables,
    WorkerPool,
};
use hoi_types::{parse_action_line, parse_action_list};

const DEFAULT_RATE_LIMIT_BURST: u32 = 10;

#[derive(Parser)]
#[command(name = "hoi-freq")]
#[command(about = "Estimate interaction frequencies from n-gram counts and reconcile them with a ground-truth dataset")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate corpus frequencies for verb-object actions.
    Freq(FreqArgs),
    /// Export the ground-truth store as interaction, verb and object tables.
    Interactions {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Join ground-truth and corpus frequency tables.
    Merge(MergeArgs),
}

#[derive(Args)]
struct FreqArgs {
    /// Action list, one `verb,object` pair per line.
    #[arg(long, conflicts_with = "text", required_unless_present = "text")]
    file: Option<PathBuf>,
    /// Single `verb,object` pair.
    #[arg(long)]
    text: Option<String>,
    #[arg(long)]
    ignore_header: bool,
    /// Convert underscores to spaces (and `no_interaction` to "and") before querying.
    #[arg(long)]
    parse_underscore: bool,
    /// Query every distinct verb against every distinct object.
    #[arg(long, alias = "get-every-combination")]
    every_combination: bool,
    #[arg(long)]
    parallel: bool,
    /// Worker count for --parallel; defaults to one per core.
    #[arg(long)]
    workers: Option<usize>,
    #[arg(long, value_enum, default_value_t = CombinePolicy::Max)]
    policy: CombinePolicy,
    /// Write interaction, verb and object tables named after the input file.
    #[arg(long, requires = "file")]
    save: bool,
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
}

#[derive(Args)]
struct MergeArgs {
    #[arg(long)]
    file_hoi: PathBuf,
    #[arg(long)]
    file_ngrams: PathBuf,
    #[arg(long)]
    file_verb_hoi: PathBuf,
    #[arg(long)]
    file_obj_hoi: PathBuf,
    #[arg(long)]
    file_verb_ngrams: PathBuf,
    #[arg(long)]
    file_obj_ngrams: PathBuf,
    #[arg(long)]
    output: PathBuf,
    /// Outer-join interactions missing from either table instead of failing.
    #[arg(long)]
    allow_mismatch: bool,
}

#[derive(Debug, Clone)]
struct Config {
    base_url: String,
    corpus: String,
    timeout: Duration,
    rate_limit_rps: u32,
    rate_limit_burst: u32,
}

impl Config {
    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            corpus: self.corpus.clone(),
            timeout: self.timeout,
            rate_limit: (self.rate_limit_rps > 0)
                .then_some((self.rate_limit_rps, self.rate_limit_burst)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config();

    match cli.command {
        Commands::Freq(args) => run_freq(args, &config).await,
        Commands::Interactions { file, output_dir } => run_interactions(&file, &output_dir),
        Commands::Merge(args) => run_merge(&args),
    }
}

async fn run_freq(args: FreqArgs, config: &Config) -> Result<()> {
    let actions = match (&args.file, &args.text) {
        (Some(path), _) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading actions from {}", path.display()))?;
            parse_action_list(&text, args.ignore_header)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        (None, Some(text)) => vec![parse_action_line(text, 1)?],
        (None, None) => bail!("provide either --file or --text"),
    };

    info!("querying {} ({})", config.base_url, config.corpus);
    let client = NgramClient::new(config.client_config())?;
    let mode = if args.parallel {
        ExecutionMode::Parallel(args.workers.map_or_else(WorkerPool::per_core, WorkerPool::new))
    } else {
        ExecutionMode::Sequential
    };
    let options = FreqOptions {
        parse_underscore: args.parse_underscore,
        every_combination: args.every_combination,
    };
    let pipeline = FreqPipeline::new(
        BatchRunner::new(FrequencyAggregator::new(client, args.policy), mode),
        options,
    );

    let start = Instant::now();
    let actions = pipeline.expand(actions);
    let records = pipeline
        .estimate(&actions, |record| println!("{}", record.to_line()))
        .await?;
    info!(
        "estimated {} interactions in {} ms",
        records.len(),
        start.elapsed().as_millis()
    );

    let Some(input) = args.file.as_deref().filter(|_| args.save) else {
        return Ok(());
    };
    let terms = pipeline
        .term_tables(&actions, |t| println!("{},{}", t.term, t.frequency))
        .await?;
    let outputs = FreqOutputs::new(&args.output_dir, &file_stem(input)?, pipeline.options());
    outputs
        .write(&records, &terms)
        .with_context(|| format!("writing tables to {}", args.output_dir.display()))?;
    Ok(())
}

fn run_interactions(file: &Path, output_dir: &Path) -> Result<()> {
    let gt = GroundTruth::load(file)?;
    let stem = file_stem(file)?;

    let interactions_path = output_dir.join(format!("{stem}_interactions.csv"));
    tables::write_path(&interactions_path, |w| {
        tables::write_ground_truth_table(w, gt.interactions())
    })
    .with_context(|| format!("writing {}", interactions_path.display()))?;

    let objects_path = output_dir.join(format!("{stem}_objects.csv"));
    tables::write_path(&objects_path, |w| {
        tables::write_term_table(w, TermColumn::Object, gt.objects())
    })
    .with_context(|| format!("writing {}", objects_path.display()))?;

    let verbs_path = output_dir.join(format!("{stem}_verbs.csv"));
    tables::write_path(&verbs_path, |w| {
        tables::write_term_table(w, TermColumn::Verb, gt.verbs())
    })
    .with_context(|| format!("writing {}", verbs_path.display()))?;

    println!(
        "Files saved as: {}, {}, {}",
        interactions_path.display(),
        objects_path.display(),
        verbs_path.display()
    );
    Ok(())
}

fn run_merge(args: &MergeArgs) -> Result<()> {
    let ground_truth = read_table(&args.file_hoi, tables::read_ground_truth_table)?;
    let corpus = read_table(&args.file_ngrams, tables::read_frequency_table)?;
    let side = SideTables {
        ground_truth_verbs: read_table(&args.file_verb_hoi, |f| {
            tables::read_term_table(f, TermColumn::Verb)
        })?,
        ground_truth_objects: read_table(&args.file_obj_hoi, |f| {
            tables::read_term_table(f, TermColumn::Object)
        })?,
        corpus_verbs: read_table(&args.file_verb_ngrams, |f| {
            tables::read_term_table(f, TermColumn::Verb)
        })?,
        corpus_objects: read_table(&args.file_obj_ngrams, |f| {
            tables::read_term_table(f, TermColumn::Object)
        })?,
    };

    let mode = if args.allow_mismatch {
        MergeMode::AllowMismatch
    } else {
        MergeMode::Strict
    };
    let merger = DatasetMerger::new(mode);
    info!(
        "merging {} with {} ({:?})",
        args.file_hoi.display(),
        args.file_ngrams.display(),
        merger.mode()
    );
    let rows = merger.merge(&ground_truth, &corpus, &side)?;

    tables::write_path(&args.output, |w| tables::write_merged_table(w, &rows))
        .with_context(|| format!("writing {}", args.output.display()))?;
    println!("File saved to {}", args.output.display());
    Ok(())
}

fn read_table<T>(
    path: &Path,
    read: impl FnOnce(fs::File) -> Result<T, tables::TableError>,
) -> Result<T> {
    tables::read_path(path, read).with_context(|| format!("reading {}", path.display()))
}

fn file_stem(path: &Path) -> Result<String> {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .with_context(|| format!("{} has no file name", path.display()))
}

fn load_config() -> Config {
    let base_url = env::var("NGRAMS_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
    let corpus = env::var("NGRAMS_CORPUS").unwrap_or_else(|_| DEFAULT_CORPUS.to_string());
    let timeout_secs = env::var("NGRAMS_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_TIMEOUT.as_secs());
    let rate_limit_rps = env::var("NGRAMS_RATE_LIMIT_RPS")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0);
    let rate_limit_burst = env::var("NGRAMS_RATE_LIMIT_BURST")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_RATE_LIMIT_BURST);

    Config {
        base_url,
        corpus,
        timeout: Duration::from_secs(timeout_secs),
        rate_limit_rps,
        rate_limit_burst,
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let max_level = env_filter
        .max_level_hint()
        .and_then(|hint| hint.into_level())
        .unwrap_or(Level::INFO);
    // Result lines go to stdout.
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_max_level(max_level)
        .init();
}
