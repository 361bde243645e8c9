//! tailkit CLI - train a tail-prediction model and suggest keywords for
//! product categories.
//!
//! # Usage
//!
//! ```bash
//! # Train on a triple file, seeding ids from the catalogs
//! tailkit train kg_triples.txt -o model.bin \
//!     --entity-catalog "E&R/entity.csv" --relation-catalog "E&R/relation.csv"
//!
//! # Keywords for categories (JSON on stdout)
//! tailkit keywords --model model.bin ヘルメット 安全靴
//!
//! # Inspect linking without a model
//! tailkit link ヘルメット
//!
//! # Top tails for one (head, relation) pair
//! tailkit tails --model model.bin ヘルメット 属性 -k 10
//!
//! # Filtered MRR / Hits@k on held-out triples
//! tailkit evaluate --model model.bin test.txt
//!
//! # Model summary
//! tailkit stats model.bin
//! ```
//!
//! Table locations default to the conventional names under `--base-dir`;
//! `--assets config.json` overrides them. `RUST_LOG` or `-v` control logging.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tailkit_core::{
    AssetConfig, DenseId, EntityVocab, FeedReport, GraphVocab, LinkingContext, RelationVocab,
    TripleFeed,
};
use tailkit_kge::store::parameter_count;
use tailkit_kge::{
    FilteredEvaluator, KeywordEngine, KeywordLookup, ModelState, Predictor, TailScorer, Trainer,
    TrainingConfig, UntrainedPolicy, DEFAULT_TOP_K,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tailkit")]
#[command(about = "Knowledge-graph tail prediction and keyword suggestion", long_about = None)]
struct Cli {
    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model on a triple file
    Train(TrainArgs),

    /// Predict keywords for leaf categories (JSON output)
    Keywords {
        /// Trained model (.bin)
        #[arg(short, long)]
        model: PathBuf,

        /// Leaf categories
        categories: Vec<String>,

        /// File with one category per line
        #[arg(long)]
        categories_file: Option<PathBuf>,

        /// Tails kept per (entity, relation) pair
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,

        /// Answer with empty mappings when the model file is missing
        #[arg(long)]
        allow_untrained: bool,

        #[command(flatten)]
        assets: AssetArgs,
    },

    /// Show bucket, linked entities and relations for a category
    Link {
        /// Leaf category
        category: String,

        /// Model used to render names instead of tags
        #[arg(short, long)]
        model: Option<PathBuf>,

        #[command(flatten)]
        assets: AssetArgs,
    },

    /// Top tails for a (head, relation) pair
    Tails {
        /// Trained model (.bin)
        #[arg(short, long)]
        model: PathBuf,

        /// Head entity name
        head: String,

        /// Relation name
        relation: String,

        /// Number of tails
        #[arg(short, long, default_value = "10")]
        k: usize,
    },

    /// Filtered rank metrics on held-out triples
    Evaluate {
        /// Trained model (.bin)
        #[arg(short, long)]
        model: PathBuf,

        /// Test triples
        test: PathBuf,

        /// Additional known triples (e.g. the training file) for filtering
        #[arg(long)]
        known: Vec<PathBuf>,

        /// Print metrics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show model statistics
    Stats {
        /// Trained model (.bin)
        model: PathBuf,
    },
}

#[derive(Args)]
struct TrainArgs {
    /// Triple file (tab or comma separated)
    triples: PathBuf,

    /// Output model file
    #[arg(short, long, default_value = "model.bin")]
    output: PathBuf,

    /// JSON asset configuration whose entity and relation catalogs seed ids
    #[arg(long)]
    assets: Option<PathBuf>,

    /// `name,ent_<n>` catalog to seed entity ids (overrides --assets)
    #[arg(long)]
    entity_catalog: Option<PathBuf>,

    /// `name,rel_<n>` catalog to seed relation ids (overrides --assets)
    #[arg(long)]
    relation_catalog: Option<PathBuf>,

    /// Validation triples; their MRR picks the best epoch
    #[arg(long)]
    validation: Option<PathBuf>,

    /// Entity embedding dimension
    #[arg(long, default_value = "200")]
    dim: usize,

    /// Relation embedding dimension
    #[arg(long, default_value = "200")]
    relation_dim: usize,

    /// Number of epochs
    #[arg(long, default_value = "100")]
    epochs: usize,

    /// Batch size
    #[arg(long, default_value = "128")]
    batch_size: usize,

    /// Learning rate
    #[arg(long, default_value = "0.003")]
    lr: f32,

    /// Per-epoch learning-rate decay (1.0 = none)
    #[arg(long, default_value = "1.0")]
    decay: f32,

    /// Label smoothing
    #[arg(long, default_value = "0.0")]
    label_smoothing: f32,

    /// Input dropout
    #[arg(long, default_value = "0.3")]
    input_dropout: f32,

    /// Dropout on the relation-specific core
    #[arg(long, default_value = "0.4")]
    hidden_dropout1: f32,

    /// Dropout after the hidden batch norm
    #[arg(long, default_value = "0.5")]
    hidden_dropout2: f32,

    /// Learn inverse relations (enables head prediction)
    #[arg(long)]
    reciprocal: bool,

    /// Random seed
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Early-stopping patience in epochs (0 disables)
    #[arg(long, default_value = "10")]
    patience: usize,
}

#[derive(Args)]
struct AssetArgs {
    /// JSON asset configuration
    #[arg(long)]
    assets: Option<PathBuf>,

    /// Directory holding the conventional table files
    #[arg(long, default_value = ".")]
    base_dir: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Train(args) => cmd_train(&args),
        Commands::Keywords {
            model,
            categories,
            categories_file,
            top_k,
            allow_untrained,
            assets,
        } => cmd_keywords(
            &model,
            categories,
            categories_file.as_deref(),
            top_k,
            allow_untrained,
            &assets,
        ),
        Commands::Link {
            category,
            model,
            assets,
        } => cmd_link(&category, model.as_deref(), &assets),
        Commands::Tails {
            model,
            head,
            relation,
            k,
        } => cmd_tails(&model, &head, &relation, k),
        Commands::Evaluate {
            model,
            test,
            known,
            json,
        } => cmd_evaluate(&model, &test, &known, json),
        Commands::Stats { model } => cmd_stats(&model),
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_triples(path: &Path) -> Result<FeedReport> {
    let report = TripleFeed::read_file(path)
        .with_context(|| format!("Failed to read triples from {}", path.display()))?;
    if report.skipped() > 0 {
        tracing::warn!(
            path = %path.display(),
            malformed = report.malformed,
            empty_fields = report.empty_fields,
            "skipped triple lines"
        );
    }
    Ok(report)
}

fn load_model(path: &Path) -> Result<ModelState> {
    let start = Instant::now();
    let pb = ProgressBar::new_spinner();
    pb.set_message(format!("Loading {}...", path.display()));
    let state = ModelState::load(path)
        .with_context(|| format!("Failed to load model {}", path.display()))?;
    pb.finish_and_clear();
    tracing::debug!(elapsed = ?start.elapsed(), "model loaded");
    Ok(state)
}

fn load_context(args: &AssetArgs) -> Result<LinkingContext> {
    let config = match &args.assets {
        Some(path) => AssetConfig::from_json_file(path)
            .with_context(|| format!("Failed to read asset config {}", path.display()))?,
        None => AssetConfig::with_base_dir(args.base_dir.clone()),
    };
    LinkingContext::load(&config).context("Failed to load linking tables")
}

fn seed_vocab(args: &TrainArgs) -> Result<GraphVocab> {
    let mut vocab = match &args.assets {
        Some(path) => {
            let config = AssetConfig::from_json_file(path)
                .with_context(|| format!("Failed to read asset config {}", path.display()))?;
            let vocab = config.load_catalogs().context("Failed to read catalogs")?;
            println!(
                "Asset catalogs: {} entities, {} relations",
                vocab.entities.len(),
                vocab.relations.len()
            );
            vocab
        }
        None => GraphVocab::new(),
    };
    if let Some(path) = &args.entity_catalog {
        let (entities, skipped) = EntityVocab::from_catalog_file(path)
            .with_context(|| format!("Failed to read entity catalog {}", path.display()))?;
        println!("Entity catalog: {} names ({} rows skipped)", entities.len(), skipped);
        vocab.entities = entities;
    }
    if let Some(path) = &args.relation_catalog {
        let (relations, skipped) = RelationVocab::from_catalog_file(path)
            .with_context(|| format!("Failed to read relation catalog {}", path.display()))?;
        println!("Relation catalog: {} names ({} rows skipped)", relations.len(), skipped);
        vocab.relations = relations;
    }
    Ok(vocab)
}

/// Raise `flag` on Ctrl-C; training then stops after the current epoch.
fn watch_interrupt(flag: Arc<AtomicBool>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::warn!(error = %e, "Ctrl-C handler unavailable");
            return;
        }
    };
    std::thread::spawn(move || {
        runtime.block_on(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, stopping after the current epoch");
                flag.store(true, Ordering::Relaxed);
            }
        });
    });
}

fn cmd_train(args: &TrainArgs) -> Result<()> {
    let feed = load_triples(&args.triples)?;
    println!(
        "Loaded {} triples ({} lines skipped)",
        feed.facts.len(),
        feed.skipped()
    );

    let config = TrainingConfig::default()
        .with_entity_dim(args.dim)
        .with_relation_dim(args.relation_dim)
        .with_epochs(args.epochs)
        .with_batch_size(args.batch_size)
        .with_learning_rate(args.lr)
        .with_decay_rate(args.decay)
        .with_label_smoothing(args.label_smoothing)
        .with_dropout(args.input_dropout, args.hidden_dropout1, args.hidden_dropout2)
        .with_reciprocal(args.reciprocal)
        .with_seed(args.seed)
        .with_early_stopping((args.patience > 0).then_some(args.patience));

    let pb = ProgressBar::new(args.epochs as u64);
    pb.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} epochs {msg}")
            .context("Invalid progress template")?,
    );
    let progress = pb.clone();

    let interrupt = Arc::new(AtomicBool::new(false));
    watch_interrupt(Arc::clone(&interrupt));

    let mut trainer = Trainer::new(config)
        .with_vocab(seed_vocab(args)?)
        .with_interrupt(interrupt)
        .with_callback(Box::new(move |_, metrics| {
            let msg = match metrics.val_mrr {
                Some(mrr) => format!("loss {:.5} val MRR {:.4}", metrics.loss, mrr),
                None => format!("loss {:.5}", metrics.loss),
            };
            progress.set_message(msg);
            progress.inc(1);
        }));
    if let Some(path) = &args.validation {
        trainer = trainer.with_validation(load_triples(path)?.facts);
    }

    let start = Instant::now();
    let outcome = trainer.train(&feed.facts).context("Training failed")?;
    pb.finish_and_clear();

    println!(
        "Trained {} epochs in {:.2?} (best epoch {}{})",
        outcome.loss_history.len(),
        start.elapsed(),
        outcome.best_epoch + 1,
        if outcome.interrupted {
            ", interrupted"
        } else if outcome.stopped_early {
            ", stopped early"
        } else {
            ""
        }
    );
    if let Some(loss) = outcome.loss_history.last() {
        println!("Final loss:     {:.6}", loss);
    }
    if let Some(mrr) = outcome.validation_mrr.get(outcome.best_epoch) {
        println!("Validation MRR: {:.4}", mrr);
    }

    outcome
        .state
        .save(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    println!("Saved model to {}", args.output.display());
    Ok(())
}

fn cmd_keywords(
    model: &Path,
    mut categories: Vec<String>,
    categories_file: Option<&Path>,
    top_k: usize,
    allow_untrained: bool,
    assets: &AssetArgs,
) -> Result<()> {
    if let Some(path) = categories_file {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        categories.extend(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
        );
    }
    if categories.is_empty() {
        bail!("No categories given");
    }

    let policy = if allow_untrained {
        UntrainedPolicy::EmptyKeywords
    } else {
        UntrainedPolicy::Reject
    };
    let predictor = Predictor::load_or(model, policy)
        .with_context(|| format!("Failed to load model {}", model.display()))?;
    let engine = KeywordEngine::new(load_context(assets)?, predictor).with_top_k(top_k);

    let results: BTreeMap<String, KeywordLookup> = engine
        .predict_all(&categories)
        .context("Keyword prediction failed")?;
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

fn cmd_link(category: &str, model: Option<&Path>, assets: &AssetArgs) -> Result<()> {
    let ctx = load_context(assets)?;
    let vocab = model.map(load_model).transpose()?.map(|s| s.vocab().clone());

    let matched = ctx.resolve_bucket(category);
    println!("Category:  {}", category);
    println!("Matched:   {} ({})", matched, matched.name());

    let Some(linked) = ctx.link(category) else {
        println!("Entities:  NOT_FOUND");
        return Ok(());
    };
    match linked.bucket {
        Some(b) => println!("Bucket:    {} ({})", b, b.name()),
        None => println!("Bucket:    - (fallback relations only)"),
    }

    let entities: Vec<String> = linked
        .entities
        .iter()
        .map(|&id| render(id, vocab.as_ref().and_then(|v| v.entities.text_of(id))))
        .collect();
    let relations: Vec<String> = linked
        .relations
        .iter()
        .map(|&id| render(id, vocab.as_ref().and_then(|v| v.relations.text_of(id))))
        .collect();
    println!("Entities:  {}", entities.join(" "));
    println!("Relations: {}", relations.join(" "));
    Ok(())
}

fn render<I: DenseId>(id: I, name: Option<&str>) -> String {
    match name {
        Some(name) => format!("{}({})", name, id.to_tag()),
        None => id.to_tag(),
    }
}

fn cmd_tails(model: &Path, head: &str, relation: &str, k: usize) -> Result<()> {
    let state = load_model(model)?;
    let vocab = state.vocab();
    let Some(h) = vocab.entities.id_of(head) else {
        bail!("Unknown entity: {}", head);
    };
    let Some(r) = vocab.relations.id_of(relation) else {
        bail!("Unknown relation: {}", relation);
    };

    let predictions = state.predict_tails(h, r, k)?;
    println!("Top {} tails for ({}, {}, ?):", predictions.len(), head, relation);
    for (i, p) in predictions.iter().enumerate() {
        let name = vocab.entities.require_text(p.entity)?;
        println!("{}. {} ({:.6})", i + 1, name, p.score);
    }
    Ok(())
}

fn cmd_evaluate(model: &Path, test: &Path, known: &[PathBuf], json: bool) -> Result<()> {
    let state = load_model(model)?;
    let vocab = state.vocab();

    let (test_triples, unknown) = vocab.encode_known(&load_triples(test)?.facts);
    if unknown > 0 {
        tracing::warn!(unknown, "test triples with names outside the model ignored");
    }
    if test_triples.is_empty() {
        bail!("No evaluable triples in {}", test.display());
    }

    let mut evaluator = FilteredEvaluator::from_triples(&test_triples);
    for path in known {
        let (triples, _) = vocab.encode_known(&load_triples(path)?.facts);
        for t in triples {
            evaluator.add_known(t);
        }
    }

    let start = Instant::now();
    let report = evaluator.evaluate(&state, &test_triples)?;
    tracing::debug!(elapsed = ?start.elapsed(), "evaluation done");

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("Tail prediction: {}", report.tail.summary());
    if let Some(head) = &report.head {
        println!("Head prediction: {}", head.summary());
        println!("Combined:        {}", report.combined().summary());
    }
    Ok(())
}

fn cmd_stats(model: &Path) -> Result<()> {
    let state = load_model(model)?;
    let meta = state.meta();

    println!("Model Statistics");
    println!("================");
    println!("Entities:       {}", meta.num_entities);
    println!("Relations:      {}", meta.num_relations);
    println!("Entity dim:     {}", meta.entity_dim);
    println!("Relation dim:   {}", meta.relation_dim);
    println!("Reciprocal:     {}", meta.reciprocal);
    println!("Parameters:     {}", parameter_count(meta));
    println!("Head prediction: {}", state.supports_head_prediction());
    Ok(())
}
