//! Dataset preprocessing binary.
//!
//! Runs the dictionary-build and encode passes over a calendar record file,
//! reports pass statistics, and saves the materialized dataset checkpoint.

use calprep::checkpoint::save_dataset;
use calprep::data::encoder::PassStats;
use calprep::{CalendarDataset, LengthSortedBatchSampler, PrepConfig};
use clap::Parser;
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(
    name = "calprep-preprocess",
    about = "Prepare calendar-event training examples for next-slot prediction"
)]
struct Args {
    /// Training record CSV file
    #[arg(long, default_value = "data/train.csv")]
    records: PathBuf,

    /// Optional validation record CSV file (encoded with the frozen vocabulary)
    #[arg(long)]
    valid: Option<PathBuf>,

    /// Optional test record CSV file (encoded with the frozen vocabulary)
    #[arg(long)]
    test: Option<PathBuf>,

    /// Pretrained word-vector file (token followed by its vector per line)
    #[arg(long)]
    embeddings: Option<PathBuf>,

    /// Output checkpoint file
    #[arg(long, default_value = "data/output/dataset.json")]
    out: PathBuf,

    /// Word-vector dimension
    #[arg(long, default_value_t = 300)]
    embedding_dim: usize,

    /// Minibatch size
    #[arg(long, default_value_t = 16)]
    batch_size: usize,

    /// Duration rounding unit in minutes
    #[arg(long, default_value_t = 30)]
    duration_unit: u32,

    /// Maximum registration-to-start distance in weeks
    #[arg(long, default_value_t = 2)]
    max_reg_distance: i32,

    /// Maximum snapshot size for emission (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_snapshot: usize,

    /// Ceiling on emitted examples per user
    #[arg(long, default_value_t = 5000)]
    max_events_per_user: usize,

    /// Words must occur strictly more often than this to enter the vocabulary
    #[arg(long, default_value_t = 0)]
    min_word_count: usize,

    /// Maximum tokens per title before the week is invalidated
    #[arg(long, default_value_t = 50)]
    max_title_tokens: usize,

    /// Maximum characters per token before the week is invalidated
    #[arg(long, default_value_t = 50)]
    max_token_chars: usize,

    /// Divisor collapsing fine slots into prediction classes
    #[arg(long, default_value_t = 2)]
    class_divisor: usize,

    /// Total fine time slots per week
    #[arg(long, default_value_t = 336)]
    total_slots: usize,

    /// Lowercase title tokens
    #[arg(long, default_value_t = false)]
    lowercase: bool,

    /// Worker threads for parallel batch assembly
    #[arg(long, default_value_t = 5)]
    workers: usize,
}

fn print_stats(label: &str, stats: &PassStats) {
    println!("## {label}");
    println!("  examples            {}", stats.examples);
    println!("  weeks seen          {}", stats.weeks_seen);
    println!("  dropped (dup slot)  {}", stats.dropped_duplicate_slot);
    println!("  filtered out        {}", stats.filtered_out);
    if let Some(min) = stats.min_duration {
        println!("  duration range      {}..{} min", min, stats.max_duration);
    }
    println!("  max snapshot        {}", stats.max_snapshot);
}

fn run(args: &Args) -> Result<(), String> {
    let config = PrepConfig {
        word_embedding_dim: args.embedding_dim,
        batch_size: args.batch_size,
        duration_unit: args.duration_unit,
        max_registration_start_distance: args.max_reg_distance,
        max_snapshot_size: if args.max_snapshot == 0 {
            usize::MAX
        } else {
            args.max_snapshot
        },
        max_event_count_per_user: args.max_events_per_user,
        min_word_occurrence: args.min_word_count,
        max_title_token_count: args.max_title_tokens,
        max_token_char_length: args.max_token_chars,
        class_divisor: args.class_divisor,
        total_slot_count: args.total_slots,
        lowercase_tokens: args.lowercase,
        route_users_to_unk: true,
        worker_count: args.workers,
    };
    config.validate().map_err(|e| e.to_string())?;

    rayon::ThreadPoolBuilder::new()
        .num_threads(config.worker_count)
        .build_global()
        .map_err(|e| format!("Failed to size worker pool: {e}"))?;

    println!("### processing {}", args.records.display());
    let mut dataset = CalendarDataset::build(
        &args.records,
        args.embeddings.as_deref(),
        config,
    )
    .map_err(|e| e.to_string())?;

    print_stats("train", &dataset.stats);
    println!(
        "  vocab sizes         chars {} words {} users {} durations {}",
        dataset.vocab.chars.len(),
        dataset.vocab.words.len(),
        dataset.vocab.users.len(),
        dataset.vocab.durations.len()
    );
    println!(
        "  title bounds        max word len {} max sent len {}",
        dataset.sizes.max_word_len, dataset.sizes.max_sent_len
    );
    println!("  invalid weeks       {}", dataset.invalid_weeks.len());

    let counts = dataset.class_counts();
    println!(
        "  class counts        min {} max {}",
        counts.iter().min().unwrap_or(&0),
        counts.iter().max().unwrap_or(&0)
    );
    match dataset.class_weights() {
        Ok(weights) => println!(
            "  class weights       min {:.4} max {:.4}",
            weights.iter().cloned().fold(f32::INFINITY, f32::min),
            weights.iter().cloned().fold(f32::NEG_INFINITY, f32::max)
        ),
        Err(e) => println!("  class weights       unavailable ({e})"),
    }

    for (label, path) in [("valid", &args.valid), ("test", &args.test)] {
        if let Some(path) = path {
            println!("\n### processing {}", path.display());
            let outcome = dataset.encode_split(path).map_err(|e| e.to_string())?;
            print_stats(label, &outcome.stats);
        }
    }

    let sampler = LengthSortedBatchSampler::new(
        dataset.lengths(),
        dataset.config.batch_size,
        true,
        0,
    );
    println!(
        "\nsampler: {} examples in {} batches",
        sampler.len(),
        sampler.num_batches()
    );

    save_dataset(&dataset, &args.out)?;
    println!("checkpoint written to {}", args.out.display());
    Ok(())
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
