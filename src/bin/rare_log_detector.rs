//! CLI surface wiring `clap` subcommands onto the `rarelog::Engine` facade.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use rarelog::{Config, Engine};

#[derive(Parser)]
#[command(name = "rare-log-detector", about = "Offline/incremental rare-log mining engine")]
struct Cli {
    /// Path to the INI-style configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Increase log verbosity; repeat for more detail (overridden by RUST_LOG if set).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Walk new lines since the last checkpoint and commit them to the on-disk stores.
    Feed {
        /// Overrides the configuration file's logPath glob.
        #[arg(long)]
        log_path: Option<String>,
    },
    /// Run the mining pipeline against a file without committing anything to disk.
    Detect {
        log_path: String,
    },
    /// Feed any new lines, then show the top N rarest phrases.
    TopN {
        n: usize,
        #[arg(long, default_value_t = 0)]
        min_cnt: i64,
    },
    /// List every registered term and its current occurrence count.
    TermCounts,
    /// Report the template a single line would resolve to, without registering it.
    AnalyzeLine {
        line: String,
        #[arg(long, default_value_t = 0)]
        file_epoch: i64,
    },
    /// Dump the biggest-N phrases by count.
    OutputPhrases {
        biggest_n: usize,
    },
    /// Dump per-bucket historical counts for the biggest-N phrases.
    OutputPhrasesHistory {
        biggest_n: usize,
    },
    /// Rebuild the phrase dictionary at a new rarity threshold (< 1.0 is a rate, >= 1.0 a border).
    Rearrange {
        new_rate_or_border: f64,
    },
    /// Delete all on-disk state for this data directory.
    Clean,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let verbosity = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| verbosity.into()))
        .init();

    std::panic::set_hook(Box::new(|info| {
        tracing::error!(backtrace = %std::backtrace::Backtrace::force_capture(), "panic: {info}");
    }));

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> rarelog::Result<()> {
    let config = Config::load_file(&cli.config)?;
    let mut engine = Engine::open(config)?;

    match cli.command {
        Command::Feed { log_path } => {
            let n = engine.feed(log_path.as_deref())?;
            println!("fed {n} lines");
        }
        Command::Detect { log_path } => {
            for line in engine.detect(&log_path)? {
                println!("{},{},{}", line.count, csv_field(&line.template_string), csv_field(&line.original_line));
            }
        }
        Command::TopN { n, min_cnt } => {
            for row in engine.top_n(n, min_cnt)? {
                println!("{},{},{},{}", row.created, row.updated, row.count, csv_field(&row.subject));
            }
        }
        Command::TermCounts => {
            for (term, count) in engine.term_counts() {
                println!("{},{}", csv_field(&term), count);
            }
        }
        Command::AnalyzeLine { line, file_epoch } => {
            let (template, _) = engine.analyze_line(&line, file_epoch);
            println!("{template}");
        }
        Command::OutputPhrases { biggest_n } => {
            for row in engine.output_phrases(biggest_n) {
                println!("{},{},{},{}", row.created, row.updated, row.count, csv_field(&row.subject));
            }
        }
        Command::OutputPhrasesHistory { biggest_n } => {
            for row in engine.output_phrases_history(biggest_n)? {
                let buckets: Vec<String> = row
                    .buckets
                    .iter()
                    .map(|(t, c)| format!("{t}:{}", c.map(|v| v.to_string()).unwrap_or_default()))
                    .collect();
                println!("{},{}", csv_field(&row.subject), buckets.join(","));
            }
        }
        Command::Rearrange { new_rate_or_border } => {
            let rebuilt = engine.rearrange_phrases(new_rate_or_border)?;
            println!("{}", if rebuilt { "rebuilt" } else { "unchanged" });
        }
        Command::Clean => {
            engine.clean()?;
            println!("cleaned");
        }
    }
    Ok(())
}

fn csv_field(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
