//! hive2bq — Hive to BigQuery conversion CLI
//!
//! # Usage
//!
//! ```bash
//! # Show how a statement would be chunked
//! hive2bq chunk etl/daily.sql --mode always
//!
//! # Convert with external oracles
//! hive2bq convert etl/daily.sql --translate-cmd llm-translate --validate-cmd bq-dry-run
//!
//! # Convert a whole directory, writing SQL and Markdown reports
//! hive2bq batch etl/ --translate-cmd llm-translate --validate-cmd bq-dry-run
//! ```

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::*;
use hive2bq::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hive2bq")]
#[command(version)]
#[command(about = "Chunk-aware Hive SQL → BigQuery conversion", long_about = None)]
#[command(after_help = "EXAMPLES:
    hive2bq chunk big_job.sql --format json
    hive2bq convert job.sql --translate-cmd ./translate.sh --validate-cmd ./dry_run.sh
    hive2bq batch jobs/ --out converted/ --translate-cmd ./translate.sh")]
struct Cli {
    /// Config file (default: ./hive2bq.toml, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the chunk plan for a statement
    Chunk {
        /// SQL file, or `-` for stdin
        input: String,

        /// Override the configured chunking mode
        #[arg(short, long)]
        mode: Option<ChunkingMode>,

        #[arg(short, long, value_enum, default_value = "table")]
        format: ChunkFormat,
    },
    /// Convert one statement
    Convert {
        /// SQL file, or `-` for stdin
        input: String,

        #[command(flatten)]
        oracles: OracleArgs,

        #[arg(short, long, value_enum, default_value = "text")]
        format: ReportFormat,
    },
    /// Convert every .sql/.txt file in a directory
    Batch {
        dir: PathBuf,

        /// Output directory (default: the input directory)
        #[arg(short, long)]
        out: Option<PathBuf>,

        #[command(flatten)]
        oracles: OracleArgs,
    },
    /// Print the loaded table mapping
    Mappings,
}

#[derive(Clone, ValueEnum)]
enum ChunkFormat {
    Table,
    Json,
}

#[derive(Clone, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
}

/// External programs acting as oracles. Each reads stdin, answers on stdout.
#[derive(Args)]
struct OracleArgs {
    /// Translator command
    #[arg(long, env = "HIVE2BQ_TRANSLATE_CMD")]
    translate_cmd: String,

    /// BigQuery validator command; exit 0 means valid (default: accept all)
    #[arg(long, env = "HIVE2BQ_VALIDATE_CMD")]
    validate_cmd: Option<String>,

    /// Hive validator command (default: accept all)
    #[arg(long, env = "HIVE2BQ_SOURCE_VALIDATE_CMD")]
    source_validate_cmd: Option<String>,

    /// Repair command, fed a JSON request (default: the translator command)
    #[arg(long, env = "HIVE2BQ_REPAIR_CMD")]
    repair_cmd: Option<String>,
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins, then `LOG_LEVEL`, then `info`. Logs go to stderr.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(std::env::var("LOG_LEVEL").unwrap_or_default()))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = ConverterConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Chunk {
            input,
            mode,
            format,
        } => show_chunks(&read_input(&input)?, &config, mode, format),
        Commands::Convert {
            input,
            oracles,
            format,
        } => {
            let workflow = build_workflow(&oracles, config)?;
            let report = workflow.run(&read_input(&input)?).await?;
            print_report(&report, format)?;
            if !report.success {
                std::process::exit(2);
            }
            Ok(())
        }
        Commands::Batch { dir, out, oracles } => {
            let workflow = build_workflow(&oracles, config)?;
            run_batch(&workflow, &dir, out.as_deref().unwrap_or(&dir)).await
        }
        Commands::Mappings => show_mappings(&config),
    }
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut sql = String::new();
        std::io::stdin().read_to_string(&mut sql)?;
        return Ok(sql);
    }
    std::fs::read_to_string(input).with_context(|| format!("reading {input}"))
}

fn load_mapping(config: &ConverterConfig) -> Result<Option<TableMapping>> {
    let Some(path) = &config.table_mapping_csv else {
        return Ok(None);
    };
    let mapping = TableMapping::from_csv_path(path)
        .with_context(|| format!("loading table mapping {}", path.display()))?;
    Ok(Some(mapping))
}

fn build_workflow(oracles: &OracleArgs, config: ConverterConfig) -> Result<Workflow> {
    let translator = CommandOracle::parse(&oracles.translate_cmd)?;
    let repairer = match &oracles.repair_cmd {
        Some(cmd) => CommandOracle::parse(cmd)?,
        None => translator.clone(),
    };

    let mut builder = Workflow::builder()
        .translator(Arc::new(translator))
        .repairer(Arc::new(repairer));

    builder = match &oracles.validate_cmd {
        Some(cmd) => {
            let validator = CommandOracle::parse(cmd)?.with_mode("dry_run");
            builder.target_validator(Arc::new(validator))
        }
        None => {
            tracing::warn!("No --validate-cmd given, every candidate will be accepted");
            builder.target_validator(Arc::new(AlwaysValid))
        }
    };
    if let Some(cmd) = &oracles.source_validate_cmd {
        builder = builder.source_validator(Arc::new(CommandOracle::parse(cmd)?.with_mode("hive")));
    }

    match load_mapping(&config)? {
        Some(mapping) if !mapping.is_empty() => {
            let normalizer: Arc<dyn TableNormalizer> = Arc::new(mapping);
            builder = builder.normalizer(normalizer);
        }
        Some(_) => tracing::warn!("Table mapping is empty, table names are left unchanged"),
        None => {}
    }

    Ok(builder.config(config).build()?)
}

fn show_chunks(
    sql: &str,
    config: &ConverterConfig,
    mode: Option<ChunkingMode>,
    format: ChunkFormat,
) -> Result<()> {
    let chunker = Chunker::new(config.thresholds(), mode.unwrap_or(config.chunking));
    let chunks = chunker.plan(sql);

    match format {
        ChunkFormat::Json => println!("{}", serde_json::to_string_pretty(&chunks)?),
        ChunkFormat::Table => {
            println!(
                "{} {} chunk(s), mode {}",
                "Plan:".green().bold(),
                chunks.len(),
                chunker.mode().to_string().cyan()
            );
            println!();
            for chunk in &chunks {
                let label = match chunk.name() {
                    Some(name) => format!("{}:{}", chunk.kind(), name),
                    None => chunk.kind().to_string(),
                };
                let preview: String = chunk.content().chars().take(60).collect();
                println!(
                    "  {:>3}  {:<22} {:>7}  {}",
                    chunk.index(),
                    label.yellow(),
                    chunk.content().chars().count(),
                    preview.replace('\n', " ").dimmed()
                );
            }
        }
    }
    Ok(())
}

fn print_report(report: &ConversionReport, format: ReportFormat) -> Result<()> {
    if let ReportFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let state = &report.state;
    let status = if report.success {
        "✓ Converted".green().bold()
    } else {
        format!("✗ {}", report.outcome).red().bold()
    };
    eprintln!("{status}");
    eprintln!(
        "  {} {}  {} {}  {} {}ms",
        "retries:".dimmed(),
        state.retries_used,
        "chunks:".dimmed(),
        state.chunk_count,
        "elapsed:".dimmed(),
        report.elapsed_ms
    );
    if let Some(err) = state.source_error.as_ref().or(state.mapping_error.as_ref()) {
        eprintln!("  {} {}", "error:".red(), err);
    }
    if let Some(err) = &state.target_error {
        eprintln!("  {} {}", "last validation error:".red(), err);
    }
    if let Some(warning) = &report.warning {
        eprintln!("{} {}", "⚠".yellow(), warning.yellow());
    }
    if let Some(sql) = report.sql() {
        println!("{sql}");
    }
    Ok(())
}

async fn run_batch(workflow: &Workflow, dir: &Path, out: &Path) -> Result<()> {
    if !dir.is_dir() {
        bail!("input directory not found: {}", dir.display());
    }
    std::fs::create_dir_all(out)?;

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("sql") | Some("txt")
                )
        })
        .collect();
    files.sort();
    println!("{} {} file(s) in {}", "Found".cyan(), files.len(), dir.display());

    let (mut passed, mut failed) = (0usize, 0usize);
    for path in &files {
        match convert_file(workflow, path, out).await {
            Ok(true) => passed += 1,
            Ok(false) => failed += 1,
            Err(e) => {
                failed += 1;
                eprintln!("  {} {}: {:#}", "✗".red(), path.display(), e);
            }
        }
    }

    println!();
    println!(
        "{} {} succeeded, {} failed",
        "Done:".green().bold(),
        passed.to_string().green(),
        failed.to_string().red()
    );
    Ok(())
}

/// Writes `<stem>_success.sql` or `<stem>_failed.sql` plus `<stem>_report.md`.
async fn convert_file(workflow: &Workflow, path: &Path, out: &Path) -> Result<bool> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    tracing::info!("Processing {}...", file_name);

    let sql = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let report = workflow.run(&sql).await?;
    let ok = report.success && report.state.source_valid;

    let suffix = if ok { "success" } else { "failed" };
    match report.sql() {
        Some(bq) => std::fs::write(out.join(format!("{stem}_{suffix}.sql")), bq)?,
        None => tracing::warn!("No SQL generated for {}", file_name),
    }
    std::fs::write(out.join(format!("{stem}_report.md")), report.to_markdown(&file_name))?;

    let mark = if ok { "✓".green() } else { "✗".red() };
    println!("  {} {} ({})", mark, file_name, report.outcome);
    Ok(ok)
}

fn show_mappings(config: &ConverterConfig) -> Result<()> {
    let Some(mapping) = load_mapping(config)? else {
        println!(
            "{}",
            "⚠ No table mapping configured. Set table_mapping_csv or TABLE_MAPPING_CSV".yellow()
        );
        return Ok(());
    };
    println!("{} {} table mapping(s)", "Loaded".green().bold(), mapping.len());
    if !mapping.is_empty() {
        println!("{}", mapping.describe());
    }
    Ok(())
}
