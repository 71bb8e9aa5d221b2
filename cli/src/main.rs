use std::sync::Once;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use woort_core::{
    Runtime,
    bytecode::disassemble_to_string,
    metrics::{CommitMetricsSnapshot, CommitStats, commit_metrics_snapshot},
};

mod demos;

use demos::Demo;

static TRACE_INIT: Once = Once::new();
const DEFAULT_TRACE_FILTER: &str = "woort=info";

#[derive(Debug, Parser)]
#[command(name = "woort", author, version, about = "CLI for WooRT", long_about = None)]
struct CliArgs {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Commit a built-in demo and run it.
    Run {
        #[arg(value_enum)]
        demo: Demo,
        /// Print commit counters and runtime state as JSON
        #[arg(long)]
        stats: bool,
        /// Yield every N instructions and resume until the program ends
        #[arg(long, value_name = "N", value_parser = parse_budget)]
        budget: Option<u64>,
    },
    /// Print the committed bytecode of a built-in demo.
    Disasm {
        #[arg(value_enum)]
        demo: Demo,
    },
}

#[derive(Debug, Serialize)]
struct RunReport {
    demo: &'static str,
    result: String,
    yields: u64,
    stack_len: usize,
    stack_realloc_version: u64,
    commit: CommitStats,
    metrics: CommitMetricsSnapshot,
}

fn parse_budget(raw: &str) -> Result<u64, String> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err("budget must be at least 1".to_string()),
        Ok(value) => Ok(value),
        Err(e) => Err(format!("invalid budget '{raw}': {e}")),
    }
}

fn trace_filter_from(var: Option<String>) -> String {
    match var {
        Some(raw) if !raw.trim().is_empty() => raw.trim().to_string(),
        _ => DEFAULT_TRACE_FILTER.to_string(),
    }
}

fn init_tracing() {
    TRACE_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::fmt;

        let raw = std::env::var("WOORT_LOG").ok().or_else(|| std::env::var("RUST_LOG").ok());
        let filter = EnvFilter::try_new(trace_filter_from(raw)).unwrap_or_else(|_| EnvFilter::new(DEFAULT_TRACE_FILTER));
        let _ = fmt().with_writer(std::io::stderr).with_env_filter(filter).try_init();
    });
}

fn run_demo(demo: Demo, stats: bool, budget: Option<u64>) -> anyhow::Result<()> {
    let program = demo.build()?;
    let mut rt = Runtime::default();
    let (result, yields) = program
        .run(&mut rt, budget)
        .with_context(|| format!("run demo `{}`", demo.name()))?;
    tracing::info!(demo = demo.name(), yields, "demo finished");

    println!("{result}");
    for slot in &program.statics {
        let index = slot.index() as usize;
        println!("static[{index}] = {}", program.env.load(index));
    }

    if stats {
        let report = RunReport {
            demo: demo.name(),
            result: result.to_string(),
            yields,
            stack_len: rt.stack_len(),
            stack_realloc_version: rt.stack_realloc_version(),
            commit: program.stats.clone(),
            metrics: commit_metrics_snapshot(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

fn disasm_demo(demo: Demo) -> anyhow::Result<()> {
    let program = demo.build()?;
    let env = &program.env;
    println!("; {} at {}, {} words", demo.name(), env.base(), env.code().len());
    for index in 0..env.function_count() {
        if let Some(offset) = env.entry_offset(index) {
            println!("; function #{index} at word {offset}");
        }
    }
    let listing = disassemble_to_string(env.code()).context("decode committed bytecode")?;
    print!("{listing}");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let CliArgs { command } = CliArgs::parse();
    match command {
        Commands::Run { demo, stats, budget } => run_demo(demo, stats, budget),
        Commands::Disasm { demo } => disasm_demo(demo),
    }
}
