//! Command line front end: load a catalog definition, synthesize the
//! encoding, render the opcode table and the merged field report.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use opforge_core::Catalog;
use opforge_synth::{synthesize, GlobalAllocation, ProgressSink, SearchConfig, Synthesis};

#[derive(Parser)]
#[command(author, version, about = "Instruction encoding synthesizer", long_about = None)]
struct Opforge {
    /// Catalog definition file (JSON)
    catalog: PathBuf,

    /// Duplicate the full report into this file
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Worker threads; defaults to the available processing units
    #[clap(long)]
    workers: Option<usize>,

    /// Upper bound on the placement combinations the search will scan
    #[clap(long)]
    max_combinations: Option<u128>,
}

/// Prints every improvement as it is found and keeps a transcript for the
/// optional output file.
struct ConsoleSink<'a> {
    catalog: &'a Catalog,
    transcript: String,
}

impl ProgressSink for ConsoleSink<'_> {
    fn improved(&mut self, allocation: &GlobalAllocation) {
        let banner = format!("Found new best: {}", allocation.cost);
        println!("\n{}", banner.green().bold());
        let groups = render_groups(self.catalog, allocation);
        print!("{groups}");

        let _ = writeln!(self.transcript, "\nFound new best: {}", allocation.cost);
        self.transcript.push_str(&groups);
    }
}

fn format_mask(mask: u16, word_bits: u32) -> String {
    let mut out = String::new();
    for bit in (0..word_bits).rev() {
        out.push(if mask >> bit & 1 == 1 { '1' } else { '0' });
        if bit != 0 && bit % 4 == 0 {
            out.push('_');
        }
    }
    out
}

fn render_groups(catalog: &Catalog, allocation: &GlobalAllocation) -> String {
    let mut out = String::new();
    for group in allocation.merged_groups(catalog) {
        let _ = writeln!(
            out,
            "{}: {}",
            format_mask(group.mask, catalog.word_bits()),
            catalog.registry().describe(group.capabilities)
        );
        let users: Vec<String> =
            group.users.iter().map(|(instruction, field)| format!("{instruction}/{field}")).collect();
        let _ = writeln!(out, "    {}", users.join(", "));
    }
    out
}

fn render_opcode_table(catalog: &Catalog, synthesis: &Synthesis) -> String {
    let mut rows: Vec<(String, &str)> = synthesis
        .opcodes
        .codes()
        .iter()
        .enumerate()
        .map(|(index, opcode)| (opcode.to_string(), catalog.instruction(index).name()))
        .collect();
    rows.sort();

    let mut out = String::from("Opcode assignment:\n");
    for (code, name) in rows {
        let _ = writeln!(out, "{code:7}: {name} ({} opcode bits)", code.len());
    }
    out
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Opforge::parse();

    let catalog = Catalog::from_json_file(&args.catalog)
        .with_context(|| format!("failed to load catalog {}", args.catalog.display()))?;
    info!(
        instructions = catalog.len(),
        word_bits = catalog.word_bits(),
        capabilities = catalog.registry().len(),
        "catalog loaded"
    );

    let mut config = SearchConfig::default();
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(max_combinations) = args.max_combinations {
        config.max_combinations = max_combinations;
    }

    let mut sink = ConsoleSink { catalog: &catalog, transcript: String::new() };
    let synthesis = synthesize(&catalog, &config, &mut sink)?;
    info!(cost = %synthesis.allocation.cost, "search complete");

    let mut report = String::new();
    report.push_str(&render_opcode_table(&catalog, &synthesis));
    let _ = writeln!(report, "\nBest field allocation: {}", synthesis.allocation.cost);
    report.push_str(&render_groups(&catalog, &synthesis.allocation));

    println!("\n{report}");

    if let Some(path) = &args.output {
        let full = format!("{}\n{}", sink.transcript, report);
        std::fs::write(path, full)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
    }

    Ok(())
}
