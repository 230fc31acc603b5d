//! Strategy comparison tables, CSV and JSON export.

use crate::{BenchSuite, WorkloadResult};
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use std::path::Path;

// ────────────────────────────────────────────────────────────────────────────────
// Terminal output
// ────────────────────────────────────────────────────────────────────────────────

/// Highest throughput among `results`, if any strategy moved rows.
fn fastest(results: &[&WorkloadResult]) -> Option<f64> {
    results
        .iter()
        .map(|r| r.throughput)
        .filter(|t| *t > 0.0)
        .reduce(f64::max)
}

/// Comparison table for one workload. The fastest strategy is starred and
/// every row shows its throughput relative to the slowest one.
pub fn workload_table(results: &[&WorkloadResult]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS);

    table.set_header(vec![
        "Strategy",
        "Rounds",
        "Rows",
        "Rows/s",
        "vs slowest",
        "p50 (ms)",
        "p99 (ms)",
        "Max (ms)",
        "Mean (ms)",
    ]);

    let best = fastest(results);
    let slowest = results
        .iter()
        .map(|r| r.throughput)
        .filter(|t| *t > 0.0)
        .reduce(f64::min);

    for r in results {
        let is_best = best.is_some_and(|b| (r.throughput - b).abs() < 0.01);
        let (name, tp) = if is_best {
            (
                Cell::new(format!("★ {}", r.strategy)).fg(Color::Green),
                Cell::new(format_throughput(r.throughput)).fg(Color::Green),
            )
        } else {
            (
                Cell::new(&r.strategy),
                Cell::new(format_throughput(r.throughput)),
            )
        };
        let relative = match slowest {
            Some(s) if r.throughput > 0.0 => format!("{:.2}x", r.throughput / s),
            _ => "-".to_string(),
        };

        table.add_row(vec![
            name,
            Cell::new(r.rounds),
            Cell::new(format_count(r.rows)),
            tp,
            Cell::new(relative),
            Cell::new(format!("{:.2}", r.p50_ms)),
            Cell::new(format!("{:.2}", r.p99_ms)),
            Cell::new(format!("{:.2}", r.max_ms)),
            Cell::new(format!("{:.2}", r.mean_ms)),
        ]);
    }
    table
}

pub fn print_workload_comparison(workload: &str, results: &[&WorkloadResult]) {
    if results.is_empty() {
        return;
    }
    println!("\n{}", format!("━━━ {} ━━━", workload).bold().cyan());
    println!("{}", workload_table(results));
}

/// Workloads in first-seen order, each with its results.
fn group_by_workload(results: &[WorkloadResult]) -> Vec<(&str, Vec<&WorkloadResult>)> {
    let mut groups: Vec<(&str, Vec<&WorkloadResult>)> = Vec::new();
    for r in results {
        match groups.iter_mut().find(|(w, _)| *w == r.workload) {
            Some((_, members)) => members.push(r),
            None => groups.push((r.workload.as_str(), vec![r])),
        }
    }
    groups
}

pub fn print_suite(suite: &BenchSuite) {
    println!(
        "\n{}",
        "╔══════════════════════════════════════════════════════════════╗"
            .bold()
            .blue()
    );
    println!(
        "{}",
        "║            Bulk Mutation Strategy Comparison                 ║"
            .bold()
            .blue()
    );
    println!(
        "{}",
        "╚══════════════════════════════════════════════════════════════╝"
            .bold()
            .blue()
    );

    println!(
        "  OS: {}  Arch: {}  CPUs: {}  Server: {}  Time: {}",
        suite.system_info.os,
        suite.system_info.arch,
        suite.system_info.cpus,
        suite.system_info.server_version.as_deref().unwrap_or("unknown"),
        suite.system_info.timestamp
    );

    let groups = group_by_workload(&suite.results);
    for (workload, results) in &groups {
        print_workload_comparison(workload, results);
    }

    println!("\n{}", "── Summary: Fastest Strategy ──".bold().yellow());
    for (workload, results) in &groups {
        let winner = results
            .iter()
            .filter(|r| r.throughput > 0.0)
            .max_by(|a, b| a.throughput.total_cmp(&b.throughput));
        if let Some(best) = winner {
            println!(
                "  {} {} ({} rows/s)",
                format!("{:>12}", workload).bold(),
                best.strategy,
                format_throughput(best.throughput)
            );
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// CSV export
// ────────────────────────────────────────────────────────────────────────────────

pub fn export_csv(suite: &BenchSuite, path: &Path) -> std::io::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "strategy",
        "workload",
        "rounds",
        "rows",
        "total_secs",
        "throughput_rows_sec",
        "p50_ms",
        "p99_ms",
        "max_ms",
        "mean_ms",
    ])?;

    for r in &suite.results {
        wtr.write_record([
            &r.strategy,
            &r.workload,
            &r.rounds.to_string(),
            &r.rows.to_string(),
            &format!("{:.6}", r.total_secs),
            &format!("{:.2}", r.throughput),
            &format!("{:.3}", r.p50_ms),
            &format!("{:.3}", r.p99_ms),
            &format!("{:.3}", r.max_ms),
            &format!("{:.3}", r.mean_ms),
        ])?;
    }

    wtr.flush()?;
    println!("  CSV exported to {}", path.display());
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────────
// JSON export
// ────────────────────────────────────────────────────────────────────────────────

pub fn export_json(suite: &BenchSuite, path: &Path) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(suite).map_err(std::io::Error::other)?;
    std::fs::write(path, json)?;
    println!("  JSON exported to {}", path.display());
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────────
// Formatting helpers
// ────────────────────────────────────────────────────────────────────────────────

fn format_throughput(t: f64) -> String {
    if t >= 1_000_000.0 {
        format!("{:.2}M", t / 1_000_000.0)
    } else if t >= 1_000.0 {
        format!("{:.1}K", t / 1_000.0)
    } else {
        format!("{:.0}", t)
    }
}

fn format_count(n: u64) -> String {
    if n >= 1_000_000 {
        format!("{:.2}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1_000.0)
    } else {
        format!("{}", n)
    }
}
