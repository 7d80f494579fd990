//! Analyzer entry point — CLI wiring around the report/sharing core.

use std::fs;
use std::path::Path;
use std::process;

use chrono::Duration;

use edc_share::config::AnalyzerConfig;
use edc_share::io::export::export_intervals_csv;
use edc_share::report::aggregate::Grouping;
use edc_share::report::parse::parse_report;
use edc_share::report::stats::collect_stats;
use edc_share::report::value::{DisplayUnit, print_date, print_kwh, print_only_date};
use edc_share::sharing::optimize::Algorithm;
use edc_share::warnings::WarningLog;

/// Parsed CLI arguments.
struct CliArgs {
    report_path: Option<String>,
    config_path: Option<String>,
    grouping: Option<Grouping>,
    unit: Option<DisplayUnit>,
    from_day: Option<i64>,
    to_day: Option<i64>,
    export_out: Option<String>,
    optimize: bool,
    rounds: Option<usize>,
    restarts: Option<usize>,
    max_failures: Option<u32>,
    algorithm: Option<Algorithm>,
    seed: Option<u64>,
}

fn print_help() {
    eprintln!("edc-share — analyzer for EDC energy-sharing interval reports");
    eprintln!();
    eprintln!("Usage: edc-share <report.csv> [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>          Load analyzer settings from TOML config file");
    eprintln!("  --grouping <token>       Aggregation bucket: 15m, 1h, 1d or 1m");
    eprintln!("  --unit <kWh|kW>          Display unit (kW = average power per 15m bucket)");
    eprintln!("  --from <days>            Skip the first N days of the report");
    eprintln!("  --to <days>              Stop N days after the report start");
    eprintln!("  --export <path>          Write the aggregated series to a CSV file");
    eprintln!("  --optimize               Search for allocation weights maximizing sharing");
    eprintln!("  --rounds <n>             Allocation rounds per interval");
    eprintln!("  --restarts <n>           Optimizer restarts");
    eprintln!("  --max-failures <n>       Non-improving proposals ending a restart");
    eprintln!("  --algorithm <name>       Proposal rule: random or gradient-descend");
    eprintln!("  --seed <u64>             Optimizer seed");
    eprintln!("  --help                   Show this help message");
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        report_path: None,
        config_path: None,
        grouping: None,
        unit: None,
        from_day: None,
        to_day: None,
        export_out: None,
        optimize: false,
        rounds: None,
        restarts: None,
        max_failures: None,
        algorithm: None,
        seed: None,
    };

    fn value_for<'a>(args: &'a [String], i: &mut usize, flag: &str, kind: &str) -> &'a str {
        *i += 1;
        match args.get(*i) {
            Some(v) => v,
            None => {
                eprintln!("error: {flag} requires a {kind} argument");
                process::exit(1);
            }
        }
    }

    fn parse_value<T: std::str::FromStr>(raw: &str, flag: &str, kind: &str) -> T {
        match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                eprintln!("error: {flag} value \"{raw}\" is not a valid {kind}");
                process::exit(1);
            }
        }
    }

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--config" => {
                cli.config_path = Some(value_for(&args, &mut i, "--config", "path").to_string());
            }
            "--grouping" => {
                let raw = value_for(&args, &mut i, "--grouping", "token");
                match raw.parse::<Grouping>() {
                    Ok(g) => cli.grouping = Some(g),
                    Err(e) => {
                        eprintln!("error: {e}");
                        process::exit(1);
                    }
                }
            }
            "--unit" => {
                let raw = value_for(&args, &mut i, "--unit", "token");
                match raw.parse::<DisplayUnit>() {
                    Ok(u) => cli.unit = Some(u),
                    Err(e) => {
                        eprintln!("error: {e}");
                        process::exit(1);
                    }
                }
            }
            "--from" => {
                let raw = value_for(&args, &mut i, "--from", "day count");
                cli.from_day = Some(parse_value(raw, "--from", "day count"));
            }
            "--to" => {
                let raw = value_for(&args, &mut i, "--to", "day count");
                cli.to_day = Some(parse_value(raw, "--to", "day count"));
            }
            "--export" => {
                cli.export_out = Some(value_for(&args, &mut i, "--export", "path").to_string());
            }
            "--optimize" => {
                cli.optimize = true;
            }
            "--rounds" => {
                let raw = value_for(&args, &mut i, "--rounds", "count");
                cli.rounds = Some(parse_value(raw, "--rounds", "count"));
            }
            "--restarts" => {
                let raw = value_for(&args, &mut i, "--restarts", "count");
                cli.restarts = Some(parse_value(raw, "--restarts", "count"));
            }
            "--max-failures" => {
                let raw = value_for(&args, &mut i, "--max-failures", "count");
                cli.max_failures = Some(parse_value(raw, "--max-failures", "count"));
            }
            "--algorithm" => {
                let raw = value_for(&args, &mut i, "--algorithm", "name");
                match raw.parse::<Algorithm>() {
                    Ok(a) => cli.algorithm = Some(a),
                    Err(e) => {
                        eprintln!("error: {e}");
                        process::exit(1);
                    }
                }
            }
            "--seed" => {
                let raw = value_for(&args, &mut i, "--seed", "u64");
                cli.seed = Some(parse_value(raw, "--seed", "u64"));
            }
            other if !other.starts_with("--") && cli.report_path.is_none() => {
                cli.report_path = Some(other.to_string());
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = parse_args();
    let Some(report_path) = cli.report_path.clone() else {
        eprintln!("error: a report path is required");
        print_help();
        process::exit(1);
    };

    let mut config = if let Some(ref path) = cli.config_path {
        match AnalyzerConfig::from_toml_file(Path::new(path)) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    } else {
        AnalyzerConfig::default()
    };

    // Apply CLI overrides before validation so bad combinations are caught.
    if let Some(g) = cli.grouping {
        config.display.grouping = g.to_string();
    }
    if let Some(u) = cli.unit {
        config.display.unit = u.to_string();
    }
    if let Some(rounds) = cli.rounds {
        config.optimizer.rounds = rounds;
    }
    if let Some(restarts) = cli.restarts {
        config.optimizer.restarts = restarts;
    }
    if let Some(max_failures) = cli.max_failures {
        config.optimizer.max_consecutive_failures = max_failures;
    }
    if let Some(algorithm) = cli.algorithm {
        config.optimizer.algorithm = algorithm.to_string();
    }
    if let Some(seed) = cli.seed {
        config.optimizer.seed = seed;
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }
    // Validation guarantees these resolve.
    let (grouping, unit, optimize_config) =
        match (config.grouping(), config.unit(), config.optimize_config()) {
            (Ok(g), Ok(u), Ok(o)) => (g, u, o),
            _ => {
                eprintln!("config error: inconsistent configuration");
                process::exit(1);
            }
        };

    let text = match fs::read_to_string(&report_path) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("error: cannot read \"{report_path}\": {e}");
            process::exit(1);
        }
    };

    let mut warnings = WarningLog::new();
    let report = match parse_report(&text, &report_path, &mut warnings) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("error: this file cannot be read as a sharing report: {e}");
            process::exit(1);
        }
    };

    println!("Report {}", report.filename);
    println!(
        "  period      {} .. {} ({} days)",
        print_date(report.date_from),
        print_date(report.date_to),
        report.num_days()
    );
    println!(
        "  metering    {} distribution EAN(s), {} consumer EAN(s)",
        report.distribution_eans.len(),
        report.consumer_eans.len()
    );
    println!(
        "  intervals   {} x 15m, {} reconciliation warning(s)",
        report.intervals.len(),
        warnings.len()
    );

    let range_from = report.date_from + Duration::days(cli.from_day.unwrap_or(0));
    let range_to = match cli.to_day {
        Some(days) => report.date_from + Duration::days(days),
        None => report.date_to,
    };
    let grouped = report.grouped_intervals(grouping, range_from, range_to);

    println!();
    println!("Buckets ({grouping}):");
    for interval in &grouped {
        let label = match grouping {
            Grouping::QuarterHour | Grouping::Hour => print_date(interval.start),
            Grouping::Day | Grouping::Month => print_only_date(interval.start),
        };
        let flag = if interval.errors.is_empty() { "" } else { " !" };
        println!(
            "  {label}  production {:>12}  shared {:>12}  missed {:>12}{flag}",
            print_kwh(interval.sum_production, unit),
            print_kwh(interval.sum_sharing, unit),
            print_kwh(interval.sum_missed, unit)
        );
    }

    let (dist_stats, cons_stats) = collect_stats(&report, &grouped);
    println!();
    println!("Totals per EAN:");
    for (ean, stats) in report.distribution_eans.iter().zip(&dist_stats) {
        println!(
            "  D {}  produced {:>12}  shared {:>12}  missed {:>12}",
            ean.code,
            print_kwh(stats.original_balance, unit),
            print_kwh(stats.shared(), unit),
            print_kwh(stats.missed, unit)
        );
    }
    for (ean, stats) in report.consumer_eans.iter().zip(&cons_stats) {
        println!(
            "  O {}  consumed {:>12}  received {:>12}  missed {:>12}",
            ean.code,
            print_kwh(stats.original_balance, unit),
            print_kwh(stats.shared(), unit),
            print_kwh(stats.missed, unit)
        );
    }

    if !warnings.is_empty() {
        println!();
        println!("Warnings:");
        for warning in warnings.entries() {
            println!("  {warning}");
        }
    }

    if let Some(ref path) = cli.export_out {
        if let Err(e) = export_intervals_csv(&report, &grouped, Path::new(path)) {
            eprintln!("error: failed to write CSV: {e}");
            process::exit(1);
        }
        eprintln!("Aggregated series written to {path}");
    }

    if cli.optimize {
        if report.distribution_eans.len() != 1 {
            eprintln!(
                "error: allocation optimization supports exactly one distribution EAN, \
                 this report has {}",
                report.distribution_eans.len()
            );
            process::exit(1);
        }
        let actual: f64 = report.intervals.iter().map(|i| i.sum_sharing).sum();
        println!();
        println!(
            "Optimizing allocation ({} restarts, {} rounds, algorithm {}):",
            optimize_config.restarts, optimize_config.rounds, optimize_config.algorithm
        );
        let mut last = None;
        for progress in report.optimizer(optimize_config) {
            println!(
                "  restart {:>3}/{}: best {}",
                progress.restart,
                optimize_config.restarts,
                print_kwh(progress.best.total, DisplayUnit::KWh)
            );
            last = Some(progress);
        }
        if let Some(best) = last {
            println!();
            println!(
                "Best allocation shares {} (actual settlement shared {}):",
                print_kwh(best.best.total, DisplayUnit::KWh),
                print_kwh(actual, DisplayUnit::KWh)
            );
            for ((ean, weight), received) in report
                .consumer_eans
                .iter()
                .zip(&best.best_weights)
                .zip(&best.best.per_consumer)
            {
                println!(
                    "  O {}  weight {:>6.2} %  receives {:>12}",
                    ean.code,
                    weight,
                    print_kwh(*received, DisplayUnit::KWh)
                );
            }
        }
    }
}
