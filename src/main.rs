//! cumcube command line: `cumcube [<config.yaml> [<records.json>]]`
//!
//! With a config and records, prints the output table as JSON. With a config
//! alone, prints the remote plan (or the fetch query when no remote target is
//! configured). Without arguments, runs a small demo.

use std::env;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use cumcube::pipeline::fetch_query;
use cumcube::{
    load_from_file, load_records_from_file, plan_remote, run, Record, RemoteConfig, Result,
    RunConfig,
};

const DEMO_QUERY: &str = "select
  cost_type,
  func_name,
  uid, -- distinct
  order_id, -- distinct
  cost, -- sum
  time_minute,
  date_p
from dwd.cost_detail
where date_p = ${date_p}";

const USAGE: &str = "usage: cumcube [<config.yaml> [<records.json>]]";

#[derive(Debug, PartialEq)]
enum Command<'a> {
    Demo,
    Plan(&'a str),
    Run(&'a str, &'a str),
}

/// At most two positional arguments; anything more is a usage error
fn parse_args(args: &[String]) -> Option<Command<'_>> {
    match args {
        [] => Some(Command::Demo),
        [config] => Some(Command::Plan(config)),
        [config, records] => Some(Command::Run(config, records)),
        _ => None,
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let result = match parse_args(&args) {
        Some(Command::Demo) => demo(),
        Some(Command::Plan(config)) => plan_only(config),
        Some(Command::Run(config, records)) => run_files(config, records),
        None => {
            eprintln!("{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_files(config: &str, records: &str) -> Result<()> {
    let config = load_from_file(config)?;
    let records = load_records_from_file(records)?;
    let table = run(&config, &records)?;
    println!("{}", serde_json::to_string_pretty(&table)?);
    Ok(())
}

fn plan_only(config: &str) -> Result<()> {
    let config = load_from_file(config)?;
    let sql = match config.remote {
        Some(_) => plan_remote(&config)?,
        None => fetch_query(&config)?,
    };
    println!("{sql}");
    Ok(())
}

fn demo() -> Result<()> {
    println!("=== cumcube demo ===\n");

    let config = RunConfig::new(20251230, 202512300110, 202512300130, DEMO_QUERY);
    let record = |cost_type: &str, uid: &str, order: &str, cost: f64, minute: i64| {
        Record::new()
            .with("cost_type", cost_type)
            .with("func_name", "图生视频")
            .with("uid", uid)
            .with("order_id", order)
            .with("cost", cost)
            .with("time_minute", minute)
            .with("date_p", 20251230i64)
    };
    let records = vec![
        record("x", "u1", "o1", 1.25, 202512300121),
        record("y", "u1", "o2", 0.5, 202512300133),
        record("y", "u2", "o3", 2.0, 202512300105),
    ];

    println!("--- Local run ---\n");
    let table = run(&config, &records)?;
    println!("{}\n", serde_json::to_string_pretty(&table)?);

    println!("--- Fetch query ---\n");
    println!("{}\n", fetch_query(&config)?);

    println!("--- Remote plan ---\n");
    let config = config.with_remote(RemoteConfig::new("dws.cum_cost_10m"));
    println!("{}", plan_remote(&config)?);
    Ok(())
}
