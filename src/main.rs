//! Tapedeck CLI

use std::process;

use anyhow::Context;
use tapedeck::Cassette;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let command = &args[1];

    match command.as_str() {
        "inspect" => {
            if args.len() < 3 {
                eprintln!("Usage: tapedeck inspect <fixture-name>");
                process::exit(1);
            }

            inspect(&args[2])
        }
        _ => {
            eprintln!("Unknown command: {command}");
            eprintln!("Run 'tapedeck' for usage information.");
            process::exit(1);
        }
    }
}

fn print_usage() {
    eprintln!("Tapedeck v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage: tapedeck <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  inspect <fixture-name>    Summarize a recorded cassette");
    eprintln!();
    eprintln!("Fixture names omit the .json extension, e.g. fixtures/example");
}

fn inspect(name: &str) -> anyhow::Result<()> {
    let cassette =
        Cassette::load(name).with_context(|| format!("Cannot inspect cassette '{name}'"))?;
    let interactions = cassette.interactions();

    println!("Cassette: {}", cassette.path().display());
    println!("Version: {}", cassette.version());
    println!("Interactions: {}", interactions.len());
    println!();

    for (i, interaction) in interactions.iter().enumerate() {
        println!(
            "{:>4}  {:<7} {} -> {} ({} bytes)",
            i,
            interaction.request.method,
            interaction.request.url,
            interaction.response.status,
            interaction.response.body.len()
        );
    }

    Ok(())
}
