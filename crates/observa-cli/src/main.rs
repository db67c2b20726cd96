//! Observa: structures audit-report observations with an LLM.

use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::ProcessArgs;

fn resolve_data_dir() -> PathBuf {
    std::env::var("OBSERVA_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let exe_dir = std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|p| p.to_path_buf()));
            if let Some(dir) = exe_dir {
                let parent_data = dir.join("../data");
                if parent_data.exists() {
                    return parent_data;
                }
            }
            PathBuf::from("data")
        })
}

fn print_help() {
    println!("Observa — audit observation extractor");
    println!();
    println!("Usage: observa <command> [args]");
    println!();
    println!("Commands:");
    println!("  split <file>                 List the observation sections in a text file");
    println!("  process <file> [options]     Structure every section and export the results");
    println!("      --page N                 Only read page N (form-feed separated, from 1)");
    println!("      --name NAME              Base name for export files");
    println!("      --credentials FILE       Service account JSON for this run only");
    println!("  prompt [show|set FILE|reset] Show, replace or restore the prompt template");
    println!("  configure <file>             Apply an LLM config update from a JSON file");
    println!("  status [--check]             Show LLM configuration, optionally test the key");
    println!("  help                         Show this help message");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1) else {
        print_help();
        std::process::exit(1);
    };
    let rest = &args[2..];

    if matches!(command.as_str(), "--help" | "-h" | "help") {
        print_help();
        return Ok(());
    }

    let data_dir = resolve_data_dir();
    info!("Data directory: {}", data_dir.display());
    let config = observa_core::ObservaConfig::from_env(&data_dir)?;

    match command.as_str() {
        "split" => {
            let Some(file) = rest.first() else {
                eprintln!("Usage: observa split <file>");
                std::process::exit(1);
            };
            commands::split(&PathBuf::from(file))
        }
        "process" => {
            let args = match ProcessArgs::parse(rest) {
                Ok(args) => args,
                Err(e) => {
                    eprintln!("{}. Use 'observa help' for usage.", e);
                    std::process::exit(1);
                }
            };
            commands::process(config, args).await
        }
        "prompt" => commands::prompt(&config, rest),
        "configure" => {
            let Some(file) = rest.first() else {
                eprintln!("Usage: observa configure <file>");
                std::process::exit(1);
            };
            commands::configure(&config, &PathBuf::from(file))
        }
        "status" => {
            let check = rest.iter().any(|a| a == "--check");
            commands::status(&config, check).await
        }
        _ => {
            eprintln!("Unknown command: {}. Use 'observa help' for usage.", command);
            std::process::exit(1);
        }
    }
}
