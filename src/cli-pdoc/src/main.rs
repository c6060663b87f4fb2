use std::path::PathBuf;

use clap::{Parser, Subcommand};

use core_pdoc::csv_data::{analyze_duplicates, parse_csv_string, validate_csv};
use core_pdoc::{get_batch_size, setup_logging};

use cli_pdoc::{ApiClient, generate_in_batches};

#[derive(Parser)]
#[command(name = "pdoc")]
#[command(about = "Personalized document batch toolkit", long_about = None)]
struct Cli {
    /// Base URL of the API server
    #[arg(long, env = "API_BASE_URL", default_value = "http://127.0.0.1:3000")]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a client CSV locally: structure, emails and duplicates
    Validate {
        /// The CSV file to check.
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Generate documents for every client in a CSV, then export the links
    Generate {
        /// The CSV file with one client per row.
        #[arg(short, long)]
        file: PathBuf,
        /// Where to write the resulting export CSV.
        #[arg(short, long, default_value = "export.csv")]
        output: PathBuf,
        /// Concurrent generation requests per batch (env: GENERATE_BATCH_SIZE).
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Download the full export CSV from the server
    Export {
        /// Where to write the export CSV.
        #[arg(short, long, default_value = "export.csv")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    setup_logging("cli_pdoc=info");

    let cli = Cli::parse();

    match &cli.command {
        Commands::Validate { file } => {
            let content = read_file(file);
            let validation = match validate_csv(&content) {
                Ok(v) => v,
                Err(e) => {
                    println!("ERROR: Cannot parse CSV ({}): {}", file.display(), e);
                    std::process::exit(1)
                }
            };
            let clients = match parse_csv_string(&content) {
                Ok(c) => c,
                Err(e) => {
                    println!("ERROR: Cannot parse CSV ({}): {}", file.display(), e);
                    std::process::exit(1)
                }
            };

            println!("{} row(s) with an email address", clients.len());
            if validation.valid {
                println!("Structure: OK");
            } else {
                println!("Structure: INVALID");
                for error in &validation.errors {
                    println!("  - {}", error);
                }
            }

            let analysis = analyze_duplicates(&clients);
            if analysis.duplicates.is_empty() {
                println!("Duplicates: none ({} unique)", analysis.unique_count);
            } else {
                println!("Duplicates: {} email(s) appear more than once", analysis.duplicates.len());
                for (email, group) in &analysis.duplicates {
                    println!("  - {} ({} rows)", email, group.len());
                }
            }

            if !validation.valid {
                std::process::exit(1)
            }
        }

        Commands::Generate { file, output, batch_size } => {
            let content = read_file(file);
            match validate_csv(&content) {
                Ok(validation) if !validation.valid => {
                    println!("ERROR: CSV failed validation:");
                    for error in &validation.errors {
                        println!("  - {}", error);
                    }
                    std::process::exit(1)
                }
                Ok(_) => {}
                Err(e) => {
                    println!("ERROR: Cannot parse CSV ({}): {}", file.display(), e);
                    std::process::exit(1)
                }
            }
            let clients = match parse_csv_string(&content) {
                Ok(c) => c,
                Err(e) => {
                    println!("ERROR: Cannot parse CSV ({}): {}", file.display(), e);
                    std::process::exit(1)
                }
            };
            if clients.is_empty() {
                println!("ERROR: No client rows with an email address in {}", file.display());
                std::process::exit(1)
            }

            let api = api_client(&cli.api_url);
            let size = get_batch_size(*batch_size);
            println!("Generating documents for {} client(s), {} request(s) per batch", clients.len(), size);

            let results = generate_in_batches(&clients, size, |c| {
                let api = &api;
                async move { api.generate(&c).await }
            })
            .await;

            let succeeded = results.iter().filter(|r| r.success).count();
            let failed = results.len() - succeeded;
            println!("Done: {} succeeded, {} failed", succeeded, failed);
            for result in results.iter().filter(|r| !r.success) {
                println!("  - {}: {}", result.client_email, result.error.as_deref().unwrap_or("unknown error"));
            }

            match api.export_with_results(&results).await {
                Ok(csv) => write_file(output, &csv),
                Err(e) => {
                    println!("ERROR: Export failed: {}", e);
                    std::process::exit(1)
                }
            }
            println!("Export written to {}", output.display());

            if failed > 0 {
                std::process::exit(1)
            }
        }

        Commands::Export { output } => {
            let api = api_client(&cli.api_url);
            match api.export_all().await {
                Ok(csv) => write_file(output, &csv),
                Err(e) => {
                    println!("ERROR: Export failed: {}", e);
                    std::process::exit(1)
                }
            }
            println!("Export written to {}", output.display());
        }
    }
}

fn api_client(base_url: &str) -> ApiClient {
    match ApiClient::new(base_url) {
        Ok(api) => api,
        Err(e) => {
            println!("ERROR: {}", e);
            std::process::exit(1)
        }
    }
}

fn read_file(path: &PathBuf) -> String {
    match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            println!("ERROR: Cannot read file ({}): {}", path.display(), e);
            std::process::exit(1)
        }
    }
}

fn write_file(path: &PathBuf, content: &str) {
    if let Err(e) = std::fs::write(path, content) {
        println!("ERROR: Cannot write file ({}): {}", path.display(), e);
        std::process::exit(1)
    }
}
