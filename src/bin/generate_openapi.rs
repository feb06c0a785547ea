//! Writes the service's OpenAPI document as JSON.
//!
//! Usage:
//!   cargo run --bin generate_openapi > openapi.json
//!   cargo run --bin generate_openapi -- --output openapi.json

use std::{
    env, fs,
    io::{self, Write},
    path::PathBuf,
    process,
};

use energy_monitor_service::api::handlers::ApiDoc;
use utoipa::OpenApi;

fn main() {
    let json = match ApiDoc::openapi().to_pretty_json() {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Failed to serialise OpenAPI document: {e}");
            process::exit(1);
        }
    };

    let output: Option<PathBuf> = env::args()
        .collect::<Vec<_>>()
        .windows(2)
        .find(|w| w[0] == "--output")
        .map(|w| PathBuf::from(&w[1]));

    let written = match &output {
        Some(path) => fs::write(path, &json),
        None => io::stdout().write_all(json.as_bytes()),
    };

    match (written, output) {
        (Ok(()), Some(path)) => eprintln!("OpenAPI document written to {}", path.display()),
        (Ok(()), None) => {}
        (Err(e), _) => {
            eprintln!("Error writing OpenAPI document: {e}");
            process::exit(1);
        }
    }
}
