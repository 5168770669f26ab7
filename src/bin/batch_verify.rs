// Batch verification of Aadhaar card PDFs listed in a JSON manifest

use std::path::PathBuf;
use std::process::ExitCode;

use aadhaar_verifier::{
    batch::{load_manifest, run_batch, BatchSummary},
    models::VerifierConfig,
    processing::default_engine,
    AadhaarVerifier, VerifierError,
};
use clap::Parser;
use log::{error, info};

#[derive(Parser)]
#[command(name = "batch_verify")]
#[command(about = "Verify every document in a manifest and write the results as JSON")]
struct Args {
    /// JSON array of {"id", "document", "record"?} entries
    manifest: PathBuf,

    /// Where to write the results; stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of worker threads
    #[arg(short, long, default_value_t = 4)]
    jobs: usize,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tesseract tessdata directory
    #[arg(long)]
    tessdata: Option<PathBuf>,
}

fn run(args: &Args) -> Result<BatchSummary, VerifierError> {
    let config = match &args.config {
        Some(path) => VerifierConfig::from_json_file(path)?,
        None => VerifierConfig::default(),
    };
    let items = load_manifest(&args.manifest)?;
    info!(
        "Loaded {} document(s) from {}, using {} worker(s)",
        items.len(),
        args.manifest.display(),
        args.jobs
    );

    let engine = default_engine(args.tessdata.clone());
    let verifier = AadhaarVerifier::new(&config, engine.as_ref())?;
    let entries = run_batch(&verifier, &items, args.jobs);

    let text = serde_json::to_string_pretty(&entries)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, text)?;
            info!("Results written to {}", path.display());
        }
        None => println!("{}", text),
    }

    Ok(BatchSummary::from_entries(&entries))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match run(&args) {
        Ok(summary) => {
            summary.log();
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("Batch run failed: {}", err);
            ExitCode::from(1)
        }
    }
}
