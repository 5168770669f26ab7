// Aadhaar card verification from a scanned PDF

use std::path::PathBuf;
use std::process::ExitCode;

use aadhaar_verifier::{
    models::{VerificationResponse, VerifierConfig},
    processing::default_engine,
    validation::{ApplicantRecord, RecordMatcher},
    AadhaarVerifier, RawDocument, VerificationReport, VerifierError,
};
use clap::Parser;
use log::error;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "aadhaar-verify")]
#[command(about = "Extract and verify the fields of an Aadhaar card PDF")]
struct Args {
    /// PDF containing the scanned card
    document: PathBuf,

    /// JSON configuration file; unset keys keep their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Applicant record (JSON) to compare the card against
    #[arg(short, long)]
    record: Option<PathBuf>,

    /// Tesseract tessdata directory
    #[arg(long)]
    tessdata: Option<PathBuf>,

    /// Include page, rotation and validation diagnostics in the output
    #[arg(long)]
    details: bool,
}

fn details(report: &VerificationReport) -> Value {
    let issues: Vec<Value> = report
        .validation
        .issues
        .iter()
        .map(|issue| {
            json!({
                "field": format!("{:?}", issue.field),
                "reason": format!("{:?}", issue.reason),
                "message": issue.message,
            })
        })
        .collect();
    json!({
        "page": report.page_index + 1,
        "rotation": report.rotation,
        "fragment_count": report.fragment_count,
        "core_fields_found": report.fields.core_fields_found(),
        "checksum_passed": report.validation.checksum_passed(),
        "issues": issues,
    })
}

fn run(args: &Args) -> Result<Value, VerifierError> {
    let config = match &args.config {
        Some(path) => VerifierConfig::from_json_file(path)?,
        None => VerifierConfig::default(),
    };
    let record = args
        .record
        .as_deref()
        .map(ApplicantRecord::from_json_file)
        .transpose()?;

    let engine = default_engine(args.tessdata.clone());
    let verifier = AadhaarVerifier::new(&config, engine.as_ref())?;
    let bytes = std::fs::read(&args.document)?;
    let document = RawDocument::new(args.document.display().to_string(), bytes);
    let report = verifier.verify_against(&document, record.as_ref())?;

    let mut output = serde_json::to_value(VerificationResponse::Outcome(report.outcome.clone()))?;
    if let Value::Object(map) = &mut output {
        if args.details {
            map.insert("details".to_string(), details(&report));
        }
        if let Some(record) = &record {
            let comparison = RecordMatcher::default().compare(&report.outcome, record);
            map.insert("record_match".to_string(), serde_json::to_value(comparison)?);
        }
    }
    Ok(output)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let (output, code) = match run(&args) {
        Ok(output) => (output, ExitCode::SUCCESS),
        Err(err) => {
            error!("Verification of {} failed: {}", args.document.display(), err);
            (json!({ "error": err.to_string() }), ExitCode::from(1))
        }
    };

    match serde_json::to_string_pretty(&output) {
        Ok(text) => println!("{}", text),
        Err(err) => {
            error!("Failed to serialize output: {}", err);
            return ExitCode::from(1);
        }
    }
    code
}
