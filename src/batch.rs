use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::aadhaar_verifier::AadhaarVerifier;
use crate::models::{Decision, RawDocument, VerificationResponse};
use crate::utils::VerifierError;
use crate::validation::{ApplicantRecord, RecordComparison, RecordDecision, RecordMatcher};

/// One manifest entry: a document to verify and, optionally, the applicant
/// data it should match.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchItem {
    pub id: String,
    pub document: PathBuf,
    #[serde(default)]
    pub record: Option<ApplicantRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
    pub id: String,
    pub document: String,
    #[serde(flatten)]
    pub response: VerificationResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_match: Option<RecordComparison>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub verified: usize,
    pub manual_review: usize,
    pub not_verified: usize,
    pub errors: usize,
    pub records_compared: usize,
    pub name_matches: usize,
    pub dob_matches: usize,
    pub gender_matches: usize,
    pub aadhaar_matches: usize,
    pub accepted: usize,
}

impl BatchSummary {
    pub fn from_entries(entries: &[BatchEntry]) -> Self {
        let mut summary = BatchSummary {
            total: entries.len(),
            ..BatchSummary::default()
        };
        for entry in entries {
            match &entry.response {
                VerificationResponse::Outcome(outcome) => match outcome.decision {
                    Decision::Verified => summary.verified += 1,
                    Decision::ManualReview => summary.manual_review += 1,
                    Decision::NotVerified => summary.not_verified += 1,
                },
                VerificationResponse::Error { .. } => summary.errors += 1,
            }
            if let Some(comparison) = &entry.record_match {
                summary.records_compared += 1;
                summary.name_matches += comparison.name_match as usize;
                summary.dob_matches += comparison.dob_match as usize;
                summary.gender_matches += comparison.gender_match as usize;
                summary.aadhaar_matches += comparison.aadhaar_match as usize;
                summary.accepted += (comparison.decision == RecordDecision::Accept) as usize;
            }
        }
        summary
    }

    fn percent(part: usize, whole: usize) -> f64 {
        if whole == 0 {
            0.0
        } else {
            part as f64 * 100.0 / whole as f64
        }
    }

    pub fn log(&self) {
        info!("Processed {} document(s)", self.total);
        info!("  Verified:      {} ({:.1}%)", self.verified, Self::percent(self.verified, self.total));
        info!("  Manual Review: {} ({:.1}%)", self.manual_review, Self::percent(self.manual_review, self.total));
        info!("  Not Verified:  {} ({:.1}%)", self.not_verified, Self::percent(self.not_verified, self.total));
        info!("  Errors:        {} ({:.1}%)", self.errors, Self::percent(self.errors, self.total));
        if self.records_compared > 0 {
            let n = self.records_compared;
            info!("Record comparison over {} document(s):", n);
            info!("  Name match:    {:.1}%", Self::percent(self.name_matches, n));
            info!("  DOB match:     {:.1}%", Self::percent(self.dob_matches, n));
            info!("  Gender match:  {:.1}%", Self::percent(self.gender_matches, n));
            info!("  Aadhaar match: {:.1}%", Self::percent(self.aadhaar_matches, n));
            info!("  Accepted:      {:.1}%", Self::percent(self.accepted, n));
        }
    }
}

/// Reads a manifest and resolves relative document paths against its directory.
pub fn load_manifest(path: &Path) -> Result<Vec<BatchItem>, VerifierError> {
    let text = std::fs::read_to_string(path)?;
    let mut items: Vec<BatchItem> = serde_json::from_str(&text)?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    for item in &mut items {
        if item.document.is_relative() {
            item.document = base.join(&item.document);
        }
    }
    Ok(items)
}

fn verify_item(verifier: &AadhaarVerifier, matcher: &RecordMatcher, item: &BatchItem) -> BatchEntry {
    let response: VerificationResponse = std::fs::read(&item.document)
        .map_err(VerifierError::from)
        .and_then(|bytes| {
            verifier
                .verify_against(
                    &RawDocument::new(item.document.display().to_string(), bytes),
                    item.record.as_ref(),
                )
                .map(|report| report.outcome)
        })
        .into();

    if let VerificationResponse::Error { error } = &response {
        warn!("{}: {}", item.id, error);
    }
    let record_match = match (&response, &item.record) {
        (VerificationResponse::Outcome(outcome), Some(record)) => Some(matcher.compare(outcome, record)),
        _ => None,
    };

    BatchEntry {
        id: item.id.clone(),
        document: item.document.display().to_string(),
        response,
        record_match,
    }
}

/// Verifies every item on `jobs` worker threads sharing one verifier.
/// Entries come back in manifest order; a failing document only affects its own entry.
pub fn run_batch(verifier: &AadhaarVerifier, items: &[BatchItem], jobs: usize) -> Vec<BatchEntry> {
    let matcher = &RecordMatcher::default();
    let next = &AtomicUsize::new(0);
    let workers = jobs.max(1).min(items.len().max(1));

    let mut entries: Vec<(usize, BatchEntry)> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(move || {
                    let mut done = Vec::new();
                    loop {
                        let index = next.fetch_add(1, Ordering::SeqCst);
                        let item = match items.get(index) {
                            Some(item) => item,
                            None => break,
                        };
                        done.push((index, verify_item(verifier, matcher, item)));
                    }
                    done
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| match handle.join() {
                Ok(done) => done,
                Err(_) => {
                    warn!("A batch worker panicked; its documents are missing from the results");
                    Vec::new()
                }
            })
            .collect()
    });

    entries.sort_by_key(|(index, _)| *index);
    entries.into_iter().map(|(_, entry)| entry).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Status, VerificationOutcome};

    fn entry(response: VerificationResponse, record_match: Option<RecordComparison>) -> BatchEntry {
        BatchEntry {
            id: "a".to_string(),
            document: "a.pdf".to_string(),
            response,
            record_match,
        }
    }

    fn outcome(decision: Decision) -> VerificationResponse {
        VerificationResponse::Outcome(VerificationOutcome {
            extracted_name: None,
            extracted_gender: None,
            extracted_dob: None,
            extracted_aadhaar: None,
            aadhaar_refnum: None,
            decision,
            status: Status::Partial,
            ocr_confidence: 50.0,
        })
    }

    #[test]
    fn test_summary_counts() {
        let comparison = RecordComparison {
            name_score: 100.0,
            name_match: true,
            dob_match: true,
            gender_match: false,
            aadhaar_match: true,
            decision: RecordDecision::ManualReview,
        };
        let entries = vec![
            entry(outcome(Decision::Verified), Some(comparison)),
            entry(outcome(Decision::ManualReview), None),
            entry(
                VerificationResponse::Error {
                    error: "UnsupportedFormat: x".to_string(),
                },
                None,
            ),
        ];
        let summary = BatchSummary::from_entries(&entries);

        assert_eq!(summary.total, 3);
        assert_eq!(summary.verified, 1);
        assert_eq!(summary.manual_review, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.records_compared, 1);
        assert_eq!(summary.gender_matches, 0);
        assert_eq!(summary.accepted, 0);
    }

    #[test]
    fn test_entry_serializes_flat() {
        let json = serde_json::to_value(entry(outcome(Decision::NotVerified), None)).unwrap();
        assert_eq!(json["id"], "a");
        assert_eq!(json["decision"], "Not Verified");
        assert!(json.get("record_match").is_none());

        let json = serde_json::to_value(entry(
            VerificationResponse::Error {
                error: "EmptyDocument: none".to_string(),
            },
            None,
        ))
        .unwrap();
        assert_eq!(json["error"], "EmptyDocument: none");
    }

    #[test]
    fn test_manifest_paths_resolve_against_manifest_dir() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("manifest.json");
        std::fs::write(
            &manifest,
            r#"[
                {"id": "1", "document": "cards/one.pdf"},
                {"id": "2", "document": "/abs/two.pdf", "record": {"first_name": "Asha", "gender": "F"}}
            ]"#,
        )
        .unwrap();

        let items = load_manifest(&manifest).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].document, dir.path().join("cards/one.pdf"));
        assert_eq!(items[1].document, PathBuf::from("/abs/two.pdf"));
        assert_eq!(items[1].record.as_ref().unwrap().first_name, "Asha");
        assert!(items[0].record.is_none());
    }
}
