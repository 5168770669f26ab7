use crate::models::{DatePrecision, ExtractedFields, Field, FieldWeights, OcrFragment, VerifierConfig};

/// Folds per-field OCR confidences into one score in [0, 100].
pub struct ConfidenceAggregator {
    weights: FieldWeights,
    year_only_completeness: f64,
}

impl ConfidenceAggregator {
    pub fn new(config: &VerifierConfig) -> Self {
        ConfidenceAggregator {
            weights: config.field_weights.clone(),
            year_only_completeness: config.year_only_completeness,
        }
    }

    /// Mean confidence (0-1) of the distinct fragments behind `field`, 0 when absent.
    pub fn field_confidence(&self, fields: &ExtractedFields, fragments: &[OcrFragment], field: Field) -> f64 {
        if !fields.has(field) {
            return 0.0;
        }
        let confidences: Vec<f64> = fields
            .fragments_for(field)
            .into_iter()
            .filter_map(|index| fragments.get(index))
            .map(|fragment| fragment.confidence as f64)
            .collect();
        if confidences.is_empty() {
            return 0.0;
        }
        let mean = confidences.iter().sum::<f64>() / confidences.len() as f64;

        match (field, fields.date_of_birth) {
            (Field::DateOfBirth, Some(dob)) if dob.precision == DatePrecision::YearOnly => {
                mean * self.year_only_completeness
            }
            _ => mean,
        }
    }

    /// Weighted mean over every field; missing fields count as 0 but keep
    /// their weight. Rounded to two decimals.
    pub fn aggregate(&self, fields: &ExtractedFields, fragments: &[OcrFragment]) -> f64 {
        let total = self.weights.total();
        if total <= 0.0 {
            return 0.0;
        }
        let weighted: f64 = Field::ALL
            .iter()
            .map(|&field| self.weights.weight(field) * self.field_confidence(fields, fragments, field))
            .sum();
        let score = (weighted / total * 100.0).clamp(0.0, 100.0);
        (score * 100.0).round() / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BirthDate, BoundingBox, Gender};
    use chrono::NaiveDate;

    fn fragments(confidences: &[f32]) -> Vec<OcrFragment> {
        confidences
            .iter()
            .enumerate()
            .map(|(i, &c)| OcrFragment::new(format!("t{}", i), BoundingBox::new(i as u32 * 50, 0, 40, 20), c))
            .collect()
    }

    fn complete_fields() -> ExtractedFields {
        let mut fields = ExtractedFields {
            id_number: Some("123412341234".to_string()),
            date_of_birth: Some(BirthDate::full(NaiveDate::from_ymd_opt(1998, 6, 15).unwrap())),
            gender: Some(Gender::Male),
            name: Some("Shubham Sawant".to_string()),
            reference_number: Some("1234/12345/12345".to_string()),
            ..ExtractedFields::default()
        };
        fields.link(Field::IdNumber, &[0, 1, 2]);
        fields.link(Field::DateOfBirth, &[3]);
        fields.link(Field::Gender, &[4]);
        fields.link(Field::Name, &[5, 6]);
        fields.link(Field::ReferenceNumber, &[7]);
        fields
    }

    #[test]
    fn test_uniform_confidence_maps_to_percentage() {
        let aggregator = ConfidenceAggregator::new(&VerifierConfig::default());
        let score = aggregator.aggregate(&complete_fields(), &fragments(&[0.9; 8]));
        assert!((score - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_fields_scores_zero() {
        let aggregator = ConfidenceAggregator::new(&VerifierConfig::default());
        assert_eq!(aggregator.aggregate(&ExtractedFields::default(), &[]), 0.0);
    }

    #[test]
    fn test_missing_field_keeps_its_weight() {
        let aggregator = ConfidenceAggregator::new(&VerifierConfig::default());
        let mut fields = complete_fields();
        fields.reference_number = None;
        let score = aggregator.aggregate(&fields, &fragments(&[1.0; 8]));
        // 0.12 of the weight is lost
        assert!((score - 88.0).abs() < 1e-9);
    }

    #[test]
    fn test_year_only_birth_date_is_downweighted() {
        let aggregator = ConfidenceAggregator::new(&VerifierConfig::default());
        let mut fields = complete_fields();
        fields.date_of_birth = BirthDate::year_only(1998);
        let all = fragments(&[1.0; 8]);

        assert!((aggregator.field_confidence(&fields, &all, Field::DateOfBirth) - 0.5).abs() < 1e-9);
        assert!((aggregator.aggregate(&fields, &all) - 89.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_is_rounded_to_two_decimals() {
        let aggregator = ConfidenceAggregator::new(&VerifierConfig::default());
        let mut fields = ExtractedFields {
            id_number: Some("123412341234".to_string()),
            ..ExtractedFields::default()
        };
        fields.link(Field::IdNumber, &[0, 1, 2]);
        let score = aggregator.aggregate(&fields, &fragments(&[0.91, 0.87, 0.935]));
        // 0.40 * 0.905 = 0.362
        assert!((score - 36.2).abs() < 1e-9);
        assert_eq!(score, (score * 100.0).round() / 100.0);
    }
}
