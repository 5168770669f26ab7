use chrono::{Datelike, NaiveDate};

use crate::models::{BirthDate, DatePrecision};

/// Sanity check for a printed date of birth.
pub struct DateValidator;

impl DateValidator {
    /// The birth year must fall within `[today.year - max_age, today.year - min_age]`
    /// and the date must not lie in the future.
    pub fn is_plausible(dob: &BirthDate, today: NaiveDate, min_age_years: i32, max_age_years: i32) -> bool {
        let in_future = match dob.precision {
            DatePrecision::Full => dob.date > today,
            DatePrecision::YearOnly => dob.date.year() > today.year(),
        };
        if in_future {
            return false;
        }

        let year = dob.date.year();
        year >= today.year() - max_age_years && year <= today.year() - min_age_years
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn full(year: i32, month: u32, day: u32) -> BirthDate {
        BirthDate::full(NaiveDate::from_ymd_opt(year, month, day).unwrap())
    }

    #[test]
    fn test_typical_adult_is_plausible() {
        assert!(DateValidator::is_plausible(&full(1998, 6, 15), today(), 5, 120));
    }

    #[test]
    fn test_window_edges() {
        assert!(DateValidator::is_plausible(&full(2019, 1, 1), today(), 5, 120));
        assert!(!DateValidator::is_plausible(&full(2020, 1, 1), today(), 5, 120));
        assert!(DateValidator::is_plausible(&full(1904, 12, 31), today(), 5, 120));
        assert!(!DateValidator::is_plausible(&full(1903, 12, 31), today(), 5, 120));
    }

    #[test]
    fn test_future_date_is_rejected() {
        assert!(!DateValidator::is_plausible(&full(2024, 3, 2), today(), 0, 120));
        assert!(DateValidator::is_plausible(&full(2024, 3, 1), today(), 0, 120));
    }

    #[test]
    fn test_year_only_compares_years() {
        let dob = BirthDate::year_only(2024).unwrap();
        assert!(DateValidator::is_plausible(&dob, today(), 0, 120));
        let dob = BirthDate::year_only(1987).unwrap();
        assert!(DateValidator::is_plausible(&dob, today(), 5, 120));
    }
}
