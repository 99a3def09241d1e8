use chrono::NaiveDate;
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

pub const DATE_FORMAT: &str = "%d.%m.%Y";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("id must be non-negative, got {0}")]
    InvalidId(i64),
    #[error("invalid last name: '{0}'")]
    InvalidLastName(String),
    #[error("invalid first name: '{0}'")]
    InvalidFirstName(String),
    #[error("invalid birth date: '{0}'")]
    InvalidBirthDate(String),
}

/// One roster entry.
///
/// Fields are only reachable through validating setters, so a record is never
/// left half-updated. Records built with [`Record::new`] may still be invalid
/// (e.g. an unparseable birth date); call [`Record::is_valid`] before trusting
/// them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    id: i64,
    last_name: String,
    first_name: String,
    birth_date: Option<NaiveDate>,
}

/// Identity used for duplicate detection. `id` is deliberately absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordKey<'a> {
    pub last_name: &'a str,
    pub first_name: &'a str,
    pub birth_date: Option<NaiveDate>,
}

impl Record {
    /// Builds a record without validating names or id. A birth date that does
    /// not parse as `DD.MM.YYYY` is stored as absent.
    pub fn new(
        id: i64,
        last_name: impl Into<String>,
        first_name: impl Into<String>,
        birth_date: &str,
    ) -> Self {
        Self {
            id,
            last_name: last_name.into(),
            first_name: first_name.into(),
            birth_date: parse_birth_date(birth_date),
        }
    }

    /// Builds a record, rejecting the first field that fails validation.
    pub fn try_new(
        id: i64,
        last_name: &str,
        first_name: &str,
        birth_date: &str,
    ) -> Result<Self, RecordError> {
        let mut record = Self::default();
        record.set_id(id)?;
        record.set_last_name(last_name)?;
        record.set_first_name(first_name)?;
        record.set_birth_date(birth_date)?;
        Ok(record)
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn birth_date(&self) -> Option<NaiveDate> {
        self.birth_date
    }

    /// Birth date in `DD.MM.YYYY` form, or an empty string when absent.
    pub fn birth_date_text(&self) -> String {
        self.birth_date
            .map(|d| d.format(DATE_FORMAT).to_string())
            .unwrap_or_default()
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.last_name, self.first_name)
    }

    pub fn set_id(&mut self, id: i64) -> Result<(), RecordError> {
        if id < 0 {
            return Err(RecordError::InvalidId(id));
        }
        self.id = id;
        Ok(())
    }

    pub fn set_last_name(&mut self, name: &str) -> Result<(), RecordError> {
        if !is_valid_name(name) {
            return Err(RecordError::InvalidLastName(name.to_string()));
        }
        self.last_name = name.to_string();
        Ok(())
    }

    pub fn set_first_name(&mut self, name: &str) -> Result<(), RecordError> {
        if !is_valid_name(name) {
            return Err(RecordError::InvalidFirstName(name.to_string()));
        }
        self.first_name = name.to_string();
        Ok(())
    }

    pub fn set_birth_date(&mut self, date: &str) -> Result<(), RecordError> {
        match parse_birth_date(date) {
            Some(parsed) => {
                self.birth_date = Some(parsed);
                Ok(())
            }
            None => Err(RecordError::InvalidBirthDate(date.to_string())),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.id >= 0
            && is_valid_name(&self.last_name)
            && is_valid_name(&self.first_name)
            && self.birth_date.is_some()
    }

    pub fn key(&self) -> RecordKey<'_> {
        RecordKey {
            last_name: &self.last_name,
            first_name: &self.first_name,
            birth_date: self.birth_date,
        }
    }

    /// Same person per the roster rules: names and birth date match, id ignored.
    pub fn is_duplicate_of(&self, other: &Record) -> bool {
        self.key() == other.key()
    }

    /// Canonical roster order: last name, then first name. Equal keys compare
    /// equal so stable sorts keep their input order.
    pub fn canonical_cmp(&self, other: &Record) -> Ordering {
        self.last_name
            .cmp(&other.last_name)
            .then_with(|| self.first_name.cmp(&other.first_name))
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ID: {}, Name: {} {}, Born: {} [{}]",
            self.id,
            self.last_name,
            self.first_name,
            self.birth_date_text(),
            if self.is_valid() { "VALID" } else { "INVALID" }
        )
    }
}

pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphabetic() || c == ' ' || c == '-' || c == '.')
}

/// Parses `DD.MM.YYYY`, checking the day against the month and leap year.
pub fn parse_birth_date(text: &str) -> Option<NaiveDate> {
    let mut parts = text.trim().split('.');
    let day: u32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let year: i32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || year < 1 {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_record_roundtrips_fields() {
        let r = Record::new(1, "Ivanov", "Ivan", "01.01.1990");
        assert!(r.is_valid());
        assert_eq!(r.id(), 1);
        assert_eq!(r.last_name(), "Ivanov");
        assert_eq!(r.first_name(), "Ivan");
        assert_eq!(r.birth_date_text(), "01.01.1990");
        assert_eq!(r.full_name(), "Ivanov Ivan");
    }

    #[test]
    fn impossible_dates_are_rejected() {
        assert!(!Record::new(1, "Petrov", "Petr", "31.04.2000").is_valid());
        assert!(!Record::new(1, "Petrov", "Petr", "29.02.2001").is_valid());
        assert!(!Record::new(1, "Petrov", "Petr", "00.01.2001").is_valid());
        assert!(!Record::new(1, "Petrov", "Petr", "01.13.2001").is_valid());
        assert!(!Record::new(1, "Petrov", "Petr", "2001-01-01").is_valid());
        assert!(Record::new(1, "Petrov", "Petr", "29.02.2000").is_valid());
        assert!(Record::new(1, "Petrov", "Petr", "1.2.1999").is_valid());
    }

    #[test]
    fn names_allow_letters_spaces_hyphens_and_periods() {
        assert!(is_valid_name("Smith-Jones"));
        assert!(is_valid_name("de la Cruz"));
        assert!(is_valid_name("J.R."));
        assert!(is_valid_name("Сидоров"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("R2D2"));
        assert!(!is_valid_name("O'Brien"));
    }

    #[test]
    fn negative_id_is_invalid() {
        let r = Record::new(-1, "Ivanov", "Ivan", "01.01.1990");
        assert!(!r.is_valid());
    }

    #[test]
    fn setters_leave_record_untouched_on_failure() {
        let mut r = Record::new(7, "Ivanov", "Ivan", "01.01.1990");
        let before = r.clone();

        assert_eq!(r.set_id(-3), Err(RecordError::InvalidId(-3)));
        assert!(matches!(
            r.set_last_name("Iv4nov"),
            Err(RecordError::InvalidLastName(_))
        ));
        assert!(matches!(
            r.set_first_name(""),
            Err(RecordError::InvalidFirstName(_))
        ));
        assert!(matches!(
            r.set_birth_date("31.04.2000"),
            Err(RecordError::InvalidBirthDate(_))
        ));
        assert_eq!(r, before);

        r.set_birth_date("02.02.1992").expect("valid date");
        assert_eq!(r.birth_date_text(), "02.02.1992");
    }

    #[test]
    fn try_new_reports_first_bad_field() {
        assert!(Record::try_new(1, "Ivanov", "Ivan", "01.01.1990").is_ok());
        assert_eq!(
            Record::try_new(1, "Ivanov", "Ivan", "31.04.2000"),
            Err(RecordError::InvalidBirthDate("31.04.2000".into()))
        );
    }

    #[test]
    fn duplicate_identity_ignores_id() {
        let a = Record::new(1, "Ivanov", "Ivan", "01.01.1990");
        let b = Record::new(2, "Ivanov", "Ivan", "01.01.1990");
        let c = Record::new(1, "Ivanov", "Ivan", "02.01.1990");
        assert!(a.is_duplicate_of(&b));
        assert!(!a.is_duplicate_of(&c));
        assert_ne!(a, b);
    }

    #[test]
    fn unpadded_date_is_the_same_calendar_day() {
        let padded = Record::new(1, "Ivanov", "Ivan", "01.02.1999");
        let bare = Record::new(2, "Ivanov", "Ivan", "1.2.1999");
        assert!(padded.is_duplicate_of(&bare));
        assert_eq!(bare.birth_date_text(), "01.02.1999");
    }

    #[test]
    fn canonical_order_is_last_then_first_name() {
        let a = Record::new(1, "Ivanov", "Boris", "01.01.1990");
        let b = Record::new(2, "Ivanov", "Anna", "01.01.1990");
        let c = Record::new(3, "Abramov", "Zed", "01.01.1990");
        assert_eq!(a.canonical_cmp(&b), Ordering::Greater);
        assert_eq!(c.canonical_cmp(&a), Ordering::Less);
        let d = Record::new(9, "Ivanov", "Boris", "05.05.1995");
        assert_eq!(a.canonical_cmp(&d), Ordering::Equal);
    }

    #[test]
    fn display_marks_validity() {
        let r = Record::new(3, "Ivanov", "Ivan", "bad");
        assert_eq!(r.to_string(), "ID: 3, Name: Ivanov Ivan, Born:  [INVALID]");
    }
}
