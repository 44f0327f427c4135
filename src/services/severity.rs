//! Text severity and document structure classifiers
//!
//! All classifiers are pure keyword/pattern heuristics. The tier precedence
//! and the fixed scores are lending policy; a description that matches no
//! tier at all still scores as moderate risk.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

pub const HIGH_SEVERITY_SCORE: f64 = 0.8;
pub const MEDIUM_SEVERITY_SCORE: f64 = 0.5;
pub const LOW_SEVERITY_SCORE: f64 = 0.2;
pub const DEFAULT_SEVERITY_SCORE: f64 = 0.3;

/// Required vocabulary of a medical report; at least this many must appear
pub const MEDICAL_REPORT_TERMS: [&str; 4] = ["diagnosis", "treatment", "physician", "hospital"];
pub const MEDICAL_REPORT_MIN_TERMS: usize = 3;

static HIGH_SEVERITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:critical|severe|bleeding|unconscious|fracture[sd]?|trauma|surgery|icu|emergency|life-threatening)\b",
    )
    .expect("valid high severity pattern")
});

static LOW_SEVERITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:minor|scratch(?:es)?|bruise[sd]?|small cut|sprain(?:ed)?)\b")
        .expect("valid low severity pattern")
});

static MEDIUM_SEVERITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:moderate|injury|injuries|injured|pain|swelling|stitches|wound)\b")
        .expect("valid medium severity pattern")
});

static FIR_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:F\.?I\.?R|C\.?R)\.?\s*(?:No\.?|Number|#)?\s*[:\-]?\s*(\d{1,6}\s*/\s*\d{2,4})",
    )
    .expect("valid FIR number pattern")
});

static STATE_CASE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[A-Z]{2}/[A-Z0-9]{2,10}/(?:19|20)\d{2}/\d{1,6}\b")
        .expect("valid state case number pattern")
});

static DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})[/\-.](\d{1,2})[/\-.](\d{4})\b").expect("valid date pattern")
});

static CRITICAL_TIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:critical|icu|life-threatening)\b").expect("valid critical pattern")
});

static SERIOUS_TIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:serious|severe)\b").expect("valid serious pattern"));

/// Score a free-text incident description in [0, 1].
///
/// High beats low, low beats medium: "critical bleeding, minor scratch"
/// is high severity.
pub fn score_text_severity(text: &str) -> f64 {
    if HIGH_SEVERITY.is_match(text) {
        HIGH_SEVERITY_SCORE
    } else if LOW_SEVERITY.is_match(text) {
        LOW_SEVERITY_SCORE
    } else if MEDIUM_SEVERITY.is_match(text) {
        MEDIUM_SEVERITY_SCORE
    } else {
        DEFAULT_SEVERITY_SCORE
    }
}

/// Outcome of FIR structural validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FirValidation {
    pub valid: bool,
    pub fir_number: Option<String>,
    pub incident_date: Option<NaiveDate>,
}

pub fn validate_fir(text: &str) -> FirValidation {
    let fir_number = FIR_NUMBER
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().split_whitespace().collect::<String>())
        .or_else(|| STATE_CASE_NUMBER.find(text).map(|m| m.as_str().to_uppercase()));

    FirValidation {
        valid: fir_number.is_some(),
        fir_number,
        incident_date: extract_dates(text).into_iter().next(),
    }
}

/// Medical report severity tier: 1 critical, 2 serious, 3 moderate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct SeverityTier(pub u8);

impl SeverityTier {
    pub const CRITICAL: SeverityTier = SeverityTier(1);
    pub const SERIOUS: SeverityTier = SeverityTier(2);
    pub const MODERATE: SeverityTier = SeverityTier(3);
}

/// Outcome of medical report structural validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalReportValidation {
    pub valid: bool,
    pub severity_tier: SeverityTier,
    pub matched_terms: usize,
    pub report_date: Option<NaiveDate>,
}

pub fn validate_medical_report(text: &str) -> MedicalReportValidation {
    let lowered = text.to_lowercase();
    let matched_terms = MEDICAL_REPORT_TERMS
        .iter()
        .filter(|term| lowered.contains(*term))
        .count();

    let severity_tier = if CRITICAL_TIER.is_match(text) {
        SeverityTier::CRITICAL
    } else if SERIOUS_TIER.is_match(text) {
        SeverityTier::SERIOUS
    } else {
        SeverityTier::MODERATE
    };

    MedicalReportValidation {
        valid: matched_terms >= MEDICAL_REPORT_MIN_TERMS,
        severity_tier,
        matched_terms,
        report_date: extract_dates(text).into_iter().next(),
    }
}

/// Maximum approvable amount for a severity tier
pub fn amount_for_severity_tier(tier: SeverityTier) -> u64 {
    match tier.0 {
        1 => 500_000,
        2 => 250_000,
        3 => 100_000,
        _ => 50_000,
    }
}

/// Every DD/MM/YYYY-like date in the text, in order of appearance
pub fn extract_dates(text: &str) -> Vec<NaiveDate> {
    DATE.captures_iter(text)
        .filter_map(|caps| {
            let day = caps[1].parse::<u32>().ok()?;
            let month = caps[2].parse::<u32>().ok()?;
            let year = caps[3].parse::<i32>().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        })
        .collect()
}
