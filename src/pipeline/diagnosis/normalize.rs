//! Coerce loosely-typed provider JSON into the canonical `AnalysisResult`.
//!
//! Never fails. Missing or mistyped fields degrade to type-correct defaults,
//! and the health percentage is the single source of truth for stage and
//! severity:
//!
//! - `healthPercentage >= 90` forces stage 0 / severity none
//! - `healthPercentage < 45` forces stage 3 / severity high
//! - in between the provider's stage is kept if it is 1 or 2, otherwise
//!   moved to the nearest of the two
//!
//! Applying `normalize` to the JSON of its own output is the identity.

use serde_json::Value;

use super::types::{
    AnalysisResult, Cause, PossibleDisease, ProviderMeta, Severity, Stage,
};

/// Health at or above this is healthy (stage 0).
pub const HEALTHY_THRESHOLD: u8 = 90;
/// Health below this is critical (stage 3).
pub const CRITICAL_THRESHOLD: u8 = 45;
/// Split between mild and moderate when the provider gave no usable stage.
const MILD_THRESHOLD: u8 = 70;

pub const NO_LEAF_MESSAGE: &str =
    "No plant leaf was detected in this image. Please upload a clear, well-lit photo of a single leaf.";

/// A `possibleDiseases` entry as providers actually send it: either a bare
/// name or an object with details.
#[derive(Debug, Clone, PartialEq)]
pub enum DiseaseEntry {
    PlainName(String),
    Detailed {
        name: String,
        description: String,
        likelihood: u8,
    },
}

impl DiseaseEntry {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(_) => Some(DiseaseEntry::Detailed {
                name: text_field(value, &["name", "disease"]),
                description: text_field(value, &["description", "details"]),
                likelihood: field(value, &["likelihood", "probability"])
                    .and_then(coerce_f64)
                    .map(likelihood_percent)
                    .unwrap_or(0),
            }),
            other => coerce_string(other).map(DiseaseEntry::PlainName),
        }
    }

    /// Flatten to the canonical shape; entries without a name are dropped.
    pub fn into_possible_disease(self) -> Option<PossibleDisease> {
        let disease = match self {
            DiseaseEntry::PlainName(name) => PossibleDisease {
                name,
                description: String::new(),
                likelihood: 0,
            },
            DiseaseEntry::Detailed {
                name,
                description,
                likelihood,
            } => PossibleDisease {
                name,
                description,
                likelihood,
            },
        };
        (!disease.name.is_empty()).then_some(disease)
    }
}

/// Normalize raw provider JSON into a fully defaulted result.
pub fn normalize(raw: &Value, meta: ProviderMeta) -> AnalysisResult {
    let raw_stage = field(raw, &["stage"])
        .and_then(coerce_f64)
        .map(|s| s.round() as i64);
    let confidence = normalize_confidence(field(raw, &["confidence"]));

    if !leaf_present(raw, raw_stage) {
        return no_leaf_result(raw, confidence, meta);
    }

    let health_percentage = match field(raw, &["healthPercentage", "health_percentage", "health"])
        .and_then(coerce_f64)
    {
        Some(h) => h.clamp(0.0, 100.0).round() as u8,
        None => raw_stage.map(stage_midpoint).unwrap_or(0),
    };
    let stage = reconcile_stage(health_percentage, raw_stage);

    let possible_diseases: Vec<PossibleDisease> = list(field(raw, &["possibleDiseases", "possible_diseases"]))
        .iter()
        .filter_map(DiseaseEntry::from_value)
        .filter_map(DiseaseEntry::into_possible_disease)
        .collect();

    let mut primary_disease = text_field(raw, &["primaryDisease", "primary_disease"]);
    if primary_disease.is_empty() {
        if let Some(first) = possible_diseases.first() {
            primary_disease = first.name.clone();
        }
    }

    AnalysisResult {
        leaf_present: true,
        stage,
        health_percentage,
        severity: stage.severity(),
        category: text_field(raw, &["category"]),
        damage_type: text_field(raw, &["damageType", "damage_type"]),
        description: text_field(raw, &["description"]),
        primary_disease,
        possible_diseases,
        causes: list(field(raw, &["causes"]))
            .iter()
            .filter_map(cause_from_value)
            .collect(),
        care_tips: string_list(field(raw, &["careTips", "care_tips"])),
        symptoms: string_list(field(raw, &["symptoms"])),
        detected_patterns: string_list(field(raw, &["detectedPatterns", "detected_patterns"])),
        confidence,
        provider: meta.provider,
        model: meta.model,
        cost: meta.cost,
    }
}

/// Map a health percentage and the provider's stage claim to the final stage.
pub fn reconcile_stage(health_percentage: u8, raw_stage: Option<i64>) -> Stage {
    if health_percentage >= HEALTHY_THRESHOLD {
        return Stage::Healthy;
    }
    if health_percentage < CRITICAL_THRESHOLD {
        return Stage::Critical;
    }
    match raw_stage {
        Some(i64::MIN..=1) => Stage::Mild,
        Some(_) => Stage::Moderate,
        None if health_percentage >= MILD_THRESHOLD => Stage::Mild,
        None => Stage::Moderate,
    }
}

/// Values above 1 are read as percentages.
pub fn normalize_confidence(value: Option<&Value>) -> f64 {
    match value.and_then(coerce_f64) {
        Some(c) if c > 1.0 => (c / 100.0).clamp(0.0, 1.0),
        Some(c) => c.clamp(0.0, 1.0),
        None => 0.0,
    }
}

/// Explicit leaf flags win; the `stage: -1` sentinel only decides when
/// the provider sent none of them.
fn leaf_present(raw: &Value, raw_stage: Option<i64>) -> bool {
    let flags = [
        field(raw, &["leafPresent", "leaf_present"]).and_then(coerce_bool),
        field(raw, &["leafDetected", "leaf_detected"]).and_then(coerce_bool),
        field(raw, &["noLeafDetected", "no_leaf_detected"])
            .and_then(coerce_bool)
            .map(|no_leaf| !no_leaf),
    ];
    if flags.contains(&Some(false)) {
        return false;
    }
    if flags.contains(&Some(true)) {
        return true;
    }
    raw_stage != Some(-1)
}

fn no_leaf_result(raw: &Value, confidence: f64, meta: ProviderMeta) -> AnalysisResult {
    let mut description = text_field(raw, &["message", "description"]);
    if description.is_empty() {
        description = NO_LEAF_MESSAGE.to_string();
    }
    AnalysisResult {
        leaf_present: false,
        stage: Stage::NoLeaf,
        health_percentage: 0,
        severity: Severity::None,
        category: String::new(),
        damage_type: String::new(),
        description,
        primary_disease: String::new(),
        possible_diseases: Vec::new(),
        causes: Vec::new(),
        care_tips: Vec::new(),
        symptoms: Vec::new(),
        detected_patterns: Vec::new(),
        confidence,
        provider: meta.provider,
        model: meta.model,
        cost: meta.cost,
    }
}

/// Representative health for a stage when the provider omitted the number.
fn stage_midpoint(stage: i64) -> u8 {
    match stage {
        i64::MIN..=0 => 95,
        1 => 75,
        2 => 55,
        _ => 25,
    }
}

/// Likelihoods are 0–100; fractions in (0, 1) are scaled up.
fn likelihood_percent(value: f64) -> u8 {
    let percent = if value > 0.0 && value < 1.0 {
        value * 100.0
    } else {
        value
    };
    percent.clamp(0.0, 100.0).round() as u8
}

fn cause_from_value(value: &Value) -> Option<Cause> {
    let cause = match value {
        Value::Object(_) => Cause {
            disease: text_field(value, &["disease", "name"]),
            cause: text_field(value, &["cause"]),
            explanation: text_field(value, &["explanation", "description"]),
        },
        other => Cause {
            disease: String::new(),
            cause: coerce_string(other)?,
            explanation: String::new(),
        },
    };
    let empty = cause.disease.is_empty() && cause.cause.is_empty() && cause.explanation.is_empty();
    (!empty).then_some(cause)
}

// ──────────────────────────────────────────────
// Lenient coercion
// ──────────────────────────────────────────────

/// First non-null value among the given key aliases.
fn field<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| raw.get(*k))
        .find(|v| !v.is_null())
}

fn text_field(raw: &Value, keys: &[&str]) -> String {
    field(raw, keys).and_then(coerce_string).unwrap_or_default()
}

fn coerce_f64(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Scalars become trimmed text; empty strings, arrays and objects do not.
fn coerce_string(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

/// Arrays as-is; a single scalar becomes a one-element list.
fn list(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other.clone()],
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    list(value).iter().filter_map(coerce_string).collect()
}
