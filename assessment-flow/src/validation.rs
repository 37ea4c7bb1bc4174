//! Input validation applied before a run starts. Failures are reported to the
//! caller up front and never partially applied.

use serde_json::Value;

use crate::error::{AssessmentError, Result};
use crate::record::{Symptom, patient_info};

const VALID_GENDERS: [&str; 5] = ["Male", "Female", "Other", "M", "F"];
const MAX_AGE: i64 = 150;

/// Validate the patient descriptor (flat or one-level-nested shape).
pub fn validate_patient(patient: &Value) -> Result<()> {
    let info = patient_info(patient);

    if !info.is_object() {
        return Err(AssessmentError::Validation(
            "Patient data is required".to_string(),
        ));
    }

    match info.get("name").and_then(Value::as_str) {
        Some(name) if !name.trim().is_empty() => {}
        _ => {
            return Err(AssessmentError::Validation(
                "Patient name is required".to_string(),
            ));
        }
    }

    let age = match info.get("age") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match age {
        Some(age) if (0..=MAX_AGE).contains(&age) => {}
        Some(_) => {
            return Err(AssessmentError::Validation(format!(
                "Patient age must be between 0 and {MAX_AGE}"
            )));
        }
        None => {
            return Err(AssessmentError::Validation(
                "Patient age must be a valid number".to_string(),
            ));
        }
    }

    match info.get("gender").and_then(Value::as_str) {
        Some(gender) if VALID_GENDERS.contains(&gender) => Ok(()),
        Some(_) => Err(AssessmentError::Validation(format!(
            "Patient gender must be one of: {}",
            VALID_GENDERS.join(", ")
        ))),
        None => Err(AssessmentError::Validation(
            "Patient gender is required".to_string(),
        )),
    }
}

/// Validate the reported symptom list.
pub fn validate_symptoms(symptoms: &[Symptom]) -> Result<()> {
    if symptoms.is_empty() {
        return Err(AssessmentError::Validation(
            "At least one symptom is required".to_string(),
        ));
    }

    for (idx, symptom) in symptoms.iter().enumerate() {
        if symptom.name.trim().is_empty() {
            return Err(AssessmentError::Validation(format!(
                "Symptom {} name is required",
                idx + 1
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Severity;
    use serde_json::json;

    fn symptom(name: &str) -> Symptom {
        Symptom {
            name: name.to_string(),
            severity: Severity::Moderate,
            duration_days: 1,
            details: String::new(),
        }
    }

    #[test]
    fn accepts_flat_patient() {
        let patient = json!({"name": "Jane Roe", "age": 42, "gender": "F"});
        assert!(validate_patient(&patient).is_ok());
    }

    #[test]
    fn accepts_nested_patient() {
        let patient = json!({"patient": {"name": "Jane Roe", "age": "42", "gender": "Female"}});
        assert!(validate_patient(&patient).is_ok());
    }

    #[test]
    fn rejects_missing_name() {
        let patient = json!({"age": 42, "gender": "F"});
        assert!(matches!(
            validate_patient(&patient),
            Err(AssessmentError::Validation(msg)) if msg.contains("name")
        ));
    }

    #[test]
    fn rejects_out_of_range_age() {
        let patient = json!({"name": "Jane", "age": 200, "gender": "F"});
        assert!(validate_patient(&patient).is_err());

        let patient = json!({"name": "Jane", "age": "not a number", "gender": "F"});
        assert!(validate_patient(&patient).is_err());
    }

    #[test]
    fn rejects_unknown_gender() {
        let patient = json!({"name": "Jane", "age": 42, "gender": "X"});
        assert!(validate_patient(&patient).is_err());
    }

    #[test]
    fn rejects_non_object_patient() {
        assert!(validate_patient(&json!("just a string")).is_err());
    }

    #[test]
    fn rejects_empty_symptom_list() {
        assert!(validate_symptoms(&[]).is_err());
    }

    #[test]
    fn rejects_unnamed_symptom() {
        let symptoms = vec![symptom("fever"), symptom("  ")];
        assert!(matches!(
            validate_symptoms(&symptoms),
            Err(AssessmentError::Validation(msg)) if msg.contains("Symptom 2")
        ));
    }

    #[test]
    fn accepts_named_symptoms() {
        assert!(validate_symptoms(&[symptom("fever"), symptom("cough")]).is_ok());
    }
}
