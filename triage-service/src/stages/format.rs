//! Display formatting for assessment output, used by the report endpoint.

use assessment_flow::{AssessmentRecord, Diagnosis, RunStatus, Treatment};

pub fn format_confidence(confidence: f64) -> String {
    format!("{:.1}%", confidence * 100.0)
}

pub fn format_diagnosis(diagnosis: &Diagnosis) -> String {
    format!(
        "{} (Confidence: {})",
        diagnosis.disease,
        format_confidence(diagnosis.confidence_score)
    )
}

pub fn format_treatment(treatment: &Treatment) -> String {
    let tag = format!("{:?}", treatment.kind).to_uppercase();
    let mut formatted = format!("[{tag}] {}", treatment.recommendation);
    if !treatment.justification.is_empty() {
        formatted.push_str(&format!(" ({})", treatment.justification));
    }
    formatted
}

/// Render a plain-text report for one assessment record.
pub fn render_report(record: &AssessmentRecord) -> String {
    let mut lines = vec![format!("Assessment {}", record.id)];

    match record.status {
        RunStatus::Error => {
            lines.push(format!(
                "Status: error ({})",
                record.error.as_deref().unwrap_or("unknown failure")
            ));
            return lines.join("\n");
        }
        status => lines.push(format!("Status: {status:?}")),
    }

    if let Some(summary) = &record.final_summary {
        if let Some(name) = &summary.patient_name {
            lines.push(format!("Patient: {name}"));
        }
        lines.push(format!("Symptoms: {}", summary.symptoms_analyzed.join(", ")));

        lines.push("Probable diagnoses:".to_string());
        for diagnosis in &summary.probable_diagnoses {
            lines.push(format!("  - {}", format_diagnosis(diagnosis)));
        }

        lines.push("Treatments:".to_string());
        for treatment in &summary.treatments {
            lines.push(format!("  - {}", format_treatment(treatment)));
        }

        if !summary.diagnostic_tests.is_empty() {
            lines.push(format!("Diagnostic tests: {}", summary.diagnostic_tests.join("; ")));
        }
        if !summary.next_steps.is_empty() {
            lines.push(format!("Next steps: {}", summary.next_steps.join("; ")));
        }
        for warning in &summary.safety_warnings {
            lines.push(format!("WARNING: {warning}"));
        }
        lines.push(format!(
            "Quality score: {}",
            format_confidence(summary.quality_score)
        ));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use assessment_flow::TreatmentKind;

    #[test]
    fn confidence_formats_as_percentage() {
        assert_eq!(format_confidence(0.834), "83.4%");
        assert_eq!(format_confidence(0.0), "0.0%");
    }

    #[test]
    fn diagnosis_line_includes_confidence() {
        let diagnosis = Diagnosis {
            disease: "Dengue Fever".to_string(),
            confidence_score: 0.83,
            key_indicators: Vec::new(),
            supporting_evidence: Vec::new(),
        };
        assert_eq!(
            format_diagnosis(&diagnosis),
            "Dengue Fever (Confidence: 83.0%)"
        );
    }

    #[test]
    fn treatment_line_uppercases_kind_tag() {
        let treatment = Treatment {
            kind: TreatmentKind::Medication,
            recommendation: "Paracetamol".to_string(),
            justification: "fever control".to_string(),
            confidence: 0.8,
        };
        assert_eq!(
            format_treatment(&treatment),
            "[MEDICATION] Paracetamol (fever control)"
        );
    }
}
