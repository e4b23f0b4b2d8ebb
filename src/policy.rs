//! Jurisdiction-defined progression policy. Configuration, not code: every
//! threshold the rule engine compares against lives here, passed explicitly
//! into each call so one engine build can serve multiple jurisdictions or
//! policy vintages. Callers must snapshot a `PolicySet` before a batch run.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EducationLevel {
    Primary,
    SecondaryCycleOne,
    SecondaryCycleTwo,
}

/// Per-class decision parameters. Thresholds are integers because they are
/// only ever compared against rounded marks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassPolicy {
    pub class_label: String,
    pub level: EducationLevel,
    pub scale_max: f64,
    /// Rounded mark at or above this passes the discipline.
    pub pass_threshold: i64,
    /// Inclusive lower bound of the conditional band; a rounded mark below
    /// it forces retention outright.
    pub conditional_floor: i64,
    pub max_conditional_subjects: usize,
    /// Disciplines whose simultaneous sub-threshold failure forces
    /// retention even inside an otherwise-conditional scenario.
    pub mandatory_discipline_ids: Vec<String>,
    /// Terminal classes (national exam) never permit conditional
    /// transition; other classes may also forbid it by policy.
    pub allows_conditional: bool,
    pub terminal: bool,
    /// Minimum annual attendance percentage; inclusive at the boundary.
    pub attendance_threshold: f64,
    /// Term -> annual aggregation weights (terms 1-3), normalized at use.
    pub term_weights: [f64; 3],
}

/// Immutable, versioned policy document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySet {
    pub version: String,
    pub classes: Vec<ClassPolicy>,
}

pub const DEFAULT_ATTENDANCE_THRESHOLD: f64 = 66.67;

impl PolicySet {
    pub fn class_policy(&self, class_label: &str) -> Option<&ClassPolicy> {
        self.classes.iter().find(|c| c.class_label == class_label)
    }

    /// Reference configuration matching the officially documented values.
    /// Used when no jurisdiction override is supplied.
    ///
    /// Primary (classes 1-6): 0-10 scale, pass at 5, no conditional tier.
    /// Secondary (classes 7-12): 0-20 scale, pass at 10, conditional band
    /// 7-9 capped at two subjects. Classes 6, 9 and 12 are terminal.
    pub fn official_default() -> Self {
        let mandatory = vec!["lingua-portuguesa".to_string(), "matematica".to_string()];
        let mut classes = Vec::new();
        for n in 1..=6 {
            classes.push(ClassPolicy {
                class_label: n.to_string(),
                level: EducationLevel::Primary,
                scale_max: 10.0,
                pass_threshold: 5,
                conditional_floor: 5,
                max_conditional_subjects: 0,
                mandatory_discipline_ids: mandatory.clone(),
                allows_conditional: false,
                terminal: n == 6,
                attendance_threshold: DEFAULT_ATTENDANCE_THRESHOLD,
                term_weights: [1.0, 1.0, 1.0],
            });
        }
        for n in 7..=12 {
            let terminal = n == 9 || n == 12;
            classes.push(ClassPolicy {
                class_label: n.to_string(),
                level: if n <= 9 {
                    EducationLevel::SecondaryCycleOne
                } else {
                    EducationLevel::SecondaryCycleTwo
                },
                scale_max: 20.0,
                pass_threshold: 10,
                conditional_floor: 7,
                max_conditional_subjects: 2,
                mandatory_discipline_ids: mandatory.clone(),
                allows_conditional: !terminal,
                terminal,
                attendance_threshold: DEFAULT_ATTENDANCE_THRESHOLD,
                term_weights: [1.0, 1.0, 1.0],
            });
        }
        PolicySet {
            version: "official-default-1".to_string(),
            classes,
        }
    }
}

/// Loads a policy vintage from a JSON document on disk.
pub fn load_policy_set(path: &Path) -> anyhow::Result<PolicySet> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read policy file {}", path.display()))?;
    let set: PolicySet = serde_json::from_str(&text)
        .with_context(|| format!("parse policy file {}", path.display()))?;
    Ok(set)
}
