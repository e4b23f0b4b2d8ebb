use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One gradeable unit within a discipline: either directly scored by a
/// teacher or computed from other components via an admin-authored formula.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationComponent {
    pub id: String,
    pub discipline_id: String,
    /// Display name; also the identifier formulas use to reference it.
    pub name: String,
    /// Weight as a percentage (0-100) toward the discipline final.
    pub weight: f64,
    pub scale_min: f64,
    pub scale_max: f64,
    pub is_computed: bool,
    pub formula: Option<String>,
    /// Ids of components this one reads, same discipline and term only.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// A required component with no mark blocks the discipline final.
    pub required: bool,
    /// Whether this component enters the discipline-final weighted mean.
    pub contributes_to_final: bool,
    /// Term context (1-3); `None` for annual components.
    pub term: Option<u8>,
    pub sort_order: i64,
}

/// An admin-authored formula after the validation pass. Invalidated (and
/// re-validated) whenever the components it references change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaExpression {
    pub expression: String,
    /// Component names the expression reads, in first-appearance order.
    pub references: Vec<String>,
    pub valid: bool,
    /// Editor-facing explanation when `valid` is false.
    pub message: Option<String>,
}

/// A single entered score. A later entry for the same (student, component,
/// term) supersedes rather than mutates; the calculator keeps the latest by
/// `entered_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMark {
    pub student_id: String,
    pub component_id: String,
    pub term: u8,
    pub value: f64,
    pub note: Option<String>,
    pub entered_at: DateTime<Utc>,
}

/// One line of the audit trace: how a component contributed to the final.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEntry {
    pub component_id: String,
    pub name: String,
    /// Effective value: the raw mark, or the formula result for computed
    /// components.
    pub value: f64,
    pub weight: f64,
    /// weight-percent x value, i.e. `weight * value / 100`.
    pub contribution: f64,
    /// Literal formula text for computed components.
    pub formula: Option<String>,
}

/// Qualitative band on the report card, derived from the mark as a fraction
/// of the component scale. Decisions never read this; they compare rounded
/// marks against policy thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    Excelente,
    MuitoBom,
    Bom,
    Suficiente,
    Insuficiente,
}

impl Classification {
    pub fn from_fraction(fraction: f64) -> Self {
        if fraction >= 0.85 {
            Classification::Excelente
        } else if fraction >= 0.70 {
            Classification::MuitoBom
        } else if fraction >= 0.60 {
            Classification::Bom
        } else if fraction >= 0.50 {
            Classification::Suficiente
        } else {
            Classification::Insuficiente
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Classification::Excelente => "Excelente",
            Classification::MuitoBom => "Muito Bom",
            Classification::Bom => "Bom",
            Classification::Suficiente => "Suficiente",
            Classification::Insuficiente => "Insuficiente",
        }
    }
}

/// Discipline-level, term-level outcome for one student. Produced only by
/// the Grade Calculator; never hand-edited.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalMark {
    pub student_id: String,
    pub discipline_id: String,
    /// `None` for the annual roll-up.
    pub term: Option<u8>,
    /// Unrounded value, kept for display and audit.
    pub mark: f64,
    pub classification: Classification,
    /// Sum of the weights that actually entered the mean, for audit of
    /// weight-sum anomalies.
    pub weight_total: f64,
    pub trace: Vec<TraceEntry>,
    pub computed_at: DateTime<Utc>,
}

/// Annual attendance percentage; one value per (student, school year).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub student_id: String,
    pub school_year: String,
    pub percentage: f64,
}

/// Per-discipline annual mark as the progression engine consumes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisciplineMark {
    pub discipline_id: String,
    pub name: String,
    /// Unrounded annual mark; the engine rounds exactly once before
    /// comparing against thresholds.
    pub mark: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DecisionState {
    Transita,
    MatriculaCondicional,
    NaoTransita,
}

impl DecisionState {
    pub fn label(&self) -> &'static str {
        match self {
            DecisionState::Transita => "Transita",
            DecisionState::MatriculaCondicional => "Matrícula Condicional",
            DecisionState::NaoTransita => "Não Transita",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DecisionReason {
    FullPass,
    InsufficientAttendance,
    BelowThresholdTerminalClass,
    BelowConditionalFloor,
    TooManyConditionalSubjects,
    MandatorySubjectsBelowThreshold,
    ConditionalTransition,
}

/// Exam the decision obliges the student to sit, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExamKind {
    /// National exam required by a terminal class.
    National,
    /// Supplementary exam resolving a conditional enrollment.
    Supplementary,
}

/// The engine's output per student per school year. Superseded, never
/// mutated, by later runs (e.g. after a supplementary exam result).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressionDecision {
    pub id: String,
    pub student_id: String,
    pub school_year: String,
    pub class_label: String,
    pub state: DecisionState,
    pub reason: DecisionReason,
    /// Disciplines that triggered or qualify the decision, in input order.
    pub at_risk_discipline_ids: Vec<String>,
    /// Standardized note; templated per terminal state, never free text.
    pub observation: String,
    /// True when rounding moved at least one mark across a threshold the
    /// decision reads.
    pub rounding_applied: bool,
    pub attendance_percent: f64,
    pub required_exam: Option<ExamKind>,
    /// Until a supplementary exam result is recorded the year stays open.
    pub year_completion_blocked: bool,
    pub policy_version: String,
    pub decided_at: DateTime<Utc>,
    /// Id of the decision this run replaces, for persisted history.
    pub supersedes: Option<String>,
}
