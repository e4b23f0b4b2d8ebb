use serde::Serialize;
use std::fmt;

/// Fatal error for one (student, discipline, term) calculation. Other
/// disciplines and other students are unaffected; batch callers keep going.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum GradeError {
    /// A computed component depends on itself, directly or transitively.
    /// Names one component that is actually on the cycle.
    #[serde(rename_all = "camelCase")]
    CyclicDependency { component_id: String },
    /// A formula referenced a name with no resolved value.
    #[serde(rename_all = "camelCase")]
    UnknownComponent { name: String },
    /// A required, directly-scored component has no entered mark. Never
    /// defaulted to zero; the discipline stays unresolved until data entry
    /// catches up.
    #[serde(rename_all = "camelCase")]
    MissingRequiredMark { component_id: String, name: String },
    /// Annual roll-up asked for a term that has no final mark but carries a
    /// non-zero aggregation weight.
    #[serde(rename_all = "camelCase")]
    MissingTermMark { term: u8 },
    /// A formula divided by a sub-expression that evaluated to zero. The
    /// offending sub-expression is reproduced literally.
    #[serde(rename_all = "camelCase")]
    DivisionByZero { expression: String },
    /// A formula that never passed validation reached the calculator.
    #[serde(rename_all = "camelCase")]
    InvalidFormula { component_id: String, message: String },
}

impl GradeError {
    pub fn code(&self) -> &'static str {
        match self {
            GradeError::CyclicDependency { .. } => "cyclic_dependency",
            GradeError::UnknownComponent { .. } => "unknown_component",
            GradeError::MissingRequiredMark { .. } => "missing_required_mark",
            GradeError::MissingTermMark { .. } => "missing_term_mark",
            GradeError::DivisionByZero { .. } => "division_by_zero",
            GradeError::InvalidFormula { .. } => "invalid_formula",
        }
    }
}

impl fmt::Display for GradeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GradeError::CyclicDependency { component_id } => {
                write!(f, "component {} is part of a dependency cycle", component_id)
            }
            GradeError::UnknownComponent { name } => {
                write!(f, "formula references unknown component '{}'", name)
            }
            GradeError::MissingRequiredMark { component_id, name } => {
                write!(f, "no mark entered for required component '{}' ({})", name, component_id)
            }
            GradeError::MissingTermMark { term } => {
                write!(f, "no final mark for term {} in annual aggregation", term)
            }
            GradeError::DivisionByZero { expression } => {
                write!(f, "division by zero in '{}'", expression)
            }
            GradeError::InvalidFormula { component_id, message } => {
                write!(f, "formula of component {} is invalid: {}", component_id, message)
            }
        }
    }
}

impl std::error::Error for GradeError {}

/// Error for a student-level progression evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ProgressionError {
    /// One or more disciplines failed grade resolution; the rule engine
    /// refuses to decide on partial data.
    #[serde(rename_all = "camelCase")]
    IncompleteGradeData { discipline_ids: Vec<String> },
    /// No policy entry for the student's class label.
    #[serde(rename_all = "camelCase")]
    UnknownClass { class_label: String },
    /// A supplementary exam result was applied to a decision that is not a
    /// conditional enrollment.
    #[serde(rename_all = "camelCase")]
    NotConditionallyEnrolled { decision_id: String },
}

impl ProgressionError {
    pub fn code(&self) -> &'static str {
        match self {
            ProgressionError::IncompleteGradeData { .. } => "incomplete_grade_data",
            ProgressionError::UnknownClass { .. } => "unknown_class",
            ProgressionError::NotConditionallyEnrolled { .. } => "not_conditionally_enrolled",
        }
    }
}

impl fmt::Display for ProgressionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressionError::IncompleteGradeData { discipline_ids } => {
                write!(f, "grading incomplete for disciplines: {}", discipline_ids.join(", "))
            }
            ProgressionError::UnknownClass { class_label } => {
                write!(f, "no policy configured for class '{}'", class_label)
            }
            ProgressionError::NotConditionallyEnrolled { decision_id } => {
                write!(
                    f,
                    "decision {} is not a conditional enrollment; no supplementary exam applies",
                    decision_id
                )
            }
        }
    }
}

impl std::error::Error for ProgressionError {}

/// Non-fatal finding from component-set validation. Surfaced to the
/// administrator editing the discipline setup; calculation proceeds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ValidationWarning {
    /// Final-contributing scored weights do not sum to 100.
    #[serde(rename_all = "camelCase")]
    WeightSumMismatch { total: f64 },
    /// Computed component declared without a formula.
    #[serde(rename_all = "camelCase")]
    MissingFormula { component_id: String },
    /// Formula failed the validation pass; message is editor-facing.
    #[serde(rename_all = "camelCase")]
    InvalidFormula { component_id: String, message: String },
    /// Dependency points at a component of another discipline or term.
    #[serde(rename_all = "camelCase")]
    CrossContextDependency { component_id: String, dependency_id: String },
    /// Dependency id not present in the component set at all.
    #[serde(rename_all = "camelCase")]
    UnknownDependency { component_id: String, dependency_id: String },
    /// A validated formula reads a component its `depends_on` list does not
    /// declare, so evaluation order is not guaranteed to cover it.
    #[serde(rename_all = "camelCase")]
    UndeclaredDependency { component_id: String, reference: String },
    /// Two components share a display name; formulas reference components by
    /// name, so neither can be read deterministically.
    #[serde(rename_all = "camelCase")]
    DuplicateComponentName { name: String, component_ids: Vec<String> },
}

impl ValidationWarning {
    pub fn message(&self) -> String {
        match self {
            ValidationWarning::WeightSumMismatch { total } => {
                format!("final component weights sum to {} instead of 100", total)
            }
            ValidationWarning::MissingFormula { component_id } => {
                format!("computed component {} has no formula", component_id)
            }
            ValidationWarning::InvalidFormula { component_id, message } => {
                format!("formula of component {} is invalid: {}", component_id, message)
            }
            ValidationWarning::CrossContextDependency { component_id, dependency_id } => {
                format!(
                    "component {} depends on {} which belongs to another discipline or term",
                    component_id, dependency_id
                )
            }
            ValidationWarning::UnknownDependency { component_id, dependency_id } => {
                format!("component {} depends on unknown component {}", component_id, dependency_id)
            }
            ValidationWarning::UndeclaredDependency { component_id, reference } => {
                format!(
                    "formula of component {} reads '{}' which is not in its dependency list",
                    component_id, reference
                )
            }
            ValidationWarning::DuplicateComponentName { name, component_ids } => {
                format!(
                    "component name '{}' is shared by {}; formulas cannot reference it deterministically",
                    name,
                    component_ids.join(", ")
                )
            }
        }
    }
}
