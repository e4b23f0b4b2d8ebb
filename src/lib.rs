//! Grade Computation & Academic Progression Engine.
//!
//! A pure, stateless computation from (marks, attendance, policy) to final
//! marks and progression decisions plus an audit trail. The engine owns no
//! storage and performs no I/O; callers fetch the inputs, snapshot the
//! policy for the batch, and persist the outputs (each re-evaluation yields
//! a new decision that supersedes, never mutates, the previous one).
//!
//! Pipeline: raw component marks -> [`resolver`] (dependency order) ->
//! [`formula`] (computed components) -> [`calc`] (final mark + trace) ->
//! [`rounding`] -> [`progression`] (decision + standardized note).

pub mod calc;
pub mod error;
pub mod formula;
pub mod model;
pub mod policy;
pub mod progression;
pub mod resolver;
pub mod rounding;

pub use calc::{annual_mark, compute_final_mark};
pub use error::{GradeError, ProgressionError, ValidationWarning};
pub use model::{
    AttendanceRecord, Classification, DecisionReason, DecisionState, DisciplineMark,
    EvaluationComponent, ExamKind, FinalMark, FormulaExpression, ProgressionDecision, RawMark,
    TraceEntry,
};
pub use policy::{ClassPolicy, EducationLevel, PolicySet};
pub use progression::{
    apply_exam_result, attendance_gate, decide, evaluate_student, DisciplineOutcome, ExamResult,
};
pub use resolver::{evaluation_order, validate_components};
pub use rounding::round_half_up;
