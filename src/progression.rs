//! Progression Rule Engine: classifies each student's school year as
//! Transita, Matrícula Condicional or Não Transita.
//!
//! The decision procedure is a fixed seven-step state machine; every step is
//! terminal. All thresholds come from the `ClassPolicy` supplied per call;
//! nothing jurisdiction-specific is hardcoded here. Marks are rounded exactly
//! once, on entry, and every comparison below reads the rounded value.

use chrono::Utc;
use uuid::Uuid;

use crate::error::{GradeError, ProgressionError};
use crate::model::{
    AttendanceRecord, DecisionReason, DecisionState, DisciplineMark, ExamKind,
    ProgressionDecision,
};
use crate::policy::{ClassPolicy, PolicySet};
use crate::rounding::{round_half_up, rounding_shifted};

/// Attendance precondition, inclusive at the boundary: exactly the threshold
/// passes. Failure overrides every grade outcome.
pub fn attendance_gate(percentage: f64, threshold: f64) -> bool {
    percentage >= threshold
}

/// Per-discipline calculation outcome as handed to `evaluate_student`. The
/// annual mark is a `Result` so resolution failures travel with the data
/// instead of aborting the batch.
#[derive(Debug, Clone)]
pub struct DisciplineOutcome {
    pub discipline_id: String,
    pub name: String,
    pub annual_mark: Result<f64, GradeError>,
}

/// A supplementary exam result arriving for a conditionally enrolled
/// student.
#[derive(Debug, Clone)]
pub struct ExamResult {
    pub discipline_id: String,
    pub mark: f64,
}

struct RoundedMark<'a> {
    mark: &'a DisciplineMark,
    rounded: i64,
}

/// Runs the state machine for one student. Total for valid, complete input:
/// always returns exactly one terminal decision.
pub fn decide(
    student_id: &str,
    school_year: &str,
    marks: &[DisciplineMark],
    attendance_percent: f64,
    policy: &ClassPolicy,
    policy_version: &str,
) -> ProgressionDecision {
    run_state_machine(
        student_id,
        school_year,
        marks,
        attendance_percent,
        policy,
        policy_version,
        policy.allows_conditional,
        None,
    )
}

/// Student-level orchestration over per-discipline calculation outcomes.
/// Refuses to decide on partial data: if any discipline failed to resolve
/// the student gets `IncompleteGradeData`, never a guessed pass or fail.
pub fn evaluate_student(
    student_id: &str,
    class_label: &str,
    attendance: &AttendanceRecord,
    outcomes: &[DisciplineOutcome],
    policy_set: &PolicySet,
) -> Result<ProgressionDecision, ProgressionError> {
    let policy = policy_set
        .class_policy(class_label)
        .ok_or_else(|| ProgressionError::UnknownClass {
            class_label: class_label.to_string(),
        })?;

    let unresolved: Vec<String> = outcomes
        .iter()
        .filter(|o| o.annual_mark.is_err())
        .map(|o| o.discipline_id.clone())
        .collect();
    if !unresolved.is_empty() {
        return Err(ProgressionError::IncompleteGradeData {
            discipline_ids: unresolved,
        });
    }

    let marks: Vec<DisciplineMark> = outcomes
        .iter()
        .map(|o| DisciplineMark {
            discipline_id: o.discipline_id.clone(),
            name: o.name.clone(),
            mark: *o.annual_mark.as_ref().expect("checked above"),
        })
        .collect();

    Ok(decide(
        student_id,
        &attendance.school_year,
        &marks,
        attendance.percentage,
        policy,
        &policy_set.version,
    ))
}

/// Re-runs the decision after a supplementary exam result, substituting the
/// exam mark for the affected discipline. Only a `MatrículaCondicional`
/// decision can be resolved this way; any other state is rejected. The
/// re-run never yields a second `MatrículaCondicional`: the conditional
/// window is spent, so any remaining failure is terminal retention. The new
/// decision supersedes (not mutates) the previous one.
pub fn apply_exam_result(
    previous: &ProgressionDecision,
    marks: &[DisciplineMark],
    exam: &ExamResult,
    policy_set: &PolicySet,
) -> Result<ProgressionDecision, ProgressionError> {
    if previous.state != DecisionState::MatriculaCondicional {
        return Err(ProgressionError::NotConditionallyEnrolled {
            decision_id: previous.id.clone(),
        });
    }
    let policy = policy_set
        .class_policy(&previous.class_label)
        .ok_or_else(|| ProgressionError::UnknownClass {
            class_label: previous.class_label.clone(),
        })?;

    let substituted: Vec<DisciplineMark> = marks
        .iter()
        .map(|m| {
            if m.discipline_id == exam.discipline_id {
                DisciplineMark {
                    discipline_id: m.discipline_id.clone(),
                    name: m.name.clone(),
                    mark: exam.mark,
                }
            } else {
                m.clone()
            }
        })
        .collect();

    Ok(run_state_machine(
        &previous.student_id,
        &previous.school_year,
        &substituted,
        previous.attendance_percent,
        policy,
        &policy_set.version,
        false,
        Some(previous.id.clone()),
    ))
}

#[allow(clippy::too_many_arguments)]
fn run_state_machine(
    student_id: &str,
    school_year: &str,
    marks: &[DisciplineMark],
    attendance_percent: f64,
    policy: &ClassPolicy,
    policy_version: &str,
    allow_conditional: bool,
    supersedes: Option<String>,
) -> ProgressionDecision {
    let base = |state: DecisionState,
                reason: DecisionReason,
                at_risk: Vec<String>,
                observation: String,
                rounding_applied: bool,
                required_exam: Option<ExamKind>,
                year_completion_blocked: bool| ProgressionDecision {
        id: Uuid::new_v4().to_string(),
        student_id: student_id.to_string(),
        school_year: school_year.to_string(),
        class_label: policy.class_label.clone(),
        state,
        reason,
        at_risk_discipline_ids: at_risk,
        observation,
        rounding_applied,
        attendance_percent,
        required_exam,
        year_completion_blocked,
        policy_version: policy_version.to_string(),
        decided_at: Utc::now(),
        supersedes: supersedes.clone(),
    };

    // 1. AttendanceCheck: failure short-circuits; no grade-based reason is
    // computed or reported.
    if !attendance_gate(attendance_percent, policy.attendance_threshold) {
        return base(
            DecisionState::NaoTransita,
            DecisionReason::InsufficientAttendance,
            Vec::new(),
            note_attendance(attendance_percent, policy.attendance_threshold),
            false,
            None,
            false,
        );
    }

    let rounded: Vec<RoundedMark<'_>> = marks
        .iter()
        .map(|m| RoundedMark {
            mark: m,
            rounded: round_half_up(m.mark),
        })
        .collect();
    let rounding_applied = rounded.iter().any(|r| {
        rounding_shifted(r.mark.mark, policy.pass_threshold)
            || rounding_shifted(r.mark.mark, policy.conditional_floor)
    });

    let failing: Vec<&RoundedMark<'_>> = rounded
        .iter()
        .filter(|r| r.rounded < policy.pass_threshold)
        .collect();

    // 2. FullPass.
    if failing.is_empty() {
        let exam = if policy.terminal {
            Some(ExamKind::National)
        } else {
            None
        };
        return base(
            DecisionState::Transita,
            DecisionReason::FullPass,
            Vec::new(),
            note_full_pass(policy.pass_threshold, attendance_percent),
            rounding_applied,
            exam,
            false,
        );
    }

    // 3. HardFail: classes without a conditional tier (terminal classes, or
    // policy says so, or a spent supplementary-exam window).
    if !allow_conditional {
        return base(
            DecisionState::NaoTransita,
            DecisionReason::BelowThresholdTerminalClass,
            ids(&failing),
            note_below_threshold(policy.pass_threshold, &names(&failing)),
            rounding_applied,
            None,
            false,
        );
    }

    // 4. SeverityFloor: any mark under the conditional-eligibility floor.
    let below_floor: Vec<&RoundedMark<'_>> = rounded
        .iter()
        .filter(|r| r.rounded < policy.conditional_floor)
        .collect();
    if !below_floor.is_empty() {
        return base(
            DecisionState::NaoTransita,
            DecisionReason::BelowConditionalFloor,
            ids(&below_floor),
            note_below_floor(policy.conditional_floor, &names(&below_floor)),
            rounding_applied,
            None,
            false,
        );
    }

    // 5. ConditionalEligibility: marks inside the conditional band
    // (floor inclusive, pass threshold exclusive).
    let conditional: Vec<&RoundedMark<'_>> = rounded
        .iter()
        .filter(|r| r.rounded >= policy.conditional_floor && r.rounded < policy.pass_threshold)
        .collect();
    if conditional.len() > policy.max_conditional_subjects {
        return base(
            DecisionState::NaoTransita,
            DecisionReason::TooManyConditionalSubjects,
            ids(&conditional),
            note_too_many(
                conditional.len(),
                policy.max_conditional_subjects,
                &names(&conditional),
            ),
            rounding_applied,
            None,
            false,
        );
    }

    // 6. MandatorySubjectRule: two or more core subjects in the band.
    let mandatory: Vec<&&RoundedMark<'_>> = conditional
        .iter()
        .filter(|r| {
            policy
                .mandatory_discipline_ids
                .iter()
                .any(|id| *id == r.mark.discipline_id)
        })
        .collect();
    if mandatory.len() >= 2 {
        let named: Vec<String> = mandatory.iter().map(|r| r.mark.name.clone()).collect();
        return base(
            DecisionState::NaoTransita,
            DecisionReason::MandatorySubjectsBelowThreshold,
            mandatory.iter().map(|r| r.mark.discipline_id.clone()).collect(),
            note_mandatory(policy.pass_threshold, &named.join(", ")),
            rounding_applied,
            None,
            false,
        );
    }

    // 7. Conditional transition: supplementary exam required, year
    // completion blocked until its result is recorded.
    base(
        DecisionState::MatriculaCondicional,
        DecisionReason::ConditionalTransition,
        ids(&conditional),
        note_conditional(
            policy.conditional_floor,
            policy.pass_threshold,
            &names(&conditional),
        ),
        rounding_applied,
        Some(ExamKind::Supplementary),
        true,
    )
}

fn ids(marks: &[&RoundedMark<'_>]) -> Vec<String> {
    marks.iter().map(|r| r.mark.discipline_id.clone()).collect()
}

fn names(marks: &[&RoundedMark<'_>]) -> String {
    marks
        .iter()
        .map(|r| r.mark.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

// Standardized note templates, one per terminal state. Never free text:
// exported documents must read identically for identical situations.

fn note_full_pass(pass_threshold: i64, attendance: f64) -> String {
    format!(
        "Transita. Média igual ou superior a {} em todas as disciplinas. Frequência anual: {:.2}%.",
        pass_threshold, attendance
    )
}

fn note_attendance(attendance: f64, threshold: f64) -> String {
    format!(
        "Não transita por frequência insuficiente: {:.2}% (mínimo exigido: {:.2}%).",
        attendance, threshold
    )
}

fn note_below_threshold(pass_threshold: i64, names: &str) -> String {
    format!(
        "Não transita. Média inferior a {} em: {}.",
        pass_threshold, names
    )
}

fn note_below_floor(floor: i64, names: &str) -> String {
    format!(
        "Não transita. Média inferior ao limite condicional de {} em: {}.",
        floor, names
    )
}

fn note_too_many(count: usize, max: usize, names: &str) -> String {
    format!(
        "Não transita. {} disciplinas em situação condicional (máximo permitido: {}): {}.",
        count, max, names
    )
}

fn note_mandatory(pass_threshold: i64, names: &str) -> String {
    format!(
        "Não transita. Disciplinas obrigatórias com média inferior a {}: {}.",
        pass_threshold, names
    )
}

fn note_conditional(floor: i64, pass_threshold: i64, names: &str) -> String {
    format!(
        "Matrícula condicional (média entre {} e {}) em: {}. Sujeito a exame de recurso; conclusão do ano pendente até registo do resultado.",
        floor,
        pass_threshold - 1,
        names
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicySet;

    fn marks(values: &[(&str, f64)]) -> Vec<DisciplineMark> {
        values
            .iter()
            .map(|(id, mark)| DisciplineMark {
                discipline_id: id.to_string(),
                name: id.to_string(),
                mark: *mark,
            })
            .collect()
    }

    fn seventh_grade() -> (PolicySet, ClassPolicy) {
        let set = PolicySet::official_default();
        let policy = set.class_policy("7").expect("class 7").clone();
        (set, policy)
    }

    #[test]
    fn attendance_boundary_is_inclusive() {
        assert!(attendance_gate(66.67, 66.67));
        assert!(!attendance_gate(66.66, 66.67));
    }

    #[test]
    fn attendance_failure_short_circuits_grades() {
        let (set, policy) = seventh_grade();
        // Straight passes everywhere; attendance still decides.
        let d = decide(
            "s1",
            "2025/2026",
            &marks(&[("mat", 18.0), ("port", 17.0)]),
            50.0,
            &policy,
            &set.version,
        );
        assert_eq!(d.state, DecisionState::NaoTransita);
        assert_eq!(d.reason, DecisionReason::InsufficientAttendance);
        assert!(d.at_risk_discipline_ids.is_empty());
        assert!(d.observation.contains("50.00%"));
    }

    #[test]
    fn severity_floor_blocks_conditional() {
        let (set, policy) = seventh_grade();
        let d = decide(
            "s1",
            "2025/2026",
            &marks(&[("mat", 6.0), ("port", 15.0), ("hist", 15.0)]),
            90.0,
            &policy,
            &set.version,
        );
        assert_eq!(d.state, DecisionState::NaoTransita);
        assert_eq!(d.reason, DecisionReason::BelowConditionalFloor);
        assert_eq!(d.at_risk_discipline_ids, vec!["mat"]);
    }

    #[test]
    fn too_many_conditional_subjects_retains() {
        let (set, policy) = seventh_grade();
        let d = decide(
            "s1",
            "2025/2026",
            &marks(&[("a", 8.0), ("b", 8.0), ("c", 9.0), ("d", 15.0)]),
            90.0,
            &policy,
            &set.version,
        );
        assert_eq!(d.state, DecisionState::NaoTransita);
        assert_eq!(d.reason, DecisionReason::TooManyConditionalSubjects);
        assert_eq!(d.at_risk_discipline_ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn band_boundaries_are_floor_inclusive_pass_exclusive() {
        let (set, policy) = seventh_grade();
        // 7 is in the band; 10 passes outright.
        let d = decide(
            "s1",
            "2025/2026",
            &marks(&[("a", 7.0), ("b", 10.0)]),
            90.0,
            &policy,
            &set.version,
        );
        assert_eq!(d.state, DecisionState::MatriculaCondicional);
        assert_eq!(d.at_risk_discipline_ids, vec!["a"]);
        assert_eq!(d.required_exam, Some(ExamKind::Supplementary));
        assert!(d.year_completion_blocked);
    }

    #[test]
    fn rounding_happens_once_before_comparison() {
        let (set, policy) = seventh_grade();
        // 9.5 rounds to 10 and passes; 9.49 rounds to 9 and is conditional.
        let d = decide(
            "s1",
            "2025/2026",
            &marks(&[("a", 9.5), ("b", 14.0)]),
            90.0,
            &policy,
            &set.version,
        );
        assert_eq!(d.state, DecisionState::Transita);
        assert!(d.rounding_applied);

        let d = decide(
            "s1",
            "2025/2026",
            &marks(&[("a", 9.49), ("b", 14.0)]),
            90.0,
            &policy,
            &set.version,
        );
        assert_eq!(d.state, DecisionState::MatriculaCondicional);
        assert!(!d.rounding_applied);
    }

    #[test]
    fn incomplete_grade_data_refuses_to_decide() {
        let set = PolicySet::official_default();
        let attendance = AttendanceRecord {
            student_id: "s1".to_string(),
            school_year: "2025/2026".to_string(),
            percentage: 90.0,
        };
        let outcomes = vec![
            DisciplineOutcome {
                discipline_id: "mat".to_string(),
                name: "Matemática".to_string(),
                annual_mark: Ok(14.0),
            },
            DisciplineOutcome {
                discipline_id: "fis".to_string(),
                name: "Física".to_string(),
                annual_mark: Err(GradeError::MissingTermMark { term: 2 }),
            },
        ];
        let err = evaluate_student("s1", "7", &attendance, &outcomes, &set).expect_err("partial");
        assert_eq!(
            err,
            ProgressionError::IncompleteGradeData {
                discipline_ids: vec!["fis".to_string()]
            }
        );
    }

    #[test]
    fn unknown_class_is_reported() {
        let set = PolicySet::official_default();
        let attendance = AttendanceRecord {
            student_id: "s1".to_string(),
            school_year: "2025/2026".to_string(),
            percentage: 90.0,
        };
        let err = evaluate_student("s1", "13", &attendance, &[], &set).expect_err("no class 13");
        assert_eq!(err.code(), "unknown_class");
    }

    #[test]
    fn exam_result_requires_conditional_enrollment() {
        let (set, policy) = seventh_grade();
        let promoted = decide(
            "s1",
            "2025/2026",
            &marks(&[("mat", 14.0), ("port", 13.0)]),
            90.0,
            &policy,
            &set.version,
        );
        assert_eq!(promoted.state, DecisionState::Transita);

        let err = apply_exam_result(
            &promoted,
            &marks(&[("mat", 14.0), ("port", 13.0)]),
            &ExamResult {
                discipline_id: "mat".to_string(),
                mark: 8.0,
            },
            &set,
        )
        .expect_err("nothing to resolve");
        assert_eq!(
            err,
            ProgressionError::NotConditionallyEnrolled {
                decision_id: promoted.id.clone()
            }
        );
    }

    #[test]
    fn terminal_full_pass_requires_national_exam() {
        let set = PolicySet::official_default();
        let policy = set.class_policy("9").expect("class 9").clone();
        let d = decide(
            "s1",
            "2025/2026",
            &marks(&[("a", 12.0), ("b", 16.0)]),
            90.0,
            &policy,
            &set.version,
        );
        assert_eq!(d.state, DecisionState::Transita);
        assert_eq!(d.required_exam, Some(ExamKind::National));
    }
}
