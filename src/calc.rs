//! Grade Calculator: turns raw component marks into one `FinalMark` per
//! (student, discipline, term), with the calculation trace the audit trail
//! requires.

use chrono::Utc;
use std::collections::HashMap;

use crate::error::GradeError;
use crate::formula;
use crate::model::{Classification, EvaluationComponent, FinalMark, RawMark, TraceEntry};
use crate::resolver;

/// Latest entered mark per component for this student. Later entries for the
/// same (student, component, term) supersede earlier ones; nothing mutates.
fn latest_marks<'a>(
    student_id: &str,
    components: &[EvaluationComponent],
    marks: &'a [RawMark],
) -> HashMap<String, &'a RawMark> {
    let term_of: HashMap<&str, Option<u8>> = components
        .iter()
        .map(|c| (c.id.as_str(), c.term))
        .collect();

    let mut latest: HashMap<String, &RawMark> = HashMap::new();
    for mark in marks {
        if mark.student_id != student_id {
            continue;
        }
        let Some(term) = term_of.get(mark.component_id.as_str()).copied() else {
            continue;
        };
        // Annual components accept marks from any term.
        if term.map(|t| t == mark.term).unwrap_or(true) {
            match latest.get(&mark.component_id) {
                Some(existing) if existing.entered_at >= mark.entered_at => {}
                _ => {
                    latest.insert(mark.component_id.clone(), mark);
                }
            }
        }
    }
    latest
}

/// Computes the final mark for one (student, discipline, term).
///
/// Computed components are evaluated in dependency order with already
/// resolved values in scope; the final mark is the weight-normalized mean of
/// the final-contributing components, `sum(w*v) / sum(w)` (weights need not
/// sum to 100; that mismatch is a validation warning, not an error here).
/// A required component without a mark is fatal for this discipline only;
/// it is reported, never defaulted to zero.
pub fn compute_final_mark(
    student_id: &str,
    discipline_id: &str,
    term: Option<u8>,
    components: &[EvaluationComponent],
    marks: &[RawMark],
) -> Result<FinalMark, GradeError> {
    let order = resolver::evaluation_order(components)?;
    let by_id: HashMap<&str, &EvaluationComponent> =
        components.iter().map(|c| (c.id.as_str(), c)).collect();
    let entered = latest_marks(student_id, components, marks);

    // Effective value per component name; formulas reference names.
    let mut values: HashMap<String, f64> = HashMap::new();
    let mut value_by_id: HashMap<String, f64> = HashMap::new();

    for id in &order {
        let c = by_id[id.as_str()];
        if c.is_computed {
            let text = c.formula.as_deref().ok_or_else(|| GradeError::InvalidFormula {
                component_id: c.id.clone(),
                message: "computed component has no formula".to_string(),
            })?;
            let result = formula::evaluate(&c.id, text, &values)?;
            values.insert(c.name.clone(), result);
            value_by_id.insert(c.id.clone(), result);
        } else {
            match entered.get(id.as_str()) {
                Some(mark) => {
                    values.insert(c.name.clone(), mark.value);
                    value_by_id.insert(c.id.clone(), mark.value);
                }
                None if c.required => {
                    return Err(GradeError::MissingRequiredMark {
                        component_id: c.id.clone(),
                        name: c.name.clone(),
                    });
                }
                // Optional and unmarked: excluded from the mean entirely,
                // its weight does not count in the denominator.
                None => {}
            }
        }
    }

    let mut contributing: Vec<&EvaluationComponent> = components
        .iter()
        .filter(|c| c.contributes_to_final && value_by_id.contains_key(c.id.as_str()))
        .collect();
    contributing.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.id.cmp(&b.id)));

    let mut trace: Vec<TraceEntry> = Vec::with_capacity(contributing.len());
    let mut weighted_sum = 0.0_f64;
    let mut weight_total = 0.0_f64;
    for c in &contributing {
        let value = value_by_id[c.id.as_str()];
        weighted_sum += value * c.weight;
        weight_total += c.weight;
        trace.push(TraceEntry {
            component_id: c.id.clone(),
            name: c.name.clone(),
            value,
            weight: c.weight,
            contribution: value * c.weight / 100.0,
            formula: c.formula.clone(),
        });
    }

    if weight_total <= 0.0 {
        // Every final-contributing component is optional and unmarked (or
        // carries zero weight): there is no deterministic mark to produce.
        let first = components
            .iter()
            .filter(|c| c.contributes_to_final)
            .min_by_key(|c| c.sort_order)
            .ok_or_else(|| GradeError::MissingRequiredMark {
                component_id: discipline_id.to_string(),
                name: "no final-contributing components".to_string(),
            })?;
        return Err(GradeError::MissingRequiredMark {
            component_id: first.id.clone(),
            name: first.name.clone(),
        });
    }

    let mark = weighted_sum / weight_total;
    let scale_max = contributing
        .iter()
        .map(|c| c.scale_max)
        .fold(0.0_f64, f64::max);
    let classification = Classification::from_fraction(if scale_max > 0.0 {
        mark / scale_max
    } else {
        0.0
    });

    Ok(FinalMark {
        student_id: student_id.to_string(),
        discipline_id: discipline_id.to_string(),
        term,
        mark,
        classification,
        weight_total,
        trace,
        computed_at: Utc::now(),
    })
}

/// Rolls per-term finals up into the annual figure under the policy's term
/// weights. A missing term with non-zero weight is fatal; an all-zero weight
/// set degenerates to equal thirds.
pub fn annual_mark(term_marks: &[(u8, f64)], term_weights: &[f64; 3]) -> Result<f64, GradeError> {
    let weights = if !term_weights.iter().any(|w| *w > 0.0) {
        [1.0, 1.0, 1.0]
    } else {
        *term_weights
    };

    let mut weighted_sum = 0.0_f64;
    let mut weight_total = 0.0_f64;
    for term in 1u8..=3 {
        let w = weights[(term - 1) as usize];
        if w <= 0.0 {
            continue;
        }
        let mark = term_marks
            .iter()
            .find(|(t, _)| *t == term)
            .map(|(_, m)| *m)
            .ok_or(GradeError::MissingTermMark { term })?;
        weighted_sum += mark * w;
        weight_total += w;
    }
    Ok(weighted_sum / weight_total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn scored(id: &str, name: &str, weight: f64, sort_order: i64) -> EvaluationComponent {
        EvaluationComponent {
            id: id.to_string(),
            discipline_id: "mat".to_string(),
            name: name.to_string(),
            weight,
            scale_min: 0.0,
            scale_max: 20.0,
            is_computed: false,
            formula: None,
            depends_on: Vec::new(),
            required: true,
            contributes_to_final: true,
            term: Some(1),
            sort_order,
        }
    }

    fn mark(component_id: &str, value: f64, minutes_ago: i64) -> RawMark {
        RawMark {
            student_id: "s1".to_string(),
            component_id: component_id.to_string(),
            term: 1,
            value,
            note: None,
            entered_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[test]
    fn weighted_mean_over_contributing_components() {
        let components = vec![scored("p1", "p1", 40.0, 1), scored("p2", "p2", 60.0, 2)];
        let marks = vec![mark("p1", 10.0, 0), mark("p2", 15.0, 0)];
        let fm = compute_final_mark("s1", "mat", Some(1), &components, &marks).expect("final");
        assert!((fm.mark - 13.0).abs() < 1e-9);
        assert_eq!(fm.weight_total, 100.0);
        assert_eq!(fm.trace.len(), 2);
        assert!((fm.trace[0].contribution - 4.0).abs() < 1e-9);
    }

    #[test]
    fn later_entry_supersedes_earlier() {
        let components = vec![scored("p1", "p1", 100.0, 1)];
        let marks = vec![mark("p1", 8.0, 60), mark("p1", 12.0, 5)];
        let fm = compute_final_mark("s1", "mat", Some(1), &components, &marks).expect("final");
        assert_eq!(fm.mark, 12.0);
    }

    #[test]
    fn computed_chain_uses_dependency_order() {
        let mut media = scored("media", "media", 100.0, 3);
        media.is_computed = true;
        media.formula = Some("(p1 + p2) / 2".to_string());
        media.depends_on = vec!["p1".to_string(), "p2".to_string()];
        let mut p1 = scored("p1", "p1", 0.0, 1);
        p1.contributes_to_final = false;
        let mut p2 = scored("p2", "p2", 0.0, 2);
        p2.contributes_to_final = false;

        let components = vec![media, p1, p2];
        let marks = vec![mark("p1", 12.0, 0), mark("p2", 16.0, 0)];
        let fm = compute_final_mark("s1", "mat", Some(1), &components, &marks).expect("final");
        assert_eq!(fm.mark, 14.0);
        assert_eq!(fm.trace.len(), 1);
        assert_eq!(fm.trace[0].formula.as_deref(), Some("(p1 + p2) / 2"));
    }

    #[test]
    fn missing_required_mark_is_fatal_and_named() {
        let components = vec![scored("p1", "Prova 1", 100.0, 1)];
        let err = compute_final_mark("s1", "mat", Some(1), &components, &[]).expect_err("missing");
        assert_eq!(
            err,
            GradeError::MissingRequiredMark {
                component_id: "p1".to_string(),
                name: "Prova 1".to_string(),
            }
        );
    }

    #[test]
    fn optional_unmarked_component_drops_from_denominator() {
        let mut optional = scored("tpc", "tpc", 20.0, 2);
        optional.required = false;
        let components = vec![scored("p1", "p1", 80.0, 1), optional];
        let marks = vec![mark("p1", 15.0, 0)];
        let fm = compute_final_mark("s1", "mat", Some(1), &components, &marks).expect("final");
        assert_eq!(fm.mark, 15.0);
        assert_eq!(fm.weight_total, 80.0);
    }

    #[test]
    fn annual_roll_up_respects_term_weights() {
        let marks = vec![(1u8, 10.0), (2u8, 12.0), (3u8, 14.0)];
        assert!((annual_mark(&marks, &[1.0, 1.0, 1.0]).expect("annual") - 12.0).abs() < 1e-9);
        assert!((annual_mark(&marks, &[0.0, 0.0, 1.0]).expect("annual") - 14.0).abs() < 1e-9);

        let missing = vec![(1u8, 10.0), (3u8, 14.0)];
        assert_eq!(
            annual_mark(&missing, &[1.0, 1.0, 1.0]).expect_err("missing term"),
            GradeError::MissingTermMark { term: 2 }
        );
        // Zero-weighted terms may be absent.
        assert!((annual_mark(&missing, &[1.0, 0.0, 1.0]).expect("annual") - 12.0).abs() < 1e-9);
    }
}
