//! Orders evaluation components so every computed component is evaluated
//! strictly after everything it depends on, and reports setup anomalies.

use std::collections::{HashMap, HashSet};

use crate::error::{GradeError, ValidationWarning};
use crate::formula;
use crate::model::EvaluationComponent;

/// Kahn's algorithm over the dependency graph of one discipline/term.
///
/// Returns component ids in evaluation order. Directly-scored components are
/// leaves and carry no ordering constraint among themselves; ties are broken
/// by declared display order (then id) so traces are reproducible across
/// runs. A cycle is fatal for the whole discipline/term and the error names
/// a component that is actually on the cycle.
pub fn evaluation_order(components: &[EvaluationComponent]) -> Result<Vec<String>, GradeError> {
    let by_id: HashMap<&str, &EvaluationComponent> =
        components.iter().map(|c| (c.id.as_str(), c)).collect();

    // Edges run dependency -> dependent. Dependencies on ids outside the set
    // are a validation warning, not an ordering input.
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for c in components {
        in_degree.entry(c.id.as_str()).or_insert(0);
        for dep in &c.depends_on {
            if by_id.contains_key(dep.as_str()) {
                *in_degree.entry(c.id.as_str()).or_insert(0) += 1;
                dependents.entry(dep.as_str()).or_default().push(c.id.as_str());
            }
        }
    }

    let sort_key = |id: &str| {
        let c = by_id[id];
        (c.sort_order, c.id.clone())
    };

    let mut ready: Vec<&str> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| *id)
        .collect();
    ready.sort_by_key(|id| sort_key(id));

    let mut order: Vec<String> = Vec::with_capacity(components.len());
    while let Some(id) = ready.first().copied() {
        ready.remove(0);
        order.push(id.to_string());
        let downstream = dependents.get(id).cloned().unwrap_or_default();
        for dependent in downstream {
            let d = in_degree.get_mut(dependent).expect("known node");
            *d -= 1;
            if *d == 0 {
                let pos = ready
                    .binary_search_by_key(&sort_key(dependent), |r| sort_key(r))
                    .unwrap_or_else(|p| p);
                ready.insert(pos, dependent);
            }
        }
    }

    if order.len() < components.len() {
        return Err(GradeError::CyclicDependency {
            component_id: find_cycle_member(components, &order),
        });
    }
    Ok(order)
}

/// Walks unresolved dependency edges from a stalled node until one repeats;
/// the repeated node is on a cycle (a stalled node may be merely downstream
/// of one).
fn find_cycle_member(components: &[EvaluationComponent], resolved: &[String]) -> String {
    let resolved: HashSet<&str> = resolved.iter().map(|s| s.as_str()).collect();
    let by_id: HashMap<&str, &EvaluationComponent> =
        components.iter().map(|c| (c.id.as_str(), c)).collect();

    let mut stalled: Vec<&EvaluationComponent> = components
        .iter()
        .filter(|c| !resolved.contains(c.id.as_str()))
        .collect();
    stalled.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.id.cmp(&b.id)));

    let mut current = stalled[0].id.as_str();
    let mut seen: HashSet<&str> = HashSet::new();
    while seen.insert(current) {
        let next = by_id[current]
            .depends_on
            .iter()
            .find(|dep| !resolved.contains(dep.as_str()) && by_id.contains_key(dep.as_str()));
        match next {
            Some(dep) => current = dep.as_str(),
            // Every stalled node keeps at least one unresolved edge, so this
            // only triggers on dangling dependency ids; report the walker.
            None => break,
        }
    }
    current.to_string()
}

/// One-pass setup validation for a discipline/term component set. Everything
/// reported here is a warning for the administrator, not a calculation
/// failure: weight-sum anomalies are explicitly non-fatal, and formula
/// problems are surfaced before the formula is ever evaluated.
pub fn validate_components(components: &[EvaluationComponent]) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let by_id: HashMap<&str, &EvaluationComponent> =
        components.iter().map(|c| (c.id.as_str(), c)).collect();
    let names: Vec<&str> = components.iter().map(|c| c.name.as_str()).collect();

    let weight_total: f64 = components
        .iter()
        .filter(|c| c.contributes_to_final)
        .map(|c| c.weight)
        .sum();
    if (weight_total - 100.0).abs() > 1e-6 {
        warnings.push(ValidationWarning::WeightSumMismatch { total: weight_total });
    }

    // Formulas reference components by name; a shared name makes every
    // reference to it ambiguous.
    let mut ids_by_name: HashMap<&str, Vec<&str>> = HashMap::new();
    for c in components {
        ids_by_name.entry(c.name.as_str()).or_default().push(c.id.as_str());
    }
    let mut duplicated: Vec<&str> = ids_by_name
        .iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|(name, _)| *name)
        .collect();
    duplicated.sort_unstable();
    for name in duplicated {
        warnings.push(ValidationWarning::DuplicateComponentName {
            name: name.to_string(),
            component_ids: ids_by_name[name].iter().map(|id| id.to_string()).collect(),
        });
    }

    for c in components {
        if c.is_computed {
            match &c.formula {
                None => warnings.push(ValidationWarning::MissingFormula {
                    component_id: c.id.clone(),
                }),
                Some(text) => {
                    let checked = formula::validate(text, names.iter().copied());
                    if !checked.valid {
                        warnings.push(ValidationWarning::InvalidFormula {
                            component_id: c.id.clone(),
                            message: checked.message.unwrap_or_default(),
                        });
                    } else {
                        // Every name a valid formula reads must be backed by
                        // the dependency list, or evaluation order cannot
                        // guarantee the value exists yet.
                        for reference in &checked.references {
                            let covered = components
                                .iter()
                                .filter(|t| t.name == *reference)
                                .any(|t| c.depends_on.iter().any(|d| *d == t.id));
                            if !covered {
                                warnings.push(ValidationWarning::UndeclaredDependency {
                                    component_id: c.id.clone(),
                                    reference: reference.clone(),
                                });
                            }
                        }
                    }
                }
            }
        }
        for dep in &c.depends_on {
            match by_id.get(dep.as_str()) {
                None => warnings.push(ValidationWarning::UnknownDependency {
                    component_id: c.id.clone(),
                    dependency_id: dep.clone(),
                }),
                Some(target) => {
                    if target.discipline_id != c.discipline_id || target.term != c.term {
                        warnings.push(ValidationWarning::CrossContextDependency {
                            component_id: c.id.clone(),
                            dependency_id: dep.clone(),
                        });
                    }
                }
            }
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(id: &str, sort_order: i64, deps: &[&str]) -> EvaluationComponent {
        EvaluationComponent {
            id: id.to_string(),
            discipline_id: "mat".to_string(),
            name: id.to_string(),
            weight: 50.0,
            scale_min: 0.0,
            scale_max: 20.0,
            is_computed: !deps.is_empty(),
            formula: if deps.is_empty() {
                None
            } else {
                Some(deps.join(" + "))
            },
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            required: true,
            contributes_to_final: true,
            term: Some(1),
            sort_order,
        }
    }

    #[test]
    fn order_puts_dependencies_first() {
        let set = vec![
            component("media", 3, &["p1", "p2"]),
            component("p2", 2, &[]),
            component("p1", 1, &[]),
        ];
        let order = evaluation_order(&set).expect("acyclic");
        assert_eq!(order, vec!["p1", "p2", "media"]);
    }

    #[test]
    fn independent_components_follow_display_order() {
        let set = vec![
            component("b", 2, &[]),
            component("c", 3, &[]),
            component("a", 1, &[]),
        ];
        let order = evaluation_order(&set).expect("acyclic");
        assert_eq!(order, vec!["a", "b", "c"]);
        // Same input, same order, every time.
        for _ in 0..5 {
            assert_eq!(evaluation_order(&set).expect("acyclic"), order);
        }
    }

    #[test]
    fn cycle_is_fatal_and_names_a_member() {
        let set = vec![
            component("p1", 1, &[]),
            component("x", 2, &["y"]),
            component("y", 3, &["x"]),
        ];
        let err = evaluation_order(&set).expect_err("cycle");
        match err {
            GradeError::CyclicDependency { component_id } => {
                assert!(component_id == "x" || component_id == "y");
            }
            other => panic!("expected CyclicDependency, got {:?}", other),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let set = vec![component("loop", 1, &["loop"])];
        let err = evaluation_order(&set).expect_err("cycle");
        assert_eq!(
            err,
            GradeError::CyclicDependency {
                component_id: "loop".to_string()
            }
        );
    }

    #[test]
    fn downstream_of_cycle_is_not_blamed() {
        let set = vec![
            component("x", 1, &["y"]),
            component("y", 2, &["x"]),
            component("z", 3, &["x"]),
        ];
        let err = evaluation_order(&set).expect_err("cycle");
        match err {
            GradeError::CyclicDependency { component_id } => {
                assert_ne!(component_id, "z");
            }
            other => panic!("expected CyclicDependency, got {:?}", other),
        }
    }

    #[test]
    fn validation_reports_weight_sum_and_cross_context() {
        let mut other_term = component("anual", 4, &[]);
        other_term.term = None;
        let mut reader = component("media", 3, &["anual", "ghost"]);
        reader.formula = Some("anual / 2".to_string());
        let set = vec![component("p1", 1, &[]), other_term, reader];

        let warnings = validate_components(&set);
        assert!(warnings
            .iter()
            .any(|w| matches!(w, ValidationWarning::WeightSumMismatch { total } if *total == 150.0)));
        assert!(warnings.iter().any(|w| matches!(
            w,
            ValidationWarning::CrossContextDependency { dependency_id, .. } if dependency_id == "anual"
        )));
        assert!(warnings.iter().any(|w| matches!(
            w,
            ValidationWarning::UnknownDependency { dependency_id, .. } if dependency_id == "ghost"
        )));
    }

    #[test]
    fn validation_flags_formula_reads_missing_from_dependency_list() {
        // Formula reads p2 but only p1 is declared; depending on display
        // order this would only surface at evaluation time.
        let mut media = component("media", 3, &["p1"]);
        media.formula = Some("(p1 + p2) / 2".to_string());
        let set = vec![component("p1", 1, &[]), component("p2", 2, &[]), media];
        let warnings = validate_components(&set);
        assert!(warnings.iter().any(|w| matches!(
            w,
            ValidationWarning::UndeclaredDependency { component_id, reference }
                if component_id == "media" && reference == "p2"
        )));
    }

    #[test]
    fn validation_flags_duplicate_component_names() {
        let mut first = component("c1", 1, &[]);
        first.name = "prova".to_string();
        let mut second = component("c2", 2, &[]);
        second.name = "prova".to_string();
        let mut reader = component("media", 3, &["c1"]);
        reader.formula = Some("prova / 2".to_string());

        let warnings = validate_components(&[first, second, reader]);
        assert!(warnings.iter().any(|w| matches!(
            w,
            ValidationWarning::DuplicateComponentName { name, component_ids }
                if name == "prova"
                    && component_ids.contains(&"c1".to_string())
                    && component_ids.contains(&"c2".to_string())
        )));
    }

    #[test]
    fn validation_flags_bad_formulas_before_use() {
        let mut c = component("media", 2, &["p1"]);
        c.formula = Some("p1 %% 2".to_string());
        let set = vec![component("p1", 1, &[]), c];
        let warnings = validate_components(&set);
        assert!(warnings
            .iter()
            .any(|w| matches!(w, ValidationWarning::InvalidFormula { component_id, .. } if component_id == "media")));
    }
}
