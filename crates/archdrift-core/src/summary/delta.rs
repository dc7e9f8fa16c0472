use crate::drift::{baseline, Violation};
use std::collections::BTreeSet;

/// Violations that appeared or disappeared between two versions, matched
/// by rule and component. Baseline findings only ever describe their own
/// step, so they never show up as resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViolationDelta<'a> {
    pub new: Vec<&'a Violation>,
    pub resolved: Vec<&'a Violation>,
}

impl<'a> ViolationDelta<'a> {
    pub fn between(previous: &'a [Violation], current: &'a [Violation]) -> Self {
        let before: BTreeSet<(&str, &str)> = previous.iter().map(Violation::key).collect();
        let after: BTreeSet<(&str, &str)> = current.iter().map(Violation::key).collect();
        Self {
            new: current.iter().filter(|v| !before.contains(&v.key())).collect(),
            resolved: previous
                .iter()
                .filter(|v| !after.contains(&v.key()) && !baseline::is_baseline_rule(&v.rule_id))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.resolved.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drift::Severity;

    fn violation(rule: &str, component: &str) -> Violation {
        Violation {
            id: Violation::id_for(rule, component),
            rule_id: rule.into(),
            severity: Severity::High,
            component: component.into(),
            expected: String::new(),
            actual: vec![],
            explanation: String::new(),
            suggested_fix: String::new(),
        }
    }

    #[test]
    fn test_new_and_resolved() {
        let previous = vec![violation("r1", "a"), violation("r1", "b")];
        let current = vec![violation("r1", "b"), violation("r2", "a")];
        let delta = ViolationDelta::between(&previous, &current);

        assert_eq!(delta.new.len(), 1);
        assert_eq!(delta.new[0].rule_id, "r2");
        assert_eq!(delta.resolved.len(), 1);
        assert_eq!(delta.resolved[0].component, "a");
    }

    #[test]
    fn test_baseline_findings_are_never_resolved() {
        let previous = vec![violation(baseline::API_PATH_CHANGED, "api.users")];
        let delta = ViolationDelta::between(&previous, &[]);
        assert!(delta.is_empty());
    }
}
