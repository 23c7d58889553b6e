use std::collections::{BTreeSet, HashMap};

use pkg_types::rbac::PolicyRule;

/// Compact an accumulated rule list into a smaller list granting the same
/// permissions: break rules into single-group/single-resource/single-name
/// atoms, re-merge atoms that share a target by unioning verbs, then fold
/// rules that differ only by resource names or only by resources. The result
/// is sorted so repeated runs emit identical output.
pub fn compact_rules(rules: Vec<PolicyRule>) -> Vec<PolicyRule> {
    let atoms: Vec<PolicyRule> = rules.iter().flat_map(breakdown_rule).collect();
    let merged = compact_simple_rules(atoms);
    let mut accumulated = accumulate(merged);

    accumulated.sort_by(|a, b| {
        a.api_groups
            .join(",")
            .cmp(&b.api_groups.join(","))
            .then_with(|| a.compact_string().cmp(&b.compact_string()))
    });
    accumulated
}

/// Decompose a rule into atoms covering one (group, resource[, name]) each,
/// plus one atom per non-resource URL. Verb sets are carried whole.
fn breakdown_rule(rule: &PolicyRule) -> Vec<PolicyRule> {
    let mut subrules = Vec::new();
    for group in &rule.api_groups {
        for resource in &rule.resources {
            if rule.resource_names.is_empty() {
                subrules.push(PolicyRule {
                    verbs: rule.verbs.clone(),
                    api_groups: vec![group.clone()],
                    resources: vec![resource.clone()],
                    ..Default::default()
                });
            } else {
                for name in &rule.resource_names {
                    subrules.push(PolicyRule {
                        verbs: rule.verbs.clone(),
                        api_groups: vec![group.clone()],
                        resources: vec![resource.clone()],
                        resource_names: vec![name.clone()],
                        ..Default::default()
                    });
                }
            }
        }
    }
    for url in &rule.non_resource_urls {
        subrules.push(PolicyRule {
            verbs: rule.verbs.clone(),
            non_resource_urls: vec![url.clone()],
            ..Default::default()
        });
    }
    subrules
}

/// Union the verb sets of atoms that target the same (group, resource,
/// name). Verbs come out deduplicated and sorted so later whole-rule
/// equality checks are order-insensitive.
fn compact_simple_rules(rules: Vec<PolicyRule>) -> Vec<PolicyRule> {
    let mut compacted: Vec<PolicyRule> = Vec::new();
    let mut index: HashMap<(String, String, Option<String>), usize> = HashMap::new();

    for rule in rules {
        let is_simple = rule.non_resource_urls.is_empty()
            && rule.api_groups.len() == 1
            && rule.resources.len() == 1
            && rule.resource_names.len() <= 1;
        if is_simple {
            let key = (
                rule.api_groups[0].clone(),
                rule.resources[0].clone(),
                rule.resource_names.first().cloned(),
            );
            if let Some(&i) = index.get(&key) {
                compacted[i].verbs.extend(rule.verbs);
                continue;
            }
            index.insert(key, compacted.len());
        }
        compacted.push(rule);
    }

    for rule in &mut compacted {
        let verbs: BTreeSet<String> = rule.verbs.drain(..).collect();
        rule.verbs = verbs.into_iter().collect();
    }
    compacted
}

/// Fold each rule into an earlier one when the pair differs only by
/// `resourceNames` (union the names) or only by `resources` (union the
/// resources). First matching accumulator wins; non-resource rules pass
/// through untouched.
fn accumulate(rules: Vec<PolicyRule>) -> Vec<PolicyRule> {
    let mut accumulated: Vec<PolicyRule> = Vec::new();

    for rule in rules {
        if rule.resources.is_empty() {
            accumulated.push(rule);
            continue;
        }

        let mut nameless = rule.clone();
        nameless.resource_names.clear();
        let mut resourceless = rule.clone();
        resourceless.resources.clear();

        let mut merged = false;
        for acc in accumulated.iter_mut() {
            let mut acc_nameless = acc.clone();
            acc_nameless.resource_names.clear();
            if acc_nameless == nameless {
                let names: BTreeSet<String> = acc
                    .resource_names
                    .drain(..)
                    .chain(rule.resource_names.iter().cloned())
                    .collect();
                acc.resource_names = names.into_iter().collect();
                merged = true;
                break;
            }

            let mut acc_resourceless = acc.clone();
            acc_resourceless.resources.clear();
            if acc_resourceless == resourceless {
                let resources: BTreeSet<String> = acc
                    .resources
                    .drain(..)
                    .chain(rule.resources.iter().cloned())
                    .collect();
                acc.resources = resources.into_iter().collect();
                merged = true;
                break;
            }
        }
        if !merged {
            accumulated.push(rule);
        }
    }

    accumulated
}
