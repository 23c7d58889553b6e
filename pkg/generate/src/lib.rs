//! Synthesizes a minimal covering set of RBAC objects from observed API
//! requests.
//!
//! The generator walks requests broadest-first, skips anything the existing
//! or already-generated policy covers, broadens repeated operations across
//! names/namespaces when configured, and compacts each accumulated rule list
//! before returning.

pub mod compact;
pub mod rules;
pub mod sort;

use std::collections::{BTreeMap, HashMap};

use anyhow::{Result, bail};
use pkg_authorizer::{Authorizer, Decision, RbacAuthorizer};
use pkg_types::attributes::AttributesRecord;
use pkg_types::rbac::{
    ClusterRole, ClusterRoleBinding, ObjectMeta, PolicyRule, RbacObjects, Role, RoleBinding,
    RoleRef, Subject, GROUP_NAME,
};
use tracing::{debug, info};

pub use crate::compact::compact_rules;
pub use crate::rules::{attributes_to_resource_rule, user_to_subject};
pub use crate::sort::sort_requests;

/// Options controlling rule generation.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Extra verbs implied by observing a verb (observing `list` implies the
    /// caller will also `get` and `watch`).
    pub verb_expansions: BTreeMap<String, Vec<String>>,
    /// Drop `resourceNames` when the same operation hits more than one name.
    pub expand_multiple_names_to_unnamed: bool,
    /// Emit a cluster-scoped rule when the same operation hits more than one
    /// namespace.
    pub expand_multiple_namespaces_to_cluster_scoped: bool,

    /// Name stamped onto every generated object.
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        let mut verb_expansions = BTreeMap::new();
        verb_expansions.insert(
            "watch".to_string(),
            vec!["get".to_string(), "list".to_string()],
        );
        verb_expansions.insert(
            "list".to_string(),
            vec!["get".to_string(), "watch".to_string()],
        );
        verb_expansions.insert(
            "update".to_string(),
            vec!["get".to_string(), "patch".to_string()],
        );
        verb_expansions.insert(
            "patch".to_string(),
            vec!["get".to_string(), "update".to_string()],
        );

        Self {
            verb_expansions,
            expand_multiple_names_to_unnamed: true,
            expand_multiple_namespaces_to_cluster_scoped: true,
            name: "audit2rbac".to_string(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
        }
    }
}

impl GenerateOptions {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            bail!("generated object name must not be empty");
        }
        Ok(())
    }
}

/// Builds a set of RBAC roles and bindings covering the supplied requests.
pub struct Generator {
    options: GenerateOptions,
    existing: RbacObjects,
    requests: Vec<AttributesRecord>,

    generated: RbacObjects,
    cluster_role: Option<usize>,
    namespaced_role: HashMap<String, usize>,
}

impl Generator {
    pub fn new(
        existing: RbacObjects,
        requests: Vec<AttributesRecord>,
        options: GenerateOptions,
    ) -> Self {
        Self {
            options,
            existing,
            requests,
            generated: RbacObjects::default(),
            cluster_role: None,
            namespaced_role: HashMap::new(),
        }
    }

    /// Run the single generation pass and return the covering objects.
    /// Requests already authorized by the existing policy produce nothing;
    /// an empty request list produces an empty result.
    pub fn generate(mut self) -> Result<RbacObjects> {
        self.options.validate()?;

        sort_requests(&mut self.requests);

        let existing = std::mem::take(&mut self.existing);
        let requests = std::mem::take(&mut self.requests);

        for request in &requests {
            if RbacAuthorizer::new(&existing).authorize(request) == Decision::Allow {
                debug!(verb = %request.verb, "covered by existing policy");
                continue;
            }
            if RbacAuthorizer::new(&self.generated).authorize(request) == Decision::Allow {
                continue;
            }

            let subject = user_to_subject(&request.user);

            if !request.resource_request {
                let idx = self.ensure_cluster_role_and_binding(subject);
                self.generated.cluster_roles[idx]
                    .rules
                    .push(PolicyRule::non_resource_rule(
                        &[request.verb.as_str()],
                        &[request.path.as_str()],
                    ));
                continue;
            }

            let request = self.broaden(request, &requests);
            let rule = attributes_to_resource_rule(&request, &self.options);

            if request.namespace.is_empty() {
                let idx = self.ensure_cluster_role_and_binding(subject);
                self.generated.cluster_roles[idx].rules.push(rule);
            } else {
                let idx = self.ensure_namespaced_role_and_binding(subject, &request.namespace);
                self.generated.roles[idx].rules.push(rule);
            }
        }

        for role in &mut self.generated.cluster_roles {
            role.rules = compact_rules(std::mem::take(&mut role.rules));
        }
        for role in &mut self.generated.roles {
            role.rules = compact_rules(std::mem::take(&mut role.rules));
        }

        Ok(self.generated)
    }

    /// Decide whether this request generalizes across names or namespaces:
    /// when another observed request matches after erasing the
    /// expansion-governed fields but was made against a different name or
    /// namespace, the corresponding field is cleared.
    fn broaden(&self, request: &AttributesRecord, all: &[AttributesRecord]) -> AttributesRecord {
        let expand_names = self.options.expand_multiple_names_to_unnamed;
        let expand_namespaces = self.options.expand_multiple_namespaces_to_cluster_scoped;

        let mut request = request.clone();

        let should_scan = (!request.namespace.is_empty() && expand_namespaces)
            || (!request.name.is_empty() && expand_names);
        if !should_scan {
            return request;
        }

        let mut canonical = request.clone();
        if expand_names {
            canonical.name.clear();
        }
        if expand_namespaces {
            canonical.namespace.clear();
        }
        canonical.path.clear();

        for other in all {
            if !other.resource_request {
                continue;
            }
            let different_namespace =
                !other.namespace.is_empty() && other.namespace != request.namespace;
            let different_name = !other.name.is_empty() && other.name != request.name;

            let mut candidate = other.clone();
            if expand_names {
                candidate.name.clear();
            }
            if expand_namespaces {
                candidate.namespace.clear();
            }
            candidate.path.clear();

            if candidate == canonical {
                if expand_namespaces && different_namespace {
                    request.namespace.clear();
                }
                if expand_names && different_name {
                    request.name.clear();
                }
            }
        }

        request
    }

    fn object_meta(&self, namespace: &str) -> ObjectMeta {
        ObjectMeta {
            name: self.options.name.clone(),
            namespace: namespace.to_string(),
            labels: self.options.labels.clone(),
            annotations: self.options.annotations.clone(),
        }
    }

    fn ensure_cluster_role_and_binding(&mut self, subject: Subject) -> usize {
        if let Some(idx) = self.cluster_role {
            return idx;
        }

        info!(name = %self.options.name, "creating cluster role and binding");
        self.generated
            .cluster_roles
            .push(ClusterRole::new(self.object_meta("")));
        self.generated
            .cluster_role_bindings
            .push(ClusterRoleBinding::new(
                self.object_meta(""),
                RoleRef {
                    api_group: GROUP_NAME.to_string(),
                    kind: "ClusterRole".to_string(),
                    name: self.options.name.clone(),
                },
                vec![subject],
            ));

        let idx = self.generated.cluster_roles.len() - 1;
        self.cluster_role = Some(idx);
        idx
    }

    fn ensure_namespaced_role_and_binding(&mut self, subject: Subject, namespace: &str) -> usize {
        if let Some(&idx) = self.namespaced_role.get(namespace) {
            return idx;
        }

        info!(name = %self.options.name, namespace, "creating role and binding");
        self.generated.roles.push(Role::new(self.object_meta(namespace)));
        self.generated.role_bindings.push(RoleBinding::new(
            self.object_meta(namespace),
            RoleRef {
                api_group: GROUP_NAME.to_string(),
                kind: "Role".to_string(),
                name: self.options.name.clone(),
            },
            vec![subject],
        ));

        let idx = self.generated.roles.len() - 1;
        self.namespaced_role.insert(namespace.to_string(), idx);
        idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_types::audit::UserInfo;
    use pkg_types::rbac::SubjectKind;

    fn bob() -> UserInfo {
        UserInfo::new("bob", &["system:authenticated"])
    }

    fn resource(
        user: &UserInfo,
        verb: &str,
        group: &str,
        res: &str,
        namespace: &str,
        name: &str,
    ) -> AttributesRecord {
        AttributesRecord {
            user: user.clone(),
            verb: verb.to_string(),
            api_group: group.to_string(),
            resource: res.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            resource_request: true,
            ..Default::default()
        }
    }

    fn subresource(
        user: &UserInfo,
        verb: &str,
        res: &str,
        sub: &str,
        namespace: &str,
        name: &str,
    ) -> AttributesRecord {
        let mut attrs = resource(user, verb, "", res, namespace, name);
        attrs.subresource = sub.to_string();
        attrs
    }

    fn url(user: &UserInfo, verb: &str, path: &str) -> AttributesRecord {
        AttributesRecord {
            user: user.clone(),
            verb: verb.to_string(),
            path: path.to_string(),
            ..Default::default()
        }
    }

    fn named_rule(verbs: &[&str], groups: &[&str], resources: &[&str], names: &[&str]) -> PolicyRule {
        let mut rule = PolicyRule::resource_rule(verbs, groups, resources);
        rule.resource_names = names.iter().map(|n| n.to_string()).collect();
        rule
    }

    fn discovery_policy() -> RbacObjects {
        let mut role = ClusterRole::new(ObjectMeta {
            name: "system:discovery".to_string(),
            ..Default::default()
        });
        role.rules.push(PolicyRule::non_resource_rule(
            &["get"],
            &[
                "/healthz",
                "/version",
                "/swaggerapi",
                "/swaggerapi/*",
                "/api",
                "/api/*",
                "/apis",
                "/apis/*",
            ],
        ));
        RbacObjects {
            cluster_roles: vec![role],
            cluster_role_bindings: vec![ClusterRoleBinding::new(
                ObjectMeta {
                    name: "system:discovery".to_string(),
                    ..Default::default()
                },
                RoleRef {
                    api_group: GROUP_NAME.to_string(),
                    kind: "ClusterRole".to_string(),
                    name: "system:discovery".to_string(),
                },
                vec![Subject::group("system:authenticated")],
            )],
            ..Default::default()
        }
    }

    #[test]
    fn already_allowed_requests_generate_nothing() {
        let bob = bob();
        let requests = vec![url(&bob, "get", "/api"), url(&bob, "get", "/apis")];
        let generated = Generator::new(discovery_policy(), requests, GenerateOptions::default())
            .generate()
            .unwrap();
        assert!(generated.is_empty());
    }

    #[test]
    fn non_resource_request_gets_a_cluster_role() {
        let bob = bob();
        let generated = Generator::new(
            RbacObjects::default(),
            vec![url(&bob, "get", "/foo")],
            GenerateOptions::default(),
        )
        .generate()
        .unwrap();

        assert!(generated.roles.is_empty());
        assert!(generated.role_bindings.is_empty());
        assert_eq!(generated.cluster_roles.len(), 1);
        assert_eq!(generated.cluster_role_bindings.len(), 1);

        let role = &generated.cluster_roles[0];
        assert_eq!(role.metadata.name, "audit2rbac");
        assert_eq!(
            role.rules,
            vec![PolicyRule::non_resource_rule(&["get"], &["/foo"])]
        );

        let binding = &generated.cluster_role_bindings[0];
        assert_eq!(binding.role_ref.kind, "ClusterRole");
        assert_eq!(binding.role_ref.name, "audit2rbac");
        assert_eq!(binding.subjects, vec![Subject::user("bob")]);
    }

    #[test]
    fn multiple_names_expand_to_unnamed() {
        let bob = bob();
        let requests = vec![
            resource(&bob, "get", "", "nodes", "", "node1"),
            resource(&bob, "get", "", "nodes", "", "node2"),
        ];
        let generated = Generator::new(RbacObjects::default(), requests, GenerateOptions::default())
            .generate()
            .unwrap();

        assert_eq!(generated.cluster_roles.len(), 1);
        assert_eq!(
            generated.cluster_roles[0].rules,
            vec![PolicyRule::resource_rule(&["get"], &[""], &["nodes"])]
        );
    }

    #[test]
    fn covering_list_skips_named_gets_without_name_expansion() {
        let bob = bob();
        let requests = vec![
            resource(&bob, "get", "", "nodes", "", "node1"),
            resource(&bob, "get", "", "nodes", "", "node2"),
            resource(&bob, "list", "", "nodes", "", ""),
        ];
        let options = GenerateOptions {
            expand_multiple_names_to_unnamed: false,
            ..Default::default()
        };
        let generated = Generator::new(RbacObjects::default(), requests, options)
            .generate()
            .unwrap();

        assert_eq!(generated.cluster_roles.len(), 1);
        assert_eq!(
            generated.cluster_roles[0].rules,
            vec![PolicyRule::resource_rule(
                &["get", "list", "watch"],
                &[""],
                &["nodes"]
            )]
        );
    }

    #[test]
    fn operations_across_namespaces_become_cluster_scoped() {
        let bob = bob();
        let requests = vec![
            resource(&bob, "get", "", "pods", "ns1", "pod1"),
            resource(&bob, "get", "", "pods", "ns2", "pod2"),
            resource(&bob, "get", "apps", "deployments", "ns1", "dep1"),
            resource(&bob, "get", "apps", "deployments", "ns2", "dep2"),
            resource(&bob, "get", "", "configmaps", "ns1", "cm1"),
        ];
        let generated = Generator::new(RbacObjects::default(), requests, GenerateOptions::default())
            .generate()
            .unwrap();

        assert_eq!(generated.cluster_roles.len(), 1);
        assert_eq!(
            generated.cluster_roles[0].rules,
            vec![
                PolicyRule::resource_rule(&["get"], &[""], &["pods"]),
                PolicyRule::resource_rule(&["get"], &["apps"], &["deployments"]),
            ]
        );

        assert_eq!(generated.roles.len(), 1);
        let role = &generated.roles[0];
        assert_eq!(role.metadata.namespace, "ns1");
        assert_eq!(
            role.rules,
            vec![named_rule(&["get"], &[""], &["configmaps"], &["cm1"])]
        );
    }

    #[test]
    fn identical_verb_sets_compact_across_resources() {
        let bob = bob();
        let requests = vec![
            resource(&bob, "list", "", "pods", "", ""),
            resource(&bob, "watch", "", "pods", "", ""),
            resource(&bob, "list", "", "configmaps", "", ""),
            resource(&bob, "watch", "", "configmaps", "", ""),
        ];
        let generated = Generator::new(RbacObjects::default(), requests, GenerateOptions::default())
            .generate()
            .unwrap();

        assert_eq!(generated.cluster_roles.len(), 1);
        assert_eq!(
            generated.cluster_roles[0].rules,
            vec![PolicyRule::resource_rule(
                &["get", "list", "watch"],
                &[""],
                &["configmaps", "pods"]
            )]
        );
    }

    // The full fixture: discovery URLs already covered, a mix of
    // cluster-scoped and namespaced operations, names and namespaces that
    // should and should not broaden, and a namespaced lock configmap.
    fn full_fixture_requests() -> Vec<AttributesRecord> {
        let bob = bob();
        vec![
            url(&bob, "get", "/api"),
            url(&bob, "get", "/apis"),
            url(&bob, "get", "/ui"),
            resource(&bob, "create", "", "nodes", "", ""),
            resource(&bob, "create", "", "nodes", "", ""),
            resource(&bob, "get", "", "nodes", "", "node1"),
            resource(&bob, "update", "", "nodes", "", "node1"),
            resource(&bob, "get", "", "nodes", "", "node2"),
            resource(&bob, "update", "", "nodes", "", "node2"),
            resource(&bob, "list", "", "nodes", "", ""),
            resource(&bob, "watch", "", "nodes", "", ""),
            resource(&bob, "list", "", "pods", "", ""),
            resource(&bob, "watch", "", "pods", "", ""),
            resource(&bob, "get", "", "pods", "ns1", "pod1"),
            resource(&bob, "get", "", "pods", "ns1", "pod2"),
            resource(&bob, "get", "", "pods", "ns2", "pod3"),
            resource(&bob, "get", "", "pods", "ns2", "pod4"),
            subresource(&bob, "update", "pods", "status", "ns1", "pod1"),
            subresource(&bob, "update", "pods", "status", "ns1", "pod2"),
            subresource(&bob, "update", "pods", "status", "ns2", "pod3"),
            subresource(&bob, "update", "pods", "status", "ns2", "pod4"),
            resource(&bob, "create", "", "configmaps", "kube-system", ""),
            resource(&bob, "get", "", "configmaps", "kube-system", "mylock"),
            resource(&bob, "update", "", "configmaps", "kube-system", "mylock"),
            resource(&bob, "list", "", "configmaps", "kube-system", ""),
            resource(&bob, "watch", "", "configmaps", "kube-system", ""),
        ]
    }

    #[test]
    fn full_fixture_generates_expected_objects() {
        let generated = Generator::new(
            discovery_policy(),
            full_fixture_requests(),
            GenerateOptions::default(),
        )
        .generate()
        .unwrap();

        assert_eq!(generated.cluster_roles.len(), 1);
        assert_eq!(generated.cluster_role_bindings.len(), 1);
        assert_eq!(generated.roles.len(), 1);
        assert_eq!(generated.role_bindings.len(), 1);

        assert_eq!(
            generated.cluster_roles[0].rules,
            vec![
                PolicyRule::resource_rule(&["get", "list", "watch"], &[""], &["nodes", "pods"]),
                PolicyRule::resource_rule(
                    &["get", "patch", "update"],
                    &[""],
                    &["nodes", "pods/status"]
                ),
                PolicyRule::resource_rule(&["create"], &[""], &["nodes"]),
                PolicyRule::non_resource_rule(&["get"], &["/ui"]),
            ]
        );

        let role = &generated.roles[0];
        assert_eq!(role.metadata.namespace, "kube-system");
        assert_eq!(
            role.rules,
            vec![
                named_rule(
                    &["get", "patch", "update"],
                    &[""],
                    &["configmaps"],
                    &["mylock"]
                ),
                PolicyRule::resource_rule(&["create"], &[""], &["configmaps"]),
                PolicyRule::resource_rule(&["get", "list", "watch"], &[""], &["configmaps"]),
            ]
        );
    }

    #[test]
    fn generated_policy_covers_every_request() {
        let existing = discovery_policy();
        let requests = full_fixture_requests();
        let generated = Generator::new(existing.clone(), requests.clone(), GenerateOptions::default())
            .generate()
            .unwrap();

        let mut combined = existing;
        combined.extend(generated);
        let authorizer = RbacAuthorizer::new(&combined);
        for request in &requests {
            assert_eq!(
                authorizer.authorize(request),
                Decision::Allow,
                "request not covered: {} {}{}",
                request.verb,
                request.resource,
                request.path
            );
        }
    }

    #[test]
    fn generation_is_idempotent() {
        let first = Generator::new(
            discovery_policy(),
            full_fixture_requests(),
            GenerateOptions::default(),
        )
        .generate()
        .unwrap();
        let second = Generator::new(
            discovery_policy(),
            full_fixture_requests(),
            GenerateOptions::default(),
        )
        .generate()
        .unwrap();

        assert_eq!(
            serde_yaml::to_string(&first.cluster_roles).unwrap(),
            serde_yaml::to_string(&second.cluster_roles).unwrap()
        );
        assert_eq!(
            serde_yaml::to_string(&first.roles).unwrap(),
            serde_yaml::to_string(&second.roles).unwrap()
        );
        assert_eq!(first, second);
    }

    #[test]
    fn every_role_has_exactly_one_matching_binding() {
        let generated = Generator::new(
            RbacObjects::default(),
            full_fixture_requests(),
            GenerateOptions::default(),
        )
        .generate()
        .unwrap();

        assert_eq!(generated.roles.len(), generated.role_bindings.len());
        for (role, binding) in generated.roles.iter().zip(&generated.role_bindings) {
            assert_eq!(role.metadata.name, binding.metadata.name);
            assert_eq!(role.metadata.namespace, binding.metadata.namespace);
            assert_eq!(binding.role_ref.kind, "Role");
            assert_eq!(binding.role_ref.name, role.metadata.name);
            assert_eq!(binding.subjects, vec![Subject::user("bob")]);
        }

        assert_eq!(
            generated.cluster_roles.len(),
            generated.cluster_role_bindings.len()
        );
        for (role, binding) in generated
            .cluster_roles
            .iter()
            .zip(&generated.cluster_role_bindings)
        {
            assert_eq!(role.metadata.name, binding.metadata.name);
            assert_eq!(binding.role_ref.kind, "ClusterRole");
            assert_eq!(binding.subjects, vec![Subject::user("bob")]);
        }
    }

    #[test]
    fn flags_off_never_broadens() {
        let bob = bob();
        let requests = vec![
            resource(&bob, "get", "", "pods", "ns1", "pod1"),
            resource(&bob, "get", "", "pods", "ns2", "pod2"),
        ];
        let options = GenerateOptions {
            expand_multiple_names_to_unnamed: false,
            expand_multiple_namespaces_to_cluster_scoped: false,
            ..Default::default()
        };
        let generated = Generator::new(RbacObjects::default(), requests, options)
            .generate()
            .unwrap();

        assert!(generated.cluster_roles.is_empty());
        assert_eq!(generated.roles.len(), 2);
        let namespaces: Vec<&str> = generated
            .roles
            .iter()
            .map(|r| r.metadata.namespace.as_str())
            .collect();
        assert_eq!(namespaces, vec!["ns1", "ns2"]);
        assert_eq!(
            generated.roles[0].rules,
            vec![named_rule(&["get"], &[""], &["pods"], &["pod1"])]
        );
        assert_eq!(
            generated.roles[1].rules,
            vec![named_rule(&["get"], &[""], &["pods"], &["pod2"])]
        );
    }

    #[test]
    fn service_account_identity_becomes_the_binding_subject() {
        let sa = UserInfo::new("system:serviceaccount:ns1:builder", &[]);
        let generated = Generator::new(
            RbacObjects::default(),
            vec![resource(&sa, "get", "", "pods", "ns1", "")],
            GenerateOptions::default(),
        )
        .generate()
        .unwrap();

        assert_eq!(generated.role_bindings.len(), 1);
        let subject = &generated.role_bindings[0].subjects[0];
        assert_eq!(subject.kind, SubjectKind::ServiceAccount);
        assert_eq!(subject.namespace, "ns1");
        assert_eq!(subject.name, "builder");
    }

    #[test]
    fn metadata_is_stamped_onto_all_objects() {
        let bob = bob();
        let mut options = GenerateOptions::default();
        options.name = "audit2rbac:bob".to_string();
        options
            .labels
            .insert("generated".to_string(), "true".to_string());

        let generated = Generator::new(
            RbacObjects::default(),
            vec![
                resource(&bob, "get", "", "pods", "ns1", ""),
                url(&bob, "get", "/foo"),
            ],
            options,
        )
        .generate()
        .unwrap();

        for meta in generated
            .roles
            .iter()
            .map(|r| &r.metadata)
            .chain(generated.role_bindings.iter().map(|b| &b.metadata))
            .chain(generated.cluster_roles.iter().map(|r| &r.metadata))
            .chain(generated.cluster_role_bindings.iter().map(|b| &b.metadata))
        {
            assert_eq!(meta.name, "audit2rbac:bob");
            assert_eq!(meta.labels.get("generated").map(String::as_str), Some("true"));
        }
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let generated = Generator::new(RbacObjects::default(), vec![], GenerateOptions::default())
            .generate()
            .unwrap();
        assert!(generated.is_empty());
    }

    #[test]
    fn empty_name_is_rejected() {
        let options = GenerateOptions {
            name: String::new(),
            ..Default::default()
        };
        let result = Generator::new(RbacObjects::default(), vec![], options).generate();
        assert!(result.is_err());
    }
}
