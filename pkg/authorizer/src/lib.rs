//! RBAC authorization over an in-memory policy snapshot.
//!
//! Evaluation walks bindings whose subjects cover the requesting user,
//! resolves each `roleRef`, and checks the referenced rules against the
//! request. ClusterRoleBindings apply to every request; RoleBindings only to
//! resource requests inside the binding's namespace.

pub mod matcher;

use pkg_types::attributes::AttributesRecord;
use pkg_types::rbac::{PolicyRule, RbacObjects, RoleRef};
use tracing::debug;

use crate::matcher::{rule_allows, subjects_match};

/// Outcome of an authorization check. RBAC grants are purely additive, so a
/// policy either allows a request or has no opinion on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    NoOpinion,
}

/// Anything that can answer "does this policy allow this request".
pub trait Authorizer {
    fn authorize(&self, attrs: &AttributesRecord) -> Decision;
}

/// Evaluates requests against a borrowed snapshot of RBAC objects.
pub struct RbacAuthorizer<'a> {
    policy: &'a RbacObjects,
}

impl<'a> RbacAuthorizer<'a> {
    pub fn new(policy: &'a RbacObjects) -> Self {
        Self { policy }
    }

    fn cluster_role_rules(&self, role_ref: &RoleRef) -> Option<&'a [PolicyRule]> {
        if role_ref.kind != "ClusterRole" {
            return None;
        }
        self.policy
            .cluster_roles
            .iter()
            .find(|r| r.metadata.name == role_ref.name)
            .map(|r| r.rules.as_slice())
    }

    /// Resolve a RoleBinding's roleRef: a Role in the binding's namespace, or
    /// a ClusterRole.
    fn namespaced_rules(&self, role_ref: &RoleRef, namespace: &str) -> Option<&'a [PolicyRule]> {
        match role_ref.kind.as_str() {
            "Role" => self
                .policy
                .roles
                .iter()
                .find(|r| r.metadata.namespace == namespace && r.metadata.name == role_ref.name)
                .map(|r| r.rules.as_slice()),
            "ClusterRole" => self.cluster_role_rules(role_ref),
            _ => None,
        }
    }
}

impl Authorizer for RbacAuthorizer<'_> {
    fn authorize(&self, attrs: &AttributesRecord) -> Decision {
        for binding in &self.policy.cluster_role_bindings {
            if !subjects_match(&binding.subjects, &attrs.user) {
                continue;
            }
            let Some(rules) = self.cluster_role_rules(&binding.role_ref) else {
                debug!(
                    binding = %binding.metadata.name,
                    role = %binding.role_ref.name,
                    "skipping cluster role binding with unresolvable roleRef"
                );
                continue;
            };
            if rules.iter().any(|rule| rule_allows(rule, attrs)) {
                return Decision::Allow;
            }
        }

        // Namespaced bindings can only grant resource access in their own
        // namespace, never cluster-scoped or non-resource access.
        if attrs.resource_request && !attrs.namespace.is_empty() {
            for binding in &self.policy.role_bindings {
                if binding.metadata.namespace != attrs.namespace {
                    continue;
                }
                if !subjects_match(&binding.subjects, &attrs.user) {
                    continue;
                }
                let Some(rules) =
                    self.namespaced_rules(&binding.role_ref, &binding.metadata.namespace)
                else {
                    debug!(
                        binding = %binding.metadata.name,
                        namespace = %binding.metadata.namespace,
                        role = %binding.role_ref.name,
                        "skipping role binding with unresolvable roleRef"
                    );
                    continue;
                };
                if rules.iter().any(|rule| rule_allows(rule, attrs)) {
                    return Decision::Allow;
                }
            }
        }

        Decision::NoOpinion
    }
}
