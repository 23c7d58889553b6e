use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// API group of the RBAC types.
pub const GROUP_NAME: &str = "rbac.authorization.k8s.io";
/// `apiVersion` stamped onto emitted objects.
pub const API_VERSION: &str = "rbac.authorization.k8s.io/v1";

// --- Object metadata ---

/// The subset of Kubernetes object metadata that generated objects carry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

// --- Policy rules ---

/// A single RBAC grant: verbs applied to either resource tuples or
/// non-resource URL patterns, never both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    /// Allowed verbs (e.g. "get", "list", "create", "*" for all).
    pub verbs: Vec<String>,
    /// API groups this rule applies to ("" for core, "*" for all).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub api_groups: Vec<String>,
    /// Resource types, optionally with a subresource suffix ("pods/status").
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
    /// Empty means any name; non-empty restricts to the listed names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_names: Vec<String>,
    /// URL path patterns for non-resource requests ("/healthz", "/api*").
    #[serde(default, skip_serializing_if = "Vec::is_empty", rename = "nonResourceURLs")]
    pub non_resource_urls: Vec<String>,
}

impl PolicyRule {
    /// Rule granting `verbs` on `resources` within `api_groups`.
    pub fn resource_rule(verbs: &[&str], api_groups: &[&str], resources: &[&str]) -> Self {
        Self {
            verbs: verbs.iter().map(|s| s.to_string()).collect(),
            api_groups: api_groups.iter().map(|s| s.to_string()).collect(),
            resources: resources.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Rule granting `verbs` on non-resource URL patterns.
    pub fn non_resource_rule(verbs: &[&str], urls: &[&str]) -> Self {
        Self {
            verbs: verbs.iter().map(|s| s.to_string()).collect(),
            non_resource_urls: urls.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Canonical single-line rendering, used to give rule lists a stable
    /// output order. Empty fields are omitted.
    pub fn compact_string(&self) -> String {
        let mut parts = Vec::new();
        if !self.api_groups.is_empty() {
            parts.push(format!("apiGroups={:?}", self.api_groups));
        }
        if !self.resources.is_empty() {
            parts.push(format!("resources={:?}", self.resources));
        }
        if !self.resource_names.is_empty() {
            parts.push(format!("resourceNames={:?}", self.resource_names));
        }
        if !self.non_resource_urls.is_empty() {
            parts.push(format!("nonResourceURLs={:?}", self.non_resource_urls));
        }
        if !self.verbs.is_empty() {
            parts.push(format!("verbs={:?}", self.verbs));
        }
        parts.join(",")
    }
}

// --- Subjects ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubjectKind {
    User,
    Group,
    ServiceAccount,
}

/// A subject a binding grants permissions to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub kind: SubjectKind,
    /// "rbac.authorization.k8s.io" for User and Group, empty for ServiceAccount.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_group: String,
    pub name: String,
    /// Only set for ServiceAccount subjects.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

impl Subject {
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::User,
            api_group: GROUP_NAME.to_string(),
            name: name.into(),
            namespace: String::new(),
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::Group,
            api_group: GROUP_NAME.to_string(),
            name: name.into(),
            namespace: String::new(),
        }
    }

    pub fn service_account(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::ServiceAccount,
            api_group: String::new(),
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

// --- Roles ---

/// Namespaced set of rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<PolicyRule>,
}

impl Role {
    pub fn new(metadata: ObjectMeta) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: "Role".to_string(),
            metadata,
            rules: Vec::new(),
        }
    }
}

/// Cluster-scoped set of rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRole {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<PolicyRule>,
}

impl ClusterRole {
    pub fn new(metadata: ObjectMeta) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: "ClusterRole".to_string(),
            metadata,
            rules: Vec::new(),
        }
    }
}

// --- Bindings ---

/// Reference from a binding to the role it grants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRef {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_group: String,
    pub kind: String,
    pub name: String,
}

/// Grants a Role (or ClusterRole) to subjects within one namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleBinding {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub role_ref: RoleRef,
}

impl RoleBinding {
    pub fn new(metadata: ObjectMeta, role_ref: RoleRef, subjects: Vec<Subject>) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: "RoleBinding".to_string(),
            metadata,
            subjects,
            role_ref,
        }
    }
}

/// Grants a ClusterRole to subjects across all namespaces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRoleBinding {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub role_ref: RoleRef,
}

impl ClusterRoleBinding {
    pub fn new(metadata: ObjectMeta, role_ref: RoleRef, subjects: Vec<Subject>) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: "ClusterRoleBinding".to_string(),
            metadata,
            subjects,
            role_ref,
        }
    }
}

// --- Object collections ---

/// The four RBAC object lists, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RbacObjects {
    pub roles: Vec<Role>,
    pub role_bindings: Vec<RoleBinding>,
    pub cluster_roles: Vec<ClusterRole>,
    pub cluster_role_bindings: Vec<ClusterRoleBinding>,
}

impl RbacObjects {
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
            && self.role_bindings.is_empty()
            && self.cluster_roles.is_empty()
            && self.cluster_role_bindings.is_empty()
    }

    /// Fold another set of objects into this one, preserving order.
    pub fn extend(&mut self, other: RbacObjects) {
        self.roles.extend(other.roles);
        self.role_bindings.extend(other.role_bindings);
        self.cluster_roles.extend(other.cluster_roles);
        self.cluster_role_bindings.extend(other.cluster_role_bindings);
    }
}
