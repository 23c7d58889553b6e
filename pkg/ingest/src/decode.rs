use anyhow::anyhow;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use pkg_types::audit::{Event, ACCEPTED_API_VERSIONS};
use pkg_types::rbac::{ClusterRole, ClusterRoleBinding, RbacObjects, Role, RoleBinding};

/// Parse a source buffer into loose JSON documents. Buffers starting with
/// `{` decode as a stream of JSON objects (one per line or concatenated);
/// anything else decodes as multi-document YAML. A malformed JSON stream
/// stops at the bad document; malformed YAML documents are skipped
/// individually.
pub fn decode_documents(content: &str) -> (Vec<Value>, Vec<anyhow::Error>) {
    let mut documents = Vec::new();
    let mut errors = Vec::new();

    if content.trim_start().starts_with('{') {
        for item in serde_json::Deserializer::from_str(content).into_iter::<Value>() {
            match item {
                Ok(value) => documents.push(value),
                Err(e) => {
                    errors.push(anyhow::Error::from(e).context("decoding json document"));
                    break;
                }
            }
        }
    } else {
        for doc in serde_yaml::Deserializer::from_str(content) {
            match Value::deserialize(doc) {
                Ok(Value::Null) => {} // empty document
                Ok(value) => documents.push(value),
                Err(e) => errors.push(anyhow::Error::from(e).context("decoding yaml document")),
            }
        }
    }

    (documents, errors)
}

/// Replace `List`/`EventList` wrapper documents with their items.
pub fn flatten_documents(documents: Vec<Value>) -> Vec<Value> {
    let mut flattened = Vec::new();
    for doc in documents {
        let kind = doc.get("kind").and_then(Value::as_str).unwrap_or("");
        if kind == "List" || kind == "EventList" {
            if let Some(items) = doc.get("items").and_then(Value::as_array) {
                flattened.extend(items.iter().cloned());
                continue;
            }
        }
        flattened.push(doc);
    }
    flattened
}

/// Narrow documents to audit events, accepting any of the audit.k8s.io
/// versions. Documents of other kinds produce collected errors.
pub fn events_from_documents(documents: &[Value]) -> (Vec<Event>, Vec<anyhow::Error>) {
    let mut events = Vec::new();
    let mut errors = Vec::new();

    for doc in documents {
        let api_version = doc.get("apiVersion").and_then(Value::as_str).unwrap_or("");
        let kind = doc.get("kind").and_then(Value::as_str).unwrap_or("");
        if kind != "Event" || !ACCEPTED_API_VERSIONS.contains(&api_version) {
            errors.push(anyhow!(
                "expected an audit.k8s.io Event, got {}/{}",
                if api_version.is_empty() { "<none>" } else { api_version },
                if kind.is_empty() { "<none>" } else { kind },
            ));
            continue;
        }
        match serde_json::from_value::<Event>(doc.clone()) {
            Ok(event) => events.push(event),
            Err(e) => errors.push(anyhow::Error::from(e).context("decoding audit event")),
        }
    }

    (events, errors)
}

/// Fold RBAC v1 documents into an object set. Non-RBAC kinds are ignored so
/// a full cluster dump can be passed as-is.
pub fn rbac_from_documents(documents: &[Value]) -> (RbacObjects, Vec<anyhow::Error>) {
    let mut objects = RbacObjects::default();
    let mut errors = Vec::new();

    for doc in documents {
        let kind = doc.get("kind").and_then(Value::as_str).unwrap_or("");
        let result = match kind {
            "Role" => serde_json::from_value::<Role>(doc.clone()).map(|o| objects.roles.push(o)),
            "RoleBinding" => {
                serde_json::from_value::<RoleBinding>(doc.clone()).map(|o| objects.role_bindings.push(o))
            }
            "ClusterRole" => {
                serde_json::from_value::<ClusterRole>(doc.clone()).map(|o| objects.cluster_roles.push(o))
            }
            "ClusterRoleBinding" => serde_json::from_value::<ClusterRoleBinding>(doc.clone())
                .map(|o| objects.cluster_role_bindings.push(o)),
            other => {
                debug!(kind = other, "ignoring non-rbac document");
                continue;
            }
        };
        if let Err(e) = result {
            errors.push(anyhow::Error::from(e).context(format!("decoding {kind}")));
        }
    }

    (objects, errors)
}
