use serde::{Deserialize, Serialize};

use crate::audit::{Event, UserInfo};

/// One observed API call, in the shape the authorizer evaluates.
///
/// `resource_request` distinguishes resource API calls (addressed by
/// group/resource/namespace/name) from non-resource URL calls (addressed by
/// `path`). Empty `namespace` means cluster scope; empty `name` means the
/// request was not for a single named object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributesRecord {
    pub user: UserInfo,
    pub verb: String,

    pub namespace: String,
    pub api_group: String,
    pub api_version: String,
    pub resource: String,
    pub subresource: String,
    pub name: String,

    pub resource_request: bool,
    pub path: String,
}

impl AttributesRecord {
    /// Convert an audit event into the attributes the authorizer checks.
    /// Events without an `objectRef` are non-resource URL requests.
    pub fn from_event(event: &Event) -> Self {
        let mut attrs = AttributesRecord {
            user: event.effective_user().clone(),
            verb: event.verb.clone(),
            path: event.request_uri.clone(),
            ..Default::default()
        };

        if let Some(obj) = &event.object_ref {
            attrs.resource_request = true;
            attrs.namespace = obj.namespace.clone();
            attrs.name = obj.name.clone();
            attrs.resource = obj.resource.clone();
            attrs.subresource = obj.subresource.clone();
            attrs.api_group = obj.api_group.clone();
            attrs.api_version = obj.api_version.clone();
        }

        attrs
    }

    /// The resource as it appears in rules: "pods" or "pods/status".
    pub fn combined_resource(&self) -> String {
        if self.subresource.is_empty() {
            self.resource.clone()
        } else {
            format!("{}/{}", self.resource, self.subresource)
        }
    }
}
