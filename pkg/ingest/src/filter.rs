use pkg_types::attributes::AttributesRecord;
use pkg_types::audit::Event;

/// Keep events whose effective user (impersonated user when present,
/// authenticated user otherwise) matches `username`. A non-empty `namespace`
/// additionally limits events to that namespace's objects.
pub fn filter_events(events: Vec<Event>, username: &str, namespace: &str) -> Vec<Event> {
    events
        .into_iter()
        .filter(|event| event.effective_user().username == username)
        .filter(|event| {
            namespace.is_empty()
                || event
                    .object_ref
                    .as_ref()
                    .is_some_and(|obj| obj.namespace == namespace)
        })
        .collect()
}

/// Convert filtered events into the attribute records the generator consumes.
pub fn events_to_attributes(events: &[Event]) -> Vec<AttributesRecord> {
    events.iter().map(AttributesRecord::from_event).collect()
}
