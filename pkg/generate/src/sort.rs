use std::cmp::Ordering;

use pkg_types::attributes::AttributesRecord;

/// Order requests so broader ones are processed first: non-resource before
/// resource, cluster-scoped before namespaced, unnamed before named, then
/// lexicographic on the resource tuple with `list` ahead of `get`. Processing
/// a `list` first means its verb expansion already covers the `get`s that
/// follow on the same resource.
pub fn sort_requests(requests: &mut [AttributesRecord]) {
    requests.sort_by(compare_requests);
}

fn compare_requests(a: &AttributesRecord, b: &AttributesRecord) -> Ordering {
    // non-resource < resource
    if a.resource_request != b.resource_request {
        return if a.resource_request {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }

    if !a.resource_request {
        return a.verb.cmp(&b.verb).then_with(|| a.path.cmp(&b.path));
    }

    // cluster-scoped < namespaced, unnamed < named
    let a_namespaced = !a.namespace.is_empty();
    let b_namespaced = !b.namespace.is_empty();
    let a_named = !a.name.is_empty();
    let b_named = !b.name.is_empty();

    a_namespaced
        .cmp(&b_namespaced)
        .then_with(|| a_named.cmp(&b_named))
        .then_with(|| a.api_group.cmp(&b.api_group))
        .then_with(|| a.resource.cmp(&b.resource))
        .then_with(|| a.subresource.cmp(&b.subresource))
        .then_with(|| a.namespace.cmp(&b.namespace))
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| verb_sort_key(&a.verb).cmp(&verb_sort_key(&b.verb)))
}

// `get` sorts directly after `list` instead of lexicographically, so that on
// a given resource tuple the list (whose expansion covers get) comes first.
fn verb_sort_key(verb: &str) -> (&str, u8) {
    match verb {
        "list" => ("list", 0),
        "get" => ("list", 1),
        _ => (verb, 0),
    }
}
