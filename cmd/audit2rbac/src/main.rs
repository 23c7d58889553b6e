use std::collections::BTreeMap;
use std::io::Write;

use anyhow::{Context, Result, bail};
use clap::Parser;
use pkg_generate::{GenerateOptions, Generator};
use pkg_ingest::{
    decode_documents, events_from_documents, events_to_attributes, filter_events,
    flatten_documents, open_sources, rbac_from_documents,
};
use pkg_types::audit::Event;
use pkg_types::rbac::{
    ClusterRole, ClusterRoleBinding, ObjectMeta, PolicyRule, RbacObjects, RoleRef, Subject,
    GROUP_NAME,
};
use pkg_types::serviceaccount;
use pkg_types::validate::{sanitize_label, sanitize_name};
use serde::Serialize;
use tracing::{info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(
    name = "audit2rbac",
    about = "Generate RBAC roles and bindings covering the API requests in a Kubernetes audit log",
    disable_version_flag = true
)]
struct Cli {
    /// File, URL, or - for STDIN to read audit events from
    #[arg(long = "filename", short = 'f')]
    filenames: Vec<String>,

    /// User to filter audit events to and generate role bindings for
    #[arg(long)]
    user: Option<String>,

    /// Service account to filter audit events to and generate role bindings
    /// for, in format <namespace>:<name>
    #[arg(long)]
    serviceaccount: Option<String>,

    /// Namespace to filter audit events to
    #[arg(long, short = 'n', default_value = "")]
    namespace: String,

    /// File or URL to read existing RBAC objects from, merged with the
    /// built-in discovery roles when checking which requests are already
    /// allowed
    #[arg(long = "rbac-file")]
    rbac_files: Vec<String>,

    /// Allow identical operations performed in more than one namespace to be
    /// performed in any namespace
    #[arg(long = "expand-multi-namespace", default_value_t = true, action = clap::ArgAction::Set)]
    expand_multi_namespace: bool,

    /// Allow identical operations performed on more than one resource name
    /// (e.g. 'get pods pod1' and 'get pods pod2') to be allowed on any name
    #[arg(long = "expand-multi-name", default_value_t = true, action = clap::ArgAction::Set)]
    expand_multi_name: bool,

    /// Name to use for generated objects
    #[arg(long = "generate-name", default_value = "audit2rbac:${user}")]
    generate_name: String,

    /// Labels to add to generated objects
    #[arg(long = "generate-labels", default_values_t = [
        "audit2rbac.dev/user=${user}".to_string(),
        "audit2rbac.dev/generated=true".to_string(),
    ])]
    generate_labels: Vec<String>,

    /// Annotations to add to generated objects
    #[arg(long = "generate-annotations", default_values_t = [
        "audit2rbac.dev/version=${version}".to_string(),
    ])]
    generate_annotations: Vec<String>,

    /// The output format to use (yaml|json)
    #[arg(long = "output-format", short = 'o', default_value = "yaml")]
    output_format: String,

    /// Display version
    #[arg(long)]
    version: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.version {
        println!("audit2rbac version {VERSION}");
        return Ok(());
    }

    let user = resolve_user(&cli)?;
    validate(&cli)?;

    let user_agent = format!("audit2rbac/{VERSION}");
    let mut had_errors = false;

    info!(sources = cli.filenames.len(), "opening audit sources");
    let (sources, errors) = open_sources(&cli.filenames, &user_agent).await;
    had_errors |= report_errors(&errors);

    let mut events: Vec<Event> = Vec::new();
    for source in &sources {
        let (documents, errors) = decode_documents(&source.content);
        had_errors |= report_errors(&errors);

        let documents = flatten_documents(documents);
        let (mut decoded, errors) = events_from_documents(&documents);
        had_errors |= report_errors(&errors);
        events.append(&mut decoded);
    }

    let events = filter_events(events, &user, &cli.namespace);
    let attributes = events_to_attributes(&events);
    if attributes.is_empty() {
        if cli.namespace.is_empty() {
            bail!("no audit events matched user {}", user);
        }
        bail!(
            "no audit events matched user {} in namespace {}",
            user,
            cli.namespace
        );
    }

    let mut existing = discovery_roles();
    if !cli.rbac_files.is_empty() {
        let (sources, errors) = open_sources(&cli.rbac_files, &user_agent).await;
        had_errors |= report_errors(&errors);
        for source in &sources {
            let (documents, errors) = decode_documents(&source.content);
            had_errors |= report_errors(&errors);

            let documents = flatten_documents(documents);
            let (objects, errors) = rbac_from_documents(&documents);
            had_errors |= report_errors(&errors);
            existing.extend(objects);
        }
    }

    info!(requests = attributes.len(), user = %user, "generating roles");
    let options = GenerateOptions {
        expand_multiple_namespaces_to_cluster_scoped: cli.expand_multi_namespace,
        expand_multiple_names_to_unnamed: cli.expand_multi_name,
        name: substitute(
            &cli.generate_name,
            &sanitize_name(&user),
            &sanitize_name(VERSION),
        ),
        labels: template_map(&cli.generate_labels, &sanitize_label(&user), &sanitize_label(VERSION)),
        annotations: template_map(&cli.generate_annotations, &user, VERSION),
        ..Default::default()
    };

    let generated = Generator::new(existing, attributes, options).generate()?;
    write_objects(&generated, &cli.output_format)?;

    info!("complete");
    if had_errors {
        bail!("errors occurred reading audit events");
    }
    Ok(())
}

fn resolve_user(cli: &Cli) -> Result<String> {
    match (&cli.user, &cli.serviceaccount) {
        (Some(_), Some(_)) => bail!("cannot set both user and service account"),
        (Some(user), None) => Ok(user.clone()),
        (None, Some(sa)) => {
            let (namespace, name) = sa
                .split_once(':')
                .context("service account must be in the format <namespace>:<name>")?;
            if namespace.is_empty() || name.is_empty() || name.contains(':') {
                bail!("service account must be in the format <namespace>:<name>");
            }
            Ok(serviceaccount::make_username(namespace, name))
        }
        (None, None) => bail!("--user or --serviceaccount is required"),
    }
}

fn validate(cli: &Cli) -> Result<()> {
    if cli.filenames.is_empty() {
        bail!("--filename is required");
    }
    if cli.output_format != "yaml" && cli.output_format != "json" {
        bail!("--output-format must be one of (yaml|json)");
    }
    Ok(())
}

fn report_errors(errors: &[anyhow::Error]) -> bool {
    for error in errors {
        warn!("{error:#}");
    }
    !errors.is_empty()
}

fn substitute(template: &str, user: &str, version: &str) -> String {
    template
        .replace("${user}", user)
        .replace("${version}", version)
}

/// Parse `key=value` entries into a map, applying `${user}`/`${version}`
/// substitution. An entry without `=` maps to an empty value.
fn template_map(entries: &[String], user: &str, version: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for entry in entries {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let entry = substitute(entry, user, version);
        match entry.split_once('=') {
            Some((key, value)) => map.insert(key.to_string(), value.to_string()),
            None => map.insert(entry, String::new()),
        };
    }
    map
}

/// The discovery permissions every authenticated identity holds, so audit
/// entries for API discovery never produce generated rules.
fn discovery_roles() -> RbacObjects {
    let mut role = ClusterRole::new(ObjectMeta {
        name: "system:discovery".to_string(),
        ..Default::default()
    });
    role.rules.push(PolicyRule::non_resource_rule(
        &["get"],
        &["/healthz", "/version", "/swagger*", "/openapi*", "/api*"],
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
            vec![
                Subject::group("system:authenticated"),
                Subject::group("system:unauthenticated"),
            ],
        )],
        ..Default::default()
    }
}

fn write_objects(objects: &RbacObjects, format: &str) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut printed = 0usize;

    for role in &objects.roles {
        write_object(&mut out, role, format, &mut printed)?;
    }
    for role in &objects.cluster_roles {
        write_object(&mut out, role, format, &mut printed)?;
    }
    for binding in &objects.role_bindings {
        write_object(&mut out, binding, format, &mut printed)?;
    }
    for binding in &objects.cluster_role_bindings {
        write_object(&mut out, binding, format, &mut printed)?;
    }

    Ok(())
}

fn write_object<W: Write, T: Serialize>(
    out: &mut W,
    obj: &T,
    format: &str,
    printed: &mut usize,
) -> Result<()> {
    if *printed > 0 {
        if format == "yaml" {
            writeln!(out, "---")?;
        } else {
            writeln!(out)?;
        }
    }
    if format == "yaml" {
        out.write_all(serde_yaml::to_string(obj)?.as_bytes())?;
    } else {
        serde_json::to_writer_pretty(&mut *out, obj)?;
        writeln!(out)?;
    }
    *printed += 1;
    Ok(())
}
