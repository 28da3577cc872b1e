//! `eris inspect` and `eris ports`

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::{
    naming::{container_name, ContainerType, LABEL_SHORT_NAME},
    runtime::{ContainerInfo, ContainerRuntime, HostBinding},
    ErisError, Result,
};

/// A field rendered as a line, a list of lines, or `key->value` lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Scalar(String),
    List(Vec<String>),
    Map(Vec<(String, String)>),
}

type Accessor = fn(&ContainerInfo) -> FieldValue;

fn scalar(s: &str) -> FieldValue {
    FieldValue::Scalar(s.to_owned())
}

/// Every field that can be inspected, by its display name
pub const FIELDS: &[(&str, Accessor)] = &[
    ("ID", |c| scalar(&c.id)),
    ("Name", |c| scalar(&c.name)),
    ("Created", |c| scalar(&c.created)),
    ("Path", |c| scalar(&c.path)),
    ("Args", |c| FieldValue::List(c.args.clone())),
    ("State.Running", |c| FieldValue::Scalar(c.running.to_string())),
    ("State.Status", |c| scalar(&c.status)),
    ("Config.Hostname", |c| scalar(&c.hostname)),
    ("Config.User", |c| scalar(&c.user)),
    ("Config.Env", |c| FieldValue::List(c.env.clone())),
    ("Config.Cmd", |c| FieldValue::List(c.cmd.clone())),
    ("Config.Entrypoint", |c| FieldValue::List(c.entrypoint.clone())),
    ("Config.Image", |c| scalar(&c.image)),
    ("Config.WorkingDir", |c| scalar(&c.working_dir)),
    ("Config.Labels", |c| {
        FieldValue::Map(c.labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }),
    ("Config.ExposedPorts", |c| FieldValue::List(c.exposed_ports.clone())),
    ("HostConfig.VolumesFrom", |c| FieldValue::List(c.volumes_from.clone())),
    ("NetworkSettings.IPAddress", |c| scalar(&c.ip_address)),
    ("NetworkSettings.Ports", |c| {
        FieldValue::Map(
            c.port_bindings
                .iter()
                .map(|(port, bindings)| {
                    let bindings: Vec<String> = bindings
                        .iter()
                        .map(|b| format!("{}:{}", b.host_ip, b.host_port))
                        .collect();
                    (port.clone(), bindings.join(","))
                })
                .collect(),
        )
    }),
    ("Mounts", |c| {
        FieldValue::Map(
            c.mounts
                .iter()
                .map(|m| (m.source.clone(), m.destination.clone()))
                .collect(),
        )
    }),
];

fn normalize(field: &str) -> String {
    field
        .chars()
        .filter(|c| *c != '_')
        .collect::<String>()
        .to_lowercase()
}

/// Looks up a field by dotted name, ignoring case and underscores, so that
/// `config.image`, `Config.Image` and `network_settings.ip_address` work
pub fn lookup_field(info: &ContainerInfo, field: &str) -> Result<FieldValue> {
    let wanted = normalize(field);
    FIELDS
        .iter()
        .find(|(name, _)| normalize(name) == wanted)
        .map(|(_, accessor)| accessor(info))
        .ok_or_else(|| ErisError::not_found(format!("inspection field {field:?}")))
}

/// The `short name, running, full name, ports` summary
pub fn line_parts(info: &ContainerInfo) -> [String; 4] {
    [
        info.label(LABEL_SHORT_NAME).unwrap_or(&info.name).to_owned(),
        if info.running { "Yes" } else { "No" }.to_owned(),
        info.name.clone(),
        formulate_ports(info),
    ]
}

/// `line`, `all`, or a single field
pub fn inspection_report(info: &ContainerInfo, field: &str) -> Result<String> {
    let mut out = String::new();
    match field {
        "line" => {
            out.push_str(&line_parts(info).join(" "));
            out.push('\n');
        }
        "all" => {
            for (name, accessor) in FIELDS {
                let label = format!("{name}:");
                match accessor(info) {
                    FieldValue::Scalar(v) => out.push_str(&format!("{label:<20}{v}\n")),
                    FieldValue::List(items) => {
                        out.push_str(&format!("{label:<20}\n"));
                        for item in items {
                            out.push_str(&format!("{:20}{item}\n", ""));
                        }
                    }
                    FieldValue::Map(entries) => {
                        out.push_str(&format!("{label:<20}\n"));
                        for (k, v) in entries {
                            out.push_str(&format!("{:20}{k}->{v}\n", ""));
                        }
                    }
                }
            }
        }
        field => {
            debug!(field, "inspecting field");
            match lookup_field(info, field)? {
                FieldValue::Scalar(v) => {
                    out.push_str(&v);
                    out.push('\n');
                }
                FieldValue::List(items) => {
                    for item in items {
                        out.push_str(&item);
                        out.push('\n');
                    }
                }
                FieldValue::Map(entries) => {
                    for (k, v) in entries {
                        out.push_str(&format!("{k}->{v}\n"));
                    }
                }
            }
        }
    }
    Ok(out)
}

/// Formats host bindings for `requested` ports (all ports if empty). A bare
/// port matches both `/tcp` and `/udp`. With exactly one requested port only
/// `ip:port` is shown, otherwise `port->ip:port`.
pub fn port_mappings(
    bindings: &BTreeMap<String, Vec<HostBinding>>,
    requested: &[String],
) -> String {
    let minimal = requested.len() == 1;
    let ports: Vec<String> = if requested.is_empty() {
        bindings.keys().cloned().collect()
    } else {
        requested
            .iter()
            .flat_map(|p| {
                if p.ends_with("/tcp") || p.ends_with("/udp") {
                    vec![p.clone()]
                } else {
                    vec![format!("{p}/tcp"), format!("{p}/udp")]
                }
            })
            .collect()
    };

    let mut elements = vec![];
    for port in &ports {
        for b in bindings.get(port).into_iter().flatten() {
            let host = format!("{}:{}", b.host_ip, b.host_port);
            if minimal {
                elements.push(host);
            } else {
                elements.push(format!("{port}->{host}"));
            }
        }
    }
    elements.join(", ")
}

/// Published ports as `ip:host->port` and exposed ones as `port`, sorted
pub fn formulate_ports(info: &ContainerInfo) -> String {
    let keys: BTreeSet<&String> = info
        .exposed_ports
        .iter()
        .chain(info.port_bindings.keys())
        .collect();
    let mut ports: Vec<String> = keys
        .into_iter()
        .map(|port| match info.port_bindings.get(port).and_then(|b| b.first()) {
            Some(b) => format!("{}:{}->{port}", b.host_ip, b.host_port),
            None => port.clone(),
        })
        .collect();
    ports.sort();
    ports.join(", ")
}

/// Finds a container by its full name, or by a short name of a service, a
/// chain, or a data container (in that order)
pub async fn find_container<R: ContainerRuntime>(runtime: &R, name: &str) -> Result<ContainerInfo> {
    let candidates = [
        name.to_owned(),
        container_name(ContainerType::Service, name, 1),
        container_name(ContainerType::Chain, name, 1),
        container_name(ContainerType::Data, name, 1),
    ];
    for candidate in &candidates {
        if let Some(info) = runtime.inspect_container(candidate).await? {
            return Ok(info)
        }
    }
    Err(ErisError::not_found(format!("container {name:?}")))
}

/// `eris inspect`
pub async fn inspect<R: ContainerRuntime>(runtime: &R, name: &str, field: &str) -> Result<String> {
    let info = find_container(runtime, name).await?;
    inspection_report(&info, field)
}

/// `eris ports`
pub async fn ports<R: ContainerRuntime>(
    runtime: &R,
    name: &str,
    requested: &[String],
) -> Result<String> {
    let info = find_container(runtime, name).await?;
    Ok(port_mappings(&info.port_bindings, requested))
}
