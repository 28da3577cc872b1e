//! `eris ls`

use std::{fmt::Write, str::FromStr};

use serde::Serialize;
use tracing::debug;

use crate::{
    inspect::formulate_ports,
    naming::{
        eris_label_filter, ContainerType, LABEL_ERIS, LABEL_NUMBER, LABEL_SHORT_NAME, LABEL_TYPE,
    },
    runtime::{ContainerInfo, ContainerRuntime},
    ErisError, Result,
};

const STANDARD_HEADER: &[&str] = &["ON", "CONTAINER ID", "DATA CONTAINER"];
const EXTENDED_HEADER: &[&str] = &[
    "ON",
    "CONTAINER ID",
    "DATA CONTAINER",
    "IMAGE",
    "COMMAND",
    "PORTS",
];
const DATA_HEADER: &[&str] = &["ON", "CONTAINER ID"];

/// Column layout of the tables
pub const MIN_WIDTH: usize = 6;
pub const PADDING: usize = 5;

/// An eris container together with what its labels say about it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerDetails {
    pub short_name: String,
    pub full_name: String,
    #[serde(rename = "type")]
    pub kind: ContainerType,
    pub number: u32,
    pub info: ContainerInfo,
}

impl ContainerDetails {
    /// `None` for containers that are not labeled as eris containers
    pub fn from_info(info: ContainerInfo) -> Option<Self> {
        if info.label(LABEL_ERIS) != Some("true") {
            return None
        }
        let kind = ContainerType::parse(info.label(LABEL_TYPE)?)?;
        Some(Self {
            short_name: info.label(LABEL_SHORT_NAME).unwrap_or_default().to_owned(),
            full_name: info.name.clone(),
            kind,
            number: info
                .label(LABEL_NUMBER)
                .and_then(|n| n.parse().ok())
                .unwrap_or(1),
            info,
        })
    }
}

/// Collects the eris containers. With `running` set, stopped service and
/// chain containers are left out (data containers never run, so they are
/// kept).
pub async fn eris_containers<R: ContainerRuntime>(
    runtime: &R,
    running: bool,
) -> Result<Vec<ContainerDetails>> {
    let mut details: Vec<ContainerDetails> = runtime
        .list_containers(true, &[eris_label_filter()])
        .await?
        .into_iter()
        .filter_map(ContainerDetails::from_info)
        .filter(|d| !running || d.info.running || d.kind == ContainerType::Data)
        .collect();
    details.sort_by(|a, b| {
        (a.kind, &a.short_name, a.number).cmp(&(b.kind, &b.short_name, b.number))
    });
    debug!(count = details.len(), "collected eris containers");
    Ok(details)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListType {
    Service,
    Chain,
    Data,
    All,
}

impl FromStr for ListType {
    type Err = ErisError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(ListType::All),
            s => ContainerType::parse(s)
                .map(|kind| match kind {
                    ContainerType::Service => ListType::Service,
                    ContainerType::Chain => ListType::Chain,
                    ContainerType::Data => ListType::Data,
                })
                .ok_or_else(|| {
                    ErisError::InvalidArgument(format!(
                        "don't know the type {s:?} to list containers for"
                    ))
                }),
        }
    }
}

impl ListType {
    fn includes(self, kind: ContainerType) -> bool {
        match self {
            ListType::Service => kind == ContainerType::Service,
            ListType::Chain => kind == ContainerType::Chain,
            ListType::Data => kind == ContainerType::Data,
            ListType::All => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListFormat {
    Standard,
    Extended,
    Json,
    /// `{{.Field}}` placeholders, `\t` and `\n` escapes
    Custom(String),
}

impl FromStr for ListFormat {
    type Err = ErisError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "" | "standard" => ListFormat::Standard,
            "extended" => ListFormat::Extended,
            "json" => ListFormat::Json,
            custom => ListFormat::Custom(custom.to_owned()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Row {
    Standard,
    Extended,
    Data,
}

fn short_id(id: &str) -> &str {
    id.get(..10).unwrap_or(id)
}

fn on(running: bool) -> &'static str {
    if running {
        "*"
    } else {
        "-"
    }
}

/// The id of the data container sharing `short_name`, or empty
fn dependent<'a>(all: &'a [ContainerDetails], short_name: &str) -> &'a str {
    all.iter()
        .find(|d| d.kind == ContainerType::Data && d.short_name == short_name)
        .map_or("", |d| d.info.id.as_str())
}

/// If a chain or a service uses the name of this data container
fn has_master(all: &[ContainerDetails], short_name: &str) -> bool {
    all.iter()
        .any(|d| d.kind != ContainerType::Data && d.short_name == short_name)
}

/// Looks up a template field. Names are matched ignoring case and
/// underscores, the `Info.Config.` / `Info.State.` paths of the JSON document
/// work as well.
pub fn field_value(all: &[ContainerDetails], d: &ContainerDetails, field: &str) -> Result<String> {
    let normalized: String = field
        .chars()
        .filter(|c| *c != '_')
        .collect::<String>()
        .to_lowercase();
    Ok(match normalized.as_str() {
        "shortname" => d.short_name.clone(),
        "fullname" | "name" | "info.name" => d.full_name.clone(),
        "type" => d.kind.to_string(),
        "number" => d.number.to_string(),
        "id" | "info.id" => d.info.id.clone(),
        "shortid" => short_id(&d.info.id).to_owned(),
        "image" | "info.image" | "info.config.image" => d.info.image.clone(),
        "command" | "cmd" | "info.config.cmd" => d.info.command_line(),
        "running" | "info.running" | "info.state.running" => d.info.running.to_string(),
        "on" => on(d.info.running).to_owned(),
        "status" | "info.status" | "info.state.status" => d.info.status.clone(),
        "ports" => formulate_ports(&d.info),
        "data" | "datacontainer" => short_id(dependent(all, &d.short_name)).to_owned(),
        _ => return Err(ErisError::not_found(format!("listing field {field:?}"))),
    })
}

/// Renders one container through a custom template
pub fn render_template(
    all: &[ContainerDetails],
    d: &ContainerDetails,
    template: &str,
) -> Result<String> {
    let template = template.replace(r"\t", "\t").replace(r"\n", "\n");
    let mut out = String::new();
    let mut rest = template.as_str();
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| {
            ErisError::InvalidArgument(format!("unclosed `{{{{` in template {template:?}"))
        })?;
        let field = after[..end].trim();
        let field = field.strip_prefix('.').ok_or_else(|| {
            ErisError::InvalidArgument(format!("template field {field:?} must start with `.`"))
        })?;
        out.push_str(&field_value(all, d, field)?);
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn row(all: &[ContainerDetails], d: &ContainerDetails, row: Row) -> String {
    let mut cells = vec![
        d.short_name.clone(),
        on(d.info.running).to_owned(),
        short_id(&d.info.id).to_owned(),
    ];
    if row != Row::Data {
        cells.push(short_id(dependent(all, &d.short_name)).to_owned());
    }
    if row == Row::Extended {
        cells.push(d.info.image.clone());
        cells.push(d.info.command_line());
        cells.push(formulate_ports(&d.info));
    }
    cells.join("\t")
}

/// Lays out tab separated cells in columns. Each column is as wide as its
/// widest cell plus `padding`, but at least `min_width`. The last cell of a
/// line does not count towards a column.
pub fn align_columns(text: &str, min_width: usize, padding: usize) -> String {
    let lines: Vec<Vec<&str>> = text.lines().map(|l| l.split('\t').collect()).collect();
    let mut widths: Vec<usize> = vec![];
    for cells in &lines {
        for (i, cell) in cells.iter().enumerate().take(cells.len().saturating_sub(1)) {
            let w = cell.chars().count();
            if widths.len() <= i {
                widths.push(0);
            }
            widths[i] = widths[i].max(w);
        }
    }
    let mut out = String::new();
    for cells in &lines {
        let mut line = String::new();
        for (i, cell) in cells.iter().enumerate() {
            if i + 1 == cells.len() {
                line.push_str(cell);
            } else {
                let width = (widths[i] + padding).max(min_width);
                let _ = write!(line, "{cell:<width$}");
            }
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

enum Layout<'a> {
    Table(&'a [&'a str], Row),
    Custom(&'a str),
}

fn section(
    out: &mut String,
    all: &[ContainerDetails],
    kind: ContainerType,
    layout: &Layout,
    orphans_only: bool,
) -> Result<()> {
    if let Layout::Table(header, _) = layout {
        out.push_str(&kind.as_str().to_uppercase());
        for h in *header {
            out.push('\t');
            out.push_str(h);
        }
        out.push('\n');
    }
    for d in all.iter().filter(|d| d.kind == kind) {
        if orphans_only && has_master(all, &d.short_name) {
            continue
        }
        match layout {
            Layout::Table(_, layout) => out.push_str(&row(all, d, *layout)),
            Layout::Custom(template) => out.push_str(&render_template(all, d, template)?),
        }
        out.push('\n');
    }
    if matches!(layout, Layout::Table(..)) {
        out.push('\n');
    }
    Ok(())
}

/// Renders `details` (the result of [eris_containers])
pub fn render(details: &[ContainerDetails], t: ListType, format: &ListFormat) -> Result<String> {
    let table_row = match format {
        ListFormat::Json => {
            let selected: Vec<&ContainerDetails> =
                details.iter().filter(|d| t.includes(d.kind)).collect();
            let mut out = serde_json::to_string_pretty(&selected)
                .map_err(|e| ErisError::InvalidArgument(format!("rendering JSON: {e}")))?;
            out.push('\n');
            return Ok(out)
        }
        ListFormat::Standard => Row::Standard,
        ListFormat::Extended => Row::Extended,
        ListFormat::Custom(_) => Row::Standard,
    };

    let kinds: &[ContainerType] = match t {
        ListType::Service => &[ContainerType::Service],
        ListType::Chain => &[ContainerType::Chain],
        ListType::Data => &[ContainerType::Data],
        ListType::All => &[ContainerType::Service, ContainerType::Chain, ContainerType::Data],
    };

    let mut out = String::new();
    for &kind in kinds {
        if let ListFormat::Custom(template) = format {
            section(&mut out, details, kind, &Layout::Custom(template), false)?;
            continue
        }
        let layout = match (kind, table_row) {
            (ContainerType::Data, _) => Layout::Table(DATA_HEADER, Row::Data),
            (_, Row::Extended) => Layout::Table(EXTENDED_HEADER, Row::Extended),
            _ => Layout::Table(STANDARD_HEADER, Row::Standard),
        };
        // in the combined listing only data containers nobody uses get their
        // own section, which is skipped if there are none
        let orphans_only = t == ListType::All && kind == ContainerType::Data;
        if orphans_only
            && details
                .iter()
                .filter(|d| d.kind == ContainerType::Data)
                .all(|d| has_master(details, &d.short_name))
        {
            continue
        }
        section(&mut out, details, kind, &layout, orphans_only)?;
    }

    Ok(match format {
        ListFormat::Custom(_) => out,
        _ => align_columns(&out, MIN_WIDTH, PADDING),
    })
}

/// `eris ls`
pub async fn list_containers<R: ContainerRuntime>(
    runtime: &R,
    t: ListType,
    format: &ListFormat,
    running: bool,
) -> Result<String> {
    debug!(?format, ?t, "listing containers");
    let details = eris_containers(runtime, running).await?;
    render(&details, t, format)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{
        naming::{container_name, labels},
        runtime::HostBinding,
    };

    fn details(kind: ContainerType, name: &str, id: &str, running: bool) -> ContainerDetails {
        let info = ContainerInfo {
            id: id.to_owned(),
            name: container_name(kind, name, 1),
            image: format!("quay.io/eris/{name}"),
            labels: labels(kind, name, 1),
            running,
            cmd: vec!["run".to_owned()],
            ..Default::default()
        };
        ContainerDetails::from_info(info).unwrap()
    }

    fn fixture() -> Vec<ContainerDetails> {
        vec![
            details(ContainerType::Service, "ipfs", "aaaaaaaaaaaaaaaa", true),
            details(ContainerType::Chain, "simplechain", "bbbbbbbbbbbbbbbb", false),
            details(ContainerType::Data, "ipfs", "cccccccccccccccc", false),
            details(ContainerType::Data, "orphan", "dddddddddddddddd", false),
        ]
    }

    #[test]
    fn details_from_labels() {
        assert!(ContainerDetails::from_info(ContainerInfo::default()).is_none());
        let d = details(ContainerType::Chain, "test", "x", true);
        assert_eq!(d.short_name, "test");
        assert_eq!(d.full_name, "eris_test_chn");
        assert_eq!(d.kind, ContainerType::Chain);
        assert_eq!(d.number, 1);
    }

    #[test]
    fn standard_all() {
        let out = render(&fixture(), ListType::All, &ListFormat::Standard).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        // the widest first column cell is "simplechain"
        assert_eq!(
            lines[0],
            format!("{:<16}{:<7}{:<17}{}", "SERVICE", "ON", "CONTAINER ID", "DATA CONTAINER")
        );
        assert_eq!(
            lines[1],
            format!("{:<16}{:<7}{:<17}{}", "ipfs", "*", "aaaaaaaaaa", "cccccccccc")
        );
        assert!(out.contains("simplechain"));
        // only the orphan shows up in the data section
        assert!(out.contains("orphan"));
        assert_eq!(out.lines().filter(|l| l.starts_with("ipfs")).count(), 1);
    }

    #[test]
    fn data_section_skipped_without_orphans() {
        let mut f = fixture();
        f.pop();
        let out = render(&f, ListType::All, &ListFormat::Standard).unwrap();
        assert!(!out.contains("DATA "));
        let out = render(&f, ListType::Data, &ListFormat::Standard).unwrap();
        assert!(out.starts_with("DATA"));
        assert!(out.contains("ipfs"));
    }

    #[test]
    fn extended_has_ports() {
        let mut f = fixture();
        f[0].info.port_bindings = BTreeMap::from([(
            "4001/tcp".to_owned(),
            vec![HostBinding {
                host_ip: "0.0.0.0".to_owned(),
                host_port: "4001".to_owned(),
            }],
        )]);
        let out = render(&f, ListType::Service, &ListFormat::Extended).unwrap();
        assert!(out.starts_with("SERVICE"));
        assert!(out.contains("IMAGE"));
        assert!(out.contains("0.0.0.0:4001->4001/tcp"));
    }

    #[test]
    fn custom_templates() {
        let f = fixture();
        let out = render(
            &f,
            ListType::Service,
            &ListFormat::Custom(r"{{.ShortName}}\t{{ .Info.Config.Image }}".to_owned()),
        )
        .unwrap();
        assert_eq!(out, "ipfs\tquay.io/eris/ipfs\n");

        let out = render(&f, ListType::All, &ListFormat::Custom("{{.Type}}".to_owned())).unwrap();
        assert_eq!(out, "service\nchain\ndata\ndata\n");

        let err =
            render(&f, ListType::All, &ListFormat::Custom("{{.Nope}}".to_owned())).unwrap_err();
        assert!(err.is_not_found());
        assert!(render(&f, ListType::All, &ListFormat::Custom("{{.Type".to_owned())).is_err());
    }

    #[test]
    fn json() {
        let out = render(&fixture(), ListType::Chain, &ListFormat::Json).unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v.as_array().unwrap().len(), 1);
        assert_eq!(v[0]["short_name"], "simplechain");
        assert_eq!(v[0]["type"], "chain");
    }

    #[test]
    fn parse_type() {
        assert_eq!("all".parse::<ListType>().unwrap(), ListType::All);
        assert!(matches!(
            "nope".parse::<ListType>(),
            Err(ErisError::InvalidArgument(_))
        ));
    }

    #[test]
    fn alignment() {
        assert_eq!(align_columns("a\tbb\tc\nccc\td\n", 6, 5), "a       bb     c\nccc     d\n");
    }

    #[tokio::test]
    async fn running_filter_keeps_data() {
        use crate::runtime::{mock::MockRuntime, ContainerCreateOptions};

        let rt = MockRuntime::new();
        for (kind, name) in [
            (ContainerType::Service, "ipfs"),
            (ContainerType::Data, "ipfs"),
        ] {
            rt.create_container(&ContainerCreateOptions {
                name: container_name(kind, name, 1),
                labels: labels(kind, name, 1),
                ..Default::default()
            })
            .await
            .unwrap();
        }
        assert_eq!(eris_containers(&rt, false).await.unwrap().len(), 2);
        let running = eris_containers(&rt, true).await.unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].kind, ContainerType::Data);
    }
}
