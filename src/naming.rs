use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const LABEL_ERIS: &str = "ERIS";
pub const LABEL_SHORT_NAME: &str = "NAME";
pub const LABEL_TYPE: &str = "TYPE";
pub const LABEL_NUMBER: &str = "NUMBER";

/// Substituted for blank names so that derived container names are never empty
pub const FALLBACK_NAME: &str = "eris";

/// What kind of entity a container materializes
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerType {
    Service,
    Chain,
    Data,
}

impl ContainerType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContainerType::Service => "service",
            ContainerType::Chain => "chain",
            ContainerType::Data => "data",
        }
    }

    /// The suffix used in container names
    fn suffix(self) -> &'static str {
        match self {
            ContainerType::Service => "srv",
            ContainerType::Chain => "chn",
            ContainerType::Data => "data",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "service" => Some(ContainerType::Service),
            "chain" => Some(ContainerType::Chain),
            "data" => Some(ContainerType::Data),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContainerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Replaces whitespace with underscores, and substitutes [FALLBACK_NAME] for
/// blank names
pub fn sanitize_name(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        FALLBACK_NAME.to_owned()
    } else {
        name.split_whitespace().collect::<Vec<_>>().join("_")
    }
}

/// `eris_<name>_<suffix>`, with `_<number>` appended for numbers above 1
pub fn container_name(kind: ContainerType, name: &str, number: u32) -> String {
    let base = format!("eris_{}_{}", sanitize_name(name), kind.suffix());
    if number > 1 {
        format!("{base}_{number}")
    } else {
        base
    }
}

pub fn service_container_name(name: &str) -> String {
    container_name(ContainerType::Service, name, 1)
}

pub fn chain_container_name(name: &str) -> String {
    container_name(ContainerType::Chain, name, 1)
}

pub fn data_container_name(name: &str) -> String {
    container_name(ContainerType::Data, name, 1)
}

/// The labels attached to every container eris creates
pub fn labels(kind: ContainerType, short_name: &str, number: u32) -> BTreeMap<String, String> {
    [
        (LABEL_ERIS, "true".to_owned()),
        (LABEL_SHORT_NAME, short_name.to_owned()),
        (LABEL_TYPE, kind.as_str().to_owned()),
        (LABEL_NUMBER, number.to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v))
    .collect()
}

/// The label filter selecting all eris containers, in the `key=value` form the
/// runtime list call expects
pub fn eris_label_filter() -> String {
    format!("{LABEL_ERIS}=true")
}
