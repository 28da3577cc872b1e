use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::naming::{self, ContainerType, FALLBACK_NAME};

/// The `[service]` table of a definition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    pub image: String,
    /// If a data container should back the service
    pub data_container: bool,
    pub ports: Vec<String>,
    pub environment: Vec<String>,
    pub volumes: Vec<String>,
    pub entry_point: String,
    pub command: String,
    pub user: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependencies {
    pub services: Vec<String>,
    pub chains: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Maintainer {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub repository: String,
}

/// The merged contents of a definition file pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    pub name: String,
    pub chain_id: String,
    pub description: String,
    pub status: String,
    pub service: ServiceSpec,
    pub dependencies: Dependencies,
    pub maintainer: Maintainer,
    pub location: Location,
}

/// A finalized service, chain, or data definition. The derived container
/// names and labels can only be read, they are computed once by
/// [EntityDefinition::finalize] and are never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDefinition {
    definition: Definition,
    container_type: ContainerType,
    container_number: u32,
    service_container_name: String,
    data_container_name: String,
    labels: BTreeMap<String, String>,
}

impl EntityDefinition {
    /// Applies the display name fallback (`name`, then `service.name`, then
    /// `service.image`, then "eris"), copies the result into both name fields,
    /// and derives the container names and labels. `short_name` is the name
    /// the entity was requested by, it becomes the `NAME` label (the display
    /// name is used if it is blank).
    pub fn finalize(
        container_type: ContainerType,
        short_name: &str,
        container_number: u32,
        mut definition: Definition,
    ) -> Self {
        let display = [
            &definition.name,
            &definition.service.name,
            &definition.service.image,
        ]
        .into_iter()
        .find(|s| !s.trim().is_empty())
        .cloned()
        .unwrap_or_else(|| FALLBACK_NAME.to_owned());
        definition.name.clone_from(&display);
        definition.service.name.clone_from(&display);

        let short_name = if short_name.trim().is_empty() {
            display.as_str()
        } else {
            short_name
        };
        let container_number = container_number.max(1);
        let data_container_name =
            naming::container_name(ContainerType::Data, &display, container_number);
        let service_container_name = match container_type {
            ContainerType::Data => data_container_name.clone(),
            kind => naming::container_name(kind, &display, container_number),
        };
        let labels = naming::labels(container_type, short_name, container_number);

        Self {
            definition,
            container_type,
            container_number,
            service_container_name,
            data_container_name,
            labels,
        }
    }

    pub fn definition(&self) -> &Definition {
        &self.definition
    }

    /// The display name
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn service(&self) -> &ServiceSpec {
        &self.definition.service
    }

    pub fn container_type(&self) -> ContainerType {
        self.container_type
    }

    pub fn container_number(&self) -> u32 {
        self.container_number
    }

    /// The name of the container running the entity (for data entities this is
    /// the data container itself)
    pub fn service_container_name(&self) -> &str {
        &self.service_container_name
    }

    pub fn data_container_name(&self) -> &str {
        &self.data_container_name
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// Returns a copy with `f` applied to the definition body, the derived names
    /// are computed again
    pub fn map_definition(self, f: impl FnOnce(&mut Definition)) -> Self {
        let short_name = self
            .labels
            .get(naming::LABEL_SHORT_NAME)
            .cloned()
            .unwrap_or_default();
        let mut definition = self.definition;
        f(&mut definition);
        Self::finalize(
            self.container_type,
            &short_name,
            self.container_number,
            definition,
        )
    }
}

/// Contents of the `[eris]` table of a `package.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDefinition {
    pub name: String,
    pub package_id: String,
    pub chain_name: String,
    pub chain_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::{data_container_name, service_container_name, LABEL_SHORT_NAME};

    fn blank() -> Definition {
        Definition::default()
    }

    #[test]
    fn finalize_blank_names() {
        let mut d = blank();
        d.service.image = "test".to_owned();
        let d = EntityDefinition::finalize(ContainerType::Service, "", 1, d);
        assert_eq!(d.name(), "test");
        assert_eq!(d.service().name, "test");
        assert_eq!(d.service().image, "test");
        assert_eq!(d.service_container_name(), service_container_name("test"));
        assert_eq!(d.data_container_name(), data_container_name("test"));

        let mut d = blank();
        d.service.name = "test".to_owned();
        let d = EntityDefinition::finalize(ContainerType::Service, "", 1, d);
        assert_eq!(d.name(), "test");
        assert_eq!(d.service().image, "");

        let mut d = blank();
        d.name = "test".to_owned();
        let d = EntityDefinition::finalize(ContainerType::Service, "", 1, d);
        assert_eq!(d.service().name, "test");
        assert_eq!(d.label(LABEL_SHORT_NAME), Some("test"));
    }

    #[test]
    fn finalize_blank_everything() {
        let d = EntityDefinition::finalize(ContainerType::Service, "", 1, blank());
        assert_eq!(d.name(), FALLBACK_NAME);
        assert!(!d.service_container_name().is_empty());
        assert!(!d.data_container_name().is_empty());
    }

    #[test]
    fn data_entities_are_their_own_container() {
        let d = EntityDefinition::finalize(ContainerType::Data, "keys", 1, blank())
            .map_definition(|d| d.name = "keys".to_owned());
        assert_eq!(d.service_container_name(), d.data_container_name());
        assert_eq!(d.data_container_name(), data_container_name("keys"));
    }
}
