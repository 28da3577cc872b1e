use std::path::{Path, PathBuf};

use serde::Deserialize;
use stacked_errors::StackableErr;
use tracing::debug;

use crate::{
    definitions::{
        Definition, Dependencies, EntityDefinition, Location, Maintainer, PackageDefinition,
        ServiceSpec,
    },
    naming::{sanitize_name, ContainerType, FALLBACK_NAME},
    version::ErisImage,
    ErisError, ErisPaths, Result,
};

/// Name of the file providing defaults inside the services and chains
/// directories
pub const DEFAULT_DEFINITION_NAME: &str = "default";

pub const PACKAGE_FILE_NAME: &str = "package.toml";

// The on-disk shape of a definition. Everything is optional so that the merge
// can tell "absent" apart from "set".

#[derive(Debug, Default, Deserialize)]
struct DefinitionFile {
    name: Option<String>,
    chain_id: Option<String>,
    description: Option<String>,
    status: Option<String>,
    service: Option<ServiceFile>,
    dependencies: Option<DependenciesFile>,
    maintainer: Option<MaintainerFile>,
    location: Option<LocationFile>,
}

#[derive(Debug, Default, Deserialize)]
struct ServiceFile {
    name: Option<String>,
    image: Option<String>,
    data_container: Option<bool>,
    ports: Option<Vec<String>>,
    environment: Option<Vec<String>>,
    volumes: Option<Vec<String>>,
    entry_point: Option<String>,
    command: Option<String>,
    user: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DependenciesFile {
    services: Option<Vec<String>>,
    chains: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct MaintainerFile {
    name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LocationFile {
    repository: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PackageFile {
    eris: Option<PackageErisFile>,
}

#[derive(Debug, Default, Deserialize)]
struct PackageErisFile {
    name: Option<String>,
    package_id: Option<String>,
    chain_name: Option<String>,
    chain_id: Option<String>,
}

/// An override scalar wins unless it is absent or blank
fn scalar(over: Option<String>, default: Option<String>) -> String {
    over.filter(|s| !s.is_empty())
        .or(default)
        .unwrap_or_default()
}

/// An override list replaces the default unless it is absent or empty
fn list(over: Option<Vec<String>>, default: Option<Vec<String>>) -> Vec<String> {
    over.filter(|v| !v.is_empty())
        .or(default)
        .unwrap_or_default()
}

/// Ports are the one field that concatenates, the default's ports come first
/// and duplicates are kept
fn ports(over: Option<Vec<String>>, default: Option<Vec<String>>) -> Vec<String> {
    let mut ports = default.unwrap_or_default();
    ports.extend(over.unwrap_or_default());
    ports
}

fn merge(default: DefinitionFile, over: DefinitionFile) -> Definition {
    let dsrv = default.service.unwrap_or_default();
    let osrv = over.service.unwrap_or_default();
    let ddep = default.dependencies.unwrap_or_default();
    let odep = over.dependencies.unwrap_or_default();
    let dmnt = default.maintainer.unwrap_or_default();
    let omnt = over.maintainer.unwrap_or_default();
    let dloc = default.location.unwrap_or_default();
    let oloc = over.location.unwrap_or_default();

    Definition {
        name: scalar(over.name, default.name),
        chain_id: scalar(over.chain_id, default.chain_id),
        description: scalar(over.description, default.description),
        status: scalar(over.status, default.status),
        service: ServiceSpec {
            name: scalar(osrv.name, dsrv.name),
            image: scalar(osrv.image, dsrv.image),
            data_container: osrv.data_container.or(dsrv.data_container).unwrap_or(false),
            ports: ports(osrv.ports, dsrv.ports),
            environment: list(osrv.environment, dsrv.environment),
            volumes: list(osrv.volumes, dsrv.volumes),
            entry_point: scalar(osrv.entry_point, dsrv.entry_point),
            command: scalar(osrv.command, dsrv.command),
            user: scalar(osrv.user, dsrv.user),
        },
        dependencies: Dependencies {
            services: list(odep.services, ddep.services),
            chains: list(odep.chains, ddep.chains),
        },
        maintainer: Maintainer {
            name: scalar(omnt.name, dmnt.name),
            email: scalar(omnt.email, dmnt.email),
        },
        location: Location {
            repository: scalar(oloc.repository, dloc.repository),
        },
    }
}

/// Reads and parses a TOML file, `Ok(None)` if it does not exist
async fn read_toml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e)
                .stack_err_with(|| format!("read_toml(path: {path:?})"))
                .map_err(ErisError::FilesystemFailure)
        }
    };
    toml::from_str(&contents)
        .map(Some)
        .map_err(|e| ErisError::malformed(path, e.message()))
}

/// Loads service, chain, data and package definitions from the eris root.
///
/// Nothing is cached, every call reads the files again.
#[derive(Debug, Clone)]
pub struct DefinitionLoader {
    paths: ErisPaths,
    registry: String,
}

impl DefinitionLoader {
    /// `registry` is prefixed to the eris images the loader fills in
    pub fn new(paths: ErisPaths, registry: impl Into<String>) -> Self {
        Self {
            paths,
            registry: registry.into(),
        }
    }

    pub fn paths(&self) -> &ErisPaths {
        &self.paths
    }

    pub fn image(&self, image: ErisImage) -> String {
        image.reference(&self.registry)
    }

    fn definition_path(dir: PathBuf, name: &str) -> PathBuf {
        dir.join(format!("{name}.toml"))
    }

    /// Dispatches on `kind`, data entities get container number 1
    pub async fn load(&self, kind: ContainerType, name: &str) -> Result<EntityDefinition> {
        match kind {
            ContainerType::Service => self.load_service_definition(name).await,
            ContainerType::Chain => self.load_chain_definition(name).await,
            ContainerType::Data => Ok(self.load_data_definition(name, 1)),
        }
    }

    /// Both `chains/default.toml` and `chains/<name>.toml` have to exist. The
    /// chain's display name and service name are always `name`.
    #[tracing::instrument(skip(self))]
    pub async fn load_chain_definition(&self, name: &str) -> Result<EntityDefinition> {
        let default_path = Self::definition_path(self.paths.chains(), DEFAULT_DEFINITION_NAME);
        let path = Self::definition_path(self.paths.chains(), name);

        let default: DefinitionFile = read_toml(&default_path).await?.ok_or_else(|| {
            ErisError::not_found(format!("default chain definition {default_path:?}"))
        })?;
        let over: DefinitionFile = read_toml(&path)
            .await?
            .ok_or_else(|| ErisError::not_found(format!("chain definition {path:?}")))?;

        debug!(?default_path, ?path, "merging chain definitions");
        let mut definition = merge(default, over);
        definition.name = name.to_owned();
        definition.service.name = name.to_owned();

        Ok(EntityDefinition::finalize(
            ContainerType::Chain,
            name,
            1,
            definition,
        ))
    }

    /// `services/default.toml` and `services/<name>.toml` are each optional,
    /// but at least one has to exist and together they have to name an image
    #[tracing::instrument(skip(self))]
    pub async fn load_service_definition(&self, name: &str) -> Result<EntityDefinition> {
        let default_path = Self::definition_path(self.paths.services(), DEFAULT_DEFINITION_NAME);
        let path = Self::definition_path(self.paths.services(), name);

        let default: Option<DefinitionFile> = read_toml(&default_path).await?;
        let over: Option<DefinitionFile> = read_toml(&path).await?;
        if default.is_none() && over.is_none() {
            return Err(ErisError::not_found(format!("service definition {path:?}")))
        }
        let blame = if over.is_some() { path } else { default_path };

        debug!(?blame, "merging service definitions");
        let definition = merge(default.unwrap_or_default(), over.unwrap_or_default());
        if definition.service.image.trim().is_empty() {
            return Err(ErisError::malformed(
                blame,
                "a service definition needs a `service.image`",
            ))
        }

        Ok(EntityDefinition::finalize(
            ContainerType::Service,
            name,
            1,
            definition,
        ))
    }

    /// Data-only definitions have no file, this synthesizes one using the data
    /// image
    pub fn load_data_definition(&self, name: &str, container_number: u32) -> EntityDefinition {
        let definition = Definition {
            name: name.to_owned(),
            service: ServiceSpec {
                name: name.to_owned(),
                image: self.image(ErisImage::Data),
                data_container: true,
                ..Default::default()
            },
            ..Default::default()
        };
        EntityDefinition::finalize(ContainerType::Data, name, container_number, definition)
    }

    /// Loads a chain and turns it into a runnable service of the eris database
    /// image with `CHAIN_ID` set
    pub async fn chains_as_a_service(&self, name: &str) -> Result<EntityDefinition> {
        let db_image = self.image(ErisImage::Db);
        Ok(self
            .load_chain_definition(name)
            .await?
            .map_definition(|d| {
                d.service.image = db_image;
                d.service.environment.push(format!("CHAIN_ID={name}"));
            }))
    }

    /// Loads a `package.toml`. `path` can be the file itself or a directory
    /// containing it. A directory without one results in a default package
    /// for `name`.
    #[tracing::instrument(skip(self))]
    pub async fn load_package(&self, path: &Path, name: &str) -> Result<PackageDefinition> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| ErisError::not_found(format!("package path {path:?}: {e}")))?;
        let file = if metadata.is_dir() {
            path.join(PACKAGE_FILE_NAME)
        } else {
            path.to_owned()
        };

        let package: PackageFile = match read_toml(&file).await? {
            Some(package) => package,
            None => {
                debug!(?file, "no package file, using defaults");
                PackageFile::default()
            }
        };
        let eris = package.eris.unwrap_or_default();
        Ok(PackageDefinition {
            name: eris
                .name
                .filter(|n| !n.trim().is_empty())
                .map_or_else(|| FALLBACK_NAME.to_owned(), |n| sanitize_name(&n)),
            package_id: eris.package_id.unwrap_or_default(),
            chain_name: scalar(eris.chain_name, Some(name.to_owned())),
            chain_id: eris.chain_id.unwrap_or_default(),
        })
    }
}

/// A chain definition with derived names that is not backed by any file
pub fn mock_chain_definition(name: &str, chain_id: &str) -> EntityDefinition {
    let definition = Definition {
        name: name.to_owned(),
        chain_id: chain_id.to_owned(),
        service: ServiceSpec {
            name: name.to_owned(),
            ..Default::default()
        },
        ..Default::default()
    };
    EntityDefinition::finalize(ContainerType::Chain, name, 1, definition)
}

/// A service definition with derived names that is not backed by any file,
/// the image is left blank for the caller to set
pub fn mock_service_definition(name: &str) -> EntityDefinition {
    let definition = Definition {
        name: name.to_owned(),
        service: ServiceSpec {
            name: name.to_owned(),
            ..Default::default()
        },
        ..Default::default()
    };
    EntityDefinition::finalize(ContainerType::Service, name, 1, definition)
}

/// Applies the display name fallback to a hand built service definition
pub fn service_finalize_load(definition: Definition) -> EntityDefinition {
    EntityDefinition::finalize(ContainerType::Service, "", 1, definition)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::naming::{
        chain_container_name, data_container_name, service_container_name, LABEL_ERIS,
        LABEL_SHORT_NAME, LABEL_TYPE,
    };

    const NAME: &str = "test";

    fn fake_definition_file(dir: &Path, name: &str, contents: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(format!("{name}.toml")), contents).unwrap();
    }

    fn setup() -> (tempfile::TempDir, DefinitionLoader) {
        let dir = tempfile::tempdir().unwrap();
        let paths = ErisPaths::new(dir.path());
        std::fs::create_dir_all(paths.chains()).unwrap();
        std::fs::create_dir_all(paths.services()).unwrap();
        (dir, DefinitionLoader::new(paths, "quay.io"))
    }

    fn assert_chain_names(d: &EntityDefinition) {
        assert_eq!(d.name(), NAME);
        assert_eq!(d.container_type(), ContainerType::Chain);
        assert_eq!(d.service_container_name(), chain_container_name(NAME));
        assert_eq!(d.data_container_name(), data_container_name(NAME));
        assert_eq!(d.label(LABEL_ERIS), Some("true"));
        assert_eq!(d.label(LABEL_SHORT_NAME), Some(NAME));
        assert_eq!(d.label(LABEL_TYPE), Some("chain"));
        assert_eq!(d.service().name, NAME);
    }

    const CHAIN: &str = r#"
name = "test"
chain_id = "test"
description = "test chain"

[service]
name           = "random name"
image          = "test image"
data_container = true
ports          = [ "1234" ]
"#;

    #[tokio::test]
    async fn chain_empty_default() {
        let (_dir, loader) = setup();
        fake_definition_file(&loader.paths().chains(), "default", "");
        fake_definition_file(&loader.paths().chains(), NAME, CHAIN);

        let d = loader.load_chain_definition(NAME).await.unwrap();
        assert_chain_names(&d);
        let d = d.definition();
        assert_eq!(d.chain_id, NAME);
        assert!(d.service.data_container);
        assert_eq!(d.service.image, "test image");
        assert_eq!(d.service.ports, vec!["1234"]);
    }

    #[tokio::test]
    async fn chain_empty_override_keeps_default_fields() {
        let (_dir, loader) = setup();
        let default = format!(
            "{CHAIN}\n[dependencies]\nservices = [ \"keys\" ]\n\n[maintainer]\nname = \"Eris \
             Industries\"\nemail = \"support@erisindustries.com\"\n"
        );
        fake_definition_file(&loader.paths().chains(), "default", &default);
        fake_definition_file(&loader.paths().chains(), NAME, "");

        let d = loader.load_chain_definition(NAME).await.unwrap();
        assert_chain_names(&d);
        let d = d.definition();
        assert_eq!(d.chain_id, NAME);
        assert!(d.service.data_container);
        assert_eq!(d.service.image, "test image");
        assert_eq!(d.service.ports, vec!["1234"]);
        assert_eq!(d.dependencies.services, vec!["keys"]);
        assert_eq!(d.maintainer.email, "support@erisindustries.com");
    }

    #[tokio::test]
    async fn chain_both_empty() {
        let (_dir, loader) = setup();
        fake_definition_file(&loader.paths().chains(), "default", "");
        fake_definition_file(&loader.paths().chains(), NAME, "");

        let d = loader.load_chain_definition(NAME).await.unwrap();
        assert_chain_names(&d);
        assert_eq!(d.definition().chain_id, "");
    }

    #[tokio::test]
    async fn chain_override_scalars_and_concatenated_ports() {
        let (_dir, loader) = setup();
        fake_definition_file(
            &loader.paths().chains(),
            "default",
            r#"
[service]
name           = "random default name"
image          = "default image"
data_container = true
ports          = [ "1234", "5678" ]

[dependencies]
chains = [ "something" ]

[maintainer]
name = "Eris Industries"
email = "support@erisindustries.com"
"#,
        );
        fake_definition_file(
            &loader.paths().chains(),
            NAME,
            &CHAIN.replace(r#"[ "1234" ]"#, r#"[ "1234", "4321" ]"#),
        );

        let d = loader.load_chain_definition(NAME).await.unwrap();
        assert_chain_names(&d);
        let d = d.definition();
        assert_eq!(d.service.image, "test image");
        // concatenated, not overwritten, and not deduplicated
        assert_eq!(d.service.ports, vec!["1234", "5678", "1234", "4321"]);
        assert_eq!(d.dependencies.chains, vec!["something"]);
        assert_eq!(d.maintainer.email, "support@erisindustries.com");
    }

    #[tokio::test]
    async fn chain_missing_files() {
        let (_dir, loader) = setup();
        fake_definition_file(&loader.paths().chains(), NAME, CHAIN);
        let err = loader.load_chain_definition(NAME).await.unwrap_err();
        assert!(err.is_not_found(), "{err}");

        let (_dir, loader) = setup();
        fake_definition_file(&loader.paths().chains(), "default", "");
        let err = loader.load_chain_definition(NAME).await.unwrap_err();
        assert!(err.is_not_found(), "{err}");
    }

    #[tokio::test]
    async fn chain_bad_format() {
        let (_dir, loader) = setup();
        fake_definition_file(&loader.paths().chains(), "default", r#"name = [ "keys" ]"#);
        fake_definition_file(&loader.paths().chains(), NAME, "");
        let err = loader.load_chain_definition(NAME).await.unwrap_err();
        assert!(err.is_malformed(), "{err}");

        let (_dir, loader) = setup();
        fake_definition_file(&loader.paths().chains(), "default", "");
        fake_definition_file(&loader.paths().chains(), NAME, r#"name = [ "keys" ]"#);
        let err = loader.load_chain_definition(NAME).await.unwrap_err();
        assert!(err.is_malformed(), "{err}");

        // and a list given as a scalar
        let (_dir, loader) = setup();
        fake_definition_file(&loader.paths().chains(), "default", "");
        fake_definition_file(
            &loader.paths().chains(),
            NAME,
            "[service]\nports = \"1234\"\n",
        );
        let err = loader.load_chain_definition(NAME).await.unwrap_err();
        assert!(err.is_malformed(), "{err}");
    }

    #[tokio::test]
    async fn chains_as_a_service() {
        let (_dir, loader) = setup();
        fake_definition_file(&loader.paths().chains(), "default", "");
        fake_definition_file(&loader.paths().chains(), NAME, CHAIN);

        let s = loader.chains_as_a_service(NAME).await.unwrap();
        assert_chain_names(&s);
        assert!(s.service().data_container);
        assert_eq!(s.service().image, loader.image(ErisImage::Db));
        assert_eq!(s.service().environment, vec![format!("CHAIN_ID={NAME}")]);

        let (_dir, loader) = setup();
        fake_definition_file(&loader.paths().chains(), "default", "");
        assert!(loader.chains_as_a_service(NAME).await.unwrap_err().is_not_found());
    }

    #[test]
    fn mock_chain() {
        let d = mock_chain_definition(NAME, "id");
        assert_chain_names(&d);
        assert_eq!(d.definition().chain_id, "id");

        let d = mock_chain_definition("", "");
        assert_eq!(d.name(), FALLBACK_NAME);
        assert_eq!(d.service_container_name(), chain_container_name(""));
        assert_eq!(d.data_container_name(), data_container_name(""));
    }

    #[test]
    fn data_definition() {
        let (_dir, loader) = setup();
        let d = loader.load_data_definition(NAME, 1);
        assert_eq!(d.container_type(), ContainerType::Data);
        assert_eq!(d.service_container_name(), data_container_name(NAME));
        assert_eq!(d.data_container_name(), data_container_name(NAME));
        assert_eq!(d.label(LABEL_ERIS), Some("true"));
        assert_eq!(d.label(LABEL_SHORT_NAME), Some(NAME));
        assert_eq!(d.label(LABEL_TYPE), Some("data"));
        assert_eq!(d.service().image, loader.image(ErisImage::Data));
    }

    #[tokio::test]
    async fn load_dispatches_on_kind() {
        let (_dir, loader) = setup();
        fake_definition_file(&loader.paths().chains(), "default", "");
        fake_definition_file(&loader.paths().chains(), NAME, CHAIN);
        fake_definition_file(
            &loader.paths().services(),
            NAME,
            "name = \"test\"\n\n[service]\nimage = \"x\"\n",
        );

        let d = loader.load(ContainerType::Chain, NAME).await.unwrap();
        assert_chain_names(&d);
        assert_eq!(d.service().image, "test image");

        let d = loader.load(ContainerType::Service, NAME).await.unwrap();
        assert_eq!(d.container_type(), ContainerType::Service);
        assert_eq!(d.service_container_name(), service_container_name(NAME));
        assert_eq!(d.service().image, "x");

        let d = loader.load(ContainerType::Data, NAME).await.unwrap();
        assert_eq!(d, loader.load_data_definition(NAME, 1));

        assert!(loader
            .load(ContainerType::Chain, "missing")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn service_simple() {
        let (_dir, loader) = setup();
        fake_definition_file(
            &loader.paths().services(),
            NAME,
            r#"
name = "test"
description = "description"
status = "in production"

[service]
image = "test image"
data_container = true
ports = [ "1234" ]

[location]
repository = "https://example.com"
"#,
        );

        let d = loader.load_service_definition(NAME).await.unwrap();
        assert_eq!(d.name(), NAME);
        assert_eq!(d.container_type(), ContainerType::Service);
        assert_eq!(d.service_container_name(), service_container_name(NAME));
        assert_eq!(d.data_container_name(), data_container_name(NAME));
        assert_eq!(d.label(LABEL_TYPE), Some("service"));
        assert_eq!(d.service().name, NAME);
        assert!(d.service().data_container);
        assert_eq!(d.service().ports, vec!["1234"]);
        assert_eq!(d.definition().location.repository, "https://example.com");
        assert_eq!(d.definition().status, "in production");
    }

    #[tokio::test]
    async fn service_name_falls_back_to_image() {
        let (_dir, loader) = setup();
        fake_definition_file(
            &loader.paths().services(),
            NAME,
            "[service]\nimage = \"test image\"\n",
        );

        let d = loader.load_service_definition(NAME).await.unwrap();
        assert_eq!(d.name(), "test image");
        assert_eq!(d.service_container_name(), service_container_name("test image"));
        assert_eq!(d.service_container_name(), "eris_test_image_srv");
        assert_eq!(d.data_container_name(), data_container_name("test image"));
        // the label keeps the name it was requested by
        assert_eq!(d.label(LABEL_SHORT_NAME), Some(NAME));
        assert_eq!(d.service().name, "test image");
    }

    #[tokio::test]
    async fn service_from_default_only() {
        let (_dir, loader) = setup();
        fake_definition_file(
            &loader.paths().services(),
            "default",
            "[service]\nimage = \"default image\"\nports = [ \"80\" ]\n",
        );

        let d = loader.load_service_definition(NAME).await.unwrap();
        assert_eq!(d.service().image, "default image");
        assert_eq!(d.service().ports, vec!["80"]);
    }

    #[tokio::test]
    async fn service_failures() {
        let (_dir, loader) = setup();
        assert!(loader.load_service_definition(NAME).await.unwrap_err().is_not_found());

        fake_definition_file(&loader.paths().services(), NAME, "");
        assert!(loader.load_service_definition(NAME).await.unwrap_err().is_malformed());

        fake_definition_file(
            &loader.paths().services(),
            NAME,
            "[service]\nimage = [ \"keys\" ]\n",
        );
        assert!(loader.load_service_definition(NAME).await.unwrap_err().is_malformed());
    }

    #[test]
    fn mock_service() {
        let d = mock_service_definition(NAME);
        assert_eq!(d.name(), NAME);
        assert_eq!(d.service_container_name(), service_container_name(NAME));
        assert_eq!(d.label(LABEL_TYPE), Some("service"));
        assert_eq!(d.service().image, "");
    }

    #[test]
    fn finalize_by_image() {
        let mut d = Definition::default();
        d.service.image = NAME.to_owned();
        let d = service_finalize_load(d);
        assert_eq!(d.name(), NAME);
        assert_eq!(d.service().name, NAME);
        assert_eq!(d.data_container_name(), data_container_name(NAME));
    }

    const PACKAGE: &str = r#"
[eris]
name       = "test"
package_id = "test"
chain_name = "test chain"
chain_id   = "test id"
"#;

    #[tokio::test]
    async fn package_simple() {
        let (dir, loader) = setup();
        fake_definition_file(dir.path(), "package", PACKAGE);

        let d = loader.load_package(dir.path(), NAME).await.unwrap();
        assert_eq!(d.name, NAME);
        assert_eq!(d.package_id, NAME);
        assert_eq!(d.chain_name, "test chain");
        assert_eq!(d.chain_id, "test id");
    }

    #[tokio::test]
    async fn package_file_path_and_spaces() {
        let (dir, loader) = setup();
        fake_definition_file(
            dir.path(),
            "package",
            &PACKAGE.replace("= \"test\"", "= \"test test\""),
        );

        let d = loader
            .load_package(&dir.path().join(PACKAGE_FILE_NAME), "test test")
            .await
            .unwrap();
        assert_eq!(d.name, "test_test");
        assert_eq!(d.package_id, "test test");
        assert_eq!(d.chain_name, "test chain");
    }

    #[tokio::test]
    async fn package_defaults() {
        let (dir, loader) = setup();
        assert!(loader
            .load_package(Path::new("/non/existent/path"), NAME)
            .await
            .unwrap_err()
            .is_not_found());

        let d = loader.load_package(dir.path(), "").await.unwrap();
        assert_eq!(d.name, FALLBACK_NAME);
        assert_eq!(d.package_id, "");
        assert_eq!(d.chain_name, "");

        let d = loader.load_package(dir.path(), NAME).await.unwrap();
        assert_eq!(d.name, FALLBACK_NAME);
        assert_eq!(d.chain_name, NAME);
    }

    #[tokio::test]
    async fn package_bad_format() {
        let (dir, loader) = setup();
        fake_definition_file(dir.path(), "package", "[eris]\nname = [ \"keys\" ]\n");
        assert!(loader
            .load_package(dir.path(), NAME)
            .await
            .unwrap_err()
            .is_malformed());
    }
}
