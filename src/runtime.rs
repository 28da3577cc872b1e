//! The container runtime seam. Everything eris does to containers goes
//! through [ContainerRuntime], the Docker implementation lives in
//! [crate::api_docker].

use std::collections::BTreeMap;

use bytes::Bytes;
use futures::stream::LocalBoxStream;
use serde::Serialize;

use crate::{definitions::EntityDefinition, Result};

/// A host side binding of a container port
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct HostBinding {
    pub host_ip: String,
    pub host_port: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MountInfo {
    pub source: String,
    pub destination: String,
}

/// What eris knows about a container. Listing fills in a subset of this
/// (everything but `mounts`, `env`, `volumes_from` and friends), inspection
/// fills in all of it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContainerInfo {
    pub id: String,
    /// Without the leading `/` the runtime adds
    pub name: String,
    pub image: String,
    pub created: String,
    pub labels: BTreeMap<String, String>,
    pub running: bool,
    pub status: String,
    pub path: String,
    pub args: Vec<String>,
    pub cmd: Vec<String>,
    pub entrypoint: Vec<String>,
    pub env: Vec<String>,
    pub user: String,
    pub working_dir: String,
    pub hostname: String,
    pub ip_address: String,
    /// Exposed ports in `port/proto` form
    pub exposed_ports: Vec<String>,
    /// Keyed by `port/proto`
    pub port_bindings: BTreeMap<String, Vec<HostBinding>>,
    pub mounts: Vec<MountInfo>,
    pub volumes_from: Vec<String>,
}

impl ContainerInfo {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// The command as one line, entrypoint first
    pub fn command_line(&self) -> String {
        self.entrypoint
            .iter()
            .chain(self.cmd.iter())
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Options for creating a long lived container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerCreateOptions {
    pub name: String,
    pub image: String,
    pub labels: BTreeMap<String, String>,
    pub cmd: Vec<String>,
    pub entrypoint: Vec<String>,
    pub env: Vec<String>,
    pub user: Option<String>,
    /// Docker style port specs, `container[/proto]`, `host:container[/proto]`
    /// or `ip:host:container[/proto]`
    pub ports: Vec<String>,
    /// `host:container` bind mounts
    pub binds: Vec<String>,
    pub volumes_from: Vec<String>,
}

impl ContainerCreateOptions {
    /// The data container of `def`, using `image` as the data image
    pub fn data(def: &EntityDefinition, image: &str) -> Self {
        Self {
            name: def.data_container_name().to_owned(),
            image: image.to_owned(),
            labels: crate::naming::labels(
                crate::naming::ContainerType::Data,
                def.label(crate::naming::LABEL_SHORT_NAME)
                    .unwrap_or(def.name()),
                def.container_number(),
            ),
            ..Default::default()
        }
    }
}

/// A container that runs one command and is removed afterwards
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OneShotOptions {
    pub image: String,
    pub cmd: Vec<String>,
    pub user: Option<String>,
    pub volumes_from: Vec<String>,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OneShotOutput {
    pub exit_code: i64,
    /// Interleaved stdout and stderr
    pub output: String,
}

/// The primitives eris needs from a container runtime.
///
/// A runtime error is always surfaced as
/// [ErisError::RuntimeCallFailed](crate::ErisError::RuntimeCallFailed), a
/// missing container as `Ok(None)` / `Ok(false)` where the method allows it.
#[allow(async_fn_in_trait)]
pub trait ContainerRuntime {
    async fn inspect_container(&self, name: &str) -> Result<Option<ContainerInfo>>;

    async fn container_exists(&self, name: &str) -> Result<bool> {
        Ok(self.inspect_container(name).await?.is_some())
    }

    /// Lists containers matching every `key=value` label filter, stopped
    /// containers are included if `all` is set
    async fn list_containers(&self, all: bool, label_filters: &[String])
        -> Result<Vec<ContainerInfo>>;

    /// Returns the id of the new container
    async fn create_container(&self, opts: &ContainerCreateOptions) -> Result<String>;

    async fn start_container(&self, name: &str) -> Result<()>;

    /// Extracts `tarball` into the existing directory `path` of the container,
    /// a directory never overwrites a non-directory
    async fn upload_archive(&self, name: &str, path: &str, tarball: Vec<u8>) -> Result<()>;

    /// Streams `path` of the container as a tar archive. Directories are
    /// archived under their base name.
    fn download_archive<'a>(
        &'a self,
        name: &'a str,
        path: &'a str,
    ) -> LocalBoxStream<'a, Result<Bytes>>;

    /// Creates, runs, and removes a container, returning the exit code and the
    /// output
    async fn run_one_shot(&self, opts: &OneShotOptions) -> Result<OneShotOutput>;

    async fn remove_container(&self, name: &str, remove_volumes: bool, force: bool) -> Result<()>;

    async fn remove_image(&self, image: &str, force: bool) -> Result<()>;

    /// Builds `dockerfile` with an empty context and tags the result
    async fn build_image(&self, tag: &str, dockerfile: &str) -> Result<()>;

    async fn pull_image(&self, image: &str) -> Result<()>;
}
