//! [ContainerRuntime] over the Docker Engine API through `bollard`

mod tarball;

use std::collections::HashMap;

use bollard::{
    container::{
        Config, CreateContainerOptions, DownloadFromContainerOptions, ListContainersOptions,
        LogsOptions, RemoveContainerOptions, UploadToContainerOptions,
    },
    errors::Error as BollardError,
    image::{BuildImageOptions, CreateImageOptions, RemoveImageOptions},
    secret::{ContainerInspectResponse, ContainerSummary},
};
use bytes::Bytes;
use futures::{stream::LocalBoxStream, StreamExt, TryStreamExt};
use stacked_errors::StackableErr;
pub use tarball::*;

use crate::{
    runtime::{
        ContainerCreateOptions, ContainerInfo, ContainerRuntime, HostBinding, MountInfo,
        OneShotOptions, OneShotOutput,
    },
    ErisError, Result,
};

pub mod docker_socket {
    use std::sync::{LazyLock, OnceLock};

    use stacked_errors::{Result, StackableErr};

    /// This acquires a process-wide unified `bollard::Docker` handle
    pub async fn get_or_init_default_docker_instance() -> Result<bollard::Docker> {
        static DOCKER_SOCKET: OnceLock<bollard::Docker> = OnceLock::new();
        static EXEC_LOCK: LazyLock<tokio::sync::Mutex<()>> = LazyLock::new(Default::default);

        // this has a fast path with a slow path that is careful to not block the
        // process
        if let Some(docker_instance) = DOCKER_SOCKET.get() {
            return Ok(docker_instance.clone())
        }
        let _exec_lock = EXEC_LOCK.lock().await;
        if let Some(docker_instance) = DOCKER_SOCKET.get() {
            return Ok(docker_instance.clone())
        }
        let docker_socket =
            tokio::task::spawn_blocking(|| bollard::Docker::connect_with_defaults().stack())
                .await
                .stack()??;
        Ok(DOCKER_SOCKET.get_or_init(|| docker_socket).clone())
    }
}

fn is_404(e: &BollardError) -> bool {
    matches!(
        e,
        BollardError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

/// Adds `ctx` and classifies as a runtime failure
fn runtime_err<T>(
    res: std::result::Result<T, BollardError>,
    ctx: impl FnOnce() -> String,
) -> Result<T> {
    res.stack_err_with(ctx).map_err(ErisError::RuntimeCallFailed)
}

/// Splits Docker style port specs into exposed ports and host bindings
#[allow(clippy::type_complexity)] // internal only
fn port_bindings_to_bollard_args(
    ports: &[String],
) -> (
    HashMap<String, HashMap<(), ()>>,
    HashMap<String, Option<Vec<bollard::secret::PortBinding>>>,
) {
    let mut exposed = HashMap::new();
    let mut bindings: HashMap<String, Option<Vec<bollard::secret::PortBinding>>> = HashMap::new();
    for spec in ports {
        let parts: Vec<&str> = spec.split(':').collect();
        let (host_ip, host_port, container) = match parts.as_slice() {
            [container] => (None, None, *container),
            [host, container] => (None, Some(*host), *container),
            [ip, host, container] => (Some(*ip), Some(*host), *container),
            _ => {
                tracing::warn!(port = %spec, "ignoring unparseable port");
                continue
            }
        };
        let key = if container.contains('/') {
            container.to_owned()
        } else {
            format!("{container}/tcp")
        };
        exposed.insert(key.clone(), HashMap::new());
        if let Some(host_port) = host_port {
            bindings
                .entry(key)
                .or_default()
                .get_or_insert_with(Vec::new)
                .push(bollard::secret::PortBinding {
                    host_ip: host_ip.map(str::to_owned),
                    host_port: Some(host_port.to_owned()),
                });
        }
    }
    (exposed, bindings)
}

fn from_inspect(res: ContainerInspectResponse) -> ContainerInfo {
    let config = res.config.unwrap_or_default();
    let state = res.state.unwrap_or_default();
    let network = res.network_settings.unwrap_or_default();
    let mut exposed_ports: Vec<String> = config
        .exposed_ports
        .unwrap_or_default()
        .into_keys()
        .collect();
    exposed_ports.sort();
    ContainerInfo {
        id: res.id.unwrap_or_default(),
        name: res
            .name
            .unwrap_or_default()
            .trim_start_matches('/')
            .to_owned(),
        image: config.image.unwrap_or_default(),
        created: res.created.unwrap_or_default(),
        labels: config.labels.unwrap_or_default().into_iter().collect(),
        running: state.running.unwrap_or(false),
        status: state.status.map(|s| s.to_string()).unwrap_or_default(),
        path: res.path.unwrap_or_default(),
        args: res.args.unwrap_or_default(),
        cmd: config.cmd.unwrap_or_default(),
        entrypoint: config.entrypoint.unwrap_or_default(),
        env: config.env.unwrap_or_default(),
        user: config.user.unwrap_or_default(),
        working_dir: config.working_dir.unwrap_or_default(),
        hostname: config.hostname.unwrap_or_default(),
        ip_address: network.ip_address.unwrap_or_default(),
        exposed_ports,
        port_bindings: network
            .ports
            .unwrap_or_default()
            .into_iter()
            .map(|(port, bindings)| {
                let mut bindings: Vec<HostBinding> = bindings
                    .unwrap_or_default()
                    .into_iter()
                    .map(|b| HostBinding {
                        host_ip: b.host_ip.unwrap_or_default(),
                        host_port: b.host_port.unwrap_or_default(),
                    })
                    .collect();
                bindings.sort();
                (port, bindings)
            })
            .collect(),
        mounts: res
            .mounts
            .unwrap_or_default()
            .into_iter()
            .map(|m| MountInfo {
                source: m.source.unwrap_or_default(),
                destination: m.destination.unwrap_or_default(),
            })
            .collect(),
        volumes_from: res
            .host_config
            .and_then(|h| h.volumes_from)
            .unwrap_or_default(),
    }
}

fn from_summary(summary: ContainerSummary) -> ContainerInfo {
    let mut info = ContainerInfo {
        id: summary.id.unwrap_or_default(),
        name: summary
            .names
            .and_then(|names| names.into_iter().next())
            .unwrap_or_default()
            .trim_start_matches('/')
            .to_owned(),
        image: summary.image.unwrap_or_default(),
        created: summary.created.map(|c| c.to_string()).unwrap_or_default(),
        labels: summary.labels.unwrap_or_default().into_iter().collect(),
        running: summary.state.as_deref() == Some("running"),
        status: summary.status.unwrap_or_default(),
        cmd: summary
            .command
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_owned)
            .collect(),
        ..Default::default()
    };
    for port in summary.ports.unwrap_or_default() {
        let proto = port
            .typ
            .map(|t| t.to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "tcp".to_owned());
        let key = format!("{}/{proto}", port.private_port);
        if !info.exposed_ports.contains(&key) {
            info.exposed_ports.push(key.clone());
        }
        if let Some(public) = port.public_port {
            info.port_bindings.entry(key).or_default().push(HostBinding {
                host_ip: port.ip.unwrap_or_default(),
                host_port: public.to_string(),
            });
        }
    }
    info.exposed_ports.sort();
    info
}

/// The Docker daemon found through the usual environment, see
/// [bollard::Docker::connect_with_defaults]
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: bollard::Docker,
}

impl DockerRuntime {
    pub async fn connect() -> Result<Self> {
        let docker = docker_socket::get_or_init_default_docker_instance()
            .await
            .stack_err("DockerRuntime::connect")
            .map_err(ErisError::RuntimeCallFailed)?;
        Ok(Self { docker })
    }

    async fn wait(&self, name: &str) -> Result<i64> {
        let mut wait = self.docker.wait_container::<String>(name, None);
        let mut exit_code = 0;
        while let Some(res) = wait.next().await {
            match res {
                Ok(res) => exit_code = res.status_code,
                // bollard reports non-zero exits as errors
                Err(BollardError::DockerContainerWaitError { code, .. }) => exit_code = code,
                Err(e) => return runtime_err(Err(e), || format!("waiting on {name}")),
            }
        }
        Ok(exit_code)
    }

    async fn logs(&self, name: &str) -> Result<String> {
        let chunks = self
            .docker
            .logs(
                name,
                Some(LogsOptions::<String> {
                    stdout: true,
                    stderr: true,
                    ..Default::default()
                }),
            )
            .map_ok(|output| output.into_bytes())
            .try_collect::<Vec<_>>()
            .await;
        let chunks = runtime_err(chunks, || format!("reading the logs of {name}"))?;
        Ok(chunks
            .iter()
            .map(|c| String::from_utf8_lossy(c))
            .collect())
    }
}

impl ContainerRuntime for DockerRuntime {
    async fn inspect_container(&self, name: &str) -> Result<Option<ContainerInfo>> {
        match self.docker.inspect_container(name, None).await {
            Ok(res) => Ok(Some(from_inspect(res))),
            Err(e) if is_404(&e) => Ok(None),
            Err(e) => runtime_err(Err(e), || format!("inspect_container(name: {name})")),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn list_containers(
        &self,
        all: bool,
        label_filters: &[String],
    ) -> Result<Vec<ContainerInfo>> {
        let mut filters = HashMap::new();
        if !label_filters.is_empty() {
            filters.insert("label".to_owned(), label_filters.to_vec());
        }
        let res = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all,
                filters,
                ..Default::default()
            }))
            .await;
        Ok(runtime_err(res, || "list_containers".to_owned())?
            .into_iter()
            .map(from_summary)
            .collect())
    }

    #[tracing::instrument(skip_all, fields(container.name = %opts.name))]
    async fn create_container(&self, opts: &ContainerCreateOptions) -> Result<String> {
        let (exposed_ports, port_bindings) = port_bindings_to_bollard_args(&opts.ports);
        let non_empty = |v: &Vec<String>| (!v.is_empty()).then(|| v.clone());

        tracing::debug!("Creating container");

        let res = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: opts.name.clone(),
                    ..Default::default()
                }),
                Config {
                    image: Some(opts.image.clone()),
                    labels: Some(opts.labels.clone().into_iter().collect()),
                    cmd: non_empty(&opts.cmd),
                    entrypoint: non_empty(&opts.entrypoint),
                    env: non_empty(&opts.env),
                    user: opts.user.clone(),
                    exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
                    host_config: Some(bollard::secret::HostConfig {
                        port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
                        binds: non_empty(&opts.binds),
                        volumes_from: non_empty(&opts.volumes_from),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )
            .await
            .inspect(|x| tracing::debug!(container.id = %x.id));
        Ok(runtime_err(res, || format!("create_container(name: {})", opts.name))?.id)
    }

    async fn start_container(&self, name: &str) -> Result<()> {
        let res = self.docker.start_container::<String>(name, None).await;
        runtime_err(res, || format!("start_container(name: {name})"))
    }

    #[tracing::instrument(skip(self, tarball))]
    async fn upload_archive(&self, name: &str, path: &str, tarball: Vec<u8>) -> Result<()> {
        let res = self
            .docker
            .upload_to_container(
                name,
                Some(UploadToContainerOptions {
                    path: path.to_owned(),
                    no_overwrite_dir_non_dir: "true".to_owned(),
                }),
                tarball.into(),
            )
            .await;
        runtime_err(res, || format!("upload_archive(name: {name}, path: {path})"))
    }

    fn download_archive<'a>(
        &'a self,
        name: &'a str,
        path: &'a str,
    ) -> LocalBoxStream<'a, Result<Bytes>> {
        self.docker
            .download_from_container(
                name,
                Some(DownloadFromContainerOptions {
                    path: path.to_owned(),
                }),
            )
            .map(move |res| {
                runtime_err(res, || {
                    format!("download_archive(name: {name}, path: {path})")
                })
            })
            .boxed_local()
    }

    #[tracing::instrument(skip_all, fields(cmd = ?opts.cmd))]
    async fn run_one_shot(&self, opts: &OneShotOptions) -> Result<OneShotOutput> {
        let name = format!("eris_run_{}", uuid::Uuid::new_v4().simple());
        self.create_container(&ContainerCreateOptions {
            name: name.clone(),
            image: opts.image.clone(),
            labels: opts.labels.clone(),
            cmd: opts.cmd.clone(),
            user: opts.user.clone(),
            volumes_from: opts.volumes_from.clone(),
            ..Default::default()
        })
        .await?;

        let res = async {
            self.start_container(&name).await?;
            let exit_code = self.wait(&name).await?;
            let output = self.logs(&name).await?;
            Ok(OneShotOutput { exit_code, output })
        }
        .await;

        // the container is removed whether or not it ran
        let removed = self.remove_container(&name, true, true).await;
        let output = res?;
        removed?;
        tracing::debug!(exit_code = output.exit_code, "one-shot container finished");
        Ok(output)
    }

    async fn remove_container(&self, name: &str, remove_volumes: bool, force: bool) -> Result<()> {
        let res = self
            .docker
            .remove_container(
                name,
                Some(RemoveContainerOptions {
                    v: remove_volumes,
                    force,
                    ..Default::default()
                }),
            )
            .await;
        runtime_err(res, || format!("remove_container(name: {name})"))
    }

    async fn remove_image(&self, image: &str, force: bool) -> Result<()> {
        let res = self
            .docker
            .remove_image(
                image,
                Some(RemoveImageOptions {
                    force,
                    ..Default::default()
                }),
                None,
            )
            .await;
        runtime_err(res, || format!("remove_image(image: {image})")).map(|_| ())
    }

    #[tracing::instrument(skip(self, dockerfile))]
    async fn build_image(&self, tag: &str, dockerfile: &str) -> Result<()> {
        const DOCKER_FILE_NAME: &str = "Dockerfile";

        let mut tarball = Tarball::default();
        tarball
            .append_file_bytes(DOCKER_FILE_NAME, 0o644, dockerfile.as_bytes())
            .map_err(ErisError::FilesystemFailure)?;
        let tarball = tarball
            .into_tarball()
            .map_err(ErisError::FilesystemFailure)?;

        let res = self
            .docker
            .build_image(
                BuildImageOptions {
                    dockerfile: DOCKER_FILE_NAME.to_owned(),
                    t: tag.to_owned(),
                    rm: true,
                    forcerm: true,
                    ..Default::default()
                },
                None,
                Some(tarball.into()),
            )
            .inspect_ok(|msg| {
                msg.stream
                    .as_ref()
                    .inspect(|x| tracing::debug!("{}", x.trim()));
            })
            .try_filter_map(|msg| futures::future::ready(Ok(msg.error)))
            .try_collect::<Vec<_>>()
            .await;
        let errors = runtime_err(res, || format!("build_image(tag: {tag})"))?;
        if let Some(error) = errors.first() {
            return Err(ErisError::runtime_msg(format!(
                "build_image(tag: {tag}) -> {error}"
            )))
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn pull_image(&self, image: &str) -> Result<()> {
        let res = self
            .docker
            .create_image(
                Some(CreateImageOptions {
                    from_image: image.to_owned(),
                    ..Default::default()
                }),
                None,
                None,
            )
            .inspect_ok(|info| {
                if let Some(status) = &info.status {
                    tracing::debug!("{}", status.trim());
                }
            })
            .try_collect::<Vec<_>>()
            .await;
        runtime_err(res, || format!("pull_image(image: {image})")).map(|_| ())
    }
}
