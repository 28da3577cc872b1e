//! Data containers: creating them, moving directory trees in and out of them,
//! and running one-shot commands against their volumes

use std::path::{Path, PathBuf};

use futures::StreamExt;
use stacked_errors::StackableErr;
use tracing::{debug, info};

use crate::{
    api_docker::{unpack, ChannelReader, Tarball},
    definitions::EntityDefinition,
    file_ops::{move_out_of_dir_and_rm_dir, remove_all},
    naming::{eris_label_filter, sanitize_name, ContainerType, LABEL_TYPE},
    paths::{absolute_from_cwd, acquire_dir_path, dir_exists, in_container_root},
    runtime::{ContainerCreateOptions, ContainerInfo, ContainerRuntime, OneShotOptions},
    version::ErisImage,
    DefinitionLoader, ErisError, Result,
};

/// The user owning everything under the container root
pub const CONTAINER_USER: &str = "eris";

/// Downloaded archive chunks allowed to wait for the untar task during an
/// export
pub const EXPORT_CHUNK_BUFFER: usize = 16;

/// One import or export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Name of the data entity
    pub name: String,
    /// Host directory for imports, container path for exports
    pub source: String,
    /// Container directory for imports, host directory for exports
    pub destination: String,
    /// Use container paths as given instead of placing them under
    /// `/home/eris/.eris`
    pub skip_root_check: bool,
    pub container_number: u32,
}

impl TransferRequest {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            destination: destination.into(),
            skip_root_check: false,
            container_number: 1,
        }
    }

    pub fn skip_root_check(mut self, skip_root_check: bool) -> Self {
        self.skip_root_check = skip_root_check;
        self
    }

    fn container_path(&self, path: &str) -> String {
        if self.skip_root_check {
            path.to_owned()
        } else {
            in_container_root(path)
        }
    }
}

/// A precondition of an import that can be fixed once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Missing {
    Container,
    Destination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImportState {
    Probe,
    Remediate(Missing),
    Execute,
}

/// Data container operations against a runtime
#[derive(Debug)]
pub struct DataEngine<'a, R> {
    runtime: &'a R,
    loader: &'a DefinitionLoader,
}

impl<'a, R: ContainerRuntime> DataEngine<'a, R> {
    pub fn new(runtime: &'a R, loader: &'a DefinitionLoader) -> Self {
        Self { runtime, loader }
    }

    fn data_image(&self) -> String {
        self.loader.image(ErisImage::Data)
    }

    /// Creates the data container of `def` if it does not exist, returns if it
    /// was created
    pub async fn ensure_data_container(&self, def: &EntityDefinition) -> Result<bool> {
        let name = def.data_container_name();
        if self.runtime.container_exists(name).await? {
            return Ok(false)
        }
        info!(container = name, "creating data container");
        self.runtime
            .create_container(&ContainerCreateOptions::data(def, &self.data_image()))
            .await?;
        Ok(true)
    }

    /// Runs `args` in a one-shot container of the data image that mounts the
    /// volumes of `container_name` and runs as root. A non-zero exit is a
    /// runtime failure.
    pub async fn run_data(&self, container_name: &str, args: &[String]) -> Result<String> {
        let output = self
            .runtime
            .run_one_shot(&OneShotOptions {
                image: self.data_image(),
                cmd: args.to_vec(),
                user: Some("root".to_owned()),
                volumes_from: vec![container_name.to_owned()],
                ..Default::default()
            })
            .await?;
        if output.exit_code != 0 {
            return Err(ErisError::runtime_msg(format!(
                "running {args:?} against {container_name} exited with {}: {}",
                output.exit_code,
                output.output.trim()
            )))
        }
        Ok(output.output)
    }

    async fn dir_exists_in(&self, container_name: &str, path: &str) -> Result<bool> {
        let output = self
            .runtime
            .run_one_shot(&OneShotOptions {
                image: self.data_image(),
                cmd: vec!["test".to_owned(), "-d".to_owned(), path.to_owned()],
                user: Some("root".to_owned()),
                volumes_from: vec![container_name.to_owned()],
                ..Default::default()
            })
            .await?;
        Ok(output.exit_code == 0)
    }

    /// Copies the contents of the host directory `req.source` into
    /// `req.destination` of the data container, creating the container and
    /// the destination if they are missing. Each is created at most once.
    #[tracing::instrument(skip(self))]
    pub async fn import(&self, req: &TransferRequest) -> Result<()> {
        let def = self
            .loader
            .load_data_definition(&req.name, req.container_number);
        let container = def.data_container_name();
        let source = acquire_dir_path(absolute_from_cwd(&req.source)?).await?;
        let dest = req.container_path(&req.destination);
        debug!(from = ?source, to = %dest, "importing");

        let mut remediated: Vec<Missing> = vec![];
        let mut state = ImportState::Probe;
        loop {
            state = match state {
                ImportState::Probe => {
                    let missing = if !self.runtime.container_exists(container).await? {
                        Some(Missing::Container)
                    } else if !self.dir_exists_in(container, &dest).await? {
                        Some(Missing::Destination)
                    } else {
                        None
                    };
                    match missing {
                        None => ImportState::Execute,
                        Some(missing) if remediated.contains(&missing) => {
                            return Err(ErisError::runtime_msg(format!(
                                "{missing:?} of {container} is still missing after creating it"
                            )))
                        }
                        Some(missing) => ImportState::Remediate(missing),
                    }
                }
                ImportState::Remediate(missing) => {
                    match missing {
                        Missing::Container => {
                            info!(name = %req.name, "data container does not exist, creating it");
                            self.ensure_data_container(&def).await?;
                        }
                        Missing::Destination => {
                            self.run_data(container, &["mkdir".into(), "-p".into(), dest.clone()])
                                .await?;
                        }
                    }
                    remediated.push(missing);
                    ImportState::Probe
                }
                ImportState::Execute => break,
            }
        }

        let tarball = tokio::task::spawn_blocking(move || {
            Tarball::from_dir_contents(&source).and_then(Tarball::into_tarball)
        })
        .await
        .stack_err("import -> archiving task")
        .map_err(ErisError::FilesystemFailure)?
        .map_err(ErisError::FilesystemFailure)?;

        info!(container, "copying into container");
        self.runtime.upload_archive(container, &dest, tarball).await?;

        // uploads land as root, eris images run as `eris`
        self.run_data(container, &[
            "chown".into(),
            "--recursive".into(),
            CONTAINER_USER.into(),
            dest.clone(),
        ])
        .await?;
        Ok(())
    }

    /// Copies `req.source` of the data container into the host directory
    /// `req.destination`, which is created if missing. The transfer goes
    /// through a staging directory that is always removed afterwards.
    #[tracing::instrument(skip(self))]
    pub async fn export(&self, req: &TransferRequest) -> Result<()> {
        let def = self
            .loader
            .load_data_definition(&req.name, req.container_number);
        let container = def.data_container_name();
        let dest = absolute_from_cwd(&req.destination)?;
        if !self.runtime.container_exists(container).await? {
            return Err(ErisError::not_found(format!(
                "data container {container} for {:?}",
                req.name
            )))
        }
        let source = req.container_path(&req.source);

        let staging = std::env::temp_dir().join(format!(
            "{}{}",
            sanitize_name(&req.name),
            uuid::Uuid::new_v4().simple()
        ));
        tokio::fs::create_dir_all(&staging)
            .await
            .stack_err_with(|| format!("export -> creating staging directory {staging:?}"))
            .map_err(ErisError::FilesystemFailure)?;

        let res = self.export_through(container, &source, &staging, &dest).await;
        if dir_exists(&staging).await {
            let cleanup = remove_all(&staging).await;
            // the export error is the more interesting one
            res?;
            cleanup?;
        } else {
            res?;
        }
        Ok(())
    }

    async fn export_through(
        &self,
        container: &str,
        source: &str,
        staging: &Path,
        dest: &Path,
    ) -> Result<()> {
        info!(container, path = source, "copying out of container");
        let (tx, rx) = tokio::sync::mpsc::channel(EXPORT_CHUNK_BUFFER);
        let untar_dir = staging.to_owned();
        let untar =
            tokio::task::spawn_blocking(move || unpack(ChannelReader::new(rx), &untar_dir));

        let mut download = self.runtime.download_archive(container, source);
        let mut download_res = Ok(());
        while let Some(chunk) = download.next().await {
            match chunk {
                Ok(chunk) => {
                    // the untar side hung up, its error is reported below
                    if tx.send(chunk).await.is_err() {
                        break
                    }
                }
                Err(e) => {
                    download_res = Err(e);
                    break
                }
            }
        }
        drop(tx);
        drop(download);
        let untar_res = untar.await;
        download_res?;
        untar_res
            .stack_err("export -> untar task")
            .map_err(ErisError::FilesystemFailure)?
            .map_err(ErisError::FilesystemFailure)?;

        // directories come back nested under their own base name
        if let Some(base) = Path::new(source).file_name() {
            let nested = staging.join(base);
            if dir_exists(&nested).await {
                // renamed first so that an entry with the same name as the
                // directory can be moved out of it
                let renamed: PathBuf =
                    staging.join(format!(".nested{}", uuid::Uuid::new_v4().simple()));
                tokio::fs::rename(&nested, &renamed)
                    .await
                    .stack_err_with(|| format!("export -> renaming {nested:?}"))
                    .map_err(ErisError::FilesystemFailure)?;
                move_out_of_dir_and_rm_dir(&renamed, staging).await?;
            }
        }

        tokio::fs::create_dir_all(dest)
            .await
            .stack_err_with(|| format!("export -> could not find or create {dest:?}"))
            .map_err(ErisError::FilesystemFailure)?;
        move_out_of_dir_and_rm_dir(staging, dest).await?;
        Ok(())
    }

    /// Runs `args` against the volumes of an existing data container and
    /// returns the output
    #[tracing::instrument(skip(self))]
    pub async fn exec(&self, name: &str, args: &[String]) -> Result<String> {
        let def = self.loader.load(ContainerType::Data, name).await?;
        let container = def.data_container_name();
        if !self.runtime.container_exists(container).await? {
            return Err(ErisError::not_found(format!(
                "data container {container}, check the name with `eris data ls`"
            )))
        }
        info!(container, "executing data container");
        self.run_data(container, args).await
    }

    /// All data containers, stopped ones included
    pub async fn list(&self) -> Result<Vec<ContainerInfo>> {
        self.runtime
            .list_containers(true, &[
                eris_label_filter(),
                format!("{LABEL_TYPE}={}", ContainerType::Data),
            ])
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove(
        &self,
        name: &str,
        container_number: u32,
        remove_volumes: bool,
    ) -> Result<()> {
        let def = self.loader.load_data_definition(name, container_number);
        let container = def.data_container_name();
        if !self.runtime.container_exists(container).await? {
            return Err(ErisError::not_found(format!("data container {container}")))
        }
        info!(container, "removing data container");
        self.runtime
            .remove_container(container, remove_volumes, false)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{naming::data_container_name, runtime::mock::MockRuntime, ErisPaths};

    fn loader() -> DefinitionLoader {
        DefinitionLoader::new(ErisPaths::new("/nonexistent/eris"), "quay.io")
    }

    fn source_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        std::fs::write(dir.path().join("sub/b.bin"), [0u8, 1, 2, 255]).unwrap();
        std::fs::write(dir.path().join("sub/deeper/c"), b"").unwrap();
        dir
    }

    fn unique_name(prefix: &str) -> String {
        format!("{prefix}{}", uuid::Uuid::new_v4().simple())
    }

    fn staging_dirs(name: &str) -> Vec<PathBuf> {
        std::fs::read_dir(std::env::temp_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(name))
            })
            .collect()
    }

    fn read_tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
        let mut out = BTreeMap::new();
        let mut stack = vec![root.to_owned()];
        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    let rel = path.strip_prefix(root).unwrap().to_str().unwrap().to_owned();
                    out.insert(rel, std::fs::read(&path).unwrap());
                }
            }
        }
        out
    }

    #[tokio::test]
    async fn import_creates_once_then_round_trips() {
        let rt = MockRuntime::new();
        let loader = loader();
        let engine = DataEngine::new(&rt, &loader);
        let name = unique_name("rt");
        let src = source_tree();

        engine
            .import(&TransferRequest::new(&name, src.path().to_str().unwrap(), "stuff"))
            .await
            .unwrap();
        assert_eq!(rt.creations(), 1);
        let container = data_container_name(&name);
        assert_eq!(
            rt.file(&container, "/home/eris/.eris/stuff/a.txt").unwrap(),
            b"hello"
        );
        assert!(rt.is_dir(&container, "/home/eris/.eris/stuff/sub/deeper"));
        // the last command run is the ownership fix
        assert_eq!(
            rt.one_shots.lock().unwrap().last().unwrap(),
            &vec!["chown", "--recursive", "eris", "/home/eris/.eris/stuff"]
        );

        // a second import reuses the container
        engine
            .import(&TransferRequest::new(&name, src.path().to_str().unwrap(), "stuff"))
            .await
            .unwrap();
        assert_eq!(rt.creations(), 1);

        let out = tempfile::tempdir().unwrap();
        let dest = out.path().join("not/yet/there");
        engine
            .export(&TransferRequest::new(&name, "stuff", dest.to_str().unwrap()))
            .await
            .unwrap();
        assert_eq!(read_tree(&dest), read_tree(src.path()));
        assert!(dest.join("sub/deeper").is_dir());
        assert!(staging_dirs(&name).is_empty());
    }

    #[tokio::test]
    async fn export_larger_than_the_chunk_buffer() {
        let rt = MockRuntime::new();
        let loader = loader();
        let engine = DataEngine::new(&rt, &loader);
        let name = unique_name("big");
        let src = source_tree();
        engine
            .import(&TransferRequest::new(&name, src.path().to_str().unwrap(), "big"))
            .await
            .unwrap();
        // many more mock chunks than fit in the channel at once
        let content: Vec<u8> = (0..EXPORT_CHUNK_BUFFER * 4000).map(|i| i as u8).collect();
        rt.put_file(&data_container_name(&name), "/home/eris/.eris/big/blob", &content);

        let out = tempfile::tempdir().unwrap();
        engine
            .export(&TransferRequest::new(&name, "big", out.path().to_str().unwrap()))
            .await
            .unwrap();
        assert_eq!(std::fs::read(out.path().join("blob")).unwrap(), content);
        assert_eq!(std::fs::read(out.path().join("a.txt")).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn import_with_skipped_root_check() {
        let rt = MockRuntime::new();
        let loader = loader();
        let engine = DataEngine::new(&rt, &loader);
        let name = unique_name("skip");
        let src = source_tree();

        engine
            .import(
                &TransferRequest::new(&name, src.path().to_str().unwrap(), "/opt/x")
                    .skip_root_check(true),
            )
            .await
            .unwrap();
        assert_eq!(
            rt.file(&data_container_name(&name), "/opt/x/a.txt").unwrap(),
            b"hello"
        );
    }

    #[tokio::test]
    async fn import_mkdir_failure_propagates() {
        let rt = MockRuntime {
            fail_mkdir: true,
            ..Default::default()
        };
        let loader = loader();
        let engine = DataEngine::new(&rt, &loader);
        let src = source_tree();

        let err = engine
            .import(&TransferRequest::new("keys", src.path().to_str().unwrap(), "keys"))
            .await
            .unwrap_err();
        assert!(err.is_runtime_failure(), "{err}");
        assert_eq!(rt.creations(), 1);
    }

    #[tokio::test]
    async fn import_remediates_at_most_once() {
        let rt = MockRuntime {
            never_dir: true,
            ..Default::default()
        };
        let loader = loader();
        let engine = DataEngine::new(&rt, &loader);
        let src = source_tree();

        let err = engine
            .import(&TransferRequest::new("keys", src.path().to_str().unwrap(), "keys"))
            .await
            .unwrap_err();
        assert!(err.is_runtime_failure(), "{err}");
        let cmds: Vec<String> = rt
            .one_shots
            .lock()
            .unwrap()
            .iter()
            .map(|c| c[0].clone())
            .collect();
        assert_eq!(cmds, vec!["test", "mkdir", "test"]);
    }

    #[tokio::test]
    async fn import_missing_source() {
        let rt = MockRuntime::new();
        let loader = loader();
        let engine = DataEngine::new(&rt, &loader);
        let err = engine
            .import(&TransferRequest::new("keys", "/definitely/not/here", "keys"))
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "{err}");
        assert_eq!(rt.creations(), 0);
    }

    #[tokio::test]
    async fn export_of_nonexistent_entity() {
        let rt = MockRuntime::new();
        let loader = loader();
        let engine = DataEngine::new(&rt, &loader);
        let name = unique_name("ghost");
        let out = tempfile::tempdir().unwrap();

        let err = engine
            .export(&TransferRequest::new(&name, "x", out.path().to_str().unwrap()))
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "{err}");
        assert!(staging_dirs(&name).is_empty());
    }

    #[tokio::test]
    async fn export_failure_removes_staging() {
        let name = unique_name("fail");
        let rt = MockRuntime::new().with_container(&data_container_name(&name), BTreeMap::new());
        let loader = loader();
        let engine = DataEngine::new(&rt, &loader);
        let out = tempfile::tempdir().unwrap();

        let err = engine
            .export(&TransferRequest::new(&name, "missing", out.path().to_str().unwrap()))
            .await
            .unwrap_err();
        assert!(err.is_runtime_failure(), "{err}");
        assert!(staging_dirs(&name).is_empty());
    }

    #[tokio::test]
    async fn export_single_file_and_same_named_child() {
        let name = unique_name("nest");
        let container = data_container_name(&name);
        let rt = MockRuntime::new().with_container(&container, BTreeMap::new());
        rt.put_file(&container, "/home/eris/.eris/apps/apps/inner", b"1");
        rt.put_file(&container, "/home/eris/.eris/apps/top", b"2");
        let loader = loader();
        let engine = DataEngine::new(&rt, &loader);

        let out = tempfile::tempdir().unwrap();
        engine
            .export(&TransferRequest::new(&name, "apps", out.path().to_str().unwrap()))
            .await
            .unwrap();
        assert_eq!(std::fs::read(out.path().join("apps/inner")).unwrap(), b"1");
        assert_eq!(std::fs::read(out.path().join("top")).unwrap(), b"2");

        let out = tempfile::tempdir().unwrap();
        engine
            .export(&TransferRequest::new(&name, "apps/top", out.path().to_str().unwrap()))
            .await
            .unwrap();
        assert_eq!(std::fs::read(out.path().join("top")).unwrap(), b"2");
        assert!(staging_dirs(&name).is_empty());
    }

    #[tokio::test]
    async fn exec_list_and_remove() {
        let rt = MockRuntime::new();
        let loader = loader();
        let engine = DataEngine::new(&rt, &loader);
        assert!(engine
            .exec("keys", &["echo".to_owned(), "hi".to_owned()])
            .await
            .unwrap_err()
            .is_not_found());
        assert!(engine.remove("keys", 1, false).await.unwrap_err().is_not_found());

        let def = loader.load_data_definition("keys", 1);
        assert!(engine.ensure_data_container(&def).await.unwrap());
        assert!(!engine.ensure_data_container(&def).await.unwrap());
        assert_eq!(
            engine.exec("keys", &["echo".to_owned(), "hi".to_owned()]).await.unwrap(),
            "hi\n"
        );

        let listed = engine.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "eris_keys_data");

        engine.remove("keys", 1, true).await.unwrap();
        assert!(engine.list().await.unwrap().is_empty());
    }
}
