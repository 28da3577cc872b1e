//! `eris update`: rebuilds eris either inside a container or from a local
//! checkout

use std::path::{Path, PathBuf};

use owo_colors::AnsiColors;
use stacked_errors::StackableErr;
use tracing::{info, instrument, warn};

use crate::{
    data::{DataEngine, TransferRequest},
    file_ops::migrate_dir,
    misc::{print_banner, sh, sh_in},
    runtime::{ContainerCreateOptions, ContainerRuntime},
    version::ErisImage,
    Command, DefinitionLoader, ErisError, ErisPaths, Result,
};

pub const ERIS_REPOSITORY: &str = "https://github.com/eris-ltd/eris-cli";

/// Where the update image places the freshly built binary
pub const BINARY_PATH_IN_IMAGE: &str = "/usr/local/bin/eris";

/// Data entity name of the temporary update container
pub const UPDATE_NAME: &str = "binary_update";

pub const UPDATE_IMAGE_TAG: &str = "eris/update:latest";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallKind {
    /// Installed with `cargo install` from a local checkout
    Source,
    /// A prebuilt binary somewhere else
    Binary,
}

#[derive(Debug, Clone)]
pub struct UpdateOptions {
    pub branch: String,
    /// The local checkout used by source installs
    pub checkout: PathBuf,
}

/// `$CARGO_HOME/bin`, or `~/.cargo/bin`
pub fn cargo_bin_dir() -> Option<PathBuf> {
    if let Some(home) = std::env::var_os("CARGO_HOME").filter(|h| !h.is_empty()) {
        return Some(PathBuf::from(home).join("bin"))
    }
    dirs::home_dir().map(|h| h.join(".cargo").join("bin"))
}

pub fn install_kind(exe: &Path, cargo_bin: Option<&Path>) -> InstallKind {
    match cargo_bin {
        Some(bin) if exe.starts_with(bin) => InstallKind::Source,
        _ => InstallKind::Binary,
    }
}

/// The Dockerfile building `branch` on top of the base image
pub fn update_dockerfile(base_image: &str, branch: &str) -> String {
    format!(
        r#"FROM {base_image}
USER root
RUN git clone {ERIS_REPOSITORY} /src/eris-cli
WORKDIR /src/eris-cli
RUN git checkout {branch} && cargo build --release && cp target/release/eris {BINARY_PATH_IN_IMAGE}
"#
    )
}

/// Copies `src` over `exe`. The new binary is written next to `exe` and renamed
/// into place, which works while `exe` is running.
pub async fn install_binary(src: &Path, exe: &Path) -> Result<()> {
    let tmp = exe.with_extension("new");
    tokio::fs::copy(src, &tmp)
        .await
        .stack_err_with(|| format!("install_binary -> copying {src:?} to {tmp:?}"))
        .map_err(ErisError::FilesystemFailure)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o755))
            .await
            .stack_err_with(|| format!("install_binary -> chmod {tmp:?}"))
            .map_err(ErisError::FilesystemFailure)?;
    }
    if let Err(e) = tokio::fs::rename(&tmp, exe).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e)
            .stack_err_with(|| format!("install_binary -> replacing {exe:?}"))
            .map_err(ErisError::FilesystemFailure)
    }
    Ok(())
}

/// Builds the update image and creates the container holding the binary
pub async fn build_update_container<R: ContainerRuntime>(
    runtime: &R,
    loader: &DefinitionLoader,
    branch: &str,
) -> Result<()> {
    let dockerfile = update_dockerfile(&loader.image(ErisImage::Base), branch);
    info!(branch, "building eris inside a container, this can take a while");
    runtime.build_image(UPDATE_IMAGE_TAG, &dockerfile).await?;
    let def = loader.load_data_definition(UPDATE_NAME, 1);
    runtime
        .create_container(&ContainerCreateOptions::data(&def, UPDATE_IMAGE_TAG))
        .await?;
    Ok(())
}

/// Exports the built binary into `<scratch>/update` and returns its path
pub async fn export_update_binary<R: ContainerRuntime>(
    runtime: &R,
    loader: &DefinitionLoader,
) -> Result<PathBuf> {
    let dest = loader.paths().scratch().join("update");
    let req = TransferRequest::new(
        UPDATE_NAME,
        BINARY_PATH_IN_IMAGE,
        dest.to_string_lossy().into_owned(),
    )
    .skip_root_check(true);
    DataEngine::new(runtime, loader).export(&req).await?;
    Ok(dest.join("eris"))
}

/// Removes the update container and image, failures are only logged
pub async fn remove_update_artifacts<R: ContainerRuntime>(runtime: &R, loader: &DefinitionLoader) {
    let def = loader.load_data_definition(UPDATE_NAME, 1);
    let container = def.data_container_name();
    match runtime.container_exists(container).await {
        Ok(true) => {
            if let Err(e) = runtime.remove_container(container, true, true).await {
                warn!(container, error = %e, "could not remove the update container");
            }
        }
        Ok(false) => (),
        Err(e) => warn!(container, error = %e, "could not look up the update container"),
    }
    if let Err(e) = runtime.remove_image(UPDATE_IMAGE_TAG, true).await {
        warn!(image = UPDATE_IMAGE_TAG, error = %e, "could not remove the update image");
    }
}

async fn update_binary_steps<R: ContainerRuntime>(
    runtime: &R,
    loader: &DefinitionLoader,
    branch: &str,
    exe: &Path,
) -> Result<()> {
    build_update_container(runtime, loader, branch).await?;
    let new_binary = export_update_binary(runtime, loader).await?;
    match install_binary(&new_binary, exe).await {
        Ok(()) => info!(exe = ?exe, "binary replaced"),
        Err(e) => warn!(
            error = %e,
            "could not replace {exe:?}, the new binary was left at {new_binary:?}"
        ),
    }
    Ok(())
}

/// Rebuilds inside a container and replaces `exe`. Interrupting with Ctrl-C
/// still removes the temporary container and image.
#[instrument(skip(runtime, loader))]
pub async fn update_binary<R: ContainerRuntime>(
    runtime: &R,
    loader: &DefinitionLoader,
    branch: &str,
    exe: &Path,
) -> Result<()> {
    let res = tokio::select! {
        res = update_binary_steps(runtime, loader, branch, exe) => res,
        _ = tokio::signal::ctrl_c() => {
            Err(ErisError::Aborted("interrupted during update".to_owned()))
        }
    };
    remove_update_artifacts(runtime, loader).await;
    res
}

/// `git checkout`, `git pull` and `cargo install` in `checkout`
#[instrument]
pub async fn update_source(checkout: &Path, branch: &str) -> Result<()> {
    let dir = checkout.to_string_lossy();
    let dir: &str = &dir;
    sh("git -C", &[dir, "checkout", branch]).await?;
    // fail instead of waiting on a credential prompt
    Command::new("git -C", &[dir, "pull", "origin", branch])
        .env("GIT_TERMINAL_PROMPT", "0")
        .ci_mode(true)
        .run_to_completion()
        .await?
        .assert_success()?;
    sh("cargo install --path", &[dir]).await?;
    let head = sh_in(checkout, "git rev-parse --short HEAD", &[]).await?;
    info!(head, "installed from source");
    Ok(())
}

/// Migrates deprecated directories without asking, failures are warnings
pub async fn migrate_after_update(paths: &ErisPaths) {
    for (old, new) in paths.dirs_to_migrate() {
        if let Err(e) = migrate_dir(&old, &new).await {
            warn!(from = ?old, to = ?new, error = %e, "could not migrate directory");
        }
    }
}

/// `eris update`
pub async fn update<R: ContainerRuntime>(
    runtime: &R,
    loader: &DefinitionLoader,
    opts: &UpdateOptions,
) -> Result<()> {
    let exe = std::env::current_exe()
        .stack_err("update -> locating the running executable")
        .map_err(ErisError::FilesystemFailure)?;
    let kind = install_kind(&exe, cargo_bin_dir().as_deref());
    info!(?kind, branch = opts.branch, "updating eris");
    match kind {
        InstallKind::Binary => update_binary(runtime, loader, &opts.branch, &exe).await?,
        InstallKind::Source => update_source(&opts.checkout, &opts.branch).await?,
    }
    migrate_after_update(loader.paths()).await;

    print_banner(
        "Eris was updated.\nRerun `eris init` to refresh the default definition files and \
         images.",
        AnsiColors::Green,
    );
    Ok(())
}
