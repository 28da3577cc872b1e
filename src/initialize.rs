//! `eris init`: the eris root, its default definition files and images

use std::{io::Read, path::PathBuf};

use owo_colors::AnsiColors;
use stacked_errors::StackableErr;
use tracing::{info, instrument, warn};

use crate::{
    config::GlobalConfig,
    file_ops::migrate_dir,
    misc::{ask_yes_no, colored, print_banner},
    paths::{dir_exists, ROOT_SUBDIRS},
    runtime::ContainerRuntime,
    version::{ErisImage, ACTION_DEFINITIONS, CHAIN_DEFINITIONS, SERVICE_DEFINITIONS},
    ErisError, ErisPaths, Result,
};

/// Set to `true` to pull images without asking
pub const PULL_APPROVE_ENV_VAR_NAME: &str = "ERIS_PULL_APPROVE";

const RAWGIT_SERVICES: &str = "https://raw.githubusercontent.com/eris-ltd/eris-services/master";
const RAWGIT_ACTIONS: &str = "https://raw.githubusercontent.com/eris-ltd/eris-actions/master";
const RAWGIT_CHAINS: &str = "https://raw.githubusercontent.com/eris-ltd/eris-chains/master";

/// Where the default definition files come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum DefinitionSource {
    /// Download from the upstream definition repositories
    #[default]
    Rawgit,
    /// The copies built into this binary
    Embedded,
}

#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Do not ask for confirmation
    pub yes: bool,
    pub pull_images: bool,
    pub source: DefinitionSource,
    /// Initialize even over an existing root and without the closing banner
    pub testing: bool,
}

/// A default definition file, by directory under the eris root and path within
/// that directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultFile {
    pub dir: &'static str,
    pub path: String,
}

impl DefaultFile {
    fn url(&self) -> String {
        let base = match self.dir {
            "services" => RAWGIT_SERVICES,
            "actions" => RAWGIT_ACTIONS,
            _ => RAWGIT_CHAINS,
        };
        format!("{base}/{}", self.path)
    }

    fn embedded(&self) -> Option<&'static str> {
        Some(match (self.dir, self.path.as_str()) {
            ("services", "ipfs.toml") => include_str!("../defaults/services/ipfs.toml"),
            ("services", "keys.toml") => include_str!("../defaults/services/keys.toml"),
            ("actions", "chain_info.toml") => include_str!("../defaults/actions/chain_info.toml"),
            ("actions", "dns_register.toml") => {
                include_str!("../defaults/actions/dns_register.toml")
            }
            ("actions", "keys_list.toml") => include_str!("../defaults/actions/keys_list.toml"),
            ("chains", "default.toml") => include_str!("../defaults/chains/default.toml"),
            ("chains", "default/config.toml") => {
                include_str!("../defaults/chains/default/config.toml")
            }
            ("chains", "default/server_conf.toml") => {
                include_str!("../defaults/chains/default/server_conf.toml")
            }
            _ => return None,
        })
    }
}

/// Every default definition file. The chain default sits directly in
/// `chains/`, its node configuration in `chains/default/`.
pub fn default_files() -> Vec<DefaultFile> {
    let mut files = vec![];
    for f in SERVICE_DEFINITIONS {
        files.push(DefaultFile {
            dir: "services",
            path: (*f).to_owned(),
        });
    }
    for f in ACTION_DEFINITIONS {
        files.push(DefaultFile {
            dir: "actions",
            path: (*f).to_owned(),
        });
    }
    for f in CHAIN_DEFINITIONS {
        let path = if *f == "default.toml" {
            (*f).to_owned()
        } else {
            format!("default/{f}")
        };
        files.push(DefaultFile {
            dir: "chains",
            path,
        });
    }
    files
}

async fn download(url: String) -> Result<String> {
    tokio::task::spawn_blocking(move || {
        let agent = ureq::Agent::new_with_defaults();
        let resp = match agent.get(&url).call() {
            Ok(resp) => resp,
            Err(ureq::Error::StatusCode(404)) => return Err(ErisError::not_found(&url)),
            Err(e) => {
                return Err(e)
                    .stack_err_with(|| format!("download -> GET {url}"))
                    .map_err(ErisError::FilesystemFailure)
            }
        };
        let mut body = String::new();
        resp.into_body()
            .into_reader()
            .read_to_string(&mut body)
            .stack_err_with(|| format!("download -> reading body of {url}"))
            .map_err(ErisError::FilesystemFailure)?;
        Ok(body)
    })
    .await
    .stack_err("download -> join")
    .map_err(ErisError::FilesystemFailure)?
}

/// Writes the default definition files, overwriting existing ones
#[instrument(skip(paths))]
pub async fn drop_defaults(paths: &ErisPaths, source: DefinitionSource) -> Result<()> {
    for file in default_files() {
        let contents = match source {
            DefinitionSource::Embedded => file
                .embedded()
                .ok_or_else(|| ErisError::not_found(format!("embedded {file:?}")))?
                .to_owned(),
            DefinitionSource::Rawgit => download(file.url()).await?,
        };
        let dest = paths.root.join(file.dir).join(&file.path);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .stack_err_with(|| format!("drop_defaults -> creating {parent:?}"))
                .map_err(ErisError::FilesystemFailure)?;
        }
        tokio::fs::write(&dest, contents)
            .await
            .stack_err_with(|| format!("drop_defaults -> writing {dest:?}"))
            .map_err(ErisError::FilesystemFailure)?;
    }
    info!("default definition files written");
    Ok(())
}

/// Creates the eris root and every directory of [ROOT_SUBDIRS]
pub async fn create_tree(paths: &ErisPaths) -> Result<()> {
    let dirs = std::iter::once(paths.root.clone())
        .chain(ROOT_SUBDIRS.iter().map(|d| paths.root.join(d)));
    for dir in dirs {
        tokio::fs::create_dir_all(&dir)
            .await
            .stack_err_with(|| format!("create_tree -> creating {dir:?}"))
            .map_err(ErisError::FilesystemFailure)?;
    }
    Ok(())
}

/// Migrates every deprecated directory that still exists. Asks first unless
/// `yes`, returns `false` if the user declined.
pub async fn migrate_deprecated_dirs(paths: &ErisPaths, yes: bool) -> Result<bool> {
    let mut pending: Vec<(PathBuf, PathBuf)> = vec![];
    for (old, new) in paths.dirs_to_migrate() {
        if dir_exists(&old).await {
            pending.push((old, new));
        }
    }
    if pending.is_empty() {
        return Ok(true)
    }
    if !yes {
        for (old, new) in &pending {
            eprintln!("{old:?} is deprecated and will be moved to {new:?}");
        }
        if !ask_yes_no("Do you wish to migrate these directories?")? {
            return Ok(false)
        }
    }
    for (old, new) in &pending {
        migrate_dir(old, new).await?;
    }
    Ok(true)
}

/// Pulls the default images, falling back to Docker Hub if the configured
/// registry fails
pub async fn pull_default_images<R: ContainerRuntime>(runtime: &R, registry: &str) -> Result<()> {
    for image in ErisImage::DEFAULT_PULL {
        let reference = image.reference(registry);
        info!(image = reference, "pulling");
        if let Err(e) = runtime.pull_image(&reference).await {
            if registry.is_empty() {
                return Err(e)
            }
            warn!(image = reference, error = %e, "pull failed, trying Docker Hub");
            runtime.pull_image(&image.name_tag()).await?;
        }
    }
    Ok(())
}

fn pull_approved_by_env() -> bool {
    std::env::var(PULL_APPROVE_ENV_VAR_NAME).is_ok_and(|v| v == "true")
}

/// `eris init`. Returns `false` if the user declined to continue, which is not
/// an error.
pub async fn initialize<R: ContainerRuntime>(
    runtime: &R,
    paths: &ErisPaths,
    opts: &InitOptions,
) -> Result<bool> {
    let existing = dir_exists(&paths.root).await;
    if existing && !opts.testing && !opts.yes {
        eprintln!(
            "Eris root {:?} already exists, continuing will overwrite the default definition \
             files in it",
            paths.root
        );
        if !ask_yes_no("Do you wish to continue?")? {
            warn!("the marmots will not proceed without your permission");
            return Ok(false)
        }
    }
    if !existing {
        info!(root = ?paths.root, "creating the eris root");
    }
    create_tree(paths).await?;

    if !migrate_deprecated_dirs(paths, opts.yes || opts.testing).await? {
        warn!("the marmots will not proceed without your permission");
        return Ok(false)
    }

    let config = GlobalConfig::load(paths).await?;
    if opts.pull_images {
        let approved = opts.yes || pull_approved_by_env() || {
            print_banner(
                "Pulling the default images downloads about 1GB of data",
                AnsiColors::Yellow,
            );
            ask_yes_no("Do you wish to continue?")?
        };
        if approved {
            pull_default_images(runtime, &config.image_registry).await?;
        } else {
            warn!("skipping the image pull, rerun `eris init` to pull later");
        }
    }

    drop_defaults(paths, opts.source).await?;
    config.write_if_missing(paths).await?;

    if !opts.testing {
        print_banner(
            &format!(
                "{}\nThe eris root is at {:?}.\nCrash reports are {}, set `CrashReport` in \
                 {:?} to change this.",
                colored("Initialized", AnsiColors::Green),
                paths.root,
                if config.sends_crash_reports() {
                    "enabled"
                } else {
                    "disabled"
                },
                paths.global_config()
            ),
            AnsiColors::Green,
        );
    }
    Ok(true)
}
