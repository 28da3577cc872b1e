use std::path::{Component, Path, PathBuf};

use stacked_errors::StackableErr;
use tokio::fs;

use crate::{ErisError, Result};

/// Environment variable overriding the eris root
pub const ERIS_ROOT_ENV_VAR_NAME: &str = "ERIS";

/// Where eris data containers keep their payload, import destinations and
/// export sources are relative to this unless the root check is skipped
pub const ERIS_CONTAINER_ROOT: &str = "/home/eris/.eris";

/// The eris root and its layout. This is passed around explicitly instead of
/// living in process-global state, which lets tests point it at a temporary
/// directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErisPaths {
    pub root: PathBuf,
}

/// Directories created under the eris root by `eris init`
pub const ROOT_SUBDIRS: &[&str] = &[
    "actions",
    "apps",
    "bundles",
    "chains",
    "chains/account-types",
    "chains/chain-types",
    "keys",
    "keys/data",
    "keys/names",
    "remotes",
    "scratch",
    "scratch/data",
    "scratch/languages",
    "scratch/lllc",
    "scratch/ser",
    "scratch/sol",
    "services",
    "services/global",
];

impl ErisPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Uses `$ERIS` if set, `~/.eris` otherwise
    pub fn from_env() -> Result<Self> {
        if let Some(root) = std::env::var_os(ERIS_ROOT_ENV_VAR_NAME).filter(|r| !r.is_empty()) {
            return Ok(Self::new(root))
        }
        let home = dirs::home_dir()
            .ok_or_else(|| ErisError::not_found("neither $ERIS nor a home directory is set"))?;
        Ok(Self::new(home.join(".eris")))
    }

    pub fn services(&self) -> PathBuf {
        self.root.join("services")
    }

    pub fn chains(&self) -> PathBuf {
        self.root.join("chains")
    }

    pub fn actions(&self) -> PathBuf {
        self.root.join("actions")
    }

    pub fn apps(&self) -> PathBuf {
        self.root.join("apps")
    }

    pub fn scratch(&self) -> PathBuf {
        self.root.join("scratch")
    }

    pub fn global_config(&self) -> PathBuf {
        self.root.join("eris.toml")
    }

    /// Pairs of `(deprecated, current)` directory locations
    pub fn dirs_to_migrate(&self) -> Vec<(PathBuf, PathBuf)> {
        vec![
            (self.root.join("blockchains"), self.chains()),
            (self.root.join("dapps"), self.apps()),
        ]
    }
}

/// Resolves `path` against `cwd` if it is relative and lexically removes `.`
/// and `..` components. The path does not need to exist.
pub fn absolute_path(cwd: impl AsRef<Path>, path: impl AsRef<Path>) -> PathBuf {
    let joined = cwd.as_ref().join(path.as_ref());
    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => (),
            Component::ParentDir => {
                out.pop();
            }
            c => out.push(c.as_os_str()),
        }
    }
    out
}

/// [absolute_path] against the current working directory
pub fn absolute_from_cwd(path: impl AsRef<Path>) -> Result<PathBuf> {
    let cwd = std::env::current_dir()
        .stack_err("could not get the current working directory")
        .map_err(ErisError::FilesystemFailure)?;
    Ok(absolute_path(cwd, path))
}

/// Joins `path` onto [ERIS_CONTAINER_ROOT] unless it already starts there
pub fn in_container_root(path: &str) -> String {
    if Path::new(path).starts_with(ERIS_CONTAINER_ROOT) {
        path.to_owned()
    } else {
        format!(
            "{}/{}",
            ERIS_CONTAINER_ROOT,
            path.trim_start_matches('/').trim_end_matches('/')
        )
        .trim_end_matches('/')
        .to_owned()
    }
}

/// Canonicalizes and checks the existence of a directory path. Also adds on
/// better information to errors.
///
/// Note: this does not prevent TOCTOU bugs.
pub async fn acquire_dir_path(dir_path: impl AsRef<Path>) -> Result<PathBuf> {
    let dir_path = dir_path.as_ref();
    let path = fs::canonicalize(dir_path).await.map_err(|e| {
        ErisError::not_found(format!("acquire_dir_path(dir_path: {dir_path:?}) -> {e}"))
    })?;
    if path.is_dir() {
        Ok(path)
    } else {
        Err(ErisError::not_found(format!(
            "acquire_dir_path(dir_path: {dir_path:?}) -> is not a directory"
        )))
    }
}

/// Returns if `path` is an existing directory, symlinks are followed
pub async fn dir_exists(path: impl AsRef<Path>) -> bool {
    fs::metadata(path).await.is_ok_and(|m| m.is_dir())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_paths() {
        assert_eq!(absolute_path("/a/b", "c"), PathBuf::from("/a/b/c"));
        assert_eq!(absolute_path("/a/b", "/x/y"), PathBuf::from("/x/y"));
        assert_eq!(absolute_path("/a/b", "../c/./d"), PathBuf::from("/a/c/d"));
        assert_eq!(absolute_path("/a/b", "."), PathBuf::from("/a/b"));
    }

    #[test]
    fn container_root() {
        assert_eq!(in_container_root("keys"), "/home/eris/.eris/keys");
        assert_eq!(in_container_root("/keys/data/"), "/home/eris/.eris/keys/data");
        assert_eq!(
            in_container_root("/home/eris/.eris/apps"),
            "/home/eris/.eris/apps"
        );
        assert_eq!(in_container_root("/"), "/home/eris/.eris");
        // a sibling sharing the prefix is not under the root
        assert_eq!(
            in_container_root("/home/eris/.eris_other/x"),
            "/home/eris/.eris/home/eris/.eris_other/x"
        );
    }

    #[test]
    fn root_from_env() {
        // the only test touching `$ERIS`
        std::env::set_var(ERIS_ROOT_ENV_VAR_NAME, "/tmp/eris_root");
        assert_eq!(ErisPaths::from_env().unwrap().root, PathBuf::from("/tmp/eris_root"));
        std::env::set_var(ERIS_ROOT_ENV_VAR_NAME, "");
        let res = ErisPaths::from_env();
        std::env::remove_var(ERIS_ROOT_ENV_VAR_NAME);
        match dirs::home_dir() {
            Some(home) => assert_eq!(res.unwrap().root, home.join(".eris")),
            None => assert!(res.unwrap_err().is_not_found()),
        }
    }

    #[test]
    fn layout() {
        let p = ErisPaths::new("/tmp/x");
        assert_eq!(p.services(), PathBuf::from("/tmp/x/services"));
        assert_eq!(p.global_config(), PathBuf::from("/tmp/x/eris.toml"));
        assert_eq!(p.dirs_to_migrate()[0].1, PathBuf::from("/tmp/x/chains"));
    }
}
