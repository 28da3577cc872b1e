//! Tool version and the default images and definition files that go with it

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(not(any(target_arch = "arm", target_arch = "aarch64")))]
pub const CONTAINER_OS: &str = "alpine";
#[cfg(any(target_arch = "arm", target_arch = "aarch64"))]
pub const CONTAINER_OS: &str = "arm";

/// The default registry, `docker.io` is used when the registry is empty
pub const DEFAULT_REGISTRY: &str = "quay.io";

/// The eris image families, see [ErisImage::reference]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErisImage {
    Base,
    Data,
    Keys,
    Db,
    Pm,
    Cm,
    Ipfs,
}

impl ErisImage {
    pub const ALL: [ErisImage; 7] = [
        ErisImage::Base,
        ErisImage::Data,
        ErisImage::Keys,
        ErisImage::Db,
        ErisImage::Pm,
        ErisImage::Cm,
        ErisImage::Ipfs,
    ];

    /// Images pulled by `eris init`
    pub const DEFAULT_PULL: [ErisImage; 5] = [
        ErisImage::Data,
        ErisImage::Keys,
        ErisImage::Ipfs,
        ErisImage::Db,
        ErisImage::Pm,
    ];

    /// The `name:tag` of the image, without a registry
    pub fn name_tag(self) -> String {
        match self {
            ErisImage::Base => format!("eris/base:{CONTAINER_OS}"),
            ErisImage::Data => format!("eris/data:{CONTAINER_OS}"),
            ErisImage::Keys => format!("eris/keys:{CONTAINER_OS}"),
            ErisImage::Db => format!("eris/erisdb:{CONTAINER_OS}-{VERSION}"),
            ErisImage::Pm => format!("eris/epm:{CONTAINER_OS}-{VERSION}"),
            ErisImage::Cm => format!("eris/eris-cm:{CONTAINER_OS}-{VERSION}"),
            ErisImage::Ipfs => format!("eris/ipfs:{CONTAINER_OS}"),
        }
    }

    /// The full image reference under `registry`
    pub fn reference(self, registry: &str) -> String {
        if registry.is_empty() {
            self.name_tag()
        } else {
            format!("{}/{}", registry.trim_end_matches('/'), self.name_tag())
        }
    }
}

pub const SERVICE_DEFINITIONS: &[&str] = &["ipfs.toml", "keys.toml"];

pub const ACTION_DEFINITIONS: &[&str] = &["chain_info.toml", "dns_register.toml", "keys_list.toml"];

pub const CHAIN_DEFINITIONS: &[&str] = &["default.toml", "config.toml", "server_conf.toml"];
