use std::{collections::BTreeSet, io::Read, path::Path};

use bytes::{Buf, Bytes};
use stacked_errors::{Result, StackableErr};
use tokio::sync::mpsc::Receiver;

/// A tarball built in memory for uploading into a container
pub struct Tarball {
    tar: tar::Builder<Vec<u8>>,
    paths: BTreeSet<String>,
}

impl Default for Tarball {
    /// An empty tarball
    fn default() -> Self {
        Self {
            tar: tar::Builder::new(Vec::new()),
            paths: Default::default(),
        }
    }
}

// avoid the `tar::Builder`s
impl std::fmt::Debug for Tarball {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tarball {{ {} }}",
            self.paths
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join("\n")
        )
    }
}

impl Tarball {
    /// Archives the contents of `dir` (not `dir` itself) so that they land
    /// directly in the upload destination. Symlinks are archived as links and
    /// names do not need to be UTF-8.
    ///
    /// This does blocking IO.
    pub fn from_dir_contents(dir: &Path) -> Result<Self> {
        let mut tarball = Self::default();
        tarball.tar.follow_symlinks(false);
        let mut entries = std::fs::read_dir(dir)
            .stack_err_with(|| format!("Tarball::from_dir_contents(dir: {dir:?})"))?
            .collect::<std::io::Result<Vec<_>>>()
            .stack()?;
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let name = entry.file_name();
            let file_type = entry.file_type().stack()?;
            if file_type.is_dir() {
                tarball
                    .tar
                    .append_dir_all(&name, entry.path())
                    .stack_err_with(|| format!("Tarball::from_dir_contents -> {name:?}"))?;
            } else {
                tarball
                    .tar
                    .append_path_with_name(entry.path(), &name)
                    .stack_err_with(|| format!("Tarball::from_dir_contents -> {name:?}"))?;
            }
            tarball.paths.insert(name.to_string_lossy().into_owned());
        }
        Ok(tarball)
    }

    /// Append a file that will go to the given `path`, with `mode` and the
    /// bytes of the `content` of the file
    pub fn append_file_bytes(
        &mut self,
        path: impl ToString,
        mode: u32,
        content: &[u8],
    ) -> Result<()> {
        let path = path.to_string();
        let header = &mut tar::Header::new_gnu();
        header.set_size(content.len() as _);
        header.set_mode(mode);
        header.set_cksum();
        self.paths.insert(path.clone());
        self.tar.append_data(header, path, content).stack()
    }

    /// Append an empty directory entry
    pub fn append_dir(&mut self, path: impl ToString) -> Result<()> {
        let path = path.to_string();
        let header = &mut tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Directory);
        header.set_size(0);
        header.set_mode(0o755);
        header.set_cksum();
        self.paths.insert(path.clone());
        self.tar.append_data(header, &path, std::io::empty()).stack()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    /// Get the bytes of a tarball
    pub fn into_tarball(self) -> Result<Vec<u8>> {
        self.tar.into_inner().stack()
    }
}

/// Unpacks a tar stream into `dest`, which must exist. This does blocking IO.
pub fn unpack(reader: impl Read, dest: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive
        .unpack(dest)
        .stack_err_with(|| format!("unpack(dest: {dest:?})"))
}

/// A blocking [Read] over chunks sent through a bounded channel, the end of
/// the stream is when all senders are dropped. Must not be read from inside an
/// async context.
#[derive(Debug)]
pub struct ChannelReader {
    rx: Receiver<Bytes>,
    current: Bytes,
}

impl ChannelReader {
    pub fn new(rx: Receiver<Bytes>) -> Self {
        Self {
            rx,
            current: Bytes::new(),
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        while !self.current.has_remaining() {
            match self.rx.blocking_recv() {
                Some(chunk) => self.current = chunk,
                None => return Ok(0),
            }
        }
        let len = buf.len().min(self.current.remaining());
        self.current.copy_to_slice(&mut buf[..len]);
        Ok(len)
    }
}
