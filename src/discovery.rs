//! Discovery of descriptor resources
//!
//! A resource is the raw bytes of an encoded `FileDescriptorSet`, as written
//! by `protoc --descriptor_set_out` or `prost-build`. The registry asks its
//! discovery for resources once and builds its catalog from them.

use std::path::{Path, PathBuf};

use include_dir::Dir;
use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::DiscoveryConfig;
use crate::error::Result;

/// One discovered descriptor resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Where it came from, for log messages
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Resource {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Source of descriptor resources
pub trait ResourceDiscovery: Send + Sync {
    /// Every resource matching this discovery's naming convention, in a
    /// stable order
    fn discover(&self) -> Result<Vec<Resource>>;
}

/// Walks directories for files whose names match a pattern
#[derive(Debug, Clone)]
pub struct DirectoryDiscovery {
    roots: Vec<PathBuf>,
    pattern: Regex,
}

impl DirectoryDiscovery {
    pub fn new(roots: Vec<PathBuf>, pattern: &str) -> Result<Self> {
        Ok(Self {
            roots,
            pattern: Regex::new(pattern)?,
        })
    }

    pub fn from_config(config: &DiscoveryConfig) -> Result<Self> {
        Self::new(config.roots.clone(), &config.pattern)
    }

    fn matches(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .map(|name| self.pattern.is_match(name))
            .unwrap_or(false)
    }
}

impl ResourceDiscovery for DirectoryDiscovery {
    fn discover(&self) -> Result<Vec<Resource>> {
        let mut resources = Vec::new();
        for root in &self.roots {
            if !root.exists() {
                debug!(root = %root.display(), "Discovery root does not exist");
                continue;
            }
            for entry in WalkDir::new(root)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                if !entry.file_type().is_file() || !self.matches(path) {
                    continue;
                }
                match std::fs::read(path) {
                    Ok(bytes) => resources.push(Resource::new(path.display().to_string(), bytes)),
                    Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable resource"),
                }
            }
        }
        debug!(count = resources.len(), "Discovered descriptor resources");
        Ok(resources)
    }
}

/// Resources compiled into the binary with `include_dir!`
#[derive(Debug, Clone)]
pub struct EmbeddedDiscovery {
    dir: &'static Dir<'static>,
    pattern: Regex,
}

impl EmbeddedDiscovery {
    pub fn new(dir: &'static Dir<'static>, pattern: &str) -> Result<Self> {
        Ok(Self {
            dir,
            pattern: Regex::new(pattern)?,
        })
    }
}

fn collect_embedded(dir: &Dir<'static>, pattern: &Regex, resources: &mut Vec<Resource>) {
    for file in dir.files() {
        let path = file.path();
        let matched = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| pattern.is_match(name))
            .unwrap_or(false);
        if matched {
            resources.push(Resource::new(path.display().to_string(), file.contents()));
        }
    }
    for subdir in dir.dirs() {
        collect_embedded(subdir, pattern, resources);
    }
}

impl ResourceDiscovery for EmbeddedDiscovery {
    fn discover(&self) -> Result<Vec<Resource>> {
        let mut resources = Vec::new();
        collect_embedded(self.dir, &self.pattern, &mut resources);
        resources.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(resources)
    }
}

/// Fixed in-memory resources
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    resources: Vec<Resource>,
}

impl StaticDiscovery {
    pub fn new(resources: Vec<Resource>) -> Self {
        Self { resources }
    }
}

impl ResourceDiscovery for StaticDiscovery {
    fn discover(&self) -> Result<Vec<Resource>> {
        Ok(self.resources.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_directory_discovery_filters_by_pattern() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("b.desc"), b"b").unwrap();
        fs::write(dir.path().join("nested/a.desc"), b"a").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::write(dir.path().join("with-dash.desc"), b"x").unwrap();

        let discovery = DirectoryDiscovery::new(vec![dir.path().to_path_buf()], r"^\w+\.desc$").unwrap();
        let found = discovery.discover().unwrap();
        let bytes: Vec<_> = found.iter().map(|r| r.bytes.clone()).collect();
        assert_eq!(bytes, vec![b"b".to_vec(), b"a".to_vec()]);
    }

    static DESCRIPTORS: Dir<'static> = include_dir::include_dir!("$CARGO_MANIFEST_DIR/tests/fixtures/descriptors");

    #[test]
    fn test_embedded_discovery_walks_subdirectories() {
        let discovery = EmbeddedDiscovery::new(&DESCRIPTORS, r"^\w+\.desc$").unwrap();
        let found = discovery.discover().unwrap();
        let names: Vec<_> = found.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["nested/pong.desc", "ping.desc"]);
        assert!(found.iter().all(|r| !r.bytes.is_empty()));
    }

    #[test]
    fn test_missing_root_is_empty() {
        let discovery = DirectoryDiscovery::new(vec![PathBuf::from("/definitely/not/here")], r"\.desc$").unwrap();
        assert!(discovery.discover().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        assert!(DirectoryDiscovery::new(vec![], "(").is_err());
    }
}
