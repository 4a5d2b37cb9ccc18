//! Shared fixtures for integration tests
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use modresolve::cache::{
    CacheManager, CacheSettings, DownloadListener, DownloadReport, FileResourceDownloader,
    ResolvedResource, ResourceDownloader, ResourceResolver,
};
use modresolve::module::{
    Artifact, Configuration, DescriptorParser, ModuleDescriptor, ModuleRevisionId,
    PublishedArtifact, TomlDescriptorParser,
};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

/// A repository and a cache under one temporary directory
pub struct TestRepo {
    pub temp_dir: TempDir,
    pub repo_root: PathBuf,
    pub cache_root: PathBuf,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let repo_root = temp_dir.path().join("repo");
        let cache_root = temp_dir.path().join("cache");
        fs::create_dir_all(&repo_root)?;
        Ok(TestRepo {
            temp_dir,
            repo_root,
            cache_root,
        })
    }

    /// Publish a module in the filesystem resolver's default layout
    pub fn publish(&self, org: &str, module: &str, revision: &str) -> ModuleRevisionId {
        let mrid = ModuleRevisionId::parts(org, module, revision);
        let mut md = ModuleDescriptor::new(mrid.clone());
        md.configurations.push(Configuration::new("default"));
        md.artifacts.push(PublishedArtifact {
            name: module.to_string(),
            artifact_type: "jar".to_string(),
            ext: "jar".to_string(),
            confs: Vec::new(),
        });
        let dir = self.repo_root.join(org).join(module).join(revision);
        TomlDescriptorParser
            .write(&md, &dir.join("descriptor.toml"))
            .expect("write descriptor");
        fs::write(dir.join(format!("{}.jar", module)), revision.as_bytes()).expect("write jar");
        mrid
    }

    pub fn cache(&self) -> CacheManager {
        self.cache_with_lock(modresolve::cache::lock::NO_LOCK)
    }

    pub fn cache_with_lock(&self, lock_strategy: &str) -> CacheManager {
        let settings = CacheSettings {
            lock_strategy: lock_strategy.to_string(),
            ..CacheSettings::default()
        };
        CacheManager::new(settings, Some(self.cache_root.clone()))
    }

    /// Write a loose file outside the repository layout
    pub fn file(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join("files").join(name);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, content).expect("write file");
        path
    }
}

pub fn jar(org: &str, module: &str, revision: &str) -> Artifact {
    Artifact::new(ModuleRevisionId::parts(org, module, revision), module, "jar", "jar")
}

/// Resolves artifacts by name to fixed resources, counting lookups
#[derive(Default)]
pub struct CountingResolver {
    resources: HashMap<String, ResolvedResource>,
    pub calls: AtomicUsize,
}

impl CountingResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(mut self, artifact_name: &str, resource: ResolvedResource) -> Self {
        self.resources.insert(artifact_name.to_string(), resource);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ResourceResolver for CountingResolver {
    fn resolve(&self, artifact: &Artifact) -> Result<Option<ResolvedResource>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.resources.get(&artifact.name).cloned())
    }
}

/// File copy with a configurable delay and optional failure, counting transfers
#[derive(Default)]
pub struct CountingDownloader {
    pub delay: Duration,
    /// Write a partial file then fail
    pub fail_after_partial_write: bool,
    pub calls: AtomicUsize,
}

impl CountingDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_after_partial_write: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ResourceDownloader for CountingDownloader {
    fn download(&self, artifact: &Artifact, resource: &ResolvedResource, dest: &Path) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        if self.fail_after_partial_write {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(dest, b"partial")?;
            return Err(anyhow!("connection reset while fetching {}", artifact));
        }
        FileResourceDownloader.download(artifact, resource, dest)
    }
}

/// Records listener events as `"<event> <artifact name>"`
#[derive(Default)]
pub struct RecordingListener {
    pub events: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().expect("listener mutex").clone()
    }

    fn push(&self, event: String) {
        self.events.lock().expect("listener mutex").push(event);
    }
}

impl DownloadListener for RecordingListener {
    fn need_artifact(&self, artifact: &Artifact) {
        self.push(format!("need {}", artifact.name));
    }

    fn start_artifact_download(&self, artifact: &Artifact, _resource: &ResolvedResource, _dest: &Path) {
        self.push(format!("start {}", artifact.name));
    }

    fn end_artifact_download(&self, report: &DownloadReport, _dest: &Path) {
        self.push(format!("end {} {}", report.artifact.name, report.status));
    }
}
