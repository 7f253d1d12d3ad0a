//! The package registry: every descriptor known to a configuration run.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use extpkg_schema::{DescriptorError, PackageDescriptor, PackageName};

use crate::error::{ConfigureError, Result};

/// Descriptors keyed by package name.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    packages: BTreeMap<PackageName, Arc<PackageDescriptor>>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.toml` descriptor in `dir`.
    ///
    /// The file stem must match the declared package name, so `med.toml`
    /// always describes `med`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read, a descriptor is
    /// invalid, two files declare the same package or a dependency names a
    /// package with no descriptor.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        paths.sort();

        let mut registry = Self::new();
        for path in paths {
            let descriptor = PackageDescriptor::from_file(&path)?;
            let stem = path.file_stem().map(|s| s.to_string_lossy().to_lowercase());
            if stem.as_deref() != Some(descriptor.name().as_str()) {
                return Err(DescriptorError::Invalid {
                    package: descriptor.name().to_string(),
                    reason: format!("declared in {}", path.display()),
                }
                .into());
            }
            registry.insert(descriptor)?;
        }
        registry.validate()?;

        tracing::debug!("loaded {} descriptors from {}", registry.len(), dir.display());
        Ok(registry)
    }

    /// Add one descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if a descriptor with the same name is already present.
    pub fn insert(&mut self, descriptor: PackageDescriptor) -> Result<()> {
        let name = descriptor.name().clone();
        if self.packages.contains_key(&name) {
            return Err(DescriptorError::Invalid {
                package: name.to_string(),
                reason: "declared twice".to_string(),
            }
            .into());
        }
        self.packages.insert(name, Arc::new(descriptor));
        Ok(())
    }

    /// Check that every declared dependency has a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigureError::UnknownPackage`] for the first dangling
    /// dependency.
    pub fn validate(&self) -> Result<()> {
        for descriptor in self.packages.values() {
            if let Some(dep) = descriptor
                .deps()
                .iter()
                .find(|dep| !self.packages.contains_key(*dep))
            {
                return Err(ConfigureError::UnknownPackage(dep.clone()));
            }
        }
        Ok(())
    }

    /// Descriptor of `name`.
    pub fn get(&self, name: &str) -> Option<&Arc<PackageDescriptor>> {
        self.packages.get(name)
    }

    /// Whether `name` has a descriptor.
    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    /// Package names in alphabetical order.
    pub fn names(&self) -> impl Iterator<Item = &PackageName> {
        self.packages.keys()
    }

    /// Descriptors in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<PackageDescriptor>> {
        self.packages.values()
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Whether no descriptor is loaded.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Static dependency-first order for `roots` and everything they depend on.
    ///
    /// This only looks at declared dependencies; no probing happens. A
    /// package appears once, after all of its dependencies.
    ///
    /// # Errors
    ///
    /// Returns an error if a package is unknown or a cycle is found.
    pub fn plan(&self, roots: &[PackageName]) -> Result<Vec<PackageName>> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut visiting = Vec::new();

        for name in roots {
            self.plan_recursive(name, &mut order, &mut visited, &mut visiting)?;
        }
        Ok(order)
    }

    fn plan_recursive(
        &self,
        name: &PackageName,
        order: &mut Vec<PackageName>,
        visited: &mut HashSet<PackageName>,
        visiting: &mut Vec<PackageName>,
    ) -> Result<()> {
        if visited.contains(name) {
            return Ok(());
        }
        if let Some(pos) = visiting.iter().position(|n| n == name) {
            let mut chain = visiting[pos..].to_vec();
            chain.push(name.clone());
            return Err(ConfigureError::CyclicDependency { chain });
        }

        let descriptor = self
            .get(name)
            .ok_or_else(|| ConfigureError::UnknownPackage(name.clone()))?;

        visiting.push(name.clone());
        for dep in descriptor.deps() {
            self.plan_recursive(dep, order, visited, visiting)?;
        }
        visiting.pop();

        visited.insert(name.clone());
        order.push(name.clone());
        Ok(())
    }
}
