//! Dependency Resolver: parses the Cangjie package-manifest graph
//! (`cjpm.toml`) to build `initializationOptions` for the LSP server
//! (spec §4.11).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{CangjieError, Result};
use crate::models::{ModuleOption, PackageRequires, PathUri};

#[derive(Debug, Deserialize, Default)]
struct CjpmManifest {
    #[serde(default)]
    workspace: Option<WorkspaceSection>,
    #[serde(default)]
    dependencies: HashMap<String, DependencySpec>,
    #[serde(rename = "dev-dependencies", default)]
    dev_dependencies: HashMap<String, DependencySpec>,
    #[serde(default)]
    target: HashMap<String, TargetSection>,
    #[serde(default)]
    ffi: Option<FfiSection>,
}

#[derive(Debug, Deserialize)]
struct WorkspaceSection {
    #[serde(default)]
    members: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TargetSection {
    #[serde(default)]
    dependencies: HashMap<String, DependencySpec>,
    #[serde(rename = "dev-dependencies", default)]
    dev_dependencies: HashMap<String, DependencySpec>,
    #[serde(rename = "bin-dependencies", default)]
    bin_dependencies: HashMap<String, DependencySpec>,
}

#[derive(Debug, Deserialize, Default)]
struct FfiSection {
    #[serde(default)]
    java: HashMap<String, toml::Value>,
    #[serde(default)]
    c: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
enum DependencySpec {
    Version(String),
    Path { path: String },
    Git { git: String },
}

#[derive(Debug, Deserialize, Default)]
struct CjpmLock {
    #[serde(default)]
    git: HashMap<String, String>, // name -> resolved commit
}

pub struct ResolvedDependencies {
    pub modules: HashMap<String, ModuleOption>,
    /// PATH-style accumulated native-library search directories (for C FFI).
    pub native_search_path: String,
}

pub struct DependencyResolver {
    visited: HashSet<String>,
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self { visited: HashSet::new() }
    }

    pub fn resolve(mut self, workspace_root: &Path) -> Result<ResolvedDependencies> {
        let mut modules = HashMap::new();
        let mut path_entries: Vec<String> = Vec::new();

        let manifest_path = workspace_root.join("cjpm.toml");
        let manifest = read_manifest(&manifest_path)?;

        if let Some(ws) = &manifest.workspace {
            for member in &ws.members {
                let member_dir = expand_vars(member, workspace_root);
                let member_path = workspace_root.join(&member_dir);
                let mut member_manifest = read_manifest(&member_path.join("cjpm.toml"))?;
                // Root-level dependencies and target.*.bin-dependencies merge into
                // every member; root takes precedence on name collisions.
                for (name, dep) in manifest.dependencies.iter() {
                    member_manifest.dependencies.insert(name.clone(), dep.clone());
                }
                for (target_key, target_section) in manifest.target.iter() {
                    let member_target = member_manifest.target.entry(target_key.clone()).or_default();
                    for (name, dep) in target_section.bin_dependencies.iter() {
                        member_target.bin_dependencies.insert(name.clone(), dep.clone());
                    }
                }
                self.resolve_module(&member_path, &member_manifest, &mut modules, &mut path_entries)?;
            }
        } else {
            self.resolve_module(workspace_root, &manifest, &mut modules, &mut path_entries)?;
        }

        Ok(ResolvedDependencies {
            modules,
            native_search_path: path_entries.join(":"),
        })
    }

    fn resolve_module(
        &mut self,
        module_dir: &Path,
        manifest: &CjpmManifest,
        modules: &mut HashMap<String, ModuleOption>,
        path_entries: &mut Vec<String>,
    ) -> Result<()> {
        let module_uri = dir_to_uri(module_dir);
        if self.visited.contains(&module_uri) {
            return Ok(());
        }
        self.visited.insert(module_uri.clone());

        let mut option = ModuleOption {
            name: module_dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default(),
            ..Default::default()
        };

        let lock = read_lock(&module_dir.join("cjpm.lock"));

        let mut all_deps: Vec<(&String, &DependencySpec)> = manifest.dependencies.iter().collect();
        all_deps.extend(manifest.dev_dependencies.iter());
        for target in manifest.target.values() {
            all_deps.extend(target.dependencies.iter());
            all_deps.extend(target.dev_dependencies.iter());
        }

        for (name, spec) in all_deps {
            match spec {
                DependencySpec::Version(version) => {
                    let home = std::env::var("HOME").unwrap_or_default();
                    let resolved = PathBuf::from(home).join(".cjpm/repository").join(format!("{name}-{version}"));
                    option.requires.insert(name.clone(), PathUri { path: dir_to_uri(&resolved) });
                }
                DependencySpec::Path { path } => {
                    let resolved = module_dir.join(expand_vars(path, module_dir));
                    option.requires.insert(name.clone(), PathUri { path: dir_to_uri(&resolved) });
                    self.recurse_into(&resolved, modules, path_entries)?;
                }
                DependencySpec::Git { git: _ } => {
                    let commit = lock.as_ref().and_then(|l| l.git.get(name));
                    match commit {
                        Some(commit) => {
                            let home = std::env::var("HOME").unwrap_or_default();
                            let resolved = PathBuf::from(home).join(".cjpm/git").join(name).join(commit);
                            option.requires.insert(name.clone(), PathUri { path: dir_to_uri(&resolved) });
                            self.recurse_into(&resolved, modules, path_entries)?;
                        }
                        None => {
                            tracing::warn!(
                                name,
                                "cjpm.lock missing while a git dependency exists; dependency resolution for this entry is skipped"
                            );
                        }
                    }
                }
            }
        }

        for target in manifest.target.values() {
            for (name, spec) in &target.bin_dependencies {
                match spec {
                    DependencySpec::Path { path } => {
                        let resolved = module_dir.join(expand_vars(path, module_dir));
                        option.package_requires.path_option.push(dir_to_uri(&resolved));
                        if let Some(parent) = resolved.parent() {
                            path_entries.push(parent.display().to_string());
                        }
                    }
                    DependencySpec::Version(version) => {
                        option.package_requires.package_option.insert(name.clone(), version.clone());
                    }
                    DependencySpec::Git { .. } => {}
                }
            }
        }

        if let Some(ffi) = &manifest.ffi {
            if !ffi.java.is_empty() {
                option.java_requires = Some(ffi.java.keys().cloned().collect());
            }
            for path in ffi.c.values() {
                path_entries.push(expand_vars(path, module_dir));
            }
        }

        modules.insert(module_uri, option);
        Ok(())
    }

    fn recurse_into(
        &mut self,
        dir: &Path,
        modules: &mut HashMap<String, ModuleOption>,
        path_entries: &mut Vec<String>,
    ) -> Result<()> {
        let manifest_path = dir.join("cjpm.toml");
        if !manifest_path.exists() {
            // A missing cjpm.toml is tolerated (empty ModuleOption).
            return Ok(());
        }
        let manifest = read_manifest(&manifest_path)?;
        self.resolve_module(dir, &manifest, modules, path_entries)
    }
}

fn read_manifest(path: &Path) -> Result<CjpmManifest> {
    if !path.exists() {
        return Ok(CjpmManifest::default());
    }
    let content = std::fs::read_to_string(path).map_err(CangjieError::backend)?;
    toml::from_str(&content).map_err(|e| CangjieError::ConfigError(format!("malformed {}: {e}", path.display())))
}

fn read_lock(path: &Path) -> Option<CjpmLock> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

/// Expands `${NAME}` placeholders: `${WORKSPACE}` resolves to `base`, every
/// other name is looked up as an environment variable (empty if unset).
fn expand_vars(input: &str, base: &Path) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                let value = if name == "WORKSPACE" {
                    base.display().to_string()
                } else {
                    std::env::var(name).unwrap_or_default()
                };
                out.push_str(&value);
                rest = &after[end + 1..];
            }
            None => {
                out.push_str("${");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out.replace('\\', "/")
}

fn dir_to_uri(dir: &Path) -> String {
    let absolute = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(dir)
    };
    format!("file://{}", absolute.display().to_string().replace('\\', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn package_mode_resolves_single_module() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "cjpm.toml", "[dependencies]\n");
        let resolved = DependencyResolver::new().resolve(tmp.path()).unwrap();
        assert_eq!(resolved.modules.len(), 1);
    }

    #[test]
    fn missing_manifest_is_tolerated_as_empty_module() {
        let tmp = TempDir::new().unwrap();
        let resolved = DependencyResolver::new().resolve(tmp.path()).unwrap();
        assert_eq!(resolved.modules.len(), 1);
        let (_, option) = resolved.modules.iter().next().unwrap();
        assert!(option.requires.is_empty());
    }

    #[test]
    fn workspace_mode_merges_root_dependencies_into_members() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("member_a")).unwrap();
        write(
            tmp.path(),
            "cjpm.toml",
            "[workspace]\nmembers = [\"member_a\"]\n[dependencies]\nshared = \"1.0.0\"\n",
        );
        write(&tmp.path().join("member_a"), "cjpm.toml", "[dependencies]\n");
        let resolved = DependencyResolver::new().resolve(tmp.path()).unwrap();
        let member_option = resolved
            .modules
            .values()
            .find(|m| m.name == "member_a")
            .expect("member_a module present");
        assert!(member_option.requires.contains_key("shared"));
    }

    #[test]
    fn cycle_via_path_dependency_does_not_infinite_loop() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("a")).unwrap();
        std::fs::create_dir_all(tmp.path().join("b")).unwrap();
        write(&tmp.path().join("a"), "cjpm.toml", "[dependencies]\nb = { path = \"../b\" }\n");
        write(&tmp.path().join("b"), "cjpm.toml", "[dependencies]\na = { path = \"../a\" }\n");
        let resolved = DependencyResolver::new().resolve(&tmp.path().join("a")).unwrap();
        assert_eq!(resolved.modules.len(), 2);
    }
}
