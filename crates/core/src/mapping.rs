//! Mapping configuration and the validated, read-only mapping table.
//!
//! The configuration artifact holds two relations: file -> destination
//! package and symbol -> qualifying package. [`MappingTable::load`] checks
//! them for consistency once; the table is immutable afterwards and shared
//! by every worker.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::sites::is_identifier;

/// Raw mapping artifact as written by the user (TOML or JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MappingConfig {
    /// Import path of the tree root, e.g. `github.com/acme/app`.
    #[serde(default)]
    pub module: String,
    /// Base directory for `[[files]]` paths, relative to the tree root.
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default = "default_true")]
    pub include_tests: bool,
    #[serde(default)]
    pub packages: Vec<PackageConfig>,
    #[serde(default)]
    pub files: Vec<FileConfig>,
    #[serde(default)]
    pub symbols: Vec<SymbolConfig>,
}

fn default_true() -> bool {
    true
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            module: String::new(),
            source: String::new(),
            exclude: Vec::new(),
            include_tests: true,
            packages: Vec::new(),
            files: Vec::new(),
            symbols: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub dir: String,
    #[serde(default)]
    pub import_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub path: String,
    pub package: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SymbolConfig {
    pub name: String,
    pub package: String,
    #[serde(default)]
    pub rename: Option<String>,
}

impl MappingConfig {
    /// Read a mapping file; the format is chosen by extension.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&text),
            Some("json") => Self::from_json_str(&text),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Normalise a tree-relative path: forward slashes, no `./` prefix, no
/// empty or trailing components.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|c| !c.is_empty() && *c != ".")
        .collect::<Vec<_>>()
        .join("/")
}

fn join_path(base: &str, rel: &str) -> String {
    normalize_path(&format!("{}/{}", base, rel))
}

/// A destination / qualifying package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Package {
    pub name: String,
    /// Directory relative to the tree root.
    pub dir: String,
    pub import_path: String,
}

/// One symbol binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingEntry {
    pub symbol: String,
    /// Name of the qualifying package, which is also the home package of
    /// the file that defines the symbol.
    pub package: String,
    /// Name the symbol is referenced by from outside its home package.
    pub exported: String,
}

impl MappingEntry {
    pub fn is_renamed(&self) -> bool {
        self.symbol != self.exported
    }
}

#[derive(Debug, Clone)]
pub struct MappingTable {
    module: String,
    packages: BTreeMap<String, Package>,
    by_dir: HashMap<String, String>,
    files: BTreeMap<String, String>,
    symbols: HashMap<String, MappingEntry>,
    /// Symbol names, longest first, then lexicographic.
    precedence: Vec<String>,
    /// (package, exported name) -> symbol.
    exports: HashMap<(String, String), String>,
    excludes: GlobSet,
    include_tests: bool,
}

impl MappingTable {
    /// Validate `config` and build the table.
    pub fn load(config: &MappingConfig) -> Result<Self, ConfigError> {
        let module = config.module.trim().trim_end_matches('/').to_string();

        let mut packages: BTreeMap<String, Package> = BTreeMap::new();
        let mut by_dir: HashMap<String, String> = HashMap::new();
        for pc in &config.packages {
            let dir = normalize_path(&pc.dir);
            let name = match &pc.name {
                Some(n) => n.clone(),
                None => dir.rsplit('/').next().unwrap_or_default().to_string(),
            };
            if !is_identifier(&name) {
                return Err(ConfigError::InvalidIdentifier {
                    name,
                    context: format!("package in '{}'", dir),
                });
            }
            let import_path = match &pc.import_path {
                Some(p) => p.clone(),
                None if module.is_empty() => return Err(ConfigError::MissingModule(name)),
                None if dir.is_empty() => module.clone(),
                None => format!("{}/{}", module, dir),
            };

            if let Some(existing) = packages.get(&name) {
                if existing.dir != dir {
                    return Err(ConfigError::DuplicatePackage {
                        name,
                        first: existing.dir.clone(),
                        second: dir,
                    });
                }
                continue;
            }
            if let Some(other) = by_dir.get(&dir) {
                return Err(ConfigError::DuplicatePackage {
                    name: dir.clone(),
                    first: other.clone(),
                    second: name,
                });
            }
            by_dir.insert(dir.clone(), name.clone());
            packages.insert(
                name.clone(),
                Package {
                    name,
                    dir,
                    import_path,
                },
            );
        }

        let mut files: BTreeMap<String, String> = BTreeMap::new();
        for fc in &config.files {
            let path = join_path(&config.source, &fc.path);
            if !packages.contains_key(&fc.package) {
                return Err(ConfigError::UnknownPackage {
                    context: format!("file '{}'", path),
                    package: fc.package.clone(),
                });
            }
            match files.get(&path) {
                Some(first) if *first != fc.package => {
                    return Err(ConfigError::AmbiguousFile {
                        file: path,
                        first: first.clone(),
                        second: fc.package.clone(),
                    })
                }
                Some(_) => {}
                None => {
                    files.insert(path, fc.package.clone());
                }
            }
        }

        let mut symbols: HashMap<String, MappingEntry> = HashMap::new();
        for sc in &config.symbols {
            if !is_identifier(&sc.name) {
                return Err(ConfigError::InvalidIdentifier {
                    name: sc.name.clone(),
                    context: "symbol".to_string(),
                });
            }
            if !packages.contains_key(&sc.package) {
                return Err(ConfigError::UnknownPackage {
                    context: format!("symbol '{}'", sc.name),
                    package: sc.package.clone(),
                });
            }
            let exported = sc.rename.clone().unwrap_or_else(|| sc.name.clone());
            if !is_identifier(&exported) {
                return Err(ConfigError::InvalidIdentifier {
                    name: exported,
                    context: format!("rename of '{}'", sc.name),
                });
            }

            if let Some(first) = symbols.get(&sc.name) {
                if first.package != sc.package {
                    return Err(ConfigError::AmbiguousSymbol {
                        symbol: sc.name.clone(),
                        first: first.package.clone(),
                        second: sc.package.clone(),
                    });
                }
                if first.exported != exported {
                    return Err(ConfigError::ConflictingRename {
                        symbol: sc.name.clone(),
                        first: first.exported.clone(),
                        second: exported,
                    });
                }
                continue;
            }
            symbols.insert(
                sc.name.clone(),
                MappingEntry {
                    symbol: sc.name.clone(),
                    package: sc.package.clone(),
                    exported,
                },
            );
        }

        let mut precedence: Vec<String> = symbols.keys().cloned().collect();
        precedence.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let mut exports: HashMap<(String, String), String> = HashMap::new();
        for name in &precedence {
            let entry = &symbols[name];
            let key = (entry.package.clone(), entry.exported.clone());
            if let Some(first) = exports.get(&key) {
                return Err(ConfigError::ExportCollision {
                    package: key.0,
                    exported: key.1,
                    first: first.clone(),
                    second: name.clone(),
                });
            }
            exports.insert(key, name.clone());
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in &config.exclude {
            let glob = Glob::new(pattern).map_err(|e| ConfigError::InvalidGlob {
                glob: pattern.clone(),
                message: e.to_string(),
            })?;
            builder.add(glob);
        }
        let excludes = builder.build().map_err(|e| ConfigError::InvalidGlob {
            glob: config.exclude.join(", "),
            message: e.to_string(),
        })?;

        Ok(MappingTable {
            module,
            packages,
            by_dir,
            files,
            symbols,
            precedence,
            exports,
            excludes,
            include_tests: config.include_tests,
        })
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Qualifying package of `symbol`.
    pub fn destination_for(&self, symbol: &str) -> Option<&Package> {
        let entry = self.symbols.get(symbol)?;
        self.packages.get(&entry.package)
    }

    pub fn entry(&self, symbol: &str) -> Option<&MappingEntry> {
        self.symbols.get(symbol)
    }

    /// Destination package of a file, by tree-relative path.
    pub fn file_destination(&self, file: &str) -> Option<&Package> {
        let name = self.files.get(&normalize_path(file))?;
        self.packages.get(name)
    }

    pub fn package(&self, name: &str) -> Option<&Package> {
        self.packages.get(name)
    }

    /// The configured package whose directory is exactly `dir`.
    pub fn package_for_dir(&self, dir: &str) -> Option<&Package> {
        let name = self.by_dir.get(&normalize_path(dir))?;
        self.packages.get(name)
    }

    /// True when `package` exports `name` according to the mapping.
    pub fn exports(&self, package: &str, name: &str) -> bool {
        self.exports
            .contains_key(&(package.to_string(), name.to_string()))
    }

    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    /// File assignments in path order.
    pub fn files(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(f, p)| (f.as_str(), p.as_str()))
    }

    /// Entries in qualification precedence order: longer names first, ties
    /// broken lexicographically.
    pub fn symbols(&self) -> impl Iterator<Item = &MappingEntry> {
        self.precedence.iter().map(|name| &self.symbols[name])
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty() && self.files.is_empty()
    }

    pub fn is_excluded(&self, rel_path: &str) -> bool {
        self.excludes.is_match(rel_path)
    }

    pub fn include_tests(&self) -> bool {
        self.include_tests
    }
}
