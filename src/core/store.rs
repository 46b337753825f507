//! Document store abstraction
//!
//! Retrieval stages never touch the filesystem directly. They consume three
//! narrow capability traits (`DocumentStore`, `LinkGraph`, `MetadataReader`)
//! and the binary wires in `VaultStore`, a filesystem adapter that walks a
//! markdown vault once at open time to build the title, tag and link maps.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use glob::Pattern;
use tracing::debug;
use walkdir::WalkDir;

use super::config::Config;
use super::frontmatter::{self, Frontmatter};
use super::wikilink::extract_wikilinks;

/// File metadata reported by the store
#[derive(Debug, Clone)]
pub struct FileStat {
    pub mtime: DateTime<Local>,
    pub ctime: DateTime<Local>,
    pub size: u64,
}

/// Enumerate and read notes. Paths are vault-relative with `/` separators.
pub trait DocumentStore: Send + Sync {
    /// All visible note paths, sorted for deterministic iteration
    fn list_notes(&self) -> Vec<String>;

    /// Read a note's text fresh from the backing store
    fn read_text(&self, path: &str) -> Result<String>;

    /// Modification/creation times and size
    fn stat(&self, path: &str) -> Result<FileStat>;

    /// Resolve a note title (file stem, case-insensitive) to a path
    fn resolve_title(&self, title: &str) -> Option<String>;

    /// The note the user currently has open, if the host knows one
    fn active_note(&self) -> Option<String> {
        None
    }
}

/// Outgoing-link and backlink lookups over resolved note paths
pub trait LinkGraph: Send + Sync {
    fn outgoing_links(&self, path: &str) -> Vec<String>;
    fn backlinks(&self, path: &str) -> Vec<String>;
}

/// Per-note tag and exclusion metadata
pub trait MetadataReader: Send + Sync {
    /// Tags from frontmatter and body, normalized (lowercase, no hash)
    fn tags(&self, path: &str) -> Vec<String>;

    /// Whether the note opted out of retrieval
    fn is_excluded(&self, path: &str) -> bool;
}

// ============================================================================
// Pattern filter
// ============================================================================

/// Compiled include/exclude globs
struct PatternFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl PatternFilter {
    fn from_config(config: &Config) -> Self {
        let compile = |globs: &[String]| {
            globs
                .iter()
                .filter_map(|g| match Pattern::new(g) {
                    Ok(p) => Some(p),
                    Err(e) => {
                        debug!("skipping invalid glob {:?}: {}", g, e);
                        None
                    }
                })
                .collect()
        };
        Self {
            include: compile(&config.patterns.include),
            exclude: compile(&config.patterns.exclude),
        }
    }

    fn allows(&self, rel_path: &str) -> bool {
        if self.exclude.iter().any(|p| p.matches(rel_path)) {
            return false;
        }
        if self.include.is_empty() {
            return true;
        }
        self.include.iter().any(|p| p.matches(rel_path))
    }
}

// ============================================================================
// Vault store
// ============================================================================

#[derive(Debug, Default, Clone)]
struct NoteMeta {
    tags: Vec<String>,
    excluded: bool,
}

/// Filesystem-backed store over a markdown vault
///
/// Opening walks the vault once to collect paths, titles, tags and the link
/// graph. Note content is always read fresh; only metadata is cached.
pub struct VaultStore {
    root: PathBuf,
    config: Config,
    notes: Vec<String>,
    titles: HashMap<String, String>,
    meta: HashMap<String, NoteMeta>,
    outgoing: HashMap<String, Vec<String>>,
    backlinks: HashMap<String, Vec<String>>,
    active: Option<String>,
}

impl VaultStore {
    /// Open a vault, loading `.loam.json` from its root
    pub fn open(root: &Path) -> Result<Self> {
        let config = Config::load(root);
        Self::open_with_config(root, config)
    }

    /// Open with an explicit config
    pub fn open_with_config(root: &Path, config: Config) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("vault root not found: {}", root.display()))?;
        let filter = PatternFilter::from_config(&config);

        let mut notes = Vec::new();
        for entry in WalkDir::new(&root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Ok(rel) = path.strip_prefix(&root) else {
                continue;
            };
            let rel = rel.to_string_lossy().replace('\\', "/");
            if filter.allows(&rel) {
                notes.push(rel);
            }
        }
        notes.sort();

        // Title map first so wikilinks can resolve to paths
        let mut titles: HashMap<String, String> = HashMap::new();
        for path in &notes {
            let stem = note_title(path).to_lowercase();
            titles.entry(stem).or_insert_with(|| path.clone());
        }

        let mut meta = HashMap::new();
        let mut outgoing: HashMap<String, Vec<String>> = HashMap::new();
        let mut backlinks: HashMap<String, Vec<String>> = HashMap::new();

        for path in &notes {
            let content = match fs::read_to_string(root.join(path)) {
                Ok(c) => c,
                Err(e) => {
                    debug!("skipping unreadable note {}: {}", path, e);
                    continue;
                }
            };

            let fm = Frontmatter::parse(&content);
            let mut tags: Vec<String> = fm.as_ref().map(|f| f.tags()).unwrap_or_default();
            for tag in frontmatter::extract_inline_tags(&content) {
                if !tags.contains(&tag) {
                    tags.push(tag);
                }
            }
            let excluded = fm.as_ref().map(|f| f.excluded()).unwrap_or(false);
            meta.insert(path.clone(), NoteMeta { tags, excluded });

            let mut targets = Vec::new();
            for link in extract_wikilinks(&content) {
                if let Some(target) = titles.get(&link.to_lowercase()) {
                    if target != path && !targets.contains(target) {
                        targets.push(target.clone());
                    }
                }
            }
            for target in &targets {
                backlinks.entry(target.clone()).or_default().push(path.clone());
            }
            outgoing.insert(path.clone(), targets);
        }

        Ok(Self {
            root,
            config,
            notes,
            titles,
            meta,
            outgoing,
            backlinks,
            active: None,
        })
    }

    /// Vault root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The loaded vault config
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Record which note the caller considers active
    pub fn set_active_note(&mut self, path: Option<String>) {
        self.active = path;
    }

    fn abs_path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }
}

impl DocumentStore for VaultStore {
    fn list_notes(&self) -> Vec<String> {
        self.notes.clone()
    }

    fn read_text(&self, path: &str) -> Result<String> {
        fs::read_to_string(self.abs_path(path)).with_context(|| format!("reading {}", path))
    }

    fn stat(&self, path: &str) -> Result<FileStat> {
        let metadata =
            fs::metadata(self.abs_path(path)).with_context(|| format!("stat {}", path))?;
        let mtime = DateTime::from(metadata.modified()?);
        let ctime = DateTime::from(metadata.created().unwrap_or(metadata.modified()?));
        Ok(FileStat {
            mtime,
            ctime,
            size: metadata.len(),
        })
    }

    fn resolve_title(&self, title: &str) -> Option<String> {
        self.titles.get(&title.trim().to_lowercase()).cloned()
    }

    fn active_note(&self) -> Option<String> {
        self.active.clone()
    }
}

impl LinkGraph for VaultStore {
    fn outgoing_links(&self, path: &str) -> Vec<String> {
        self.outgoing.get(path).cloned().unwrap_or_default()
    }

    fn backlinks(&self, path: &str) -> Vec<String> {
        self.backlinks.get(path).cloned().unwrap_or_default()
    }
}

impl MetadataReader for VaultStore {
    fn tags(&self, path: &str) -> Vec<String> {
        self.meta.get(path).map(|m| m.tags.clone()).unwrap_or_default()
    }

    fn is_excluded(&self, path: &str) -> bool {
        self.meta.get(path).map(|m| m.excluded).unwrap_or(false)
    }
}

/// File stem of a vault-relative path
pub fn note_title(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.strip_suffix(".md").unwrap_or(name)
}
