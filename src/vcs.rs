//! Version-control collaborator.
//!
//! Issue folders live inside the working tree of the surrounding repository.
//! New message files are staged as they are written; `add --commit` records
//! the issue folder in a commit of its own.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use git2::{ErrorCode, Oid, Repository, Signature, Tree};
use tracing::{debug, warn};

use crate::error::Result;

/// Repository operations `mt` needs.
pub trait Vcs {
    /// Top of the working tree.
    fn root(&self) -> &Path;

    /// Stage new or changed files.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be updated.
    fn stage(&self, paths: &[PathBuf]) -> Result<()>;

    /// Commit exactly `paths` (files, or folders walked recursively).
    ///
    /// # Errors
    ///
    /// Returns an error if the commit cannot be created.
    fn commit(&self, paths: &[PathBuf], message: &str) -> Result<()>;

    /// `Name <email>` from the repository configuration, if set.
    fn username(&self) -> Option<String>;
}

/// Pick a collaborator for `cwd`: the enclosing git repository if there is
/// one, otherwise the plain directory.
#[must_use]
pub fn discover(cwd: &Path, user: Option<&str>) -> Box<dyn Vcs> {
    match GitVcs::discover(cwd, user) {
        Ok(git) => Box::new(git),
        Err(e) => {
            debug!(error = %e, "No git repository, using plain directory");
            Box::new(PlainDir::new(cwd))
        }
    }
}

/// Working tree root of the repository containing `cwd`, else `cwd`.
#[must_use]
pub fn repo_root(cwd: &Path) -> PathBuf {
    Repository::discover(cwd)
        .ok()
        .and_then(|repo| repo.workdir().map(Path::to_path_buf))
        .map_or_else(|| cwd.to_path_buf(), |p| dunce::canonicalize(&p).unwrap_or(p))
}

/// Commit message for an issue.
#[must_use]
pub fn commit_message(issue_id: &str, subject: &str) -> String {
    format!("Issue {issue_id}: {subject}")
}

// ============================================================================
// Git
// ============================================================================

pub struct GitVcs {
    repo: Repository,
    root: PathBuf,
    user: Option<String>,
}

impl std::fmt::Debug for GitVcs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitVcs").field("root", &self.root).finish_non_exhaustive()
    }
}

impl GitVcs {
    /// Open the repository containing `cwd`.
    ///
    /// # Errors
    ///
    /// Returns `Vcs` if there is no repository or it is bare.
    pub fn discover(cwd: &Path, user: Option<&str>) -> Result<Self> {
        let repo = Repository::discover(cwd)?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| git2::Error::from_str("bare repository has no working tree"))?;
        let root = dunce::canonicalize(workdir).unwrap_or_else(|_| workdir.to_path_buf());
        debug!(root = %root.display(), "Using git repository");
        Ok(Self {
            repo,
            root,
            user: user.map(ToString::to_string),
        })
    }

    /// Path of `path` relative to the working tree, with `/` separators.
    fn relative(&self, path: &Path) -> Option<String> {
        let abs = dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let rel = abs.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("/"))
        }
    }

    fn signature(&self) -> Result<Signature<'static>> {
        if let Some((name, email)) = self.user.as_deref().and_then(split_user) {
            return Ok(Signature::now(&name, &email)?);
        }
        match self.repo.signature() {
            Ok(sig) => Ok(sig.to_owned()),
            Err(_) => Ok(Signature::now(
                mailtrack_lib::util::TRACKER_TAG,
                &format!("{}@{}", mailtrack_lib::util::TRACKER_TAG, mailtrack_lib::util::hostname()),
            )?),
        }
    }

    fn head_commit(&self) -> Result<Option<git2::Commit<'_>>> {
        match self.repo.head().and_then(|h| h.peel_to_commit()) {
            Ok(commit) => Ok(Some(commit)),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl Vcs for GitVcs {
    fn root(&self) -> &Path {
        &self.root
    }

    fn stage(&self, paths: &[PathBuf]) -> Result<()> {
        let mut index = self.repo.index()?;
        let mut staged = 0usize;
        for path in paths {
            let Some(rel) = self.relative(path) else {
                warn!(path = %path.display(), "Not inside the repository, not staging");
                continue;
            };
            index.add_path(Path::new(&rel))?;
            staged += 1;
        }
        if staged > 0 {
            index.write()?;
            debug!(count = staged, "Staged files");
        }
        Ok(())
    }

    fn commit(&self, paths: &[PathBuf], message: &str) -> Result<()> {
        let mut updates: Vec<(String, Oid)> = Vec::new();
        for file in paths.iter().flat_map(|p| tracked_files(p)) {
            let Some(rel) = self.relative(&file) else {
                warn!(path = %file.display(), "Not inside the repository, not committing");
                continue;
            };
            let blob = self.repo.blob(&fs::read(&file)?)?;
            updates.push((rel, blob));
        }
        if updates.is_empty() {
            debug!("Nothing to commit");
            return Ok(());
        }

        let parent = self.head_commit()?;
        let base = parent.as_ref().map(git2::Commit::tree).transpose()?;
        let tree_oid = build_tree(&self.repo, base.as_ref(), &updates)?;
        let tree = self.repo.find_tree(tree_oid)?;
        let sig = self.signature()?;
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;
        debug!(commit = %oid, files = updates.len(), "Committed issue");

        // Keep the index in step with the new commit for these paths.
        let mut index = self.repo.index()?;
        for (rel, _) in &updates {
            index.add_path(Path::new(rel))?;
        }
        index.write()?;
        Ok(())
    }

    fn username(&self) -> Option<String> {
        let config = self.repo.config().ok()?;
        let name = config.get_string("user.name").ok()?;
        match config.get_string("user.email") {
            Ok(email) => Some(format!("{name} <{email}>")),
            Err(_) => Some(name),
        }
    }
}

/// Split `Name <email>` into its parts.
fn split_user(user: &str) -> Option<(String, String)> {
    let lt = user.find('<')?;
    let gt = user[lt..].find('>')? + lt;
    let name = user[..lt].trim();
    let email = user[lt + 1..gt].trim();
    if email.is_empty() {
        return None;
    }
    let name = if name.is_empty() { email } else { name };
    Some((name.to_string(), email.to_string()))
}

/// Message files under `path`; staging folders and dot files are skipped.
fn tracked_files(path: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if path.is_file() {
        out.push(path.to_path_buf());
        return out;
    }
    let Ok(listing) = fs::read_dir(path) else {
        return out;
    };
    let mut entries: Vec<PathBuf> = listing.filter_map(|e| e.ok().map(|e| e.path())).collect();
    entries.sort();
    for entry in entries {
        let name = entry.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        if name.starts_with('.') || name == "tmp" {
            continue;
        }
        out.extend(tracked_files(&entry));
    }
    out
}

/// Write a tree equal to `base` with `updates` applied, recursing per
/// leading path component.
fn build_tree(repo: &Repository, base: Option<&Tree<'_>>, updates: &[(String, Oid)]) -> Result<Oid> {
    let mut direct: Vec<(&str, Oid)> = Vec::new();
    let mut nested: HashMap<&str, Vec<(String, Oid)>> = HashMap::new();
    for (path, oid) in updates {
        match path.split_once('/') {
            Some((head, rest)) => nested.entry(head).or_default().push((rest.to_string(), *oid)),
            None => direct.push((path.as_str(), *oid)),
        }
    }

    let mut builder = repo.treebuilder(base)?;
    for (name, oid) in direct {
        builder.insert(name, oid, 0o100_644)?;
    }
    for (dir, sub) in nested {
        let sub_tree = base
            .and_then(|t| t.get_name(dir))
            .filter(|e| e.kind() == Some(git2::ObjectType::Tree))
            .and_then(|e| repo.find_tree(e.id()).ok());
        let oid = build_tree(repo, sub_tree.as_ref(), &sub)?;
        builder.insert(dir, oid, 0o040_000)?;
    }
    Ok(builder.write()?)
}

// ============================================================================
// Plain directory
// ============================================================================

/// No repository: nothing is staged or committed.
#[derive(Debug, Clone)]
pub struct PlainDir {
    root: PathBuf,
}

impl PlainDir {
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            root: dunce::canonicalize(root).unwrap_or_else(|_| root.to_path_buf()),
        }
    }
}

impl Vcs for PlainDir {
    fn root(&self) -> &Path {
        &self.root
    }

    fn stage(&self, paths: &[PathBuf]) -> Result<()> {
        debug!(count = paths.len(), "No repository, skipping stage");
        Ok(())
    }

    fn commit(&self, _paths: &[PathBuf], message: &str) -> Result<()> {
        debug!(message, "No repository, skipping commit");
        Ok(())
    }

    fn username(&self) -> Option<String> {
        None
    }
}
