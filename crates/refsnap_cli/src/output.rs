//! Persistence of a fetched snapshot to disk.
//!
//! Four layouts, all opt-in via CLI flags: plain-text branch lists with
//! a change summary against the previous run, one JSON file per
//! repository, and one JSON file per branch or tag. Files are compared
//! against their existing content so unchanged entries stay untouched on
//! disk (and out of the change summary).

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

use serde::Serialize;

use refsnap::{Account, Repository};

/// Filesystem-safe version of a ref name (`/` becomes `__`).
fn sanitize(name: &str) -> String {
    name.replace('/', "__")
}

fn to_pretty_json<T: Serialize>(value: &T) -> io::Result<String> {
    serde_json::to_string_pretty(value).map_err(io::Error::other)
}

/// Write `content` to `path`, reporting whether the file changed.
fn write_if_changed(path: &Path, content: &str) -> io::Result<bool> {
    if let Ok(existing) = fs::read_to_string(path) {
        if existing == content {
            return Ok(false);
        }
    }
    fs::write(path, content)?;
    Ok(true)
}

/// Write each repo's branches to `<dir>/<repo>.txt`, one branch per
/// line, sorted. Prints a brief +added/-removed summary when a file
/// already existed with different content.
pub(crate) fn persist_branch_lists(account: &Account, dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    for repo in &account.repositories {
        let file = dir.join(format!("{}.txt", sanitize(&repo.name)));
        let new_set: BTreeSet<&str> = repo.branches.iter().map(|b| b.name.as_str()).collect();

        let (added, removed) = match fs::read_to_string(&file) {
            Ok(old) => {
                let old_set: BTreeSet<String> = old
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(String::from)
                    .collect();
                let added = new_set
                    .iter()
                    .filter(|b| !old_set.contains(**b))
                    .count();
                let removed = old_set
                    .iter()
                    .filter(|b| !new_set.contains(b.as_str()))
                    .count();
                (added, removed)
            }
            Err(_) => (0, 0),
        };

        let mut content: String = new_set.iter().copied().collect::<Vec<_>>().join("\n");
        content.push('\n');
        fs::write(&file, content)?;

        if added > 0 || removed > 0 {
            println!("{}: +{added} -{removed} branches updated", repo.name);
        }
    }
    Ok(())
}

/// Persist each repository's full JSON (repo metadata, branches, tags)
/// to `<dir>/<repo>.json`.
pub(crate) fn persist_repo_json(account: &Account, dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    for repo in &account.repositories {
        let file = dir.join(format!("{}.json", sanitize(&repo.name)));
        let mut serialized = to_pretty_json(repo)?;
        serialized.push('\n');
        if write_if_changed(&file, &serialized)? {
            println!("{}: JSON updated (size {} bytes)", repo.name, serialized.len());
        }
    }
    Ok(())
}

fn persist_ref_json<T: Serialize>(
    repo: &Repository,
    dir: &Path,
    refs: impl Iterator<Item = (String, T)>,
    what: &str,
) -> io::Result<()> {
    let repo_dir = dir.join(sanitize(&repo.name));
    fs::create_dir_all(&repo_dir)?;
    for (name, value) in refs {
        let file = repo_dir.join(format!("{}.json", sanitize(&name)));
        let mut serialized = to_pretty_json(&value)?;
        serialized.push('\n');
        if write_if_changed(&file, &serialized)? {
            println!("{}/{name}: {what} JSON updated", repo.name);
        }
    }
    Ok(())
}

/// Persist each branch to `<dir>/<repo>/<branch>.json`.
pub(crate) fn persist_branch_json(account: &Account, dir: &Path) -> io::Result<()> {
    for repo in &account.repositories {
        persist_ref_json(
            repo,
            dir,
            repo.branches.iter().map(|b| (b.name.clone(), b)),
            "branch",
        )?;
    }
    Ok(())
}

/// Persist each tag to `<dir>/<repo>/<tag>.json`.
pub(crate) fn persist_tag_json(account: &Account, dir: &Path) -> io::Result<()> {
    for repo in &account.repositories {
        persist_ref_json(
            repo,
            dir,
            repo.tags.iter().map(|t| (t.name.clone(), t)),
            "tag",
        )?;
    }
    Ok(())
}
