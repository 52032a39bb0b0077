//! Config-tree glob matching: `**` spans directories, `*` one path segment,
//! `?` one character.

use crate::error::ConfigError;
use regex::Regex;
use std::path::{Path, PathBuf};

/// A parsed pattern: fixed directory part, recursion flag, file-name matcher.
#[derive(Debug)]
pub struct FilePattern {
    dir: String,
    recursive: bool,
    file_name: Regex,
}

impl FilePattern {
    pub fn parse(pattern: &str) -> Result<Self, ConfigError> {
        let pattern = pattern.trim().replace('\\', "/");
        let (dir, rest, recursive) = match pattern.find("**") {
            Some(idx) => {
                let rest = pattern[idx + 2..].trim_start_matches('/');
                (pattern[..idx].to_string(), rest.to_string(), true)
            }
            None => match pattern.rfind('/') {
                Some(idx) => (
                    pattern[..idx + 1].to_string(),
                    pattern[idx + 1..].to_string(),
                    false,
                ),
                None => (String::new(), pattern.clone(), false),
            },
        };
        let file_name = glob_to_regex(&rest)
            .map_err(|e| ConfigError::Load(format!("bad config pattern '{}': {}", pattern, e)))?;
        Ok(FilePattern {
            dir,
            recursive,
            file_name,
        })
    }

    /// Directory portion of the pattern, free of wildcards.
    pub fn dir(&self) -> &str {
        self.dir.trim_end_matches('/')
    }

    pub fn matches_file_name(&self, name: &str) -> bool {
        self.file_name.is_match(name)
    }

    /// Walk `base` (joined with the pattern's directory part) and collect
    /// matching files. A missing directory yields an empty list, not an
    /// error: absent optional config trees are warnings upstream.
    pub fn walk(&self, base: &Path) -> Vec<PathBuf> {
        let root = if self.dir().is_empty() {
            base.to_path_buf()
        } else {
            base.join(self.dir())
        };
        let mut found = Vec::new();
        if root.is_dir() {
            self.walk_dir(&root, &mut found);
        }
        found.sort();
        found
    }

    fn walk_dir(&self, dir: &Path, found: &mut Vec<PathBuf>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if self.recursive {
                    self.walk_dir(&path, found);
                }
            } else if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if self.file_name.is_match(name) {
                    found.push(path);
                }
            }
        }
    }
}

fn glob_to_regex(glob: &str) -> Result<Regex, regex::Error> {
    if glob.is_empty() {
        return Regex::new("^.*$");
    }
    let mut out = String::with_capacity(glob.len() + 8);
    out.push('^');
    for c in glob.chars() {
        match c {
            '*' => out.push_str("[^/]*"),
            '?' => out.push('.'),
            c if "\\.+()[]{}^$|".contains(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('$');
    Regex::new(&out)
}
