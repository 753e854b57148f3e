//! Resolving `@"file"` and `@<file>` includes to readable streams.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Where an include name is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeKind {
    /// `@<name>`: the global search folders.
    Global,
    /// `@"name"`: relative to the including file.
    Relative,
}

/// An opened include.
pub struct Included {
    /// Where the stream came from, if it is a file. Used for nested
    /// relative includes and to reject recursive ones.
    pub path: Option<PathBuf>,
    pub reader: Box<dyn Read>,
}

/// Turns an include name into a stream.
pub trait IncludeResolver {
    /// `current` is the file containing the include, if known.
    fn resolve(&self, kind: IncludeKind, name: &str, current: Option<&Path>) -> io::Result<Included>;
}

/// Rejects every include.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIncludes;

impl IncludeResolver for NoIncludes {
    fn resolve(&self, _kind: IncludeKind, _name: &str, _current: Option<&Path>) -> io::Result<Included> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "includes are disabled"))
    }
}

/// Opens includes from the filesystem.
#[derive(Debug, Clone, Default)]
pub struct SearchPath {
    global: Vec<PathBuf>,
}

impl SearchPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a folder searched by `@<name>` includes, after those added before.
    pub fn with_global(mut self, dir: impl Into<PathBuf>) -> Self {
        self.global.push(dir.into());
        self
    }

    fn open(path: PathBuf) -> io::Result<Included> {
        let file = File::open(&path)?;
        Ok(Included {
            path: Some(path),
            reader: Box::new(file),
        })
    }
}

impl IncludeResolver for SearchPath {
    fn resolve(&self, kind: IncludeKind, name: &str, current: Option<&Path>) -> io::Result<Included> {
        match kind {
            IncludeKind::Global => {
                for dir in &self.global {
                    let candidate = dir.join(name);
                    if candidate.is_file() {
                        return Self::open(candidate);
                    }
                }
                Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("not found in {} search folder(s)", self.global.len()),
                ))
            }
            IncludeKind::Relative => {
                let base = current.and_then(Path::parent).unwrap_or(Path::new("."));
                Self::open(base.join(name))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("trellis-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn read(included: Included) -> String {
        let mut text = String::new();
        let mut reader = included.reader;
        reader.read_to_string(&mut text).unwrap();
        text
    }

    #[test]
    fn test_search_path() {
        let global = scratch_dir("global");
        let local = scratch_dir("local");
        std::fs::write(global.join("shared.cfg"), "shared: 1").unwrap();
        std::fs::write(local.join("near.cfg"), "near: 2").unwrap();

        let search = SearchPath::new().with_global(&global);
        let shared = search.resolve(IncludeKind::Global, "shared.cfg", None).unwrap();
        assert_eq!(shared.path.as_deref(), Some(global.join("shared.cfg").as_path()));
        assert_eq!(read(shared), "shared: 1");

        let current = local.join("app.cfg");
        let near = search
            .resolve(IncludeKind::Relative, "near.cfg", Some(&current))
            .unwrap();
        assert_eq!(read(near), "near: 2");

        let err = search.resolve(IncludeKind::Global, "near.cfg", None).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_no_includes() {
        assert!(NoIncludes.resolve(IncludeKind::Relative, "a.cfg", None).is_err());
    }
}
