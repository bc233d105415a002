//! Program store: load-once cache of compiled scripts.

use crate::error::LoadError;
use crate::lower::Lowering;
use log::debug;
use patchlang_common::{Program, StaticTable};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Where script text comes from.
pub trait ScriptSource {
    /// Return the source text of the script called `name`.
    fn read(&self, name: &str) -> io::Result<String>;
}

/// Scripts on disk under a project root.
///
/// `enemy` resolves to `<root>/scripts/enemy.patch`. A name starting
/// with `\` is a path relative to the root, used as written.
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
}

impl FsSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path for a script name.
    pub fn path_for(&self, name: &str) -> PathBuf {
        match name.strip_prefix('\\') {
            Some(custom) => self.root.join(custom),
            None => self.root.join("scripts").join(format!("{name}.patch")),
        }
    }
}

impl ScriptSource for FsSource {
    fn read(&self, name: &str) -> io::Result<String> {
        std::fs::read_to_string(self.path_for(name))
    }
}

/// Scripts held in memory, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    scripts: HashMap<String, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, text: &str) -> Self {
        self.insert(name, text);
        self
    }

    pub fn insert(&mut self, name: &str, text: &str) {
        self.scripts.insert(name.to_string(), text.to_string());
    }
}

impl ScriptSource for MemorySource {
    fn read(&self, name: &str) -> io::Result<String> {
        self.scripts.get(name).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no script named '{name}'"))
        })
    }
}

/// Owns compiled programs and the static string table they index into.
///
/// Every program is compiled at most once and then shared through `Rc`
/// by every entity that runs it.
pub struct ProgramStore {
    source: Box<dyn ScriptSource>,
    programs: HashMap<String, Rc<Program>>,
    statics: StaticTable,
    /// Scripts currently being compiled, innermost last.
    loading: Vec<String>,
}

impl ProgramStore {
    pub fn new(source: impl ScriptSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            programs: HashMap::new(),
            statics: StaticTable::new(),
            loading: Vec::new(),
        }
    }

    /// Return the compiled program for `name`, compiling it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] when the source cannot be read, when it does
    /// not compile, or when includes form a cycle.
    pub fn get_or_compile(&mut self, name: &str) -> Result<Rc<Program>, LoadError> {
        if let Some(program) = self.programs.get(name) {
            return Ok(Rc::clone(program));
        }
        let text = self.source.read(name).map_err(|e| LoadError::Source {
            script: name.to_string(),
            message: e.to_string(),
        })?;
        self.compile_text(name, &text)
    }

    /// Compile `text` as the script `name`, replacing any cached program
    /// of that name.
    pub fn compile_text(&mut self, name: &str, text: &str) -> Result<Rc<Program>, LoadError> {
        if self.loading.iter().any(|loading| loading == name) {
            return Err(LoadError::IncludeCycle {
                script: self.loading.last().cloned().unwrap_or_default(),
                include: name.to_string(),
            });
        }

        self.loading.push(name.to_string());
        let result = Lowering::new(self, name).run(text);
        self.loading.pop();

        let program = Rc::new(result?);
        debug!("compiled {}\n{}", name, program.transcript());
        self.programs.insert(name.to_string(), Rc::clone(&program));
        Ok(program)
    }

    /// A previously compiled program.
    pub fn get(&self, name: &str) -> Option<Rc<Program>> {
        self.programs.get(name).cloned()
    }

    pub fn statics(&self) -> &StaticTable {
        &self.statics
    }

    pub(crate) fn statics_mut(&mut self) -> &mut StaticTable {
        &mut self.statics
    }

    /// Number of compiled programs.
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_paths() {
        let source = FsSource::new("/game");
        assert_eq!(
            source.path_for("enemy"),
            PathBuf::from("/game/scripts/enemy.patch")
        );
        assert_eq!(
            source.path_for("\\lib/util.txt"),
            PathBuf::from("/game/lib/util.txt")
        );
    }

    #[test]
    fn memory_source_reports_missing() {
        let source = MemorySource::new().with("a", "start");
        assert_eq!(source.read("a").unwrap(), "start");
        assert_eq!(
            source.read("b").unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[test]
    fn programs_are_cached() {
        let mut store = ProgramStore::new(MemorySource::new().with("a", "start\nend"));
        let first = store.get_or_compile("a").unwrap();
        let second = store.get_or_compile("a").unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn missing_script_is_a_load_error() {
        let mut store = ProgramStore::new(MemorySource::new());
        let err = store.get_or_compile("ghost").unwrap_err();
        assert!(matches!(err, LoadError::Source { ref script, .. } if script == "ghost"));
    }

    #[test]
    fn self_include_is_a_cycle() {
        let mut store = ProgramStore::new(MemorySource::new().with("a", "include a"));
        assert_eq!(
            store.get_or_compile("a").unwrap_err(),
            LoadError::IncludeCycle {
                script: "a".into(),
                include: "a".into()
            }
        );
        assert!(store.is_empty());
    }
}
