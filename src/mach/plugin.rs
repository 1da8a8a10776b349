use super::{Arg, DynamicModule, Val};
use crate::error;
use crate::lang::Error;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, info, warn};

type Result<T> = std::result::Result<T, Error>;

pub type ModuleId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Proc,
    Func,
}

impl CallKind {
    fn keyword(self) -> &'static str {
        match self {
            CallKind::Proc => "SUB",
            CallKind::Func => "FUNC",
        }
    }
}

/// ## External routines
///
/// A module exports numbered procedures and functions. Arguments are
/// bare variables passed by reference or values owned by the caller;
/// the result goes in `out`. A `false` return is a failure, and when
/// `out` holds a string it is the error message.

pub trait Module {
    fn name(&self) -> &str;
    fn count(&self, kind: CallKind) -> usize;
    fn name_of(&self, kind: CallKind, index: usize) -> Option<String>;
    fn exec(&mut self, kind: CallKind, index: usize, args: &mut [Arg], out: &mut Val) -> bool;
    fn close(&mut self) {}
}

struct Entry {
    module: Box<dyn Module>,
    names: HashMap<(CallKind, Rc<str>), usize>,
}

/// Registry of loaded modules. Dropping it closes every module.
#[derive(Default)]
pub struct Plugins {
    entries: Vec<Option<Entry>>,
}

#[cfg(windows)]
const LIB_EXT: &str = ".dll";
#[cfg(target_os = "macos")]
const LIB_EXT: &str = ".dylib";
#[cfg(not(any(windows, target_os = "macos")))]
const LIB_EXT: &str = ".so";

/// Module files end in the platform library extension and carry no `-`
/// in their name, which rules out versioned system libraries.
pub fn is_module(file_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    lower.len() > LIB_EXT.len() && lower.ends_with(LIB_EXT) && !file_name.contains('-')
}

/// Name a module file registers under: no extension, no `lib` prefix.
pub fn module_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match stem.strip_prefix("lib") {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => stem,
    }
}

impl Plugins {
    pub fn new() -> Plugins {
        Plugins::default()
    }

    /// Import a module's exports and make it callable.
    pub fn register(&mut self, module: Box<dyn Module>) -> ModuleId {
        let mut names = HashMap::new();
        for &kind in &[CallKind::Proc, CallKind::Func] {
            for index in 0..module.count(kind) {
                if let Some(name) = module.name_of(kind, index) {
                    let name: Rc<str> = name.to_ascii_uppercase().into();
                    names.insert((kind, name), index);
                }
            }
        }
        if names.is_empty() {
            warn!(module = module.name(), "module exports nothing");
        }
        info!(module = module.name(), exports = names.len(), "module registered");
        self.entries.push(Some(Entry { module, names }));
        self.entries.len() - 1
    }

    pub fn open(&mut self, path: &Path) -> Result<ModuleId> {
        let module = DynamicModule::open(path)?;
        Ok(self.register(Box::new(module)))
    }

    /// Module files in `dirs`, sorted within each directory.
    /// Unreadable directories are skipped.
    pub fn candidates(dirs: &[PathBuf]) -> Vec<PathBuf> {
        let mut found = vec![];
        for dir in dirs {
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    debug!(dir = %dir.display(), error = %e, "module path unreadable");
                    continue;
                }
            };
            let mut paths: Vec<PathBuf> = entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| {
                    path.file_name()
                        .map_or(false, |name| is_module(&name.to_string_lossy()))
                })
                .collect();
            paths.sort();
            found.append(&mut paths);
        }
        found
    }

    /// Open every module file found in `dirs`. Files that fail to load
    /// are logged and skipped.
    pub fn scan(&mut self, dirs: &[PathBuf]) -> Vec<ModuleId> {
        let mut ids = vec![];
        for path in Plugins::candidates(dirs) {
            match self.open(&path) {
                Ok(id) => ids.push(id),
                Err(e) => warn!(path = %path.display(), error = %e, "module not loaded"),
            }
        }
        ids
    }

    fn entry(&self, id: ModuleId) -> Result<&Entry> {
        match self.entries.get(id) {
            Some(Some(entry)) => Ok(entry),
            _ => Err(error!(UndefinedUserFunction; &format!("LIB: NO MODULE {}", id))),
        }
    }

    pub fn module_name(&self, id: ModuleId) -> Option<&str> {
        self.entry(id).ok().map(|entry| entry.module.name())
    }

    /// Index of an exported routine. Accepts `NAME` or `MODULE.NAME`
    /// in any case.
    pub fn lookup(&self, id: ModuleId, kind: CallKind, name: &str) -> Option<usize> {
        let entry = self.entry(id).ok()?;
        let mut name = name.to_ascii_uppercase();
        let prefix = format!("{}.", entry.module.name().to_ascii_uppercase());
        if name.starts_with(&prefix) {
            name = name[prefix.len()..].to_string();
        }
        entry.names.get(&(kind, name.as_str().into())).copied()
    }

    pub fn invoke(
        &mut self,
        id: ModuleId,
        kind: CallKind,
        index: usize,
        args: &mut [Arg],
        out: &mut Val,
    ) -> Result<()> {
        let count = self.entry(id)?.module.count(kind);
        let entry = match self.entries.get_mut(id) {
            Some(Some(entry)) => entry,
            _ => return Err(error!(InternalError)),
        };
        let name = entry.module.name().to_string();
        if index >= count {
            let message = format!("LIB:{}: NO {} #{}", name, kind.keyword(), index);
            return Err(error!(UndefinedUserFunction; &message));
        }
        if entry.module.exec(kind, index, args, out) {
            return Ok(());
        }
        let message = match out {
            Val::Str(s) => format!("LIB:{}: {}", name, s.as_str()),
            _ => format!(
                "LIB:{}: Unspecified error calling {}",
                name,
                kind.keyword()
            ),
        };
        out.free();
        Err(error!(ModuleError; &message))
    }

    /// Run every close hook and release the modules.
    pub fn close(&mut self) {
        for slot in self.entries.iter_mut() {
            if let Some(mut entry) = slot.take() {
                debug!(module = entry.module.name(), "module closed");
                entry.module.close();
            }
        }
    }
}

impl Drop for Plugins {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Echo {
        closed: Rc<Cell<bool>>,
    }

    impl Module for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn count(&self, kind: CallKind) -> usize {
            match kind {
                CallKind::Proc => 1,
                CallKind::Func => 1,
            }
        }
        fn name_of(&self, kind: CallKind, _index: usize) -> Option<String> {
            match kind {
                CallKind::Proc => Some("fail".to_string()),
                CallKind::Func => Some("twice".to_string()),
            }
        }
        fn exec(&mut self, kind: CallKind, _index: usize, args: &mut [Arg], out: &mut Val) -> bool {
            match kind {
                CallKind::Func => {
                    let n = args[0].value().to_int().unwrap_or(0);
                    *out = Val::from(n * 2);
                    true
                }
                CallKind::Proc => false,
            }
        }
        fn close(&mut self) {
            self.closed.set(true);
        }
    }

    #[test]
    fn test_register_and_invoke() {
        let closed = Rc::new(Cell::new(false));
        let mut plugins = Plugins::new();
        let id = plugins.register(Box::new(Echo {
            closed: closed.clone(),
        }));
        assert_eq!(plugins.lookup(id, CallKind::Func, "Echo.Twice"), Some(0));
        assert_eq!(plugins.lookup(id, CallKind::Proc, "twice"), None);
        let mut out = Val::Nil;
        let mut args = vec![Arg::Value(Val::from(21))];
        plugins
            .invoke(id, CallKind::Func, 0, &mut args, &mut out)
            .unwrap();
        assert_eq!(out.to_string(), "42");
        let e = plugins
            .invoke(id, CallKind::Proc, 0, &mut [], &mut out)
            .unwrap_err();
        assert_eq!(e.text(), "LIB:echo: Unspecified error calling SUB");
        let e = plugins
            .invoke(id, CallKind::Func, 7, &mut [], &mut out)
            .unwrap_err();
        assert!(e.is(crate::lang::ErrorCode::UndefinedUserFunction));
        drop(plugins);
        assert!(closed.get());
    }

    #[test]
    fn test_module_files() {
        let ext = LIB_EXT;
        assert!(is_module(&format!("libdemo{}", ext)));
        assert!(!is_module(&format!("libdemo-1.2{}", ext)));
        assert!(!is_module("demo.txt"));
        assert_eq!(module_name(Path::new(&format!("/x/libdemo{}", ext))), "demo");
        assert_eq!(module_name(Path::new(&format!("/x/gtk{}", ext))), "gtk");
    }
}
