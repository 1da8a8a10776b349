use super::plugin::module_name;
use super::{Arg, CallKind, Module, Val};
use crate::error;
use crate::lang::Error;
use libloading::Library;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

type Result<T> = std::result::Result<T, Error>;

/// ## Shared library modules
///
/// Entry points looked up in the library:
///
/// - `int sblib_proc_count(void)`, `int sblib_func_count(void)`
/// - `int sblib_proc_getname(int index, char *name)` and the `func`
///   twin; `name` has room for 256 bytes, nonzero means found
/// - `int sblib_proc_exec(int index, int argc, RawArg *args, RawValue *ret)`
///   and the `func` twin; nonzero means success
/// - optional `int sblib_init(const char *path)`, `void sblib_close(void)`
///   and `const char *sblib_get_module_name(void)`
///
/// Values cross as [`RawValue`]. Strings handed to the module are only
/// valid during the call. Strings the module hands back must stay valid
/// until it returns; they are copied right away. Arrays and maps cross
/// as nil. A by-reference argument is only written back when the module
/// changed it, so values that cannot cross survive an untouched call.

pub const RAW_NIL: c_int = 0;
pub const RAW_INT: c_int = 1;
pub const RAW_REAL: c_int = 2;
pub const RAW_STR: c_int = 3;

#[repr(C)]
pub struct RawValue {
    pub kind: c_int,
    pub int: i64,
    pub real: f64,
    pub text: *const c_char,
}

#[repr(C)]
pub struct RawArg {
    pub by_ref: c_int,
    pub value: RawValue,
}

impl RawValue {
    fn nil() -> RawValue {
        RawValue {
            kind: RAW_NIL,
            int: 0,
            real: 0.0,
            text: std::ptr::null(),
        }
    }

    fn from_val(val: &Val, keep: &mut Vec<CString>) -> RawValue {
        let mut raw = RawValue::nil();
        match val {
            Val::Int(n) => {
                raw.kind = RAW_INT;
                raw.int = *n;
            }
            Val::Real(n) => {
                raw.kind = RAW_REAL;
                raw.real = *n;
            }
            Val::Str(s) => {
                let text = CString::new(s.as_str().replace('\0', "")).unwrap_or_default();
                raw.kind = RAW_STR;
                raw.text = text.as_ptr();
                keep.push(text);
            }
            Val::Ref(_) => {
                if let Ok(target) = val.deref() {
                    return RawValue::from_val(&target, keep);
                }
            }
            _ => {}
        }
        raw
    }

    /// # Safety
    /// `text` must be null or point at a NUL terminated string.
    pub unsafe fn to_val(&self) -> Val {
        match self.kind {
            RAW_INT => Val::Int(self.int),
            RAW_REAL => Val::Real(self.real),
            RAW_STR if !self.text.is_null() => {
                Val::from(CStr::from_ptr(self.text).to_string_lossy().into_owned())
            }
            RAW_STR => Val::from(""),
            _ => Val::Nil,
        }
    }
}

fn same(a: &Val, b: &Val) -> bool {
    match (a, b) {
        (Val::Nil, Val::Nil) => true,
        (Val::Int(a), Val::Int(b)) => a == b,
        (Val::Real(a), Val::Real(b)) => a.to_bits() == b.to_bits(),
        (Val::Str(a), Val::Str(b)) => a.as_str() == b.as_str(),
        _ => false,
    }
}

/// Raw arguments for a call, plus what each one looked like on the way
/// in. The strings in `keep` back the raw text pointers.
fn lend(args: &[Arg], keep: &mut Vec<CString>) -> (Vec<RawArg>, Vec<Val>) {
    let raw: Vec<RawArg> = args
        .iter()
        .map(|arg| RawArg {
            by_ref: arg.is_by_ref() as c_int,
            value: RawValue::from_val(&arg.value(), keep),
        })
        .collect();
    let sent = raw.iter().map(|raw| unsafe { raw.value.to_val() }).collect();
    (raw, sent)
}

/// Copy back the by-reference arguments the module changed.
fn write_back(args: &mut [Arg], raw: &[RawArg], sent: &[Val]) -> Result<()> {
    for ((arg, raw), sent) in args.iter_mut().zip(raw).zip(sent) {
        if !arg.is_by_ref() {
            continue;
        }
        let back = unsafe { raw.value.to_val() };
        if !same(&back, sent) {
            arg.store(back)?;
        }
    }
    Ok(())
}

type CountFn = unsafe extern "C" fn() -> c_int;
type NameFn = unsafe extern "C" fn(c_int, *mut c_char) -> c_int;
type ExecFn = unsafe extern "C" fn(c_int, c_int, *mut RawArg, *mut RawValue) -> c_int;
type InitFn = unsafe extern "C" fn(*const c_char) -> c_int;
type CloseFn = unsafe extern "C" fn();
type ModuleNameFn = unsafe extern "C" fn() -> *const c_char;

const NAME_SIZE: usize = 256;

pub struct DynamicModule {
    name: String,
    path: PathBuf,
    procs: Vec<String>,
    funcs: Vec<String>,
    proc_exec: Option<ExecFn>,
    func_exec: Option<ExecFn>,
    close: Option<CloseFn>,
    closed: bool,
    _lib: Library,
}

fn load_error(path: &Path, e: impl std::fmt::Display) -> Error {
    error!(ModuleError; &format!("LIB: error on loading {}: {}", path.display(), e))
}

fn read_names(lib: &Library, count: &[u8], get_name: &[u8]) -> Vec<String> {
    let mut names = vec![];
    unsafe {
        let count = match lib.get::<CountFn>(count) {
            Ok(count) => count(),
            Err(_) => return names,
        };
        let get_name = match lib.get::<NameFn>(get_name) {
            Ok(get_name) => get_name,
            Err(_) => return names,
        };
        for index in 0..count.max(0) {
            let mut buf = [0 as c_char; NAME_SIZE];
            if get_name(index, buf.as_mut_ptr()) == 0 {
                names.push(String::new());
                continue;
            }
            buf[NAME_SIZE - 1] = 0;
            names.push(CStr::from_ptr(buf.as_ptr()).to_string_lossy().into_owned());
        }
    }
    names
}

impl DynamicModule {
    pub fn open(path: &Path) -> Result<DynamicModule> {
        if !path.is_file() {
            return Err(error!(FileNotFound; &path.display().to_string()));
        }
        let lib = unsafe { Library::new(path) }.map_err(|e| load_error(path, e))?;
        let mut name = module_name(path);
        unsafe {
            if let Ok(get_name) = lib.get::<ModuleNameFn>(b"sblib_get_module_name\0") {
                let text = get_name();
                if !text.is_null() {
                    name = CStr::from_ptr(text).to_string_lossy().into_owned();
                }
            }
            if let Ok(init) = lib.get::<InitFn>(b"sblib_init\0") {
                let arg = CString::new(path.to_string_lossy().as_bytes()).unwrap_or_default();
                if init(arg.as_ptr()) == 0 {
                    return Err(load_error(path, "sblib_init failed"));
                }
            }
        }
        let procs = read_names(&lib, b"sblib_proc_count\0", b"sblib_proc_getname\0");
        let funcs = read_names(&lib, b"sblib_func_count\0", b"sblib_func_getname\0");
        let (proc_exec, func_exec, close) = unsafe {
            (
                lib.get::<ExecFn>(b"sblib_proc_exec\0").ok().map(|f| *f),
                lib.get::<ExecFn>(b"sblib_func_exec\0").ok().map(|f| *f),
                lib.get::<CloseFn>(b"sblib_close\0").ok().map(|f| *f),
            )
        };
        info!(
            module = %name,
            path = %path.display(),
            procs = procs.len(),
            funcs = funcs.len(),
            "library loaded"
        );
        Ok(DynamicModule {
            name,
            path: path.to_path_buf(),
            procs,
            funcs,
            proc_exec,
            func_exec,
            close,
            closed: false,
            _lib: lib,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Module for DynamicModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn count(&self, kind: CallKind) -> usize {
        match kind {
            CallKind::Proc => self.procs.len(),
            CallKind::Func => self.funcs.len(),
        }
    }

    fn name_of(&self, kind: CallKind, index: usize) -> Option<String> {
        let names = match kind {
            CallKind::Proc => &self.procs,
            CallKind::Func => &self.funcs,
        };
        names.get(index).filter(|name| !name.is_empty()).cloned()
    }

    fn exec(&mut self, kind: CallKind, index: usize, args: &mut [Arg], out: &mut Val) -> bool {
        let exec = match kind {
            CallKind::Proc => self.proc_exec,
            CallKind::Func => self.func_exec,
        };
        let exec = match exec {
            Some(exec) => exec,
            None => {
                *out = Val::from("missing entry point");
                return false;
            }
        };
        let mut keep = vec![];
        let (mut raw, sent) = lend(args, &mut keep);
        let mut ret = RawValue::nil();
        let ok = unsafe { exec(index as c_int, raw.len() as c_int, raw.as_mut_ptr(), &mut ret) };
        *out = unsafe { ret.to_val() };
        if let Err(error) = write_back(args, &raw, &sent) {
            *out = Val::from(error.to_string());
            return false;
        }
        ok != 0
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(close) = self.close {
            debug!(module = %self.name, "sblib_close");
            unsafe { close() };
        }
    }
}

impl Drop for DynamicModule {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_values() {
        let mut keep = vec![];
        let raw = RawValue::from_val(&Val::from("abc"), &mut keep);
        assert_eq!(raw.kind, RAW_STR);
        assert_eq!(unsafe { raw.to_val() }.to_string(), "abc");
        let raw = RawValue::from_val(&Val::Real(1.5), &mut keep);
        assert_eq!(unsafe { raw.to_val() }.to_string(), "1.5");
        let raw = RawValue::from_val(&Val::Map(crate::mach::Map::new()), &mut keep);
        assert!(unsafe { raw.to_val() }.is_nil());
    }

    #[test]
    fn test_write_back_only_changed_arguments() {
        use crate::mach::{Array, Cell};
        let list = Cell::new(Val::Array(Array::from_vec(vec![Val::from(1), Val::from(2)])));
        let count = Cell::new(Val::from(1));
        let fixed = Cell::new(Val::from("abc"));
        fixed.borrow_mut().constant = true;
        let mut args = vec![
            Arg::Flexible(list.clone()),
            Arg::Flexible(count.clone()),
            Arg::Flexible(fixed.clone()),
            Arg::Value(Val::from(7)),
        ];
        let mut keep = vec![];
        let (mut raw, sent) = lend(&args, &mut keep);
        assert_eq!(raw[0].value.kind, RAW_NIL);
        assert_eq!(raw[3].by_ref, 0);
        raw[1].value.int = 5;
        raw[3].value.int = 8;
        write_back(&mut args, &raw, &sent).unwrap();
        assert_eq!(list.borrow().val.to_string(), "[1,2]");
        assert_eq!(count.borrow().val.to_string(), "5");
        assert_eq!(fixed.borrow().val.to_string(), "abc");
        assert_eq!(args[3].value().to_string(), "7");

        let replaced = CString::new("new").unwrap();
        raw[0].value.kind = RAW_INT;
        raw[0].value.int = 3;
        raw[2].value.text = replaced.as_ptr();
        let e = write_back(&mut args, &raw, &sent).unwrap_err();
        assert!(e.is(crate::lang::ErrorCode::ConstantAssignment));
        assert_eq!(list.borrow().val.to_string(), "3");
        assert_eq!(fixed.borrow().val.to_string(), "abc");
    }

    #[test]
    fn test_missing_library() {
        let e = match DynamicModule::open(Path::new("/nonexistent/libnothing.so")) {
            Err(e) => e,
            Ok(_) => panic!("opened a missing library"),
        };
        assert!(e.is(crate::lang::ErrorCode::FileNotFound));
        assert_eq!(e.text(), "/nonexistent/libnothing.so");
    }
}
