#![deny(warnings)]

//! Functions resolved from shared libraries, to be put in a
//! `FunctionRegistry`. The library stays loaded while any function
//! obtained from it is alive.

use crate::error::EvaluationError;
use crate::functions::{LegacyFn, LegacyFunction, NativeFunction};
use libloading::{Library, Symbol};
use std::path::Path;
use std::sync::Arc;

type Fn0 = unsafe extern "C" fn() -> f64;
type Fn1 = unsafe extern "C" fn(f64) -> f64;
type Fn2 = unsafe extern "C" fn(f64, f64) -> f64;
type Fn3 = unsafe extern "C" fn(f64, f64, f64) -> f64;
type Fn4 = unsafe extern "C" fn(f64, f64, f64, f64) -> f64;

fn link_error<E: ToString>(symbol: &str, e: E) -> EvaluationError {
    EvaluationError::Link {
        symbol: symbol.to_string(),
        reason: e.to_string(),
    }
}

// 'None' looks symbols up in the running process (libc, libm, ...)
fn open(path: Option<&Path>, symbol: &str) -> Result<Arc<Library>, EvaluationError> {
    let library = match path {
        Some(path) => unsafe { Library::new(path) }.map_err(|e| link_error(symbol, e))?,
        None => this_process(symbol)?,
    };
    Ok(Arc::new(library))
}

#[cfg(unix)]
fn this_process(_symbol: &str) -> Result<Library, EvaluationError> {
    Ok(libloading::os::unix::Library::this().into())
}

#[cfg(windows)]
fn this_process(symbol: &str) -> Result<Library, EvaluationError> {
    libloading::os::windows::Library::this()
        .map(Library::from)
        .map_err(|e| link_error(symbol, e))
}

fn lookup<T: Copy>(library: &Library, symbol: &str) -> Result<T, EvaluationError> {
    let found: Symbol<T> = unsafe { library.get(symbol.as_bytes()) }.map_err(|e| link_error(symbol, e))?;
    Ok(*found)
}

/// Load `double symbol(double, ...)` taking `arity` (up to 4) arguments.
///
/// # Safety
///
/// The symbol must be a C function with exactly that signature.
pub unsafe fn load_native(
    path: Option<&Path>,
    symbol: &str,
    arity: usize,
) -> Result<NativeFunction, EvaluationError> {
    let library = open(path, symbol)?;
    log::debug!("linking {}/{} from {:?}", symbol, arity, path);
    Ok(match arity {
        0 => {
            let f: Fn0 = lookup(&library, symbol)?;
            NativeFunction::new(0, move |_| {
                let _library = &library;
                unsafe { f() }
            })
        }
        1 => {
            let f: Fn1 = lookup(&library, symbol)?;
            NativeFunction::new(1, move |args| {
                let _library = &library;
                unsafe { f(args[0]) }
            })
        }
        2 => {
            let f: Fn2 = lookup(&library, symbol)?;
            NativeFunction::new(2, move |args| {
                let _library = &library;
                unsafe { f(args[0], args[1]) }
            })
        }
        3 => {
            let f: Fn3 = lookup(&library, symbol)?;
            NativeFunction::new(3, move |args| {
                let _library = &library;
                unsafe { f(args[0], args[1], args[2]) }
            })
        }
        4 => {
            let f: Fn4 = lookup(&library, symbol)?;
            NativeFunction::new(4, move |args| {
                let _library = &library;
                unsafe { f(args[0], args[1], args[2], args[3]) }
            })
        }
        _ => return Err(link_error(symbol, format!("unsupported arity {}", arity))),
    })
}

/// Load `double symbol(const double* args, int nargs, int* status)`.
///
/// # Safety
///
/// The symbol must have that signature and honour the `LegacyFunction`
/// contract.
pub unsafe fn load_legacy(
    path: Option<&Path>,
    symbol: &str,
    arity: usize,
) -> Result<LegacyFunction, EvaluationError> {
    let library = open(path, symbol)?;
    let f: LegacyFn = lookup(&library, symbol)?;
    log::debug!("linking legacy {}/{} from {:?}", symbol, arity, path);
    Ok(LegacyFunction::new(arity, f).owned_by(library))
}

///////////////////////////////////////////////////////////////////////////////
