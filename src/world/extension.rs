//! Extension modules.
//!
//! An extension is a named bundle of host-side behavior: it can register
//! plugin formats, build graphs or drive the engine. Extensions either live
//! in the host binary and are registered directly, or ship as shared
//! libraries that export a `modular_host_module_load` entry point (see
//! [`declare_extension!`](crate::declare_extension)).
//!
//! Shared libraries are Rust-to-Rust: the extension must be built against
//! the same version of this crate with the same compiler.

use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::os::raw::c_void;
use std::path::{Path, PathBuf};

use libloading::Library;
use thiserror::Error;

use super::World;

/// Name of the symbol every extension library exports.
pub const ENTRY_SYMBOL: &str = "modular_host_module_load";

/// Signature of [`ENTRY_SYMBOL`]. Returns a `Box<Box<dyn Extension>>`
/// turned into a raw pointer, or null on failure.
pub type ExtensionEntry = unsafe extern "C" fn() -> *mut c_void;

/// Errors from loading or running extensions. None of them are fatal to
/// the world.
#[derive(Debug, Error)]
pub enum ExtensionError {
    #[error("extension module '{name}' not found in {searched:?}")]
    NotFound { name: String, searched: Vec<PathBuf> },

    #[error("failed to open extension library '{path}': {reason}")]
    Library { path: PathBuf, reason: String },

    #[error("extension library '{path}' does not export '{symbol}'")]
    MissingSymbol { path: PathBuf, symbol: &'static str },

    #[error("extension module '{0}' is not loaded")]
    NotLoaded(String),

    #[error("extension module '{name}' failed: {reason}")]
    Failed { name: String, reason: String },
}

impl ExtensionError {
    pub fn failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ExtensionError::Failed {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// A host extension.
///
/// All methods run on the control thread.
pub trait Extension {
    fn name(&self) -> &str;

    /// Called once, right after the extension is created.
    fn load(&mut self, _world: &mut World) -> Result<(), ExtensionError> {
        Ok(())
    }

    /// Does the extension's work. May be called any number of times.
    fn run(&mut self, _world: &mut World) -> Result<(), ExtensionError> {
        Ok(())
    }

    /// Called once, before the extension is dropped.
    fn unload(&mut self) {}
}

/// Exports a `modular_host_module_load` entry point from an extension
/// library.
///
/// ```ignore
/// struct Scope;
/// impl modular_host::world::Extension for Scope {
///     fn name(&self) -> &str { "scope" }
/// }
/// modular_host::declare_extension!(Scope);
/// ```
#[macro_export]
macro_rules! declare_extension {
    ($constructor:expr) => {
        #[no_mangle]
        pub extern "C" fn modular_host_module_load() -> *mut ::std::os::raw::c_void {
            let extension: ::std::boxed::Box<dyn $crate::world::Extension> =
                ::std::boxed::Box::new($constructor);
            ::std::boxed::Box::into_raw(::std::boxed::Box::new(extension))
                as *mut ::std::os::raw::c_void
        }
    };
}

/// A loaded extension and the library its code lives in.
pub(crate) struct LoadedExtension {
    // Dropped before the library is unmapped.
    pub(crate) extension: Box<dyn Extension>,
    pub(crate) library: Option<Library>,
}

impl LoadedExtension {
    pub(crate) fn in_process(extension: Box<dyn Extension>) -> Self {
        Self {
            extension,
            library: None,
        }
    }

    /// Runs the extension's `unload` and drops it, handing back its library.
    ///
    /// Plugin formats and processors the extension created may still point
    /// into the library, so the caller keeps it mapped until those are gone.
    pub(crate) fn unload(self) -> Option<Library> {
        let LoadedExtension {
            mut extension,
            library,
        } = self;
        extension.unload();
        drop(extension);
        library
    }

    pub(crate) fn source(&self) -> &'static str {
        if self.library.is_some() {
            "library"
        } else {
            "in-process"
        }
    }
}

/// Platform file name of the library for module `name`
/// (`libname.so`, `name.dll`, `libname.dylib`).
pub fn library_file_name(name: &str) -> String {
    format!("{DLL_PREFIX}{name}{DLL_SUFFIX}")
}

/// Finds the library for `name` in the first directory that has one.
pub fn find_module(name: &str, search_path: &[PathBuf]) -> Result<PathBuf, ExtensionError> {
    let file_name = library_file_name(name);
    search_path
        .iter()
        .map(|dir| dir.join(&file_name))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| ExtensionError::NotFound {
            name: name.to_string(),
            searched: search_path.to_vec(),
        })
}

/// Opens an extension library and creates its extension.
pub(crate) fn open_library(path: &Path) -> Result<LoadedExtension, ExtensionError> {
    // SAFETY: loading a library runs its initializers. Extension libraries
    // are trusted code placed on the module path by the user.
    let library = unsafe { Library::new(path) }.map_err(|e| ExtensionError::Library {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    // SAFETY: the entry point has the `ExtensionEntry` signature and hands
    // over a leaked `Box<Box<dyn Extension>>`, which we take back here.
    let extension = unsafe {
        let entry = library
            .get::<ExtensionEntry>(ENTRY_SYMBOL.as_bytes())
            .map_err(|_| ExtensionError::MissingSymbol {
                path: path.to_path_buf(),
                symbol: ENTRY_SYMBOL,
            })?;
        let raw = entry();
        if raw.is_null() {
            return Err(ExtensionError::failed(
                path.display().to_string(),
                "entry point returned no extension",
            ));
        }
        *Box::from_raw(raw as *mut Box<dyn Extension>)
    };

    Ok(LoadedExtension {
        extension,
        library: Some(library),
    })
}
