//! Locating and opening libcsound64 at runtime.

use std::env;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libc::c_int;
use libloading::Library;
use log::{debug, warn};
use once_cell::sync::OnceCell;

use crate::enums::Status;
use crate::error::{Error, Result};
use csound_sys::{self as raw, CsoundApi};

/// Environment variable naming the library file to open.
pub const CSOUND_LIB: &str = "CSOUND_LIB";
/// Environment variable naming a directory that contains the library.
pub const CSOUND_LIB_DIR: &str = "CSOUND_LIB_DIR";

bitflags! {
    /// Flags for `csoundInitialize`.
    pub struct InitFlags: i32 {
        const NO_SIGNAL_HANDLER = raw::CSOUNDINIT_NO_SIGNAL_HANDLER;
        const NO_ATEXIT = raw::CSOUNDINIT_NO_ATEXIT;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Platform {
    MacOs,
    Other,
}

impl Platform {
    fn current() -> Platform {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Other
        }
    }
}

/// Where to look for the Csound library and how to initialize it.
#[derive(Debug, Clone)]
pub struct LibraryConfig {
    pub library_path: Option<PathBuf>,
    pub search_dirs: Vec<PathBuf>,
    pub init_flags: InitFlags,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        let search_dirs = if cfg!(unix) {
            vec![PathBuf::from("/usr/lib"), PathBuf::from("/usr/local/lib")]
        } else {
            Vec::new()
        };
        LibraryConfig {
            library_path: None,
            search_dirs,
            // Csound must not install signal handlers or atexit hooks in the host
            init_flags: InitFlags::NO_SIGNAL_HANDLER | InitFlags::NO_ATEXIT,
        }
    }
}

impl LibraryConfig {
    pub fn new() -> Self {
        LibraryConfig::default()
    }

    /// Defaults overridden by `CSOUND_LIB` and `CSOUND_LIB_DIR`.
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var_os(key))
    }

    fn from_vars<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let mut config = LibraryConfig::default();
        if let Some(path) = var(CSOUND_LIB).filter(|v| !v.is_empty()) {
            config.library_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = var(CSOUND_LIB_DIR).filter(|v| !v.is_empty()) {
            config.search_dirs.insert(0, PathBuf::from(dir));
        }
        config
    }

    pub fn library_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.library_path = Some(path.into());
        self
    }

    /// Appends a directory to search after the ones already configured.
    pub fn search_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.search_dirs.push(dir.into());
        self
    }

    pub fn init_flags(mut self, flags: InitFlags) -> Self {
        self.init_flags = flags;
        self
    }

    /// Paths to try, most specific first. The last entry is the bare file
    /// name, which leaves the lookup to the platform loader.
    pub fn candidates(&self) -> Vec<PathBuf> {
        let home = env::var_os("HOME").map(PathBuf::from);
        self.candidates_for(Platform::current(), home.as_deref())
    }

    fn candidates_for(&self, platform: Platform, home: Option<&Path>) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(path) = &self.library_path {
            paths.push(path.clone());
        }
        if platform == Platform::MacOs {
            if let Some(home) = home {
                paths.push(home.join(raw::MACOS_FRAMEWORK));
            }
            paths.push(Path::new("/").join(raw::MACOS_FRAMEWORK));
        }
        for dir in &self.search_dirs {
            paths.push(dir.join(raw::LIBRARY_FILE_NAME));
        }
        paths.push(PathBuf::from(raw::LIBRARY_FILE_NAME));

        let mut unique: Vec<PathBuf> = Vec::with_capacity(paths.len());
        for path in paths {
            if !unique.contains(&path) {
                unique.push(path);
            }
        }
        unique
    }
}

/// An opened Csound library together with its resolved symbol table.
///
/// Instances created from it hold an `Arc`, so the library stays mapped
/// until the last of them is destroyed.
pub struct CsoundLib {
    api: CsoundApi,
    path: PathBuf,
    _lib: Library,
}

static GLOBAL: OnceCell<Arc<CsoundLib>> = OnceCell::new();

impl CsoundLib {
    /// Opens the first candidate that loads, resolves the symbol table and
    /// initializes the library.
    pub fn load(config: &LibraryConfig) -> Result<CsoundLib> {
        let tried = config.candidates();
        for path in &tried {
            debug!("trying csound library at {}", path.display());
            let lib = match unsafe { Library::new(path) } {
                Ok(lib) => lib,
                Err(e) => {
                    warn!("cannot open {}: {}", path.display(), e);
                    continue;
                }
            };
            let api = unsafe { CsoundApi::load(&lib) }?;
            let csound = CsoundLib {
                api,
                path: path.clone(),
                _lib: lib,
            };
            csound.initialize(config.init_flags)?;
            debug!(
                "loaded csound {} (api {}) from {}",
                csound.version(),
                csound.api_version(),
                csound.path.display()
            );
            return Ok(csound);
        }
        warn!("no csound library could be opened");
        Err(Error::LibraryNotFound { tried })
    }

    /// The process-wide library, loaded on first use from
    /// [`LibraryConfig::from_env`]. A failed load is retried on the next call.
    pub fn global() -> Result<Arc<CsoundLib>> {
        GLOBAL
            .get_or_try_init(|| CsoundLib::load(&LibraryConfig::from_env()).map(Arc::new))
            .map(Arc::clone)
    }

    fn initialize(&self, flags: InitFlags) -> Result<()> {
        let code = unsafe { self.api.csoundInitialize(flags.bits() as c_int) };
        // a positive value means another caller already initialized the library
        if code < 0 {
            return Err(Error::Initialize(Status::from(code)));
        }
        Ok(())
    }

    pub(crate) fn api(&self) -> &CsoundApi {
        &self.api
    }

    /// The file the library was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Version number times 1000, e.g. 6180 for 6.18.0.
    pub fn version(&self) -> u32 {
        unsafe { self.api.csoundGetVersion() as u32 }
    }

    /// API version number times 100.
    pub fn api_version(&self) -> u32 {
        unsafe { self.api.csoundGetAPIVersion() as u32 }
    }
}

impl fmt::Debug for CsoundLib {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CsoundLib")
            .field("path", &self.path)
            .field("api", &self.api)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_logger;

    fn vars(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<OsString> {
        move |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| OsString::from(v))
        }
    }

    #[test]
    fn default_flags_keep_csound_out_of_process_handlers() {
        let config = LibraryConfig::new();
        assert!(config.init_flags.contains(InitFlags::NO_SIGNAL_HANDLER));
        assert!(config.init_flags.contains(InitFlags::NO_ATEXIT));
        assert_eq!(config.init_flags.bits(), 3);
    }

    #[test]
    fn explicit_path_comes_first_and_bare_name_last() {
        let config = LibraryConfig {
            library_path: Some(PathBuf::from("/opt/csound/libcsound64.so")),
            search_dirs: vec![PathBuf::from("/usr/lib")],
            init_flags: InitFlags::empty(),
        };
        let candidates = config.candidates_for(Platform::Other, None);
        assert_eq!(
            candidates,
            vec![
                PathBuf::from("/opt/csound/libcsound64.so"),
                PathBuf::from("/usr/lib").join(raw::LIBRARY_FILE_NAME),
                PathBuf::from(raw::LIBRARY_FILE_NAME),
            ]
        );
    }

    #[test]
    fn macos_prefers_user_framework_over_system() {
        let config = LibraryConfig {
            library_path: None,
            search_dirs: Vec::new(),
            init_flags: InitFlags::empty(),
        };
        let candidates = config.candidates_for(Platform::MacOs, Some(Path::new("/Users/me")));
        assert_eq!(
            candidates[0],
            PathBuf::from("/Users/me/Library/Frameworks/CsoundLib64.framework/CsoundLib64")
        );
        assert_eq!(
            candidates[1],
            PathBuf::from("/Library/Frameworks/CsoundLib64.framework/CsoundLib64")
        );
        assert_eq!(candidates.len(), 3);
    }

    #[test]
    fn duplicate_candidates_are_dropped() {
        let config = LibraryConfig::new()
            .search_dir("/usr/lib")
            .search_dir("/usr/lib");
        let candidates = config.candidates_for(Platform::Other, None);
        let lib_dir = PathBuf::from("/usr/lib").join(raw::LIBRARY_FILE_NAME);
        assert_eq!(candidates.iter().filter(|p| **p == lib_dir).count(), 1);
    }

    #[test]
    fn env_overrides_path_and_prepends_dir() {
        let config = LibraryConfig::from_vars(vars(&[
            (CSOUND_LIB, "/custom/libcsound64.so"),
            (CSOUND_LIB_DIR, "/custom/lib"),
        ]));
        assert_eq!(
            config.library_path,
            Some(PathBuf::from("/custom/libcsound64.so"))
        );
        assert_eq!(config.search_dirs[0], PathBuf::from("/custom/lib"));
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let config = LibraryConfig::from_vars(vars(&[(CSOUND_LIB, ""), (CSOUND_LIB_DIR, "")]));
        assert_eq!(config.library_path, None);
        assert_eq!(config.search_dirs, LibraryConfig::new().search_dirs);
    }

    #[test]
    fn load_fails_with_every_path_tried() {
        let config = LibraryConfig {
            library_path: Some(PathBuf::from("/nonexistent/libcsound64-missing.so")),
            search_dirs: vec![PathBuf::from("/nonexistent/dir")],
            init_flags: InitFlags::empty(),
        };
        test_logger::install();
        let result = CsoundLib::load(&config);
        let records = test_logger::records_containing("/nonexistent/libcsound64-missing.so");
        let warned: Vec<_> = records
            .iter()
            .filter(|r| r.level == log::Level::Warn)
            .collect();
        assert_eq!(warned.len(), 1, "{:?}", records);
        assert!(warned[0].text.starts_with("cannot open"));

        // Only meaningful when the OS loader cannot find a real libcsound64.
        if let Err(Error::LibraryNotFound { tried }) = result {
            assert_eq!(tried[0], PathBuf::from("/nonexistent/libcsound64-missing.so"));
            assert_eq!(tried.last(), Some(&PathBuf::from(raw::LIBRARY_FILE_NAME)));
        }
    }
}
