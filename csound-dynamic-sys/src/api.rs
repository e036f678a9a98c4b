use std::error::Error;
use std::fmt;

use libc::{c_char, c_int, c_long, c_void};
use libloading::{Library, Symbol};

use super::*;

/// A symbol the opened library does not export.
#[derive(Debug)]
pub struct MissingSymbol {
    pub name: &'static str,
    pub source: libloading::Error,
}

impl fmt::Display for MissingSymbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "symbol `{}` not found in the csound library", self.name)
    }
}

impl Error for MissingSymbol {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

unsafe fn resolve<T: Copy>(lib: &Library, name: &'static str) -> Result<T, MissingSymbol> {
    let symbol: Symbol<T> = lib
        .get(name.as_bytes())
        .map_err(|source| MissingSymbol { name, source })?;
    Ok(*symbol)
}

// Expands a list of C prototypes into the CsoundApi symbol table. Every entry
// becomes a function pointer field plus an `unsafe fn` of the same name that
// forwards to it, so call sites read like the C API: `api.csoundGetSr(cs)`.
macro_rules! csound_api {
    ($( fn $name:ident( $($arg:ident : $ty:ty),* ) $(-> $ret:ty)? ; )*) => {
        /// Function pointers resolved from an opened libcsound64.
        ///
        /// The pointers are only valid while the `Library` they were resolved
        /// from stays loaded; keep both together.
        pub struct CsoundApi {
            $( $name: unsafe extern "C" fn($($ty),*) $(-> $ret)?, )*
        }

        /// Names of every symbol [`CsoundApi::load`] resolves, in table order.
        pub const SYMBOLS: &[&str] = &[$( stringify!($name) ),*];

        impl CsoundApi {
            /// Resolves the whole table, failing on the first missing symbol.
            ///
            /// # Safety
            /// `lib` must be a Csound 6 library whose exports match the
            /// prototypes declared here.
            pub unsafe fn load(lib: &Library) -> Result<CsoundApi, MissingSymbol> {
                Ok(CsoundApi {
                    $( $name: resolve(lib, stringify!($name))?, )*
                })
            }

            $(
                #[inline]
                pub unsafe fn $name(&self, $($arg: $ty),*) $(-> $ret)? {
                    (self.$name)($($arg),*)
                }
            )*
        }
    };
}

csound_api! {
    // instantiation
    fn csoundInitialize(flags: c_int) -> c_int;
    fn csoundCreate(host_data: *mut c_void) -> *mut CSOUND;
    fn csoundDestroy(csound: *mut CSOUND);
    fn csoundGetVersion() -> c_int;
    fn csoundGetAPIVersion() -> c_int;

    // compilation
    fn csoundSetOption(csound: *mut CSOUND, option: *const c_char) -> c_int;
    fn csoundCompile(csound: *mut CSOUND, argc: c_int, argv: *const *const c_char) -> c_int;
    fn csoundCompileOrc(csound: *mut CSOUND, orc: *const c_char) -> c_int;
    fn csoundCompileOrcAsync(csound: *mut CSOUND, orc: *const c_char) -> c_int;
    fn csoundEvalCode(csound: *mut CSOUND, code: *const c_char) -> MYFLT;
    fn csoundCompileCsd(csound: *mut CSOUND, path: *const c_char) -> c_int;
    fn csoundCompileCsdText(csound: *mut CSOUND, text: *const c_char) -> c_int;
    fn csoundStart(csound: *mut CSOUND) -> c_int;

    // performance
    fn csoundPerform(csound: *mut CSOUND) -> c_int;
    fn csoundPerformKsmps(csound: *mut CSOUND) -> c_int;
    fn csoundPerformBuffer(csound: *mut CSOUND) -> c_int;
    fn csoundStop(csound: *mut CSOUND);
    fn csoundCleanup(csound: *mut CSOUND) -> c_int;
    fn csoundReset(csound: *mut CSOUND);

    // attributes
    fn csoundGetSr(csound: *mut CSOUND) -> MYFLT;
    fn csoundGetKr(csound: *mut CSOUND) -> MYFLT;
    fn csoundGetKsmps(csound: *mut CSOUND) -> u32;
    fn csoundGetNchnls(csound: *mut CSOUND) -> u32;
    fn csoundGetNchnlsInput(csound: *mut CSOUND) -> u32;
    fn csoundGet0dBFS(csound: *mut CSOUND) -> MYFLT;
    fn csoundGetA4(csound: *mut CSOUND) -> MYFLT;
    fn csoundGetCurrentTimeSamples(csound: *mut CSOUND) -> i64;
    fn csoundGetSizeOfMYFLT() -> c_int;
    fn csoundGetDebug(csound: *mut CSOUND) -> c_int;
    fn csoundSetDebug(csound: *mut CSOUND, debug: c_int);

    // general i/o
    fn csoundGetOutputName(csound: *mut CSOUND) -> *const c_char;
    fn csoundGetInputName(csound: *mut CSOUND) -> *const c_char;
    fn csoundSetOutput(csound: *mut CSOUND, name: *const c_char, kind: *const c_char, format: *const c_char);
    fn csoundSetInput(csound: *mut CSOUND, name: *const c_char);
    fn csoundSetRTAudioModule(csound: *mut CSOUND, module: *const c_char);
    fn csoundSetHostImplementedAudioIO(csound: *mut CSOUND, state: c_int, buf_size: c_int);

    // audio buffers
    fn csoundGetInputBufferSize(csound: *mut CSOUND) -> c_long;
    fn csoundGetOutputBufferSize(csound: *mut CSOUND) -> c_long;
    fn csoundGetInputBuffer(csound: *mut CSOUND) -> *mut MYFLT;
    fn csoundGetOutputBuffer(csound: *mut CSOUND) -> *mut MYFLT;
    fn csoundGetSpin(csound: *mut CSOUND) -> *mut MYFLT;
    fn csoundClearSpin(csound: *mut CSOUND);
    fn csoundAddSpinSample(csound: *mut CSOUND, frame: c_int, channel: c_int, sample: MYFLT);
    fn csoundSetSpinSample(csound: *mut CSOUND, frame: c_int, channel: c_int, sample: MYFLT);
    fn csoundGetSpout(csound: *mut CSOUND) -> *mut MYFLT;
    fn csoundGetSpoutSample(csound: *mut CSOUND, frame: c_int, channel: c_int) -> MYFLT;

    // score handling
    fn csoundReadScore(csound: *mut CSOUND, score: *const c_char) -> c_int;
    fn csoundReadScoreAsync(csound: *mut CSOUND, score: *const c_char);
    fn csoundGetScoreTime(csound: *mut CSOUND) -> f64;
    fn csoundIsScorePending(csound: *mut CSOUND) -> c_int;
    fn csoundSetScorePending(csound: *mut CSOUND, pending: c_int);
    fn csoundGetScoreOffsetSeconds(csound: *mut CSOUND) -> MYFLT;
    fn csoundSetScoreOffsetSeconds(csound: *mut CSOUND, time: MYFLT);
    fn csoundRewindScore(csound: *mut CSOUND);

    // messages
    fn csoundSetMessageStringCallback(csound: *mut CSOUND, callback: Option<csound_message_string_callback>);
    fn csoundGetMessageLevel(csound: *mut CSOUND) -> c_int;
    fn csoundSetMessageLevel(csound: *mut CSOUND, level: c_int);
    fn csoundCreateMessageBuffer(csound: *mut CSOUND, to_stdout: c_int);
    fn csoundGetFirstMessage(csound: *mut CSOUND) -> *const c_char;
    fn csoundGetFirstMessageAttr(csound: *mut CSOUND) -> c_int;
    fn csoundPopFirstMessage(csound: *mut CSOUND);
    fn csoundGetMessageCnt(csound: *mut CSOUND) -> c_int;
    fn csoundDestroyMessageBuffer(csound: *mut CSOUND);

    // channels and events
    fn csoundGetChannelPtr(csound: *mut CSOUND, p: *mut *mut MYFLT, name: *const c_char, kind: c_int) -> c_int;
    fn csoundListChannels(csound: *mut CSOUND, list: *mut *mut controlChannelInfo_t) -> c_int;
    fn csoundDeleteChannelList(csound: *mut CSOUND, list: *mut controlChannelInfo_t);
    fn csoundSetControlChannelHints(csound: *mut CSOUND, name: *const c_char, hints: controlChannelHints_t) -> c_int;
    fn csoundGetControlChannelHints(csound: *mut CSOUND, name: *const c_char, hints: *mut controlChannelHints_t) -> c_int;
    fn csoundGetControlChannel(csound: *mut CSOUND, name: *const c_char, err: *mut c_int) -> MYFLT;
    fn csoundSetControlChannel(csound: *mut CSOUND, name: *const c_char, value: MYFLT);
    fn csoundGetAudioChannel(csound: *mut CSOUND, name: *const c_char, samples: *mut MYFLT);
    fn csoundSetAudioChannel(csound: *mut CSOUND, name: *const c_char, samples: *mut MYFLT);
    fn csoundGetStringChannel(csound: *mut CSOUND, name: *const c_char, string: *mut c_char);
    fn csoundSetStringChannel(csound: *mut CSOUND, name: *const c_char, string: *mut c_char);
    fn csoundGetChannelDatasize(csound: *mut CSOUND, name: *const c_char) -> c_int;
    fn csoundScoreEvent(csound: *mut CSOUND, kind: c_char, pfields: *const MYFLT, count: c_long) -> c_int;
    fn csoundScoreEventAsync(csound: *mut CSOUND, kind: c_char, pfields: *const MYFLT, count: c_long);
    fn csoundInputMessage(csound: *mut CSOUND, message: *const c_char);
    fn csoundInputMessageAsync(csound: *mut CSOUND, message: *const c_char);
    fn csoundKillInstance(csound: *mut CSOUND, instr: MYFLT, name: *mut c_char, mode: c_int, release: c_int) -> c_int;

    // tables
    fn csoundTableLength(csound: *mut CSOUND, table: c_int) -> c_int;
    fn csoundTableGet(csound: *mut CSOUND, table: c_int, index: c_int) -> MYFLT;
    fn csoundTableSet(csound: *mut CSOUND, table: c_int, index: c_int, value: MYFLT);
    fn csoundGetTable(csound: *mut CSOUND, table: *mut *mut MYFLT, number: c_int) -> c_int;
}

impl fmt::Debug for CsoundApi {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CsoundApi")
            .field("symbols", &SYMBOLS.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn symbol_table_has_no_duplicates() {
        let unique: HashSet<_> = SYMBOLS.iter().collect();
        assert_eq!(unique.len(), SYMBOLS.len());
    }

    #[test]
    fn symbol_table_covers_the_instance_lifecycle() {
        for name in &[
            "csoundInitialize",
            "csoundCreate",
            "csoundCompileOrc",
            "csoundPerformKsmps",
            "csoundGetSpin",
            "csoundGetSpout",
            "csoundSetMessageStringCallback",
            "csoundDestroy",
        ] {
            assert!(SYMBOLS.contains(name), "{} missing", name);
        }
        assert!(SYMBOLS.iter().all(|s| s.starts_with("csound")));
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    #[test]
    fn load_reports_the_first_missing_symbol() {
        let lib = unsafe { Library::new("libc.so.6") }.unwrap();
        let err = unsafe { CsoundApi::load(&lib) }.unwrap_err();
        assert_eq!(err.name, "csoundInitialize");
        assert!(err.to_string().contains("csoundInitialize"));
        assert!(err.source().is_some());
    }
}
