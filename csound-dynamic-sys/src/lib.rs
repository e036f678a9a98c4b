//! Raw types and the runtime symbol table for libcsound64.
//!
//! Nothing in this crate links against Csound. The shared library is opened
//! by the caller with [`libloading`] and handed to [`CsoundApi::load`], which
//! resolves every function the high level crate uses.
#![allow(bad_style)]

extern crate libc;
extern crate libloading;

use libc::{c_char, c_double, c_int, c_uint};
use std::ptr;

mod api;
pub use api::{CsoundApi, MissingSymbol, SYMBOLS};

pub type MYFLT = c_double;

pub type CSOUND_STATUS = c_int;
pub const CSOUND_SIGNAL: CSOUND_STATUS = -5;
pub const CSOUND_MEMORY: CSOUND_STATUS = -4;
pub const CSOUND_PERFORMANCE: CSOUND_STATUS = -3;
pub const CSOUND_INITIALIZATION: CSOUND_STATUS = -2;
pub const CSOUND_ERROR: CSOUND_STATUS = -1;
pub const CSOUND_SUCCESS: CSOUND_STATUS = 0;

pub const CSOUNDINIT_NO_SIGNAL_HANDLER: c_int = 1;
pub const CSOUNDINIT_NO_ATEXIT: c_int = 2;

pub type controlChannelType = c_uint;
pub const CSOUND_CONTROL_CHANNEL: controlChannelType = 1;
pub const CSOUND_AUDIO_CHANNEL: controlChannelType = 2;
pub const CSOUND_STRING_CHANNEL: controlChannelType = 3;
pub const CSOUND_PVS_CHANNEL: controlChannelType = 4;
pub const CSOUND_VAR_CHANNEL: controlChannelType = 5;
pub const CSOUND_CHANNEL_TYPE_MASK: controlChannelType = 15;
pub const CSOUND_INPUT_CHANNEL: controlChannelType = 16;
pub const CSOUND_OUTPUT_CHANNEL: controlChannelType = 32;

pub type controlChannelBehavior = c_uint;
pub const CSOUND_CONTROL_CHANNEL_NO_HINTS: controlChannelBehavior = 0;
pub const CSOUND_CONTROL_CHANNEL_INT: controlChannelBehavior = 1;
pub const CSOUND_CONTROL_CHANNEL_LIN: controlChannelBehavior = 2;
pub const CSOUND_CONTROL_CHANNEL_EXP: controlChannelBehavior = 3;

pub const CSOUNDMSG_DEFAULT: c_int = 0x0000;
pub const CSOUNDMSG_ERROR: c_int = 0x1000;
pub const CSOUNDMSG_ORCH: c_int = 0x2000;
pub const CSOUNDMSG_REALTIME: c_int = 0x3000;
pub const CSOUNDMSG_WARNING: c_int = 0x4000;
pub const CSOUNDMSG_STDOUT: c_int = 0x5000;
pub const CSOUNDMSG_TYPE_MASK: c_int = 0x7000;
pub const CSOUNDMSG_FG_COLOR_MASK: c_int = 0x0107;
pub const CSOUNDMSG_FG_ATTR_MASK: c_int = 0x0088;
pub const CSOUNDMSG_BG_COLOR_MASK: c_int = 0x0270;

/// Opaque engine instance.
pub enum CSOUND {}

pub type csound_message_string_callback = extern "C" fn(*mut CSOUND, c_int, *const c_char);

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct controlChannelHints_t {
    pub behav: controlChannelBehavior,
    pub dflt: MYFLT,
    pub min: MYFLT,
    pub max: MYFLT,
    pub x: c_int,
    pub y: c_int,
    pub width: c_int,
    pub height: c_int,
    /// A query returns a fresh copy made with Csound's internal allocator.
    /// The API exports no matching free, so the copy is never released.
    pub attributes: *mut c_char,
}

impl Default for controlChannelHints_t {
    fn default() -> controlChannelHints_t {
        controlChannelHints_t {
            behav: CSOUND_CONTROL_CHANNEL_NO_HINTS,
            dflt: 0.0,
            min: 0.0,
            max: 0.0,
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            attributes: ptr::null_mut(),
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct controlChannelInfo_t {
    pub name: *mut c_char,
    pub type_: c_int,
    pub hints: controlChannelHints_t,
}

impl Default for controlChannelInfo_t {
    fn default() -> controlChannelInfo_t {
        controlChannelInfo_t {
            name: ptr::null_mut(),
            type_: 0,
            hints: controlChannelHints_t::default(),
        }
    }
}

/// Platform file name of the Csound shared library, as passed to the OS loader.
#[cfg(target_os = "windows")]
pub const LIBRARY_FILE_NAME: &str = "csound64.dll";
#[cfg(target_os = "macos")]
pub const LIBRARY_FILE_NAME: &str = "libcsound64.dylib";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub const LIBRARY_FILE_NAME: &str = "libcsound64.so";

/// Framework binary installed by the official macOS packages, relative to a
/// `Library/Frameworks` root.
pub const MACOS_FRAMEWORK: &str = "Library/Frameworks/CsoundLib64.framework/CsoundLib64";
