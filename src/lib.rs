//! Csound bindings that open `libcsound64` at runtime.
//!
//! Nothing is linked at build time: the shared library is located with a
//! [`LibraryConfig`] (explicit path, `CSOUND_LIB`, `CSOUND_LIB_DIR`, the macOS
//! frameworks, then the platform loader) and every function is resolved into
//! a symbol table when it is opened.
//!
//! ```no_run
//! use csound_dynamic::Csound;
//!
//! # fn main() -> csound_dynamic::Result<()> {
//! let csound = Csound::new()?;
//! // route csound's console output through the `log` crate
//! csound.forward_messages_to_log();
//! csound.set_option("-odac")?;
//! csound.compile_orc("instr 1\n out oscili(0.2, 440)\nendin\n")?;
//! csound.read_score("i1 0 2")?;
//! csound.start()?;
//! while !csound.perform_ksmps() {}
//! # Ok(())
//! # }
//! ```
extern crate libc;
#[macro_use]
extern crate bitflags;
extern crate csound_sys;

mod callbacks;
mod channels;
mod csound;
mod enums;
mod error;
mod library;
#[cfg(test)]
mod test_logger;

pub use callbacks::LineBuffer;
pub use channels::{
    AudioChannel, ChannelBehavior, ChannelHints, ChannelInfo, ChannelKind, ChannelPtr,
    ControlChannel, InputChannelPtr, OutputChannelPtr,
};
pub use csound::{BufferPtr, Csound, Readable, Table, Writable};
pub use enums::{ControlChannelType, MessageType, Status};
pub use error::{Error, Result};
pub use library::{CsoundLib, InitFlags, LibraryConfig, CSOUND_LIB, CSOUND_LIB_DIR};
