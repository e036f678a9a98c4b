//! Bridges native Csound callbacks back into Rust closures.
//!
//! `csoundSetMessageStringCallback` carries no user pointer, so the
//! trampoline finds the closure through a registry keyed by the address of
//! the native instance. Entries are added when a [`Csound`](crate::Csound)
//! is created and removed only after `csoundDestroy` has returned.

use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::mem;
use std::panic::{self, AssertUnwindSafe};

use csound_sys as raw;
use libc::{c_char, c_int};
use log::{error, info, warn};
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};

use crate::enums::MessageType;
use crate::error::{Error, Result};

pub(crate) type MessageCallback = Box<dyn FnMut(MessageType, &str) + Send>;

#[derive(Default)]
pub(crate) struct CallbackHandler {
    message_cb: Mutex<Option<MessageCallback>>,
}

impl CallbackHandler {
    pub(crate) fn set_message_cb(&self, cb: MessageCallback) {
        *self.message_cb.lock() = Some(cb);
    }

    pub(crate) fn has_message_cb(&self) -> bool {
        self.message_cb.lock().is_some()
    }

    /// Returns false when no closure is installed.
    pub(crate) fn dispatch_message(&self, attr: c_int, text: &str) -> bool {
        match self.message_cb.lock().as_mut() {
            Some(fun) => {
                fun(MessageType::from_attr(attr), text);
                true
            }
            None => false,
        }
    }
}

static HANDLERS: Lazy<RwLock<HashMap<usize, usize>>> = Lazy::new(Default::default);

pub(crate) fn register(csound: *mut raw::CSOUND, handler: &CallbackHandler) {
    HANDLERS
        .write()
        .insert(csound as usize, handler as *const CallbackHandler as usize);
}

/// Removes the entry for `csound` only if it still points at `handler`.
///
/// The address is freed by `csoundDestroy` before this runs, so a new
/// instance may already have registered under the same key.
pub(crate) fn unregister(csound: *mut raw::CSOUND, handler: &CallbackHandler) {
    let key = csound as usize;
    let mut handlers = HANDLERS.write();
    if handlers.get(&key) == Some(&(handler as *const CallbackHandler as usize)) {
        handlers.remove(&key);
    }
}

fn with_handler<T, F>(csound: *mut raw::CSOUND, f: F) -> Option<T>
where
    F: FnOnce(&CallbackHandler) -> T,
{
    let ptr = HANDLERS.read().get(&(csound as usize)).copied()?;
    // The handler outlives its registry entry, see Csound::drop.
    Some(f(unsafe { &*(ptr as *const CallbackHandler) }))
}

fn catch<F: FnOnce()>(f: F) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        warn!("panic inside a csound callback; the event was dropped");
    }
}

pub(crate) extern "C" fn message_string_trampoline(
    csound: *mut raw::CSOUND,
    attr: c_int,
    message: *const c_char,
) {
    if message.is_null() {
        return;
    }
    catch(|| {
        let text = unsafe { CStr::from_ptr(message) }.to_string_lossy();
        with_handler(csound, |handler| handler.dispatch_message(attr, &text));
    });
}

/// Joins message fragments into whole lines.
///
/// Csound often prints one line through several calls, e.g. a coloured
/// prefix followed by the text. A line takes the first non-default kind
/// among its fragments.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: String,
    kind: Option<MessageType>,
}

impl LineBuffer {
    pub fn new() -> Self {
        LineBuffer::default()
    }

    pub fn push<F>(&mut self, kind: MessageType, text: &str, mut emit: F)
    where
        F: FnMut(MessageType, &str),
    {
        for piece in text.split_inclusive('\n') {
            self.kind = match self.kind {
                None | Some(MessageType::Default) => Some(kind),
                k => k,
            };
            if let Some(line) = piece.strip_suffix('\n') {
                self.pending.push_str(line.trim_end_matches('\r'));
                let line = mem::take(&mut self.pending);
                emit(self.kind.take().unwrap_or(kind), &line);
            } else {
                self.pending.push_str(piece);
            }
        }
    }

    /// Emits a trailing partial line, if any.
    pub fn flush<F>(&mut self, mut emit: F)
    where
        F: FnMut(MessageType, &str),
    {
        if !self.pending.is_empty() {
            let line = mem::take(&mut self.pending);
            emit(self.kind.take().unwrap_or(MessageType::Default), &line);
        }
        self.kind = None;
    }
}

fn log_line(kind: MessageType, line: &str) {
    if line.trim().is_empty() {
        return;
    }
    match kind {
        MessageType::Error => error!(target: "csound", "{}", line),
        MessageType::Warning => warn!(target: "csound", "{}", line),
        _ => info!(target: "csound", "{}", line),
    }
}

/// Line-buffers messages into the `log` crate; the last partial line is
/// emitted when the forwarder is dropped.
#[derive(Default)]
struct LogForwarder {
    lines: LineBuffer,
}

impl Drop for LogForwarder {
    fn drop(&mut self) {
        self.lines.flush(log_line);
    }
}

pub(crate) fn log_forwarder() -> impl FnMut(MessageType, &str) + Send + 'static {
    let mut forwarder = LogForwarder::default();
    move |kind: MessageType, text: &str| forwarder.lines.push(kind, text, log_line)
}

/// Copies a C string owned by Csound; `None` for null or non UTF-8 data.
pub(crate) fn ptr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .ok()
        .map(str::to_owned)
}

/// NUL-terminated copy of `text` for a single native call; `what` names the
/// argument in the error when the text is empty.
pub(crate) fn non_empty_cstring(what: &'static str, text: &str) -> Result<CString> {
    if text.is_empty() {
        return Err(Error::EmptyInput(what));
    }
    Ok(CString::new(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_logger;
    use log::Level;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn collect(
        buffer: &mut LineBuffer,
        kind: MessageType,
        text: &str,
    ) -> Vec<(MessageType, String)> {
        let mut out = Vec::new();
        buffer.push(kind, text, |k, l| out.push((k, l.to_owned())));
        out
    }

    #[test]
    fn fragments_are_joined_into_lines() {
        let mut buffer = LineBuffer::new();
        assert!(collect(&mut buffer, MessageType::Default, "SECTION ").is_empty());
        let lines = collect(
            &mut buffer,
            MessageType::Default,
            "1:\nnew alloc for instr 1:\r\n",
        );
        assert_eq!(
            lines,
            vec![
                (MessageType::Default, "SECTION 1:".to_owned()),
                (MessageType::Default, "new alloc for instr 1:".to_owned()),
            ]
        );
    }

    #[test]
    fn line_keeps_the_first_non_default_kind() {
        let mut buffer = LineBuffer::new();
        collect(&mut buffer, MessageType::Default, "  ");
        collect(&mut buffer, MessageType::Error, "error: ");
        let lines = collect(&mut buffer, MessageType::Warning, "syntax\n");
        assert_eq!(lines, vec![(MessageType::Error, "  error: syntax".to_owned())]);

        let lines = collect(&mut buffer, MessageType::Default, "next\n");
        assert_eq!(lines, vec![(MessageType::Default, "next".to_owned())]);
    }

    #[test]
    fn flush_emits_the_partial_line() {
        let mut buffer = LineBuffer::new();
        collect(&mut buffer, MessageType::Warning, "no newline");
        let mut out = Vec::new();
        buffer.flush(|k, l| out.push((k, l.to_owned())));
        assert_eq!(out, vec![(MessageType::Warning, "no newline".to_owned())]);
        buffer.flush(|_, _| panic!("nothing pending"));
    }

    #[test]
    fn dispatch_without_closure_is_a_no_op() {
        let handler = CallbackHandler::default();
        assert!(!handler.has_message_cb());
        assert!(!handler.dispatch_message(raw::CSOUNDMSG_DEFAULT, "dropped"));
    }

    #[test]
    fn trampoline_reaches_the_registered_closure() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler = Box::new(CallbackHandler::default());
        let sink = Arc::clone(&seen);
        handler.set_message_cb(Box::new(move |kind, text| {
            sink.lock().push((kind, text.to_owned()))
        }));

        // Any unique address works as an instance key; it is never dereferenced.
        let key = Box::new(0u8);
        let csound = &*key as *const u8 as *mut raw::CSOUND;
        register(csound, &handler);

        let text = CString::new("0dBFS level = 1.0\n").unwrap();
        message_string_trampoline(csound, raw::CSOUNDMSG_WARNING | 0x0103, text.as_ptr());
        message_string_trampoline(csound, raw::CSOUNDMSG_DEFAULT, std::ptr::null());

        unregister(csound, &handler);
        message_string_trampoline(csound, raw::CSOUNDMSG_ERROR, text.as_ptr());

        let seen = seen.lock();
        assert_eq!(
            *seen,
            vec![(MessageType::Warning, "0dBFS level = 1.0\n".to_owned())]
        );
    }

    #[test]
    fn panics_do_not_cross_the_boundary() {
        test_logger::install();
        let handler = Box::new(CallbackHandler::default());
        handler.set_message_cb(Box::new(|_, _| panic!("host bug")));
        let key = Box::new(0u8);
        let csound = &*key as *const u8 as *mut raw::CSOUND;
        register(csound, &handler);

        let text = CString::new("boom").unwrap();
        message_string_trampoline(csound, raw::CSOUNDMSG_DEFAULT, text.as_ptr());
        unregister(csound, &handler);

        let caught = test_logger::records_containing("panic inside a csound callback");
        assert!(caught.iter().all(|r| r.level == Level::Warn));
        assert!(!caught.is_empty());
    }

    fn counting_handler(count: &Arc<AtomicUsize>) -> Box<CallbackHandler> {
        let handler = Box::new(CallbackHandler::default());
        let count = Arc::clone(count);
        handler.set_message_cb(Box::new(move |_, _| {
            count.fetch_add(1, Ordering::SeqCst);
        }));
        handler
    }

    #[test]
    fn stale_unregister_keeps_a_reused_address() {
        let old_count = Arc::new(AtomicUsize::new(0));
        let new_count = Arc::new(AtomicUsize::new(0));
        let old = counting_handler(&old_count);
        let new = counting_handler(&new_count);

        // A destroyed instance's address handed out again by csoundCreate.
        let key = Box::new(0u8);
        let csound = &*key as *const u8 as *mut raw::CSOUND;
        register(csound, &old);
        register(csound, &new);
        unregister(csound, &old);

        let text = CString::new("still delivered\n").unwrap();
        message_string_trampoline(csound, raw::CSOUNDMSG_DEFAULT, text.as_ptr());
        assert_eq!(new_count.load(Ordering::SeqCst), 1);
        assert_eq!(old_count.load(Ordering::SeqCst), 0);

        unregister(csound, &new);
        message_string_trampoline(csound, raw::CSOUNDMSG_DEFAULT, text.as_ptr());
        assert_eq!(new_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn forwarded_lines_use_the_csound_target() {
        test_logger::install();
        let mut forward = log_forwarder();
        forward(MessageType::Error, "INIT ERROR in instr 7\n");
        forward(MessageType::Warning, "WARNING: instr 7 clipped\n");
        forward(MessageType::Orchestra, "instr 7: ");
        forward(MessageType::Default, "printed by instr 7\n");
        forward(MessageType::Default, "   \n");

        let level_of = |needle: &str| {
            let records = test_logger::records_containing(needle);
            assert_eq!(records.len(), 1, "{:?}", records);
            assert_eq!(records[0].target, "csound");
            records[0].level
        };
        assert_eq!(level_of("INIT ERROR in instr 7"), Level::Error);
        assert_eq!(level_of("WARNING: instr 7 clipped"), Level::Warn);
        assert_eq!(level_of("instr 7: printed by instr 7"), Level::Info);
    }

    #[test]
    fn dropping_the_forwarder_emits_the_last_partial_line() {
        test_logger::install();
        let mut forward = log_forwarder();
        forward(MessageType::Warning, "tail without a newline");
        assert!(test_logger::records_containing("tail without a newline").is_empty());

        drop(forward);
        let records = test_logger::records_containing("tail without a newline");
        assert_eq!(records.len(), 1);
        assert_eq!((records[0].level, records[0].target.as_str()), (Level::Warn, "csound"));
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let seen = Arc::new(Mutex::new(String::new()));
        let handler = Box::new(CallbackHandler::default());
        let sink = Arc::clone(&seen);
        handler.set_message_cb(Box::new(move |_, text| sink.lock().push_str(text)));
        let key = Box::new(0u8);
        let csound = &*key as *const u8 as *mut raw::CSOUND;
        register(csound, &handler);

        let bytes = CString::new(vec![b'a', 0xff, b'b']).unwrap();
        message_string_trampoline(csound, raw::CSOUNDMSG_DEFAULT, bytes.as_ptr());
        unregister(csound, &handler);

        assert_eq!(*seen.lock(), "a\u{fffd}b");
    }

    #[test]
    fn string_marshaling() {
        assert!(matches!(
            non_empty_cstring("orchestra", ""),
            Err(Error::EmptyInput("orchestra"))
        ));
        assert!(matches!(
            non_empty_cstring("option", "-o\0dac"),
            Err(Error::InvalidString(_))
        ));
        let c = non_empty_cstring("option", "-odac").unwrap();
        assert_eq!(ptr_to_string(c.as_ptr()), Some("-odac".to_owned()));
        assert_eq!(ptr_to_string(std::ptr::null()), None);
    }
}
