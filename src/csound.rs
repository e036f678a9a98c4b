#![allow(non_snake_case)]

use std::cell::Cell;
use std::convert::TryFrom;
use std::ffi::CString;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::ptr;
use std::slice;
use std::sync::Arc;

use csound_sys::{self as raw, CsoundApi, MYFLT};
use libc::{c_char, c_int, c_long};
use log::{debug, warn};

use crate::callbacks::{self, non_empty_cstring, ptr_to_string, CallbackHandler};
use crate::enums::{MessageType, Status};
use crate::error::{check, Error, Result};
use crate::library::CsoundLib;

/// A Csound engine instance.
///
/// Owns exactly one native `CSOUND*` created with `csoundCreate`. The
/// instance keeps its [`CsoundLib`] alive, and dropping it stops the
/// performance, releases the engine with `csoundDestroy` and frees the
/// callback state, in that order.
///
/// `Csound` can be moved to another thread but not shared between threads;
/// every method that talks to the engine takes `&self` and must be called
/// from the thread that currently owns the value.
///
/// # Example
///
/// ```no_run
/// use csound_dynamic::Csound;
///
/// # fn main() -> csound_dynamic::Result<()> {
/// let csound = Csound::new()?;
/// csound.forward_messages_to_log();
/// csound.set_option("-odac")?;
/// csound.compile_orc("instr 1\n out oscili(0.2, 440)\nendin\n")?;
/// csound.read_score("i1 0 1")?;
/// csound.start()?;
/// while !csound.perform_ksmps() {}
/// # Ok(())
/// # }
/// ```
pub struct Csound {
    lib: Arc<CsoundLib>,
    pub(crate) csound: *mut raw::CSOUND,
    callbacks: Box<CallbackHandler>,
    use_msg_buffer: Cell<bool>,
}

unsafe impl Send for Csound {}

impl fmt::Debug for Csound {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Csound")
            .field("csound", &self.csound)
            .field("library", &self.lib.path())
            .field("use_msg_buffer", &self.use_msg_buffer.get())
            .finish()
    }
}

impl Csound {
    /// Creates an instance on the process-wide library, loading it first if
    /// needed (see [`CsoundLib::global`]).
    pub fn new() -> Result<Csound> {
        Csound::with_library(CsoundLib::global()?)
    }

    /// Creates an instance on an explicitly loaded library.
    pub fn with_library(lib: Arc<CsoundLib>) -> Result<Csound> {
        let csound = unsafe { lib.api().csoundCreate(ptr::null_mut()) };
        if csound.is_null() {
            return Err(Error::CreateFailed);
        }
        let handler = Box::new(CallbackHandler::default());
        callbacks::register(csound, &handler);
        debug!("created csound instance {:p}", csound);
        Ok(Csound {
            lib,
            csound,
            callbacks: handler,
            use_msg_buffer: Cell::new(false),
        })
    }

    #[inline]
    pub(crate) fn api(&self) -> &CsoundApi {
        self.lib.api()
    }

    /// The library this instance was created on.
    pub fn library(&self) -> &Arc<CsoundLib> {
        &self.lib
    }

    /// Sets a single command line option, e.g. `--ksmps=64`.
    pub fn set_option(&self, option: &str) -> Result<()> {
        let op = non_empty_cstring("option", option)?;
        check("csoundSetOption", unsafe {
            self.api().csoundSetOption(self.csound, op.as_ptr())
        })
    }

    /// Prepares Csound for performance.
    ///
    /// Called after compiling, score preprocessing happens and the performance
    /// ends with the score. Called before, "i" statements are dispatched as
    /// real-time events and the performance runs until stopped.
    pub fn start(&self) -> Result<()> {
        check("csoundStart", unsafe { self.api().csoundStart(self.csound) })
    }

    /// Version number times 1000, 6180 for 6.18.0.
    pub fn version(&self) -> u32 {
        self.lib.version()
    }

    /// API version number times 100.
    pub fn api_version(&self) -> u32 {
        self.lib.api_version()
    }

    /* Compilation ************************************************************************** */

    /// Compiles input files as directed by command line arguments, without
    /// performing them. The first argument is the program name, as in `argv`.
    pub fn compile<T>(&self, args: &[T]) -> Result<()>
    where
        T: AsRef<str>,
    {
        if args.is_empty() {
            return Err(Error::EmptyInput("argument list"));
        }
        let arguments = args
            .iter()
            .map(|arg| CString::new(arg.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let argv: Vec<*const c_char> = arguments.iter().map(|arg| arg.as_ptr()).collect();
        check("csoundCompile", unsafe {
            self.api()
                .csoundCompile(self.csound, argv.len() as c_int, argv.as_ptr())
        })
    }

    /// Compiles a `.csd` file without performing it.
    ///
    /// Before [`start`](#method.start) the `<CsOptions>` are honoured and the
    /// score ends the performance. After it, the options are ignored and the
    /// score is dispatched as real-time events.
    pub fn compile_csd<T>(&self, csd: T) -> Result<()>
    where
        T: AsRef<str>,
    {
        let path = non_empty_cstring("csd path", csd.as_ref())?;
        check("csoundCompileCsd", unsafe {
            self.api().csoundCompileCsd(self.csound, path.as_ptr())
        })
    }

    /// Like [`compile_csd`](#method.compile_csd), reading the CSD from a string.
    pub fn compile_csd_text<T>(&self, csd_text: T) -> Result<()>
    where
        T: AsRef<str>,
    {
        let text = non_empty_cstring("csd text", csd_text.as_ref())?;
        check("csoundCompileCsdText", unsafe {
            self.api().csoundCompileCsdText(self.csound, text.as_ptr())
        })
    }

    /// Parses and compiles orchestra code, evaluating global space code.
    /// Can be called during performance to add or replace instruments.
    pub fn compile_orc<T>(&self, orc: T) -> Result<()>
    where
        T: AsRef<str>,
    {
        let orc = non_empty_cstring("orchestra", orc.as_ref())?;
        check("csoundCompileOrc", unsafe {
            self.api().csoundCompileOrc(self.csound, orc.as_ptr())
        })
    }

    /// Async version of [`compile_orc`](#method.compile_orc): the compiled code
    /// is queued for merging into the running engine.
    pub fn compile_orc_async<T>(&self, orc: T) -> Result<()>
    where
        T: AsRef<str>,
    {
        let orc = non_empty_cstring("orchestra", orc.as_ref())?;
        check("csoundCompileOrcAsync", unsafe {
            self.api().csoundCompileOrcAsync(self.csound, orc.as_ptr())
        })
    }

    /// Compiles and runs global space code, returning the value passed to the
    /// `return` opcode, e.g. `"i1 = 2 + 2\nreturn i1\n"` yields 4.
    pub fn eval_code<T>(&self, code: T) -> Result<f64>
    where
        T: AsRef<str>,
    {
        let code = non_empty_cstring("code", code.as_ref())?;
        Ok(unsafe { self.api().csoundEvalCode(self.csound, code.as_ptr()) })
    }

    /* Performance ************************************************************************** */

    /// Performs until the score ends (`Ok(true)`) or until `csoundStop` halts
    /// the performance (`Ok(false)`). A stopped performance can be resumed by
    /// calling `perform` again.
    pub fn perform(&self) -> Result<bool> {
        let code = unsafe { self.api().csoundPerform(self.csound) };
        if code < 0 {
            return Err(Error::Status {
                operation: "csoundPerform",
                status: Status::from(code),
            });
        }
        Ok(code > 0)
    }

    /// Senses input events and performs one control period (`ksmps` frames).
    /// Returns true once the performance is finished.
    pub fn perform_ksmps(&self) -> bool {
        unsafe { self.api().csoundPerformKsmps(self.csound) != 0 }
    }

    /// Performs one buffer's worth (`-b` frames) of interleaved audio.
    /// Returns true once the performance is finished.
    pub fn perform_buffer(&self) -> bool {
        unsafe { self.api().csoundPerformBuffer(self.csound) != 0 }
    }

    /// Stops the performance. It may not have stopped yet when this returns.
    pub fn stop(&self) {
        unsafe { self.api().csoundStop(self.csound) }
    }

    /// Flushes output and closes files after a performance.
    pub fn cleanup(&self) -> Result<()> {
        check("csoundCleanup", unsafe {
            self.api().csoundCleanup(self.csound)
        })
    }

    /// Resets all internal state for a new performance.
    pub fn reset(&self) {
        unsafe { self.api().csoundReset(self.csound) }
    }

    /* Attributes *************************************************************************** */

    pub fn get_sample_rate(&self) -> f64 {
        unsafe { self.api().csoundGetSr(self.csound) }
    }

    pub fn get_control_rate(&self) -> f64 {
        unsafe { self.api().csoundGetKr(self.csound) }
    }

    /// Frames per control period.
    pub fn get_ksmps(&self) -> u32 {
        unsafe { self.api().csoundGetKsmps(self.csound) }
    }

    /// Number of output channels (`nchnls`).
    pub fn output_channels(&self) -> u32 {
        unsafe { self.api().csoundGetNchnls(self.csound) }
    }

    /// Number of input channels (`nchnls_i`).
    pub fn input_channels(&self) -> u32 {
        unsafe { self.api().csoundGetNchnlsInput(self.csound) }
    }

    /// The value of full scale amplitude.
    pub fn get_0dBFS(&self) -> f64 {
        unsafe { self.api().csoundGet0dBFS(self.csound) }
    }

    /// The A4 reference frequency.
    pub fn get_freq(&self) -> f64 {
        unsafe { self.api().csoundGetA4(self.csound) }
    }

    /// Frames performed since the start of the performance.
    pub fn get_current_sample_time(&self) -> u64 {
        let samples = unsafe { self.api().csoundGetCurrentTimeSamples(self.csound) };
        samples.max(0) as u64
    }

    /// Size in bytes of a Csound sample; 8 for libcsound64.
    pub fn get_size_myflt(&self) -> u32 {
        unsafe { self.api().csoundGetSizeOfMYFLT() as u32 }
    }

    pub fn get_debug(&self) -> bool {
        unsafe { self.api().csoundGetDebug(self.csound) != 0 }
    }

    pub fn set_debug(&self, debug: bool) {
        unsafe { self.api().csoundSetDebug(self.csound, debug as c_int) }
    }

    /// The message level, from 0 to 231.
    pub fn get_message_level(&self) -> u32 {
        unsafe { self.api().csoundGetMessageLevel(self.csound) as u32 }
    }

    pub fn set_message_level(&self, level: u32) {
        unsafe { self.api().csoundSetMessageLevel(self.csound, level as c_int) }
    }

    /* General I/O ************************************************************************** */

    /// Name of the audio output, `None` until it is set.
    pub fn get_output_name(&self) -> Option<String> {
        ptr_to_string(unsafe { self.api().csoundGetOutputName(self.csound) })
    }

    /// Name of the audio input, `None` until it is set.
    pub fn get_input_name(&self) -> Option<String> {
        ptr_to_string(unsafe { self.api().csoundGetInputName(self.csound) })
    }

    /// Sets the output destination, file type and sample format.
    /// An empty `out_type` or `format` keeps Csound's default.
    pub fn set_output(&self, name: &str, out_type: &str, format: &str) -> Result<()> {
        let name = non_empty_cstring("output name", name)?;
        let out_type = optional_cstring(out_type)?;
        let format = optional_cstring(format)?;
        unsafe {
            self.api().csoundSetOutput(
                self.csound,
                name.as_ptr(),
                out_type.as_ref().map_or(ptr::null(), |s| s.as_ptr()),
                format.as_ref().map_or(ptr::null(), |s| s.as_ptr()),
            );
        }
        Ok(())
    }

    pub fn set_input(&self, name: &str) -> Result<()> {
        let name = non_empty_cstring("input name", name)?;
        unsafe { self.api().csoundSetInput(self.csound, name.as_ptr()) };
        Ok(())
    }

    /// Selects the real-time audio module, e.g. `"pa_cb"`, `"jack"` or `"null"`.
    pub fn set_rt_audio_module(&self, name: &str) -> Result<()> {
        let name = non_empty_cstring("audio module", name)?;
        unsafe { self.api().csoundSetRTAudioModule(self.csound, name.as_ptr()) };
        Ok(())
    }

    /// Lets the host do the audio I/O through the input/output buffers
    /// instead of Csound's real-time modules. Must be called before
    /// compiling. A `buf_size` of 0 keeps the `-b` setting.
    pub fn set_host_implemented_audio_io(&self, state: bool, buf_size: u32) {
        unsafe {
            self.api()
                .csoundSetHostImplementedAudioIO(self.csound, state as c_int, buf_size as c_int)
        }
    }

    /* Audio buffers ************************************************************************ */

    /// Samples in the input buffer, `-b` frames times `nchnls_i`.
    pub fn get_input_buffer_size(&self) -> usize {
        let size = unsafe { self.api().csoundGetInputBufferSize(self.csound) };
        size.max(0) as usize
    }

    /// Samples in the output buffer, `-b` frames times `nchnls`.
    pub fn get_output_buffer_size(&self) -> usize {
        let size = unsafe { self.api().csoundGetOutputBufferSize(self.csound) };
        size.max(0) as usize
    }

    /// The input buffer used with [`perform_buffer`](#method.perform_buffer),
    /// or `None` before the engine has started. The view borrows the instance
    /// mutably, so it is the only live reference to the buffer.
    pub fn get_input_buffer(&mut self) -> Option<BufferPtr<'_, Writable>> {
        let ptr = unsafe { self.api().csoundGetInputBuffer(self.csound) };
        unsafe { BufferPtr::from_raw(ptr, self.get_input_buffer_size()) }
    }

    /// The output buffer filled by [`perform_buffer`](#method.perform_buffer),
    /// or `None` before the engine has started.
    pub fn get_output_buffer(&self) -> Option<BufferPtr<'_, Readable>> {
        let ptr = unsafe { self.api().csoundGetOutputBuffer(self.csound) };
        unsafe { BufferPtr::from_raw(ptr, self.get_output_buffer_size()) }
    }

    /// Audio input for the next [`perform_ksmps`](#method.perform_ksmps):
    /// `ksmps * nchnls_i` interleaved samples.
    ///
    /// ```no_run
    /// # fn main() -> csound_dynamic::Result<()> {
    /// let mut csound = csound_dynamic::Csound::new()?;
    /// csound.compile_orc("instr 1\n out inch(1)\nendin\n")?;
    /// csound.start()?;
    /// let mut spin = csound.get_spin().expect("started");
    /// for sample in spin.iter_mut() {
    ///     *sample = 0.0;
    /// }
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// Only one writable view can be alive at a time:
    ///
    /// ```compile_fail
    /// # fn main() -> csound_dynamic::Result<()> {
    /// let mut csound = csound_dynamic::Csound::new()?;
    /// let mut first = csound.get_spin().expect("started");
    /// let mut second = csound.get_spin().expect("started");
    /// first[0] = 1.0;
    /// second[0] = 2.0;
    /// # Ok(())
    /// # }
    /// ```
    pub fn get_spin(&mut self) -> Option<BufferPtr<'_, Writable>> {
        let ptr = unsafe { self.api().csoundGetSpin(self.csound) };
        unsafe { BufferPtr::from_raw(ptr, self.spin_len()) }
    }

    /// Audio produced by the last [`perform_ksmps`](#method.perform_ksmps):
    /// `ksmps * nchnls` interleaved samples.
    pub fn get_spout(&self) -> Option<BufferPtr<'_, Readable>> {
        let ptr = unsafe { self.api().csoundGetSpout(self.csound) };
        unsafe { BufferPtr::from_raw(ptr, self.spout_len()) }
    }

    fn spin_len(&self) -> usize {
        self.get_ksmps() as usize * self.input_channels() as usize
    }

    fn spout_len(&self) -> usize {
        self.get_ksmps() as usize * self.output_channels() as usize
    }

    /// Copies up to `output.len()` samples out of the output buffer.
    /// Returns the number of samples copied.
    pub fn read_output_buffer(&self, output: &mut [f64]) -> Result<usize> {
        let buffer = unsafe { self.api().csoundGetOutputBuffer(self.csound) };
        copy_out("output", buffer, self.get_output_buffer_size(), output)
    }

    /// Copies up to `input.len()` samples into the input buffer.
    pub fn write_input_buffer(&self, input: &[f64]) -> Result<usize> {
        let buffer = unsafe { self.api().csoundGetInputBuffer(self.csound) };
        copy_in("input", buffer, self.get_input_buffer_size(), input)
    }

    /// Copies up to `output.len()` samples out of spout.
    pub fn read_spout_buffer(&self, output: &mut [f64]) -> Result<usize> {
        let spout = unsafe { self.api().csoundGetSpout(self.csound) };
        copy_out("spout", spout, self.spout_len(), output)
    }

    /// Copies up to `input.len()` samples into spin.
    pub fn write_spin_buffer(&self, input: &[f64]) -> Result<usize> {
        let spin = unsafe { self.api().csoundGetSpin(self.csound) };
        copy_in("spin", spin, self.spin_len(), input)
    }

    pub fn clear_spin(&self) {
        unsafe { self.api().csoundClearSpin(self.csound) }
    }

    /// Mixes a sample into spin. The frame and channel must be within
    /// `ksmps` and `nchnls_i`.
    pub fn add_spin_sample(&self, frame: u32, channel: u32, sample: f64) {
        unsafe {
            self.api()
                .csoundAddSpinSample(self.csound, frame as c_int, channel as c_int, sample)
        }
    }

    /// Overwrites a sample in spin.
    pub fn set_spin_sample(&self, frame: u32, channel: u32, sample: f64) {
        unsafe {
            self.api()
                .csoundSetSpinSample(self.csound, frame as c_int, channel as c_int, sample)
        }
    }

    pub fn get_spout_sample(&self, frame: u32, channel: u32) -> f64 {
        unsafe {
            self.api()
                .csoundGetSpoutSample(self.csound, frame as c_int, channel as c_int)
        }
    }

    /* Score handling *********************************************************************** */

    /// Reads, preprocesses and schedules a score. Repeated calls add events.
    pub fn read_score(&self, score: &str) -> Result<()> {
        let score = non_empty_cstring("score", score)?;
        check("csoundReadScore", unsafe {
            self.api().csoundReadScore(self.csound, score.as_ptr())
        })
    }

    pub fn read_score_async(&self, score: &str) -> Result<()> {
        let score = non_empty_cstring("score", score)?;
        unsafe { self.api().csoundReadScoreAsync(self.csound, score.as_ptr()) };
        Ok(())
    }

    /// Seconds since the beginning of the performance.
    pub fn get_score_time(&self) -> f64 {
        unsafe { self.api().csoundGetScoreTime(self.csound) }
    }

    pub fn is_score_pending(&self) -> bool {
        unsafe { self.api().csoundIsScorePending(self.csound) != 0 }
    }

    /// Turns score event performance on or off; real-time events keep playing.
    pub fn set_score_pending(&self, pending: bool) {
        unsafe { self.api().csoundSetScorePending(self.csound, pending as c_int) }
    }

    pub fn get_score_offset_seconds(&self) -> f64 {
        unsafe { self.api().csoundGetScoreOffsetSeconds(self.csound) }
    }

    /// Score events before `offset` are skipped and performance starts there.
    pub fn set_score_offset_seconds(&self, offset: f64) {
        unsafe { self.api().csoundSetScoreOffsetSeconds(self.csound, offset) }
    }

    /// Rewinds the score to the offset set with
    /// [`set_score_offset_seconds`](#method.set_score_offset_seconds).
    pub fn rewind_score(&self) {
        unsafe { self.api().csoundRewindScore(self.csound) }
    }

    /// Sends a score event of type `'a'`, `'i'`, `'q'`, `'f'` or `'e'`.
    ///
    /// ```no_run
    /// # fn main() -> csound_dynamic::Result<()> {
    /// let csound = csound_dynamic::Csound::new()?;
    /// // instrument 1, now, for half a second
    /// csound.send_score_event('i', &[1.0, 0.0, 0.5])?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn send_score_event(&self, event_type: char, pfields: &[f64]) -> Result<()> {
        let kind = event_kind(event_type)?;
        check("csoundScoreEvent", unsafe {
            self.api().csoundScoreEvent(
                self.csound,
                kind,
                pfields.as_ptr() as *const MYFLT,
                pfields.len() as c_long,
            )
        })
    }

    pub fn send_score_event_async(&self, event_type: char, pfields: &[f64]) -> Result<()> {
        let kind = event_kind(event_type)?;
        unsafe {
            self.api().csoundScoreEventAsync(
                self.csound,
                kind,
                pfields.as_ptr() as *const MYFLT,
                pfields.len() as c_long,
            );
        }
        Ok(())
    }

    /// Sends a line event as if typed at the console, e.g. `"i 2 0 0.75 1"`.
    pub fn send_input_message(&self, message: &str) -> Result<()> {
        let message = non_empty_cstring("input message", message)?;
        unsafe { self.api().csoundInputMessage(self.csound, message.as_ptr()) };
        Ok(())
    }

    pub fn send_input_message_async(&self, message: &str) -> Result<()> {
        let message = non_empty_cstring("input message", message)?;
        unsafe {
            self.api()
                .csoundInputMessageAsync(self.csound, message.as_ptr())
        };
        Ok(())
    }

    /// Turns off running instances of an instrument.
    ///
    /// `name` selects a named instrument instead of `instr`. `mode` is 0, 1
    /// or 2 for all, oldest or newest instance, plus 4 to require an exact
    /// fractional match and 8 to only stop notes of indefinite duration.
    pub fn kill_instrument(
        &self,
        instr: f64,
        name: Option<&str>,
        mode: u32,
        allow_release: bool,
    ) -> Result<()> {
        let name = name
            .map(|n| non_empty_cstring("instrument name", n))
            .transpose()?;
        check("csoundKillInstance", unsafe {
            self.api().csoundKillInstance(
                self.csound,
                instr,
                name
                    .as_ref()
                    .map_or(ptr::null_mut(), |n| n.as_ptr() as *mut c_char),
                mode as c_int,
                allow_release as c_int,
            )
        })
    }

    /* Tables ******************************************************************************* */

    /// Length of a function table without its guard point, `None` if the
    /// table does not exist.
    pub fn table_length(&self, table: u32) -> Option<usize> {
        let len = unsafe { self.api().csoundTableLength(self.csound, table as c_int) };
        usize::try_from(len).ok()
    }

    pub fn table_get(&self, table: u32, index: u32) -> Result<f64> {
        self.check_table_index(table, index)?;
        Ok(unsafe {
            self.api()
                .csoundTableGet(self.csound, table as c_int, index as c_int)
        })
    }

    pub fn table_set(&self, table: u32, index: u32, value: f64) -> Result<()> {
        self.check_table_index(table, index)?;
        unsafe {
            self.api()
                .csoundTableSet(self.csound, table as c_int, index as c_int, value)
        };
        Ok(())
    }

    fn check_table_index(&self, table: u32, index: u32) -> Result<()> {
        match self.table_length(table) {
            Some(len) if (index as usize) < len => Ok(()),
            _ => Err(Error::TableIndex { table, index }),
        }
    }

    /// Direct view of a function table's storage, `None` if the table does
    /// not exist. The view borrows this instance mutably.
    ///
    /// ```compile_fail
    /// # fn main() -> csound_dynamic::Result<()> {
    /// let mut csound = csound_dynamic::Csound::new()?;
    /// let mut first = csound.get_table(1).expect("table 1");
    /// let second = csound.get_table(1).expect("table 1");
    /// first[0] = second[0];
    /// # Ok(())
    /// # }
    /// ```
    pub fn get_table(&mut self, table: u32) -> Option<Table<'_>> {
        let mut data: *mut MYFLT = ptr::null_mut();
        let len = unsafe {
            self.api()
                .csoundGetTable(self.csound, &mut data as *mut *mut MYFLT, table as c_int)
        };
        let len = usize::try_from(len).ok()?;
        unsafe { Table::from_raw(data, len) }
    }

    /* Messages ***************************************************************************** */

    /// Calls `f` with every message Csound prints, replacing the default
    /// printing to stderr.
    ///
    /// `f` runs on whichever thread Csound prints from. A panic inside it is
    /// caught and logged; the message is dropped.
    pub fn message_string_callback<F>(&self, f: F)
    where
        F: FnMut(MessageType, &str) + Send + 'static,
    {
        if self.use_msg_buffer.get() {
            warn!("message callback replaces the active message buffer");
        }
        self.callbacks.set_message_cb(Box::new(f));
        unsafe {
            self.api().csoundSetMessageStringCallback(
                self.csound,
                Some(callbacks::message_string_trampoline),
            )
        };
    }

    /// Sends Csound's messages to the `log` facade under the `csound` target,
    /// one record per line. Errors log at error level, warnings at warn level
    /// and everything else at info level.
    pub fn forward_messages_to_log(&self) {
        self.message_string_callback(callbacks::log_forwarder());
    }

    /// Starts storing messages in an internal buffer, read back with
    /// [`get_first_message`](#method.get_first_message) or
    /// [`drain_messages`](#method.drain_messages).
    /// When `to_stdout` is set the messages are printed as well.
    ///
    /// The buffer takes over the message callback, so do not combine it with
    /// [`message_string_callback`](#method.message_string_callback).
    pub fn create_message_buffer(&self, to_stdout: bool) {
        if self.callbacks.has_message_cb() {
            warn!("message buffer replaces the active message callback");
        }
        unsafe {
            self.api()
                .csoundCreateMessageBuffer(self.csound, to_stdout as c_int)
        };
        self.use_msg_buffer.set(true);
    }

    pub fn destroy_message_buffer(&self) {
        if self.use_msg_buffer.replace(false) {
            unsafe { self.api().csoundDestroyMessageBuffer(self.csound) };
        }
    }

    pub fn get_first_message(&self) -> Option<String> {
        if !self.use_msg_buffer.get() {
            return None;
        }
        ptr_to_string(unsafe { self.api().csoundGetFirstMessage(self.csound) })
    }

    pub fn get_first_message_attr(&self) -> MessageType {
        if !self.use_msg_buffer.get() {
            return MessageType::Default;
        }
        MessageType::from_attr(unsafe { self.api().csoundGetFirstMessageAttr(self.csound) })
    }

    pub fn pop_first_message(&self) {
        if self.use_msg_buffer.get() {
            unsafe { self.api().csoundPopFirstMessage(self.csound) }
        }
    }

    /// Number of messages waiting in the buffer.
    pub fn get_message_count(&self) -> u32 {
        if !self.use_msg_buffer.get() {
            return 0;
        }
        unsafe { self.api().csoundGetMessageCnt(self.csound).max(0) as u32 }
    }

    /// Empties the message buffer, returning its messages oldest first.
    pub fn drain_messages(&self) -> Vec<(MessageType, String)> {
        let mut messages = Vec::new();
        while self.get_message_count() > 0 {
            let kind = self.get_first_message_attr();
            if let Some(text) = self.get_first_message() {
                messages.push((kind, text));
            }
            self.pop_first_message();
        }
        messages
    }
}

impl Drop for Csound {
    fn drop(&mut self) {
        let api = self.lib.api();
        unsafe {
            api.csoundStop(self.csound);
            api.csoundCleanup(self.csound);
            if self.use_msg_buffer.get() {
                api.csoundDestroyMessageBuffer(self.csound);
            }
            api.csoundDestroy(self.csound);
        }
        // No native thread can call back into this instance anymore.
        callbacks::unregister(self.csound, &self.callbacks);
        debug!("destroyed csound instance {:p}", self.csound);
    }
}

fn optional_cstring(text: &str) -> Result<Option<CString>> {
    if text.is_empty() {
        return Ok(None);
    }
    Ok(Some(CString::new(text)?))
}

fn event_kind(event_type: char) -> Result<c_char> {
    if event_type.is_ascii_alphabetic() {
        Ok(event_type as u8 as c_char)
    } else {
        Err(Error::InvalidEventType(event_type))
    }
}

fn copy_out(
    what: &'static str,
    src: *const MYFLT,
    size: usize,
    dest: &mut [f64],
) -> Result<usize> {
    if src.is_null() {
        return Err(Error::NotInitialized(what));
    }
    let len = dest.len().min(size);
    unsafe { ptr::copy_nonoverlapping(src, dest.as_mut_ptr(), len) };
    Ok(len)
}

fn copy_in(what: &'static str, dest: *mut MYFLT, size: usize, src: &[f64]) -> Result<usize> {
    if dest.is_null() {
        return Err(Error::NotInitialized(what));
    }
    let len = src.len().min(size);
    unsafe { ptr::copy_nonoverlapping(src.as_ptr(), dest, len) };
    Ok(len)
}

/// A function table owned by the engine.
///
/// Obtained with [`Csound::get_table`]; reads and writes go straight to
/// Csound's memory.
#[derive(Debug)]
pub struct Table<'a> {
    ptr: *mut f64,
    length: usize,
    phantom: PhantomData<&'a f64>,
}

impl<'a> Table<'a> {
    /// # Safety
    /// `ptr` must point to `length` samples that stay valid for `'a`.
    pub(crate) unsafe fn from_raw(ptr: *mut MYFLT, length: usize) -> Option<Table<'a>> {
        if ptr.is_null() {
            return None;
        }
        Some(Table {
            ptr,
            length,
            phantom: PhantomData,
        })
    }

    /// The table length, guard point excluded.
    pub fn get_size(&self) -> usize {
        self.length
    }

    pub fn as_slice(&self) -> &[f64] {
        unsafe { slice::from_raw_parts(self.ptr, self.length) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        unsafe { slice::from_raw_parts_mut(self.ptr, self.length) }
    }

    /// Copies `min(slice.len(), size)` values out of the table.
    pub fn copy_to_slice(&self, slice: &mut [f64]) -> usize {
        let len = slice.len().min(self.length);
        slice[..len].copy_from_slice(&self.as_slice()[..len]);
        len
    }

    /// Copies `min(slice.len(), size)` values into the table.
    pub fn copy_from_slice(&mut self, slice: &[f64]) -> usize {
        let len = slice.len().min(self.length);
        self.as_mut_slice()[..len].copy_from_slice(&slice[..len]);
        len
    }
}

impl<'a> AsRef<[f64]> for Table<'a> {
    fn as_ref(&self) -> &[f64] {
        self.as_slice()
    }
}

impl<'a> AsMut<[f64]> for Table<'a> {
    fn as_mut(&mut self) -> &mut [f64] {
        self.as_mut_slice()
    }
}

impl<'a> Deref for Table<'a> {
    type Target = [f64];
    fn deref(&self) -> &[f64] {
        self.as_slice()
    }
}

impl<'a> DerefMut for Table<'a> {
    fn deref_mut(&mut self) -> &mut [f64] {
        self.as_mut_slice()
    }
}

/// Marker for buffers the host only reads.
#[derive(Debug)]
pub enum Readable {}
/// Marker for buffers the host fills.
#[derive(Debug)]
pub enum Writable {}

/// View of one of Csound's audio buffers (spin, spout, input or output).
///
/// The view borrows the [`Csound`] it came from. Its contents change with
/// every performance call.
#[derive(Debug)]
pub struct BufferPtr<'a, T> {
    ptr: *mut f64,
    len: usize,
    phantom: PhantomData<&'a T>,
}

impl<'a, T> BufferPtr<'a, T> {
    /// # Safety
    /// `ptr` must point to `len` samples that stay valid for `'a`.
    pub(crate) unsafe fn from_raw(ptr: *mut MYFLT, len: usize) -> Option<BufferPtr<'a, T>> {
        if ptr.is_null() {
            return None;
        }
        Some(BufferPtr {
            ptr,
            len,
            phantom: PhantomData,
        })
    }

    /// The buffer length in samples.
    pub fn get_size(&self) -> usize {
        self.len
    }

    /// Copies `min(slice.len(), size)` samples out of the buffer.
    pub fn copy_to_slice(&self, slice: &mut [f64]) -> usize {
        let len = slice.len().min(self.len);
        slice[..len].copy_from_slice(&self.as_slice()[..len]);
        len
    }

    pub fn as_slice(&self) -> &[f64] {
        unsafe { slice::from_raw_parts(self.ptr, self.len) }
    }
}

impl<'a> BufferPtr<'a, Writable> {
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        unsafe { slice::from_raw_parts_mut(self.ptr, self.len) }
    }

    /// Copies `min(slice.len(), size)` samples into the buffer.
    pub fn copy_from_slice(&mut self, slice: &[f64]) -> usize {
        let len = slice.len().min(self.len);
        self.as_mut_slice()[..len].copy_from_slice(&slice[..len]);
        len
    }
}

impl<'a, T> AsRef<[f64]> for BufferPtr<'a, T> {
    fn as_ref(&self) -> &[f64] {
        self.as_slice()
    }
}

impl<'a> AsMut<[f64]> for BufferPtr<'a, Writable> {
    fn as_mut(&mut self) -> &mut [f64] {
        self.as_mut_slice()
    }
}

impl<'a, T> Deref for BufferPtr<'a, T> {
    type Target = [f64];
    fn deref(&self) -> &[f64] {
        self.as_slice()
    }
}

impl<'a> DerefMut for BufferPtr<'a, Writable> {
    fn deref_mut(&mut self) -> &mut [f64] {
        self.as_mut_slice()
    }
}
