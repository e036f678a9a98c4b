//! The named channel bus: control, audio and string channels plus their
//! metadata.

use std::ffi::CString;
use std::marker::PhantomData;
use std::ptr;
use std::slice;

use csound_sys::{self as raw, MYFLT};
use libc::{c_char, c_int};

use crate::callbacks::{non_empty_cstring, ptr_to_string};
use crate::csound::{Csound, Readable, Writable};
use crate::enums::{ControlChannelType, Status};
use crate::error::{check, Error, Result};

/// How a control channel's value is meant to move between `min` and `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelBehavior {
    NoHints,
    Integer,
    Linear,
    Exponential,
}

impl ChannelBehavior {
    /// Unknown values are treated as `NoHints`.
    pub fn from_u32(value: u32) -> ChannelBehavior {
        match value {
            raw::CSOUND_CONTROL_CHANNEL_INT => ChannelBehavior::Integer,
            raw::CSOUND_CONTROL_CHANNEL_LIN => ChannelBehavior::Linear,
            raw::CSOUND_CONTROL_CHANNEL_EXP => ChannelBehavior::Exponential,
            _ => ChannelBehavior::NoHints,
        }
    }

    pub fn to_u32(self) -> u32 {
        match self {
            ChannelBehavior::NoHints => raw::CSOUND_CONTROL_CHANNEL_NO_HINTS,
            ChannelBehavior::Integer => raw::CSOUND_CONTROL_CHANNEL_INT,
            ChannelBehavior::Linear => raw::CSOUND_CONTROL_CHANNEL_LIN,
            ChannelBehavior::Exponential => raw::CSOUND_CONTROL_CHANNEL_EXP,
        }
    }
}

impl Default for ChannelBehavior {
    fn default() -> Self {
        ChannelBehavior::NoHints
    }
}

/// Metadata of a control channel, as set with the
/// [`chn_k`](https://csound.com/docs/manual/chn.html) opcode or
/// [`Csound::set_channel_hints`]. Csound does not use it; front ends may
/// build widgets from it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelHints {
    pub behav: ChannelBehavior,
    pub dflt: f64,
    pub min: f64,
    pub max: f64,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub attributes: String,
}

impl ChannelHints {
    fn from_raw(hints: &raw::controlChannelHints_t) -> ChannelHints {
        ChannelHints {
            behav: ChannelBehavior::from_u32(hints.behav),
            dflt: hints.dflt,
            min: hints.min,
            max: hints.max,
            x: hints.x,
            y: hints.y,
            width: hints.width,
            height: hints.height,
            attributes: ptr_to_string(hints.attributes).unwrap_or_default(),
        }
    }
}

/// A channel as reported by [`Csound::list_channels`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub name: String,
    /// Data type and direction bits.
    pub type_: ControlChannelType,
    pub hints: ChannelHints,
}

impl ChannelInfo {
    fn from_raw(info: &raw::controlChannelInfo_t) -> ChannelInfo {
        ChannelInfo {
            name: ptr_to_string(info.name).unwrap_or_default(),
            type_: ControlChannelType::from_bits_truncate(info.type_ as u32),
            hints: ChannelHints::from_raw(&info.hints),
        }
    }
}

mod private {
    pub trait Sealed {}
    impl Sealed for super::ControlChannel {}
    impl Sealed for super::AudioChannel {}
}

/// Channel data kinds that can be accessed through a raw [`ChannelPtr`].
pub trait ChannelKind: private::Sealed {
    fn channel_type() -> ControlChannelType;
    /// Number of samples the channel holds.
    fn samples(csound: &Csound) -> usize;
}

/// A control channel: one sample.
#[derive(Debug)]
pub enum ControlChannel {}

/// An audio channel: `ksmps` samples.
#[derive(Debug)]
pub enum AudioChannel {}

impl ChannelKind for ControlChannel {
    fn channel_type() -> ControlChannelType {
        ControlChannelType::CSOUND_CONTROL_CHANNEL
    }

    fn samples(_: &Csound) -> usize {
        1
    }
}

impl ChannelKind for AudioChannel {
    fn channel_type() -> ControlChannelType {
        ControlChannelType::CSOUND_AUDIO_CHANNEL
    }

    fn samples(csound: &Csound) -> usize {
        csound.get_ksmps() as usize
    }
}

/// Direct access to a channel's storage inside the engine.
///
/// Access is not synchronized with Csound; only use it between performance
/// calls on the thread that owns the [`Csound`], or use the copying channel
/// methods instead.
#[derive(Debug)]
pub struct ChannelPtr<'a, K, T> {
    ptr: *mut f64,
    len: usize,
    phantom: PhantomData<&'a T>,
    kind: PhantomData<K>,
}

impl<'a, K, T> ChannelPtr<'a, K, T> {
    /// # Safety
    /// `ptr` must be non null and point to `len` samples valid for `'a`.
    pub(crate) unsafe fn from_raw(ptr: *mut MYFLT, len: usize) -> ChannelPtr<'a, K, T> {
        ChannelPtr {
            ptr,
            len,
            phantom: PhantomData,
            kind: PhantomData,
        }
    }

    /// The channel length in samples.
    pub fn get_size(&self) -> usize {
        self.len
    }
}

/// Write access to an input channel.
pub trait InputChannelPtr<T: ?Sized> {
    fn write(&self, inp: T);
}

/// Read access to an output channel.
pub trait OutputChannelPtr<'a, T: ?Sized> {
    fn read(&'a self) -> &'a T;
}

impl<'a> OutputChannelPtr<'a, f64> for ChannelPtr<'a, ControlChannel, Readable> {
    fn read(&'a self) -> &'a f64 {
        unsafe { &*self.ptr }
    }
}

impl<'a> InputChannelPtr<f64> for ChannelPtr<'a, ControlChannel, Writable> {
    fn write(&self, inp: f64) {
        unsafe { *self.ptr = inp }
    }
}

impl<'a> OutputChannelPtr<'a, [f64]> for ChannelPtr<'a, AudioChannel, Readable> {
    fn read(&'a self) -> &'a [f64] {
        unsafe { slice::from_raw_parts(self.ptr, self.len) }
    }
}

impl<'a, 'b> InputChannelPtr<&'b [f64]> for ChannelPtr<'a, AudioChannel, Writable> {
    /// Copies at most `ksmps` samples into the channel.
    fn write(&self, inp: &'b [f64]) {
        let len = inp.len().min(self.len);
        unsafe { ptr::copy_nonoverlapping(inp.as_ptr(), self.ptr, len) }
    }
}

impl Csound {
    /// Current value of a control channel.
    pub fn get_control_channel(&self, name: &str) -> Result<f64> {
        let cname = non_empty_cstring("channel name", name)?;
        let mut err: c_int = 0;
        let value = unsafe {
            self.api()
                .csoundGetControlChannel(self.csound, cname.as_ptr(), &mut err as *mut c_int)
        };
        if err != raw::CSOUND_SUCCESS {
            return Err(Error::ChannelNotFound(name.to_owned()));
        }
        Ok(value)
    }

    pub fn set_control_channel(&self, name: &str, value: f64) -> Result<()> {
        let cname = non_empty_cstring("channel name", name)?;
        unsafe {
            self.api()
                .csoundSetControlChannel(self.csound, cname.as_ptr(), value)
        };
        Ok(())
    }

    /// Copies one control period of an audio channel into `output`, which must
    /// hold at least `ksmps` samples.
    pub fn read_audio_channel(&self, name: &str, output: &mut [f64]) -> Result<()> {
        self.check_audio_len(output.len())?;
        let cname = non_empty_cstring("channel name", name)?;
        unsafe {
            self.api()
                .csoundGetAudioChannel(self.csound, cname.as_ptr(), output.as_mut_ptr())
        };
        Ok(())
    }

    /// Fills an audio channel with the first `ksmps` samples of `input`.
    pub fn write_audio_channel(&self, name: &str, input: &[f64]) -> Result<()> {
        self.check_audio_len(input.len())?;
        let cname = non_empty_cstring("channel name", name)?;
        // csoundSetAudioChannel only reads from the buffer.
        unsafe {
            self.api().csoundSetAudioChannel(
                self.csound,
                cname.as_ptr(),
                input.as_ptr() as *mut MYFLT,
            )
        };
        Ok(())
    }

    fn check_audio_len(&self, provided: usize) -> Result<()> {
        let required = self.get_ksmps() as usize;
        if provided < required {
            return Err(Error::BufferTooSmall { required, provided });
        }
        Ok(())
    }

    /// Contents of a string channel; empty when the channel holds nothing.
    pub fn get_string_channel(&self, name: &str) -> Result<String> {
        let size = self.get_channel_data_size(name)?;
        let cname = non_empty_cstring("channel name", name)?;
        // room for the terminating NUL even when the size is unknown
        let mut data = vec![0u8; size + 1];
        unsafe {
            self.api().csoundGetStringChannel(
                self.csound,
                cname.as_ptr(),
                data.as_mut_ptr() as *mut c_char,
            )
        };
        let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        Ok(String::from_utf8_lossy(&data[..end]).into_owned())
    }

    pub fn set_string_channel(&self, name: &str, content: &str) -> Result<()> {
        let cname = non_empty_cstring("channel name", name)?;
        let content = CString::new(content)?;
        unsafe {
            self.api().csoundSetStringChannel(
                self.csound,
                cname.as_ptr(),
                content.as_ptr() as *mut c_char,
            )
        };
        Ok(())
    }

    /// Size in bytes of the data stored in a channel, 0 if it does not exist.
    pub fn get_channel_data_size(&self, name: &str) -> Result<usize> {
        let cname = non_empty_cstring("channel name", name)?;
        let size = unsafe {
            self.api()
                .csoundGetChannelDatasize(self.csound, cname.as_ptr())
        };
        Ok(size.max(0) as usize)
    }

    /// Writable pointer to an input channel, created if it does not exist.
    ///
    /// Audio channels can only be created once the orchestra is compiled,
    /// since their size is `ksmps`. If a channel of another data type already
    /// uses `name`, the error carries that type as `Status::Other(type)`.
    ///
    /// ```no_run
    /// use csound_dynamic::{ControlChannel, Csound, InputChannelPtr};
    ///
    /// # fn main() -> csound_dynamic::Result<()> {
    /// let csound = Csound::new()?;
    /// csound.compile_orc("instr 1\n kamp chnget \"amp\"\nendin\n")?;
    /// let amp = csound.get_input_channel::<ControlChannel>("amp")?;
    /// amp.write(0.5);
    /// # Ok(())
    /// # }
    /// ```
    pub fn get_input_channel<K: ChannelKind>(
        &self,
        name: &str,
    ) -> Result<ChannelPtr<'_, K, Writable>> {
        self.channel_ptr::<K, Writable>(name, ControlChannelType::CSOUND_INPUT_CHANNEL)
    }

    /// Readable pointer to an output channel, created if it does not exist.
    pub fn get_output_channel<K: ChannelKind>(
        &self,
        name: &str,
    ) -> Result<ChannelPtr<'_, K, Readable>> {
        self.channel_ptr::<K, Readable>(name, ControlChannelType::CSOUND_OUTPUT_CHANNEL)
    }

    fn channel_ptr<K: ChannelKind, T>(
        &self,
        name: &str,
        direction: ControlChannelType,
    ) -> Result<ChannelPtr<'_, K, T>> {
        let cname = non_empty_cstring("channel name", name)?;
        let mut data: *mut MYFLT = ptr::null_mut();
        let bits = (K::channel_type() | direction).bits() as c_int;
        let code = unsafe {
            self.api().csoundGetChannelPtr(
                self.csound,
                &mut data as *mut *mut MYFLT,
                cname.as_ptr(),
                bits,
            )
        };
        match Status::from(code) {
            Status::Success if !data.is_null() => {
                Ok(unsafe { ChannelPtr::from_raw(data, K::samples(self)) })
            }
            Status::Success => Err(Error::ChannelNotFound(name.to_owned())),
            status => Err(Error::Status {
                operation: "csoundGetChannelPtr",
                status,
            }),
        }
    }

    /// All channels declared by the orchestra or created through the API.
    pub fn list_channels(&self) -> Result<Vec<ChannelInfo>> {
        let mut list: *mut raw::controlChannelInfo_t = ptr::null_mut();
        let count = unsafe {
            self.api()
                .csoundListChannels(self.csound, &mut list as *mut *mut _)
        };
        if count < 0 {
            return Err(Error::Status {
                operation: "csoundListChannels",
                status: Status::from(count),
            });
        }
        if list.is_null() {
            return Ok(Vec::new());
        }
        let channels = unsafe { slice::from_raw_parts(list, count as usize) }
            .iter()
            .map(ChannelInfo::from_raw)
            .collect();
        unsafe { self.api().csoundDeleteChannelList(self.csound, list) };
        Ok(channels)
    }

    /// Attaches hints to an existing control channel.
    pub fn set_channel_hints(&self, name: &str, hints: &ChannelHints) -> Result<()> {
        let cname = non_empty_cstring("channel name", name)?;
        let attributes = if hints.attributes.is_empty() {
            None
        } else {
            Some(CString::new(hints.attributes.as_str())?)
        };
        let raw_hints = raw::controlChannelHints_t {
            behav: hints.behav.to_u32(),
            dflt: hints.dflt,
            min: hints.min,
            max: hints.max,
            x: hints.x,
            y: hints.y,
            width: hints.width,
            height: hints.height,
            attributes: attributes
                .as_ref()
                .map_or(ptr::null_mut(), |a| a.as_ptr() as *mut c_char),
        };
        check("csoundSetControlChannelHints", unsafe {
            self.api()
                .csoundSetControlChannelHints(self.csound, cname.as_ptr(), raw_hints)
        })
    }

    /// Hints of a control channel; fails if the channel does not exist or is
    /// not a control channel.
    ///
    /// When the channel has attributes, Csound returns them in a new
    /// allocation that the API gives no way to free. Each such call leaks
    /// that string; the returned hints hold their own copy.
    pub fn get_channel_hints(&self, name: &str) -> Result<ChannelHints> {
        let cname = non_empty_cstring("channel name", name)?;
        let mut hints = raw::controlChannelHints_t::default();
        check("csoundGetControlChannelHints", unsafe {
            self.api().csoundGetControlChannelHints(
                self.csound,
                cname.as_ptr(),
                &mut hints as *mut _,
            )
        })?;
        Ok(ChannelHints::from_raw(&hints))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_behavior_means_no_hints() {
        assert_eq!(ChannelBehavior::from_u32(2), ChannelBehavior::Linear);
        assert_eq!(ChannelBehavior::from_u32(3), ChannelBehavior::Exponential);
        assert_eq!(ChannelBehavior::from_u32(42), ChannelBehavior::NoHints);
        assert_eq!(ChannelBehavior::Integer.to_u32(), 1);
    }

    #[test]
    fn hints_are_copied_out_of_csound_memory() {
        let attributes = CString::new("colour=red").unwrap();
        let raw_hints = raw::controlChannelHints_t {
            behav: raw::CSOUND_CONTROL_CHANNEL_EXP,
            dflt: 440.0,
            min: 20.0,
            max: 20000.0,
            x: 1,
            y: 2,
            width: 100,
            height: 20,
            attributes: attributes.as_ptr() as *mut c_char,
        };
        let hints = ChannelHints::from_raw(&raw_hints);
        assert_eq!(hints.behav, ChannelBehavior::Exponential);
        assert_eq!((hints.min, hints.max, hints.dflt), (20.0, 20000.0, 440.0));
        assert_eq!((hints.width, hints.height), (100, 20));
        assert_eq!(hints.attributes, "colour=red");

        let empty = ChannelHints::from_raw(&raw::controlChannelHints_t::default());
        assert_eq!(empty, ChannelHints::default());
    }

    #[test]
    fn channel_list_entries_are_decoded() {
        let names = [CString::new("cutoff").unwrap(), CString::new("left").unwrap()];
        let list = [
            raw::controlChannelInfo_t {
                name: names[0].as_ptr() as *mut c_char,
                type_: (raw::CSOUND_CONTROL_CHANNEL | raw::CSOUND_INPUT_CHANNEL) as c_int,
                hints: raw::controlChannelHints_t::default(),
            },
            raw::controlChannelInfo_t {
                name: names[1].as_ptr() as *mut c_char,
                type_: (raw::CSOUND_AUDIO_CHANNEL | raw::CSOUND_OUTPUT_CHANNEL) as c_int,
                hints: raw::controlChannelHints_t::default(),
            },
        ];
        let infos: Vec<ChannelInfo> = list.iter().map(ChannelInfo::from_raw).collect();
        assert_eq!(infos[0].name, "cutoff");
        assert_eq!(infos[0].type_.data_type(), ControlChannelType::CSOUND_CONTROL_CHANNEL);
        assert!(infos[0].type_.contains(ControlChannelType::CSOUND_INPUT_CHANNEL));
        assert_eq!(infos[1].type_.data_type(), ControlChannelType::CSOUND_AUDIO_CHANNEL);
        assert!(infos[1].type_.contains(ControlChannelType::CSOUND_OUTPUT_CHANNEL));
    }

    #[test]
    fn control_channel_pointer_reads_and_writes_one_sample() {
        let mut value = 0.0f64;
        let input: ChannelPtr<ControlChannel, Writable> =
            unsafe { ChannelPtr::from_raw(&mut value as *mut f64, 1) };
        input.write(0.75);
        let output: ChannelPtr<ControlChannel, Readable> =
            unsafe { ChannelPtr::from_raw(&mut value as *mut f64, 1) };
        assert_eq!(*output.read(), 0.75);
        assert_eq!(output.get_size(), 1);
    }

    #[test]
    fn audio_channel_write_is_clamped_to_ksmps() {
        let mut storage = vec![0.0f64; 4];
        let input: ChannelPtr<AudioChannel, Writable> =
            unsafe { ChannelPtr::from_raw(storage.as_mut_ptr(), storage.len()) };
        input.write(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0][..]);
        let output: ChannelPtr<AudioChannel, Readable> =
            unsafe { ChannelPtr::from_raw(storage.as_mut_ptr(), storage.len()) };
        assert_eq!(output.read(), &[1.0, 2.0, 3.0, 4.0][..]);
    }

    #[test]
    fn channel_kinds_carry_their_type_bits() {
        let input = ControlChannel::channel_type() | ControlChannelType::CSOUND_INPUT_CHANNEL;
        assert_eq!(input.bits(), 17);
        let output = AudioChannel::channel_type() | ControlChannelType::CSOUND_OUTPUT_CHANNEL;
        assert_eq!(output.bits(), 34);
    }
}
