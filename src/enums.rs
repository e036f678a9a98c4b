use std::fmt;

use csound_sys as raw;
use libc::c_int;

/// Kind of a Csound console message, taken from the type bits of the
/// message attribute. Colour and formatting bits are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Default,
    Error,
    Orchestra,
    Realtime,
    Warning,
    Stdout,
}

impl MessageType {
    pub fn from_attr(attr: c_int) -> MessageType {
        match attr & raw::CSOUNDMSG_TYPE_MASK {
            raw::CSOUNDMSG_ERROR => MessageType::Error,
            raw::CSOUNDMSG_ORCH => MessageType::Orchestra,
            raw::CSOUNDMSG_REALTIME => MessageType::Realtime,
            raw::CSOUNDMSG_WARNING => MessageType::Warning,
            raw::CSOUNDMSG_STDOUT => MessageType::Stdout,
            _ => MessageType::Default,
        }
    }

    pub fn to_attr(self) -> c_int {
        match self {
            MessageType::Default => raw::CSOUNDMSG_DEFAULT,
            MessageType::Error => raw::CSOUNDMSG_ERROR,
            MessageType::Orchestra => raw::CSOUNDMSG_ORCH,
            MessageType::Realtime => raw::CSOUNDMSG_REALTIME,
            MessageType::Warning => raw::CSOUNDMSG_WARNING,
            MessageType::Stdout => raw::CSOUNDMSG_STDOUT,
        }
    }
}

/// Return codes of the Csound API.
///
/// Some functions use positive values to carry data, e.g. `csoundGetChannelPtr`
/// reports the type of an existing channel; those end up in `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Error,
    Initialization,
    Performance,
    Memory,
    Signal,
    Other(i32),
}

impl From<c_int> for Status {
    fn from(value: c_int) -> Self {
        match value {
            raw::CSOUND_SUCCESS => Status::Success,
            raw::CSOUND_ERROR => Status::Error,
            raw::CSOUND_INITIALIZATION => Status::Initialization,
            raw::CSOUND_PERFORMANCE => Status::Performance,
            raw::CSOUND_MEMORY => Status::Memory,
            raw::CSOUND_SIGNAL => Status::Signal,
            value => Status::Other(value),
        }
    }
}

impl Status {
    pub fn to_i32(self) -> i32 {
        match self {
            Status::Success => raw::CSOUND_SUCCESS,
            Status::Error => raw::CSOUND_ERROR,
            Status::Initialization => raw::CSOUND_INITIALIZATION,
            Status::Performance => raw::CSOUND_PERFORMANCE,
            Status::Memory => raw::CSOUND_MEMORY,
            Status::Signal => raw::CSOUND_SIGNAL,
            Status::Other(value) => value,
        }
    }

    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Status::Success => f.write_str("CSOUND_SUCCESS"),
            Status::Error => f.write_str("CSOUND_ERROR"),
            Status::Initialization => f.write_str("CSOUND_INITIALIZATION"),
            Status::Performance => f.write_str("CSOUND_PERFORMANCE"),
            Status::Memory => f.write_str("CSOUND_MEMORY"),
            Status::Signal => f.write_str("CSOUND_SIGNAL"),
            Status::Other(value) => write!(f, "status {}", value),
        }
    }
}

bitflags! {
    /// Channel type and direction bits, as passed to `csoundGetChannelPtr`.
    pub struct ControlChannelType: u32 {
        const CSOUND_UNKNOWN_CHANNEL =     0;

        const CSOUND_CONTROL_CHANNEL =     raw::CSOUND_CONTROL_CHANNEL;
        const CSOUND_AUDIO_CHANNEL  =      raw::CSOUND_AUDIO_CHANNEL;
        const CSOUND_STRING_CHANNEL =      raw::CSOUND_STRING_CHANNEL;
        const CSOUND_PVS_CHANNEL =         raw::CSOUND_PVS_CHANNEL;
        const CSOUND_VAR_CHANNEL =         raw::CSOUND_VAR_CHANNEL;

        const CSOUND_CHANNEL_TYPE_MASK =   raw::CSOUND_CHANNEL_TYPE_MASK;

        const CSOUND_INPUT_CHANNEL =       raw::CSOUND_INPUT_CHANNEL;

        const CSOUND_OUTPUT_CHANNEL =      raw::CSOUND_OUTPUT_CHANNEL;
    }
}

impl ControlChannelType {
    /// The data kind without the direction bits.
    pub fn data_type(self) -> ControlChannelType {
        self & ControlChannelType::CSOUND_CHANNEL_TYPE_MASK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_ignores_colour_bits() {
        let attr = raw::CSOUNDMSG_WARNING | 0x0101 | raw::CSOUNDMSG_FG_ATTR_MASK;
        assert_eq!(MessageType::from_attr(attr), MessageType::Warning);
        assert_eq!(MessageType::from_attr(0x0107), MessageType::Default);
        assert_eq!(MessageType::from_attr(0x1000), MessageType::Error);
        assert_eq!(MessageType::from_attr(0x5000), MessageType::Stdout);
    }

    #[test]
    fn message_type_attr_is_stable() {
        for kind in [
            MessageType::Default,
            MessageType::Error,
            MessageType::Orchestra,
            MessageType::Realtime,
            MessageType::Warning,
            MessageType::Stdout,
        ]
        .iter()
        {
            assert_eq!(MessageType::from_attr(kind.to_attr()), *kind);
        }
    }

    #[test]
    fn status_codes() {
        assert_eq!(Status::from(0), Status::Success);
        assert_eq!(Status::from(-1), Status::Error);
        assert_eq!(Status::from(-5), Status::Signal);
        assert_eq!(Status::from(2), Status::Other(2));
        assert_eq!(Status::from(-9), Status::Other(-9));
        assert_eq!(Status::Memory.to_i32(), -4);
        assert_eq!(Status::Other(3).to_i32(), 3);
        assert_eq!(Status::Performance.to_string(), "CSOUND_PERFORMANCE");
    }

    #[test]
    fn channel_type_mask_strips_direction() {
        let t = ControlChannelType::CSOUND_AUDIO_CHANNEL
            | ControlChannelType::CSOUND_INPUT_CHANNEL
            | ControlChannelType::CSOUND_OUTPUT_CHANNEL;
        assert_eq!(t.bits(), 2 | 16 | 32);
        assert_eq!(t.data_type(), ControlChannelType::CSOUND_AUDIO_CHANNEL);
    }
}
