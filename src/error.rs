use std::ffi::NulError;
use std::path::PathBuf;

use thiserror::Error;

use crate::enums::Status;
use csound_sys::MissingSymbol;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("csound library not found (tried: {})", display_paths(.tried))]
    LibraryNotFound { tried: Vec<PathBuf> },

    #[error(transparent)]
    MissingSymbol(#[from] MissingSymbol),

    #[error("csoundInitialize failed: {0}")]
    Initialize(Status),

    #[error("csoundCreate returned a null instance")]
    CreateFailed,

    #[error("string contains an interior NUL byte")]
    InvalidString(#[from] NulError),

    #[error("empty {0}")]
    EmptyInput(&'static str),

    #[error("`{0}` is not a score event type")]
    InvalidEventType(char),

    #[error("{operation} failed: {status}")]
    Status {
        operation: &'static str,
        status: Status,
    },

    #[error("the {0} buffer is not initialized, compile and start csound first")]
    NotInitialized(&'static str),

    #[error("buffer too small: {required} samples required, {provided} provided")]
    BufferTooSmall { required: usize, provided: usize },

    #[error("channel `{0}` does not exist or has the wrong type")]
    ChannelNotFound(String),

    #[error("index {index} is out of range for table {table}")]
    TableIndex { table: u32, index: u32 },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Maps a raw return code to `Ok(())` on `CSOUND_SUCCESS`.
pub(crate) fn check(operation: &'static str, code: libc::c_int) -> Result<()> {
    match Status::from(code) {
        Status::Success => Ok(()),
        status => Err(Error::Status { operation, status }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_maps_status_codes() {
        assert!(check("csoundStart", 0).is_ok());
        match check("csoundCompileOrc", -1) {
            Err(Error::Status { operation, status }) => {
                assert_eq!(operation, "csoundCompileOrc");
                assert_eq!(status, Status::Error);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn messages_name_the_failure() {
        let err = Error::LibraryNotFound {
            tried: vec![PathBuf::from("/opt/a.so"), PathBuf::from("libcsound64.so")],
        };
        assert_eq!(
            err.to_string(),
            "csound library not found (tried: /opt/a.so, libcsound64.so)"
        );
        let err = check("csoundStart", -3).unwrap_err();
        assert_eq!(err.to_string(), "csoundStart failed: CSOUND_PERFORMANCE");
    }
}
