// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Types shared by all indexed reads.

use thiserror::Error;

/// How correlator visibilities are laid out in a caller's buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub enum ReadLayout {
    /// `[baseline][fine chan][pol][r,i]`
    ByBaseline,
    /// `[fine chan][baseline][pol][r,i]`
    ByFrequency,
}

/// The result of a successful read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use]
pub enum ReadOutcome {
    /// The buffer was filled.
    Data,
    /// The index pair is valid, but not every file has data for it. The
    /// buffer is left untouched.
    NoData,
}

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("Invalid timestep index {index}; there are {num_timesteps} timesteps")]
    InvalidTimestepIndex { index: usize, num_timesteps: usize },

    #[error("Invalid coarse channel index {index}; there are {num_coarse_chans} coarse channels")]
    InvalidCoarseChanIndex {
        index: usize,
        num_coarse_chans: usize,
    },

    #[error("Invalid GPS second start {gps_second_start}; it must be between {first} and {last} inclusive")]
    InvalidGpsSecondStart {
        gps_second_start: u64,
        first: u64,
        last: u64,
    },

    #[error("Invalid GPS second count {gps_second_count} from start {gps_second_start}; the last available second is {last}")]
    InvalidGpsSecondCount {
        gps_second_start: u64,
        gps_second_count: usize,
        last: u64,
    },

    #[error("Buffer has {got} elements, but {expected} are needed")]
    BufferTooSmall { expected: usize, got: usize },

    #[error("Failed to read {filename}: {message}")]
    ReadFailure { filename: String, message: String },
}

impl ReadError {
    pub(crate) fn read_failure<E: std::fmt::Display>(filename: &std::path::Path, e: E) -> Self {
        ReadError::ReadFailure {
            filename: filename.display().to_string(),
            message: e.to_string(),
        }
    }
}

/// Check an index pair against the provided timesteps and coarse channels.
pub(crate) fn validate_indices(
    timestep_index: usize,
    num_timesteps: usize,
    coarse_chan_index: usize,
    num_coarse_chans: usize,
) -> Result<(), ReadError> {
    if timestep_index >= num_timesteps {
        return Err(ReadError::InvalidTimestepIndex {
            index: timestep_index,
            num_timesteps,
        });
    }
    if coarse_chan_index >= num_coarse_chans {
        return Err(ReadError::InvalidCoarseChanIndex {
            index: coarse_chan_index,
            num_coarse_chans,
        });
    }
    Ok(())
}

/// Check a caller's buffer is big enough. Only the first `expected` elements
/// are written.
pub(crate) fn validate_buffer_len(expected: usize, got: usize) -> Result<(), ReadError> {
    if got < expected {
        return Err(ReadError::BufferTooSmall { expected, got });
    }
    Ok(())
}
