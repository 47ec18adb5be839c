// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with reading metafits files.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetafitsError {
    #[error("Metafits key {key} contains '{token}', which is not an integer")]
    InvalidIntList { key: &'static str, token: String },

    #[error("Metafits FINECHAN is {fine_chan_width_hz} Hz, which doesn't divide the coarse channel width ({coarse_chan_width_hz} Hz)")]
    BadFineChanWidth {
        fine_chan_width_hz: u32,
        coarse_chan_width_hz: u32,
    },

    #[error("Metafits NINPUTS is {0}; expected a non-zero even number")]
    BadNumInputs(usize),

    #[error("Metafits GOODTIME ({good_time_unix_ms} ms) is earlier than QUACKTIM ({quack_time_ms} ms) allows")]
    BadGoodTime {
        good_time_unix_ms: u64,
        quack_time_ms: u64,
    },

    #[error("Metafits GOODTIME minus QUACKTIM ({sched_start_unix_time_ms} ms UNIX) is earlier than GPSTIME ({sched_start_gps_time_ms} ms GPS)")]
    StartBeforeGpsTime {
        sched_start_unix_time_ms: u64,
        sched_start_gps_time_ms: u64,
    },

    #[error(transparent)]
    Fits(#[from] crate::fits_read::FitsError),

    #[error(transparent)]
    Rfinput(#[from] crate::rfinput::RfinputError),

    #[error(transparent)]
    CoarseChannel(#[from] crate::coarse_channel::CoarseChannelError),
}
