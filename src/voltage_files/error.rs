// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with reconciling voltage files.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoltageFileError {
    #[error("No voltage files were supplied")]
    NoVoltageFiles,

    #[error("There is a mixture of voltage filename types (legacy recombined .dat, MWAX .sub)")]
    Mixture,

    #[error("Could not identify the voltage filename structure for {0}")]
    Unrecognised(String),

    #[error("Obs ID {voltage_obs_id} in {voltage_filename} does not match the metafits obs ID {obs_id}")]
    MetafitsObsidMismatch {
        obs_id: u32,
        voltage_obs_id: u32,
        voltage_filename: String,
    },

    #[error("There are missing GPS times in the voltage files (expected {expected}, got {got})")]
    GpsTimeMissing { expected: u64, got: u64 },

    #[error("GPS time {gps_time} has {got} voltage files, but the first GPS time has {expected}; every GPS time must have the same number of files")]
    UnevenChannelsForGpsTime {
        gps_time: u64,
        expected: usize,
        got: usize,
    },

    #[error("GPS time {gps_time} has more than one voltage file for channel {channel}")]
    DuplicateChannel { gps_time: u64, channel: usize },

    #[error("{voltage_filename} is for receiver channel {channel}, which isn't one of the metafits coarse channels")]
    UnmatchedChannel {
        voltage_filename: String,
        channel: usize,
    },

    #[error("{voltage_filename} is {got} bytes, but the first voltage file is {expected} bytes")]
    UnequalFileSizes {
        voltage_filename: String,
        expected: u64,
        got: u64,
    },

    #[error("{voltage_filename} is {got} bytes, but this voltage format should be {expected} bytes")]
    InvalidVoltageFileSize {
        voltage_filename: String,
        expected: u64,
        got: u64,
    },

    #[error("Couldn't inspect voltage file {voltage_filename}: {source}")]
    Io {
        voltage_filename: String,
        source: std::io::Error,
    },
}
