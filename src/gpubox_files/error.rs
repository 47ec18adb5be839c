// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with reconciling gpubox files.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GpuboxError {
    #[error("No gpubox files were supplied")]
    NoGpuboxes,

    #[error("There is a mixture of gpubox filename types (legacy, legacy without batches, MWAX)")]
    Mixture,

    #[error("Could not identify the gpubox filename structure for {0}")]
    Unrecognised(String),

    #[error("There is an entire gpubox batch missing (expected batch {expected}, got {got})")]
    BatchMissing { expected: usize, got: usize },

    #[error("Gpubox batch {batch} has {got} files, but batch 0 has {expected}; every batch must have the same number of files")]
    UnevenCountInBatches {
        batch: usize,
        expected: usize,
        got: usize,
    },

    #[error("Gpubox batch {batch} has more than one file for channel {channel}")]
    DuplicateChannel { batch: usize, channel: usize },

    #[error("{gpubox_filename} is for channel {channel}, which isn't one of the metafits coarse channels")]
    UnmatchedChannel {
        gpubox_filename: String,
        channel: usize,
    },

    #[error("{gpubox_filename} has CORR_VER {found}, but its filename indicates {expected}")]
    CorrVerMismatch {
        gpubox_filename: String,
        expected: String,
        found: String,
    },

    #[error("OBSID {gpubox_obs_id} in {gpubox_filename} does not match the metafits obs ID {obs_id}")]
    ObsIdMismatch {
        obs_id: u32,
        gpubox_obs_id: u32,
        gpubox_filename: String,
    },

    #[error("{gpubox_filename} has data HDUs of shape {got:?}, but the first gpubox file's are {expected:?}")]
    UnequalHduSizes {
        gpubox_filename: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("{0} contains no data HDUs")]
    NoDataHdus(String),

    #[error("NAXIS1 of the first gpubox data HDU is {naxis1}, but the metafits implies {calculated_naxis1} (baselines [{baselines}] * pols [{visibility_pols}] * 2 [r,i])")]
    LegacyNaxis1Mismatch {
        naxis1: usize,
        calculated_naxis1: usize,
        baselines: usize,
        visibility_pols: usize,
    },

    #[error("NAXIS2 of the first gpubox data HDU is {naxis2}, but the metafits implies {calculated_naxis2} (fine chans per coarse)")]
    LegacyNaxis2Mismatch {
        naxis2: usize,
        calculated_naxis2: usize,
    },

    #[error("NAXIS1 of the first gpubox data HDU is {naxis1}, but the metafits implies {calculated_naxis1} (fine chans per coarse [{fine_chans_per_coarse}] * pols [{visibility_pols}] * 2 [r,i])")]
    MwaxNaxis1Mismatch {
        naxis1: usize,
        calculated_naxis1: usize,
        fine_chans_per_coarse: usize,
        visibility_pols: usize,
    },

    #[error("NAXIS2 of the first gpubox data HDU is {naxis2}, but the metafits implies {calculated_naxis2} (baselines)")]
    MwaxNaxis2Mismatch {
        naxis2: usize,
        calculated_naxis2: usize,
    },

    #[error("Legacy correlator data can only be converted for 128 tiles, but the metafits has {num_tiles}")]
    LegacyConversionRequires128Tiles { num_tiles: usize },

    #[error(transparent)]
    Fits(#[from] crate::fits_read::FitsError),
}
