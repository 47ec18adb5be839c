// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The error type returned by context construction.

use thiserror::Error;

use crate::{
    coarse_channel::CoarseChannelError, fits_read::FitsError, gpubox_files::GpuboxError,
    metafits_context::MetafitsError, read::ReadError, rfinput::RfinputError,
    voltage_files::VoltageFileError,
};

#[derive(Error, Debug)]
pub enum MwalibError {
    #[error(transparent)]
    Fits(#[from] FitsError),

    #[error(transparent)]
    Metafits(#[from] MetafitsError),

    #[error(transparent)]
    Rfinput(#[from] RfinputError),

    #[error(transparent)]
    CoarseChannel(#[from] CoarseChannelError),

    #[error(transparent)]
    Gpubox(#[from] GpuboxError),

    #[error(transparent)]
    VoltageFile(#[from] VoltageFileError),

    #[error(transparent)]
    Read(#[from] ReadError),
}
