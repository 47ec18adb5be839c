// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Observation contexts for Murchison Widefield Array (MWA) data.
//!
//! A [`MetafitsContext`] describes an observation from its metafits file
//! alone. A [`CorrelatorContext`] or [`VoltageContext`] pairs that with a set
//! of gpubox or voltage files, works out which timesteps and coarse channels
//! the files provide, and reads their data into caller-supplied buffers.

pub mod antenna;
pub mod baseline;
pub mod coarse_channel;
pub mod convert;
pub mod correlator_context;
mod error;
pub mod ffi;
pub mod fits_read;
pub mod gpubox_files;
pub mod metafits_context;
pub mod misc;
pub mod read;
pub mod rfinput;
pub mod timestep;
pub mod visibility_pol;
pub mod voltage_context;
pub mod voltage_files;

#[cfg(test)]
mod test_helpers;

// Re-exports.
pub use antenna::Antenna;
pub use baseline::Baseline;
pub use coarse_channel::{CoarseChannel, CoarseChannelError};
pub use correlator_context::CorrelatorContext;
pub use error::MwalibError;
pub use fits_read::FitsError;
pub use gpubox_files::{GpuBoxBatch, GpuBoxFile, GpuboxError};
pub use metafits_context::{MWAVersion, MetafitsContext, MetafitsError};
pub use read::{ReadError, ReadLayout, ReadOutcome};
pub use rfinput::{Pol, Rfinput, RfinputError};
pub use timestep::TimeStep;
pub use visibility_pol::VisibilityPol;
pub use voltage_context::VoltageContext;
pub use voltage_files::{VoltageFile, VoltageFileBatch, VoltageFileError};

pub use fitsio;
pub use fitsio_sys;
pub use hifitime;
pub use ndarray;
pub use rayon;

/// Information on the build (version, target, profile, ...).
pub mod built_info {
    // The file has been placed there by the build script.
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// The (major, minor, patch) version of this library.
pub fn version() -> (u32, u32, u32) {
    let parse = |s: &str| s.parse::<u32>().unwrap_or(0);
    (
        parse(built_info::PKG_VERSION_MAJOR),
        parse(built_info::PKG_VERSION_MINOR),
        parse(built_info::PKG_VERSION_PATCH),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_matches_cargo() {
        let (major, minor, patch) = version();
        assert_eq!(
            format!("{major}.{minor}.{patch}"),
            built_info::PKG_VERSION
        );
    }

    #[test]
    fn test_contexts_are_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MetafitsContext>();
        assert_send_sync::<CorrelatorContext>();
        assert_send_sync::<VoltageContext>();
    }
}
