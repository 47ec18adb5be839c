// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Reconciling a set of voltage files.
//!
//! Voltage files are raw binary; everything about them comes from their
//! names (obs ID, GPS start second, receiver channel) and their sizes.

pub mod error;

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use itertools::Itertools;
use log::{debug, trace};
use rayon::prelude::*;
use regex::{Regex, RegexBuilder};

pub use error::VoltageFileError;

use crate::{coarse_channel::CoarseChannel, MWAVersion};

lazy_static::lazy_static! {
    static ref RE_MWAX_VCS: Regex =
        RegexBuilder::new(r"^(?P<obs_id>\d{10})_(?P<gpstime>\d{10})_(?P<channel>\d{1,3})\.sub$")
            .case_insensitive(false).build().unwrap();

    static ref RE_LEGACY_VCS_RECOMBINED: Regex =
        RegexBuilder::new(r"^(?P<obs_id>\d{10})_(?P<gpstime>\d{10})_ch(?P<channel>\d{1,3})\.dat$")
            .case_insensitive(false).build().unwrap();
}

/// GPS time \[ms\] => receiver channel => file.
pub type VoltageTimeMap = BTreeMap<u64, BTreeMap<usize, PathBuf>>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoltageFile {
    pub filename: PathBuf,
    /// The receiver channel number in the filename.
    pub channel_identifier: usize,
}

/// All voltage files starting at the same GPS second, sorted by channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoltageFileBatch {
    pub gps_time_seconds: u64,
    pub voltage_files: Vec<VoltageFile>,
}

/// How long one voltage file lasts \[s\].
pub(crate) fn voltage_file_duration_s(mwa_version: MWAVersion) -> u64 {
    match mwa_version {
        MWAVersion::VCSMWAXv2 => 8,
        _ => 1,
    }
}

/// Work out the version, obs ID, GPS start second and channel of a voltage
/// file from its name.
fn parse_voltage_filename(path: &Path) -> Result<(MWAVersion, u32, u64, usize), VoltageFileError> {
    let unrecognised = || VoltageFileError::Unrecognised(path.display().to_string());
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(unrecognised)?;
    let (version, caps) = if let Some(caps) = RE_MWAX_VCS.captures(name) {
        (MWAVersion::VCSMWAXv2, caps)
    } else if let Some(caps) = RE_LEGACY_VCS_RECOMBINED.captures(name) {
        (MWAVersion::VCSLegacyRecombined, caps)
    } else {
        return Err(unrecognised());
    };
    let obs_id = caps["obs_id"].parse().map_err(|_| unrecognised())?;
    let gps_time = caps["gpstime"].parse().map_err(|_| unrecognised())?;
    let channel = caps["channel"].parse().map_err(|_| unrecognised())?;
    Ok((version, obs_id, gps_time, channel))
}

/// Group voltage files into batches by GPS start second, using only their
/// filenames.
pub(crate) fn determine_voltage_batches<P: AsRef<Path>>(
    voltage_filenames: &[P],
    metafits_obs_id: u32,
) -> Result<(Vec<VoltageFileBatch>, MWAVersion), VoltageFileError> {
    if voltage_filenames.is_empty() {
        return Err(VoltageFileError::NoVoltageFiles);
    }

    let mut version = None;
    let mut batches: BTreeMap<u64, Vec<VoltageFile>> = BTreeMap::new();
    for path in voltage_filenames {
        let path = path.as_ref();
        let (this_version, voltage_obs_id, gps_time, channel_identifier) =
            parse_voltage_filename(path)?;
        match version {
            None => version = Some(this_version),
            Some(v) if v != this_version => return Err(VoltageFileError::Mixture),
            Some(_) => (),
        }
        if voltage_obs_id != metafits_obs_id {
            return Err(VoltageFileError::MetafitsObsidMismatch {
                obs_id: metafits_obs_id,
                voltage_obs_id,
                voltage_filename: path.display().to_string(),
            });
        }
        batches.entry(gps_time).or_default().push(VoltageFile {
            filename: path.to_path_buf(),
            channel_identifier,
        });
    }
    let version = version.ok_or(VoltageFileError::NoVoltageFiles)?;
    let step = voltage_file_duration_s(version);

    let mut result: Vec<VoltageFileBatch> = Vec::with_capacity(batches.len());
    for (gps_time_seconds, mut files) in batches {
        if let Some(prev) = result.last() {
            let expected = prev.gps_time_seconds + step;
            if gps_time_seconds != expected {
                return Err(VoltageFileError::GpsTimeMissing {
                    expected,
                    got: gps_time_seconds,
                });
            }
            let expected = prev.voltage_files.len();
            if files.len() != expected {
                return Err(VoltageFileError::UnevenChannelsForGpsTime {
                    gps_time: gps_time_seconds,
                    expected,
                    got: files.len(),
                });
            }
        }
        files.sort_unstable_by_key(|f| f.channel_identifier);
        if let Some((dup, _)) = files
            .iter()
            .tuple_windows()
            .find(|(a, b)| a.channel_identifier == b.channel_identifier)
        {
            return Err(VoltageFileError::DuplicateChannel {
                gps_time: gps_time_seconds,
                channel: dup.channel_identifier,
            });
        }
        result.push(VoltageFileBatch {
            gps_time_seconds,
            voltage_files: files,
        });
    }

    debug!(
        "{} voltage files in {} GPS batch(es), version {version}",
        voltage_filenames.len(),
        result.len()
    );
    Ok((result, version))
}

/// Every voltage file must be for a channel listed in the metafits.
pub(crate) fn validate_channel_identifiers(
    batches: &[VoltageFileBatch],
    coarse_chans: &[CoarseChannel],
) -> Result<(), VoltageFileError> {
    for f in batches.iter().flat_map(|b| &b.voltage_files) {
        if !coarse_chans
            .iter()
            .any(|cc| cc.gpubox_number == f.channel_identifier)
        {
            return Err(VoltageFileError::UnmatchedChannel {
                voltage_filename: f.filename.display().to_string(),
                channel: f.channel_identifier,
            });
        }
    }
    Ok(())
}

/// All voltage files must be the same size, and that size must be what the
/// format dictates.
pub(crate) fn check_voltage_file_sizes(
    batches: &[VoltageFileBatch],
    expected_size_bytes: u64,
) -> Result<(), VoltageFileError> {
    let files: Vec<&VoltageFile> = batches.iter().flat_map(|b| &b.voltage_files).collect();
    let sizes = files
        .par_iter()
        .map(|f| {
            std::fs::metadata(&f.filename)
                .map(|m| m.len())
                .map_err(|source| VoltageFileError::Io {
                    voltage_filename: f.filename.display().to_string(),
                    source,
                })
        })
        .collect::<Result<Vec<u64>, _>>()?;

    let first_size = sizes.first().copied().unwrap_or_default();
    for (f, &size) in files.iter().zip(&sizes) {
        trace!("{}: {size} bytes", f.filename.display());
        if size != first_size {
            return Err(VoltageFileError::UnequalFileSizes {
                voltage_filename: f.filename.display().to_string(),
                expected: first_size,
                got: size,
            });
        }
    }
    match files.first() {
        Some(f) if first_size != expected_size_bytes => {
            Err(VoltageFileError::InvalidVoltageFileSize {
                voltage_filename: f.filename.display().to_string(),
                expected: expected_size_bytes,
                got: first_size,
            })
        }
        _ => Ok(()),
    }
}

pub(crate) fn create_time_map(batches: &[VoltageFileBatch]) -> VoltageTimeMap {
    batches
        .iter()
        .map(|b| {
            (
                b.gps_time_seconds * 1000,
                b.voltage_files
                    .iter()
                    .map(|f| (f.channel_identifier, f.filename.clone()))
                    .collect(),
            )
        })
        .collect()
}
