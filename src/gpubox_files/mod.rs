// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Reconciling a set of gpubox (correlator) files.
//!
//! Filenames tell us the correlator version, each file's channel and its
//! batch. The files themselves tell us which times they hold. Together these
//! build a "time map":
//!
//! ```text
//! UNIX time [ms] => channel identifier => (batch index, HDU index)
//! ```
//!
//! from which the rest of the crate works out what data is available.

pub mod error;

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use fitsio::FitsFile;
use itertools::Itertools;
use log::{debug, trace};
use rayon::prelude::*;
use regex::{Regex, RegexBuilder};

pub use error::GpuboxError;

use crate::{coarse_channel::CoarseChannel, fits_read::*, MWAVersion};

lazy_static::lazy_static! {
    // gpubox files should not be renamed in any way, not even the case of the
    // letters in the filename.
    static ref RE_MWAX: Regex =
        RegexBuilder::new(r"^\d{10}_\d{8}(.)?\d{6}_ch(?P<channel>\d{3})_(?P<batch>\d{3})\.fits$")
            .case_insensitive(false).build().unwrap();

    static ref RE_LEGACY_BATCH: Regex =
        RegexBuilder::new(r"^\d{10}_\d{14}_gpubox(?P<band>\d{2})_(?P<batch>\d{2})\.fits$")
            .case_insensitive(false).build().unwrap();

    static ref RE_OLD_LEGACY: Regex =
        RegexBuilder::new(r"^\d{10}_\d{14}_gpubox(?P<band>\d{2})\.fits$")
            .case_insensitive(false).build().unwrap();
}

/// UNIX time \[ms\] => channel identifier => (batch index, HDU index).
pub type GpuboxTimeMap = BTreeMap<u64, BTreeMap<usize, (usize, usize)>>;

/// A gpubox file and the channel it holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GpuBoxFile {
    pub filename: PathBuf,
    /// "gpubox01" => 1 for legacy files, "ch121" => 121 for MWAX files.
    pub channel_identifier: usize,
}

/// All gpubox files sharing a batch number, sorted by channel identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GpuBoxBatch {
    pub batch_number: usize,
    pub gpubox_files: Vec<GpuBoxFile>,
}

impl GpuBoxBatch {
    /// The file in this batch holding `channel_identifier`, if any.
    pub fn get_file(&self, channel_identifier: usize) -> Option<&GpuBoxFile> {
        self.gpubox_files
            .binary_search_by_key(&channel_identifier, |g| g.channel_identifier)
            .ok()
            .map(|i| &self.gpubox_files[i])
    }
}

/// Everything learned from the gpubox files.
#[derive(Debug)]
pub(crate) struct GpuboxInfo {
    pub(crate) batches: Vec<GpuBoxBatch>,
    pub(crate) mwa_version: MWAVersion,
    pub(crate) time_map: GpuboxTimeMap,
    /// The shape of a data HDU, `[NAXIS2, NAXIS1]`.
    pub(crate) hdu_shape: Vec<usize>,
    pub(crate) bscale: Option<f32>,
}

/// Work out the correlator version, channel identifier and batch number of a
/// gpubox file from its name.
fn parse_gpubox_filename(path: &Path) -> Result<(MWAVersion, usize, usize), GpuboxError> {
    let unrecognised = || GpuboxError::Unrecognised(path.display().to_string());
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(unrecognised)?;
    let number = |caps: &regex::Captures, group: &str| -> Result<usize, GpuboxError> {
        caps.name(group)
            .and_then(|m| m.as_str().parse().ok())
            .ok_or_else(unrecognised)
    };

    if let Some(caps) = RE_MWAX.captures(name) {
        Ok((
            MWAVersion::CorrMWAXv2,
            number(&caps, "channel")?,
            number(&caps, "batch")?,
        ))
    } else if let Some(caps) = RE_LEGACY_BATCH.captures(name) {
        Ok((
            MWAVersion::CorrLegacy,
            number(&caps, "band")?,
            number(&caps, "batch")?,
        ))
    } else if let Some(caps) = RE_OLD_LEGACY.captures(name) {
        Ok((MWAVersion::CorrOldLegacy, number(&caps, "band")?, 0))
    } else {
        Err(unrecognised())
    }
}

/// Group gpubox files into batches, using only their filenames.
///
/// Fails if
///
/// * no files were supplied;
/// * a filename's structure could not be identified;
/// * there is a mixture of correlator versions;
/// * the batch numbers are not contiguous from 0;
/// * the batches don't all have the same number of files as batch 0;
/// * a batch has two files for the same channel.
pub(crate) fn determine_gpubox_batches<P: AsRef<Path>>(
    gpubox_filenames: &[P],
) -> Result<(Vec<GpuBoxBatch>, MWAVersion), GpuboxError> {
    if gpubox_filenames.is_empty() {
        return Err(GpuboxError::NoGpuboxes);
    }

    let mut version = None;
    let mut batches: BTreeMap<usize, Vec<GpuBoxFile>> = BTreeMap::new();
    for path in gpubox_filenames {
        let path = path.as_ref();
        let (this_version, channel_identifier, batch_number) = parse_gpubox_filename(path)?;
        match version {
            None => version = Some(this_version),
            Some(v) if v != this_version => return Err(GpuboxError::Mixture),
            Some(_) => (),
        }
        batches.entry(batch_number).or_default().push(GpuBoxFile {
            filename: path.to_path_buf(),
            channel_identifier,
        });
    }
    let version = version.ok_or(GpuboxError::NoGpuboxes)?;

    let mut expected_count = None;
    let mut result = Vec::with_capacity(batches.len());
    for (expected_batch, (batch_number, mut files)) in batches.into_iter().enumerate() {
        if batch_number != expected_batch {
            return Err(GpuboxError::BatchMissing {
                expected: expected_batch,
                got: batch_number,
            });
        }
        let expected = *expected_count.get_or_insert(files.len());
        if files.len() != expected {
            return Err(GpuboxError::UnevenCountInBatches {
                batch: batch_number,
                expected,
                got: files.len(),
            });
        }
        files.sort_unstable_by_key(|g| g.channel_identifier);
        if let Some((dup, _)) = files
            .iter()
            .tuple_windows()
            .find(|(a, b)| a.channel_identifier == b.channel_identifier)
        {
            return Err(GpuboxError::DuplicateChannel {
                batch: batch_number,
                channel: dup.channel_identifier,
            });
        }
        result.push(GpuBoxBatch {
            batch_number,
            gpubox_files: files,
        });
    }

    debug!(
        "{} gpubox files in {} batch(es), version {version}",
        gpubox_filenames.len(),
        result.len()
    );
    Ok((result, version))
}

/// Every gpubox file must be for a channel listed in the metafits.
pub(crate) fn validate_channel_identifiers(
    batches: &[GpuBoxBatch],
    coarse_chans: &[CoarseChannel],
) -> Result<(), GpuboxError> {
    for g in batches.iter().flat_map(|b| &b.gpubox_files) {
        if !coarse_chans
            .iter()
            .any(|cc| cc.gpubox_number == g.channel_identifier)
        {
            return Err(GpuboxError::UnmatchedChannel {
                gpubox_filename: g.filename.display().to_string(),
                channel: g.channel_identifier,
            });
        }
    }
    Ok(())
}

/// The HDU indices holding visibilities. MWAX files interleave a weights HDU
/// after each visibility HDU.
pub(crate) fn data_hdu_indices(
    mwa_version: MWAVersion,
    num_hdus: usize,
) -> impl Iterator<Item = usize> {
    let step = match mwa_version {
        MWAVersion::CorrMWAXv2 => 2,
        _ => 1,
    };
    (1..num_hdus).step_by(step)
}

/// The time of a data HDU, from its TIME and MILLITIM keys \[ms\].
fn determine_hdu_time(fptr: &mut FitsFile, hdu_index: usize) -> Result<u64, FitsError> {
    let hdu = fits_open_hdu(fptr, hdu_index)?;
    let seconds: u64 = get_required_fits_key(fptr, &hdu, "TIME")?;
    let millis: u64 = get_required_fits_key(fptr, &hdu, "MILLITIM")?;
    Ok(seconds * 1000 + millis)
}

/// What a single gpubox file tells us.
struct FileSummary {
    hdu_shape: Vec<usize>,
    bscale: Option<f32>,
    times: BTreeMap<u64, usize>,
}

fn examine_gpubox_file(
    gpubox: &GpuBoxFile,
    mwa_version: MWAVersion,
    metafits_obs_id: u32,
) -> Result<FileSummary, GpuboxError> {
    let filename = gpubox.filename.display().to_string();
    let mut fptr = fits_open(&gpubox.filename)?;
    let primary = fits_open_hdu(&mut fptr, 0)?;

    let corr_ver: Option<i64> = get_optional_fits_key(&mut fptr, &primary, "CORR_VER")?;
    match (mwa_version, corr_ver) {
        (MWAVersion::CorrMWAXv2, Some(2)) => (),
        (MWAVersion::CorrMWAXv2, found) => {
            return Err(GpuboxError::CorrVerMismatch {
                gpubox_filename: filename,
                expected: "2 (MWAX)".to_string(),
                found: found.map_or_else(|| "(missing)".to_string(), |v| v.to_string()),
            })
        }
        (_, None) => (),
        (_, Some(v)) => {
            return Err(GpuboxError::CorrVerMismatch {
                gpubox_filename: filename,
                expected: "no CORR_VER (legacy)".to_string(),
                found: v.to_string(),
            })
        }
    }

    let gpubox_obs_id: u32 = get_required_fits_key(&mut fptr, &primary, "OBSID")?;
    if gpubox_obs_id != metafits_obs_id {
        return Err(GpuboxError::ObsIdMismatch {
            obs_id: metafits_obs_id,
            gpubox_obs_id,
            gpubox_filename: filename,
        });
    }

    let num_hdus = fptr.num_hdus().map_err(|fits_error| FitsError::Hdu {
        fits_error,
        fits_filename: gpubox.filename.clone(),
        hdu_num: 0,
    })?;
    let mut times = BTreeMap::new();
    for hdu_index in data_hdu_indices(mwa_version, num_hdus) {
        let time = determine_hdu_time(&mut fptr, hdu_index)?;
        trace!("{filename} HDU {hdu_index}: {time}");
        times.insert(time, hdu_index);
    }
    if times.is_empty() {
        return Err(GpuboxError::NoDataHdus(filename));
    }

    let first_data_hdu = fits_open_hdu(&mut fptr, 1)?;
    let hdu_shape = get_hdu_image_size(&fptr, &first_data_hdu)?;
    let bscale = get_optional_fits_key(&mut fptr, &first_data_hdu, "BSCALE")?;

    Ok(FileSummary {
        hdu_shape,
        bscale,
        times,
    })
}

/// Open every gpubox file (in parallel), check it against the metafits and
/// its siblings, and build the time map.
pub(crate) fn examine_gpubox_files(
    batches: Vec<GpuBoxBatch>,
    mwa_version: MWAVersion,
    metafits_obs_id: u32,
) -> Result<GpuboxInfo, GpuboxError> {
    let files: Vec<(usize, &GpuBoxFile)> = batches
        .iter()
        .enumerate()
        .flat_map(|(batch_index, b)| b.gpubox_files.iter().map(move |g| (batch_index, g)))
        .collect();
    // rayon preserves order, so results line up with `files`.
    let summaries = files
        .par_iter()
        .map(|(_, g)| examine_gpubox_file(g, mwa_version, metafits_obs_id))
        .collect::<Result<Vec<FileSummary>, GpuboxError>>()?;

    let mut time_map = GpuboxTimeMap::new();
    let mut hdu_shape: Option<Vec<usize>> = None;
    let mut bscale = None;
    for ((batch_index, g), summary) in files.iter().zip(summaries) {
        match &hdu_shape {
            None => {
                hdu_shape = Some(summary.hdu_shape);
                bscale = summary.bscale;
            }
            Some(expected) if *expected != summary.hdu_shape => {
                return Err(GpuboxError::UnequalHduSizes {
                    gpubox_filename: g.filename.display().to_string(),
                    expected: expected.clone(),
                    got: summary.hdu_shape,
                })
            }
            Some(_) => (),
        }
        for (time, hdu_index) in summary.times {
            time_map
                .entry(time)
                .or_default()
                .entry(g.channel_identifier)
                .or_insert((*batch_index, hdu_index));
        }
    }

    Ok(GpuboxInfo {
        batches,
        mwa_version,
        time_map,
        hdu_shape: hdu_shape.ok_or(GpuboxError::NoGpuboxes)?,
        bscale,
    })
}

/// Check the shape of a data HDU (`[NAXIS2, NAXIS1]`) against what the
/// metafits says it should be.
pub(crate) fn validate_hdu_axes(
    mwa_version: MWAVersion,
    hdu_shape: &[usize],
    fine_chans_per_coarse: usize,
    baselines: usize,
    visibility_pols: usize,
) -> Result<(), GpuboxError> {
    let (naxis2, naxis1) = match hdu_shape {
        [naxis2, naxis1] => (*naxis2, *naxis1),
        _ => (0, 0),
    };
    match mwa_version {
        MWAVersion::CorrMWAXv2 => {
            let calculated_naxis1 = fine_chans_per_coarse * visibility_pols * 2;
            if naxis1 != calculated_naxis1 {
                return Err(GpuboxError::MwaxNaxis1Mismatch {
                    naxis1,
                    calculated_naxis1,
                    fine_chans_per_coarse,
                    visibility_pols,
                });
            }
            if naxis2 != baselines {
                return Err(GpuboxError::MwaxNaxis2Mismatch {
                    naxis2,
                    calculated_naxis2: baselines,
                });
            }
        }
        _ => {
            let calculated_naxis1 = baselines * visibility_pols * 2;
            if naxis1 != calculated_naxis1 {
                return Err(GpuboxError::LegacyNaxis1Mismatch {
                    naxis1,
                    calculated_naxis1,
                    baselines,
                    visibility_pols,
                });
            }
            if naxis2 != fine_chans_per_coarse {
                return Err(GpuboxError::LegacyNaxis2Mismatch {
                    naxis2,
                    calculated_naxis2: fine_chans_per_coarse,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{write_gpubox_file, GpuboxFixture};
    use tempfile::tempdir;

    #[test]
    fn test_parse_filenames() {
        assert_eq!(
            parse_gpubox_filename(Path::new("/data/1244973688_20190619000000_ch121_000.fits"))
                .unwrap(),
            (MWAVersion::CorrMWAXv2, 121, 0)
        );
        assert_eq!(
            parse_gpubox_filename(Path::new("1065880128_20131015134930_gpubox01_01.fits"))
                .unwrap(),
            (MWAVersion::CorrLegacy, 1, 1)
        );
        assert_eq!(
            parse_gpubox_filename(Path::new("1065880128_20131015134930_gpubox24.fits")).unwrap(),
            (MWAVersion::CorrOldLegacy, 24, 0)
        );
        assert!(matches!(
            parse_gpubox_filename(Path::new("1065880128_20131015134930_GPUBOX01_00.fits")),
            Err(GpuboxError::Unrecognised(_))
        ));
        assert!(matches!(
            parse_gpubox_filename(Path::new("1065880128.metafits")),
            Err(GpuboxError::Unrecognised(_))
        ));
    }

    #[test]
    fn test_batches_legacy() {
        let files = [
            "1065880128_20131015134930_gpubox02_01.fits",
            "1065880128_20131015134930_gpubox01_00.fits",
            "1065880128_20131015134930_gpubox01_01.fits",
            "1065880128_20131015134930_gpubox02_00.fits",
        ];
        let (batches, version) = determine_gpubox_batches(&files).unwrap();
        assert_eq!(version, MWAVersion::CorrLegacy);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].batch_number, 1);
        let chans: Vec<usize> = batches[1]
            .gpubox_files
            .iter()
            .map(|g| g.channel_identifier)
            .collect();
        assert_eq!(chans, vec![1, 2]);
        assert_eq!(
            batches[0].get_file(2).unwrap().filename,
            PathBuf::from("1065880128_20131015134930_gpubox02_00.fits")
        );
        assert!(batches[0].get_file(3).is_none());
    }

    #[test]
    fn test_batches_uneven_counts() {
        let mut files: Vec<String> = (1..=5)
            .map(|c| format!("1065880128_20131015134930_gpubox{c:02}_00.fits"))
            .collect();
        files.extend((1..=4).map(|c| format!("1065880128_20131015134930_gpubox{c:02}_01.fits")));
        let err = determine_gpubox_batches(&files).unwrap_err();
        match &err {
            GpuboxError::UnevenCountInBatches {
                batch: 1,
                expected: 5,
                got: 4,
            } => (),
            other => panic!("unexpected {other:?}"),
        }
        let message = err.to_string();
        assert!(message.contains("batch 1"));
        assert!(message.contains('5'));
        assert!(message.contains('4'));
    }

    #[test]
    fn test_batches_missing() {
        let files = [
            "1065880128_20131015134930_gpubox01_00.fits",
            "1065880128_20131015134930_gpubox01_02.fits",
        ];
        assert!(matches!(
            determine_gpubox_batches(&files),
            Err(GpuboxError::BatchMissing {
                expected: 1,
                got: 2
            })
        ));
    }

    #[test]
    fn test_batches_mixture_and_empty() {
        let files = [
            "1065880128_20131015134930_gpubox01_00.fits",
            "1065880128_20131015134930_gpubox02.fits",
        ];
        assert!(matches!(
            determine_gpubox_batches(&files),
            Err(GpuboxError::Mixture)
        ));
        let none: [&str; 0] = [];
        assert!(matches!(
            determine_gpubox_batches(&none),
            Err(GpuboxError::NoGpuboxes)
        ));
    }

    #[test]
    fn test_batches_duplicate_channel() {
        let files = [
            "1244973688_20190619000000_ch121_000.fits",
            "1244973688_20190619000008_ch121_000.fits",
        ];
        assert!(matches!(
            determine_gpubox_batches(&files),
            Err(GpuboxError::DuplicateChannel {
                batch: 0,
                channel: 121
            })
        ));
    }

    #[test]
    fn test_validate_channel_identifiers() {
        let coarse_chans = CoarseChannel::populate_coarse_channels(
            Some(MWAVersion::CorrMWAXv2),
            &[121, 122],
            2_560_000,
        )
        .unwrap();
        let (batches, _) =
            determine_gpubox_batches(&["1244973688_20190619000000_ch121_000.fits"]).unwrap();
        assert!(validate_channel_identifiers(&batches, &coarse_chans).is_ok());
        let (batches, _) =
            determine_gpubox_batches(&["1244973688_20190619000000_ch125_000.fits"]).unwrap();
        match validate_channel_identifiers(&batches, &coarse_chans) {
            Err(e @ GpuboxError::UnmatchedChannel { channel: 125, .. }) => {
                assert!(e.to_string().contains("ch125"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_data_hdu_indices() {
        let mwax: Vec<usize> = data_hdu_indices(MWAVersion::CorrMWAXv2, 7).collect();
        assert_eq!(mwax, vec![1, 3, 5]);
        let legacy: Vec<usize> = data_hdu_indices(MWAVersion::CorrLegacy, 4).collect();
        assert_eq!(legacy, vec![1, 2, 3]);
    }

    #[test]
    fn test_validate_hdu_axes() {
        assert!(validate_hdu_axes(MWAVersion::CorrMWAXv2, &[10, 16], 2, 10, 4).is_ok());
        assert!(matches!(
            validate_hdu_axes(MWAVersion::CorrMWAXv2, &[10, 32], 2, 10, 4),
            Err(GpuboxError::MwaxNaxis1Mismatch {
                calculated_naxis1: 16,
                ..
            })
        ));
        assert!(matches!(
            validate_hdu_axes(MWAVersion::CorrMWAXv2, &[9, 16], 2, 10, 4),
            Err(GpuboxError::MwaxNaxis2Mismatch { .. })
        ));
        assert!(validate_hdu_axes(MWAVersion::CorrLegacy, &[2, 80], 2, 10, 4).is_ok());
        assert!(matches!(
            validate_hdu_axes(MWAVersion::CorrLegacy, &[3, 80], 2, 10, 4),
            Err(GpuboxError::LegacyNaxis2Mismatch { .. })
        ));
    }

    #[test]
    fn test_examine_builds_time_map() {
        let dir = tempdir().unwrap();
        let fixture = GpuboxFixture::mwax(1_244_973_688, 3, 2);
        let start = fixture.first_unix_time_ms();
        let a = write_gpubox_file(dir.path(), &fixture, 121, &[0, 1, 2]);
        let b = write_gpubox_file(dir.path(), &fixture, 122, &[1, 2, 3]);

        let (batches, version) = determine_gpubox_batches(&[a, b]).unwrap();
        let info = examine_gpubox_files(batches, version, 1_244_973_688).unwrap();
        assert_eq!(info.mwa_version, MWAVersion::CorrMWAXv2);
        assert_eq!(info.hdu_shape, vec![6, 16]);
        assert_eq!(info.time_map.len(), 4);
        assert_eq!(info.time_map[&start].len(), 1);
        // Second timestep of channel 121 is its second visibility HDU.
        assert_eq!(info.time_map[&(start + 500)][&121], (0, 3));
        assert_eq!(info.time_map[&(start + 500)][&122], (0, 1));
    }

    #[test]
    fn test_examine_obs_id_mismatch() {
        let dir = tempdir().unwrap();
        let fixture = GpuboxFixture::mwax(1_244_973_688, 2, 2);
        let a = write_gpubox_file(dir.path(), &fixture, 121, &[0]);
        let (batches, version) = determine_gpubox_batches(&[a]).unwrap();
        assert!(matches!(
            examine_gpubox_files(batches, version, 1_244_973_689),
            Err(GpuboxError::ObsIdMismatch { .. })
        ));
    }

    #[test]
    fn test_examine_corr_ver_mismatch() {
        let dir = tempdir().unwrap();
        let mut fixture = GpuboxFixture::mwax(1_244_973_688, 2, 2);
        fixture.corr_ver = None;
        let a = write_gpubox_file(dir.path(), &fixture, 121, &[0]);
        let (batches, version) = determine_gpubox_batches(&[a]).unwrap();
        match examine_gpubox_files(batches, version, 1_244_973_688) {
            Err(GpuboxError::CorrVerMismatch { found, .. }) => assert_eq!(found, "(missing)"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
