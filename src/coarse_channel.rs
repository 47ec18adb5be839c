// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Coarse channels, and the mapping between their receiver numbers, their
//! correlator ordinals and the identifiers used in data filenames.

use itertools::Itertools;
use thiserror::Error;

use crate::MWAVersion;

/// Receiver channel numbers at or above this were flipped by the legacy
/// correlator.
pub const LEGACY_CHAN_PIVOT: usize = 128;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CoarseChannelError {
    #[error("No coarse channels were listed in the metafits CHANNELS key")]
    NoChannels,

    #[error("Receiver channel {0} is listed more than once in the metafits CHANNELS key")]
    DuplicateChannel(usize),
}

/// A coarse channel.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct CoarseChannel {
    /// The ordinal of this channel in correlator output.
    pub corr_chan_number: usize,
    /// The receiver (hardware) channel number; `rec_chan_number * 1.28 MHz` is
    /// the centre frequency for standard observations.
    pub rec_chan_number: usize,
    /// The number that identifies this channel's data files: "gpubox01" etc.
    /// for legacy correlator files, the receiver number otherwise.
    pub gpubox_number: usize,
    pub chan_width_hz: u32,
    pub chan_start_hz: u32,
    pub chan_centre_hz: u32,
    pub chan_end_hz: u32,
}

impl CoarseChannel {
    /// Build coarse channels from the receiver numbers in the metafits.
    /// The result is in sky-frequency (ascending receiver number) order.
    pub(crate) fn populate_coarse_channels(
        mwa_version: Option<MWAVersion>,
        metafits_rec_chans: &[usize],
        obs_bandwidth_hz: u32,
    ) -> Result<Vec<CoarseChannel>, CoarseChannelError> {
        if metafits_rec_chans.is_empty() {
            return Err(CoarseChannelError::NoChannels);
        }
        let sky_order: Vec<usize> = metafits_rec_chans.iter().copied().sorted().collect();
        if let Some((dup, _)) = sky_order.iter().tuple_windows().find(|(a, b)| a == b) {
            return Err(CoarseChannelError::DuplicateChannel(*dup));
        }

        let legacy = matches!(
            mwa_version,
            Some(MWAVersion::CorrOldLegacy | MWAVersion::CorrLegacy | MWAVersion::VCSLegacyRecombined)
        );
        // The order the correlator wrote channels in.
        let corr_order: Vec<usize> = if legacy {
            sky_order
                .iter()
                .filter(|&&c| c >= LEGACY_CHAN_PIVOT)
                .chain(sky_order.iter().filter(|&&c| c < LEGACY_CHAN_PIVOT))
                .copied()
                .collect()
        } else {
            sky_order.clone()
        };

        let chan_width_hz = obs_bandwidth_hz / sky_order.len() as u32;
        let channels = sky_order
            .into_iter()
            .map(|rec_chan_number| {
                let corr_chan_number = corr_order
                    .iter()
                    .position(|&c| c == rec_chan_number)
                    .unwrap_or_default();
                let gpubox_number = match mwa_version {
                    Some(MWAVersion::CorrOldLegacy | MWAVersion::CorrLegacy) => corr_chan_number + 1,
                    _ => rec_chan_number,
                };
                let chan_centre_hz = rec_chan_number as u32 * chan_width_hz;
                CoarseChannel {
                    corr_chan_number,
                    rec_chan_number,
                    gpubox_number,
                    chan_width_hz,
                    chan_start_hz: chan_centre_hz.saturating_sub(chan_width_hz / 2),
                    chan_centre_hz,
                    chan_end_hz: chan_centre_hz + chan_width_hz / 2,
                }
            })
            .collect();
        Ok(channels)
    }

    /// The centre frequency of every fine channel of the specified coarse
    /// channels \[Hz\].
    pub fn get_fine_chan_centres_array_hz(
        coarse_chans: &[CoarseChannel],
        coarse_chan_indices: &[usize],
        num_fine_chans_per_coarse: usize,
        fine_chan_width_hz: u32,
    ) -> Vec<f64> {
        let width = f64::from(fine_chan_width_hz);
        coarse_chan_indices
            .iter()
            .filter_map(|&i| coarse_chans.get(i))
            .flat_map(|cc| {
                (0..num_fine_chans_per_coarse)
                    .map(move |f| f64::from(cc.chan_start_hz) + (f as f64 + 0.5) * width)
            })
            .collect()
    }
}
