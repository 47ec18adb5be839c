// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Timesteps, and working out which timesteps and coarse channels have data
//! in every supplied file.

use std::collections::{BTreeMap, BTreeSet};

use hifitime::Epoch;

use crate::misc::{convert_gpstime_to_unixtime, convert_unixtime_to_gpstime};

/// A single timestep (correlator integration or voltage file).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct TimeStep {
    /// UNIX time of the start of this timestep \[milliseconds\]
    pub unix_time_ms: u64,
    /// GPS time of the start of this timestep \[milliseconds\]
    pub gps_time_ms: u64,
}

impl TimeStep {
    pub fn new(unix_time_ms: u64, gps_time_ms: u64) -> Self {
        Self {
            unix_time_ms,
            gps_time_ms,
        }
    }

    /// This timestep as a `hifitime` [`Epoch`].
    pub fn epoch(&self) -> Epoch {
        Epoch::from_gpst_seconds(self.gps_time_ms as f64 / 1e3)
    }

    /// Timesteps from UNIX times (e.g. the keys of a gpubox time map).
    pub(crate) fn populate_from_unix_times<I: IntoIterator<Item = u64>>(
        unix_times_ms: I,
        sched_start_gps_time_ms: u64,
        sched_start_unix_time_ms: u64,
    ) -> Vec<TimeStep> {
        unix_times_ms
            .into_iter()
            .map(|unix| {
                TimeStep::new(
                    unix,
                    convert_unixtime_to_gpstime(
                        unix,
                        sched_start_gps_time_ms,
                        sched_start_unix_time_ms,
                    ),
                )
            })
            .collect()
    }

    /// Timesteps from GPS times (e.g. the keys of a voltage time map).
    pub(crate) fn populate_from_gps_times<I: IntoIterator<Item = u64>>(
        gps_times_ms: I,
        sched_start_gps_time_ms: u64,
        sched_start_unix_time_ms: u64,
    ) -> Vec<TimeStep> {
        gps_times_ms
            .into_iter()
            .map(|gps| {
                TimeStep::new(
                    convert_gpstime_to_unixtime(gps, sched_start_gps_time_ms, sched_start_unix_time_ms),
                    gps,
                )
            })
            .collect()
    }
}

/// Which timesteps and coarse channels were provided, and which are common to
/// all provided data. All indices refer to the full timestep and coarse
/// channel arrays of a context.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Coverage {
    pub(crate) provided_timestep_indices: Vec<usize>,
    pub(crate) common_timestep_indices: Vec<usize>,
    pub(crate) common_good_timestep_indices: Vec<usize>,
    pub(crate) provided_coarse_chan_indices: Vec<usize>,
    pub(crate) common_coarse_chan_indices: Vec<usize>,
    pub(crate) common_good_coarse_chan_indices: Vec<usize>,
}

impl Coverage {
    /// Work out coverage from a time map.
    ///
    /// * `time_map` - time key => (channel identifier => anything).
    /// * `timestep_keys` - the time key of each timestep, in timestep order.
    /// * `chan_identifiers` - the channel identifier of each coarse channel, in
    ///   coarse channel order.
    /// * `good_time_key` - timesteps with keys before this are in the quack
    ///   time and never "good".
    ///
    /// A timestep is common if every provided channel has data for it. A
    /// channel is common if it has data at every common timestep; with no
    /// common timesteps, nothing is common.
    pub(crate) fn determine<V>(
        time_map: &BTreeMap<u64, BTreeMap<usize, V>>,
        timestep_keys: &[u64],
        chan_identifiers: &[usize],
        good_time_key: u64,
    ) -> Coverage {
        let provided_chans: BTreeSet<usize> = time_map
            .values()
            .flat_map(|chans| chans.keys().copied())
            .collect();

        let has_data = |key: u64, chan: usize| {
            time_map
                .get(&key)
                .map(|chans| chans.contains_key(&chan))
                .unwrap_or(false)
        };

        let provided_timestep_indices: Vec<usize> = timestep_keys
            .iter()
            .enumerate()
            .filter(|(_, key)| time_map.get(*key).map(|c| !c.is_empty()).unwrap_or(false))
            .map(|(i, _)| i)
            .collect();
        let common_timestep_indices: Vec<usize> = provided_timestep_indices
            .iter()
            .copied()
            .filter(|&i| provided_chans.iter().all(|&c| has_data(timestep_keys[i], c)))
            .collect();
        let common_good_timestep_indices: Vec<usize> = common_timestep_indices
            .iter()
            .copied()
            .filter(|&i| timestep_keys[i] >= good_time_key)
            .collect();

        let provided_coarse_chan_indices: Vec<usize> = chan_identifiers
            .iter()
            .enumerate()
            .filter(|(_, id)| provided_chans.contains(*id))
            .map(|(i, _)| i)
            .collect();
        let chans_covering = |timesteps: &[usize]| -> Vec<usize> {
            if timesteps.is_empty() {
                return vec![];
            }
            provided_coarse_chan_indices
                .iter()
                .copied()
                .filter(|&c| {
                    timesteps
                        .iter()
                        .all(|&t| has_data(timestep_keys[t], chan_identifiers[c]))
                })
                .collect()
        };
        let common_coarse_chan_indices = chans_covering(&common_timestep_indices);
        let common_good_coarse_chan_indices = chans_covering(&common_good_timestep_indices);

        Coverage {
            provided_timestep_indices,
            common_timestep_indices,
            common_good_timestep_indices,
            provided_coarse_chan_indices,
            common_coarse_chan_indices,
            common_good_coarse_chan_indices,
        }
    }
}

/// The start, end and duration of a set of timesteps. The end is the end of
/// the last timestep, i.e. its start plus `timestep_duration_ms`. An empty
/// set gives all zeros.
pub(crate) fn get_span_ms(
    timesteps: &[TimeStep],
    indices: &[usize],
    timestep_duration_ms: u64,
) -> (u64, u64, u64) {
    match (indices.first(), indices.last()) {
        (Some(&first), Some(&last)) => {
            let start = timesteps[first].unix_time_ms;
            let end = timesteps[last].unix_time_ms + timestep_duration_ms;
            (start, end, end - start)
        }
        _ => (0, 0, 0),
    }
}
