// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! An observation's metadata plus a set of gpubox (correlator) files.

use std::{fmt, path::Path};

use log::{debug, trace};

use crate::{
    coarse_channel::CoarseChannel,
    convert::*,
    error::MwalibError,
    fits_read::*,
    gpubox_files::*,
    metafits_context::MetafitsContext,
    misc::convert_unixtime_to_gpstime,
    read::*,
    timestep::{get_span_ms, Coverage, TimeStep},
    MWAVersion,
};

/// Observation metadata and the gpubox files that hold its visibilities.
///
/// Timesteps are every time found in any gpubox file. Coarse channels are
/// every channel in the metafits; the index lists say which of those were
/// provided and which are common to all provided files.
#[derive(Debug)]
pub struct CorrelatorContext {
    pub metafits_context: MetafitsContext,
    /// One of the correlator versions.
    pub mwa_version: MWAVersion,

    pub num_timesteps: usize,
    pub timesteps: Vec<TimeStep>,
    pub num_coarse_chans: usize,
    /// All metafits coarse channels, in sky order.
    pub coarse_chans: Vec<CoarseChannel>,
    pub num_baselines: usize,
    pub num_visibility_pols: usize,

    pub num_provided_timesteps: usize,
    pub provided_timestep_indices: Vec<usize>,
    pub num_provided_coarse_chans: usize,
    pub provided_coarse_chan_indices: Vec<usize>,

    pub num_common_timesteps: usize,
    pub common_timestep_indices: Vec<usize>,
    pub num_common_coarse_chans: usize,
    pub common_coarse_chan_indices: Vec<usize>,
    pub common_start_unix_time_ms: u64,
    pub common_end_unix_time_ms: u64,
    pub common_start_gps_time_ms: u64,
    pub common_end_gps_time_ms: u64,
    pub common_duration_ms: u64,
    pub common_bandwidth_hz: u32,

    /// Common timesteps after the quack time.
    pub num_common_good_timesteps: usize,
    pub common_good_timestep_indices: Vec<usize>,
    pub num_common_good_coarse_chans: usize,
    pub common_good_coarse_chan_indices: Vec<usize>,
    pub common_good_start_unix_time_ms: u64,
    pub common_good_end_unix_time_ms: u64,
    pub common_good_start_gps_time_ms: u64,
    pub common_good_end_gps_time_ms: u64,
    pub common_good_duration_ms: u64,
    pub common_good_bandwidth_hz: u32,

    pub gpubox_batches: Vec<GpuBoxBatch>,
    pub gpubox_time_map: GpuboxTimeMap,
    pub num_gpubox_files: usize,
    /// BSCALE of the first data HDU, if present.
    pub bscale: Option<f32>,

    /// Bytes of visibilities in one timestep of one coarse channel.
    pub num_timestep_coarse_chan_bytes: usize,
    pub num_timestep_coarse_chan_floats: usize,
    pub num_timestep_coarse_chan_weight_floats: usize,

    /// Only populated for legacy correlator data.
    legacy_conversion_table: Vec<LegacyConversionBaseline>,
}

impl CorrelatorContext {
    /// Build a context from a metafits file and gpubox files. All files are
    /// checked against each other; any inconsistency is an error.
    pub fn new<P: AsRef<Path>, P2: AsRef<Path>>(
        metafits_filename: P,
        gpubox_filenames: &[P2],
    ) -> Result<Self, MwalibError> {
        let (batches, mwa_version) = determine_gpubox_batches(gpubox_filenames)?;
        let metafits_context = MetafitsContext::new(metafits_filename, Some(mwa_version))?;
        validate_channel_identifiers(&batches, &metafits_context.metafits_coarse_chans)?;

        let legacy_conversion_table = match mwa_version {
            MWAVersion::CorrMWAXv2 => vec![],
            _ => {
                if metafits_context.num_ants != LEGACY_NUM_TILES {
                    return Err(GpuboxError::LegacyConversionRequires128Tiles {
                        num_tiles: metafits_context.num_ants,
                    }
                    .into());
                }
                generate_conversion_array(&metafits_context.rf_inputs)
            }
        };

        let num_gpubox_files = batches.iter().map(|b| b.gpubox_files.len()).sum();
        let GpuboxInfo {
            batches,
            mwa_version,
            time_map,
            hdu_shape,
            bscale,
        } = examine_gpubox_files(batches, mwa_version, metafits_context.obs_id)?;

        let num_baselines = metafits_context.num_baselines;
        let num_visibility_pols = metafits_context.num_visibility_pols;
        let num_fine_chans = metafits_context.num_corr_fine_chans_per_coarse;
        validate_hdu_axes(
            mwa_version,
            &hdu_shape,
            num_fine_chans,
            num_baselines,
            num_visibility_pols,
        )?;

        let timesteps = TimeStep::populate_from_unix_times(
            time_map.keys().copied(),
            metafits_context.sched_start_gps_time_ms,
            metafits_context.sched_start_unix_time_ms,
        );
        let timestep_keys: Vec<u64> = timesteps.iter().map(|t| t.unix_time_ms).collect();
        let coarse_chans = metafits_context.metafits_coarse_chans.clone();
        let chan_identifiers: Vec<usize> = coarse_chans.iter().map(|cc| cc.gpubox_number).collect();
        let Coverage {
            provided_timestep_indices,
            common_timestep_indices,
            common_good_timestep_indices,
            provided_coarse_chan_indices,
            common_coarse_chan_indices,
            common_good_coarse_chan_indices,
        } = Coverage::determine(
            &time_map,
            &timestep_keys,
            &chan_identifiers,
            metafits_context.good_time_unix_ms,
        );

        let int_time_ms = metafits_context.corr_int_time_ms;
        let (common_start_unix_time_ms, common_end_unix_time_ms, common_duration_ms) =
            get_span_ms(&timesteps, &common_timestep_indices, int_time_ms);
        let (common_good_start_unix_time_ms, common_good_end_unix_time_ms, common_good_duration_ms) =
            get_span_ms(&timesteps, &common_good_timestep_indices, int_time_ms);
        let to_gps = |unix| {
            convert_unixtime_to_gpstime(
                unix,
                metafits_context.sched_start_gps_time_ms,
                metafits_context.sched_start_unix_time_ms,
            )
        };
        let (common_start_gps_time_ms, common_end_gps_time_ms) = match common_duration_ms {
            0 => (0, 0),
            _ => (to_gps(common_start_unix_time_ms), to_gps(common_end_unix_time_ms)),
        };
        let (common_good_start_gps_time_ms, common_good_end_gps_time_ms) =
            match common_good_duration_ms {
                0 => (0, 0),
                _ => (
                    to_gps(common_good_start_unix_time_ms),
                    to_gps(common_good_end_unix_time_ms),
                ),
            };
        let coarse_chan_width_hz = metafits_context.coarse_chan_width_hz;

        let num_timestep_coarse_chan_floats =
            num_baselines * num_fine_chans * num_visibility_pols * 2;

        debug!(
            "Correlator context for {}: {} timesteps ({} common), {} coarse chans ({} provided, {} common)",
            metafits_context.obs_id,
            timesteps.len(),
            common_timestep_indices.len(),
            coarse_chans.len(),
            provided_coarse_chan_indices.len(),
            common_coarse_chan_indices.len()
        );

        Ok(CorrelatorContext {
            mwa_version,
            num_timesteps: timesteps.len(),
            timesteps,
            num_coarse_chans: coarse_chans.len(),
            coarse_chans,
            num_baselines,
            num_visibility_pols,
            num_provided_timesteps: provided_timestep_indices.len(),
            provided_timestep_indices,
            num_provided_coarse_chans: provided_coarse_chan_indices.len(),
            provided_coarse_chan_indices,
            num_common_timesteps: common_timestep_indices.len(),
            common_timestep_indices,
            num_common_coarse_chans: common_coarse_chan_indices.len(),
            common_bandwidth_hz: common_coarse_chan_indices.len() as u32 * coarse_chan_width_hz,
            common_coarse_chan_indices,
            common_start_unix_time_ms,
            common_end_unix_time_ms,
            common_start_gps_time_ms,
            common_end_gps_time_ms,
            common_duration_ms,
            num_common_good_timesteps: common_good_timestep_indices.len(),
            common_good_timestep_indices,
            num_common_good_coarse_chans: common_good_coarse_chan_indices.len(),
            common_good_bandwidth_hz: common_good_coarse_chan_indices.len() as u32
                * coarse_chan_width_hz,
            common_good_coarse_chan_indices,
            common_good_start_unix_time_ms,
            common_good_end_unix_time_ms,
            common_good_start_gps_time_ms,
            common_good_end_gps_time_ms,
            common_good_duration_ms,
            num_gpubox_files,
            gpubox_batches: batches,
            gpubox_time_map: time_map,
            bscale,
            num_timestep_coarse_chan_bytes: num_timestep_coarse_chan_floats
                * std::mem::size_of::<f32>(),
            num_timestep_coarse_chan_floats,
            num_timestep_coarse_chan_weight_floats: num_baselines * num_visibility_pols,
            legacy_conversion_table,
            metafits_context,
        })
    }

    /// The centre frequencies of every fine channel of the specified coarse
    /// channels \[Hz\].
    pub fn get_fine_chan_freqs_hz_array(&self, coarse_chan_indices: &[usize]) -> Vec<f64> {
        CoarseChannel::get_fine_chan_centres_array_hz(
            &self.coarse_chans,
            coarse_chan_indices,
            self.metafits_context.num_corr_fine_chans_per_coarse,
            self.metafits_context.corr_fine_chan_width_hz,
        )
    }

    /// Find the gpubox file and HDU with data for an index pair, if the pair
    /// is common to all files.
    fn locate(
        &self,
        timestep_index: usize,
        coarse_chan_index: usize,
    ) -> Option<(&GpuBoxFile, usize)> {
        if self
            .common_timestep_indices
            .binary_search(&timestep_index)
            .is_err()
            || self
                .common_coarse_chan_indices
                .binary_search(&coarse_chan_index)
                .is_err()
        {
            return None;
        }
        let channel = self.coarse_chans[coarse_chan_index].gpubox_number;
        let &(batch_index, hdu_index) = self
            .gpubox_time_map
            .get(&self.timesteps[timestep_index].unix_time_ms)?
            .get(&channel)?;
        let file = self.gpubox_batches.get(batch_index)?.get_file(channel)?;
        Some((file, hdu_index))
    }

    /// Validate a request and find its data. `Ok(None)` means "no data".
    fn prepare_read(
        &self,
        timestep_index: usize,
        coarse_chan_index: usize,
        buffer_len: usize,
        expected_len: usize,
    ) -> Result<Option<(&GpuBoxFile, usize)>, ReadError> {
        validate_indices(
            timestep_index,
            self.num_timesteps,
            coarse_chan_index,
            self.num_coarse_chans,
        )?;
        validate_buffer_len(expected_len, buffer_len)?;
        let found = self.locate(timestep_index, coarse_chan_index);
        if found.is_none() {
            trace!("No data for timestep {timestep_index}, coarse chan {coarse_chan_index}");
        }
        Ok(found)
    }

    /// Read a whole HDU's floats into `buffer`.
    fn read_hdu(
        gpubox: &GpuBoxFile,
        hdu_index: usize,
        buffer: &mut [f32],
    ) -> Result<(), ReadError> {
        let mut read = || -> Result<(), FitsError> {
            let mut fptr = fits_open(&gpubox.filename)?;
            let hdu = fits_open_hdu(&mut fptr, hdu_index)?;
            get_fits_float_image_into_buffer(&mut fptr, &hdu, buffer)
        };
        read().map_err(|e| ReadError::read_failure(&gpubox.filename, e))
    }

    /// Read one timestep of one coarse channel into `buffer`, in the given
    /// layout. `buffer` must hold at least
    /// `num_timestep_coarse_chan_floats` floats.
    pub fn read(
        &self,
        timestep_index: usize,
        coarse_chan_index: usize,
        layout: ReadLayout,
        buffer: &mut [f32],
    ) -> Result<ReadOutcome, ReadError> {
        let num_floats = self.num_timestep_coarse_chan_floats;
        let (gpubox, hdu_index) =
            match self.prepare_read(timestep_index, coarse_chan_index, buffer.len(), num_floats)? {
                Some(found) => found,
                None => return Ok(ReadOutcome::NoData),
            };
        let out = &mut buffer[..num_floats];
        let num_fine_chans = self.metafits_context.num_corr_fine_chans_per_coarse;

        match (self.mwa_version, layout) {
            (MWAVersion::CorrMWAXv2, ReadLayout::ByBaseline) => {
                Self::read_hdu(gpubox, hdu_index, out)?;
            }
            (MWAVersion::CorrMWAXv2, ReadLayout::ByFrequency) => {
                let mut hdu = vec![0.0; num_floats];
                Self::read_hdu(gpubox, hdu_index, &mut hdu)?;
                convert_mwax_hdu_to_frequency_order(
                    &hdu,
                    out,
                    self.num_baselines,
                    num_fine_chans,
                    self.num_visibility_pols,
                );
            }
            (_, ReadLayout::ByBaseline) => {
                let mut hdu = vec![0.0; num_floats];
                Self::read_hdu(gpubox, hdu_index, &mut hdu)?;
                convert_legacy_hdu_to_mwax_baseline_order(
                    &self.legacy_conversion_table,
                    &hdu,
                    out,
                    num_fine_chans,
                );
            }
            (_, ReadLayout::ByFrequency) => {
                let mut hdu = vec![0.0; num_floats];
                Self::read_hdu(gpubox, hdu_index, &mut hdu)?;
                convert_legacy_hdu_to_mwax_frequency_order(
                    &self.legacy_conversion_table,
                    &hdu,
                    out,
                    num_fine_chans,
                );
            }
        }
        Ok(ReadOutcome::Data)
    }

    /// Visibilities as `[baseline][fine chan][pol][r,i]`.
    pub fn read_by_baseline_into_buffer(
        &self,
        timestep_index: usize,
        coarse_chan_index: usize,
        buffer: &mut [f32],
    ) -> Result<ReadOutcome, ReadError> {
        self.read(timestep_index, coarse_chan_index, ReadLayout::ByBaseline, buffer)
    }

    /// Visibilities as `[fine chan][baseline][pol][r,i]`.
    pub fn read_by_frequency_into_buffer(
        &self,
        timestep_index: usize,
        coarse_chan_index: usize,
        buffer: &mut [f32],
    ) -> Result<ReadOutcome, ReadError> {
        self.read(timestep_index, coarse_chan_index, ReadLayout::ByFrequency, buffer)
    }

    /// Weights as `[baseline][pol]`. Legacy data has no weights, so they are
    /// all 1.
    pub fn read_weights_by_baseline_into_buffer(
        &self,
        timestep_index: usize,
        coarse_chan_index: usize,
        buffer: &mut [f32],
    ) -> Result<ReadOutcome, ReadError> {
        let num_floats = self.num_timestep_coarse_chan_weight_floats;
        let (gpubox, hdu_index) =
            match self.prepare_read(timestep_index, coarse_chan_index, buffer.len(), num_floats)? {
                Some(found) => found,
                None => return Ok(ReadOutcome::NoData),
            };
        let out = &mut buffer[..num_floats];
        match self.mwa_version {
            // The weights HDU follows its visibilities.
            MWAVersion::CorrMWAXv2 => Self::read_hdu(gpubox, hdu_index + 1, out)?,
            _ => out.fill(1.0),
        }
        Ok(ReadOutcome::Data)
    }
}

impl fmt::Display for CorrelatorContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "CorrelatorContext (")?;
        writeln!(f, "    obs ID:                 {}", self.metafits_context.obs_id)?;
        writeln!(f, "    version:                {}", self.mwa_version)?;
        writeln!(f, "    timesteps:              {}", self.num_timesteps)?;
        writeln!(f, "    common timesteps:       {:?}", self.common_timestep_indices)?;
        writeln!(f, "    coarse channels:        {}", self.num_coarse_chans)?;
        writeln!(f, "    provided coarse chans:  {:?}", self.provided_coarse_chan_indices)?;
        writeln!(f, "    common coarse chans:    {:?}", self.common_coarse_chan_indices)?;
        writeln!(f, "    common duration:        {} ms", self.common_duration_ms)?;
        writeln!(f, "    baselines:              {}", self.num_baselines)?;
        writeln!(f, "    gpubox files:           {}", self.num_gpubox_files)?;
        writeln!(f, "    gpubox batches:         {}", self.gpubox_batches.len())?;
        write!(f, ")")
    }
}
