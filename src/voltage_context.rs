// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! An observation's metadata plus a set of voltage files.

use std::{
    fmt,
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::Path,
};

use log::{debug, trace};

use crate::{
    coarse_channel::CoarseChannel,
    error::MwalibError,
    metafits_context::MetafitsContext,
    read::*,
    timestep::{get_span_ms, Coverage, TimeStep},
    voltage_files::*,
    MWAVersion,
};

/// The fixed structure of a voltage file for a version and tile count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct VoltageLayout {
    pub(crate) timestep_duration_ms: u64,
    pub(crate) num_fine_chans_per_coarse: usize,
    pub(crate) fine_chan_width_hz: u32,
    pub(crate) sample_size_bytes: u64,
    pub(crate) num_voltage_blocks_per_timestep: u64,
    pub(crate) num_voltage_blocks_per_second: u64,
    pub(crate) num_samples_per_voltage_block: u64,
    pub(crate) voltage_block_size_bytes: u64,
    pub(crate) delay_block_size_bytes: u64,
    pub(crate) data_file_header_size_bytes: u64,
    pub(crate) expected_voltage_data_file_size_bytes: u64,
}

impl VoltageLayout {
    pub(crate) fn new(
        mwa_version: MWAVersion,
        num_rf_inputs: usize,
        coarse_chan_width_hz: u32,
    ) -> VoltageLayout {
        let timestep_duration_ms = voltage_file_duration_s(mwa_version) * 1000;
        let num_rf_inputs = num_rf_inputs as u64;
        match mwa_version {
            MWAVersion::VCSMWAXv2 => {
                let num_samples_per_voltage_block = 64_000;
                let sample_size_bytes = 2;
                let voltage_block_size_bytes =
                    num_samples_per_voltage_block * num_rf_inputs * sample_size_bytes;
                let num_voltage_blocks_per_timestep = 160;
                let data_file_header_size_bytes = 4096;
                VoltageLayout {
                    timestep_duration_ms,
                    num_fine_chans_per_coarse: 1,
                    fine_chan_width_hz: coarse_chan_width_hz,
                    sample_size_bytes,
                    num_voltage_blocks_per_timestep,
                    num_voltage_blocks_per_second: 20,
                    num_samples_per_voltage_block,
                    voltage_block_size_bytes,
                    delay_block_size_bytes: voltage_block_size_bytes,
                    data_file_header_size_bytes,
                    expected_voltage_data_file_size_bytes: data_file_header_size_bytes
                        + voltage_block_size_bytes
                        + num_voltage_blocks_per_timestep * voltage_block_size_bytes,
                }
            }
            _ => {
                let num_fine_chans_per_coarse = 128;
                let num_samples_per_voltage_block = 10_000;
                let voltage_block_size_bytes =
                    num_samples_per_voltage_block * num_rf_inputs * num_fine_chans_per_coarse;
                VoltageLayout {
                    timestep_duration_ms,
                    num_fine_chans_per_coarse: num_fine_chans_per_coarse as usize,
                    fine_chan_width_hz: 10_000,
                    sample_size_bytes: 1,
                    num_voltage_blocks_per_timestep: 1,
                    num_voltage_blocks_per_second: 1,
                    num_samples_per_voltage_block,
                    voltage_block_size_bytes,
                    delay_block_size_bytes: 0,
                    data_file_header_size_bytes: 0,
                    expected_voltage_data_file_size_bytes: voltage_block_size_bytes,
                }
            }
        }
    }

    /// Where the voltage blocks start in a file.
    pub(crate) fn data_offset_bytes(&self) -> u64 {
        self.data_file_header_size_bytes + self.delay_block_size_bytes
    }

    pub(crate) fn bytes_per_second(&self) -> u64 {
        self.num_voltage_blocks_per_second * self.voltage_block_size_bytes
    }
}

/// Observation metadata and the voltage files that hold its samples.
#[derive(Debug)]
pub struct VoltageContext {
    pub metafits_context: MetafitsContext,
    /// One of the voltage versions.
    pub mwa_version: MWAVersion,

    pub num_timesteps: usize,
    /// One timestep per GPS batch of files.
    pub timesteps: Vec<TimeStep>,
    pub num_coarse_chans: usize,
    /// All metafits coarse channels, in sky order.
    pub coarse_chans: Vec<CoarseChannel>,

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

    pub timestep_duration_ms: u64,
    pub num_fine_chans_per_coarse: usize,
    pub fine_chan_width_hz: u32,
    pub sample_size_bytes: u64,
    pub num_voltage_blocks_per_timestep: u64,
    pub num_voltage_blocks_per_second: u64,
    pub num_samples_per_voltage_block: u64,
    pub voltage_block_size_bytes: u64,
    pub delay_block_size_bytes: u64,
    pub data_file_header_size_bytes: u64,
    pub expected_voltage_data_file_size_bytes: u64,

    pub voltage_batches: Vec<VoltageFileBatch>,
    pub voltage_time_map: VoltageTimeMap,
}

impl VoltageContext {
    /// Build a context from a metafits file and voltage files.
    pub fn new<P: AsRef<Path>, P2: AsRef<Path>>(
        metafits_filename: P,
        voltage_filenames: &[P2],
    ) -> Result<Self, MwalibError> {
        // Filenames are checked against the metafits obs ID, so the metafits
        // comes first; its channels are renumbered once the filenames give
        // the version.
        let mut metafits_context = MetafitsContext::new(metafits_filename, None)?;
        let (batches, mwa_version) =
            determine_voltage_batches(voltage_filenames, metafits_context.obs_id)?;
        metafits_context.set_mwa_version(mwa_version)?;
        validate_channel_identifiers(&batches, &metafits_context.metafits_coarse_chans)?;

        let layout = VoltageLayout::new(
            mwa_version,
            metafits_context.num_rf_inputs,
            metafits_context.coarse_chan_width_hz,
        );
        check_voltage_file_sizes(&batches, layout.expected_voltage_data_file_size_bytes)?;
        let time_map = create_time_map(&batches);

        let timesteps = TimeStep::populate_from_gps_times(
            time_map.keys().copied(),
            metafits_context.sched_start_gps_time_ms,
            metafits_context.sched_start_unix_time_ms,
        );
        let timestep_keys: Vec<u64> = timesteps.iter().map(|t| t.gps_time_ms).collect();
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
            metafits_context.good_time_gps_ms,
        );

        let duration_ms = layout.timestep_duration_ms;
        let (common_start_unix_time_ms, common_end_unix_time_ms, common_duration_ms) =
            get_span_ms(&timesteps, &common_timestep_indices, duration_ms);
        let (common_good_start_unix_time_ms, common_good_end_unix_time_ms, common_good_duration_ms) =
            get_span_ms(&timesteps, &common_good_timestep_indices, duration_ms);
        let gps_span = |indices: &[usize]| match (indices.first(), indices.last()) {
            (Some(&first), Some(&last)) => (
                timesteps[first].gps_time_ms,
                timesteps[last].gps_time_ms + duration_ms,
            ),
            _ => (0, 0),
        };
        let (common_start_gps_time_ms, common_end_gps_time_ms) = gps_span(&common_timestep_indices);
        let (common_good_start_gps_time_ms, common_good_end_gps_time_ms) =
            gps_span(&common_good_timestep_indices);
        let coarse_chan_width_hz = metafits_context.coarse_chan_width_hz;

        debug!(
            "Voltage context for {}: {} timesteps ({} common), {} coarse chans ({} provided, {} common)",
            metafits_context.obs_id,
            timesteps.len(),
            common_timestep_indices.len(),
            coarse_chans.len(),
            provided_coarse_chan_indices.len(),
            common_coarse_chan_indices.len()
        );

        Ok(VoltageContext {
            mwa_version,
            num_timesteps: timesteps.len(),
            timesteps,
            num_coarse_chans: coarse_chans.len(),
            coarse_chans,
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
            timestep_duration_ms: layout.timestep_duration_ms,
            num_fine_chans_per_coarse: layout.num_fine_chans_per_coarse,
            fine_chan_width_hz: layout.fine_chan_width_hz,
            sample_size_bytes: layout.sample_size_bytes,
            num_voltage_blocks_per_timestep: layout.num_voltage_blocks_per_timestep,
            num_voltage_blocks_per_second: layout.num_voltage_blocks_per_second,
            num_samples_per_voltage_block: layout.num_samples_per_voltage_block,
            voltage_block_size_bytes: layout.voltage_block_size_bytes,
            delay_block_size_bytes: layout.delay_block_size_bytes,
            data_file_header_size_bytes: layout.data_file_header_size_bytes,
            expected_voltage_data_file_size_bytes: layout.expected_voltage_data_file_size_bytes,
            voltage_batches: batches,
            voltage_time_map: time_map,
            metafits_context,
        })
    }

    fn layout(&self) -> VoltageLayout {
        VoltageLayout {
            timestep_duration_ms: self.timestep_duration_ms,
            num_fine_chans_per_coarse: self.num_fine_chans_per_coarse,
            fine_chan_width_hz: self.fine_chan_width_hz,
            sample_size_bytes: self.sample_size_bytes,
            num_voltage_blocks_per_timestep: self.num_voltage_blocks_per_timestep,
            num_voltage_blocks_per_second: self.num_voltage_blocks_per_second,
            num_samples_per_voltage_block: self.num_samples_per_voltage_block,
            voltage_block_size_bytes: self.voltage_block_size_bytes,
            delay_block_size_bytes: self.delay_block_size_bytes,
            data_file_header_size_bytes: self.data_file_header_size_bytes,
            expected_voltage_data_file_size_bytes: self.expected_voltage_data_file_size_bytes,
        }
    }

    /// The centre frequencies of every fine channel of the specified coarse
    /// channels \[Hz\].
    pub fn get_fine_chan_freqs_hz_array(&self, coarse_chan_indices: &[usize]) -> Vec<f64> {
        CoarseChannel::get_fine_chan_centres_array_hz(
            &self.coarse_chans,
            coarse_chan_indices,
            self.num_fine_chans_per_coarse,
            self.fine_chan_width_hz,
        )
    }

    /// The file for an index pair, if the pair is common to all files.
    fn locate(&self, timestep_index: usize, coarse_chan_index: usize) -> Option<&Path> {
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
        self.voltage_time_map
            .get(&self.timesteps[timestep_index].gps_time_ms)?
            .get(&self.coarse_chans[coarse_chan_index].gpubox_number)
            .map(|p| p.as_path())
    }

    /// Read all voltage blocks of one file (everything after the header and
    /// delay block) into `buffer`.
    pub fn read_file(
        &self,
        timestep_index: usize,
        coarse_chan_index: usize,
        buffer: &mut [i8],
    ) -> Result<ReadOutcome, ReadError> {
        validate_indices(
            timestep_index,
            self.num_timesteps,
            coarse_chan_index,
            self.num_coarse_chans,
        )?;
        let num_bytes =
            (self.num_voltage_blocks_per_timestep * self.voltage_block_size_bytes) as usize;
        validate_buffer_len(num_bytes, buffer.len())?;
        let path = match self.locate(timestep_index, coarse_chan_index) {
            Some(p) => p,
            None => return Ok(ReadOutcome::NoData),
        };
        read_bytes(path, self.layout().data_offset_bytes(), &mut buffer[..num_bytes])?;
        Ok(ReadOutcome::Data)
    }

    /// Read `gps_second_count` seconds of voltages, starting at
    /// `gps_second_start`, for one coarse channel. The seconds may span
    /// several files; every one of those files must be common.
    pub fn read_second(
        &self,
        gps_second_start: u64,
        gps_second_count: usize,
        coarse_chan_index: usize,
        buffer: &mut [i8],
    ) -> Result<ReadOutcome, ReadError> {
        let file_duration_s = self.timestep_duration_ms / 1000;
        let (first, last) = match (self.timesteps.first(), self.timesteps.last()) {
            (Some(first), Some(last)) => (
                first.gps_time_ms / 1000,
                last.gps_time_ms / 1000 + file_duration_s - 1,
            ),
            _ => {
                return Err(ReadError::InvalidTimestepIndex {
                    index: 0,
                    num_timesteps: 0,
                })
            }
        };
        if gps_second_start < first || gps_second_start > last {
            return Err(ReadError::InvalidGpsSecondStart {
                gps_second_start,
                first,
                last,
            });
        }
        let bad_count = ReadError::InvalidGpsSecondCount {
            gps_second_start,
            gps_second_count,
            last,
        };
        // At most this many seconds are available from the start.
        let available = last - gps_second_start + 1;
        if gps_second_count == 0 || gps_second_count as u64 > available {
            return Err(bad_count);
        }
        let gps_second_end = gps_second_start + gps_second_count as u64;
        validate_indices(0, self.num_timesteps, coarse_chan_index, self.num_coarse_chans)?;

        let layout = self.layout();
        let bytes_per_second = layout.bytes_per_second() as usize;
        let num_bytes = gps_second_count
            .checked_mul(bytes_per_second)
            .ok_or(bad_count)?;
        validate_buffer_len(num_bytes, buffer.len())?;

        // Work out every (file, first second in file, number of seconds)
        // before touching the buffer.
        let mut reads = vec![];
        let mut second = gps_second_start;
        while second < gps_second_end {
            let file_start = first + (second - first) / file_duration_s * file_duration_s;
            let count = (file_start + file_duration_s).min(gps_second_end) - second;
            let timestep_index = (file_start - first) / file_duration_s;
            match self.locate(timestep_index as usize, coarse_chan_index) {
                Some(path) => reads.push((path, second - file_start, count)),
                None => return Ok(ReadOutcome::NoData),
            }
            second += count;
        }

        let mut chunks = buffer.chunks_mut(bytes_per_second);
        for (path, offset_s, count) in reads {
            trace!("Reading {count} s from {} at second {offset_s}", path.display());
            for i in 0..count {
                let offset = layout.data_offset_bytes() + (offset_s + i) * layout.bytes_per_second();
                if let Some(chunk) = chunks.next() {
                    read_bytes(path, offset, chunk)?;
                }
            }
        }
        Ok(ReadOutcome::Data)
    }
}

/// Fill `buffer` from `path`, starting `offset` bytes in.
fn read_bytes(path: &Path, offset: u64, buffer: &mut [i8]) -> Result<(), ReadError> {
    // i8 and u8 have the same size and alignment.
    let bytes =
        unsafe { std::slice::from_raw_parts_mut(buffer.as_mut_ptr().cast::<u8>(), buffer.len()) };
    let mut file = File::open(path).map_err(|e| ReadError::read_failure(path, e))?;
    file.seek(SeekFrom::Start(offset))
        .and_then(|_| file.read_exact(bytes))
        .map_err(|e| ReadError::read_failure(path, e))
}

impl fmt::Display for VoltageContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "VoltageContext (")?;
        writeln!(f, "    obs ID:                 {}", self.metafits_context.obs_id)?;
        writeln!(f, "    version:                {}", self.mwa_version)?;
        writeln!(f, "    timesteps:              {}", self.num_timesteps)?;
        writeln!(f, "    timestep duration:      {} ms", self.timestep_duration_ms)?;
        writeln!(f, "    common timesteps:       {:?}", self.common_timestep_indices)?;
        writeln!(f, "    coarse channels:        {}", self.num_coarse_chans)?;
        writeln!(f, "    provided coarse chans:  {:?}", self.provided_coarse_chan_indices)?;
        writeln!(f, "    common coarse chans:    {:?}", self.common_coarse_chan_indices)?;
        writeln!(f, "    fine chans per coarse:  {}", self.num_fine_chans_per_coarse)?;
        writeln!(f, "    voltage block size:     {} bytes", self.voltage_block_size_bytes)?;
        writeln!(f, "    expected file size:     {} bytes", self.expected_voltage_data_file_size_bytes)?;
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{voltage_marker, write_voltage_file, MetafitsFixture};
    use std::path::PathBuf;
    use tempfile::{tempdir, TempDir};

    const OBS_ID: u64 = 1_244_973_688;

    struct Setup {
        _dir: TempDir,
        metafits: PathBuf,
        files: Vec<PathBuf>,
    }

    /// Two tiles, metafits channels 109..=112. Three files each for 109 and
    /// 110; nothing for 111 and 112.
    fn setup(mwa_version: MWAVersion) -> Setup {
        let dir = tempdir().unwrap();
        let mut fixture = MetafitsFixture::new_mwax(2, &[109, 110, 111, 112]);
        fixture.mode = match mwa_version {
            MWAVersion::VCSMWAXv2 => "MWAX_VCS",
            _ => "VOLTAGE_START",
        }
        .to_string();
        let metafits = fixture.write(dir.path());
        let step = voltage_file_duration_s(mwa_version);
        let mut files = vec![];
        for i in 0..3 {
            let gps = OBS_ID + i * step;
            files.push(write_voltage_file(dir.path(), mwa_version, 4, gps, 109));
            files.push(write_voltage_file(dir.path(), mwa_version, 4, gps, 110));
        }
        Setup {
            _dir: dir,
            metafits,
            files,
        }
    }

    #[test]
    fn test_layouts() {
        let legacy = VoltageLayout::new(MWAVersion::VCSLegacyRecombined, 256, 1_280_000);
        assert_eq!(legacy.voltage_block_size_bytes, 327_680_000);
        assert_eq!(legacy.expected_voltage_data_file_size_bytes, 327_680_000);
        assert_eq!(legacy.data_offset_bytes(), 0);
        assert_eq!(legacy.timestep_duration_ms, 1000);

        let mwax = VoltageLayout::new(MWAVersion::VCSMWAXv2, 256, 1_280_000);
        assert_eq!(mwax.voltage_block_size_bytes, 32_768_000);
        assert_eq!(mwax.num_fine_chans_per_coarse, 1);
        assert_eq!(mwax.fine_chan_width_hz, 1_280_000);
        assert_eq!(
            mwax.expected_voltage_data_file_size_bytes,
            4096 + 161 * 32_768_000
        );
        assert_eq!(mwax.bytes_per_second(), 20 * 32_768_000);
        assert_eq!(mwax.timestep_duration_ms, 8000);
    }

    #[test]
    fn test_legacy_context() {
        let s = setup(MWAVersion::VCSLegacyRecombined);
        let context = VoltageContext::new(&s.metafits, &s.files).unwrap();
        assert_eq!(context.mwa_version, MWAVersion::VCSLegacyRecombined);
        assert_eq!(context.num_timesteps, 3);
        assert_eq!(context.timesteps[1].gps_time_ms, (OBS_ID + 1) * 1000);
        assert_eq!(context.num_coarse_chans, 4);
        assert_eq!(context.provided_coarse_chan_indices, vec![0, 1]);
        assert_eq!(context.common_timestep_indices, vec![0, 1, 2]);
        assert_eq!(context.common_coarse_chan_indices, vec![0, 1]);
        assert_eq!(context.common_start_gps_time_ms, OBS_ID * 1000);
        assert_eq!(context.common_end_gps_time_ms, (OBS_ID + 3) * 1000);
        assert_eq!(context.common_duration_ms, 3000);
        // The quack time excludes the first file's start.
        assert_eq!(context.common_good_timestep_indices, vec![1, 2]);
        assert_eq!(context.num_fine_chans_per_coarse, 128);
        assert_eq!(context.voltage_block_size_bytes, 10_000 * 4 * 128);
        assert_eq!(context.get_fine_chan_freqs_hz_array(&[0]).len(), 128);
        assert!(context.to_string().contains("VCS legacy"));
    }

    #[test]
    fn test_repeated_queries_agree() {
        let s = setup(MWAVersion::VCSLegacyRecombined);
        let context = VoltageContext::new(&s.metafits, &s.files).unwrap();

        let chans = context.coarse_chans.clone();
        let timesteps = context.timesteps.clone();
        assert_eq!(context.coarse_chans, chans);
        assert_eq!(context.timesteps, timesteps);
        assert_eq!(
            context.get_fine_chan_freqs_hz_array(&[1, 3]),
            context.get_fine_chan_freqs_hz_array(&[1, 3])
        );

        let mut first = vec![0; context.voltage_block_size_bytes as usize];
        let mut second = vec![1; first.len()];
        context.read_file(2, 1, &mut first).unwrap();
        context.read_file(2, 1, &mut second).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_legacy_read_file() {
        let s = setup(MWAVersion::VCSLegacyRecombined);
        let context = VoltageContext::new(&s.metafits, &s.files).unwrap();
        let mut buffer = vec![0; context.voltage_block_size_bytes as usize];

        let outcome = context.read_file(1, 1, &mut buffer).unwrap();
        assert_eq!(outcome, ReadOutcome::Data);
        assert_eq!(buffer[..8], voltage_marker(110, OBS_ID + 1));

        // Channel 111 is in the metafits, but has no files.
        let mut untouched = vec![7; buffer.len()];
        assert_eq!(
            context.read_file(2, 2, &mut untouched).unwrap(),
            ReadOutcome::NoData
        );
        assert!(untouched.iter().all(|&b| b == 7));

        assert!(matches!(
            context.read_file(3, 0, &mut buffer),
            Err(ReadError::InvalidTimestepIndex { .. })
        ));
        assert!(matches!(
            context.read_file(0, 4, &mut buffer),
            Err(ReadError::InvalidCoarseChanIndex { .. })
        ));
    }

    #[test]
    fn test_legacy_read_second() {
        let s = setup(MWAVersion::VCSLegacyRecombined);
        let context = VoltageContext::new(&s.metafits, &s.files).unwrap();
        let per_second = context.voltage_block_size_bytes as usize;
        let mut buffer = vec![0; 2 * per_second];

        let outcome = context.read_second(OBS_ID, 2, 0, &mut buffer).unwrap();
        assert_eq!(outcome, ReadOutcome::Data);
        assert_eq!(buffer[..8], voltage_marker(109, OBS_ID));
        assert_eq!(buffer[per_second..per_second + 8], voltage_marker(109, OBS_ID + 1));

        let outcome = context.read_second(OBS_ID + 1, 2, 1, &mut buffer).unwrap();
        assert_eq!(outcome, ReadOutcome::Data);
        assert_eq!(buffer[per_second..per_second + 8], voltage_marker(110, OBS_ID + 2));

        let mut untouched = vec![7; buffer.len()];
        assert_eq!(
            context.read_second(OBS_ID + 1, 2, 3, &mut untouched).unwrap(),
            ReadOutcome::NoData
        );
        assert!(untouched.iter().all(|&b| b == 7));
        assert!(matches!(
            context.read_second(OBS_ID - 1, 1, 0, &mut buffer),
            Err(ReadError::InvalidGpsSecondStart { .. })
        ));
        assert!(matches!(
            context.read_second(OBS_ID + 2, 2, 0, &mut buffer),
            Err(ReadError::InvalidGpsSecondCount { .. })
        ));
        assert!(matches!(
            context.read_second(OBS_ID, 0, 0, &mut buffer),
            Err(ReadError::InvalidGpsSecondCount { .. })
        ));
    }

    #[test]
    fn test_buffer_checked_before_io() {
        let s = setup(MWAVersion::VCSLegacyRecombined);
        let context = VoltageContext::new(&s.metafits, &s.files).unwrap();
        for f in &s.files {
            std::fs::remove_file(f).unwrap();
        }
        let per_second = context.voltage_block_size_bytes as usize;
        let mut short = vec![0; per_second - 1];
        assert!(matches!(
            context.read_file(0, 0, &mut short),
            Err(ReadError::BufferTooSmall { .. })
        ));
        assert!(matches!(
            context.read_second(OBS_ID, 1, 0, &mut short),
            Err(ReadError::BufferTooSmall { .. })
        ));
        let mut buffer = vec![0; per_second];
        assert!(matches!(
            context.read_file(0, 0, &mut buffer),
            Err(ReadError::ReadFailure { .. })
        ));
    }

    #[test]
    fn test_mwax_read_second_spans_files() {
        let s = setup(MWAVersion::VCSMWAXv2);
        let context = VoltageContext::new(&s.metafits, &s.files).unwrap();
        assert_eq!(context.mwa_version, MWAVersion::VCSMWAXv2);
        assert_eq!(context.timestep_duration_ms, 8000);
        assert_eq!(context.data_file_header_size_bytes, 4096);
        assert_eq!(context.common_timestep_indices, vec![0, 1, 2]);

        let per_second = (context.num_voltage_blocks_per_second
            * context.voltage_block_size_bytes) as usize;
        let mut buffer = vec![0; 2 * per_second];
        // Seconds 7 and 8 come from different files.
        let outcome = context.read_second(OBS_ID + 7, 2, 1, &mut buffer).unwrap();
        assert_eq!(outcome, ReadOutcome::Data);
        assert_eq!(buffer[..8], voltage_marker(110, OBS_ID + 7));
        assert_eq!(buffer[per_second..per_second + 8], voltage_marker(110, OBS_ID + 8));
    }

    #[test]
    fn test_read_second_huge_count() {
        let s = setup(MWAVersion::VCSLegacyRecombined);
        let context = VoltageContext::new(&s.metafits, &s.files).unwrap();
        let mut buffer = vec![0; context.voltage_block_size_bytes as usize];
        for count in [4, usize::MAX] {
            match context.read_second(OBS_ID, count, 0, &mut buffer) {
                Err(ReadError::InvalidGpsSecondCount {
                    gps_second_count,
                    last,
                    ..
                }) => {
                    assert_eq!(gps_second_count, count);
                    assert_eq!(last, OBS_ID + 2);
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        // The last second on its own is fine.
        assert_eq!(
            context.read_second(OBS_ID + 2, 1, 0, &mut buffer).unwrap(),
            ReadOutcome::Data
        );
        assert_eq!(buffer[..8], voltage_marker(109, OBS_ID + 2));
    }

    #[test]
    fn test_uneven_channels_rejected() {
        let s = setup(MWAVersion::VCSLegacyRecombined);
        // Leave out channel 110's last file.
        let ragged = &s.files[..5];
        match VoltageContext::new(&s.metafits, ragged) {
            Err(MwalibError::VoltageFile(VoltageFileError::UnevenChannelsForGpsTime {
                gps_time,
                expected: 2,
                got: 1,
            })) => assert_eq!(gps_time, OBS_ID + 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_wrong_file_size() {
        let s = setup(MWAVersion::VCSLegacyRecombined);
        std::fs::File::options()
            .write(true)
            .open(&s.files[1])
            .unwrap()
            .set_len(1)
            .unwrap();
        assert!(matches!(
            VoltageContext::new(&s.metafits, &s.files),
            Err(MwalibError::VoltageFile(VoltageFileError::UnequalFileSizes {
                got: 1,
                ..
            }))
        ));
    }

    #[test]
    fn test_no_voltage_files() {
        let s = setup(MWAVersion::VCSLegacyRecombined);
        let none: [PathBuf; 0] = [];
        assert!(matches!(
            VoltageContext::new(&s.metafits, &none),
            Err(MwalibError::VoltageFile(VoltageFileError::NoVoltageFiles))
        ));
    }
}
