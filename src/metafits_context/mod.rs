// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Observation metadata from a metafits file alone.

pub mod error;

use std::{fmt, path::Path};

use fitsio::{hdu::FitsHdu, FitsFile};
use hifitime::Epoch;
use log::{debug, trace};

pub use error::MetafitsError;

use crate::{
    antenna::Antenna,
    baseline::Baseline,
    coarse_channel::CoarseChannel,
    fits_read::*,
    misc::{convert_unixtime_to_gpstime, get_baseline_count, parse_int_list},
    rfinput::Rfinput,
    visibility_pol::VisibilityPol,
};

/// The HDU holding the TILEDATA table.
const TILEDATA_HDU_INDEX: usize = 1;

/// Every MWA antenna has an X and a Y input.
pub const NUM_ANT_POLS: usize = 2;

/// The generation of MWA hardware (and therefore file format) that produced
/// some data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub enum MWAVersion {
    /// Legacy correlator, gpubox files without a batch number.
    CorrOldLegacy = 1,
    /// Legacy correlator, gpubox files with a batch number.
    CorrLegacy = 2,
    /// MWAX correlator.
    CorrMWAXv2 = 3,
    /// Legacy VCS, recombined ".dat" files.
    VCSLegacyRecombined = 4,
    /// MWAX VCS ".sub" files.
    VCSMWAXv2 = 5,
}

impl fmt::Display for MWAVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                MWAVersion::CorrOldLegacy => "Correlator v1 old legacy (no file indices)",
                MWAVersion::CorrLegacy => "Correlator v1 legacy",
                MWAVersion::CorrMWAXv2 => "Correlator v2 MWAX",
                MWAVersion::VCSLegacyRecombined => "VCS legacy recombined",
                MWAVersion::VCSMWAXv2 => "VCS MWAX v2",
            }
        )
    }
}

impl MWAVersion {
    /// Guess the version from the metafits MODE key.
    pub fn from_mode(mode: &str) -> Option<MWAVersion> {
        match mode {
            "HW_LFILES" => Some(MWAVersion::CorrLegacy),
            "MWAX_CORRELATOR" => Some(MWAVersion::CorrMWAXv2),
            "VOLTAGE_START" | "VOLTAGE_BUFFER" => Some(MWAVersion::VCSLegacyRecombined),
            "MWAX_VCS" => Some(MWAVersion::VCSMWAXv2),
            _ => None,
        }
    }
}

/// Metadata about an observation, read from its metafits file.
#[derive(Clone, Debug)]
pub struct MetafitsContext {
    pub metafits_filename: String,
    /// The version this metadata is interpreted for, if known.
    pub mwa_version: Option<MWAVersion>,

    /// Observation ID (GPSTIME).
    pub obs_id: u32,
    pub sched_start_gps_time_ms: u64,
    pub sched_end_gps_time_ms: u64,
    pub sched_start_unix_time_ms: u64,
    pub sched_end_unix_time_ms: u64,
    pub sched_start_utc: Epoch,
    pub sched_start_mjd: f64,
    pub sched_duration_ms: u64,
    pub quack_time_duration_ms: u64,
    /// The first UNIX time after the quack time.
    pub good_time_unix_ms: u64,
    /// The first GPS time after the quack time.
    pub good_time_gps_ms: u64,

    pub ra_tile_pointing_degrees: f64,
    pub dec_tile_pointing_degrees: f64,
    pub ra_phase_center_degrees: Option<f64>,
    pub dec_phase_center_degrees: Option<f64>,
    pub az_deg: f64,
    pub alt_deg: f64,
    pub za_deg: f64,
    pub sun_alt_deg: Option<f64>,
    pub sun_distance_deg: Option<f64>,
    pub moon_distance_deg: Option<f64>,
    pub jupiter_distance_deg: Option<f64>,
    pub lst_deg: f64,
    pub hour_angle_string: String,
    pub grid_name: String,
    pub grid_number: i32,
    pub creator: String,
    pub project_id: String,
    pub obs_name: String,
    pub mode: String,
    pub receivers: Vec<usize>,
    pub delays: Vec<u32>,
    pub global_analogue_attenuation_db: f64,

    pub corr_fine_chan_width_hz: u32,
    pub corr_int_time_ms: u64,
    pub num_corr_fine_chans_per_coarse: usize,

    pub centre_freq_hz: u32,
    pub obs_bandwidth_hz: u32,
    pub coarse_chan_width_hz: u32,
    pub num_metafits_coarse_chans: usize,
    /// All coarse channels listed in the metafits, in sky order.
    pub metafits_coarse_chans: Vec<CoarseChannel>,

    pub num_ants: usize,
    pub antennas: Vec<Antenna>,
    pub num_rf_inputs: usize,
    /// RF inputs in subfile order.
    pub rf_inputs: Vec<Rfinput>,
    pub num_ant_pols: usize,
    pub num_baselines: usize,
    pub baselines: Vec<Baseline>,
    pub num_visibility_pols: usize,
    pub visibility_pols: Vec<VisibilityPol>,
}

/// Read a delimited integer list key.
fn get_int_list<T: std::str::FromStr>(
    fptr: &mut FitsFile,
    hdu: &FitsHdu,
    key: &'static str,
) -> Result<Vec<T>, MetafitsError> {
    let value = get_required_fits_key_long_string(fptr, hdu, key)?;
    parse_int_list(&value).map_err(|token| MetafitsError::InvalidIntList { key, token })
}

impl MetafitsContext {
    /// Read a metafits file. If `mwa_version` is `None`, it is guessed from
    /// the MODE key; it affects how coarse channels are numbered.
    pub fn new<P: AsRef<Path>>(
        metafits: P,
        mwa_version: Option<MWAVersion>,
    ) -> Result<Self, MetafitsError> {
        let metafits = metafits.as_ref();
        debug!("Reading metafits {}", metafits.display());
        let mut fptr = fits_open(metafits)?;
        let hdu = fits_open_hdu(&mut fptr, 0)?;

        let obs_id: u32 = get_required_fits_key(&mut fptr, &hdu, "GPSTIME")?;
        let mode: String = get_required_fits_key(&mut fptr, &hdu, "MODE")?;
        let mwa_version = mwa_version.or_else(|| MWAVersion::from_mode(&mode));

        // Times.
        let exposure_s: u64 = get_required_fits_key(&mut fptr, &hdu, "EXPOSURE")?;
        let sched_duration_ms = exposure_s * 1000;
        let quack_time_s: f64 = get_required_fits_key(&mut fptr, &hdu, "QUACKTIM")?;
        let quack_time_duration_ms = (quack_time_s * 1000.0).round() as u64;
        let good_time_s: f64 = get_required_fits_key(&mut fptr, &hdu, "GOODTIME")?;
        let good_time_unix_ms = (good_time_s * 1000.0).round() as u64;
        let sched_start_unix_time_ms = good_time_unix_ms
            .checked_sub(quack_time_duration_ms)
            .ok_or(MetafitsError::BadGoodTime {
                good_time_unix_ms,
                quack_time_ms: quack_time_duration_ms,
            })?;
        let sched_start_gps_time_ms = u64::from(obs_id) * 1000;
        if sched_start_unix_time_ms < sched_start_gps_time_ms {
            return Err(MetafitsError::StartBeforeGpsTime {
                sched_start_unix_time_ms,
                sched_start_gps_time_ms,
            });
        }
        let good_time_gps_ms = convert_unixtime_to_gpstime(
            good_time_unix_ms,
            sched_start_gps_time_ms,
            sched_start_unix_time_ms,
        );
        let sched_start_utc = Epoch::from_gpst_seconds(sched_start_gps_time_ms as f64 / 1e3);
        let sched_start_mjd: f64 = get_required_fits_key(&mut fptr, &hdu, "MJD")?;

        // Pointing.
        let ra_tile_pointing_degrees: f64 = get_required_fits_key(&mut fptr, &hdu, "RA")?;
        let dec_tile_pointing_degrees: f64 = get_required_fits_key(&mut fptr, &hdu, "DEC")?;
        let ra_phase_center_degrees: Option<f64> =
            get_optional_fits_key(&mut fptr, &hdu, "RAPHASE")?;
        let dec_phase_center_degrees: Option<f64> =
            get_optional_fits_key(&mut fptr, &hdu, "DECPHASE")?;
        let az_deg: f64 = get_required_fits_key(&mut fptr, &hdu, "AZIMUTH")?;
        let alt_deg: f64 = get_required_fits_key(&mut fptr, &hdu, "ALTITUDE")?;
        let sun_alt_deg = get_optional_fits_key(&mut fptr, &hdu, "SUN-ALT")?;
        let sun_distance_deg = get_optional_fits_key(&mut fptr, &hdu, "SUN-DIST")?;
        let moon_distance_deg = get_optional_fits_key(&mut fptr, &hdu, "MOONDIST")?;
        let jupiter_distance_deg = get_optional_fits_key(&mut fptr, &hdu, "JUP-DIST")?;
        let lst_deg: f64 = get_required_fits_key(&mut fptr, &hdu, "LST")?;
        let hour_angle_string: String = get_required_fits_key(&mut fptr, &hdu, "HA")?;
        let grid_name: String = get_optional_fits_key(&mut fptr, &hdu, "GRIDNAME")?
            .unwrap_or_else(|| "NOGRID".to_string());
        let grid_number: i32 = get_optional_fits_key(&mut fptr, &hdu, "GRIDNUM")?.unwrap_or(0);

        // Book-keeping.
        let creator: String = get_required_fits_key(&mut fptr, &hdu, "CREATOR")?;
        let project_id: String = get_required_fits_key(&mut fptr, &hdu, "PROJECT")?;
        let obs_name: String = get_required_fits_key(&mut fptr, &hdu, "FILENAME")?;
        let receivers: Vec<usize> = get_int_list(&mut fptr, &hdu, "RECVRS")?;
        let delays: Vec<u32> = get_int_list(&mut fptr, &hdu, "DELAYS")?;
        let global_analogue_attenuation_db: f64 =
            get_required_fits_key(&mut fptr, &hdu, "ATTEN_DB")?;

        // Frequencies and the correlator.
        let centre_freq_mhz: f64 = get_required_fits_key(&mut fptr, &hdu, "FREQCENT")?;
        let bandwidth_mhz: f64 = get_required_fits_key(&mut fptr, &hdu, "BANDWDTH")?;
        let obs_bandwidth_hz = (bandwidth_mhz * 1e6).round() as u32;
        let rec_chans: Vec<usize> = get_int_list(&mut fptr, &hdu, "CHANNELS")?;
        let metafits_coarse_chans =
            CoarseChannel::populate_coarse_channels(mwa_version, &rec_chans, obs_bandwidth_hz)?;
        let num_metafits_coarse_chans = metafits_coarse_chans.len();
        let coarse_chan_width_hz = obs_bandwidth_hz / num_metafits_coarse_chans as u32;

        let fine_chan_width_khz: f64 = get_required_fits_key(&mut fptr, &hdu, "FINECHAN")?;
        let corr_fine_chan_width_hz = (fine_chan_width_khz * 1000.0).round() as u32;
        if corr_fine_chan_width_hz == 0 || coarse_chan_width_hz % corr_fine_chan_width_hz != 0 {
            return Err(MetafitsError::BadFineChanWidth {
                fine_chan_width_hz: corr_fine_chan_width_hz,
                coarse_chan_width_hz,
            });
        }
        let num_corr_fine_chans_per_coarse =
            (coarse_chan_width_hz / corr_fine_chan_width_hz) as usize;
        let int_time_s: f64 = get_required_fits_key(&mut fptr, &hdu, "INTTIME")?;
        let corr_int_time_ms = (int_time_s * 1000.0).round() as u64;

        // Tiles.
        let num_rf_inputs: usize = get_required_fits_key(&mut fptr, &hdu, "NINPUTS")?;
        if num_rf_inputs == 0 || num_rf_inputs % NUM_ANT_POLS != 0 {
            return Err(MetafitsError::BadNumInputs(num_rf_inputs));
        }
        let tiledata_hdu = fits_open_hdu(&mut fptr, TILEDATA_HDU_INDEX)?;
        let rf_inputs = Rfinput::populate_rf_inputs(
            &mut fptr,
            &tiledata_hdu,
            num_rf_inputs,
            num_metafits_coarse_chans,
        )?;
        let antennas = Antenna::populate_antennas(&rf_inputs);
        let num_ants = antennas.len();
        let baselines = Baseline::populate_baselines(num_ants);
        let visibility_pols = VisibilityPol::populate_visibility_pols();

        trace!(
            "metafits {obs_id}: {num_ants} tiles, {num_metafits_coarse_chans} coarse chans, version {mwa_version:?}"
        );

        Ok(MetafitsContext {
            metafits_filename: metafits.display().to_string(),
            mwa_version,
            obs_id,
            sched_start_gps_time_ms,
            sched_end_gps_time_ms: sched_start_gps_time_ms + sched_duration_ms,
            sched_start_unix_time_ms,
            sched_end_unix_time_ms: sched_start_unix_time_ms + sched_duration_ms,
            sched_start_utc,
            sched_start_mjd,
            sched_duration_ms,
            quack_time_duration_ms,
            good_time_unix_ms,
            good_time_gps_ms,
            ra_tile_pointing_degrees,
            dec_tile_pointing_degrees,
            ra_phase_center_degrees,
            dec_phase_center_degrees,
            az_deg,
            alt_deg,
            za_deg: 90.0 - alt_deg,
            sun_alt_deg,
            sun_distance_deg,
            moon_distance_deg,
            jupiter_distance_deg,
            lst_deg,
            hour_angle_string,
            grid_name,
            grid_number,
            creator,
            project_id,
            obs_name,
            mode,
            receivers,
            delays,
            global_analogue_attenuation_db,
            corr_fine_chan_width_hz,
            corr_int_time_ms,
            num_corr_fine_chans_per_coarse,
            centre_freq_hz: (centre_freq_mhz * 1e6).round() as u32,
            obs_bandwidth_hz,
            coarse_chan_width_hz,
            num_metafits_coarse_chans,
            metafits_coarse_chans,
            num_ants,
            antennas,
            num_rf_inputs,
            rf_inputs,
            num_ant_pols: NUM_ANT_POLS,
            num_baselines: get_baseline_count(num_ants),
            baselines,
            num_visibility_pols: visibility_pols.len(),
            visibility_pols,
        })
    }

    /// Reinterpret the coarse channels for a (now known) version.
    pub(crate) fn set_mwa_version(&mut self, mwa_version: MWAVersion) -> Result<(), MetafitsError> {
        let rec_chans: Vec<usize> = self
            .metafits_coarse_chans
            .iter()
            .map(|cc| cc.rec_chan_number)
            .collect();
        self.metafits_coarse_chans = CoarseChannel::populate_coarse_channels(
            Some(mwa_version),
            &rec_chans,
            self.obs_bandwidth_hz,
        )?;
        self.mwa_version = Some(mwa_version);
        Ok(())
    }
}
