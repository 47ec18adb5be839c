// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Synthetic metafits, gpubox and voltage files for tests.

use std::{
    ffi::CString,
    fs::File,
    io::{Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    ptr,
};

use fitsio::{
    errors::check_status as fits_check_status,
    images::{ImageDescription, ImageType},
    tables::{ColumnDataType, ColumnDescription},
    FitsFile,
};

use crate::{voltage_context::VoltageLayout, MWAVersion};

/// The obs ID used by every fixture.
pub(crate) const FIXTURE_OBS_ID: u32 = 1_244_973_688;

/// GPS epoch in UNIX seconds, less the leap seconds at the fixture obs ID.
const GPS_UNIX_OFFSET_S: u64 = 315_964_782;

fn write_float_key(fptr: &mut FitsFile, key: &str, value: f64) {
    let key = CString::new(key).unwrap();
    let mut status = 0;
    unsafe {
        // ffpkyg = fits_write_key_fixdbl
        fitsio_sys::ffpkyg(
            fptr.as_raw(),   /* I - FITS file pointer  */
            key.as_ptr(),    /* I - keyword name       */
            value,           /* I - keyword value      */
            6,               /* I - no. of decimals    */
            ptr::null_mut(), /* I - keyword comment    */
            &mut status,     /* IO - error status      */
        );
    }
    fits_check_status(status).unwrap();
}

fn write_long_string_key(fptr: &mut FitsFile, key: &str, value: &str) {
    let key = CString::new(key).unwrap();
    let value = CString::new(value).unwrap();
    let mut status = 0;
    unsafe {
        // ffpkls = fits_write_key_longstr
        fitsio_sys::ffpkls(
            fptr.as_raw(),   /* I - FITS file pointer  */
            key.as_ptr(),    /* I - keyword name       */
            value.as_ptr(),  /* I - keyword value      */
            ptr::null_mut(), /* I - keyword comment    */
            &mut status,     /* IO - error status      */
        );
    }
    fits_check_status(status).unwrap();
}

/// Write a row of an integer vector column. `col` and `row` are 0-indexed.
fn write_int_cells(fptr: &mut FitsFile, col: usize, row: usize, values: &[i32]) {
    let mut values = values.to_vec();
    let mut status = 0;
    unsafe {
        // ffpclk = fits_write_col_int
        fitsio_sys::ffpclk(
            fptr.as_raw(),         /* I - FITS file pointer                       */
            col as i32 + 1,        /* I - number of column to write (1 = 1st col) */
            row as i64 + 1,        /* I - first row to write (1 = 1st row)        */
            1,                     /* I - first vector element to write (1 = 1st) */
            values.len() as i64,   /* I - number of values to write               */
            values.as_mut_ptr(),   /* I - array of values to write                */
            &mut status,           /* IO - error status                           */
        );
    }
    fits_check_status(status).unwrap();
}

/// A metafits file with `num_tiles` tiles and the given receiver channels.
pub(crate) struct MetafitsFixture {
    pub(crate) obs_id: u32,
    pub(crate) mode: String,
    pub(crate) num_tiles: usize,
    pub(crate) channels: Vec<usize>,
    /// Written verbatim as CHANNELS instead of `channels`.
    pub(crate) channels_override: Option<String>,
    /// GOODTIME \[UNIX s\]; defaults to half a second after the start.
    pub(crate) good_time_override: Option<f64>,
}

impl MetafitsFixture {
    pub(crate) fn new_mwax(num_tiles: usize, channels: &[usize]) -> Self {
        MetafitsFixture {
            obs_id: FIXTURE_OBS_ID,
            mode: "MWAX_CORRELATOR".to_string(),
            num_tiles,
            channels: channels.to_vec(),
            channels_override: None,
            good_time_override: None,
        }
    }

    pub(crate) fn new_legacy(num_tiles: usize, channels: &[usize]) -> Self {
        MetafitsFixture {
            mode: "HW_LFILES".to_string(),
            ..Self::new_mwax(num_tiles, channels)
        }
    }

    pub(crate) fn write(&self, dir: &Path) -> PathBuf {
        let path = dir.join(format!("{}.metafits", self.obs_id));
        let mut fptr = FitsFile::create(&path).overwrite().open().unwrap();
        let hdu = fptr.primary_hdu().unwrap();

        let num_chans = self.channels.len();
        let sched_start_unix_s = u64::from(self.obs_id) + GPS_UNIX_OFFSET_S;
        hdu.write_key(&mut fptr, "GPSTIME", i64::from(self.obs_id))
            .unwrap();
        hdu.write_key(&mut fptr, "EXPOSURE", 8_i64).unwrap();
        write_float_key(&mut fptr, "QUACKTIM", 0.5);
        let good_time = self
            .good_time_override
            .unwrap_or(sched_start_unix_s as f64 + 0.5);
        write_float_key(&mut fptr, "GOODTIME", good_time);
        write_float_key(&mut fptr, "MJD", 58_653.5);
        write_float_key(&mut fptr, "RA", 60.5);
        write_float_key(&mut fptr, "DEC", -26.75);
        write_float_key(&mut fptr, "AZIMUTH", 0.0);
        write_float_key(&mut fptr, "ALTITUDE", 70.0);
        write_float_key(&mut fptr, "SUN-DIST", 92.25);
        write_float_key(&mut fptr, "LST", 58.125);
        hdu.write_key(&mut fptr, "HA", "00:00:00.00").unwrap();
        hdu.write_key(&mut fptr, "CREATOR", "tests").unwrap();
        hdu.write_key(&mut fptr, "PROJECT", "C001").unwrap();
        hdu.write_key(&mut fptr, "FILENAME", "fixture_obs").unwrap();
        hdu.write_key(&mut fptr, "MODE", self.mode.as_str()).unwrap();
        write_long_string_key(&mut fptr, "RECVRS", "1,2");
        write_long_string_key(&mut fptr, "DELAYS", &["0"; 16].join(","));
        write_float_key(&mut fptr, "ATTEN_DB", 1.5);
        let centre_chan = self.channels.get(num_chans / 2).copied().unwrap_or(0);
        write_float_key(&mut fptr, "FREQCENT", centre_chan as f64 * 1.28);
        write_float_key(&mut fptr, "BANDWDTH", num_chans as f64 * 1.28);
        let channels = match &self.channels_override {
            Some(c) => c.clone(),
            None => self.channels.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(","),
        };
        write_long_string_key(&mut fptr, "CHANNELS", &channels);
        write_float_key(&mut fptr, "FINECHAN", 640.0);
        write_float_key(&mut fptr, "INTTIME", 0.5);
        hdu.write_key(&mut fptr, "NINPUTS", (self.num_tiles * 2) as i64)
            .unwrap();

        let int_col = |name: &str| {
            ColumnDescription::new(name)
                .with_type(ColumnDataType::Int)
                .create()
                .unwrap()
        };
        let str_col = |name: &str, width: usize| {
            ColumnDescription::new(name)
                .with_type(ColumnDataType::String)
                .that_repeats(width)
                .create()
                .unwrap()
        };
        let float_col = |name: &str| {
            ColumnDescription::new(name)
                .with_type(ColumnDataType::Float)
                .create()
                .unwrap()
        };
        let vec_col = |name: &str, n: usize| {
            ColumnDescription::new(name)
                .with_type(ColumnDataType::Int)
                .that_repeats(n)
                .create()
                .unwrap()
        };
        let columns = [
            int_col("Input"),
            int_col("Antenna"),
            int_col("Tile"),
            str_col("TileName", 8),
            str_col("Pol", 1),
            str_col("Length", 14),
            float_col("North"),
            float_col("East"),
            float_col("Height"),
            int_col("Flag"),
            vec_col("Gains", num_chans.max(1)),
            vec_col("Delays", 16),
            int_col("Rx"),
            int_col("Slot"),
        ];
        let table = fptr.create_table("TILEDATA", &columns).unwrap();

        let num_inputs = self.num_tiles * 2;
        let ant = |i: usize| (i / 2) as i32;
        let inputs: Vec<i32> = (0..num_inputs as i32).collect();
        let ants: Vec<i32> = (0..num_inputs).map(ant).collect();
        let tiles: Vec<i32> = (0..num_inputs).map(|i| 1000 + ant(i)).collect();
        let names: Vec<String> = (0..num_inputs).map(|i| format!("Tile{:03}", ant(i))).collect();
        let pols: Vec<String> = (0..num_inputs)
            .map(|i| if i % 2 == 0 { "X" } else { "Y" }.to_string())
            .collect();
        let lengths: Vec<String> = (0..num_inputs)
            .map(|i| format!("EL_{}", 100 + ant(i)))
            .collect();
        let north: Vec<f32> = (0..num_inputs).map(|i| ant(i) as f32 * 10.0).collect();
        let east: Vec<f32> = (0..num_inputs).map(|i| ant(i) as f32 * -5.0).collect();
        let height: Vec<f32> = vec![377.0; num_inputs];
        let zeros: Vec<i32> = vec![0; num_inputs];
        let rx: Vec<i32> = (0..num_inputs).map(|i| 1 + ant(i) / 8).collect();
        let slot: Vec<i32> = (0..num_inputs).map(|i| ant(i) % 8).collect();
        table.write_col(&mut fptr, "Input", &inputs).unwrap();
        table.write_col(&mut fptr, "Antenna", &ants).unwrap();
        table.write_col(&mut fptr, "Tile", &tiles).unwrap();
        table.write_col(&mut fptr, "TileName", &names).unwrap();
        table.write_col(&mut fptr, "Pol", &pols).unwrap();
        table.write_col(&mut fptr, "Length", &lengths).unwrap();
        table.write_col(&mut fptr, "North", &north).unwrap();
        table.write_col(&mut fptr, "East", &east).unwrap();
        table.write_col(&mut fptr, "Height", &height).unwrap();
        table.write_col(&mut fptr, "Flag", &zeros).unwrap();
        table.write_col(&mut fptr, "Rx", &rx).unwrap();
        table.write_col(&mut fptr, "Slot", &slot).unwrap();
        for row in 0..num_inputs {
            write_int_cells(&mut fptr, 10, row, &vec![64; num_chans.max(1)]);
            write_int_cells(&mut fptr, 11, row, &[0; 16]);
        }
        path
    }
}

/// The shape and contents of synthetic gpubox files.
#[derive(Clone, Debug)]
pub(crate) struct GpuboxFixture {
    pub(crate) obs_id: u32,
    pub(crate) mwa_version: MWAVersion,
    pub(crate) num_baselines: usize,
    pub(crate) num_fine_chans: usize,
    pub(crate) corr_ver: Option<i64>,
}

impl GpuboxFixture {
    pub(crate) fn mwax(obs_id: u32, num_tiles: usize, num_fine_chans: usize) -> Self {
        GpuboxFixture {
            obs_id,
            mwa_version: MWAVersion::CorrMWAXv2,
            num_baselines: num_tiles * (num_tiles + 1) / 2,
            num_fine_chans,
            corr_ver: Some(2),
        }
    }

    pub(crate) fn legacy(obs_id: u32, num_tiles: usize, num_fine_chans: usize) -> Self {
        GpuboxFixture {
            mwa_version: MWAVersion::CorrLegacy,
            corr_ver: None,
            ..Self::mwax(obs_id, num_tiles, num_fine_chans)
        }
    }

    /// Matches the scheduled start of a [`MetafitsFixture`] with the same
    /// obs ID.
    pub(crate) fn first_unix_time_ms(&self) -> u64 {
        (u64::from(self.obs_id) + GPS_UNIX_OFFSET_S) * 1000
    }

    /// Visibility float `i` of the HDU for `timestep` on `channel`.
    pub(crate) fn value(&self, channel: usize, timestep: usize, i: usize) -> f32 {
        (i + 1000 * timestep + 10_000 * channel) as f32
    }

    pub(crate) fn weight(&self, channel: usize, timestep: usize, i: usize) -> f32 {
        (i + 100 * timestep + channel) as f32 * 0.5
    }

    /// `[NAXIS2, NAXIS1]`
    fn hdu_shape(&self) -> [usize; 2] {
        match self.mwa_version {
            MWAVersion::CorrMWAXv2 => [self.num_baselines, self.num_fine_chans * 8],
            _ => [self.num_fine_chans, self.num_baselines * 8],
        }
    }
}

/// Write a gpubox file for `channel` holding the given timesteps (0 is the
/// scheduled start, each is 0.5 s long).
pub(crate) fn write_gpubox_file(
    dir: &Path,
    fixture: &GpuboxFixture,
    channel: usize,
    timesteps: &[usize],
) -> PathBuf {
    let name = match fixture.mwa_version {
        MWAVersion::CorrMWAXv2 => {
            format!("{}_20190619000000_ch{channel:03}_000.fits", fixture.obs_id)
        }
        _ => format!("{}_20190619000000_gpubox{channel:02}_00.fits", fixture.obs_id),
    };
    let path = dir.join(name);
    let mut fptr = FitsFile::create(&path).overwrite().open().unwrap();
    let primary = fptr.primary_hdu().unwrap();
    primary
        .write_key(&mut fptr, "OBSID", i64::from(fixture.obs_id))
        .unwrap();
    if let Some(corr_ver) = fixture.corr_ver {
        primary.write_key(&mut fptr, "CORR_VER", corr_ver).unwrap();
    }

    let shape = fixture.hdu_shape();
    for &t in timesteps {
        let time_ms = fixture.first_unix_time_ms() + t as u64 * 500;
        let description = ImageDescription {
            data_type: ImageType::Float,
            dimensions: &shape,
        };
        let hdu = fptr.create_image(format!("VIS{t}"), &description).unwrap();
        hdu.write_key(&mut fptr, "TIME", (time_ms / 1000) as i64)
            .unwrap();
        hdu.write_key(&mut fptr, "MILLITIM", (time_ms % 1000) as i64)
            .unwrap();
        let data: Vec<f32> = (0..shape[0] * shape[1])
            .map(|i| fixture.value(channel, t, i))
            .collect();
        hdu.write_image(&mut fptr, &data).unwrap();

        if fixture.mwa_version == MWAVersion::CorrMWAXv2 {
            let weight_shape = [fixture.num_baselines, 4];
            let description = ImageDescription {
                data_type: ImageType::Float,
                dimensions: &weight_shape,
            };
            let hdu = fptr.create_image(format!("WTS{t}"), &description).unwrap();
            hdu.write_key(&mut fptr, "TIME", (time_ms / 1000) as i64)
                .unwrap();
            hdu.write_key(&mut fptr, "MILLITIM", (time_ms % 1000) as i64)
                .unwrap();
            let weights: Vec<f32> = (0..fixture.num_baselines * 4)
                .map(|i| fixture.weight(channel, t, i))
                .collect();
            hdu.write_image(&mut fptr, &weights).unwrap();
        }
    }
    path
}

/// The 8 bytes at the start of each second of a synthetic voltage file.
pub(crate) fn voltage_marker(channel: usize, gps_second: u64) -> [i8; 8] {
    [
        (channel % 128) as i8,
        (gps_second % 100) as i8,
        1,
        -1,
        2,
        -2,
        3,
        -3,
    ]
}

/// Write a (sparse) voltage file of the right size for the fixture obs ID,
/// with a marker at the start of each second.
pub(crate) fn write_voltage_file(
    dir: &Path,
    mwa_version: MWAVersion,
    num_rf_inputs: usize,
    gps_second: u64,
    channel: usize,
) -> PathBuf {
    let name = match mwa_version {
        MWAVersion::VCSMWAXv2 => format!("{FIXTURE_OBS_ID}_{gps_second}_{channel}.sub"),
        _ => format!("{FIXTURE_OBS_ID}_{gps_second}_ch{channel}.dat"),
    };
    let path = dir.join(name);
    let layout = VoltageLayout::new(mwa_version, num_rf_inputs, 1_280_000);
    let mut file = File::create(&path).unwrap();
    file.set_len(layout.expected_voltage_data_file_size_bytes)
        .unwrap();
    for s in 0..layout.timestep_duration_ms / 1000 {
        let marker = voltage_marker(channel, gps_second + s);
        file.seek(SeekFrom::Start(
            layout.data_offset_bytes() + s * layout.bytes_per_second(),
        ))
        .unwrap();
        file.write_all(&marker.map(|b| b as u8)).unwrap();
    }
    path
}
