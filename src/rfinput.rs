// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! RF inputs: one signal path per antenna per polarisation, as described by
//! the metafits TILEDATA table.

use std::fmt;

use fitsio::{hdu::FitsHdu, FitsFile};
use log::warn;
use thiserror::Error;

use crate::{
    fits_read::{read_cell_array_i32, read_cell_value, FitsError},
    misc::is_flagged,
};

/// Cable lengths in the metafits not prefixed with "EL_" are physical lengths
/// and need this velocity factor applied to get electrical lengths.
pub const COAX_V_FACTOR: f64 = 1.204;

/// The number of dipole delays per rf input.
const NUM_DIPOLE_DELAYS: usize = 16;

/// Metafits digital gains are scaled by this.
const DIGITAL_GAIN_SCALE: f64 = 64.0;

#[derive(Error, Debug)]
pub enum RfinputError {
    #[error("Unrecognised polarisation '{pol}' for metafits input {input}")]
    UnrecognisedPol { input: u32, pol: String },

    #[error("Couldn't parse cable length '{length}' for metafits input {input}")]
    BadLength { input: u32, length: String },

    #[error("Antenna {ant} has {count} rf inputs; expected one X and one Y")]
    BadAntennaPols { ant: u32, count: usize },

    #[error(transparent)]
    Fits(#[from] FitsError),
}

/// Instrument polarisation of an rf input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub enum Pol {
    X,
    Y,
}

impl fmt::Display for Pol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Pol::X => "X",
                Pol::Y => "Y",
            }
        )
    }
}

impl std::str::FromStr for Pol {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "X" => Ok(Pol::X),
            "Y" => Ok(Pol::Y),
            _ => Err(()),
        }
    }
}

/// An rf input.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rfinput {
    /// Order within the metafits TILEDATA table.
    pub input: u32,
    /// Antenna number (metafits "Antenna").
    pub ant: u32,
    /// Numeric tile ID (metafits "Tile").
    pub tile_id: u32,
    pub tile_name: String,
    pub pol: Pol,
    /// Electrical length of the cable \[metres\]
    pub electrical_length_m: f64,
    /// \[metres\]
    pub north_m: f64,
    /// \[metres\]
    pub east_m: f64,
    /// \[metres\]
    pub height_m: f64,
    pub flagged: bool,
    /// One per metafits coarse channel, already divided by 64.
    pub digital_gains: Vec<f64>,
    pub dipole_delays: Vec<u32>,
    /// Receiver number.
    pub rec_number: u32,
    /// Receiver slot number.
    pub rec_slot_number: u32,
    /// The order this input appears in legacy VCS data.
    pub vcs_order: u32,
    /// The order this input appears in correlator and MWAX data.
    pub subfile_order: u32,
}

/// Where this input sits in legacy (fine-PFB) VCS data.
pub(crate) const fn get_vcs_order(input: u32) -> u32 {
    (input & 0xC0) | ((input & 0x30) >> 4) | ((input & 0x0F) << 2)
}

/// Where this input sits in correlator output.
pub(crate) fn get_subfile_order(ant: u32, pol: Pol) -> u32 {
    ant * 2 + u32::from(pol == Pol::Y)
}

/// Turn a metafits "Length" value into an electrical length.
fn get_electrical_length(length: &str, coax_v_factor: f64) -> Option<f64> {
    let length = length.trim();
    match length.strip_prefix("EL_") {
        Some(electrical) => electrical.parse().ok(),
        None => length.parse::<f64>().ok().map(|l| l * coax_v_factor),
    }
}

impl Rfinput {
    /// Read all rf inputs from the TILEDATA HDU and sort them into subfile
    /// order.
    pub(crate) fn populate_rf_inputs(
        metafits_fptr: &mut FitsFile,
        tiledata_hdu: &FitsHdu,
        num_inputs: usize,
        num_coarse_chans: usize,
    ) -> Result<Vec<Rfinput>, RfinputError> {
        let mut rf_inputs = Vec::with_capacity(num_inputs);
        for row in 0..num_inputs {
            let input: i32 = read_cell_value(metafits_fptr, tiledata_hdu, "Input", row)?;
            let input = input as u32;
            let ant: i32 = read_cell_value(metafits_fptr, tiledata_hdu, "Antenna", row)?;
            let ant = ant as u32;
            let tile_id: i32 = read_cell_value(metafits_fptr, tiledata_hdu, "Tile", row)?;
            let tile_name: String =
                read_cell_value(metafits_fptr, tiledata_hdu, "TileName", row)?;
            let pol_str: String = read_cell_value(metafits_fptr, tiledata_hdu, "Pol", row)?;
            let pol = pol_str
                .parse()
                .map_err(|_| RfinputError::UnrecognisedPol {
                    input,
                    pol: pol_str.clone(),
                })?;
            let length: String = read_cell_value(metafits_fptr, tiledata_hdu, "Length", row)?;
            let electrical_length_m = get_electrical_length(&length, COAX_V_FACTOR)
                .ok_or(RfinputError::BadLength { input, length })?;
            let north_m: f32 = read_cell_value(metafits_fptr, tiledata_hdu, "North", row)?;
            let east_m: f32 = read_cell_value(metafits_fptr, tiledata_hdu, "East", row)?;
            let height_m: f32 = read_cell_value(metafits_fptr, tiledata_hdu, "Height", row)?;
            let flag: i32 = read_cell_value(metafits_fptr, tiledata_hdu, "Flag", row)?;
            let gains = read_cell_array_i32(
                metafits_fptr,
                tiledata_hdu,
                "Gains",
                row,
                num_coarse_chans,
            )?;
            let delays = read_cell_array_i32(
                metafits_fptr,
                tiledata_hdu,
                "Delays",
                row,
                NUM_DIPOLE_DELAYS,
            )?;
            let rec_number: i32 = read_cell_value(metafits_fptr, tiledata_hdu, "Rx", row)?;
            let rec_slot_number: i32 = read_cell_value(metafits_fptr, tiledata_hdu, "Slot", row)?;

            if tile_name.trim().is_empty() {
                warn!("metafits input {input} has an empty tile name");
            }

            rf_inputs.push(Rfinput {
                input,
                ant,
                tile_id: tile_id as u32,
                tile_name: tile_name.trim().to_string(),
                pol,
                electrical_length_m,
                north_m: f64::from(north_m),
                east_m: f64::from(east_m),
                height_m: f64::from(height_m),
                flagged: is_flagged(flag),
                digital_gains: gains
                    .into_iter()
                    .map(|g| f64::from(g) / DIGITAL_GAIN_SCALE)
                    .collect(),
                dipole_delays: delays.into_iter().map(|d| d as u32).collect(),
                rec_number: rec_number as u32,
                rec_slot_number: rec_slot_number as u32,
                vcs_order: get_vcs_order(input),
                subfile_order: get_subfile_order(ant, pol),
            });
        }

        rf_inputs.sort_by_key(|rf| rf.subfile_order);
        Self::check_antenna_pols(&rf_inputs)?;
        Ok(rf_inputs)
    }

    /// After sorting by subfile order, every antenna must appear as an
    /// adjacent (X, Y) pair.
    fn check_antenna_pols(rf_inputs: &[Rfinput]) -> Result<(), RfinputError> {
        for pair in rf_inputs.chunks(2) {
            let ant = pair[0].ant;
            match pair {
                [x, y] if x.pol == Pol::X && y.pol == Pol::Y && y.ant == ant => (),
                _ => {
                    let count = rf_inputs.iter().filter(|rf| rf.ant == ant).count();
                    return Err(RfinputError::BadAntennaPols { ant, count });
                }
            }
        }
        Ok(())
    }
}
