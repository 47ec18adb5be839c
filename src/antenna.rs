// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Antennas (tiles), derived from pairs of rf inputs.

use crate::rfinput::Rfinput;

/// An antenna (a.k.a. tile). Its rf inputs are referred to by index into the
/// owning context's `rf_inputs`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Antenna {
    /// Metafits antenna number. This is also the index into the context's
    /// `antennas`.
    pub ant: u32,
    pub tile_id: u32,
    pub tile_name: String,
    /// Index of the X rf input.
    pub rfinput_x: usize,
    /// Index of the Y rf input.
    pub rfinput_y: usize,
    /// \[metres\]
    pub electrical_length_m: f64,
    /// \[metres\]
    pub north_m: f64,
    /// \[metres\]
    pub east_m: f64,
    /// \[metres\]
    pub height_m: f64,
}

impl Antenna {
    /// Collapse rf inputs (sorted into subfile order, so that each antenna's X
    /// and Y inputs are adjacent) into antennas.
    pub(crate) fn populate_antennas(rf_inputs: &[Rfinput]) -> Vec<Antenna> {
        rf_inputs
            .chunks_exact(2)
            .enumerate()
            .map(|(pair_index, pair)| {
                let x = &pair[0];
                Antenna {
                    ant: x.ant,
                    tile_id: x.tile_id,
                    tile_name: x.tile_name.clone(),
                    rfinput_x: pair_index * 2,
                    rfinput_y: pair_index * 2 + 1,
                    electrical_length_m: x.electrical_length_m,
                    north_m: x.north_m,
                    east_m: x.east_m,
                    height_m: x.height_m,
                }
            })
            .collect()
    }
}
