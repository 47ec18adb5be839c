// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Reordering correlator HDUs into the layouts handed to callers.
//!
//! The legacy correlator wrote 128 tiles' worth of visibilities in the order
//! its fine-PFB hardware produced them, with an upper triangle that doesn't
//! match the MWAX one. A conversion table is worked out once per observation
//! from the metafits inputs; every legacy read is then a gather through that
//! table. MWAX data is already in baseline order, and only needs transposing
//! for frequency order.

use log::trace;
use ndarray::prelude::*;

use crate::{misc::get_baseline_count, rfinput::Rfinput};

/// The legacy correlator only ever ran with this many tiles.
pub const LEGACY_NUM_TILES: usize = 128;
const LEGACY_NUM_INPUTS: usize = LEGACY_NUM_TILES * 2;

/// xx_r, xx_i, xy_r, xy_i, yx_r, yx_i, yy_r, yy_i
const FLOATS_PER_BASELINE_FINE_CHAN: usize = 8;

/// Undo the fine-PFB's input ordering: bits `abcdefgh` become `abghcdef`.
#[inline]
fn fine_pfb_reorder(x: usize) -> usize {
    (x & 0xc0) | ((x & 0x03) << 4) | ((x & 0x3c) >> 2)
}

/// Where one polarisation product of a baseline lives in a legacy HDU row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LegacySource {
    /// Float index of the real part; the imaginary part follows it.
    pub index: usize,
    /// The legacy triangle holds the transposed product.
    pub conjugate: bool,
}

impl LegacySource {
    fn from_signed(complex_index: i32) -> LegacySource {
        LegacySource {
            index: complex_index.unsigned_abs() as usize * 2,
            conjugate: complex_index < 0,
        }
    }
}

/// Where each polarisation product of a baseline comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LegacyConversionBaseline {
    pub baseline: usize,
    pub ant1: usize,
    pub ant2: usize,
    /// XX, XY, YX, YY.
    pub pols: [LegacySource; 4],
}

/// For every pair of inputs (in MWAX order), the signed complex index in a
/// legacy HDU row. Negative values mean "conjugate of".
fn generate_full_matrix(mwax_order: &[usize]) -> Array2<i32> {
    let mut matrix = Array2::from_elem((LEGACY_NUM_INPUTS, LEGACY_NUM_INPUTS), -1);
    let mut source = 0;

    for col_order in (0..LEGACY_NUM_INPUTS).step_by(2) {
        let col_a = mwax_order[fine_pfb_reorder(col_order)];
        let col_b = mwax_order[fine_pfb_reorder(col_order + 1)];

        for row_order in (0..=col_order).step_by(2) {
            let row_1 = mwax_order[fine_pfb_reorder(row_order)];
            let row_2 = mwax_order[fine_pfb_reorder(row_order + 1)];

            matrix[(row_1, col_a)] = source;
            // The legacy correlator still spent a slot on the redundant
            // product of an input pair with itself.
            if col_order != row_order {
                matrix[(row_2, col_a)] = source + 1;
            }
            matrix[(row_1, col_b)] = source + 2;
            matrix[(row_2, col_b)] = source + 3;
            source += 4;
        }
    }

    // Fill the other triangle with conjugates.
    for row in 0..LEGACY_NUM_INPUTS {
        for col in 0..LEGACY_NUM_INPUTS {
            if matrix[(row, col)] == -1 {
                matrix[(row, col)] = -matrix[(col, row)];
            }
        }
    }
    matrix
}

/// Build the legacy conversion table from the metafits rf inputs. There must
/// be exactly 256 of them; callers check this first.
pub fn generate_conversion_array(rf_inputs: &[Rfinput]) -> Vec<LegacyConversionBaseline> {
    debug_assert_eq!(rf_inputs.len(), LEGACY_NUM_INPUTS);

    // MWAX (subfile) order of each input, indexed by the metafits "Input".
    let mut by_input: Vec<(u32, usize)> = rf_inputs
        .iter()
        .map(|rf| (rf.input, rf.subfile_order as usize))
        .collect();
    by_input.sort_unstable();
    let mwax_order: Vec<usize> = by_input.into_iter().map(|(_, order)| order).collect();

    let matrix = generate_full_matrix(&mwax_order);

    let mut table = Vec::with_capacity(get_baseline_count(LEGACY_NUM_TILES));
    for ant1 in 0..LEGACY_NUM_TILES {
        for ant2 in ant1..LEGACY_NUM_TILES {
            let pol = |p1: usize, p2: usize| {
                LegacySource::from_signed(matrix[(ant1 * 2 + p1, ant2 * 2 + p2)])
            };
            table.push(LegacyConversionBaseline {
                baseline: table.len(),
                ant1,
                ant2,
                pols: [pol(0, 0), pol(0, 1), pol(1, 0), pol(1, 1)],
            });
        }
    }
    trace!("Legacy conversion table has {} baselines", table.len());
    table
}

/// Copy one baseline's four products for one fine channel. The legacy
/// triangle is the opposite of MWAX, so every product is conjugated once more
/// on the way out.
#[inline]
fn gather_baseline(bl: &LegacyConversionBaseline, row: &[f32], out: &mut [f32]) {
    for (source, out) in bl.pols.iter().zip(out.chunks_exact_mut(2)) {
        let re = row[source.index];
        let im = row[source.index + 1];
        out[0] = re;
        out[1] = if source.conjugate { im } else { -im };
    }
}

/// Legacy `[fine chan][legacy baseline][pol][r,i]` into MWAX
/// `[baseline][fine chan][pol][r,i]`.
pub fn convert_legacy_hdu_to_mwax_baseline_order(
    conversion_table: &[LegacyConversionBaseline],
    input: &[f32],
    output: &mut [f32],
    num_fine_chans: usize,
) {
    let floats_per_fine_chan = conversion_table.len() * FLOATS_PER_BASELINE_FINE_CHAN;
    let floats_per_baseline = num_fine_chans * FLOATS_PER_BASELINE_FINE_CHAN;

    for (fine_chan, row) in input
        .chunks_exact(floats_per_fine_chan)
        .take(num_fine_chans)
        .enumerate()
    {
        for (bl, out) in conversion_table
            .iter()
            .zip(output.chunks_exact_mut(floats_per_baseline))
        {
            let start = fine_chan * FLOATS_PER_BASELINE_FINE_CHAN;
            gather_baseline(bl, row, &mut out[start..start + FLOATS_PER_BASELINE_FINE_CHAN]);
        }
    }
}

/// Legacy `[fine chan][legacy baseline][pol][r,i]` into MWAX
/// `[fine chan][baseline][pol][r,i]`.
pub fn convert_legacy_hdu_to_mwax_frequency_order(
    conversion_table: &[LegacyConversionBaseline],
    input: &[f32],
    output: &mut [f32],
    num_fine_chans: usize,
) {
    let floats_per_fine_chan = conversion_table.len() * FLOATS_PER_BASELINE_FINE_CHAN;

    for (row, out_row) in input
        .chunks_exact(floats_per_fine_chan)
        .zip(output.chunks_exact_mut(floats_per_fine_chan))
        .take(num_fine_chans)
    {
        for (bl, out) in conversion_table
            .iter()
            .zip(out_row.chunks_exact_mut(FLOATS_PER_BASELINE_FINE_CHAN))
        {
            gather_baseline(bl, row, out);
        }
    }
}

/// MWAX `[baseline][fine chan][pol][r,i]` into `[fine chan][baseline][pol][r,i]`.
pub fn convert_mwax_hdu_to_frequency_order(
    input: &[f32],
    output: &mut [f32],
    num_baselines: usize,
    num_fine_chans: usize,
    num_visibility_pols: usize,
) {
    let floats = num_visibility_pols * 2;
    let len = num_baselines * num_fine_chans * floats;
    let input = ArrayView3::from_shape((num_baselines, num_fine_chans, floats), &input[..len]);
    let output =
        ArrayViewMut3::from_shape((num_fine_chans, num_baselines, floats), &mut output[..len]);
    // Both shapes are built from the same slice length, so they can't fail.
    if let (Ok(input), Ok(mut output)) = (input, output) {
        output.assign(&input.permuted_axes([1, 0, 2]));
    }
}
