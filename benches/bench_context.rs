// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Benchmarks of the reordering done on every correlator read.

use criterion::*;
use mwa_context::{
    convert::{
        convert_legacy_hdu_to_mwax_baseline_order, convert_legacy_hdu_to_mwax_frequency_order,
        convert_mwax_hdu_to_frequency_order, generate_conversion_array, LEGACY_NUM_TILES,
    },
    Pol, Rfinput,
};

const NUM_FINE_CHANS: usize = 32;

fn legacy_rf_inputs() -> Vec<Rfinput> {
    (0..LEGACY_NUM_TILES * 2)
        .map(|i| Rfinput {
            input: i as u32,
            ant: (i / 2) as u32,
            tile_id: (i / 2) as u32,
            tile_name: format!("Tile{:03}", i / 2),
            pol: if i % 2 == 0 { Pol::X } else { Pol::Y },
            electrical_length_m: 0.0,
            north_m: 0.0,
            east_m: 0.0,
            height_m: 0.0,
            flagged: false,
            digital_gains: vec![],
            dipole_delays: vec![],
            rec_number: 0,
            rec_slot_number: 0,
            vcs_order: 0,
            subfile_order: i as u32,
        })
        .collect()
}

fn conversion(c: &mut Criterion) {
    let rf_inputs = legacy_rf_inputs();
    c.bench_function("generate_conversion_array", |b| {
        b.iter(|| generate_conversion_array(black_box(&rf_inputs)))
    });

    let table = generate_conversion_array(&rf_inputs);
    let num_floats = table.len() * NUM_FINE_CHANS * 8;
    // The values are irrelevant.
    let input: Vec<f32> = (0..num_floats).map(|i| i as f32).collect();
    let mut output = vec![0.0; num_floats];

    c.bench_function("legacy HDU to baseline order", |b| {
        b.iter(|| {
            convert_legacy_hdu_to_mwax_baseline_order(&table, &input, &mut output, NUM_FINE_CHANS)
        })
    });

    c.bench_function("legacy HDU to frequency order", |b| {
        b.iter(|| {
            convert_legacy_hdu_to_mwax_frequency_order(&table, &input, &mut output, NUM_FINE_CHANS)
        })
    });

    c.bench_function("MWAX HDU to frequency order", |b| {
        b.iter(|| {
            convert_mwax_hdu_to_frequency_order(&input, &mut output, table.len(), NUM_FINE_CHANS, 4)
        })
    });
}

criterion_group!(benches, conversion);
criterion_main!(benches);
