// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Small helpers shared across the crate.

use std::str::FromStr;

/// The number of baselines (including autos) formed by `num_ants` antennas.
pub const fn get_baseline_count(num_ants: usize) -> usize {
    num_ants * (num_ants + 1) / 2
}

/// Convert a GPS time to UNIX time, both in milliseconds. The offset between
/// the two clocks is taken from the scheduled start of the observation, which
/// is known in both time systems. UNIX time is never behind GPS time;
/// [`MetafitsContext`](crate::MetafitsContext) rejects a start that says
/// otherwise, and here results saturate rather than wrap.
pub fn convert_gpstime_to_unixtime(
    gpstime_ms: u64,
    mwa_start_gpstime_ms: u64,
    mwa_start_unixtime_ms: u64,
) -> u64 {
    let offset_ms = mwa_start_unixtime_ms.saturating_sub(mwa_start_gpstime_ms);
    gpstime_ms.saturating_add(offset_ms)
}

/// The inverse of [`convert_gpstime_to_unixtime`].
pub fn convert_unixtime_to_gpstime(
    unixtime_ms: u64,
    mwa_start_gpstime_ms: u64,
    mwa_start_unixtime_ms: u64,
) -> u64 {
    let offset_ms = mwa_start_unixtime_ms.saturating_sub(mwa_start_gpstime_ms);
    unixtime_ms.saturating_sub(offset_ms)
}

/// Parse a delimited integer list, as found in metafits keys like CHANNELS,
/// DELAYS and RECVRS. Tokens are separated by commas, spaces or '@'; quotes
/// and the CONTINUE marker '&' are ignored. If any token fails to parse, the
/// offending token is returned and no partial list is produced.
pub fn parse_int_list<T: FromStr>(value: &str) -> Result<Vec<T>, String> {
    value
        .replace(['\'', '&'], "")
        .split([',', ' ', '@'])
        .filter(|token| !token.is_empty())
        .map(|token| token.parse().map_err(|_| token.to_string()))
        .collect()
}

/// Check for a truthy metafits "flag" value.
pub(crate) fn is_flagged(flag: i32) -> bool {
    flag != 0
}
