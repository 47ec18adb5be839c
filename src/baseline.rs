// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Baselines: all antenna pairs, including autos.

/// A pair of antenna indices, with `ant1_index <= ant2_index`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct Baseline {
    pub ant1_index: usize,
    pub ant2_index: usize,
}

impl Baseline {
    /// Generate the baselines for `num_ants` antennas in correlator order:
    /// `(0,0), (0,1), ..., (0,N-1), (1,1), ...`.
    pub(crate) fn populate_baselines(num_ants: usize) -> Vec<Baseline> {
        (0..num_ants)
            .flat_map(|ant1_index| {
                (ant1_index..num_ants).map(move |ant2_index| Baseline {
                    ant1_index,
                    ant2_index,
                })
            })
            .collect()
    }

    pub fn is_auto(&self) -> bool {
        self.ant1_index == self.ant2_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::misc::get_baseline_count;

    #[test]
    fn test_baseline_count_and_order() {
        for num_ants in [0, 1, 2, 3, 128, 144] {
            let baselines = Baseline::populate_baselines(num_ants);
            assert_eq!(baselines.len(), num_ants * (num_ants + 1) / 2);
            assert_eq!(baselines.len(), get_baseline_count(num_ants));
            assert!(baselines.iter().all(|b| b.ant1_index <= b.ant2_index));
            assert_eq!(baselines.iter().filter(|b| b.is_auto()).count(), num_ants);
        }
    }

    #[test]
    fn test_baselines_three_ants() {
        let pairs: Vec<(usize, usize)> = Baseline::populate_baselines(3)
            .iter()
            .map(|b| (b.ant1_index, b.ant2_index))
            .collect();
        assert_eq!(pairs, vec![(0, 0), (0, 1), (0, 2), (1, 1), (1, 2), (2, 2)]);
    }
}
