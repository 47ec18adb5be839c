// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Visibility polarisation products.

/// A polarisation product of a visibility, e.g. "XY".
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VisibilityPol {
    pub polarisation: String,
}

impl VisibilityPol {
    /// The four products in the order they appear in correlator data.
    pub(crate) fn populate_visibility_pols() -> Vec<VisibilityPol> {
        ["XX", "XY", "YX", "YY"]
            .into_iter()
            .map(|p| VisibilityPol {
                polarisation: p.to_string(),
            })
            .collect()
    }
}
