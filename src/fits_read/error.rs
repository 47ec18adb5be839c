// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with reading FITS files.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FitsError {
    /// The file couldn't be opened.
    #[error("Couldn't open {fits_filename}: {fits_error}")]
    Open {
        fits_error: fitsio::errors::Error,
        fits_filename: PathBuf,
    },

    /// An HDU couldn't be opened.
    #[error("Couldn't open HDU {hdu_num} of {fits_filename}: {fits_error}")]
    Hdu {
        fits_error: fitsio::errors::Error,
        fits_filename: PathBuf,
        hdu_num: usize,
    },

    /// A required key was not present.
    #[error("{fits_filename} HDU {hdu_num}: Missing required key {key}")]
    MissingKey {
        key: String,
        fits_filename: PathBuf,
        hdu_num: usize,
    },

    /// The key was present, but cfitsio couldn't read it.
    #[error("{fits_filename} HDU {hdu_num}: Couldn't read key {key}: {fits_error}")]
    ReadKey {
        key: String,
        fits_error: fitsio::errors::Error,
        fits_filename: PathBuf,
        hdu_num: usize,
    },

    /// The key's value could not be converted to the requested type.
    #[error("{fits_filename} HDU {hdu_num}: Couldn't parse key {key} (value '{value}')")]
    Parse {
        key: String,
        value: String,
        fits_filename: PathBuf,
        hdu_num: usize,
    },

    /// The HDU is not an image.
    #[error("{fits_filename} HDU {hdu_num}: Expected an image HDU")]
    NotImage {
        fits_filename: PathBuf,
        hdu_num: usize,
    },

    /// Image data couldn't be read.
    #[error("{fits_filename} HDU {hdu_num}: Couldn't read {num_elements} image elements: {fits_error}")]
    ReadImage {
        num_elements: usize,
        fits_error: fitsio::errors::Error,
        fits_filename: PathBuf,
        hdu_num: usize,
    },

    /// A table cell couldn't be read.
    #[error("{fits_filename} HDU {hdu_num}: Couldn't read column {col_name} row {row}: {fits_error}")]
    ReadCell {
        col_name: String,
        row: usize,
        fits_error: fitsio::errors::Error,
        fits_filename: PathBuf,
        hdu_num: usize,
    },

    /// A key or column name contained a nul byte.
    #[error(transparent)]
    BadString(#[from] std::ffi::NulError),
}
