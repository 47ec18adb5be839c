// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Helper functions for reading FITS files.
//!
//! Everything that touches cfitsio goes through here. A caller opens a file
//! ([`fits_open`]), moves to an HDU ([`fits_open_hdu`]) and then reads keys,
//! image data or table cells from that HDU. Every error carries the filename
//! and HDU number so that multi-file problems can be attributed.

pub mod error;

use std::{
    ffi::{c_void, CStr, CString},
    os::raw::{c_char, c_int},
    path::Path,
    ptr,
    str::FromStr,
};

use fitsio::{
    errors::{check_status as fits_check_status, Error as FitsioError, FitsError as FitsioStatus},
    hdu::{FitsHdu, HduInfo},
    FitsFile,
};
use log::trace;

pub use error::FitsError;

/// cfitsio status for a missing keyword.
const KEY_NO_EXIST: c_int = 202;

/// Open a FITS file read-only.
pub fn fits_open<P: AsRef<Path>>(path: P) -> Result<FitsFile, FitsError> {
    let path = path.as_ref();
    trace!("fits_open: {}", path.display());
    FitsFile::open(path).map_err(|fits_error| FitsError::Open {
        fits_error,
        fits_filename: path.to_path_buf(),
    })
}

/// Move to the HDU at `hdu_index` (0 is the primary HDU).
pub fn fits_open_hdu(fits_fptr: &mut FitsFile, hdu_index: usize) -> Result<FitsHdu, FitsError> {
    fits_fptr
        .hdu(hdu_index)
        .map_err(|fits_error| FitsError::Hdu {
            fits_error,
            fits_filename: fits_fptr.file_path().to_path_buf(),
            hdu_num: hdu_index,
        })
}

/// Read a key as a string, returning `None` if it doesn't exist.
fn read_key_string(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    keyword: &str,
) -> Result<Option<String>, FitsError> {
    match hdu.read_key::<String>(fits_fptr, keyword) {
        Ok(v) => Ok(Some(v)),
        Err(FitsioError::Fits(FitsioStatus {
            status: KEY_NO_EXIST,
            ..
        })) => Ok(None),
        Err(fits_error) => Err(FitsError::ReadKey {
            key: keyword.to_string(),
            fits_error,
            fits_filename: fits_fptr.file_path().to_path_buf(),
            hdu_num: hdu.number,
        }),
    }
}

/// Get a key from the HDU and parse it into `T`. A key that doesn't exist
/// yields `Ok(None)`; one that exists but can't be parsed is an error.
pub fn get_optional_fits_key<T: FromStr>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    keyword: &str,
) -> Result<Option<T>, FitsError> {
    let unparsed = match read_key_string(fits_fptr, hdu, keyword)? {
        Some(v) => v,
        None => return Ok(None),
    };
    // Numeric values come back verbatim; string values may still carry their
    // quotes or padding.
    let value = unparsed.trim().trim_matches('\'').trim();
    match value.parse() {
        Ok(v) => Ok(Some(v)),
        Err(_) => Err(FitsError::Parse {
            key: keyword.to_string(),
            value: unparsed,
            fits_filename: fits_fptr.file_path().to_path_buf(),
            hdu_num: hdu.number,
        }),
    }
}

/// Get a key from the HDU and parse it into `T`. A missing key is an error.
pub fn get_required_fits_key<T: FromStr>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    keyword: &str,
) -> Result<T, FitsError> {
    get_optional_fits_key(fits_fptr, hdu, keyword)?.ok_or_else(|| FitsError::MissingKey {
        key: keyword.to_string(),
        fits_filename: fits_fptr.file_path().to_path_buf(),
        hdu_num: hdu.number,
    })
}

/// Get a string key that may use the CONTINUE convention.
pub fn get_optional_fits_key_long_string(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    keyword: &str,
) -> Result<Option<String>, FitsError> {
    // cfitsio reads from the "current" HDU.
    fits_open_hdu(fits_fptr, hdu.number)?;
    let keyword_c = CString::new(keyword)?;
    let mut status = 0;
    let mut long_string_ptr: *mut c_char = ptr::null_mut();
    unsafe {
        // ffgkls = fits_read_key_longstr
        fitsio_sys::ffgkls(
            fits_fptr.as_raw(),   /* I - FITS file pointer                    */
            keyword_c.as_ptr(),   /* I - name of keyword to read              */
            &mut long_string_ptr, /* O - pointer to keyword value (malloc'd)  */
            ptr::null_mut(),      /* O - keyword comment                      */
            &mut status,          /* IO - error status                        */
        );
    }
    if status == KEY_NO_EXIST {
        return Ok(None);
    }
    fits_check_status(status).map_err(|fits_error| FitsError::ReadKey {
        key: keyword.to_string(),
        fits_error,
        fits_filename: fits_fptr.file_path().to_path_buf(),
        hdu_num: hdu.number,
    })?;

    let value = unsafe {
        let value = CStr::from_ptr(long_string_ptr)
            .to_string_lossy()
            .into_owned();
        // ffgkls allocates; give the memory back to cfitsio.
        fitsio_sys::fffree(long_string_ptr as *mut c_void, &mut status);
        value
    };
    Ok(Some(value))
}

/// Get a string key that may use the CONTINUE convention. A missing key is an
/// error.
pub fn get_required_fits_key_long_string(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    keyword: &str,
) -> Result<String, FitsError> {
    get_optional_fits_key_long_string(fits_fptr, hdu, keyword)?.ok_or_else(|| {
        FitsError::MissingKey {
            key: keyword.to_string(),
            fits_filename: fits_fptr.file_path().to_path_buf(),
            hdu_num: hdu.number,
        }
    })
}

/// Get the dimensions of an image HDU, slowest-varying axis first (i.e.
/// `[NAXIS2, NAXIS1]` for a 2D image).
pub fn get_hdu_image_size(fits_fptr: &FitsFile, hdu: &FitsHdu) -> Result<Vec<usize>, FitsError> {
    match &hdu.info {
        HduInfo::ImageInfo { shape, .. } => Ok(shape.clone()),
        _ => Err(FitsError::NotImage {
            fits_filename: fits_fptr.file_path().to_path_buf(),
            hdu_num: hdu.number,
        }),
    }
}

/// Read `buffer.len()` elements of an image HDU directly into `buffer`,
/// without any intermediate allocation.
pub fn get_fits_float_image_into_buffer(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    buffer: &mut [f32],
) -> Result<(), FitsError> {
    fits_open_hdu(fits_fptr, hdu.number)?;
    let mut status = 0;
    unsafe {
        // ffgpv = fits_read_img
        fitsio_sys::ffgpv(
            fits_fptr.as_raw(),       /* I - FITS file pointer                  */
            42,                       /* I - TFLOAT (fitsio.h)                  */
            1,                        /* I - first element to read (1 = 1st)    */
            buffer.len() as i64,      /* I - number of values to read           */
            ptr::null_mut(),          /* I - value for undefined pixels         */
            buffer.as_mut_ptr().cast(), /* O - array of values                  */
            &mut 0,                   /* O - set to 1 if any values are null    */
            &mut status,              /* IO - error status                      */
        );
    }
    fits_check_status(status).map_err(|fits_error| FitsError::ReadImage {
        num_elements: buffer.len(),
        fits_error,
        fits_filename: fits_fptr.file_path().to_path_buf(),
        hdu_num: hdu.number,
    })
}

/// Read a scalar cell from a table HDU. `row` is 0-indexed.
pub fn read_cell_value<T: fitsio::tables::ReadsCol>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    col_name: &str,
    row: usize,
) -> Result<T, FitsError> {
    hdu.read_cell_value(fits_fptr, col_name, row)
        .map_err(|fits_error| FitsError::ReadCell {
            col_name: col_name.to_string(),
            row,
            fits_error,
            fits_filename: fits_fptr.file_path().to_path_buf(),
            hdu_num: hdu.number,
        })
}

/// Read an integer array cell from a table HDU. fitsio can't do this itself.
/// `row` is 0-indexed.
pub fn read_cell_array_i32(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    col_name: &str,
    row: usize,
    num_elements: usize,
) -> Result<Vec<i32>, FitsError> {
    fits_open_hdu(fits_fptr, hdu.number)?;
    let col_name_c = CString::new(col_name)?;
    let mut status = 0;
    let mut col_num = 0;
    let mut array = vec![0_i32; num_elements];
    unsafe {
        // ffgcno = fits_get_colnum
        fitsio_sys::ffgcno(
            fits_fptr.as_raw(),               /* I - FITS file pointer                       */
            0,                                /* I - case sensitive string comparison? 0=no  */
            col_name_c.as_ptr() as *mut c_char, /* I - input name of column (w/wildcards)  */
            &mut col_num,                     /* O - number of the named column; 1=first col */
            &mut status,                      /* IO - error status                           */
        );
        if status == 0 {
            // ffgcv = fits_read_col
            fitsio_sys::ffgcv(
                fits_fptr.as_raw(),
                31, // TINT (fitsio.h)
                col_num,
                row as i64 + 1,
                1,
                num_elements as i64,
                ptr::null_mut(),
                array.as_mut_ptr().cast(),
                &mut 0,
                &mut status,
            );
        }
    }
    fits_check_status(status).map_err(|fits_error| FitsError::ReadCell {
        col_name: col_name.to_string(),
        row,
        fits_error,
        fits_filename: fits_fptr.file_path().to_path_buf(),
        hdu_num: hdu.number,
    })?;
    Ok(array)
}
