// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Code for allowing other languages to talk to this Rust library.

Every fallible function returns a status code and takes a caller-allocated
`error_message` buffer of `error_message_length` bytes. On failure, the error
is written into that buffer, truncated to fit and always null terminated. A
null `error_message` is allowed; the message is then dropped.

Contexts and metadata snapshots handed out by this module are owned by Rust
and must be released with the matching `_free` function exactly once.
 */


use std::{
    ffi::{CStr, CString},
    fmt::Display,
    os::raw::c_char,
    panic::{self, AssertUnwindSafe},
    ptr, slice,
};

use log::debug;

use crate::{
    fits_read::{fits_open, fits_open_hdu, get_required_fits_key_long_string},
    Baseline, CoarseChannel, CorrelatorContext, MWAVersion, MetafitsContext, MwalibError,
    ReadError, ReadOutcome, Rfinput, TimeStep, VoltageContext,
};

/// The call succeeded.
pub const MWALIB_SUCCESS: i32 = 0;
/// The call failed; the error message buffer says why.
pub const MWALIB_FAILURE: i32 = 1;
/// A caller-supplied buffer was too small; nothing was written to it.
pub const MWALIB_BUFFER_TOO_SMALL: i32 = 2;
/// The indices were valid, but there is no data for them. The buffer is left
/// untouched.
pub const MWALIB_NO_DATA_FOR_TIMESTEP_COARSECHAN: i32 = -1;

/// A failure on its way to the caller.
struct FfiFailure {
    code: i32,
    message: String,
}

impl FfiFailure {
    fn new<E: Display>(e: E) -> FfiFailure {
        FfiFailure {
            code: MWALIB_FAILURE,
            message: e.to_string(),
        }
    }
}

impl From<MwalibError> for FfiFailure {
    fn from(e: MwalibError) -> Self {
        match e {
            MwalibError::Read(e) => e.into(),
            e => FfiFailure::new(e),
        }
    }
}

impl From<ReadError> for FfiFailure {
    fn from(e: ReadError) -> Self {
        let code = match e {
            ReadError::BufferTooSmall { .. } => MWALIB_BUFFER_TOO_SMALL,
            _ => MWALIB_FAILURE,
        };
        FfiFailure {
            code,
            message: e.to_string(),
        }
    }
}

impl From<crate::fits_read::FitsError> for FfiFailure {
    fn from(e: crate::fits_read::FitsError) -> Self {
        FfiFailure::new(e)
    }
}

/// Write `message` into a caller-allocated buffer, truncating it to fit and
/// always null terminating it. Does nothing with a null or empty buffer.
///
/// # Safety
///
/// `error_buffer_ptr` must be null or point to at least `error_buffer_len`
/// writable bytes.
unsafe fn set_error_message(message: &str, error_buffer_ptr: *mut c_char, error_buffer_len: usize) {
    if error_buffer_ptr.is_null() || error_buffer_len == 0 {
        return;
    }
    let buffer = slice::from_raw_parts_mut(error_buffer_ptr as *mut u8, error_buffer_len);
    let num_bytes = message.len().min(error_buffer_len - 1);
    buffer[..num_bytes].copy_from_slice(&message.as_bytes()[..num_bytes]);
    buffer[num_bytes] = 0;
}

/// Run `f`, turning any error or panic into a status code and an error
/// message.
unsafe fn guard<F>(error_message: *mut c_char, error_message_length: usize, f: F) -> i32
where
    F: FnOnce() -> Result<i32, FfiFailure>,
{
    let failure = match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(code)) => return code,
        Ok(Err(failure)) => failure,
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            FfiFailure::new(format!("mwa_context panicked: {message}"))
        }
    };
    debug!("FFI call failed: {}", failure.message);
    set_error_message(&failure.message, error_message, error_message_length);
    failure.code
}

fn outcome_code(outcome: ReadOutcome) -> i32 {
    match outcome {
        ReadOutcome::Data => MWALIB_SUCCESS,
        ReadOutcome::NoData => MWALIB_NO_DATA_FOR_TIMESTEP_COARSECHAN,
    }
}

unsafe fn c_str_to_string<'a>(s: *const c_char, what: &str) -> Result<&'a str, FfiFailure> {
    if s.is_null() {
        return Err(FfiFailure::new(format!("{what} is a null pointer")));
    }
    CStr::from_ptr(s)
        .to_str()
        .map_err(|e| FfiFailure::new(format!("{what} is not valid UTF-8: {e}")))
}

unsafe fn c_str_array_to_strings<'a>(
    strings: *const *const c_char,
    count: usize,
    what: &str,
) -> Result<Vec<&'a str>, FfiFailure> {
    if count == 0 {
        return Ok(vec![]);
    }
    if strings.is_null() {
        return Err(FfiFailure::new(format!("{what} is a null pointer")));
    }
    slice::from_raw_parts(strings, count)
        .iter()
        .map(|&s| c_str_to_string(s, what))
        .collect()
}

unsafe fn deref_ptr<'a, T>(p: *const T, what: &str) -> Result<&'a T, FfiFailure> {
    p.as_ref()
        .ok_or_else(|| FfiFailure::new(format!("{what} is a null pointer")))
}

unsafe fn buffer_from_raw<'a, T>(
    buffer: *mut T,
    buffer_len: usize,
) -> Result<&'a mut [T], FfiFailure> {
    if buffer.is_null() {
        return Err(FfiFailure::new("buffer is a null pointer"));
    }
    Ok(slice::from_raw_parts_mut(buffer, buffer_len))
}

/// Hand a `Vec` to the caller as a pointer; its length must be passed
/// alongside it.
fn vec_into_raw<T>(v: Vec<T>) -> *mut T {
    Box::into_raw(v.into_boxed_slice()) as *mut T
}

/// Take back a slice made by [`vec_into_raw`].
unsafe fn free_raw_vec<T>(p: *mut T, len: usize) {
    if !p.is_null() {
        drop(Box::from_raw(ptr::slice_from_raw_parts_mut(p, len)));
    }
}

fn string_into_raw(s: &str) -> *mut c_char {
    // Strings from metafits can't contain nul bytes; cfitsio would have
    // truncated them.
    CString::new(s.replace('\0', ""))
        .map(CString::into_raw)
        .unwrap_or(ptr::null_mut())
}

unsafe fn free_raw_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

fn mwa_version_from_c(v: u32) -> Result<Option<MWAVersion>, FfiFailure> {
    Ok(match v {
        0 => None,
        1 => Some(MWAVersion::CorrOldLegacy),
        2 => Some(MWAVersion::CorrLegacy),
        3 => Some(MWAVersion::CorrMWAXv2),
        4 => Some(MWAVersion::VCSLegacyRecombined),
        5 => Some(MWAVersion::VCSMWAXv2),
        _ => return Err(FfiFailure::new(format!("{v} is not a valid MWA version"))),
    })
}

/// Create a metafits-only context.
///
/// # Arguments
///
/// * `metafits_filename` - path to the metafits file.
/// * `mwa_version` - `0` to determine the version from the metafits MODE,
///   otherwise an `MWAVersion` value.
/// * `out_metafits_context_ptr` - set to a Rust-owned context on success.
///   Free it with `mwalib_metafits_context_free`.
/// * `error_message` / `error_message_length` - caller-allocated buffer for
///   any error message.
///
/// # Returns
///
/// * `MWALIB_SUCCESS` or `MWALIB_FAILURE`.
///
/// # Safety
///
/// All pointers must be valid or null; `error_message` must have room for
/// `error_message_length` bytes.
#[no_mangle]
pub unsafe extern "C" fn mwalib_metafits_context_new(
    metafits_filename: *const c_char,
    mwa_version: u32,
    out_metafits_context_ptr: *mut *mut MetafitsContext,
    error_message: *mut c_char,
    error_message_length: usize,
) -> i32 {
    guard(error_message, error_message_length, || {
        if out_metafits_context_ptr.is_null() {
            return Err(FfiFailure::new("out_metafits_context_ptr is a null pointer"));
        }
        let metafits = c_str_to_string(metafits_filename, "metafits_filename")?;
        let context = MetafitsContext::new(metafits, mwa_version_from_c(mwa_version)?)
            .map_err(MwalibError::from)?;
        *out_metafits_context_ptr = Box::into_raw(Box::new(context));
        Ok(MWALIB_SUCCESS)
    })
}

/// Free a context made by `mwalib_metafits_context_new`. A null pointer is
/// ignored.
///
/// # Safety
///
/// `metafits_context_ptr` must not be used after this call.
#[no_mangle]
pub unsafe extern "C" fn mwalib_metafits_context_free(
    metafits_context_ptr: *mut MetafitsContext,
) -> i32 {
    if !metafits_context_ptr.is_null() {
        drop(Box::from_raw(metafits_context_ptr));
    }
    MWALIB_SUCCESS
}

/// Create a correlator context from a metafits file and gpubox files.
///
/// # Arguments
///
/// * `metafits_filename` - path to the metafits file.
/// * `gpubox_filenames` - array of `gpubox_count` paths.
/// * `out_correlator_context_ptr` - set to a Rust-owned context on success.
///   Free it with `mwalib_correlator_context_free`.
/// * `error_message` / `error_message_length` - caller-allocated buffer for
///   any error message.
///
/// # Safety
///
/// All pointers must be valid or null; `gpubox_filenames` must have
/// `gpubox_count` elements.
#[no_mangle]
pub unsafe extern "C" fn mwalib_correlator_context_new(
    metafits_filename: *const c_char,
    gpubox_filenames: *const *const c_char,
    gpubox_count: usize,
    out_correlator_context_ptr: *mut *mut CorrelatorContext,
    error_message: *mut c_char,
    error_message_length: usize,
) -> i32 {
    guard(error_message, error_message_length, || {
        if out_correlator_context_ptr.is_null() {
            return Err(FfiFailure::new(
                "out_correlator_context_ptr is a null pointer",
            ));
        }
        let metafits = c_str_to_string(metafits_filename, "metafits_filename")?;
        let gpuboxes = c_str_array_to_strings(gpubox_filenames, gpubox_count, "gpubox filename")?;
        let context = CorrelatorContext::new(metafits, &gpuboxes)?;
        *out_correlator_context_ptr = Box::into_raw(Box::new(context));
        Ok(MWALIB_SUCCESS)
    })
}

/// Free a context made by `mwalib_correlator_context_new`. A null pointer is
/// ignored.
///
/// # Safety
///
/// `correlator_context_ptr` must not be used after this call.
#[no_mangle]
pub unsafe extern "C" fn mwalib_correlator_context_free(
    correlator_context_ptr: *mut CorrelatorContext,
) -> i32 {
    if !correlator_context_ptr.is_null() {
        drop(Box::from_raw(correlator_context_ptr));
    }
    MWALIB_SUCCESS
}

/// Create a voltage context from a metafits file and voltage files.
///
/// # Safety
///
/// All pointers must be valid or null; `voltage_filenames` must have
/// `voltage_file_count` elements.
#[no_mangle]
pub unsafe extern "C" fn mwalib_voltage_context_new(
    metafits_filename: *const c_char,
    voltage_filenames: *const *const c_char,
    voltage_file_count: usize,
    out_voltage_context_ptr: *mut *mut VoltageContext,
    error_message: *mut c_char,
    error_message_length: usize,
) -> i32 {
    guard(error_message, error_message_length, || {
        if out_voltage_context_ptr.is_null() {
            return Err(FfiFailure::new("out_voltage_context_ptr is a null pointer"));
        }
        let metafits = c_str_to_string(metafits_filename, "metafits_filename")?;
        let voltage_files =
            c_str_array_to_strings(voltage_filenames, voltage_file_count, "voltage filename")?;
        let context = VoltageContext::new(metafits, &voltage_files)?;
        *out_voltage_context_ptr = Box::into_raw(Box::new(context));
        Ok(MWALIB_SUCCESS)
    })
}

/// Free a context made by `mwalib_voltage_context_new`. A null pointer is
/// ignored.
///
/// # Safety
///
/// `voltage_context_ptr` must not be used after this call.
#[no_mangle]
pub unsafe extern "C" fn mwalib_voltage_context_free(voltage_context_ptr: *mut VoltageContext) -> i32 {
    if !voltage_context_ptr.is_null() {
        drop(Box::from_raw(voltage_context_ptr));
    }
    MWALIB_SUCCESS
}

/// Read one timestep of one coarse channel of visibilities into `buffer`,
/// ordered `[baseline][fine chan][pol][r,i]`.
///
/// # Returns
///
/// * `MWALIB_SUCCESS`, `MWALIB_NO_DATA_FOR_TIMESTEP_COARSECHAN` (buffer
///   untouched), `MWALIB_BUFFER_TOO_SMALL` or `MWALIB_FAILURE`.
///
/// # Safety
///
/// `buffer` must have room for `buffer_len` floats.
#[no_mangle]
pub unsafe extern "C" fn mwalib_correlator_context_read_by_baseline(
    correlator_context_ptr: *const CorrelatorContext,
    timestep_index: usize,
    coarse_chan_index: usize,
    buffer: *mut f32,
    buffer_len: usize,
    error_message: *mut c_char,
    error_message_length: usize,
) -> i32 {
    guard(error_message, error_message_length, || {
        let context = deref_ptr(correlator_context_ptr, "correlator_context_ptr")?;
        let buffer = buffer_from_raw(buffer, buffer_len)?;
        let outcome =
            context.read_by_baseline_into_buffer(timestep_index, coarse_chan_index, buffer)?;
        Ok(outcome_code(outcome))
    })
}

/// As `mwalib_correlator_context_read_by_baseline`, but ordered
/// `[fine chan][baseline][pol][r,i]`.
///
/// # Safety
///
/// `buffer` must have room for `buffer_len` floats.
#[no_mangle]
pub unsafe extern "C" fn mwalib_correlator_context_read_by_frequency(
    correlator_context_ptr: *const CorrelatorContext,
    timestep_index: usize,
    coarse_chan_index: usize,
    buffer: *mut f32,
    buffer_len: usize,
    error_message: *mut c_char,
    error_message_length: usize,
) -> i32 {
    guard(error_message, error_message_length, || {
        let context = deref_ptr(correlator_context_ptr, "correlator_context_ptr")?;
        let buffer = buffer_from_raw(buffer, buffer_len)?;
        let outcome =
            context.read_by_frequency_into_buffer(timestep_index, coarse_chan_index, buffer)?;
        Ok(outcome_code(outcome))
    })
}

/// Read the weights of one timestep of one coarse channel, ordered
/// `[baseline][pol]`.
///
/// # Safety
///
/// `buffer` must have room for `buffer_len` floats.
#[no_mangle]
pub unsafe extern "C" fn mwalib_correlator_context_read_weights_by_baseline(
    correlator_context_ptr: *const CorrelatorContext,
    timestep_index: usize,
    coarse_chan_index: usize,
    buffer: *mut f32,
    buffer_len: usize,
    error_message: *mut c_char,
    error_message_length: usize,
) -> i32 {
    guard(error_message, error_message_length, || {
        let context = deref_ptr(correlator_context_ptr, "correlator_context_ptr")?;
        let buffer = buffer_from_raw(buffer, buffer_len)?;
        let outcome = context.read_weights_by_baseline_into_buffer(
            timestep_index,
            coarse_chan_index,
            buffer,
        )?;
        Ok(outcome_code(outcome))
    })
}

/// Fill `out_freqs_hz` with the centre frequency of every fine channel of
/// the given coarse channels.
///
/// # Safety
///
/// `coarse_chan_indices` must have `num_coarse_chan_indices` elements and
/// `out_freqs_hz` must have room for `out_freqs_hz_len` doubles.
#[no_mangle]
pub unsafe extern "C" fn mwalib_correlator_context_get_fine_chan_freqs_hz_array(
    correlator_context_ptr: *const CorrelatorContext,
    coarse_chan_indices: *const usize,
    num_coarse_chan_indices: usize,
    out_freqs_hz: *mut f64,
    out_freqs_hz_len: usize,
    error_message: *mut c_char,
    error_message_length: usize,
) -> i32 {
    guard(error_message, error_message_length, || {
        let context = deref_ptr(correlator_context_ptr, "correlator_context_ptr")?;
        let indices = coarse_chan_indices_from_raw(
            coarse_chan_indices,
            num_coarse_chan_indices,
            context.num_coarse_chans,
        )?;
        let freqs = context.get_fine_chan_freqs_hz_array(indices);
        copy_freqs(&freqs, out_freqs_hz, out_freqs_hz_len)
    })
}

/// As `mwalib_correlator_context_get_fine_chan_freqs_hz_array`, but for
/// voltage fine channels.
///
/// # Safety
///
/// `coarse_chan_indices` must have `num_coarse_chan_indices` elements and
/// `out_freqs_hz` must have room for `out_freqs_hz_len` doubles.
#[no_mangle]
pub unsafe extern "C" fn mwalib_voltage_context_get_fine_chan_freqs_hz_array(
    voltage_context_ptr: *const VoltageContext,
    coarse_chan_indices: *const usize,
    num_coarse_chan_indices: usize,
    out_freqs_hz: *mut f64,
    out_freqs_hz_len: usize,
    error_message: *mut c_char,
    error_message_length: usize,
) -> i32 {
    guard(error_message, error_message_length, || {
        let context = deref_ptr(voltage_context_ptr, "voltage_context_ptr")?;
        let indices = coarse_chan_indices_from_raw(
            coarse_chan_indices,
            num_coarse_chan_indices,
            context.num_coarse_chans,
        )?;
        let freqs = context.get_fine_chan_freqs_hz_array(indices);
        copy_freqs(&freqs, out_freqs_hz, out_freqs_hz_len)
    })
}

unsafe fn coarse_chan_indices_from_raw<'a>(
    indices: *const usize,
    num_indices: usize,
    num_coarse_chans: usize,
) -> Result<&'a [usize], FfiFailure> {
    if indices.is_null() {
        return Err(FfiFailure::new("coarse_chan_indices is a null pointer"));
    }
    let indices = slice::from_raw_parts(indices, num_indices);
    if let Some(&index) = indices.iter().find(|&&i| i >= num_coarse_chans) {
        return Err(ReadError::InvalidCoarseChanIndex {
            index,
            num_coarse_chans,
        }
        .into());
    }
    Ok(indices)
}

unsafe fn copy_freqs(freqs: &[f64], out: *mut f64, out_len: usize) -> Result<i32, FfiFailure> {
    if out_len < freqs.len() {
        return Err(ReadError::BufferTooSmall {
            expected: freqs.len(),
            got: out_len,
        }
        .into());
    }
    let out = buffer_from_raw(out, out_len)?;
    out[..freqs.len()].copy_from_slice(freqs);
    Ok(MWALIB_SUCCESS)
}

/// Read the data portion of one voltage file into `buffer`.
///
/// # Returns
///
/// * `MWALIB_SUCCESS`, `MWALIB_NO_DATA_FOR_TIMESTEP_COARSECHAN` (buffer
///   untouched), `MWALIB_BUFFER_TOO_SMALL` or `MWALIB_FAILURE`.
///
/// # Safety
///
/// `buffer` must have room for `buffer_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn mwalib_voltage_context_read_file(
    voltage_context_ptr: *const VoltageContext,
    timestep_index: usize,
    coarse_chan_index: usize,
    buffer: *mut i8,
    buffer_len: usize,
    error_message: *mut c_char,
    error_message_length: usize,
) -> i32 {
    guard(error_message, error_message_length, || {
        let context = deref_ptr(voltage_context_ptr, "voltage_context_ptr")?;
        let buffer = buffer_from_raw(buffer, buffer_len)?;
        let outcome = context.read_file(timestep_index, coarse_chan_index, buffer)?;
        Ok(outcome_code(outcome))
    })
}

/// Read `gps_second_count` seconds of voltages for one coarse channel.
///
/// # Safety
///
/// `buffer` must have room for `buffer_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn mwalib_voltage_context_read_second(
    voltage_context_ptr: *const VoltageContext,
    gps_second_start: u64,
    gps_second_count: usize,
    coarse_chan_index: usize,
    buffer: *mut i8,
    buffer_len: usize,
    error_message: *mut c_char,
    error_message_length: usize,
) -> i32 {
    guard(error_message, error_message_length, || {
        let context = deref_ptr(voltage_context_ptr, "voltage_context_ptr")?;
        let buffer = buffer_from_raw(buffer, buffer_len)?;
        let outcome =
            context.read_second(gps_second_start, gps_second_count, coarse_chan_index, buffer)?;
        Ok(outcome_code(outcome))
    })
}

/// The context a metafits metadata snapshot is taken from. Exactly one must
/// be given.
enum ContextRef<'a> {
    Metafits(&'a MetafitsContext),
    Correlator(&'a CorrelatorContext),
    Voltage(&'a VoltageContext),
}

impl<'a> ContextRef<'a> {
    unsafe fn from_ptrs(
        metafits: *const MetafitsContext,
        correlator: *const CorrelatorContext,
        voltage: *const VoltageContext,
    ) -> Result<ContextRef<'a>, FfiFailure> {
        match (metafits.as_ref(), correlator.as_ref(), voltage.as_ref()) {
            (Some(m), None, None) => Ok(ContextRef::Metafits(m)),
            (None, Some(c), None) => Ok(ContextRef::Correlator(c)),
            (None, None, Some(v)) => Ok(ContextRef::Voltage(v)),
            _ => Err(FfiFailure::new(
                "Exactly one of the metafits, correlator or voltage context pointers must be non-null",
            )),
        }
    }

    fn metafits(&self) -> &'a MetafitsContext {
        match *self {
            ContextRef::Metafits(m) => m,
            ContextRef::Correlator(c) => &c.metafits_context,
            ContextRef::Voltage(v) => &v.metafits_context,
        }
    }
}

/// An antenna, as seen from C.
#[repr(C)]
pub struct AntennaMetadata {
    pub ant: u32,
    pub tile_id: u32,
    /// Owned by the enclosing `MetafitsMetadata`.
    pub tile_name: *mut c_char,
    pub rfinput_x: usize,
    pub rfinput_y: usize,
    pub electrical_length_m: f64,
    pub north_m: f64,
    pub east_m: f64,
    pub height_m: f64,
}

/// An RF input, as seen from C.
#[repr(C)]
pub struct RfinputMetadata {
    pub input: u32,
    pub ant: u32,
    pub tile_id: u32,
    /// Owned by the enclosing `MetafitsMetadata`.
    pub tile_name: *mut c_char,
    /// "X" or "Y".
    pub pol: *mut c_char,
    pub electrical_length_m: f64,
    pub north_m: f64,
    pub east_m: f64,
    pub height_m: f64,
    pub flagged: bool,
    pub rec_number: u32,
    pub rec_slot_number: u32,
    pub vcs_order: u32,
    pub subfile_order: u32,
    /// One per metafits coarse channel.
    pub digital_gains: *mut f64,
    pub num_digital_gains: usize,
    pub dipole_delays: *mut u32,
    pub num_dipole_delays: usize,
}

impl From<&Rfinput> for RfinputMetadata {
    fn from(r: &Rfinput) -> Self {
        RfinputMetadata {
            input: r.input,
            ant: r.ant,
            tile_id: r.tile_id,
            tile_name: string_into_raw(&r.tile_name),
            pol: string_into_raw(&r.pol.to_string()),
            electrical_length_m: r.electrical_length_m,
            north_m: r.north_m,
            east_m: r.east_m,
            height_m: r.height_m,
            flagged: r.flagged,
            rec_number: r.rec_number,
            rec_slot_number: r.rec_slot_number,
            vcs_order: r.vcs_order,
            subfile_order: r.subfile_order,
            num_digital_gains: r.digital_gains.len(),
            digital_gains: vec_into_raw(r.digital_gains.clone()),
            num_dipole_delays: r.dipole_delays.len(),
            dipole_delays: vec_into_raw(r.dipole_delays.clone()),
        }
    }
}

/// A snapshot of metafits metadata. Free it with
/// `mwalib_metafits_metadata_free`.
#[repr(C)]
pub struct MetafitsMetadata {
    pub obs_id: u32,
    /// `0` if the context has no version.
    pub mwa_version: u32,
    pub sched_start_gps_time_ms: u64,
    pub sched_end_gps_time_ms: u64,
    pub sched_start_unix_time_ms: u64,
    pub sched_end_unix_time_ms: u64,
    pub sched_start_mjd: f64,
    pub sched_duration_ms: u64,
    pub quack_time_duration_ms: u64,
    pub good_time_unix_ms: u64,
    pub good_time_gps_ms: u64,
    pub ra_tile_pointing_degrees: f64,
    pub dec_tile_pointing_degrees: f64,
    /// NaN if not in the metafits.
    pub ra_phase_center_degrees: f64,
    /// NaN if not in the metafits.
    pub dec_phase_center_degrees: f64,
    pub az_deg: f64,
    pub alt_deg: f64,
    pub za_deg: f64,
    /// This and the next three are NaN if not in the metafits.
    pub sun_alt_deg: f64,
    pub sun_distance_deg: f64,
    pub moon_distance_deg: f64,
    pub jupiter_distance_deg: f64,
    pub lst_deg: f64,
    pub hour_angle_string: *mut c_char,
    pub grid_name: *mut c_char,
    pub grid_number: i32,
    pub creator: *mut c_char,
    pub project_id: *mut c_char,
    pub obs_name: *mut c_char,
    pub mode: *mut c_char,
    pub receivers: *mut usize,
    pub num_receivers: usize,
    /// Beamformer delays.
    pub delays: *mut u32,
    pub num_delays: usize,
    pub global_analogue_attenuation_db: f64,
    pub corr_fine_chan_width_hz: u32,
    pub corr_int_time_ms: u64,
    pub num_corr_fine_chans_per_coarse: usize,
    pub centre_freq_hz: u32,
    pub obs_bandwidth_hz: u32,
    pub coarse_chan_width_hz: u32,
    pub metafits_coarse_chans: *mut CoarseChannel,
    pub num_metafits_coarse_chans: usize,
    pub antennas: *mut AntennaMetadata,
    pub num_ants: usize,
    pub rf_inputs: *mut RfinputMetadata,
    pub num_rf_inputs: usize,
    pub baselines: *mut Baseline,
    pub num_baselines: usize,
    pub num_ant_pols: usize,
    pub num_visibility_pols: usize,
}

impl From<&MetafitsContext> for MetafitsMetadata {
    fn from(m: &MetafitsContext) -> Self {
        let antennas: Vec<AntennaMetadata> = m
            .antennas
            .iter()
            .map(|a| AntennaMetadata {
                ant: a.ant,
                tile_id: a.tile_id,
                tile_name: string_into_raw(&a.tile_name),
                rfinput_x: a.rfinput_x,
                rfinput_y: a.rfinput_y,
                electrical_length_m: a.electrical_length_m,
                north_m: a.north_m,
                east_m: a.east_m,
                height_m: a.height_m,
            })
            .collect();
        let rf_inputs: Vec<RfinputMetadata> = m.rf_inputs.iter().map(|r| r.into()).collect();
        MetafitsMetadata {
            obs_id: m.obs_id,
            mwa_version: m.mwa_version.map(|v| v as u32).unwrap_or(0),
            sched_start_gps_time_ms: m.sched_start_gps_time_ms,
            sched_end_gps_time_ms: m.sched_end_gps_time_ms,
            sched_start_unix_time_ms: m.sched_start_unix_time_ms,
            sched_end_unix_time_ms: m.sched_end_unix_time_ms,
            sched_start_mjd: m.sched_start_mjd,
            sched_duration_ms: m.sched_duration_ms,
            quack_time_duration_ms: m.quack_time_duration_ms,
            good_time_unix_ms: m.good_time_unix_ms,
            good_time_gps_ms: m.good_time_gps_ms,
            ra_tile_pointing_degrees: m.ra_tile_pointing_degrees,
            dec_tile_pointing_degrees: m.dec_tile_pointing_degrees,
            ra_phase_center_degrees: m.ra_phase_center_degrees.unwrap_or(f64::NAN),
            dec_phase_center_degrees: m.dec_phase_center_degrees.unwrap_or(f64::NAN),
            az_deg: m.az_deg,
            alt_deg: m.alt_deg,
            za_deg: m.za_deg,
            sun_alt_deg: m.sun_alt_deg.unwrap_or(f64::NAN),
            sun_distance_deg: m.sun_distance_deg.unwrap_or(f64::NAN),
            moon_distance_deg: m.moon_distance_deg.unwrap_or(f64::NAN),
            jupiter_distance_deg: m.jupiter_distance_deg.unwrap_or(f64::NAN),
            lst_deg: m.lst_deg,
            hour_angle_string: string_into_raw(&m.hour_angle_string),
            grid_name: string_into_raw(&m.grid_name),
            grid_number: m.grid_number,
            creator: string_into_raw(&m.creator),
            project_id: string_into_raw(&m.project_id),
            obs_name: string_into_raw(&m.obs_name),
            mode: string_into_raw(&m.mode),
            num_receivers: m.receivers.len(),
            receivers: vec_into_raw(m.receivers.clone()),
            num_delays: m.delays.len(),
            delays: vec_into_raw(m.delays.clone()),
            global_analogue_attenuation_db: m.global_analogue_attenuation_db,
            corr_fine_chan_width_hz: m.corr_fine_chan_width_hz,
            corr_int_time_ms: m.corr_int_time_ms,
            num_corr_fine_chans_per_coarse: m.num_corr_fine_chans_per_coarse,
            centre_freq_hz: m.centre_freq_hz,
            obs_bandwidth_hz: m.obs_bandwidth_hz,
            coarse_chan_width_hz: m.coarse_chan_width_hz,
            num_metafits_coarse_chans: m.metafits_coarse_chans.len(),
            metafits_coarse_chans: vec_into_raw(m.metafits_coarse_chans.clone()),
            num_ants: antennas.len(),
            antennas: vec_into_raw(antennas),
            num_rf_inputs: rf_inputs.len(),
            rf_inputs: vec_into_raw(rf_inputs),
            num_baselines: m.baselines.len(),
            baselines: vec_into_raw(m.baselines.clone()),
            num_ant_pols: m.num_ant_pols,
            num_visibility_pols: m.num_visibility_pols,
        }
    }
}

/// Take a snapshot of the metafits metadata of exactly one of the given
/// contexts; the other two pointers must be null.
///
/// # Safety
///
/// Free `out_metafits_metadata_ptr` with `mwalib_metafits_metadata_free`.
#[no_mangle]
pub unsafe extern "C" fn mwalib_metafits_metadata_get(
    metafits_context_ptr: *const MetafitsContext,
    correlator_context_ptr: *const CorrelatorContext,
    voltage_context_ptr: *const VoltageContext,
    out_metafits_metadata_ptr: *mut *mut MetafitsMetadata,
    error_message: *mut c_char,
    error_message_length: usize,
) -> i32 {
    guard(error_message, error_message_length, || {
        if out_metafits_metadata_ptr.is_null() {
            return Err(FfiFailure::new("out_metafits_metadata_ptr is a null pointer"));
        }
        let context = ContextRef::from_ptrs(
            metafits_context_ptr,
            correlator_context_ptr,
            voltage_context_ptr,
        )?;
        let metadata = MetafitsMetadata::from(context.metafits());
        *out_metafits_metadata_ptr = Box::into_raw(Box::new(metadata));
        Ok(MWALIB_SUCCESS)
    })
}

/// Free a snapshot made by `mwalib_metafits_metadata_get`. A null pointer is
/// ignored.
///
/// # Safety
///
/// `metafits_metadata_ptr` must not be used after this call.
#[no_mangle]
pub unsafe extern "C" fn mwalib_metafits_metadata_free(
    metafits_metadata_ptr: *mut MetafitsMetadata,
) -> i32 {
    if metafits_metadata_ptr.is_null() {
        return MWALIB_SUCCESS;
    }
    let m = Box::from_raw(metafits_metadata_ptr);
    for s in [
        m.hour_angle_string,
        m.grid_name,
        m.creator,
        m.project_id,
        m.obs_name,
        m.mode,
    ] {
        free_raw_string(s);
    }
    free_raw_vec(m.receivers, m.num_receivers);
    free_raw_vec(m.delays, m.num_delays);
    free_raw_vec(m.metafits_coarse_chans, m.num_metafits_coarse_chans);
    if !m.antennas.is_null() {
        for a in slice::from_raw_parts(m.antennas, m.num_ants) {
            free_raw_string(a.tile_name);
        }
    }
    free_raw_vec(m.antennas, m.num_ants);
    if !m.rf_inputs.is_null() {
        for r in slice::from_raw_parts(m.rf_inputs, m.num_rf_inputs) {
            free_raw_string(r.tile_name);
            free_raw_string(r.pol);
            free_raw_vec(r.digital_gains, r.num_digital_gains);
            free_raw_vec(r.dipole_delays, r.num_dipole_delays);
        }
    }
    free_raw_vec(m.rf_inputs, m.num_rf_inputs);
    free_raw_vec(m.baselines, m.num_baselines);
    MWALIB_SUCCESS
}

/// Index lists and spans shared by the correlator and voltage snapshots.
#[repr(C)]
pub struct CommonMetadata {
    pub provided_timestep_indices: *mut usize,
    pub num_provided_timesteps: usize,
    pub provided_coarse_chan_indices: *mut usize,
    pub num_provided_coarse_chans: usize,
    pub common_timestep_indices: *mut usize,
    pub num_common_timesteps: usize,
    pub common_coarse_chan_indices: *mut usize,
    pub num_common_coarse_chans: usize,
    pub common_start_unix_time_ms: u64,
    pub common_end_unix_time_ms: u64,
    pub common_start_gps_time_ms: u64,
    pub common_end_gps_time_ms: u64,
    pub common_duration_ms: u64,
    pub common_bandwidth_hz: u32,
    pub common_good_timestep_indices: *mut usize,
    pub num_common_good_timesteps: usize,
    pub common_good_coarse_chan_indices: *mut usize,
    pub num_common_good_coarse_chans: usize,
    pub common_good_start_unix_time_ms: u64,
    pub common_good_end_unix_time_ms: u64,
    pub common_good_start_gps_time_ms: u64,
    pub common_good_end_gps_time_ms: u64,
    pub common_good_duration_ms: u64,
    pub common_good_bandwidth_hz: u32,
}

macro_rules! common_metadata {
    ($c:expr) => {
        CommonMetadata {
            num_provided_timesteps: $c.provided_timestep_indices.len(),
            provided_timestep_indices: vec_into_raw($c.provided_timestep_indices.clone()),
            num_provided_coarse_chans: $c.provided_coarse_chan_indices.len(),
            provided_coarse_chan_indices: vec_into_raw($c.provided_coarse_chan_indices.clone()),
            num_common_timesteps: $c.common_timestep_indices.len(),
            common_timestep_indices: vec_into_raw($c.common_timestep_indices.clone()),
            num_common_coarse_chans: $c.common_coarse_chan_indices.len(),
            common_coarse_chan_indices: vec_into_raw($c.common_coarse_chan_indices.clone()),
            common_start_unix_time_ms: $c.common_start_unix_time_ms,
            common_end_unix_time_ms: $c.common_end_unix_time_ms,
            common_start_gps_time_ms: $c.common_start_gps_time_ms,
            common_end_gps_time_ms: $c.common_end_gps_time_ms,
            common_duration_ms: $c.common_duration_ms,
            common_bandwidth_hz: $c.common_bandwidth_hz,
            num_common_good_timesteps: $c.common_good_timestep_indices.len(),
            common_good_timestep_indices: vec_into_raw($c.common_good_timestep_indices.clone()),
            num_common_good_coarse_chans: $c.common_good_coarse_chan_indices.len(),
            common_good_coarse_chan_indices: vec_into_raw(
                $c.common_good_coarse_chan_indices.clone(),
            ),
            common_good_start_unix_time_ms: $c.common_good_start_unix_time_ms,
            common_good_end_unix_time_ms: $c.common_good_end_unix_time_ms,
            common_good_start_gps_time_ms: $c.common_good_start_gps_time_ms,
            common_good_end_gps_time_ms: $c.common_good_end_gps_time_ms,
            common_good_duration_ms: $c.common_good_duration_ms,
            common_good_bandwidth_hz: $c.common_good_bandwidth_hz,
        }
    };
}

unsafe fn free_common_metadata(c: &CommonMetadata) {
    free_raw_vec(c.provided_timestep_indices, c.num_provided_timesteps);
    free_raw_vec(c.provided_coarse_chan_indices, c.num_provided_coarse_chans);
    free_raw_vec(c.common_timestep_indices, c.num_common_timesteps);
    free_raw_vec(c.common_coarse_chan_indices, c.num_common_coarse_chans);
    free_raw_vec(c.common_good_timestep_indices, c.num_common_good_timesteps);
    free_raw_vec(
        c.common_good_coarse_chan_indices,
        c.num_common_good_coarse_chans,
    );
}

/// A snapshot of correlator metadata. Free it with
/// `mwalib_correlator_metadata_free`.
#[repr(C)]
pub struct CorrelatorMetadata {
    pub mwa_version: MWAVersion,
    pub timesteps: *mut TimeStep,
    pub num_timesteps: usize,
    pub coarse_chans: *mut CoarseChannel,
    pub num_coarse_chans: usize,
    pub num_baselines: usize,
    pub num_visibility_pols: usize,
    pub common: CommonMetadata,
    pub num_gpubox_files: usize,
    /// NaN if the gpubox files have no BSCALE.
    pub bscale: f32,
    pub num_timestep_coarse_chan_bytes: usize,
    pub num_timestep_coarse_chan_floats: usize,
    pub num_timestep_coarse_chan_weight_floats: usize,
}

/// Take a snapshot of a correlator context's metadata.
///
/// # Safety
///
/// Free `out_correlator_metadata_ptr` with `mwalib_correlator_metadata_free`.
#[no_mangle]
pub unsafe extern "C" fn mwalib_correlator_metadata_get(
    correlator_context_ptr: *const CorrelatorContext,
    out_correlator_metadata_ptr: *mut *mut CorrelatorMetadata,
    error_message: *mut c_char,
    error_message_length: usize,
) -> i32 {
    guard(error_message, error_message_length, || {
        if out_correlator_metadata_ptr.is_null() {
            return Err(FfiFailure::new(
                "out_correlator_metadata_ptr is a null pointer",
            ));
        }
        let c = deref_ptr(correlator_context_ptr, "correlator_context_ptr")?;
        let metadata = CorrelatorMetadata {
            mwa_version: c.mwa_version,
            num_timesteps: c.timesteps.len(),
            timesteps: vec_into_raw(c.timesteps.clone()),
            num_coarse_chans: c.coarse_chans.len(),
            coarse_chans: vec_into_raw(c.coarse_chans.clone()),
            num_baselines: c.num_baselines,
            num_visibility_pols: c.num_visibility_pols,
            common: common_metadata!(c),
            num_gpubox_files: c.num_gpubox_files,
            bscale: c.bscale.unwrap_or(f32::NAN),
            num_timestep_coarse_chan_bytes: c.num_timestep_coarse_chan_bytes,
            num_timestep_coarse_chan_floats: c.num_timestep_coarse_chan_floats,
            num_timestep_coarse_chan_weight_floats: c.num_timestep_coarse_chan_weight_floats,
        };
        *out_correlator_metadata_ptr = Box::into_raw(Box::new(metadata));
        Ok(MWALIB_SUCCESS)
    })
}

/// Free a snapshot made by `mwalib_correlator_metadata_get`. A null pointer
/// is ignored.
///
/// # Safety
///
/// `correlator_metadata_ptr` must not be used after this call.
#[no_mangle]
pub unsafe extern "C" fn mwalib_correlator_metadata_free(
    correlator_metadata_ptr: *mut CorrelatorMetadata,
) -> i32 {
    if correlator_metadata_ptr.is_null() {
        return MWALIB_SUCCESS;
    }
    let m = Box::from_raw(correlator_metadata_ptr);
    free_raw_vec(m.timesteps, m.num_timesteps);
    free_raw_vec(m.coarse_chans, m.num_coarse_chans);
    free_common_metadata(&m.common);
    MWALIB_SUCCESS
}

/// A snapshot of voltage metadata. Free it with
/// `mwalib_voltage_metadata_free`.
#[repr(C)]
pub struct VoltageMetadata {
    pub mwa_version: MWAVersion,
    pub timesteps: *mut TimeStep,
    pub num_timesteps: usize,
    pub coarse_chans: *mut CoarseChannel,
    pub num_coarse_chans: usize,
    pub common: CommonMetadata,
    pub timestep_duration_ms: u64,
    pub num_fine_chans_per_coarse: usize,
    pub fine_chan_width_hz: u32,
    pub sample_size_bytes: u64,
    pub num_voltage_blocks_per_timestep: u64,
    pub num_voltage_blocks_per_second: u64,
    pub num_samples_per_voltage_block: u64,
    pub voltage_block_size_bytes: u64,
    pub delay_block_size_bytes: u64,
    pub data_file_header_size_bytes: u64,
    pub expected_voltage_data_file_size_bytes: u64,
}

/// Take a snapshot of a voltage context's metadata.
///
/// # Safety
///
/// Free `out_voltage_metadata_ptr` with `mwalib_voltage_metadata_free`.
#[no_mangle]
pub unsafe extern "C" fn mwalib_voltage_metadata_get(
    voltage_context_ptr: *const VoltageContext,
    out_voltage_metadata_ptr: *mut *mut VoltageMetadata,
    error_message: *mut c_char,
    error_message_length: usize,
) -> i32 {
    guard(error_message, error_message_length, || {
        if out_voltage_metadata_ptr.is_null() {
            return Err(FfiFailure::new("out_voltage_metadata_ptr is a null pointer"));
        }
        let v = deref_ptr(voltage_context_ptr, "voltage_context_ptr")?;
        let metadata = VoltageMetadata {
            mwa_version: v.mwa_version,
            num_timesteps: v.timesteps.len(),
            timesteps: vec_into_raw(v.timesteps.clone()),
            num_coarse_chans: v.coarse_chans.len(),
            coarse_chans: vec_into_raw(v.coarse_chans.clone()),
            common: common_metadata!(v),
            timestep_duration_ms: v.timestep_duration_ms,
            num_fine_chans_per_coarse: v.num_fine_chans_per_coarse,
            fine_chan_width_hz: v.fine_chan_width_hz,
            sample_size_bytes: v.sample_size_bytes,
            num_voltage_blocks_per_timestep: v.num_voltage_blocks_per_timestep,
            num_voltage_blocks_per_second: v.num_voltage_blocks_per_second,
            num_samples_per_voltage_block: v.num_samples_per_voltage_block,
            voltage_block_size_bytes: v.voltage_block_size_bytes,
            delay_block_size_bytes: v.delay_block_size_bytes,
            data_file_header_size_bytes: v.data_file_header_size_bytes,
            expected_voltage_data_file_size_bytes: v.expected_voltage_data_file_size_bytes,
        };
        *out_voltage_metadata_ptr = Box::into_raw(Box::new(metadata));
        Ok(MWALIB_SUCCESS)
    })
}

/// Free a snapshot made by `mwalib_voltage_metadata_get`. A null pointer is
/// ignored.
///
/// # Safety
///
/// `voltage_metadata_ptr` must not be used after this call.
#[no_mangle]
pub unsafe extern "C" fn mwalib_voltage_metadata_free(voltage_metadata_ptr: *mut VoltageMetadata) -> i32 {
    if voltage_metadata_ptr.is_null() {
        return MWALIB_SUCCESS;
    }
    let m = Box::from_raw(voltage_metadata_ptr);
    free_raw_vec(m.timesteps, m.num_timesteps);
    free_raw_vec(m.coarse_chans, m.num_coarse_chans);
    free_common_metadata(&m.common);
    MWALIB_SUCCESS
}

/// Copy the value of a string key in the primary HDU of the context's
/// metafits file into `out_value`. Values using the CONTINUE convention are
/// read in full.
///
/// # Returns
///
/// * `MWALIB_SUCCESS`, `MWALIB_BUFFER_TOO_SMALL` if the value and its null
///   terminator don't fit (nothing is written to `out_value`), or
///   `MWALIB_FAILURE` (e.g. the key doesn't exist).
///
/// # Safety
///
/// `out_value` must have room for `out_value_length` bytes.
#[no_mangle]
pub unsafe extern "C" fn mwalib_metafits_get_key_string(
    metafits_context_ptr: *const MetafitsContext,
    keyword: *const c_char,
    out_value: *mut c_char,
    out_value_length: usize,
    error_message: *mut c_char,
    error_message_length: usize,
) -> i32 {
    guard(error_message, error_message_length, || {
        let context = deref_ptr(metafits_context_ptr, "metafits_context_ptr")?;
        let keyword = c_str_to_string(keyword, "keyword")?;
        let mut fptr = fits_open(&context.metafits_filename)?;
        let hdu = fits_open_hdu(&mut fptr, 0)?;
        let value = get_required_fits_key_long_string(&mut fptr, &hdu, keyword)?;
        if value.len() + 1 > out_value_length {
            return Err(FfiFailure {
                code: MWALIB_BUFFER_TOO_SMALL,
                message: format!(
                    "The value of {keyword} needs {} bytes, but the buffer has {out_value_length}",
                    value.len() + 1
                ),
            });
        }
        let out = buffer_from_raw(out_value as *mut u8, out_value_length)?;
        out[..value.len()].copy_from_slice(value.as_bytes());
        out[value.len()] = 0;
        Ok(MWALIB_SUCCESS)
    })
}

/// The major version of this library.
#[no_mangle]
pub extern "C" fn mwalib_get_version_major() -> u32 {
    crate::version().0
}

/// The minor version of this library.
#[no_mangle]
pub extern "C" fn mwalib_get_version_minor() -> u32 {
    crate::version().1
}

/// The patch version of this library.
#[no_mangle]
pub extern "C" fn mwalib_get_version_patch() -> u32 {
    crate::version().2
}
