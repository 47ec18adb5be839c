// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::env;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Gather build time info
    built::write_built_file().expect("Failed to acquire build-time information");

    // Generate a C header and write it to the include directory. This is only
    // done on request, as it writes outside of OUT_DIR.
    println!("cargo:rerun-if-env-changed=MWALIB_GENERATE_HEADER");
    println!("cargo:rerun-if-changed=src/ffi/mod.rs");
    if env::var("MWALIB_GENERATE_HEADER").is_ok() {
        let crate_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
        cbindgen::Builder::new()
            .with_config({
                let mut config = cbindgen::Config::default();
                config.cpp_compat = true;
                config.pragma_once = true;
                config
            })
            .with_crate(crate_dir)
            .with_language(cbindgen::Language::C)
            .generate()
            .expect("Unable to generate bindings")
            .write_to_file("include/mwa_context.h");
    }
}
