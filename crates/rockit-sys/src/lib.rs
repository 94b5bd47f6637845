// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 hdmicap developers

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(clippy::type_complexity)]
#![allow(clippy::missing_safety_doc)]
#![allow(clippy::too_many_arguments)]

include!("ffi.rs");

// Re-export libloading for error handling
pub use libloading;

use std::sync::{Mutex, OnceLock};

static LIBRARY: OnceLock<RockitLibrary> = OnceLock::new();
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Default soname of the media process library on RV1106 firmware images.
pub const DEFAULT_LIBRARY: &str = "librockit.so";

/// Load the rockit media process library.
///
/// This must succeed before any `RK_MPI_*` function is called. The library is
/// loaded once per process; later calls return the same instance.
///
/// The environment variable `ROCKIT_LIBRARY` can be used to specify a custom
/// path to the library. If not set, the dynamic loader searches the standard
/// system paths for [`DEFAULT_LIBRARY`].
pub fn init() -> Result<&'static RockitLibrary, libloading::Error> {
    if let Some(lib) = LIBRARY.get() {
        return Ok(lib);
    }

    let _guard = INIT_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    // Double-check after acquiring lock
    if let Some(lib) = LIBRARY.get() {
        return Ok(lib);
    }

    let lib_path = library_path();
    let lib = unsafe { RockitLibrary::new(lib_path.as_str())? };

    // INIT_LOCK serializes writers, so the cell is still empty here.
    Ok(LIBRARY.get_or_init(|| lib))
}

/// Try to get a reference to the loaded library without loading it.
pub fn try_library() -> Option<&'static RockitLibrary> {
    LIBRARY.get()
}

/// Path the loader will use, honouring `ROCKIT_LIBRARY`.
pub fn library_path() -> String {
    std::env::var("ROCKIT_LIBRARY")
        .ok()
        .filter(|path| !path.is_empty())
        .unwrap_or_else(|| DEFAULT_LIBRARY.to_string())
}
