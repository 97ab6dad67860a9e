// Copyright 2020 the Druid Authors
// SPDX-License-Identifier: Apache-2.0

//! Platform specific implementations.

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "freebsd", target_os = "linux", target_os = "openbsd"))] {
        pub mod x11;
        pub use x11::*;
    } else {
        compile_error!("druid-dnd implements the X11 drag and drop protocols and needs an X11 platform");
    }
}
