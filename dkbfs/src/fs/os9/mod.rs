// SPDX-License-Identifier: MIT

pub mod checker;
pub mod constant;
pub mod driver;
pub mod entries;
pub mod fd;
pub mod lsn0;

pub use driver::Os9Driver;
