// SPDX-License-Identifier: MIT

pub mod boot;
pub mod checker;
pub mod codec;
pub mod constant;
pub mod driver;
pub mod entries;
pub mod formatter;
pub mod meta;

pub use driver::{FatDriver, FatFlavor};
