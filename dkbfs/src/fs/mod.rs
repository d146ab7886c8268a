// SPDX-License-Identifier: MIT

pub mod fat;
pub mod os9;
