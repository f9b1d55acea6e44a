/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Support code shared by the `regmerge-util` binary and the fuzz targets:
//! a text format for programs, an interpreter, named test programs and a
//! random program generator.

pub mod fuzzing;
pub mod parser;
pub mod test_cases;
pub mod test_framework;

#[cfg(test)]
mod liveness_tests;
