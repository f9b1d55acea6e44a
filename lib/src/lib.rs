/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Main file / top-level module for the regmerge library.
//!
//! The library shrinks the register footprint of a shader program: it
//! computes how long every temporary and every array has to be kept alive,
//! renames temporaries with disjoint lifetimes onto each other, and merges
//! arrays that are live at different times or use disjoint components.

// Make the analysis modules public for fuzzing.
#[cfg(feature = "fuzzing")]
pub mod access;
#[cfg(not(feature = "fuzzing"))]
mod access;
#[cfg(feature = "fuzzing")]
pub mod checker;
#[cfg(not(feature = "fuzzing"))]
mod checker;
#[cfg(feature = "fuzzing")]
pub mod scope;
#[cfg(not(feature = "fuzzing"))]
mod scope;

mod array_merge;
mod data_structures;
mod interface;
mod liveness;
mod remap;
mod temp_rename;

use log::info;
use std::fmt;

pub use crate::access::Lifetime;
pub use crate::array_merge::{
  get_array_remapping, ArrayLiveRange, ArrayRemapping,
};
pub use crate::checker::{CheckerError, CheckerErrors};
pub use crate::interface::*;
pub use crate::liveness::{compute_required_lifetimes, Lifetimes, LivenessError};
pub use crate::remap::remap_arrays;
pub use crate::temp_rename::{
  get_temp_registers_remapping, rename_temp_registers,
};

#[derive(Clone, Debug)]
pub enum MergeError {
  /// The lifetimes could not be computed; the program is left untouched.
  Liveness(LivenessError),
  /// The computed result failed verification; the program is left untouched.
  Checker(CheckerErrors),
}

impl fmt::Display for MergeError {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    match self {
      MergeError::Liveness(err) => write!(fmt, "liveness: {}", err),
      MergeError::Checker(errs) => write!(fmt, "checker: {}", errs),
    }
  }
}

impl From<LivenessError> for MergeError {
  fn from(err: LivenessError) -> Self {
    MergeError::Liveness(err)
  }
}

impl From<CheckerErrors> for MergeError {
  fn from(errs: CheckerErrors) -> Self {
    MergeError::Checker(errs)
  }
}

#[derive(Clone, Copy, Debug)]
pub struct Options {
  /// Verify the merge result before rewriting the program.
  pub run_checker: bool,
  /// Rename temporaries.
  pub merge_temps: bool,
  /// Merge arrays.
  pub merge_arrays: bool,
}

impl Default for Options {
  fn default() -> Self {
    Self { run_checker: false, merge_temps: true, merge_arrays: true }
  }
}

/// What [merge_registers_with_opts] did to a program.
#[derive(Clone, Debug)]
pub struct MergeResult {
  /// The lifetimes of the original program.
  pub lifetimes: Lifetimes,
  /// For each original temporary, the register it was renamed to, if any.
  pub temp_remapping: Vec<Option<u32>>,
  /// Indexed by original array id (entry 0 unused): the new id of every
  /// array, and how its components moved.  Empty if arrays weren't merged.
  pub array_remapping: Vec<ArrayRemapping>,
  pub num_arrays: usize,
  pub array_sizes: Vec<u32>,
}

/// Runs the optimizer with the default options.
pub fn merge_registers(program: &mut Program) -> Result<MergeResult, MergeError> {
  merge_registers_with_opts(program, Options::default())
}

/// Computes lifetimes, renames temporaries and merges arrays in `program`.
/// On error the program is not modified.
#[inline(never)]
pub fn merge_registers_with_opts(
  program: &mut Program, opts: Options,
) -> Result<MergeResult, MergeError> {
  info!("merge_registers: begin ({:?})", opts);

  let lifetimes = compute_required_lifetimes(program)?;

  let temp_remapping = if opts.merge_temps {
    get_temp_registers_remapping(&lifetimes.temps)
  } else {
    vec![None; lifetimes.temps.len()]
  };

  let mut array_remapping = if opts.merge_arrays {
    let mut ranges = lifetimes.arrays.clone();
    get_array_remapping(&mut ranges)
  } else {
    vec![]
  };

  if opts.run_checker {
    let no_arrays = [ArrayRemapping::default()];
    let (arrays, array_map): (&[ArrayLiveRange], &[ArrayRemapping]) =
      if opts.merge_arrays {
        (&lifetimes.arrays, &array_remapping)
      } else {
        (&[], &no_arrays)
      };
    checker::check_merge_result(
      &lifetimes.temps,
      &temp_remapping,
      arrays,
      array_map,
    )?;
  }

  if opts.merge_temps {
    rename_temp_registers(program, &temp_remapping);
  }
  if opts.merge_arrays {
    remap_arrays(program, &mut array_remapping);
  }

  info!(
    "merge_registers: end ({} arrays left)",
    program.array_sizes.len()
  );
  Ok(MergeResult {
    lifetimes,
    temp_remapping,
    array_remapping,
    num_arrays: program.array_sizes.len(),
    array_sizes: program.array_sizes.clone(),
  })
}
