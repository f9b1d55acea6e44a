/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Checker: verifies that a computed merge result can't change what the
//! program computes.
//!
//! The checks are done on the remapping tables, before the program is
//! rewritten, using the lifetimes the liveness pass reported:
//!
//!   - every valid array remapping entry is final, i.e. it points at an
//!     array that is not merged away itself;
//!
//!   - any two arrays that end up in the same storage are either never live
//!     at the same time, or use disjoint components of it;
//!
//!   - a remapping entry that moves components moves each used component to
//!     exactly one lane, and reading that lane back yields the component
//!     that was written;
//!
//!   - temporaries renamed to the same register have lifetimes that don't
//!     overlap.

use log::{debug, info};
use std::fmt;

use crate::access::Lifetime;
use crate::array_merge::{ArrayLiveRange, ArrayRemapping};
use crate::data_structures::Map;
use crate::interface::WriteMask;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckerError {
  /// The entry of `array` points at `target`, which is merged away itself.
  UnresolvedChain { array: u32, target: u32 },
  /// Two arrays share storage while being live at the same time in the same
  /// components.
  ArraysCollide { first: u32, second: u32, target: u32 },
  /// The lane `component` of `array` is written to and read back from
  /// different places.
  BadComponentMap { array: u32, component: u8 },
  /// Two temporaries renamed into one register are live at the same time.
  TempsCollide { first: u32, second: u32, reg: u32 },
}

impl fmt::Display for CheckerError {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    match self {
      CheckerError::UnresolvedChain { array, target } => write!(
        fmt,
        "array {} is remapped to array {}, which is remapped itself",
        array, target
      ),
      CheckerError::ArraysCollide { first, second, target } => write!(
        fmt,
        "arrays {} and {} both live in the same components of array {}",
        first, second, target
      ),
      CheckerError::BadComponentMap { array, component } => write!(
        fmt,
        "component {} of array {} is not written where it is read",
        component, array
      ),
      CheckerError::TempsCollide { first, second, reg } => write!(
        fmt,
        "temporaries {} and {} are both live in TEMP[{}]",
        first, second, reg
      ),
    }
  }
}

#[derive(Clone, Debug)]
pub struct CheckerErrors {
  pub errors: Vec<CheckerError>,
}

impl fmt::Display for CheckerErrors {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    for (i, err) in self.errors.iter().enumerate() {
      if i > 0 {
        write!(fmt, "; ")?;
      }
      write!(fmt, "{}", err)?;
    }
    Ok(())
  }
}

//=============================================================================
// Arrays

/// The components of the final storage that `id` occupies.
fn final_components(range: &ArrayLiveRange, entry: &ArrayRemapping) -> WriteMask {
  if entry.is_valid() {
    entry.map_writemask(range.access_mask())
  } else {
    range.access_mask()
  }
}

fn check_component_map(
  id: u32, entry: &ArrayRemapping, errors: &mut Vec<CheckerError>,
) {
  let mut taken = WriteMask::NONE;
  for comp in entry.original_access_mask().components() {
    let lane = entry.map_writemask(WriteMask::component(comp));
    let ok = lane.count() == 1
      && !lane.intersects(taken)
      && lane == WriteMask::component(entry.map_one_swizzle(comp));
    if !ok {
      errors.push(CheckerError::BadComponentMap { array: id, component: comp });
    }
    taken = taken.union(lane);
  }
}

/// `ranges` are the live ranges as reported by the liveness pass, in array
/// id order; `map` the finalized remapping indexed by array id.
pub fn check_array_remapping(
  ranges: &[ArrayLiveRange], map: &[ArrayRemapping],
) -> Result<(), CheckerErrors> {
  let mut errors = Vec::new();
  assert!(map.len() == ranges.len() + 1);

  // Final storage -> arrays living in it.
  let mut groups: Map<u32, Vec<usize>> = Map::default();

  for (i, range) in ranges.iter().enumerate() {
    let id = range.id();
    let entry = &map[id as usize];
    if !entry.is_valid() {
      groups.entry(id).or_insert_with(Vec::new).push(i);
      continue;
    }
    let target = entry.target_id();
    if !entry.is_finalized() || map[target as usize].is_valid() {
      errors.push(CheckerError::UnresolvedChain { array: id, target });
      continue;
    }
    if entry.reswizzles() {
      check_component_map(id, entry, &mut errors);
    }
    groups.entry(target).or_insert_with(Vec::new).push(i);
  }

  let mut targets: Vec<&u32> = groups.keys().collect();
  targets.sort();
  for target in targets {
    let members = &groups[target];
    for (n, &a) in members.iter().enumerate() {
      for &b in &members[n + 1..] {
        let (ra, rb) = (&ranges[a], &ranges[b]);
        let ca = final_components(ra, &map[ra.id() as usize]);
        let cb = final_components(rb, &map[rb.id() as usize]);
        if !ra.time_doesnt_overlap(rb) && ca.intersects(cb) {
          errors.push(CheckerError::ArraysCollide {
            first: ra.id(),
            second: rb.id(),
            target: *target,
          });
        }
      }
    }
  }

  if errors.is_empty() {
    Ok(())
  } else {
    Err(CheckerErrors { errors })
  }
}

//=============================================================================
// Temporaries

fn overlaps(a: &Lifetime, b: &Lifetime) -> bool {
  a.begin < b.end && b.begin < a.end
}

pub fn check_temp_remapping(
  lifetimes: &[Lifetime], remapping: &[Option<u32>],
) -> Result<(), CheckerErrors> {
  let mut errors = Vec::new();
  let mut groups: Map<u32, Vec<u32>> = Map::default();
  for (i, lt) in lifetimes.iter().enumerate() {
    if lt.is_unused() {
      continue;
    }
    let reg = remapping.get(i).copied().flatten().unwrap_or(i as u32);
    groups.entry(reg).or_insert_with(Vec::new).push(i as u32);
  }

  let mut regs: Vec<&u32> = groups.keys().collect();
  regs.sort();
  for reg in regs {
    let members = &groups[reg];
    for (n, &a) in members.iter().enumerate() {
      for &b in &members[n + 1..] {
        if overlaps(&lifetimes[a as usize], &lifetimes[b as usize]) {
          errors.push(CheckerError::TempsCollide { first: a, second: b, reg: *reg });
        }
      }
    }
  }

  if errors.is_empty() {
    Ok(())
  } else {
    Err(CheckerErrors { errors })
  }
}

/// Runs all checks.
pub(crate) fn check_merge_result(
  temps: &[Lifetime], temp_remapping: &[Option<u32>], arrays: &[ArrayLiveRange],
  array_remapping: &[ArrayRemapping],
) -> Result<(), CheckerErrors> {
  info!("check_merge_result: begin");
  let temp_result = check_temp_remapping(temps, temp_remapping);
  let array_result = check_array_remapping(arrays, array_remapping);

  let mut errors = Vec::new();
  for result in vec![temp_result, array_result] {
    if let Err(mut e) = result {
      errors.append(&mut e.errors);
    }
  }
  for e in &errors {
    debug!("checker: {}", e);
  }
  info!("check_merge_result: end ({} errors)", errors.len());
  if errors.is_empty() {
    Ok(())
  } else {
    Err(CheckerErrors { errors })
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn range(id: u32, begin: i32, end: i32, mask: WriteMask) -> ArrayLiveRange {
    ArrayLiveRange::new(id, 4, begin, end, mask)
  }

  #[test]
  fn good_remapping_passes() {
    let ranges = vec![
      range(1, 1, 5, WriteMask::X),
      range(2, 6, 7, WriteMask::X),
      range(3, 1, 5, WriteMask::X),
    ];
    let mut map = vec![
      ArrayRemapping::default(),
      ArrayRemapping::default(),
      ArrayRemapping::merge(1, WriteMask::X),
      ArrayRemapping::interleave(1, WriteMask::X, WriteMask::X),
    ];
    map[2].finalize_through(&ArrayRemapping::default());
    map[3].finalize_through(&ArrayRemapping::default());
    assert!(check_array_remapping(&ranges, &map).is_ok());
  }

  #[test]
  fn colliding_arrays_are_reported() {
    let ranges = vec![range(1, 1, 5, WriteMask::X), range(2, 3, 7, WriteMask::XY)];
    let mut map = vec![
      ArrayRemapping::default(),
      ArrayRemapping::default(),
      ArrayRemapping::merge(1, WriteMask::XY),
    ];
    map[2].finalize_through(&ArrayRemapping::default());
    let errs = check_array_remapping(&ranges, &map).unwrap_err();
    assert_eq!(
      errs.errors,
      vec![CheckerError::ArraysCollide { first: 1, second: 2, target: 1 }]
    );
  }

  #[test]
  fn chains_are_reported() {
    let ranges = vec![
      range(1, 1, 2, WriteMask::X),
      range(2, 3, 4, WriteMask::X),
      range(3, 5, 6, WriteMask::X),
    ];
    let map = vec![
      ArrayRemapping::default(),
      ArrayRemapping::default(),
      ArrayRemapping::merge(1, WriteMask::X),
      ArrayRemapping::merge(2, WriteMask::X),
    ];
    let errs = check_array_remapping(&ranges, &map).unwrap_err();
    assert!(errs
      .errors
      .contains(&CheckerError::UnresolvedChain { array: 3, target: 2 }));
  }

  #[test]
  fn temp_collisions() {
    let lts = vec![
      Lifetime::new(0, 2),
      Lifetime::new(2, 4),
      Lifetime::new(3, 5),
      Lifetime::UNUSED,
    ];
    assert!(check_temp_remapping(&lts, &[None, Some(0), None, Some(0)]).is_ok());
    let errs =
      check_temp_remapping(&lts, &[None, Some(0), Some(0), None]).unwrap_err();
    assert_eq!(
      errs.errors,
      vec![CheckerError::TempsCollide { first: 1, second: 2, reg: 0 }]
    );
  }
}
