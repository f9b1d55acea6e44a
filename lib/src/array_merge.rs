/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Merging of array live ranges.
//!
//! Arrays whose live ranges don't overlap can share storage.  Arrays that are
//! live at the same time but together use at most four components can share
//! storage too, by moving the components of one of them into lanes the other
//! doesn't use ("interleaving").  This module computes, for every array, an
//! [ArrayRemapping] that says where its accesses go; rewriting the program is
//! done by `remap`.
//!
//! The search is greedy and quadratic in the number of arrays, which is
//! small in practice:
//!
//! * repeat until nothing changes: merge all pairs with identical access
//!   masks and disjoint live ranges, then commit the first interleave found;
//! * merge the remaining pairs with disjoint live ranges regardless of mask;
//! * resolve chains (`a -> b -> c`) so that every entry points at a survivor.
//!
//! In every merge the array with the shorter declared length is folded into
//! the longer one; on a tie the one that comes first in begin order is kept.

use log::{debug, info};
use std::fmt;

use crate::interface::{Swizzle, WriteMask, COMPONENT_NAMES};

//=============================================================================
// Live ranges

/// The live range of one array together with the components it uses.  Both
/// ends of the range are inclusive.
#[derive(Copy, Clone, PartialEq, Eq)]
#[cfg_attr(
  feature = "enable-serde",
  derive(serde::Serialize, serde::Deserialize)
)]
pub struct ArrayLiveRange {
  id: u32,
  length: u32,
  begin: i32,
  end: i32,
  mask: WriteMask,
}

impl ArrayLiveRange {
  pub fn new(
    id: u32, length: u32, begin: i32, end: i32, mask: WriteMask,
  ) -> Self {
    Self { id, length, begin, end, mask }
  }

  pub fn id(&self) -> u32 {
    self.id
  }
  pub fn length(&self) -> u32 {
    self.length
  }
  pub fn begin(&self) -> i32 {
    self.begin
  }
  pub fn end(&self) -> i32 {
    self.end
  }
  pub fn access_mask(&self) -> WriteMask {
    self.mask
  }
  pub fn used_components(&self) -> u32 {
    self.mask.count()
  }

  pub fn set_access_mask(&mut self, mask: WriteMask) {
    self.mask = mask;
  }

  /// Extends this range to cover `other` too.
  pub fn merge_lifetime(&mut self, other: &ArrayLiveRange) {
    self.begin = self.begin.min(other.begin);
    self.end = self.end.max(other.end);
  }

  pub fn time_doesnt_overlap(&self, other: &ArrayLiveRange) -> bool {
    other.end < self.begin || self.end < other.begin
  }
}

impl fmt::Debug for ArrayLiveRange {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    write!(
      fmt,
      "[id:{}, length:{}, ({}, {}), mask:{:?}]",
      self.id, self.length, self.begin, self.end, self.mask
    )
  }
}

//=============================================================================
// Remapping entries

/// Where the accesses to one array go after merging.  An entry with target 0
/// is "invalid": the array is not merged away.
#[derive(Copy, Clone)]
#[cfg_attr(
  feature = "enable-serde",
  derive(serde::Serialize, serde::Deserialize)
)]
pub struct ArrayRemapping {
  target_id: u32,
  reswizzle: bool,
  finalized: bool,
  summary_access_mask: WriteMask,
  original_src_access_mask: WriteMask,
  // Old component -> new component, -1 if the component is unused.
  read_swizzle_map: [i8; 4],
  // Old component -> new single bit write mask, 0 if unused.
  writemask_map: [u8; 4],
}

impl Default for ArrayRemapping {
  fn default() -> Self {
    Self {
      target_id: 0,
      reswizzle: false,
      finalized: true,
      summary_access_mask: WriteMask::NONE,
      original_src_access_mask: WriteMask::NONE,
      read_swizzle_map: [-1; 4],
      writemask_map: [0; 4],
    }
  }
}

impl ArrayRemapping {
  /// A plain merge: all accesses keep their components.
  pub fn merge(target_id: u32, src_access_mask: WriteMask) -> Self {
    assert!(target_id > 0);
    Self {
      target_id,
      finalized: false,
      summary_access_mask: src_access_mask,
      original_src_access_mask: src_access_mask,
      ..Self::default()
    }
  }

  /// Moves the components of a source array into the lanes of the target
  /// that `target_access_mask` leaves free, lowest free lane first.
  pub fn interleave(
    target_id: u32, target_access_mask: WriteMask, src_access_mask: WriteMask,
  ) -> Self {
    assert!(target_id > 0);
    let mut read_swizzle_map = [-1i8; 4];
    let mut writemask_map = [0u8; 4];
    let mut taken = target_access_mask.bits();
    let mut k = 0;
    for i in src_access_mask.components() {
      while k < 4 && taken & (1 << k) != 0 {
        k += 1;
      }
      assert!(k < 4, "interleaved array would need more than four components");
      read_swizzle_map[i as usize] = k as i8;
      writemask_map[i as usize] = 1 << k;
      taken |= 1 << k;
    }
    Self {
      target_id,
      reswizzle: true,
      finalized: false,
      summary_access_mask: WriteMask::from_bits(taken),
      original_src_access_mask: src_access_mask,
      read_swizzle_map,
      writemask_map,
    }
  }

  pub fn is_valid(&self) -> bool {
    self.target_id > 0
  }
  pub fn is_finalized(&self) -> bool {
    self.finalized
  }
  pub fn reswizzles(&self) -> bool {
    self.reswizzle
  }
  pub fn target_id(&self) -> u32 {
    self.target_id
  }
  pub fn set_target_id(&mut self, target_id: u32) {
    self.target_id = target_id;
  }
  pub fn original_access_mask(&self) -> WriteMask {
    self.original_src_access_mask
  }
  /// The components of the target that are in use once this entry applies.
  pub fn combined_access_mask(&self) -> WriteMask {
    self.summary_access_mask
  }

  pub fn map_writemask(&self, writemask: WriteMask) -> WriteMask {
    debug_assert!(self.is_valid());
    if !self.reswizzle {
      return writemask;
    }
    debug_assert!(
      writemask.is_empty() || writemask.intersects(self.original_src_access_mask)
    );
    let mut bits = 0;
    for i in writemask.components() {
      bits |= self.writemask_map[i as usize];
    }
    WriteMask::from_bits(bits)
  }

  /// Maps one component selector; constant selectors (>= 4) pass through.
  pub fn map_one_swizzle(&self, comp: u8) -> u8 {
    if !self.reswizzle || comp >= 4 {
      return comp;
    }
    let mapped = self.read_swizzle_map[comp as usize];
    assert!(mapped >= 0, "reading component {} that was never mapped", comp);
    mapped as u8
  }

  pub fn map_swizzles(&self, swizzle: Swizzle) -> Swizzle {
    if !self.reswizzle {
      return swizzle;
    }
    let mut lanes = swizzle.lanes();
    for lane in lanes.iter_mut() {
      *lane = self.map_one_swizzle(*lane);
    }
    Swizzle::new(lanes)
  }

  /// When the destination write mask of an instruction moves to other lanes,
  /// the source lanes feeding it have to move the same way: `dst.zw = src.xy`
  /// is really `dst.__zw = src.__xy`.
  pub fn move_read_swizzles(&self, swizzle: Swizzle) -> Swizzle {
    debug_assert!(self.is_valid());
    if !self.reswizzle {
      return swizzle;
    }
    let mut bits = 0u16;
    for (lane, new_lane) in self.read_swizzle_map.iter().enumerate() {
      if *new_lane >= 0 {
        bits |= (swizzle.get(lane) as u16) << (3 * *new_lane as u16);
      }
    }
    Swizzle::from_bits(bits)
  }

  /// Composes this entry with the (already final) entry of its target so
  /// that it points at a survivor.
  pub fn finalize_through(&mut self, forward: &ArrayRemapping) {
    debug_assert!(self.is_valid());
    if !forward.is_valid() {
      self.finalized = true;
      return;
    }
    debug_assert!(forward.is_finalized());

    if forward.reswizzle {
      if !self.reswizzle {
        for i in 0..4 {
          if self.original_src_access_mask.contains(i) {
            self.read_swizzle_map[i as usize] = i as i8;
            self.writemask_map[i as usize] = 1 << i;
          } else {
            self.read_swizzle_map[i as usize] = -1;
            self.writemask_map[i as usize] = 0;
          }
        }
        self.reswizzle = true;
      }
      for i in self.original_src_access_mask.components() {
        let i = i as usize;
        self.read_swizzle_map[i] =
          forward.map_one_swizzle(self.read_swizzle_map[i] as u8) as i8;
        self.writemask_map[i] = forward
          .map_writemask(WriteMask::from_bits(self.writemask_map[i]))
          .bits();
      }
    }

    self.target_id = forward.target_id;
    self.finalized = true;
  }
}

impl PartialEq for ArrayRemapping {
  fn eq(&self, other: &Self) -> bool {
    if self.target_id != other.target_id {
      return false;
    }
    if self.target_id == 0 {
      return true;
    }
    if self.reswizzle != other.reswizzle {
      return false;
    }
    if !self.reswizzle {
      return true;
    }
    if self.original_src_access_mask != other.original_src_access_mask {
      return false;
    }
    self.original_src_access_mask.components().all(|i| {
      let i = i as usize;
      self.writemask_map[i] == other.writemask_map[i]
        && self.read_swizzle_map[i] == other.read_swizzle_map[i]
    })
  }
}

impl fmt::Debug for ArrayRemapping {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    if !self.is_valid() {
      return write!(fmt, "[unused]");
    }
    write!(fmt, "[aid: {}", self.target_id)?;
    if self.reswizzle {
      write!(fmt, " write-swz: ")?;
      for i in 0..4 {
        let bits = self.writemask_map[i];
        if self.original_src_access_mask.contains(i as u8) && bits != 0 {
          write!(fmt, "{}", COMPONENT_NAMES[bits.trailing_zeros() as usize])?;
        } else {
          write!(fmt, "_")?;
        }
      }
      write!(fmt, ", read-swz: ")?;
      for i in 0..4 {
        let comp = self.read_swizzle_map[i];
        if self.original_src_access_mask.contains(i as u8) && comp >= 0 {
          write!(fmt, "{}", COMPONENT_NAMES[comp as usize])?;
        } else {
          write!(fmt, "_")?;
        }
      }
    }
    write!(fmt, "]")
  }
}

//=============================================================================
// The passes

fn sort_by_begin(ranges: &mut [ArrayLiveRange]) {
  // Stable, so that ties keep their input order.
  ranges.sort_by_key(|r| r.begin);
}

/// Folds `ranges[j]` into `ranges[i]` or the other way round, whichever is
/// shorter; afterwards `ranges[i]` is the target and `ranges[j]` the source.
fn order_target_and_source(ranges: &mut [ArrayLiveRange], i: usize, j: usize) {
  if ranges[i].length < ranges[j].length {
    ranges.swap(i, j);
  }
}

/// Arrays that are never accessed, and arrays already merged away, take no
/// part in further merges.
fn is_candidate(range: &ArrayLiveRange, remapping: &[ArrayRemapping]) -> bool {
  range.begin >= 0 && !remapping[range.id as usize].is_valid()
}

fn merge_with_equal_access_mask(
  ranges: &mut [ArrayLiveRange], remapping: &mut [ArrayRemapping],
) -> usize {
  sort_by_begin(ranges);
  let mut remaps = 0;
  for i in 0..ranges.len() {
    if !is_candidate(&ranges[i], remapping) {
      continue;
    }
    for j in i + 1..ranges.len() {
      if !is_candidate(&ranges[j], remapping) {
        continue;
      }
      if ranges[i].mask != ranges[j].mask
        || !ranges[i].time_doesnt_overlap(&ranges[j])
      {
        continue;
      }
      order_target_and_source(ranges, i, j);
      let (trgt, src) = (ranges[i], ranges[j]);
      remapping[src.id as usize] = ArrayRemapping::merge(trgt.id, src.mask);
      ranges[i].merge_lifetime(&src);
      debug!("merge (equal mask): {} -> {}", src.id, trgt.id);
      remaps += 1;
    }
  }
  remaps
}

fn interleave_arrays(
  ranges: &mut [ArrayLiveRange], remapping: &mut [ArrayRemapping],
) -> usize {
  for i in 0..ranges.len() {
    if !is_candidate(&ranges[i], remapping) {
      continue;
    }
    for j in i + 1..ranges.len() {
      if !is_candidate(&ranges[j], remapping) {
        continue;
      }
      if ranges[i].used_components() + ranges[j].used_components() > 4
        || ranges[i].time_doesnt_overlap(&ranges[j])
      {
        continue;
      }
      order_target_and_source(ranges, i, j);
      let (trgt, src) = (ranges[i], ranges[j]);
      let entry = ArrayRemapping::interleave(trgt.id, trgt.mask, src.mask);
      remapping[src.id as usize] = entry;
      ranges[i].merge_lifetime(&src);
      ranges[i].set_access_mask(entry.combined_access_mask());
      debug!("interleave: {} -> {} {:?}", src.id, trgt.id, entry);
      return 1;
    }
  }
  0
}

fn merge_arrays(
  ranges: &mut [ArrayLiveRange], remapping: &mut [ArrayRemapping],
) -> usize {
  sort_by_begin(ranges);
  let mut remaps = 0;
  for i in 0..ranges.len() {
    if !is_candidate(&ranges[i], remapping) {
      continue;
    }
    for j in i + 1..ranges.len() {
      if !is_candidate(&ranges[j], remapping) {
        continue;
      }
      if !ranges[i].time_doesnt_overlap(&ranges[j]) {
        continue;
      }
      order_target_and_source(ranges, i, j);
      let (trgt, src) = (ranges[i], ranges[j]);
      remapping[src.id as usize] = ArrayRemapping::merge(trgt.id, src.mask);
      ranges[i].merge_lifetime(&src);
      debug!("merge: {} -> {}", src.id, trgt.id);
      remaps += 1;
    }
  }
  remaps
}

/// Resolves every chain of merges so that valid entries point at arrays that
/// are not merged away themselves.
fn finalize_mappings(remapping: &mut [ArrayRemapping]) {
  for start in 1..remapping.len() {
    if !remapping[start].is_valid() || remapping[start].is_finalized() {
      continue;
    }
    let mut chain = vec![start];
    let mut cur = start;
    loop {
      let next = remapping[cur].target_id as usize;
      if !remapping[next].is_valid() || remapping[next].is_finalized() {
        break;
      }
      assert!(!chain.contains(&next), "cycle in array remapping at {}", next);
      chain.push(next);
      cur = next;
    }
    for &ix in chain.iter().rev() {
      let forward = remapping[remapping[ix].target_id as usize];
      remapping[ix].finalize_through(&forward);
    }
  }
}

/// Computes the remapping of all arrays.  `ranges` holds the live ranges of
/// arrays `1..=n` in any order; it is reordered and the ranges of merge
/// targets are widened as a side effect.  The result is indexed by array id
/// and has `n + 1` entries, entry 0 being unused.
#[inline(never)]
pub fn get_array_remapping(
  ranges: &mut [ArrayLiveRange],
) -> Vec<ArrayRemapping> {
  let n = ranges.len();
  info!("get_array_remapping: begin ({} arrays)", n);
  for r in ranges.iter() {
    assert!(
      r.id >= 1 && r.id as usize <= n,
      "array id {} out of range 1..={}",
      r.id,
      n
    );
  }

  let mut remapping = vec![ArrayRemapping::default(); n + 1];
  let mut total = 0;
  loop {
    let remapped = merge_with_equal_access_mask(ranges, &mut remapping)
      + interleave_arrays(ranges, &mut remapping);
    total += remapped;
    if remapped == 0 {
      break;
    }
  }
  total += merge_arrays(ranges, &mut remapping);

  finalize_mappings(&mut remapping);

  for (id, entry) in remapping.iter().enumerate().skip(1) {
    if entry.is_valid() {
      debug!("array {} => {:?}", id, entry);
    }
  }
  info!("get_array_remapping: end ({} arrays merged away)", total);
  remapping
}
