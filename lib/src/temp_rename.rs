/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Renaming of temporaries with disjoint lifetimes onto each other.

use log::{debug, info};

use crate::access::Lifetime;
use crate::interface::{DstReg, Program, RegFile, SrcReg};

#[derive(Clone, Copy, Debug)]
struct AccessRecord {
  begin: i32,
  end: i32,
  reg: u32,
  erase: bool,
}

/// Computes, for every temporary, the register it should be renamed to, or
/// `None` if it keeps its index.  Temporaries are taken in order of their
/// first write; each one in turn becomes a target that absorbs the next
/// temporary whose lifetime starts no earlier than the target's ends, until
/// nothing fits anymore.
pub fn get_temp_registers_remapping(lifetimes: &[Lifetime]) -> Vec<Option<u32>> {
  let mut result = vec![None; lifetimes.len()];

  let mut records: Vec<AccessRecord> = lifetimes
    .iter()
    .enumerate()
    .filter(|(_, lt)| lt.begin >= 0)
    .map(|(reg, lt)| AccessRecord {
      begin: lt.begin,
      end: lt.end,
      reg: reg as u32,
      erase: false,
    })
    .collect();
  records.sort_by_key(|r| r.begin);

  let mut trgt = 0;
  let mut search_start = 1;
  let mut first_erase: Option<usize> = None;

  while trgt < records.len() {
    let bound = records[trgt].end;
    let tail = &records[search_start.min(records.len())..];
    let src = search_start + tail.partition_point(|r| r.begin < bound);

    if src < records.len() {
      result[records[src].reg as usize] = Some(records[trgt].reg);
      records[trgt].end = records[src].end;
      // Only searching forward: mark it now, drop it when the target moves.
      records[src].erase = true;
      first_erase.get_or_insert(src);
      search_start = src + 1;
    } else {
      if let Some(first) = first_erase.take() {
        let kept: Vec<AccessRecord> =
          records.drain(first..).filter(|r| !r.erase).collect();
        records.extend(kept);
      }
      trgt += 1;
      search_start = trgt + 1;
    }
  }

  result
}

fn rename_src(src: &mut SrcReg, remapping: &[Option<u32>]) {
  if src.file == RegFile::Temp {
    if let Some(Some(reg)) = remapping.get(src.index as usize) {
      src.index = *reg as i32;
    }
  }
  for rel in src.reladdr.iter_mut().chain(src.reladdr2.iter_mut()) {
    rename_src(rel, remapping);
  }
}

fn rename_dst(dst: &mut DstReg, remapping: &[Option<u32>]) {
  if dst.file == RegFile::Temp {
    if let Some(Some(reg)) = remapping.get(dst.index as usize) {
      dst.index = *reg as i32;
    }
  }
  for rel in dst.reladdr.iter_mut().chain(dst.reladdr2.iter_mut()) {
    rename_src(rel, remapping);
  }
}

/// Applies a remapping computed by [get_temp_registers_remapping] to every
/// temporary operand of the program, indirect index operands included.
pub fn rename_temp_registers(program: &mut Program, remapping: &[Option<u32>]) {
  let renamed = remapping.iter().filter(|r| r.is_some()).count();
  info!("rename_temp_registers: {} temporaries renamed", renamed);
  for (from, to) in remapping.iter().enumerate() {
    if let Some(to) = to {
      debug!("rename TEMP[{}] -> TEMP[{}]", from, to);
    }
  }

  for inst in program.insts.iter_mut() {
    for src in inst.src.iter_mut().chain(inst.tex_offsets.iter_mut()) {
      rename_src(src, remapping);
    }
    for dst in inst.dst.iter_mut() {
      rename_dst(dst, remapping);
    }
  }
}
