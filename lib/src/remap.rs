/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Rewriting of array operands once the array remapping is known.

use log::{debug, info};

use crate::array_merge::ArrayRemapping;
use crate::interface::{Program, RegFile, SrcReg};

fn remap_src(src: &mut SrcReg, map: &[ArrayRemapping]) {
  if src.file == RegFile::Array && src.array_id > 0 {
    let m = &map[src.array_id as usize];
    if m.is_valid() {
      src.array_id = m.target_id();
      src.swizzle = m.map_swizzles(src.swizzle);
    }
  }
  for rel in src.reladdr.iter_mut().chain(src.reladdr2.iter_mut()) {
    remap_src(rel, map);
  }
}

/// Renumbers the surviving arrays densely, points every remapping entry at
/// the renumbered survivor, and rewrites all array operands of `program`
/// accordingly.  `map` must be finalized and is indexed by old array id; on
/// return every entry is valid and holds the new id of the array.  The size
/// table of the program is replaced and the new number of arrays returned.
#[inline(never)]
pub fn remap_arrays(program: &mut Program, map: &mut [ArrayRemapping]) -> usize {
  let narrays = program.array_sizes.len();
  assert!(map.len() == narrays + 1, "remapping doesn't match the arrays");

  let mut idx_map = vec![0u32; narrays + 1];
  let mut new_sizes = Vec::with_capacity(narrays);
  for i in 1..=narrays {
    if !map[i].is_valid() {
      new_sizes.push(program.array_sizes[i - 1]);
      idx_map[i] = new_sizes.len() as u32;
    }
  }

  for entry in map.iter_mut().skip(1) {
    if entry.is_valid() {
      debug_assert!(entry.is_finalized());
      let target = idx_map[entry.target_id() as usize];
      debug_assert!(target > 0, "array remapped onto a merged array");
      entry.set_target_id(target);
    }
  }
  for i in 1..=narrays {
    if idx_map[i] > 0 {
      map[i].set_target_id(idx_map[i]);
    }
  }

  for inst in program.insts.iter_mut() {
    for src in inst.src.iter_mut().chain(inst.tex_offsets.iter_mut()) {
      remap_src(src, map);
    }
    for j in 0..inst.dst.len() {
      let dst = &mut inst.dst[j];
      for rel in dst.reladdr.iter_mut().chain(dst.reladdr2.iter_mut()) {
        remap_src(rel, map);
      }
      if dst.file != RegFile::Array || dst.array_id == 0 {
        continue;
      }
      let m = map[dst.array_id as usize];
      if !m.is_valid() {
        continue;
      }
      assert!(j == 0, "arrays can only be remapped in single destination ops");
      dst.array_id = m.target_id();
      dst.writemask = m.map_writemask(dst.writemask);
      // The sources feeding the moved lanes move along.
      for src in inst.src.iter_mut() {
        src.swizzle = m.move_read_swizzles(src.swizzle);
      }
    }
  }

  info!("remap_arrays: {} -> {} arrays", narrays, new_sizes.len());
  debug!("remap_arrays: new sizes {:?}", new_sizes);
  program.array_sizes = new_sizes;
  program.array_sizes.len()
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::interface::{DstReg, Inst, Opcode, Swizzle, WriteMask};

  fn mov(dst: DstReg, src: SrcReg) -> Inst {
    Inst::new(Opcode::Mov).with_dst(dst).with_src(src)
  }

  #[test]
  fn survivors_are_renumbered() {
    let mut prog = Program::new(
      vec![
        mov(DstReg::array(2, 0), SrcReg::input(0)),
        mov(DstReg::array(3, 1), SrcReg::array(2, 0)),
        mov(DstReg::output(0), SrcReg::array(3, 1)),
      ],
      vec![4, 2, 3],
    );
    let mut map = vec![
      ArrayRemapping::default(),
      ArrayRemapping::merge(3, WriteMask::XYZW),
      ArrayRemapping::default(),
      ArrayRemapping::default(),
    ];
    map[1].finalize_through(&ArrayRemapping::default());
    assert_eq!(remap_arrays(&mut prog, &mut map), 2);
    assert_eq!(prog.array_sizes, vec![2, 3]);
    assert_eq!(map[1].target_id(), 2);
    assert_eq!(map[2].target_id(), 1);
    assert_eq!(map[3].target_id(), 2);
    assert_eq!(prog.insts[0].dst[0].array_id, 1);
    assert_eq!(prog.insts[1].dst[0].array_id, 2);
    assert_eq!(prog.insts[1].src[0].array_id, 1);
  }

  #[test]
  fn interleaved_destination_moves_sources() {
    // Array 2 (x) goes to the y lane of array 1.
    let mut prog = Program::new(
      vec![
        mov(DstReg::array(1, 0).mask(WriteMask::X), SrcReg::input(0)),
        mov(
          DstReg::array(2, 0).mask(WriteMask::X),
          SrcReg::input(1).swz(Swizzle::new([2, 2, 2, 2])),
        ),
        Inst::new(Opcode::Add)
          .with_dst(DstReg::output(0))
          .with_src(SrcReg::array(1, 0).swz(Swizzle::replicate(0)))
          .with_src(SrcReg::array(2, 0).swz(Swizzle::replicate(0))),
      ],
      vec![2, 2],
    );
    let mut map = vec![
      ArrayRemapping::default(),
      ArrayRemapping::default(),
      ArrayRemapping::interleave(1, WriteMask::X, WriteMask::X),
    ];
    map[2].finalize_through(&ArrayRemapping::default());
    assert_eq!(remap_arrays(&mut prog, &mut map), 1);

    let write = &prog.insts[1];
    assert_eq!(write.dst[0].array_id, 1);
    assert_eq!(write.dst[0].writemask, WriteMask::Y);
    assert_eq!(write.src[0].swizzle.get(1), 2);

    let read = &prog.insts[2];
    assert_eq!(read.src[0].swizzle, Swizzle::replicate(0));
    assert_eq!(read.src[1].array_id, 1);
    assert_eq!(read.src[1].swizzle, Swizzle::replicate(1));
  }
}
