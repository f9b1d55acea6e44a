/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Implements fuzzing primitives for programs.
//!
//! Generated programs use well nested control flow and stay within what the
//! interpreter can run the same way before and after merging:
//!
//!   - array destinations are only written by operations that work lane by
//!     lane, and by single destination operations;
//!   - indirect array accesses go through `ADDR[0].x`, which is set to zero at
//!     the start, with an index inside the array;
//!   - breaks leave a switch case only as its last instruction, and leave a
//!     loop only from within the loop's own body or an IF inside it;
//!   - there is no CONT.

use arbitrary::{Arbitrary, Result, Unstructured};
use std::fmt;

use regmerge::{
  DstReg, Inst, Opcode, Program, RegFile, SrcReg, Swizzle, WriteMask,
};

pub const NUM_TEMPS: u8 = 8;
pub const MAX_ARRAYS: u8 = 4;
const MAX_ARRAY_LEN: u8 = 4;
const MAX_DEPTH: u32 = 3;
const MAX_INSTS: usize = 96;
const NUM_INPUTS: u8 = 4;
const NUM_OUTPUTS: u8 = 4;

/// What a BRK at the current position would leave.
#[derive(Clone, Copy, PartialEq)]
enum Breakable {
  None,
  Loop,
  Case,
}

struct FuzzingEnv {
  array_sizes: Vec<u32>,
  insts: Vec<Inst>,
}

impl FuzzingEnv {
  fn full(&self) -> bool {
    self.insts.len() >= MAX_INSTS
  }

  fn swizzle(&self, u: &mut Unstructured) -> Result<Swizzle> {
    let mut lanes = [0u8; 4];
    for lane in lanes.iter_mut() {
      *lane = u8::arbitrary(u)? % 4;
    }
    Ok(Swizzle::new(lanes))
  }

  fn writemask(&self, u: &mut Unstructured) -> Result<WriteMask> {
    Ok(WriteMask::from_bits(1 + u8::arbitrary(u)? % 15))
  }

  fn temp_index(&self, u: &mut Unstructured) -> Result<i32> {
    Ok((u8::arbitrary(u)? % NUM_TEMPS) as i32)
  }

  /// An array element, maybe addressed through `ADDR[0].x`.
  fn array_elem(&self, u: &mut Unstructured) -> Result<(u32, i32, bool)> {
    let id = 1 + u8::arbitrary(u)? as usize % self.array_sizes.len();
    let len = self.array_sizes[id - 1];
    let index = (u8::arbitrary(u)? as u32 % len) as i32;
    Ok((id as u32, index, bool::arbitrary(u)?))
  }

  fn addr() -> SrcReg {
    SrcReg::new(RegFile::Addr, 0).swz(Swizzle::replicate(0))
  }

  fn src(&self, u: &mut Unstructured) -> Result<SrcReg> {
    let src = match u8::arbitrary(u)? % 8 {
      0 | 1 | 2 => SrcReg::temp(self.temp_index(u)?),
      3 | 4 => SrcReg::input((u8::arbitrary(u)? % NUM_INPUTS) as i32),
      5 => SrcReg::imm((u8::arbitrary(u)? % 16) as i32),
      _ => {
        if self.array_sizes.is_empty() {
          SrcReg::temp(self.temp_index(u)?)
        } else {
          let (id, index, indirect) = self.array_elem(u)?;
          let src = SrcReg::array(id, index);
          if indirect {
            src.rel(Self::addr())
          } else {
            src
          }
        }
      }
    };
    Ok(src.swz(self.swizzle(u)?))
  }

  /// A source for a branch condition or a switch selector.
  fn cond(&self, u: &mut Unstructured) -> Result<SrcReg> {
    let src = match u8::arbitrary(u)? % 4 {
      0 => SrcReg::temp(self.temp_index(u)?),
      1 => SrcReg::imm((u8::arbitrary(u)? % 4) as i32),
      _ => SrcReg::input((u8::arbitrary(u)? % NUM_INPUTS) as i32),
    };
    Ok(src.swz(Swizzle::replicate(u8::arbitrary(u)? % 4)))
  }

  fn dst(&self, u: &mut Unstructured, allow_array: bool) -> Result<DstReg> {
    let dst = match u8::arbitrary(u)? % 6 {
      0 if allow_array && !self.array_sizes.is_empty() => {
        let (id, index, indirect) = self.array_elem(u)?;
        let dst = DstReg::array(id, index);
        if indirect {
          dst.rel(Self::addr())
        } else {
          dst
        }
      }
      1 => DstReg::output((u8::arbitrary(u)? % NUM_OUTPUTS) as i32),
      _ => DstReg::temp(self.temp_index(u)?),
    };
    Ok(dst.mask(self.writemask(u)?))
  }

  fn plain_inst(&self, u: &mut Unstructured) -> Result<Inst> {
    const LANEWISE: &[(Opcode, usize)] = &[
      (Opcode::Mov, 1),
      (Opcode::Add, 2),
      (Opcode::Sub, 2),
      (Opcode::Mul, 2),
      (Opcode::Mad, 3),
      (Opcode::Min, 2),
      (Opcode::Max, 2),
      (Opcode::Slt, 2),
      (Opcode::USeq, 2),
      (Opcode::UCmp, 3),
    ];
    const NUM_VARIANTS: u8 = 4;

    let inst = match u8::arbitrary(u)? % NUM_VARIANTS {
      0 | 1 => {
        let (op, nsrc) = LANEWISE[u8::arbitrary(u)? as usize % LANEWISE.len()];
        let mut inst = Inst::new(op).with_dst(self.dst(u, true)?);
        for _ in 0..nsrc {
          inst = inst.with_src(self.src(u)?);
        }
        inst
      }
      2 => {
        if bool::arbitrary(u)? {
          Inst::new(Opcode::Dp4)
            .with_dst(self.dst(u, false)?)
            .with_src(self.src(u)?)
            .with_src(self.src(u)?)
        } else {
          Inst::new(Opcode::DFracExp)
            .with_dst(self.dst(u, false)?)
            .with_dst(self.dst(u, false)?)
            .with_src(self.src(u)?)
        }
      }
      3 => {
        let mut inst = Inst::new(Opcode::Tex)
          .with_dst(self.dst(u, false)?)
          .with_src(self.src(u)?);
        for _ in 0..u8::arbitrary(u)? % 3 {
          inst = inst.with_tex_offset(self.src(u)?);
        }
        inst
      }
      x => {
        debug_assert!(x < NUM_VARIANTS, "update NUM_VARIANTS above");
        unreachable!()
      }
    };
    Ok(inst)
  }

  fn ctrl(&mut self, op: Opcode) {
    self.insts.push(Inst::new(op));
  }

  fn with_cond(&mut self, op: Opcode, u: &mut Unstructured) -> Result<()> {
    let cond = self.cond(u)?;
    self.insts.push(Inst::new(op).with_src(cond));
    Ok(())
  }

  /// Emits a sequence of statements.
  fn body(
    &mut self, u: &mut Unstructured, depth: u32, brk: Breakable,
  ) -> Result<()> {
    const NUM_VARIANTS: u8 = 9;

    let num_stmts = u8::arbitrary(u)? % 6;
    for _ in 0..num_stmts {
      if self.full() {
        break;
      }
      match u8::arbitrary(u)? % NUM_VARIANTS {
        0..=4 => {
          let inst = self.plain_inst(u)?;
          self.insts.push(inst);
        }
        5 if depth < MAX_DEPTH => {
          self.ctrl(Opcode::BgnLoop);
          self.body(u, depth + 1, Breakable::Loop)?;
          self.ctrl(Opcode::EndLoop);
        }
        6 if depth < MAX_DEPTH => {
          let op = if bool::arbitrary(u)? { Opcode::If } else { Opcode::UIf };
          self.with_cond(op, u)?;
          // Only loops may be left from inside an IF.
          let inner = if brk == Breakable::Loop { brk } else { Breakable::None };
          self.body(u, depth + 1, inner)?;
          if bool::arbitrary(u)? {
            self.ctrl(Opcode::Else);
            self.body(u, depth + 1, inner)?;
          }
          self.ctrl(Opcode::EndIf);
        }
        7 if depth < MAX_DEPTH => self.switch(u, depth)?,
        8 if brk == Breakable::Loop => self.ctrl(Opcode::Brk),
        _ => {}
      }
    }
    Ok(())
  }

  fn switch(&mut self, u: &mut Unstructured, depth: u32) -> Result<()> {
    self.with_cond(Opcode::Switch, u)?;
    let num_cases = u8::arbitrary(u)? % 4;
    for _ in 0..num_cases {
      let label = SrcReg::imm((u8::arbitrary(u)? % 4) as i32)
        .swz(Swizzle::replicate(0));
      self.insts.push(Inst::new(Opcode::Case).with_src(label));
      self.body(u, depth + 1, Breakable::Case)?;
      if bool::arbitrary(u)? {
        self.ctrl(Opcode::Brk);
      }
    }
    if bool::arbitrary(u)? {
      self.ctrl(Opcode::Default);
      self.body(u, depth + 1, Breakable::Case)?;
      if bool::arbitrary(u)? {
        self.ctrl(Opcode::Brk);
      }
    }
    self.ctrl(Opcode::EndSwitch);
    Ok(())
  }
}

/// A generated program.  Fuzz targets take this and unwrap it.
#[derive(Clone)]
pub struct ArbitraryProgram(pub Program);

impl fmt::Debug for ArbitraryProgram {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    fmt::Debug::fmt(&self.0, fmt)
  }
}

impl<'a> Arbitrary<'a> for ArbitraryProgram {
  fn arbitrary(u: &mut Unstructured<'a>) -> Result<ArbitraryProgram> {
    let num_arrays = u8::arbitrary(u)? % (MAX_ARRAYS + 1);
    let mut array_sizes = Vec::with_capacity(num_arrays as usize);
    for _ in 0..num_arrays {
      array_sizes.push(1 + (u8::arbitrary(u)? % MAX_ARRAY_LEN) as u32);
    }

    let mut env = FuzzingEnv { array_sizes, insts: Vec::new() };
    env.insts.push(
      Inst::new(Opcode::Mov)
        .with_dst(DstReg::new(RegFile::Addr, 0).mask(WriteMask::X))
        .with_src(SrcReg::imm(0)),
    );
    env.body(u, 0, Breakable::None)?;
    env.ctrl(Opcode::End);

    Ok(ArbitraryProgram(Program::new(env.insts, env.array_sizes)))
  }
}
