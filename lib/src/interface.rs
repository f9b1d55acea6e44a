/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! The IR boundary: register files, write masks, swizzles, operands,
//! instructions and programs, as consumed and rewritten by the passes.
//!
//! Every register is a vector of four components (x, y, z, w).  A source
//! operand reads through a swizzle, which picks one component for each of
//! the four lanes; a destination operand writes the lanes selected by its
//! write mask.

use smallvec::SmallVec;
use std::fmt;

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

//=============================================================================
// Register files

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum RegFile {
  Undef,
  /// Temporaries; renamed by the temp renaming pass.
  Temp,
  /// Arrays, addressed by a 1-based array id; merged by the array merge pass.
  Array,
  Input,
  Output,
  Const,
  Imm,
  Addr,
}

impl RegFile {
  pub fn name(self) -> &'static str {
    match self {
      RegFile::Undef => "UNDEF",
      RegFile::Temp => "TEMP",
      RegFile::Array => "ARRAY",
      RegFile::Input => "IN",
      RegFile::Output => "OUT",
      RegFile::Const => "CONST",
      RegFile::Imm => "IMM",
      RegFile::Addr => "ADDR",
    }
  }

  pub fn from_name(name: &str) -> Option<RegFile> {
    Some(match name {
      "UNDEF" => RegFile::Undef,
      "TEMP" => RegFile::Temp,
      "ARRAY" => RegFile::Array,
      "IN" => RegFile::Input,
      "OUT" => RegFile::Output,
      "CONST" => RegFile::Const,
      "IMM" => RegFile::Imm,
      "ADDR" => RegFile::Addr,
      _ => return None,
    })
  }
}

//=============================================================================
// Write masks

/// A set of vector components, one bit per component (x = bit 0).
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct WriteMask(u8);

impl WriteMask {
  pub const NONE: WriteMask = WriteMask(0);
  pub const X: WriteMask = WriteMask(1);
  pub const Y: WriteMask = WriteMask(2);
  pub const Z: WriteMask = WriteMask(4);
  pub const W: WriteMask = WriteMask(8);
  pub const XY: WriteMask = WriteMask(3);
  pub const XYZ: WriteMask = WriteMask(7);
  pub const XYZW: WriteMask = WriteMask(0xf);

  pub fn from_bits(bits: u8) -> WriteMask {
    WriteMask(bits & 0xf)
  }
  pub fn component(comp: u8) -> WriteMask {
    debug_assert!(comp < 4);
    WriteMask(1 << comp)
  }
  pub fn bits(self) -> u8 {
    self.0
  }
  pub fn is_empty(self) -> bool {
    self.0 == 0
  }
  pub fn contains(self, comp: u8) -> bool {
    comp < 4 && self.0 & (1 << comp) != 0
  }
  pub fn count(self) -> u32 {
    self.0.count_ones()
  }
  pub fn union(self, other: WriteMask) -> WriteMask {
    WriteMask(self.0 | other.0)
  }
  pub fn intersects(self, other: WriteMask) -> bool {
    self.0 & other.0 != 0
  }
  /// The components in the mask, from x to w.
  pub fn components(self) -> impl Iterator<Item = u8> {
    let bits = self.0;
    (0..4u8).filter(move |c| bits & (1 << c) != 0)
  }
}

impl fmt::Debug for WriteMask {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    if self.is_empty() {
      return write!(fmt, "_");
    }
    for c in self.components() {
      write!(fmt, "{}", COMPONENT_NAMES[c as usize])?;
    }
    Ok(())
  }
}

pub const COMPONENT_NAMES: [char; 4] = ['x', 'y', 'z', 'w'];

pub fn component_from_name(c: char) -> Option<u8> {
  match c {
    'x' => Some(0),
    'y' => Some(1),
    'z' => Some(2),
    'w' => Some(3),
    _ => None,
  }
}

//=============================================================================
// Swizzles

/// Four lane selectors of three bits each; lane `i` reads component
/// `(bits >> 3 * i) & 7`.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Swizzle(u16);

impl Swizzle {
  pub const XYZW: Swizzle = Swizzle(0x688);

  pub fn new(lanes: [u8; 4]) -> Swizzle {
    let mut bits = 0u16;
    for (lane, comp) in lanes.iter().enumerate() {
      debug_assert!(*comp < 8);
      bits |= ((*comp & 7) as u16) << (3 * lane);
    }
    Swizzle(bits)
  }
  pub fn from_bits(bits: u16) -> Swizzle {
    Swizzle(bits & 0xfff)
  }
  pub fn replicate(comp: u8) -> Swizzle {
    Swizzle::new([comp; 4])
  }
  pub fn bits(self) -> u16 {
    self.0
  }
  pub fn get(self, lane: usize) -> u8 {
    ((self.0 >> (3 * lane)) & 7) as u8
  }
  pub fn lanes(self) -> [u8; 4] {
    [self.get(0), self.get(1), self.get(2), self.get(3)]
  }

  /// The set of components read through this swizzle.  Selectors outside
  /// x..w (constant zero/one selectors) don't read anything.
  pub fn read_mask(self) -> WriteMask {
    let mut bits = 0u8;
    for lane in 0..4 {
      let comp = self.get(lane);
      if comp < 4 {
        bits |= 1 << comp;
      }
    }
    WriteMask(bits)
  }
}

impl Default for Swizzle {
  fn default() -> Swizzle {
    Swizzle::XYZW
  }
}

impl fmt::Debug for Swizzle {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    for lane in 0..4 {
      let comp = self.get(lane) as usize;
      if comp < 4 {
        write!(fmt, "{}", COMPONENT_NAMES[comp])?;
      } else {
        write!(fmt, "?")?;
      }
    }
    Ok(())
  }
}

//=============================================================================
// Operands

#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct SrcReg {
  pub file: RegFile,
  pub index: i32,
  /// Second dimension index, for two-dimensional register files.
  pub index2d: Option<i32>,
  pub swizzle: Swizzle,
  pub reladdr: Option<Box<SrcReg>>,
  pub reladdr2: Option<Box<SrcReg>>,
  /// 1-based array id, only meaningful for `RegFile::Array`.
  pub array_id: u32,
}

#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct DstReg {
  pub file: RegFile,
  pub index: i32,
  pub index2d: Option<i32>,
  pub writemask: WriteMask,
  pub reladdr: Option<Box<SrcReg>>,
  pub reladdr2: Option<Box<SrcReg>>,
  pub array_id: u32,
}

impl SrcReg {
  pub fn new(file: RegFile, index: i32) -> SrcReg {
    SrcReg {
      file,
      index,
      index2d: None,
      swizzle: Swizzle::XYZW,
      reladdr: None,
      reladdr2: None,
      array_id: 0,
    }
  }
  pub fn temp(index: i32) -> SrcReg {
    SrcReg::new(RegFile::Temp, index)
  }
  pub fn input(index: i32) -> SrcReg {
    SrcReg::new(RegFile::Input, index)
  }
  pub fn imm(index: i32) -> SrcReg {
    SrcReg::new(RegFile::Imm, index)
  }
  pub fn array(array_id: u32, index: i32) -> SrcReg {
    assert!(array_id > 0, "array ids are 1-based");
    SrcReg { array_id, ..SrcReg::new(RegFile::Array, index) }
  }
  pub fn swz(mut self, swizzle: Swizzle) -> SrcReg {
    self.swizzle = swizzle;
    self
  }
  pub fn rel(mut self, reladdr: SrcReg) -> SrcReg {
    self.reladdr = Some(Box::new(reladdr));
    self
  }
  pub fn rel2(mut self, index2d: i32, reladdr2: Option<SrcReg>) -> SrcReg {
    self.index2d = Some(index2d);
    self.reladdr2 = reladdr2.map(Box::new);
    self
  }
}

impl DstReg {
  pub fn new(file: RegFile, index: i32) -> DstReg {
    DstReg {
      file,
      index,
      index2d: None,
      writemask: WriteMask::XYZW,
      reladdr: None,
      reladdr2: None,
      array_id: 0,
    }
  }
  pub fn temp(index: i32) -> DstReg {
    DstReg::new(RegFile::Temp, index)
  }
  pub fn output(index: i32) -> DstReg {
    DstReg::new(RegFile::Output, index)
  }
  pub fn array(array_id: u32, index: i32) -> DstReg {
    assert!(array_id > 0, "array ids are 1-based");
    DstReg { array_id, ..DstReg::new(RegFile::Array, index) }
  }
  pub fn mask(mut self, writemask: WriteMask) -> DstReg {
    self.writemask = writemask;
    self
  }
  pub fn rel(mut self, reladdr: SrcReg) -> DstReg {
    self.reladdr = Some(Box::new(reladdr));
    self
  }
  pub fn rel2(mut self, index2d: i32, reladdr2: Option<SrcReg>) -> DstReg {
    self.index2d = Some(index2d);
    self.reladdr2 = reladdr2.map(Box::new);
    self
  }
}

fn show_reg_access(
  fmt: &mut fmt::Formatter, file: RegFile, array_id: u32, index: i32,
  index2d: Option<i32>, reladdr: &Option<Box<SrcReg>>,
  reladdr2: &Option<Box<SrcReg>>,
) -> fmt::Result {
  write!(fmt, "{}", file.name())?;
  if file == RegFile::Array {
    write!(fmt, "({})", array_id)?;
  }
  if let Some(index2d) = index2d {
    write!(fmt, "[")?;
    if let Some(rel) = reladdr2 {
      write!(fmt, "{:?}+", rel)?;
    }
    write!(fmt, "{}]", index2d)?;
  }
  write!(fmt, "[")?;
  if let Some(rel) = reladdr {
    write!(fmt, "{:?}+", rel)?;
  }
  write!(fmt, "{}]", index)
}

impl fmt::Debug for SrcReg {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    show_reg_access(
      fmt,
      self.file,
      self.array_id,
      self.index,
      self.index2d,
      &self.reladdr,
      &self.reladdr2,
    )?;
    if self.swizzle != Swizzle::XYZW {
      write!(fmt, ".{:?}", self.swizzle)?;
    }
    Ok(())
  }
}

impl fmt::Debug for DstReg {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    show_reg_access(
      fmt,
      self.file,
      self.array_id,
      self.index,
      self.index2d,
      &self.reladdr,
      &self.reladdr2,
    )?;
    if self.writemask != WriteMask::XYZW {
      write!(fmt, ".{:?}", self.writemask)?;
    }
    Ok(())
  }
}

//=============================================================================
// Opcodes

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum Opcode {
  // Structured control flow.
  BgnLoop,
  EndLoop,
  If,
  UIf,
  Else,
  EndIf,
  Switch,
  Case,
  Default,
  EndSwitch,
  Brk,
  Cont,
  Cal,
  Ret,
  End,
  // Everything else is a plain read/write instruction.
  Nop,
  Mov,
  Add,
  Sub,
  Mul,
  Mad,
  Min,
  Max,
  Slt,
  USeq,
  UCmp,
  Dp4,
  DFracExp,
  Tex,
}

const OPCODE_NAMES: &[(Opcode, &str)] = &[
  (Opcode::BgnLoop, "BGNLOOP"),
  (Opcode::EndLoop, "ENDLOOP"),
  (Opcode::If, "IF"),
  (Opcode::UIf, "UIF"),
  (Opcode::Else, "ELSE"),
  (Opcode::EndIf, "ENDIF"),
  (Opcode::Switch, "SWITCH"),
  (Opcode::Case, "CASE"),
  (Opcode::Default, "DEFAULT"),
  (Opcode::EndSwitch, "ENDSWITCH"),
  (Opcode::Brk, "BRK"),
  (Opcode::Cont, "CONT"),
  (Opcode::Cal, "CAL"),
  (Opcode::Ret, "RET"),
  (Opcode::End, "END"),
  (Opcode::Nop, "NOP"),
  (Opcode::Mov, "MOV"),
  (Opcode::Add, "ADD"),
  (Opcode::Sub, "SUB"),
  (Opcode::Mul, "MUL"),
  (Opcode::Mad, "MAD"),
  (Opcode::Min, "MIN"),
  (Opcode::Max, "MAX"),
  (Opcode::Slt, "SLT"),
  (Opcode::USeq, "USEQ"),
  (Opcode::UCmp, "UCMP"),
  (Opcode::Dp4, "DP4"),
  (Opcode::DFracExp, "DFRACEXP"),
  (Opcode::Tex, "TEX"),
];

impl Opcode {
  pub fn name(self) -> &'static str {
    OPCODE_NAMES
      .iter()
      .find(|(op, _)| *op == self)
      .map(|(_, name)| *name)
      .unwrap_or("???")
  }

  pub fn from_name(name: &str) -> Option<Opcode> {
    OPCODE_NAMES.iter().find(|(_, n)| *n == name).map(|(op, _)| *op)
  }
}

//=============================================================================
// Instructions and programs

#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Inst {
  pub op: Opcode,
  pub dst: SmallVec<[DstReg; 2]>,
  pub src: SmallVec<[SrcReg; 3]>,
  pub tex_offsets: SmallVec<[SrcReg; 1]>,
}

impl Inst {
  pub fn new(op: Opcode) -> Inst {
    Inst {
      op,
      dst: SmallVec::new(),
      src: SmallVec::new(),
      tex_offsets: SmallVec::new(),
    }
  }
  pub fn with_dst(mut self, dst: DstReg) -> Inst {
    self.dst.push(dst);
    self
  }
  pub fn with_src(mut self, src: SrcReg) -> Inst {
    self.src.push(src);
    self
  }
  pub fn with_tex_offset(mut self, offset: SrcReg) -> Inst {
    self.tex_offsets.push(offset);
    self
  }
}

impl fmt::Debug for Inst {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    write!(fmt, "{}", self.op.name())?;
    for (i, dst) in self.dst.iter().enumerate() {
      write!(fmt, "{}{:?}", if i == 0 { " " } else { ", " }, dst)?;
    }
    if !self.dst.is_empty() {
      write!(fmt, " :=")?;
    }
    for (i, src) in self.src.iter().enumerate() {
      write!(fmt, "{}{:?}", if i == 0 { " " } else { ", " }, src)?;
    }
    if !self.tex_offsets.is_empty() {
      write!(fmt, "{}TEXOFS:", if self.src.is_empty() { " " } else { ", " })?;
      for (i, offset) in self.tex_offsets.iter().enumerate() {
        write!(fmt, "{}{:?}", if i == 0 { " " } else { ", " }, offset)?;
      }
    }
    Ok(())
  }
}

impl fmt::Display for Inst {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    fmt::Debug::fmt(self, fmt)
  }
}

/// A linear instruction stream, together with the number of temporaries it
/// may reference and the declared length of each array (array id `n` has
/// length `array_sizes[n - 1]`).
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Program {
  pub insts: Vec<Inst>,
  pub num_temps: usize,
  pub array_sizes: Vec<u32>,
}

impl Program {
  /// Builds a program, sizing the temporary file to cover every temporary
  /// index that is referenced.
  pub fn new(insts: Vec<Inst>, array_sizes: Vec<u32>) -> Program {
    let mut max_temp = -1;
    let mut note = |file: RegFile, index: i32| {
      if file == RegFile::Temp && index > max_temp {
        max_temp = index;
      }
    };
    for inst in &insts {
      for src in inst.src.iter().chain(inst.tex_offsets.iter()) {
        visit_src(src, &mut note);
      }
      for dst in &inst.dst {
        note(dst.file, dst.index);
        for rel in dst.reladdr.iter().chain(dst.reladdr2.iter()) {
          visit_src(rel, &mut note);
        }
      }
    }
    Program { insts, num_temps: (max_temp + 1) as usize, array_sizes }
  }

  pub fn num_arrays(&self) -> usize {
    self.array_sizes.len()
  }
}

fn visit_src<F: FnMut(RegFile, i32)>(src: &SrcReg, f: &mut F) {
  f(src.file, src.index);
  for rel in src.reladdr.iter().chain(src.reladdr2.iter()) {
    visit_src(rel, f);
  }
}

impl fmt::Debug for Program {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    if !self.array_sizes.is_empty() {
      write!(fmt, "ARRAYS")?;
      for (i, size) in self.array_sizes.iter().enumerate() {
        write!(fmt, "{}{}", if i == 0 { " " } else { ", " }, size)?;
      }
      writeln!(fmt)?;
    }
    for inst in &self.insts {
      writeln!(fmt, "  {:?}", inst)?;
    }
    Ok(())
  }
}

impl fmt::Display for Program {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    fmt::Debug::fmt(self, fmt)
  }
}
