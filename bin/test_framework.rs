/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! A reference interpreter for the shader IR, used to check that merging
//! registers doesn't change what a program computes.
//!
//! Every register holds four integer lanes.  A lane that was never written
//! is "undefined" (`None`); arithmetic on undefined lanes yields undefined
//! lanes, and only lanes that are defined before optimization are compared
//! afterwards.  Every loop runs a fixed number of iterations unless left by a
//! break, so all programs terminate.

use log::{debug, trace};
use rustc_hash::FxHashMap;
use std::fmt;

use regmerge::{DstReg, Inst, Opcode, Program, RegFile, SrcReg};

/// Number of iterations of every loop.
pub const LOOP_TRIPS: usize = 3;

/// Upper bound on executed instructions.
const MAX_STEPS: usize = 1_000_000;

pub type Lane = Option<i32>;
pub type Vec4 = [Lane; 4];

const UNDEF: Vec4 = [None; 4];

/// Value of lane `lane` of input register `index`.
pub fn input_value(index: i32, lane: usize) -> i32 {
  index.wrapping_mul(4).wrapping_add(lane as i32 + 1)
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum RunStage {
  BeforeMerge,
  AfterMerge,
}

impl fmt::Display for RunStage {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    match self {
      RunStage::BeforeMerge => write!(fmt, "before merging"),
      RunStage::AfterMerge => write!(fmt, "after merging"),
    }
  }
}

#[derive(Clone, Debug)]
pub struct RunResult {
  /// Output registers that were written, by index.
  pub outputs: Vec<(i32, Vec4)>,
  pub num_steps: usize,
}

//=============================================================================
// Control flow structure

/// For every instruction, where structured control flow goes from there.
#[derive(Clone, Copy, Debug)]
enum Link {
  None,
  /// BGNLOOP: index of the matching ENDLOOP.
  LoopEnd(usize),
  /// ENDLOOP, CONT: index of the matching BGNLOOP.
  LoopBegin(usize),
  /// IF, UIF: index of the ELSE or, without one, the ENDIF.
  IfFalse(usize),
  /// ELSE: index of the ENDIF.
  ElseEnd(usize),
  /// SWITCH: index of the ENDSWITCH.
  SwitchEnd(usize),
  /// BRK: index of the instruction after the loop or switch it leaves.
  BreakTo(usize),
}

enum Open {
  Loop(usize),
  If(usize),
  Else(usize),
  Switch(usize),
}

fn link_control_flow(prog: &Program) -> Result<(Vec<Link>, Vec<Vec<usize>>), String> {
  let n = prog.insts.len();
  let mut links = vec![Link::None; n];
  // For each SWITCH, its CASE and DEFAULT instructions.
  let mut labels = vec![Vec::new(); n];
  let mut stack: Vec<Open> = Vec::new();
  let mut breakable: Vec<usize> = Vec::new();
  let mut pending_breaks: Vec<Vec<usize>> = Vec::new();

  for (i, inst) in prog.insts.iter().enumerate() {
    match inst.op {
      Opcode::BgnLoop => {
        stack.push(Open::Loop(i));
        breakable.push(i);
        pending_breaks.push(Vec::new());
      }
      Opcode::Switch => {
        stack.push(Open::Switch(i));
        breakable.push(i);
        pending_breaks.push(Vec::new());
      }
      Opcode::EndLoop | Opcode::EndSwitch => {
        let begin = match (inst.op, stack.pop()) {
          (Opcode::EndLoop, Some(Open::Loop(b))) => {
            links[b] = Link::LoopEnd(i);
            links[i] = Link::LoopBegin(b);
            b
          }
          (Opcode::EndSwitch, Some(Open::Switch(b))) => {
            links[b] = Link::SwitchEnd(i);
            b
          }
          _ => return Err(format!("unbalanced {} at {}", inst.op.name(), i)),
        };
        debug_assert!(breakable.last() == Some(&begin));
        breakable.pop();
        for brk in pending_breaks.pop().unwrap_or_default() {
          links[brk] = Link::BreakTo(i + 1);
        }
      }
      Opcode::If | Opcode::UIf => stack.push(Open::If(i)),
      Opcode::Else => match stack.pop() {
        Some(Open::If(b)) => {
          links[b] = Link::IfFalse(i);
          stack.push(Open::Else(i));
        }
        _ => return Err(format!("ELSE without IF at {}", i)),
      },
      Opcode::EndIf => match stack.pop() {
        Some(Open::If(b)) => links[b] = Link::IfFalse(i),
        Some(Open::Else(b)) => links[b] = Link::ElseEnd(i),
        _ => return Err(format!("ENDIF without IF at {}", i)),
      },
      Opcode::Case | Opcode::Default => {
        let switch = stack.iter().rev().find_map(|o| match o {
          Open::Switch(b) => Some(*b),
          _ => None,
        });
        match switch {
          Some(b) => labels[b].push(i),
          None => return Err(format!("{} outside of SWITCH at {}", inst.op.name(), i)),
        }
      }
      Opcode::Brk => match pending_breaks.last_mut() {
        Some(list) => list.push(i),
        None => return Err(format!("BRK outside of loop or switch at {}", i)),
      },
      Opcode::Cont => {
        let lp = stack.iter().rev().find_map(|o| match o {
          Open::Loop(b) => Some(*b),
          _ => None,
        });
        match lp {
          Some(b) => links[i] = Link::LoopBegin(b),
          None => return Err(format!("CONT outside of loop at {}", i)),
        }
      }
      _ => {}
    }
  }
  if !stack.is_empty() {
    return Err("unterminated control flow".to_string());
  }
  Ok((links, labels))
}

//=============================================================================
// The interpreter

struct IState<'a> {
  prog: &'a Program,
  links: Vec<Link>,
  labels: Vec<Vec<usize>>,
  nia: usize, // next instruction address
  temps: Vec<Vec4>,
  arrays: Vec<Vec<Vec4>>,
  addrs: Vec<Vec4>,
  outputs: FxHashMap<i32, Vec4>,
  trips: Vec<usize>,
  n_insts: usize,
}

fn undefined(what: &str) -> String {
  format!("{} is undefined", what)
}

impl<'a> IState<'a> {
  fn new(prog: &'a Program) -> Result<Self, String> {
    let (links, labels) = link_control_flow(prog)?;
    Ok(IState {
      prog,
      links,
      labels,
      nia: 0,
      temps: vec![UNDEF; prog.num_temps],
      arrays: prog.array_sizes.iter().map(|len| vec![UNDEF; *len as usize]).collect(),
      addrs: Vec::new(),
      outputs: FxHashMap::default(),
      trips: vec![0; prog.insts.len()],
      n_insts: 0,
    })
  }

  fn scalar(&self, src: &SrcReg) -> Result<i32, String> {
    self.read_src(src)?[0].ok_or_else(|| undefined(&format!("{:?}", src)))
  }

  fn array_slot(&self, array_id: u32, index: i32, rel: Option<i32>) -> Result<(usize, usize), String> {
    let arr = array_id as usize;
    if arr == 0 || arr > self.arrays.len() {
      return Err(format!("array {} doesn't exist", array_id));
    }
    let elem = index.wrapping_add(rel.unwrap_or(0));
    if elem < 0 || elem as usize >= self.arrays[arr - 1].len() {
      return Err(format!("ARRAY({}) index {} out of bounds", array_id, elem));
    }
    Ok((arr - 1, elem as usize))
  }

  fn reladdr(&self, rel: &Option<Box<SrcReg>>) -> Result<Option<i32>, String> {
    match rel {
      Some(rel) => Ok(Some(self.scalar(rel)?)),
      None => Ok(None),
    }
  }

  fn read_reg(&self, src: &SrcReg) -> Result<Vec4, String> {
    let rel = self.reladdr(&src.reladdr)?;
    // The second dimension only selects among equal banks.
    self.reladdr(&src.reladdr2)?;
    let index = src.index.wrapping_add(rel.unwrap_or(0));
    Ok(match src.file {
      RegFile::Temp => {
        if rel.is_some() {
          return Err("indirect temporaries are not supported".to_string());
        }
        *self.temps.get(index as usize).ok_or_else(|| format!("TEMP[{}] doesn't exist", index))?
      }
      RegFile::Array => {
        let (arr, elem) = self.array_slot(src.array_id, src.index, rel)?;
        self.arrays[arr][elem]
      }
      RegFile::Input => {
        let mut v = UNDEF;
        for (lane, val) in v.iter_mut().enumerate() {
          *val = Some(input_value(index, lane));
        }
        v
      }
      RegFile::Imm | RegFile::Const => [Some(index); 4],
      RegFile::Addr => self.addrs.get(index as usize).copied().unwrap_or(UNDEF),
      RegFile::Output => self.outputs.get(&index).copied().unwrap_or(UNDEF),
      RegFile::Undef => UNDEF,
    })
  }

  fn read_src(&self, src: &SrcReg) -> Result<Vec4, String> {
    let reg = self.read_reg(src)?;
    let mut v = UNDEF;
    for (lane, val) in v.iter_mut().enumerate() {
      let comp = src.swizzle.get(lane) as usize;
      *val = if comp < 4 { reg[comp] } else { Some(0) };
    }
    Ok(v)
  }

  fn write_dst(&mut self, dst: &DstReg, value: Vec4) -> Result<(), String> {
    let rel = self.reladdr(&dst.reladdr)?;
    self.reladdr(&dst.reladdr2)?;
    let index = dst.index.wrapping_add(rel.unwrap_or(0));
    let slot: &mut Vec4 = match dst.file {
      RegFile::Temp => {
        if rel.is_some() {
          return Err("indirect temporaries are not supported".to_string());
        }
        self.temps.get_mut(index as usize).ok_or_else(|| format!("TEMP[{}] doesn't exist", index))?
      }
      RegFile::Array => {
        let (arr, elem) = self.array_slot(dst.array_id, dst.index, rel)?;
        &mut self.arrays[arr][elem]
      }
      RegFile::Addr => {
        if index < 0 {
          return Err(format!("ADDR[{}] doesn't exist", index));
        }
        if index as usize >= self.addrs.len() {
          self.addrs.resize(index as usize + 1, UNDEF);
        }
        &mut self.addrs[index as usize]
      }
      RegFile::Output => self.outputs.entry(index).or_insert(UNDEF),
      file => return Err(format!("can't write to {}", file.name())),
    };
    for comp in dst.writemask.components() {
      slot[comp as usize] = value[comp as usize];
    }
    Ok(())
  }

  fn componentwise<F>(&self, inst: &Inst, f: F) -> Result<Vec4, String>
  where
    F: Fn(&[i32]) -> i32,
  {
    let mut srcs = Vec::with_capacity(inst.src.len());
    for src in &inst.src {
      srcs.push(self.read_src(src)?);
    }
    let mut out = UNDEF;
    for lane in 0..4 {
      let args: Option<Vec<i32>> = srcs.iter().map(|s| s[lane]).collect();
      out[lane] = args.map(|a| f(&a));
    }
    Ok(out)
  }

  fn arity(inst: &Inst, n: usize) -> Result<(), String> {
    if inst.src.len() != n || inst.dst.is_empty() {
      return Err(format!("wrong operand count in '{}'", inst));
    }
    Ok(())
  }

  fn jump_to_case(&mut self, iix: usize) -> Result<(), String> {
    let value = self.scalar(&self.prog.insts[iix].src[0])?;
    let end = match self.links[iix] {
      Link::SwitchEnd(end) => end,
      _ => return Err(format!("SWITCH at {} has no end", iix)),
    };
    let mut default = None;
    for &label in &self.labels[iix] {
      let inst = &self.prog.insts[label];
      if inst.op == Opcode::Default {
        default = Some(label);
      } else if self.scalar(&inst.src[0])? == value {
        self.nia = label + 1;
        return Ok(());
      }
    }
    self.nia = default.unwrap_or(end) + 1;
    Ok(())
  }

  // Move the interpreter one step forward; returns whether the program is
  // done.
  fn step(&mut self) -> Result<bool, String> {
    let iix = self.nia;
    if iix >= self.prog.insts.len() {
      return Ok(true);
    }
    self.nia = iix + 1;
    self.n_insts += 1;
    if self.n_insts > MAX_STEPS {
      return Err("step limit exceeded".to_string());
    }

    let prog = self.prog;
    let inst = &prog.insts[iix];
    trace!("{:4}: {}", iix, inst);

    let value = match inst.op {
      Opcode::BgnLoop => {
        self.trips[iix] = 0;
        return Ok(false);
      }
      Opcode::EndLoop | Opcode::Cont => {
        if let Link::LoopBegin(b) = self.links[iix] {
          self.trips[b] += 1;
          if self.trips[b] < LOOP_TRIPS {
            self.nia = b + 1;
          } else if let Link::LoopEnd(end) = self.links[b] {
            self.nia = end + 1;
          }
        }
        return Ok(false);
      }
      Opcode::If | Opcode::UIf => {
        let cond = self.scalar(&inst.src[0])?;
        if cond == 0 {
          if let Link::IfFalse(target) = self.links[iix] {
            self.nia = target + 1;
          }
        }
        return Ok(false);
      }
      Opcode::Else => {
        if let Link::ElseEnd(end) = self.links[iix] {
          self.nia = end + 1;
        }
        return Ok(false);
      }
      Opcode::Switch => {
        self.jump_to_case(iix)?;
        return Ok(false);
      }
      Opcode::Brk => {
        if let Link::BreakTo(target) = self.links[iix] {
          self.nia = target;
        }
        return Ok(false);
      }
      Opcode::EndIf | Opcode::Case | Opcode::Default | Opcode::EndSwitch | Opcode::Nop => {
        return Ok(false);
      }
      Opcode::End => return Ok(true),
      Opcode::Cal | Opcode::Ret => {
        return Err(format!("{} is not supported", inst.op.name()))
      }
      Opcode::Mov => {
        Self::arity(inst, 1)?;
        self.componentwise(inst, |a| a[0])?
      }
      Opcode::Add => {
        Self::arity(inst, 2)?;
        self.componentwise(inst, |a| a[0].wrapping_add(a[1]))?
      }
      Opcode::Sub => {
        Self::arity(inst, 2)?;
        self.componentwise(inst, |a| a[0].wrapping_sub(a[1]))?
      }
      Opcode::Mul => {
        Self::arity(inst, 2)?;
        self.componentwise(inst, |a| a[0].wrapping_mul(a[1]))?
      }
      Opcode::Mad => {
        Self::arity(inst, 3)?;
        self.componentwise(inst, |a| a[0].wrapping_mul(a[1]).wrapping_add(a[2]))?
      }
      Opcode::Min => {
        Self::arity(inst, 2)?;
        self.componentwise(inst, |a| a[0].min(a[1]))?
      }
      Opcode::Max => {
        Self::arity(inst, 2)?;
        self.componentwise(inst, |a| a[0].max(a[1]))?
      }
      Opcode::Slt => {
        Self::arity(inst, 2)?;
        self.componentwise(inst, |a| (a[0] < a[1]) as i32)?
      }
      Opcode::USeq => {
        Self::arity(inst, 2)?;
        self.componentwise(inst, |a| if a[0] == a[1] { -1 } else { 0 })?
      }
      Opcode::UCmp => {
        Self::arity(inst, 3)?;
        // Only the selected operand has to be defined.
        let cond = self.read_src(&inst.src[0])?;
        let a = self.read_src(&inst.src[1])?;
        let b = self.read_src(&inst.src[2])?;
        let mut out = UNDEF;
        for lane in 0..4 {
          out[lane] = cond[lane].and_then(|c| if c != 0 { a[lane] } else { b[lane] });
        }
        out
      }
      Opcode::Dp4 => {
        Self::arity(inst, 2)?;
        let a = self.read_src(&inst.src[0])?;
        let b = self.read_src(&inst.src[1])?;
        let mut sum = Some(0i32);
        for lane in 0..4 {
          sum = match (sum, a[lane], b[lane]) {
            (Some(s), Some(x), Some(y)) => Some(s.wrapping_add(x.wrapping_mul(y))),
            _ => None,
          };
        }
        [sum; 4]
      }
      Opcode::DFracExp => {
        if inst.src.len() != 1 || inst.dst.len() != 2 {
          return Err(format!("wrong operand count in '{}'", inst));
        }
        let a = self.read_src(&inst.src[0])?;
        let mut frac = UNDEF;
        let mut exp = UNDEF;
        for lane in 0..4 {
          frac[lane] = a[lane].map(|x| x & 0xff);
          exp[lane] = a[lane].map(|x| x >> 8);
        }
        self.write_dst(&inst.dst[0], frac)?;
        self.write_dst(&inst.dst[1], exp)?;
        return Ok(false);
      }
      Opcode::Tex => {
        Self::arity(inst, 1)?;
        let mut v = self.read_src(&inst.src[0])?;
        for offset in &inst.tex_offsets {
          let o = self.read_src(offset)?;
          for lane in 0..4 {
            v[lane] = match (v[lane], o[lane]) {
              (Some(x), Some(y)) => Some(x.wrapping_add(y)),
              _ => None,
            };
          }
        }
        v
      }
    };

    for dst in &inst.dst {
      self.write_dst(dst, value)?;
    }
    Ok(false)
  }
}

/// Interprets `prog` and returns its outputs.  `who` only labels the log.
pub fn run_program(prog: &Program, who: &str, stage: RunStage) -> Result<RunResult, String> {
  debug!("running '{}' ({})", who, stage);
  let mut istate = IState::new(prog)?;
  while !istate.step()? {}

  let mut outputs: Vec<(i32, Vec4)> = istate.outputs.into_iter().collect();
  outputs.sort_by_key(|(i, _)| *i);
  debug!("running '{}' ({}): done, {} insts executed", who, stage, istate.n_insts);
  Ok(RunResult { outputs, num_steps: istate.n_insts })
}

/// Checks that the program after merging computes the same defined output
/// lanes as before.  A program that fails before merging reads undefined
/// data in a way that matters (an undefined branch condition or index), so
/// there is nothing to compare.
pub fn check_results(
  before: Result<RunResult, String>, after: Result<RunResult, String>,
) -> Result<(), String> {
  let before = match before {
    Ok(before) => before,
    Err(err) => {
      debug!("check_results: nothing to compare, original failed: {}", err);
      return Ok(());
    }
  };
  let after = after.map_err(|err| format!("merged program failed: {}", err))?;

  if before.num_steps != after.num_steps {
    return Err(format!(
      "different number of steps: {} before, {} after",
      before.num_steps, after.num_steps
    ));
  }
  for (index, value) in &before.outputs {
    let other = after
      .outputs
      .iter()
      .find(|(i, _)| i == index)
      .map(|(_, v)| *v)
      .unwrap_or(UNDEF);
    for lane in 0..4 {
      if value[lane].is_some() && value[lane] != other[lane] {
        return Err(format!(
          "OUT[{}] differs: {:?} before, {:?} after",
          index, value, other
        ));
      }
    }
  }
  Ok(())
}
