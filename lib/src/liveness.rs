/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! The liveness evaluator: a single forward scan over the instructions that
//! builds the scope tree, feeds every register access to the access trackers,
//! and finally asks each tracker for the lifetime it requires.

use log::{debug, info, trace};
use std::fmt;

use crate::access::{ArrayAccess, Lifetime, TempAccess};
use crate::array_merge::ArrayLiveRange;
use crate::data_structures::ScopeIx;
use crate::interface::{DstReg, Opcode, Program, RegFile, SrcReg};
use crate::scope::{ScopeKind, ScopeTree};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LivenessError {
  /// Subroutine calls and returns are not followed by the scan, so nothing
  /// reliable can be said about any register.
  UnsupportedOpcode { opcode: Opcode, line: i32 },
}

impl fmt::Display for LivenessError {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    match self {
      LivenessError::UnsupportedOpcode { opcode, line } => write!(
        fmt,
        "unsupported opcode {} at line {}: lifetimes can't be evaluated",
        opcode.name(),
        line
      ),
    }
  }
}

/// The lifetimes required by a program: one per temporary (indexed by the
/// temporary's index) and one live range per array (in array id order).
#[derive(Clone, Debug)]
pub struct Lifetimes {
  pub temps: Vec<Lifetime>,
  pub arrays: Vec<ArrayLiveRange>,
}

//=============================================================================
// Access recording

struct AccessRecorder {
  temps: Vec<TempAccess>,
  arrays: Vec<ArrayAccess>,
}

impl AccessRecorder {
  fn new(num_temps: usize, num_arrays: usize) -> Self {
    Self {
      temps: vec![TempAccess::default(); num_temps],
      arrays: vec![ArrayAccess::default(); num_arrays],
    }
  }

  fn temp(&mut self, index: i32) -> &mut TempAccess {
    assert!(
      index >= 0 && (index as usize) < self.temps.len(),
      "temporary {} out of range",
      index
    );
    &mut self.temps[index as usize]
  }

  fn array(&mut self, array_id: u32) -> &mut ArrayAccess {
    assert!(
      array_id > 0 && (array_id as usize) <= self.arrays.len(),
      "array id {} out of range",
      array_id
    );
    &mut self.arrays[array_id as usize - 1]
  }

  fn record_read(
    &mut self, scopes: &ScopeTree, src: &SrcReg, line: i32, scope: ScopeIx,
  ) {
    let readmask = src.swizzle.read_mask();
    match src.file {
      RegFile::Temp => {
        self.temp(src.index).record_read(scopes, line, scope, readmask)
      }
      RegFile::Array => {
        self.array(src.array_id).record_read(line, scope, readmask)
      }
      _ => {}
    }
    for rel in src.reladdr.iter().chain(src.reladdr2.iter()) {
      self.record_read(scopes, rel, line, scope);
    }
  }

  fn record_write(
    &mut self, scopes: &ScopeTree, dst: &DstReg, line: i32, scope: ScopeIx,
  ) {
    match dst.file {
      RegFile::Temp => {
        self.temp(dst.index).record_write(scopes, line, scope, dst.writemask)
      }
      RegFile::Array => self.array(dst.array_id).record_write(
        scopes,
        line,
        scope,
        dst.writemask,
      ),
      _ => {}
    }
    for rel in dst.reladdr.iter().chain(dst.reladdr2.iter()) {
      self.record_read(scopes, rel, line, scope);
    }
  }
}

//=============================================================================
// The scan

fn count_scopes(program: &Program) -> usize {
  1 + program
    .insts
    .iter()
    .filter(|inst| match inst.op {
      Opcode::BgnLoop
      | Opcode::Switch
      | Opcode::Case
      | Opcode::If
      | Opcode::UIf
      | Opcode::Else
      | Opcode::Default => true,
      _ => false,
    })
    .count()
}

fn parent_of(scopes: &ScopeTree, scope: ScopeIx, what: &str) -> ScopeIx {
  match scopes.parent(scope) {
    Some(p) => p,
    None => panic!("{} without an enclosing scope", what),
  }
}

/// Scans `program` and computes the lifetime of every temporary and the live
/// range of every array.  Fails if the program contains subroutine calls.
#[inline(never)]
pub fn compute_required_lifetimes(
  program: &Program,
) -> Result<Lifetimes, LivenessError> {
  info!(
    "compute_required_lifetimes: begin ({} insts, {} temps, {} arrays)",
    program.insts.len(),
    program.num_temps,
    program.num_arrays()
  );

  let mut line: i32 = 0;
  let mut loop_id = 1;
  let mut if_id = 1;
  let mut switch_id = 0;
  let mut is_at_end = false;

  let (mut scopes, mut cur) =
    ScopeTree::with_capacity(count_scopes(program), line);
  let mut access =
    AccessRecorder::new(program.num_temps, program.num_arrays());

  for inst in &program.insts {
    assert!(!is_at_end, "instructions past the END marker");
    trace!("{:4}: [{:?}] {:?}", line, scopes[cur], inst);

    match inst.op {
      Opcode::BgnLoop => {
        let depth = scopes[cur].depth + 1;
        cur = scopes.open(cur, ScopeKind::LoopBody, loop_id, depth, line);
        loop_id += 1;
      }
      Opcode::EndLoop => {
        assert!(scopes.is_loop(cur), "ENDLOOP at line {} closes no loop", line);
        scopes.close(cur, line);
        cur = parent_of(&scopes, cur, "ENDLOOP");
      }
      Opcode::If | Opcode::UIf => {
        assert!(inst.src.len() == 1, "IF takes exactly one source");
        access.record_read(&scopes, &inst.src[0], line, cur);
        let depth = scopes[cur].depth + 1;
        cur = scopes.open(cur, ScopeKind::IfBranch, if_id, depth, line + 1);
        if_id += 1;
      }
      Opcode::Else => {
        assert!(
          scopes[cur].kind == ScopeKind::IfBranch,
          "ELSE at line {} without IF",
          line
        );
        scopes.close(cur, line - 1);
        let (id, depth) = (scopes[cur].id, scopes[cur].depth);
        let parent = parent_of(&scopes, cur, "ELSE");
        cur = scopes.open(parent, ScopeKind::ElseBranch, id, depth, line + 1);
      }
      Opcode::EndIf => {
        assert!(
          scopes[cur].kind == ScopeKind::IfBranch
            || scopes[cur].kind == ScopeKind::ElseBranch,
          "ENDIF at line {} without IF",
          line
        );
        scopes.close(cur, line - 1);
        cur = parent_of(&scopes, cur, "ENDIF");
      }
      Opcode::End => {
        scopes.close(cur, line);
        is_at_end = true;
      }
      Opcode::Switch => {
        assert!(inst.src.len() == 1, "SWITCH takes exactly one source");
        let depth = scopes[cur].depth + 1;
        cur = scopes.open(cur, ScopeKind::SwitchBody, switch_id, depth, line);
        switch_id += 1;
        access.record_read(&scopes, &inst.src[0], line, cur);
      }
      Opcode::EndSwitch => {
        // The last case may not have been closed by a break.
        if scopes[cur].kind != ScopeKind::SwitchBody {
          scopes.close(cur, line - 1);
          cur = parent_of(&scopes, cur, "ENDSWITCH");
        }
        assert!(
          scopes[cur].kind == ScopeKind::SwitchBody,
          "ENDSWITCH at line {} without SWITCH",
          line
        );
        scopes.close(cur, line);
        cur = parent_of(&scopes, cur, "ENDSWITCH");
      }
      Opcode::Case | Opcode::Default => {
        let switch_scope = if scopes[cur].kind == ScopeKind::SwitchBody {
          cur
        } else {
          parent_of(&scopes, cur, "CASE")
        };
        assert!(
          scopes[switch_scope].kind == ScopeKind::SwitchBody,
          "{} at line {} outside of a switch",
          inst.op.name(),
          line
        );

        let kind = if inst.op == Opcode::Case {
          assert!(inst.src.len() == 1, "CASE takes exactly one source");
          access.record_read(&scopes, &inst.src[0], line, switch_scope);
          ScopeKind::SwitchCaseBranch
        } else {
          ScopeKind::SwitchDefaultBranch
        };

        let (id, depth) = (scopes[switch_scope].id, scopes[switch_scope].depth);
        let scope = scopes.open(switch_scope, kind, id, depth + 1, line);
        // The previous case falls through if it wasn't closed by a break.
        if cur != switch_scope {
          scopes.close(cur, line - 1);
        }
        cur = scope;
      }
      Opcode::Brk => {
        if scopes.break_is_for_switchcase(cur) {
          scopes.close(cur, line - 1);
        } else {
          scopes.record_loop_break(cur, line);
        }
      }
      Opcode::Cal | Opcode::Ret => {
        info!("compute_required_lifetimes: giving up at {}", inst.op.name());
        return Err(LivenessError::UnsupportedOpcode { opcode: inst.op, line });
      }
      _ => {
        for src in &inst.src {
          access.record_read(&scopes, src, line, cur);
        }
        for offset in &inst.tex_offsets {
          access.record_read(&scopes, offset, line, cur);
        }
        for dst in &inst.dst {
          access.record_write(&scopes, dst, line, cur);
        }
      }
    }
    line += 1;
  }

  // No END marker: close whatever is still open.
  if scopes[cur].end < 0 {
    scopes.close(cur, line - 1);
  }

  let temps: Vec<Lifetime> =
    access.temps.iter().map(|t| t.required_lifetime(&scopes)).collect();
  for (i, lt) in temps.iter().enumerate() {
    if !lt.is_unused() {
      debug!("temp {}: {:?}", i, lt);
    }
  }

  let arrays: Vec<ArrayLiveRange> = access
    .arrays
    .iter()
    .enumerate()
    .map(|(i, a)| {
      let (lt, mask) = a.required_lifetime(&scopes);
      let range = ArrayLiveRange::new(
        i as u32 + 1,
        program.array_sizes[i],
        lt.begin,
        lt.end,
        mask,
      );
      debug!("array {:?}", range);
      range
    })
    .collect();

  info!("compute_required_lifetimes: end ({} scopes)", scopes.len());
  Ok(Lifetimes { temps, arrays })
}
