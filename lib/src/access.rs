/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Access tracking for one temporary component, one temporary, and one
//! array.
//!
//! A `ComponentAccess` remembers the first and last read and write of a single
//! vector component together with the scopes they happened in.  Writes inside
//! if/else branches within a loop are paired up: a component written in both
//! branches of the same if/else is written unconditionally as far as the
//! enclosing loop is concerned, and then doesn't have to survive the whole
//! loop.  Pairing nests: an if/else pair that is fully written makes the write
//! count as happening in the enclosing branch, which may in turn pair up with
//! its sibling.  E.g. in
//!
//!   IF a        <- branch A
//!     IF b
//!       t = ...
//!     ELSE
//!       t = ...
//!     ENDIF
//!   ELSE        <- branch B
//!     IF c
//!       t = ...
//!     ELSE      <- branch C
//!       t = ...
//!     ENDIF
//!   ENDIF
//!
//! the write in C resolves the c pair, which completes B, which pairs with A.

use std::fmt;

use crate::data_structures::ScopeIx;
use crate::interface::WriteMask;
use crate::scope::{ScopeKind, ScopeTree};

/// The if/else pairing depth that is tracked; deeper nesting is treated as
/// conditional.
pub const SUPPORTED_IFELSE_NESTING_DEPTH: u32 = 32;

//=============================================================================
// Lifetimes

/// A half-open range of instruction lines `[begin, end)` in which a value must
/// be preserved.  Unused slots get `(-1, -1)`.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(
  feature = "enable-serde",
  derive(serde::Serialize, serde::Deserialize)
)]
pub struct Lifetime {
  pub begin: i32,
  pub end: i32,
}

impl Lifetime {
  pub const UNUSED: Lifetime = Lifetime { begin: -1, end: -1 };

  pub fn new(begin: i32, end: i32) -> Lifetime {
    Lifetime { begin, end }
  }
  pub fn is_unused(&self) -> bool {
    self.begin < 0
  }
}

impl fmt::Debug for Lifetime {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    write!(fmt, "({}, {})", self.begin, self.end)
  }
}

//=============================================================================
// Per-component access

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum Conditionality {
  /// No write in an if/else branch within a loop has been seen.
  Untouched,
  /// An if-branch write is waiting for the matching else-branch write.
  Unresolved,
  /// All if/else writes so far are paired up within the loop with this id.
  ResolvedInLoop(i32),
  /// The component is (or may be) written conditionally within a loop.
  Conditional,
}

#[derive(Clone, Debug)]
pub struct ComponentAccess {
  first_write: i32,
  first_write_scope: Option<ScopeIx>,
  last_write: i32,
  first_read: i32,
  first_read_scope: Option<ScopeIx>,
  last_read: i32,
  last_read_scope: Option<ScopeIx>,

  conditionality: Conditionality,
  // One bit per if/else nesting level with a pending if-branch write.
  if_scope_write_flags: u32,
  next_ifelse_nesting_depth: u32,
  current_unpaired_if_write_scope: Option<ScopeIx>,
  was_written_in_current_else_scope: bool,
}

impl Default for ComponentAccess {
  fn default() -> Self {
    ComponentAccess {
      first_write: -1,
      first_write_scope: None,
      last_write: -1,
      first_read: i32::MAX,
      first_read_scope: None,
      last_read: -1,
      last_read_scope: None,
      conditionality: Conditionality::Untouched,
      if_scope_write_flags: 0,
      next_ifelse_nesting_depth: 0,
      current_unpaired_if_write_scope: None,
      was_written_in_current_else_scope: false,
    }
  }
}

impl ComponentAccess {
  pub fn record_read(&mut self, scopes: &ScopeTree, line: i32, scope: ScopeIx) {
    self.last_read_scope = Some(scope);
    self.last_read = line;

    if self.first_read > line {
      self.first_read = line;
      self.first_read_scope = Some(scope);
    }

    // Only reads in an if/else branch within a loop are of interest here.
    let ifelse_scope = match scopes.in_ifelse_scope(scope) {
      Some(s) => s,
      None => return,
    };
    let enclosing_loop = match scopes.innermost_loop(ifelse_scope) {
      Some(l) => l,
      None => return,
    };

    match self.conditionality {
      Conditionality::Conditional => return,
      Conditionality::ResolvedInLoop(id) if id == scopes[enclosing_loop].id => {
        return
      }
      _ => {}
    }

    if let Some(unpaired) = self.current_unpaired_if_write_scope {
      // Written before in this scope or a parent: set at this point.
      if scopes.is_child_of(scope, unpaired) {
        return;
      }
      if scopes[ifelse_scope].kind == ScopeKind::IfBranch {
        if scopes[unpaired].id == scopes[scope].id {
          return;
        }
      } else if self.was_written_in_current_else_scope {
        return;
      }
    }

    // Read (conditionally) before the write: the value must survive the
    // loop, just like a conditionally written one.
    self.conditionality = Conditionality::Conditional;
  }

  pub fn record_write(
    &mut self, scopes: &ScopeTree, line: i32, scope: ScopeIx,
  ) {
    self.last_write = line;

    if self.first_write < 0 {
      self.first_write = line;
      self.first_write_scope = Some(scope);
    }

    if self.conditionality == Conditionality::Conditional {
      return;
    }

    if self.next_ifelse_nesting_depth >= SUPPORTED_IFELSE_NESTING_DEPTH {
      self.conditionality = Conditionality::Conditional;
      return;
    }

    if let Some(ifelse_scope) = scopes.in_ifelse_scope(scope) {
      if let Some(lp) = scopes.innermost_loop(ifelse_scope) {
        if self.conditionality
          != Conditionality::ResolvedInLoop(scopes[lp].id)
        {
          self.record_ifelse_write(scopes, ifelse_scope);
        }
      }
    }
  }

  fn record_ifelse_write(&mut self, scopes: &ScopeTree, scope: ScopeIx) {
    if scopes[scope].kind == ScopeKind::IfBranch {
      // The first write in an if-branch within a loop leaves the write
      // unresolved until the else-branch is seen.
      self.conditionality = Conditionality::Unresolved;
      self.was_written_in_current_else_scope = false;
      self.record_if_write(scopes, scope);
    } else {
      self.was_written_in_current_else_scope = true;
      self.record_else_write(scopes, scope);
    }
  }

  fn record_if_write(&mut self, scopes: &ScopeTree, scope: ScopeIx) {
    // Only the first write of a branch counts, and a write in a branch nested
    // in the else-branch of the pending if/else pair.
    let record = match self.current_unpaired_if_write_scope {
      None => true,
      Some(unpaired) => {
        scopes[unpaired].id != scopes[scope].id
          && scopes.is_child_of_ifelse_id_sibling(scope, unpaired)
      }
    };
    if record {
      self.if_scope_write_flags |= 1 << self.next_ifelse_nesting_depth;
      self.current_unpaired_if_write_scope = Some(scope);
      self.next_ifelse_nesting_depth += 1;
    }
  }

  fn record_else_write(&mut self, scopes: &ScopeTree, scope: ScopeIx) {
    let mask = match self.next_ifelse_nesting_depth {
      0 => 0,
      depth => 1u32 << (depth - 1),
    };

    let paired = match self.current_unpaired_if_write_scope {
      Some(unpaired) => {
        self.if_scope_write_flags & mask != 0
          && scopes[scope].id == scopes[unpaired].id
      }
      None => false,
    };

    if !paired {
      // The sibling if-branch wasn't written.
      self.conditionality = Conditionality::Conditional;
      return;
    }

    self.next_ifelse_nesting_depth -= 1;
    self.if_scope_write_flags &= !mask;

    let parent_ifelse =
      scopes.parent(scope).and_then(|p| scopes.in_ifelse_scope(p));

    let outer_pending = match self.next_ifelse_nesting_depth {
      0 => false,
      depth => self.if_scope_write_flags & (1 << (depth - 1)) != 0,
    };
    self.current_unpaired_if_write_scope =
      if outer_pending { parent_ifelse } else { None };

    match parent_ifelse {
      Some(p) if scopes.is_in_loop(p) => self.record_ifelse_write(scopes, p),
      _ => {
        self.conditionality = match scopes.innermost_loop(scope) {
          Some(lp) => Conditionality::ResolvedInLoop(scopes[lp].id),
          None => Conditionality::Conditional,
        }
      }
    }
  }

  fn conditional_ifelse_write_in_loop(&self) -> bool {
    match self.conditionality {
      Conditionality::Conditional | Conditionality::Unresolved => true,
      _ => false,
    }
  }

  pub fn required_lifetime(&self, scopes: &ScopeTree) -> Lifetime {
    // Never written: reads only see undefined values, nothing to preserve.
    if self.last_write < 0 {
      return Lifetime::UNUSED;
    }
    let first_write_scope = match self.first_write_scope {
      Some(s) => s,
      None => return Lifetime::UNUSED,
    };

    // Only written: keep it from the first to past the last write.
    let mut last_read_scope = match self.last_read_scope {
      Some(s) => s,
      None => return Lifetime::new(self.first_write, self.last_write + 1),
    };
    let first_read_scope = self.first_read_scope.unwrap_or(last_read_scope);

    let mut first_write = self.first_write;
    let mut last_read = self.last_read;
    let mut keep_for_full_loop = false;

    let mut enclosing_scope_first_read = first_read_scope;
    let mut enclosing_scope_first_write = first_write_scope;

    // Read before written in a loop: the value must survive the loop.
    if self.first_read <= self.first_write {
      if let Some(lp) = scopes.outermost_loop(first_read_scope) {
        keep_for_full_loop = true;
        enclosing_scope_first_read = lp;
      }
    }

    // A conditional write within a loop must survive the outermost loop if
    // the last read is not within the same conditional scope.
    if let Some(cond) = scopes.enclosing_conditional(enclosing_scope_first_write)
    {
      if !scopes.contains_range_of(cond, last_read_scope)
        && (scopes.is_switchcase_scope_in_loop(cond)
          || self.conditional_ifelse_write_in_loop())
      {
        if let Some(lp) = scopes.outermost_loop(cond) {
          keep_for_full_loop = true;
          enclosing_scope_first_write = lp;
        }
      }
    }

    // The scope shared by the first write, the first read before write, and
    // the last read.
    let mut enclosing_scope = enclosing_scope_first_read;
    if scopes.contains_range_of(enclosing_scope_first_write, enclosing_scope) {
      enclosing_scope = enclosing_scope_first_write;
    }
    if scopes.contains_range_of(last_read_scope, enclosing_scope) {
      enclosing_scope = last_read_scope;
    }
    while !scopes.contains_range_of(enclosing_scope, enclosing_scope_first_write)
      || !scopes.contains_range_of(enclosing_scope, last_read_scope)
    {
      enclosing_scope = match scopes.parent(enclosing_scope) {
        Some(p) => p,
        None => panic!("unclosed scope: no scope encloses all accesses"),
      };
    }
    let target_depth = scopes[enclosing_scope].depth;

    // Move the last read up to the shared scope.  Leaving a loop means the
    // value has to last until that loop ends.
    while target_depth < scopes[last_read_scope].depth {
      if scopes.is_loop(last_read_scope) {
        last_read = scopes[last_read_scope].end;
      }
      last_read_scope = match scopes.parent(last_read_scope) {
        Some(p) => p,
        None => break,
      };
    }

    let mut first_write_scope = first_write_scope;
    if keep_for_full_loop && scopes.is_loop(first_write_scope) {
      propagate_to_scope(
        scopes,
        first_write_scope,
        &mut first_write,
        &mut last_read,
      );
    }

    // Move the first write up to the shared scope.  A write that follows a
    // break in a loop we leave must survive that loop.
    while target_depth < scopes[first_write_scope].depth {
      if scopes[first_write_scope].loop_break_line < first_write {
        keep_for_full_loop = true;
        propagate_to_scope(
          scopes,
          first_write_scope,
          &mut first_write,
          &mut last_read,
        );
      }
      first_write_scope = match scopes.parent(first_write_scope) {
        Some(p) => p,
        None => break,
      };
      if keep_for_full_loop && scopes.is_loop(first_write_scope) {
        propagate_to_scope(
          scopes,
          first_write_scope,
          &mut first_write,
          &mut last_read,
        );
      }
    }

    // A dead store past the last read still must not be clobbered early.
    if self.last_write >= last_read {
      last_read = self.last_write + 1;
    }

    Lifetime::new(first_write, last_read)
  }
}

/// Widens `[first_write, last_read]` to cover all of `scope`.
fn propagate_to_scope(
  scopes: &ScopeTree, scope: ScopeIx, first_write: &mut i32,
  last_read: &mut i32,
) {
  *first_write = scopes[scope].begin;
  if *last_read < scopes[scope].end {
    *last_read = scopes[scope].end;
  }
}

//=============================================================================
// Per-temporary access

#[derive(Clone, Debug, Default)]
pub struct TempAccess {
  access_mask: WriteMask,
  needs_component_tracking: bool,
  comp: [ComponentAccess; 4],
}

impl TempAccess {
  fn update_access_mask(&mut self, mask: WriteMask) {
    if !self.access_mask.is_empty() && self.access_mask != mask {
      self.needs_component_tracking = true;
    }
    self.access_mask = self.access_mask.union(mask);
  }

  pub fn record_write(
    &mut self, scopes: &ScopeTree, line: i32, scope: ScopeIx,
    writemask: WriteMask,
  ) {
    self.update_access_mask(writemask);
    for c in writemask.components() {
      self.comp[c as usize].record_write(scopes, line, scope);
    }
  }

  pub fn record_read(
    &mut self, scopes: &ScopeTree, line: i32, scope: ScopeIx,
    readmask: WriteMask,
  ) {
    self.update_access_mask(readmask);
    for c in readmask.components() {
      self.comp[c as usize].record_read(scopes, line, scope);
    }
  }

  /// The union of the component lifetimes.  When every access used the same
  /// mask all components behave alike and only the first one is evaluated.
  pub fn required_lifetime(&self, scopes: &ScopeTree) -> Lifetime {
    let mut result = Lifetime::UNUSED;
    for c in self.access_mask.components() {
      let lt = self.comp[c as usize].required_lifetime(scopes);
      if lt.begin >= 0 && (result.begin < 0 || result.begin > lt.begin) {
        result.begin = lt.begin;
      }
      if lt.end > result.end {
        result.end = lt.end;
      }
      if !self.needs_component_tracking {
        break;
      }
    }
    result
  }
}

//=============================================================================
// Per-array access

/// Arrays are tracked as a whole: one range of lines plus the union of all
/// accessed components.
#[derive(Clone, Debug)]
pub struct ArrayAccess {
  first_access: i32,
  last_access: i32,
  first_access_scope: Option<ScopeIx>,
  last_access_scope: Option<ScopeIx>,
  conditional_write_in_loop: bool,
  accumulated_mask: WriteMask,
}

impl Default for ArrayAccess {
  fn default() -> Self {
    ArrayAccess {
      first_access: -1,
      last_access: -1,
      first_access_scope: None,
      last_access_scope: None,
      conditional_write_in_loop: false,
      accumulated_mask: WriteMask::NONE,
    }
  }
}

impl ArrayAccess {
  fn record_access(&mut self, line: i32, scope: ScopeIx, mask: WriteMask) {
    if self.first_access_scope.is_none() {
      self.first_access = line;
      self.first_access_scope = Some(scope);
    }
    self.last_access_scope = Some(scope);
    self.last_access = line;
    self.accumulated_mask = self.accumulated_mask.union(mask);
  }

  pub fn record_read(&mut self, line: i32, scope: ScopeIx, readmask: WriteMask) {
    self.record_access(line, scope, readmask);
  }

  pub fn record_write(
    &mut self, scopes: &ScopeTree, line: i32, scope: ScopeIx,
    writemask: WriteMask,
  ) {
    self.record_access(line, scope, writemask);
    if scopes.in_ifelse_scope(scope).is_some()
      && scopes.innermost_loop(scope).is_some()
    {
      self.conditional_write_in_loop = true;
    }
  }

  /// The closed range of lines the array must be kept, and the components
  /// that were accessed.
  pub fn required_lifetime(&self, scopes: &ScopeTree) -> (Lifetime, WriteMask) {
    let (mut shared_scope, mut other_scope) =
      match (self.first_access_scope, self.last_access_scope) {
        (Some(first), Some(last)) => (first, last),
        _ => return (Lifetime::UNUSED, WriteMask::NONE),
      };
    let mut first_access = self.first_access;
    let mut last_access = self.last_access;

    if self.conditional_write_in_loop {
      if let Some(lp) = scopes.outermost_loop(shared_scope) {
        shared_scope = lp;
      } else if let Some(lp) = scopes.outermost_loop(other_scope) {
        other_scope = lp;
      }
      first_access = first_access.min(scopes[shared_scope].begin);
      last_access = last_access.max(scopes[shared_scope].end);
    }

    if scopes.contains_range_of(other_scope, shared_scope) {
      shared_scope = other_scope;
    } else {
      while !scopes.contains_range_of(shared_scope, other_scope) {
        if scopes.is_loop(shared_scope) {
          last_access = last_access.max(scopes[shared_scope].end);
        }
        shared_scope = match scopes.parent(shared_scope) {
          Some(p) => p,
          None => panic!("unclosed scope: no scope encloses all accesses"),
        };
      }
    }

    while shared_scope != other_scope {
      if scopes.is_loop(other_scope) {
        last_access = last_access.max(scopes[other_scope].end);
      }
      other_scope = match scopes.parent(other_scope) {
        Some(p) => p,
        None => break,
      };
    }

    (Lifetime::new(first_access, last_access), self.accumulated_mask)
  }
}
