/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! The scope tree built while scanning a program: one node per structured
//! control flow region (loop body, if branch, else branch, switch body and
//! case/default branches), plus the outer scope of the whole program.
//!
//! Scopes live in an arena owned by the `ScopeTree` and refer to their parent
//! by index.  The queries here answer the questions the access trackers ask
//! while resolving lifetimes: "is this read inside a loop", "which loop is the
//! outermost around this write", "is this if the sibling branch of that
//! else", and so on.

use std::fmt;

use crate::data_structures::{ScopeIx, TypedIxVec};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ScopeKind {
  Outer,
  LoopBody,
  IfBranch,
  ElseBranch,
  SwitchBody,
  SwitchCaseBranch,
  SwitchDefaultBranch,
}

#[derive(Clone)]
pub struct Scope {
  pub kind: ScopeKind,
  /// Shared by the two branches of an if/else pair, and by a switch body and
  /// all of its case/default branches.
  pub id: i32,
  pub depth: i32,
  pub begin: i32,
  /// -1 while the scope is still open.
  pub end: i32,
  /// The first line of a BRK that leaves this loop; `i32::MAX` if none.
  pub loop_break_line: i32,
  pub parent: Option<ScopeIx>,
}

impl fmt::Debug for Scope {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    write!(
      fmt,
      "{:?}(id={}, depth={}, [{}, {}])",
      self.kind, self.id, self.depth, self.begin, self.end
    )
  }
}

pub struct ScopeTree {
  scopes: TypedIxVec<ScopeIx, Scope>,
}

impl std::ops::Index<ScopeIx> for ScopeTree {
  type Output = Scope;
  fn index(&self, ix: ScopeIx) -> &Scope {
    &self.scopes[ix]
  }
}

impl ScopeTree {
  /// Creates a tree holding only the outer scope, which starts at `begin`.
  pub fn with_capacity(capacity: usize, begin: i32) -> (ScopeTree, ScopeIx) {
    let mut tree = ScopeTree { scopes: TypedIxVec::with_capacity(capacity) };
    let outer = tree.push(None, ScopeKind::Outer, 0, 0, begin);
    (tree, outer)
  }

  fn push(
    &mut self, parent: Option<ScopeIx>, kind: ScopeKind, id: i32, depth: i32,
    begin: i32,
  ) -> ScopeIx {
    self.scopes.push(Scope {
      kind,
      id,
      depth,
      begin,
      end: -1,
      loop_break_line: i32::MAX,
      parent,
    })
  }

  /// Opens a new scope below `parent`.
  pub fn open(
    &mut self, parent: ScopeIx, kind: ScopeKind, id: i32, depth: i32,
    begin: i32,
  ) -> ScopeIx {
    assert!(kind != ScopeKind::Outer, "there is only one outer scope");
    self.push(Some(parent), kind, id, depth, begin)
  }

  /// Sets the end of `scope`, unless it was already closed.
  pub fn close(&mut self, scope: ScopeIx, end: i32) {
    let s = &mut self.scopes[scope];
    if s.end == -1 {
      s.end = end;
    }
  }

  pub fn len(&self) -> u32 {
    self.scopes.len()
  }

  pub fn parent(&self, scope: ScopeIx) -> Option<ScopeIx> {
    self.scopes[scope].parent
  }

  /// Iterates over `scope` and then all its ancestors, innermost first.
  pub fn self_and_ancestors(
    &self, scope: ScopeIx,
  ) -> impl Iterator<Item = ScopeIx> + '_ {
    std::iter::successors(Some(scope), move |s| self.scopes[*s].parent)
  }

  pub fn is_loop(&self, scope: ScopeIx) -> bool {
    self.scopes[scope].kind == ScopeKind::LoopBody
  }

  pub fn is_in_loop(&self, scope: ScopeIx) -> bool {
    self.innermost_loop(scope).is_some()
  }

  pub fn innermost_loop(&self, scope: ScopeIx) -> Option<ScopeIx> {
    self.self_and_ancestors(scope).find(|s| self.is_loop(*s))
  }

  pub fn outermost_loop(&self, scope: ScopeIx) -> Option<ScopeIx> {
    self.self_and_ancestors(scope).filter(|s| self.is_loop(*s)).last()
  }

  pub fn is_conditional(&self, scope: ScopeIx) -> bool {
    match self.scopes[scope].kind {
      ScopeKind::IfBranch
      | ScopeKind::ElseBranch
      | ScopeKind::SwitchCaseBranch
      | ScopeKind::SwitchDefaultBranch => true,
      _ => false,
    }
  }

  fn is_ifelse(&self, scope: ScopeIx) -> bool {
    match self.scopes[scope].kind {
      ScopeKind::IfBranch | ScopeKind::ElseBranch => true,
      _ => false,
    }
  }

  /// The nearest if or else branch, `scope` itself included.
  pub fn in_ifelse_scope(&self, scope: ScopeIx) -> Option<ScopeIx> {
    self.self_and_ancestors(scope).find(|s| self.is_ifelse(*s))
  }

  /// The nearest if or else branch strictly above `scope`.
  pub fn in_parent_ifelse_scope(&self, scope: ScopeIx) -> Option<ScopeIx> {
    self.parent(scope).and_then(|p| self.in_ifelse_scope(p))
  }

  /// The nearest conditional scope, `scope` itself included.
  pub fn enclosing_conditional(&self, scope: ScopeIx) -> Option<ScopeIx> {
    self.self_and_ancestors(scope).find(|s| self.is_conditional(*s))
  }

  /// Whether `other` is a strict ancestor of `scope`.
  pub fn is_child_of(&self, scope: ScopeIx, other: ScopeIx) -> bool {
    self.self_and_ancestors(scope).skip(1).any(|s| s == other)
  }

  /// Whether one of the if/else branches enclosing `scope` is the sibling
  /// branch of `other` (same id, different node).  Returns false as soon as
  /// `other` itself is found on the way up.
  pub fn is_child_of_ifelse_id_sibling(
    &self, scope: ScopeIx, other: ScopeIx,
  ) -> bool {
    let other_id = self.scopes[other].id;
    let mut my_parent = self.in_parent_ifelse_scope(scope);
    while let Some(p) = my_parent {
      if p == other {
        return false;
      }
      if self.scopes[p].id == other_id {
        return true;
      }
      my_parent = self.in_parent_ifelse_scope(p);
    }
    false
  }

  /// Whether the line range of `other` lies within the range of `scope`.
  pub fn contains_range_of(&self, scope: ScopeIx, other: ScopeIx) -> bool {
    let (s, o) = (&self.scopes[scope], &self.scopes[other]);
    s.begin <= o.begin && s.end >= o.end
  }

  pub fn is_switchcase_scope_in_loop(&self, scope: ScopeIx) -> bool {
    match self.scopes[scope].kind {
      ScopeKind::SwitchCaseBranch | ScopeKind::SwitchDefaultBranch => {
        self.is_in_loop(scope)
      }
      _ => false,
    }
  }

  /// Whether a BRK in `scope` leaves a switch case rather than a loop: the
  /// nearest loop or switch construct above it decides.
  pub fn break_is_for_switchcase(&self, scope: ScopeIx) -> bool {
    for s in self.self_and_ancestors(scope) {
      match self.scopes[s].kind {
        ScopeKind::LoopBody => return false,
        ScopeKind::SwitchCaseBranch
        | ScopeKind::SwitchDefaultBranch
        | ScopeKind::SwitchBody => return true,
        _ => {}
      }
    }
    false
  }

  /// Records a loop break at `line` on the innermost loop around `scope`.
  pub fn record_loop_break(&mut self, scope: ScopeIx, line: i32) {
    if let Some(lp) = self.innermost_loop(scope) {
      let s = &mut self.scopes[lp];
      s.loop_break_line = s.loop_break_line.min(line);
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  // 0: BGNLOOP
  // 1:   IF
  // 2:     BGNLOOP
  // 3:       ...
  // 4:     ENDLOOP
  // 5:   ELSE
  // 6:     ...
  // 7:   ENDIF
  // 8: ENDLOOP
  fn nested() -> (ScopeTree, [ScopeIx; 5]) {
    let (mut tree, outer) = ScopeTree::with_capacity(8, 0);
    let lp = tree.open(outer, ScopeKind::LoopBody, 1, 1, 0);
    let if_ = tree.open(lp, ScopeKind::IfBranch, 1, 2, 2);
    let inner = tree.open(if_, ScopeKind::LoopBody, 2, 3, 2);
    tree.close(inner, 4);
    tree.close(if_, 4);
    let else_ = tree.open(lp, ScopeKind::ElseBranch, 1, 2, 6);
    tree.close(else_, 6);
    tree.close(lp, 8);
    tree.close(outer, 9);
    (tree, [outer, lp, if_, inner, else_])
  }

  #[test]
  fn tree_grows_past_its_capacity() {
    let (mut tree, outer) = ScopeTree::with_capacity(0, 0);
    let mut parent = outer;
    for depth in 1..=4 {
      parent = tree.open(parent, ScopeKind::LoopBody, depth, depth, depth);
    }
    assert_eq!(tree.len(), 5);
    assert!(tree.is_child_of(parent, outer));
  }

  #[test]
  fn close_is_idempotent() {
    let (mut tree, [_, lp, ..]) = nested();
    tree.close(lp, 20);
    assert_eq!(tree[lp].end, 8);
  }

  #[test]
  fn loop_queries() {
    let (tree, [outer, lp, if_, inner, else_]) = nested();
    assert!(!tree.is_in_loop(outer));
    assert_eq!(tree.innermost_loop(inner), Some(inner));
    assert_eq!(tree.outermost_loop(inner), Some(lp));
    assert_eq!(tree.innermost_loop(else_), Some(lp));
    assert_eq!(tree.outermost_loop(outer), None);
    assert!(tree.is_loop(lp) && !tree.is_loop(if_));
  }

  #[test]
  fn ifelse_queries() {
    let (tree, [outer, lp, if_, inner, else_]) = nested();
    assert_eq!(tree.in_ifelse_scope(inner), Some(if_));
    assert_eq!(tree.in_ifelse_scope(lp), None);
    assert_eq!(tree.in_parent_ifelse_scope(if_), None);
    assert_eq!(tree.enclosing_conditional(inner), Some(if_));
    assert!(tree.is_child_of(inner, lp));
    assert!(!tree.is_child_of(lp, lp));
    assert!(!tree.is_child_of(else_, if_));
    assert!(tree.contains_range_of(lp, inner));
    assert!(!tree.contains_range_of(if_, else_));
    assert!(tree.contains_range_of(outer, lp));
  }

  #[test]
  fn ifelse_sibling_detection() {
    // IF(1) { IF(2) {} } ELSE(1) { IF(3) { <here> } }
    let (mut tree, outer) = ScopeTree::with_capacity(8, 0);
    let a = tree.open(outer, ScopeKind::IfBranch, 1, 1, 1);
    let a_inner = tree.open(a, ScopeKind::IfBranch, 2, 2, 2);
    tree.close(a_inner, 2);
    tree.close(a, 3);
    let b = tree.open(outer, ScopeKind::ElseBranch, 1, 1, 5);
    let c = tree.open(b, ScopeKind::IfBranch, 3, 2, 6);
    assert!(tree.is_child_of_ifelse_id_sibling(c, a));
    assert!(!tree.is_child_of_ifelse_id_sibling(a_inner, a));
    assert!(!tree.is_child_of_ifelse_id_sibling(c, a_inner));
  }

  #[test]
  fn breaks() {
    let (mut tree, outer) = ScopeTree::with_capacity(8, 0);
    let lp = tree.open(outer, ScopeKind::LoopBody, 1, 1, 0);
    let sw = tree.open(lp, ScopeKind::SwitchBody, 0, 2, 1);
    let case = tree.open(sw, ScopeKind::SwitchCaseBranch, 0, 3, 2);
    let if_ = tree.open(lp, ScopeKind::IfBranch, 1, 2, 6);
    assert!(tree.break_is_for_switchcase(case));
    assert!(!tree.break_is_for_switchcase(if_));
    assert!(!tree.break_is_for_switchcase(outer));
    assert!(tree.is_switchcase_scope_in_loop(case));

    tree.record_loop_break(if_, 7);
    tree.record_loop_break(if_, 9);
    assert_eq!(tree[lp].loop_break_line, 7);
    assert_eq!(tree[if_].loop_break_line, i32::MAX);
  }
}
