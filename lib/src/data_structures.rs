/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Data structures shared by the passes: typed index vectors and the index
//! newtypes used to address them.

use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

//=============================================================================
// Maps.

pub type Map<K, V> = rustc_hash::FxHashMap<K, V>;

//=============================================================================
// Vectors where both the index and element types can be specified (and at
// most 2^32-1 elems can be stored).

pub struct TypedIxVec<TyIx, Ty> {
  vek: Vec<Ty>,
  ty_ix: PhantomData<TyIx>,
}

impl<TyIx, Ty> TypedIxVec<TyIx, Ty>
where
  TyIx: From<u32>,
{
  pub fn with_capacity(capacity: usize) -> Self {
    Self { vek: Vec::with_capacity(capacity), ty_ix: PhantomData::<TyIx> }
  }
  pub fn len(&self) -> u32 {
    self.vek.len() as u32
  }
  /// Appends `item` and returns the index it landed at.
  pub fn push(&mut self, item: Ty) -> TyIx {
    assert!(self.vek.len() < u32::MAX as usize, "TypedIxVec overflow");
    let ix = self.vek.len() as u32;
    self.vek.push(item);
    TyIx::from(ix)
  }
}

impl<TyIx, Ty> Index<TyIx> for TypedIxVec<TyIx, Ty>
where
  TyIx: Into<u32>,
{
  type Output = Ty;
  fn index(&self, ix: TyIx) -> &Ty {
    &self.vek[ix.into() as usize]
  }
}

impl<TyIx, Ty> IndexMut<TyIx> for TypedIxVec<TyIx, Ty>
where
  TyIx: Into<u32>,
{
  fn index_mut(&mut self, ix: TyIx) -> &mut Ty {
    &mut self.vek[ix.into() as usize]
  }
}

impl<TyIx, Ty> Clone for TypedIxVec<TyIx, Ty>
where
  Ty: Clone,
{
  fn clone(&self) -> Self {
    Self { vek: self.vek.clone(), ty_ix: PhantomData::<TyIx> }
  }
}

//=============================================================================

macro_rules! generate_boilerplate {
  ($TypeIx:ident, $PrintingPrefix:expr) => {
    #[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
    pub struct $TypeIx(u32);
    impl std::fmt::Debug for $TypeIx {
      fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "{}{}", $PrintingPrefix, self.0)
      }
    }
    impl From<u32> for $TypeIx {
      fn from(n: u32) -> Self {
        $TypeIx(n)
      }
    }
    impl Into<u32> for $TypeIx {
      fn into(self) -> u32 {
        self.0
      }
    }
  };
}

generate_boilerplate!(ScopeIx, "s");
