/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

#![no_main]
use libfuzzer_sys::fuzz_target;

use regmerge::{compute_required_lifetimes, RegFile};
use regmerge_util::fuzzing::ArbitraryProgram;

fuzz_target!(|prog: ArbitraryProgram| {
  let prog = prog.0;
  let lifetimes = match compute_required_lifetimes(&prog) {
    Ok(l) => l,
    Err(err) => panic!("generated programs only use known opcodes: {}", err),
  };
  assert_eq!(lifetimes.temps.len(), prog.num_temps);
  assert_eq!(lifetimes.arrays.len(), prog.array_sizes.len());

  // Every written temporary lives at least from its first write on.
  for (line, inst) in prog.insts.iter().enumerate() {
    for dst in inst.dst.iter().filter(|d| d.file == RegFile::Temp) {
      let lt = lifetimes.temps[dst.index as usize];
      assert!(lt.begin >= 0 && lt.begin <= line as i32, "{:?} at {}", lt, line);
      assert!(lt.end >= lt.begin, "{:?}", lt);
    }
  }
});
