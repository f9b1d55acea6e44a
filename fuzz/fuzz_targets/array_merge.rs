/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

#![no_main]
use libfuzzer_sys::fuzz_target;

use regmerge::{merge_registers_with_opts, Options};
use regmerge_util::fuzzing::ArbitraryProgram;

static mut COUNTER_GEN: usize = 0;
static mut COUNTER_MERGED: usize = 0;

fuzz_target!(|prog: ArbitraryProgram| {
  let (num_gen, num_merged) = unsafe {
    COUNTER_GEN += 1;
    (COUNTER_GEN, COUNTER_MERGED)
  };

  println!(
    "=== status: #merged/#total: {}/{} == {} ",
    num_merged,
    num_gen,
    100.0 * (num_merged as f64) / (num_gen as f64)
  );

  let mut prog = prog.0;
  let original = prog.clone();

  let opts = Options { run_checker: true, ..Options::default() };
  match merge_registers_with_opts(&mut prog, opts) {
    Ok(result) => {
      assert_eq!(result.num_arrays, prog.array_sizes.len());
      assert!(result.num_arrays <= original.array_sizes.len());
      if result.num_arrays < original.array_sizes.len() {
        unsafe {
          COUNTER_MERGED += 1;
        }
      }
    }
    Err(err) => {
      println!("{}", original);
      panic!("array_merge.rs: merge error: {}", err);
    }
  }
});
