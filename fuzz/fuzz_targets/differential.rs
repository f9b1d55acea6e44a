/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

#![no_main]
use libfuzzer_sys::fuzz_target;

use regmerge::{merge_registers_with_opts, Options};
use regmerge_util::fuzzing::ArbitraryProgram;
use regmerge_util::test_framework::{check_results, run_program, RunStage};

fuzz_target!(|prog: ArbitraryProgram| {
  let mut prog = prog.0;
  let original = prog.clone();

  let opts = Options { run_checker: true, ..Options::default() };
  if let Err(err) = merge_registers_with_opts(&mut prog, opts) {
    println!("{}", original);
    panic!("differential.rs: merge error: {}", err);
  }

  let before = run_program(&original, "before merging", RunStage::BeforeMerge);
  let after = run_program(&prog, "after merging", RunStage::AfterMerge);
  if let Err(err) = check_results(before, after) {
    println!("before merging:\n{}\nafter merging:\n{}", original, prog);
    panic!("differential.rs: {}", err);
  }
});
