/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

#![no_main]
use libfuzzer_sys::fuzz_target;

use regmerge_util::fuzzing::ArbitraryProgram;
use regmerge_util::parser;

fuzz_target!(|prog: ArbitraryProgram| {
  let prog = prog.0;
  let printed = format!("{}", prog);
  let parsed = parser::parse_content("prog", &printed)
    .unwrap_or_else(|err| panic!("parser error: {}\n{}", err.to_string(), printed));

  let reprinted = format!("{}", parsed);
  let reparsed = parser::parse_content("prog", &reprinted)
    .expect("shouldn't error on the second parse!");

  assert_eq!(reprinted, format!("{}", reparsed));
  assert_eq!(parsed.insts, prog.insts);
});
