/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

use regmerge::{merge_registers_with_opts, Options, Program};
use regmerge_util::test_framework::{check_results, run_program, RunStage};
use regmerge_util::{parser, test_cases};

use clap;
use log::{error, info};
use pretty_env_logger;

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

//=============================================================================
// Top level

fn main() {
  pretty_env_logger::init();

  let app = clap::App::new("regmerge-util")
    .about("a simple program to allow separate testing of regmerge")
    .arg(
      clap::Arg::new("test")
        .short('t')
        .takes_value(true)
        .help("test case name"),
    )
    .arg(
      clap::Arg::new("file")
        .short('f')
        .takes_value(true)
        .conflicts_with("test")
        .help("file holding a program in the textual format"),
    )
    .arg(
      clap::Arg::new("list")
        .short('l')
        .help("list the available test cases"),
    )
    .arg(
      clap::Arg::new("no-temps")
        .long("no-temps")
        .help("don't rename temporaries"),
    )
    .arg(
      clap::Arg::new("no-arrays")
        .long("no-arrays")
        .help("don't merge arrays"),
    )
    .arg(
      clap::Arg::new("checker")
        .short('c')
        .help("verify the merge result before rewriting"),
    )
    .arg(
      clap::Arg::new("save")
        .long("save")
        .takes_value(true)
        .help("write the merged program to this file, bincode encoded"),
    );
  let matches = app.get_matches();

  if matches.is_present("list") {
    print_available(test_cases::find_program("").err().unwrap_or_default());
    return;
  }

  let mut prog = if let Some(path) = matches.value_of("file") {
    match parser::parse_file(PathBuf::from(path)) {
      Ok(prog) => prog,
      Err(err) => {
        error!("can't read program from '{}': {}", path, err.to_string());
        return;
      }
    }
  } else if let Some(name) = matches.value_of("test") {
    match test_cases::find_program(name) {
      Ok(prog) => prog,
      Err(available) => {
        error!("can't find program with name '{}'", name);
        print_available(available);
        return;
      }
    }
  } else {
    println!("one of -t <name> or -f <path> is required, see --help");
    return;
  };

  let opts = Options {
    run_checker: matches.is_present("checker"),
    merge_temps: !matches.is_present("no-temps"),
    merge_arrays: !matches.is_present("no-arrays"),
  };

  println!("before merging:\n{}", prog);

  // Just so we can run it later.
  let original = prog.clone();

  let result = match merge_registers_with_opts(&mut prog, opts) {
    Err(e) => {
      println!("merging failed: {}", e);
      return;
    }
    Ok(r) => r,
  };
  info!(
    "{} temps renamed, {} arrays left",
    result.temp_remapping.iter().filter(|r| r.is_some()).count(),
    result.num_arrays
  );

  println!("after merging:\n{}", prog);

  if let Some(path) = matches.value_of("save") {
    if let Err(err) = save(&prog, path) {
      error!("can't save to '{}': {}", path, err);
    }
  }

  let before = run_program(&original, "before merging", RunStage::BeforeMerge);
  let after = run_program(&prog, "after merging", RunStage::AfterMerge);

  match check_results(before, after) {
    Ok(()) => println!("results match"),
    Err(err) => {
      error!("{}", err);
      std::process::exit(1);
    }
  }
}

fn print_available(names: Vec<String>) {
  println!("available program names are:");
  for name in names {
    println!("     {}", name);
  }
}

fn save(prog: &Program, path: &str) -> Result<(), String> {
  let file = File::create(path).map_err(|e| e.to_string())?;
  bincode::serialize_into(BufWriter::new(file), prog).map_err(|e| e.to_string())
}


#[test]
fn straight_line() {
  let merged = test_utils::check("straight_line", None);
  // At most two values are live at any point.
  assert_eq!(merged.num_temps, 4);
  assert!(merged.insts.iter().all(|inst| inst
    .dst
    .iter()
    .all(|d| d.file != regmerge::RegFile::Temp || d.index <= 1)));
}

#[test]
fn loop_accumulate() {
  test_utils::check("loop_accumulate", None);
}

#[test]
fn if_else_in_loop() {
  test_utils::check("if_else_in_loop", None);
}

#[test]
fn break_out_of_loop() {
  test_utils::check("break_out_of_loop", None);
}

#[test]
fn nested_loops() {
  test_utils::check("nested_loops", None);
}

#[test]
fn switch_cases() {
  test_utils::check("switch_cases", None);
}

#[test]
fn switch_in_loop() {
  test_utils::check("switch_in_loop", None);
}

#[test]
fn write_select_from_self() {
  test_utils::check("write_select_from_self", None);
}

#[test]
fn two_destinations() {
  test_utils::check("two_destinations", None);
}

#[test]
fn tex_offsets() {
  test_utils::check("tex_offsets", None);
}

#[test]
fn array_merge() {
  test_utils::check("array_merge", Some(1));
}

#[test]
fn array_interleave() {
  let merged = test_utils::check("array_interleave", Some(1));
  // The second array moved to the y component.
  let moved = &merged.insts[2].dst[0];
  assert_eq!(moved.array_id, 1);
  assert_eq!(moved.writemask, regmerge::WriteMask::Y);
}

#[test]
fn array_chain() {
  test_utils::check("array_chain", Some(1));
}

#[test]
fn indirect_array() {
  test_utils::check("indirect_array", Some(1));
}

#[test]
fn array_in_loop() {
  test_utils::check("array_in_loop", Some(1));
}

#[test]
fn dot_product() {
  test_utils::check("dot_product", Some(1));
}

#[test]
fn loop_carried_array() {
  test_utils::check("loop_carried_array", Some(1));
}

#[test]
fn switch_fallthrough() {
  test_utils::check("switch_fallthrough", None);
}

#[test]
fn arrays_only() {
  let opts = Options { run_checker: true, merge_temps: false, merge_arrays: true };
  for name in &["array_chain", "indirect_array", "switch_in_loop"] {
    test_utils::check_opts(name, opts);
  }
}

#[test]
fn temps_only() {
  let opts = Options { run_checker: true, merge_temps: true, merge_arrays: false };
  for name in &["array_interleave", "nested_loops", "write_select_from_self"] {
    test_utils::check_opts(name, opts);
  }
}

#[test]
fn unknown_program_lists_the_available_ones() {
  match test_cases::find_program("no such program") {
    Ok(_) => panic!("found a program that doesn't exist"),
    Err(names) => {
      assert!(names.iter().any(|n| n == "straight_line"));
      assert!(names.iter().any(|n| n == "switch_fallthrough"));
      let mut sorted = names.clone();
      sorted.sort();
      assert_eq!(names, sorted);
    }
  }
}

#[test]
fn generated_programs() {
  use arbitrary::{Arbitrary, Unstructured};
  use regmerge_util::fuzzing::ArbitraryProgram;

  let _ = pretty_env_logger::try_init();
  for seed in 0..64u32 {
    // A cheap deterministic byte stream per seed.
    let mut state = seed.wrapping_mul(2654435761).wrapping_add(1);
    let bytes: Vec<u8> = (0..512)
      .map(|_| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        (state >> 24) as u8
      })
      .collect();
    let prog = match ArbitraryProgram::arbitrary(&mut Unstructured::new(&bytes)) {
      Ok(p) => p.0,
      Err(_) => continue,
    };

    let mut merged = prog.clone();
    let opts = Options { run_checker: true, ..Options::default() };
    if let Err(err) = merge_registers_with_opts(&mut merged, opts) {
      panic!("seed {}: {}\n{}", seed, err, prog);
    }
    let before = run_program(&prog, "generated", RunStage::BeforeMerge);
    let after = run_program(&merged, "generated", RunStage::AfterMerge);
    if let Err(err) = check_results(before, after) {
      panic!("seed {}: {}\nbefore:\n{}\nafter:\n{}", seed, err, prog, merged);
    }
  }
}
