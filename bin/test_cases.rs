/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

/// Test cases.  The list of them is right at the bottom, function
/// |find_program|.  Add new ones there.
use regmerge::{
  DstReg, Inst, Opcode, Program, SrcReg, Swizzle, WriteMask,
};

use crate::parser;

use std::path::{Path, PathBuf};

fn parsed(name: &str, source: &str) -> (String, Program) {
  let prog =
    parser::parse_content(name, source).expect("unparseable test case");
  (name.to_string(), prog)
}

/// Temporaries that are each read once right after being written.
fn test_straight_line() -> (String, Program) {
  parsed(
    "straight_line",
    "MOV TEMP[0] := IN[0]
     ADD TEMP[1] := TEMP[0], IN[1]
     MUL TEMP[2] := TEMP[1], IMM[3]
     SUB TEMP[3] := TEMP[2], TEMP[0]
     MOV OUT[0] := TEMP[3]
     END",
  )
}

/// Values carried around a loop must survive the whole loop.
fn test_loop_accumulate() -> (String, Program) {
  parsed(
    "loop_accumulate",
    "MOV TEMP[0] := IMM[0]
     MOV TEMP[1] := IN[2]
     BGNLOOP
       ADD TEMP[2] := TEMP[1], IMM[1]
       ADD TEMP[0] := TEMP[0], TEMP[2]
       MOV TEMP[1] := TEMP[2]
     ENDLOOP
     MOV TEMP[3] := TEMP[0]
     MUL OUT[0] := TEMP[3], TEMP[1]
     END",
  )
}

fn test_if_else_in_loop() -> (String, Program) {
  parsed(
    "if_else_in_loop",
    "MOV TEMP[0] := IMM[0]          ; counter
     MOV TEMP[1] := IMM[0]          ; sum
     BGNLOOP
       SLT TEMP[2].x := TEMP[0].x, IMM[1].x
       UIF TEMP[2].x
         ADD TEMP[3] := IN[0], IMM[5]
       ELSE
         MUL TEMP[3] := IN[1], TEMP[0]
       ENDIF
       ADD TEMP[1] := TEMP[1], TEMP[3]
       ADD TEMP[0] := TEMP[0], IMM[1]
     ENDLOOP
     MOV OUT[0] := TEMP[1]
     END",
  )
}

/// TEMP[2] is written after the conditional break, so it is not always
/// written when the loop is left.
fn test_break_out_of_loop() -> (String, Program) {
  parsed(
    "break_out_of_loop",
    "MOV TEMP[0] := IMM[0]
     MOV TEMP[2] := IN[3]
     BGNLOOP
       ADD TEMP[0] := TEMP[0], IMM[1]
       USEQ TEMP[1].x := TEMP[0].x, IMM[2].x
       UIF TEMP[1].x
         BRK
       ENDIF
       MOV TEMP[2] := TEMP[0]
     ENDLOOP
     ADD OUT[0] := TEMP[2], TEMP[0]
     END",
  )
}

fn test_nested_loops() -> (String, Program) {
  parsed(
    "nested_loops",
    "MOV TEMP[0] := IMM[0]
     BGNLOOP
       MOV TEMP[1] := TEMP[0]
       BGNLOOP
         ADD TEMP[1] := TEMP[1], IN[0]
       ENDLOOP
       ADD TEMP[0] := TEMP[0], TEMP[1]
     ENDLOOP
     MOV OUT[0] := TEMP[0]
     END",
  )
}

fn test_switch_cases() -> (String, Program) {
  parsed(
    "switch_cases",
    "MOV TEMP[0] := IN[0]
     MOV TEMP[1] := IMM[0]
     SWITCH TEMP[0].y
     CASE IMM[1].x
       MOV TEMP[1] := IN[1]
       BRK
     CASE IMM[2].x
       ADD TEMP[2] := TEMP[0], IN[2]
       MOV TEMP[1] := TEMP[2]
     DEFAULT
       ADD TEMP[1] := TEMP[1], IMM[7]
       BRK
     ENDSWITCH
     MOV OUT[0] := TEMP[1]
     END",
  )
}

/// A different case runs in every iteration; the default case reads what
/// an earlier iteration wrote.
fn test_switch_in_loop() -> (String, Program) {
  parsed(
    "switch_in_loop",
    "MOV TEMP[0] := IMM[0]
     MOV TEMP[3] := IMM[0]
     BGNLOOP
       SWITCH TEMP[0].x
       CASE IMM[0].x
         MOV TEMP[1].x := IN[0].x
         MOV TEMP[1].y := IN[0].y
         BRK
       CASE IMM[1].x
         MOV TEMP[1].xy := IN[1].xy
       DEFAULT
         ADD TEMP[2].xy := TEMP[1].xy, IN[2].xy
         ADD TEMP[3].xy := TEMP[3].xy, TEMP[2].xy
         BRK
       ENDSWITCH
       ADD TEMP[0] := TEMP[0], IMM[1]
     ENDLOOP
     MOV OUT[0].xy := TEMP[3].xy
     END",
  )
}

fn test_write_select_from_self() -> (String, Program) {
  parsed(
    "write_select_from_self",
    "USEQ TEMP[5] := IN[0], IN[0]
     UCMP TEMP[1] := TEMP[5], IN[1], TEMP[1]
     UCMP TEMP[1] := TEMP[5], IN[1], TEMP[1]
     UCMP TEMP[1] := TEMP[5], IN[1], TEMP[1]
     UCMP TEMP[1] := TEMP[5], IN[1], TEMP[1]
     SLT TEMP[2] := TEMP[1], IN[1]
     UIF TEMP[2].x
       MOV TEMP[3] := IN[1]
     ELSE
       MOV TEMP[4] := IN[1]
       MOV TEMP[4] := TEMP[4]
       MOV TEMP[3] := TEMP[4]
     ENDIF
     MOV OUT[1] := TEMP[3]
     END",
  )
}

fn test_two_destinations() -> (String, Program) {
  parsed(
    "two_destinations",
    "MOV TEMP[0] := IMM[1000]
     DFRACEXP TEMP[1], TEMP[2] := TEMP[0]
     ADD TEMP[3] := TEMP[1], TEMP[2]
     MOV OUT[0] := TEMP[3]
     END",
  )
}

fn test_tex_offsets() -> (String, Program) {
  parsed(
    "tex_offsets",
    "MOV TEMP[0] := IN[1]
     MOV TEMP[1] := IMM[2]
     TEX TEMP[2] := IN[0], TEXOFS: TEMP[0], TEMP[1]
     MOV OUT[0] := TEMP[2]
     END",
  )
}

/// Two arrays that are live one after the other share storage.
fn test_array_merge() -> (String, Program) {
  parsed(
    "array_merge",
    "ARRAYS 2, 2
     MOV ARRAY(1)[0] := IN[0]
     MOV ARRAY(1)[1] := IN[1]
     ADD OUT[0] := ARRAY(1)[0], ARRAY(1)[1]
     MOV ARRAY(2)[0] := IN[2]
     MOV ARRAY(2)[1] := IN[3]
     ADD OUT[1] := ARRAY(2)[0], ARRAY(2)[1]
     END",
  )
}

/// Two arrays that are live at the same time but only use the x component.
fn test_array_interleave() -> (String, Program) {
  parsed(
    "array_interleave",
    "ARRAYS 2, 2
     MOV ARRAY(1)[0].x := IN[0].x
     MOV ARRAY(1)[1].x := IN[0].y
     MOV ARRAY(2)[0].x := IN[1].z
     MOV ARRAY(2)[1].x := IN[1].w
     ADD TEMP[0].x := ARRAY(1)[0].x, ARRAY(2)[1].x
     ADD TEMP[1].x := ARRAY(1)[1].x, ARRAY(2)[0].x
     MUL OUT[0].x := TEMP[0].x, TEMP[1].x
     END",
  )
}

/// Arrays 1 and 2 get interleaved; array 3 then fits after them.
fn test_array_chain() -> (String, Program) {
  parsed(
    "array_chain",
    "ARRAYS 2, 2, 2
     MOV ARRAY(1)[0].x := IN[0].x
     MOV ARRAY(2)[1].x := IN[1].y
     ADD TEMP[0].x := ARRAY(1)[0].x, ARRAY(2)[1].x
     MOV OUT[0].x := TEMP[0].x
     MOV ARRAY(3)[0].xy := IN[2].xy
     MOV ARRAY(3)[1].xy := ARRAY(3)[0].yx
     MOV OUT[1].xy := ARRAY(3)[1].xy
     END",
  )
}

fn test_indirect_array() -> (String, Program) {
  parsed(
    "indirect_array",
    "ARRAYS 4, 4
     MOV ARRAY(1)[0] := IN[0]
     MOV ARRAY(1)[1] := IN[1]
     MOV ARRAY(1)[2] := IN[2]
     MOV ARRAY(1)[3] := IN[3]
     MOV ADDR[0].x := IMM[2].x
     MOV TEMP[0] := ARRAY(1)[ADDR[0].x+1]
     MOV ARRAY(2)[ADDR[0].x+0] := TEMP[0]
     MOV OUT[0] := ARRAY(2)[2]
     END",
  )
}

/// An array filled in a loop through an address register, and a smaller
/// one used afterwards.
fn test_array_in_loop() -> (String, Program) {
  parsed(
    "array_in_loop",
    "ARRAYS 3, 3
     MOV TEMP[0] := IMM[0]
     BGNLOOP
       MOV ADDR[0].x := TEMP[0].x
       ADD ARRAY(1)[ADDR[0].x+0] := IN[0], TEMP[0]
       ADD TEMP[0] := TEMP[0], IMM[1]
     ENDLOOP
     ADD TEMP[1] := ARRAY(1)[0], ARRAY(1)[2]
     MOV ARRAY(2)[1].z := TEMP[1].x
     MOV OUT[0].z := ARRAY(2)[1].z
     END",
  )
}

/// Built by hand rather than parsed: a dot product of two vectors that are
/// stored in the y and w components of one array.
fn test_dot_product() -> (String, Program) {
  let mov = |dst: DstReg, src: SrcReg| {
    Inst::new(Opcode::Mov).with_dst(dst).with_src(src)
  };
  let insts = vec![
    mov(DstReg::array(1, 0).mask(WriteMask::Y), SrcReg::input(0)),
    mov(DstReg::array(2, 0).mask(WriteMask::W), SrcReg::input(1)),
    mov(DstReg::temp(0), SrcReg::array(1, 0).swz(Swizzle::replicate(1))),
    mov(DstReg::temp(1), SrcReg::array(2, 0).swz(Swizzle::replicate(3))),
    Inst::new(Opcode::Dp4)
      .with_dst(DstReg::temp(2))
      .with_src(SrcReg::temp(0))
      .with_src(SrcReg::temp(1)),
    mov(DstReg::output(0), SrcReg::temp(2)),
    Inst::new(Opcode::End),
  ];
  ("dot_product".to_string(), Program::new(insts, vec![1, 1]))
}

// This is the list of available tests.  This function returns either the
// requested program, or if not found, a list of the available ones.
pub fn find_program(name: &str) -> Result<Program, Vec<String>> {
  let all_programs = vec![
    test_straight_line(),
    test_loop_accumulate(),
    test_if_else_in_loop(),
    test_break_out_of_loop(),
    test_nested_loops(),
    test_switch_cases(),
    test_switch_in_loop(),
    test_write_select_from_self(),
    test_two_destinations(),
    test_tex_offsets(),
    test_array_merge(),
    test_array_interleave(),
    test_array_chain(),
    test_indirect_array(),
    test_array_in_loop(),
    test_dot_product(),
  ];

  let mut all_names = Vec::new();
  for (cand_name, cand) in all_programs {
    if cand_name == name {
      return Ok(cand);
    }
    all_names.push(cand_name);
  }

  fn ends_in_tilde(path: &PathBuf) -> bool {
    path.to_str().map_or(false, |s| s.ends_with('~'))
  }

  let test_dir = Path::new("tests");
  match test_dir.read_dir() {
    Err(err) => {
      println!("can't read test directory: {}", err);
    }
    Ok(entries) => {
      for entry in entries.flatten() {
        let path = entry.path();
        // Skip editor backup files, which would otherwise shadow the real
        // test file.
        if ends_in_tilde(&path) {
          continue;
        }
        let basename = match path.file_stem().and_then(|s| s.to_str()) {
          Some(basename) => basename.to_string(),
          None => continue,
        };
        if basename == name {
          match parser::parse_file(path) {
            Ok(prog) => return Ok(prog),
            Err(err) => {
              println!("can't parse {}: {}", basename, err.to_string());
              all_names.push(basename);
            }
          }
        } else {
          all_names.push(basename);
        }
      }
    }
  }

  all_names.sort();
  Err(all_names)
}
