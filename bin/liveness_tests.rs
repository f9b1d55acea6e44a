/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Lifetime tests on small programs written in the textual form.  The
//! expected lifetimes are listed by temporary index; TEMP[0] is unused in
//! most of the programs.

use regmerge::{
  compute_required_lifetimes, get_temp_registers_remapping, Lifetime,
};

use crate::parser::parse_content;

fn lifetimes(source: &str) -> Vec<Lifetime> {
  let prog = parse_content("liveness", source).unwrap();
  compute_required_lifetimes(&prog).unwrap().temps
}

fn check_exact(source: &str, expected: &[(i32, i32)]) {
  let _ = pretty_env_logger::try_init();
  let got: Vec<(i32, i32)> =
    lifetimes(source).iter().map(|lt| (lt.begin, lt.end)).collect();
  assert_eq!(got, expected);
}

/// Only checks that each lifetime covers the expected one.
fn check_at_least(source: &str, expected: &[(i32, i32)]) {
  let _ = pretty_env_logger::try_init();
  let got = lifetimes(source);
  assert_eq!(got.len(), expected.len());
  for (i, (lt, &(begin, end))) in got.iter().zip(expected).enumerate() {
    if begin < 0 {
      continue;
    }
    assert!(
      lt.begin <= begin && lt.end >= end,
      "TEMP[{}]: got {:?}, expected at least ({}, {})",
      i,
      lt,
      begin,
      end
    );
  }
}

/// Lifetimes followed by renaming; `expected` lists the register every
/// temporary ends up in.
fn check_renaming(source: &str, expected: &[u32]) {
  let lts = lifetimes(source);
  let remap = get_temp_registers_remapping(&lts);
  let got: Vec<u32> = remap
    .iter()
    .enumerate()
    .map(|(i, r)| r.unwrap_or(i as u32))
    .collect();
  assert_eq!(got, expected);
}

//=============================================================================
// Straight-line code

#[test]
fn simple_move_add() {
  check_exact(
    "MOV TEMP[1] := IN[0]
     ADD OUT[0] := TEMP[1], IN[0]
     END",
    &[(-1, -1), (0, 1)],
  );
}

#[test]
fn simple_move_add_move() {
  check_exact(
    "MOV TEMP[1] := IN[0]
     ADD TEMP[2] := TEMP[1], IN[0]
     MOV OUT[0] := TEMP[2]
     END",
    &[(-1, -1), (0, 1), (1, 2)],
  );
}

#[test]
fn tex_offsets_are_reads() {
  check_exact(
    "MOV TEMP[1] := IN[0]
     MOV TEMP[2] := IN[1]
     TEX OUT[0] := IN[0], TEXOFS: TEMP[1], TEMP[2]
     END",
    &[(-1, -1), (0, 2), (1, 2)],
  );
}

#[test]
fn read_from_same_instruction() {
  check_exact(
    "ADD TEMP[1] := TEMP[1], IN[0]
     END",
    &[(-1, -1), (0, 1)],
  );
}

#[test]
fn read_from_same_instruction_more_than_once() {
  check_exact(
    "ADD TEMP[1] := TEMP[1], IN[0]
     ADD TEMP[1] := TEMP[1], IN[0]
     MOV OUT[0] := IN[0]
     END",
    &[(-1, -1), (0, 2)],
  );
}

#[test]
fn write_only() {
  check_exact("MOV TEMP[1] := IN[0]\nEND", &[(-1, -1), (0, 1)]);
}

#[test]
fn write_only_twice() {
  check_exact(
    "MOV TEMP[1] := IN[0]
     MOV TEMP[1] := IN[0]
     END",
    &[(-1, -1), (0, 2)],
  );
}

#[test]
fn read_only() {
  check_exact("MOV OUT[0] := TEMP[1]\nEND", &[(-1, -1), (-1, -1)]);
}

#[test]
fn simple_read_for_if() {
  check_exact(
    "MOV TEMP[1] := IN[0]
     ADD OUT[0] := IN[0], IN[1]
     IF TEMP[1]
     ENDIF
     END",
    &[(-1, -1), (0, 2)],
  );
}

#[test]
fn serial_read_write() {
  check_exact(
    "MOV TEMP[1] := IN[0]
     MOV TEMP[2] := TEMP[1]
     MOV TEMP[3] := TEMP[2]
     MOV OUT[0] := TEMP[3]
     END",
    &[(-1, -1), (0, 1), (1, 2), (2, 3)],
  );
}

#[test]
fn two_destination_registers() {
  check_exact(
    "DFRACEXP TEMP[1], TEMP[2] := IN[0]
     ADD OUT[0] := TEMP[1], TEMP[2]
     END",
    &[(-1, -1), (0, 1), (0, 1)],
  );
}

#[test]
fn write_two_only_use_one() {
  check_exact(
    "DFRACEXP TEMP[1], TEMP[2] := IN[0]
     ADD TEMP[3] := TEMP[2], IN[0]
     MOV OUT[1] := TEMP[3]
     END",
    &[(-1, -1), (0, 1), (0, 1), (1, 2)],
  );
}

#[test]
fn three_source_registers() {
  check_exact(
    "DFRACEXP TEMP[1], TEMP[2] := IN[0]
     ADD TEMP[3] := IN[0], IN[1]
     MAD OUT[0] := TEMP[1], TEMP[2], TEMP[3]
     END",
    &[(-1, -1), (0, 2), (0, 2), (1, 2)],
  );
}

#[test]
fn write_past_last_read() {
  check_exact(
    "MOV TEMP[1] := IN[0]
     MOV TEMP[2] := TEMP[1]
     MOV TEMP[1] := TEMP[2]
     END",
    &[(-1, -1), (0, 3), (1, 2)],
  );
}

#[test]
fn write_past_last_read_two_destinations() {
  check_exact(
    "MOV TEMP[1] := IN[0]
     MOV TEMP[2] := IN[0]
     ADD TEMP[3] := TEMP[1], TEMP[2]
     DFRACEXP TEMP[2], TEMP[4] := TEMP[3]
     MOV OUT[1] := TEMP[4]
     END",
    &[(-1, -1), (0, 2), (1, 4), (2, 3), (3, 4)],
  );
}

#[test]
fn overwrite_written_only_temps() {
  check_exact(
    "MOV TEMP[1] := IN[0]
     MOV TEMP[2] := IN[1]
     END",
    &[(-1, -1), (0, 1), (1, 2)],
  );
}

#[test]
fn some_scopes_and_no_end() {
  check_exact(
    "MOV TEMP[1] := IN[0]
     IF TEMP[1]
       MOV TEMP[2] := TEMP[1]
     ENDIF
     IF TEMP[1]
       MOV OUT[0] := TEMP[2]
     ENDIF",
    &[(-1, -1), (0, 4), (2, 5)],
  );
}

#[test]
fn write_select_from_self() {
  check_exact(
    "USEQ TEMP[5] := IN[0], IN[1]
     UCMP TEMP[1] := TEMP[5], IN[1], TEMP[1]
     UCMP TEMP[1] := TEMP[5], IN[1], TEMP[1]
     UCMP TEMP[1] := TEMP[5], IN[1], TEMP[1]
     UCMP TEMP[1] := TEMP[5], IN[1], TEMP[1]
     SLT TEMP[2] := TEMP[1], IN[1]
     UIF TEMP[2]
       MOV TEMP[3] := IN[1]
     ELSE
       MOV TEMP[4] := IN[1]
       MOV TEMP[4] := TEMP[4]
       MOV TEMP[3] := TEMP[4]
     ENDIF
     MOV OUT[1] := TEMP[3]
     END",
    &[(-1, -1), (1, 5), (5, 6), (7, 13), (9, 11), (0, 4)],
  );
}

//=============================================================================
// Loops and conditionals

#[test]
fn simple_move_in_loop() {
  check_exact(
    "MOV TEMP[1] := IN[0]
     BGNLOOP
       ADD TEMP[2] := TEMP[1], IN[0]
       ADD TEMP[3] := TEMP[1], TEMP[2]
       ADD TEMP[3] := TEMP[3], IN[1]
     ENDLOOP
     MOV OUT[0] := TEMP[3]
     END",
    &[(-1, -1), (0, 5), (2, 3), (3, 6)],
  );
}

#[test]
fn move_in_if_in_loop() {
  check_exact(
    "MOV TEMP[1] := IN[0]
     BGNLOOP
       IF IN[1]
         ADD TEMP[2] := TEMP[1], IN[0]
       ENDIF
       ADD TEMP[3] := TEMP[1], TEMP[2]
       ADD TEMP[3] := TEMP[3], IN[1]
     ENDLOOP
     MOV OUT[0] := TEMP[3]
     END",
    &[(-1, -1), (0, 7), (1, 7), (5, 8)],
  );
}

#[test]
fn non_dominant_write_in_if_in_loop() {
  check_exact(
    "BGNLOOP
       MOV TEMP[1] := IN[0]
       IF IN[1]
         MOV TEMP[1] := IN[1]
       ENDIF
       ADD TEMP[2] := TEMP[1], IN[1]
       IF TEMP[2]
         BRK
       ENDIF
     ENDLOOP
     MOV OUT[0] := TEMP[2]
     END",
    &[(-1, -1), (1, 5), (5, 10)],
  );
}

#[test]
fn move_in_if_in_nested_loop() {
  check_exact(
    "MOV TEMP[1] := IN[0]
     BGNLOOP
       BGNLOOP
         IF IN[1]
           ADD TEMP[2] := TEMP[1], IN[0]
         ENDIF
         ADD TEMP[3] := TEMP[1], TEMP[2]
       ENDLOOP
     ENDLOOP
     MOV OUT[0] := TEMP[3]
     END",
    &[(-1, -1), (0, 8), (1, 8), (6, 9)],
  );
}

#[test]
fn write_in_if_and_else_in_loop() {
  check_exact(
    "MOV TEMP[1] := IN[0]
     BGNLOOP
       IF TEMP[1]
         ADD TEMP[2] := TEMP[1], IN[0]
       ELSE
         MOV TEMP[2] := TEMP[1]
       ENDIF
       ADD TEMP[3] := TEMP[1], TEMP[2]
       ADD TEMP[3] := TEMP[3], IN[1]
     ENDLOOP
     MOV OUT[0] := TEMP[3]
     END",
    &[(-1, -1), (0, 9), (3, 7), (7, 10)],
  );
}

#[test]
fn write_in_if_and_else_read_in_else_in_loop() {
  check_exact(
    "MOV TEMP[1] := IN[0]
     BGNLOOP
       IF TEMP[1]
         ADD TEMP[2] := TEMP[1], IN[0]
       ELSE
         ADD TEMP[2] := TEMP[1], TEMP[2]
       ENDIF
       ADD TEMP[3] := TEMP[1], TEMP[2]
       ADD TEMP[3] := TEMP[3], IN[1]
     ENDLOOP
     MOV OUT[0] := TEMP[3]
     END",
    &[(-1, -1), (0, 9), (1, 9), (7, 10)],
  );
}

#[test]
fn write_in_else_read_in_loop() {
  check_exact(
    "MOV TEMP[1] := IN[0]
     BGNLOOP
       IF TEMP[1]
         ADD TEMP[2] := TEMP[1], IN[0]
       ELSE
         ADD TEMP[3] := TEMP[1], TEMP[2]
       ENDIF
       ADD TEMP[1] := TEMP[3], IN[1]
     ENDLOOP
     MOV OUT[0] := TEMP[1]
     END",
    &[(-1, -1), (0, 9), (1, 8), (1, 8)],
  );
}

#[test]
fn write_in_one_if_and_in_another_else_in_loop() {
  check_exact(
    "MOV TEMP[1] := IN[0]
     BGNLOOP
       IF TEMP[1]
         ADD TEMP[2] := TEMP[1], IN[0]
       ENDIF
       IF TEMP[1]
       ELSE
         ADD TEMP[2] := TEMP[1], TEMP[1]
       ENDIF
       ADD TEMP[1] := TEMP[2], IN[1]
     ENDLOOP
     MOV OUT[0] := TEMP[1]
     END",
    &[(-1, -1), (0, 11), (1, 10)],
  );
}

#[test]
fn unconditional_in_first_loop_conditional_in_second() {
  check_at_least(
    "MOV TEMP[1] := IN[0]
     BGNLOOP
       IF TEMP[1]
         ADD TEMP[2] := TEMP[1], IN[0]
       ELSE
         ADD TEMP[2] := TEMP[1], IN[1]
       ENDIF
     ENDLOOP
     BGNLOOP
       IF TEMP[1]
         ADD TEMP[2] := IN[0], TEMP[1]
       ENDIF
       ADD TEMP[1] := TEMP[2], IN[1]
     ENDLOOP
     MOV OUT[0] := TEMP[1]
     END",
    &[(-1, -1), (0, 14), (3, 13)],
  );
}

#[test]
fn read_in_if_in_loop_before_write() {
  check_exact(
    "MOV TEMP[1] := IN[0]
     BGNLOOP
       IF IN[0]
         ADD TEMP[2] := TEMP[1], TEMP[3]
       ENDIF
       ADD TEMP[3] := TEMP[1], TEMP[2]
       ADD TEMP[3] := TEMP[3], IN[1]
     ENDLOOP
     MOV OUT[0] := TEMP[3]
     END",
    &[(-1, -1), (0, 7), (1, 7), (1, 8)],
  );
}

#[test]
fn read_in_loop_before_write_lives_to_the_end() {
  check_exact(
    "BGNLOOP
       MUL TEMP[1] := TEMP[1], IN[1]
       ADD TEMP[1] := TEMP[1], IN[1]
     ENDLOOP
     MOV OUT[0] := TEMP[1]
     END",
    &[(-1, -1), (0, 4)],
  );
}

#[test]
fn nested_if_in_loop_always_written_but_not_propagated() {
  check_exact(
    "BGNLOOP
       IF IN[0]
         IF IN[0]
           MOV TEMP[1] := IN[0]
         ELSE
           MOV TEMP[1] := IN[0]
         ENDIF
       ELSE
         IF IN[0]
           MOV TEMP[1] := IN[0]
         ELSE
           MOV TEMP[1] := IN[0]
         ENDIF
       ENDIF
       MOV OUT[0] := TEMP[1]
     ENDLOOP
     END",
    &[(-1, -1), (3, 14)],
  );
}

#[test]
fn deeply_nested_if_else_in_loop_resolved() {
  check_exact(
    "BGNLOOP
       IF IN[0]
         MOV TEMP[1] := IN[0]
       ELSE
         IF IN[0]
           MOV TEMP[1] := IN[0]
         ELSE
           IF IN[0]
             MOV TEMP[1] := IN[0]
           ELSE
             IF IN[0]
               MOV TEMP[1] := IN[0]
             ELSE
               MOV TEMP[1] := IN[0]
             ENDIF
           ENDIF
         ENDIF
       ENDIF
       ADD TEMP[2] := TEMP[1], IN[1]
     ENDLOOP
     MOV OUT[0] := TEMP[2]
     END",
    &[(-1, -1), (2, 18), (18, 20)],
  );
}

#[test]
fn nested_if_else_in_loop_resolved_in_outer_scope() {
  check_exact(
    "BGNLOOP
       IF IN[0]
         MOV TEMP[1] := IN[0]
         IF IN[0]
           MOV TEMP[1] := IN[0]
         ENDIF
       ELSE
         MOV TEMP[1] := IN[0]
       ENDIF
       ADD TEMP[2] := TEMP[1], IN[1]
     ENDLOOP
     MOV OUT[0] := TEMP[2]
     END",
    &[(-1, -1), (2, 9), (9, 11)],
  );
}

#[test]
fn nested_if_in_loop_parent_if_outside_loop() {
  check_exact(
    "IF IN[0]
       BGNLOOP
         IF IN[0]
           MOV TEMP[1] := IN[0]
         ELSE
           MOV TEMP[1] := IN[0]
         ENDIF
         IF IN[0]
           MOV TEMP[1] := IN[0]
         ELSE
           MOV TEMP[1] := IN[0]
         ENDIF
         MOV TEMP[2] := TEMP[1]
       ENDLOOP
     ELSE
       MOV TEMP[2] := IN[1]
     ENDIF
     MOV OUT[0] := TEMP[2]
     END",
    &[(-1, -1), (3, 12), (12, 17)],
  );
}

#[test]
fn nested_if_in_loop_write_not_always() {
  check_exact(
    "BGNLOOP
       IF IN[0]
         IF IN[0]
           MOV TEMP[1] := IN[0]
         ELSE
           MOV TEMP[1] := IN[0]
         ENDIF
       ELSE
         IF IN[0]
           MOV TEMP[1] := IN[0]
         ENDIF
       ENDIF
       MOV OUT[0] := TEMP[1]
     ENDLOOP
     END",
    &[(-1, -1), (0, 13)],
  );
}

#[test]
fn write_unconditionally_read_in_nested_else() {
  check_exact(
    "BGNLOOP
       IF IN[0]
         MOV TEMP[1] := IN[0]
         IF IN[0]
         ELSE
           MOV OUT[1] := TEMP[1]
         ENDIF
       ELSE
         MOV TEMP[1] := IN[0]
       ENDIF
       MOV OUT[0] := TEMP[1]
     ENDLOOP
     END",
    &[(-1, -1), (2, 10)],
  );
}

#[test]
fn write_in_one_else_branch_read_first_in_other() {
  check_exact(
    "BGNLOOP
       IF IN[0]
         MOV TEMP[1] := IN[0]
       ELSE
         MOV TEMP[1] := IN[1]
       ENDIF
       IF IN[0]
         MOV TEMP[1] := IN[0]
       ELSE
         ADD TEMP[1] := IN[1], TEMP[1]
       ENDIF
       MOV OUT[0] := TEMP[1]
     ENDLOOP
     END",
    &[(-1, -1), (2, 11)],
  );
}

#[test]
fn loop_with_write_after_continue() {
  check_exact(
    "BGNLOOP
       IF IN[0]
         CONT
       ENDIF
       MOV TEMP[1] := IN[0]
     ENDLOOP
     MOV OUT[0] := TEMP[1]
     END",
    &[(-1, -1), (4, 6)],
  );
}

#[test]
fn loop_with_write_after_break() {
  check_exact(
    "BGNLOOP
       IF IN[0]
         BRK
       ENDIF
       MOV TEMP[1] := IN[0]
     ENDLOOP
     MOV OUT[0] := TEMP[1]
     END",
    &[(-1, -1), (0, 6)],
  );
}

#[test]
fn loop_with_write_and_read_after_break() {
  check_exact(
    "BGNLOOP
       IF IN[0]
         BRK
       ENDIF
       MOV TEMP[1] := IN[0]
       MOV TEMP[2] := TEMP[1]
     ENDLOOP
     MOV OUT[0] := TEMP[2]
     END",
    &[(-1, -1), (4, 5), (0, 7)],
  );
}

#[test]
fn nested_loop_with_write_and_read_after_break() {
  check_exact(
    "BGNLOOP
       IF IN[1]
         BRK
       ENDIF
       BGNLOOP
         IF IN[0]
           BRK
         ENDIF
         MOV TEMP[1] := IN[0]
         MOV TEMP[2] := TEMP[1]
       ENDLOOP
       ADD TEMP[3] := TEMP[2], IN[0]
       ADD TEMP[4] := TEMP[3], IN[2]
     ENDLOOP
     MOV OUT[0] := TEMP[4]
     END",
    &[(-1, -1), (8, 9), (0, 13), (11, 12), (0, 14)],
  );
}

#[test]
fn nested_loop_with_write_after_break() {
  check_exact(
    "BGNLOOP
       BGNLOOP
         IF IN[0]
           BRK
         ENDIF
         MOV TEMP[1] := IN[0]
       ENDLOOP
       MOV OUT[0] := TEMP[1]
     ENDLOOP
     END",
    &[(-1, -1), (0, 8)],
  );
}

#[test]
fn loops_with_different_scopes_conditional_write() {
  check_exact(
    "BGNLOOP
       IF IN[0]
         MOV TEMP[1] := IN[0]
       ENDIF
     ENDLOOP
     BGNLOOP
       MOV OUT[0] := TEMP[1]
     ENDLOOP
     END",
    &[(-1, -1), (0, 7)],
  );
}

#[test]
fn loops_with_different_scopes_cond_read_before_write() {
  check_exact(
    "BGNLOOP
       BGNLOOP
         IF IN[0]
           MOV OUT[0] := TEMP[1]
         ENDIF
       ENDLOOP
       BGNLOOP
         MOV TEMP[1] := IN[0]
       ENDLOOP
     ENDLOOP
     END",
    &[(-1, -1), (0, 9)],
  );
}

#[test]
fn first_write_after_read_in_nested_loop() {
  check_exact(
    "MOV TEMP[1] := IN[0]
     BGNLOOP
       BGNLOOP
         MUL TEMP[2] := TEMP[2], TEMP[1]
         MOV TEMP[3] := TEMP[2]
       ENDLOOP
       ADD TEMP[1] := TEMP[1], IN[1]
     ENDLOOP
     MOV OUT[0] := TEMP[3]
     END",
    &[(-1, -1), (0, 7), (1, 7), (4, 8)],
  );
}

#[test]
fn write_in_loop_in_conditional_read_outside() {
  check_exact(
    "BGNLOOP
       IF IN[0]
         BGNLOOP
           MOV TEMP[1] := IN[1]
         ENDLOOP
       ENDIF
       ADD TEMP[2] := TEMP[1], IN[1]
     ENDLOOP
     MOV OUT[0] := TEMP[2]
     END",
    &[(-1, -1), (0, 7), (6, 8)],
  );
}

#[test]
fn write_in_loop_in_cond_read_in_cond_outside_loop() {
  check_exact(
    "BGNLOOP
       IF IN[0]
         BGNLOOP
           MUL TEMP[1] := IN[2], IN[1]
         ENDLOOP
         ADD TEMP[2] := TEMP[1], IN[1]
       ENDIF
     ENDLOOP
     MOV OUT[0] := TEMP[2]
     END",
    &[(-1, -1), (3, 5), (0, 8)],
  );
}

//=============================================================================
// Switch

#[test]
fn use_switch_case() {
  check_exact(
    "MOV TEMP[1] := IN[0]
     MOV TEMP[2] := IN[1]
     MOV TEMP[3] := IN[2]
     SWITCH TEMP[3]
       CASE TEMP[2]
       CASE TEMP[1]
       BRK
       DEFAULT
     ENDSWITCH
     END",
    &[(-1, -1), (0, 5), (1, 4), (2, 3)],
  );
}

#[test]
fn loop_with_write_after_break_in_switch_in_loop() {
  check_exact(
    "SWITCH IN[1]
       CASE IN[1]
         BGNLOOP
           IF IN[0]
             BRK
           ENDIF
           MOV TEMP[1] := IN[0]
         ENDLOOP
       DEFAULT
     ENDSWITCH
     MOV OUT[0] := TEMP[1]
     END",
    &[(-1, -1), (2, 10)],
  );
}

#[test]
fn loop_with_write_in_switch() {
  check_exact(
    "BGNLOOP
       SWITCH IN[0]
         CASE IN[0]
           MOV TEMP[1] := IN[0]
           BRK
         DEFAULT
           BRK
       ENDSWITCH
       MOV OUT[0] := TEMP[1]
     ENDLOOP
     END",
    &[(-1, -1), (0, 9)],
  );
}

#[test]
fn loop_with_read_write_in_switch_different_case() {
  check_exact(
    "BGNLOOP
       SWITCH IN[0]
         CASE IN[0]
           MOV TEMP[1] := IN[0]
           BRK
         DEFAULT
           MOV OUT[0] := TEMP[1]
           BRK
       ENDSWITCH
     ENDLOOP
     END",
    &[(-1, -1), (0, 9)],
  );
}

#[test]
fn loop_with_read_write_in_switch_fall_through() {
  check_exact(
    "BGNLOOP
       SWITCH IN[0]
         CASE IN[0]
           MOV TEMP[1] := IN[0]
         DEFAULT
           MOV OUT[0] := TEMP[1]
           BRK
       ENDSWITCH
     ENDLOOP
     END",
    &[(-1, -1), (0, 8)],
  );
}

#[test]
fn loop_read_write_in_last_case_without_break() {
  check_exact(
    "BGNLOOP
       SWITCH IN[0]
         CASE IN[0]
           MOV TEMP[1] := IN[0]
           BRK
         DEFAULT
           MOV OUT[0] := TEMP[1]
       ENDSWITCH
     ENDLOOP
     END",
    &[(-1, -1), (0, 8)],
  );
}

#[test]
fn loop_with_read_write_in_switch_same_case() {
  check_exact(
    "BGNLOOP
       SWITCH IN[0]
         CASE IN[0]
           MOV TEMP[1] := IN[0]
           MOV OUT[0] := TEMP[1]
           BRK
         DEFAULT
           BRK
       ENDSWITCH
     ENDLOOP
     END",
    &[(-1, -1), (3, 4)],
  );
}

#[test]
fn loop_with_write_in_two_cases_read_after_switch() {
  check_at_least(
    "BGNLOOP
       SWITCH IN[0]
         CASE IN[0]
           MOV TEMP[1] := IN[0]
           BRK
         DEFAULT
           MOV TEMP[1] := IN[0]
           BRK
       ENDSWITCH
       MOV OUT[0] := TEMP[1]
     ENDLOOP
     END",
    &[(-1, -1), (3, 9)],
  );
}

//=============================================================================
// Components

#[test]
fn conditional_component_write_in_loop() {
  for comp in &["y", "z", "w"] {
    let source = format!(
      "BGNLOOP
         MOV TEMP[1].x := IN[1].x
         IF IN[0].x
           MOV TEMP[1].{c} := IN[1].y
         ENDIF
         MOV TEMP[2].xy := TEMP[1].x{c}
       ENDLOOP
       MOV OUT[0] := TEMP[2].xyxy
       END",
      c = comp
    );
    check_exact(&source, &[(-1, -1), (0, 6), (5, 7)]);
  }
  check_exact(
    "BGNLOOP
       MOV TEMP[1].y := IN[1].x
       IF IN[0].x
         MOV TEMP[1].x := IN[1].y
       ENDIF
       MOV TEMP[2].xy := TEMP[1].xy
     ENDLOOP
     MOV OUT[0] := TEMP[2].xyxy
     END",
    &[(-1, -1), (0, 6), (5, 7)],
  );
}

#[test]
fn conditional_component_write_read_other_component_before() {
  check_exact(
    "BGNLOOP
       MOV TEMP[1].x := IN[1].x
       IF IN[0].x
         MOV TEMP[2] := TEMP[1].yyyy
       ENDIF
       MOV TEMP[1].yzw := TEMP[2].yyzw
     ENDLOOP
     ADD OUT[0] := TEMP[2].yyzw, TEMP[1].xyxy
     END",
    &[(-1, -1), (0, 7), (0, 7)],
  );
}

//=============================================================================
// Indirect addressing

#[test]
fn read_indirect_reladdr() {
  check_exact(
    "ARRAYS 16
     MOV TEMP[1] := IN[1]
     MOV TEMP[2] := IN[0]
     MOV TEMP[3] := ARRAY(1)[TEMP[1]+2]
     MOV OUT[0] := TEMP[3]
     END",
    &[(-1, -1), (0, 2), (1, 2), (2, 3)],
  );
}

#[test]
fn read_indirect_reladdr2() {
  check_exact(
    "ARRAYS 16
     MOV TEMP[1] := IN[1]
     MOV TEMP[2] := IN[0]
     MOV TEMP[3] := ARRAY(1)[TEMP[1]+10][4]
     MOV OUT[0] := TEMP[3]
     END",
    &[(-1, -1), (0, 2), (1, 2), (2, 3)],
  );
}

#[test]
fn read_indirect_tex_offset() {
  check_exact(
    "ARRAYS 16
     MOV TEMP[1] := IN[1]
     MOV TEMP[2] := IN[0]
     MOV TEMP[3] := IN[2], TEXOFS: ARRAY(1)[TEMP[1]+5]
     MOV OUT[0] := TEMP[3]
     END",
    &[(-1, -1), (0, 2), (1, 2), (2, 3)],
  );
}

#[test]
fn read_indirect_tex_offset_reladdr2() {
  check_exact(
    "ARRAYS 16
     MOV TEMP[1] := IN[1]
     MOV TEMP[2] := IN[0]
     MOV TEMP[3] := IN[2], TEXOFS: ARRAY(1)[TEMP[1]+10][2]
     MOV OUT[0] := TEMP[3]
     END",
    &[(-1, -1), (0, 2), (1, 2), (2, 3)],
  );
}

#[test]
fn write_indirect_reladdr() {
  check_exact(
    "ARRAYS 16
     MOV TEMP[1] := IN[0]
     MOV TEMP[1] := IN[1]
     MOV ARRAY(1)[TEMP[1]+5] := IN[1]
     END",
    &[(-1, -1), (0, 2)],
  );
}

#[test]
fn write_indirect_reladdr2() {
  check_exact(
    "ARRAYS 16
     MOV TEMP[1] := IN[0]
     MOV TEMP[2] := IN[1]
     MOV ARRAY(1)[TEMP[1]+10][5] := IN[1]
     MOV OUT[0] := IN[0]
     MOV OUT[1] := TEMP[2]
     END",
    &[(-1, -1), (0, 2), (1, 4)],
  );
}

//=============================================================================
// Lifetimes and renaming together

#[test]
fn lifetime_and_renaming() {
  check_renaming(
    "USEQ TEMP[5] := IN[0], IN[1]
     UCMP TEMP[1] := TEMP[5], IN[1], TEMP[1]
     UCMP TEMP[1] := TEMP[5], IN[1], TEMP[1]
     UCMP TEMP[1] := TEMP[5], IN[1], TEMP[1]
     UCMP TEMP[1] := TEMP[5], IN[1], TEMP[1]
     SLT TEMP[2] := TEMP[1], IN[1]
     UIF TEMP[2]
       MOV TEMP[3] := IN[1]
     ELSE
       MOV TEMP[4] := IN[1]
       MOV TEMP[4] := TEMP[4]
       MOV TEMP[3] := TEMP[4]
     ENDIF
     MOV OUT[1] := TEMP[3]
     END",
    &[0, 1, 5, 5, 1, 5],
  );
}

#[test]
fn renaming_ignores_unused_read_only() {
  check_renaming(
    "USEQ TEMP[1] := IN[0], IN[1]
     UCMP TEMP[2] := TEMP[1], IN[1], TEMP[2]
     UCMP TEMP[4] := TEMP[2], IN[1], TEMP[1]
     ADD TEMP[5] := TEMP[2], TEMP[4]
     UIF TEMP[7]
       ADD TEMP[8] := TEMP[5], TEMP[4]
     ENDIF
     MOV OUT[1] := TEMP[8]
     END",
    &[0, 1, 2, 3, 1, 2, 6, 7, 1],
  );
}

#[test]
fn renaming_into_read_only_condition_scope() {
  check_renaming(
    "USEQ TEMP[1] := IN[0], IN[1]
     UIF TEMP[7]
       UCMP TEMP[2] := TEMP[1], IN[1], TEMP[2]
       UCMP TEMP[4] := TEMP[2], IN[1], TEMP[1]
       ADD TEMP[5] := TEMP[2], TEMP[4]
       ADD TEMP[8] := TEMP[5], TEMP[4]
     ENDIF
     MOV OUT[1] := TEMP[8]
     END",
    &[0, 1, 2, 3, 1, 2, 6, 7, 1],
  );
}

#[test]
fn renaming_onto_temp_zero() {
  check_renaming(
    "USEQ TEMP[0] := IN[0], IN[1]
     UCMP TEMP[2] := TEMP[0], IN[1], TEMP[2]
     UCMP TEMP[4] := TEMP[2], IN[1], TEMP[0]
     UIF TEMP[7]
       ADD TEMP[5] := TEMP[4], TEMP[4]
       ADD TEMP[8] := TEMP[5], TEMP[4]
     ENDIF
     MOV OUT[1] := TEMP[8]
     END",
    &[0, 1, 2, 3, 0, 2, 6, 7, 0],
  );
}
