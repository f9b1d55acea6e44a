/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Parser for the textual form of programs, as printed by `Program`'s
//! `Display` implementation:
//!
//! ```text
//! ARRAYS 4, 2            ; optional: the length of each array
//!   MOV TEMP[1].xy := IN[0].zwww
//!   UIF TEMP[1].x
//!     MOV ARRAY(1)[ADDR[0].xxxx+2].w := TEMP[1].yyyy
//!   ENDIF
//!   TEX OUT[0] := IN[1], TEXOFS: TEMP[1]
//!   END
//! ```
//!
//! An instruction takes one line.  Destinations come before `:=`; without
//! `:=` all operands are sources.  A swizzle with fewer than four components
//! repeats its last one.

use std::fs::File;
use std::io;
use std::io::prelude::*;
use std::iter::Peekable;
use std::path::PathBuf;
use std::str::CharIndices;

use regmerge::{
  component_from_name, DstReg, Inst, Opcode, Program, RegFile, SrcReg,
  Swizzle, WriteMask,
};

#[derive(Debug)]
pub enum ParseError {
  IoError(io::Error),
  Parse(String),
}

impl From<io::Error> for ParseError {
  fn from(err: io::Error) -> ParseError {
    ParseError::IoError(err)
  }
}

impl ToString for ParseError {
  fn to_string(&self) -> String {
    match self {
      ParseError::IoError(err) => format!("i/o error: {}", err),
      ParseError::Parse(msg) => msg.clone(),
    }
  }
}

pub type ParseResult<T> = Result<T, ParseError>;

pub fn parse_file(path: PathBuf) -> ParseResult<Program> {
  let basename = path
    .file_stem()
    .and_then(|s| s.to_str())
    .unwrap_or("program")
    .to_string();
  let mut file = File::open(path)?;
  let mut content = String::new();
  file.read_to_string(&mut content)?;
  parse_content(&basename, &content)
}

/// A register reference before it is known to be a source or a
/// destination.
struct Operand {
  file: RegFile,
  array_id: u32,
  index: i32,
  index2d: Option<i32>,
  reladdr: Option<SrcReg>,
  reladdr2: Option<SrcReg>,
  suffix: Option<String>,
}

struct Parser<'str> {
  iter: Peekable<CharIndices<'str>>,
  line: usize,
}

impl<'str> Parser<'str> {
  fn new(source: &'str str) -> Self {
    Self { iter: source.char_indices().peekable(), line: 1 }
  }

  fn peek(&mut self) -> Option<char> {
    self.iter.peek().map(|(_, c)| *c)
  }

  fn advance(&mut self) -> Option<char> {
    self.iter.next().map(|(_, c)| c)
  }

  fn skip_comment(&mut self) {
    while let Some(c) = self.peek() {
      if c == '\n' {
        break;
      }
      self.advance();
    }
  }

  fn skip_whitespace_and_comments(&mut self) {
    while let Some(c) = self.peek() {
      if c == ' ' || c == '\t' || c == '\r' {
        self.advance();
      } else if c == '\n' {
        self.advance();
        self.line += 1;
      } else if c == ';' {
        self.skip_comment();
      } else {
        break;
      }
    }
  }

  /// Skips blanks and a trailing comment, but not the end of the line.
  fn skip_blanks(&mut self) {
    while let Some(c) = self.peek() {
      if c == ' ' || c == '\t' || c == '\r' {
        self.advance();
      } else if c == ';' {
        self.skip_comment();
      } else {
        break;
      }
    }
  }

  fn at_line_end(&mut self) -> bool {
    self.skip_blanks();
    match self.peek() {
      None | Some('\n') => true,
      _ => false,
    }
  }

  fn try_read_char(&mut self, expected: char) -> bool {
    self.skip_blanks();
    if self.peek() == Some(expected) {
      self.advance();
      true
    } else {
      false
    }
  }

  fn expect_char(&mut self, expected: char) -> ParseResult<()> {
    if self.try_read_char(expected) {
      Ok(())
    } else {
      self.error(&format!("expected char '{}'", expected))
    }
  }

  fn read_ident(&mut self) -> ParseResult<String> {
    self.skip_blanks();
    let mut ident = String::new();
    while let Some(c) = self.peek() {
      if !is_alpha_numeric(c) || (ident.is_empty() && !is_alpha(c)) {
        break;
      }
      ident.push(c);
      self.advance();
    }
    if ident.is_empty() {
      self.error("expected identifier or keyword")
    } else {
      Ok(ident)
    }
  }

  fn try_read_int(&mut self) -> ParseResult<Option<i32>> {
    self.skip_blanks();
    let negative = self.try_read_char('-');
    let mut digits = String::new();
    while let Some(c) = self.peek() {
      if !is_digit(c) {
        break;
      }
      digits.push(c);
      self.advance();
    }
    if digits.is_empty() {
      return if negative {
        self.error("expected a number after minus sign")
      } else {
        Ok(None)
      };
    }
    match digits.parse::<i32>() {
      Ok(n) => Ok(Some(if negative { -n } else { n })),
      Err(_) => self.error("number out of range"),
    }
  }

  fn read_int(&mut self) -> ParseResult<i32> {
    match self.try_read_int()? {
      Some(n) => Ok(n),
      None => self.error("expected integer"),
    }
  }

  /// Reads `[idx]` or `[REG+idx]`.
  fn read_index(&mut self) -> ParseResult<(i32, Option<SrcReg>)> {
    self.expect_char('[')?;
    let index = if let Some(n) = self.try_read_int()? {
      (n, None)
    } else {
      let rel = self.read_operand()?;
      let rel = self.to_src(rel)?;
      self.expect_char('+')?;
      (self.read_int()?, Some(rel))
    };
    self.expect_char(']')?;
    Ok(index)
  }

  fn read_operand(&mut self) -> ParseResult<Operand> {
    let name = self.read_ident()?;
    let file = match RegFile::from_name(&name) {
      Some(file) => file,
      None => return self.error(&format!("unknown register file '{}'", name)),
    };
    let mut array_id = 0;
    if file == RegFile::Array {
      self.expect_char('(')?;
      let id = self.read_int()?;
      if id <= 0 {
        return self.error("array ids start at 1");
      }
      array_id = id as u32;
      self.expect_char(')')?;
    }

    let (mut index, mut reladdr) = self.read_index()?;
    let (mut index2d, mut reladdr2) = (None, None);
    self.skip_blanks();
    if self.peek() == Some('[') {
      let (inner, inner_rel) = self.read_index()?;
      index2d = Some(index);
      reladdr2 = reladdr;
      index = inner;
      reladdr = inner_rel;
    }

    let suffix = if self.try_read_char('.') {
      let mut letters = String::new();
      while let Some(c) = self.peek() {
        if component_from_name(c).is_none() && c != '_' {
          break;
        }
        letters.push(c);
        self.advance();
      }
      Some(letters)
    } else {
      None
    };

    Ok(Operand { file, array_id, index, index2d, reladdr, reladdr2, suffix })
  }

  fn to_src(&self, op: Operand) -> ParseResult<SrcReg> {
    let mut src = SrcReg::new(op.file, op.index);
    src.array_id = op.array_id;
    src.index2d = op.index2d;
    src.reladdr = op.reladdr.map(Box::new);
    src.reladdr2 = op.reladdr2.map(Box::new);
    if let Some(letters) = op.suffix {
      let mut lanes = [0u8; 4];
      let mut last = None;
      for (lane, c) in letters.chars().enumerate() {
        if lane >= 4 {
          return self.error("swizzle with more than four components");
        }
        match component_from_name(c) {
          Some(comp) => {
            lanes[lane] = comp;
            last = Some(comp);
          }
          None => return self.error(&format!("bad swizzle '{}'", letters)),
        }
      }
      let last = match last {
        Some(last) => last,
        None => return self.error("empty swizzle"),
      };
      for lane in letters.len()..4 {
        lanes[lane] = last;
      }
      src.swizzle = Swizzle::new(lanes);
    }
    Ok(src)
  }

  fn to_dst(&self, op: Operand) -> ParseResult<DstReg> {
    let mut dst = DstReg::new(op.file, op.index);
    dst.array_id = op.array_id;
    dst.index2d = op.index2d;
    dst.reladdr = op.reladdr.map(Box::new);
    dst.reladdr2 = op.reladdr2.map(Box::new);
    if let Some(letters) = op.suffix {
      let mut bits = 0u8;
      if letters != "_" {
        for c in letters.chars() {
          match component_from_name(c) {
            Some(comp) if bits >> comp == 0 => bits |= 1 << comp,
            _ => {
              return self.error(&format!("bad write mask '{}'", letters))
            }
          }
        }
      }
      dst.writemask = WriteMask::from_bits(bits);
    }
    Ok(dst)
  }

  fn read_operand_list(&mut self) -> ParseResult<Vec<Operand>> {
    let mut list = vec![self.read_operand()?];
    loop {
      self.skip_blanks();
      if self.peek() != Some(',') {
        return Ok(list);
      }
      // Stop before the offsets.
      let mut ahead = self.iter.clone();
      ahead.next();
      while let Some((_, ' ')) = ahead.peek() {
        ahead.next();
      }
      if let Some((_, 'T')) = ahead.peek() {
        let rest: String = ahead.take(6).map(|(_, c)| c).collect();
        if rest == "TEXOFS" {
          return Ok(list);
        }
      }
      self.advance();
      list.push(self.read_operand()?);
    }
  }

  fn read_inst(&mut self) -> ParseResult<Inst> {
    let name = self.read_ident()?;
    let op = match Opcode::from_name(&name) {
      Some(op) => op,
      None => return self.error(&format!("unknown opcode '{}'", name)),
    };
    let mut inst = Inst::new(op);
    if self.at_line_end() {
      return Ok(inst);
    }

    if !self.peek_keyword("TEXOFS") {
      let first = self.read_operand_list()?;
      if self.try_read_char(':') {
        self.expect_char('=')?;
        for op in first {
          inst.dst.push(self.to_dst(op)?);
        }
        for op in self.read_operand_list()? {
          inst.src.push(self.to_src(op)?);
        }
      } else {
        for op in first {
          inst.src.push(self.to_src(op)?);
        }
      }
      if !self.at_line_end() {
        self.expect_char(',')?;
      }
    }

    if !self.at_line_end() {
      let keyword = self.read_ident()?;
      if keyword != "TEXOFS" {
        return self.error("expected TEXOFS");
      }
      self.expect_char(':')?;
      for op in self.read_operand_list()? {
        inst.tex_offsets.push(self.to_src(op)?);
      }
    }

    if !self.at_line_end() {
      return self.error("unexpected text after instruction");
    }
    Ok(inst)
  }

  fn peek_keyword(&mut self, keyword: &str) -> bool {
    self.skip_blanks();
    let ahead: String =
      self.iter.clone().take(keyword.len()).map(|(_, c)| c).collect();
    ahead == keyword
  }

  fn is_done(&mut self) -> bool {
    self.skip_whitespace_and_comments();
    self.peek().is_none()
  }

  fn error<T>(&self, msg: &str) -> ParseResult<T> {
    Err(ParseError::Parse(format!("error at line {}: {}", self.line, msg)))
  }
}

pub fn parse_content(_name: &str, content: &str) -> ParseResult<Program> {
  let mut parser = Parser::new(content);
  let mut array_sizes = Vec::new();
  let mut insts = Vec::new();

  if !parser.is_done() && parser.peek_keyword("ARRAYS") {
    parser.read_ident()?;
    loop {
      let size = parser.read_int()?;
      if size <= 0 {
        return parser.error("arrays must have a positive length");
      }
      array_sizes.push(size as u32);
      if !parser.try_read_char(',') {
        break;
      }
    }
    if !parser.at_line_end() {
      return parser.error("unexpected text after array declaration");
    }
  }

  while !parser.is_done() {
    let inst = parser.read_inst()?;
    let max_id = inst
      .src
      .iter()
      .chain(inst.tex_offsets.iter())
      .map(|s| s.array_id)
      .chain(inst.dst.iter().map(|d| d.array_id))
      .max()
      .unwrap_or(0);
    if max_id as usize > array_sizes.len() {
      return parser.error(&format!("array {} is not declared", max_id));
    }
    insts.push(inst);
  }

  Ok(Program::new(insts, array_sizes))
}

fn is_digit(c: char) -> bool {
  c >= '0' && c <= '9'
}

fn is_alpha(c: char) -> bool {
  c >= 'a' && c <= 'z' || c >= 'A' && c <= 'Z' || c == '_'
}

fn is_alpha_numeric(c: char) -> bool {
  is_digit(c) || is_alpha(c)
}
