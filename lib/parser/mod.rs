//! Parses MuASM source text into a `Program`.
//!
//! Source is line oriented. `//` starts a comment that runs to the end of the
//! line. A line may begin with `label:`, which binds the label to the next
//! instruction; a line holding only a label emits nothing.
//!
//! Expressions use precedence climbing, loosest first: `&`, then `+`/`-`,
//! then `*`. A `-` is only read as a sign when it directly precedes an
//! integer in operand position.

mod lexer;

pub use self::lexer::{is_identifier, tokenize, Token, TokenKind};

use crate::error::ParseError;
use crate::il::{self, BinaryOperator, Expression, Instruction, JumpTarget};
use crate::Error;
use log::debug;
use std::collections::BTreeMap;

/// Parse MuASM source into a `Program`, resolving all labels.
pub fn parse(source: &str) -> Result<il::Program, Error> {
    let mut entries: Vec<il::ProgramEntry> = Vec::new();
    let mut labels: BTreeMap<String, usize> = BTreeMap::new();
    let mut pending_labels: Vec<String> = Vec::new();

    for (index, raw_line) in source.lines().enumerate() {
        let line_number = index + 1;

        let line = match raw_line.find("//") {
            Some(position) => &raw_line[..position],
            None => raw_line,
        };
        if line.trim().is_empty() {
            continue;
        }

        let (label, rest, offset) = split_label(line)
            .map_err(|e| Error::Parse(e.with_line(line_number)))?;

        if let Some(label) = label {
            if labels.contains_key(&label) || pending_labels.contains(&label) {
                return Err(ParseError::new(format!("Duplicate label `{}`", label))
                    .with_line(line_number)
                    .into());
            }
            pending_labels.push(label);
        }

        if rest.trim().is_empty() {
            continue;
        }

        let pc = entries.len();
        let instruction = parse_tokens(rest, offset)
            .map_err(|e| Error::Parse(e.with_line(line_number)))?;

        let first_label = pending_labels.first().cloned();
        for label in pending_labels.drain(..) {
            labels.insert(label, pc);
        }

        entries.push(il::ProgramEntry::new(
            first_label,
            instruction,
            line_number,
            pc,
        ));
    }

    // Trailing labels point just past the last instruction.
    let end = entries.len();
    for label in pending_labels.drain(..) {
        labels.insert(label, end);
    }

    let mut program = il::Program::new(entries, labels);
    resolve_targets(&mut program)?;

    debug!(
        "parsed {} instructions, {} labels",
        program.len(),
        program.labels().len()
    );

    Ok(program)
}

/// Parse a single instruction with no label prefix.
///
/// Branch and jump targets are not resolved against any label table, though
/// constant jump targets are folded.
pub fn parse_instruction(text: &str) -> Result<Instruction, Error> {
    let text = match text.find("//") {
        Some(position) => &text[..position],
        None => text,
    };
    let mut instruction = parse_tokens(text, 0)?;
    if let Instruction::Jmp { target, resolved } = &mut instruction {
        *resolved = classify_jump(target, &BTreeMap::new());
    }
    Ok(instruction)
}

/// Split an optional `label:` prefix off a line. Returns the label, the rest
/// of the line, and the column the rest starts at.
fn split_label(line: &str) -> Result<(Option<String>, &str, usize), ParseError> {
    match line.find(':') {
        Some(position) => {
            let label = line[..position].trim();
            if !is_identifier(label) {
                return Err(ParseError::new(format!("Invalid label `{}`", label)).with_column(0));
            }
            Ok((Some(label.to_string()), &line[position + 1..], position + 1))
        }
        None => Ok((None, line, 0)),
    }
}

fn parse_tokens(text: &str, offset: usize) -> Result<Instruction, ParseError> {
    let tokens = tokenize(text, offset)?;
    let mut parser = Parser::new(tokens, offset + text.len());
    let instruction = parser.instruction()?;
    parser.expect_end()?;
    Ok(instruction)
}

fn resolve_targets(program: &mut il::Program) -> Result<(), Error> {
    let labels = program.labels().clone();
    for entry in program.entries_mut() {
        let source_line = entry.source_line();
        match entry.instruction_mut() {
            Instruction::Beqz {
                target, target_pc, ..
            } => match labels.get(target.as_str()) {
                Some(pc) => *target_pc = Some(*pc),
                None => {
                    return Err(ParseError::new(format!("Undefined label `{}`", target))
                        .with_line(source_line)
                        .into())
                }
            },
            Instruction::Jmp { target, resolved } => {
                *resolved = classify_jump(target, &labels);
            }
            Instruction::Skip
            | Instruction::Assign { .. }
            | Instruction::Load { .. }
            | Instruction::Store { .. }
            | Instruction::Spbarr
            | Instruction::Cmov { .. } => {}
        }
    }
    Ok(())
}

fn classify_jump(target: &Expression, labels: &BTreeMap<String, usize>) -> JumpTarget {
    if let Expression::Register(name) = target {
        return match labels.get(name) {
            Some(pc) => JumpTarget::Pc(*pc),
            None => JumpTarget::Label(name.clone()),
        };
    }
    match target.eval_constant() {
        Some(value) if value >= 0 => JumpTarget::Pc(value as usize),
        _ => JumpTarget::Dynamic,
    }
}

/// The most operators and parentheses one instruction may contain. Every
/// consumer of an `Expression` recurses over it, so this bounds their depth.
const MAX_EXPRESSION_NODES: usize = 512;

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    end_column: usize,
    nodes: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>, end_column: usize) -> Parser {
        Parser {
            tokens,
            position: 0,
            end_column,
            nodes: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn column(&self) -> usize {
        self.peek()
            .map(|token| token.column())
            .unwrap_or(self.end_column)
    }

    fn expect_end(&self) -> Result<(), ParseError> {
        match self.peek() {
            Some(token) => Err(ParseError::new(format!(
                "Unexpected trailing token `{}`",
                token.kind()
            ))
            .with_column(token.column())),
            None => Ok(()),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), ParseError> {
        let column = self.column();
        match self.next() {
            Some(ref token) if *token.kind() == kind => Ok(()),
            Some(token) => Err(ParseError::new(format!(
                "Expected `{}`, found `{}`",
                kind,
                token.kind()
            ))
            .with_column(column)),
            None => Err(ParseError::new(format!("Expected `{}`", kind)).with_column(column)),
        }
    }

    fn identifier(&mut self) -> Result<String, ParseError> {
        let column = self.column();
        match self.next() {
            Some(token) => match token.kind() {
                TokenKind::Identifier(name) => Ok(name.clone()),
                kind => Err(ParseError::new(format!("Expected a register, found `{}`", kind))
                    .with_column(column)),
            },
            None => Err(ParseError::new("Expected a register").with_column(column)),
        }
    }

    fn instruction(&mut self) -> Result<Instruction, ParseError> {
        let column = self.column();
        let head = match self.peek() {
            Some(token) => match token.kind() {
                TokenKind::Identifier(name) => name.clone(),
                kind => {
                    return Err(ParseError::new(format!("Expected an instruction, found `{}`", kind))
                        .with_column(column))
                }
            },
            None => return Err(ParseError::new("Expected an instruction").with_column(column)),
        };

        match head.as_str() {
            "skip" => {
                self.next();
                Ok(Instruction::skip())
            }
            "spbarr" => {
                self.next();
                Ok(Instruction::spbarr())
            }
            "load" => {
                self.next();
                let dest = self.identifier()?;
                self.expect(TokenKind::Comma)?;
                let addr = self.expression(0)?;
                Ok(Instruction::load(dest, addr))
            }
            "store" => {
                self.next();
                let src = self.identifier()?;
                self.expect(TokenKind::Comma)?;
                let addr = self.expression(0)?;
                Ok(Instruction::store(src, addr))
            }
            "beqz" => {
                self.next();
                let cond = self.expression(0)?;
                self.expect(TokenKind::Comma)?;
                let target = self.identifier()?;
                Ok(Instruction::beqz(cond, target))
            }
            "jmp" => {
                self.next();
                let target = self.expression(0)?;
                Ok(Instruction::jmp(target))
            }
            _ => {
                let dest = self.identifier()?;
                self.expect(TokenKind::Arrow)?;
                let value = self.expression(0)?;
                if matches!(self.peek().map(|t| t.kind()), Some(TokenKind::Question)) {
                    self.next();
                    let cond = self.expression(0)?;
                    Ok(Instruction::cmov(dest, cond, value))
                } else {
                    Ok(Instruction::assign(dest, value))
                }
            }
        }
    }

    fn grow(&mut self, column: usize) -> Result<(), ParseError> {
        self.nodes += 1;
        if self.nodes > MAX_EXPRESSION_NODES {
            return Err(ParseError::new("Expression nested too deeply").with_column(column));
        }
        Ok(())
    }

    fn binary_operator(&self) -> Option<BinaryOperator> {
        match self.peek()?.kind() {
            TokenKind::Plus => Some(BinaryOperator::Add),
            TokenKind::Minus => Some(BinaryOperator::Sub),
            TokenKind::Star => Some(BinaryOperator::Mul),
            TokenKind::Amp => Some(BinaryOperator::And),
            _ => None,
        }
    }

    fn expression(&mut self, min_precedence: u8) -> Result<Expression, ParseError> {
        let mut lhs = self.primary()?;
        while let Some(op) = self.binary_operator() {
            if op.precedence() < min_precedence {
                break;
            }
            let column = self.column();
            self.grow(column)?;
            self.next();
            let rhs = self.expression(op.precedence() + 1)?;
            lhs = Expression::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn primary(&mut self) -> Result<Expression, ParseError> {
        let column = self.column();
        let token = match self.next() {
            Some(token) => token,
            None => return Err(ParseError::new("Incomplete expression").with_column(column)),
        };
        match token.kind() {
            TokenKind::Identifier(name) => Ok(Expression::register(name.clone())),
            TokenKind::Integer(value) => Ok(Expression::constant(*value)),
            TokenKind::Minus => {
                let integer = self.peek().and_then(|token| match token.kind() {
                    TokenKind::Integer(value) => Some(*value),
                    _ => None,
                });
                match integer {
                    Some(value) => {
                        self.next();
                        Ok(Expression::constant(value.wrapping_neg()))
                    }
                    None => Err(ParseError::new("Unary `-` must precede an integer")
                        .with_column(column)),
                }
            }
            TokenKind::LParen => {
                self.grow(column)?;
                let expr = self.expression(0)?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            kind => Err(ParseError::new(format!("Unexpected token `{}` in expression", kind))
                .with_column(column)),
        }
    }
}
