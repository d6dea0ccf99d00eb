//! Builds an AST from template segments.
//!
//! Grammar inside an action:
//!
//! ```text
//! pipeline := command ('|' command)*
//! command  := IDENT operand* | operand
//! operand  := STRING | INT | FLOAT | BOOL | FIELD | IDENT | '(' pipeline ')'
//! ```
//!
//! A piped value becomes the last argument of the next command.

use crate::error::TemplateError;
use crate::lexer::{split_template, tokenize, Segment, Spanned, Token};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Action(Pipeline),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Pipeline {
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Command {
    Call { name: String, args: Vec<Operand> },
    Value(Operand),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    Literal(Value),
    Field(Vec<String>),
    /// A function name used as an argument: called with no arguments.
    Call(String),
    Nested(Pipeline),
}

pub(crate) fn parse_template(src: &str) -> Result<Vec<Node>, TemplateError> {
    let mut nodes = Vec::new();
    for segment in split_template(src)? {
        match segment {
            Segment::Text(text) => nodes.push(Node::Text(text)),
            Segment::Action { body, offset } => {
                let trimmed = body.trim();
                if trimmed.starts_with("/*") && trimmed.ends_with("*/") {
                    continue;
                }
                let base = offset + 2;
                let tokens = tokenize(&body, base)?;
                let mut parser = Parser {
                    tokens,
                    pos: 0,
                    end_offset: base + body.len(),
                };
                let pipeline = parser.pipeline()?;
                if let Some(extra) = parser.peek() {
                    return Err(TemplateError::parse(
                        extra.offset,
                        format!("unexpected {:?} in action", extra.token),
                    ));
                }
                nodes.push(Node::Action(pipeline));
            }
        }
    }
    Ok(nodes)
}

/// Every function name a parsed template would call.
pub(crate) fn called_functions(nodes: &[Node]) -> Vec<&str> {
    fn walk_pipeline<'a>(p: &'a Pipeline, out: &mut Vec<&'a str>) {
        for cmd in &p.commands {
            match cmd {
                Command::Call { name, args } => {
                    out.push(name);
                    args.iter().for_each(|a| walk_operand(a, out));
                }
                Command::Value(op) => walk_operand(op, out),
            }
        }
    }
    fn walk_operand<'a>(op: &'a Operand, out: &mut Vec<&'a str>) {
        match op {
            Operand::Call(name) => out.push(name),
            Operand::Nested(p) => walk_pipeline(p, out),
            Operand::Literal(_) | Operand::Field(_) => {}
        }
    }

    let mut out = Vec::new();
    for node in nodes {
        if let Node::Action(p) = node {
            walk_pipeline(p, &mut out);
        }
    }
    out
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    end_offset: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Spanned> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn offset(&self) -> usize {
        self.peek().map(|t| t.offset).unwrap_or(self.end_offset)
    }

    fn at_command_end(&self) -> bool {
        matches!(
            self.peek().map(|t| &t.token),
            None | Some(Token::Pipe) | Some(Token::RParen)
        )
    }

    fn pipeline(&mut self) -> Result<Pipeline, TemplateError> {
        let mut commands = vec![self.command()?];
        while matches!(self.peek().map(|t| &t.token), Some(Token::Pipe)) {
            self.pos += 1;
            commands.push(self.command()?);
        }
        Ok(Pipeline { commands })
    }

    fn command(&mut self) -> Result<Command, TemplateError> {
        if self.at_command_end() {
            return Err(TemplateError::parse(self.offset(), "missing value for command"));
        }

        if let Some(Token::Ident(name)) = self.peek().map(|t| &t.token) {
            let name = name.clone();
            self.pos += 1;
            let mut args = Vec::new();
            while !self.at_command_end() {
                args.push(self.operand()?);
            }
            return Ok(Command::Call { name, args });
        }

        let operand = self.operand()?;
        if !self.at_command_end() {
            return Err(TemplateError::parse(
                self.offset(),
                "only a function can take arguments",
            ));
        }
        Ok(Command::Value(operand))
    }

    fn operand(&mut self) -> Result<Operand, TemplateError> {
        let offset = self.offset();
        let Some(Spanned { token, .. }) = self.next() else {
            return Err(TemplateError::parse(offset, "unexpected end of action"));
        };
        Ok(match token {
            Token::Str(s) => Operand::Literal(Value::Str(s)),
            Token::Int(i) => Operand::Literal(Value::Int(i)),
            Token::Float(x) => Operand::Literal(Value::Float(x)),
            Token::Bool(b) => Operand::Literal(Value::Bool(b)),
            Token::Field(path) => Operand::Field(path),
            Token::Ident(name) => Operand::Call(name),
            Token::LParen => {
                let inner = self.pipeline()?;
                match self.next() {
                    Some(Spanned {
                        token: Token::RParen,
                        ..
                    }) => Operand::Nested(inner),
                    _ => return Err(TemplateError::parse(offset, "unclosed left paren")),
                }
            }
            Token::RParen | Token::Pipe => {
                return Err(TemplateError::parse(offset, format!("unexpected {token:?}")))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_action(src: &str) -> Pipeline {
        match parse_template(src).unwrap().as_slice() {
            [Node::Action(p)] => p.clone(),
            other => panic!("expected one action, got {other:?}"),
        }
    }

    #[test]
    fn call_with_nested_and_pipe() {
        let p = single_action("{{ addMinutes 30 (addHours 1 now) | unix }}");
        assert_eq!(p.commands.len(), 2);
        let Command::Call { name, args } = &p.commands[0] else {
            panic!("expected call");
        };
        assert_eq!(name, "addMinutes");
        assert_eq!(args[0], Operand::Literal(Value::Int(30)));
        assert!(matches!(&args[1], Operand::Nested(_)));
        assert_eq!(
            p.commands[1],
            Command::Call {
                name: "unix".into(),
                args: vec![]
            }
        );
    }

    #[test]
    fn value_command() {
        let p = single_action("{{ .Variables.name }}");
        assert_eq!(
            p.commands,
            vec![Command::Value(Operand::Field(vec![
                "Variables".into(),
                "name".into()
            ]))]
        );
    }

    #[test]
    fn comments_are_dropped() {
        let nodes = parse_template("a{{/* note */}}b").unwrap();
        assert_eq!(nodes, vec![Node::Text("a".into()), Node::Text("b".into())]);
    }

    #[test]
    fn collects_function_names() {
        let nodes = parse_template("{{ jitter (now) \"5s\" | rfc3339 }} {{ seq }}").unwrap();
        assert_eq!(called_functions(&nodes), vec!["jitter", "now", "rfc3339", "seq"]);
    }

    #[test]
    fn syntax_errors() {
        for bad in ["{{ }}", "{{ now | }}", "{{ (now }}", "{{ 1 2 }}", "{{ now ) }}", "{{ | unix }}"] {
            assert!(
                matches!(parse_template(bad), Err(TemplateError::Parse { .. })),
                "expected parse error for {bad}"
            );
        }
    }
}
