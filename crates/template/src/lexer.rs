//! Splits template text into literal and action segments, and tokenizes the
//! inside of each action.

use crate::error::TemplateError;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Segment {
    Text(String),
    /// Body of a `{{ ... }}` action with trim markers removed.
    Action { body: String, offset: usize },
}

/// Split `src` into text and action segments, applying `{{-` / `-}}` trimming.
pub(crate) fn split_template(src: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut pos = 0;
    let mut trim_next_text = false;

    while pos < src.len() {
        let rest = &src[pos..];
        let Some(open_rel) = rest.find(OPEN) else {
            push_text(&mut segments, rest, trim_next_text);
            break;
        };

        let mut text = &rest[..open_rel];
        if trim_next_text {
            text = text.trim_start();
        }

        let action_start = pos + open_rel;
        let mut body_start = action_start + OPEN.len();

        // "{{- " trims whitespace before the action; "{{-3}}" is a number.
        let after_open = &src[body_start..];
        if after_open.starts_with('-')
            && after_open[1..].starts_with(|c: char| c.is_whitespace())
        {
            text = text.trim_end();
            body_start += 1;
        }
        if !text.is_empty() {
            segments.push(Segment::Text(text.to_string()));
        }

        let close_rel = find_close(&src[body_start..])
            .ok_or_else(|| TemplateError::parse(action_start, "unclosed action"))?;
        let mut body = &src[body_start..body_start + close_rel];

        trim_next_text = false;
        if let Some(stripped) = body.strip_suffix('-') {
            if stripped.ends_with(|c: char| c.is_whitespace()) {
                body = stripped;
                trim_next_text = true;
            }
        }

        segments.push(Segment::Action {
            body: body.to_string(),
            offset: action_start,
        });
        pos = body_start + close_rel + CLOSE.len();
    }

    Ok(segments)
}

fn push_text(segments: &mut Vec<Segment>, text: &str, trim_start: bool) {
    let text = if trim_start { text.trim_start() } else { text };
    if !text.is_empty() {
        segments.push(Segment::Text(text.to_string()));
    }
}

/// Byte offset of the closing `}}`, skipping over quoted literals.
fn find_close(body: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut i = 0;
    let mut quote: Option<u8> = None;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(b'"') if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'`' => quote = Some(b),
            None if bytes[i..].starts_with(CLOSE.as_bytes()) => return Some(i),
            None => {}
        }
        i += 1;
    }
    None
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    /// `.Variables.name` becomes `["Variables", "name"]`.
    Field(Vec<String>),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Pipe,
    LParen,
    RParen,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub offset: usize,
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Tokenize an action body. `base` is the body's offset in the full template.
pub(crate) fn tokenize(body: &str, base: usize) -> Result<Vec<Spanned>, TemplateError> {
    let chars: Vec<(usize, char)> = body.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    let offset_of = |idx: usize| base + chars.get(idx).map(|(o, _)| *o).unwrap_or(body.len());
    let slice = |from: usize, to: usize| -> String { chars[from..to].iter().map(|(_, c)| c).collect() };

    while i < chars.len() {
        let c = chars[i].1;
        let start = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let token = match c {
            '|' => {
                i += 1;
                Token::Pipe
            }
            '(' => {
                i += 1;
                Token::LParen
            }
            ')' => {
                i += 1;
                Token::RParen
            }
            '"' => {
                i += 1;
                let mut out = String::new();
                loop {
                    let Some(&(_, ch)) = chars.get(i) else {
                        return Err(TemplateError::parse(offset_of(start), "unterminated quoted string"));
                    };
                    i += 1;
                    match ch {
                        '"' => break,
                        '\\' => {
                            let Some(&(_, esc)) = chars.get(i) else {
                                return Err(TemplateError::parse(offset_of(start), "unterminated quoted string"));
                            };
                            i += 1;
                            out.push(match esc {
                                'n' => '\n',
                                't' => '\t',
                                'r' => '\r',
                                '0' => '\0',
                                '\\' | '"' | '\'' => esc,
                                other => {
                                    return Err(TemplateError::parse(
                                        offset_of(i - 1),
                                        format!("unknown escape sequence '\\{other}'"),
                                    ))
                                }
                            });
                        }
                        other => out.push(other),
                    }
                }
                Token::Str(out)
            }
            '`' => {
                i += 1;
                let from = i;
                while i < chars.len() && chars[i].1 != '`' {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(TemplateError::parse(offset_of(start), "unterminated raw string"));
                }
                let raw = slice(from, i);
                i += 1;
                Token::Str(raw)
            }
            '.' => {
                let mut path = Vec::new();
                while i < chars.len() && chars[i].1 == '.' {
                    i += 1;
                    let from = i;
                    while i < chars.len() && is_ident_char(chars[i].1) {
                        i += 1;
                    }
                    if from == i {
                        return Err(TemplateError::parse(offset_of(start), "expected field name after '.'"));
                    }
                    path.push(slice(from, i));
                }
                Token::Field(path)
            }
            c if c.is_ascii_digit()
                || ((c == '-' || c == '+')
                    && chars.get(i + 1).is_some_and(|(_, n)| n.is_ascii_digit())) =>
            {
                i += 1;
                while i < chars.len()
                    && (chars[i].1.is_ascii_alphanumeric() || chars[i].1 == '.' || chars[i].1 == '_')
                {
                    // Exponent sign, e.g. 1e-3.
                    if matches!(chars[i].1, 'e' | 'E')
                        && chars.get(i + 1).is_some_and(|(_, n)| *n == '-' || *n == '+')
                    {
                        i += 1;
                    }
                    i += 1;
                }
                let text = slice(start, i).replace('_', "");
                number_token(&text).ok_or_else(|| {
                    TemplateError::parse(offset_of(start), format!("bad number syntax: {text:?}"))
                })?
            }
            c if is_ident_char(c) => {
                while i < chars.len() && is_ident_char(chars[i].1) {
                    i += 1;
                }
                match slice(start, i).as_str() {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    name => Token::Ident(name.to_string()),
                }
            }
            other => {
                return Err(TemplateError::parse(
                    offset_of(start),
                    format!("unexpected character {other:?} in action"),
                ))
            }
        };

        tokens.push(Spanned {
            token,
            offset: offset_of(start),
        });
    }

    Ok(tokens)
}

fn number_token(text: &str) -> Option<Token> {
    if let Ok(i) = text.parse::<i64>() {
        return Some(Token::Int(i));
    }
    let digits = text.trim_start_matches(['-', '+']);
    let float_shaped = digits.starts_with(|c: char| c.is_ascii_digit())
        && digits
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '-' | '+'));
    if !float_shaped {
        return None;
    }
    text.parse::<f64>().ok().map(Token::Float)
}
