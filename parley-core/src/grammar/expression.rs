//! Expression mini-language.
//!
//! | Syntax          | Meaning                                   |
//! |-----------------|-------------------------------------------|
//! | `word`          | literal word (case-folded)                |
//! | `(a, b c)`      | exactly one of the listed phrases         |
//! | `[a, b c]`      | at most one of the listed phrases         |
//! | `$type:name`    | slot `name` filled from slot type `type`  |
//!
//! Groups do not nest. Slot references may appear inside group phrases.

use std::iter::Peekable;
use std::str::Chars;

use crate::error::{ParleyError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRef {
    pub slot_type: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(String),
    Slot(SlotRef),
    /// Alternative phrases. Phrases only contain `Word` and `Slot` tokens.
    Group {
        phrases: Vec<Vec<Token>>,
        optional: bool,
    },
}

struct OpenGroup {
    optional: bool,
    phrases: Vec<Vec<Token>>,
    current: Vec<Token>,
}

pub fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '\'' || c == '-'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.' || c == '-'
}

/// Split a surface phrase (slot value or synonym) into lowercase words.
pub fn phrase_words(src: &str) -> Result<Vec<String>> {
    let words: Vec<String> = src.split_whitespace().map(str::to_lowercase).collect();
    if words.is_empty() {
        return Err(ParleyError::MalformedContext(format!(
            "empty phrase {src:?}"
        )));
    }
    if let Some(bad) = words.iter().find(|w| !w.chars().all(is_word_char)) {
        return Err(ParleyError::MalformedContext(format!(
            "phrase {src:?} contains invalid word {bad:?}"
        )));
    }
    Ok(words)
}

/// Parse one expression source into tokens.
pub fn parse_expression(src: &str) -> Result<Vec<Token>> {
    let fail = |msg: &str| ParleyError::MalformedContext(format!("expression {src:?}: {msg}"));

    let mut tokens = Vec::new();
    let mut group: Option<OpenGroup> = None;
    let mut chars = src.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' | '[' => {
                chars.next();
                if group.is_some() {
                    return Err(fail("nested groups are not supported"));
                }
                group = Some(OpenGroup {
                    optional: c == '[',
                    phrases: Vec::new(),
                    current: Vec::new(),
                });
            }
            ')' | ']' => {
                chars.next();
                let mut open = group.take().ok_or_else(|| fail("unbalanced closing bracket"))?;
                if open.optional != (c == ']') {
                    return Err(fail("mismatched brackets"));
                }
                if open.current.is_empty() {
                    return Err(fail("empty phrase in group"));
                }
                open.phrases.push(std::mem::take(&mut open.current));
                tokens.push(Token::Group {
                    phrases: open.phrases,
                    optional: open.optional,
                });
            }
            ',' => {
                chars.next();
                let open = group
                    .as_mut()
                    .ok_or_else(|| fail("',' outside of a group"))?;
                if open.current.is_empty() {
                    return Err(fail("empty phrase in group"));
                }
                let phrase = std::mem::take(&mut open.current);
                open.phrases.push(phrase);
            }
            '$' => {
                chars.next();
                let slot_type = read_while(&mut chars, is_ident_char);
                if chars.next() != Some(':') {
                    return Err(fail("slot reference must look like $type:name"));
                }
                let name = read_while(&mut chars, is_ident_char);
                if slot_type.is_empty() || name.is_empty() {
                    return Err(fail("slot reference must look like $type:name"));
                }
                push(&mut tokens, &mut group, Token::Slot(SlotRef { slot_type, name }));
            }
            c if is_word_char(c) => {
                let word = read_while(&mut chars, is_word_char).to_lowercase();
                push(&mut tokens, &mut group, Token::Word(word));
            }
            other => return Err(fail(&format!("unexpected character {other:?}"))),
        }
    }

    if group.is_some() {
        return Err(fail("unclosed group"));
    }
    if tokens.is_empty() {
        return Err(fail("expression is empty"));
    }
    Ok(tokens)
}

fn push(tokens: &mut Vec<Token>, group: &mut Option<OpenGroup>, token: Token) {
    match group {
        Some(open) => open.current.push(token),
        None => tokens.push(token),
    }
}

fn read_while(chars: &mut Peekable<Chars<'_>>, pred: fn(char) -> bool) -> String {
    let mut out = String::new();
    while let Some(&c) = chars.peek() {
        if !pred(c) {
            break;
        }
        out.push(c);
        chars.next();
    }
    out
}
