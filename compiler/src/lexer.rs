// Lexer for Beacon .pbb source lines.
//
// Tokenizes one physical line at a time. Indentation is measured separately
// (tabs count as four columns) and is consumed by the layout stack in the
// parser; the token DFA itself never sees leading whitespace.
// Uses the `logos` crate for DFA-based lexing.
//
// Preconditions: input is valid UTF-8 with line terminators already removed.
// Postconditions: returns all tokens with absolute byte-offset spans, plus any lex errors.
// Failure modes: unrecognized characters and malformed colors produce `LexError`;
//                lexing continues past them.
// Side effects: none.

use logos::Logos;
use std::fmt;

use crate::ast::{Rgb, Span};

/// Why a slice of input failed to lex.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LexErrorKind {
    #[default]
    InvalidCharacter,
    InvalidColorLength(usize),
}

/// A lexer error with location.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub kind: LexErrorKind,
    pub span: Span,
    pub message: String,
}

/// Result of lexing one line: tokens plus any errors (non-fatal).
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<(Token, Span)>,
    pub errors: Vec<LexError>,
}

/// Beacon token types.
///
/// Symbols keep their original case; keyword matching downstream is
/// case-insensitive.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t]+")]
#[logos(error = LexErrorKind)]
pub enum Token {
    #[token(",")]
    Comma,
    #[token("=")]
    Equals,
    #[token(":")]
    Colon,

    /// Numeric literal: optional minus, optional integer part, optional point.
    #[regex(r"-?[0-9]*\.?[0-9]+", parse_number)]
    Number(f64),

    /// `$rgb` or `$rrggbb`, normalized to three channels in `[0, 1]`.
    #[regex(r"\$[0-9a-fA-F]+", parse_color)]
    Color(Rgb),

    /// Symbol: `[A-Za-z_][A-Za-z_0-9]*`
    #[regex(r"[A-Za-z_][A-Za-z_0-9]*", |lex| lex.slice().to_string())]
    Symbol(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Comma => write!(f, ","),
            Token::Equals => write!(f, "="),
            Token::Colon => write!(f, ":"),
            Token::Number(v) => write!(f, "{v}"),
            Token::Color(c) => write!(f, "${:?},{:?},{:?}", c.r, c.g, c.b),
            Token::Symbol(s) => write!(f, "{s}"),
        }
    }
}

// ── Callbacks ──

fn parse_number(lex: &mut logos::Lexer<'_, Token>) -> Option<f64> {
    lex.slice().parse().ok()
}

fn parse_color(lex: &mut logos::Lexer<'_, Token>) -> Result<Rgb, LexErrorKind> {
    let digits = &lex.slice()[1..];
    let nibble = |c: char| c.to_digit(16).map(f64::from);
    let mut channels = [0.0; 3];
    match digits.len() {
        3 => {
            // `$abc` expands each digit by duplication: `$aabbcc`.
            for (slot, c) in channels.iter_mut().zip(digits.chars()) {
                let v = nibble(c).ok_or(LexErrorKind::InvalidCharacter)?;
                *slot = (v * 16.0 + v) / 255.0;
            }
        }
        6 => {
            let bytes: Vec<char> = digits.chars().collect();
            for (slot, pair) in channels.iter_mut().zip(bytes.chunks(2)) {
                let hi = nibble(pair[0]).ok_or(LexErrorKind::InvalidCharacter)?;
                let lo = nibble(pair[1]).ok_or(LexErrorKind::InvalidCharacter)?;
                *slot = (hi * 16.0 + lo) / 255.0;
            }
        }
        n => return Err(LexErrorKind::InvalidColorLength(n)),
    }
    Ok(Rgb {
        r: channels[0],
        g: channels[1],
        b: channels[2],
    })
}

// ── Line classification ──

/// Indentation width of a line and the byte offset where its content starts.
/// Tabs count as four columns.
pub fn measure_indent(line: &str) -> (usize, usize) {
    let mut width = 0;
    let mut offset = 0;
    for c in line.chars() {
        match c {
            ' ' => width += 1,
            '\t' => width += 4,
            _ => break,
        }
        offset += c.len_utf8();
    }
    (width, offset)
}

/// Blank lines and `#` comment lines do not take part in layout.
pub fn is_skippable(content: &str) -> bool {
    let trimmed = content.trim_end();
    trimmed.is_empty() || trimmed.starts_with('#')
}

// ── Public API ──

/// Lex the content of one line. `base` is the absolute byte offset of
/// `content` within the file, so spans index the full source.
pub fn lex_line(content: &str, base: usize) -> LexResult {
    let lexer = Token::lexer(content);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, range) in lexer.spanned() {
        let span = Span::from(base + range.start..base + range.end);
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(kind) => {
                let message = match &kind {
                    LexErrorKind::InvalidColorLength(_) => {
                        format!("invalid color length: {}", &content[range.clone()])
                    }
                    LexErrorKind::InvalidCharacter => {
                        format!("invalid character: {}", &content[range.start..])
                    }
                };
                errors.push(LexError {
                    kind,
                    span,
                    message,
                });
            }
        }
    }

    LexResult { tokens, errors }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: lex and assert no errors, return token list.
    fn lex_ok(source: &str) -> Vec<Token> {
        let result = lex_line(source, 0);
        assert!(
            result.errors.is_empty(),
            "unexpected lex errors: {:?}",
            result.errors
        );
        result.tokens.into_iter().map(|(t, _)| t).collect()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn punctuation() {
        assert_eq!(
            lex_ok(", = :"),
            vec![Token::Comma, Token::Equals, Token::Colon]
        );
    }

    #[test]
    fn symbols_keep_case() {
        assert_eq!(
            lex_ok("Wave sine_2 _x"),
            vec![
                Token::Symbol("Wave".into()),
                Token::Symbol("sine_2".into()),
                Token::Symbol("_x".into()),
            ]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(
            lex_ok("42 0.5 .25 -1.5 -3"),
            vec![
                Token::Number(42.0),
                Token::Number(0.5),
                Token::Number(0.25),
                Token::Number(-1.5),
                Token::Number(-3.0),
            ]
        );
    }

    #[test]
    fn short_color_expands_digits() {
        let tokens = lex_ok("$f80");
        let Token::Color(c) = &tokens[0] else {
            panic!("expected color")
        };
        assert!(close(c.r, 1.0));
        assert!(close(c.g, 136.0 / 255.0));
        assert!(close(c.b, 0.0));
    }

    #[test]
    fn long_color() {
        let tokens = lex_ok("$FF0080");
        let Token::Color(c) = &tokens[0] else {
            panic!("expected color")
        };
        assert!(close(c.r, 1.0));
        assert!(close(c.g, 0.0));
        assert!(close(c.b, 128.0 / 255.0));
    }

    #[test]
    fn bad_color_length() {
        let result = lex_line("$abcd", 0);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, LexErrorKind::InvalidColorLength(4));
        assert!(result.errors[0].message.contains("$abcd"));
    }

    #[test]
    fn invalid_character() {
        let result = lex_line("wave ; sine", 0);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, LexErrorKind::InvalidCharacter);
        assert_eq!(result.errors[0].span, Span::from(5..6));
        // lexing continues past the bad character
        assert_eq!(result.tokens.len(), 2);
    }

    #[test]
    fn spans_are_absolute() {
        let result = lex_line("a: 1", 10);
        assert_eq!(result.tokens[0].1, Span::from(10..11));
        assert_eq!(result.tokens[2].1, Span::from(13..14));
    }

    #[test]
    fn named_argument_line() {
        assert_eq!(
            lex_ok("min=0.2"),
            vec![
                Token::Symbol("min".into()),
                Token::Equals,
                Token::Number(0.2),
            ]
        );
    }

    #[test]
    fn indent_counts_tabs_as_four() {
        assert_eq!(measure_indent("\t  wave"), (6, 3));
        assert_eq!(measure_indent("wave"), (0, 0));
    }

    #[test]
    fn comments_and_blanks_skip() {
        assert!(is_skippable(""));
        assert!(is_skippable("   "));
        assert!(is_skippable("# note"));
        assert!(!is_skippable("wave: sine"));
    }
}
