// Parser for Beacon .pbb source files.
//
// Two layers: a chumsky grammar for the tokens of a single line, and an
// indentation layout stack that attaches each line's terms to the argument
// list of the right owner.
//
//   line := bare ( ',' line | ':' line? )?
//   bare := ( SYMBOL '=' )? ( SYMBOL | NUMBER | COLOR )
//
// Preconditions: none (any UTF-8 text).
// Postconditions: returns the term forest, the source lines, and every
//                 lexical/syntactic diagnostic found.
// Failure modes: lex and grammar errors, indent mismatches, and args on
//                non-symbol terms are collected; parsing continues.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;
use tracing::trace;

use crate::ast::*;
use crate::diag::{codes, Diagnostic};
use crate::lexer::{self, LexErrorKind, Token};

/// Result of parsing: term forest, source lines, plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub forest: Vec<Term>,
    pub lines: Vec<String>,
    pub errors: Vec<Diagnostic>,
}

impl ParseResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Parse a Beacon source string.
pub fn parse(source: &str) -> ParseResult {
    let mut forest: Vec<Term> = Vec::new();
    let mut lines = Vec::new();
    let mut errors = Vec::new();
    let mut layout = Layout::new();

    let mut offset = 0;
    for raw in source.split_inclusive('\n') {
        let line_start = offset;
        offset += raw.len();

        let text = raw.trim_end();
        lines.push(text.to_string());

        let (indent, content_at) = lexer::measure_indent(text);
        let content = &text[content_at..];
        if lexer::is_skippable(content) {
            continue;
        }
        let base = line_start + content_at;
        let line_span: Span = (base..line_start + text.len()).into();

        let terms = parse_line(content, base, &mut errors);
        layout.place(&mut forest, indent, terms, line_span, &mut errors);
    }

    check_arg_owners(&forest, &mut errors);
    trace!(terms = forest.len(), errors = errors.len(), "parsed source");

    ParseResult {
        forest,
        lines,
        errors,
    }
}

/// Render the term forest as an indented tree, one term per line.
pub fn dump_terms(forest: &[Term]) -> String {
    let mut out = String::new();
    for term in forest {
        term.dump(0, &mut out);
    }
    out
}

// ── Line grammar ──

/// Lex and parse one line's content. Errors are pushed onto `errors`; a line
/// with errors contributes no terms.
fn parse_line(content: &str, base: usize, errors: &mut Vec<Diagnostic>) -> Vec<Term> {
    let lexed = lexer::lex_line(content, base);
    if !lexed.errors.is_empty() {
        for e in lexed.errors {
            let code = match e.kind {
                LexErrorKind::InvalidCharacter => codes::E0001,
                LexErrorKind::InvalidColorLength(_) => codes::E0002,
            };
            errors.push(Diagnostic::error(code, e.span, e.message));
        }
        return Vec::new();
    }

    let eoi_at = base + content.len();
    let eoi: SimpleSpan = (eoi_at..eoi_at).into();
    let stream = Stream::from_iter(lexed.tokens).map(eoi, |(t, s): (_, _)| (t, s));

    let (terms, parse_errors) = line_parser()
        .then_ignore(end())
        .parse(stream)
        .into_output_errors();

    if !parse_errors.is_empty() {
        for e in parse_errors {
            errors.push(
                Diagnostic::error(codes::E0100, *e.span(), e.to_string())
                    .with_hint("a term is one token, optionally written `name = token`"),
            );
        }
        return Vec::new();
    }
    terms.unwrap_or_default()
}

enum Tail {
    Siblings(Vec<Term>),
    Args(Vec<Term>),
}

fn line_parser<'tokens, I>(
) -> impl Parser<'tokens, I, Vec<Term>, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    recursive(|line| {
        let atom = select! {
            Token::Symbol(s) => Atom::Symbol(s),
            Token::Number(n) => Atom::Number(n),
            Token::Color(c) => Atom::Color(c),
        }
        .labelled("term");

        let name = select! {
            Token::Symbol(s) = e => Ident { name: s, span: e.span() },
        }
        .then_ignore(just(Token::Equals));

        let bare = name
            .or_not()
            .then(atom)
            .map_with(|(name, atom), e| Term::new(atom, name, e.span()));

        let tail = choice((
            just(Token::Comma)
                .ignore_then(line.clone())
                .map(Tail::Siblings),
            just(Token::Colon)
                .ignore_then(line.or_not())
                .map(|args| Tail::Args(args.unwrap_or_default())),
        ));

        bare.then(tail.or_not())
            .map(|(mut term, tail)| match tail {
                None => vec![term],
                Some(Tail::Siblings(rest)) => {
                    let mut terms = vec![term];
                    terms.extend(rest);
                    terms
                }
                Some(Tail::Args(args)) => {
                    term.args = args;
                    vec![term]
                }
            })
    })
}

// ── Layout ──

/// One open indentation level: its width and the path (indices through
/// `args` lists, starting at the forest) of the list its lines extend.
#[derive(Debug, Clone)]
struct Frame {
    indent: usize,
    path: Vec<usize>,
}

struct Layout {
    stack: Vec<Frame>,
}

impl Layout {
    fn new() -> Self {
        Layout {
            stack: vec![Frame {
                indent: 0,
                path: Vec::new(),
            }],
        }
    }

    fn top(&self) -> &Frame {
        // The base frame (indent 0) is never popped.
        &self.stack[self.stack.len() - 1]
    }

    fn place(
        &mut self,
        forest: &mut Vec<Term>,
        indent: usize,
        terms: Vec<Term>,
        line_span: Span,
        errors: &mut Vec<Diagnostic>,
    ) {
        while indent < self.top().indent {
            self.stack.pop();
            if indent > self.top().indent {
                errors.push(
                    Diagnostic::error(codes::E0101, line_span, "indent mismatch").with_hint(
                        format!(
                            "dedent to a previously used indentation (column {})",
                            self.top().indent
                        ),
                    ),
                );
                return;
            }
        }

        if indent > self.top().indent {
            let path = self.top().path.clone();
            let owner_count = list_at(forest, &path).len();
            if owner_count == 0 {
                errors.push(Diagnostic::error(
                    codes::E0103,
                    line_span,
                    "indenting on nothing",
                ));
                self.stack.push(Frame { indent, path });
                return;
            }
            let mut child_path = path;
            child_path.push(owner_count - 1);
            list_at(forest, &child_path).extend(terms);
            self.stack.push(Frame {
                indent,
                path: child_path,
            });
            return;
        }

        let path = &self.top().path;
        list_at(forest, path).extend(terms);
    }
}

fn list_at<'a>(forest: &'a mut Vec<Term>, path: &[usize]) -> &'a mut Vec<Term> {
    let mut list = forest;
    for &i in path {
        list = &mut list[i].args;
    }
    list
}

/// Only symbol-headed terms may own arguments.
fn check_arg_owners(terms: &[Term], errors: &mut Vec<Diagnostic>) {
    for term in terms {
        if !term.args.is_empty() && !term.atom.is_symbol() {
            errors.push(
                Diagnostic::error(codes::E0102, term.span, "only symbols can have args")
                    .with_hint(format!("`{}` is a literal", term.atom)),
            );
        }
        check_arg_owners(&term.args, errors);
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Vec<Term> {
        let result = parse(source);
        assert!(
            result.errors.is_empty(),
            "unexpected errors: {:?}",
            result.errors
        );
        result.forest
    }

    fn codes_of(source: &str) -> Vec<&'static str> {
        parse(source)
            .errors
            .iter()
            .filter_map(|e| e.code.map(|c| c.0))
            .collect()
    }

    fn sym(term: &Term) -> &str {
        match &term.atom {
            Atom::Symbol(s) => s,
            other => panic!("expected symbol, got {other}"),
        }
    }

    #[test]
    fn single_number() {
        let forest = parse_ok("0.5\n");
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].atom, Atom::Number(0.5));
        assert!(forest[0].name.is_none());
    }

    #[test]
    fn inline_colon_chain() {
        let forest = parse_ok("time: wave: sine");
        assert_eq!(sym(&forest[0]), "time");
        let wave = &forest[0].args[0];
        assert_eq!(sym(wave), "wave");
        assert_eq!(sym(&wave.args[0]), "sine");
    }

    #[test]
    fn comma_splits_siblings() {
        let forest = parse_ok("randflat: 0.2, 0.8");
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].args.len(), 2);
        assert_eq!(forest[0].args[1].atom, Atom::Number(0.8));
    }

    #[test]
    fn comma_before_colon_binds_outer() {
        // `a, b: c` is two siblings; the second owns `c`.
        let forest = parse_ok("sum: a, b: c");
        let args = &forest[0].args;
        assert_eq!(args.len(), 2);
        assert!(args[0].args.is_empty());
        assert_eq!(sym(&args[1].args[0]), "c");
    }

    #[test]
    fn named_terms() {
        let forest = parse_ok("glow = wave: sine, min=0.2");
        assert_eq!(forest[0].name.as_ref().map(|n| n.name.as_str()), Some("glow"));
        let min = &forest[0].args[1];
        assert_eq!(min.name.as_ref().map(|n| n.name.as_str()), Some("min"));
        assert_eq!(min.atom, Atom::Number(0.2));
    }

    #[test]
    fn indented_lines_extend_last_term() {
        let forest = parse_ok("wave: sine\n  min=0.2\n  max=0.9\n");
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].args.len(), 3);
    }

    #[test]
    fn nested_indentation_and_dedent() {
        let src = "sum:\n  space:\n    wave: triangle\n  time: wave: sqrdecay\n";
        let forest = parse_ok(src);
        let sum = &forest[0];
        assert_eq!(sum.args.len(), 2);
        assert_eq!(sym(&sum.args[0]), "space");
        assert_eq!(sym(&sum.args[0].args[0]), "wave");
        assert_eq!(sym(&sum.args[1]), "time");
    }

    #[test]
    fn indented_lines_attach_to_line_head() {
        // Deeper lines extend the last term of the enclosing list, which is
        // `time`, not the inline `wave`.
        let forest = parse_ok("time: wave: sine\n  period=2\n");
        assert_eq!(forest[0].args.len(), 2);
        assert!(forest[0].args[1].name.is_some());
    }

    #[test]
    fn comments_and_blank_lines_ignored() {
        let src = "# header\n\nwave: sine\n    # note\n\n  min=0.1\n";
        let forest = parse_ok(src);
        assert_eq!(forest[0].args.len(), 2);
    }

    #[test]
    fn tabs_count_as_four_spaces() {
        let forest = parse_ok("sum:\n\tconstant: 1\n    constant: 2\n");
        assert_eq!(forest[0].args.len(), 2);
    }

    #[test]
    fn source_lines_retained() {
        let result = parse("wave: sine   \n# c\n");
        assert_eq!(result.lines, vec!["wave: sine", "# c"]);
    }

    #[test]
    fn indent_mismatch() {
        assert_eq!(codes_of("sum:\n    a\n  b\n"), vec!["E0101"]);
    }

    #[test]
    fn indenting_on_nothing() {
        assert_eq!(codes_of("  wave: sine\n"), vec!["E0103"]);
    }

    #[test]
    fn literal_cannot_own_args_inline() {
        assert_eq!(codes_of("0.5: 1"), vec!["E0102"]);
    }

    #[test]
    fn literal_cannot_own_args_by_indent() {
        assert_eq!(codes_of("0.5\n  1\n"), vec!["E0102"]);
    }

    #[test]
    fn bare_term_is_one_token() {
        assert_eq!(codes_of("wave sine"), vec!["E0100"]);
    }

    #[test]
    fn name_must_be_symbol() {
        assert_eq!(codes_of("1 = wave"), vec!["E0100"]);
    }

    #[test]
    fn lex_errors_are_reported_per_line() {
        assert_eq!(codes_of("wave: ;\nrgb: $abcd, 1, 1\n"), vec!["E0001", "E0002"]);
    }

    #[test]
    fn error_spans_index_the_whole_file() {
        let result = parse("wave: sine\n  ;\nsum: 0.5 0.6\n");
        let spans: Vec<_> = result.errors.iter().map(|e| (e.code.map(|c| c.0), e.span)).collect();
        assert_eq!(
            spans,
            vec![
                (Some("E0001"), Span::from(13..14)),
                (Some("E0100"), Span::from(24..27)),
            ]
        );
    }

    #[test]
    fn dump_terms_format() {
        let forest = parse_ok("glow = wave: sine\n");
        assert_eq!(dump_terms(&forest), "glow=wave:\n  sine\n");
    }
}
