use nom::{
    branch::alt,
    bytes::complete::{
        escaped_transform,
        tag,
        take_while,
    },
    character::complete::{
        alpha1,
        char,
        i32 as parse_level,
        none_of,
        one_of,
        satisfy,
        space0,
        space1,
    },
    combinator::{
        all_consuming,
        cut,
        eof,
        map,
        map_res,
        not,
        opt,
        recognize,
        rest,
        value,
        verify,
    },
    error::{
        context,
        VerboseError,
    },
    multi::{
        many0,
        many1,
        separated_list1,
    },
    sequence::{
        delimited,
        pair,
        preceded,
        terminated,
        tuple,
    },
    IResult,
};

use super::ast::{
    Alternative,
    Annotation,
    Id,
    Line,
    Token,
};
use crate::symbol::Associativity;

type Res<'a, U> = IResult<&'a str, U, VerboseError<&'a str>>;

/// consumes spaces (but no newlines) before calling the parser `f`
fn ws<'a, U>(f: impl FnMut(&'a str) -> Res<'a, U>) -> impl FnMut(&'a str) -> Res<'a, U> {
    preceded(space0, f)
}

/// consumes a directive keyword, e.g. `START:`
fn directive<'a>(keyword: &'static str) -> impl FnMut(&'a str) -> Res<'a, ()> {
    value((), tuple((space0, tag(keyword), space0, char(':'))))
}

pub(super) fn parse_line_complete(input: &str) -> Res<Line> {
    all_consuming(terminated(parse_line, space0))(input)
}

fn parse_line(input: &str) -> Res<Line> {
    context(
        "line",
        alt((
            parse_noise,
            parse_start,
            parse_terminal_directive,
            parse_non_terminal_directive,
            parse_precedence_directive,
            parse_production,
            parse_continuation,
        )),
    )(input)
}

fn parse_noise(input: &str) -> Res<Line> {
    value(
        Line::Noise,
        alt((
            value((), preceded(space0, eof)),
            value((), tuple((space0, char('#'), rest))),
            value((), tuple((space0, one_of(";|"), space0, eof))),
        )),
    )(input)
}

fn parse_start(input: &str) -> Res<Line> {
    context(
        "start",
        map(preceded(directive("START"), cut(ws(parse_id))), Line::Start),
    )(input)
}

fn parse_terminal_directive(input: &str) -> Res<Line> {
    context(
        "terminal",
        map(
            preceded(
                directive("TERMINAL"),
                cut(pair(ws(parse_token), opt(preceded(space1, parse_pattern)))),
            ),
            |(name, pattern)| Line::Terminal { name, pattern },
        ),
    )(input)
}

fn parse_pattern(input: &str) -> Res<&str> {
    map(verify(rest, |s: &str| !s.trim().is_empty()), |s: &str| {
        s.trim()
    })(input)
}

fn parse_non_terminal_directive(input: &str) -> Res<Line> {
    context(
        "non-terminal",
        map(
            preceded(directive("NONTERMINAL"), cut(many1(ws(parse_id)))),
            Line::NonTerminals,
        ),
    )(input)
}

fn parse_precedence_directive(input: &str) -> Res<Line> {
    context(
        "precedence",
        map(
            preceded(
                directive("PRECEDENCE"),
                cut(tuple((
                    ws(parse_token),
                    ws(parse_level),
                    opt(ws(parse_associativity)),
                ))),
            ),
            |(symbol, level, associativity)| {
                Line::Precedence {
                    symbol,
                    level,
                    associativity,
                }
            },
        ),
    )(input)
}

fn parse_production(input: &str) -> Res<Line> {
    context(
        "production",
        map(
            tuple((ws(parse_id), ws(parse_separator), parse_alternatives)),
            |(lhs, _, alternatives)| Line::Production { lhs, alternatives },
        ),
    )(input)
}

fn parse_continuation(input: &str) -> Res<Line> {
    context(
        "continuation",
        map(
            preceded(ws(char('|')), parse_alternatives),
            Line::Continuation,
        ),
    )(input)
}

fn parse_separator(input: &str) -> Res<&str> {
    alt((tag("::="), tag("->"), tag(":")))(input)
}

/// A name up to the next whitespace, `:` or `|`. A `-` is part of the name
/// unless it starts `->`.
fn parse_id(input: &str) -> Res<Id> {
    context(
        "id",
        map(
            recognize(many1(alt((
                recognize(satisfy(|c: char| !c.is_whitespace() && !":|-".contains(c))),
                recognize(terminated(char('-'), not(char('>')))),
            )))),
            Id,
        ),
    )(input)
}

/// Whether `name` can be written bare as a left-hand side or in `START:` and
/// `NONTERMINAL:` directives.
pub(super) fn is_plain_name(name: &str) -> bool {
    all_consuming(parse_id)(name).is_ok()
}

fn parse_alternatives(input: &str) -> Res<Vec<Alternative>> {
    context(
        "alternatives",
        separated_list1(ws(char('|')), parse_alternative),
    )(input)
}

fn parse_alternative(input: &str) -> Res<Alternative> {
    context(
        "alternative",
        map(
            pair(
                many0(ws(preceded(not(parse_annotation), parse_token))),
                opt(ws(parse_annotation)),
            ),
            |(symbols, annotation)| {
                Alternative {
                    symbols,
                    annotation: annotation.unwrap_or_default(),
                }
            },
        ),
    )(input)
}

fn parse_token(input: &str) -> Res<Token> {
    context(
        "token",
        alt((
            map(parse_quoted, Token::Quoted),
            map(parse_bare, Token::Bare),
        )),
    )(input)
}

fn parse_quoted(input: &str) -> Res<String> {
    delimited(
        char('\''),
        escaped_transform(none_of("\\'\r\n"), '\\', alt((char('\\'), char('\'')))),
        cut(char('\'')),
    )(input)
}

/// Anything up to the next whitespace that doesn't start with a quote or `|`.
fn parse_bare(input: &str) -> Res<Id> {
    map(
        recognize(pair(
            none_of("'| \t\r\n"),
            take_while(|c: char| !c.is_whitespace()),
        )),
        Id,
    )(input)
}

fn parse_associativity(input: &str) -> Res<Associativity> {
    context(
        "associativity",
        map_res(alpha1, |s: &str| s.parse::<Associativity>()),
    )(input)
}

fn parse_annotation(input: &str) -> Res<Annotation> {
    context(
        "annotation",
        map(
            delimited(
                char('['),
                separated_list1(ws(char(',')), ws(parse_annotation_entry)),
                cut(ws(char(']'))),
            ),
            |entries| {
                entries.into_iter().fold(
                    Annotation::default(),
                    |annotation, (precedence, associativity)| {
                        Annotation {
                            precedence: precedence.or(annotation.precedence),
                            associativity: associativity.or(annotation.associativity),
                        }
                    },
                )
            },
        ),
    )(input)
}

fn parse_annotation_entry(input: &str) -> Res<(Option<i32>, Option<Associativity>)> {
    alt((
        map(
            preceded(pair(tag("prec"), ws(char(':'))), cut(ws(parse_level))),
            |level| (Some(level), None),
        ),
        map(
            preceded(pair(tag("assoc"), ws(char(':'))), cut(ws(parse_associativity))),
            |associativity| (None, Some(associativity)),
        ),
    ))(input)
}
