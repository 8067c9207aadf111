//! Lexer for the metrics DSL.
//!
//! Tokenizes source text into a flat token stream with span information,
//! skipping whitespace and `//` line comments.

use chumsky::prelude::*;

/// A token in the metrics DSL.
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'src> {
    // Keywords
    Metric,
    On,
    Query,
    Dimensions,
    Metrics,
    Where,
    Having,
    And,
    Or,
    Not,
    By,
    True,
    False,

    // Literals
    /// An identifier (not a keyword).
    Ident(&'src str),
    /// A string literal (contents without quotes, no escape handling).
    StringLit(&'src str),
    /// A number, including an optional leading sign (`-?\d+(\.\d+)?`).
    Number(&'src str),

    // Symbols
    LBrace,
    RBrace,
    LParen,
    RParen,
    Comma,
    Colon,
    Eq,
    Plus,
    Minus,
    Star,
    Slash,
    Ge,
    Le,
    Gt,
    Lt,
    EqEq,
    Ne,
}

impl<'src> std::fmt::Display for Token<'src> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Metric => write!(f, "metric"),
            Token::On => write!(f, "on"),
            Token::Query => write!(f, "query"),
            Token::Dimensions => write!(f, "dimensions"),
            Token::Metrics => write!(f, "metrics"),
            Token::Where => write!(f, "where"),
            Token::Having => write!(f, "having"),
            Token::And => write!(f, "and"),
            Token::Or => write!(f, "or"),
            Token::Not => write!(f, "not"),
            Token::By => write!(f, "by"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Ident(s) => write!(f, "{s}"),
            Token::StringLit(s) => write!(f, "\"{s}\""),
            Token::Number(s) => write!(f, "{s}"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::Colon => write!(f, ":"),
            Token::Eq => write!(f, "="),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Ge => write!(f, ">="),
            Token::Le => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::Lt => write!(f, "<"),
            Token::EqEq => write!(f, "=="),
            Token::Ne => write!(f, "!="),
        }
    }
}

/// The DSL's reserved words (spec.md §6). Aggregate function names
/// (`sum`, `avg`, ...) and `last_year` are deliberately *not* here: they
/// are recognized by the transformer (§4.D), not the lexer, so they
/// remain valid attribute/metric names elsewhere in the grammar.
fn keyword_or_ident(s: &str) -> Token<'_> {
    match s {
        "metric" => Token::Metric,
        "on" => Token::On,
        "query" => Token::Query,
        "dimensions" => Token::Dimensions,
        "metrics" => Token::Metrics,
        "where" => Token::Where,
        "having" => Token::Having,
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "by" => Token::By,
        "true" => Token::True,
        "false" => Token::False,
        _ => Token::Ident(s),
    }
}

/// Build a lexer for the metrics DSL.
pub fn lexer<'src>(
) -> impl Parser<'src, &'src str, Vec<(Token<'src>, SimpleSpan)>, extra::Err<Rich<'src, char>>> {
    let ident = text::ident().map(keyword_or_ident);

    let string_lit = just('"')
        .ignore_then(none_of('"').repeated().to_slice())
        .then_ignore(just('"'))
        .or(just('\'')
            .ignore_then(none_of('\'').repeated().to_slice())
            .then_ignore(just('\'')))
        .map(Token::StringLit);

    // `\d+(\.\d+)?`. No leading sign: a `-` is always its own `Minus`
    // token, so `a-5` lexes as `Ident, Minus, Number` rather than
    // swallowing the subtraction operator into the literal. Negative
    // comparison literals (`where: amount > -5`) are assembled from
    // `Minus` + `Number` at the parser level instead.
    let number = text::digits(10)
        .then(just('.').then(text::digits(10)).or_not())
        .to_slice()
        .map(Token::Number);

    let symbol = choice((
        just(">=").to(Token::Ge),
        just("<=").to(Token::Le),
        just("==").to(Token::EqEq),
        just("!=").to(Token::Ne),
        just('{').to(Token::LBrace),
        just('}').to(Token::RBrace),
        just('(').to(Token::LParen),
        just(')').to(Token::RParen),
        just(',').to(Token::Comma),
        just(':').to(Token::Colon),
        just('=').to(Token::Eq),
        just('+').to(Token::Plus),
        just('*').to(Token::Star),
        just('/').to(Token::Slash),
        just('>').to(Token::Gt),
        just('<').to(Token::Lt),
    ));

    let minus = just('-').to(Token::Minus);

    let comment = just("//").then(any().and_is(just('\n').not()).repeated()).ignored();

    let token = choice((ident, string_lit, number, symbol, minus))
        .map_with(|tok, e| (tok, e.span()));

    token
        .padded_by(comment.padded().repeated())
        .padded()
        .repeated()
        .collect()
        .padded_by(comment.padded().repeated())
        .padded()
        .then_ignore(end())
}

/// Lex a source string into tokens.
pub fn lex(source: &str) -> Result<Vec<(Token<'_>, SimpleSpan)>, Vec<Rich<'_, char>>> {
    let (tokens, errs) = lexer().parse(source).into_output_errors();
    if errs.is_empty() {
        Ok(tokens.unwrap_or_default())
    } else {
        Err(errs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens_only(tokens: Vec<(Token<'_>, SimpleSpan)>) -> Vec<Token<'_>> {
        tokens.into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn test_lex_keywords() {
        let source = "metric on query dimensions metrics where having and or not by true false";
        let tokens = tokens_only(lex(source).unwrap());
        assert_eq!(
            tokens,
            vec![
                Token::Metric,
                Token::On,
                Token::Query,
                Token::Dimensions,
                Token::Metrics,
                Token::Where,
                Token::Having,
                Token::And,
                Token::Or,
                Token::Not,
                Token::By,
                Token::True,
                Token::False,
            ]
        );
    }

    #[test]
    fn test_lex_metric_decl() {
        let source = "metric total_sales on sales = sum(amount)";
        let tokens = tokens_only(lex(source).unwrap());
        assert_eq!(
            tokens,
            vec![
                Token::Metric,
                Token::Ident("total_sales"),
                Token::On,
                Token::Ident("sales"),
                Token::Eq,
                Token::Ident("sum"),
                Token::LParen,
                Token::Ident("amount"),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_lex_comparisons() {
        let tokens = tokens_only(lex(">= <= == != > <").unwrap());
        assert_eq!(
            tokens,
            vec![Token::Ge, Token::Le, Token::EqEq, Token::Ne, Token::Gt, Token::Lt]
        );
    }

    #[test]
    fn test_lex_negative_number() {
        let tokens = tokens_only(lex("amount > -5").unwrap());
        assert_eq!(
            tokens,
            vec![Token::Ident("amount"), Token::Gt, Token::Minus, Token::Number("5")]
        );
    }

    #[test]
    fn test_lex_subtraction_without_whitespace_is_not_swallowed_by_the_number() {
        let tokens = tokens_only(lex("a-5").unwrap());
        assert_eq!(
            tokens,
            vec![Token::Ident("a"), Token::Minus, Token::Number("5")]
        );
    }

    #[test]
    fn test_lex_decimal_number() {
        let tokens = tokens_only(lex("3.14").unwrap());
        assert_eq!(tokens, vec![Token::Number("3.14")]);
    }

    #[test]
    fn test_lex_string_literal() {
        let tokens = tokens_only(lex(r#""north" 'south'"#).unwrap());
        assert_eq!(
            tokens,
            vec![Token::StringLit("north"), Token::StringLit("south")]
        );
    }

    #[test]
    fn test_lex_comment() {
        let tokens = tokens_only(lex("metric // a comment\non").unwrap());
        assert_eq!(tokens, vec![Token::Metric, Token::On]);
    }

    #[test]
    fn test_lex_wildcard_star() {
        let tokens = tokens_only(lex("count ( * )").unwrap());
        assert_eq!(
            tokens,
            vec![Token::Ident("count"), Token::LParen, Token::Star, Token::RParen]
        );
    }

    #[test]
    fn test_lex_keyword_prefix_not_confused() {
        // "ontrack" must not tokenize as "on" + "track".
        let tokens = tokens_only(lex("ontrack").unwrap());
        assert_eq!(tokens, vec![Token::Ident("ontrack")]);
    }

    #[test]
    fn test_lex_empty_input() {
        assert!(lex("").unwrap().is_empty());
    }

    #[test]
    fn test_token_display() {
        assert_eq!(format!("{}", Token::Metric), "metric");
        assert_eq!(format!("{}", Token::Ge), ">=");
        assert_eq!(format!("{}", Token::Ident("foo")), "foo");
    }
}
