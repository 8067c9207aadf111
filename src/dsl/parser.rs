//! Token-stream parser for the metrics DSL.
//!
//! Consumes the token stream produced by [`crate::dsl::lexer`] and builds a
//! [`Program`]. Mirrors the grammar documented in `dsl::ast`.

use chumsky::input::ValueInput;
use chumsky::prelude::*;

use crate::dsl::ast::*;
use crate::dsl::lexer::Token;
use crate::dsl::span::Spanned;

type Span = SimpleSpan;

/// Build a parser from a token stream to a [`Program`].
pub fn parser<'tokens, 'src: 'tokens, I>(
) -> impl Parser<'tokens, I, Program, extra::Err<Rich<'tokens, Token<'src>, Span>>> + Clone
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = Span>,
{
    let ident = select! { Token::Ident(s) = e => Spanned::new(s.to_string(), e.span().into_range()) }
        .labelled("identifier");

    let number = select! { Token::Number(s) = e => {
        let v: f64 = s.parse().unwrap_or(f64::NAN);
        Spanned::new(v, e.span().into_range())
    }}
    .labelled("number");

    let string_lit = select! { Token::StringLit(s) = e => Spanned::new(s.to_string(), e.span().into_range()) }
        .labelled("string");

    let metric_expr = recursive(|expr| {
        // fn_call := IDENT "(" ("*" | expr ("," expr)*)? ")"
        let args = choice((
            just(Token::Star).map_with(|_, e| vec![Spanned::new(MetricExpr::AttrRef("*".into()), e.span().into_range())]),
            expr.clone()
                .separated_by(just(Token::Comma))
                .allow_trailing()
                .collect::<Vec<_>>(),
        ))
        .or_not()
        .map(|a| a.unwrap_or_default());

        let fn_call = ident
            .clone()
            .then(args.delimited_by(just(Token::LParen), just(Token::RParen)))
            .map_with(|(name, args), e| {
                Spanned::new(MetricExpr::Call(name, args), e.span().into_range())
            });

        let last_year_call = just(Token::Ident("last_year"))
            .ignore_then(
                ident
                    .clone()
                    .then(
                        just(Token::Comma)
                            .ignore_then(just(Token::By))
                            .ignore_then(ident.clone())
                            .or_not(),
                    )
                    .delimited_by(just(Token::LParen), just(Token::RParen)),
            )
            .map_with(|(metric, anchor), e| {
                let span: std::ops::Range<usize> = e.span().into_range();
                let mut args = vec![Spanned::new(
                    MetricExpr::MetricRef(metric.value.clone()),
                    metric.span,
                )];
                if let Some(anchor) = anchor {
                    args.push(Spanned::new(
                        MetricExpr::AttrRef(anchor.value.clone()),
                        anchor.span,
                    ));
                }
                Spanned::new(
                    MetricExpr::Call(Spanned::new("last_year".to_string(), span.clone()), args),
                    span,
                )
            });

        let atom_ident = ident
            .clone()
            .map(|s| s.map(MetricExpr::AttrRef));

        let literal = number.clone().map(|n| n.map(MetricExpr::Literal));

        let paren = expr
            .clone()
            .delimited_by(just(Token::LParen), just(Token::RParen));

        let primary = choice((
            last_year_call,
            fn_call,
            literal,
            atom_ident,
            paren,
        ))
        .labelled("expression");

        let multiplicative = primary.clone().foldl_with(
            choice((
                just(Token::Star).to(ArithOp::Mul),
                just(Token::Slash).to(ArithOp::Div),
            ))
            .then(primary)
            .repeated(),
            |lhs, (op, rhs), e| {
                Spanned::new(
                    MetricExpr::BinaryOp(op, Box::new(lhs), Box::new(rhs)),
                    e.span().into_range(),
                )
            },
        );

        multiplicative.clone().foldl_with(
            choice((
                just(Token::Plus).to(ArithOp::Add),
                just(Token::Minus).to(ArithOp::Sub),
            ))
            .then(multiplicative)
            .repeated(),
            |lhs, (op, rhs), e| {
                Spanned::new(
                    MetricExpr::BinaryOp(op, Box::new(lhs), Box::new(rhs)),
                    e.span().into_range(),
                )
            },
        )
    })
    .labelled("metric expression");

    // A comparison literal's sign isn't part of the `Number` token (see
    // `dsl::lexer`); an optional leading `Minus` is folded in here instead.
    let signed_number = just(Token::Minus)
        .or_not()
        .then(number.clone())
        .map_with(|(neg, n), e| {
            let value = if neg.is_some() { -n.value } else { n.value };
            Spanned::new(LiteralValue::Number(value), e.span().into_range())
        });

    let literal_value = choice((
        signed_number,
        string_lit.clone().map(|s| s.map(LiteralValue::Str)),
        just(Token::True).map_with(|_, e| Spanned::new(LiteralValue::Bool(true), e.span().into_range())),
        just(Token::False).map_with(|_, e| Spanned::new(LiteralValue::Bool(false), e.span().into_range())),
    ));

    let cmp_op = choice((
        just(Token::Ge).to(CmpOp::Ge),
        just(Token::Le).to(CmpOp::Le),
        just(Token::EqEq).to(CmpOp::Eq),
        just(Token::Ne).to(CmpOp::Ne),
        just(Token::Gt).to(CmpOp::Gt),
        just(Token::Lt).to(CmpOp::Lt),
    ));

    // Shared by bool_expr (where) and having_expr (having); the
    // having-leaves-must-be-numeric restriction is checked after parsing.
    let bool_expr = recursive(|bool_expr| {
        let compare = ident
            .clone()
            .then(cmp_op)
            .then(literal_value)
            .map_with(|((ident, op), literal), e| {
                Spanned::new(
                    BoolExpr::Compare { ident, op, literal },
                    e.span().into_range(),
                )
            });

        let atom = choice((
            compare,
            bool_expr
                .clone()
                .delimited_by(just(Token::LParen), just(Token::RParen)),
        ));

        let not_expr = just(Token::Not)
            .or_not()
            .then(atom)
            .map_with(|(not, inner), e| {
                if not.is_some() {
                    Spanned::new(BoolExpr::Not(Box::new(inner)), e.span().into_range())
                } else {
                    inner
                }
            });

        let and_expr = not_expr.clone().foldl_with(
            just(Token::And).ignore_then(not_expr).repeated(),
            |lhs, rhs, e| {
                Spanned::new(
                    BoolExpr::And(Box::new(lhs), Box::new(rhs)),
                    e.span().into_range(),
                )
            },
        );

        and_expr.clone().foldl_with(
            just(Token::Or).ignore_then(and_expr).repeated(),
            |lhs, rhs, e| {
                Spanned::new(
                    BoolExpr::Or(Box::new(lhs), Box::new(rhs)),
                    e.span().into_range(),
                )
            },
        )
    })
    .labelled("boolean expression");

    let ident_list = ident
        .clone()
        .separated_by(just(Token::Comma))
        .at_least(1)
        .collect::<Vec<_>>();

    enum Line {
        Dimensions(Vec<Spanned<String>>),
        Metrics(Vec<Spanned<String>>),
        Where(Spanned<BoolExpr>),
        Having(Spanned<BoolExpr>),
    }

    let query_line = choice((
        just(Token::Dimensions)
            .ignore_then(just(Token::Colon))
            .ignore_then(ident_list.clone())
            .map(Line::Dimensions),
        just(Token::Metrics)
            .ignore_then(just(Token::Colon))
            .ignore_then(ident_list)
            .map(Line::Metrics),
        just(Token::Where)
            .ignore_then(just(Token::Colon))
            .ignore_then(bool_expr.clone())
            .map(Line::Where),
        just(Token::Having)
            .ignore_then(just(Token::Colon))
            .ignore_then(bool_expr)
            .map(Line::Having),
    ))
    .labelled("query line");

    let query_decl = just(Token::Query)
        .ignore_then(ident.clone())
        .then(
            query_line
                .repeated()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LBrace), just(Token::RBrace)),
        )
        .map(|(name, lines)| {
            let mut decl = QueryDecl::new(name);
            for line in lines {
                match line {
                    Line::Dimensions(d) => decl.dimensions.extend(d),
                    Line::Metrics(m) => decl.metrics.extend(m),
                    Line::Where(w) => decl.where_clause = Some(w),
                    Line::Having(h) => decl.having = Some(h),
                }
            }
            decl
        });

    let metric_decl = just(Token::Metric)
        .ignore_then(ident.clone())
        .then_ignore(just(Token::On))
        .then(ident.clone())
        .then_ignore(just(Token::Eq))
        .then(metric_expr)
        .map(|((name, base_fact), expr)| MetricDecl {
            name,
            base_fact,
            expr,
        });

    let item = choice((
        metric_decl.map(Item::Metric),
        query_decl.map(Item::Query),
    ))
    .map_with(|item, e| Spanned::new(item, e.span().into_range()));

    item.repeated()
        .collect::<Vec<_>>()
        .map(|items| Program { items })
}
