use nom::branch::alt;
use nom::bytes::complete::{tag, take_while, take_while1};
use nom::character::complete::{char as pchar, digit1, multispace0};
use nom::combinator::{all_consuming, map, map_res, opt, recognize, value};
use nom::multi::{many0, many1, separated_list1};
use nom::sequence::{delimited, preceded, tuple};
use nom::IResult;

use crate::{Arrow, PathExpr, PathParseError, TypeTerm, MAX_EXPONENT};

/// Parse a path description.
pub fn parse_path_expr(input: &str) -> Result<PathExpr, PathParseError> {
    if input.trim().is_empty() {
        return Err(PathParseError::Empty);
    }
    match all_consuming(ws(path_alt))(input) {
        Ok((_, expr)) => Ok(expr),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(PathParseError::Syntax {
            offset: input.len() - e.input.len(),
            message: format!("unexpected input near {:?}", preview(e.input)),
        }),
        Err(nom::Err::Incomplete(_)) => Err(PathParseError::Syntax {
            offset: input.len(),
            message: "incomplete path description".to_string(),
        }),
    }
}

fn preview(s: &str) -> String {
    s.chars().take(12).collect()
}

#[derive(Clone)]
enum Postfix {
    Star,
    Plus,
    Opt,
    Exp(u32),
    Transpose,
}

enum Item {
    Type(TypeTerm),
    Role(String),
}

fn path_alt(input: &str) -> IResult<&str, PathExpr> {
    map(separated_list1(ws(pchar('|')), path_seq), mk_alt)(input)
}

fn path_seq(input: &str) -> IResult<&str, PathExpr> {
    map(many1(ws(path_rep)), mk_seq)(input)
}

fn path_rep(input: &str) -> IResult<&str, PathExpr> {
    map(tuple((path_atom, many0(postfix))), |(atom, ops)| {
        ops.into_iter().fold(atom, |acc, op| match op {
            Postfix::Star => PathExpr::Star(Box::new(acc)),
            Postfix::Plus => PathExpr::Plus(Box::new(acc)),
            Postfix::Opt => PathExpr::Opt(Box::new(acc)),
            Postfix::Exp(n) => PathExpr::Exp(Box::new(acc), n),
            Postfix::Transpose => PathExpr::Transpose(Box::new(acc)),
        })
    })(input)
}

fn postfix(input: &str) -> IResult<&str, Postfix> {
    alt((
        value(Postfix::Star, pchar('*')),
        value(Postfix::Plus, pchar('+')),
        value(Postfix::Opt, pchar('?')),
        preceded(
            pchar('^'),
            alt((
                value(Postfix::Transpose, pchar('T')),
                map(map_res(digit1, parse_exponent), Postfix::Exp),
            )),
        ),
    ))(input)
}

fn parse_exponent(digits: &str) -> Result<u32, String> {
    match digits.parse::<u32>() {
        Ok(n) if n <= MAX_EXPONENT => Ok(n),
        _ => Err(format!("exponent {digits} exceeds {MAX_EXPONENT}")),
    }
}

fn path_atom(input: &str) -> IResult<&str, PathExpr> {
    alt((
        delimited(ws(pchar('(')), path_alt, ws(pchar(')'))),
        edge_step,
    ))(input)
}

fn edge_step(input: &str) -> IResult<&str, PathExpr> {
    map(tuple((arrow, opt(restriction))), |(arrow, items)| {
        let mut types = Vec::new();
        let mut roles = Vec::new();
        for item in items.unwrap_or_default() {
            match item {
                Item::Type(t) => types.push(t),
                Item::Role(r) => roles.push(r),
            }
        }
        PathExpr::Edge {
            arrow,
            types,
            roles,
        }
    })(input)
}

fn arrow(input: &str) -> IResult<&str, Arrow> {
    alt((
        value(Arrow::Out, tag("-->")),
        value(Arrow::Any, tag("<->")),
        value(Arrow::In, tag("<--")),
    ))(input)
}

fn restriction(input: &str) -> IResult<&str, Vec<Item>> {
    delimited(
        ws(pchar('{')),
        separated_list1(ws(pchar(',')), ws(restriction_item)),
        pchar('}'),
    )(input)
}

fn restriction_item(input: &str) -> IResult<&str, Item> {
    alt((
        map(preceded(pchar('@'), identifier), Item::Role),
        map(preceded(pchar('^'), identifier_with_dots), |name| {
            Item::Type(TypeTerm::forbidden(name))
        }),
        map(identifier_with_dots, |name| Item::Type(TypeTerm::allowed(name))),
    ))(input)
}

fn mk_seq(parts: Vec<PathExpr>) -> PathExpr {
    let mut out: Vec<PathExpr> = Vec::new();
    for p in parts {
        match p {
            PathExpr::Seq(inner) => out.extend(inner),
            other => out.push(other),
        }
    }
    if out.len() == 1 {
        out.remove(0)
    } else {
        PathExpr::Seq(out)
    }
}

fn mk_alt(parts: Vec<PathExpr>) -> PathExpr {
    let mut out: Vec<PathExpr> = Vec::new();
    for p in parts {
        match p {
            PathExpr::Alt(inner) => out.extend(inner),
            other => out.push(other),
        }
    }
    if out.len() == 1 {
        out.remove(0)
    } else {
        PathExpr::Alt(out)
    }
}

fn identifier(input: &str) -> IResult<&str, String> {
    map(
        recognize(tuple((
            take_while1(is_ident_start),
            take_while(is_ident_continue),
        ))),
        |s: &str| s.to_string(),
    )(input)
}

fn identifier_with_dots(input: &str) -> IResult<&str, String> {
    map(
        recognize(tuple((
            take_while1(is_ident_start),
            take_while(|c| is_ident_continue(c) || c == '.'),
        ))),
        |s: &str| s.to_string(),
    )(input)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}
