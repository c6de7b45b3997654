//! Caps string parser using winnow.
//!
//! ```text
//! ANY
//! EMPTY
//! audio/x-raw, format=S16LE, rate=(int)44100, channels=[ 1, 2 ]
//! video/x-raw, format={ I420, NV12 }, framerate=30/1; audio/x-raw
//! ```
//!
//! Values may carry a `(type)` annotation (`int`, `string`, `boolean`,
//! `fraction`). Without one, a bare token is read as an integer, a fraction,
//! a boolean, or else a string, in that order.

use super::{Caps, Fraction, Structure, Value};
use crate::error::{Error, Result};
use winnow::Parser;
use winnow::ascii::{digit1, multispace0};
use winnow::combinator::{alt, delimited, opt, preceded, separated};
use winnow::error::ContextError;
use winnow::token::{take_till, take_while};

type WResult<T> = std::result::Result<T, ContextError>;

/// Parse a caps description.
pub(crate) fn parse_caps(input: &str) -> Result<Caps> {
    caps.parse(input.trim())
        .map_err(|e| Error::Caps(format!("invalid caps '{input}': {e}")))
}

fn caps(input: &mut &str) -> WResult<Caps> {
    alt((
        "ANY".map(|_| Caps::new_any()),
        "EMPTY".map(|_| Caps::new_empty()),
        structures,
    ))
    .parse_next(input)
}

fn structures(input: &mut &str) -> WResult<Caps> {
    let list: Vec<Structure> = separated(1.., structure, symbol(';')).parse_next(input)?;
    let _ = opt(symbol(';')).parse_next(input)?;
    Ok(list.into_iter().collect())
}

fn structure(input: &mut &str) -> WResult<Structure> {
    let name = media_type.parse_next(input)?;
    let mut structure = Structure::new(name);
    while let Some((key, value)) = opt(preceded(symbol(','), field)).parse_next(input)? {
        structure.set(key, value);
    }
    Ok(structure)
}

fn symbol<'a>(c: char) -> impl Parser<&'a str, char, ContextError> {
    delimited(multispace0, c, multispace0)
}

fn media_type<'a>(input: &mut &'a str) -> WResult<&'a str> {
    take_while(1.., |c: char| {
        c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.' | '+')
    })
    .parse_next(input)
}

fn field_name<'a>(input: &mut &'a str) -> WResult<&'a str> {
    take_while(1.., |c: char| {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
    })
    .parse_next(input)
}

fn field<'a>(input: &mut &'a str) -> WResult<(&'a str, Value)> {
    let name = field_name.parse_next(input)?;
    let _ = symbol('=').parse_next(input)?;
    let value = typed_value.parse_next(input)?;
    Ok((name, value))
}

fn typed_value(input: &mut &str) -> WResult<Value> {
    let annotation = opt(delimited('(', field_name, ')')).parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    if let Some(value) = opt(alt((range, list))).parse_next(input)? {
        return Ok(value);
    }
    scalar(input, annotation)
}

fn range(input: &mut &str) -> WResult<Value> {
    let _ = symbol('[').parse_next(input)?;
    let min = integer.parse_next(input)?;
    let _ = symbol(',').parse_next(input)?;
    let max = integer.parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    let _ = ']'.parse_next(input)?;
    if min > max {
        return Err(ContextError::new());
    }
    Ok(Value::IntRange { min, max })
}

fn list(input: &mut &str) -> WResult<Value> {
    let _ = symbol('{').parse_next(input)?;
    let items: Vec<Value> = separated(1.., typed_value, symbol(',')).parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    let _ = '}'.parse_next(input)?;
    Ok(Value::List(items))
}

fn integer(input: &mut &str) -> WResult<i64> {
    (opt('-'), digit1)
        .take()
        .try_map(str::parse::<i64>)
        .parse_next(input)
}

fn scalar(input: &mut &str, annotation: Option<&str>) -> WResult<Value> {
    let quoted = opt(delimited('"', take_till(0.., '"'), '"')).parse_next(input)?;
    if let Some(text) = quoted {
        return Ok(Value::Str(text.to_string()));
    }
    let token: &str = take_till(1.., |c: char| {
        c.is_whitespace() || matches!(c, ',' | ';' | '{' | '}' | '[' | ']')
    })
    .parse_next(input)?;
    interpret(token, annotation).ok_or_else(ContextError::new)
}

fn interpret(token: &str, annotation: Option<&str>) -> Option<Value> {
    match annotation {
        Some("int" | "i") => token.parse().ok().map(Value::Int),
        Some("string" | "s") => Some(Value::Str(token.to_string())),
        Some("boolean" | "bool" | "b") => boolean(token).map(Value::Bool),
        Some("fraction") => fraction(token).map(Value::Fraction),
        Some(_) => None,
        None => token
            .parse()
            .ok()
            .map(Value::Int)
            .or_else(|| fraction(token).map(Value::Fraction))
            .or_else(|| boolean(token).map(Value::Bool))
            .or_else(|| Some(Value::Str(token.to_string()))),
    }
}

fn fraction(token: &str) -> Option<Fraction> {
    let (num, den) = token.split_once('/')?;
    Some(Fraction::new(num.parse().ok()?, den.parse().ok()?))
}

fn boolean(token: &str) -> Option<bool> {
    match token {
        "true" | "yes" => Some(true),
        "false" | "no" => Some(false),
        _ => None,
    }
}
