//! XML-RPC payload parsers.
//!
//! A small recursive-descent reader over the constrained XML-RPC
//! grammar. It is not a general XML parser: attributes, CDATA, and
//! processing instructions past the prolog are rejected, which is all
//! the wire format ever needs.

use std::borrow::Cow;

use crate::common::error::CodecError;

use super::types::{Fault, Value};

/// Decode raw body bytes to text: UTF-8 first, Latin-1 fallback.
///
/// Latin-1 decoding cannot fail, so together these cover every charset
/// the builder emits without sniffing the XML declaration.
fn decode_text(data: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(data) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => Cow::Owned(data.iter().map(|&b| b as char).collect()),
    }
}

/// Replace XML entities and character references in `s`.
fn unescape(s: &str) -> Result<String, CodecError> {
    if !s.contains('&') {
        return Ok(s.to_string());
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(i) = rest.find('&') {
        out.push_str(&rest[..i]);
        rest = &rest[i..];
        let end = rest
            .find(';')
            .ok_or(CodecError::Malformed("unterminated entity"))?;
        let ent = &rest[1..end];
        if let Some(hex) = ent.strip_prefix("#x").or_else(|| ent.strip_prefix("#X")) {
            let n = u32::from_str_radix(hex, 16)
                .map_err(|_| CodecError::Malformed("bad character reference"))?;
            out.push(char::from_u32(n).ok_or(CodecError::Malformed("bad character reference"))?);
        } else if let Some(dec) = ent.strip_prefix('#') {
            let n = dec
                .parse::<u32>()
                .map_err(|_| CodecError::Malformed("bad character reference"))?;
            out.push(char::from_u32(n).ok_or(CodecError::Malformed("bad character reference"))?);
        } else {
            match ent {
                "amp" => out.push('&'),
                "lt" => out.push('<'),
                "gt" => out.push('>'),
                "quot" => out.push('"'),
                "apos" => out.push('\''),
                _ => return Err(CodecError::Malformed("unknown entity")),
            }
        }
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

struct Cursor<'a> {
    s: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(s: &'a str) -> Self {
        Self { s, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.s[self.pos..]
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.s.len() - trimmed.len();
    }

    /// Skip the XML declaration and any comments before the root element.
    fn skip_prolog(&mut self) -> Result<(), CodecError> {
        loop {
            self.skip_ws();
            if self.rest().starts_with("<?") {
                let end = self.rest().find("?>").ok_or(CodecError::Short)?;
                self.pos += end + 2;
            } else if self.rest().starts_with("<!--") {
                let end = self.rest().find("-->").ok_or(CodecError::Short)?;
                self.pos += end + 3;
            } else {
                return Ok(());
            }
        }
    }

    /// Consume `tok` if the input continues with it.
    fn eat(&mut self, tok: &str) -> bool {
        if self.rest().starts_with(tok) {
            self.pos += tok.len();
            true
        } else {
            false
        }
    }

    /// Require `tok` at the current position.
    fn expect(&mut self, tok: &str) -> Result<(), CodecError> {
        if self.eat(tok) {
            Ok(())
        } else if self.rest().is_empty() {
            Err(CodecError::Short)
        } else {
            Err(CodecError::Malformed("unexpected token"))
        }
    }

    /// Return character data up to the next `<`, advancing past it.
    fn take_until_lt(&mut self) -> Result<&'a str, CodecError> {
        let end = self.rest().find('<').ok_or(CodecError::Short)?;
        let out = &self.rest()[..end];
        self.pos += end;
        Ok(out)
    }
}

fn parse_i32(text: &str) -> Result<Value, CodecError> {
    text.trim()
        .parse::<i32>()
        .map(Value::Int)
        .map_err(|_| CodecError::Malformed("bad int"))
}

fn parse_value(cur: &mut Cursor<'_>) -> Result<Value, CodecError> {
    cur.skip_ws();
    cur.expect("<value>")?;

    // Character data before the next tag. For an untyped value this is
    // the string itself, whitespace included; for a typed value it is
    // inter-tag whitespace and gets discarded.
    let raw = cur.take_until_lt()?;
    if cur.eat("</value>") {
        return Ok(Value::Str(unescape(raw)?));
    }

    let v = parse_typed(cur)?;
    cur.skip_ws();
    cur.expect("</value>")?;
    Ok(v)
}

fn parse_typed(cur: &mut Cursor<'_>) -> Result<Value, CodecError> {
    if cur.eat("<int>") {
        let v = parse_i32(cur.take_until_lt()?)?;
        cur.expect("</int>")?;
        Ok(v)
    } else if cur.eat("<i4>") {
        let v = parse_i32(cur.take_until_lt()?)?;
        cur.expect("</i4>")?;
        Ok(v)
    } else if cur.eat("<boolean>") {
        let text = cur.take_until_lt()?;
        let v = match text.trim() {
            "1" => Value::Bool(true),
            "0" => Value::Bool(false),
            _ => return Err(CodecError::Malformed("bad boolean")),
        };
        cur.expect("</boolean>")?;
        Ok(v)
    } else if cur.eat("<double>") {
        let v = cur
            .take_until_lt()?
            .trim()
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|_| CodecError::Malformed("bad double"))?;
        cur.expect("</double>")?;
        Ok(v)
    } else if cur.eat("<string>") {
        let v = Value::Str(unescape(cur.take_until_lt()?)?);
        cur.expect("</string>")?;
        Ok(v)
    } else if cur.eat("<nil/>") || cur.eat("<nil></nil>") {
        Ok(Value::Nil)
    } else if cur.eat("<array>") {
        cur.skip_ws();
        cur.expect("<data>")?;
        let mut items = Vec::new();
        loop {
            cur.skip_ws();
            if cur.eat("</data>") {
                break;
            }
            items.push(parse_value(cur)?);
        }
        cur.skip_ws();
        cur.expect("</array>")?;
        Ok(Value::Array(items))
    } else if cur.eat("<struct>") {
        let mut members = Vec::new();
        loop {
            cur.skip_ws();
            if cur.eat("</struct>") {
                break;
            }
            cur.expect("<member>")?;
            cur.skip_ws();
            cur.expect("<name>")?;
            let name = unescape(cur.take_until_lt()?)?;
            cur.expect("</name>")?;
            let v = parse_value(cur)?;
            cur.skip_ws();
            cur.expect("</member>")?;
            members.push((name, v));
        }
        Ok(Value::Struct(members))
    } else {
        Err(CodecError::Malformed("unknown value type"))
    }
}

/// Decode a `methodCall` document into its method name and parameters.
pub fn decode_call(data: &[u8]) -> Result<(String, Vec<Value>), CodecError> {
    let text = decode_text(data);
    let mut cur = Cursor::new(&text);
    cur.skip_prolog()?;
    cur.expect("<methodCall>")?;
    cur.skip_ws();
    cur.expect("<methodName>")?;
    let method = unescape(cur.take_until_lt()?)?.trim().to_string();
    cur.expect("</methodName>")?;

    let mut params = Vec::new();
    cur.skip_ws();
    if cur.eat("<params>") {
        loop {
            cur.skip_ws();
            if cur.eat("</params>") {
                break;
            }
            cur.expect("<param>")?;
            params.push(parse_value(&mut cur)?);
            cur.skip_ws();
            cur.expect("</param>")?;
        }
    }
    cur.skip_ws();
    cur.expect("</methodCall>")?;
    Ok((method, params))
}

/// Decode a `methodResponse` document (client side; also used by tests).
///
/// `Ok(Ok(value))` for a result, `Ok(Err(fault))` for a fault.
pub fn decode_response(data: &[u8]) -> Result<Result<Value, Fault>, CodecError> {
    let text = decode_text(data);
    let mut cur = Cursor::new(&text);
    cur.skip_prolog()?;
    cur.expect("<methodResponse>")?;
    cur.skip_ws();

    if cur.eat("<params>") {
        cur.skip_ws();
        cur.expect("<param>")?;
        let v = parse_value(&mut cur)?;
        cur.skip_ws();
        cur.expect("</param>")?;
        cur.skip_ws();
        cur.expect("</params>")?;
        cur.skip_ws();
        cur.expect("</methodResponse>")?;
        return Ok(Ok(v));
    }

    cur.expect("<fault>")?;
    let v = parse_value(&mut cur)?;
    cur.skip_ws();
    cur.expect("</fault>")?;
    cur.skip_ws();
    cur.expect("</methodResponse>")?;

    let members = match v {
        Value::Struct(m) => m,
        _ => return Err(CodecError::Malformed("fault is not a struct")),
    };
    let mut code = None;
    let mut message = None;
    for (name, val) in members {
        match (name.as_str(), val) {
            ("faultCode", Value::Int(c)) => code = Some(c),
            ("faultString", Value::Str(s)) => message = Some(s),
            _ => {}
        }
    }
    match (code, message) {
        (Some(code), Some(message)) => Ok(Err(Fault { code, message })),
        _ => Err(CodecError::Malformed("incomplete fault struct")),
    }
}
