//! XML-RPC payload builders.
//!
//! Emits `methodResponse`, fault, and `methodCall` documents. All text
//! passes through [`escape_into`], which entity-escapes markup and
//! emits decimal character references for anything the target charset
//! cannot represent, so encoding to bytes never fails.

use crate::common::error::CodecError;

use super::types::{Charset, Fault, Value};

/// Append `s` to `out`, escaping markup characters and everything the
/// charset cannot represent directly.
fn escape_into(out: &mut String, s: &str, cs: Charset) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c if cs.encodes(c) => out.push(c),
            c => {
                out.push_str("&#");
                out.push_str(&(c as u32).to_string());
                out.push(';');
            }
        }
    }
}

/// Serialize a single value as `<value>...</value>`.
fn put_value(out: &mut String, v: &Value, cs: Charset, allow_none: bool) -> Result<(), CodecError> {
    out.push_str("<value>");
    match v {
        Value::Int(i) => {
            out.push_str("<int>");
            out.push_str(&i.to_string());
            out.push_str("</int>");
        }
        Value::Bool(b) => {
            out.push_str("<boolean>");
            out.push(if *b { '1' } else { '0' });
            out.push_str("</boolean>");
        }
        Value::Str(s) => {
            out.push_str("<string>");
            escape_into(out, s, cs);
            out.push_str("</string>");
        }
        Value::Double(d) => {
            if !d.is_finite() {
                return Err(CodecError::Malformed("non-finite double"));
            }
            out.push_str("<double>");
            out.push_str(&d.to_string());
            out.push_str("</double>");
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                put_value(out, item, cs, allow_none)?;
            }
            out.push_str("</data></array>");
        }
        Value::Struct(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                out.push_str("<member><name>");
                escape_into(out, name, cs);
                out.push_str("</name>");
                put_value(out, member, cs, allow_none)?;
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
        Value::Nil => {
            if !allow_none {
                return Err(CodecError::Malformed("nil value not allowed"));
            }
            out.push_str("<nil/>");
        }
    }
    out.push_str("</value>");
    Ok(())
}

fn prolog(cs: Charset) -> String {
    match cs {
        Charset::Utf8 => "<?xml version='1.0'?>\n".to_string(),
        cs => format!("<?xml version='1.0' encoding='{}'?>\n", cs.name()),
    }
}

/// Convert the finished document to wire bytes.
///
/// Safe for non-UTF-8 charsets because escaping already replaced every
/// out-of-range character with a reference; the remaining chars all fit
/// in a single byte.
fn to_bytes(doc: String, cs: Charset) -> Vec<u8> {
    match cs {
        Charset::Utf8 => doc.into_bytes(),
        _ => doc.chars().map(|c| c as u8).collect(),
    }
}

/// Encode a successful method result as a one-element `methodResponse`.
pub fn encode_response(
    value: &Value,
    cs: Charset,
    allow_none: bool,
) -> Result<Vec<u8>, CodecError> {
    let mut doc = prolog(cs);
    doc.push_str("<methodResponse>\n<params>\n<param>\n");
    put_value(&mut doc, value, cs, allow_none)?;
    doc.push_str("\n</param>\n</params>\n</methodResponse>\n");
    Ok(to_bytes(doc, cs))
}

/// Encode a fault response. Infallible: code and message always encode.
pub fn encode_fault(fault: &Fault, cs: Charset) -> Vec<u8> {
    let mut doc = prolog(cs);
    doc.push_str("<methodResponse>\n<fault>\n");
    let body = Value::Struct(vec![
        ("faultCode".to_string(), Value::Int(fault.code)),
        ("faultString".to_string(), Value::Str(fault.message.clone())),
    ]);
    // A struct of int + string cannot hit a marshal error.
    put_value(&mut doc, &body, cs, false).expect("fault struct always encodes");
    doc.push_str("\n</fault>\n</methodResponse>\n");
    to_bytes(doc, cs)
}

/// Encode a `methodCall` document (client side; also used by tests).
pub fn encode_call(
    method: &str,
    params: &[Value],
    cs: Charset,
    allow_none: bool,
) -> Result<Vec<u8>, CodecError> {
    let mut doc = prolog(cs);
    doc.push_str("<methodCall>\n<methodName>");
    escape_into(&mut doc, method, cs);
    doc.push_str("</methodName>\n<params>\n");
    for p in params {
        doc.push_str("<param>\n");
        put_value(&mut doc, p, cs, allow_none)?;
        doc.push_str("\n</param>\n");
    }
    doc.push_str("</params>\n</methodCall>\n");
    Ok(to_bytes(doc, cs))
}
