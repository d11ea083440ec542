//! `paco.sub` template post-processing.
//!
//! Grammar, one expression per occurrence:
//!
//! ```text
//! expression := "paco.sub" WS* "'" payload "'"      (all on one line)
//! payload    := ( text | hole )*
//! hole       := "${" content "}"
//! ```
//!
//! Holes whose content starts with `paco.ref ` are resolved and substituted.
//! Other holes (`${AWS::Region}`) are provider syntax and pass through. The
//! `paco.sub '` prefix and closing quote are stripped so the payload becomes
//! inline template text.

use super::{DomainError, Reference, TokenContext, reference::is_ref};

/// Literal token that opens an expression.
pub const SUB_TOKEN: &str = "paco.sub";

/// One piece of a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    /// `${paco.ref ...}` with the raw reference string (tokens unexpanded).
    Ref(String),
    /// Any other `${...}` hole, kept verbatim including the braces.
    Passthrough(String),
}

/// A located `paco.sub '...'` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubExpression {
    /// Byte offset of `paco.sub`.
    pub start: usize,
    /// Byte offset one past the closing quote.
    pub end: usize,
    pub payload: String,
    pub segments: Vec<Segment>,
}

/// Find and parse every expression in `body`.
pub fn parse_expressions(body: &str) -> Result<Vec<SubExpression>, DomainError> {
    let mut found = Vec::new();
    let mut cursor = 0;

    while let Some(rel) = body[cursor..].find(SUB_TOKEN) {
        let start = cursor + rel;
        let line_end = body[start..]
            .find('\n')
            .map_or(body.len(), |i| start + i);
        let line = &body[start + SUB_TOKEN.len()..line_end];

        let after_ws = line.trim_start();
        if !after_ws.starts_with('\'') {
            return Err(invalid("expected a single-quoted payload", line));
        }
        let open = start + SUB_TOKEN.len() + (line.len() - after_ws.len()) + 1;
        let close = body[open..line_end]
            .find('\'')
            .map(|i| open + i)
            .ok_or_else(|| invalid("missing closing quote", &body[open..line_end]))?;

        let payload = &body[open..close];
        let segments = parse_payload(payload)?;
        if !segments
            .iter()
            .any(|s| !matches!(s, Segment::Text(_)))
        {
            return Err(invalid(
                "Unable to find paco.ref in paco.sub expression",
                payload,
            ));
        }

        found.push(SubExpression {
            start,
            end: close + 1,
            payload: payload.to_string(),
            segments,
        });
        cursor = close + 1;
    }

    Ok(found)
}

/// Rewrite `body`, resolving every `${paco.ref ...}` hole through `resolve`.
///
/// Tokens are expanded inside each hole before the reference is parsed.
pub fn apply<E, F>(body: &str, tokens: &TokenContext, mut resolve: F) -> Result<String, E>
where
    E: From<DomainError>,
    F: FnMut(&Reference) -> Result<String, E>,
{
    let expressions = parse_expressions(body)?;
    if expressions.is_empty() {
        return Ok(body.to_string());
    }

    let mut out = String::with_capacity(body.len());
    let mut last = 0;
    for expr in &expressions {
        out.push_str(&body[last..expr.start]);
        for segment in &expr.segments {
            match segment {
                Segment::Text(text) | Segment::Passthrough(text) => out.push_str(text),
                Segment::Ref(raw) => {
                    let expanded = tokens.substitute(raw)?;
                    let reference = Reference::parse(&expanded)?;
                    out.push_str(&resolve(&reference)?);
                }
            }
        }
        last = expr.end;
    }
    out.push_str(&body[last..]);
    Ok(out)
}

// ---- Internal Helpers ----

fn parse_payload(payload: &str) -> Result<Vec<Segment>, DomainError> {
    let mut segments = Vec::new();
    let mut rest = payload;

    while let Some(open) = rest.find("${") {
        if open > 0 {
            segments.push(Segment::Text(rest[..open].to_string()));
        }
        let close = rest[open..]
            .find('}')
            .map(|i| open + i)
            .ok_or_else(|| invalid("unterminated ${ hole", payload))?;
        let content = rest[open + 2..close].trim();
        if is_ref(content) {
            segments.push(Segment::Ref(content.to_string()));
        } else {
            segments.push(Segment::Passthrough(rest[open..=close].to_string()));
        }
        rest = &rest[close + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Text(rest.to_string()));
    }
    Ok(segments)
}

fn invalid(reason: &str, payload: &str) -> DomainError {
    DomainError::InvalidSubExpression {
        reason: reason.to_string(),
        payload: payload.to_string(),
    }
}
