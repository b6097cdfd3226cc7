//! Header rewriting for forwarded messages.
//!
//! A forwarded message keeps every header and body byte of the original except
//! the identity headers, which are replaced:
//!
//! - `Reply-To` becomes the original `From`, so replies reach the sender
//! - `From` becomes the configured forwarding identity
//! - `To` becomes the resolved destinations
//!
//! Signing and return-path headers are dropped, since they no longer verify
//! once the message is re-sent from another identity.

use mailparse::{MailHeaderMap, parse_headers};

use crate::{address::Address, error::RewriteError};

/// Header fields removed from the original message (compared
/// case-insensitively)
const STRIPPED_HEADERS: [&str; 6] = [
    "To",
    "From",
    "Sender",
    "Reply-To",
    "Return-Path",
    "DKIM-Signature",
];

/// A raw inbound message with the identity headers extracted
#[derive(Debug)]
pub struct InboundMessage<'a> {
    raw: &'a [u8],
    body_offset: usize,
    from: String,
    recipients: Vec<Address>,
}

impl<'a> InboundMessage<'a> {
    /// # Errors
    /// If the header block cannot be parsed, or `From` or `To` is missing
    pub fn parse(raw: &'a [u8]) -> Result<Self, RewriteError> {
        let (headers, body_offset) = parse_headers(raw)?;

        let from = headers
            .get_first_header("From")
            .map(|header| String::from_utf8_lossy(header.get_value_raw()).trim().to_string())
            .filter(|from| !from.is_empty())
            .ok_or(RewriteError::MissingHeader("From"))?;

        let to_values = headers.get_all_values("To");
        if to_values.is_empty() {
            return Err(RewriteError::MissingHeader("To"));
        }

        let mut recipients = Vec::new();
        for value in &to_values {
            recipients.extend(
                Address::all_from_header(value)
                    .map_err(|e| RewriteError::InvalidRecipients(e.to_string()))?,
            );
        }

        if recipients.is_empty() {
            return Err(RewriteError::MissingHeader("To"));
        }

        Ok(Self {
            raw,
            body_offset,
            from,
            recipients,
        })
    }

    /// The original `From` value, as written by the sender
    pub fn original_from(&self) -> &str {
        &self.from
    }

    /// Every address named in the original `To` headers
    pub fn recipients(&self) -> &[Address] {
        &self.recipients
    }

    fn header_block(&self) -> &[u8] {
        &self.raw[..self.body_offset]
    }

    fn body(&self) -> &[u8] {
        &self.raw[self.body_offset..]
    }

    /// `\r\n` if the first header line ends with it, otherwise `\n`
    fn line_ending(&self) -> &'static [u8] {
        match self.raw.iter().position(|&b| b == b'\n') {
            Some(pos) if pos > 0 && self.raw[pos - 1] == b'\r' => b"\r\n",
            _ => b"\n",
        }
    }
}

/// The message as it will be dispatched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedMessage {
    /// The forwarding identity, used as envelope sender
    pub source: String,
    pub destinations: Vec<String>,
    /// The original sender, now in `Reply-To`
    pub reply_to: String,
    pub raw: Vec<u8>,
}

/// Rewrites inbound messages to be re-sent from a fixed identity
#[derive(Debug, Clone)]
pub struct Rewriter {
    sender: String,
}

impl Rewriter {
    /// # Errors
    /// If `sender` does not contain exactly one mail identity
    pub fn new(sender: impl Into<String>) -> Result<Self, RewriteError> {
        let sender = sender.into();

        match Address::all_from_header(&sender) {
            Ok(addresses) if addresses.len() == 1 => Ok(Self { sender }),
            _ => Err(RewriteError::InvalidSender(sender)),
        }
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Produce the forwarded form of `inbound`, addressed to `destinations`
    pub fn rewrite(&self, inbound: &InboundMessage<'_>, destinations: &[String]) -> ForwardedMessage {
        let eol = inbound.line_ending();
        let to = destinations.join(", ");
        let mut raw = Vec::with_capacity(inbound.raw.len() + 128);

        for field in header_fields(inbound.header_block()) {
            if !is_stripped(field) {
                raw.extend_from_slice(field);
            }
        }

        for (name, value) in [
            ("Reply-To", inbound.original_from()),
            ("From", self.sender.as_str()),
            ("To", to.as_str()),
        ] {
            raw.extend_from_slice(name.as_bytes());
            raw.extend_from_slice(b": ");
            raw.extend_from_slice(value.as_bytes());
            raw.extend_from_slice(eol);
        }

        raw.extend_from_slice(eol);
        raw.extend_from_slice(inbound.body());

        ForwardedMessage {
            source: self.sender.clone(),
            destinations: destinations.to_vec(),
            reply_to: inbound.original_from().to_string(),
            raw,
        }
    }
}

/// Split a header block into fields, each with its continuation lines and
/// line terminators. The blank separator line is not a field.
fn header_fields(block: &[u8]) -> Vec<&[u8]> {
    let mut fields = Vec::new();
    let mut start = None;
    let mut offset = 0;

    for line in block.split_inclusive(|&b| b == b'\n') {
        let is_blank = line == b"\n" || line == b"\r\n";
        let is_continuation = matches!(line.first(), Some(b' ' | b'\t'));

        if !is_continuation {
            if let Some(begin) = start.take() {
                fields.push(&block[begin..offset]);
            }
            if is_blank {
                break;
            }
            start = Some(offset);
        }

        offset += line.len();
    }

    if let Some(begin) = start {
        fields.push(&block[begin..offset]);
    }

    fields
}

fn is_stripped(field: &[u8]) -> bool {
    let Some(colon) = field.iter().position(|&b| b == b':') else {
        return false;
    };
    let name = String::from_utf8_lossy(&field[..colon]);
    let name = name.trim();

    STRIPPED_HEADERS
        .iter()
        .any(|stripped| stripped.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use pretty_assertions::assert_eq;

    use super::*;

    const RAW: &[u8] = b"Return-Path: <bounce@x.com>\r\n\
DKIM-Signature: v=1; a=rsa-sha256; d=x.com;\r\n\
\tb=abc123\r\n\
From: Alice <a@x.com>\r\n\
To: b@y.com\r\n\
Sender: relay@x.com\r\n\
Subject: Hello\r\n\
\tthere\r\n\
reply-to: other@x.com\r\n\
\r\n\
Body line 1\r\n\
To: not-a-header@body.com\r\n";

    fn rewriter() -> Rewriter {
        Rewriter::new("forwarder@relay.example").unwrap()
    }

    #[test]
    fn test_parse_extracts_identities() {
        let inbound = InboundMessage::parse(RAW).unwrap();
        assert_eq!(inbound.original_from(), "Alice <a@x.com>");
        assert_eq!(inbound.recipients(), [Address::parse("b@y.com").unwrap()]);
    }

    #[test]
    fn test_rewrite_replaces_identity_headers() {
        let inbound = InboundMessage::parse(RAW).unwrap();
        let message = rewriter().rewrite(&inbound, &["c@z.com".to_string()]);

        let expected = "Subject: Hello\r\n\
\tthere\r\n\
Reply-To: Alice <a@x.com>\r\n\
From: forwarder@relay.example\r\n\
To: c@z.com\r\n\
\r\n\
Body line 1\r\n\
To: not-a-header@body.com\r\n";

        assert_eq!(String::from_utf8(message.raw.clone()).unwrap(), expected);
        assert_eq!(message.source, "forwarder@relay.example");
        assert_eq!(message.reply_to, "Alice <a@x.com>");
        assert_eq!(message.destinations, ["c@z.com"]);
    }

    #[test]
    fn test_rewritten_message_parses_back() {
        let inbound = InboundMessage::parse(RAW).unwrap();
        let message =
            rewriter().rewrite(&inbound, &["c@z.com".to_string(), "d@z.com".to_string()]);

        let (headers, _) = parse_headers(&message.raw).unwrap();
        assert_eq!(headers.get_all_values("To"), ["c@z.com, d@z.com"]);
        assert_eq!(headers.get_all_values("From"), ["forwarder@relay.example"]);
        assert_eq!(headers.get_all_values("Reply-To"), ["Alice <a@x.com>"]);
        assert!(headers.get_first_value("DKIM-Signature").is_none());
        assert!(headers.get_first_value("Return-Path").is_none());
        assert!(headers.get_first_value("Sender").is_none());
    }

    #[test]
    fn test_bare_newlines_are_preserved() {
        let raw = b"From: a@x.com\nTo: b@y.com\nSubject: s\n\nbody\n";
        let inbound = InboundMessage::parse(raw).unwrap();
        let message = rewriter().rewrite(&inbound, &["c@z.com".to_string()]);

        assert_eq!(
            String::from_utf8(message.raw).unwrap(),
            "Subject: s\nReply-To: a@x.com\nFrom: forwarder@relay.example\nTo: c@z.com\n\nbody\n"
        );
    }

    #[test]
    fn test_multiple_recipients() {
        let raw = b"From: a@x.com\r\nTo: \"B\" <b@y.com>, c@y.com\r\nCc: x@y.com\r\nTo: d@w.com\r\n\r\n";
        let inbound = InboundMessage::parse(raw).unwrap();
        let rendered: Vec<String> = inbound.recipients().iter().map(ToString::to_string).collect();
        assert_eq!(rendered, ["b@y.com", "c@y.com", "d@w.com"]);
    }

    #[test]
    fn test_missing_headers() {
        assert!(matches!(
            InboundMessage::parse(b"To: b@y.com\r\n\r\nbody"),
            Err(RewriteError::MissingHeader("From"))
        ));
        assert!(matches!(
            InboundMessage::parse(b"From: a@x.com\r\n\r\nbody"),
            Err(RewriteError::MissingHeader("To"))
        ));
        assert!(matches!(
            InboundMessage::parse(b"From: a@x.com\r\nTo: nobody\r\n\r\nbody"),
            Err(RewriteError::InvalidRecipients(_))
        ));
    }

    #[test]
    fn test_sender_validation() {
        assert!(Rewriter::new("Forwarder <fwd@relay.example>").is_ok());
        assert!(Rewriter::new("not an address").is_err());
        assert!(Rewriter::new("a@x.com, b@x.com").is_err());
    }

    #[test]
    fn test_header_fields_split() {
        let fields = header_fields(b"A: 1\r\n 2\r\nB: 3\r\n\r\nbody");
        assert_eq!(fields, [&b"A: 1\r\n 2\r\n"[..], &b"B: 3\r\n"[..]]);
    }
}
