//! MIME message assembly.
//!
//! An [`EmailMessage`] is a `multipart/mixed` message with a fixed shape:
//! one plain-text part describing the commit, then one base64 part per
//! attachment. Headers come out in a fixed order and lines end in CRLF.
//! Attachment payloads are streamed through [`pipe::encode_wrapped`] and
//! never exist as one base64 string.

pub mod pipe;

use std::fmt::{self, Write as _};
use std::io::Write;
use std::str::FromStr;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, FixedOffset};
use rand::Rng;
use tracing::instrument;

use crate::error::{BuildError, Result};
use crate::snapshot::CommitMeta;

/// `Date:` header format (RFC 5322, numeric zone).
const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Author date format in the text part.
const AUTHOR_DATE_FORMAT: &str = "%a %b %d %H:%M:%S %Y %z";

/// Domain used in `Message-ID` when nothing better is known.
pub const FALLBACK_DOMAIN: &str = "localhost";

// ---------------------------------------------------------------------------
// Mailbox
// ---------------------------------------------------------------------------

/// One address with an optional display name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mailbox {
    pub name: Option<String>,
    pub addr: String,
}

impl Mailbox {
    /// The part after the last `@`.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.addr.rsplit_once('@').map_or("", |(_, d)| d)
    }
}

impl FromStr for Mailbox {
    type Err = BuildError;

    /// Accepts `Name <local@domain>`, `"Quoted, Name" <local@domain>`,
    /// `<local@domain>` and bare `local@domain`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| BuildError::InvalidAddress {
            value: s.to_owned(),
            reason: reason.to_owned(),
        };
        let raw = s.trim();

        let (name, addr) = if let Some(open) = raw.find('<') {
            let rest = &raw[open + 1..];
            let close = rest.find('>').ok_or_else(|| invalid("missing closing '>'"))?;
            if !rest[close + 1..].trim().is_empty() {
                return Err(invalid("unexpected text after '>'"));
            }
            let name = raw[..open].trim().trim_matches('"').trim();
            if name.chars().any(char::is_control) {
                return Err(invalid("control character in display name"));
            }
            let name = (!name.is_empty()).then(|| name.to_owned());
            (name, rest[..close].trim())
        } else {
            (None, raw)
        };

        check_addr(addr).map_err(invalid)?;
        Ok(Self {
            name,
            addr: addr.to_owned(),
        })
    }
}

fn check_addr(addr: &str) -> std::result::Result<(), &'static str> {
    if addr.is_empty() {
        return Err("empty address");
    }
    if addr
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '<' | '>' | ',' | '"' | ';'))
    {
        return Err("unexpected character in address");
    }
    let (local, domain) = addr.split_once('@').ok_or("missing '@'")?;
    if local.is_empty() {
        return Err("empty local part");
    }
    if domain.is_empty() || domain.starts_with('.') || domain.ends_with('.') || domain.contains('@') {
        return Err("malformed domain");
    }
    Ok(())
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            None => write!(f, "{}", self.addr),
            Some(name) if !name.is_ascii() => {
                write!(f, "{} <{}>", encoded_word(name), self.addr)
            }
            Some(name) if name.chars().any(is_special) => {
                let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
                write!(f, "\"{escaped}\" <{}>", self.addr)
            }
            Some(name) => write!(f, "{name} <{}>", self.addr),
        }
    }
}

const fn is_special(c: char) -> bool {
    matches!(
        c,
        '(' | ')' | '<' | '>' | '[' | ']' | ':' | ';' | '@' | '\\' | ',' | '.' | '"'
    )
}

/// RFC 2047 `B` encoding; ASCII text passes through unchanged.
fn header_text(text: &str) -> String {
    if text.is_ascii() {
        text.to_owned()
    } else {
        encoded_word(text)
    }
}

fn encoded_word(text: &str) -> String {
    format!("=?utf-8?b?{}?=", STANDARD.encode(text))
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Top-level header values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub from: Mailbox,
    /// Explicit recipients. Empty means the message goes to the sender.
    pub to: Vec<Mailbox>,
    pub subject: String,
    pub date: DateTime<FixedOffset>,
    /// Without angle brackets.
    pub message_id: String,
    pub boundary: String,
}

impl Envelope {
    /// Build an envelope, drawing the `Message-ID` and boundary from `rng`.
    pub fn new<G: Rng + ?Sized>(
        from: Mailbox,
        to: Vec<Mailbox>,
        subject: String,
        date: DateTime<FixedOffset>,
        domain: &str,
        rng: &mut G,
    ) -> Self {
        let message_id = message_id(date.timestamp(), domain, rng);
        let boundary = boundary(rng);
        Self {
            from,
            to,
            subject,
            date,
            message_id,
            boundary,
        }
    }

    /// Header lines in emission order. Headers with no value are absent.
    #[must_use]
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![("From", self.from.to_string())];
        if self.to.is_empty() {
            headers.push(("To", self.from.to_string()));
        } else {
            let to: Vec<String> = self.to.iter().map(ToString::to_string).collect();
            headers.push(("To", to.join(", ")));
            headers.push(("Cc", self.from.to_string()));
        }
        headers.push(("Subject", header_text(&self.subject)));
        headers.push(("Date", self.date.format(DATE_FORMAT).to_string()));
        headers.push(("Message-ID", format!("<{}>", self.message_id)));
        headers.push(("MIME-Version", "1.0".to_owned()));
        headers.push((
            "Content-Type",
            format!("multipart/mixed; boundary=\"{}\"", self.boundary),
        ));
        headers
    }
}

/// `<8hex>-<4hex>-<4hex>-<4hex>-<16hex>@<domain>` from the low 32 bits of
/// `unix_time` (little-endian) and 14 random bytes.
pub fn message_id<G: Rng + ?Sized>(unix_time: i64, domain: &str, rng: &mut G) -> String {
    let mut bytes = [0u8; 18];
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let low = unix_time as u32;
    bytes[..4].copy_from_slice(&low.to_le_bytes());
    rng.fill(&mut bytes[4..]);
    format!(
        "{}-{}-{}-{}-{}@{domain}",
        hex(&bytes[..4]),
        hex(&bytes[4..6]),
        hex(&bytes[6..8]),
        hex(&bytes[8..10]),
        hex(&bytes[10..]),
    )
}

/// 60 hex characters from 30 random bytes.
pub fn boundary<G: Rng + ?Sized>(rng: &mut G) -> String {
    let mut bytes = [0u8; 30];
    rng.fill(&mut bytes[..]);
    hex(&bytes)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A binary part.
#[derive(Clone, Copy, Debug)]
pub struct Attachment<'a> {
    pub content_type: &'static str,
    pub filename: &'a str,
    pub data: &'a [u8],
}

/// A complete message ready to be written.
#[derive(Clone, Debug)]
pub struct EmailMessage<'a> {
    pub envelope: Envelope,
    pub body: String,
    pub attachments: Vec<Attachment<'a>>,
}

/// Text part content: author, author date, blank line, commit message.
#[must_use]
pub fn text_body(meta: &CommitMeta) -> String {
    format!(
        "{}\n{}\n\n{}\n",
        meta.author,
        meta.author_time().format(AUTHOR_DATE_FORMAT),
        meta.message
    )
}

impl EmailMessage<'_> {
    /// Write the whole message to `out`.
    ///
    /// # Errors
    /// Returns [`BuildError::Io`] if writing or encoding fails.
    #[instrument(skip_all, fields(message_id = %self.envelope.message_id))]
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> Result<()> {
        let io_err = |e| BuildError::io("write message", e);
        let env = &self.envelope;
        let boundary = &env.boundary;

        for (name, value) in env.headers() {
            write!(out, "{name}: {value}\r\n").map_err(io_err)?;
        }
        out.write_all(b"\r\n").map_err(io_err)?;
        tracing::info!(
            from = %env.from,
            to = env.to.len(),
            subject = %env.subject,
            "composed message headers"
        );

        write!(out, "--{boundary}\r\n").map_err(io_err)?;
        out.write_all(b"Content-Type: text/plain; charset=utf-8\r\n")
            .map_err(io_err)?;
        if !self.body.is_ascii() {
            out.write_all(b"Content-Transfer-Encoding: 8bit\r\n")
                .map_err(io_err)?;
        }
        out.write_all(b"\r\n").map_err(io_err)?;
        out.write_all(crlf(&self.body).as_bytes()).map_err(io_err)?;

        for part in &self.attachments {
            write!(
                out,
                "\r\n--{boundary}\r\n\
                 Content-Type: {}\r\n\
                 Content-Transfer-Encoding: base64\r\n\
                 Content-Disposition: attachment; filename={}\r\n\r\n",
                part.content_type, part.filename
            )
            .map_err(io_err)?;
            let n = pipe::encode_wrapped(part.data, out).map_err(io_err)?;
            tracing::debug!(filename = part.filename, bytes = n, "attached");
        }

        write!(out, "\r\n--{boundary}--\r\n").map_err(io_err)?;
        out.flush().map_err(io_err)
    }
}

/// Normalise line endings to CRLF.
fn crlf(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "\r\n")
}
