//! RFC822 message codec.
//!
//! A [`Message`] keeps its header block as an ordered list of name/value pairs
//! and its body as raw bytes. Serialization writes headers back in their
//! stored order and never touches the body, so property rewrites on the root
//! message change only the headers that were set.
//!
//! MIME structure is decoded on demand through `mail-parser` in
//! [`Message::parts`]; attachments are encoded with `base64` in
//! [`Message::with_attachments`].

use std::fs;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, FixedOffset};
use mail_parser::{MessageParser, MimeHeaders, PartType};

use crate::error::Result;
use crate::util::{human_size, random_hex_id};

/// One comment (or the root) of an issue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

/// A decoded attachment of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// 1-based position among the message's attachments.
    pub number: usize,
    pub content_type: String,
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

impl Attachment {
    #[must_use]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// `[type, size]: name` summary used when listing attachments.
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "[{}, {}]: {}",
            self.content_type,
            human_size(self.size()),
            self.filename.as_deref().unwrap_or("")
        )
    }

    /// File name to use when extracting: the declared name, or
    /// `attachment-NNN.<ext>` when the part carries none.
    #[must_use]
    pub fn output_name(&self) -> String {
        self.filename.as_deref().map_or_else(
            || {
                format!(
                    "attachment-{:03}{}",
                    self.number,
                    extension_for(&self.content_type)
                )
            },
            |name| {
                Path::new(name)
                    .file_name()
                    .map_or_else(|| name.to_string(), |n| n.to_string_lossy().into_owned())
            },
        )
    }
}

/// Decoded view of a message body.
#[derive(Debug, Clone, Default)]
pub struct MessageParts {
    pub text: Vec<String>,
    pub attachments: Vec<Attachment>,
}

impl Message {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse raw message bytes. Accepts LF and CRLF line endings.
    ///
    /// Folded header lines are unfolded into a single value. The header
    /// block ends at the first empty line, or at the first line that is
    /// neither a header nor a continuation.
    #[must_use]
    pub fn parse(raw: &[u8]) -> Self {
        let mut headers: Vec<(String, String)> = Vec::new();
        let mut pos = 0;

        while pos < raw.len() {
            let end = raw[pos..]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(raw.len(), |i| pos + i);
            let next = (end + 1).min(raw.len());
            let mut line = &raw[pos..end];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }

            if line.is_empty() {
                pos = next;
                break;
            }

            let text = String::from_utf8_lossy(line);
            if text.starts_with([' ', '\t']) {
                if let Some((_, value)) = headers.last_mut() {
                    let cont = text.trim();
                    if !cont.is_empty() {
                        if !value.is_empty() {
                            value.push(' ');
                        }
                        value.push_str(cont);
                    }
                    pos = next;
                    continue;
                }
                break;
            }

            match text.split_once(':') {
                Some((name, value)) if is_header_name(name) => {
                    headers.push((name.to_string(), value.trim().to_string()));
                }
                _ => break,
            }
            pos = next;
        }

        Self {
            headers,
            body: raw[pos.min(raw.len())..].to_vec(),
        }
    }

    /// Parse the text returned by the editor.
    #[must_use]
    pub fn from_edited_text(text: &str) -> Self {
        Self::parse(text.as_bytes())
    }

    /// Serialize with `\n` line endings.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.len() + 256);
        for (name, value) in &self.headers {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.push(b'\n');
        }
        out.push(b'\n');
        out.extend_from_slice(&self.body);
        out
    }

    // ========================================================================
    // Headers
    // ========================================================================

    /// All headers in stored order.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First value of `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace the first `name` header in place, or append it.
    pub fn set_header(&mut self, name: &str, value: &str) {
        let value = single_line(value);
        if let Some(slot) = self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            slot.1 = value;
        } else {
            self.headers.push((name.to_string(), value));
        }
    }

    /// Remove every `name` header. Returns true when something was removed.
    pub fn remove_header(&mut self, name: &str) -> bool {
        let before = self.headers.len();
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        before != self.headers.len()
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        self.header("Subject").unwrap_or("")
    }

    #[must_use]
    pub fn author(&self) -> &str {
        self.header("From").unwrap_or("")
    }

    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.header("Message-Id")
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// The Message-Id this message replies to.
    ///
    /// In-Reply-To wins; otherwise the last id listed in References.
    #[must_use]
    pub fn parent_id(&self) -> Option<&str> {
        if let Some(irt) = self
            .header("In-Reply-To")
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            return Some(irt);
        }
        self.header("References")
            .and_then(|r| r.split_whitespace().last())
    }

    /// True for a message without any reply reference.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_id().is_none()
    }

    /// Parsed `Date` header; `None` when missing or unparseable.
    #[must_use]
    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        self.header("Date")
            .and_then(|d| DateTime::parse_from_rfc2822(d.trim()).ok())
    }

    // ========================================================================
    // Body
    // ========================================================================

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.body = body.into();
    }

    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.header("Content-Type")
            .is_some_and(|ct| ct.trim_start().to_ascii_lowercase().starts_with("multipart/"))
    }

    /// Decode text parts and attachments.
    #[must_use]
    pub fn parts(&self) -> MessageParts {
        let raw = self.to_bytes();
        let Some(parsed) = MessageParser::default().parse(&raw) else {
            return MessageParts {
                text: vec![String::from_utf8_lossy(&self.body).into_owned()],
                attachments: Vec::new(),
            };
        };

        let mut parts = MessageParts::default();
        for part in &parsed.parts {
            let content_type = part
                .content_type()
                .map(|ct| {
                    format!(
                        "{}/{}",
                        ct.ctype(),
                        ct.subtype().unwrap_or("octet-stream")
                    )
                })
                .unwrap_or_else(|| "text/plain".to_string());
            let filename = part.attachment_name().map(ToString::to_string);

            let bytes: Vec<u8> = match &part.body {
                PartType::Multipart(_) => continue,
                PartType::Text(text) if filename.is_none() => {
                    parts.text.push(text.to_string());
                    continue;
                }
                PartType::Text(text) | PartType::Html(text) => text.as_bytes().to_vec(),
                PartType::Binary(data) | PartType::InlineBinary(data) => data.to_vec(),
                PartType::Message(msg) => msg.raw_message.to_vec(),
            };
            parts.attachments.push(Attachment {
                number: parts.attachments.len() + 1,
                content_type,
                filename,
                bytes,
            });
        }
        parts
    }

    // ========================================================================
    // Attachments
    // ========================================================================

    /// Read `paths` and attach them. See [`Message::with_attachments`].
    ///
    /// # Errors
    ///
    /// Returns `Io` if any file cannot be read.
    pub fn attach_files<P: AsRef<Path>>(self, paths: &[P]) -> Result<Self> {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let name = path
                .file_name()
                .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
            files.push((name, fs::read(path)?));
        }
        Ok(self.with_attachments(files))
    }

    /// Convert into `multipart/mixed` with the current body as the first
    /// text part and each file as a base64 encoded attachment part.
    #[must_use]
    pub fn with_attachments(mut self, files: Vec<(String, Vec<u8>)>) -> Self {
        if files.is_empty() {
            return self;
        }

        let boundary = format!("=============mailtrack{}==", random_hex_id());
        let text_type = self
            .header("Content-Type")
            .unwrap_or("text/plain; charset=\"utf-8\"")
            .to_string();
        let text_encoding = self
            .header("Content-Transfer-Encoding")
            .map(ToString::to_string);

        let mut body = Vec::new();
        body.extend_from_slice(format!("--{boundary}\n").as_bytes());
        body.extend_from_slice(format!("Content-Type: {text_type}\n").as_bytes());
        if let Some(enc) = text_encoding {
            body.extend_from_slice(format!("Content-Transfer-Encoding: {enc}\n").as_bytes());
        }
        body.push(b'\n');
        body.extend_from_slice(&self.body);
        if !self.body.ends_with(b"\n") {
            body.push(b'\n');
        }

        for (name, data) in files {
            body.extend_from_slice(format!("--{boundary}\n").as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Type: {}\nMIME-Version: 1.0\nContent-Transfer-Encoding: base64\n\
                     Content-Disposition: attachment; filename=\"{}\"\n\n",
                    guess_content_type(&name),
                    name.replace('"', "")
                )
                .as_bytes(),
            );
            let encoded = BASE64.encode(&data);
            for chunk in encoded.as_bytes().chunks(76) {
                body.extend_from_slice(chunk);
                body.push(b'\n');
            }
        }
        body.extend_from_slice(format!("--{boundary}--\n").as_bytes());

        self.remove_header("Content-Transfer-Encoding");
        self.set_header("MIME-Version", "1.0");
        self.set_header(
            "Content-Type",
            &format!("multipart/mixed; boundary=\"{boundary}\""),
        );
        self.body = body;
        self
    }
}

fn is_header_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_graphic() && b != b':')
}

fn single_line(value: &str) -> String {
    value
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Content type from a file name's extension.
#[must_use]
pub fn guess_content_type(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

fn extension_for(content_type: &str) -> String {
    let ct = content_type.to_ascii_lowercase();
    if ct == "text/plain" {
        return ".txt".to_string();
    }
    mime_guess::get_mime_extensions_str(&ct)
        .and_then(|exts| exts.first())
        .map_or_else(|| ".bin".to_string(), |ext| format!(".{ext}"))
}
