use itertools::Itertools;
use rand::RngCore;
use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use crate::envelope::encoding::{encode_body, CRLF};
use crate::envelope::sniff::detect_content_type;
use crate::envelope::Envelope;
use crate::error::{EnvelopeError, Result};

pub const MIME_PREAMBLE: &str = "This is a multi-part message in MIME format.";

/// Source of multipart boundaries.
///
/// Production code uses [`RandomBoundary`]; tests plug in [`FixedBoundaries`]
/// to get byte-exact payloads.
pub trait BoundarySource: Send {
    /// A fresh boundary, safe to put in a quoted-string and at most 70 chars long.
    fn next_boundary(&mut self) -> String;
}

/// 30 random bytes, hex encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomBoundary;

impl BoundarySource for RandomBoundary {
    fn next_boundary(&mut self) -> String {
        let mut bytes = [0u8; 30];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// Hands out the given boundaries in order, then `boundary-N` once exhausted.
#[derive(Debug, Clone, Default)]
pub struct FixedBoundaries {
    queue: VecDeque<String>,
    issued: usize,
}

impl FixedBoundaries {
    pub fn new<I, S>(boundaries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queue: boundaries.into_iter().map(Into::into).collect(),
            issued: 0,
        }
    }
}

impl BoundarySource for FixedBoundaries {
    fn next_boundary(&mut self) -> String {
        self.issued += 1;
        self.queue
            .pop_front()
            .unwrap_or_else(|| format!("boundary-{}", self.issued))
    }
}

/// Writes a multipart body part by part.
///
/// The first part opens with `--boundary`, every following one with
/// `CRLF--boundary`, so part bodies never need a trailing line break. Part
/// headers are written sorted by name.
pub struct MultipartWriter {
    buf: Vec<u8>,
    boundary: String,
    parts: usize,
}

impl MultipartWriter {
    pub fn new(boundary: String) -> Self {
        Self {
            buf: Vec::new(),
            boundary,
            parts: 0,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Appends bytes outside of any part: headers, preambles or an already
    /// framed sub-message.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_str(&mut self, text: &str) {
        self.write_raw(text.as_bytes());
    }

    /// Opens a new part with `headers`; the body follows with [`Self::write_raw`].
    pub fn create_part(&mut self, headers: &[(&str, String)]) {
        if self.parts > 0 {
            self.buf.extend_from_slice(CRLF.as_bytes());
        }
        self.buf.extend_from_slice(format!("--{}{}", self.boundary, CRLF).as_bytes());

        let sorted: BTreeMap<&str, &str> = headers
            .iter()
            .map(|(name, value)| (*name, value.as_str()))
            .collect();
        for (name, value) in sorted {
            self.buf
                .extend_from_slice(format!("{}: {}{}", name, value, CRLF).as_bytes());
        }
        self.buf.extend_from_slice(CRLF.as_bytes());
        self.parts += 1;
    }

    /// Writes the closing delimiter and returns the whole body.
    pub fn finish(mut self) -> Vec<u8> {
        if self.parts > 0 {
            self.buf.extend_from_slice(CRLF.as_bytes());
        }
        self.buf
            .extend_from_slice(format!("--{}--{}", self.boundary, CRLF).as_bytes());
        self.buf
    }
}

pub(crate) fn basic_headers(from: &str, to: &str, subject: &str) -> String {
    format!(
        "From: {}{crlf}To: {}{crlf}Subject: {}{crlf}",
        from,
        to,
        subject,
        crlf = CRLF
    )
}

pub(crate) fn cc_header(envelope: &Envelope) -> String {
    let cc_emails = envelope.cc_emails();
    if cc_emails.is_empty() {
        return String::new();
    }
    format!("Cc: {}{}", cc_emails.iter().join(","), CRLF)
}

fn text_part_headers(body: &[u8]) -> [(&'static str, String); 2] {
    [
        (
            "Content-Type",
            format!("{}; format=flowed; delsp=yes", detect_content_type(body)),
        ),
        ("Content-Transfer-Encoding", "base64".to_string()),
    ]
}

/// The `multipart/alternative` sub-message holding the text body and, when
/// present, the html body. It starts with its own `Content-Type` header so it
/// can be spliced straight after a boundary line.
pub fn build_alternative(envelope: &Envelope, boundaries: &mut dyn BoundarySource) -> Vec<u8> {
    let text = envelope.text_body().as_bytes();
    let mut writer = MultipartWriter::new(boundaries.next_boundary());

    let header = format!(
        "Content-Type: multipart/alternative; boundary=\"{}\"{crlf}{crlf}",
        writer.boundary(),
        crlf = CRLF
    );
    writer.write_str(&header);

    writer.create_part(&text_part_headers(text));
    writer.write_raw(&encode_body(text));

    if !envelope.html_body().is_empty() {
        let html = envelope.html_body().as_bytes();
        writer.create_part(&text_part_headers(html));
        writer.write_raw(&encode_body(html));
    }

    writer.finish()
}

/// The complete `multipart/mixed` message: addressing headers, the
/// alternative text/html sub-message and one part per attachment.
pub fn build_plain(envelope: &Envelope, boundaries: &mut dyn BoundarySource) -> Result<Vec<u8>> {
    let mut writer = MultipartWriter::new(boundaries.next_boundary());

    let header = format!(
        "Content-Type: multipart/mixed; boundary=\"{}\"{}",
        writer.boundary(),
        CRLF
    );
    writer.write_str(&header);
    writer.write_str(&basic_headers(
        envelope.effective_sender(),
        &envelope.recipient().email,
        envelope.subject(),
    ));
    writer.write_str(&cc_header(envelope));
    writer.write_str(&format!("{crlf}{}{crlf}", MIME_PREAMBLE, crlf = CRLF));

    // The sub-message declares its own Content-Type, so it goes right after
    // the boundary instead of into a new part.
    let alternative = build_alternative(envelope, boundaries);
    let delimiter = format!("--{}{}", writer.boundary(), CRLF);
    writer.write_str(&delimiter);
    writer.write_raw(&alternative);

    for path in envelope.attachments() {
        write_attachment(&mut writer, path)?;
    }

    Ok(writer.finish())
}

fn write_attachment(writer: &mut MultipartWriter, path: &Path) -> Result<()> {
    let contents = fs::read(path).map_err(|source| EnvelopeError::Attachment {
        path: path.to_path_buf(),
        source,
    })?;

    let content_type = detect_content_type(&contents);
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    writer.create_part(&[
        (
            "Content-Type",
            format!("{}; name=\"{}\"", content_type, file_name),
        ),
        (
            "Content-Disposition",
            format!("attachment; filename=\"{}\"", file_name),
        ),
        ("Content-Transfer-Encoding", "base64".to_string()),
    ]);
    writer.write_raw(&encode_body(&contents));

    Ok(())
}
