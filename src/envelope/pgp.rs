//! PGP/MIME (RFC 3156) wrapping of the plain message.
//!
//! The plain `multipart/mixed` message is signed when the sender owns a secret
//! key, then encrypted for every recipient holding a public key and placed in
//! a `multipart/encrypted` envelope.

use log::debug;

use crate::envelope::encoding::CRLF;
use crate::envelope::gpg::KeyKind;
use crate::envelope::mime::{self, basic_headers, cc_header, BoundarySource, MultipartWriter};
use crate::envelope::Envelope;
use crate::error::{EnvelopeError, Result};

pub const ENCRYPTED_PREAMBLE: &str = "This is an OpenPGP/MIME encrypted message (RFC 4880 and 3156)";
pub const SIGNED_PREAMBLE: &str = "This is an OpenPGP/MIME signed message (RFC 4880 and 3156)";

/// Key ids of the recipient and of the cc entries from [`Envelope::cc_key_ids`].
pub(crate) fn recipient_key_ids(envelope: &Envelope) -> Vec<String> {
    let mut key_ids = envelope.cc_key_ids();
    if !envelope.recipient().pgp_key_id.is_empty() {
        key_ids.push(envelope.recipient().pgp_key_id.clone());
    }
    key_ids
}

/// True if the recipient or any cc entry has a public key in the keyring.
pub async fn is_candidate(envelope: &Envelope) -> bool {
    envelope
        .openpgp()
        .has_key(KeyKind::Public, &recipient_key_ids(envelope))
        .await
}

/// Wraps `body` and its detached `signature` in a `multipart/signed` message.
///
/// `body` goes in verbatim: re-framing it as a new part would change the
/// signed bytes.
pub fn build_signed(body: &[u8], signature: &[u8], boundaries: &mut dyn BoundarySource) -> Vec<u8> {
    let mut writer = MultipartWriter::new(boundaries.next_boundary());

    let header = format!(
        "Content-Type: multipart/signed; micalg=pgp-sha256; protocol=\"application/pgp-signature\"; boundary=\"{}\"{crlf}{crlf}{}{crlf}",
        writer.boundary(),
        SIGNED_PREAMBLE,
        crlf = CRLF
    );
    writer.write_str(&header);

    let delimiter = format!("--{}{}", writer.boundary(), CRLF);
    writer.write_str(&delimiter);
    writer.write_raw(body);
    writer.write_str(CRLF);

    writer.create_part(&[
        (
            "Content-Type",
            "application/pgp-signature; name=\"OpenPGP_signature.asc\"".to_string(),
        ),
        ("Content-Description", "OpenPGP digital signature".to_string()),
        (
            "Content-Disposition",
            "attachment; filename=\"OpenPGP_signature\"".to_string(),
        ),
    ]);
    writer.write_raw(signature);

    writer.finish()
}

/// Builds the complete PGP/MIME payload.
///
/// Fails if the recipients hold no usable public key: there is no fallback to
/// plain text here, callers check [`is_candidate`] first.
pub async fn build_encrypted(envelope: &Envelope, boundaries: &mut dyn BoundarySource) -> Result<Vec<u8>> {
    let recipients = recipient_key_ids(envelope);
    if recipients.is_empty() {
        return Err(EnvelopeError::NoRecipientKey);
    }

    let openpgp = envelope.openpgp();
    let sender_key = envelope.sender().pgp_key_id.as_str();
    let sender_keys: Vec<String> = if sender_key.is_empty() {
        Vec::new()
    } else {
        vec![sender_key.to_string()]
    };

    let mut writer = MultipartWriter::new(boundaries.next_boundary());
    let header = format!(
        "Content-Type: multipart/encrypted; protocol=\"application/pgp-encrypted\"; boundary=\"{}\"{}",
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
    writer.write_str(&format!("{crlf}{}{crlf}", ENCRYPTED_PREAMBLE, crlf = CRLF));

    writer.create_part(&[
        ("Content-Type", "application/pgp-encrypted".to_string()),
        (
            "Content-Description",
            "PGP/MIME version identification".to_string(),
        ),
    ]);
    writer.write_str("Version: 1\r\n");

    let mut body = mime::build_plain(envelope, boundaries)?;

    let sender_has_secret = openpgp.has_key(KeyKind::Secret, &sender_keys).await;
    if sender_has_secret {
        debug!("Signing message with key {}", sender_key);
        let signature = openpgp
            .sign(&body, sender_key, envelope.passphrase_file())
            .await?;
        body = build_signed(&body, &signature, boundaries);
    }

    // A secret key implies the public half is available to gpg.
    let encrypt_for_sender =
        sender_has_secret || openpgp.has_key(KeyKind::Public, &sender_keys).await;
    let sender = encrypt_for_sender.then_some(sender_key);
    let encrypted = openpgp
        .encrypt(&body, sender, &recipients)
        .await?;

    writer.create_part(&[
        (
            "Content-Type",
            "application/octet-stream; name=\"encrypted.asc\"".to_string(),
        ),
        ("Content-Description", "OpenPGP encrypted message".to_string()),
        (
            "Content-Disposition",
            "inline; filename=\"encrypted.asc\"".to_string(),
        ),
    ]);
    writer.write_raw(&encrypted);

    Ok(writer.finish())
}
