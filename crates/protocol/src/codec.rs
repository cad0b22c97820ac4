//! Wire-Format fuer die TLS-Verbindung
//!
//! Zeilenbasiertes Protokoll: jede Nachricht ist eine UTF-8-Zeile, das erste
//! `\n` terminiert das Frame. Kein Laengen-Praefix, kein Binaerformat.
//! Ein optionales `\r` vor dem `\n` wird toleriert und entfernt.
//!
//! Die maximale Zeilenlaenge ist konfigurierbar (Standard: 8 KiB). Eine am
//! Stream-Ende unterminierte Zeile wird verworfen.

use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::Frame;

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Zeilenlaenge (8 KiB)
pub const DEFAULT_MAX_ZEILENLAENGE: usize = 8 * 1024;

// ---------------------------------------------------------------------------
// ZeilenCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer das zeilenbasierte Palaver-Protokoll
///
/// Dekodiert eingehende Zeilen als rohe `String`s (Client-Eingaben sind
/// freier Text) und kodiert ausgehende [`Frame`]s. Fuer die Integration
/// mit `tokio_util::codec::Framed` gedacht.
#[derive(Debug, Clone)]
pub struct ZeilenCodec {
    /// Maximale erlaubte Zeilenlaenge in Bytes (ohne Terminator)
    max_zeilenlaenge: usize,
}

impl ZeilenCodec {
    /// Erstellt einen neuen `ZeilenCodec` mit Standard-Limit
    pub fn neu() -> Self {
        Self {
            max_zeilenlaenge: DEFAULT_MAX_ZEILENLAENGE,
        }
    }

    /// Erstellt einen `ZeilenCodec` mit benutzerdefiniertem Zeilenlimit
    pub fn mit_limit(max_zeilenlaenge: usize) -> Self {
        Self { max_zeilenlaenge }
    }

    /// Gibt das konfigurierte Zeilenlimit zurueck
    pub fn max_zeilenlaenge(&self) -> usize {
        self.max_zeilenlaenge
    }
}

impl Default for ZeilenCodec {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Decoder-Implementierung
// ---------------------------------------------------------------------------

impl Decoder for ZeilenCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let position = match src.iter().position(|b| *b == b'\n') {
            Some(p) => p,
            None => {
                // Zeilenlimit auch fuer unvollstaendige Zeilen durchsetzen,
                // sonst kann ein Client den Buffer unbegrenzt fuellen
                if src.len() > self.max_zeilenlaenge {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "Zeile zu lang: mehr als {} Bytes ohne Terminator",
                            self.max_zeilenlaenge
                        ),
                    ));
                }
                return Ok(None);
            }
        };

        if position > self.max_zeilenlaenge {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Zeile zu lang: {} Bytes (Maximum: {} Bytes)",
                    position, self.max_zeilenlaenge
                ),
            ));
        }

        // Zeile inklusive Terminator aus dem Buffer nehmen
        let mut zeile = src.split_to(position + 1);
        zeile.truncate(position);
        if zeile.last() == Some(&b'\r') {
            zeile.truncate(position - 1);
        }

        let text = String::from_utf8(zeile.to_vec()).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Zeile ist kein gueltiges UTF-8: {}", e),
            )
        })?;

        Ok(Some(text))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(zeile) => Ok(Some(zeile)),
            None => {
                // Unterminierte Restdaten am Stream-Ende werden verworfen
                if !src.is_empty() {
                    src.advance(src.len());
                }
                Ok(None)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Encoder-Implementierung
// ---------------------------------------------------------------------------

impl Encoder<Frame> for ZeilenCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let zeile = item.to_string();

        // Ein eingebetteter Zeilenumbruch wuerde das Framing zerstoeren
        if zeile.contains('\n') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Frame enthaelt einen Zeilenumbruch",
            ));
        }
        if zeile.len() > self.max_zeilenlaenge {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Frame zu lang: {} Bytes (Maximum: {} Bytes)",
                    zeile.len(),
                    self.max_zeilenlaenge
                ),
            ));
        }

        dst.reserve(zeile.len() + 1);
        dst.put_slice(zeile.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeile_dekodieren() {
        let mut codec = ZeilenCodec::neu();
        let mut buf = BytesMut::from(&b"hallo welt\n"[..]);

        let zeile = codec.decode(&mut buf).unwrap().expect("Zeile erwartet");
        assert_eq!(zeile, "hallo welt");
        assert!(buf.is_empty());
    }

    #[test]
    fn crlf_wird_entfernt() {
        let mut codec = ZeilenCodec::neu();
        let mut buf = BytesMut::from(&b"alice\r\n"[..]);

        let zeile = codec.decode(&mut buf).unwrap().expect("Zeile erwartet");
        assert_eq!(zeile, "alice");
    }

    #[test]
    fn unvollstaendige_zeile_wartet_auf_mehr_daten() {
        let mut codec = ZeilenCodec::neu();
        let mut buf = BytesMut::from(&b"ohne terminator"[..]);

        assert!(codec.decode(&mut buf).unwrap().is_none());
        // Daten bleiben im Buffer
        assert_eq!(&buf[..], b"ohne terminator");
    }

    #[test]
    fn mehrere_zeilen_im_buffer() {
        let mut codec = ZeilenCodec::neu();
        let mut buf = BytesMut::from(&b"eins\nzwei\ndrei\n"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "eins");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "zwei");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "drei");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn leere_zeile_ist_gueltig() {
        let mut codec = ZeilenCodec::neu();
        let mut buf = BytesMut::from(&b"\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "");
    }

    #[test]
    fn ablehnung_zu_lange_zeile() {
        let mut codec = ZeilenCodec::mit_limit(8);
        let mut buf = BytesMut::from(&b"viel zu lange zeile\n"[..]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn ablehnung_zu_lange_zeile_ohne_terminator() {
        let mut codec = ZeilenCodec::mit_limit(8);
        let mut buf = BytesMut::from(&b"laengst ueber dem limit"[..]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn ablehnung_ungueltiges_utf8() {
        let mut codec = ZeilenCodec::neu();
        let mut buf = BytesMut::from(&[0xff, 0xfe, b'\n'][..]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn eof_verwirft_unterminierte_restzeile() {
        let mut codec = ZeilenCodec::neu();
        let mut buf = BytesMut::from(&b"abgeschnitt"[..]);

        let result = codec.decode_eof(&mut buf).unwrap();
        assert!(result.is_none());
        assert!(buf.is_empty(), "Restdaten muessen verworfen sein");
    }

    #[test]
    fn eof_liefert_vollstaendige_zeile_noch_aus() {
        let mut codec = ZeilenCodec::neu();
        let mut buf = BytesMut::from(&b"letzte zeile\nrest"[..]);

        assert_eq!(codec.decode_eof(&mut buf).unwrap().unwrap(), "letzte zeile");
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn frame_kodieren() {
        let mut codec = ZeilenCodec::neu();
        let mut buf = BytesMut::new();

        codec.encode(Frame::SubmitName, &mut buf).unwrap();
        codec
            .encode(Frame::NewUser("alice".into()), &mut buf)
            .unwrap();

        assert_eq!(&buf[..], b"SUBMIT_NAME\nNEW_USER alice\n");
    }

    #[test]
    fn encode_ablehnung_eingebetteter_zeilenumbruch() {
        let mut codec = ZeilenCodec::neu();
        let mut buf = BytesMut::new();

        let frame = Frame::Message {
            absender: "alice".into(),
            text: "zeile1\nzeile2".into(),
        };
        assert!(codec.encode(frame, &mut buf).is_err());
    }

    #[test]
    fn encode_decode_round_trip() {
        let mut codec = ZeilenCodec::neu();
        let mut buf = BytesMut::new();

        let frame = Frame::Message {
            absender: "bob".into(),
            text: "hallo".into(),
        };
        codec.encode(frame, &mut buf).unwrap();

        let zeile = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(zeile, "MESSAGE bob: hallo");
    }
}
