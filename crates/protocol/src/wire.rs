//! Wire-Format fuer TCP-Verbindungen
//!
//! Frame-basiertes Protokoll: Length(u32 big-endian) + JSON-Payload.
//!
//! ## Frame-Format
//!
//! ```text
//! +--------+--------+--------+--------+----...----+
//! | Laenge (u32 BE) | 4 Bytes        | Payload    |
//! +--------+--------+--------+--------+----...----+
//! ```
//!
//! Die Laenge gibt die Anzahl der Payload-Bytes an (ohne die 4 Laengen-Bytes).
//! Maximale Frame-Groesse ist konfigurierbar (Standard: 1 MB).
//!
//! Ein zu grosser Frame ist ein fataler Protokollfehler. Ein vollstaendig
//! empfangener Frame mit ungueltigem JSON oder unbekanntem Event wird dagegen
//! als `UngueltigeNachricht` geliefert; die Verbindung bleibt nutzbar.

use bytes::{Buf, BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::io;
use std::marker::PhantomData;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

use crate::control::ControlMessage;

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Frame-Groesse (1 MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Groesse des Laengen-Felds in Bytes
pub const LENGTH_FIELD_SIZE: usize = 4;

// ---------------------------------------------------------------------------
// UngueltigeNachricht
// ---------------------------------------------------------------------------

/// Ein vollstaendiger Frame der nicht dekodiert werden konnte
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UngueltigeNachricht {
    /// Request-ID falls sie sich noch aus dem JSON lesen liess, sonst 0
    pub request_id: u32,
    pub grund: String,
}

impl fmt::Display for UngueltigeNachricht {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ungueltige Nachricht (request_id {}): {}", self.request_id, self.grund)
    }
}

/// Ergebnis eines dekodierten Frames
pub type Dekodiert<D> = Result<ControlMessage<D>, UngueltigeNachricht>;

// ---------------------------------------------------------------------------
// FrameCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer frame-basierte TCP-Verbindungen
///
/// `D` ist der eingehende Payload-Typ. Kodiert wird jede serialisierbare
/// `ControlMessage`. Der Server verwendet `FrameCodec<ClientEvent>`, ein
/// Client `FrameCodec<ServerEvent>`.
///
/// # Beispiel
///
/// ```rust,no_run
/// use tokio_util::codec::Framed;
/// use plaza_protocol::{wire::FrameCodec, ClientEvent};
///
/// // let stream = TcpStream::connect(...).await?;
/// // let framed = Framed::new(stream, FrameCodec::<ClientEvent>::new());
/// ```
pub struct FrameCodec<D> {
    /// Maximale erlaubte Frame-Groesse in Bytes
    max_frame_size: usize,
    _eingang: PhantomData<fn() -> D>,
}

impl<D> FrameCodec<D> {
    /// Erstellt einen neuen `FrameCodec` mit Standard-Limits
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Erstellt einen `FrameCodec` mit benutzerdefinierter maximaler Frame-Groesse
    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            _eingang: PhantomData,
        }
    }

    /// Gibt die konfigurierte maximale Frame-Groesse zurueck
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl<D> Default for FrameCodec<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> Clone for FrameCodec<D> {
    fn clone(&self) -> Self {
        Self::with_max_size(self.max_frame_size)
    }
}

impl<D> fmt::Debug for FrameCodec<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameCodec")
            .field("max_frame_size", &self.max_frame_size)
            .finish()
    }
}

fn zu_gross(laenge: usize, maximum: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("Frame zu gross: {} Bytes (Maximum: {} Bytes)", laenge, maximum),
    )
}

/// Dekodiert einen Payload; bei Fehlern wird die Request-ID best effort gerettet
fn payload_dekodieren<D: DeserializeOwned>(payload: &[u8]) -> Dekodiert<D> {
    serde_json::from_slice::<ControlMessage<D>>(payload).map_err(|e| {
        let request_id = serde_json::from_slice::<serde_json::Value>(payload)
            .ok()
            .and_then(|v| v.get("request_id").and_then(serde_json::Value::as_u64))
            .and_then(|id| u32::try_from(id).ok())
            .unwrap_or(0);
        UngueltigeNachricht {
            request_id,
            grund: format!("JSON-Deserialisierung fehlgeschlagen: {}", e),
        }
    })
}

fn payload_kodieren<P: Serialize>(
    item: &ControlMessage<P>,
    max_frame_size: usize,
) -> io::Result<Vec<u8>> {
    let json = serde_json::to_vec(item).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("JSON-Serialisierung fehlgeschlagen: {}", e),
        )
    })?;

    if json.len() > max_frame_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Nachricht zu gross: {} Bytes (Maximum: {} Bytes)",
                json.len(),
                max_frame_size
            ),
        ));
    }
    Ok(json)
}

// ---------------------------------------------------------------------------
// Decoder-Implementierung
// ---------------------------------------------------------------------------

impl<D: DeserializeOwned> Decoder for FrameCodec<D> {
    type Item = Dekodiert<D>;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Warte auf mindestens 4 Bytes fuer das Laengen-Feld
        if src.len() < LENGTH_FIELD_SIZE {
            return Ok(None);
        }

        // Laenge lesen ohne den Buffer zu veraendern
        let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if length > self.max_frame_size {
            return Err(zu_gross(length, self.max_frame_size));
        }

        let total_size = LENGTH_FIELD_SIZE + length;
        if src.len() < total_size {
            src.reserve(total_size - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_FIELD_SIZE);
        let payload = src.split_to(length);

        Ok(Some(payload_dekodieren(&payload)))
    }
}

// ---------------------------------------------------------------------------
// Encoder-Implementierung
// ---------------------------------------------------------------------------

impl<D, P: Serialize> Encoder<ControlMessage<P>> for FrameCodec<D> {
    type Error = io::Error;

    fn encode(&mut self, item: ControlMessage<P>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = payload_kodieren(&item, self.max_frame_size)?;

        dst.reserve(LENGTH_FIELD_SIZE + json.len());
        dst.put_u32(json.len() as u32);
        dst.put_slice(&json);

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Hilfsfunktionen fuer direktes async Lesen/Schreiben
// ---------------------------------------------------------------------------

/// Liest einen einzelnen Frame aus einem `AsyncRead`
///
/// # Fehler
/// - `UnexpectedEof` wenn die Verbindung vor Abschluss des Frames getrennt wird
/// - `InvalidData` bei zu grossem Frame
pub async fn read_frame<R, D>(reader: &mut R, max_frame_size: usize) -> io::Result<Dekodiert<D>>
where
    R: AsyncRead + Unpin,
    D: DeserializeOwned,
{
    let mut len_buf = [0u8; LENGTH_FIELD_SIZE];
    reader.read_exact(&mut len_buf).await?;
    let length = u32::from_be_bytes(len_buf) as usize;

    if length > max_frame_size {
        return Err(zu_gross(length, max_frame_size));
    }

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;

    Ok(payload_dekodieren(&payload))
}

/// Schreibt einen einzelnen Frame in einen `AsyncWrite`
///
/// # Fehler
/// - `InvalidData` wenn die Nachricht nicht serialisiert werden kann oder zu gross ist
/// - IO-Fehler beim Schreiben
pub async fn write_frame<W, P>(
    writer: &mut W,
    message: &ControlMessage<P>,
    max_frame_size: usize,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    P: Serialize,
{
    let json = payload_kodieren(message, max_frame_size)?;

    let len_bytes = (json.len() as u32).to_be_bytes();
    writer.write_all(&len_bytes).await?;
    writer.write_all(&json).await?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{ClientEvent, PingMessage, ServerEvent};

    fn test_ping(request_id: u32) -> ControlMessage<ClientEvent> {
        ControlMessage::new(
            request_id,
            ClientEvent::Ping(PingMessage {
                timestamp_ms: 999888777,
            }),
        )
    }

    #[test]
    fn frame_codec_encode_decode() {
        let mut codec = FrameCodec::<ClientEvent>::new();

        let mut buf = BytesMut::new();
        codec.encode(test_ping(42), &mut buf).unwrap();

        let payload_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert!(payload_len > 0);
        assert_eq!(buf.len(), LENGTH_FIELD_SIZE + payload_len);

        let decoded = codec
            .decode(&mut buf)
            .unwrap()
            .expect("Muss einen Frame enthalten")
            .expect("Frame muss gueltig sein");
        assert_eq!(decoded.request_id, 42);
        assert!(matches!(decoded.payload, ClientEvent::Ping(_)));
    }

    #[test]
    fn frame_codec_unvollstaendiger_frame() {
        let mut codec = FrameCodec::<ClientEvent>::new();

        let mut buf = BytesMut::new();
        codec.encode(test_ping(1), &mut buf).unwrap();

        let half = buf.len() / 2;
        let mut partial = buf.split_to(half);
        assert!(codec.decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn frame_codec_zu_wenig_bytes_fuer_laengenfeld() {
        let mut codec = FrameCodec::<ClientEvent>::new();
        let mut buf = BytesMut::from(&[0x00, 0x00][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn frame_codec_ablehnung_zu_grosser_frame() {
        let mut codec = FrameCodec::<ClientEvent>::with_max_size(100);

        let mut buf = BytesMut::new();
        buf.put_u32(200);
        buf.put_slice(&[b'x'; 200]);

        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn frame_codec_ablehnung_beim_encode_zu_grosse_nachricht() {
        let mut codec = FrameCodec::<ClientEvent>::with_max_size(10);
        let mut buf = BytesMut::new();
        assert!(codec.encode(test_ping(1), &mut buf).is_err());
    }

    #[test]
    fn ungueltiges_json_rettet_request_id() {
        let mut codec = FrameCodec::<ClientEvent>::new();
        let json = br#"{"request_id":17,"payload":{"event":"teleport","data":{}}}"#;

        let mut buf = BytesMut::new();
        buf.put_u32(json.len() as u32);
        buf.put_slice(json);
        // Ein gueltiger Frame danach muss weiterhin lesbar sein
        codec.encode(test_ping(18), &mut buf).unwrap();

        let fehler = codec.decode(&mut buf).unwrap().unwrap().unwrap_err();
        assert_eq!(fehler.request_id, 17);

        let danach = codec.decode(&mut buf).unwrap().unwrap().unwrap();
        assert_eq!(danach.request_id, 18);
        assert!(buf.is_empty());
    }

    #[test]
    fn kein_json_ergibt_request_id_null() {
        let mut codec = FrameCodec::<ClientEvent>::new();
        let mut buf = BytesMut::new();
        buf.put_u32(3);
        buf.put_slice(b"abc");

        let fehler = codec.decode(&mut buf).unwrap().unwrap().unwrap_err();
        assert_eq!(fehler.request_id, 0);
    }

    #[test]
    fn frame_codec_mehrere_nachrichten_im_buffer() {
        let mut codec = FrameCodec::<ClientEvent>::new();
        let mut buf = BytesMut::new();

        for i in 0..3u32 {
            codec.encode(test_ping(i), &mut buf).unwrap();
        }
        for i in 0..3u32 {
            let msg = codec.decode(&mut buf).unwrap().unwrap().unwrap();
            assert_eq!(msg.request_id, i);
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn frame_codec_default_max_size() {
        let codec = FrameCodec::<ServerEvent>::default();
        assert_eq!(codec.max_frame_size(), DEFAULT_MAX_FRAME_SIZE);
    }

    #[tokio::test]
    async fn async_read_write_frame() {
        let original = ControlMessage::pong(99, 1, 2);

        let mut buffer: Vec<u8> = Vec::new();
        write_frame(&mut buffer, &original, DEFAULT_MAX_FRAME_SIZE)
            .await
            .unwrap();
        assert!(buffer.len() > LENGTH_FIELD_SIZE);

        let mut cursor = io::Cursor::new(buffer);
        let decoded: ControlMessage<ServerEvent> = read_frame(&mut cursor, DEFAULT_MAX_FRAME_SIZE)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(decoded, original);
    }

    #[tokio::test]
    async fn async_read_frame_ablehnung_zu_grosser_frame() {
        let mut buffer: Vec<u8> = Vec::new();
        buffer.extend_from_slice(&(2u32 * 1024 * 1024).to_be_bytes());

        let mut cursor = io::Cursor::new(buffer);
        let result = read_frame::<_, ClientEvent>(&mut cursor, DEFAULT_MAX_FRAME_SIZE).await;
        assert!(result.is_err());
    }
}
