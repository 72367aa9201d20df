//! The record layer: framing, fragmentation, protection and reassembly over TCP.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{debug, trace};
use prober::accumulator::Accumulator;
use prober::codec::{Codec, Reader};
use prober::error::Error;
use prober::protocol::Inbound;

use crate::crypto::cipher::RecordCipher;
use crate::hooks::SendHooks;
use crate::tls::enums::{ContentType, ProtocolVersion};
use crate::tls::message::{Message, Record, RecordHeader, MAX_FRAGMENT_LEN};

/// How much zero padding TLS 1.3 records get.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddingStrategy {
    /// Exactly this many bytes, if they fit the record.
    Fixed(usize),
    /// As many bytes as fit the record.
    Fill,
    /// Exactly this many bytes, even if the record grows beyond its limit.
    AddFixed(usize),
}

impl PaddingStrategy {
    /// Padding for `len` bytes of content when at most `max_padding` bytes of content and
    /// padding fit one record.
    pub fn padding_len(self, len: usize, max_padding: usize) -> Result<usize, Error> {
        let room = max_padding.saturating_sub(len);
        match self {
            PaddingStrategy::Fixed(size) if size > room => Err(Error::Configuration(format!(
                "{} bytes of padding do not fit a record with {} bytes of content",
                size, len
            ))),
            PaddingStrategy::Fixed(size) | PaddingStrategy::AddFixed(size) => Ok(size),
            PaddingStrategy::Fill => Ok(room),
        }
    }
}

/// Reassembles messages of the content types which may span records.
///
/// Alerts and change cipher spec have a fixed size, handshake messages carry their length in
/// a header. Complete messages are handed out in that order of priority. Anything else passes
/// through one record at a time.
#[derive(Debug, Default)]
pub struct Defragmenter {
    alert: Vec<u8>,
    ccs: Vec<u8>,
    handshake: Vec<u8>,
    passthrough: VecDeque<Message>,
}

impl Defragmenter {
    pub fn add(&mut self, typ: ContentType, data: &[u8]) {
        match typ {
            ContentType::Alert => self.alert.extend_from_slice(data),
            ContentType::ChangeCipherSpec => self.ccs.extend_from_slice(data),
            ContentType::Handshake => self.handshake.extend_from_slice(data),
            other => self.passthrough.push_back(Message::new(other, data.to_vec())),
        }
    }

    fn take_fixed(buf: &mut Vec<u8>, len: usize) -> Option<Vec<u8>> {
        (buf.len() >= len).then(|| buf.drain(..len).collect())
    }

    fn handshake_len(&self) -> Option<usize> {
        let header = self.handshake.get(..4)?;
        let len = u32::from_be_bytes([0, header[1], header[2], header[3]]) as usize;
        Some(4 + len)
    }

    pub fn pop(&mut self) -> Option<Message> {
        if let Some(alert) = Self::take_fixed(&mut self.alert, 2) {
            return Some(Message::new(ContentType::Alert, alert));
        }
        if let Some(ccs) = Self::take_fixed(&mut self.ccs, 1) {
            return Some(Message::new(ContentType::ChangeCipherSpec, ccs));
        }
        if let Some(len) = self.handshake_len() {
            if let Some(handshake) = Self::take_fixed(&mut self.handshake, len) {
                return Some(Message::new(ContentType::Handshake, handshake));
            }
        }
        self.passthrough.pop_front()
    }

    /// Bytes of incomplete messages.
    pub fn pending(&self) -> usize {
        self.alert.len() + self.ccs.len() + self.handshake.len()
    }
}

pub struct RecordLayer {
    stream: TcpStream,
    received: Vec<u8>,
    defragmenter: Defragmenter,
    closed: bool,

    buffering: bool,
    outbound: Vec<u8>,

    version: ProtocolVersion,
    write: RecordCipher,
    read: RecordCipher,

    /// Fragment size chosen by the conversation.
    max_fragment: usize,
    /// Largest record the peer is willing to receive.
    send_limit: usize,
    padding: Option<PaddingStrategy>,
    hooks: SendHooks,
    nonces: Option<Accumulator<Vec<u8>>>,
}

impl fmt::Debug for RecordLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordLayer")
            .field("peer", &self.stream.peer_addr().ok())
            .field("version", &self.version)
            .field("write", &self.write)
            .field("read", &self.read)
            .field("buffered", &self.outbound.len())
            .finish()
    }
}

impl RecordLayer {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            received: Vec::new(),
            defragmenter: Defragmenter::default(),
            closed: false,
            buffering: false,
            outbound: Vec::new(),
            version: ProtocolVersion::TLSv1_0,
            write: RecordCipher::null(),
            read: RecordCipher::null(),
            max_fragment: MAX_FRAGMENT_LEN,
            send_limit: MAX_FRAGMENT_LEN,
            padding: None,
            hooks: SendHooks::default(),
            nonces: None,
        }
    }

    /// Opens a TCP connection with Nagle disabled and `timeout` applied to every read.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, Error> {
        let address = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::IO(format!("{} does not resolve", host)))?;
        let stream = TcpStream::connect_timeout(&address, timeout)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        debug!("connected to {}", address);
        Ok(Self::new(stream))
    }

    pub fn hooks_mut(&mut self) -> &mut SendHooks {
        &mut self.hooks
    }

    pub fn hooks(&self) -> &SendHooks {
        &self.hooks
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Version in the header of records we send.
    pub fn set_version(&mut self, version: ProtocolVersion) {
        self.version = version;
    }

    pub fn set_max_fragment(&mut self, size: usize) {
        self.max_fragment = size;
    }

    pub fn set_send_limit(&mut self, limit: usize) {
        self.send_limit = limit;
    }

    pub fn send_limit(&self) -> usize {
        self.send_limit
    }

    pub fn set_padding(&mut self, strategy: Option<PaddingStrategy>) {
        self.padding = strategy;
    }

    /// Starts a new write epoch. Nonce collection does not carry over.
    pub fn set_write_cipher(&mut self, cipher: RecordCipher) {
        debug!("write state changed to {:?}", cipher);
        self.write = cipher;
        self.nonces = None;
    }

    pub fn set_read_cipher(&mut self, cipher: RecordCipher) {
        debug!("read state changed to {:?}", cipher);
        self.read = cipher;
    }

    /// Records the nonce of every record sealed until the write state changes.
    pub fn collect_nonces(&mut self, sink: Accumulator<Vec<u8>>) {
        self.nonces = Some(sink);
    }

    pub fn set_buffering(&mut self, enabled: bool) {
        self.buffering = enabled;
    }

    pub fn is_buffering(&self) -> bool {
        self.buffering
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        if self.outbound.is_empty() {
            return Ok(());
        }
        trace!("flushing {} buffered bytes", self.outbound.len());
        let outbound = std::mem::take(&mut self.outbound);
        self.stream.write_all(&outbound)?;
        self.stream.flush()?;
        Ok(())
    }

    fn write_record(&mut self, record: &Record) -> Result<(), Error> {
        let bytes = record.get_encoding();
        trace!("record out: {}", hex::encode(&bytes));
        if self.buffering {
            self.outbound.extend_from_slice(&bytes);
            Ok(())
        } else {
            self.stream.write_all(&bytes)?;
            Ok(())
        }
    }

    fn fragment_len(&self) -> Result<usize, Error> {
        let limit = if self.write.is_tls13() {
            self.send_limit.saturating_sub(1)
        } else {
            self.send_limit
        };
        let len = self.max_fragment.min(limit);
        if len == 0 {
            return Err(Error::Configuration(
                "records can not carry any content".into(),
            ));
        }
        Ok(len)
    }

    fn padding_len(&self, len: usize) -> Result<usize, Error> {
        match self.padding {
            Some(strategy) if self.write.is_tls13() => {
                strategy.padding_len(len, self.send_limit.saturating_sub(1))
            }
            _ => Ok(0),
        }
    }

    /// Protects `message` with the current write state and the installed hooks, splitting it
    /// into as many records as the fragment size demands.
    pub fn send(&mut self, message: &Message) -> Result<(), Error> {
        let fragment_len = self.fragment_len()?;
        let fragments: Vec<&[u8]> = if message.payload.is_empty() {
            vec![&[]]
        } else {
            message.payload.chunks(fragment_len).collect()
        };

        for fragment in fragments {
            let padding = self.padding_len(fragment.len())?;
            let sealed = self
                .write
                .seal(message.typ, self.version, fragment, &self.hooks, padding)?;
            if let (Some(sink), Some(nonce)) = (&self.nonces, &sealed.nonce) {
                sink.push(nonce.clone());
            }
            self.write_record(&Record::new(sealed.typ, self.version, sealed.fragment))?;
        }
        Ok(())
    }

    /// Sends `message` in a single unprotected record, whatever the write state.
    pub fn send_plaintext(&mut self, message: &Message) -> Result<(), Error> {
        self.write_record(&Record::new(message.typ, self.version, message.payload.clone()))
    }

    fn is_closed(err: &io::Error) -> bool {
        matches!(
            err.kind(),
            ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe
                | ErrorKind::UnexpectedEof
        )
    }

    /// Next raw record, or `None` once the peer closed the connection.
    fn read_record(&mut self) -> Result<Option<Record>, Error> {
        let mut buf = [0u8; 4096];
        loop {
            match Record::inspect(&self.received) {
                RecordHeader::Complete(len) => {
                    let bytes: Vec<u8> = self.received.drain(..len).collect();
                    trace!("record in: {}", hex::encode(&bytes));
                    let record = Record::read(&mut Reader::init(&bytes))
                        .ok_or_else(|| Error::Codec("malformed record".into()))?;
                    return Ok(Some(record));
                }
                RecordHeader::Oversized(len) => {
                    return Err(Error::Protocol(format!(
                        "record with a fragment of {} bytes",
                        len
                    )))
                }
                RecordHeader::Incomplete => {}
            }

            if self.closed {
                return Ok(None);
            }
            match self.stream.read(&mut buf) {
                Ok(0) => self.closed = true,
                Ok(n) => self.received.extend_from_slice(&buf[..n]),
                Err(err) if Self::is_closed(&err) => self.closed = true,
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Next complete message, decrypted with the read state current at the time its record is
    /// taken off the wire.
    pub fn receive(&mut self) -> Result<Inbound<Message>, Error> {
        loop {
            if let Some(message) = self.defragmenter.pop() {
                return Ok(Inbound::Message(message));
            }
            let Some(record) = self.read_record()? else {
                if self.defragmenter.pending() > 0 {
                    debug!(
                        "connection closed with {} bytes of an incomplete message",
                        self.defragmenter.pending()
                    );
                }
                return Ok(Inbound::Closed);
            };
            let (typ, content) = self.read.open(record.typ, record.version, &record.fragment)?;
            self.defragmenter.add(typ, &content);
        }
    }

    pub fn close(&mut self) -> Result<(), Error> {
        self.flush()?;
        match self.stream.shutdown(Shutdown::Both) {
            Err(err) if err.kind() != ErrorKind::NotConnected => Err(err.into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use test_log::test;

    use super::*;

    fn pair() -> (RecordLayer, RecordLayer) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        // the backlog completes the handshake before accept is called
        let client = RecordLayer::connect("127.0.0.1", port, Duration::from_secs(5)).unwrap();
        let (stream, _) = listener.accept().unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        (client, RecordLayer::new(stream))
    }

    #[test]
    fn test_defragmenter_priorities() {
        let mut defragmenter = Defragmenter::default();
        defragmenter.add(ContentType::Handshake, &[0x0e, 0x00]);
        defragmenter.add(ContentType::ApplicationData, b"data");
        defragmenter.add(ContentType::Alert, &[0x02]);
        defragmenter.add(ContentType::Handshake, &[0x00, 0x00]);
        defragmenter.add(ContentType::Alert, &[0x28, 0x01]);

        assert_eq!(
            defragmenter.pop(),
            Some(Message::new(ContentType::Alert, vec![0x02, 0x28]))
        );
        assert_eq!(
            defragmenter.pop(),
            Some(Message::new(ContentType::Handshake, vec![0x0e, 0, 0, 0]))
        );
        assert_eq!(
            defragmenter.pop(),
            Some(Message::new(ContentType::ApplicationData, b"data".to_vec()))
        );
        assert_eq!(defragmenter.pop(), None);
        assert_eq!(defragmenter.pending(), 1);
    }

    #[test]
    fn test_padding_strategies() {
        assert_eq!(PaddingStrategy::Fill.padding_len(100, 16383).unwrap(), 16283);
        assert_eq!(PaddingStrategy::Fixed(10).padding_len(100, 16383).unwrap(), 10);
        assert!(PaddingStrategy::Fixed(200).padding_len(100, 250).is_err());
        assert_eq!(PaddingStrategy::AddFixed(200).padding_len(100, 250).unwrap(), 200);
    }

    #[test]
    fn test_fragmentation_and_reassembly() {
        let (mut client, mut server) = pair();
        client.set_version(ProtocolVersion::TLSv1_2);
        client.set_max_fragment(3);

        let finished = Message::new(ContentType::Handshake, vec![0x14, 0, 0, 4, 1, 2, 3, 4]);
        client.send(&finished).unwrap();
        assert_eq!(server.receive().unwrap(), Inbound::Message(finished));

        client.close().unwrap();
        assert_eq!(server.receive().unwrap(), Inbound::Closed);
        assert_eq!(server.receive().unwrap(), Inbound::Closed);
    }

    #[test]
    fn test_buffering() {
        let (mut client, mut server) = pair();
        client.set_buffering(true);
        let alert = Message::new(ContentType::Alert, vec![1, 0]);
        client.send(&alert).unwrap();
        client.send(&alert).unwrap();
        assert!(client.is_buffering());

        client.flush().unwrap();
        assert_eq!(server.receive().unwrap(), Inbound::Message(alert.clone()));
        assert_eq!(server.receive().unwrap(), Inbound::Message(alert));
    }

    #[test]
    fn test_timeout_is_an_error() {
        let (_client, mut server) = pair();
        server
            .stream
            .set_read_timeout(Some(Duration::from_millis(50)))
            .unwrap();
        assert!(matches!(server.receive(), Err(Error::Timeout(_))));
    }
}
