//! Hello extensions.
//!
//! Extensions are kept as type and raw body so that conversations can send anything they
//! like. The helpers below build and parse the handful of bodies the key schedule needs.

use prober::codec::{encode_prefixed, encode_vec_u16, encode_vec_u8, read_vec_u16, Codec, Reader};

use crate::tls::enums::{
    ECPointFormat, ExtensionType, HeartbeatMode, NamedGroup, PSKKeyExchangeMode, ProtocolVersion,
    SignatureScheme,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub typ: ExtensionType,
    pub data: Vec<u8>,
}

impl Codec for Extension {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.typ.encode(bytes);
        encode_prefixed(bytes, 2, |out| out.extend_from_slice(&self.data));
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let typ = ExtensionType::read(r)?;
        let len = usize::from(u16::read(r)?);
        let data = r.take(len)?.to_vec();
        Some(Self { typ, data })
    }
}

impl Extension {
    pub fn new(typ: ExtensionType, data: Vec<u8>) -> Self {
        Self { typ, data }
    }

    pub fn empty(typ: ExtensionType) -> Self {
        Self::new(typ, Vec::new())
    }

    pub fn server_name(host: &str) -> Self {
        let mut data = Vec::new();
        encode_prefixed(&mut data, 2, |list| {
            list.push(0); // host_name
            encode_prefixed(list, 2, |name| name.extend_from_slice(host.as_bytes()));
        });
        Self::new(ExtensionType::ServerName, data)
    }

    pub fn supported_versions(versions: &[ProtocolVersion]) -> Self {
        let mut data = Vec::new();
        encode_vec_u8(&mut data, versions);
        Self::new(ExtensionType::SupportedVersions, data)
    }

    pub fn supported_groups(groups: &[NamedGroup]) -> Self {
        let mut data = Vec::new();
        encode_vec_u16(&mut data, groups);
        Self::new(ExtensionType::SupportedGroups, data)
    }

    pub fn signature_algorithms(schemes: &[SignatureScheme]) -> Self {
        let mut data = Vec::new();
        encode_vec_u16(&mut data, schemes);
        Self::new(ExtensionType::SignatureAlgorithms, data)
    }

    pub fn signature_algorithms_cert(schemes: &[SignatureScheme]) -> Self {
        Self {
            typ: ExtensionType::SignatureAlgorithmsCert,
            ..Self::signature_algorithms(schemes)
        }
    }

    pub fn ec_point_formats(formats: &[ECPointFormat]) -> Self {
        let mut data = Vec::new();
        encode_vec_u8(&mut data, formats);
        Self::new(ExtensionType::ECPointFormats, data)
    }

    pub fn key_share(shares: &[(NamedGroup, Vec<u8>)]) -> Self {
        let mut data = Vec::new();
        encode_prefixed(&mut data, 2, |list| {
            for (group, public) in shares {
                group.encode(list);
                encode_prefixed(list, 2, |key| key.extend_from_slice(public));
            }
        });
        Self::new(ExtensionType::KeyShare, data)
    }

    pub fn renegotiation_info(verify_data: &[u8]) -> Self {
        let mut data = Vec::new();
        encode_prefixed(&mut data, 1, |out| out.extend_from_slice(verify_data));
        Self::new(ExtensionType::RenegotiationInfo, data)
    }

    pub fn record_size_limit(limit: u16) -> Self {
        Self::new(ExtensionType::RecordSizeLimit, limit.get_encoding())
    }

    pub fn psk_key_exchange_modes(modes: &[PSKKeyExchangeMode]) -> Self {
        let mut data = Vec::new();
        encode_vec_u8(&mut data, modes);
        Self::new(ExtensionType::PSKKeyExchangeModes, data)
    }

    pub fn heartbeat(mode: HeartbeatMode) -> Self {
        Self::new(ExtensionType::Heartbeat, mode.get_encoding())
    }
}

pub fn find(extensions: &[Extension], typ: ExtensionType) -> Option<&Extension> {
    extensions.iter().find(|ext| ext.typ == typ)
}

/// The version a server selected in its supported_versions extension.
pub fn parse_selected_version(data: &[u8]) -> Option<ProtocolVersion> {
    ProtocolVersion::read_bytes(data)
}

/// The single share a server answers with.
pub fn parse_server_key_share(data: &[u8]) -> Option<(NamedGroup, Vec<u8>)> {
    let mut rd = Reader::init(data);
    let group = NamedGroup::read(&mut rd)?;
    let len = usize::from(u16::read(&mut rd)?);
    let public = rd.take(len)?.to_vec();
    if rd.any_left() {
        return None;
    }
    Some((group, public))
}

pub fn parse_renegotiation_info(data: &[u8]) -> Option<Vec<u8>> {
    let mut rd = Reader::init(data);
    let len = usize::from(u8::read(&mut rd)?);
    let verify_data = rd.take(len)?.to_vec();
    if rd.any_left() {
        return None;
    }
    Some(verify_data)
}

pub fn parse_record_size_limit(data: &[u8]) -> Option<u16> {
    u16::read_bytes(data)
}

pub fn parse_signature_algorithms(data: &[u8]) -> Option<Vec<SignatureScheme>> {
    let mut rd = Reader::init(data);
    let schemes = read_vec_u16(&mut rd)?;
    if rd.any_left() {
        return None;
    }
    Some(schemes)
}
