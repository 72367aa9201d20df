//! Ready-made conversation suites for the `tlsprober` binary.
//!
//! Every suite registers a [`SANITY`] conversation, a plain handshake which the driver runs
//! before and after the rest of the batch.

use prober::cli::{Registry, Suite, Target, SANITY};
use prober::error::Error;
use prober::mutation::{trailing_bit_flips, MutationSpec};
use prober::tree::{Conversation, NodeId};

use crate::nodes::commands::{Close, Connect, ResetHandshakeHashes, ResetRenegotiationInfo};
use crate::nodes::expect::{
    ExpectAlert, ExpectApplicationData, ExpectCertificate, ExpectCertificateVerify,
    ExpectChangeCipherSpec, ExpectClose, ExpectEncryptedExtensions, ExpectFinished,
    ExpectNewSessionTicket, ExpectServerHello, ExpectServerHelloDone, ExpectServerKeyExchange,
};
use crate::nodes::generators::{
    AlertGenerator, ApplicationDataGenerator, ChangeCipherSpecGenerator, ClientHelloGenerator,
    ClientKeyExchangeGenerator, FinishedGenerator, HelloExtension,
};
use crate::nodes::mutators::{fuzz_encrypted_message, fuzz_mac, fuzz_padding};
use crate::protocol::{TlsConversation, TlsNode, TlsProtocol};
use crate::tls::enums::{
    AlertDescription, AlertLevel, CipherSuite, ECPointFormat, ExtensionType, NamedGroup,
    PSKKeyExchangeMode, ProtocolVersion, SignatureScheme,
};
use crate::tls::extensions::Extension;
use crate::tls::suites::{self, KeyExchange};

pub const HTTP_GET: &[u8] = b"GET / HTTP/1.0\r\n\r\n";

/// Most NewSessionTicket messages a TLS 1.3 server may send in a row.
const MAX_TICKETS: usize = 8;

pub const SUITES: [Suite<TlsProtocol>; 5] = [
    Suite {
        name: "sanity",
        about: "full handshakes with the basic key exchanges",
        build: sanity_suite,
    },
    Suite {
        name: "fuzz-mac",
        about: "single bit flips in the MAC of application data",
        build: fuzz_mac_suite,
    },
    Suite {
        name: "fuzz-padding",
        about: "malformed CBC padding of application data",
        build: fuzz_padding_suite,
    },
    Suite {
        name: "extended-master-secret",
        about: "the extended master secret extension, RFC 7627",
        build: extended_master_secret_suite,
    },
    Suite {
        name: "tls13",
        about: "TLS 1.3 handshakes and tag corruption under each AEAD",
        build: tls13_suite,
    },
];

fn connect(target: &Target) -> TlsConversation {
    Conversation::new(TlsNode::command(
        Connect::new(target.host.clone(), target.port).with_timeout(target.timeout),
    ))
}

/// Chains `nodes` below `node` and returns the last of them.
fn chain<I>(conversation: &mut TlsConversation, mut node: NodeId, nodes: I) -> Result<NodeId, Error>
where
    I: IntoIterator<Item = TlsNode>,
{
    for kind in nodes {
        node = conversation.add_child(node, kind)?;
    }
    Ok(node)
}

/// Extensions a TLS 1.2 hello needs to negotiate `cipher`.
fn hello_extensions(cipher: CipherSuite, ems: bool) -> Result<Vec<HelloExtension>, Error> {
    let mut extensions = vec![HelloExtension::RenegotiationInfo];
    if ems {
        extensions.push(HelloExtension::Empty(ExtensionType::ExtendedMasterSecret));
    }
    if suites::lookup(cipher)?.kx == KeyExchange::Ecdhe {
        extensions.extend(
            [
                Extension::supported_groups(&[NamedGroup::secp256r1, NamedGroup::X25519]),
                Extension::ec_point_formats(&[ECPointFormat::Uncompressed]),
                Extension::signature_algorithms(&[
                    SignatureScheme::RSA_PSS_RSAE_SHA256,
                    SignatureScheme::RSA_PKCS1_SHA256,
                    SignatureScheme::RSA_PKCS1_SHA1,
                ]),
            ]
            .map(HelloExtension::from),
        );
    }
    Ok(extensions)
}

/// Server flight of a full TLS 1.2 handshake, from the ServerHello to the ServerHelloDone.
fn server_flight(
    conversation: &mut TlsConversation,
    node: NodeId,
    cipher: CipherSuite,
    mut server_extensions: Vec<ExtensionType>,
) -> Result<NodeId, Error> {
    let ecdhe = suites::lookup(cipher)?.kx == KeyExchange::Ecdhe;
    // echoed because hello_extensions offers it with every ECDHE suite
    if ecdhe {
        server_extensions.push(ExtensionType::ECPointFormats);
    }
    let mut node = chain(
        conversation,
        node,
        [
            TlsNode::expect(ExpectServerHello::new().with_extensions(server_extensions)),
            TlsNode::expect(ExpectCertificate),
        ],
    )?;
    if ecdhe {
        node = conversation.add_child(node, TlsNode::expect(ExpectServerKeyExchange::new()))?;
    }
    conversation.add_child(node, TlsNode::expect(ExpectServerHelloDone))
}

/// Full TLS 1.2 handshake up to the Finished of the server.
fn handshake(
    conversation: &mut TlsConversation,
    cipher: CipherSuite,
    ems: bool,
) -> Result<NodeId, Error> {
    let root = conversation.root();
    let hello = ClientHelloGenerator::new(vec![cipher])
        .with_extensions(hello_extensions(cipher, ems)?);
    let node = conversation.add_child(root, TlsNode::generator(hello))?;

    let mut expected = vec![ExtensionType::RenegotiationInfo];
    if ems {
        expected.push(ExtensionType::ExtendedMasterSecret);
    }
    let node = server_flight(conversation, node, cipher, expected)?;
    chain(
        conversation,
        node,
        [
            TlsNode::generator(ClientKeyExchangeGenerator::new()),
            TlsNode::generator(ChangeCipherSpecGenerator::new()),
            TlsNode::generator(FinishedGenerator::new()),
            TlsNode::expect(ExpectChangeCipherSpec),
            TlsNode::expect(ExpectFinished::new()),
        ],
    )
}

/// close_notify in both directions. A peer which just drops the connection is fine too.
fn close_notify(conversation: &mut TlsConversation, node: NodeId) -> Result<NodeId, Error> {
    let node = conversation.add_child(node, TlsNode::generator(AlertGenerator::default()))?;
    let alert = conversation.add_child(
        node,
        TlsNode::expect(ExpectAlert::new(
            AlertLevel::Warning,
            AlertDescription::CloseNotify,
        )),
    )?;
    conversation.set_alternate(alert, TlsNode::expect(ExpectClose))?;
    conversation.add_child(alert, TlsNode::command(Close))
}

/// An HTTP request answered by the server, then a clean shutdown.
fn request_and_close(conversation: &mut TlsConversation, node: NodeId) -> Result<NodeId, Error> {
    let node = chain(
        conversation,
        node,
        [
            TlsNode::generator(ApplicationDataGenerator(HTTP_GET.to_vec())),
            TlsNode::expect(ExpectApplicationData::new()),
        ],
    )?;
    close_notify(conversation, node)
}

/// The peer must reject what was just sent with a fatal alert and hang up.
fn fatal_alert(
    conversation: &mut TlsConversation,
    node: NodeId,
    description: AlertDescription,
) -> Result<NodeId, Error> {
    chain(
        conversation,
        node,
        [
            TlsNode::expect(ExpectAlert::new(AlertLevel::Fatal, description)),
            TlsNode::expect(ExpectClose),
        ],
    )
}

fn tls12_sanity(target: &Target, cipher: CipherSuite, ems: bool) -> Result<TlsConversation, Error> {
    let mut conversation = connect(target);
    let node = handshake(&mut conversation, cipher, ems)?;
    request_and_close(&mut conversation, node)?;
    Ok(conversation)
}

/// Registers a conversation which is rebuilt from `build` for every run.
fn register<F>(registry: &mut Registry<TlsProtocol>, name: String, target: &Target, build: F) -> Result<(), Error>
where
    F: Fn(&Target) -> Result<TlsConversation, Error> + 'static,
{
    let target = target.clone();
    registry.register(name, move || build(&target))
}

pub fn sanity_suite(target: &Target) -> Result<Registry<TlsProtocol>, Error> {
    let mut registry = Registry::new();
    register(&mut registry, SANITY.into(), target, |target| {
        tls12_sanity(target, CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA, false)
    })?;
    for cipher in [
        CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA256,
        CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256,
        CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA,
        CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
        CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
    ] {
        register(
            &mut registry,
            format!("sanity with {:?}", cipher),
            target,
            move |target| tls12_sanity(target, cipher, false),
        )?;
    }

    register(
        &mut registry,
        "sanity with SCSV".into(),
        target,
        |target| {
            let mut conversation = connect(target);
            let root = conversation.root();
            let hello = ClientHelloGenerator::new(vec![
                CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
                CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV,
            ]);
            let node = conversation.add_child(root, TlsNode::generator(hello))?;
            let node = server_flight(
                &mut conversation,
                node,
                CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
                vec![ExtensionType::RenegotiationInfo],
            )?;
            let node = chain(
                &mut conversation,
                node,
                [
                    TlsNode::generator(ClientKeyExchangeGenerator::new()),
                    TlsNode::generator(ChangeCipherSpecGenerator::new()),
                    TlsNode::generator(FinishedGenerator::new()),
                    TlsNode::expect(ExpectChangeCipherSpec),
                    TlsNode::expect(ExpectFinished::new()),
                ],
            )?;
            request_and_close(&mut conversation, node)?;
            Ok(conversation)
        },
    )?;
    Ok(registry)
}

/// CBC suites with their MAC length.
const CBC_SUITES: [(CipherSuite, usize); 2] = [
    (CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA, 20),
    (CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA256, 32),
];

pub fn fuzz_mac_suite(target: &Target) -> Result<Registry<TlsProtocol>, Error> {
    let mut registry = Registry::new();
    register(&mut registry, SANITY.into(), target, |target| {
        tls12_sanity(target, CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA, false)
    })?;

    let aead = [(CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256, 16)];
    for (cipher, mac_len) in CBC_SUITES.into_iter().chain(aead) {
        for (offset, mask) in trailing_bit_flips(mac_len) {
            register(
                &mut registry,
                format!("{:?}: xor 0x{:02x} at {} of the MAC", cipher, mask, offset),
                target,
                move |target| {
                    let mut conversation = connect(target);
                    let node = handshake(&mut conversation, cipher, false)?;
                    let request = fuzz_mac(
                        ApplicationDataGenerator(HTTP_GET.to_vec()),
                        MutationSpec::new().xor(offset, mask),
                    );
                    let node = conversation.add_child(node, TlsNode::generator(request))?;
                    fatal_alert(&mut conversation, node, AlertDescription::BadRecordMac)?;
                    Ok(conversation)
                },
            )?;
        }
    }
    Ok(registry)
}

/// Bytes of padding the fuzzed records carry at least, length byte included.
const LONG_PADDING: u8 = 200;

pub fn fuzz_padding_suite(target: &Target) -> Result<Registry<TlsProtocol>, Error> {
    let mut registry = Registry::new();
    register(&mut registry, SANITY.into(), target, |target| {
        tls12_sanity(target, CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA, false)
    })?;

    let mut cases = Vec::new();
    for (cipher, _) in CBC_SUITES {
        // the last byte is the padding length, flipping it moves the MAC
        for offset in [0, 1, -3, -2] {
            for mask in [0x01, 0x80, 0xff] {
                cases.push((cipher, Some(LONG_PADDING), offset, mask));
            }
        }
        cases.push((cipher, None, -1, 0x01));
        cases.push((cipher, Some(LONG_PADDING), -1, 0xff));
    }

    for (cipher, min_length, offset, mask) in cases {
        let length = min_length.map_or_else(|| "minimal".into(), |len| format!("{}+ byte", len));
        register(
            &mut registry,
            format!(
                "{:?}: xor 0x{:02x} at {} of {} padding",
                cipher, mask, offset, length
            ),
            target,
            move |target| {
                let mut conversation = connect(target);
                let node = handshake(&mut conversation, cipher, false)?;
                let request = fuzz_padding(
                    ApplicationDataGenerator(HTTP_GET.to_vec()),
                    min_length,
                    MutationSpec::new().xor(offset, mask),
                );
                let node = conversation.add_child(node, TlsNode::generator(request))?;
                fatal_alert(&mut conversation, node, AlertDescription::BadRecordMac)?;
                Ok(conversation)
            },
        )?;
    }

    register(
        &mut registry,
        "well formed long padding".into(),
        target,
        |target| {
            let mut conversation = connect(target);
            let node = handshake(&mut conversation, CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA, false)?;
            let request = fuzz_padding(
                ApplicationDataGenerator(HTTP_GET.to_vec()),
                Some(LONG_PADDING),
                MutationSpec::new(),
            );
            let node = chain(
                &mut conversation,
                node,
                [
                    TlsNode::generator(request),
                    TlsNode::expect(ExpectApplicationData::new()),
                ],
            )?;
            close_notify(&mut conversation, node)?;
            Ok(conversation)
        },
    )?;
    Ok(registry)
}

pub fn extended_master_secret_suite(target: &Target) -> Result<Registry<TlsProtocol>, Error> {
    let mut registry = Registry::new();
    register(&mut registry, SANITY.into(), target, |target| {
        tls12_sanity(target, CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA, false)
    })?;

    for cipher in [
        CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
        CipherSuite::TLS_RSA_WITH_AES_256_GCM_SHA384,
        CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA,
    ] {
        register(
            &mut registry,
            format!("extended master secret with {:?}", cipher),
            target,
            move |target| tls12_sanity(target, cipher, true),
        )?;
    }

    register(
        &mut registry,
        "malformed extended master secret ext".into(),
        target,
        |target| {
            let mut conversation = connect(target);
            let root = conversation.root();
            let hello = ClientHelloGenerator::new(vec![CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA])
                .with_extensions(vec![
                    HelloExtension::RenegotiationInfo,
                    Extension::new(ExtensionType::ExtendedMasterSecret, vec![0]).into(),
                ]);
            let node = conversation.add_child(root, TlsNode::generator(hello))?;
            fatal_alert(&mut conversation, node, AlertDescription::DecodeError)?;
            Ok(conversation)
        },
    )?;

    register(&mut registry, "no EMS by default".into(), target, |target| {
        let cipher = CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA;
        let mut conversation = connect(target);
        let root = conversation.root();
        let hello = ClientHelloGenerator::new(vec![cipher])
            .with_extensions(hello_extensions(cipher, false)?);
        let node = conversation.add_child(root, TlsNode::generator(hello))?;
        let node = server_flight(
            &mut conversation,
            node,
            cipher,
            vec![ExtensionType::RenegotiationInfo],
        )?;
        let node = chain(
            &mut conversation,
            node,
            [
                TlsNode::generator(ClientKeyExchangeGenerator::new()),
                TlsNode::generator(ChangeCipherSpecGenerator {
                    extended_master_secret: Some(true),
                    fake: false,
                }),
                TlsNode::generator(FinishedGenerator::new()),
            ],
        )?;
        fatal_alert(&mut conversation, node, AlertDescription::BadRecordMac)?;
        Ok(conversation)
    })?;

    register(
        &mut registry,
        "EMS with session resume".into(),
        target,
        |target| {
            let cipher = CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA;
            let mut conversation = connect(target);
            let node = handshake(&mut conversation, cipher, true)?;
            let node = chain(
                &mut conversation,
                node,
                [
                    TlsNode::generator(AlertGenerator::default()),
                    TlsNode::expect(ExpectAlert::new(
                        AlertLevel::Warning,
                        AlertDescription::CloseNotify,
                    )),
                    TlsNode::expect(ExpectClose),
                    TlsNode::command(
                        Connect::new(target.host.clone(), target.port)
                            .with_timeout(target.timeout),
                    ),
                    TlsNode::command(ResetHandshakeHashes),
                    TlsNode::command(ResetRenegotiationInfo::default()),
                    TlsNode::generator(
                        ClientHelloGenerator::new(vec![cipher])
                            .with_extensions(hello_extensions(cipher, true)?),
                    ),
                    TlsNode::expect(
                        ExpectServerHello::new()
                            .with_extensions(vec![
                                ExtensionType::RenegotiationInfo,
                                ExtensionType::ExtendedMasterSecret,
                            ])
                            .resumed(),
                    ),
                    TlsNode::expect(ExpectChangeCipherSpec),
                    TlsNode::expect(ExpectFinished::new()),
                    TlsNode::generator(ChangeCipherSpecGenerator::new()),
                    TlsNode::generator(FinishedGenerator::new()),
                ],
            )?;
            request_and_close(&mut conversation, node)?;
            Ok(conversation)
        },
    )?;
    Ok(registry)
}

const TLS13_SUITES: [CipherSuite; 3] = [
    CipherSuite::TLS13_AES_128_GCM_SHA256,
    CipherSuite::TLS13_AES_256_GCM_SHA384,
    CipherSuite::TLS13_CHACHA20_POLY1305_SHA256,
];

fn tls13_hello(ciphers: Vec<CipherSuite>) -> ClientHelloGenerator {
    ClientHelloGenerator::new(ciphers)
        .with_version(ProtocolVersion::TLSv1_2)
        .with_extensions(vec![
            HelloExtension::KeyShare(vec![NamedGroup::secp256r1]),
            Extension::supported_versions(&[ProtocolVersion::TLSv1_3, ProtocolVersion::TLSv1_2])
                .into(),
            Extension::supported_groups(&[NamedGroup::secp256r1]).into(),
            Extension::psk_key_exchange_modes(&[PSKKeyExchangeMode::PSK_DHE_KE]).into(),
            Extension::signature_algorithms(&[
                SignatureScheme::RSA_PSS_RSAE_SHA256,
                SignatureScheme::RSA_PSS_PSS_SHA256,
            ])
            .into(),
            Extension::signature_algorithms_cert(&[
                SignatureScheme::RSA_PSS_RSAE_SHA256,
                SignatureScheme::RSA_PKCS1_SHA256,
                SignatureScheme::RSA_PKCS1_SHA1,
            ])
            .into(),
        ])
}

/// TLS 1.3 handshake up to and including the client Finished.
fn tls13_handshake(conversation: &mut TlsConversation, ciphers: Vec<CipherSuite>) -> Result<NodeId, Error> {
    let root = conversation.root();
    chain(
        conversation,
        root,
        [
            TlsNode::generator(tls13_hello(ciphers)),
            TlsNode::expect(ExpectServerHello::new()),
            TlsNode::expect(ExpectChangeCipherSpec),
            TlsNode::expect(ExpectEncryptedExtensions::default()),
            TlsNode::expect(ExpectCertificate),
            TlsNode::expect(ExpectCertificateVerify),
            TlsNode::expect(ExpectFinished::new()),
            TlsNode::generator(FinishedGenerator::new()),
        ],
    )
}

/// Session tickets may arrive at any time after the handshake, `exit` takes what follows them.
fn tickets_then(
    conversation: &mut TlsConversation,
    node: NodeId,
    exit: TlsNode,
) -> Result<NodeId, Error> {
    let tickets = conversation.add_child(node, TlsNode::expect(ExpectNewSessionTicket))?;
    conversation.repeat_while_matches(tickets, MAX_TICKETS)?;
    conversation.add_child(tickets, exit)
}

fn tls13_sanity(target: &Target, ciphers: Vec<CipherSuite>) -> Result<TlsConversation, Error> {
    let mut conversation = connect(target);
    let node = tls13_handshake(&mut conversation, ciphers)?;
    let node = conversation.add_child(
        node,
        TlsNode::generator(ApplicationDataGenerator(HTTP_GET.to_vec())),
    )?;
    let node = tickets_then(
        &mut conversation,
        node,
        TlsNode::expect(ExpectApplicationData::new()),
    )?;
    close_notify(&mut conversation, node)?;
    Ok(conversation)
}

pub fn tls13_suite(target: &Target) -> Result<Registry<TlsProtocol>, Error> {
    let mut registry = Registry::new();
    register(&mut registry, SANITY.into(), target, |target| {
        tls13_sanity(target, TLS13_SUITES.to_vec())
    })?;

    for cipher in TLS13_SUITES {
        register(
            &mut registry,
            format!("check connection with {:?}", cipher),
            target,
            move |target| tls13_sanity(target, vec![cipher]),
        )?;

        for (offset, mask) in trailing_bit_flips(16).filter(|(_, mask)| *mask == 0x01) {
            register(
                &mut registry,
                format!("{:?}: xor 0x{:02x} at {} of the tag", cipher, mask, offset),
                target,
                move |target| {
                    let mut conversation = connect(target);
                    let node = tls13_handshake(&mut conversation, vec![cipher])?;
                    let request = fuzz_encrypted_message(
                        ApplicationDataGenerator(HTTP_GET.to_vec()),
                        MutationSpec::new().xor(offset, mask),
                    );
                    let node = conversation.add_child(node, TlsNode::generator(request))?;
                    let node = tickets_then(
                        &mut conversation,
                        node,
                        TlsNode::expect(ExpectAlert::new(
                            AlertLevel::Fatal,
                            AlertDescription::BadRecordMac,
                        )),
                    )?;
                    conversation.add_child(node, TlsNode::expect(ExpectClose))?;
                    Ok(conversation)
                },
            )?;
        }
    }
    Ok(registry)
}
