#![allow(non_camel_case_types)]

enum_builder! {
    /// The `ContentType` of a record.
    @U8
    EnumName: ContentType;
    EnumVal {
        ChangeCipherSpec => 0x14,
        Alert => 0x15,
        Handshake => 0x16,
        ApplicationData => 0x17,
        Heartbeat => 0x18,
    }
}

enum_builder! {
    @U16
    EnumName: ProtocolVersion;
    EnumVal {
        SSLv3 => 0x0300,
        TLSv1_0 => 0x0301,
        TLSv1_1 => 0x0302,
        TLSv1_2 => 0x0303,
        TLSv1_3 => 0x0304,
    }
}

impl ProtocolVersion {
    /// Whether this is TLS 1.3 or something newer.
    pub fn is_tls13(&self) -> bool {
        self.get_u16() >= 0x0304
    }
}

enum_builder! {
    @U8
    EnumName: HandshakeType;
    EnumVal {
        HelloRequest => 0x00,
        ClientHello => 0x01,
        ServerHello => 0x02,
        NewSessionTicket => 0x04,
        EndOfEarlyData => 0x05,
        EncryptedExtensions => 0x08,
        Certificate => 0x0b,
        ServerKeyExchange => 0x0c,
        CertificateRequest => 0x0d,
        ServerHelloDone => 0x0e,
        CertificateVerify => 0x0f,
        ClientKeyExchange => 0x10,
        Finished => 0x14,
        CertificateStatus => 0x16,
        KeyUpdate => 0x18,
        MessageHash => 0xfe,
    }
}

enum_builder! {
    @U8
    EnumName: AlertLevel;
    EnumVal {
        Warning => 0x01,
        Fatal => 0x02,
    }
}

enum_builder! {
    @U8
    EnumName: AlertDescription;
    EnumVal {
        CloseNotify => 0x00,
        UnexpectedMessage => 0x0a,
        BadRecordMac => 0x14,
        DecryptionFailed => 0x15,
        RecordOverflow => 0x16,
        DecompressionFailure => 0x1e,
        HandshakeFailure => 0x28,
        NoCertificate => 0x29,
        BadCertificate => 0x2a,
        UnsupportedCertificate => 0x2b,
        CertificateRevoked => 0x2c,
        CertificateExpired => 0x2d,
        CertificateUnknown => 0x2e,
        IllegalParameter => 0x2f,
        UnknownCA => 0x30,
        AccessDenied => 0x31,
        DecodeError => 0x32,
        DecryptError => 0x33,
        ExportRestriction => 0x3c,
        ProtocolVersion => 0x46,
        InsufficientSecurity => 0x47,
        InternalError => 0x50,
        InappropriateFallback => 0x56,
        UserCanceled => 0x5a,
        NoRenegotiation => 0x64,
        MissingExtension => 0x6d,
        UnsupportedExtension => 0x6e,
        CertificateUnobtainable => 0x6f,
        UnrecognisedName => 0x70,
        BadCertificateStatusResponse => 0x71,
        BadCertificateHashValue => 0x72,
        UnknownPSKIdentity => 0x73,
        CertificateRequired => 0x74,
        NoApplicationProtocol => 0x78,
    }
}

enum_builder! {
    @U16
    EnumName: ExtensionType;
    EnumVal {
        ServerName => 0x0000,
        MaxFragmentLength => 0x0001,
        StatusRequest => 0x0005,
        SupportedGroups => 0x000a,
        ECPointFormats => 0x000b,
        SignatureAlgorithms => 0x000d,
        Heartbeat => 0x000f,
        ALProtocolNegotiation => 0x0010,
        SCT => 0x0012,
        Padding => 0x0015,
        EncryptThenMac => 0x0016,
        ExtendedMasterSecret => 0x0017,
        RecordSizeLimit => 0x001c,
        SessionTicket => 0x0023,
        PreSharedKey => 0x0029,
        EarlyData => 0x002a,
        SupportedVersions => 0x002b,
        Cookie => 0x002c,
        PSKKeyExchangeModes => 0x002d,
        CertificateAuthorities => 0x002f,
        SignatureAlgorithmsCert => 0x0032,
        KeyShare => 0x0033,
        RenegotiationInfo => 0xff01,
    }
}

enum_builder! {
    @U16
    EnumName: NamedGroup;
    EnumVal {
        secp256r1 => 0x0017,
        secp384r1 => 0x0018,
        secp521r1 => 0x0019,
        X25519 => 0x001d,
        X448 => 0x001e,
        FFDHE2048 => 0x0100,
        FFDHE3072 => 0x0101,
    }
}

enum_builder! {
    @U16
    EnumName: SignatureScheme;
    EnumVal {
        RSA_PKCS1_SHA1 => 0x0201,
        ECDSA_SHA1_Legacy => 0x0203,
        RSA_PKCS1_SHA256 => 0x0401,
        ECDSA_NISTP256_SHA256 => 0x0403,
        RSA_PKCS1_SHA384 => 0x0501,
        ECDSA_NISTP384_SHA384 => 0x0503,
        RSA_PKCS1_SHA512 => 0x0601,
        ECDSA_NISTP521_SHA512 => 0x0603,
        RSA_PSS_RSAE_SHA256 => 0x0804,
        RSA_PSS_RSAE_SHA384 => 0x0805,
        RSA_PSS_RSAE_SHA512 => 0x0806,
        ED25519 => 0x0807,
        ED448 => 0x0808,
        RSA_PSS_PSS_SHA256 => 0x0809,
        RSA_PSS_PSS_SHA384 => 0x080a,
        RSA_PSS_PSS_SHA512 => 0x080b,
    }
}

enum_builder! {
    @U16
    EnumName: CipherSuite;
    EnumVal {
        TLS_EMPTY_RENEGOTIATION_INFO_SCSV => 0x00ff,
        TLS_RSA_WITH_AES_128_CBC_SHA => 0x002f,
        TLS_RSA_WITH_AES_256_CBC_SHA => 0x0035,
        TLS_RSA_WITH_AES_128_CBC_SHA256 => 0x003c,
        TLS_RSA_WITH_AES_256_CBC_SHA256 => 0x003d,
        TLS_RSA_WITH_AES_128_GCM_SHA256 => 0x009c,
        TLS_RSA_WITH_AES_256_GCM_SHA384 => 0x009d,
        TLS13_AES_128_GCM_SHA256 => 0x1301,
        TLS13_AES_256_GCM_SHA384 => 0x1302,
        TLS13_CHACHA20_POLY1305_SHA256 => 0x1303,
        TLS_FALLBACK_SCSV => 0x5600,
        TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA => 0xc009,
        TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA => 0xc00a,
        TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA => 0xc013,
        TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA => 0xc014,
        TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA256 => 0xc023,
        TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA384 => 0xc024,
        TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256 => 0xc027,
        TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA384 => 0xc028,
        TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256 => 0xc02b,
        TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384 => 0xc02c,
        TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256 => 0xc02f,
        TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384 => 0xc030,
        TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256 => 0xcca8,
        TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256 => 0xcca9,
    }
}

enum_builder! {
    @U8
    EnumName: ECCurveType;
    EnumVal {
        ExplicitPrime => 0x01,
        ExplicitChar2 => 0x02,
        NamedCurve => 0x03,
    }
}

enum_builder! {
    @U8
    EnumName: ECPointFormat;
    EnumVal {
        Uncompressed => 0x00,
        ANSIX962CompressedPrime => 0x01,
        ANSIX962CompressedChar2 => 0x02,
    }
}

enum_builder! {
    @U8
    EnumName: Compression;
    EnumVal {
        Null => 0x00,
        Deflate => 0x01,
    }
}

enum_builder! {
    @U8
    EnumName: HeartbeatMessageType;
    EnumVal {
        Request => 0x01,
        Response => 0x02,
    }
}

enum_builder! {
    @U8
    EnumName: HeartbeatMode;
    EnumVal {
        PeerAllowedToSend => 0x01,
        PeerNotAllowedToSend => 0x02,
    }
}

enum_builder! {
    @U8
    EnumName: PSKKeyExchangeMode;
    EnumVal {
        PSK_KE => 0x00,
        PSK_DHE_KE => 0x01,
    }
}

#[cfg(test)]
mod tests {
    use prober::codec::{Codec, Reader};
    use test_log::test;

    use super::*;

    #[test]
    fn test_unknown_values_survive() {
        let suite = CipherSuite::read(&mut Reader::init(&[0x13, 0x37])).unwrap();
        assert_eq!(suite, CipherSuite::Unknown(0x1337));
        assert_eq!(suite.get_encoding(), vec![0x13, 0x37]);

        assert_eq!(
            AlertDescription::from(0x14),
            AlertDescription::BadRecordMac
        );
        assert_eq!(ContentType::Unknown(0x63).get_u8(), 0x63);
    }

    #[test]
    fn test_version_order() {
        assert!(ProtocolVersion::TLSv1_3.is_tls13());
        assert!(!ProtocolVersion::TLSv1_2.is_tls13());
        assert!(ProtocolVersion::Unknown(0x7f1c).is_tls13());
    }
}
