/// Builds a wire enum out of a list of named values.
///
/// Unknown values are kept in an `Unknown` variant so that whatever a peer sends, and whatever
/// a conversation wants to send, survives a read and encode cycle unchanged.
macro_rules! enum_builder {
    (
        $(#[$comment:meta])*
        @U8
        EnumName: $enum_name:ident;
        EnumVal { $( $enum_var:ident => $enum_val:literal ),* $(,)? }
    ) => {
        $(#[$comment])*
        #[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
        pub enum $enum_name {
            $( $enum_var ),*,
            Unknown(u8),
        }

        impl $enum_name {
            pub fn get_u8(&self) -> u8 {
                match *self {
                    $( $enum_name::$enum_var => $enum_val ),*,
                    $enum_name::Unknown(x) => x,
                }
            }
        }

        impl From<u8> for $enum_name {
            fn from(x: u8) -> Self {
                match x {
                    $( $enum_val => $enum_name::$enum_var ),*,
                    x => $enum_name::Unknown(x),
                }
            }
        }

        impl prober::codec::Codec for $enum_name {
            fn encode(&self, bytes: &mut Vec<u8>) {
                prober::codec::Codec::encode(&self.get_u8(), bytes);
            }

            fn read(r: &mut prober::codec::Reader) -> Option<Self> {
                <u8 as prober::codec::Codec>::read(r).map($enum_name::from)
            }
        }
    };
    (
        $(#[$comment:meta])*
        @U16
        EnumName: $enum_name:ident;
        EnumVal { $( $enum_var:ident => $enum_val:literal ),* $(,)? }
    ) => {
        $(#[$comment])*
        #[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
        pub enum $enum_name {
            $( $enum_var ),*,
            Unknown(u16),
        }

        impl $enum_name {
            pub fn get_u16(&self) -> u16 {
                match *self {
                    $( $enum_name::$enum_var => $enum_val ),*,
                    $enum_name::Unknown(x) => x,
                }
            }
        }

        impl From<u16> for $enum_name {
            fn from(x: u16) -> Self {
                match x {
                    $( $enum_val => $enum_name::$enum_var ),*,
                    x => $enum_name::Unknown(x),
                }
            }
        }

        impl prober::codec::Codec for $enum_name {
            fn encode(&self, bytes: &mut Vec<u8>) {
                prober::codec::Codec::encode(&self.get_u16(), bytes);
            }

            fn read(r: &mut prober::codec::Reader) -> Option<Self> {
                <u16 as prober::codec::Codec>::read(r).map($enum_name::from)
            }
        }
    };
}
