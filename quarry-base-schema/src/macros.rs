//! Provides a set of custom macros.

/// Implements the `Serialize` trait on a type that implements `Display`.
#[macro_export]
macro_rules! impl_str_ser {
    ($type:ty) => {
        impl ::serde::Serialize for $type {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: ::serde::Serializer,
            {
                serializer.collect_str(self)
            }
        }
    };
}

/// Implements the `Deserialize` trait on a type that implements `FromStr`.
#[macro_export]
macro_rules! impl_str_de {
    ($type:ty, $expectation:expr) => {
        impl<'de> ::serde::Deserialize<'de> for $type {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: ::serde::Deserializer<'de>,
            {
                struct V;

                impl ::serde::de::Visitor<'_> for V {
                    type Value = $type;

                    fn expecting(&self, formatter: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                        formatter.write_str($expectation)
                    }

                    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
                    where
                        E: ::serde::de::Error,
                    {
                        value.parse().map_err(::serde::de::Error::custom)
                    }
                }

                deserializer.deserialize_str(V)
            }
        }
    };
}

/// Implements the `Serialize` and `Deserialize` traits on a type that
/// implements `Display` and `FromStr`.
#[macro_export]
macro_rules! impl_str_serde {
    ($type:ty, $expectation:expr) => {
        $crate::impl_str_ser!($type);
        $crate::impl_str_de!($type, $expectation);
    };
}
