/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum stored
/// as text, using the same snake_case names serde uses on the wire.
macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $name),+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Self::$variant),)+
                    other => Err(format!("unknown {}: {other}", stringify!($ty))),
                }
            }
        }
    };
}

pub(crate) use text_enum;

pub mod category;
pub mod invite;
pub mod log;
pub mod member;
pub mod message;
pub mod ordered_ids;
pub mod reaction;
pub mod role;
pub mod room;
pub mod server;
