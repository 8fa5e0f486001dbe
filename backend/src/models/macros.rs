/// Defines a newtype ID wrapper around a signed integer surrogate key and
/// generates:
/// - derives (Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)
/// - `Display`
/// - `From<$inner> for $name` and `From<$name> for $inner`
/// - `ensure_positive`, which rejects zero and negative keys with a message
///   naming `$label`
///
/// Usage:
///   define_id_type!(i64, CycleId, "cycle");
#[macro_export]
macro_rules! define_id_type {
    ($inner:ty, $name:ident, $label:literal) => {
        #[derive(
            Debug,
            Copy,
            Clone,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                ::std::write!(f, "{}", self.0)
            }
        }

        impl ::std::convert::From<$inner> for $name {
            fn from(v: $inner) -> Self {
                $name(v)
            }
        }

        impl ::std::convert::From<$name> for $inner {
            fn from(v: $name) -> Self {
                v.0
            }
        }

        impl $name {
            pub fn new(value: $inner) -> Self {
                $name(value)
            }

            pub fn value(&self) -> $inner {
                self.0
            }

            /// Surrogate keys start at 1; anything else never came from the store.
            pub fn ensure_positive(&self) -> ::std::result::Result<(), String> {
                if self.0 > 0 {
                    Ok(())
                } else {
                    Err(::std::format!(
                        "{} id must be positive, got {}",
                        $label,
                        self.0
                    ))
                }
            }
        }
    };
}
