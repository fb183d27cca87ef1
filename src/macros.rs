//! Declarative macros
//!
//! `variables!` builds template input inline; `builtin_plugin!` declares the
//! struct shared by every built-in plugin.

/// Creates a list of [`RawVariable`](crate::variable::RawVariable)s
///
/// Each entry is `NAME => "pipe"`, optionally followed by `= value` to supply
/// a resolved value.
///
/// ```
/// let vars = envpipe::variables! {
///     HOST => "string|default:localhost",
///     PORT => "port|required" = "8080",
/// };
/// assert_eq!(vars.len(), 2);
/// assert_eq!(vars[1].value.as_deref(), Some("8080"));
/// ```
#[macro_export]
macro_rules! variables {
    ($($name:ident => $pipe:literal $(= $value:expr)?),* $(,)?) => {
        vec![
            $(
                $crate::variable::RawVariable::new(stringify!($name), $pipe)
                    $(.with_value($value))?
            ),*
        ]
    };
}

/// Declares a built-in plugin struct holding its metadata
macro_rules! builtin_plugin {
    ($(#[$meta:meta])* $ty:ident, $name:literal, $description:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $ty {
            metadata: $crate::plugins::PluginMetadata,
        }

        impl $ty {
            /// Name the plugin is registered under by default
            pub const NAME: &'static str = $name;

            /// One-line description
            pub const DESCRIPTION: &'static str = $description;

            /// Creates the plugin under its built-in name
            #[must_use]
            pub fn new() -> Self {
                Self::with_metadata($crate::plugins::PluginMetadata::builtin(
                    Self::NAME,
                    Self::DESCRIPTION,
                ))
            }

            /// Creates the plugin under other metadata, e.g. a manifest name
            #[must_use]
            pub fn with_metadata(metadata: $crate::plugins::PluginMetadata) -> Self {
                Self { metadata }
            }
        }

        impl Default for $ty {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

pub(crate) use builtin_plugin;
