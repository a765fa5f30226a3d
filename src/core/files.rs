//! Typed paths for the three kinds of files a build tracks.
//!
//! Sources are compiler inputs, binaries are classpath inputs produced
//! elsewhere, and products are the artifacts this build emitted. Keeping
//! them as distinct types stops a product set from being passed where a
//! source set is expected.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

macro_rules! tracked_path {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(PathBuf);

        impl $name {
            /// Wrap a path.
            pub fn new(path: impl Into<PathBuf>) -> Self {
                $name(path.into())
            }

            /// The wrapped path.
            pub fn path(&self) -> &Path {
                &self.0
            }

            /// Unwrap into the inner path.
            pub fn into_path(self) -> PathBuf {
                self.0
            }
        }

        impl From<PathBuf> for $name {
            fn from(path: PathBuf) -> Self {
                $name(path)
            }
        }

        impl From<&Path> for $name {
            fn from(path: &Path) -> Self {
                $name(path.to_path_buf())
            }
        }

        impl From<&str> for $name {
            fn from(path: &str) -> Self {
                $name(PathBuf::from(path))
            }
        }

        impl AsRef<Path> for $name {
            fn as_ref(&self) -> &Path {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.display())
            }
        }
    };
}

tracked_path! {
    /// A source file handed to the compiler front-end.
    SourceFile
}

tracked_path! {
    /// A classpath binary (jar, library, class directory) this build reads.
    BinaryFile
}

tracked_path! {
    /// A generated artifact this build wrote.
    ProductFile
}

impl SourceFile {
    /// Class name implied by the file stem, used when no dependency graph
    /// supplies real names.
    pub fn implied_class_name(&self) -> Option<String> {
        self.0
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_follows_path() {
        let a = SourceFile::from("src/A.scala");
        let b = SourceFile::from("src/B.scala");
        assert!(a < b);
    }

    #[test]
    fn test_implied_class_name() {
        let src = SourceFile::from("src/pkg/Widget.scala");
        assert_eq!(src.implied_class_name().as_deref(), Some("Widget"));
    }

    #[test]
    fn test_serializes_as_plain_path() {
        let product = ProductFile::from("out/A.class");
        let json = serde_json::to_string(&product).unwrap();
        assert_eq!(json, "\"out/A.class\"");

        let back: ProductFile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, product);
    }
}
