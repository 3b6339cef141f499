/// The three container eras a package archive can carry, identified by the
/// name of the embedded database file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageFormat {
    /// `collection.anki2`, the original container layout.
    CollectionV2,
    /// `collection.anki21`, the scheduler-v2 era layout.
    CollectionV21,
    /// `collection.anki21b`, the latest era. Recognized but not readable:
    /// the database inside is zstd-compressed and the surrounding entries
    /// use a protobuf media index.
    CollectionV21b,
}

impl PackageFormat {
    /// Newest era first, so an archive that bundles a legacy stub database
    /// next to a new-format one is still reported as the new format.
    pub const DETECTION_ORDER: [PackageFormat; 3] = [
        PackageFormat::CollectionV21b,
        PackageFormat::CollectionV21,
        PackageFormat::CollectionV2,
    ];

    pub fn database_name(&self) -> &'static str {
        match self {
            PackageFormat::CollectionV2 => "collection.anki2",
            PackageFormat::CollectionV21 => "collection.anki21",
            PackageFormat::CollectionV21b => "collection.anki21b",
        }
    }

    pub fn unsupported_reason(&self) -> Option<&'static str> {
        match self {
            PackageFormat::CollectionV2 | PackageFormat::CollectionV21 => None,
            PackageFormat::CollectionV21b => Some(
                "this package was exported by a newer tool version and stores a \
                 zstd-compressed database; re-export it with backwards compatibility \
                 enabled and import again",
            ),
        }
    }
}
