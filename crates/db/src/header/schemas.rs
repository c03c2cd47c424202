use crate::define_table_with_default_codec;
use crate::define_table_with_height_key;
use crate::define_table_without_codec;
use crate::impl_borsh_value_codec;
use crate::types::{StoreFlags, StoredBlock};

// Singleton rows all live under this key in their own column family.
pub(crate) const META_KEY: u8 = 0;

define_table_with_height_key!(
    /// Block rows by height: bare headers at or below the historical point,
    /// full entries above it
    (BlockHeightSchema) => StoredBlock
);

define_table_with_height_key!(
    /// Lookup accelerator mapping height to the block hash at that height
    (HashByHeightSchema) => [u8; 32]
);

define_table_with_default_codec!(
    /// Schema version singleton
    (VersionSchema) u8 => u32
);

define_table_with_default_codec!(
    /// Store flags singleton, written at creation and checked on reopen
    (FlagsSchema) u8 => StoreFlags
);

define_table_with_default_codec!(
    /// Custom start height singleton, absent when syncing from genesis
    (StartMarkerSchema) u8 => u32
);
