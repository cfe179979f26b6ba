pub mod leb128;
pub mod wide;

pub mod registry;
pub mod type_parser;

pub mod encoder;
pub mod decoder;

/// LEB128 单值编码的最大字节数 (u64)
pub const MAX_VAR_UINT_LEN: usize = 10;
