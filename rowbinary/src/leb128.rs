use std::io;
use std::io::Read;

use bytes::{BufMut, BytesMut};

use common::err::client_error::{ClientError, DecodeFault};
use common::err::CResult;

use crate::MAX_VAR_UINT_LEN;

/// 读侧的 io::Error 归类。EOF 即流被截断
pub fn map_read_err(err: io::Error) -> ClientError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        DecodeFault::Truncated.into()
    } else {
        ClientError::IoError(err)
    }
}

/// LEB128 无符号编码, 长度与字典下标使用
pub fn write_var_uint(buf: &mut BytesMut, value: u64) {
    let mut value = value;
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if value == 0 {
            return;
        }
    }
}

pub fn read_var_uint<R: Read>(reader: &mut R) -> CResult<u64> {
    let mut result: u64 = 0;
    for i in 0..MAX_VAR_UINT_LEN {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte).map_err(map_read_err)?;
        result |= ((byte[0] & 0x7f) as u64) << (i * 7);
        if byte[0] & 0x80 == 0 {
            return Ok(result);
        }
    }
    Err(DecodeFault::InvalidData(String::from("var uint is too long")).into())
}

/// LEB128 长度前缀 + 原始字节
pub fn write_var_bytes(buf: &mut BytesMut, bytes: &[u8]) {
    write_var_uint(buf, bytes.len() as u64);
    buf.put_slice(bytes);
}

pub fn read_var_bytes<R: Read>(reader: &mut R) -> CResult<Vec<u8>> {
    let len = read_var_uint(reader)? as usize;
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes).map_err(map_read_err)?;
    Ok(bytes)
}

pub fn read_var_string<R: Read>(reader: &mut R) -> CResult<String> {
    let bytes = read_var_bytes(reader)?;
    String::from_utf8(bytes).map_err(|_| DecodeFault::InvalidUtf8.into())
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use bytes::BytesMut;

    use common::err::client_error::{ClientError, DecodeFault};

    use crate::leb128::{read_var_bytes, read_var_uint, write_var_bytes, write_var_uint};

    #[test]
    fn test_var_uint_roundtrip() {
        for value in [0u64, 1, 127, 128, 300, 16383, 16384, u32::MAX as u64, u64::MAX] {
            let mut buf = BytesMut::new();
            write_var_uint(&mut buf, value);
            let mut cursor = Cursor::new(buf.as_ref());
            assert_eq!(read_var_uint(&mut cursor).unwrap(), value);
            assert_eq!(cursor.position() as usize, buf.len());
        }
    }

    #[test]
    fn test_var_uint_single_byte_boundary() {
        let mut buf = BytesMut::new();
        write_var_uint(&mut buf, 127);
        assert_eq!(buf.as_ref(), &[0x7f]);

        let mut buf = BytesMut::new();
        write_var_uint(&mut buf, 128);
        assert_eq!(buf.as_ref(), &[0x80, 0x01]);
    }

    #[test]
    fn test_truncated_bytes() {
        let mut buf = BytesMut::new();
        write_var_bytes(&mut buf, b"hello");
        let short = &buf.as_ref()[..3];
        let mut cursor = Cursor::new(short);
        assert!(matches!(
            read_var_bytes(&mut cursor),
            Err(ClientError::Decode(DecodeFault::Truncated))
        ));
    }
}
